use chrono::NaiveDate;
use engine_core::{
    EngineError, EngineResult, Leg, LegSide, NetGreeks, OptionChain, OptionContract, OptionKind,
    RiskReward, SpreadKind, SpreadResult, SpreadStatus,
};
use statrs::distribution::{ContinuousCDF, Normal};

const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Open-interest floor below which a leg is flagged as illiquid.
const MIN_OPEN_INTEREST: i64 = 100;

/// Strike selection for one spread analysis. Vertical spreads use
/// `short_strike`/`long_strike`; four-legged structures name each wing.
#[derive(Debug, Clone, Default)]
pub struct SpreadRequest {
    pub kind: Option<SpreadKind>,
    pub expiration: Option<NaiveDate>,
    pub short_strike: Option<f64>,
    pub long_strike: Option<f64>,
    pub short_put_strike: Option<f64>,
    pub long_put_strike: Option<f64>,
    pub short_call_strike: Option<f64>,
    pub long_call_strike: Option<f64>,
    pub contracts: u32,
}

pub struct SpreadAnalyzer;

impl SpreadAnalyzer {
    /// Analyze one spread against a chain snapshot. Missing strikes in the
    /// chain surface as `OptionDataUnavailable`; missing request parameters
    /// are validation errors.
    pub fn analyze(
        chain: &OptionChain,
        request: &SpreadRequest,
        today: NaiveDate,
    ) -> EngineResult<SpreadResult> {
        let kind = request
            .kind
            .ok_or_else(|| EngineError::Validation("spread_type is required".to_string()))?;
        let contracts = request.contracts.max(1);

        // Default expiration: nearest to the 30-45 DTE midpoint.
        let expiration = match request.expiration {
            Some(e) => e,
            None => chain.expiration_near_dte(today, 37).ok_or_else(|| {
                EngineError::OptionDataUnavailable(format!(
                    "{}: no future expirations in chain",
                    chain.symbol
                ))
            })?,
        };
        let dte = (expiration - today).num_days();

        let legs = Self::resolve_legs(chain, request, kind, expiration, contracts)?;
        let per_share_credit: f64 = legs
            .iter()
            .map(|l| match l.side {
                LegSide::Short => l.premium,
                LegSide::Long => -l.premium,
            })
            .sum();

        let scale = CONTRACT_MULTIPLIER * contracts as f64;
        let (max_profit, max_loss, breakevens) =
            Self::payoff(kind, &legs, per_share_credit, scale)?;

        let price = chain.underlying_price;
        let avg_iv = legs.iter().map(|l| Self::leg_iv(chain, l)).sum::<f64>() / legs.len() as f64;
        let pop = Self::probability_of_profit(kind, price, avg_iv, dte, &breakevens);

        let mut net_greeks = NetGreeks::default();
        for leg in &legs {
            let sign = match leg.side {
                LegSide::Long => 1.0,
                LegSide::Short => -1.0,
            };
            net_greeks.delta += sign * leg.delta * contracts as f64;
            net_greeks.gamma += sign * leg.gamma * contracts as f64;
            net_greeks.theta += sign * leg.theta * contracts as f64;
            net_greeks.vega += sign * leg.vega * contracts as f64;
        }

        let status = Self::status(kind, price, &legs, &breakevens);
        let warnings = Self::warnings(dte, &legs, avg_iv, status);

        Ok(SpreadResult {
            symbol: chain.symbol.clone(),
            kind,
            dte,
            contracts,
            max_profit,
            max_loss,
            breakevens,
            pop,
            // Risk carried per unit of reward: 2.2 means risking $2.20 to
            // make $1.00 at max profit.
            rr: RiskReward {
                risk: max_loss,
                reward: max_profit,
                ratio: if max_profit > 0.0 {
                    max_loss / max_profit
                } else {
                    0.0
                },
            },
            net_debit_credit: per_share_credit,
            net_greeks,
            status,
            warnings,
            legs,
        })
    }

    fn require(value: Option<f64>, name: &str) -> EngineResult<f64> {
        value.ok_or_else(|| EngineError::Validation(format!("{name} is required")))
    }

    fn leg(
        chain: &OptionChain,
        kind: OptionKind,
        strike: f64,
        expiration: NaiveDate,
        side: LegSide,
    ) -> EngineResult<Leg> {
        let contract = chain.find(kind, strike, expiration).ok_or_else(|| {
            EngineError::OptionDataUnavailable(format!(
                "{}: no {:?} contract at strike {} expiring {}",
                chain.symbol, kind, strike, expiration
            ))
        })?;
        Ok(Self::leg_from_contract(contract, side))
    }

    fn leg_from_contract(c: &OptionContract, side: LegSide) -> Leg {
        Leg {
            contract: c.contract.clone(),
            kind: c.kind,
            side,
            strike: c.strike,
            expiration: c.expiration,
            premium: c.mid(),
            delta: c.delta,
            gamma: c.gamma,
            theta: c.theta,
            vega: c.vega,
            open_interest: c.open_interest,
            volume: c.volume,
        }
    }

    fn leg_iv(chain: &OptionChain, leg: &Leg) -> f64 {
        chain
            .find(leg.kind, leg.strike, leg.expiration)
            .map(|c| c.implied_volatility)
            .unwrap_or(0.0)
    }

    fn resolve_legs(
        chain: &OptionChain,
        request: &SpreadRequest,
        kind: SpreadKind,
        expiration: NaiveDate,
        _contracts: u32,
    ) -> EngineResult<Vec<Leg>> {
        match kind {
            SpreadKind::CallCredit | SpreadKind::CallDebit => {
                let short = Self::require(request.short_strike, "short_strike")?;
                let long = Self::require(request.long_strike, "long_strike")?;
                Ok(vec![
                    Self::leg(chain, OptionKind::Call, short, expiration, LegSide::Short)?,
                    Self::leg(chain, OptionKind::Call, long, expiration, LegSide::Long)?,
                ])
            }
            SpreadKind::PutCredit | SpreadKind::PutDebit => {
                let short = Self::require(request.short_strike, "short_strike")?;
                let long = Self::require(request.long_strike, "long_strike")?;
                Ok(vec![
                    Self::leg(chain, OptionKind::Put, short, expiration, LegSide::Short)?,
                    Self::leg(chain, OptionKind::Put, long, expiration, LegSide::Long)?,
                ])
            }
            SpreadKind::IronCondor | SpreadKind::IronButterfly => {
                let short_call = Self::require(request.short_call_strike, "short_call_strike")?;
                let long_call = Self::require(request.long_call_strike, "long_call_strike")?;
                let short_put = Self::require(request.short_put_strike, "short_put_strike")?;
                let long_put = Self::require(request.long_put_strike, "long_put_strike")?;
                if kind == SpreadKind::IronButterfly && (short_call - short_put).abs() > 1e-6 {
                    return Err(EngineError::Validation(
                        "iron butterfly short strikes must share the body strike".to_string(),
                    ));
                }
                Ok(vec![
                    Self::leg(chain, OptionKind::Call, short_call, expiration, LegSide::Short)?,
                    Self::leg(chain, OptionKind::Call, long_call, expiration, LegSide::Long)?,
                    Self::leg(chain, OptionKind::Put, short_put, expiration, LegSide::Short)?,
                    Self::leg(chain, OptionKind::Put, long_put, expiration, LegSide::Long)?,
                ])
            }
        }
    }

    /// Standard payoff algebra per strategy. Returns
    /// (max_profit, max_loss, breakevens) in dollars for the full position.
    fn payoff(
        kind: SpreadKind,
        legs: &[Leg],
        per_share_credit: f64,
        scale: f64,
    ) -> EngineResult<(f64, f64, Vec<f64>)> {
        let strike_of = |side: LegSide, option_kind: OptionKind| -> EngineResult<f64> {
            legs.iter()
                .find(|l| l.side == side && l.kind == option_kind)
                .map(|l| l.strike)
                .ok_or_else(|| EngineError::Internal("leg set incomplete".to_string()))
        };

        match kind {
            SpreadKind::CallCredit => {
                let short = strike_of(LegSide::Short, OptionKind::Call)?;
                let long = strike_of(LegSide::Long, OptionKind::Call)?;
                let width = long - short;
                if width <= 0.0 {
                    return Err(EngineError::Validation(
                        "call credit spread needs long_strike above short_strike".to_string(),
                    ));
                }
                let credit = per_share_credit;
                Ok((
                    credit * scale,
                    (width - credit) * scale,
                    vec![short + credit],
                ))
            }
            SpreadKind::PutCredit => {
                let short = strike_of(LegSide::Short, OptionKind::Put)?;
                let long = strike_of(LegSide::Long, OptionKind::Put)?;
                let width = short - long;
                if width <= 0.0 {
                    return Err(EngineError::Validation(
                        "put credit spread needs long_strike below short_strike".to_string(),
                    ));
                }
                let credit = per_share_credit;
                Ok((
                    credit * scale,
                    (width - credit) * scale,
                    vec![short - credit],
                ))
            }
            SpreadKind::CallDebit => {
                let short = strike_of(LegSide::Short, OptionKind::Call)?;
                let long = strike_of(LegSide::Long, OptionKind::Call)?;
                let width = short - long;
                if width <= 0.0 {
                    return Err(EngineError::Validation(
                        "call debit spread needs short_strike above long_strike".to_string(),
                    ));
                }
                let debit = -per_share_credit;
                Ok((
                    (width - debit) * scale,
                    debit * scale,
                    vec![long + debit],
                ))
            }
            SpreadKind::PutDebit => {
                let short = strike_of(LegSide::Short, OptionKind::Put)?;
                let long = strike_of(LegSide::Long, OptionKind::Put)?;
                let width = long - short;
                if width <= 0.0 {
                    return Err(EngineError::Validation(
                        "put debit spread needs long_strike above short_strike".to_string(),
                    ));
                }
                let debit = -per_share_credit;
                Ok((
                    (width - debit) * scale,
                    debit * scale,
                    vec![long - debit],
                ))
            }
            SpreadKind::IronCondor | SpreadKind::IronButterfly => {
                let short_call = strike_of(LegSide::Short, OptionKind::Call)?;
                let long_call = strike_of(LegSide::Long, OptionKind::Call)?;
                let short_put = strike_of(LegSide::Short, OptionKind::Put)?;
                let long_put = strike_of(LegSide::Long, OptionKind::Put)?;

                let call_width = long_call - short_call;
                let put_width = short_put - long_put;
                if call_width <= 0.0 || put_width <= 0.0 {
                    return Err(EngineError::Validation(
                        "wings must sit outside the short strikes".to_string(),
                    ));
                }

                let credit = per_share_credit;
                // Only one side can finish in the money.
                let max_width = call_width.max(put_width);
                Ok((
                    credit * scale,
                    (max_width - credit) * scale,
                    vec![short_put - credit, short_call + credit],
                ))
            }
        }
    }

    /// POP under a log-normal terminal distribution:
    /// std = iv * price * sqrt(dte/365).
    fn probability_of_profit(
        kind: SpreadKind,
        price: f64,
        iv: f64,
        dte: i64,
        breakevens: &[f64],
    ) -> f64 {
        let std = iv * price * (dte.max(0) as f64 / 365.0).sqrt();
        if std <= 0.0 || breakevens.is_empty() {
            return 0.0;
        }

        match kind {
            // Profit while price stays below the breakeven.
            SpreadKind::CallCredit | SpreadKind::PutDebit => {
                norm_cdf((breakevens[0] - price) / std)
            }
            // Profit while price stays above the breakeven.
            SpreadKind::PutCredit | SpreadKind::CallDebit => {
                1.0 - norm_cdf((breakevens[0] - price) / std)
            }
            // Profit between the two breakevens.
            SpreadKind::IronCondor | SpreadKind::IronButterfly => {
                let lower = breakevens[0].min(breakevens[1]);
                let upper = breakevens[0].max(breakevens[1]);
                norm_cdf((upper - price) / std) - norm_cdf((lower - price) / std)
            }
        }
    }

    fn status(kind: SpreadKind, price: f64, legs: &[Leg], breakevens: &[f64]) -> SpreadStatus {
        let near = |level: f64| price > 0.0 && (price - level).abs() / price * 100.0 <= 0.25;
        let strike = |side: LegSide, option_kind: OptionKind| {
            legs.iter()
                .find(|l| l.side == side && l.kind == option_kind)
                .map(|l| l.strike)
                .unwrap_or(price)
        };

        match kind {
            SpreadKind::CallCredit => {
                let short = strike(LegSide::Short, OptionKind::Call);
                let long = strike(LegSide::Long, OptionKind::Call);
                let be = breakevens[0];
                if near(be) {
                    SpreadStatus::Breakeven
                } else if price <= short {
                    SpreadStatus::MaxProfit
                } else if price < be {
                    SpreadStatus::Profitable
                } else if price < long {
                    SpreadStatus::AtRisk
                } else {
                    SpreadStatus::MaxLoss
                }
            }
            SpreadKind::PutCredit => {
                let short = strike(LegSide::Short, OptionKind::Put);
                let long = strike(LegSide::Long, OptionKind::Put);
                let be = breakevens[0];
                if near(be) {
                    SpreadStatus::Breakeven
                } else if price >= short {
                    SpreadStatus::MaxProfit
                } else if price > be {
                    SpreadStatus::Profitable
                } else if price > long {
                    SpreadStatus::AtRisk
                } else {
                    SpreadStatus::MaxLoss
                }
            }
            SpreadKind::CallDebit => {
                let short = strike(LegSide::Short, OptionKind::Call);
                let long = strike(LegSide::Long, OptionKind::Call);
                let be = breakevens[0];
                if near(be) {
                    SpreadStatus::Breakeven
                } else if price >= short {
                    SpreadStatus::MaxProfit
                } else if price > be {
                    SpreadStatus::Profitable
                } else if price > long {
                    SpreadStatus::AtRisk
                } else {
                    SpreadStatus::MaxLoss
                }
            }
            SpreadKind::PutDebit => {
                let short = strike(LegSide::Short, OptionKind::Put);
                let long = strike(LegSide::Long, OptionKind::Put);
                let be = breakevens[0];
                if near(be) {
                    SpreadStatus::Breakeven
                } else if price <= short {
                    SpreadStatus::MaxProfit
                } else if price < be {
                    SpreadStatus::Profitable
                } else if price < long {
                    SpreadStatus::AtRisk
                } else {
                    SpreadStatus::MaxLoss
                }
            }
            SpreadKind::IronCondor | SpreadKind::IronButterfly => {
                let short_call = strike(LegSide::Short, OptionKind::Call);
                let long_call = strike(LegSide::Long, OptionKind::Call);
                let short_put = strike(LegSide::Short, OptionKind::Put);
                let long_put = strike(LegSide::Long, OptionKind::Put);
                let lower = breakevens[0].min(breakevens[1]);
                let upper = breakevens[0].max(breakevens[1]);

                if near(lower) || near(upper) {
                    SpreadStatus::Breakeven
                } else if price >= short_put && price <= short_call {
                    SpreadStatus::MaxProfit
                } else if price > lower && price < upper {
                    SpreadStatus::Profitable
                } else if price > long_put && price < long_call {
                    SpreadStatus::AtRisk
                } else {
                    SpreadStatus::MaxLoss
                }
            }
        }
    }

    fn warnings(dte: i64, legs: &[Leg], avg_iv: f64, status: SpreadStatus) -> Vec<String> {
        let mut out = Vec::new();
        if dte < 7 {
            out.push(format!("{dte} days to expiration: gamma risk is elevated"));
        }
        for leg in legs {
            if leg.open_interest < MIN_OPEN_INTEREST {
                out.push(format!(
                    "{} open interest {} is thin",
                    leg.contract, leg.open_interest
                ));
            }
            if leg.volume == 0 {
                out.push(format!("{} traded no volume today", leg.contract));
            }
        }
        if avg_iv > 1.5 {
            out.push(format!(
                "implied volatility {:.0}% is extreme; premium may collapse",
                avg_iv * 100.0
            ));
        } else if avg_iv > 0.0 && avg_iv < 0.05 {
            out.push("implied volatility under 5%; little premium to collect".to_string());
        }
        if status == SpreadStatus::MaxLoss {
            out.push("underlying is beyond the max-risk zone".to_string());
        }
        out
    }
}

fn norm_cdf(x: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(n) => n.cdf(x),
        Err(_) => 0.5,
    }
}
