use engine_core::{
    Bias, EngineError, EngineResult, OptionKind, OptionSuggestion, PlanTimeframe, RankedSignal,
    RiskAssessment, RiskReward, Series, StopPlan, TargetPlan, TradePlan, TradeQuality, Vehicle,
    VolatilityRegime,
};
use signal_engine::IndicatorSet;

/// Preferred reward multiple over risk.
const TARGET_RR: f64 = 2.0;

/// Stop distance clamp, in ATR multiples.
const STOP_MULT_MIN: f64 = 0.5;
const STOP_MULT_MAX: f64 = 3.0;

/// Raw numbers the assessor works from, extracted once from the indicator
/// set. Kept separate so the plan math is directly testable.
#[derive(Debug, Clone)]
pub struct SymbolMetrics {
    pub symbol: String,
    pub price: f64,
    pub atr: f64,
    pub adx: f64,
    pub volume_ratio: f64,
}

pub struct RiskAssessor;

impl RiskAssessor {
    /// Assess a symbol from its computed indicators and ranked signals.
    pub fn assess(
        series: &Series,
        ind: &IndicatorSet,
        signals: &[RankedSignal],
    ) -> EngineResult<TradePlan> {
        series.ensure_min_bars(engine_core::MIN_BARS)?;

        let price = series
            .last_close()
            .ok_or_else(|| EngineError::InsufficientData(format!("{}: empty series", series.symbol)))?;
        let atr = IndicatorSet::last(&ind.atr_14).ok_or_else(|| {
            EngineError::InsufficientData(format!("{}: ATR window unavailable", series.symbol))
        })?;
        let adx = IndicatorSet::last(&ind.adx.adx).ok_or_else(|| {
            EngineError::InsufficientData(format!("{}: ADX window unavailable", series.symbol))
        })?;

        let metrics = SymbolMetrics {
            symbol: series.symbol.clone(),
            price,
            atr,
            adx,
            volume_ratio: ind.volume_ratio(),
        };
        Ok(Self::assess_metrics(&metrics, signals))
    }

    /// Build a trade plan from raw metrics. Always produces a plan; unsound
    /// setups come back with suppressions and no qualification.
    pub fn assess_metrics(metrics: &SymbolMetrics, signals: &[RankedSignal]) -> TradePlan {
        let atr_pct = if metrics.price > 0.0 {
            metrics.atr / metrics.price * 100.0
        } else {
            0.0
        };

        let volatility = if atr_pct < 1.5 {
            VolatilityRegime::Low
        } else if atr_pct > 3.0 {
            VolatilityRegime::High
        } else {
            VolatilityRegime::Medium
        };

        let (bias, bull_count, bear_count) = Self::bias(signals);
        let timeframe = Self::timeframe(volatility, metrics.adx, signals.len());

        // Stop distance in ATR multiples by timeframe, clamped to sane range.
        let stop_mult: f64 = match timeframe {
            PlanTimeframe::Scalp => 1.0,
            PlanTimeframe::Day => 1.5,
            PlanTimeframe::Swing => 2.0,
        };
        let stop_mult = stop_mult.clamp(STOP_MULT_MIN, STOP_MULT_MAX);

        let risk = metrics.atr * stop_mult;
        let stop_price = match bias {
            Bias::Bearish => metrics.price + risk,
            _ => metrics.price - risk,
        };
        let stop_pct = if metrics.price > 0.0 {
            risk / metrics.price * 100.0
        } else {
            0.0
        };

        let reward = risk * TARGET_RR;
        let target_price = match bias {
            Bias::Bearish => metrics.price - reward,
            _ => metrics.price + reward,
        };

        let rr = RiskReward {
            risk,
            reward,
            ratio: if risk > 0.0 { reward / risk } else { 0.0 },
        };

        let quality = Self::quality(rr.ratio, metrics.adx, volatility);
        let suppressions = Self::suppressions(
            rr.ratio,
            metrics.adx,
            bull_count,
            bear_count,
            metrics.volume_ratio,
            stop_pct,
        );

        let assessment = RiskAssessment {
            atr: metrics.atr,
            atr_pct,
            volatility,
            adx: metrics.adx,
            is_trending: metrics.adx >= 25.0,
            volume_ratio: metrics.volume_ratio,
            bias,
            timeframe,
            stop: StopPlan {
                price: stop_price,
                atr_mult: stop_mult,
                pct: stop_pct,
            },
            target: TargetPlan {
                price: target_price,
                pct: if metrics.price > 0.0 {
                    reward / metrics.price * 100.0
                } else {
                    0.0
                },
                atr_mult: if metrics.atr > 0.0 { reward / metrics.atr } else { 0.0 },
            },
            rr,
            quality,
            suppressions,
        };

        let (vehicle, option_suggestions) =
            Self::vehicle(&assessment, atr_pct, metrics.atr, bias, timeframe);

        TradePlan {
            symbol: metrics.symbol.clone(),
            current_price: metrics.price,
            assessment,
            vehicle,
            option_suggestions,
            primary_signal: signals.first().cloned(),
            supporting_signals: signals.iter().skip(1).take(4).cloned().collect(),
        }
    }

    /// Directional bias requires a margin of at least two signals.
    fn bias(signals: &[RankedSignal]) -> (Bias, usize, usize) {
        let bull = signals.iter().filter(|s| s.signal.strength.is_bullish()).count();
        let bear = signals.iter().filter(|s| s.signal.strength.is_bearish()).count();

        let bias = if bull >= bear + 2 {
            Bias::Bullish
        } else if bear >= bull + 2 {
            Bias::Bearish
        } else {
            Bias::Neutral
        };
        (bias, bull, bear)
    }

    fn timeframe(volatility: VolatilityRegime, adx: f64, signal_count: usize) -> PlanTimeframe {
        if volatility == VolatilityRegime::Low && adx > 25.0 {
            PlanTimeframe::Scalp
        } else if volatility == VolatilityRegime::High || adx > 40.0 || signal_count > 10 {
            PlanTimeframe::Swing
        } else {
            PlanTimeframe::Day
        }
    }

    fn quality(rr_ratio: f64, adx: f64, volatility: VolatilityRegime) -> TradeQuality {
        let mut points = 0u32;

        points += if rr_ratio >= 2.5 {
            3
        } else if rr_ratio >= 2.0 {
            2
        } else if rr_ratio >= 1.5 {
            1
        } else {
            0
        };

        points += if adx >= 40.0 {
            3
        } else if adx >= 25.0 {
            2
        } else if adx >= 20.0 {
            1
        } else {
            0
        };

        points += match volatility {
            VolatilityRegime::Low => 2,
            VolatilityRegime::Medium => 1,
            VolatilityRegime::High => 0,
        };

        if points >= 7 {
            TradeQuality::High
        } else if points >= 4 {
            TradeQuality::Medium
        } else {
            TradeQuality::Low
        }
    }

    fn suppressions(
        rr_ratio: f64,
        adx: f64,
        bull: usize,
        bear: usize,
        volume_ratio: f64,
        stop_pct: f64,
    ) -> Vec<String> {
        let mut out = Vec::new();
        if rr_ratio < 1.5 {
            out.push(format!("risk/reward {rr_ratio:.2} below 1.5 minimum"));
        }
        if adx < 20.0 {
            out.push(format!("ADX {adx:.1} below 20, no tradeable trend"));
        }
        let total = bull + bear;
        if total > 0 {
            let minority = bull.min(bear) as f64 / total as f64;
            if minority > 0.4 {
                out.push(format!(
                    "conflicting signals: {bull} bullish vs {bear} bearish"
                ));
            }
        }
        if volume_ratio < 0.5 {
            out.push(format!("volume ratio {volume_ratio:.2} below half of average"));
        }
        if stop_pct > 10.0 {
            out.push(format!("stop distance {stop_pct:.1}% of price is too wide"));
        }
        out
    }

    /// Vehicle selection: stock unless a swing setup with enough expected
    /// movement to pay for option premium.
    fn vehicle(
        assessment: &RiskAssessment,
        atr_pct: f64,
        atr: f64,
        bias: Bias,
        timeframe: PlanTimeframe,
    ) -> (Vehicle, Option<OptionSuggestion>) {
        // Expected move over a swing horizon, approximated from ATR percent.
        let expected_move = atr_pct * 2.5;

        if timeframe != PlanTimeframe::Swing
            || expected_move < 3.0
            || assessment.volatility == VolatilityRegime::Low
        {
            return (Vehicle::Stock, None);
        }

        let kind = match bias {
            Bias::Bearish => OptionKind::Put,
            _ => OptionKind::Call,
        };
        let (delta_min, delta_max) = match kind {
            OptionKind::Call => (0.40, 0.60),
            OptionKind::Put => (-0.60, -0.40),
        };

        match assessment.volatility {
            VolatilityRegime::Medium => {
                let vehicle = match kind {
                    OptionKind::Call => Vehicle::OptionCall,
                    OptionKind::Put => Vehicle::OptionPut,
                };
                (
                    vehicle,
                    Some(OptionSuggestion {
                        kind,
                        dte_min: 30,
                        dte_max: 45,
                        delta_min,
                        delta_max,
                        spread_width: None,
                    }),
                )
            }
            VolatilityRegime::High => (
                Vehicle::OptionSpread,
                Some(OptionSuggestion {
                    kind,
                    dte_min: 30,
                    dte_max: 45,
                    delta_min,
                    delta_max,
                    spread_width: Some(atr),
                }),
            ),
            // Low volatility already returned the stock vehicle above.
            VolatilityRegime::Low => (Vehicle::Stock, None),
        }
    }
}
