use engine_core::{
    sector_etf, sector_of, EngineError, EngineResult, HedgeKind, HedgeSuggestion, Period,
    PortfolioAssessment, PortfolioRiskLevel, Position, PositionReport, QuoteSource, TradeQuality,
};
use futures_util::future::join_all;
use risk_engine::RiskAssessor;
use signal_engine::{detect_signals, rank_signals, IndicatorSet};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default stop when no series is available: 5% under entry.
const FALLBACK_STOP_FRACTION: f64 = 0.95;

/// Aggregates per-position risk into a portfolio view with concentration
/// analysis and hedge suggestions.
pub struct PortfolioAggregator {
    quotes: Arc<dyn QuoteSource>,
}

impl PortfolioAggregator {
    pub fn new(quotes: Arc<dyn QuoteSource>) -> Self {
        Self { quotes }
    }

    pub async fn assess(
        &self,
        positions: &[Position],
        period: Period,
    ) -> EngineResult<PortfolioAssessment> {
        if positions.is_empty() {
            return Err(EngineError::Validation(
                "positions must contain at least one entry".to_string(),
            ));
        }

        let reports: Vec<PositionReport> = join_all(
            positions
                .iter()
                .map(|p| self.position_report(p, period)),
        )
        .await;

        let total_value: f64 = reports.iter().map(|r| r.current_value).sum();
        let total_pnl: f64 = reports.iter().map(|r| r.unrealized_pnl).sum();
        let total_max_loss: f64 = reports.iter().map(|r| r.max_loss).sum();
        let risk_pct = if total_value > 0.0 {
            total_max_loss / total_value * 100.0
        } else {
            0.0
        };

        let sector_concentration = Self::sector_concentration(&reports, total_value);

        let base_level = if risk_pct < 3.0 {
            PortfolioRiskLevel::Low
        } else if risk_pct < 7.0 {
            PortfolioRiskLevel::Medium
        } else if risk_pct < 12.0 {
            PortfolioRiskLevel::High
        } else {
            PortfolioRiskLevel::Extreme
        };

        let low_quality = reports
            .iter()
            .filter(|r| r.quality == TradeQuality::Low)
            .count();
        let concentrated_position = total_value > 0.0
            && reports
                .iter()
                .any(|r| r.current_value / total_value > 0.40);
        let concentrated_sector = sector_concentration.values().any(|pct| *pct > 60.0);
        let low_quality_heavy = low_quality as f64 / reports.len() as f64 > 0.30;

        let risk_level = if concentrated_position || concentrated_sector || low_quality_heavy {
            base_level.escalate()
        } else {
            base_level
        };

        let hedge_suggestions = Self::hedge_suggestions(
            &sector_concentration,
            total_value,
            low_quality,
            risk_pct,
        );

        Ok(PortfolioAssessment {
            total_value,
            total_unrealized_pnl: total_pnl,
            total_max_loss,
            risk_pct,
            risk_level,
            positions: reports,
            sector_concentration,
            hedge_suggestions,
        })
    }

    /// One position's risk report. Fetch or assessment failures degrade to
    /// the entry-anchored fallback stop; they never abort the portfolio.
    async fn position_report(&self, position: &Position, period: Period) -> PositionReport {
        let sector = sector_of(&position.symbol).unwrap_or("Other").to_string();

        let (current_price, stop_price, quality) =
            match self.quotes.fetch(&position.symbol, period).await {
                Ok(series) => {
                    let price = series.last_close().unwrap_or(position.entry_price);
                    match Self::derive_stop(&series) {
                        Some((stop, quality)) => (price, stop, quality),
                        None => (
                            price,
                            position.entry_price * FALLBACK_STOP_FRACTION,
                            TradeQuality::Low,
                        ),
                    }
                }
                Err(e) => {
                    tracing::warn!(symbol = %position.symbol, error = %e, "position fetch failed");
                    (
                        position.entry_price,
                        position.entry_price * FALLBACK_STOP_FRACTION,
                        TradeQuality::Low,
                    )
                }
            };

        let current_value = current_price * position.shares;
        let unrealized_pnl = (current_price - position.entry_price) * position.shares;
        let max_loss = (current_price - stop_price).abs() * position.shares;

        PositionReport {
            symbol: position.symbol.clone(),
            shares: position.shares,
            entry_price: position.entry_price,
            current_price,
            current_value,
            unrealized_pnl,
            unrealized_pnl_pct: if position.entry_price > 0.0 {
                (current_price - position.entry_price) / position.entry_price * 100.0
            } else {
                0.0
            },
            stop_price,
            max_loss,
            quality,
            sector,
        }
    }

    fn derive_stop(series: &engine_core::Series) -> Option<(f64, TradeQuality)> {
        let ind = IndicatorSet::compute(&series.bars);
        let ranked = rank_signals(detect_signals(&series.bars, &ind));
        match RiskAssessor::assess(series, &ind, &ranked) {
            Ok(plan) => Some((plan.assessment.stop.price, plan.assessment.quality)),
            Err(_) => None,
        }
    }

    /// Percent of current value per sector; sums to 100 for non-empty books.
    fn sector_concentration(
        reports: &[PositionReport],
        total_value: f64,
    ) -> BTreeMap<String, f64> {
        let mut by_sector: BTreeMap<String, f64> = BTreeMap::new();
        if total_value <= 0.0 {
            return by_sector;
        }
        for report in reports {
            *by_sector.entry(report.sector.clone()).or_default() += report.current_value;
        }
        for value in by_sector.values_mut() {
            *value = *value / total_value * 100.0;
        }
        by_sector
    }

    fn hedge_suggestions(
        sector_concentration: &BTreeMap<String, f64>,
        total_value: f64,
        low_quality_count: usize,
        risk_pct: f64,
    ) -> Vec<HedgeSuggestion> {
        let mut out = Vec::new();

        for (sector, pct) in sector_concentration {
            if *pct <= 40.0 || sector == "Other" {
                continue;
            }
            let etf = sector_etf(sector);
            // Hedge half of the allocation above the 40% line.
            let overweight_value = total_value * (pct - 40.0) / 100.0;
            out.push(HedgeSuggestion {
                kind: HedgeKind::SectorHedge,
                instrument: etf.map(str::to_string),
                notional: Some(overweight_value * 0.5),
                description: match etf {
                    Some(etf) => format!(
                        "{sector} is {pct:.0}% of the book; buy {etf} puts to hedge half the overweight"
                    ),
                    None => format!("{sector} is {pct:.0}% of the book; reduce exposure"),
                },
            });
        }

        if low_quality_count >= 2 {
            out.push(HedgeSuggestion {
                kind: HedgeKind::TightenStops,
                instrument: None,
                notional: None,
                description: format!(
                    "{low_quality_count} positions grade LOW quality; tighten their stops"
                ),
            });
        }

        if risk_pct > 10.0 {
            out.push(HedgeSuggestion {
                kind: HedgeKind::IndexHedge,
                instrument: Some("SPY".to_string()),
                notional: Some(total_value * 0.20),
                description: format!(
                    "portfolio max loss is {risk_pct:.1}% of value; add an index put spread on 20% notional"
                ),
            });
        }

        out
    }
}
