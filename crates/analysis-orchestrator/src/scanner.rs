use chrono::{DateTime, Utc};
use engine_core::{EngineResult, Period, TradePlan, UniverseName, RESULT_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use signal_engine::IndicatorSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

use crate::{AnalysisOrchestrator, SymbolPipeline};

/// Universe-wide scan for qualified trade plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub schema_version: u32,
    pub universe: UniverseName,
    pub scanned: usize,
    pub errors: usize,
    /// Share of successfully analyzed symbols that qualified.
    pub qualification_rate: f64,
    pub duration_seconds: f64,
    pub plans: Vec<TradePlan>,
    pub timestamp: DateTime<Utc>,
}

/// Universe-wide filtered screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenResult {
    pub schema_version: u32,
    pub universe: UniverseName,
    pub scanned: usize,
    pub errors: usize,
    pub qualification_rate: f64,
    pub duration_seconds: f64,
    pub rows: Vec<ScreenRow>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenRow {
    pub symbol: String,
    pub price: f64,
    pub change_percent: Option<f64>,
    pub avg_score: f64,
    pub signal_count: usize,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub rsi: Option<f64>,
    pub adx: Option<f64>,
    pub volume_ratio: f64,
    pub top_signals: Vec<String>,
}

/// RSI filter: either a band or a bare number meaning "at most".
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RsiCriterion {
    Band {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Max(f64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinBound {
    pub min: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaRef {
    pub ma_period: usize,
}

/// Enumerated screener grammar. Unknown keys are rejected at the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenCriteria {
    #[serde(default)]
    pub rsi: Option<RsiCriterion>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub min_bullish: Option<usize>,
    #[serde(default)]
    pub adx: Option<MinBound>,
    #[serde(default)]
    pub volume_spike: Option<bool>,
    #[serde(default)]
    pub price_above: Option<MaRef>,
    #[serde(default)]
    pub price_below: Option<MaRef>,
    #[serde(default)]
    pub change_percent: Option<MinBound>,
    #[serde(default)]
    pub signal_contains: Option<String>,
}

impl ScreenCriteria {
    fn matches(&self, pipeline: &SymbolPipeline, row: &ScreenRow) -> bool {
        if let Some(rsi_criterion) = &self.rsi {
            let Some(rsi) = row.rsi else { return false };
            match rsi_criterion {
                RsiCriterion::Band { min, max } => {
                    if min.is_some_and(|m| rsi < m) || max.is_some_and(|m| rsi > m) {
                        return false;
                    }
                }
                RsiCriterion::Max(max) => {
                    if rsi > *max {
                        return false;
                    }
                }
            }
        }

        if self.min_score.is_some_and(|m| row.avg_score < m) {
            return false;
        }
        if self.min_bullish.is_some_and(|m| row.bullish_count < m) {
            return false;
        }
        if let Some(adx_bound) = &self.adx {
            if !row.adx.is_some_and(|a| a >= adx_bound.min) {
                return false;
            }
        }
        if self.volume_spike == Some(true) && row.volume_ratio < 2.0 {
            return false;
        }

        if let Some(above) = &self.price_above {
            let Some(ma) = pipeline
                .indicators
                .sma_for(above.ma_period)
                .and_then(IndicatorSet::last)
            else {
                return false;
            };
            if row.price <= ma {
                return false;
            }
        }
        if let Some(below) = &self.price_below {
            let Some(ma) = pipeline
                .indicators
                .sma_for(below.ma_period)
                .and_then(IndicatorSet::last)
            else {
                return false;
            };
            if row.price >= ma {
                return false;
            }
        }

        if let Some(change_bound) = &self.change_percent {
            if !row.change_percent.is_some_and(|c| c >= change_bound.min) {
                return false;
            }
        }

        if let Some(fragment) = &self.signal_contains {
            let fragment = fragment.to_ascii_uppercase();
            if !pipeline
                .signals
                .iter()
                .any(|s| s.signal.name.contains(&fragment))
            {
                return false;
            }
        }

        true
    }
}

/// Fans the per-symbol pipeline out over a universe through the
/// orchestrator's shared semaphore. Per-symbol failures are counted and
/// never abort the sweep.
pub struct TradeScanner {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl TradeScanner {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn scan(
        &self,
        universe: UniverseName,
        max_results: usize,
        period: Period,
    ) -> EngineResult<ScanResult> {
        let started = Instant::now();
        let symbols = universe.symbols();

        let mut tasks = JoinSet::new();
        for symbol in symbols {
            let orchestrator = Arc::clone(&self.orchestrator);
            let symbol = symbol.to_string();
            let semaphore = orchestrator.semaphore();
            let timeout = orchestrator.symbol_timeout();
            tasks.spawn(async move {
                tokio::task::yield_now().await;
                let _permit = semaphore.acquire_owned().await;
                let result =
                    tokio::time::timeout(timeout, orchestrator.trade_plan(&symbol, period)).await;
                (symbol, result)
            });
        }

        let mut plans = Vec::new();
        let mut errors = 0usize;
        let mut analyzed = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Ok(plan)))) => {
                    analyzed += 1;
                    if plan.is_qualified() {
                        plans.push(plan);
                    }
                }
                Ok((symbol, Ok(Err(e)))) => {
                    errors += 1;
                    tracing::debug!(symbol = %symbol, error = %e, "scan: symbol skipped");
                }
                Ok((symbol, Err(_))) => {
                    errors += 1;
                    tracing::warn!(symbol = %symbol, "scan: symbol timed out");
                }
                Err(e) => {
                    errors += 1;
                    tracing::error!(error = %e, "scan: task panicked");
                }
            }
        }

        let qualified = plans.len();
        plans.sort_by(|a, b| {
            b.assessment
                .quality
                .cmp(&a.assessment.quality)
                .then_with(|| {
                    b.assessment
                        .rr
                        .ratio
                        .partial_cmp(&a.assessment.rr.ratio)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        plans.truncate(max_results);

        tracing::info!(
            universe = universe.as_str(),
            scanned = symbols.len(),
            qualified,
            errors,
            "trade scan complete"
        );

        Ok(ScanResult {
            schema_version: RESULT_SCHEMA_VERSION,
            universe,
            scanned: symbols.len(),
            errors,
            qualification_rate: if analyzed > 0 {
                qualified as f64 / analyzed as f64
            } else {
                0.0
            },
            duration_seconds: started.elapsed().as_secs_f64(),
            plans,
            timestamp: Utc::now(),
        })
    }

    pub async fn screen(
        &self,
        universe: UniverseName,
        criteria: ScreenCriteria,
        limit: usize,
        period: Period,
    ) -> EngineResult<ScreenResult> {
        let started = Instant::now();
        let symbols = universe.symbols();

        let mut tasks = JoinSet::new();
        for symbol in symbols {
            let orchestrator = Arc::clone(&self.orchestrator);
            let symbol = symbol.to_string();
            let semaphore = orchestrator.semaphore();
            let timeout = orchestrator.symbol_timeout();
            tasks.spawn(async move {
                tokio::task::yield_now().await;
                let _permit = semaphore.acquire_owned().await;
                let result =
                    tokio::time::timeout(timeout, orchestrator.pipeline(&symbol, period)).await;
                (symbol, result)
            });
        }

        let mut rows = Vec::new();
        let mut errors = 0usize;
        let mut analyzed = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, Ok(Ok(pipeline)))) => {
                    analyzed += 1;
                    let row = Self::row(&symbol, &pipeline);
                    if criteria.matches(&pipeline, &row) {
                        rows.push(row);
                    }
                }
                Ok((symbol, Ok(Err(e)))) => {
                    errors += 1;
                    tracing::debug!(symbol = %symbol, error = %e, "screen: symbol skipped");
                }
                Ok((symbol, Err(_))) => {
                    errors += 1;
                    tracing::warn!(symbol = %symbol, "screen: symbol timed out");
                }
                Err(e) => {
                    errors += 1;
                    tracing::error!(error = %e, "screen: task panicked");
                }
            }
        }

        let passed = rows.len();
        rows.sort_by(|a, b| {
            b.avg_score
                .partial_cmp(&a.avg_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows.truncate(limit);

        Ok(ScreenResult {
            schema_version: RESULT_SCHEMA_VERSION,
            universe,
            scanned: symbols.len(),
            errors,
            qualification_rate: if analyzed > 0 {
                passed as f64 / analyzed as f64
            } else {
                0.0
            },
            duration_seconds: started.elapsed().as_secs_f64(),
            rows,
            timestamp: Utc::now(),
        })
    }

    fn row(symbol: &str, pipeline: &SymbolPipeline) -> ScreenRow {
        let signals = &pipeline.signals;
        let bullish = signals
            .iter()
            .filter(|s| s.signal.strength.is_bullish())
            .count();
        let bearish = signals
            .iter()
            .filter(|s| s.signal.strength.is_bearish())
            .count();
        ScreenRow {
            symbol: symbol.to_string(),
            price: pipeline.series.last_close().unwrap_or_default(),
            change_percent: pipeline.series.change_percent(),
            avg_score: if signals.is_empty() {
                0.0
            } else {
                signals.iter().map(|s| s.score).sum::<f64>() / signals.len() as f64
            },
            signal_count: signals.len(),
            bullish_count: bullish,
            bearish_count: bearish,
            rsi: IndicatorSet::last(&pipeline.indicators.rsi_14),
            adx: IndicatorSet::last(&pipeline.indicators.adx.adx),
            volume_ratio: pipeline.indicators.volume_ratio(),
            top_signals: signals.iter().take(5).map(|s| s.signal.name.clone()).collect(),
        }
    }
}
