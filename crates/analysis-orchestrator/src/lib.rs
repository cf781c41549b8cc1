use chrono::{DateTime, Utc};
use engine_core::{
    EngineError, EngineResult, Period, QuoteSource, RankedSignal, Series, TradePlan,
    MIN_BARS, RESULT_SCHEMA_VERSION,
};
use llm_scorer::{CompactSignal, LlmAssessment, LlmScorer, ScoreRequest};
use risk_engine::RiskAssessor;
use serde::{Deserialize, Serialize};
use signal_engine::{detect_signals, rank_signals, FibonacciAnalysis, FibonacciEngine, IndicatorSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub mod brief;
pub mod scanner;

pub use brief::{BriefGenerator, MorningBrief};
pub use scanner::{ScanResult, ScreenCriteria, ScreenResult, TradeScanner};

/// Default in-flight bound for universe fan-outs.
pub const DEFAULT_SCAN_CONCURRENCY: usize = 10;

/// Default budget for one per-symbol pipeline inside a fan-out.
pub const DEFAULT_SYMBOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Full per-symbol analysis payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAnalysis {
    pub schema_version: u32,
    pub symbol: String,
    pub period: Period,
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub change_percent: Option<f64>,
    pub signals: Vec<RankedSignal>,
    pub indicators: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_assessment: Option<LlmAssessment>,
}

/// Per-symbol pipeline state shared by every operation: fetched series,
/// computed indicators, detected + ranked signals.
pub struct SymbolPipeline {
    pub series: Series,
    pub indicators: IndicatorSet,
    pub signals: Vec<RankedSignal>,
}

/// Drives the analysis pipeline: quotes in, ranked signals and derived
/// products out. Owns the fan-out semaphore so universe operations share
/// one in-flight budget.
pub struct AnalysisOrchestrator {
    quotes: Arc<dyn QuoteSource>,
    llm: Option<Arc<dyn LlmScorer>>,
    scan_semaphore: Arc<Semaphore>,
    symbol_timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            quotes,
            llm: None,
            scan_semaphore: Arc::new(Semaphore::new(DEFAULT_SCAN_CONCURRENCY)),
            symbol_timeout: DEFAULT_SYMBOL_TIMEOUT,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmScorer>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_concurrency(mut self, permits: usize) -> Self {
        self.scan_semaphore = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    pub fn with_symbol_timeout(mut self, timeout: Duration) -> Self {
        self.symbol_timeout = timeout;
        self
    }

    pub fn quotes(&self) -> Arc<dyn QuoteSource> {
        Arc::clone(&self.quotes)
    }

    pub(crate) fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.scan_semaphore)
    }

    pub(crate) fn symbol_timeout(&self) -> Duration {
        self.symbol_timeout
    }

    /// Fetch and run the deterministic half of the pipeline for one symbol.
    pub async fn pipeline(&self, symbol: &str, period: Period) -> EngineResult<SymbolPipeline> {
        let series = self.quotes.fetch(symbol, period).await?;
        series.ensure_min_bars(MIN_BARS)?;

        let indicators = IndicatorSet::compute(&series.bars);
        let mut signals = detect_signals(&series.bars, &indicators);

        // Fibonacci rules join the bar rules before ranking.
        let atr = IndicatorSet::last(&indicators.atr_14).unwrap_or(0.0);
        let fib = FibonacciEngine::analyze(symbol, &series.bars, atr);
        signals.extend(fib.signals);

        let signals = rank_signals(signals);
        Ok(SymbolPipeline {
            series,
            indicators,
            signals,
        })
    }

    /// `analyze_security`: ranked signals plus an indicator snapshot, with
    /// an optional LLM overlay that never replaces the deterministic list.
    pub async fn analyze_security(
        &self,
        symbol: &str,
        period: Period,
        use_ai: bool,
    ) -> EngineResult<SecurityAnalysis> {
        let pipeline = self.pipeline(symbol, period).await?;

        let mut analysis = SecurityAnalysis {
            schema_version: RESULT_SCHEMA_VERSION,
            symbol: symbol.to_string(),
            period,
            timestamp: Utc::now(),
            current_price: pipeline.series.last_close().unwrap_or_default(),
            change_percent: pipeline.series.change_percent(),
            indicators: pipeline.indicators.snapshot(),
            signals: pipeline.signals,
            ai_assessment: None,
        };

        if use_ai {
            analysis.ai_assessment = self.ai_overlay(&analysis).await;
        }

        Ok(analysis)
    }

    /// LLM overlay; any failure is logged and swallowed so callers always
    /// keep the deterministic baseline.
    async fn ai_overlay(&self, analysis: &SecurityAnalysis) -> Option<LlmAssessment> {
        let llm = self.llm.as_ref()?;
        let request = ScoreRequest {
            symbol: analysis.symbol.clone(),
            current_price: analysis.current_price,
            indicators: analysis.indicators.clone(),
            signals: analysis
                .signals
                .iter()
                .take(20)
                .map(CompactSignal::from_ranked)
                .collect(),
        };

        match llm.score_signals(&request).await {
            Ok(assessment) => Some(assessment),
            Err(e) => {
                tracing::warn!(symbol = %analysis.symbol, error = %e, "LLM overlay unavailable, using deterministic scores");
                None
            }
        }
    }

    /// Free-form LLM narration; `None` on any failure or when no scorer is
    /// configured, so callers always have a deterministic fallback.
    pub async fn explain(&self, context: &str) -> Option<String> {
        let llm = self.llm.as_ref()?;
        match llm.explain(context).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "LLM explanation unavailable");
                None
            }
        }
    }

    /// `get_trade_plan`: pipeline plus the risk assessment.
    pub async fn trade_plan(&self, symbol: &str, period: Period) -> EngineResult<TradePlan> {
        let pipeline = self.pipeline(symbol, period).await?;
        RiskAssessor::assess(&pipeline.series, &pipeline.indicators, &pipeline.signals)
    }

    /// `analyze_fibonacci`: multi-window levels over the last `window` bars.
    pub async fn fibonacci(
        &self,
        symbol: &str,
        period: Period,
        window: usize,
    ) -> EngineResult<FibonacciAnalysis> {
        let series = self.quotes.fetch(symbol, period).await?;
        series.ensure_min_bars(MIN_BARS)?;

        let bars = if series.bars.len() > window {
            &series.bars[series.bars.len() - window..]
        } else {
            &series.bars[..]
        };
        let indicators = IndicatorSet::compute(bars);
        let atr = IndicatorSet::last(&indicators.atr_14).unwrap_or(0.0);
        Ok(FibonacciEngine::analyze(symbol, bars, atr))
    }

    /// `compare_securities`: side-by-side ranking of up to ten symbols.
    pub async fn compare(
        &self,
        symbols: &[String],
        metric: &str,
        period: Period,
    ) -> EngineResult<CompareResult> {
        if symbols.is_empty() || symbols.len() > 10 {
            return Err(EngineError::Validation(
                "compare_securities takes between 1 and 10 symbols".to_string(),
            ));
        }
        let metric = CompareMetric::parse(metric)?;

        let mut entries = Vec::new();
        let mut errors = Vec::new();
        for symbol in symbols {
            match self.pipeline(symbol, period).await {
                Ok(pipeline) => entries.push(CompareEntry::from_pipeline(symbol, &pipeline)),
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "compare: symbol skipped");
                    errors.push(symbol.clone());
                }
            }
        }

        entries.sort_by(|a, b| {
            metric
                .key(b)
                .partial_cmp(&metric.key(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(CompareResult {
            schema_version: RESULT_SCHEMA_VERSION,
            metric,
            entries,
            skipped: errors,
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMetric {
    Signals,
    Score,
    Rsi,
    Trend,
}

impl CompareMetric {
    pub fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "signals" => Ok(CompareMetric::Signals),
            "score" => Ok(CompareMetric::Score),
            "rsi" => Ok(CompareMetric::Rsi),
            "trend" => Ok(CompareMetric::Trend),
            other => Err(EngineError::Validation(format!(
                "unknown compare metric '{other}'"
            ))),
        }
    }

    fn key(&self, entry: &CompareEntry) -> f64 {
        match self {
            CompareMetric::Signals => entry.bullish_count as f64 - entry.bearish_count as f64,
            CompareMetric::Score => entry.avg_score,
            CompareMetric::Rsi => entry.rsi.unwrap_or(50.0),
            CompareMetric::Trend => entry.adx.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareEntry {
    pub symbol: String,
    pub current_price: f64,
    pub change_percent: Option<f64>,
    pub signal_count: usize,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub avg_score: f64,
    pub rsi: Option<f64>,
    pub adx: Option<f64>,
    pub top_signal: Option<String>,
}

impl CompareEntry {
    fn from_pipeline(symbol: &str, pipeline: &SymbolPipeline) -> Self {
        let signals = &pipeline.signals;
        let bullish = signals
            .iter()
            .filter(|s| s.signal.strength.is_bullish())
            .count();
        let bearish = signals
            .iter()
            .filter(|s| s.signal.strength.is_bearish())
            .count();
        let avg_score = if signals.is_empty() {
            0.0
        } else {
            signals.iter().map(|s| s.score).sum::<f64>() / signals.len() as f64
        };

        Self {
            symbol: symbol.to_string(),
            current_price: pipeline.series.last_close().unwrap_or_default(),
            change_percent: pipeline.series.change_percent(),
            signal_count: signals.len(),
            bullish_count: bullish,
            bearish_count: bearish,
            avg_score,
            rsi: IndicatorSet::last(&pipeline.indicators.rsi_14),
            adx: IndicatorSet::last(&pipeline.indicators.adx.adx),
            top_signal: signals.first().map(|s| s.signal.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareResult {
    pub schema_version: u32,
    pub metric: CompareMetric,
    pub entries: Vec<CompareEntry>,
    pub skipped: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use engine_core::Bar;
    use quote_client::FixtureQuoteSource;

    pub(crate) fn bars_with_final_breakout(n: usize, base: f64) -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..n - 1)
            .map(|i| Bar {
                timestamp: Utc::now() - ChronoDuration::days((n - i) as i64),
                open: base,
                high: base + 0.5,
                low: base - 0.5,
                close: base,
                volume: 1_000_000.0,
            })
            .collect();
        bars.push(Bar {
            timestamp: Utc::now(),
            open: base,
            high: base * 1.045,
            low: base - 0.5,
            close: base * 1.04,
            volume: 2_500_000.0,
        });
        bars
    }

    fn fixture_with(symbol: &str, bars: Vec<Bar>) -> Arc<FixtureQuoteSource> {
        let fixture = Arc::new(FixtureQuoteSource::new());
        fixture.insert_series_all_periods(&Series::new(symbol, Period::Mo1, bars));
        fixture
    }

    #[tokio::test]
    async fn analyze_security_surfaces_golden_cross() {
        let fixture = fixture_with("AAPL", bars_with_final_breakout(260, 100.0));
        let orchestrator = AnalysisOrchestrator::new(fixture);
        let analysis = orchestrator
            .analyze_security("AAPL", Period::Mo1, false)
            .await
            .unwrap();

        let golden = analysis
            .signals
            .iter()
            .find(|s| s.signal.name == "GOLDEN_CROSS")
            .expect("golden cross in signals");
        assert!(golden.score >= 85.0);
        assert!(analysis.ai_assessment.is_none());
        assert_eq!(analysis.schema_version, RESULT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn analysis_is_deterministic_without_llm() {
        let fixture = fixture_with("AAPL", bars_with_final_breakout(260, 100.0));
        let orchestrator = AnalysisOrchestrator::new(fixture);

        let a = orchestrator
            .analyze_security("AAPL", Period::Mo1, false)
            .await
            .unwrap();
        let b = orchestrator
            .analyze_security("AAPL", Period::Mo1, false)
            .await
            .unwrap();

        let names_a: Vec<(&str, u64)> = a
            .signals
            .iter()
            .map(|s| (s.signal.name.as_str(), s.score.to_bits()))
            .collect();
        let names_b: Vec<(&str, u64)> = b
            .signals
            .iter()
            .map(|s| (s.signal.name.as_str(), s.score.to_bits()))
            .collect();
        assert_eq!(names_a, names_b);
    }

    #[tokio::test]
    async fn shuffled_bars_produce_identical_signals() {
        let bars = bars_with_final_breakout(260, 100.0);
        let mut shuffled = bars.clone();
        shuffled.reverse();
        shuffled.swap(10, 200);

        let sorted_fixture = fixture_with("AAPL", bars);
        let shuffled_fixture = fixture_with("AAPL", shuffled);

        let a = AnalysisOrchestrator::new(sorted_fixture)
            .analyze_security("AAPL", Period::Mo1, false)
            .await
            .unwrap();
        let b = AnalysisOrchestrator::new(shuffled_fixture)
            .analyze_security("AAPL", Period::Mo1, false)
            .await
            .unwrap();

        let names_a: Vec<&str> = a.signals.iter().map(|s| s.signal.name.as_str()).collect();
        let names_b: Vec<&str> = b.signals.iter().map(|s| s.signal.name.as_str()).collect();
        assert_eq!(names_a, names_b);
    }

    #[tokio::test]
    async fn short_series_is_insufficient() {
        let fixture = fixture_with("PENNY", bars_with_final_breakout(30, 5.0));
        let orchestrator = AnalysisOrchestrator::new(fixture);
        let err = orchestrator
            .analyze_security("PENNY", Period::Mo1, false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn compare_sorts_by_requested_metric() {
        let fixture = Arc::new(FixtureQuoteSource::new());
        fixture.insert_series_all_periods(&Series::new(
            "HOT",
            Period::Mo3,
            bars_with_final_breakout(260, 100.0),
        ));
        // Flat symbol: no breakout bar.
        let flat: Vec<Bar> = (0..260)
            .map(|i| Bar {
                timestamp: Utc::now() - ChronoDuration::days((260 - i) as i64),
                open: 50.0,
                high: 50.3,
                low: 49.7,
                close: 50.0,
                volume: 500_000.0,
            })
            .collect();
        fixture.insert_series_all_periods(&Series::new("COLD", Period::Mo3, flat));

        let orchestrator = AnalysisOrchestrator::new(fixture);
        let result = orchestrator
            .compare(
                &["COLD".to_string(), "HOT".to_string()],
                "signals",
                Period::Mo3,
            )
            .await
            .unwrap();

        assert_eq!(result.entries[0].symbol, "HOT");
        assert!(result.skipped.is_empty());
    }

    #[tokio::test]
    async fn compare_rejects_oversized_lists() {
        let fixture = Arc::new(FixtureQuoteSource::new());
        let orchestrator = AnalysisOrchestrator::new(fixture);
        let symbols: Vec<String> = (0..11).map(|i| format!("S{i}")).collect();
        let err = orchestrator
            .compare(&symbols, "signals", Period::Mo3)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn compare_skips_failing_symbols() {
        let fixture = Arc::new(FixtureQuoteSource::new());
        fixture.insert_series_all_periods(&Series::new(
            "GOOD",
            Period::Mo3,
            bars_with_final_breakout(260, 100.0),
        ));
        fixture.fail_symbol("BAD", "vendor down");

        let orchestrator = AnalysisOrchestrator::new(fixture);
        let result = orchestrator
            .compare(
                &["GOOD".to_string(), "BAD".to_string()],
                "score",
                Period::Mo3,
            )
            .await
            .unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.skipped, vec!["BAD".to_string()]);
    }
}
