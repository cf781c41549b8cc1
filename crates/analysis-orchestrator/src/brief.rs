use chrono::{DateTime, Utc};
use engine_core::{EngineResult, Outlook, Period, TradeAction, RESULT_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::AnalysisOrchestrator;

/// Index ETFs summarized in the market status block.
const INDEX_SYMBOLS: [&str; 3] = ["SPY", "QQQ", "DIA"];

/// Volatility index symbol at the quote vendor.
const VIX_SYMBOL: &str = "VIX";

/// Sector SPDRs tracked in the rotation table.
const SECTOR_ETFS: [(&str, &str); 10] = [
    ("XLK", "Technology"),
    ("XLF", "Financials"),
    ("XLV", "Healthcare"),
    ("XLE", "Energy"),
    ("XLY", "Consumer Discretionary"),
    ("XLP", "Consumer Staples"),
    ("XLI", "Industrials"),
    ("XLB", "Materials"),
    ("XLU", "Utilities"),
    ("XLRE", "Real Estate"),
];

/// Default watchlist: top mega-caps by market cap.
pub const DEFAULT_WATCHLIST: [&str; 10] = [
    "AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "BRK.B", "LLY", "AVGO", "TSLA",
];

const TECH_WATCHLIST: [&str; 7] = ["AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "AVGO"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexQuote {
    pub symbol: String,
    pub price: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStatus {
    pub indices: Vec<IndexQuote>,
    pub vix: Option<f64>,
    pub sentiment: Outlook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorPerformance {
    pub etf: String,
    pub sector: String,
    pub change_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub price: f64,
    pub change_percent: Option<f64>,
    pub action: TradeAction,
    pub avg_score: f64,
    pub top_signal: Option<String>,
}

/// Aggregated pre-market brief. Individual fetch failures elide entries;
/// the brief itself always materializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MorningBrief {
    pub schema_version: u32,
    pub market: MarketStatus,
    pub sectors: Vec<SectorPerformance>,
    pub watchlist: Vec<WatchlistEntry>,
    pub themes: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

pub struct BriefGenerator {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl BriefGenerator {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn generate(
        &self,
        watchlist: Option<Vec<String>>,
        period: Period,
    ) -> EngineResult<MorningBrief> {
        let quotes = self.orchestrator.quotes();

        // Market status block.
        let mut indices = Vec::new();
        for symbol in INDEX_SYMBOLS {
            match quotes.fetch(symbol, Period::D5).await {
                Ok(series) => {
                    if let Some(price) = series.last_close() {
                        indices.push(IndexQuote {
                            symbol: symbol.to_string(),
                            price,
                            change_percent: series.change_percent().unwrap_or(0.0),
                        });
                    }
                }
                Err(e) => tracing::warn!(symbol, error = %e, "brief: index fetch failed"),
            }
        }

        let vix = match quotes.fetch(VIX_SYMBOL, Period::D5).await {
            Ok(series) => series.last_close(),
            Err(e) => {
                tracing::warn!(error = %e, "brief: VIX fetch failed");
                None
            }
        };

        let spy_change = indices
            .iter()
            .find(|q| q.symbol == "SPY")
            .map(|q| q.change_percent)
            .unwrap_or(0.0);
        let sentiment = Self::classify_sentiment(spy_change, vix);

        // Sector rotation table, best to worst.
        let mut sectors = Vec::new();
        for (etf, sector) in SECTOR_ETFS {
            match quotes.fetch(etf, Period::D5).await {
                Ok(series) => {
                    if let Some(change) = series.change_percent() {
                        sectors.push(SectorPerformance {
                            etf: etf.to_string(),
                            sector: sector.to_string(),
                            change_percent: change,
                        });
                    }
                }
                Err(e) => tracing::debug!(etf, error = %e, "brief: sector fetch failed"),
            }
        }
        sectors.sort_by(|a, b| {
            b.change_percent
                .partial_cmp(&a.change_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Watchlist sweep through the shared fan-out budget.
        let symbols: Vec<String> = watchlist
            .unwrap_or_else(|| DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect());
        let watchlist_entries = self.watchlist_entries(&symbols, period).await;

        let themes = Self::themes(&sectors, &watchlist_entries, vix);

        Ok(MorningBrief {
            schema_version: RESULT_SCHEMA_VERSION,
            market: MarketStatus {
                indices,
                vix,
                sentiment,
            },
            sectors,
            watchlist: watchlist_entries,
            themes,
            timestamp: Utc::now(),
        })
    }

    fn classify_sentiment(spy_change: f64, vix: Option<f64>) -> Outlook {
        match vix {
            Some(vix) if spy_change > 0.5 && vix < 15.0 => Outlook::Bullish,
            Some(vix) if spy_change < -0.5 && vix > 20.0 => Outlook::Bearish,
            _ => Outlook::Neutral,
        }
    }

    async fn watchlist_entries(&self, symbols: &[String], period: Period) -> Vec<WatchlistEntry> {
        let mut tasks = JoinSet::new();
        for symbol in symbols {
            let orchestrator = Arc::clone(&self.orchestrator);
            let symbol = symbol.clone();
            let semaphore = orchestrator.semaphore();
            tasks.spawn(async move {
                tokio::task::yield_now().await;
                let _permit = semaphore.acquire_owned().await;
                let result = orchestrator.pipeline(&symbol, period).await;
                (symbol, result)
            });
        }

        let mut entries = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((symbol, result)) = joined else {
                continue;
            };
            match result {
                Ok(pipeline) => {
                    let bullish = pipeline
                        .signals
                        .iter()
                        .filter(|s| s.signal.strength.is_bullish())
                        .count() as i64;
                    let bearish = pipeline
                        .signals
                        .iter()
                        .filter(|s| s.signal.strength.is_bearish())
                        .count() as i64;
                    let action = if bullish - bearish >= 2 {
                        TradeAction::Buy
                    } else if bearish - bullish >= 2 {
                        TradeAction::Sell
                    } else {
                        TradeAction::Hold
                    };
                    let avg_score = if pipeline.signals.is_empty() {
                        0.0
                    } else {
                        pipeline.signals.iter().map(|s| s.score).sum::<f64>()
                            / pipeline.signals.len() as f64
                    };
                    entries.push(WatchlistEntry {
                        symbol,
                        price: pipeline.series.last_close().unwrap_or_default(),
                        change_percent: pipeline.series.change_percent(),
                        action,
                        avg_score,
                        top_signal: pipeline.signals.first().map(|s| s.signal.name.clone()),
                    });
                }
                Err(e) => tracing::debug!(symbol = %symbol, error = %e, "brief: watchlist symbol elided"),
            }
        }

        entries.sort_by(|a, b| {
            b.avg_score
                .partial_cmp(&a.avg_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries
    }

    fn themes(
        sectors: &[SectorPerformance],
        watchlist: &[WatchlistEntry],
        vix: Option<f64>,
    ) -> Vec<String> {
        let mut themes = Vec::new();

        let tech_buys = watchlist
            .iter()
            .filter(|e| TECH_WATCHLIST.contains(&e.symbol.as_str()) && e.action == TradeAction::Buy)
            .count();
        let xlk_leading = sectors
            .iter()
            .take(3)
            .any(|s| s.etf == "XLK");
        if tech_buys >= 3 && xlk_leading {
            themes.push("TECH_STRENGTH".to_string());
        }

        if let (Some(leader), Some(laggard)) = (sectors.first(), sectors.last()) {
            if leader.change_percent - laggard.change_percent > 2.0 {
                themes.push("SECTOR_ROTATION".to_string());
            }
        }

        match vix {
            Some(vix) if vix < 15.0 => themes.push("RISK_ON".to_string()),
            Some(vix) if vix > 20.0 => themes.push("RISK_OFF".to_string()),
            _ => {}
        }

        themes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use engine_core::Bar;
    use engine_core::Series;
    use quote_client::FixtureQuoteSource;

    fn series_with_change(symbol: &str, base: f64, change_pct: f64, n: usize) -> Series {
        let bars: Vec<Bar> = (0..n)
            .map(|i| {
                let close = if i == n - 1 {
                    base * (1.0 + change_pct / 100.0)
                } else {
                    base
                };
                Bar {
                    timestamp: Utc::now() - ChronoDuration::days((n - i) as i64),
                    open: base,
                    high: close.max(base) + 0.5,
                    low: close.min(base) - 0.5,
                    close,
                    volume: 1_000_000.0,
                }
            })
            .collect();
        Series::new(symbol, Period::D5, bars)
    }

    fn brief_fixture(vix: f64, spy_change: f64) -> Arc<AnalysisOrchestrator> {
        let fixture = Arc::new(FixtureQuoteSource::new());
        fixture.insert_series_all_periods(&series_with_change("SPY", 500.0, spy_change, 60));
        fixture.insert_series_all_periods(&series_with_change("QQQ", 430.0, 0.2, 60));
        fixture.insert_series_all_periods(&series_with_change("DIA", 390.0, 0.1, 60));
        fixture.insert_series_all_periods(&series_with_change("VIX", vix, 0.0, 60));
        // Two sectors only; the rest elide.
        fixture.insert_series_all_periods(&series_with_change("XLK", 200.0, 2.5, 60));
        fixture.insert_series_all_periods(&series_with_change("XLU", 70.0, -0.5, 60));
        // One watchlist name.
        fixture.insert_series_all_periods(&series_with_change("AAPL", 180.0, 1.0, 60));
        Arc::new(AnalysisOrchestrator::new(fixture))
    }

    #[tokio::test]
    async fn brief_survives_partial_failures() {
        let generator = BriefGenerator::new(brief_fixture(14.0, 1.0));
        let brief = generator.generate(None, Period::Mo1).await.unwrap();

        assert_eq!(brief.market.indices.len(), 3);
        assert_eq!(brief.sectors.len(), 2);
        // Only AAPL resolves from the default watchlist.
        assert_eq!(brief.watchlist.len(), 1);
        assert_eq!(brief.watchlist[0].symbol, "AAPL");
    }

    #[tokio::test]
    async fn bullish_sentiment_needs_calm_vix_and_green_spy() {
        let generator = BriefGenerator::new(brief_fixture(14.0, 1.0));
        let brief = generator.generate(None, Period::Mo1).await.unwrap();
        assert_eq!(brief.market.sentiment, Outlook::Bullish);
        assert!(brief.themes.contains(&"RISK_ON".to_string()));
    }

    #[tokio::test]
    async fn bearish_sentiment_needs_elevated_vix() {
        let generator = BriefGenerator::new(brief_fixture(24.0, -1.0));
        let brief = generator.generate(None, Period::Mo1).await.unwrap();
        assert_eq!(brief.market.sentiment, Outlook::Bearish);
        assert!(brief.themes.contains(&"RISK_OFF".to_string()));
    }

    #[tokio::test]
    async fn sector_rotation_theme_on_wide_dispersion() {
        // XLK +2.5 vs XLU -0.5: 3 point spread.
        let generator = BriefGenerator::new(brief_fixture(17.0, 0.1));
        let brief = generator.generate(None, Period::Mo1).await.unwrap();
        assert!(brief.themes.contains(&"SECTOR_ROTATION".to_string()));
        assert_eq!(brief.sectors[0].etf, "XLK");
    }

    #[tokio::test]
    async fn custom_watchlist_overrides_default() {
        let fixture = brief_fixture(16.0, 0.0);
        let generator = BriefGenerator::new(fixture);
        let brief = generator
            .generate(Some(vec!["AAPL".to_string()]), Period::Mo1)
            .await
            .unwrap();
        assert_eq!(brief.watchlist.len(), 1);
    }
}
