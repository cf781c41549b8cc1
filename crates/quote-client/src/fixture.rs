use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use engine_core::{EngineError, EngineResult, OptionChain, Period, QuoteSource, Series};

/// In-memory `QuoteSource` serving pre-loaded fixtures. Used by tests across
/// the workspace and for offline development.
#[derive(Default)]
pub struct FixtureQuoteSource {
    series: DashMap<String, Series>,
    chains: DashMap<String, OptionChain>,
    /// Symbols that simulate an upstream failure.
    failing: DashMap<String, String>,
}

impl FixtureQuoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_series(&self, series: Series) {
        let key = format!("{}:{}", series.symbol, series.period.as_str());
        self.series.insert(key, series);
    }

    /// Register the same bars under every period so callers with differing
    /// defaults all resolve.
    pub fn insert_series_all_periods(&self, series: &Series) {
        for period in [
            Period::M15,
            Period::H1,
            Period::H4,
            Period::D1,
            Period::D5,
            Period::Mo1,
            Period::Mo3,
            Period::Mo6,
            Period::Y1,
            Period::Y2,
            Period::Y5,
            Period::Y10,
            Period::Ytd,
            Period::Max,
        ] {
            let mut s = series.clone();
            s.period = period;
            self.insert_series(s);
        }
    }

    pub fn insert_chain(&self, chain: OptionChain) {
        self.chains.insert(chain.symbol.clone(), chain);
    }

    pub fn fail_symbol(&self, symbol: &str, message: &str) {
        self.failing.insert(symbol.to_string(), message.to_string());
    }
}

#[async_trait]
impl QuoteSource for FixtureQuoteSource {
    async fn fetch(&self, symbol: &str, period: Period) -> EngineResult<Series> {
        if let Some(msg) = self.failing.get(symbol) {
            return Err(EngineError::DataFetch(msg.clone()));
        }
        let key = format!("{}:{}", symbol, period.as_str());
        self.series
            .get(&key)
            .map(|s| s.clone())
            .ok_or_else(|| EngineError::DataFetch(format!("no fixture for {key}")))
    }

    async fn fetch_chain(
        &self,
        symbol: &str,
        _expiration: Option<NaiveDate>,
    ) -> EngineResult<OptionChain> {
        if let Some(msg) = self.failing.get(symbol) {
            return Err(EngineError::DataFetch(msg.clone()));
        }
        self.chains
            .get(symbol)
            .map(|c| c.clone())
            .ok_or_else(|| EngineError::OptionDataUnavailable(format!("no chain fixture for {symbol}")))
    }
}
