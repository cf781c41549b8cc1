use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::EngineResult;
use crate::types::{OptionChain, Period, Series};

/// Capability interface over the market-data vendor. The engine never
/// imports the vendor directly; the production adapter lives in
/// `quote-client` and tests use a fixture implementation.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch OHLCV bars for a symbol over a period.
    async fn fetch(&self, symbol: &str, period: Period) -> EngineResult<Series>;

    /// Fetch the option chain snapshot, optionally narrowed to one expiration.
    async fn fetch_chain(
        &self,
        symbol: &str,
        expiration: Option<NaiveDate>,
    ) -> EngineResult<OptionChain>;
}
