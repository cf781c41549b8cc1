use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use dashmap::DashMap;
use engine_core::{
    Bar, EngineError, EngineResult, OptionChain, OptionContract, OptionKind, Period, QuoteSource,
    Series,
};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub mod fixture;
pub use fixture::FixtureQuoteSource;

const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

/// Paces vendor calls to at most `max_requests` per `window` by handing out
/// evenly spaced send slots. Smoothing the budget over the whole window
/// avoids the burst-then-stall pattern that trips vendor-side limiters.
struct RequestPacer {
    next_slot: Mutex<Instant>,
    interval: Duration,
}

impl RequestPacer {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            next_slot: Mutex::new(Instant::now()),
            interval: window / max_requests.max(1) as u32,
        }
    }

    /// Claim the next send slot, sleeping until it comes up. Slots are
    /// assigned under the lock so concurrent callers queue in claim order.
    async fn wait_turn(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + self.interval;
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

/// Production quote adapter over a Polygon-style aggregates/chain API.
///
/// Bars and chains are cached per `(symbol, period, bar_bucket)` with a
/// 60s TTL intraday and 300s daily; a per-key async lock guarantees at
/// most one concurrent vendor fetch per fingerprint.
pub struct QuoteClient {
    api_key: String,
    base_url: String,
    client: Client,
    pacer: RequestPacer,
    bars_cache: DashMap<String, CacheEntry<Series>>,
    chain_cache: DashMap<String, CacheEntry<OptionChain>>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl QuoteClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let rate_limit: usize = std::env::var("QUOTE_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url,
            client,
            pacer: RequestPacer::new(rate_limit, Duration::from_secs(60)),
            bars_cache: DashMap::new(),
            chain_cache: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// Cache fingerprint: the current bar bucket changes when a new bar of
    /// the period's resolution opens, invalidating intraday entries promptly.
    fn cache_key(symbol: &str, period: Period) -> String {
        let bucket = Utc::now().timestamp() / period.bar_seconds();
        format!("{}:{}:{}", symbol, period.as_str(), bucket)
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Vendor request window for a period. Daily windows are padded so the
    /// 200-bar indicators have warm-up history.
    fn request_window(period: Period) -> (u32, &'static str, i64) {
        match period {
            Period::M15 => (15, "minute", 7),
            Period::H1 => (1, "hour", 30),
            Period::H4 => (4, "hour", 120),
            Period::D1 | Period::D5 | Period::Mo1 | Period::Ytd => (1, "day", 365),
            Period::Mo3 => (1, "day", 420),
            Period::Mo6 => (1, "day", 540),
            Period::Y1 => (1, "day", 650),
            Period::Y2 => (1, "day", 1000),
            Period::Y5 => (1, "day", 2100),
            Period::Y10 => (1, "day", 3900),
            Period::Max => (1, "day", 7300),
        }
    }

    /// Send with rate limiting and up to 3 attempts on transient failures
    /// (connect errors, timeouts, 429, 5xx) with exponential backoff. The
    /// caller only sees an error once the retry budget is exhausted.
    async fn send_with_retry(&self, url: &str, query: &[(&str, String)]) -> EngineResult<reqwest::Response> {
        let mut backoff = Duration::from_millis(250);
        let mut last_err = String::new();

        for attempt in 0..3u32 {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            self.pacer.wait_turn().await;

            let result = self.client.get(url).query(query).send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = format!("HTTP {status}");
                        tracing::warn!("vendor transient failure ({}), retry {}/3", last_err, attempt + 1);
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(EngineError::DataFetch(format!("HTTP {status}: {body}")));
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_err = e.to_string();
                    tracing::warn!("vendor connect failure ({}), retry {}/3", last_err, attempt + 1);
                }
                Err(e) => return Err(EngineError::DataFetch(e.to_string())),
            }
        }

        Err(EngineError::DataFetch(format!(
            "retries exhausted: {last_err}"
        )))
    }

    async fn fetch_bars_uncached(&self, symbol: &str, period: Period) -> EngineResult<Series> {
        let (multiplier, timespan, days_back) = Self::request_window(period);
        let to = Utc::now();
        let from = to - ChronoDuration::days(days_back);

        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            symbol,
            multiplier,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_with_retry(
                &url,
                &[
                    ("apiKey", self.api_key.clone()),
                    ("adjusted", "true".to_string()),
                    ("limit", "50000".to_string()),
                ],
            )
            .await?;

        let agg: AggregateResponse = response
            .json()
            .await
            .map_err(|e| EngineError::DataFetch(e.to_string()))?;

        let mut dropped = 0usize;
        let bars: Vec<Bar> = agg
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                DateTime::from_timestamp_millis(r.t).map(|timestamp| Bar {
                    timestamp,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .filter(|bar| {
                let ok = bar.is_well_formed();
                if !ok {
                    dropped += 1;
                }
                ok
            })
            .collect();
        if dropped > 0 {
            tracing::debug!(symbol, dropped, "dropped malformed vendor bars");
        }

        Ok(Series::new(symbol, period, bars))
    }

    async fn fetch_chain_uncached(
        &self,
        symbol: &str,
        expiration: Option<NaiveDate>,
    ) -> EngineResult<OptionChain> {
        let url = format!("{}/v3/snapshot/options/{}", self.base_url, symbol);
        let mut query = vec![
            ("apiKey", self.api_key.clone()),
            ("limit", "250".to_string()),
        ];
        if let Some(exp) = expiration {
            query.push(("expiration_date", exp.format("%Y-%m-%d").to_string()));
        }

        let response = self.send_with_retry(&url, &query).await?;
        let snap: ChainResponse = response
            .json()
            .await
            .map_err(|e| EngineError::DataFetch(e.to_string()))?;

        let mut underlying_price = 0.0;
        let mut contracts = Vec::new();
        for r in snap.results.unwrap_or_default() {
            if let Some(p) = r.underlying_asset.as_ref().and_then(|u| u.price) {
                underlying_price = p;
            }
            let details = match r.details {
                Some(d) => d,
                None => continue,
            };
            let kind = match details.contract_type.as_str() {
                "call" => OptionKind::Call,
                "put" => OptionKind::Put,
                _ => continue,
            };
            let expiration_date = match NaiveDate::parse_from_str(&details.expiration_date, "%Y-%m-%d") {
                Ok(d) => d,
                Err(_) => continue,
            };
            let greeks = r.greeks.unwrap_or_default();
            let quote = r.last_quote.unwrap_or_default();
            contracts.push(OptionContract {
                contract: details.ticker,
                kind,
                strike: details.strike_price,
                expiration: expiration_date,
                bid: quote.bid.unwrap_or(0.0),
                ask: quote.ask.unwrap_or(0.0),
                last: r.last_trade.and_then(|t| t.price).unwrap_or(0.0),
                implied_volatility: r.implied_volatility.unwrap_or(0.0),
                delta: greeks.delta.unwrap_or(0.0),
                gamma: greeks.gamma.unwrap_or(0.0),
                theta: greeks.theta.unwrap_or(0.0),
                vega: greeks.vega.unwrap_or(0.0),
                open_interest: r.open_interest.unwrap_or(0),
                volume: r.day.and_then(|d| d.volume).unwrap_or(0),
            });
        }

        if contracts.is_empty() {
            return Err(EngineError::OptionDataUnavailable(format!(
                "no option contracts returned for {symbol}"
            )));
        }

        let mut expirations: Vec<NaiveDate> = contracts.iter().map(|c| c.expiration).collect();
        expirations.sort();
        expirations.dedup();

        Ok(OptionChain {
            symbol: symbol.to_string(),
            underlying_price,
            expirations,
            contracts,
        })
    }
}

#[async_trait]
impl QuoteSource for QuoteClient {
    async fn fetch(&self, symbol: &str, period: Period) -> EngineResult<Series> {
        let key = Self::cache_key(symbol, period);
        let ttl = period.cache_ttl_secs();

        if let Some(entry) = self.bars_cache.get(&key) {
            if (Utc::now() - entry.cached_at).num_seconds() < ttl {
                return Ok(entry.data.clone());
            }
        }

        // Single-flight: at most one concurrent vendor fetch per fingerprint.
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;
        if let Some(entry) = self.bars_cache.get(&key) {
            if (Utc::now() - entry.cached_at).num_seconds() < ttl {
                return Ok(entry.data.clone());
            }
        }

        let series = self.fetch_bars_uncached(symbol, period).await?;
        self.bars_cache.insert(
            key,
            CacheEntry {
                data: series.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(series)
    }

    async fn fetch_chain(
        &self,
        symbol: &str,
        expiration: Option<NaiveDate>,
    ) -> EngineResult<OptionChain> {
        let key = format!(
            "{}:{}",
            symbol,
            expiration.map(|e| e.to_string()).unwrap_or_default()
        );

        if let Some(entry) = self.chain_cache.get(&key) {
            if (Utc::now() - entry.cached_at).num_seconds() < 60 {
                return Ok(entry.data.clone());
            }
        }

        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;
        if let Some(entry) = self.chain_cache.get(&key) {
            if (Utc::now() - entry.cached_at).num_seconds() < 60 {
                return Ok(entry.data.clone());
            }
        }

        let chain = self.fetch_chain_uncached(symbol, expiration).await?;
        self.chain_cache.insert(
            key,
            CacheEntry {
                data: chain.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(chain)
    }
}

// --- Vendor wire types ------------------------------------------------------

#[derive(Deserialize)]
struct AggregateResponse {
    results: Option<Vec<AggregateBar>>,
}

#[derive(Deserialize)]
struct AggregateBar {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(Deserialize)]
struct ChainResponse {
    results: Option<Vec<ChainRow>>,
}

#[derive(Deserialize)]
struct ChainRow {
    details: Option<ChainDetails>,
    greeks: Option<ChainGreeks>,
    implied_volatility: Option<f64>,
    open_interest: Option<i64>,
    last_quote: Option<ChainQuote>,
    last_trade: Option<ChainTrade>,
    day: Option<ChainDay>,
    underlying_asset: Option<ChainUnderlying>,
}

#[derive(Deserialize)]
struct ChainDetails {
    ticker: String,
    contract_type: String,
    strike_price: f64,
    expiration_date: String,
}

#[derive(Deserialize, Default)]
struct ChainGreeks {
    delta: Option<f64>,
    gamma: Option<f64>,
    theta: Option<f64>,
    vega: Option<f64>,
}

#[derive(Deserialize, Default)]
struct ChainQuote {
    bid: Option<f64>,
    ask: Option<f64>,
}

#[derive(Deserialize)]
struct ChainTrade {
    price: Option<f64>,
}

#[derive(Deserialize)]
struct ChainDay {
    volume: Option<i64>,
}

#[derive(Deserialize)]
struct ChainUnderlying {
    price: Option<f64>,
}
