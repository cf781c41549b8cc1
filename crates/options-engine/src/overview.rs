use engine_core::{OptionChain, OptionKind};
use serde::{Deserialize, Serialize};

/// Chain-wide summary served when no spread structure is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOverview {
    pub symbol: String,
    pub underlying_price: f64,
    pub expirations: Vec<chrono::NaiveDate>,
    pub total_call_volume: i64,
    pub total_put_volume: i64,
    pub total_call_oi: i64,
    pub total_put_oi: i64,
    pub put_call_volume_ratio: Option<f64>,
    pub avg_implied_volatility: Option<f64>,
    pub max_pain: Option<f64>,
}

pub fn chain_overview(chain: &OptionChain) -> ChainOverview {
    let mut call_volume = 0i64;
    let mut put_volume = 0i64;
    let mut call_oi = 0i64;
    let mut put_oi = 0i64;
    let mut iv_sum = 0.0;
    let mut iv_count = 0usize;

    for c in &chain.contracts {
        match c.kind {
            OptionKind::Call => {
                call_volume += c.volume;
                call_oi += c.open_interest;
            }
            OptionKind::Put => {
                put_volume += c.volume;
                put_oi += c.open_interest;
            }
        }
        if c.implied_volatility > 0.0 {
            iv_sum += c.implied_volatility;
            iv_count += 1;
        }
    }

    ChainOverview {
        symbol: chain.symbol.clone(),
        underlying_price: chain.underlying_price,
        expirations: chain.expirations.clone(),
        total_call_volume: call_volume,
        total_put_volume: put_volume,
        total_call_oi: call_oi,
        total_put_oi: put_oi,
        put_call_volume_ratio: (call_volume > 0).then(|| put_volume as f64 / call_volume as f64),
        avg_implied_volatility: (iv_count > 0).then(|| iv_sum / iv_count as f64),
        max_pain: max_pain(chain),
    }
}

/// Strike at which the aggregate intrinsic payout to option holders is
/// smallest at expiration.
fn max_pain(chain: &OptionChain) -> Option<f64> {
    let mut strikes: Vec<f64> = chain.contracts.iter().map(|c| c.strike).collect();
    strikes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    strikes.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    if strikes.is_empty() {
        return None;
    }

    let payout_at = |settle: f64| -> f64 {
        chain
            .contracts
            .iter()
            .map(|c| {
                let intrinsic = match c.kind {
                    OptionKind::Call => (settle - c.strike).max(0.0),
                    OptionKind::Put => (c.strike - settle).max(0.0),
                };
                intrinsic * c.open_interest as f64
            })
            .sum()
    };

    strikes
        .into_iter()
        .map(|s| (s, payout_at(s)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(s, _)| s)
}
