use async_trait::async_trait;
use engine_core::{Outlook, RankedSignal, TradeAction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;
pub use http::HttpLlmScorer;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    #[error("LLM call timed out")]
    Timeout,

    #[error("LLM returned malformed output: {0}")]
    Malformed(String),

    #[error("LLM scoring disabled")]
    Disabled,
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Compact market context shipped with a scoring request.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRequest {
    pub symbol: String,
    pub current_price: f64,
    pub indicators: serde_json::Value,
    pub signals: Vec<CompactSignal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompactSignal {
    pub name: String,
    pub category: String,
    pub strength: String,
    pub score: f64,
}

impl CompactSignal {
    pub fn from_ranked(ranked: &RankedSignal) -> Self {
        Self {
            name: ranked.signal.name.clone(),
            category: format!("{:?}", ranked.signal.category),
            strength: format!("{:?}", ranked.signal.strength),
            score: ranked.score,
        }
    }
}

/// Context-aware re-scoring of the deterministic signal list. The overlay
/// never replaces the persisted baseline; callers attach it alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAssessment {
    pub scores: Vec<SignalScore>,
    pub outlook: Outlook,
    pub action: TradeAction,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalScore {
    pub name: String,
    pub score: f64,
}

/// Optional LLM adapter behind the ranker. Implementations must be pure
/// overlays: any failure leaves the deterministic scores untouched.
#[async_trait]
pub trait LlmScorer: Send + Sync {
    async fn score_signals(&self, request: &ScoreRequest) -> LlmResult<LlmAssessment>;

    async fn explain(&self, context: &str) -> LlmResult<String>;
}

/// Scorer used when no API key is configured; always defers to the
/// deterministic baseline.
pub struct NullScorer;

#[async_trait]
impl LlmScorer for NullScorer {
    async fn score_signals(&self, _request: &ScoreRequest) -> LlmResult<LlmAssessment> {
        Err(LlmError::Disabled)
    }

    async fn explain(&self, _context: &str) -> LlmResult<String> {
        Err(LlmError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_scorer_always_defers() {
        let scorer = NullScorer;
        let request = ScoreRequest {
            symbol: "AAPL".to_string(),
            current_price: 180.0,
            indicators: serde_json::Value::Null,
            signals: vec![],
        };
        assert!(matches!(
            scorer.score_signals(&request).await,
            Err(LlmError::Disabled)
        ));
        assert!(matches!(scorer.explain("ctx").await, Err(LlmError::Disabled)));
    }
}
