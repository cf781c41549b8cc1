use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::{LlmAssessment, LlmError, LlmResult, LlmScorer, ScoreRequest};

/// Default wall-clock budget for one LLM call.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP scorer against an OpenAI-style chat completions endpoint.
pub struct HttpLlmScorer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpLlmScorer {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    /// Build from environment; `None` when no key is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("LLM_API_KEY").ok()?;
        let base_url =
            std::env::var("LLM_API_URL").unwrap_or_else(|_| "https://api.openai.com".to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Some(Self::new(base_url, api_key, model))
    }

    async fn chat(&self, system: &str, user: String) -> LlmResult<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(LlmError::RequestFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Malformed("no choices in completion".to_string()))
    }

    /// Models wrap JSON in prose or fences more often than not; extract the
    /// outermost object before parsing.
    fn extract_json(content: &str) -> LlmResult<&str> {
        let start = content
            .find('{')
            .ok_or_else(|| LlmError::Malformed("no JSON object in reply".to_string()))?;
        let end = content
            .rfind('}')
            .ok_or_else(|| LlmError::Malformed("unterminated JSON object".to_string()))?;
        if end <= start {
            return Err(LlmError::Malformed("unterminated JSON object".to_string()));
        }
        Ok(&content[start..=end])
    }
}

#[async_trait]
impl LlmScorer for HttpLlmScorer {
    async fn score_signals(&self, request: &ScoreRequest) -> LlmResult<LlmAssessment> {
        let system = "You are a market technician. Re-score the given technical signals \
                      in current market context. Respond with only a JSON object: \
                      {\"scores\":[{\"name\":...,\"score\":0-95}],\"outlook\":\"BULLISH|NEUTRAL|BEARISH\",\
                      \"action\":\"BUY|HOLD|SELL\",\"confidence\":0-1,\"rationale\":\"...\"}";
        let user = serde_json::to_string(request)
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let content = self.chat(system, user).await?;
        let payload = Self::extract_json(&content)?;
        let assessment: LlmAssessment =
            serde_json::from_str(payload).map_err(|e| LlmError::Malformed(e.to_string()))?;

        if !(0.0..=1.0).contains(&assessment.confidence) {
            return Err(LlmError::Malformed(format!(
                "confidence {} out of range",
                assessment.confidence
            )));
        }
        if assessment
            .scores
            .iter()
            .any(|s| !(0.0..=95.0).contains(&s.score))
        {
            return Err(LlmError::Malformed("score out of range".to_string()));
        }

        Ok(assessment)
    }

    async fn explain(&self, context: &str) -> LlmResult<String> {
        let system = "You are a market technician. Explain the trade setup in two or three \
                      plain sentences for a retail audience. No advice disclaimers.";
        self.chat(system, context.to_string()).await
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}
