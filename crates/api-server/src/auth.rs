use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use engine_core::{EngineError, Tier};

use crate::AppError;

/// Resolved caller identity attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub tier: Tier,
}

/// Bearer-token authentication middleware.
///
/// Tokens come from the `API_TOKENS` environment variable as
/// `token:user_id:tier` triples separated by commas:
/// `API_TOKENS=abc123:alice:pro,def456:bob:free`
pub async fn auth_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer(&headers).ok_or(EngineError::Unauthorized)?;

    let context = resolve_token(&token).ok_or_else(|| {
        tracing::warn!("invalid bearer token: {}", mask_token(&token));
        EngineError::Unauthorized
    })?;

    tracing::debug!(user_id = %context.user_id, tier = context.tier.as_str(), "authenticated");
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub(crate) fn resolve_token(token: &str) -> Option<AuthContext> {
    let raw = std::env::var("API_TOKENS").unwrap_or_default();
    for entry in raw.split(',') {
        let mut parts = entry.trim().splitn(3, ':');
        let (Some(t), Some(user), Some(tier)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if t == token {
            return Tier::parse(tier).ok().map(|tier| AuthContext {
                user_id: user.to_string(),
                tier,
            });
        }
    }
    None
}

/// Mask a token for logs: first and last 4 characters only.
pub(crate) fn mask_token(token: &str) -> String {
    if token.len() <= 8 {
        return "****".to_string();
    }
    format!("{}...{}", &token[..4], &token[token.len() - 4..])
}
