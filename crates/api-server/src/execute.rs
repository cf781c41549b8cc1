use axum::{extract::State, Extension, Json};
use chrono::{NaiveDate, Utc};
use engine_core::{
    EngineError, EngineResult, Period, Position, SpreadKind, Tier, ToolName,
    UniverseName, RESULT_SCHEMA_VERSION,
};
use options_engine::{chain_overview, SpreadAnalyzer, SpreadRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;

use crate::auth::AuthContext;
use crate::shaping;
use crate::store::GatewayStore;
use crate::tiers::ToolPolicy;
use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub tool: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Marks the run cancelled if the request future is dropped before the
/// terminal transition (client disconnect aborts the handler at the next
/// await point).
struct RunGuard {
    store: GatewayStore,
    run_id: String,
    armed: bool,
}

impl RunGuard {
    fn new(store: GatewayStore, run_id: String) -> Self {
        Self {
            store,
            run_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.armed {
            let store = self.store.clone();
            let run_id = self.run_id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.complete_run(&run_id, Err("cancelled"), 0).await {
                    tracing::error!(run_id = %run_id, error = %e, "failed to mark run cancelled");
                }
            });
        }
    }
}

/// `POST /execute` — the gateway state machine:
/// authorize → quota-check + run insert → dispatch → persist → shape.
pub async fn execute(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<Value>, AppError> {
    let tool = ToolName::parse(&request.tool)?;
    let policy = state.tiers.check(auth.tier, tool)?;

    // Spread-family gate runs before any row is written.
    if tool == ToolName::OptionsRiskAnalysis {
        if let Some(spread_type) = request
            .parameters
            .get("spread_type")
            .and_then(Value::as_str)
        {
            let kind = SpreadKind::parse(spread_type)?;
            if !policy.allows_spread(kind) {
                return Err(EngineError::TierDenied(format!(
                    "{} spreads",
                    kind.as_str()
                ))
                .into());
            }
        }
    }

    let parameters = if request.parameters.is_null() {
        json!({})
    } else {
        request.parameters
    };

    let (run_id, used) = state
        .store
        .begin_run(&auth.user_id, tool.as_str(), &parameters, policy.daily_quota)
        .await?;
    let mut guard = RunGuard::new(state.store.clone(), run_id.clone());

    tracing::info!(run_id = %run_id, user_id = %auth.user_id, tool = tool.as_str(), "run dispatched");

    let started = Instant::now();
    let outcome = match tokio::time::timeout(
        state.request_timeout,
        dispatch(&state, tool, &policy, parameters.clone()),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(EngineError::Internal("request timed out".to_string())),
    };
    let execution_ms = started.elapsed().as_millis() as i64;

    match outcome {
        Ok(value) => {
            // The run row keeps the deterministic baseline; the AI overlay
            // only ever travels on the response.
            let baseline = shaping::without_ai(value.clone());
            state
                .store
                .complete_run(&run_id, Ok(&baseline), execution_ms)
                .await?;
            guard.disarm();

            refresh_public_cache(&state, tool, &parameters, &value).await;

            let shaped = shaping::shape_result(tool, auth.tier, value, policy.ai_allowed);
            let mut body = json!({
                "run_id": run_id,
                "result": shaped,
                "execution_ms": execution_ms,
                "usage": { "count": used, "limit": policy.daily_quota },
            });
            if state.tiers.presets_allowed(auth.tier) {
                body["can_save_preset"] = json!(true);
            }
            Ok(Json(body))
        }
        Err(e) => {
            if let Err(db_err) = state
                .store
                .complete_run(&run_id, Err(&e.to_string()), execution_ms)
                .await
            {
                tracing::error!(run_id = %run_id, error = %db_err, "failed to persist run error");
            }
            guard.disarm();
            tracing::warn!(run_id = %run_id, error = %e, "run failed");
            Err(e.into())
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(parameters: Value) -> EngineResult<T> {
    serde_json::from_value(parameters).map_err(|e| EngineError::Validation(e.to_string()))
}

fn parse_period(tool: ToolName, period: Option<String>) -> EngineResult<Period> {
    match period {
        Some(p) => Period::parse(&p),
        None => Ok(tool.default_period()),
    }
}

/// Attach the payload schema version to object results that lack it.
fn versioned(mut value: Value) -> Value {
    if let Some(map) = value.as_object_mut() {
        map.entry("schema_version")
            .or_insert(json!(RESULT_SCHEMA_VERSION));
    }
    value
}

fn to_value<T: serde::Serialize>(value: &T) -> EngineResult<Value> {
    serde_json::to_value(value).map_err(|e| EngineError::Internal(e.to_string()))
}

async fn dispatch(
    state: &AppState,
    tool: ToolName,
    policy: &ToolPolicy,
    parameters: Value,
) -> EngineResult<Value> {
    match tool {
        ToolName::AnalyzeSecurity => {
            #[derive(Deserialize)]
            struct Params {
                symbol: String,
                period: Option<String>,
                #[serde(default)]
                use_ai: bool,
            }
            let params: Params = parse_params(parameters)?;
            let period = parse_period(tool, params.period)?;
            let use_ai = params.use_ai && policy.ai_allowed;
            let analysis = state
                .orchestrator
                .analyze_security(&params.symbol, period, use_ai)
                .await?;
            to_value(&analysis)
        }
        ToolName::AnalyzeFibonacci => {
            #[derive(Deserialize)]
            struct Params {
                symbol: String,
                period: Option<String>,
                window: Option<usize>,
            }
            let params: Params = parse_params(parameters)?;
            let period = parse_period(tool, params.period)?;
            let window = params.window.unwrap_or(150);
            if window < engine_core::MIN_BARS {
                return Err(EngineError::Validation(format!(
                    "window must be at least {}",
                    engine_core::MIN_BARS
                )));
            }
            let analysis = state
                .orchestrator
                .fibonacci(&params.symbol, period, window)
                .await?;
            Ok(versioned(to_value(&analysis)?))
        }
        ToolName::GetTradePlan => {
            #[derive(Deserialize)]
            struct Params {
                symbol: String,
                period: Option<String>,
            }
            let params: Params = parse_params(parameters)?;
            let period = parse_period(tool, params.period)?;
            let plan = state.orchestrator.trade_plan(&params.symbol, period).await?;
            Ok(versioned(to_value(&plan)?))
        }
        ToolName::CompareSecurities => {
            #[derive(Deserialize)]
            struct Params {
                symbols: Vec<String>,
                metric: Option<String>,
                period: Option<String>,
            }
            let params: Params = parse_params(parameters)?;
            let period = parse_period(tool, params.period)?;
            let metric = params.metric.unwrap_or_else(|| "signals".to_string());
            let result = state
                .orchestrator
                .compare(&params.symbols, &metric, period)
                .await?;
            to_value(&result)
        }
        ToolName::ScreenSecurities => {
            #[derive(Deserialize)]
            struct Params {
                universe: String,
                criteria: Value,
                limit: Option<usize>,
                period: Option<String>,
            }
            let params: Params = parse_params(parameters)?;
            let universe = UniverseName::parse(&params.universe)?;
            let criteria = parse_params(params.criteria)?;
            let period = parse_period(tool, params.period)?;
            let result = state
                .scanner
                .screen(universe, criteria, params.limit.unwrap_or(20), period)
                .await?;
            to_value(&result)
        }
        ToolName::ScanTrades => {
            #[derive(Deserialize)]
            struct Params {
                universe: String,
                max_results: Option<usize>,
                period: Option<String>,
            }
            let params: Params = parse_params(parameters)?;
            let universe = UniverseName::parse(&params.universe)?;
            let period = parse_period(tool, params.period)?;
            let result = state
                .scanner
                .scan(universe, params.max_results.unwrap_or(10), period)
                .await?;
            to_value(&result)
        }
        ToolName::PortfolioRisk => {
            #[derive(Deserialize)]
            struct Params {
                positions: Vec<Position>,
                period: Option<String>,
            }
            let params: Params = parse_params(parameters)?;
            let period = parse_period(tool, params.period)?;
            let assessment = state.portfolio.assess(&params.positions, period).await?;
            Ok(versioned(to_value(&assessment)?))
        }
        ToolName::MorningBrief => {
            #[derive(Deserialize)]
            struct Params {
                watchlist: Option<Vec<String>>,
                #[serde(default)]
                market_region: Option<String>,
                period: Option<String>,
            }
            let params: Params = parse_params(parameters)?;
            if let Some(region) = &params.market_region {
                if region != "US" {
                    return Err(EngineError::Validation(format!(
                        "unsupported market region '{region}'"
                    )));
                }
            }
            let period = parse_period(tool, params.period)?;
            let brief = state.brief.generate(params.watchlist, period).await?;
            to_value(&brief)
        }
        ToolName::OptionsRiskAnalysis => {
            #[derive(Deserialize)]
            struct Params {
                symbol: String,
                expiration: Option<NaiveDate>,
                spread_type: Option<String>,
                short_strike: Option<f64>,
                long_strike: Option<f64>,
                short_put_strike: Option<f64>,
                long_put_strike: Option<f64>,
                short_call_strike: Option<f64>,
                long_call_strike: Option<f64>,
                contracts: Option<u32>,
                #[serde(default)]
                use_ai: bool,
            }
            let params: Params = parse_params(parameters)?;
            let chain = state
                .quotes
                .fetch_chain(&params.symbol, params.expiration)
                .await?;

            match params.spread_type {
                Some(spread_type) => {
                    let request = SpreadRequest {
                        kind: Some(SpreadKind::parse(&spread_type)?),
                        expiration: params.expiration,
                        short_strike: params.short_strike,
                        long_strike: params.long_strike,
                        short_put_strike: params.short_put_strike,
                        long_put_strike: params.long_put_strike,
                        short_call_strike: params.short_call_strike,
                        long_call_strike: params.long_call_strike,
                        contracts: params.contracts.unwrap_or(1),
                    };
                    let result =
                        SpreadAnalyzer::analyze(&chain, &request, Utc::now().date_naive())?;
                    let mut value = versioned(to_value(&result)?);

                    if params.use_ai && policy.ai_allowed {
                        let context = format!(
                            "{} {} on {}: max profit {:.2}, max loss {:.2}, POP {:.0}%, breakevens {:?}, status {:?}",
                            result.contracts,
                            result.kind.as_str(),
                            result.symbol,
                            result.max_profit,
                            result.max_loss,
                            result.pop * 100.0,
                            result.breakevens,
                            result.status,
                        );
                        if let Some(text) = state.orchestrator.explain(&context).await {
                            value["ai_explanation"] = json!(text);
                        }
                    }
                    Ok(value)
                }
                None => Ok(versioned(to_value(&chain_overview(&chain))?)),
            }
        }
    }
}

/// Refresh the public landing row for this tool when the previous entry is
/// stale. Stored payloads are shaped to the free tier so the public route
/// never leaks paid fields.
async fn refresh_public_cache(state: &AppState, tool: ToolName, parameters: &Value, value: &Value) {
    let stale = match state.store.public_latest_age(tool.as_str()).await {
        Ok(None) => true,
        Ok(Some(age)) => age >= state.public_cache_ttl,
        Err(e) => {
            tracing::warn!(error = %e, "public cache age lookup failed");
            return;
        }
    };
    if !stale {
        return;
    }

    let symbol = parameters.get("symbol").and_then(Value::as_str);
    let public = shaping::shape_result(tool, Tier::Free, value.clone(), false);
    if let Err(e) = state
        .store
        .upsert_public_latest(tool.as_str(), symbol, &public)
        .await
    {
        tracing::warn!(error = %e, "public cache upsert failed");
    }
}
