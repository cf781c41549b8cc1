#[cfg(test)]
mod tests {
    use crate::auth::AuthContext;
    use crate::execute::{execute, ExecuteRequest};
    use crate::store::GatewayStore;
    use crate::tiers::TierMatrix;
    use crate::{AppError, AppState};
    use axum::extract::State;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use chrono::{Duration as ChronoDuration, Utc};
    use engine_core::{
        Bar, EngineError, OptionChain, OptionContract, OptionKind, Period, Series, Tier,
    };
    use quote_client::FixtureQuoteSource;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn breakout_series(symbol: &str, n: usize) -> Series {
        let mut bars: Vec<Bar> = (0..n - 1)
            .map(|i| Bar {
                timestamp: Utc::now() - ChronoDuration::days((n - i) as i64),
                open: 100.0,
                high: 100.5,
                low: 99.5,
                close: 100.0,
                volume: 1_000_000.0,
            })
            .collect();
        bars.push(Bar {
            timestamp: Utc::now(),
            open: 100.0,
            high: 104.5,
            low: 99.5,
            close: 104.0,
            volume: 2_500_000.0,
        });
        Series::new(symbol, Period::Mo1, bars)
    }

    fn mu_chain() -> OptionChain {
        let expiry = Utc::now().date_naive() + ChronoDuration::days(35);
        let contract = |kind: OptionKind, strike: f64, premium: f64| OptionContract {
            contract: format!("MU-{strike}-{kind:?}"),
            kind,
            strike,
            expiration: expiry,
            bid: premium - 0.05,
            ask: premium + 0.05,
            last: premium,
            implied_volatility: 0.45,
            delta: 0.4,
            gamma: 0.02,
            theta: -0.05,
            vega: 0.1,
            open_interest: 500,
            volume: 150,
        };
        OptionChain {
            symbol: "MU".to_string(),
            underlying_price: 86.0,
            expirations: vec![expiry],
            contracts: vec![
                contract(OptionKind::Call, 90.0, 1.75),
                contract(OptionKind::Call, 94.0, 0.50),
                contract(OptionKind::Put, 82.0, 1.60),
                contract(OptionKind::Put, 78.0, 0.70),
            ],
        }
    }

    async fn test_state() -> AppState {
        let fixture = Arc::new(FixtureQuoteSource::new());
        fixture.insert_series_all_periods(&breakout_series("AAPL", 260));
        fixture.insert_chain(mu_chain());
        let store = GatewayStore::in_memory().await.unwrap();
        AppState::build(fixture, store, TierMatrix::default_matrix())
    }

    fn auth(user: &str, tier: Tier) -> Extension<AuthContext> {
        Extension(AuthContext {
            user_id: user.to_string(),
            tier,
        })
    }

    async fn run(
        state: &AppState,
        user: &str,
        tier: Tier,
        tool: &str,
        parameters: Value,
    ) -> Result<Value, AppError> {
        execute(
            State(state.clone()),
            auth(user, tier),
            Json(ExecuteRequest {
                tool: tool.to_string(),
                parameters,
            }),
        )
        .await
        .map(|Json(body)| body)
    }

    #[tokio::test]
    async fn free_tier_response_is_capped_and_ai_free() {
        let state = test_state().await;
        let body = run(
            &state,
            "free1",
            Tier::Free,
            "analyze_security",
            json!({"symbol": "AAPL", "use_ai": true}),
        )
        .await
        .unwrap();

        let signals = body["result"]["signals"].as_array().unwrap();
        assert!(signals.len() <= 3);
        assert!(body["result"].get("ai_assessment").is_none());
        assert_eq!(body["usage"]["count"], 1);
        assert!(body.get("can_save_preset").is_none());
        assert!(body["run_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn pro_tier_gets_full_signal_list() {
        let state = test_state().await;
        let body = run(
            &state,
            "pro1",
            Tier::Pro,
            "analyze_security",
            json!({"symbol": "AAPL"}),
        )
        .await
        .unwrap();

        let signals = body["result"]["signals"].as_array().unwrap();
        assert!(signals.len() > 3, "got {} signals", signals.len());
        assert_eq!(body["can_save_preset"], true);

        // The golden cross scenario: present with score >= 85.
        let golden = signals
            .iter()
            .find(|s| s["name"] == "GOLDEN_CROSS")
            .expect("golden cross");
        assert!(golden["score"].as_f64().unwrap() >= 85.0);
    }

    #[tokio::test]
    async fn quota_counts_up_then_429_without_increment() {
        let state = test_state().await;
        // Free get_trade_plan quota is 5.
        for n in 1..=5i64 {
            let body = run(
                &state,
                "quota_user",
                Tier::Free,
                "get_trade_plan",
                json!({"symbol": "AAPL"}),
            )
            .await
            .unwrap();
            assert_eq!(body["usage"]["count"], n);
        }

        let err = run(
            &state,
            "quota_user",
            Tier::Free,
            "get_trade_plan",
            json!({"symbol": "AAPL"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.0,
            EngineError::QuotaExceeded { used: 5, limit: 5 }
        ));
        assert_eq!(err.into_response().status(), 429);
        assert_eq!(
            state
                .store
                .count_runs_today("quota_user", "get_trade_plan")
                .await
                .unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn free_iron_condor_is_tier_denied_with_no_run_row() {
        let state = test_state().await;
        let err = run(
            &state,
            "free1",
            Tier::Free,
            "options_risk_analysis",
            json!({"symbol": "MU", "spread_type": "iron_condor"}),
        )
        .await
        .unwrap_err();

        assert!(matches!(err.0, EngineError::TierDenied(_)));
        let response = err.into_response();
        assert_eq!(response.status(), 403);
        assert_eq!(
            state
                .store
                .count_runs_today("free1", "options_risk_analysis")
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn pro_vertical_allowed_but_condor_denied() {
        let state = test_state().await;

        let body = run(
            &state,
            "pro1",
            Tier::Pro,
            "options_risk_analysis",
            json!({
                "symbol": "MU",
                "spread_type": "call_credit",
                "short_strike": 90.0,
                "long_strike": 94.0,
                "contracts": 1,
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["result"]["max_profit"], 125.0);
        assert_eq!(body["result"]["max_loss"], 275.0);
        assert_eq!(body["result"]["breakevens"][0], 91.25);

        let err = run(
            &state,
            "pro1",
            Tier::Pro,
            "options_risk_analysis",
            json!({"symbol": "MU", "spread_type": "iron_condor"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err.0, EngineError::TierDenied(_)));
    }

    #[tokio::test]
    async fn max_tier_runs_iron_condor() {
        let state = test_state().await;
        let body = run(
            &state,
            "max1",
            Tier::Max,
            "options_risk_analysis",
            json!({
                "symbol": "MU",
                "spread_type": "iron_condor",
                "short_call_strike": 90.0,
                "long_call_strike": 94.0,
                "short_put_strike": 82.0,
                "long_put_strike": 78.0,
            }),
        )
        .await
        .unwrap();

        assert_eq!(body["result"]["breakevens"].as_array().unwrap().len(), 2);
        assert_eq!(body["usage"]["limit"], Value::Null);
        assert_eq!(body["result"]["schema_version"], 1);
    }

    #[tokio::test]
    async fn chain_overview_served_without_spread_type() {
        let state = test_state().await;
        let body = run(
            &state,
            "max1",
            Tier::Max,
            "options_risk_analysis",
            json!({"symbol": "MU"}),
        )
        .await
        .unwrap();
        assert_eq!(body["result"]["symbol"], "MU");
        assert!(body["result"]["total_call_volume"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_validation_error() {
        let state = test_state().await;
        let err = run(&state, "pro1", Tier::Pro, "mine_bitcoin", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err.0, EngineError::Validation(_)));
        assert_eq!(err.into_response().status(), 400);
    }

    #[tokio::test]
    async fn invalid_period_is_validation_error() {
        let state = test_state().await;
        let err = run(
            &state,
            "pro1",
            Tier::Pro,
            "analyze_security",
            json!({"symbol": "AAPL", "period": "42m"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err.0, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_503_and_error_run() {
        let state = test_state().await;
        // No fixture for this symbol: the quote source fails.
        let err = run(
            &state,
            "pro1",
            Tier::Pro,
            "analyze_security",
            json!({"symbol": "NOPE"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err.0, EngineError::DataFetch(_)));
        assert_eq!(err.into_response().status(), 503);

        // The run row exists and is terminal.
        assert_eq!(
            state
                .store
                .count_runs_today("pro1", "analyze_security")
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn successful_run_feeds_public_cache_with_free_shape() {
        let state = test_state().await;
        run(
            &state,
            "pro1",
            Tier::Pro,
            "analyze_security",
            json!({"symbol": "AAPL"}),
        )
        .await
        .unwrap();

        let latest = state.store.list_public_latest().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].tool, "analyze_security");
        assert_eq!(latest[0].symbol.as_deref(), Some("AAPL"));
        // Stored public payload is capped to the free shape.
        assert!(latest[0].result["signals"].as_array().unwrap().len() <= 3);
    }

    #[tokio::test]
    async fn morning_brief_rejects_non_us_region() {
        let state = test_state().await;
        let err = run(
            &state,
            "pro1",
            Tier::Pro,
            "morning_brief",
            json!({"market_region": "EU"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err.0, EngineError::Validation(_)));
    }
}
