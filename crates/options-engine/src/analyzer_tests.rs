#[cfg(test)]
mod tests {
    use crate::analyzer::{SpreadAnalyzer, SpreadRequest};
    use crate::overview::chain_overview;
    use chrono::NaiveDate;
    use engine_core::{
        EngineError, OptionChain, OptionContract, OptionKind, SpreadKind, SpreadStatus,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 7).unwrap() // 35 DTE
    }

    fn contract(kind: OptionKind, strike: f64, premium: f64) -> OptionContract {
        let suffix = match kind {
            OptionKind::Call => "C",
            OptionKind::Put => "P",
        };
        OptionContract {
            contract: format!("MU250707{suffix}{strike:05.0}"),
            kind,
            strike,
            expiration: expiry(),
            bid: premium - 0.05,
            ask: premium + 0.05,
            last: premium,
            implied_volatility: 0.45,
            delta: match kind {
                OptionKind::Call => 0.40,
                OptionKind::Put => -0.40,
            },
            gamma: 0.02,
            theta: -0.05,
            vega: 0.10,
            open_interest: 500,
            volume: 120,
        }
    }

    fn mu_chain() -> OptionChain {
        let contracts = vec![
            contract(OptionKind::Call, 82.0, 6.10),
            contract(OptionKind::Call, 86.0, 3.40),
            contract(OptionKind::Call, 90.0, 1.75),
            contract(OptionKind::Call, 94.0, 0.50),
            contract(OptionKind::Put, 82.0, 1.60),
            contract(OptionKind::Put, 78.0, 0.70),
            contract(OptionKind::Put, 86.0, 3.10),
            contract(OptionKind::Put, 90.0, 5.60),
        ];
        OptionChain {
            symbol: "MU".to_string(),
            underlying_price: 86.0,
            expirations: vec![expiry()],
            contracts,
        }
    }

    fn vertical(kind: SpreadKind, short: f64, long: f64) -> SpreadRequest {
        SpreadRequest {
            kind: Some(kind),
            expiration: Some(expiry()),
            short_strike: Some(short),
            long_strike: Some(long),
            contracts: 1,
            ..Default::default()
        }
    }

    #[test]
    fn call_credit_spread_algebra() {
        let result =
            SpreadAnalyzer::analyze(&mu_chain(), &vertical(SpreadKind::CallCredit, 90.0, 94.0), today())
                .unwrap();

        // credit = 1.75 - 0.50 = 1.25
        assert!((result.max_profit - 125.0).abs() < 1e-6);
        assert!((result.max_loss - 275.0).abs() < 1e-6);
        assert!((result.breakevens[0] - 91.25).abs() < 1e-6);
        assert!((result.rr.ratio - 2.2).abs() < 1e-6);
        // max_profit + max_loss = width * 100 * N
        assert!((result.max_profit + result.max_loss - 400.0).abs() < 1e-6);
        assert_eq!(result.dte, 35);
        // Price 86 is below the 90 short strike.
        assert_eq!(result.status, SpreadStatus::MaxProfit);
        // Bearish structure: positive short-call delta negated.
        assert!(result.net_greeks.delta < 0.0);
    }

    #[test]
    fn put_credit_spread_algebra() {
        let result =
            SpreadAnalyzer::analyze(&mu_chain(), &vertical(SpreadKind::PutCredit, 82.0, 78.0), today())
                .unwrap();

        // credit = 1.60 - 0.70 = 0.90, width 4
        assert!((result.max_profit - 90.0).abs() < 1e-6);
        assert!((result.max_loss - 310.0).abs() < 1e-6);
        assert!((result.breakevens[0] - 81.10).abs() < 1e-6);
        assert_eq!(result.status, SpreadStatus::MaxProfit);
        assert!(result.pop > 0.5, "put credit above breakeven should be likely, pop={}", result.pop);
    }

    #[test]
    fn call_debit_spread_algebra() {
        // Long 86 call at 3.40, short 90 call at 1.75: debit 1.65, width 4.
        let result =
            SpreadAnalyzer::analyze(&mu_chain(), &vertical(SpreadKind::CallDebit, 90.0, 86.0), today())
                .unwrap();

        assert!((result.max_loss - 165.0).abs() < 1e-6);
        assert!((result.max_profit - 235.0).abs() < 1e-6);
        assert!((result.breakevens[0] - 87.65).abs() < 1e-6);
        assert!(result.net_debit_credit < 0.0);
    }

    #[test]
    fn iron_condor_has_two_breakevens() {
        let request = SpreadRequest {
            kind: Some(SpreadKind::IronCondor),
            expiration: Some(expiry()),
            short_call_strike: Some(90.0),
            long_call_strike: Some(94.0),
            short_put_strike: Some(82.0),
            long_put_strike: Some(78.0),
            contracts: 1,
            ..Default::default()
        };
        let result = SpreadAnalyzer::analyze(&mu_chain(), &request, today()).unwrap();

        // credit = 1.75 - 0.50 + 1.60 - 0.70 = 2.15
        assert!((result.net_debit_credit - 2.15).abs() < 1e-6);
        assert_eq!(result.breakevens.len(), 2);
        assert!((result.breakevens[0] - 79.85).abs() < 1e-6); // 82 - 2.15
        assert!((result.breakevens[1] - 92.15).abs() < 1e-6); // 90 + 2.15
        assert!((result.max_profit - 215.0).abs() < 1e-6);
        assert!((result.max_loss - 185.0).abs() < 1e-6);
        // Price 86 sits between the short strikes.
        assert_eq!(result.status, SpreadStatus::MaxProfit);
        assert!(result.pop > 0.0 && result.pop < 1.0);
    }

    #[test]
    fn missing_strike_is_option_data_unavailable() {
        let err =
            SpreadAnalyzer::analyze(&mu_chain(), &vertical(SpreadKind::CallCredit, 91.0, 95.0), today())
                .unwrap_err();
        assert!(matches!(err, EngineError::OptionDataUnavailable(_)));
    }

    #[test]
    fn missing_parameters_are_validation_errors() {
        let request = SpreadRequest {
            kind: Some(SpreadKind::CallCredit),
            expiration: Some(expiry()),
            contracts: 1,
            ..Default::default()
        };
        let err = SpreadAnalyzer::analyze(&mu_chain(), &request, today()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn inverted_strikes_rejected() {
        let err =
            SpreadAnalyzer::analyze(&mu_chain(), &vertical(SpreadKind::CallCredit, 94.0, 90.0), today())
                .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn short_dte_and_thin_legs_warn() {
        let mut chain = mu_chain();
        for c in &mut chain.contracts {
            c.expiration = NaiveDate::from_ymd_opt(2025, 6, 6).unwrap(); // 4 DTE
            c.open_interest = 10;
        }
        chain.expirations = vec![NaiveDate::from_ymd_opt(2025, 6, 6).unwrap()];
        let mut request = vertical(SpreadKind::CallCredit, 90.0, 94.0);
        request.expiration = Some(NaiveDate::from_ymd_opt(2025, 6, 6).unwrap());

        let result = SpreadAnalyzer::analyze(&chain, &request, today()).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("days to expiration")));
        assert!(result.warnings.iter().any(|w| w.contains("open interest")));
    }

    #[test]
    fn contracts_scale_linearly() {
        let mut request = vertical(SpreadKind::CallCredit, 90.0, 94.0);
        request.contracts = 3;
        let result = SpreadAnalyzer::analyze(&mu_chain(), &request, today()).unwrap();
        assert!((result.max_profit - 375.0).abs() < 1e-6);
        assert!((result.max_loss - 825.0).abs() < 1e-6);
    }

    #[test]
    fn overview_aggregates_chain() {
        let overview = chain_overview(&mu_chain());
        assert_eq!(overview.symbol, "MU");
        assert!(overview.total_call_volume > 0);
        assert!(overview.put_call_volume_ratio.is_some());
        assert!(overview.avg_implied_volatility.unwrap() > 0.0);
        assert!(overview.max_pain.is_some());
    }
}
