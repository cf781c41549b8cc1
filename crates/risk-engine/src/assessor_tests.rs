#[cfg(test)]
mod tests {
    use crate::assessor::{RiskAssessor, SymbolMetrics};
    use engine_core::{
        Bias, PlanTimeframe, RankedSignal, Signal, SignalCategory, SignalStrength, TradeQuality,
        Vehicle, VolatilityRegime,
    };

    fn ranked(name: &str, strength: SignalStrength) -> RankedSignal {
        RankedSignal {
            signal: Signal::new(name, SignalCategory::Trend, strength, 1.0),
            score: strength.base_score(),
            rank: 1,
        }
    }

    fn bullish_signals(n: usize) -> Vec<RankedSignal> {
        (0..n)
            .map(|i| ranked(&format!("BULL_{i}"), SignalStrength::Bullish))
            .collect()
    }

    fn metrics(price: f64, atr: f64, adx: f64, volume_ratio: f64) -> SymbolMetrics {
        SymbolMetrics {
            symbol: "TEST".to_string(),
            price,
            atr,
            adx,
            volume_ratio,
        }
    }

    #[test]
    fn swing_plan_places_two_atr_stop_and_two_r_target() {
        // price=100, ATR=2.5, ADX 41 forces a swing timeframe.
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 2.5, 41.0, 1.2), &bullish_signals(3));

        assert_eq!(plan.assessment.bias, Bias::Bullish);
        assert_eq!(plan.assessment.timeframe, PlanTimeframe::Swing);
        assert!((plan.assessment.stop.price - 95.0).abs() < 1e-9);
        assert!((plan.assessment.target.price - 110.0).abs() < 1e-9);
        assert!((plan.assessment.rr.ratio - 2.0).abs() < 1e-9);
        assert!(matches!(
            plan.assessment.quality,
            TradeQuality::Medium | TradeQuality::High
        ));
    }

    #[test]
    fn rr_ratio_is_consistent() {
        for (price, atr, adx) in [(50.0, 1.0, 18.0), (100.0, 2.5, 30.0), (400.0, 12.0, 45.0)] {
            let plan = RiskAssessor::assess_metrics(&metrics(price, atr, adx, 1.0), &bullish_signals(4));
            let a = &plan.assessment;
            assert!((a.rr.reward / a.rr.risk - a.rr.ratio).abs() < 1e-6);
        }
    }

    #[test]
    fn volatility_regime_thresholds() {
        // atr_pct = 1.0 -> LOW
        let low = RiskAssessor::assess_metrics(&metrics(100.0, 1.0, 30.0, 1.0), &[]);
        assert_eq!(low.assessment.volatility, VolatilityRegime::Low);
        // atr_pct = 2.0 -> MEDIUM
        let med = RiskAssessor::assess_metrics(&metrics(100.0, 2.0, 30.0, 1.0), &[]);
        assert_eq!(med.assessment.volatility, VolatilityRegime::Medium);
        // atr_pct = 4.0 -> HIGH
        let high = RiskAssessor::assess_metrics(&metrics(100.0, 4.0, 30.0, 1.0), &[]);
        assert_eq!(high.assessment.volatility, VolatilityRegime::High);
    }

    #[test]
    fn bias_requires_two_signal_margin() {
        let mut signals = bullish_signals(2);
        signals.push(ranked("BEAR", SignalStrength::Bearish));
        // 2 vs 1: margin of one only
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 2.0, 30.0, 1.0), &signals);
        assert_eq!(plan.assessment.bias, Bias::Neutral);

        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 2.0, 30.0, 1.0), &bullish_signals(2));
        assert_eq!(plan.assessment.bias, Bias::Bullish);
    }

    #[test]
    fn scalp_on_quiet_trending_tape() {
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 1.0, 30.0, 1.0), &bullish_signals(3));
        assert_eq!(plan.assessment.timeframe, PlanTimeframe::Scalp);
        assert!((plan.assessment.stop.atr_mult - 1.0).abs() < 1e-9);
    }

    #[test]
    fn suppressions_flag_weak_setups() {
        // ADX 15 and volume 0.3x: two suppressions, never qualified.
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 2.0, 15.0, 0.3), &bullish_signals(3));
        assert!(plan
            .assessment
            .suppressions
            .iter()
            .any(|s| s.contains("ADX")));
        assert!(plan
            .assessment
            .suppressions
            .iter()
            .any(|s| s.contains("volume")));
        assert!(!plan.is_qualified());
    }

    #[test]
    fn conflicting_signals_suppress() {
        let mut signals = bullish_signals(5);
        signals.extend((0..3).map(|i| ranked(&format!("BEAR_{i}"), SignalStrength::Bearish)));
        // 5 vs 3: minority share 37.5% passes; add one more bear to exceed 40%.
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 2.0, 30.0, 1.0), &signals);
        assert!(plan.assessment.suppressions.is_empty());

        signals.push(ranked("BEAR_3", SignalStrength::Bearish));
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 2.0, 30.0, 1.0), &signals);
        assert!(plan
            .assessment
            .suppressions
            .iter()
            .any(|s| s.contains("conflicting")));
    }

    #[test]
    fn wide_stop_is_suppressed() {
        // ATR 6 on a 100 stock at swing multiple: 12% stop distance.
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 6.0, 45.0, 1.0), &bullish_signals(3));
        assert!(plan
            .assessment
            .suppressions
            .iter()
            .any(|s| s.contains("stop distance")));
    }

    #[test]
    fn qualified_plan_passes_every_gate() {
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 2.0, 30.0, 1.2), &bullish_signals(4));
        assert!(plan.is_qualified(), "suppressions: {:?}", plan.assessment.suppressions);
    }

    #[test]
    fn bearish_bias_flips_stop_above_entry() {
        let signals: Vec<RankedSignal> = (0..4)
            .map(|i| ranked(&format!("BEAR_{i}"), SignalStrength::StrongBearish))
            .collect();
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 2.0, 30.0, 1.0), &signals);
        assert_eq!(plan.assessment.bias, Bias::Bearish);
        assert!(plan.assessment.stop.price > 100.0);
        assert!(plan.assessment.target.price < 100.0);
    }

    #[test]
    fn low_volatility_swing_stays_in_stock() {
        // Swing via signal count, but LOW volatility keeps the stock vehicle.
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 1.0, 20.0, 1.0), &bullish_signals(12));
        assert_eq!(plan.assessment.timeframe, PlanTimeframe::Swing);
        assert_eq!(plan.vehicle, Vehicle::Stock);
        assert!(plan.option_suggestions.is_none());
    }

    #[test]
    fn high_volatility_swing_selects_spread() {
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 4.0, 45.0, 1.2), &bullish_signals(4));
        assert_eq!(plan.vehicle, Vehicle::OptionSpread);
        let suggestion = plan.option_suggestions.expect("spread suggestion");
        assert_eq!(suggestion.dte_min, 30);
        assert_eq!(suggestion.dte_max, 45);
        assert!((suggestion.spread_width.unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn medium_volatility_bearish_swing_selects_put() {
        let signals: Vec<RankedSignal> = (0..12)
            .map(|i| ranked(&format!("BEAR_{i}"), SignalStrength::Bearish))
            .collect();
        let plan = RiskAssessor::assess_metrics(&metrics(100.0, 2.0, 30.0, 1.0), &signals);
        assert_eq!(plan.vehicle, Vehicle::OptionPut);
        let suggestion = plan.option_suggestions.expect("put suggestion");
        assert!(suggestion.delta_min < 0.0 && suggestion.delta_max < 0.0);
    }
}
