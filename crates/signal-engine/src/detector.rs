use engine_core::{Bar, Signal, SignalCategory, SignalStrength};
use serde_json::json;

use crate::indicators::IndicatorSet;

/// Run the full rule set over the last two indicator rows. Each rule is
/// independent and emits zero or more signals; rules whose inputs are still
/// in their warm-up window (NaN) stay silent.
pub fn detect_signals(bars: &[Bar], ind: &IndicatorSet) -> Vec<Signal> {
    let mut signals = Vec::new();

    ma_cross_signals(ind, &mut signals);
    ma_trend_signals(ind, &mut signals);
    rsi_signals(ind, &mut signals);
    macd_signals(ind, &mut signals);
    bollinger_signals(ind, &mut signals);
    stochastic_signals(ind, &mut signals);
    volume_signals(bars, ind, &mut signals);
    trend_signals(bars, ind, &mut signals);

    // Deterministic emission order: category, then |value|, then name.
    signals.sort_by(|a, b| {
        a.category
            .priority()
            .cmp(&b.category.priority())
            .then_with(|| {
                b.value
                    .abs()
                    .partial_cmp(&a.value.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.name.cmp(&b.name))
    });
    signals
}

const MA_CROSS_PAIRS: [(usize, usize); 8] = [
    (5, 10),
    (5, 20),
    (10, 20),
    (10, 50),
    (20, 50),
    (50, 100),
    (50, 200),
    (100, 200),
];

fn ma_cross_signals(ind: &IndicatorSet, out: &mut Vec<Signal>) {
    for (fast, slow) in MA_CROSS_PAIRS {
        let (Some(fast_col), Some(slow_col)) = (ind.sma_for(fast), ind.sma_for(slow)) else {
            continue;
        };
        let (Some((pf, lf)), Some((ps, ls))) =
            (IndicatorSet::last2(fast_col), IndicatorSet::last2(slow_col))
        else {
            continue;
        };

        let crossed_up = pf <= ps && lf > ls;
        let crossed_down = pf >= ps && lf < ls;
        if !crossed_up && !crossed_down {
            continue;
        }

        // The 50/200 cross is the marquee event; smaller pairs are significant.
        let (name, strength) = match (fast, slow, crossed_up) {
            (50, 200, true) => ("GOLDEN_CROSS".to_string(), SignalStrength::StrongBullish),
            (50, 200, false) => ("DEATH_CROSS".to_string(), SignalStrength::StrongBearish),
            (f, s, true) => (
                format!("SMA_{f}_{s}_BULLISH_CROSS"),
                SignalStrength::SignificantBullish,
            ),
            (f, s, false) => (
                format!("SMA_{f}_{s}_BEARISH_CROSS"),
                SignalStrength::SignificantBearish,
            ),
        };

        out.push(
            Signal::new(name, SignalCategory::MaCross, strength, lf - ls)
                .with_metadata(json!({ "fast": fast, "slow": slow })),
        );
    }

    // Price crossing a major moving average.
    for period in [20usize, 50, 200] {
        let Some(ma_col) = ind.sma_for(period) else {
            continue;
        };
        let (Some((pp, lp)), Some((pm, lm))) = (
            IndicatorSet::last2(&ind.closes),
            IndicatorSet::last2(ma_col),
        ) else {
            continue;
        };

        if pp <= pm && lp > lm {
            out.push(Signal::new(
                format!("PRICE_CROSS_SMA_{period}_UP"),
                SignalCategory::MaCross,
                SignalStrength::Bullish,
                lp - lm,
            ));
        } else if pp >= pm && lp < lm {
            out.push(Signal::new(
                format!("PRICE_CROSS_SMA_{period}_DOWN"),
                SignalCategory::MaCross,
                SignalStrength::Bearish,
                lp - lm,
            ));
        }
    }
}

fn ma_trend_signals(ind: &IndicatorSet, out: &mut Vec<Signal>) {
    let s10 = IndicatorSet::last(&ind.sma_10);
    let s20 = IndicatorSet::last(&ind.sma_20);
    let s50 = IndicatorSet::last(&ind.sma_50);

    if let (Some(a), Some(b), Some(c)) = (s10, s20, s50) {
        if a > b && b > c {
            out.push(Signal::new(
                "MA_ALIGNMENT_BULLISH",
                SignalCategory::MaTrend,
                SignalStrength::StrongBullish,
                (a - c) / c * 100.0,
            ));
        } else if a < b && b < c {
            out.push(Signal::new(
                "MA_ALIGNMENT_BEARISH",
                SignalCategory::MaTrend,
                SignalStrength::StrongBearish,
                (a - c) / c * 100.0,
            ));
        }
    }

    // Full stack across every computed average is the extreme read.
    let stack = [
        IndicatorSet::last(&ind.sma_5),
        s10,
        s20,
        s50,
        IndicatorSet::last(&ind.sma_100),
        IndicatorSet::last(&ind.sma_200),
    ];
    if stack.iter().all(|v| v.is_some()) {
        let values: Vec<f64> = stack.iter().map(|v| v.unwrap()).collect();
        if values.windows(2).all(|w| w[0] > w[1]) {
            out.push(Signal::new(
                "MA_STACK_BULLISH",
                SignalCategory::MaTrend,
                SignalStrength::ExtremeBullish,
                (values[0] - values[5]) / values[5] * 100.0,
            ));
        } else if values.windows(2).all(|w| w[0] < w[1]) {
            out.push(Signal::new(
                "MA_STACK_BEARISH",
                SignalCategory::MaTrend,
                SignalStrength::ExtremeBearish,
                (values[0] - values[5]) / values[5] * 100.0,
            ));
        }
    }

    // Long-term regime: which side of the 200 the price sits on.
    if let (Some(price), Some(s200)) = (
        IndicatorSet::last(&ind.closes),
        IndicatorSet::last(&ind.sma_200),
    ) {
        let distance_pct = (price - s200) / s200 * 100.0;
        if distance_pct > 0.0 {
            out.push(Signal::new(
                "PRICE_ABOVE_SMA_200",
                SignalCategory::MaTrend,
                SignalStrength::Bullish,
                distance_pct,
            ));
        } else if distance_pct < 0.0 {
            out.push(Signal::new(
                "PRICE_BELOW_SMA_200",
                SignalCategory::MaTrend,
                SignalStrength::Bearish,
                distance_pct,
            ));
        }
    }
}

fn rsi_signals(ind: &IndicatorSet, out: &mut Vec<Signal>) {
    let Some((prev, last)) = IndicatorSet::last2(&ind.rsi_14) else {
        return;
    };

    if last < 20.0 {
        out.push(Signal::new(
            "RSI_EXTREME_OVERSOLD",
            SignalCategory::Rsi,
            SignalStrength::ExtremeBullish,
            last,
        ));
    } else if last < 30.0 {
        out.push(Signal::new(
            "RSI_OVERSOLD",
            SignalCategory::Rsi,
            SignalStrength::Bullish,
            last,
        ));
    } else if last > 80.0 {
        out.push(Signal::new(
            "RSI_EXTREME_OVERBOUGHT",
            SignalCategory::Rsi,
            SignalStrength::ExtremeBearish,
            last,
        ));
    } else if last > 70.0 {
        out.push(Signal::new(
            "RSI_OVERBOUGHT",
            SignalCategory::Rsi,
            SignalStrength::Bearish,
            last,
        ));
    }

    if prev <= 50.0 && last > 50.0 {
        out.push(Signal::new(
            "RSI_CROSS_MIDLINE_UP",
            SignalCategory::Rsi,
            SignalStrength::Bullish,
            last,
        ));
    } else if prev >= 50.0 && last < 50.0 {
        out.push(Signal::new(
            "RSI_CROSS_MIDLINE_DOWN",
            SignalCategory::Rsi,
            SignalStrength::Bearish,
            last,
        ));
    }
}

fn macd_signals(ind: &IndicatorSet, out: &mut Vec<Signal>) {
    if let Some((prev, last)) = IndicatorSet::last2(&ind.macd.macd) {
        if prev <= 0.0 && last > 0.0 {
            out.push(Signal::new(
                "MACD_ZERO_CROSS_UP",
                SignalCategory::Macd,
                SignalStrength::SignificantBullish,
                last,
            ));
        } else if prev >= 0.0 && last < 0.0 {
            out.push(Signal::new(
                "MACD_ZERO_CROSS_DOWN",
                SignalCategory::Macd,
                SignalStrength::SignificantBearish,
                last,
            ));
        }
    }

    if let (Some((pm, lm)), Some((ps, ls))) = (
        IndicatorSet::last2(&ind.macd.macd),
        IndicatorSet::last2(&ind.macd.signal),
    ) {
        if pm <= ps && lm > ls {
            out.push(Signal::new(
                "MACD_BULLISH_CROSS",
                SignalCategory::Macd,
                SignalStrength::StrongBullish,
                lm - ls,
            ));
        } else if pm >= ps && lm < ls {
            out.push(Signal::new(
                "MACD_BEARISH_CROSS",
                SignalCategory::Macd,
                SignalStrength::StrongBearish,
                lm - ls,
            ));
        }
    }

    if let Some((prev, last)) = IndicatorSet::last2(&ind.macd.histogram) {
        if prev <= 0.0 && last > 0.0 {
            out.push(Signal::new(
                "MACD_HISTOGRAM_FLIP_POSITIVE",
                SignalCategory::Macd,
                SignalStrength::Bullish,
                last,
            ));
        } else if prev >= 0.0 && last < 0.0 {
            out.push(Signal::new(
                "MACD_HISTOGRAM_FLIP_NEGATIVE",
                SignalCategory::Macd,
                SignalStrength::Bearish,
                last,
            ));
        }
    }
}

fn bollinger_signals(ind: &IndicatorSet, out: &mut Vec<Signal>) {
    let (Some(price), Some(upper), Some(middle), Some(lower)) = (
        IndicatorSet::last(&ind.closes),
        IndicatorSet::last(&ind.bollinger.upper),
        IndicatorSet::last(&ind.bollinger.middle),
        IndicatorSet::last(&ind.bollinger.lower),
    ) else {
        return;
    };

    if price < lower {
        out.push(Signal::new(
            "BOLLINGER_BREAK_LOWER",
            SignalCategory::Bollinger,
            SignalStrength::SignificantBullish,
            (price - lower) / lower * 100.0,
        ));
    } else if (price - lower).abs() / lower * 100.0 <= 1.0 {
        out.push(Signal::new(
            "BOLLINGER_LOWER_TOUCH",
            SignalCategory::Bollinger,
            SignalStrength::Bullish,
            (price - lower) / lower * 100.0,
        ));
    }

    if price > upper {
        out.push(Signal::new(
            "BOLLINGER_BREAK_UPPER",
            SignalCategory::Bollinger,
            SignalStrength::SignificantBearish,
            (price - upper) / upper * 100.0,
        ));
    } else if (upper - price).abs() / upper * 100.0 <= 1.0 {
        out.push(Signal::new(
            "BOLLINGER_UPPER_TOUCH",
            SignalCategory::Bollinger,
            SignalStrength::Bearish,
            (upper - price) / upper * 100.0,
        ));
    }

    // Narrow bands precede expansion; direction-neutral heads-up.
    if middle > 0.0 {
        let bandwidth = (upper - lower) / middle;
        if bandwidth < 0.05 {
            out.push(Signal::new(
                "BOLLINGER_SQUEEZE",
                SignalCategory::Bollinger,
                SignalStrength::Neutral,
                bandwidth * 100.0,
            ));
        }
    }
}

fn stochastic_signals(ind: &IndicatorSet, out: &mut Vec<Signal>) {
    let Some((pk, lk)) = IndicatorSet::last2(&ind.stochastic.k) else {
        return;
    };

    if lk < 20.0 {
        out.push(Signal::new(
            "STOCH_OVERSOLD",
            SignalCategory::Stochastic,
            SignalStrength::Bullish,
            lk,
        ));
    } else if lk > 80.0 {
        out.push(Signal::new(
            "STOCH_OVERBOUGHT",
            SignalCategory::Stochastic,
            SignalStrength::Bearish,
            lk,
        ));
    }

    if let Some((pd, ld)) = IndicatorSet::last2(&ind.stochastic.d) {
        if pk <= pd && lk > ld && lk < 30.0 {
            out.push(Signal::new(
                "STOCH_BULLISH_CROSS",
                SignalCategory::Stochastic,
                SignalStrength::SignificantBullish,
                lk - ld,
            ));
        } else if pk >= pd && lk < ld && lk > 70.0 {
            out.push(Signal::new(
                "STOCH_BEARISH_CROSS",
                SignalCategory::Stochastic,
                SignalStrength::SignificantBearish,
                lk - ld,
            ));
        }
    }
}

fn volume_signals(bars: &[Bar], ind: &IndicatorSet, out: &mut Vec<Signal>) {
    let ratio = ind.volume_ratio();
    let closed_up = bars.len() >= 2 && bars[bars.len() - 1].close > bars[bars.len() - 2].close;

    if ratio >= 3.0 {
        out.push(
            Signal::new(
                if closed_up {
                    "VOLUME_SPIKE_EXTREME_BULLISH"
                } else {
                    "VOLUME_SPIKE_EXTREME_BEARISH"
                },
                SignalCategory::Volume,
                if closed_up {
                    SignalStrength::ExtremeBullish
                } else {
                    SignalStrength::ExtremeBearish
                },
                ratio,
            )
            .with_metadata(json!({ "threshold": 3.0 })),
        );
    } else if ratio >= 2.0 {
        out.push(
            Signal::new(
                if closed_up {
                    "VOLUME_SPIKE_BULLISH"
                } else {
                    "VOLUME_SPIKE_BEARISH"
                },
                SignalCategory::Volume,
                if closed_up {
                    SignalStrength::SignificantBullish
                } else {
                    SignalStrength::SignificantBearish
                },
                ratio,
            )
            .with_metadata(json!({ "threshold": 2.0 })),
        );
    }

    // OBV confirmation: money flow agreeing (or not) with the 20-bar price move.
    if ind.obv.len() >= 21 && ind.closes.len() >= 21 {
        let obv_rising = ind.obv[ind.obv.len() - 1] > ind.obv[ind.obv.len() - 21];
        let price_rising = ind.closes[ind.closes.len() - 1] > ind.closes[ind.closes.len() - 21];
        if obv_rising == price_rising {
            out.push(Signal::new(
                "OBV_CONFIRMS_TREND",
                SignalCategory::Volume,
                if price_rising {
                    SignalStrength::Bullish
                } else {
                    SignalStrength::Bearish
                },
                ind.obv[ind.obv.len() - 1] - ind.obv[ind.obv.len() - 21],
            ));
        } else {
            out.push(Signal::new(
                "OBV_DIVERGENCE",
                SignalCategory::Volume,
                if price_rising {
                    SignalStrength::Bearish
                } else {
                    SignalStrength::Bullish
                },
                ind.obv[ind.obv.len() - 1] - ind.obv[ind.obv.len() - 21],
            ));
        }
    }
}

fn trend_signals(bars: &[Bar], ind: &IndicatorSet, out: &mut Vec<Signal>) {
    let adx = IndicatorSet::last(&ind.adx.adx);
    let pdi = IndicatorSet::last(&ind.adx.plus_di);
    let mdi = IndicatorSet::last(&ind.adx.minus_di);

    if let (Some(adx), Some(pdi), Some(mdi)) = (adx, pdi, mdi) {
        let bullish = pdi > mdi;
        let (name, strength) = if adx >= 40.0 {
            (
                if bullish {
                    "ADX_EXTREME_TREND_BULLISH"
                } else {
                    "ADX_EXTREME_TREND_BEARISH"
                },
                if bullish {
                    SignalStrength::ExtremeBullish
                } else {
                    SignalStrength::ExtremeBearish
                },
            )
        } else if adx >= 25.0 {
            (
                if bullish {
                    "ADX_STRONG_TREND_BULLISH"
                } else {
                    "ADX_STRONG_TREND_BEARISH"
                },
                if bullish {
                    SignalStrength::StrongBullish
                } else {
                    SignalStrength::StrongBearish
                },
            )
        } else if adx >= 20.0 {
            (
                if bullish {
                    "ADX_TREND_FORMING_BULLISH"
                } else {
                    "ADX_TREND_FORMING_BEARISH"
                },
                if bullish {
                    SignalStrength::Bullish
                } else {
                    SignalStrength::Bearish
                },
            )
        } else {
            ("ADX_NO_TREND", SignalStrength::Neutral)
        };
        out.push(Signal::new(name, SignalCategory::Trend, strength, adx));
    }

    if let (Some((pp, lp)), Some((pm, lm))) = (
        IndicatorSet::last2(&ind.adx.plus_di),
        IndicatorSet::last2(&ind.adx.minus_di),
    ) {
        if pp <= pm && lp > lm {
            out.push(Signal::new(
                "DI_BULLISH_CROSS",
                SignalCategory::Trend,
                SignalStrength::SignificantBullish,
                lp - lm,
            ));
        } else if pp >= pm && lp < lm {
            out.push(Signal::new(
                "DI_BEARISH_CROSS",
                SignalCategory::Trend,
                SignalStrength::SignificantBearish,
                lp - lm,
            ));
        }
    }

    // 10-bar rate of change.
    if ind.closes.len() >= 11 {
        let base = ind.closes[ind.closes.len() - 11];
        if base.abs() > f64::EPSILON {
            let roc = (ind.closes[ind.closes.len() - 1] - base) / base * 100.0;
            if roc > 8.0 {
                out.push(Signal::new(
                    "MOMENTUM_SURGE",
                    SignalCategory::Trend,
                    SignalStrength::Bullish,
                    roc,
                ));
            } else if roc < -8.0 {
                out.push(Signal::new(
                    "MOMENTUM_PLUNGE",
                    SignalCategory::Trend,
                    SignalStrength::Bearish,
                    roc,
                ));
            }
        }
    }

    // Range extremes over the fetched window (capped at 252 bars).
    let lookback = bars.len().min(252);
    if lookback >= 50 {
        let window = &bars[bars.len() - lookback..];
        let high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let price = window.last().map(|b| b.close).unwrap_or_default();

        if high > 0.0 && (high - price) / high * 100.0 <= 1.0 {
            out.push(Signal::new(
                "NEAR_RANGE_HIGH",
                SignalCategory::Trend,
                SignalStrength::Bullish,
                (high - price) / high * 100.0,
            ));
        }
        if price > 0.0 && low.is_finite() && (price - low) / price * 100.0 <= 1.0 {
            out.push(Signal::new(
                "NEAR_RANGE_LOW",
                SignalCategory::Trend,
                SignalStrength::Bearish,
                (price - low) / price * 100.0,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn flat_bars(n: usize, close: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                timestamp: Utc::now() - Duration::days((n - i) as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1_000_000.0,
            })
            .collect()
    }

    #[test]
    fn golden_cross_fires_on_breakout_bar() {
        // 259 flat bars then a single strong up bar: SMA50 steps above
        // SMA200 on the final bar.
        let mut bars = flat_bars(259, 100.0);
        let last = Bar {
            timestamp: Utc::now(),
            open: 100.0,
            high: 104.5,
            low: 99.5,
            close: 104.0,
            volume: 1_000_000.0,
        };
        bars.push(last);

        let ind = IndicatorSet::compute(&bars);
        let signals = detect_signals(&bars, &ind);

        let golden = signals.iter().find(|s| s.name == "GOLDEN_CROSS");
        assert!(golden.is_some(), "expected GOLDEN_CROSS in {signals:?}");
        let golden = golden.unwrap();
        assert_eq!(golden.category, SignalCategory::MaCross);
        assert_eq!(golden.strength, SignalStrength::StrongBullish);
    }

    #[test]
    fn no_cross_signals_on_flat_series() {
        let bars = flat_bars(260, 100.0);
        let ind = IndicatorSet::compute(&bars);
        let signals = detect_signals(&bars, &ind);
        assert!(!signals.iter().any(|s| s.category == SignalCategory::MaCross));
    }

    #[test]
    fn rsi_overbought_on_steady_climb() {
        let mut bars = flat_bars(60, 100.0);
        let n = bars.len();
        for (i, bar) in bars.iter_mut().enumerate().skip(n - 20) {
            let close = 100.0 + (i as f64 - (n - 20) as f64) * 2.0;
            bar.open = close - 1.0;
            bar.close = close;
            bar.high = close + 1.0;
            bar.low = close - 2.0;
        }
        let ind = IndicatorSet::compute(&bars);
        let signals = detect_signals(&bars, &ind);
        assert!(signals
            .iter()
            .any(|s| s.name.starts_with("RSI_") && s.strength.is_bearish()));
    }

    #[test]
    fn volume_spike_is_directional() {
        let mut bars = flat_bars(60, 100.0);
        let n = bars.len();
        bars[n - 1].volume = 3_500_000.0;
        bars[n - 1].close = 101.0;
        bars[n - 1].high = 101.5;
        let ind = IndicatorSet::compute(&bars);
        let signals = detect_signals(&bars, &ind);
        let spike = signals
            .iter()
            .find(|s| s.name.starts_with("VOLUME_SPIKE_EXTREME"))
            .expect("extreme volume spike");
        assert!(spike.strength.is_bullish());
        assert!(spike.value >= 3.0);
    }

    #[test]
    fn detection_is_deterministic() {
        let mut bars = flat_bars(259, 100.0);
        bars.push(Bar {
            timestamp: Utc::now(),
            open: 100.0,
            high: 104.5,
            low: 99.5,
            close: 104.0,
            volume: 2_500_000.0,
        });
        let ind = IndicatorSet::compute(&bars);
        let a = detect_signals(&bars, &ind);
        let b = detect_signals(&bars, &ind);
        let names_a: Vec<&str> = a.iter().map(|s| s.name.as_str()).collect();
        let names_b: Vec<&str> = b.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names_a, names_b);
    }
}
