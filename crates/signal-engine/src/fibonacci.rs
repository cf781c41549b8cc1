use engine_core::{Bar, Signal, SignalCategory, SignalStrength};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Swing windows scanned for retracement structure.
pub const FIB_WINDOWS: [usize; 4] = [20, 50, 100, 200];

const RETRACEMENTS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];
const EXTENSIONS: [f64; 5] = [1.272, 1.414, 1.618, 2.0, 2.618];

/// Fibonacci bar counts checked for time symmetry from the last swing point.
const TIME_COUNTS: [usize; 5] = [8, 13, 21, 34, 55];

/// Golden pocket band, quoted as retracement ratios in an uptrend.
const GOLDEN_POCKET: (f64, f64) = (0.618, 0.65);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FibTrend {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FibLevelKind {
    Retracement,
    Extension,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibLevel {
    pub window: usize,
    pub kind: FibLevelKind,
    pub ratio: f64,
    pub price: f64,
}

/// Swing structure detected for one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibWindow {
    pub window: usize,
    pub trend: FibTrend,
    pub swing_high: f64,
    pub swing_low: f64,
    pub swing_high_index: usize,
    pub swing_low_index: usize,
    pub levels: Vec<FibLevel>,
}

/// Two or more windows agreeing on a price level within tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibConfluence {
    pub price: f64,
    pub windows: Vec<usize>,
    pub ratios: Vec<f64>,
}

/// Full multi-window Fibonacci read for one series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibonacciAnalysis {
    pub symbol: String,
    pub current_price: f64,
    /// Adaptive proximity tolerance, percent of level price.
    pub tolerance_pct: f64,
    pub windows: Vec<FibWindow>,
    pub confluences: Vec<FibConfluence>,
    pub signals: Vec<Signal>,
}

pub struct FibonacciEngine;

impl FibonacciEngine {
    /// Analyze swing structure over every window that fits in the series.
    /// `atr` drives the adaptive tolerance; callers pass the last ATR(14).
    pub fn analyze(symbol: &str, bars: &[Bar], atr: f64) -> FibonacciAnalysis {
        let price = bars.last().map(|b| b.close).unwrap_or_default();
        let tolerance_pct = if price > 0.0 {
            ((atr * 0.5) / price * 100.0).clamp(0.5, 2.0)
        } else {
            0.5
        };

        let mut windows = Vec::new();
        for w in FIB_WINDOWS {
            if bars.len() >= w {
                if let Some(fw) = Self::window_levels(bars, w) {
                    windows.push(fw);
                }
            }
        }

        let confluences = Self::find_confluences(&windows, tolerance_pct);
        let signals = Self::emit_signals(price, tolerance_pct, &windows, &confluences, bars.len());

        FibonacciAnalysis {
            symbol: symbol.to_string(),
            current_price: price,
            tolerance_pct,
            windows,
            confluences,
            signals,
        }
    }

    fn window_levels(bars: &[Bar], window: usize) -> Option<FibWindow> {
        let slice = &bars[bars.len() - window..];

        let mut high_idx = 0;
        let mut low_idx = 0;
        for (i, bar) in slice.iter().enumerate() {
            if bar.close > slice[high_idx].close {
                high_idx = i;
            }
            if bar.close < slice[low_idx].close {
                low_idx = i;
            }
        }

        let swing_high = slice[high_idx].close;
        let swing_low = slice[low_idx].close;
        let diff = swing_high - swing_low;
        if diff <= 0.0 {
            return None;
        }

        // Trend follows swing order: low before high means the move is up.
        let trend = if low_idx < high_idx {
            FibTrend::Up
        } else {
            FibTrend::Down
        };

        let mut levels = Vec::with_capacity(RETRACEMENTS.len() + EXTENSIONS.len());
        for ratio in RETRACEMENTS {
            let price = match trend {
                FibTrend::Up => swing_high - diff * ratio,
                FibTrend::Down => swing_low + diff * ratio,
            };
            levels.push(FibLevel {
                window,
                kind: FibLevelKind::Retracement,
                ratio,
                price,
            });
        }
        for ratio in EXTENSIONS {
            let price = match trend {
                FibTrend::Up => swing_low + diff * ratio,
                FibTrend::Down => swing_high - diff * ratio,
            };
            levels.push(FibLevel {
                window,
                kind: FibLevelKind::Extension,
                ratio,
                price,
            });
        }

        Some(FibWindow {
            window,
            trend,
            swing_high,
            swing_low,
            swing_high_index: bars.len() - window + high_idx,
            swing_low_index: bars.len() - window + low_idx,
            levels,
        })
    }

    fn find_confluences(windows: &[FibWindow], tolerance_pct: f64) -> Vec<FibConfluence> {
        let mut all: Vec<&FibLevel> = windows.iter().flat_map(|w| w.levels.iter()).collect();
        all.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));

        let mut confluences: Vec<FibConfluence> = Vec::new();
        let mut used = vec![false; all.len()];

        for i in 0..all.len() {
            if used[i] || all[i].price <= 0.0 {
                continue;
            }
            let mut group = vec![i];
            for j in i + 1..all.len() {
                if used[j] {
                    continue;
                }
                let spread = (all[j].price - all[i].price).abs() / all[i].price * 100.0;
                if spread <= tolerance_pct {
                    group.push(j);
                } else {
                    break;
                }
            }

            let mut group_windows: Vec<usize> = group.iter().map(|&k| all[k].window).collect();
            group_windows.sort_unstable();
            group_windows.dedup();
            if group_windows.len() < 2 {
                continue;
            }

            for &k in &group {
                used[k] = true;
            }
            let mean = group.iter().map(|&k| all[k].price).sum::<f64>() / group.len() as f64;
            confluences.push(FibConfluence {
                price: mean,
                windows: group_windows,
                ratios: group.iter().map(|&k| all[k].ratio).collect(),
            });
        }

        confluences
    }

    fn emit_signals(
        price: f64,
        tolerance_pct: f64,
        windows: &[FibWindow],
        confluences: &[FibConfluence],
        total_bars: usize,
    ) -> Vec<Signal> {
        let mut signals = Vec::new();
        if price <= 0.0 {
            return signals;
        }

        for fw in windows {
            for level in &fw.levels {
                if level.price <= 0.0 {
                    continue;
                }
                let distance_pct = (price - level.price).abs() / level.price * 100.0;
                if distance_pct > tolerance_pct {
                    continue;
                }

                // Retracements in trend direction act as support/resistance.
                let strength = match (fw.trend, level.kind) {
                    (FibTrend::Up, FibLevelKind::Retracement) => SignalStrength::Bullish,
                    (FibTrend::Down, FibLevelKind::Retracement) => SignalStrength::Bearish,
                    (FibTrend::Up, FibLevelKind::Extension) => SignalStrength::Bearish,
                    (FibTrend::Down, FibLevelKind::Extension) => SignalStrength::Bullish,
                };
                let kind = match level.kind {
                    FibLevelKind::Retracement => "RETRACEMENT",
                    FibLevelKind::Extension => "EXTENSION",
                };
                signals.push(
                    Signal::new(
                        format!("FIB_{}_{:.3}_W{}", kind, level.ratio, level.window),
                        SignalCategory::FibPriceLevel,
                        strength,
                        level.price,
                    )
                    .with_metadata(json!({
                        "window": level.window,
                        "ratio": level.ratio,
                        "distance_pct": distance_pct,
                    })),
                );
            }

            // Golden pocket: the 0.618-0.65 retracement band.
            let diff = fw.swing_high - fw.swing_low;
            let (band_a, band_b) = match fw.trend {
                FibTrend::Up => (
                    fw.swing_high - diff * GOLDEN_POCKET.1,
                    fw.swing_high - diff * GOLDEN_POCKET.0,
                ),
                FibTrend::Down => (
                    fw.swing_low + diff * GOLDEN_POCKET.0,
                    fw.swing_low + diff * GOLDEN_POCKET.1,
                ),
            };
            let pad = price * tolerance_pct / 100.0;
            if price >= band_a - pad && price <= band_b + pad {
                let strength = match fw.trend {
                    FibTrend::Up => SignalStrength::StrongBullish,
                    FibTrend::Down => SignalStrength::StrongBearish,
                };
                signals.push(
                    Signal::new(
                        format!("FIB_GOLDEN_POCKET_W{}", fw.window),
                        SignalCategory::FibPriceLevel,
                        strength,
                        (band_a + band_b) / 2.0,
                    )
                    .with_metadata(json!({
                        "window": fw.window,
                        "band": [band_a, band_b],
                    })),
                );
            }
        }

        // Confluence zones are only actionable when price is at them.
        for confluence in confluences {
            let distance_pct = (price - confluence.price).abs() / confluence.price * 100.0;
            if distance_pct > tolerance_pct {
                continue;
            }
            let up_votes = windows
                .iter()
                .filter(|w| confluence.windows.contains(&w.window) && w.trend == FibTrend::Up)
                .count();
            let strength = if up_votes * 2 >= confluence.windows.len() {
                SignalStrength::SignificantBullish
            } else {
                SignalStrength::SignificantBearish
            };
            signals.push(
                Signal::new(
                    "FIB_CONFLUENCE",
                    SignalCategory::FibConfluence,
                    strength,
                    confluence.price,
                )
                .with_metadata(json!({
                    "windows": confluence.windows,
                    "ratios": confluence.ratios,
                })),
            );
        }

        // Time symmetry from the most recent swing point of the widest window.
        if let Some(widest) = windows.last() {
            let swing_idx = widest.swing_high_index.max(widest.swing_low_index);
            let bars_since = total_bars.saturating_sub(1).saturating_sub(swing_idx);
            if TIME_COUNTS.contains(&bars_since) {
                signals.push(
                    Signal::new(
                        format!("FIB_TIME_{bars_since}"),
                        SignalCategory::FibTime,
                        SignalStrength::Neutral,
                        bars_since as f64,
                    )
                    .with_metadata(json!({ "window": widest.window })),
                );
            }
        }

        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bar(i: usize, n: usize, close: f64) -> Bar {
        Bar {
            timestamp: Utc::now() - Duration::days((n - i) as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000_000.0,
        }
    }

    /// Rise 100 -> 120 then pull back toward the 61.8% retracement (107.64).
    fn pullback_series(target: f64) -> Vec<Bar> {
        let n = 60;
        let mut bars = Vec::with_capacity(n);
        for i in 0..40 {
            bars.push(bar(i, n, 100.0 + i as f64 * 0.5128));
        }
        let peak = bars.last().unwrap().close;
        for i in 40..n {
            let t = (i - 40) as f64 / 19.0;
            bars.push(bar(i, n, peak + (target - peak) * t));
        }
        bars
    }

    #[test]
    fn uptrend_detected_when_low_precedes_high() {
        let bars = pullback_series(115.0);
        let analysis = FibonacciEngine::analyze("TEST", &bars, 1.0);
        let w20 = analysis.windows.iter().find(|w| w.window == 50).unwrap();
        assert_eq!(w20.trend, FibTrend::Up);
        assert!(w20.swing_low_index < w20.swing_high_index);
    }

    #[test]
    fn retracement_levels_bracket_the_swing() {
        let bars = pullback_series(112.0);
        let analysis = FibonacciEngine::analyze("TEST", &bars, 1.0);
        let fw = analysis.windows.iter().find(|w| w.window == 50).unwrap();
        for level in fw.levels.iter().filter(|l| l.kind == FibLevelKind::Retracement) {
            assert!(level.price <= fw.swing_high + 1e-9);
            assert!(level.price >= fw.swing_low - 1e-9);
        }
        // Extensions project beyond the swing high in an uptrend.
        for level in fw.levels.iter().filter(|l| l.kind == FibLevelKind::Extension) {
            assert!(level.price > fw.swing_high);
        }
    }

    #[test]
    fn golden_pocket_emits_strong_signal() {
        // The 50-bar swing runs ~105.1 -> 120, so the 61.8-65% retracement
        // band sits near 110.3-110.8.
        let bars = pullback_series(110.5);
        let analysis = FibonacciEngine::analyze("TEST", &bars, 2.0);
        let pocket = analysis
            .signals
            .iter()
            .find(|s| s.name.starts_with("FIB_GOLDEN_POCKET"));
        assert!(pocket.is_some(), "signals: {:?}", analysis.signals);
        assert_eq!(pocket.unwrap().strength, SignalStrength::StrongBullish);
    }

    #[test]
    fn tolerance_is_clamped() {
        let bars = pullback_series(110.0);
        let tight = FibonacciEngine::analyze("TEST", &bars, 0.0001);
        assert!((tight.tolerance_pct - 0.5).abs() < 1e-9);
        let wide = FibonacciEngine::analyze("TEST", &bars, 50.0);
        assert!((wide.tolerance_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn confluence_requires_two_windows() {
        let bars = pullback_series(108.0);
        let analysis = FibonacciEngine::analyze("TEST", &bars, 1.5);
        for c in &analysis.confluences {
            assert!(c.windows.len() >= 2);
        }
    }
}
