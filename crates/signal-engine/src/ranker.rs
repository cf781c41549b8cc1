use engine_core::{RankedSignal, Signal, SignalCategory};

/// Maximum deterministic score.
pub const SCORE_CAP: f64 = 95.0;

/// Categories that carry a +10 bonus on top of the strength base score.
const BONUS_CATEGORIES: [SignalCategory; 4] = [
    SignalCategory::MaCross,
    SignalCategory::Macd,
    SignalCategory::Volume,
    SignalCategory::FibConfluence,
];

fn score(signal: &Signal) -> f64 {
    let base = signal.strength.base_score();
    let bonus = if BONUS_CATEGORIES.contains(&signal.category) {
        10.0
    } else {
        0.0
    };
    (base + bonus).min(SCORE_CAP)
}

/// Deterministic ranking: score desc, then category priority, then recency
/// (later detection order wins — fib/time rules run after the bar rules and
/// reflect the freshest structure).
pub fn rank_signals(signals: Vec<Signal>) -> Vec<RankedSignal> {
    let mut scored: Vec<(usize, f64, Signal)> = signals
        .into_iter()
        .enumerate()
        .map(|(idx, s)| {
            let sc = score(&s);
            (idx, sc, s)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.2.category.priority().cmp(&b.2.category.priority()))
            .then_with(|| b.0.cmp(&a.0))
    });

    scored
        .into_iter()
        .enumerate()
        .map(|(rank, (_, score, signal))| RankedSignal {
            signal,
            score,
            rank: rank + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::SignalStrength;

    fn sig(name: &str, category: SignalCategory, strength: SignalStrength) -> Signal {
        Signal::new(name, category, strength, 1.0)
    }

    #[test]
    fn base_scores_follow_strength_table() {
        let ranked = rank_signals(vec![
            sig("a", SignalCategory::Rsi, SignalStrength::ExtremeBullish),
            sig("b", SignalCategory::Rsi, SignalStrength::StrongBearish),
            sig("c", SignalCategory::Rsi, SignalStrength::SignificantBullish),
            sig("d", SignalCategory::Rsi, SignalStrength::Bearish),
        ]);
        let by_name = |n: &str| ranked.iter().find(|r| r.signal.name == n).unwrap().score;
        assert_eq!(by_name("a"), 85.0);
        assert_eq!(by_name("b"), 75.0);
        assert_eq!(by_name("c"), 65.0);
        assert_eq!(by_name("d"), 55.0);
    }

    #[test]
    fn bonus_categories_add_ten_capped_at_95() {
        let ranked = rank_signals(vec![
            sig("cross", SignalCategory::MaCross, SignalStrength::ExtremeBullish),
            sig("macd", SignalCategory::Macd, SignalStrength::Bullish),
            sig("boll", SignalCategory::Bollinger, SignalStrength::Bullish),
        ]);
        let by_name = |n: &str| ranked.iter().find(|r| r.signal.name == n).unwrap().score;
        assert_eq!(by_name("cross"), 95.0); // 85 + 10
        assert_eq!(by_name("macd"), 65.0); // 55 + 10
        assert_eq!(by_name("boll"), 55.0); // no bonus
    }

    #[test]
    fn ranks_are_sequential_and_sorted() {
        let ranked = rank_signals(vec![
            sig("low", SignalCategory::Stochastic, SignalStrength::Bullish),
            sig("high", SignalCategory::MaCross, SignalStrength::StrongBullish),
            sig("mid", SignalCategory::Trend, SignalStrength::SignificantBearish),
        ]);
        let ranks: Vec<usize> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(ranked[0].signal.name, "high");
    }

    #[test]
    fn ties_break_by_category_priority() {
        // Both score 85: extreme RSI vs strong MA cross (75+10).
        let ranked = rank_signals(vec![
            sig("rsi", SignalCategory::Rsi, SignalStrength::ExtremeBullish),
            sig("cross", SignalCategory::MaCross, SignalStrength::StrongBullish),
        ]);
        assert_eq!(ranked[0].signal.name, "cross");
    }
}
