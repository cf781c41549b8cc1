pub mod detector;
pub mod fibonacci;
pub mod indicators;
pub mod ranker;

pub use detector::detect_signals;
pub use fibonacci::{FibLevelKind, FibTrend, FibonacciAnalysis, FibonacciEngine};
pub use indicators::IndicatorSet;
pub use ranker::rank_signals;
