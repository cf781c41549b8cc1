pub mod analyzer;
pub mod overview;

pub use analyzer::{SpreadAnalyzer, SpreadRequest};
pub use overview::{chain_overview, ChainOverview};

#[cfg(test)]
#[path = "analyzer_tests.rs"]
mod analyzer_tests;
