pub mod assessor;

pub use assessor::{RiskAssessor, SymbolMetrics};

#[cfg(test)]
#[path = "assessor_tests.rs"]
mod assessor_tests;
