pub mod error;
pub mod traits;
pub mod types;
pub mod universe;

pub use error::{EngineError, EngineResult};
pub use traits::QuoteSource;
pub use types::*;
pub use universe::{sector_etf, sector_of, UniverseName};

/// Version tag embedded in every persisted JSON result payload.
pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// Minimum number of bars required for full analysis.
pub const MIN_BARS: usize = 50;
