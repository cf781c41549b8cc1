use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Named symbol universe, compiled into the binary. Not user-configurable
/// at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseName {
    Sp500,
    Nasdaq100,
    EtfLargeCap,
    EtfSector,
    Beta1,
}

impl UniverseName {
    pub fn as_str(&self) -> &'static str {
        match self {
            UniverseName::Sp500 => "sp500",
            UniverseName::Nasdaq100 => "nasdaq100",
            UniverseName::EtfLargeCap => "etf_large_cap",
            UniverseName::EtfSector => "etf_sector",
            UniverseName::Beta1 => "beta1",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "sp500" => Ok(UniverseName::Sp500),
            "nasdaq100" => Ok(UniverseName::Nasdaq100),
            "etf_large_cap" => Ok(UniverseName::EtfLargeCap),
            "etf_sector" => Ok(UniverseName::EtfSector),
            "beta1" => Ok(UniverseName::Beta1),
            other => Err(EngineError::Validation(format!(
                "unknown universe '{other}'"
            ))),
        }
    }

    pub fn symbols(&self) -> &'static [&'static str] {
        match self {
            UniverseName::Sp500 => SP500,
            UniverseName::Nasdaq100 => NASDAQ100,
            UniverseName::EtfLargeCap => ETF_LARGE_CAP,
            UniverseName::EtfSector => ETF_SECTOR,
            UniverseName::Beta1 => BETA1,
        }
    }
}

// Large-cap slice of the S&P 500, ordered by weight.
static SP500: &[&str] = &[
    "AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "BRK.B", "LLY", "AVGO", "TSLA", "JPM", "V",
    "UNH", "XOM", "MA", "PG", "COST", "HD", "JNJ", "WMT", "NFLX", "ABBV", "CRM", "BAC", "ORCL",
    "CVX", "MRK", "KO", "AMD", "PEP", "ADBE", "TMO", "LIN", "WFC", "CSCO", "ACN", "MCD", "ABT",
    "PM", "IBM", "TXN", "GE", "INTU", "QCOM", "DHR", "VZ", "AMGN", "CAT", "NOW", "PFE", "NEE",
    "DIS", "SPGI", "UNP", "RTX", "CMCSA", "LOW", "AXP", "HON", "COP", "UPS", "T", "BA", "GS",
    "AMAT", "MS", "SYK", "BLK", "NKE", "LMT", "SCHW", "BKNG", "ELV", "PLD", "MDT", "TJX", "DE",
    "ADP", "SBUX", "VRTX", "C", "GILD", "MMC", "BMY", "ADI", "CB", "REGN", "MU", "ETN", "LRCX",
    "CI", "ZTS", "BSX", "SO", "PGR", "MO", "EOG", "DUK", "ISRG", "CME",
];

static NASDAQ100: &[&str] = &[
    "AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "AVGO", "TSLA", "COST", "NFLX", "AMD",
    "PEP", "ADBE", "CSCO", "TMUS", "INTU", "QCOM", "TXN", "CMCSA", "AMGN", "HON", "AMAT",
    "BKNG", "VRTX", "SBUX", "GILD", "ADI", "MU", "ISRG", "LRCX", "REGN", "MDLZ", "PYPL",
    "KLAC", "SNPS", "CDNS", "MAR", "MELI", "CSX", "ORLY", "ABNB", "CRWD", "CTAS", "NXPI",
    "ADSK", "ROP", "PCAR", "WDAY", "MNST", "FTNT", "DXCM", "CHTR", "AEP", "PAYX", "KDP",
    "ODFL", "ROST", "FAST", "EXC", "IDXX", "CTSH", "VRSK", "KHC", "GEHC", "LULU", "CCEP",
    "EA", "XEL", "DDOG", "CSGP", "ANSS", "ON", "ZS", "BIIB", "TEAM", "DLTR", "WBD", "MDB",
    "ILMN", "WBA", "SIRI",
];

static ETF_LARGE_CAP: &[&str] = &[
    "SPY", "QQQ", "DIA", "IWM", "VTI", "VOO", "IVV", "VEA", "VWO", "EFA", "AGG", "BND", "GLD",
    "SLV", "TLT", "HYG", "LQD", "EEM", "XLK", "VUG",
];

static ETF_SECTOR: &[&str] = &[
    "XLK", "XLF", "XLV", "XLE", "XLY", "XLP", "XLI", "XLB", "XLU", "XLRE", "XLC", "SMH", "XBI",
    "KRE", "XHB", "XRT", "ITB", "OIH", "GDX", "IYR",
];

// High-beta movers (beta >= 1) commonly used for momentum scans.
static BETA1: &[&str] = &[
    "TSLA", "NVDA", "AMD", "COIN", "MSTR", "PLTR", "SHOP", "SQ", "ROKU", "DKNG", "RIVN", "SOFI",
    "AFRM", "UPST", "MARA", "RIOT", "CVNA", "NET", "SNOW", "CRWD", "DDOG", "MDB", "ZS", "U",
    "RBLX", "HOOD", "LCID", "PLUG", "AI", "SMCI",
];

/// GICS-style sector for a symbol, where known. Unknown symbols report
/// "Other" at the aggregation layer.
pub fn sector_of(symbol: &str) -> Option<&'static str> {
    let sector = match symbol {
        "AAPL" | "MSFT" | "NVDA" | "AVGO" | "AMD" | "ADBE" | "CRM" | "ORCL" | "CSCO" | "ACN"
        | "IBM" | "TXN" | "INTU" | "QCOM" | "NOW" | "AMAT" | "MU" | "LRCX" | "ADI" | "KLAC"
        | "SNPS" | "CDNS" | "PLTR" | "SHOP" | "SQ" | "NET" | "SNOW" | "CRWD" | "DDOG" | "MDB"
        | "ZS" | "U" | "SMCI" | "INTC" | "PYPL" | "FTNT" | "WDAY" | "ADSK" | "ANSS" | "ON"
        | "TEAM" | "NXPI" | "GOOGL" | "META" | "NFLX" | "CMCSA" | "DIS" | "TMUS" | "T" | "VZ"
        | "CHTR" | "EA" | "WBD" | "SIRI" | "RBLX" => "Technology",
        "JPM" | "V" | "MA" | "BAC" | "WFC" | "GS" | "MS" | "AXP" | "BLK" | "SCHW" | "C" | "CB"
        | "PGR" | "MMC" | "SPGI" | "CME" | "COIN" | "SOFI" | "AFRM" | "UPST" | "HOOD"
        | "BRK.B" => "Financials",
        "LLY" | "UNH" | "JNJ" | "ABBV" | "MRK" | "TMO" | "ABT" | "AMGN" | "DHR" | "PFE"
        | "SYK" | "MDT" | "ELV" | "VRTX" | "GILD" | "BMY" | "REGN" | "CI" | "ZTS" | "BSX"
        | "ISRG" | "DXCM" | "IDXX" | "GEHC" | "BIIB" | "ILMN" | "WBA" | "MDLZ" => "Healthcare",
        "XOM" | "CVX" | "COP" | "EOG" | "MARA" | "RIOT" | "PLUG" => "Energy",
        "AMZN" | "TSLA" | "HD" | "MCD" | "NKE" | "LOW" | "SBUX" | "TJX" | "BKNG" | "MAR"
        | "ABNB" | "ORLY" | "ROST" | "LULU" | "DLTR" | "MELI" | "CVNA" | "RIVN" | "LCID"
        | "DKNG" | "ROKU" => "Consumer Discretionary",
        "PG" | "COST" | "WMT" | "KO" | "PEP" | "PM" | "MO" | "KDP" | "KHC" | "MNST" | "CCEP" => {
            "Consumer Staples"
        }
        "GE" | "CAT" | "UNP" | "RTX" | "HON" | "UPS" | "BA" | "LMT" | "DE" | "ADP" | "ETN"
        | "CSX" | "CTAS" | "PCAR" | "ODFL" | "FAST" | "PAYX" | "VRSK" | "CTSH" => "Industrials",
        "LIN" | "APD" | "SHW" | "FCX" | "NEM" => "Materials",
        "NEE" | "SO" | "DUK" | "AEP" | "EXC" | "XEL" => "Utilities",
        "PLD" | "AMT" | "EQIX" | "CSGP" | "IYR" => "Real Estate",
        _ => return None,
    };
    Some(sector)
}

/// Fixed sector -> hedging ETF table.
pub fn sector_etf(sector: &str) -> Option<&'static str> {
    let etf = match sector {
        "Technology" => "XLK",
        "Financials" => "XLF",
        "Healthcare" => "XLV",
        "Energy" => "XLE",
        "Consumer Discretionary" => "XLY",
        "Consumer Staples" => "XLP",
        "Industrials" => "XLI",
        "Materials" => "XLB",
        "Utilities" => "XLU",
        "Real Estate" => "XLRE",
        _ => return None,
    };
    Some(etf)
}
