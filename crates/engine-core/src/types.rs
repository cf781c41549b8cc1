use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Price bounds sanity check: low <= open,close <= high and volume >= 0.
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
            && self.volume >= 0.0
    }
}

/// Fetch period for a bar series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "5d")]
    D5,
    #[serde(rename = "1mo")]
    Mo1,
    #[serde(rename = "3mo")]
    Mo3,
    #[serde(rename = "6mo")]
    Mo6,
    #[serde(rename = "1y")]
    Y1,
    #[serde(rename = "2y")]
    Y2,
    #[serde(rename = "5y")]
    Y5,
    #[serde(rename = "10y")]
    Y10,
    #[serde(rename = "ytd")]
    Ytd,
    #[serde(rename = "max")]
    Max,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::M15 => "15m",
            Period::H1 => "1h",
            Period::H4 => "4h",
            Period::D1 => "1d",
            Period::D5 => "5d",
            Period::Mo1 => "1mo",
            Period::Mo3 => "3mo",
            Period::Mo6 => "6mo",
            Period::Y1 => "1y",
            Period::Y2 => "2y",
            Period::Y5 => "5y",
            Period::Y10 => "10y",
            Period::Ytd => "ytd",
            Period::Max => "max",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "15m" => Ok(Period::M15),
            "1h" => Ok(Period::H1),
            "4h" => Ok(Period::H4),
            "1d" => Ok(Period::D1),
            "5d" => Ok(Period::D5),
            "1mo" => Ok(Period::Mo1),
            "3mo" => Ok(Period::Mo3),
            "6mo" => Ok(Period::Mo6),
            "1y" => Ok(Period::Y1),
            "2y" => Ok(Period::Y2),
            "5y" => Ok(Period::Y5),
            "10y" => Ok(Period::Y10),
            "ytd" => Ok(Period::Ytd),
            "max" => Ok(Period::Max),
            other => Err(EngineError::Validation(format!("unknown period '{other}'"))),
        }
    }

    /// Periods whose bar resolution is finer than a day.
    pub fn is_intraday(&self) -> bool {
        matches!(self, Period::M15 | Period::H1 | Period::H4)
    }

    /// Approximate length of one bar in seconds. Intraday periods resolve
    /// to their own bar size; everything else is served as daily bars.
    pub fn bar_seconds(&self) -> i64 {
        match self {
            Period::M15 => 15 * 60,
            Period::H1 => 60 * 60,
            Period::H4 => 4 * 60 * 60,
            _ => 24 * 60 * 60,
        }
    }

    /// Quote cache TTL: intraday 60s, daily 300s.
    pub fn cache_ttl_secs(&self) -> i64 {
        if self.is_intraday() {
            60
        } else {
            300
        }
    }
}

/// Ordered bar sequence for one (symbol, period).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub symbol: String,
    pub period: Period,
    pub bars: Vec<Bar>,
}

impl Series {
    /// Build a series, sorting bars by timestamp and dropping duplicates so
    /// indicator output is independent of vendor ordering.
    pub fn new(symbol: impl Into<String>, period: Period, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        Self {
            symbol: symbol.into(),
            period,
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Close-over-close change of the last two bars, in percent.
    pub fn change_percent(&self) -> Option<f64> {
        if self.bars.len() < 2 {
            return None;
        }
        let prev = self.bars[self.bars.len() - 2].close;
        let last = self.bars[self.bars.len() - 1].close;
        if prev.abs() < f64::EPSILON {
            return None;
        }
        Some((last - prev) / prev * 100.0)
    }

    pub fn ensure_min_bars(&self, min: usize) -> EngineResult<()> {
        if self.bars.len() < min {
            return Err(EngineError::InsufficientData(format!(
                "{}: {} bars available, {} required",
                self.symbol,
                self.bars.len(),
                min
            )));
        }
        Ok(())
    }
}

/// Option contract side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

/// Single contract row from an option chain snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub contract: String,
    pub kind: OptionKind,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub implied_volatility: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub open_interest: i64,
    pub volume: i64,
}

impl OptionContract {
    /// Mid premium, falling back to last trade when the book is empty.
    pub fn mid(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.last
        }
    }
}

/// Option chain snapshot for one underlying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChain {
    pub symbol: String,
    pub underlying_price: f64,
    pub expirations: Vec<NaiveDate>,
    pub contracts: Vec<OptionContract>,
}

impl OptionChain {
    pub fn find(&self, kind: OptionKind, strike: f64, expiration: NaiveDate) -> Option<&OptionContract> {
        self.contracts.iter().find(|c| {
            c.kind == kind && c.expiration == expiration && (c.strike - strike).abs() < 1e-6
        })
    }

    /// Expiration closest to the requested days-to-expiration.
    pub fn expiration_near_dte(&self, today: NaiveDate, target_dte: i64) -> Option<NaiveDate> {
        self.expirations
            .iter()
            .copied()
            .filter(|e| *e >= today)
            .min_by_key(|e| ((*e - today).num_days() - target_dte).abs())
    }
}

/// Signal category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalCategory {
    MaCross,
    MaTrend,
    Rsi,
    Macd,
    Bollinger,
    Stochastic,
    Volume,
    Trend,
    FibPriceLevel,
    FibConfluence,
    FibTime,
}

impl SignalCategory {
    /// Tie-break priority for ranking: lower is more important.
    pub fn priority(&self) -> u8 {
        match self {
            SignalCategory::MaCross => 0,
            SignalCategory::Macd => 1,
            SignalCategory::FibConfluence => 2,
            SignalCategory::Volume => 3,
            SignalCategory::MaTrend => 4,
            SignalCategory::Trend => 5,
            SignalCategory::Rsi => 6,
            SignalCategory::Bollinger => 7,
            SignalCategory::Stochastic => 8,
            SignalCategory::FibPriceLevel => 9,
            SignalCategory::FibTime => 10,
        }
    }
}

/// Signal strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    ExtremeBullish,
    StrongBullish,
    SignificantBullish,
    Bullish,
    Neutral,
    Bearish,
    SignificantBearish,
    StrongBearish,
    ExtremeBearish,
}

impl SignalStrength {
    pub fn is_bullish(&self) -> bool {
        matches!(
            self,
            SignalStrength::ExtremeBullish
                | SignalStrength::StrongBullish
                | SignalStrength::SignificantBullish
                | SignalStrength::Bullish
        )
    }

    pub fn is_bearish(&self) -> bool {
        matches!(
            self,
            SignalStrength::ExtremeBearish
                | SignalStrength::StrongBearish
                | SignalStrength::SignificantBearish
                | SignalStrength::Bearish
        )
    }

    /// Deterministic base score for the ranker.
    pub fn base_score(&self) -> f64 {
        match self {
            SignalStrength::ExtremeBullish | SignalStrength::ExtremeBearish => 85.0,
            SignalStrength::StrongBullish | SignalStrength::StrongBearish => 75.0,
            SignalStrength::SignificantBullish | SignalStrength::SignificantBearish => 65.0,
            SignalStrength::Bullish | SignalStrength::Bearish => 55.0,
            SignalStrength::Neutral => 40.0,
        }
    }
}

/// Detected trading signal, prior to ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub category: SignalCategory,
    pub strength: SignalStrength,
    pub value: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Signal {
    pub fn new(
        name: impl Into<String>,
        category: SignalCategory,
        strength: SignalStrength,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            strength,
            value,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Signal with a deterministic score and rank attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSignal {
    #[serde(flatten)]
    pub signal: Signal,
    pub score: f64,
    pub rank: usize,
}

/// Directional bias derived from the signal set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityRegime {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTimeframe {
    Scalp,
    Day,
    Swing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeQuality {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vehicle {
    Stock,
    OptionCall,
    OptionPut,
    OptionSpread,
}

/// Stop placement of a trade plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopPlan {
    pub price: f64,
    pub atr_mult: f64,
    pub pct: f64,
}

/// Profit target of a trade plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetPlan {
    pub price: f64,
    pub pct: f64,
    pub atr_mult: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReward {
    pub risk: f64,
    pub reward: f64,
    pub ratio: f64,
}

/// Full risk assessment for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub atr: f64,
    pub atr_pct: f64,
    pub volatility: VolatilityRegime,
    pub adx: f64,
    pub is_trending: bool,
    pub volume_ratio: f64,
    pub bias: Bias,
    pub timeframe: PlanTimeframe,
    pub stop: StopPlan,
    pub target: TargetPlan,
    pub rr: RiskReward,
    pub quality: TradeQuality,
    pub suppressions: Vec<String>,
}

/// Suggested option structure when the vehicle is not stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSuggestion {
    pub kind: OptionKind,
    pub dte_min: i64,
    pub dte_max: i64,
    pub delta_min: f64,
    pub delta_max: f64,
    pub spread_width: Option<f64>,
}

/// Risk assessment plus execution framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    pub symbol: String,
    pub current_price: f64,
    #[serde(flatten)]
    pub assessment: RiskAssessment,
    pub vehicle: Vehicle,
    pub option_suggestions: Option<OptionSuggestion>,
    pub primary_signal: Option<RankedSignal>,
    pub supporting_signals: Vec<RankedSignal>,
}

impl TradePlan {
    /// Qualification gate: every predicate must hold for the plan to be
    /// surfaced by the trade scanner.
    pub fn is_qualified(&self) -> bool {
        let a = &self.assessment;
        a.rr.ratio >= 1.5
            && a.quality != TradeQuality::Low
            && a.bias != Bias::Neutral
            && a.suppressions.is_empty()
            && (0.5..=3.0).contains(&a.stop.atr_mult)
            && a.adx >= 20.0
            && a.volume_ratio >= 0.5
    }
}

/// Option spread strategy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadKind {
    CallCredit,
    PutCredit,
    CallDebit,
    PutDebit,
    IronCondor,
    IronButterfly,
}

impl SpreadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpreadKind::CallCredit => "call_credit",
            SpreadKind::PutCredit => "put_credit",
            SpreadKind::CallDebit => "call_debit",
            SpreadKind::PutDebit => "put_debit",
            SpreadKind::IronCondor => "iron_condor",
            SpreadKind::IronButterfly => "iron_butterfly",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "call_credit" => Ok(SpreadKind::CallCredit),
            "put_credit" => Ok(SpreadKind::PutCredit),
            "call_debit" => Ok(SpreadKind::CallDebit),
            "put_debit" => Ok(SpreadKind::PutDebit),
            "iron_condor" => Ok(SpreadKind::IronCondor),
            "iron_butterfly" => Ok(SpreadKind::IronButterfly),
            other => Err(EngineError::Validation(format!(
                "unknown spread type '{other}'"
            ))),
        }
    }

    /// Four-legged structures need both a call and a put vertical.
    pub fn is_four_legged(&self) -> bool {
        matches!(self, SpreadKind::IronCondor | SpreadKind::IronButterfly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpreadStatus {
    MaxProfit,
    Profitable,
    Breakeven,
    AtRisk,
    MaxLoss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegSide {
    Long,
    Short,
}

/// One leg of an option structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    pub contract: String,
    pub kind: OptionKind,
    pub side: LegSide,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub premium: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub open_interest: i64,
    pub volume: i64,
}

/// Position-signed Greeks aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

/// Analyzed option spread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadResult {
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: SpreadKind,
    pub legs: Vec<Leg>,
    pub dte: i64,
    pub contracts: u32,
    pub max_profit: f64,
    pub max_loss: f64,
    pub breakevens: Vec<f64>,
    pub pop: f64,
    pub rr: RiskReward,
    pub net_debit_credit: f64,
    pub net_greeks: NetGreeks,
    pub status: SpreadStatus,
    pub warnings: Vec<String>,
}

/// Portfolio input position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub shares: f64,
    pub entry_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioRiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl PortfolioRiskLevel {
    pub fn escalate(self) -> Self {
        match self {
            PortfolioRiskLevel::Low => PortfolioRiskLevel::Medium,
            PortfolioRiskLevel::Medium => PortfolioRiskLevel::High,
            _ => PortfolioRiskLevel::Extreme,
        }
    }
}

/// Per-position risk report inside a portfolio assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub symbol: String,
    pub shares: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub current_value: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_pct: f64,
    pub stop_price: f64,
    pub max_loss: f64,
    pub quality: TradeQuality,
    pub sector: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HedgeKind {
    SectorHedge,
    TightenStops,
    IndexHedge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeSuggestion {
    pub kind: HedgeKind,
    pub instrument: Option<String>,
    pub notional: Option<f64>,
    pub description: String,
}

/// Aggregate portfolio risk view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioAssessment {
    pub total_value: f64,
    pub total_unrealized_pnl: f64,
    pub total_max_loss: f64,
    pub risk_pct: f64,
    pub risk_level: PortfolioRiskLevel,
    pub positions: Vec<PositionReport>,
    /// Percent of current value per sector; sums to 100.
    pub sector_concentration: BTreeMap<String, f64>,
    pub hedge_suggestions: Vec<HedgeSuggestion>,
}

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Max,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Max => "max",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "max" => Ok(Tier::Max),
            other => Err(EngineError::Validation(format!("unknown tier '{other}'"))),
        }
    }
}

/// Dispatchable analysis operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    AnalyzeSecurity,
    AnalyzeFibonacci,
    GetTradePlan,
    CompareSecurities,
    ScreenSecurities,
    ScanTrades,
    PortfolioRisk,
    MorningBrief,
    OptionsRiskAnalysis,
}

impl ToolName {
    pub const ALL: [ToolName; 9] = [
        ToolName::AnalyzeSecurity,
        ToolName::AnalyzeFibonacci,
        ToolName::GetTradePlan,
        ToolName::CompareSecurities,
        ToolName::ScreenSecurities,
        ToolName::ScanTrades,
        ToolName::PortfolioRisk,
        ToolName::MorningBrief,
        ToolName::OptionsRiskAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::AnalyzeSecurity => "analyze_security",
            ToolName::AnalyzeFibonacci => "analyze_fibonacci",
            ToolName::GetTradePlan => "get_trade_plan",
            ToolName::CompareSecurities => "compare_securities",
            ToolName::ScreenSecurities => "screen_securities",
            ToolName::ScanTrades => "scan_trades",
            ToolName::PortfolioRisk => "portfolio_risk",
            ToolName::MorningBrief => "morning_brief",
            ToolName::OptionsRiskAnalysis => "options_risk_analysis",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::Validation(format!("unknown tool '{s}'")))
    }

    /// Documented default period when the caller omits one.
    pub fn default_period(&self) -> Period {
        match self {
            ToolName::AnalyzeSecurity => Period::Mo1,
            ToolName::AnalyzeFibonacci => Period::Mo3,
            ToolName::GetTradePlan => Period::Mo1,
            ToolName::CompareSecurities => Period::Mo3,
            ToolName::ScreenSecurities => Period::Mo3,
            ToolName::ScanTrades => Period::Mo3,
            ToolName::PortfolioRisk => Period::Mo1,
            ToolName::MorningBrief => Period::D1,
            ToolName::OptionsRiskAnalysis => Period::Mo1,
        }
    }
}

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }
}

/// Persisted execution record. Inserted at dispatch with `running` and
/// transitioned exactly once to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub user_id: String,
    pub tool: String,
    pub params: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub status: RunStatus,
    pub execution_ms: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Saved tool parameter preset, owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub tool: String,
    pub params: serde_json::Value,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Last successful result per tool, served on the public landing route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicLatestRun {
    pub tool: String,
    pub symbol: Option<String>,
    pub result: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Market outlook from the LLM overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outlook {
    Bullish,
    Neutral,
    Bearish,
}

/// Suggested action from the LLM overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    Hold,
    Sell,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_round_trips() {
        for s in [
            "15m", "1h", "4h", "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd",
            "max",
        ] {
            assert_eq!(Period::parse(s).unwrap().as_str(), s);
        }
        assert!(Period::parse("7m").is_err());
    }

    #[test]
    fn series_sorts_bars() {
        let mk = |ts: i64, close: f64| Bar {
            timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        };
        let series = Series::new("TEST", Period::D1, vec![mk(300, 3.0), mk(100, 1.0), mk(200, 2.0)]);
        let closes: Vec<f64> = series.bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn strength_direction() {
        assert!(SignalStrength::ExtremeBullish.is_bullish());
        assert!(SignalStrength::StrongBearish.is_bearish());
        assert!(!SignalStrength::Neutral.is_bullish());
        assert!(!SignalStrength::Neutral.is_bearish());
    }

    #[test]
    fn tool_parse_covers_all() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::parse(tool.as_str()).unwrap(), tool);
        }
        assert!(ToolName::parse("make_coffee").is_err());
    }
}
