use engine_core::Bar;
use serde_json::json;

// Indicator columns are aligned to the input length. Warm-up slots where the
// window is not yet available hold NaN; rules skip any row containing NaN.

const EPSILON: f64 = 1e-10;

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    let mut sum: f64 = data[..period].iter().sum();
    result[period - 1] = sum / period as f64;
    for i in period..data.len() {
        sum += data[i] - data[i - period];
        result[i] = sum / period as f64;
    }
    result
}

/// Exponential Moving Average, seeded with the SMA of the first `period`
/// values; smoothing factor k = 2/(period+1).
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = seed;

    for i in period..data.len() {
        let prev = result[i - 1];
        result[i] = (data[i] - prev) * multiplier + prev;
    }
    result
}

/// Relative Strength Index, Wilder smoothing.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period + 1 {
        return result;
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);
    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    result[period] = rsi_from_averages(avg_gain, avg_loss);

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        result[i + 1] = rsi_from_averages(avg_gain, avg_loss);
    }
    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_gain < EPSILON && avg_loss < EPSILON {
        // No net movement in the window.
        return 50.0;
    }
    // Denominator guard: an all-gain window reads as maximum strength.
    let rs = avg_gain / (avg_loss + EPSILON);
    100.0 - (100.0 / (1.0 + rs))
}

/// MACD (Moving Average Convergence Divergence)
pub struct MacdResult {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(data: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdResult {
    let n = data.len();
    let mut macd_line = vec![f64::NAN; n];
    let mut signal_line = vec![f64::NAN; n];
    let mut histogram = vec![f64::NAN; n];

    if fast == 0 || slow == 0 || signal_period == 0 || slow <= fast || n < slow {
        return MacdResult {
            macd: macd_line,
            signal: signal_line,
            histogram,
        };
    }

    let ema_fast = ema(data, fast);
    let ema_slow = ema(data, slow);
    for i in 0..n {
        if ema_fast[i].is_finite() && ema_slow[i].is_finite() {
            macd_line[i] = ema_fast[i] - ema_slow[i];
        }
    }

    // Signal line is an EMA over the finite MACD tail, re-aligned.
    let start = slow - 1;
    let tail: Vec<f64> = macd_line[start..].to_vec();
    let tail_signal = ema(&tail, signal_period);
    for (offset, value) in tail_signal.iter().enumerate() {
        if value.is_finite() {
            signal_line[start + offset] = *value;
            histogram[start + offset] = macd_line[start + offset] - value;
        }
    }

    MacdResult {
        macd: macd_line,
        signal: signal_line,
        histogram,
    }
}

/// Bollinger Bands
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    let n = data.len();
    let middle = sma(data, period);
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];

    if period == 0 || n < period {
        return BollingerBands {
            upper,
            middle,
            lower,
        };
    }

    for i in period - 1..n {
        let slice = &data[i + 1 - period..=i];
        let mean = middle[i];
        let variance = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();
        upper[i] = mean + std_dev * std;
        lower[i] = mean - std_dev * std;
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

/// Stochastic Oscillator
pub struct StochasticResult {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> StochasticResult {
    let n = bars.len();
    let mut k = vec![f64::NAN; n];

    if k_period == 0 || n < k_period {
        return StochasticResult {
            d: vec![f64::NAN; n],
            k,
        };
    }

    for i in k_period - 1..n {
        let slice = &bars[i + 1 - k_period..=i];
        let highest = slice.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let lowest = slice.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);

        k[i] = if (highest - lowest).abs() < EPSILON {
            50.0
        } else {
            100.0 * (bars[i].close - lowest) / (highest - lowest)
        };
    }

    // %D = SMA over the finite %K tail.
    let mut d = vec![f64::NAN; n];
    let start = k_period - 1;
    let tail_d = sma(&k[start..], d_period);
    for (offset, value) in tail_d.iter().enumerate() {
        if value.is_finite() {
            d[start + offset] = *value;
        }
    }

    StochasticResult { k, d }
}

/// Average True Range: SMA of the true range.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let mut true_ranges = Vec::with_capacity(n - 1);
    for i in 1..n {
        let hl = bars[i].high - bars[i].low;
        let hc = (bars[i].high - bars[i - 1].close).abs();
        let lc = (bars[i].low - bars[i - 1].close).abs();
        true_ranges.push(hl.max(hc).max(lc));
    }

    let tr_sma = sma(&true_ranges, period);
    for (i, value) in tr_sma.iter().enumerate() {
        if value.is_finite() {
            result[i + 1] = *value;
        }
    }
    result
}

/// On-Balance Volume
pub fn obv(bars: &[Bar]) -> Vec<f64> {
    if bars.is_empty() {
        return vec![];
    }

    let mut result = Vec::with_capacity(bars.len());
    result.push(bars[0].volume);
    for i in 1..bars.len() {
        let prev = result[i - 1];
        let next = if bars[i].close > bars[i - 1].close {
            prev + bars[i].volume
        } else if bars[i].close < bars[i - 1].close {
            prev - bars[i].volume
        } else {
            prev
        };
        result.push(next);
    }
    result
}

/// Average Directional Index — trend strength (0-100) with the directional
/// components, Wilder smoothing throughout.
pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

pub fn adx(bars: &[Bar], period: usize) -> AdxResult {
    let n = bars.len();
    let mut adx_col = vec![f64::NAN; n];
    let mut pdi_col = vec![f64::NAN; n];
    let mut mdi_col = vec![f64::NAN; n];

    if period == 0 || n < period * 2 + 1 {
        return AdxResult {
            adx: adx_col,
            plus_di: pdi_col,
            minus_di: mdi_col,
        };
    }

    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);
    let mut true_range = Vec::with_capacity(n - 1);

    for i in 1..n {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });

        let hl = bars[i].high - bars[i].low;
        let hc = (bars[i].high - bars[i - 1].close).abs();
        let lc = (bars[i].low - bars[i - 1].close).abs();
        true_range.push(hl.max(hc).max(lc));
    }

    let mut smoothed_plus = plus_dm[..period].iter().sum::<f64>();
    let mut smoothed_minus = minus_dm[..period].iter().sum::<f64>();
    let mut smoothed_tr = true_range[..period].iter().sum::<f64>();

    let mut dx_values = Vec::new();

    for i in period..plus_dm.len() {
        smoothed_plus = smoothed_plus - smoothed_plus / period as f64 + plus_dm[i];
        smoothed_minus = smoothed_minus - smoothed_minus / period as f64 + minus_dm[i];
        smoothed_tr = smoothed_tr - smoothed_tr / period as f64 + true_range[i];

        let pdi = if smoothed_tr > EPSILON {
            100.0 * smoothed_plus / smoothed_tr
        } else {
            0.0
        };
        let mdi = if smoothed_tr > EPSILON {
            100.0 * smoothed_minus / smoothed_tr
        } else {
            0.0
        };

        // dm index i corresponds to bar i+1
        pdi_col[i + 1] = pdi;
        mdi_col[i + 1] = mdi;

        let di_sum = pdi + mdi;
        dx_values.push(if di_sum > EPSILON {
            100.0 * (pdi - mdi).abs() / di_sum
        } else {
            0.0
        });
    }

    if dx_values.len() < period {
        return AdxResult {
            adx: adx_col,
            plus_di: pdi_col,
            minus_di: mdi_col,
        };
    }

    let mut adx_val = dx_values[..period].iter().sum::<f64>() / period as f64;
    // First DX lands on bar period+1, so the seeded ADX lands on bar 2*period.
    adx_col[period * 2] = adx_val;
    for (j, dx) in dx_values[period..].iter().enumerate() {
        adx_val = (adx_val * (period - 1) as f64 + dx) / period as f64;
        adx_col[period * 2 + 1 + j] = adx_val;
    }

    AdxResult {
        adx: adx_col,
        plus_di: pdi_col,
        minus_di: mdi_col,
    }
}

/// All indicator columns for one series, computed once per analysis and
/// shared across every signal rule.
pub struct IndicatorSet {
    pub closes: Vec<f64>,
    pub volumes: Vec<f64>,
    pub sma_5: Vec<f64>,
    pub sma_10: Vec<f64>,
    pub sma_20: Vec<f64>,
    pub sma_50: Vec<f64>,
    pub sma_100: Vec<f64>,
    pub sma_200: Vec<f64>,
    pub ema_5: Vec<f64>,
    pub ema_10: Vec<f64>,
    pub ema_20: Vec<f64>,
    pub ema_50: Vec<f64>,
    pub ema_100: Vec<f64>,
    pub ema_200: Vec<f64>,
    pub rsi_14: Vec<f64>,
    pub macd: MacdResult,
    pub bollinger: BollingerBands,
    pub stochastic: StochasticResult,
    pub adx: AdxResult,
    pub atr_14: Vec<f64>,
    pub obv: Vec<f64>,
    pub volume_sma_20: Vec<f64>,
}

impl IndicatorSet {
    pub fn compute(bars: &[Bar]) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        Self {
            sma_5: sma(&closes, 5),
            sma_10: sma(&closes, 10),
            sma_20: sma(&closes, 20),
            sma_50: sma(&closes, 50),
            sma_100: sma(&closes, 100),
            sma_200: sma(&closes, 200),
            ema_5: ema(&closes, 5),
            ema_10: ema(&closes, 10),
            ema_20: ema(&closes, 20),
            ema_50: ema(&closes, 50),
            ema_100: ema(&closes, 100),
            ema_200: ema(&closes, 200),
            rsi_14: rsi(&closes, 14),
            macd: macd(&closes, 12, 26, 9),
            bollinger: bollinger_bands(&closes, 20, 2.0),
            stochastic: stochastic(bars, 14, 3),
            adx: adx(bars, 14),
            atr_14: atr(bars, 14),
            obv: obv(bars),
            volume_sma_20: sma(&volumes, 20),
            closes,
            volumes,
        }
    }

    pub fn sma_for(&self, period: usize) -> Option<&[f64]> {
        match period {
            5 => Some(&self.sma_5),
            10 => Some(&self.sma_10),
            20 => Some(&self.sma_20),
            50 => Some(&self.sma_50),
            100 => Some(&self.sma_100),
            200 => Some(&self.sma_200),
            _ => None,
        }
    }

    /// Last value of a column if finite.
    pub fn last(col: &[f64]) -> Option<f64> {
        col.last().copied().filter(|v| v.is_finite())
    }

    /// (previous, last) pair when both are finite — the window every cross
    /// rule reads.
    pub fn last2(col: &[f64]) -> Option<(f64, f64)> {
        if col.len() < 2 {
            return None;
        }
        let prev = col[col.len() - 2];
        let last = col[col.len() - 1];
        (prev.is_finite() && last.is_finite()).then_some((prev, last))
    }

    /// Last volume over its 20-bar average; 1.0 when unavailable.
    pub fn volume_ratio(&self) -> f64 {
        match (Self::last(&self.volumes), Self::last(&self.volume_sma_20)) {
            (Some(vol), Some(avg)) if avg > 0.0 => vol / avg,
            _ => 1.0,
        }
    }

    /// Current-values snapshot for result payloads and the LLM context.
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "price": Self::last(&self.closes),
            "sma_20": Self::last(&self.sma_20),
            "sma_50": Self::last(&self.sma_50),
            "sma_200": Self::last(&self.sma_200),
            "ema_20": Self::last(&self.ema_20),
            "rsi_14": Self::last(&self.rsi_14),
            "macd": Self::last(&self.macd.macd),
            "macd_signal": Self::last(&self.macd.signal),
            "macd_histogram": Self::last(&self.macd.histogram),
            "bb_upper": Self::last(&self.bollinger.upper),
            "bb_lower": Self::last(&self.bollinger.lower),
            "stoch_k": Self::last(&self.stochastic.k),
            "stoch_d": Self::last(&self.stochastic.d),
            "adx": Self::last(&self.adx.adx),
            "plus_di": Self::last(&self.adx.plus_di),
            "minus_di": Self::last(&self.adx.minus_di),
            "atr_14": Self::last(&self.atr_14),
            "obv": Self::last(&self.obv),
            "volume_ratio": self.volume_ratio(),
        })
    }
}
