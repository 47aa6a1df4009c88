//! 批量滚动统计
//!
//! @yutiansut @quantaxis
//!
//! 流式算子的整列批量版本：一次遍历输入序列，输出与输入等长、
//! 按时间索引对齐的结果 (窗口未满处为 NaN)。
//!
//! - 滚动均值/标准差/偏度/峰度 (窗口 Welford，数值稳定)
//! - EMA 指数移动平均 (α = 2/(period+1))
//! - RSI 相对强弱 (Wilder 平滑)
//! - CCI 顺势指标
//! - ATR/NATR 真实波幅
//! - 一步/N 步收益率

/// 单窗口 Welford 统计量
struct WindowStats {
    count: usize,
    mean: f64,
    m2: f64,
    m3: f64,
    m4: f64,
}

impl WindowStats {
    fn over(window: &[f64]) -> Self {
        let mut s = Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            m3: 0.0,
            m4: 0.0,
        };
        for &x in window {
            s.update(x);
        }
        s
    }

    fn update(&mut self, x: f64) {
        self.count += 1;
        let n = self.count as f64;

        let delta = x - self.mean;
        let delta_n = delta / n;
        let delta_n2 = delta_n * delta_n;
        let term1 = delta * delta_n * (n - 1.0);

        self.mean += delta_n;
        self.m4 += term1 * delta_n2 * (n * n - 3.0 * n + 3.0) + 6.0 * delta_n2 * self.m2
            - 4.0 * delta_n * self.m3;
        self.m3 += term1 * delta_n * (n - 2.0) - 3.0 * delta_n * self.m2;
        self.m2 += term1;
    }

    /// 总体标准差
    fn std(&self) -> f64 {
        if self.count < 2 {
            return f64::NAN;
        }
        (self.m2 / self.count as f64).sqrt()
    }

    fn skewness(&self) -> f64 {
        if self.count < 3 || self.m2 == 0.0 {
            return f64::NAN;
        }
        let n = self.count as f64;
        (n.sqrt() * self.m3) / self.m2.powf(1.5)
    }

    /// 超额峰度
    fn kurtosis(&self) -> f64 {
        if self.count < 4 || self.m2 == 0.0 {
            return f64::NAN;
        }
        let n = self.count as f64;
        (n * self.m4) / (self.m2 * self.m2) - 3.0
    }
}

fn rolling_apply(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for i in (window - 1)..values.len() {
        out[i] = f(&values[i + 1 - window..=i]);
    }
    out
}

/// 滚动均值
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| {
        w.iter().sum::<f64>() / w.len() as f64
    })
}

/// 滚动标准差 (总体)
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| WindowStats::over(w).std())
}

/// 滚动偏度
pub fn rolling_skew(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| WindowStats::over(w).skewness())
}

/// 滚动超额峰度
pub fn rolling_kurt(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| WindowStats::over(w).kurtosis())
}

/// 指数移动平均
///
/// EMA_t = α * x_t + (1 - α) * EMA_{t-1}, α = 2/(period+1)，
/// 以首个数值为种子。
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = vec![f64::NAN; values.len()];
    let mut prev: Option<f64> = None;

    for (i, &x) in values.iter().enumerate() {
        if x.is_nan() {
            continue;
        }
        let next = match prev {
            None => x,
            Some(p) => alpha * x + (1.0 - alpha) * p,
        };
        out[i] = next;
        prev = Some(next);
    }
    out
}

/// RSI 相对强弱指数 (Wilder 平滑)
///
/// 前 period 个涨跌取简单平均，之后按 (n-1)/n 平滑；
/// 不足 period 个变化量时为 NaN。
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < 2 {
        return out;
    }

    let n = period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    let mut count = 0usize;

    for i in 1..values.len() {
        let change = values[i] - values[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };

        count += 1;
        if count <= period {
            // 初始化阶段：简单平均
            avg_gain = (avg_gain * (count - 1) as f64 + gain) / count as f64;
            avg_loss = (avg_loss * (count - 1) as f64 + loss) / count as f64;
        } else {
            avg_gain = (avg_gain * (n - 1.0) + gain) / n;
            avg_loss = (avg_loss * (n - 1.0) + loss) / n;
        }

        if count >= period {
            out[i] = if avg_loss == 0.0 {
                100.0
            } else {
                let rs = avg_gain / avg_loss;
                100.0 - 100.0 / (1.0 + rs)
            };
        }
    }
    out
}

/// CCI 顺势指标
///
/// CCI = (TP - SMA(TP)) / (0.015 * 窗口内对均值的平均绝对偏差)
pub fn cci(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = close.len();
    let tp: Vec<f64> = (0..len)
        .map(|i| (high[i] + low[i] + close[i]) / 3.0)
        .collect();

    rolling_apply(&tp, period, |w| {
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let mad = w.iter().map(|x| (x - mean).abs()).sum::<f64>() / w.len() as f64;
        if mad == 0.0 {
            0.0
        } else {
            (w[w.len() - 1] - mean) / (0.015 * mad)
        }
    })
}

/// ATR 平均真实波幅 (Wilder 平滑)
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = close.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 || len == 0 {
        return out;
    }

    let n = period as f64;
    let mut prev_atr: Option<f64> = None;

    for i in 0..len {
        let tr = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };

        let next = match prev_atr {
            None => tr,
            Some(prev) => {
                if i < period {
                    // 初始化：简单平均
                    (prev * i as f64 + tr) / (i + 1) as f64
                } else {
                    (prev * (n - 1.0) + tr) / n
                }
            }
        };
        prev_atr = Some(next);

        if i + 1 >= period {
            out[i] = next;
        }
    }
    out
}

/// NATR 归一化真实波幅 (百分比)
pub fn natr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    atr(high, low, close, period)
        .iter()
        .zip(close)
        .map(|(&a, &c)| if c != 0.0 { a / c * 100.0 } else { f64::NAN })
        .collect()
}

/// 一步收益率 r_t = x_t / x_{t-1} - 1
pub fn one_step_returns(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        if values[i - 1] != 0.0 {
            out[i] = values[i] / values[i - 1] - 1.0;
        }
    }
    out
}

/// N 步收益率 r_t = x_t / x_{t-n} - 1
pub fn n_step_returns(values: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if n == 0 {
        return out;
    }
    for i in n..values.len() {
        if values[i - n] != 0.0 {
            out[i] = values[i] / values[i - n] - 1.0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "expected {} ~= {}", a, b);
    }

    #[test]
    fn test_rolling_mean_alignment() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = rolling_mean(&v, 3);

        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_close(out[2], 2.0);
        assert_close(out[3], 3.0);
        assert_close(out[4], 4.0);
        assert_eq!(out.len(), v.len());
    }

    #[test]
    fn test_rolling_std_constant_is_zero() {
        let v = [5.0; 6];
        let out = rolling_std(&v, 4);
        assert_close(out[5], 0.0);
    }

    #[test]
    fn test_rolling_std_known_value() {
        // 总体标准差 of [2, 4, 4, 4, 5, 5, 7, 9] = 2
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let out = rolling_std(&v, 8);
        assert_close(out[7], 2.0);
    }

    #[test]
    fn test_skew_symmetric_is_zero() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = rolling_skew(&v, 5);
        assert_close(out[4], 0.0);
    }

    #[test]
    fn test_ema_tracks_trend() {
        let v = [10.0, 11.0, 12.0, 13.0, 14.0];
        let out = ema(&v, 5);

        assert_close(out[0], 10.0);
        // EMA 介于首尾之间且向末值靠拢
        assert!(out[4] > 11.0 && out[4] < 14.0);
    }

    #[test]
    fn test_rsi_uptrend_is_high() {
        let v: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&v, 14);

        assert!(out[13].is_nan());
        // 全程上涨
        assert_close(out[19], 100.0);
    }

    #[test]
    fn test_rsi_window_gate() {
        let v = [1.0, 2.0, 1.0, 2.0, 1.0];
        let out = rsi(&v, 3);
        assert!(out[2].is_nan());
        assert!(!out[3].is_nan());
    }

    #[test]
    fn test_atr_range_only_first_bar() {
        let high = [12.0, 13.0, 14.0];
        let low = [10.0, 11.0, 12.0];
        let close = [11.0, 12.0, 13.0];
        let out = atr(&high, &low, &close, 2);

        assert!(out[0].is_nan());
        // TR 序列 = [2, 2, 2] -> ATR = 2
        assert_close(out[1], 2.0);
        assert_close(out[2], 2.0);
    }

    #[test]
    fn test_one_step_returns() {
        let v = [100.0, 110.0, 99.0];
        let out = one_step_returns(&v);

        assert!(out[0].is_nan());
        assert_close(out[1], 0.1);
        assert_close(out[2], -0.1);
    }

    #[test]
    fn test_n_step_returns() {
        let v = [100.0, 101.0, 102.0, 110.0];
        let out = n_step_returns(&v, 3);
        assert!(out[2].is_nan());
        assert_close(out[3], 0.1);
    }

    #[test]
    fn test_cci_flat_market_is_zero() {
        let high = [10.0; 5];
        let low = [10.0; 5];
        let close = [10.0; 5];
        let out = cci(&high, &low, &close, 3);
        assert_close(out[4], 0.0);
    }
}
