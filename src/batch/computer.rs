//! 共享依赖批量计算器
//!
//! @yutiansut @quantaxis
//!
//! 针对扁平因子名列表的第二类优化 (与依赖图调度相互独立)：
//! - 识别因子族并提取共享基础序列，批内只计算一次
//! - 同族因子在一次遍历中复用同一基础 (如一条收益率序列
//!   喂给全部 vol/skew/kurt 因子)
//! - 未识别的名字回落到注入的通用计算回调

use dashmap::DashMap;
use polars::prelude::{Column, DataFrame, IntoColumn, Series};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::batch::analyzer::{BaseSeries, FactorDependencyAnalyzer, FactorFamily};
use crate::batch::rolling;
use crate::error::{FactorError, FactorResult};
use crate::frame;

// ═══════════════════════════════════════════════════════════════════════════
// 中间结果缓存
// ═══════════════════════════════════════════════════════════════════════════

/// 批内中间结果缓存
///
/// 保存基础序列，键为基础名；每个批次开始时清空。
/// 并行族计算只读，基础在进入并行阶段前全部就绪。
pub struct IntermediateResultCache {
    values: DashMap<String, Arc<Vec<f64>>>,
    compute_counts: DashMap<String, u64>,
}

impl IntermediateResultCache {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            compute_counts: DashMap::new(),
        }
    }

    /// 取出或计算；同键只计算一次
    pub fn get_or_compute<F>(&self, name: &str, f: F) -> FactorResult<Arc<Vec<f64>>>
    where
        F: FnOnce() -> FactorResult<Vec<f64>>,
    {
        if let Some(v) = self.values.get(name) {
            return Ok(v.clone());
        }
        let computed = Arc::new(f()?);
        *self.compute_counts.entry(name.to_string()).or_insert(0) += 1;
        self.values.insert(name.to_string(), computed.clone());
        Ok(computed)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Vec<f64>>> {
        self.values.get(name).map(|v| v.clone())
    }

    /// 某个键自上次清空以来的实际计算次数
    pub fn compute_count(&self, name: &str) -> u64 {
        self.compute_counts.get(name).map(|c| *c).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&self) {
        self.values.clear();
        self.compute_counts.clear();
    }
}

impl Default for IntermediateResultCache {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 批量因子计算器
// ═══════════════════════════════════════════════════════════════════════════

/// 批量因子计算器
pub struct BatchFactorComputer {
    analyzer: FactorDependencyAnalyzer,
    intermediate: IntermediateResultCache,
}

impl BatchFactorComputer {
    pub fn new() -> Self {
        Self {
            analyzer: FactorDependencyAnalyzer::new(),
            intermediate: IntermediateResultCache::new(),
        }
    }

    pub fn analyzer(&self) -> &FactorDependencyAnalyzer {
        &self.analyzer
    }

    pub fn intermediate(&self) -> &IntermediateResultCache {
        &self.intermediate
    }

    /// 批量计算
    ///
    /// 1. 清空中间结果缓存
    /// 2. 预计算这批因子共享的基础序列 (每个只算一次)
    /// 3. 识别的族并行计算，复用共享基础
    /// 4. 未识别的名字回落到通用回调
    ///
    /// 输出每个请求名一列，与输入时间索引对齐 (请求顺序去重)。
    pub fn compute_batch<F>(
        &self,
        data: &DataFrame,
        names: &[String],
        compute_func: F,
    ) -> FactorResult<DataFrame>
    where
        F: Fn(&DataFrame, &str) -> FactorResult<Series> + Sync,
    {
        self.intermediate.clear();

        // 请求顺序去重
        let mut ordered: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !ordered.contains(name) {
                ordered.push(name.clone());
            }
        }

        // 预计算共享基础
        let bases = self.analyzer.identify_shared_dependencies(&ordered);
        for base in &bases {
            self.ensure_base(data, *base)?;
        }

        // 识别的族：并行计算，只读共享基础
        let recognized: Vec<_> = ordered
            .iter()
            .filter_map(|n| self.analyzer.parse(n))
            .collect();

        let family_results: FactorResult<Vec<(String, Series)>> = recognized
            .par_iter()
            .map(|parsed| {
                let values = self.compute_family_member(parsed.family, parsed.period)?;
                Ok((parsed.name.clone(), frame::series_from(&parsed.name, values)))
            })
            .collect();

        let mut results: HashMap<String, Series> =
            family_results?.into_iter().collect();

        // 未识别的名字回落到通用回调
        for name in self.analyzer.unrecognized(&ordered) {
            log::debug!("Falling back to generic compute for factor {}", name);
            let series = compute_func(data, name).map_err(|e| match e {
                err @ FactorError::ComputeFailed { .. } => err,
                other => FactorError::ComputeFailed {
                    factor: name.clone(),
                    reason: other.to_string(),
                },
            })?;
            results.insert(name.clone(), series.with_name(name.as_str().into()));
        }

        // 按请求顺序组装输出
        let columns: Vec<Column> = ordered
            .iter()
            .filter_map(|n| results.remove(n))
            .map(|s| s.into_column())
            .collect();

        Ok(DataFrame::new(columns)?)
    }

    /// 确保基础序列已就绪 (同键批内只计算一次)
    fn ensure_base(&self, data: &DataFrame, base: BaseSeries) -> FactorResult<Arc<Vec<f64>>> {
        match base {
            BaseSeries::Close => self
                .intermediate
                .get_or_compute(base.cache_name(), || frame::column_f64(data, "close")),
            BaseSeries::High => self
                .intermediate
                .get_or_compute(base.cache_name(), || frame::column_f64(data, "high")),
            BaseSeries::Low => self
                .intermediate
                .get_or_compute(base.cache_name(), || frame::column_f64(data, "low")),
            BaseSeries::Returns => {
                let close = self.ensure_base(data, BaseSeries::Close)?;
                self.intermediate.get_or_compute(base.cache_name(), || {
                    Ok(rolling::one_step_returns(&close))
                })
            }
        }
    }

    /// 单个族成员的计算 (基础序列已预先就绪)
    fn compute_family_member(&self, family: FactorFamily, period: usize) -> FactorResult<Vec<f64>> {
        let base = |b: BaseSeries| {
            self.intermediate
                .get(b.cache_name())
                .ok_or_else(|| FactorError::MissingColumn(b.cache_name().to_string()))
        };

        let values = match family {
            FactorFamily::Sma => rolling::rolling_mean(&base(BaseSeries::Close)?, period),
            FactorFamily::Ema => rolling::ema(&base(BaseSeries::Close)?, period),
            FactorFamily::Rsi => rolling::rsi(&base(BaseSeries::Close)?, period),
            FactorFamily::Cci => rolling::cci(
                &base(BaseSeries::High)?,
                &base(BaseSeries::Low)?,
                &base(BaseSeries::Close)?,
                period,
            ),
            FactorFamily::Natr => rolling::natr(
                &base(BaseSeries::High)?,
                &base(BaseSeries::Low)?,
                &base(BaseSeries::Close)?,
                period,
            ),
            FactorFamily::Ret => rolling::n_step_returns(&base(BaseSeries::Close)?, period),
            FactorFamily::Vol => rolling::rolling_std(&base(BaseSeries::Returns)?, period),
            FactorFamily::Skew => rolling::rolling_skew(&base(BaseSeries::Returns)?, period),
            FactorFamily::Kurt => rolling::rolling_kurt(&base(BaseSeries::Returns)?, period),
        };
        Ok(values)
    }
}

impl Default for BatchFactorComputer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::analyzer::BaseSeries;
    use polars::prelude::*;

    fn sample_df(rows: usize) -> DataFrame {
        let ts: Vec<i64> = (0..rows as i64).map(|i| 1_000 * (i + 1)).collect();
        let close: Vec<f64> = (0..rows).map(|i| 100.0 + (i as f64) * 0.5).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();

        DataFrame::new(vec![
            Series::new("timestamp".into(), ts).into_column(),
            Series::new("close".into(), close).into_column(),
            Series::new("high".into(), high).into_column(),
            Series::new("low".into(), low).into_column(),
        ])
        .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn no_fallback(_data: &DataFrame, name: &str) -> FactorResult<Series> {
        Err(FactorError::UnknownFactor(name.to_string()))
    }

    #[test]
    fn test_shared_return_base_computed_once() {
        let computer = BatchFactorComputer::new();
        let df = sample_df(30);

        let out = computer
            .compute_batch(&df, &names(&["vol_10", "skew_10", "ret_5"]), no_fallback)
            .unwrap();

        assert_eq!(out.width(), 3);
        assert_eq!(out.height(), 30);

        // 一步收益率只计算了一次，vol 与 skew 复用同一条
        assert_eq!(
            computer
                .intermediate()
                .compute_count(BaseSeries::Returns.cache_name()),
            1
        );
    }

    #[test]
    fn test_family_pass_output_values() {
        let computer = BatchFactorComputer::new();
        let df = sample_df(10);

        let out = computer
            .compute_batch(&df, &names(&["sma_3"]), no_fallback)
            .unwrap();

        let sma = out
            .column("sma_3")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap();
        assert!(sma.get(1).unwrap().is_nan());
        // close = 100.0, 100.5, 101.0 -> sma_3[2] = 100.5
        assert!((sma.get(2).unwrap() - 100.5).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_for_unrecognized() {
        let computer = BatchFactorComputer::new();
        let df = sample_df(5);

        let out = computer
            .compute_batch(&df, &names(&["ema_3", "volume_proxy"]), |data, name| {
                assert_eq!(name, "volume_proxy");
                crate::frame::column_f64(data, "close")
                    .map(|v| crate::frame::series_from(name, v))
            })
            .unwrap();

        assert_eq!(out.width(), 2);
        assert!(out.column("volume_proxy").is_ok());
    }

    #[test]
    fn test_fallback_failure_propagates() {
        let computer = BatchFactorComputer::new();
        let df = sample_df(5);

        let err = computer
            .compute_batch(&df, &names(&["nonsense"]), no_fallback)
            .unwrap_err();
        assert!(matches!(err, FactorError::ComputeFailed { factor, .. } if factor == "nonsense"));
    }

    #[test]
    fn test_duplicate_request_deduped() {
        let computer = BatchFactorComputer::new();
        let df = sample_df(10);

        let out = computer
            .compute_batch(&df, &names(&["ema_3", "ema_3"]), no_fallback)
            .unwrap();
        assert_eq!(out.width(), 1);
    }

    #[test]
    fn test_missing_ohlc_column_reported() {
        let computer = BatchFactorComputer::new();
        let close: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let df = DataFrame::new(vec![Series::new("close".into(), close).into_column()]).unwrap();

        // cci 需要 high/low
        let err = computer
            .compute_batch(&df, &names(&["cci_5"]), no_fallback)
            .unwrap_err();
        assert!(matches!(err, FactorError::MissingColumn(c) if c == "high" || c == "low"));
    }
}
