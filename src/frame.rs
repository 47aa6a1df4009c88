//! 数据帧辅助函数
//!
//! @yutiansut @quantaxis
//!
//! 输入约定：OHLCV 形状的 DataFrame，包含 timestamp (毫秒) 与
//! open/high/low/close/volume 数值列。所有 polars 列提取集中在此，
//! 其余模块只处理 Vec<f64>。

use polars::prelude::*;

use crate::error::{FactorError, FactorResult};

/// 提取数值列为 Vec<f64>，空值以 NaN 填充
pub fn column_f64(data: &DataFrame, name: &str) -> FactorResult<Vec<f64>> {
    let column = data
        .column(name)
        .map_err(|_| FactorError::MissingColumn(name.to_string()))?;
    let values = column
        .as_materialized_series()
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

/// 数据窗口终点时间戳 (毫秒)
///
/// 取 timestamp 列末值；无该列时退化为行数 (保持键仍可区分窗口)。
pub fn window_end(data: &DataFrame) -> i64 {
    if let Ok(column) = data.column("timestamp") {
        let series = column.as_materialized_series();
        if let Ok(casted) = series.cast(&DataType::Int64) {
            if let Ok(ca) = casted.i64() {
                if !ca.is_empty() {
                    if let Some(last) = ca.get(ca.len() - 1) {
                        return last;
                    }
                }
            }
        }
    }
    data.height() as i64
}

/// 以因子名为列名构建序列
pub fn series_from(name: &str, values: Vec<f64>) -> Series {
    Series::new(name.into(), values)
}
