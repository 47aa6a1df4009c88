//! 缓存键与缓存条目
//!
//! @yutiansut @quantaxis
//!
//! - CacheKey: (pair, timeframe, factor_name, end_timestamp) 四元组，
//!   唯一标识一个数据窗口终点上的因子值
//! - CacheEntry: 持有计算结果序列及访问统计
//! - ComputeCostTable: 因子计算成本分级表 (注入式配置，非全局状态)

use chrono::Utc;
use polars::prelude::{NamedFrom, Series};
use std::collections::HashMap;

use crate::config::CostConfig;

// ═══════════════════════════════════════════════════════════════════════════
// CacheKey
// ═══════════════════════════════════════════════════════════════════════════

/// 缓存键 - 值相等、可哈希、不可变
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// 交易对 (如 BTC/USDT)
    pub pair: String,
    /// 周期 (如 5m, 1h)
    pub timeframe: String,
    /// 因子名 (如 ema_20)
    pub factor_name: String,
    /// 数据窗口终点时间戳 (毫秒)
    pub end_timestamp: i64,
}

impl CacheKey {
    pub fn new(
        pair: impl Into<String>,
        timeframe: impl Into<String>,
        factor_name: impl Into<String>,
        end_timestamp: i64,
    ) -> Self {
        Self {
            pair: pair.into(),
            timeframe: timeframe.into(),
            factor_name: factor_name.into(),
            end_timestamp,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CacheEntry
// ═══════════════════════════════════════════════════════════════════════════

/// 缓存条目 - 未命中计算后创建，每次命中时更新，淘汰时销毁
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// 缓存的因子序列
    pub series: Series,
    /// 累计命中次数
    pub access_count: u64,
    /// 最近访问时间 (毫秒)
    pub last_access_ms: i64,
    /// 计算成本权重 - 仅用于观测，淘汰算法不参考
    pub compute_cost: f64,
}

impl CacheEntry {
    pub fn new(series: Series, compute_cost: f64) -> Self {
        Self {
            series,
            access_count: 0,
            last_access_ms: Utc::now().timestamp_millis(),
            compute_cost,
        }
    }

    /// 命中时更新访问统计
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_access_ms = Utc::now().timestamp_millis();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ComputeCostTable
// ═══════════════════════════════════════════════════════════════════════════

/// 计算成本分级表
///
/// 按因子名前缀 (下划线前的部分) 查表，未匹配的因子取默认权重。
#[derive(Debug, Clone)]
pub struct ComputeCostTable {
    weights: HashMap<String, f64>,
    default_weight: f64,
}

impl ComputeCostTable {
    /// 从成本配置构建
    pub fn from_config(config: &CostConfig) -> Self {
        let mut weights = HashMap::new();
        for prefix in &config.cheap {
            weights.insert(prefix.clone(), config.cheap_weight);
        }
        for prefix in &config.medium {
            weights.insert(prefix.clone(), config.medium_weight);
        }
        for prefix in &config.expensive {
            weights.insert(prefix.clone(), config.expensive_weight);
        }
        Self {
            weights,
            default_weight: config.medium_weight,
        }
    }

    /// 标准分级表
    pub fn standard() -> Self {
        Self::from_config(&CostConfig::default())
    }

    /// 查询因子的成本权重
    pub fn lookup(&self, factor_name: &str) -> f64 {
        let prefix = factor_name.split('_').next().unwrap_or(factor_name);
        self.weights
            .get(prefix)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

impl Default for ComputeCostTable {
    fn default() -> Self {
        Self::standard()
    }
}
