//! 配置管理模块
//!
//! @yutiansut @quantaxis
//!
//! 因子引擎配置：缓存策略、容量、快照目录、计算成本分级。
//! 所有字段提供默认值，支持从 TOML 文件加载。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 因子引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub costs: CostConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            costs: CostConfig::default(),
        }
    }
}

impl EngineConfig {
    /// 从 TOML 文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read engine config file: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse engine config file: {}", e))
    }
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 缓存策略: "lru" 或 "arc"
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// 最大驻留条目数
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// 快照存储目录
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
    /// 最大快照保留数
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            capacity: default_capacity(),
            snapshot_dir: default_snapshot_dir(),
            max_snapshots: default_max_snapshots(),
        }
    }
}

/// 计算成本分级配置
///
/// 成本权重仅用于统计观测，淘汰算法不参考 (见 cache/arc.rs)。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// 低成本因子名前缀 (如 sma, ret)
    #[serde(default = "default_cheap_prefixes")]
    pub cheap: Vec<String>,
    /// 中成本因子名前缀 (如 ema, rsi)
    #[serde(default = "default_medium_prefixes")]
    pub medium: Vec<String>,
    /// 高成本因子名前缀 (如 skew, kurt)
    #[serde(default = "default_expensive_prefixes")]
    pub expensive: Vec<String>,
    #[serde(default = "default_cheap_weight")]
    pub cheap_weight: f64,
    #[serde(default = "default_medium_weight")]
    pub medium_weight: f64,
    #[serde(default = "default_expensive_weight")]
    pub expensive_weight: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            cheap: default_cheap_prefixes(),
            medium: default_medium_prefixes(),
            expensive: default_expensive_prefixes(),
            cheap_weight: default_cheap_weight(),
            medium_weight: default_medium_weight(),
            expensive_weight: default_expensive_weight(),
        }
    }
}

fn default_strategy() -> String {
    "arc".to_string()
}

fn default_capacity() -> usize {
    256
}

fn default_snapshot_dir() -> String {
    "./data/factor_cache".to_string()
}

fn default_max_snapshots() -> usize {
    10
}

fn default_cheap_prefixes() -> Vec<String> {
    vec!["sma".to_string(), "ret".to_string()]
}

fn default_medium_prefixes() -> Vec<String> {
    vec![
        "ema".to_string(),
        "rsi".to_string(),
        "vol".to_string(),
        "natr".to_string(),
    ]
}

fn default_expensive_prefixes() -> Vec<String> {
    vec![
        "cci".to_string(),
        "skew".to_string(),
        "kurt".to_string(),
    ]
}

fn default_cheap_weight() -> f64 {
    1.0
}

fn default_medium_weight() -> f64 {
    2.0
}

fn default_expensive_weight() -> f64 {
    5.0
}
