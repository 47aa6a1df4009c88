//! 因子缓存门面
//!
//! @yutiansut @quantaxis
//!
//! 统一的因子值缓存入口：
//! - 构造时选择 "lru" 或 "arc" 策略
//! - 命中/未命中/大小统计
//! - 防御性拷贝：get/set 均不暴露内部可变引用
//! - 全量快照落盘与恢复 (加载失败以 bool 上报，不抛出)
//! - warmup 批量预热：单因子计算失败记日志并跳过，不中断
//!   (预热是尽力而为的预取，与调度执行路径的致命失败语义不同)

use polars::prelude::{DataFrame, Series};
use std::path::Path;

use crate::config::{CacheConfig, CostConfig};
use crate::error::FactorResult;
use crate::frame;

use super::arc::ArcCache;
use super::key::{CacheKey, ComputeCostTable};
use super::lru::LruCache;
use super::snapshot::{CacheSnapshot, SnapshotStore};

/// 缓存策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    Lru,
    Arc,
}

impl CacheStrategy {
    /// 解析策略名，未识别时回落到 ARC
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Self::Lru,
            "arc" => Self::Arc,
            other => {
                log::warn!("Unknown cache strategy '{}', falling back to ARC", other);
                Self::Arc
            }
        }
    }
}

/// 缓存统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

enum StrategyImpl {
    Lru(LruCache),
    Arc(ArcCache),
}

/// 因子缓存门面
pub struct FactorCache {
    inner: StrategyImpl,
    strategy: CacheStrategy,
}

impl FactorCache {
    pub fn new(strategy: CacheStrategy, capacity: usize, costs: ComputeCostTable) -> Self {
        let inner = match strategy {
            CacheStrategy::Lru => StrategyImpl::Lru(LruCache::new(capacity, costs)),
            CacheStrategy::Arc => StrategyImpl::Arc(ArcCache::new(capacity, costs)),
        };
        Self { inner, strategy }
    }

    /// 从配置构建
    pub fn from_config(cache: &CacheConfig, costs: &CostConfig) -> Self {
        Self::new(
            CacheStrategy::parse(&cache.strategy),
            cache.capacity,
            ComputeCostTable::from_config(costs),
        )
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    /// 查询，返回独立副本
    pub fn get(&mut self, key: &CacheKey) -> Option<Series> {
        match &mut self.inner {
            StrategyImpl::Lru(c) => c.get(key),
            StrategyImpl::Arc(c) => c.get(key),
        }
    }

    /// 写入，取得序列所有权，调用方后续修改不影响缓存
    pub fn set(&mut self, key: CacheKey, series: Series) {
        match &mut self.inner {
            StrategyImpl::Lru(c) => c.set(key, series),
            StrategyImpl::Arc(c) => c.set(key, series),
        }
    }

    /// 键是否驻留 (不更新统计)
    pub fn contains(&self, key: &CacheKey) -> bool {
        match &self.inner {
            StrategyImpl::Lru(c) => c.contains(key),
            StrategyImpl::Arc(c) => c.contains(key),
        }
    }

    pub fn len(&self) -> usize {
        match &self.inner {
            StrategyImpl::Lru(c) => c.len(),
            StrategyImpl::Arc(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hit_rate(&self) -> f64 {
        match &self.inner {
            StrategyImpl::Lru(c) => c.hit_rate(),
            StrategyImpl::Arc(c) => c.hit_rate(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let (hits, misses, size, capacity, hit_rate) = match &self.inner {
            StrategyImpl::Lru(c) => (c.hits(), c.misses(), c.len(), c.capacity(), c.hit_rate()),
            StrategyImpl::Arc(c) => (c.hits(), c.misses(), c.len(), c.capacity(), c.hit_rate()),
        };
        CacheStats {
            hits,
            misses,
            size,
            capacity,
            hit_rate,
        }
    }

    pub fn clear(&mut self) {
        match &mut self.inner {
            StrategyImpl::Lru(c) => c.clear(),
            StrategyImpl::Arc(c) => c.clear(),
        }
    }

    /// 批量预热
    ///
    /// 对同一 (pair, timeframe, 窗口终点) 前缀下尚未驻留的因子名
    /// 逐个计算并写入。单因子失败记日志跳过，返回实际写入数量。
    pub fn warmup<F>(
        &mut self,
        data: &DataFrame,
        names: &[String],
        compute_func: F,
        pair: &str,
        timeframe: &str,
    ) -> usize
    where
        F: Fn(&DataFrame, &str) -> FactorResult<Series>,
    {
        let end_ts = frame::window_end(data);
        let mut inserted = 0;

        for name in names {
            let key = CacheKey::new(pair, timeframe, name.clone(), end_ts);
            if self.contains(&key) {
                continue;
            }

            match compute_func(data, name) {
                Ok(series) => {
                    self.set(key, series);
                    inserted += 1;
                }
                Err(e) => {
                    log::warn!("Warmup skipped factor {}: {}", name, e);
                }
            }
        }

        log::debug!(
            "Warmup inserted {}/{} factors for {}/{}",
            inserted,
            names.len(),
            pair,
            timeframe
        );
        inserted
    }

    /// 全量快照落盘；失败记日志并返回 false
    pub fn save_snapshot(&self, path: &Path) -> bool {
        let snapshot = self.capture_snapshot();
        match SnapshotStore::save_to(path, &snapshot) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to save cache snapshot to {:?}: {}", path, e);
                false
            }
        }
    }

    /// 从快照恢复；失败记日志并返回 false，缓存保持原状
    pub fn load_snapshot(&mut self, path: &Path) -> bool {
        let snapshot = match SnapshotStore::load_from(path) {
            Ok(s) => s,
            Err(e) => {
                log::error!("Failed to load cache snapshot from {:?}: {}", path, e);
                return false;
            }
        };
        self.restore_snapshot(&snapshot);
        true
    }

    /// 捕获当前全量状态
    pub fn capture_snapshot(&self) -> CacheSnapshot {
        match &self.inner {
            StrategyImpl::Lru(c) => {
                CacheSnapshot::capture(&c.entries_in_order(), c.hits(), c.misses())
            }
            StrategyImpl::Arc(c) => {
                CacheSnapshot::capture(&c.entries_in_order(), c.hits(), c.misses())
            }
        }
    }

    /// 按访问顺序重放快照条目并恢复计数器
    ///
    /// 驻留分层 (T1/T2) 不随快照保存，恢复后由后续访问自适应重建。
    pub fn restore_snapshot(&mut self, snapshot: &CacheSnapshot) {
        self.clear();
        for (key, series) in snapshot.unpack() {
            self.set(key, series);
        }
        match &mut self.inner {
            StrategyImpl::Lru(c) => c.restore_counters(snapshot.hits, snapshot.misses),
            StrategyImpl::Arc(c) => c.restore_counters(snapshot.hits, snapshot.misses),
        }
    }
}

impl std::fmt::Debug for FactorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("FactorCache")
            .field("strategy", &self.strategy)
            .field("size", &stats.size)
            .field("capacity", &stats.capacity)
            .field("hits", &stats.hits)
            .field("misses", &stats.misses)
            .finish()
    }
}
