//! LRU 缓存策略
//!
//! @yutiansut @quantaxis
//!
//! 手工维护的有序淘汰列表：命中刷新到 MRU 端，溢出时淘汰最旧条目。
//! 无幽灵历史、无自适应参数，作为 ARC 的对照策略。

use polars::prelude::{NamedFrom, Series};
use std::collections::HashMap;

use super::key::{CacheEntry, CacheKey, ComputeCostTable};
use super::list::{Handle, OrderList};

/// LRU 缓存
///
/// 非线程安全：单实例假定单线程访问。
pub struct LruCache {
    order: OrderList<(CacheKey, CacheEntry)>,
    index: HashMap<CacheKey, Handle>,
    capacity: usize,
    costs: ComputeCostTable,
    hits: u64,
    misses: u64,
}

impl LruCache {
    pub fn new(capacity: usize, costs: ComputeCostTable) -> Self {
        Self {
            order: OrderList::new(),
            index: HashMap::with_capacity(capacity),
            capacity,
            costs,
            hits: 0,
            misses: 0,
        }
    }

    /// 查询，命中时刷新为最近使用
    pub fn get(&mut self, key: &CacheKey) -> Option<Series> {
        match self.index.get(key).copied() {
            Some(h) => {
                self.order.move_to_back(h);
                let series = self.order.get_mut(h).map(|(_, entry)| {
                    entry.touch();
                    entry.series.clone()
                });
                self.hits += 1;
                series
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// 写入，溢出时淘汰最旧条目
    pub fn set(&mut self, key: CacheKey, series: Series) {
        if self.capacity == 0 {
            return;
        }

        if let Some(h) = self.index.get(&key).copied() {
            if let Some((_, entry)) = self.order.get_mut(h) {
                entry.series = series;
            }
            self.order.move_to_back(h);
            return;
        }

        if self.order.len() >= self.capacity {
            if let Some((old_key, _)) = self.order.pop_front() {
                self.index.remove(&old_key);
            }
        }

        let cost = self.costs.lookup(&key.factor_name);
        let h = self.order.push_back((key.clone(), CacheEntry::new(series, cost)));
        self.index.insert(key, h);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.index.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// 按访问顺序 (旧->新) 导出条目，用于快照
    pub fn entries_in_order(&self) -> Vec<(CacheKey, CacheEntry)> {
        self.order
            .iter()
            .map(|(_, (k, e))| (k.clone(), e.clone()))
            .collect()
    }

    pub(crate) fn restore_counters(&mut self, hits: u64, misses: u64) {
        self.hits = hits;
        self.misses = misses;
    }
}

impl std::fmt::Debug for LruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.order.len())
            .field("capacity", &self.capacity)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
