//! ARC 自适应替换缓存
//!
//! @yutiansut @quantaxis
//!
//! ARC (Megiddo & Modha, FAST '03) 在近期性与频率之间在线调节：
//! - T1: 只被访问过一次的驻留条目 (近期性)
//! - T2: 被访问过两次及以上的驻留条目 (频率)
//! - B1/B2: T1/T2 的淘汰历史 (幽灵键，不保留数据)
//! - p: T1 的目标大小，幽灵命中时自适应调整
//!
//! 高频因子 (如每轮评估都请求的短均线) 会沉淀到 T2，
//! 只请求一次的因子从 T1 快速淘汰，整体命中率优于纯 LRU。
//!
//! 条目携带的 compute_cost 权重仅用于观测统计，淘汰决策只看
//! 近期性/频率，不参考成本。

use polars::prelude::{NamedFrom, Series};
use std::collections::HashMap;

use super::key::{CacheEntry, CacheKey, ComputeCostTable};
use super::list::{Handle, OrderList};

/// 键当前所在的列表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    T1(Handle),
    T2(Handle),
    B1(Handle),
    B2(Handle),
}

/// ARC 缓存
///
/// 非线程安全：单实例假定单线程访问，跨线程共享需外部加锁。
pub struct ArcCache {
    /// 驻留：访问一次 (近期性端)
    t1: OrderList<(CacheKey, CacheEntry)>,
    /// 驻留：访问两次以上 (频率端)
    t2: OrderList<(CacheKey, CacheEntry)>,
    /// T1 淘汰历史 (仅键)
    b1: OrderList<CacheKey>,
    /// T2 淘汰历史 (仅键)
    b2: OrderList<CacheKey>,
    /// 统一目录: 键 -> 所在列表
    directory: HashMap<CacheKey, Location>,
    /// T1 目标大小, 取值 [0, capacity]
    p: usize,
    /// T1 + T2 最大驻留条目数
    capacity: usize,
    /// 成本分级表 (注入)
    costs: ComputeCostTable,
    hits: u64,
    misses: u64,
}

impl ArcCache {
    pub fn new(capacity: usize, costs: ComputeCostTable) -> Self {
        Self {
            t1: OrderList::new(),
            t2: OrderList::new(),
            b1: OrderList::new(),
            b2: OrderList::new(),
            directory: HashMap::with_capacity(capacity * 2),
            p: 0,
            capacity,
            costs,
            hits: 0,
            misses: 0,
        }
    }

    /// 查询
    ///
    /// - T1 命中: 晋升到 T2 (已证明重复访问)
    /// - T2 命中: 刷新到 T2 的 MRU 端
    /// - 其他 (含幽灵): 未命中
    ///
    /// 返回序列的独立副本。命中/未命中计数无条件更新。
    pub fn get(&mut self, key: &CacheKey) -> Option<Series> {
        match self.directory.get(key).copied() {
            Some(Location::T1(h)) => {
                let (k, mut entry) = self.t1.remove(h);
                entry.touch();
                let series = entry.series.clone();
                let nh = self.t2.push_back((k.clone(), entry));
                self.directory.insert(k, Location::T2(nh));
                self.hits += 1;
                Some(series)
            }
            Some(Location::T2(h)) => {
                self.t2.move_to_back(h);
                let series = self.t2.get_mut(h).map(|(_, entry)| {
                    entry.touch();
                    entry.series.clone()
                });
                self.hits += 1;
                series
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    /// 写入
    ///
    /// 四种互斥情形：
    /// 1. 键在 B1 (幽灵): 近期性信号，p 增大，替换后直接进入 T2
    /// 2. 键在 B2 (幽灵): 频率信号，p 减小，替换后直接进入 T2
    /// 3. 全新键且 |T1|+|B1| 已达容量: 腾出 L1 空间后进入 T1
    /// 4. 全新键且目录总量达到容量: 必要时丢弃 B2 最旧幽灵，替换后进入 T1
    pub fn set(&mut self, key: CacheKey, series: Series) {
        // 容量 0 退化为始终未命中
        if self.capacity == 0 {
            return;
        }

        match self.directory.get(&key).copied() {
            Some(Location::T1(h)) => {
                // 已驻留：就地更新并刷新
                if let Some((_, entry)) = self.t1.get_mut(h) {
                    entry.series = series;
                }
                self.t1.move_to_back(h);
            }
            Some(Location::T2(h)) => {
                if let Some((_, entry)) = self.t2.get_mut(h) {
                    entry.series = series;
                }
                self.t2.move_to_back(h);
            }
            Some(Location::B1(h)) => {
                // 近期性信号：按幽灵列表比例增大 p
                let delta = std::cmp::max(self.b2.len() / std::cmp::max(self.b1.len(), 1), 1);
                self.p = std::cmp::min(self.capacity, self.p + delta);

                // 先摘除命中的幽灵，replace 的幽灵修剪不能动它
                self.b1.remove(h);
                self.directory.remove(&key);

                self.replace(true);

                // 重复访问已被证明，直接进入 T2
                self.insert_t2(key, series);
            }
            Some(Location::B2(h)) => {
                // 频率信号：按幽灵列表比例减小 p
                let delta = std::cmp::max(self.b1.len() / std::cmp::max(self.b2.len(), 1), 1);
                self.p = self.p.saturating_sub(delta);

                self.b2.remove(h);
                self.directory.remove(&key);

                self.replace(false);

                self.insert_t2(key, series);
            }
            None => {
                let l1 = self.t1.len() + self.b1.len();
                if l1 >= self.capacity {
                    if self.t1.len() < self.capacity {
                        // B1 让位，再按常规规则腾出驻留空间
                        if let Some(ghost) = self.b1.pop_front() {
                            self.directory.remove(&ghost);
                        }
                        self.replace(true);
                    } else {
                        // T1 独占容量：直接淘汰其 LRU 端，键记入 B1，
                        // 短期内再次请求同一键时可识别为近期性信号
                        self.evict_t1_lru();
                        self.trim_ghosts();
                    }
                } else {
                    let total = l1 + self.t2.len() + self.b2.len();
                    if total >= self.capacity {
                        if total >= self.capacity * 2 {
                            // 限制幽灵目录增长
                            if let Some(ghost) = self.b2.pop_front() {
                                self.directory.remove(&ghost);
                            }
                        }
                        self.replace(true);
                    }
                }

                // 新键一律从 T1 开始
                self.insert_t1(key, series);
            }
        }
    }

    /// REPLACE 子程序
    ///
    /// T1 非空且 (偏向 T1 时 |T1| == p，或 |T1| > p) 时从 T1 淘汰，
    /// 否则从 T2 淘汰；被淘汰键进入对应幽灵列表 (不保留数据)。
    /// 两侧互为兜底，保证有驻留条目时必有一次淘汰。
    fn replace(&mut self, biased_to_t1: bool) {
        let t1_len = self.t1.len();
        let from_t1 = t1_len > 0 && ((biased_to_t1 && t1_len == self.p) || t1_len > self.p);

        if from_t1 {
            if !self.evict_t1_lru() {
                self.evict_t2_lru();
            }
        } else if !self.evict_t2_lru() {
            self.evict_t1_lru();
        }

        self.trim_ghosts();
    }

    /// T1 LRU -> B1 幽灵
    fn evict_t1_lru(&mut self) -> bool {
        if let Some((key, _entry)) = self.t1.pop_front() {
            self.directory.remove(&key);
            let gh = self.b1.push_back(key.clone());
            self.directory.insert(key, Location::B1(gh));
            true
        } else {
            false
        }
    }

    /// T2 LRU -> B2 幽灵
    fn evict_t2_lru(&mut self) -> bool {
        if let Some((key, _entry)) = self.t2.pop_front() {
            self.directory.remove(&key);
            let gh = self.b2.push_back(key.clone());
            self.directory.insert(key, Location::B2(gh));
            true
        } else {
            false
        }
    }

    /// 幽灵列表各自不超过容量
    fn trim_ghosts(&mut self) {
        while self.b1.len() > self.capacity {
            if let Some(ghost) = self.b1.pop_front() {
                self.directory.remove(&ghost);
            } else {
                break;
            }
        }
        while self.b2.len() > self.capacity {
            if let Some(ghost) = self.b2.pop_front() {
                self.directory.remove(&ghost);
            } else {
                break;
            }
        }
    }

    fn insert_t1(&mut self, key: CacheKey, series: Series) {
        let cost = self.costs.lookup(&key.factor_name);
        let h = self.t1.push_back((key.clone(), CacheEntry::new(series, cost)));
        self.directory.insert(key, Location::T1(h));
    }

    fn insert_t2(&mut self, key: CacheKey, series: Series) {
        let cost = self.costs.lookup(&key.factor_name);
        let h = self.t2.push_back((key.clone(), CacheEntry::new(series, cost)));
        self.directory.insert(key, Location::T2(h));
    }

    // ── 观测接口 ──

    /// 键是否驻留 (幽灵不算)
    pub fn contains(&self, key: &CacheKey) -> bool {
        matches!(
            self.directory.get(key),
            Some(Location::T1(_)) | Some(Location::T2(_))
        )
    }

    /// 驻留条目数 (|T1| + |T2|)
    pub fn len(&self) -> usize {
        self.t1.len() + self.t2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t1.is_empty() && self.t2.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn p(&self) -> usize {
        self.p
    }

    pub fn t1_len(&self) -> usize {
        self.t1.len()
    }

    pub fn t2_len(&self) -> usize {
        self.t2.len()
    }

    pub fn b1_len(&self) -> usize {
        self.b1.len()
    }

    pub fn b2_len(&self) -> usize {
        self.b2.len()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// 命中率 = hits / (hits + misses)，无访问时为 0
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// 重置全部状态：四个列表、p、计数器
    pub fn clear(&mut self) {
        self.t1.clear();
        self.t2.clear();
        self.b1.clear();
        self.b2.clear();
        self.directory.clear();
        self.p = 0;
        self.hits = 0;
        self.misses = 0;
    }

    /// 按访问顺序导出驻留条目 (T1 旧->新，再 T2 旧->新)，用于快照
    pub fn entries_in_order(&self) -> Vec<(CacheKey, CacheEntry)> {
        let mut out = Vec::with_capacity(self.len());
        for (_, (k, e)) in self.t1.iter() {
            out.push((k.clone(), e.clone()));
        }
        for (_, (k, e)) in self.t2.iter() {
            out.push((k.clone(), e.clone()));
        }
        out
    }

    /// 恢复计数器 (快照恢复路径)
    pub(crate) fn restore_counters(&mut self, hits: u64, misses: u64) {
        self.hits = hits;
        self.misses = misses;
    }
}

impl std::fmt::Debug for ArcCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcCache")
            .field("t1_len", &self.t1.len())
            .field("t2_len", &self.t2.len())
            .field("b1_len", &self.b1.len())
            .field("b2_len", &self.b2.len())
            .field("p", &self.p)
            .field("capacity", &self.capacity)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
