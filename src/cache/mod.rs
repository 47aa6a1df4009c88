//! 因子缓存模块
//!
//! @yutiansut @quantaxis
//!
//! 提供跨请求复用因子计算结果的缓存层：
//! - 缓存键/条目模型 (key) - (pair, timeframe, factor, 窗口终点) 定位
//! - Slab 有序链表 (list) - O(1) 的顺序维护
//! - ARC 自适应缓存 (arc) - 近期性/频率在线平衡
//! - LRU 缓存 (lru) - 对照策略
//! - 统一门面 (factor_cache) - 策略选择、统计、预热、快照
//! - 快照持久化 (snapshot) - rkyv 版本化落盘

pub mod arc;
pub mod factor_cache;
pub mod key;
pub mod list;
pub mod lru;
pub mod snapshot;

pub use arc::ArcCache;
pub use factor_cache::{CacheStats, CacheStrategy, FactorCache};
pub use key::{CacheEntry, CacheKey, ComputeCostTable};
pub use lru::LruCache;
pub use snapshot::{CacheSnapshot, SnapshotStore, SNAPSHOT_VERSION};
