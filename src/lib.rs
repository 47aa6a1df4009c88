//! # QAFACTOR-RS
//!
//! 高性能因子计算引擎 - 基于 QAEXCHANGE 因子架构
//!
//! ## 核心能力
//!
//! - **因子缓存**: ARC 自适应替换 / LRU 双策略，跨请求复用计算结果
//! - **依赖图调度**: 占位注册/循环检测/Kahn 分层，层内 Rayon 并行
//! - **批量优化**: 因子族识别与共享基础序列复用，一次收益率喂全族
//! - **快照持久化**: rkyv 版本化落盘，启动预热恢复
//!
//! ## 架构设计
//!
//! ```text
//! 调用方 (策略层 / 预热工具)
//!     ↓
//! FactorEngine (engine)
//!     ↓
//! ┌──────────────┬───────────────────┐
//! FactorCache    DependencyGraph     BatchFactorComputer
//! (cache/)       + ParallelScheduler (batch/)
//!                (graph/)
//! ```
//!
//! ## 使用约定
//!
//! - 输入为 OHLCV 形状的 DataFrame (timestamp/open/high/low/close/volume)
//! - 输出每个请求因子一列，与输入时间索引对齐
//! - 核心组件单实例单线程访问，跨线程共享在引擎层加锁

#![allow(dead_code)]

// ============================================================================
// 外部依赖
// ============================================================================

// 并发工具
pub use dashmap;
pub use parking_lot;
pub use rayon;

// 因子批量计算
pub use polars;

// 序列化
pub use serde;

// 时间
pub use chrono;

// 日志
pub use log;

// 错误处理
pub use thiserror;

// ============================================================================
// 内部模块
// ============================================================================

/// 统一错误类型
pub mod error;

/// 配置管理
pub mod config;

/// 数据帧辅助
pub mod frame;

/// 因子缓存 (ARC/LRU 策略、快照)
pub mod cache;

/// 因子依赖图 (DAG、拓扑排序、分层调度)
pub mod graph;

/// 批量因子计算 (族识别、共享基础)
pub mod batch;

/// 统一引擎门面
pub mod engine;

pub use crate::batch::{BatchFactorComputer, FactorDependencyAnalyzer};
pub use crate::cache::{CacheKey, CacheStats, CacheStrategy, FactorCache};
pub use crate::config::EngineConfig;
pub use crate::engine::{ComputeFn, FactorEngine};
pub use crate::error::{FactorError, FactorResult};
pub use crate::graph::{DependencyGraph, FactorNode, ParallelScheduler, TopologicalSorter};
