//! 因子依赖图模块
//!
//! @yutiansut @quantaxis
//!
//! - 依赖图 (dag) - 节点注册、占位升级、循环检测
//! - 拓扑排序 (topo) - Kahn 全序与并行分层
//! - 调度器 (scheduler) - 按层执行，层内并行

pub mod dag;
pub mod scheduler;
pub mod topo;

pub use dag::{DependencyGraph, FactorNode, NodeComputeFn};
pub use scheduler::ParallelScheduler;
pub use topo::TopologicalSorter;
