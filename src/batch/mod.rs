//! 批量因子计算模块
//!
//! @yutiansut @quantaxis
//!
//! 扁平因子名列表的共享子表达式优化：
//! - 滚动统计 (rolling) - 整列批量算子
//! - 依赖分析 (analyzer) - 因子族解析与共享基础识别
//! - 批量计算 (computer) - 共享基础预计算 + 族内批量遍历

pub mod analyzer;
pub mod computer;
pub mod rolling;

pub use analyzer::{BaseSeries, FactorDependencyAnalyzer, FactorFamily, ParsedFactor};
pub use computer::{BatchFactorComputer, IntermediateResultCache};
