//! 统一错误类型
//!
//! @yutiansut @quantaxis
//!
//! 因子引擎的错误分类：
//! - 图构建错误 (重复定义)
//! - 循环依赖 (排序/分层前检测)
//! - 计算失败 (计算函数返回错误)
//! - 快照持久化错误

use thiserror::Error;

/// 因子引擎错误
#[derive(Debug, Error)]
pub enum FactorError {
    /// 重复定义因子 (已有真实定义的节点不允许覆盖)
    #[error("factor already defined: {0}")]
    DuplicateFactor(String),

    /// 检测到循环依赖，附带闭合路径
    #[error("cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// 计算函数失败 - 调度执行路径上致命
    #[error("compute failed for factor {factor}: {reason}")]
    ComputeFailed { factor: String, reason: String },

    /// 输入数据缺少必要列
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// 请求了未注册且无法识别的因子
    #[error("unknown factor: {0}")]
    UnknownFactor(String),

    /// 排序结果与节点数不一致 (图在排序期间被修改)
    #[error("graph mutated during sort: sorted {sorted} of {total} nodes")]
    GraphMutated { sorted: usize, total: usize },

    /// 快照 IO 错误
    #[error("snapshot io error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// 快照序列化/反序列化错误
    #[error("snapshot codec error: {0}")]
    SnapshotCodec(String),

    /// 快照版本不匹配
    #[error("snapshot version mismatch: expected {expected}, found {found}")]
    SnapshotVersion { expected: u32, found: u32 },

    /// Polars 计算错误
    #[error("polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

pub type FactorResult<T> = Result<T, FactorError>;
