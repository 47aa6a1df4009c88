//! 分层并行调度器
//!
//! @yutiansut @quantaxis
//!
//! 按拓扑层级推进执行：
//! - 层间严格有序，层内节点互不依赖，用 Rayon 并行计算
//! - 结果表中已有的名字直接复用，不重复计算
//! - 未解析的占位节点记警告跳过，不中断本批次
//! - 任一计算函数报错立即中止整个批次 (与预热路径的
//!   尽力而为语义相反，调度结果是必需品)

use polars::prelude::{DataFrame, Series};
use rayon::prelude::*;
use std::collections::HashMap;

use crate::error::{FactorError, FactorResult};

use super::dag::DependencyGraph;
use super::topo::TopologicalSorter;

/// 分层并行调度器
pub struct ParallelScheduler<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> ParallelScheduler<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    /// 计算层级列表
    pub fn schedule(&self) -> FactorResult<Vec<Vec<String>>> {
        TopologicalSorter::new(self.graph).get_layers()
    }

    /// 逐层执行
    ///
    /// results 中缺失的节点按层计算并写回；调用方可预填结果
    /// (如缓存命中的因子) 以跳过对应计算。
    pub fn execute(
        &self,
        data: &DataFrame,
        results: &mut HashMap<String, Series>,
    ) -> FactorResult<()> {
        let layers = self.schedule()?;

        for layer in &layers {
            // 过滤本层真正需要计算的节点
            let mut jobs = Vec::new();
            for name in layer {
                if results.contains_key(name) {
                    continue;
                }

                let node = match self.graph.get_node(name) {
                    Some(n) => n,
                    None => continue,
                };

                match &node.compute_fn {
                    Some(f) => jobs.push((name.clone(), node.dependencies.clone(), f.clone())),
                    None => {
                        log::warn!("Skipping unresolved placeholder factor: {}", name);
                    }
                }
            }

            if jobs.is_empty() {
                continue;
            }

            // 层内并行：本层节点只读取 ≤ 上一层的结果
            let ready: &HashMap<String, Series> = results;
            let computed: FactorResult<Vec<(String, Series)>> = jobs
                .par_iter()
                .map(|(name, dependencies, compute_fn)| {
                    let mut deps: HashMap<String, Series> = HashMap::new();
                    for dep in dependencies {
                        if let Some(series) = ready.get(dep) {
                            deps.insert(dep.clone(), series.clone());
                        }
                    }

                    compute_fn(data, &deps).map_err(|e| match e {
                        err @ FactorError::ComputeFailed { .. } => err,
                        other => FactorError::ComputeFailed {
                            factor: name.clone(),
                            reason: other.to_string(),
                        },
                    })
                    .map(|series| (name.clone(), series))
                })
                .collect();

            for (name, series) in computed? {
                results.insert(name, series);
            }
        }

        Ok(())
    }
}
