//! 拓扑排序与并行分层
//!
//! @yutiansut @quantaxis
//!
//! - validate: 排序前按需检测循环依赖
//! - sort: Kahn 算法全序
//! - get_layers: 逐波提取入度 0 节点，同层节点互不依赖，
//!   第 i+1 层只依赖 ≤ i 层的节点

use std::collections::VecDeque;

use crate::error::{FactorError, FactorResult};

use super::dag::DependencyGraph;

/// 拓扑排序器
pub struct TopologicalSorter<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> TopologicalSorter<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    /// 无环校验，发现循环时返回闭合路径错误
    pub fn validate(&self) -> FactorResult<()> {
        match self.graph.detect_cycle() {
            Some(cycle) => Err(FactorError::CycleDetected(cycle)),
            None => Ok(()),
        }
    }

    /// Kahn 算法全序
    ///
    /// 入度 0 节点入队，反复出队、追加结果、递减依赖者入度。
    /// 结果长度与节点数不一致时报错 (防御排序期间的图变更)。
    pub fn sort(&self) -> FactorResult<Vec<String>> {
        self.validate()?;

        let mut in_degree = self.graph.in_degrees();
        let mut queue: VecDeque<String> = self
            .graph
            .node_names()
            .into_iter()
            .filter(|n| in_degree.get(n).copied().unwrap_or(0) == 0)
            .collect();

        let mut result = Vec::with_capacity(self.graph.len());

        while let Some(name) = queue.pop_front() {
            for dependent in self.graph.dependents_of(&name) {
                if let Some(deg) = in_degree.get_mut(&dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
            result.push(name);
        }

        if result.len() != self.graph.len() {
            return Err(FactorError::GraphMutated {
                sorted: result.len(),
                total: self.graph.len(),
            });
        }

        Ok(result)
    }

    /// 并行分层
    ///
    /// 每一波取出当前所有入度 0 的剩余节点；波内成员可独立计算。
    pub fn get_layers(&self) -> FactorResult<Vec<Vec<String>>> {
        self.validate()?;

        let mut in_degree = self.graph.in_degrees();
        let mut remaining: Vec<String> = self.graph.node_names();
        let mut layers = Vec::new();
        let mut processed = 0usize;

        while !remaining.is_empty() {
            let wave: Vec<String> = remaining
                .iter()
                .filter(|n| in_degree.get(*n).copied().unwrap_or(0) == 0)
                .cloned()
                .collect();

            if wave.is_empty() {
                // validate 已排除循环；此处只可能是并发变更
                return Err(FactorError::GraphMutated {
                    sorted: processed,
                    total: self.graph.len(),
                });
            }

            for name in &wave {
                for dependent in self.graph.dependents_of(name) {
                    if let Some(deg) = in_degree.get_mut(&dependent) {
                        *deg = deg.saturating_sub(1);
                    }
                }
            }

            remaining.retain(|n| !wave.contains(n));
            processed += wave.len();
            layers.push(wave);
        }

        Ok(layers)
    }
}
