//! 因子依赖图
//!
//! @yutiansut @quantaxis
//!
//! 管理命名因子节点与依赖边：
//! - 依赖名未注册时自动创建占位节点，注册顺序无关
//! - 占位节点可被真实定义就地升级；真实定义不允许重复注册
//! - 邻接同时维护 "依赖 -> 依赖者" 反向边与入度计数
//! - 不在插入时校验无环，排序/分层前按需检测

use polars::prelude::{DataFrame, Series};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{FactorError, FactorResult};

/// 节点计算函数：输入数据窗口与已就绪的依赖序列，输出因子序列
pub type NodeComputeFn =
    Arc<dyn Fn(&DataFrame, &HashMap<String, Series>) -> FactorResult<Series> + Send + Sync>;

/// 因子节点
#[derive(Clone)]
pub struct FactorNode {
    /// 因子名 (图内唯一)
    pub name: String,
    /// 依赖的因子名 (有序)
    pub dependencies: Vec<String>,
    /// 计算函数；占位节点为 None
    pub compute_fn: Option<NodeComputeFn>,
}

impl FactorNode {
    pub fn new(
        name: impl Into<String>,
        dependencies: Vec<String>,
        compute_fn: NodeComputeFn,
    ) -> Self {
        Self {
            name: name.into(),
            dependencies,
            compute_fn: Some(compute_fn),
        }
    }

    /// 无依赖的源节点
    pub fn source(name: impl Into<String>, compute_fn: NodeComputeFn) -> Self {
        Self::new(name, Vec::new(), compute_fn)
    }

    /// 占位节点 - 被引用但尚未定义
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            compute_fn: None,
        }
    }

    /// 是否携带真实定义 (计算函数或声明了依赖)
    pub fn is_defined(&self) -> bool {
        self.compute_fn.is_some() || !self.dependencies.is_empty()
    }

    /// 是否为占位节点
    pub fn is_placeholder(&self) -> bool {
        !self.is_defined()
    }
}

impl std::fmt::Debug for FactorNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactorNode")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("has_compute_fn", &self.compute_fn.is_some())
            .finish()
    }
}

/// 因子依赖图
#[derive(Default)]
pub struct DependencyGraph {
    /// 节点表
    nodes: HashMap<String, FactorNode>,
    /// 反向边: 依赖 -> 依赖者集合
    dependents: HashMap<String, HashSet<String>>,
    /// 入度缓存 (= 各节点依赖数)
    in_degree: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册因子节点
    ///
    /// 同名节点已携带真实定义时返回重复定义错误；
    /// 同名占位节点被就地升级 (支持乱序注册)；
    /// 未注册的依赖名自动创建为占位节点。
    pub fn add_factor(&mut self, node: FactorNode) -> FactorResult<()> {
        if let Some(existing) = self.nodes.get(&node.name) {
            if existing.is_defined() {
                return Err(FactorError::DuplicateFactor(node.name.clone()));
            }
        }

        for dep in &node.dependencies {
            if !self.nodes.contains_key(dep) {
                self.nodes
                    .insert(dep.clone(), FactorNode::placeholder(dep.clone()));
                self.in_degree.insert(dep.clone(), 0);
            }
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(node.name.clone());
        }

        // 入度按去重后的依赖数计 (依赖列表允许重复书写)
        let unique_deps = node.dependencies.iter().collect::<HashSet<_>>().len();
        self.in_degree.insert(node.name.clone(), unique_deps);
        self.dependents.entry(node.name.clone()).or_default();
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    pub fn get_node(&self, name: &str) -> Option<&FactorNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 节点名列表 (字典序，保证遍历确定性)
    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    /// 直接依赖者 (字典序)
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .dependents
            .get(name)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// 入度快照
    pub fn in_degrees(&self) -> HashMap<String, usize> {
        self.in_degree.clone()
    }

    /// 循环依赖检测
    ///
    /// 显式栈的深度优先搜索；返回第一条发现的循环路径
    /// (首尾同名闭合)。结果不缓存，每次调用重新遍历。
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        // 0 = 未访问, 1 = 在当前搜索路径上, 2 = 已完成
        let mut color: HashMap<&str, u8> = HashMap::with_capacity(self.nodes.len());

        for start in self.node_names() {
            if color.get(start.as_str()).copied().unwrap_or(0) != 0 {
                continue;
            }

            let mut path: Vec<String> = vec![start.clone()];
            let mut iters = vec![self.deps_iter(&start)];
            color.insert(self.intern(&start), 1);

            loop {
                let step = match iters.last_mut() {
                    Some(it) => it.next(),
                    None => break,
                };

                match step {
                    Some(next) => match color.get(next.as_str()).copied().unwrap_or(0) {
                        1 => {
                            // 命中搜索路径上的节点：截取闭合段
                            let pos = path.iter().position(|n| *n == next).unwrap_or(0);
                            let mut cycle = path[pos..].to_vec();
                            cycle.push(next);
                            return Some(cycle);
                        }
                        2 => {}
                        _ => {
                            color.insert(self.intern(&next), 1);
                            path.push(next.clone());
                            iters.push(self.deps_iter(&next));
                        }
                    },
                    None => {
                        iters.pop();
                        if let Some(done) = path.pop() {
                            color.insert(self.intern(&done), 2);
                        }
                    }
                }
            }
        }

        None
    }

    fn deps_iter(&self, name: &str) -> std::vec::IntoIter<String> {
        self.nodes
            .get(name)
            .map(|n| n.dependencies.clone())
            .unwrap_or_default()
            .into_iter()
    }

    /// 以节点表内的 String 为 key，避免 color 表持有临时引用
    fn intern(&self, name: &str) -> &str {
        self.nodes
            .get_key_value(name)
            .map(|(k, _)| k.as_str())
            .unwrap_or("")
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
