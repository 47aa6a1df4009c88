//! 统一因子计算引擎
//!
//! @yutiansut @quantaxis
//!
//! 对外门面，组合三个执行路径：
//! - 缓存层 (FactorCache) - 先查缓存，未命中才计算，结果写回
//! - 批量路径 (BatchFactorComputer) - 扁平名字列表，共享基础复用
//! - 图路径 (ParallelScheduler) - 显式依赖图，分层推进
//!
//! 缓存包在 parking_lot::Mutex 内：核心组件自身不做同步，
//! 跨调用方共享由引擎这一层显式串行化。

use parking_lot::Mutex;
use polars::prelude::{Column, DataFrame, IntoColumn, Series};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::batch::BatchFactorComputer;
use crate::cache::{CacheKey, CacheStats, FactorCache, SnapshotStore};
use crate::config::EngineConfig;
use crate::error::{FactorError, FactorResult};
use crate::frame;
use crate::graph::{DependencyGraph, FactorNode, ParallelScheduler};

/// 通用因子计算回调：引擎对因子语义零知识
pub type ComputeFn = Arc<dyn Fn(&DataFrame, &str) -> FactorResult<Series> + Send + Sync>;

/// 统一因子计算引擎
pub struct FactorEngine {
    cache: Mutex<FactorCache>,
    graph: DependencyGraph,
    batch: BatchFactorComputer,
    config: EngineConfig,
    /// 未识别因子的回退计算回调
    compute_fn: Option<ComputeFn>,
}

impl FactorEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            cache: Mutex::new(FactorCache::from_config(&config.cache, &config.costs)),
            graph: DependencyGraph::new(),
            batch: BatchFactorComputer::new(),
            config: config.clone(),
            compute_fn: None,
        }
    }

    /// 注入通用计算回调
    pub fn with_compute_fn(mut self, f: ComputeFn) -> Self {
        self.compute_fn = Some(f);
        self
    }

    /// 注册依赖图节点
    pub fn register_factor(&mut self, node: FactorNode) -> FactorResult<()> {
        self.graph.add_factor(node)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// 批量计算请求的因子列，带缓存
    ///
    /// 命中缓存的列直接复用；未命中的交给批量计算器，
    /// 结果写回缓存。输出按请求顺序一列一因子。
    pub fn compute(
        &self,
        data: &DataFrame,
        names: &[String],
        pair: &str,
        timeframe: &str,
    ) -> FactorResult<DataFrame> {
        let end_ts = frame::window_end(data);

        let mut resolved: HashMap<String, Series> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();

        {
            let mut cache = self.cache.lock();
            for name in names {
                if resolved.contains_key(name) || missing.contains(name) {
                    continue;
                }
                let key = CacheKey::new(pair, timeframe, name.clone(), end_ts);
                match cache.get(&key) {
                    Some(series) => {
                        resolved.insert(name.clone(), series);
                    }
                    None => missing.push(name.clone()),
                }
            }
        }

        if !missing.is_empty() {
            log::debug!(
                "Computing {} factors ({} cache hits) for {}/{}",
                missing.len(),
                resolved.len(),
                pair,
                timeframe
            );

            let fallback = self.compute_fn.clone();
            let computed = self.batch.compute_batch(data, &missing, |df, name| {
                match &fallback {
                    Some(f) => f(df, name),
                    None => Err(FactorError::UnknownFactor(name.to_string())),
                }
            })?;

            let mut cache = self.cache.lock();
            for column in computed.get_columns() {
                let series = column.as_materialized_series().clone();
                let name = series.name().to_string();
                let key = CacheKey::new(pair, timeframe, name.clone(), end_ts);
                cache.set(key, series.clone());
                resolved.insert(name, series);
            }
        }

        // 按请求顺序组装 (去重)
        let mut columns: Vec<Column> = Vec::new();
        let mut emitted: Vec<&String> = Vec::new();
        for name in names {
            if emitted.contains(&name) {
                continue;
            }
            emitted.push(name);
            let series = resolved
                .get(name)
                .cloned()
                .ok_or_else(|| FactorError::UnknownFactor(name.clone()))?;
            columns.push(series.into_column());
        }

        Ok(DataFrame::new(columns)?)
    }

    /// 依赖图路径：分层调度执行，带缓存
    ///
    /// 图中每个节点的结果以 (pair, timeframe, 节点名, 窗口终点)
    /// 为键缓存；命中的节点预填结果表跳过计算。
    pub fn execute_graph(
        &self,
        data: &DataFrame,
        pair: &str,
        timeframe: &str,
    ) -> FactorResult<HashMap<String, Series>> {
        let end_ts = frame::window_end(data);
        let mut results: HashMap<String, Series> = HashMap::new();

        {
            let mut cache = self.cache.lock();
            for name in self.graph.node_names() {
                let key = CacheKey::new(pair, timeframe, name.clone(), end_ts);
                if let Some(series) = cache.get(&key) {
                    results.insert(name, series);
                }
            }
        }

        let prefilled: Vec<String> = results.keys().cloned().collect();

        ParallelScheduler::new(&self.graph).execute(data, &mut results)?;

        {
            let mut cache = self.cache.lock();
            for (name, series) in &results {
                if prefilled.contains(name) {
                    continue;
                }
                let key = CacheKey::new(pair, timeframe, name.clone(), end_ts);
                cache.set(key, series.clone());
            }
        }

        Ok(results)
    }

    /// 批量预热缓存；单因子失败跳过，返回写入数量
    pub fn warmup(
        &self,
        data: &DataFrame,
        names: &[String],
        pair: &str,
        timeframe: &str,
    ) -> usize {
        let fallback = self.compute_fn.clone();
        let batch = &self.batch;
        self.cache.lock().warmup(
            data,
            names,
            |df, name| {
                // 预热复用批量路径的族计算，未识别时走回调
                let out = batch.compute_batch(df, &[name.to_string()], |d, n| match &fallback {
                    Some(f) => f(d, n),
                    None => Err(FactorError::UnknownFactor(n.to_string())),
                })?;
                let column = out
                    .get_columns()
                    .first()
                    .ok_or_else(|| FactorError::UnknownFactor(name.to_string()))?;
                Ok(column.as_materialized_series().clone())
            },
            pair,
            timeframe,
        )
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    pub fn hit_rate(&self) -> f64 {
        self.cache.lock().hit_rate()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear()
    }

    /// 缓存快照落盘；失败记日志并返回 false
    pub fn save_snapshot(&self, path: &Path) -> bool {
        self.cache.lock().save_snapshot(path)
    }

    /// 从快照恢复缓存；失败记日志并返回 false
    pub fn load_snapshot(&self, path: &Path) -> bool {
        self.cache.lock().load_snapshot(path)
    }

    /// 在配置的快照目录保存编号检查点 (带保留数清理)
    pub fn checkpoint(&self) -> bool {
        let snapshot = self.cache.lock().capture_snapshot();
        let result = SnapshotStore::new(
            &self.config.cache.snapshot_dir,
            self.config.cache.max_snapshots,
        )
        .and_then(|mut store| store.save_checkpoint(&snapshot));

        match result {
            Ok(id) => {
                log::info!("Cache checkpoint {} saved", id);
                true
            }
            Err(e) => {
                log::error!("Cache checkpoint failed: {}", e);
                false
            }
        }
    }

    /// 从配置目录的最新检查点恢复；目录为空或失败返回 false
    pub fn restore_latest(&self) -> bool {
        let result = SnapshotStore::new(
            &self.config.cache.snapshot_dir,
            self.config.cache.max_snapshots,
        )
        .and_then(|store| store.load_latest());

        match result {
            Ok(Some(snapshot)) => {
                self.cache.lock().restore_snapshot(&snapshot);
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::error!("Cache restore failed: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for FactorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactorEngine")
            .field("graph_nodes", &self.graph.len())
            .field("cache", &*self.cache.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn sample_df(rows: usize) -> DataFrame {
        let ts: Vec<i64> = (0..rows as i64).map(|i| 60_000 * (i + 1)).collect();
        let close: Vec<f64> = (0..rows).map(|i| 100.0 + (i as f64).sin()).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 0.5).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.5).collect();

        DataFrame::new(vec![
            Series::new("timestamp".into(), ts).into_column(),
            Series::new("close".into(), close).into_column(),
            Series::new("high".into(), high).into_column(),
            Series::new("low".into(), low).into_column(),
        ])
        .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_compute_populates_cache() {
        let engine = FactorEngine::new(&EngineConfig::default());
        let df = sample_df(30);

        let out = engine
            .compute(&df, &names(&["ema_5", "rsi_14"]), "BTC/USDT", "5m")
            .unwrap();
        assert_eq!(out.width(), 2);
        assert_eq!(engine.stats().misses, 2);

        // 第二次请求全部命中
        let out2 = engine
            .compute(&df, &names(&["ema_5", "rsi_14"]), "BTC/USDT", "5m")
            .unwrap();
        assert_eq!(out2.width(), 2);
        let stats = engine.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.size, 2);
    }

    #[test]
    fn test_unknown_factor_without_fallback() {
        let engine = FactorEngine::new(&EngineConfig::default());
        let df = sample_df(10);

        let err = engine
            .compute(&df, &names(&["mystery"]), "BTC/USDT", "5m")
            .unwrap_err();
        assert!(matches!(err, FactorError::ComputeFailed { .. }));
    }

    #[test]
    fn test_graph_path_with_cache() {
        let mut engine = FactorEngine::new(&EngineConfig::default());
        let df = sample_df(10);

        let close_fn: crate::graph::NodeComputeFn =
            Arc::new(|data, _deps| Ok(frame::series_from("close_src", frame::column_f64(data, "close")?)));
        let double_fn: crate::graph::NodeComputeFn = Arc::new(|_data, deps| {
            let close = deps
                .get("close_src")
                .ok_or_else(|| FactorError::MissingColumn("close_src".to_string()))?;
            let doubled: Vec<f64> = close
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN) * 2.0)
                .collect();
            Ok(frame::series_from("doubled", doubled))
        });

        engine
            .register_factor(FactorNode::source("close_src", close_fn))
            .unwrap();
        engine
            .register_factor(FactorNode::new(
                "doubled",
                vec!["close_src".to_string()],
                double_fn,
            ))
            .unwrap();

        let results = engine.execute_graph(&df, "BTC/USDT", "5m").unwrap();
        assert_eq!(results.len(), 2);

        // 再次执行应全部命中缓存
        let before = engine.stats().hits;
        engine.execute_graph(&df, "BTC/USDT", "5m").unwrap();
        assert!(engine.stats().hits >= before + 2);
    }

    #[test]
    fn test_warmup_then_compute_hits() {
        let engine = FactorEngine::new(&EngineConfig::default());
        let df = sample_df(30);

        let inserted = engine.warmup(&df, &names(&["ema_5", "vol_10"]), "ETH/USDT", "1h");
        assert_eq!(inserted, 2);

        engine
            .compute(&df, &names(&["ema_5", "vol_10"]), "ETH/USDT", "1h")
            .unwrap();
        assert_eq!(engine.stats().hits, 2);
    }
}
