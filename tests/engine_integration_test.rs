//! 因子引擎集成测试
//!
//! 覆盖三条执行路径的端到端行为：缓存批量计算、依赖图调度、
//! 预热与快照恢复。

use polars::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use qafactor::batch::BatchFactorComputer;
use qafactor::cache::{CacheKey, CacheStrategy, ComputeCostTable, FactorCache};
use qafactor::config::EngineConfig;
use qafactor::engine::FactorEngine;
use qafactor::error::{FactorError, FactorResult};
use qafactor::frame;
use qafactor::graph::{DependencyGraph, FactorNode, NodeComputeFn, ParallelScheduler, TopologicalSorter};

fn sample_ohlcv(rows: usize) -> DataFrame {
    let ts: Vec<i64> = (0..rows as i64).map(|i| 60_000 * (i + 1)).collect();
    let close: Vec<f64> = (0..rows)
        .map(|i| 100.0 + 5.0 * ((i as f64) * 0.3).sin() + (i as f64) * 0.1)
        .collect();
    let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
    let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();

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

fn no_fallback(_data: &DataFrame, name: &str) -> FactorResult<Series> {
    Err(FactorError::UnknownFactor(name.to_string()))
}

#[test]
fn test_full_batch_pipeline_aligned_output() {
    let engine = FactorEngine::new(&EngineConfig::default());
    let data = sample_ohlcv(60);

    let requested = names(&[
        "ema_5", "rsi_14", "cci_20", "natr_14", "ret_5", "vol_10", "skew_10", "kurt_10",
    ]);
    let out = engine
        .compute(&data, &requested, "BTC/USDT", "5m")
        .unwrap();

    assert_eq!(out.width(), requested.len());
    assert_eq!(out.height(), data.height());

    // 每个请求名一列，顺序一致
    let col_names: Vec<String> = out
        .get_columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(col_names, requested);
}

#[test]
fn test_cache_hits_across_overlapping_requests() {
    let engine = FactorEngine::new(&EngineConfig::default());
    let data = sample_ohlcv(60);

    engine
        .compute(&data, &names(&["ema_5", "vol_10"]), "BTC/USDT", "5m")
        .unwrap();
    // 与上一批重叠的请求：ema_5 命中，rsi_14 未命中
    engine
        .compute(&data, &names(&["ema_5", "rsi_14"]), "BTC/USDT", "5m")
        .unwrap();

    let stats = engine.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.size, 3);
}

#[test]
fn test_different_windows_do_not_collide() {
    let engine = FactorEngine::new(&EngineConfig::default());
    let data_a = sample_ohlcv(40);
    let data_b = sample_ohlcv(50);

    engine
        .compute(&data_a, &names(&["ema_5"]), "BTC/USDT", "5m")
        .unwrap();
    engine
        .compute(&data_b, &names(&["ema_5"]), "BTC/USDT", "5m")
        .unwrap();

    // 不同窗口终点各自未命中
    assert_eq!(engine.stats().misses, 2);
    assert_eq!(engine.stats().size, 2);
}

#[test]
fn test_graph_diamond_layers_and_execution() {
    let noop: NodeComputeFn = Arc::new(|_d, _deps| Ok(frame::series_from("v", vec![1.0])));
    let sum_deps: NodeComputeFn = Arc::new(|_d, deps| {
        let mut total = 0.0;
        for s in deps.values() {
            total += s.f64()?.into_iter().flatten().sum::<f64>();
        }
        Ok(frame::series_from("v", vec![total + 1.0]))
    });

    let mut g = DependencyGraph::new();
    g.add_factor(FactorNode::source("a", noop.clone())).unwrap();
    g.add_factor(FactorNode::new("b", vec!["a".to_string()], sum_deps.clone()))
        .unwrap();
    g.add_factor(FactorNode::new("c", vec!["a".to_string()], sum_deps.clone()))
        .unwrap();
    g.add_factor(FactorNode::new(
        "d",
        vec!["b".to_string(), "c".to_string()],
        sum_deps,
    ))
    .unwrap();

    let layers = TopologicalSorter::new(&g).get_layers().unwrap();
    assert_eq!(layers[0], vec!["a".to_string()]);
    let mut mid = layers[1].clone();
    mid.sort();
    assert_eq!(mid, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(layers[2], vec!["d".to_string()]);

    let mut results = HashMap::new();
    ParallelScheduler::new(&g)
        .execute(&sample_ohlcv(5), &mut results)
        .unwrap();
    assert_eq!(results.len(), 4);
}

#[test]
fn test_cycle_reported_with_path() {
    let noop: NodeComputeFn = Arc::new(|_d, _deps| Ok(frame::series_from("v", vec![1.0])));

    let mut g = DependencyGraph::new();
    g.add_factor(FactorNode::new("x", vec!["y".to_string()], noop.clone()))
        .unwrap();
    g.add_factor(FactorNode::new("y", vec!["x".to_string()], noop))
        .unwrap();

    match TopologicalSorter::new(&g).sort().unwrap_err() {
        FactorError::CycleDetected(path) => {
            assert_eq!(path.first(), path.last());
            assert!(path.len() >= 3);
        }
        other => panic!("expected cycle error, got {}", other),
    }
}

#[test]
fn test_shared_base_reused_in_one_batch() {
    let computer = BatchFactorComputer::new();
    let data = sample_ohlcv(40);

    computer
        .compute_batch(&data, &names(&["vol_10", "skew_10", "ret_5"]), no_fallback)
        .unwrap();

    // 一步收益率作为共享基础，整批只计算一次
    assert_eq!(computer.intermediate().compute_count("__base_returns"), 1);
}

#[test]
fn test_arc_strategy_survives_snapshot_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("integration.rkyv");

    let data = sample_ohlcv(30);
    let engine = FactorEngine::new(&EngineConfig::default());
    engine
        .compute(&data, &names(&["ema_5", "rsi_14"]), "BTC/USDT", "5m")
        .unwrap();

    assert!(engine.save_snapshot(&path));

    let restored = FactorEngine::new(&EngineConfig::default());
    assert!(restored.load_snapshot(&path));

    // 恢复后的请求直接命中
    restored
        .compute(&data, &names(&["ema_5", "rsi_14"]), "BTC/USDT", "5m")
        .unwrap();
    let stats = restored.stats();
    assert_eq!(stats.hits - 2, engine.stats().hits);
}

#[test]
fn test_checkpoint_and_restore_latest() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.cache.snapshot_dir = dir.path().to_string_lossy().to_string();
    config.cache.max_snapshots = 2;

    let data = sample_ohlcv(30);
    let engine = FactorEngine::new(&config);
    engine
        .compute(&data, &names(&["ema_5", "vol_10"]), "BTC/USDT", "5m")
        .unwrap();

    assert!(engine.checkpoint());
    assert!(engine.checkpoint());
    assert!(engine.checkpoint());

    let restored = FactorEngine::new(&config);
    assert!(restored.restore_latest());
    assert_eq!(restored.stats().size, 2);

    // 保留数清理只留两份
    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 2);
}

#[test]
fn test_restore_latest_empty_dir_is_false() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.cache.snapshot_dir = dir.path().to_string_lossy().to_string();

    let engine = FactorEngine::new(&config);
    assert!(!engine.restore_latest());
}

#[test]
fn test_lru_strategy_facade() {
    let mut cache = FactorCache::new(CacheStrategy::Lru, 2, ComputeCostTable::standard());

    let k = |n: &str| CacheKey::new("SOL/USDT", "1m", n, 1);
    cache.set(k("a"), Series::new("a".into(), &[1.0f64]));
    cache.set(k("b"), Series::new("b".into(), &[2.0f64]));
    cache.set(k("c"), Series::new("c".into(), &[3.0f64]));

    assert!(!cache.contains(&k("a")));
    assert!(cache.contains(&k("b")));
    assert!(cache.contains(&k("c")));
}

#[test]
fn test_engine_with_custom_fallback() {
    let engine = FactorEngine::new(&EngineConfig::default()).with_compute_fn(Arc::new(
        |data: &DataFrame, name: &str| {
            frame::column_f64(data, "close").map(|v| frame::series_from(name, v))
        },
    ));
    let data = sample_ohlcv(10);

    let out = engine
        .compute(&data, &names(&["close_copy"]), "BTC/USDT", "5m")
        .unwrap();
    assert_eq!(out.width(), 1);
    assert_eq!(out.height(), 10);
}
