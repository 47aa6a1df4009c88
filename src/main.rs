//! QAFactor 演示服务
//!
//! 构建标准因子依赖图，在合成 OHLCV 数据上演示三条执行路径：
//! 缓存批量计算、依赖图调度、预热 + 快照。
//!
//! 运行: cargo run --bin qafactor-demo

use polars::prelude::*;
use qafactor::config::EngineConfig;
use qafactor::engine::FactorEngine;
use qafactor::frame;
use qafactor::graph::{FactorNode, NodeComputeFn};
use std::sync::Arc;

fn synthetic_ohlcv(rows: usize) -> DataFrame {
    let ts: Vec<i64> = (0..rows as i64).map(|i| 1_700_000_000_000 + 300_000 * i).collect();
    let close: Vec<f64> = (0..rows)
        .map(|i| 30_000.0 + 500.0 * ((i as f64) * 0.1).sin() + (i as f64) * 2.0)
        .collect();
    let high: Vec<f64> = close.iter().map(|c| c * 1.002).collect();
    let low: Vec<f64> = close.iter().map(|c| c * 0.998).collect();
    let open: Vec<f64> = close.iter().map(|c| c * 0.999).collect();
    let volume: Vec<f64> = (0..rows).map(|i| 10.0 + (i % 7) as f64).collect();

    DataFrame::new(vec![
        Series::new("timestamp".into(), ts).into_column(),
        Series::new("open".into(), open).into_column(),
        Series::new("high".into(), high).into_column(),
        Series::new("low".into(), low).into_column(),
        Series::new("close".into(), close).into_column(),
        Series::new("volume".into(), volume).into_column(),
    ])
    .expect("valid synthetic frame")
}

fn main() {
    env_logger::init();

    log::info!("========== QAFactor Demo ==========");

    let config = EngineConfig::default();
    let mut engine = FactorEngine::new(&config);

    let data = synthetic_ohlcv(500);
    let pair = "BTC/USDT";
    let timeframe = "5m";

    // 1. 批量路径：族识别 + 共享基础
    let names: Vec<String> = [
        "ema_5", "ema_10", "ema_20", "rsi_14", "cci_20", "natr_14", "ret_5", "vol_10", "skew_10",
        "kurt_10",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let table = engine
        .compute(&data, &names, pair, timeframe)
        .expect("batch compute");
    log::info!(
        "Batch path: {} columns x {} rows",
        table.width(),
        table.height()
    );

    // 同窗口再算一次，observe 缓存命中
    engine
        .compute(&data, &names, pair, timeframe)
        .expect("cached compute");
    let stats = engine.stats();
    log::info!(
        "Cache stats: hits={} misses={} size={} hit_rate={:.2}",
        stats.hits,
        stats.misses,
        stats.size,
        stats.hit_rate
    );

    // 2. 依赖图路径
    let close_fn: NodeComputeFn = Arc::new(|data, _deps| {
        Ok(frame::series_from(
            "close_src",
            frame::column_f64(data, "close")?,
        ))
    });
    let spread_fn: NodeComputeFn = Arc::new(|data, _deps| {
        let high = frame::column_f64(data, "high")?;
        let low = frame::column_f64(data, "low")?;
        let spread: Vec<f64> = high.iter().zip(&low).map(|(h, l)| h - l).collect();
        Ok(frame::series_from("spread", spread))
    });
    let ratio_fn: NodeComputeFn = Arc::new(|_data, deps| {
        let close = deps["close_src"].f64()?;
        let spread = deps["spread"].f64()?;
        let ratio: Vec<f64> = close
            .into_iter()
            .zip(spread)
            .map(|(c, s)| match (c, s) {
                (Some(c), Some(s)) if c != 0.0 => s / c,
                _ => f64::NAN,
            })
            .collect();
        Ok(frame::series_from("spread_ratio", ratio))
    });

    engine
        .register_factor(FactorNode::source("close_src", close_fn))
        .expect("register close_src");
    engine
        .register_factor(FactorNode::source("spread", spread_fn))
        .expect("register spread");
    engine
        .register_factor(FactorNode::new(
            "spread_ratio",
            vec!["close_src".to_string(), "spread".to_string()],
            ratio_fn,
        ))
        .expect("register spread_ratio");

    let graph_results = engine
        .execute_graph(&data, pair, timeframe)
        .expect("graph execute");
    log::info!("Graph path: {} factors computed", graph_results.len());

    // 3. 预热 + 快照
    let warm_names: Vec<String> = ["sma_30", "vol_20"].iter().map(|s| s.to_string()).collect();
    let inserted = engine.warmup(&data, &warm_names, pair, timeframe);
    log::info!("Warmup inserted {} factors", inserted);

    let snapshot_path = std::path::Path::new(&config.cache.snapshot_dir).join("demo.rkyv");
    if engine.save_snapshot(&snapshot_path) {
        log::info!("Snapshot saved to {:?}", snapshot_path);
    }
    if engine.checkpoint() {
        log::info!("Numbered checkpoint saved under {}", config.cache.snapshot_dir);
    }

    log::info!("========== Demo Finished ==========");
}
