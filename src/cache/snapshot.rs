//! 缓存快照持久化
//!
//! @yutiansut @quantaxis
//!
//! 提供因子缓存全量状态的落盘与恢复：
//! - rkyv 序列化，显式版本号，版本不符拒绝加载
//! - 条目按访问顺序 (旧->新) 保存，恢复时按序重放
//! - 编号检查点管理与保留数清理
//!
//! 快照是进程本地格式 (同构建恢复)，不作为跨语言交换格式。

use rkyv::{Archive, Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use polars::prelude::{NamedFrom, Series};

use crate::cache::key::{CacheEntry, CacheKey};
use crate::error::{FactorError, FactorResult};

/// 当前快照格式版本
pub const SNAPSHOT_VERSION: u32 = 1;

const CHECKPOINT_PREFIX: &str = "cache_";
const CHECKPOINT_EXT: &str = ".rkyv";

// ═══════════════════════════════════════════════════════════════════════════
// 可序列化结构
// ═══════════════════════════════════════════════════════════════════════════

/// 单个缓存条目的快照镜像
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[archive(check_bytes)]
pub struct SnapshotEntry {
    pub pair: String,
    pub timeframe: String,
    pub factor_name: String,
    pub end_timestamp: i64,
    pub values: Vec<f64>,
    pub access_count: u64,
    pub last_access_ms: i64,
    pub compute_cost: f64,
}

/// 缓存全量快照
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[archive(check_bytes)]
pub struct CacheSnapshot {
    pub version: u32,
    /// 条目按访问顺序排列 (旧->新)
    pub entries: Vec<SnapshotEntry>,
    pub hits: u64,
    pub misses: u64,
    pub created_at_ms: u64,
}

impl CacheSnapshot {
    /// 从有序条目与计数器构建快照
    pub fn capture(entries: &[(CacheKey, CacheEntry)], hits: u64, misses: u64) -> Self {
        let snapshot_entries = entries
            .iter()
            .map(|(key, entry)| {
                let values = entry
                    .series
                    .f64()
                    .map(|ca| ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
                    .unwrap_or_default();
                SnapshotEntry {
                    pair: key.pair.clone(),
                    timeframe: key.timeframe.clone(),
                    factor_name: key.factor_name.clone(),
                    end_timestamp: key.end_timestamp,
                    values,
                    access_count: entry.access_count,
                    last_access_ms: entry.last_access_ms,
                    compute_cost: entry.compute_cost,
                }
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            entries: snapshot_entries,
            hits,
            misses,
            created_at_ms: now_ms(),
        }
    }

    /// 展开为 (键, 序列) 对，按保存时的访问顺序
    pub fn unpack(&self) -> Vec<(CacheKey, Series)> {
        self.entries
            .iter()
            .map(|e| {
                let key = CacheKey::new(
                    e.pair.clone(),
                    e.timeframe.clone(),
                    e.factor_name.clone(),
                    e.end_timestamp,
                );
                let series = Series::new(e.factor_name.as_str().into(), &e.values);
                (key, series)
            })
            .collect()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ═══════════════════════════════════════════════════════════════════════════
// 快照存储管理器
// ═══════════════════════════════════════════════════════════════════════════

/// 快照存储管理器 - 编号检查点 + 保留数清理
pub struct SnapshotStore {
    base_path: PathBuf,
    max_snapshots: usize,
    counter: u64,
}

impl SnapshotStore {
    pub fn new(base_path: impl Into<PathBuf>, max_snapshots: usize) -> FactorResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        let latest = Self::find_latest_id(&base_path);
        Ok(Self {
            base_path,
            max_snapshots,
            counter: latest + 1,
        })
    }

    /// 保存快照到显式路径
    pub fn save_to(path: &Path, snapshot: &CacheSnapshot) -> FactorResult<()> {
        let bytes = rkyv::to_bytes::<_, 256>(snapshot)
            .map_err(|e| FactorError::SnapshotCodec(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;

        log::info!(
            "Saved cache snapshot ({} entries) to {:?}",
            snapshot.entries.len(),
            path
        );
        Ok(())
    }

    /// 从显式路径加载快照，校验格式版本
    pub fn load_from(path: &Path) -> FactorResult<CacheSnapshot> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let archived = rkyv::check_archived_root::<CacheSnapshot>(&bytes)
            .map_err(|e| FactorError::SnapshotCodec(e.to_string()))?;

        let snapshot: CacheSnapshot = archived
            .deserialize(&mut rkyv::Infallible)
            .map_err(|_| FactorError::SnapshotCodec("deserialization failed".to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(FactorError::SnapshotVersion {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }

        log::info!(
            "Loaded cache snapshot ({} entries) from {:?}",
            snapshot.entries.len(),
            path
        );
        Ok(snapshot)
    }

    /// 保存编号检查点，返回检查点 ID
    pub fn save_checkpoint(&mut self, snapshot: &CacheSnapshot) -> FactorResult<u64> {
        let id = self.counter;
        self.counter += 1;

        let path = self.checkpoint_path(id);
        Self::save_to(&path, snapshot)?;
        self.cleanup_old()?;
        Ok(id)
    }

    /// 加载最新检查点；目录为空时返回 None
    pub fn load_latest(&self) -> FactorResult<Option<CacheSnapshot>> {
        let latest = Self::find_latest_id(&self.base_path);
        if latest == 0 {
            return Ok(None);
        }
        Self::load_from(&self.checkpoint_path(latest)).map(Some)
    }

    /// 列出所有检查点 ID (升序)
    pub fn list_checkpoints(&self) -> Vec<u64> {
        let mut ids = Self::scan_ids(&self.base_path);
        ids.sort_unstable();
        ids
    }

    fn checkpoint_path(&self, id: u64) -> PathBuf {
        self.base_path
            .join(format!("{}{:016}{}", CHECKPOINT_PREFIX, id, CHECKPOINT_EXT))
    }

    fn find_latest_id(base_path: &Path) -> u64 {
        Self::scan_ids(base_path).into_iter().max().unwrap_or(0)
    }

    fn scan_ids(base_path: &Path) -> Vec<u64> {
        let mut ids = Vec::new();
        if let Ok(entries) = fs::read_dir(base_path) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if name.starts_with(CHECKPOINT_PREFIX) && name.ends_with(CHECKPOINT_EXT) {
                        if let Ok(id) = name
                            .trim_start_matches(CHECKPOINT_PREFIX)
                            .trim_end_matches(CHECKPOINT_EXT)
                            .parse::<u64>()
                        {
                            ids.push(id);
                        }
                    }
                }
            }
        }
        ids
    }

    /// 删除超出保留数量的旧检查点
    fn cleanup_old(&self) -> FactorResult<()> {
        let mut ids = self.list_checkpoints();
        while ids.len() > self.max_snapshots {
            let id = ids.remove(0);
            let path = self.checkpoint_path(id);
            log::info!("Removing old cache snapshot {}: {:?}", id, path);
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
