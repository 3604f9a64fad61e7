//! 截图缓存生命周期模块
//!
//! # 设计思路
//!
//! 保存目录中"属于缓存"的文件完全由文件名决定：`capture_<17 位毫秒时间戳>.png`。
//! 同一目录里的其他文件（用户自己的图片、其他程序的产物）永远不会被计入或删除。
//!
//! 本模块不在内存中缓存目录列表，每次操作都重新枚举，以反映外部的并发修改
//! （用户手动打开 / 删除文件等）。
//!
//! - `eviction`：写入前按数量淘汰、按时长过期清扫、全量清理
//! - `sweeper`：周期清扫定时器
//!
//! # 实现思路
//!
//! - 文件名中的时间戳精确到毫秒，字典序即时间序。
//! - 创建时间优先取自文件名（本地时间），文件名无法解析为合法时间时
//!   回退到文件系统的创建时间 / 修改时间。

pub mod eviction;
pub mod sweeper;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

pub use eviction::{evict_for_incoming, purge_all, sweep_expired, EvictionReport};
pub use sweeper::SweepTimer;

/// 缓存文件名前缀
pub const FILE_PREFIX: &str = "capture_";
/// 缓存文件扩展名
pub const FILE_EXTENSION: &str = "png";

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

static CACHED_FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^capture_(\d{17})\.png$").unwrap());

/// 缓存配置（设置的只读快照）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// 保存目录
    pub save_dir: PathBuf,
    /// 最大文件数量（0 = 无限制）
    pub max_files: u32,
    /// 保留时长（小时，0 = 永久保留）
    pub retention_hours: u32,
    /// 清扫间隔（分钟，0 = 不启动定时器）
    pub sweep_interval_minutes: u32,
}

impl CacheConfig {
    /// 清扫间隔，`None` 表示禁用
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.sweep_interval_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(u64::from(minutes) * 60)),
        }
    }

    /// 保留时长，`None` 表示永久保留
    pub fn retention(&self) -> Option<chrono::Duration> {
        match self.retention_hours {
            0 => None,
            hours => Some(chrono::Duration::hours(i64::from(hours))),
        }
    }
}

/// 保存目录中的一个缓存文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    /// 绝对路径
    pub path: PathBuf,
    /// 创建时间
    pub created_at: DateTime<Local>,
    /// 文件大小（字节）
    pub size: u64,
}

impl CachedFile {
    /// 文件名（用于日志与同时间戳排序）
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// 根据时间生成缓存文件名
pub fn cached_file_name(at: DateTime<Local>) -> String {
    format!("{}{}.{}", FILE_PREFIX, at.format(TIMESTAMP_FORMAT), FILE_EXTENSION)
}

/// 判断文件名是否属于缓存
pub fn is_cached_file_name(name: &str) -> bool {
    CACHED_FILE_NAME.is_match(name)
}

/// 从缓存文件名中解析创建时间
pub fn parse_file_name_timestamp(name: &str) -> Option<DateTime<Local>> {
    let digits = CACHED_FILE_NAME.captures(name)?.get(1)?.as_str();
    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<u32>().ok();

    let year = i32::try_from(field(0..4)?).ok()?;
    let naive = NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_milli_opt(
        field(8..10)?,
        field(10..12)?,
        field(12..14)?,
        field(14..17)?,
    )?;
    Local.from_local_datetime(&naive).earliest()
}

fn metadata_timestamp(metadata: &fs::Metadata) -> Option<DateTime<Local>> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .map(DateTime::<Local>::from)
}

/// 枚举保存目录中的全部缓存文件，按创建时间从旧到新排序
///
/// 同一时间戳的文件按文件名字典序排列。目录不存在时返回空列表。
pub fn list_cached_files(dir: &Path) -> Vec<CachedFile> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            log::warn!("📁 读取保存目录失败 '{}': {}", dir.display(), err);
            return Vec::new();
        }
    };

    let mut files: Vec<CachedFile> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            if !is_cached_file_name(name) {
                return None;
            }
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }
            let created_at =
                parse_file_name_timestamp(name).or_else(|| metadata_timestamp(&metadata))?;
            Some(CachedFile {
                path: entry.path(),
                created_at,
                size: metadata.len(),
            })
        })
        .collect();

    files.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
    });
    files
}
