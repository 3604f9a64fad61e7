//! 缓存淘汰策略
//!
//! 三种操作互相独立、均可重复执行：某次删除失败只会让该文件留到下一次清扫。
//!
//! - 写入前淘汰：数量达到上限时逐个删除最旧文件，删除失败立即中止（不死循环）
//! - 过期清扫：删除早于 `now - 保留时长` 的文件，单个失败不影响其余文件
//! - 全量清理：删除全部缓存文件，失败静默忽略，不拖慢退出 / 关机

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::{list_cached_files, CacheConfig};

/// 一次淘汰操作的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// 已删除的文件
    pub removed: Vec<PathBuf>,
    /// 删除失败、留待下次处理的文件
    pub failed: Vec<PathBuf>,
}

impl EvictionReport {
    /// 是否什么也没做
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

/// 删除单个缓存文件的方式
type Remover = fn(&Path) -> io::Result<()>;

fn remove_cached(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// 写入前淘汰：为即将写入的新文件腾出位置
///
/// `max_files` 为 0 时不做任何事。否则反复删除最旧的文件，
/// 直到缓存文件数严格小于上限。每轮都重新枚举目录。
pub fn evict_for_incoming(config: &CacheConfig) -> EvictionReport {
    evict_for_incoming_with(config, remove_cached)
}

fn evict_for_incoming_with(config: &CacheConfig, remove: Remover) -> EvictionReport {
    let mut report = EvictionReport::default();
    if config.max_files == 0 {
        return report;
    }
    let max_files = config.max_files as usize;
    // 外部进程可能让同一文件反复出现在列表里，删除次数不超过初始文件数
    let mut attempts_left: Option<usize> = None;

    loop {
        let files = list_cached_files(&config.save_dir);
        if files.len() < max_files {
            break;
        }
        let attempts = attempts_left.get_or_insert(files.len());
        if *attempts == 0 {
            break;
        }
        *attempts -= 1;
        let Some(oldest) = files.first() else {
            break;
        };

        match remove(&oldest.path) {
            Ok(()) => {
                log::info!("🗑️ 删除旧文件: {}", oldest.file_name());
                report.removed.push(oldest.path.clone());
            }
            Err(err) => {
                log::warn!("🗑️ 删除文件失败，停止淘汰: {} ({})", oldest.file_name(), err);
                report.failed.push(oldest.path.clone());
                break;
            }
        }
    }

    report
}

/// 过期清扫：删除早于保留时长的全部缓存文件
///
/// 保留时长为 0 时不做任何事。晚于截止时间的文件永远不会被删除。
pub fn sweep_expired(config: &CacheConfig, now: DateTime<Local>) -> EvictionReport {
    sweep_expired_with(config, now, remove_cached)
}

fn sweep_expired_with(
    config: &CacheConfig,
    now: DateTime<Local>,
    remove: Remover,
) -> EvictionReport {
    let mut report = EvictionReport::default();
    let Some(retention) = config.retention() else {
        return report;
    };
    let cutoff = now - retention;

    for file in list_cached_files(&config.save_dir) {
        if file.created_at >= cutoff {
            continue;
        }
        match remove(&file.path) {
            Ok(()) => {
                log::info!("🧹 清理过期文件: {}", file.file_name());
                report.removed.push(file.path);
            }
            Err(err) => {
                log::warn!("🧹 清理文件失败: {} ({})", file.file_name(), err);
                report.failed.push(file.path);
            }
        }
    }

    report
}

/// 全量清理：无条件删除全部缓存文件
///
/// 单个文件删除失败被静默忽略（仅记 debug 日志），目录本身保留。
pub fn purge_all(dir: &Path) -> EvictionReport {
    purge_all_with(dir, remove_cached)
}

fn purge_all_with(dir: &Path, remove: Remover) -> EvictionReport {
    let mut report = EvictionReport::default();
    for file in list_cached_files(dir) {
        match remove(&file.path) {
            Ok(()) => report.removed.push(file.path),
            Err(err) => {
                log::debug!("全量清理跳过 {}: {}", file.file_name(), err);
                report.failed.push(file.path);
            }
        }
    }
    report
}
