//! 截图存储目录管理模块
//!
//! # 设计思路
//!
//! 统一管理截图文件的持久化存储路径：优先使用用户配置的目录，
//! 配置目录不存在时自动创建；无法创建或不可写时回退到默认目录。
//!
//! # 实现思路
//!
//! - 默认目录为 `桌面/临时截图`，没有桌面目录时依次退到图片目录、系统临时目录。
//! - "可写"通过写入并删除一个探测文件来确认，只检查只读属性并不可靠。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cache;
use crate::error::AppError;

/// 默认保存目录名
pub const DEFAULT_SAVE_DIR_NAME: &str = "临时截图";

const WRITE_PROBE_FILE_NAME: &str = ".picpaste-write-probe";

/// 存储目录信息（只统计缓存文件）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub path: String,
    pub total_size: u64,
    pub file_count: u64,
}

/// 目录解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDir {
    /// 可用的保存目录
    pub path: PathBuf,
    /// 是否因配置目录不可用而回退到了默认目录
    pub fell_back: bool,
}

/// 默认保存目录
pub fn default_save_dir() -> PathBuf {
    dirs::desktop_dir()
        .or_else(dirs::picture_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_SAVE_DIR_NAME)
}

/// 确保目录存在且可写
pub fn ensure_writable_dir(path: &Path) -> Result<(), AppError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            AppError::Storage(format!("创建目录 '{}' 失败: {}", path.display(), e))
        })?;
    }
    if !path.is_dir() {
        return Err(AppError::Storage(format!("'{}' 不是目录", path.display())));
    }

    let probe = path.join(WRITE_PROBE_FILE_NAME);
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)
        .map_err(|e| AppError::Storage(format!("目录 '{}' 不可写: {}", path.display(), e)))?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

/// 解析保存目录，配置目录不可用时回退到默认目录
///
/// # 返回
/// - `Ok(ResolvedDir)`：可用目录以及是否发生了回退
/// - `Err(AppError::Storage)`：默认目录同样不可用
pub fn resolve_save_dir(configured: &Path, default_dir: &Path) -> Result<ResolvedDir, AppError> {
    if !configured.as_os_str().is_empty() {
        match ensure_writable_dir(configured) {
            Ok(()) => {
                return Ok(ResolvedDir {
                    path: configured.to_path_buf(),
                    fell_back: false,
                });
            }
            Err(err) => log::warn!("📁 {}", err),
        }
    }

    ensure_writable_dir(default_dir)?;
    Ok(ResolvedDir {
        path: default_dir.to_path_buf(),
        fell_back: configured != default_dir,
    })
}

/// 获取存储目录信息（路径 + 缓存文件数 + 占用大小）
pub fn cache_dir_info(dir: &Path) -> StorageInfo {
    let files = cache::list_cached_files(dir);
    StorageInfo {
        path: dir.to_string_lossy().to_string(),
        total_size: files.iter().map(|f| f.size).sum(),
        file_count: files.len() as u64,
    }
}
