//! 应用设置模块
//!
//! # 设计思路
//!
//! 设置以显式对象 `AppSettings` 的形式在各组件之间传递，不存在"全局当前设置"。
//! 持久化与重载由 `SettingsStore` 统一负责：
//! - 启动时读取 `settings.json`，缺失或损坏时使用默认值并回写
//! - 设置保存后通过 `SettingsStore::replace` 持久化，再由调用方重建定时器
//! - 保存目录不可用时回退到默认目录并立即回写设置
//!
//! # 实现思路
//!
//! - JSON 键使用 camelCase，未知键忽略，缺失键取默认值（`#[serde(default)]`）。
//! - 设置文件默认位于 `<数据目录>/PicPaste/settings.json`，可由命令行覆盖。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::error::AppError;
use crate::storage;

/// 应用数据目录名
pub const APP_DIR_NAME: &str = "PicPaste";
/// 设置文件名
pub const SETTINGS_FILE_NAME: &str = "settings.json";

const CLIPBOARD_EVENT_MIN_INTERVAL_DEFAULT_MS: u64 = 80;
const PROCESSING_DELAY_DEFAULT_MS: u64 = 500;

/// 剪贴板图片的处理时机
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessingMode {
    /// 剪贴板一出现图片就立即转存
    #[default]
    Immediate,
    /// 仅在检测到粘贴组合键（Ctrl+V）前后才转存
    OnPaste,
}

/// 应用设置
///
/// 其中 `save_path` / `max_files` / `file_retention_hours` / `cleanup_interval_minutes`
/// 构成缓存配置，通过 [`AppSettings::cache_config`] 取只读快照。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// 截图保存目录
    pub save_path: PathBuf,
    /// 处理模式
    pub processing_mode: ProcessingMode,
    /// 最大文件数量（0 = 无限制）
    pub max_files: u32,
    /// 文件保存时长（小时，0 = 永久保留）
    pub file_retention_hours: u32,
    /// 自动清理间隔（分钟，0 = 不自动清理）
    pub cleanup_interval_minutes: u32,
    /// 粘贴模式下，剪贴板变化与粘贴按键之间允许的最大间隔（毫秒）
    pub processing_delay_ms: u64,
    /// 退出时清理所有截图文件
    pub cleanup_on_exit: bool,
    /// 关机 / 注销时清理所有截图文件
    pub cleanup_on_shutdown: bool,
    /// 将日志写入数据目录下的 `log.txt`
    pub enable_logging: bool,
    /// 剪贴板监听的节流间隔（毫秒）
    pub clipboard_event_min_interval_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            save_path: storage::default_save_dir(),
            processing_mode: ProcessingMode::Immediate,
            max_files: 0,
            file_retention_hours: 0,
            cleanup_interval_minutes: 0,
            processing_delay_ms: PROCESSING_DELAY_DEFAULT_MS,
            cleanup_on_exit: true,
            cleanup_on_shutdown: true,
            enable_logging: true,
            clipboard_event_min_interval_ms: CLIPBOARD_EVENT_MIN_INTERVAL_DEFAULT_MS,
        }
    }
}

impl AppSettings {
    /// 缓存配置的只读快照
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            save_dir: self.save_path.clone(),
            max_files: self.max_files,
            retention_hours: self.file_retention_hours,
            sweep_interval_minutes: self.cleanup_interval_minutes,
        }
    }

    /// 粘贴组合键与剪贴板变化的关联窗口
    pub fn paste_window(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }
}

/// 获取应用数据目录（设置文件与日志所在目录）
pub fn app_data_dir() -> Result<PathBuf, AppError> {
    let base = dirs::data_dir()
        .ok_or_else(|| AppError::Storage("获取应用数据目录失败".to_string()))?;
    Ok(base.join(APP_DIR_NAME))
}

/// 默认设置文件路径
pub fn default_settings_path() -> Result<PathBuf, AppError> {
    Ok(app_data_dir()?.join(SETTINGS_FILE_NAME))
}

fn read_settings(path: &Path) -> Result<Option<AppSettings>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let parsed = serde_json::from_str::<AppSettings>(&content)?;
    Ok(Some(parsed))
}

fn write_settings(path: &Path, settings: &AppSettings) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::Storage(format!("创建设置目录失败: {}", e)))?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    fs::write(path, content)?;
    Ok(())
}

/// 设置的持久化存储
///
/// 持有设置文件路径与当前生效的设置。所有修改都经由这里落盘，
/// 组件只从 [`SettingsStore::current`] 读取快照。
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: AppSettings,
    fallback_dir: PathBuf,
}

impl SettingsStore {
    /// 打开设置文件
    ///
    /// 文件缺失或解析失败时使用默认设置并回写；随后确保保存目录可用。
    /// 只有在默认目录也无法创建时才返回错误（属于启动期致命错误）。
    pub fn open(path: PathBuf) -> Result<Self, AppError> {
        let current = match read_settings(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                log::info!("⚙️ 设置文件不存在，使用默认设置: {}", path.display());
                Self::persist_defaults(&path)
            }
            Err(err) => {
                log::warn!("⚙️ 加载设置失败，使用默认设置: {}", err);
                Self::persist_defaults(&path)
            }
        };

        let mut store = Self {
            path,
            current,
            fallback_dir: storage::default_save_dir(),
        };
        store.ensure_save_dir()?;
        Ok(store)
    }

    /// 替换回退目录（测试中避免写入真实桌面目录）
    #[cfg(test)]
    pub(crate) fn with_fallback_dir(mut self, dir: PathBuf) -> Self {
        self.fallback_dir = dir;
        self
    }

    fn persist_defaults(path: &Path) -> AppSettings {
        let defaults = AppSettings::default();
        if let Err(err) = write_settings(path, &defaults) {
            log::warn!("⚙️ 写入默认设置失败: {}", err);
        }
        defaults
    }

    /// 当前生效的设置
    pub fn current(&self) -> &AppSettings {
        &self.current
    }

    /// 持久化当前设置
    pub fn save(&self) -> Result<(), AppError> {
        write_settings(&self.path, &self.current)
    }

    /// 设置保存操作：替换当前设置并落盘
    pub fn replace(&mut self, mut settings: AppSettings) -> Result<(), AppError> {
        self.resolve_dir(&mut settings)?;
        self.current = settings;
        self.save()
    }

    /// 从磁盘重新读取设置
    ///
    /// 文件被删除时保留当前设置；解析失败或目录不可用时返回错误且不修改当前设置。
    pub fn reload(&mut self) -> Result<&AppSettings, AppError> {
        let mut settings = match read_settings(&self.path)? {
            Some(settings) => settings,
            None => self.current.clone(),
        };
        let fell_back = self.resolve_dir(&mut settings)?;
        self.current = settings;
        if fell_back {
            self.save_after_fallback();
        }
        Ok(&self.current)
    }

    /// 确保保存目录存在且可写
    ///
    /// 配置的目录不可用时回退到默认目录，并回写设置文件。
    pub fn ensure_save_dir(&mut self) -> Result<PathBuf, AppError> {
        let mut settings = self.current.clone();
        if self.resolve_dir(&mut settings)? {
            self.current = settings;
            self.save_after_fallback();
        }
        Ok(self.current.save_path.clone())
    }

    /// 为给定设置解析保存目录，返回是否发生了回退
    fn resolve_dir(&self, settings: &mut AppSettings) -> Result<bool, AppError> {
        let resolved = storage::resolve_save_dir(&settings.save_path, &self.fallback_dir)?;
        if resolved.fell_back {
            log::warn!(
                "📁 保存目录不可用，回退到默认目录: {} -> {}",
                settings.save_path.display(),
                resolved.path.display()
            );
            settings.save_path = resolved.path;
        }
        Ok(resolved.fell_back)
    }

    fn save_after_fallback(&self) {
        if let Err(err) = self.save() {
            log::warn!("⚙️ 回写设置失败: {}", err);
        }
    }
}
