//! 截获流水线
//!
//! # 设计思路
//!
//! 一次截获 = 判定 → 读取图片 → 写入前淘汰 + 持久化 → 替换剪贴板。
//! 每一步的失败都在本模块内记录日志并终止本次截获，不向调用方抛错；
//! 已写入的文件不会因为后续替换失败而回滚。
//!
//! `gate` 决定一个截获事件是处理还是丢弃。

pub mod gate;

use std::path::PathBuf;
use std::time::Instant;

use chrono::Local;

use crate::cache::CacheConfig;
use crate::clipboard::{is_memory_image, replace_with_file, ClipboardAccess, SelfWriteSuppressor};
use crate::persist::{persist_image, PersistStrategy};

pub use gate::PasteGate;

/// 剪贴板内容发生变化的时刻
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureEvent {
    pub at: Instant,
    /// 变化发生时粘贴组合键是否按住
    pub paste_held: bool,
}

impl CaptureEvent {
    pub fn now() -> Self {
        Self {
            at: Instant::now(),
            paste_held: false,
        }
    }
}

/// 一次截获的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// 内容来自文件复制，放行
    NotMemoryImage,
    /// 剪贴板里没有可解码的图片
    NoImage,
    /// 图片已保存
    Saved {
        path: PathBuf,
        strategy: PersistStrategy,
        /// 剪贴板是否已替换为文件引用
        replaced: bool,
    },
    /// 读取或保存失败
    Failed(String),
}

/// 执行一次完整截获
pub fn run_capture<C: ClipboardAccess + ?Sized>(
    clipboard: &mut C,
    config: &CacheConfig,
    suppressor: &SelfWriteSuppressor,
) -> CaptureOutcome {
    if !is_memory_image(clipboard) {
        return CaptureOutcome::NotMemoryImage;
    }

    let image = match clipboard.read_image() {
        Ok(Some(image)) => image,
        Ok(None) => {
            log::debug!("剪贴板中没有图片");
            return CaptureOutcome::NoImage;
        }
        Err(err) => {
            log::warn!("⚠️ 读取剪贴板图片失败: {}", err);
            return CaptureOutcome::Failed(err.to_string());
        }
    };

    let now = Local::now();
    let saved = match persist_image(clipboard, &image, config, now) {
        Ok(saved) => saved,
        Err(err) => {
            log::error!("❌ 保存图片失败: {}", err);
            return CaptureOutcome::Failed(err.to_string());
        }
    };
    drop(image);

    let replaced = replace_with_file(clipboard, suppressor, &saved.path);
    log::info!("📸 最后截图: {}", now.format("%H:%M:%S"));

    CaptureOutcome::Saved {
        path: saved.path,
        strategy: saved.strategy,
        replaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::{ClipboardFormat, MemoryClipboard};
    use crate::persist::CapturedImage;
    use std::fs;
    use std::path::Path;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("{}_{}", prefix, nanos));
        let _ = fs::create_dir_all(&dir);
        dir
    }

    fn config(dir: &Path) -> CacheConfig {
        CacheConfig {
            save_dir: dir.to_path_buf(),
            max_files: 0,
            retention_hours: 0,
            sweep_interval_minutes: 0,
        }
    }

    #[test]
    fn file_copy_is_left_alone() {
        let dir = unique_temp_dir("picpaste_capture_filecopy");
        let mut clipboard = MemoryClipboard::new();
        clipboard.put(ClipboardFormat::FileDrop, b"C:\\photo.png".to_vec());
        clipboard.put(ClipboardFormat::Bitmap, vec![0]);
        clipboard.set_image(CapturedImage::from_rgba(1, 1, vec![0; 4]).expect("image"));

        let outcome = run_capture(&mut clipboard, &config(&dir), &SelfWriteSuppressor::new());
        assert_eq!(outcome, CaptureOutcome::NotMemoryImage);
        assert_eq!(clipboard.write_count(), 0);
        assert_eq!(fs::read_dir(&dir).expect("read dir").count(), 0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_replacement_keeps_file() {
        let dir = unique_temp_dir("picpaste_capture_keepfile");
        let mut clipboard = MemoryClipboard::new();
        clipboard.set_image(CapturedImage::from_rgba(2, 2, vec![7; 16]).expect("image"));
        clipboard.fail_writes(true);
        let suppressor = SelfWriteSuppressor::new();

        match run_capture(&mut clipboard, &config(&dir), &suppressor) {
            CaptureOutcome::Saved { path, replaced, .. } => {
                assert!(!replaced);
                assert!(path.exists());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(suppressor.pending(), 0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_clipboard_is_no_image() {
        let dir = unique_temp_dir("picpaste_capture_empty");
        let mut clipboard = MemoryClipboard::new();
        let outcome = run_capture(&mut clipboard, &config(&dir), &SelfWriteSuppressor::new());
        assert_eq!(outcome, CaptureOutcome::NoImage);

        let _ = fs::remove_dir_all(&dir);
    }
}
