//! 持久化引擎
//!
//! # 设计思路
//!
//! 剪贴板上的同一张图片通常同时以多种格式存在，保真度各不相同。
//! 按固定顺序尝试，第一个成功者胜出：
//!
//! 1. 原生 "PNG" 格式：带 PNG 签名的字节原样写盘，不重新编码
//! 2. 设备无关位图（DIB）：解码后编码为 PNG
//! 3. 平台原生位图对象：编码为 PNG
//! 4. 兜底：把已解码的像素直接编码为 PNG
//!
//! 只要剪贴板里确实有图片，第 4 步总能成功。
//!
//! # 实现思路
//!
//! - 写盘前先调用缓存的写入前淘汰，保证缓存最多只比上限多出正在写的那一个文件。
//! - 文件名为 `capture_<毫秒时间戳>.png`，同一毫秒内的两次截获后写者覆盖前者。
//! - 前三步的任何失败都只记 debug 日志并进入下一步；
//!   第 4 步也失败时删除可能残留的半截文件并返回错误。

pub mod dib;
pub mod source;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::{DynamicImage, ImageFormat};

use crate::cache::{cached_file_name, evict_for_incoming, CacheConfig};
use crate::clipboard::{ClipboardAccess, ClipboardData, ClipboardFormat};
use crate::error::AppError;

pub use dib::decode_dib;
pub use source::CapturedImage;

/// 最终生效的持久化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStrategy {
    /// 原生 PNG 字节原样写入
    NativePng,
    /// DIB 解码后重新编码
    Dib,
    /// 原生位图对象重新编码
    NativeBitmap,
    /// 已解码像素直接编码
    DecodedPixels,
}

impl fmt::Display for PersistStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NativePng => "原生 PNG",
            Self::Dib => "DIB",
            Self::NativeBitmap => "原生位图",
            Self::DecodedPixels => "像素编码",
        };
        f.write_str(label)
    }
}

/// 一次成功写盘的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFile {
    pub path: PathBuf,
    pub strategy: PersistStrategy,
}

fn write_png(image: &DynamicImage, path: &Path) -> Result<(), AppError> {
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// 尝试一种剪贴板格式。`Ok(false)` 表示该格式不存在或不可用
fn try_clipboard_strategy<C: ClipboardAccess + ?Sized>(
    clipboard: &mut C,
    strategy: PersistStrategy,
    path: &Path,
) -> Result<bool, AppError> {
    match strategy {
        PersistStrategy::NativePng => match clipboard.read_format(&ClipboardFormat::Png)? {
            Some(ClipboardData::Bytes(bytes)) if infer::image::is_png(&bytes) => {
                fs::write(path, &bytes)?;
                Ok(true)
            }
            Some(_) => {
                log::debug!("PNG 格式数据缺少 PNG 签名，跳过");
                Ok(false)
            }
            None => Ok(false),
        },
        PersistStrategy::Dib => match clipboard.read_format(&ClipboardFormat::Dib)? {
            Some(ClipboardData::Bytes(bytes)) => {
                write_png(&decode_dib(&bytes)?, path)?;
                Ok(true)
            }
            Some(ClipboardData::Image(image)) => {
                write_png(&DynamicImage::ImageRgba8(image.to_rgba_image()?), path)?;
                Ok(true)
            }
            None => Ok(false),
        },
        PersistStrategy::NativeBitmap => match clipboard.read_format(&ClipboardFormat::Bitmap)? {
            Some(ClipboardData::Image(image)) => {
                write_png(&DynamicImage::ImageRgba8(image.to_rgba_image()?), path)?;
                Ok(true)
            }
            Some(ClipboardData::Bytes(bytes)) => {
                write_png(&image::load_from_memory(&bytes)?, path)?;
                Ok(true)
            }
            None => Ok(false),
        },
        PersistStrategy::DecodedPixels => Ok(false),
    }
}

/// 将剪贴板图片写入缓存目录
///
/// `now` 决定文件名中的时间戳。
pub fn persist_image<C: ClipboardAccess + ?Sized>(
    clipboard: &mut C,
    image: &CapturedImage,
    config: &CacheConfig,
    now: DateTime<Local>,
) -> Result<PersistedFile, AppError> {
    fs::create_dir_all(&config.save_dir)?;
    let evicted = evict_for_incoming(config);
    if !evicted.is_empty() {
        log::debug!(
            "写入前淘汰: 删除 {} 个，失败 {} 个",
            evicted.removed.len(),
            evicted.failed.len()
        );
    }

    let path = config.save_dir.join(cached_file_name(now));

    for strategy in [
        PersistStrategy::NativePng,
        PersistStrategy::Dib,
        PersistStrategy::NativeBitmap,
    ] {
        match try_clipboard_strategy(clipboard, strategy, &path) {
            Ok(true) => {
                log::info!("💾 图片已保存（{}）: {}", strategy, path.display());
                return Ok(PersistedFile { path, strategy });
            }
            Ok(false) => {}
            Err(err) => log::debug!("{} 方式保存失败，尝试下一种: {}", strategy, err),
        }
    }

    let result = image
        .to_rgba_image()
        .and_then(|pixels| write_png(&DynamicImage::ImageRgba8(pixels), &path));
    if let Err(err) = result {
        let _ = fs::remove_file(&path);
        return Err(err);
    }

    log::info!(
        "💾 图片已保存（{}）: {}",
        PersistStrategy::DecodedPixels,
        path.display()
    );
    Ok(PersistedFile {
        path,
        strategy: PersistStrategy::DecodedPixels,
    })
}
