//! 内存图片判定
//!
//! 资源管理器复制文件时，剪贴板上同样会出现位图格式（缩略图），
//! 这类内容必须放行给文件粘贴，不能被截获。判定规则：
//!
//! 1. 出现文件拖放列表 → 直接拒绝
//! 2. 出现任一文件标识格式（文件名 / Shell ID 列表）→ 拒绝
//! 3. 其余情况均视为内存图片
//!
//! 枚举格式失败时按"是图片"处理（失败开放）。

use super::{ClipboardAccess, ClipboardFormat};

/// 纯函数判定：给定格式列表，是否为内存图片
pub fn classify_formats(formats: &[ClipboardFormat]) -> bool {
    if formats.contains(&ClipboardFormat::FileDrop) {
        return false;
    }
    !formats.iter().any(ClipboardFormat::is_file_identity)
}

/// 读取剪贴板格式并判定是否为内存图片
pub fn is_memory_image<C: ClipboardAccess + ?Sized>(clipboard: &mut C) -> bool {
    match clipboard.available_formats() {
        Ok(formats) => {
            let verdict = classify_formats(&formats);
            if !verdict {
                log::debug!("📁 剪贴板内容来自文件，跳过: {:?}", formats);
            }
            verdict
        }
        Err(err) => {
            log::warn!("⚠️ 枚举剪贴板格式失败，按图片处理: {}", err);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;

    #[test]
    fn screenshot_formats_are_memory_images() {
        assert!(classify_formats(&[
            ClipboardFormat::Png,
            ClipboardFormat::Dib,
            ClipboardFormat::Bitmap,
        ]));
        assert!(classify_formats(&[]));
    }

    #[test]
    fn explorer_copy_is_rejected() {
        assert!(!classify_formats(&[
            ClipboardFormat::Bitmap,
            ClipboardFormat::FileDrop,
        ]));
        assert!(!classify_formats(&[
            ClipboardFormat::Png,
            ClipboardFormat::ShellIdList,
        ]));
    }

    #[test]
    fn enumeration_failure_fails_open() {
        let mut clipboard = MemoryClipboard::new();
        clipboard.put(ClipboardFormat::FileDrop, b"C:\\a.png".to_vec());
        clipboard.fail_enumeration(true);
        assert!(is_memory_image(&mut clipboard));

        clipboard.fail_enumeration(false);
        assert!(!is_memory_image(&mut clipboard));
    }
}
