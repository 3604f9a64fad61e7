//! 剪贴板替换协议：把图片换成单个文件引用
//!
//! 写入前领取抑制令牌，成功后提交；失败只记日志，已写入的文件保留。

use std::path::Path;

use super::{ClipboardAccess, SelfWriteSuppressor};

/// 用文件引用替换剪贴板内容，返回是否成功
pub fn replace_with_file<C: ClipboardAccess + ?Sized>(
    clipboard: &mut C,
    suppressor: &SelfWriteSuppressor,
    path: &Path,
) -> bool {
    let guard = suppressor.arm();
    match clipboard.clear_and_set_file_reference(path) {
        Ok(()) => {
            guard.commit();
            log::info!("📋 剪贴板已替换为文件: {}", path.display());
            true
        }
        Err(err) => {
            log::warn!("📋 替换剪贴板失败，文件已保留: {} ({})", path.display(), err);
            false
        }
    }
}
