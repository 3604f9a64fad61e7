//! 内存剪贴板
//!
//! `ClipboardAccess` 的进程内实现。克隆出的句柄共享同一份内容，
//! 测试可以一边把它交给流水线，一边从外部观察写入结果。

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ClipboardAccess, ClipboardData, ClipboardFormat};
use crate::error::AppError;
use crate::persist::CapturedImage;

type ChangeHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct MemoryState {
    entries: Vec<(ClipboardFormat, ClipboardData)>,
    image: Option<CapturedImage>,
    file_reference: Option<PathBuf>,
    fail_enumeration: bool,
    fail_writes: bool,
    write_count: usize,
    on_change: Option<ChangeHook>,
}

/// 内存剪贴板
#[derive(Clone, Default)]
pub struct MemoryClipboard {
    state: Arc<Mutex<MemoryState>>,
}

impl fmt::Debug for MemoryClipboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryClipboard")
            .field("formats", &state.entries.iter().map(|(f, _)| f).collect::<Vec<_>>())
            .field("has_image", &state.image.is_some())
            .field("file_reference", &state.file_reference)
            .field("write_count", &state.write_count)
            .finish()
    }
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 放入一个字节格式（同名格式会被覆盖）
    pub fn put(&mut self, format: ClipboardFormat, bytes: Vec<u8>) {
        self.put_data(format, ClipboardData::Bytes(bytes));
    }

    /// 放入任意格式数据
    pub fn put_data(&mut self, format: ClipboardFormat, data: ClipboardData) {
        let mut state = self.lock();
        state.entries.retain(|(existing, _)| *existing != format);
        state.entries.push((format, data));
    }

    /// 设置 `read_image` 返回的解码图片
    pub fn set_image(&mut self, image: CapturedImage) {
        self.lock().image = Some(image);
    }

    /// 清空全部内容
    pub fn clear(&mut self) {
        let mut state = self.lock();
        state.entries.clear();
        state.image = None;
        state.file_reference = None;
    }

    /// 让 `available_formats` 返回错误
    pub fn fail_enumeration(&mut self, fail: bool) {
        self.lock().fail_enumeration = fail;
    }

    /// 让写入返回错误
    pub fn fail_writes(&mut self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// 每次成功写入后调用（模拟系统的变化通知）
    pub fn on_change<F>(&mut self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lock().on_change = Some(Arc::new(hook));
    }

    /// 当前格式列表
    pub fn formats(&self) -> Vec<ClipboardFormat> {
        self.lock().entries.iter().map(|(f, _)| f.clone()).collect()
    }

    /// 最近一次写入的文件引用
    pub fn file_reference(&self) -> Option<PathBuf> {
        self.lock().file_reference.clone()
    }

    /// 成功写入次数
    pub fn write_count(&self) -> usize {
        self.lock().write_count
    }
}

impl ClipboardAccess for MemoryClipboard {
    fn available_formats(&mut self) -> Result<Vec<ClipboardFormat>, AppError> {
        let state = self.lock();
        if state.fail_enumeration {
            return Err(AppError::Clipboard("模拟的格式枚举失败".to_string()));
        }
        Ok(state.entries.iter().map(|(f, _)| f.clone()).collect())
    }

    fn read_format(&mut self, format: &ClipboardFormat) -> Result<Option<ClipboardData>, AppError> {
        Ok(self
            .lock()
            .entries
            .iter()
            .find(|(existing, _)| existing == format)
            .map(|(_, data)| data.clone()))
    }

    fn read_image(&mut self) -> Result<Option<CapturedImage>, AppError> {
        Ok(self.lock().image.clone())
    }

    fn clear_and_set_file_reference(&mut self, path: &Path) -> Result<(), AppError> {
        let hook = {
            let mut state = self.lock();
            if state.fail_writes {
                return Err(AppError::Clipboard("模拟的剪贴板占用".to_string()));
            }
            let encoded = path.to_string_lossy().into_owned().into_bytes();
            state.entries = vec![(ClipboardFormat::FileDrop, ClipboardData::Bytes(encoded))];
            state.image = None;
            state.file_reference = Some(path.to_path_buf());
            state.write_count += 1;
            state.on_change.clone()
        };

        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn clones_share_contents() {
        let mut a = MemoryClipboard::new();
        let b = a.clone();
        a.put(ClipboardFormat::Png, vec![9]);
        assert_eq!(b.formats(), vec![ClipboardFormat::Png]);
    }

    #[test]
    fn write_notifies_hook_after_releasing_lock() {
        let mut clipboard = MemoryClipboard::new();
        let observer = clipboard.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        clipboard.on_change(move || {
            // 回调中再次访问剪贴板不能死锁
            assert_eq!(observer.formats(), vec![ClipboardFormat::FileDrop]);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        clipboard
            .clear_and_set_file_reference(Path::new("a.png"))
            .expect("write should succeed");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(clipboard.write_count(), 1);
    }
}
