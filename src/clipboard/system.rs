//! # 系统剪贴板
//!
//! ## 设计思路
//!
//! 图片解码统一交给 `arboard`（跨平台、延迟创建）。格式枚举、按格式读取原始字节、
//! 写入文件引用这三件事 `arboard` 不提供，Windows 上直接调用 Win32 API。
//!
//! ## 实现思路
//!
//! - 打开剪贴板常因其他进程占用而失败：有限次重试，指数退避 + 抖动。
//! - `OpenedClipboard` 是 RAII 守卫，离开作用域即 `CloseClipboard`，任何提前返回都不会泄漏锁。
//! - 文件引用以 `CF_HDROP`（`DROPFILES` + 双 NUL 结尾的 UTF-16 路径列表）写入，
//!   写入前清空剪贴板，因此最终只剩这一种格式。
//! - 非 Windows 平台没有文件拖放格式：格式列表为空（判定器按内存图片处理），
//!   替换时写入文件路径文本。

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{ClipboardAccess, ClipboardData, ClipboardFormat};
use crate::error::AppError;
use crate::persist::CapturedImage;

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
const OPEN_RETRIES: u32 = 5;
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
const OPEN_RETRY_BASE_DELAY_MS: u64 = 10;
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
const OPEN_RETRY_MAX_DELAY_MS: u64 = 200;

/// `DROPFILES` 结构体长度：pFiles + POINT + fNC + fWide
const DROPFILES_LEN: usize = 20;

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
static JITTER_STATE: AtomicU64 = AtomicU64::new(0);

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn seed_jitter_state() -> u64 {
    let time_seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut state = time_seed ^ ((std::process::id() as u64) << 32) ^ 0x9E37_79B9_7F4A_7C15;
    if state == 0 {
        state = 0xA5A5_5A5A_0123_4567;
    }
    state
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn next_jitter_u64() -> u64 {
    let mut current = JITTER_STATE.load(Ordering::Relaxed);

    loop {
        let seeded = if current == 0 {
            seed_jitter_state()
        } else {
            current
        };

        let mut next = seeded;
        next ^= next << 13;
        next ^= next >> 7;
        next ^= next << 17;

        match JITTER_STATE.compare_exchange_weak(
            current,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(observed) => current = observed,
        }
    }
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn compute_backoff_delay_with_jitter(base_delay_ms: u64, attempt: u32, max_delay_ms: u64) -> u64 {
    let exp = base_delay_ms.saturating_mul(1_u64 << attempt.saturating_sub(1).min(8));
    let capped = exp.min(max_delay_ms.max(base_delay_ms));
    let jitter_bound = (capped / 3).max(1);
    let jitter = next_jitter_u64() % (jitter_bound + 1);
    capped.saturating_add(jitter)
}

/// 构造 `CF_HDROP` 负载：`DROPFILES` 头 + 每个路径（UTF-16，NUL 结尾）+ 结束 NUL
pub fn encode_drop_files(paths: &[Vec<u16>]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(
        DROPFILES_LEN + paths.iter().map(|p| (p.len() + 1) * 2).sum::<usize>() + 2,
    );
    payload.extend_from_slice(&(DROPFILES_LEN as u32).to_le_bytes());
    payload.extend_from_slice(&0i32.to_le_bytes());
    payload.extend_from_slice(&0i32.to_le_bytes());
    payload.extend_from_slice(&0i32.to_le_bytes());
    payload.extend_from_slice(&1i32.to_le_bytes());

    for path in paths {
        for unit in path.iter().chain(std::iter::once(&0u16)) {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
    }
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload
}

/// GDI 位图（BGRA）转 RGBA；整幅图 alpha 全为 0 时视为不透明
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn bgra_to_rgba(mut pixels: Vec<u8>) -> Vec<u8> {
    let opaque = pixels.chunks_exact(4).all(|px| px[3] == 0);
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
        if opaque {
            px[3] = u8::MAX;
        }
    }
    pixels
}

/// 操作系统剪贴板
#[derive(Default)]
pub struct SystemClipboard {
    arboard: Option<arboard::Clipboard>,
}

impl std::fmt::Debug for SystemClipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemClipboard")
            .field("arboard_ready", &self.arboard.is_some())
            .finish()
    }
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn arboard(&mut self) -> Result<&mut arboard::Clipboard, AppError> {
        if self.arboard.is_none() {
            let clipboard = arboard::Clipboard::new()
                .map_err(|e| AppError::Clipboard(format!("初始化剪贴板失败: {}", e)))?;
            self.arboard = Some(clipboard);
        }
        self.arboard
            .as_mut()
            .ok_or_else(|| AppError::Clipboard("剪贴板未初始化".to_string()))
    }
}

impl ClipboardAccess for SystemClipboard {
    fn available_formats(&mut self) -> Result<Vec<ClipboardFormat>, AppError> {
        #[cfg(target_os = "windows")]
        {
            win32::enumerate_formats()
        }
        #[cfg(not(target_os = "windows"))]
        {
            Ok(Vec::new())
        }
    }

    fn read_format(&mut self, format: &ClipboardFormat) -> Result<Option<ClipboardData>, AppError> {
        #[cfg(target_os = "windows")]
        {
            win32::read_format(format)
        }
        #[cfg(not(target_os = "windows"))]
        {
            log::trace!("当前平台不支持按格式读取: {}", format);
            Ok(None)
        }
    }

    fn read_image(&mut self) -> Result<Option<CapturedImage>, AppError> {
        match self.arboard()?.get_image() {
            Ok(image) => CapturedImage::from_rgba(
                image.width as u32,
                image.height as u32,
                image.bytes.into_owned(),
            )
            .map(Some),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => {
                // 下次重新创建，避免复用已失效的连接
                self.arboard = None;
                Err(AppError::Clipboard(format!("读取剪贴板图片失败: {}", err)))
            }
        }
    }

    fn clear_and_set_file_reference(&mut self, path: &Path) -> Result<(), AppError> {
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::ffi::OsStrExt;
            let wide: Vec<u16> = path.as_os_str().encode_wide().collect();
            win32::set_file_drop(&encode_drop_files(&[wide]))
        }
        #[cfg(not(target_os = "windows"))]
        {
            let text = path.to_string_lossy().into_owned();
            let clipboard = self.arboard()?;
            clipboard
                .clear()
                .map_err(|e| AppError::Clipboard(format!("清空剪贴板失败: {}", e)))?;
            clipboard
                .set_text(text)
                .map_err(|e| AppError::Clipboard(format!("写入剪贴板失败: {}", e)))
        }
    }
}

#[cfg(target_os = "windows")]
mod win32 {
    use super::*;
    use std::ffi::c_void;
    use std::mem::size_of;
    use std::ptr::copy_nonoverlapping;
    use std::time::Duration;

    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{GetLastError, GlobalFree, ERROR_SUCCESS, HANDLE, HGLOBAL};
    use windows::Win32::Graphics::Gdi::{
        GetDC, GetDIBits, GetObjectW, ReleaseDC, BITMAP, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
        DIB_RGB_COLORS, HBITMAP, HGDIOBJ,
    };
    use windows::Win32::System::DataExchange::{
        CloseClipboard, EmptyClipboard, EnumClipboardFormats, GetClipboardData,
        GetClipboardFormatNameW, IsClipboardFormatAvailable, OpenClipboard,
        RegisterClipboardFormatW, SetClipboardData,
    };
    use windows::Win32::System::Memory::{
        GlobalAlloc, GlobalLock, GlobalSize, GlobalUnlock, GMEM_MOVEABLE,
    };
    use windows::Win32::System::Ole::{CF_BITMAP, CF_DIB, CF_DIBV5, CF_HDROP};

    /// 已打开的剪贴板，`Drop` 时关闭
    struct OpenedClipboard;

    impl OpenedClipboard {
        fn open() -> Result<Self, AppError> {
            let mut last_error = None;
            for attempt in 1..=OPEN_RETRIES {
                if attempt > 1 {
                    let wait_ms = compute_backoff_delay_with_jitter(
                        OPEN_RETRY_BASE_DELAY_MS,
                        attempt - 1,
                        OPEN_RETRY_MAX_DELAY_MS,
                    );
                    log::debug!("🔄 打开剪贴板重试 {}/{}，等待 {}ms", attempt, OPEN_RETRIES, wait_ms);
                    std::thread::sleep(Duration::from_millis(wait_ms));
                }
                match unsafe { OpenClipboard(None) } {
                    Ok(()) => return Ok(Self),
                    Err(err) => last_error = Some(err),
                }
            }
            Err(AppError::Clipboard(format!(
                "打开剪贴板失败（已重试 {} 次）：{:?}",
                OPEN_RETRIES, last_error
            )))
        }
    }

    impl Drop for OpenedClipboard {
        fn drop(&mut self) {
            let _ = unsafe { CloseClipboard() };
        }
    }

    fn encode_wide_nul(name: &str) -> Vec<u16> {
        name.encode_utf16().chain(std::iter::once(0)).collect()
    }

    fn registered_format_id(name: &str) -> Option<u32> {
        let wide = encode_wide_nul(name);
        let id = unsafe { RegisterClipboardFormatW(PCWSTR(wide.as_ptr())) };
        (id != 0).then_some(id)
    }

    fn format_id(format: &ClipboardFormat) -> Option<u32> {
        match format {
            ClipboardFormat::FileDrop => Some(u32::from(CF_HDROP.0)),
            ClipboardFormat::Dib => Some(u32::from(CF_DIB.0)),
            ClipboardFormat::Bitmap => Some(u32::from(CF_BITMAP.0)),
            ClipboardFormat::Other(name) => registered_format_id(name),
            registered => registered_format_id(&registered.to_string()),
        }
    }

    fn format_from_id(id: u32) -> ClipboardFormat {
        if id == u32::from(CF_HDROP.0) {
            return ClipboardFormat::FileDrop;
        }
        if id == u32::from(CF_DIB.0) || id == u32::from(CF_DIBV5.0) {
            return ClipboardFormat::Dib;
        }
        if id == u32::from(CF_BITMAP.0) {
            return ClipboardFormat::Bitmap;
        }

        let mut buf = [0u16; 256];
        let len = unsafe { GetClipboardFormatNameW(id, &mut buf) };
        if len > 0 {
            ClipboardFormat::from_registered_name(&String::from_utf16_lossy(&buf[..len as usize]))
        } else {
            ClipboardFormat::Other(format!("#{}", id))
        }
    }

    pub(super) fn enumerate_formats() -> Result<Vec<ClipboardFormat>, AppError> {
        let _open = OpenedClipboard::open()?;
        let mut formats = Vec::new();
        let mut current = 0u32;
        loop {
            current = unsafe { EnumClipboardFormats(current) };
            if current == 0 {
                let last = unsafe { GetLastError() };
                if last != ERROR_SUCCESS {
                    return Err(AppError::Clipboard(format!(
                        "枚举剪贴板格式失败: code={}",
                        last.0
                    )));
                }
                break;
            }
            let format = format_from_id(current);
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        Ok(formats)
    }

    pub(super) fn read_format(format: &ClipboardFormat) -> Result<Option<ClipboardData>, AppError> {
        let Some(id) = format_id(format) else {
            return Ok(None);
        };
        let _open = OpenedClipboard::open()?;
        if unsafe { IsClipboardFormatAvailable(id) }.is_err() {
            return Ok(None);
        }

        let handle = unsafe { GetClipboardData(id) }
            .map_err(|e| AppError::Clipboard(format!("读取格式 {} 失败：{:?}", format, e)))?;

        if *format == ClipboardFormat::Bitmap {
            let image = unsafe { read_bitmap(HBITMAP(handle.0)) }?;
            return Ok(Some(ClipboardData::Image(image)));
        }

        let bytes = unsafe { read_global_bytes(HGLOBAL(handle.0)) }?;
        Ok(Some(ClipboardData::Bytes(bytes)))
    }

    unsafe fn read_global_bytes(hglobal: HGLOBAL) -> Result<Vec<u8>, AppError> {
        let size = GlobalSize(hglobal);
        if size == 0 {
            return Err(AppError::Clipboard("剪贴板数据为空".to_string()));
        }
        let ptr = GlobalLock(hglobal) as *const u8;
        if ptr.is_null() {
            return Err(AppError::Clipboard("GlobalLock 返回空指针".to_string()));
        }
        let bytes = std::slice::from_raw_parts(ptr, size).to_vec();
        let _ = GlobalUnlock(hglobal);
        Ok(bytes)
    }

    unsafe fn read_bitmap(hbitmap: HBITMAP) -> Result<CapturedImage, AppError> {
        let mut bitmap = BITMAP::default();
        let got = GetObjectW(
            HGDIOBJ(hbitmap.0),
            size_of::<BITMAP>() as i32,
            Some(&mut bitmap as *mut BITMAP as *mut c_void),
        );
        if got == 0 || bitmap.bmWidth <= 0 || bitmap.bmHeight == 0 {
            return Err(AppError::InvalidBitmap("无法读取位图尺寸".to_string()));
        }

        let width = bitmap.bmWidth as u32;
        let height = bitmap.bmHeight.unsigned_abs();
        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width as i32,
                // 负高度 = 自上而下
                biHeight: -(height as i32),
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut bgra = vec![0u8; width as usize * height as usize * 4];

        let hdc = GetDC(None);
        let lines = GetDIBits(
            hdc,
            hbitmap,
            0,
            height,
            Some(bgra.as_mut_ptr() as *mut c_void),
            &mut info,
            DIB_RGB_COLORS,
        );
        let _ = ReleaseDC(None, hdc);

        if lines == 0 {
            return Err(AppError::InvalidBitmap("GetDIBits 失败".to_string()));
        }
        CapturedImage::from_rgba(width, height, bgra_to_rgba(bgra))
    }

    pub(super) fn set_file_drop(payload: &[u8]) -> Result<(), AppError> {
        let _open = OpenedClipboard::open()?;
        unsafe {
            EmptyClipboard().map_err(|e| AppError::Clipboard(format!("清空剪贴板失败：{:?}", e)))?;
            set_global_data(u32::from(CF_HDROP.0), payload)
        }
    }

    /// 将字节写入全局内存并 SetClipboardData。
    unsafe fn set_global_data(format_id: u32, data: &[u8]) -> Result<(), AppError> {
        let hglobal = GlobalAlloc(GMEM_MOVEABLE, data.len())
            .map_err(|e| AppError::Clipboard(format!("分配内存失败：{:?}", e)))?;

        let ptr = GlobalLock(hglobal) as *mut u8;
        if ptr.is_null() {
            let _ = GlobalFree(Some(hglobal));
            return Err(AppError::Clipboard("锁定内存失败".to_string()));
        }

        copy_nonoverlapping(data.as_ptr(), ptr, data.len());
        let _ = GlobalUnlock(hglobal);

        if let Err(e) = SetClipboardData(format_id, Some(HANDLE(hglobal.0))) {
            let _ = GlobalFree(Some(hglobal));
            return Err(AppError::Clipboard(format!("设置剪贴板数据失败：{:?}", e)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_files_payload_layout() {
        let wide: Vec<u16> = "C:\\a.png".encode_utf16().collect();
        let payload = encode_drop_files(&[wide.clone()]);

        assert_eq!(&payload[0..4], &(DROPFILES_LEN as u32).to_le_bytes());
        // fWide = TRUE
        assert_eq!(&payload[16..20], &1i32.to_le_bytes());
        assert_eq!(payload.len(), DROPFILES_LEN + (wide.len() + 2) * 2);
        assert_eq!(&payload[payload.len() - 4..], &[0, 0, 0, 0]);

        let decoded: Vec<u16> = payload[DROPFILES_LEN..payload.len() - 4]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(String::from_utf16_lossy(&decoded), "C:\\a.png");
    }

    #[test]
    fn backoff_with_jitter_stays_in_bounds() {
        for attempt in 1..10 {
            let wait = compute_backoff_delay_with_jitter(10, attempt, 200);
            assert!(wait >= 10);
            assert!(wait <= 200 + 200 / 3 + 1);
        }
    }

    #[test]
    fn bgra_is_swapped_and_transparent_bitmaps_become_opaque() {
        assert_eq!(bgra_to_rgba(vec![1, 2, 3, 0, 4, 5, 6, 0]), vec![3, 2, 1, 255, 6, 5, 4, 255]);
        assert_eq!(bgra_to_rgba(vec![1, 2, 3, 7, 4, 5, 6, 0]), vec![3, 2, 1, 7, 6, 5, 4, 0]);
    }
}
