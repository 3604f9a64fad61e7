//! 剪贴板能力模块
//!
//! # 设计思路
//!
//! 系统剪贴板是进程间共享的单例资源。核心流水线不直接访问全局剪贴板，
//! 而是通过注入的 `ClipboardAccess` 能力读写，测试时可替换为内存实现。
//!
//! - `listener`：基于 `clipboard-master` 的被动变化监听（节流 + 自动重启）
//! - `suppress`：自身写入的抑制令牌，防止替换剪贴板后递归触发截获
//! - `classifier`：判定当前内容是否为"内存图片"而非文件复制
//! - `replace`：把剪贴板替换为单个文件引用
//! - `memory`：内存假实现
//! - `system`：真实系统剪贴板
//!
//! # 实现思路
//!
//! - 剪贴板内容只在一次读 / 写操作期间被持有，从不跨事件缓存。
//! - 格式用 `ClipboardFormat` 枚举表达，注册格式按名称映射，未知格式保留原名。

pub mod classifier;
pub mod listener;
pub mod memory;
pub mod replace;
pub mod suppress;
pub mod system;

use std::fmt;
use std::path::Path;

use crate::error::AppError;
use crate::persist::CapturedImage;

pub use classifier::{classify_formats, is_memory_image};
pub use listener::{start_listener, ChangeNotifier, ListenerControl};
pub use memory::MemoryClipboard;
pub use replace::replace_with_file;
pub use suppress::{SelfWriteGuard, SelfWriteSuppressor};
pub use system::SystemClipboard;

/// 剪贴板中可能出现的数据格式
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClipboardFormat {
    /// 文件拖放列表（资源管理器复制文件）
    FileDrop,
    /// 短文件名（ANSI）
    FileName,
    /// 文件名（Unicode）
    FileNameW,
    /// Shell 对象 ID 列表
    ShellIdList,
    /// 注册格式 "PNG"
    Png,
    /// 设备无关位图
    Dib,
    /// 平台原生位图对象
    Bitmap,
    /// 其他格式（保留注册名或编号）
    Other(String),
}

impl ClipboardFormat {
    /// 是否表明内容来自文件系统中的文件
    pub fn is_file_identity(&self) -> bool {
        matches!(
            self,
            Self::FileDrop | Self::FileName | Self::FileNameW | Self::ShellIdList
        )
    }

    /// 按注册格式名称映射
    pub fn from_registered_name(name: &str) -> Self {
        match name {
            "PNG" | "image/png" => Self::Png,
            "FileName" => Self::FileName,
            "FileNameW" => Self::FileNameW,
            "Shell IDList Array" => Self::ShellIdList,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ClipboardFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileDrop => f.write_str("FileDrop"),
            Self::FileName => f.write_str("FileName"),
            Self::FileNameW => f.write_str("FileNameW"),
            Self::ShellIdList => f.write_str("Shell IDList Array"),
            Self::Png => f.write_str("PNG"),
            Self::Dib => f.write_str("DeviceIndependentBitmap"),
            Self::Bitmap => f.write_str("Bitmap"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// 从某个格式读出的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardData {
    /// 原始字节流（PNG / DIB 等）
    Bytes(Vec<u8>),
    /// 已由平台解码的位图对象
    Image(CapturedImage),
}

/// 剪贴板能力
///
/// 每个方法都是一次独立的剪贴板租用：打开、读 / 写、关闭。
pub trait ClipboardAccess {
    /// 枚举当前剪贴板公布的全部格式
    fn available_formats(&mut self) -> Result<Vec<ClipboardFormat>, AppError>;

    /// 读取指定格式，格式不存在时返回 `Ok(None)`
    fn read_format(&mut self, format: &ClipboardFormat) -> Result<Option<ClipboardData>, AppError>;

    /// 读取并解码当前图片，没有图片时返回 `Ok(None)`
    fn read_image(&mut self) -> Result<Option<CapturedImage>, AppError>;

    /// 清空剪贴板，并把单个文件引用设为唯一内容
    fn clear_and_set_file_reference(&mut self, path: &Path) -> Result<(), AppError>;
}

impl<T: ClipboardAccess + ?Sized> ClipboardAccess for Box<T> {
    fn available_formats(&mut self) -> Result<Vec<ClipboardFormat>, AppError> {
        (**self).available_formats()
    }

    fn read_format(&mut self, format: &ClipboardFormat) -> Result<Option<ClipboardData>, AppError> {
        (**self).read_format(format)
    }

    fn read_image(&mut self) -> Result<Option<CapturedImage>, AppError> {
        (**self).read_image()
    }

    fn clear_and_set_file_reference(&mut self, path: &Path) -> Result<(), AppError> {
        (**self).clear_and_set_file_reference(path)
    }
}
