//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)`、`expect()` 等不一致模式。
//!
//! 核心流水线（监听 → 判定 → 持久化 → 替换剪贴板 → 缓存清理）的每个阶段
//! 都返回 `Result<T, AppError>`，在各自的组件边界上被记录日志并吞掉；
//! 只有启动阶段的错误会一路传播到 `main`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `io::Error`、`image::ImageError`、`serde_json::Error` 提供 `From` 转换，无需手动 map。

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 剪贴板读写操作失败（被占用、拒绝访问等瞬时错误）
    #[error("剪贴板操作失败: {0}")]
    Clipboard(String),

    /// 图片解码 / 编码失败
    #[error("图片处理失败: {0}")]
    Image(#[from] image::ImageError),

    /// 剪贴板中的位图数据格式不合法
    #[error("位图数据无效: {0}")]
    InvalidBitmap(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 存储目录不可用
    #[error("存储目录不可用: {0}")]
    Storage(String),

    /// 设置文件读写失败
    #[error("设置文件错误: {0}")]
    Settings(#[from] serde_json::Error),

    /// 全局键盘监听安装失败
    #[error("键盘监听失败: {0}")]
    Keyboard(String),

    /// 会话结束 / 信号监听安装失败
    #[error("会话监听失败: {0}")]
    Session(String),

    /// 当前平台不支持该操作
    #[error("当前平台不支持: {0}")]
    Unsupported(&'static str),
}
