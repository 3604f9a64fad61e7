//! # PicPaste 库入口
//!
//! 把剪贴板里的图片转存为 PNG 文件，并把剪贴板替换为对该文件的引用，
//! 让只能粘贴文件 / 路径的终端程序也能"粘贴截图"。
//!
//! ## 架构总览
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ 事件源（各自线程）                                          │
//! │  clipboard::listener ── keyboard::hook ── cache::sweeper     │
//! │  app::session (关机/注销/信号)                               │
//! └──────────────┬──────────────────────────────────────────────┘
//!                ↓ AppEvent (tokio mpsc)
//! ┌──────────────┴──────────────────────────────────────────────┐
//! │ app::App  单线程调度循环                                    │
//! │                                                             │
//! │  capture::gate ── 处理模式（立即 / 粘贴时）                  │
//! │       ↓                                                     │
//! │  clipboard::classifier ── 内存图片 or 文件复制               │
//! │       ↓                                                     │
//! │  cache::eviction ── 写入前淘汰                               │
//! │       ↓                                                     │
//! │  persist ── PNG → DIB → 位图 → 像素 逐级回退                 │
//! │       ↓                                                     │
//! │  clipboard::replace ── 单文件引用 + 自身写入抑制             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`settings`] | 设置的加载、保存、重载与保存目录回退 |
//! | [`storage`] | 保存目录解析、可写探测、目录信息 |
//! | [`cache`] | 缓存文件命名与识别、淘汰、清扫、全量清理、清扫定时器 |
//! | [`clipboard`] | 剪贴板能力、监听、判定、替换、自身写入抑制 |
//! | [`persist`] | 图片持久化与 DIB 解码 |
//! | [`keyboard`] | 粘贴组合键状态机与系统键盘钩子 |
//! | [`capture`] | 截获事件、粘贴门控、端到端截获流程 |
//! | [`app`] | 调度循环与生命周期入口、会话结束监听 |
//! | [`cli`] | 命令行 |

pub mod app;
pub mod cache;
pub mod capture;
pub mod cli;
pub mod clipboard;
pub mod error;
pub mod keyboard;
pub mod persist;
pub mod settings;
pub mod storage;
