//! 会话结束与进程信号
//!
//! - Windows：隐藏的顶层窗口接收 `WM_QUERYENDSESSION` / `WM_ENDSESSION`。
//!   收到 `WM_ENDSESSION` 后投递 `SessionEnding` 并最多阻塞 5 秒等待清理完成，
//!   否则系统可能在清理结束前终止进程。
//! - Unix：SIGTERM 视为会话结束（关机），SIGHUP 视为"设置已保存"（重新加载）。
//! - 所有平台：Ctrl+C 视为用户退出。

use tokio::sync::mpsc::UnboundedSender;

use super::AppEvent;
use crate::error::AppError;

/// 启动全部会话 / 信号监听。必须在 tokio 运行时内调用
pub fn spawn_watchers(events: UnboundedSender<AppEvent>) -> Result<(), AppError> {
    spawn_ctrl_c(events.clone());
    #[cfg(unix)]
    unix::spawn(events.clone())?;
    #[cfg(target_os = "windows")]
    windows_impl::spawn(events)?;
    #[cfg(not(any(unix, target_os = "windows")))]
    drop(events);
    Ok(())
}

fn spawn_ctrl_c(events: UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("收到 Ctrl+C，准备退出");
                let _ = events.send(AppEvent::Exit);
            }
            Err(err) => log::warn!("监听 Ctrl+C 失败: {}", err),
        }
    });
}

#[cfg(unix)]
mod unix {
    use tokio::signal::unix::{signal, SignalKind};

    use super::*;
    use crate::app::SessionEndReason;

    pub(super) fn spawn(events: UnboundedSender<AppEvent>) -> Result<(), AppError> {
        let mut terminate = signal(SignalKind::terminate())?;
        let mut hangup = signal(SignalKind::hangup())?;

        let on_terminate = events.clone();
        tokio::spawn(async move {
            if terminate.recv().await.is_some() {
                log::info!("收到 SIGTERM，按会话结束处理");
                let _ = on_terminate.send(AppEvent::SessionEnding {
                    reason: SessionEndReason::Shutdown,
                    ack: None,
                });
            }
        });

        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                log::info!("收到 SIGHUP，重新加载设置");
                if events.send(AppEvent::ReloadSettings).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }
}

#[cfg(target_os = "windows")]
mod windows_impl {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use once_cell::sync::OnceCell;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::{
        CreateWindowExW, DefWindowProcW, DispatchMessageW, GetMessageW, RegisterClassW,
        TranslateMessage, MSG, WINDOW_EX_STYLE, WM_ENDSESSION, WM_QUERYENDSESSION, WNDCLASSW,
        WS_OVERLAPPED,
    };

    use super::*;
    use crate::app::SessionEndReason;

    const ENDSESSION_LOGOFF: u32 = 0x8000_0000;
    const ACK_TIMEOUT: Duration = Duration::from_secs(5);

    static EVENTS: OnceCell<UnboundedSender<AppEvent>> = OnceCell::new();

    fn wide(text: &str) -> Vec<u16> {
        text.encode_utf16().chain(std::iter::once(0)).collect()
    }

    unsafe extern "system" fn window_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        match msg {
            WM_QUERYENDSESSION => LRESULT(1),
            WM_ENDSESSION => {
                if wparam.0 != 0 {
                    let reason = if (lparam.0 as u32) & ENDSESSION_LOGOFF != 0 {
                        SessionEndReason::Logoff
                    } else {
                        SessionEndReason::Shutdown
                    };
                    if let Some(events) = EVENTS.get() {
                        let (ack_tx, ack_rx) = mpsc::channel();
                        let sent = events.send(AppEvent::SessionEnding {
                            reason,
                            ack: Some(ack_tx),
                        });
                        if sent.is_ok() && ack_rx.recv_timeout(ACK_TIMEOUT).is_err() {
                            log::warn!("等待会话结束清理超时");
                        }
                    }
                }
                LRESULT(0)
            }
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }

    pub(super) fn spawn(events: UnboundedSender<AppEvent>) -> Result<(), AppError> {
        if EVENTS.set(events).is_err() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        thread::Builder::new()
            .name("picpaste-session".to_string())
            .spawn(move || unsafe {
                let class_name = wide("PicPasteSessionWatcher");
                let module = match GetModuleHandleW(PCWSTR::null()) {
                    Ok(module) => module,
                    Err(err) => {
                        let _ = ready_tx.send(Err(format!("GetModuleHandleW 失败: {:?}", err)));
                        return;
                    }
                };
                let instance = HINSTANCE(module.0);
                let class = WNDCLASSW {
                    lpfnWndProc: Some(window_proc),
                    hInstance: instance,
                    lpszClassName: PCWSTR(class_name.as_ptr()),
                    ..Default::default()
                };
                if RegisterClassW(&class) == 0 {
                    let _ = ready_tx.send(Err("RegisterClassW 失败".to_string()));
                    return;
                }

                // 不调用 ShowWindow，窗口始终隐藏；消息窗口收不到会话结束通知
                let created = CreateWindowExW(
                    WINDOW_EX_STYLE::default(),
                    PCWSTR(class_name.as_ptr()),
                    PCWSTR(class_name.as_ptr()),
                    WS_OVERLAPPED,
                    0,
                    0,
                    0,
                    0,
                    None,
                    None,
                    Some(instance),
                    None,
                );
                if let Err(err) = created {
                    let _ = ready_tx.send(Err(format!("CreateWindowExW 失败: {:?}", err)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                let mut msg = MSG::default();
                while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!("🖥️ 会话结束监听已启动");
                Ok(())
            }
            Ok(Err(message)) => Err(AppError::Session(message)),
            Err(_) => Err(AppError::Session("会话结束监听线程意外退出".to_string())),
        }
    }
}
