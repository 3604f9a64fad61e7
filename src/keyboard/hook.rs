//! 系统级键盘钩子
//!
//! Windows 上安装 `WH_KEYBOARD_LL` 低级钩子。钩子回调运行在安装它的线程的消息循环里，
//! 所以单独起一个线程专门跑 `GetMessageW`。回调用 `try_lock` 访问观察器，
//! 拿不到锁就跳过本次按键，无论如何都调用 `CallNextHookEx` 把按键原样传下去。
//!
//! 其他平台没有等价的免权限全局钩子，直接返回 `Unsupported`。

use crate::error::AppError;

use super::PasteObserver;

#[cfg(target_os = "windows")]
pub use self::windows_impl::{install, KeyboardHook};

#[cfg(not(target_os = "windows"))]
/// 占位句柄（非 Windows 平台不会被构造）
#[derive(Debug)]
pub struct KeyboardHook {
    _private: (),
}

#[cfg(not(target_os = "windows"))]
/// 安装全局键盘观察器
pub fn install(observer: PasteObserver) -> Result<KeyboardHook, AppError> {
    drop(observer);
    Err(AppError::Unsupported("全局键盘监听"))
}

#[cfg(target_os = "windows")]
mod windows_impl {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::thread::{self, JoinHandle};

    use once_cell::sync::Lazy;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW, SetWindowsHookExW,
        TranslateMessage, UnhookWindowsHookEx, HC_ACTION, KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL,
        WM_KEYDOWN, WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN, WM_SYSKEYUP,
    };

    use crate::keyboard::{Key, KeyDirection, KeyTransition};

    static OBSERVER: Lazy<Mutex<Option<PasteObserver>>> = Lazy::new(|| Mutex::new(None));

    fn set_observer(observer: Option<PasteObserver>) {
        match OBSERVER.lock() {
            Ok(mut guard) => *guard = observer,
            Err(poisoned) => *poisoned.into_inner() = observer,
        }
    }

    unsafe extern "system" fn hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        if code == HC_ACTION as i32 {
            let direction = match wparam.0 as u32 {
                WM_KEYDOWN | WM_SYSKEYDOWN => Some(KeyDirection::Down),
                WM_KEYUP | WM_SYSKEYUP => Some(KeyDirection::Up),
                _ => None,
            };
            if let Some(direction) = direction {
                let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
                if let Ok(mut guard) = OBSERVER.try_lock() {
                    if let Some(observer) = guard.as_mut() {
                        observer.observe(KeyTransition {
                            key: Key::from_virtual_key(info.vkCode),
                            direction,
                        });
                    }
                }
            }
        }
        CallNextHookEx(None, code, wparam, lparam)
    }

    /// 已安装的钩子，`Drop` 时退出消息循环并卸载
    #[derive(Debug)]
    pub struct KeyboardHook {
        thread_id: u32,
        handle: Option<JoinHandle<()>>,
    }

    impl Drop for KeyboardHook {
        fn drop(&mut self) {
            let _ = unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
            set_observer(None);
            log::info!("⌨️ 键盘监听已卸载");
        }
    }

    /// 安装全局键盘观察器
    pub fn install(observer: PasteObserver) -> Result<KeyboardHook, AppError> {
        set_observer(Some(observer));
        let (tx, rx) = mpsc::channel::<Result<u32, String>>();

        let handle = thread::Builder::new()
            .name("picpaste-keyboard".to_string())
            .spawn(move || unsafe {
                let module = match GetModuleHandleW(PCWSTR::null()) {
                    Ok(module) => module,
                    Err(err) => {
                        let _ = tx.send(Err(format!("GetModuleHandleW 失败: {:?}", err)));
                        return;
                    }
                };
                let hook = match SetWindowsHookExW(
                    WH_KEYBOARD_LL,
                    Some(hook_proc),
                    Some(HINSTANCE(module.0)),
                    0,
                ) {
                    Ok(hook) => hook,
                    Err(err) => {
                        let _ = tx.send(Err(format!("SetWindowsHookExW 失败: {:?}", err)));
                        return;
                    }
                };
                let _ = tx.send(Ok(GetCurrentThreadId()));

                let mut msg = MSG::default();
                while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
                let _ = UnhookWindowsHookEx(hook);
            })?;

        match rx.recv() {
            Ok(Ok(thread_id)) => {
                log::info!("⌨️ 键盘监听已安装");
                Ok(KeyboardHook {
                    thread_id,
                    handle: Some(handle),
                })
            }
            Ok(Err(message)) => {
                set_observer(None);
                let _ = handle.join();
                Err(AppError::Keyboard(message))
            }
            Err(_) => {
                set_observer(None);
                Err(AppError::Keyboard("键盘监听线程意外退出".to_string()))
            }
        }
    }
}

#[cfg(all(test, not(target_os = "windows")))]
mod tests {
    use super::*;
    use crate::keyboard::ComboFlag;
    use std::sync::Arc;

    #[test]
    fn install_is_unsupported_off_windows() {
        let observer = PasteObserver::new(ComboFlag::default(), Arc::new(|_| {}));
        assert!(matches!(install(observer), Err(AppError::Unsupported(_))));
    }
}
