//! 应用调度循环
//!
//! # 设计思路
//!
//! 剪贴板与保存目录被视为同一个共享资源，所有对它们的修改都在单一调度循环里串行执行，
//! 因此不需要任何锁。各个事件源只负责把 `AppEvent` 投递进无界通道：
//!
//! | 事件源 | 线程 | 事件 |
//! |------|------|------|
//! | 剪贴板监听 | `picpaste-clipboard` | `ClipboardChanged` |
//! | 键盘钩子 | `picpaste-keyboard` | `PasteCombo` |
//! | 清扫定时器 | tokio 任务 | `Sweep` |
//! | 会话结束 / 信号 | 窗口线程 / tokio 任务 | `SessionEnding` / `Exit` / `ReloadSettings` |
//!
//! # 实现思路
//!
//! - 生命周期入口显式化：`start`、`on_settings_saved`、`on_exit`、`on_session_end`。
//! - 设置变更后整体销毁并重建清扫定时器与键盘钩子，不原地修改。
//! - "粘贴时处理"模式下键盘钩子不可用时，降级为立即处理并记录警告。

pub mod session;

use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::cache::{purge_all, sweep_expired, CacheConfig, SweepTimer};
use crate::capture::{run_capture, CaptureEvent, CaptureOutcome, PasteGate};
use crate::clipboard::{
    start_listener, ChangeNotifier, ClipboardAccess, ListenerControl, SelfWriteSuppressor,
    SystemClipboard,
};
use crate::error::AppError;
use crate::keyboard::{self, ComboFlag, KeyboardHook, PasteObserver, PasteSignal};
use crate::settings::{AppSettings, ProcessingMode, SettingsStore};

/// 会话结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    Shutdown,
    Logoff,
}

/// 投递到调度循环的事件
#[derive(Debug)]
pub enum AppEvent {
    /// 剪贴板内容变化（已排除自身写入）
    ClipboardChanged(CaptureEvent),
    /// 粘贴组合键按下
    PasteCombo(PasteSignal),
    /// 周期清扫
    Sweep,
    /// 设置已保存
    SettingsSaved(Box<AppSettings>),
    /// 从磁盘重新读取设置
    ReloadSettings,
    /// 用户退出
    Exit,
    /// 系统关机 / 注销；处理完毕后通过 `ack` 通知等待方
    SessionEnding {
        reason: SessionEndReason,
        ack: Option<std::sync::mpsc::Sender<()>>,
    },
}

/// 事件处理后调度循环是否继续
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// 应用核心状态
pub struct App<C: ClipboardAccess> {
    clipboard: C,
    settings: SettingsStore,
    suppressor: SelfWriteSuppressor,
    gate: PasteGate,
    listener_control: ListenerControl,
    paste_held: ComboFlag,
    events: UnboundedSender<AppEvent>,
    sweep_timer: Option<SweepTimer>,
    keyboard: Option<KeyboardHook>,
}

impl<C: ClipboardAccess> App<C> {
    pub fn new(clipboard: C, settings: SettingsStore, events: UnboundedSender<AppEvent>) -> Self {
        let current = settings.current();
        let gate = PasteGate::new(current.processing_mode, current.paste_window());
        let listener_control = ListenerControl::new(current.clipboard_event_min_interval_ms);
        Self {
            clipboard,
            settings,
            suppressor: SelfWriteSuppressor::new(),
            gate,
            listener_control,
            paste_held: ComboFlag::default(),
            events,
            sweep_timer: None,
            keyboard: None,
        }
    }

    /// 当前设置
    pub fn settings(&self) -> &AppSettings {
        self.settings.current()
    }

    /// 实际生效的处理模式（可能因键盘钩子不可用而降级）
    pub fn effective_mode(&self) -> ProcessingMode {
        self.gate.mode()
    }

    /// 当前清扫间隔，`None` 表示未启动定时器
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_timer.as_ref().map(SweepTimer::interval)
    }

    /// 构造一个把剪贴板变化投递到本调度循环的通知器
    pub fn change_notifier(&self) -> ChangeNotifier {
        let events = self.events.clone();
        ChangeNotifier::new(
            std::sync::Arc::new(move |event| {
                let _ = events.send(AppEvent::ClipboardChanged(event));
            }),
            self.suppressor.clone(),
            self.paste_held.clone(),
            self.listener_control.clone(),
        )
    }

    /// 启动：按当前设置建立定时器与键盘钩子。必须在 tokio 运行时内调用
    pub fn start(&mut self) {
        log::info!(
            "🚀 PicPaste 启动，保存目录: {}",
            self.settings.current().save_path.display()
        );
        self.apply_settings();
    }

    fn apply_settings(&mut self) {
        let current = self.settings.current().clone();
        self.listener_control
            .set_min_interval_ms(current.clipboard_event_min_interval_ms);
        self.gate
            .reconfigure(current.processing_mode, current.paste_window());
        self.rebuild_sweep_timer(current.cleanup_interval_minutes);
        self.rebuild_keyboard(current.processing_mode, current.paste_window());
    }

    fn rebuild_sweep_timer(&mut self, interval_minutes: u32) {
        self.sweep_timer = None;
        let events = self.events.clone();
        self.sweep_timer = SweepTimer::spawn(interval_minutes, move || {
            let _ = events.send(AppEvent::Sweep);
        });
    }

    fn rebuild_keyboard(&mut self, mode: ProcessingMode, window: Duration) {
        self.keyboard = None;
        self.paste_held.set(false);
        if mode != ProcessingMode::OnPaste {
            return;
        }

        let events = self.events.clone();
        let observer = PasteObserver::new(
            self.paste_held.clone(),
            std::sync::Arc::new(move |signal| {
                let _ = events.send(AppEvent::PasteCombo(signal));
            }),
        );
        match keyboard::install(observer) {
            Ok(hook) => self.keyboard = Some(hook),
            Err(err) => {
                log::warn!("⌨️ 键盘监听不可用，改为立即处理: {}", err);
                self.gate.reconfigure(ProcessingMode::Immediate, window);
            }
        }
    }

    /// 处理一个事件
    pub fn handle(&mut self, event: AppEvent) -> Flow {
        match event {
            AppEvent::ClipboardChanged(event) => {
                if self.gate.on_capture(&event) {
                    self.capture();
                }
            }
            AppEvent::PasteCombo(signal) => self.gate.on_paste(signal),
            AppEvent::Sweep => self.sweep(),
            AppEvent::SettingsSaved(settings) => self.on_settings_saved(*settings),
            AppEvent::ReloadSettings => self.reload_settings(),
            AppEvent::Exit => {
                self.on_exit();
                return Flow::Stop;
            }
            AppEvent::SessionEnding { reason, ack } => {
                self.on_session_end(reason);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// 取缓存配置前先确认保存目录仍然可用，必要时回退并回写设置
    fn cache_config(&mut self) -> CacheConfig {
        if let Err(err) = self.settings.ensure_save_dir() {
            log::error!("📁 保存目录与默认目录均不可用: {}", err);
        }
        self.settings.current().cache_config()
    }

    /// 执行一次截获
    pub fn capture(&mut self) -> CaptureOutcome {
        let config = self.cache_config();
        run_capture(&mut self.clipboard, &config, &self.suppressor)
    }

    /// 执行一次过期清扫
    pub fn sweep(&mut self) {
        let config = self.cache_config();
        let report = sweep_expired(&config, Local::now());
        if !report.is_empty() {
            log::info!(
                "🧹 清扫完成：删除 {} 个，失败 {} 个",
                report.removed.len(),
                report.failed.len()
            );
        }
    }

    /// 设置已保存：落盘并重建定时器 / 钩子
    pub fn on_settings_saved(&mut self, settings: AppSettings) {
        if let Err(err) = self.settings.replace(settings) {
            log::error!("⚙️ 保存设置失败: {}", err);
        }
        log::info!("⚙️ 设置已更新");
        self.apply_settings();
    }

    fn reload_settings(&mut self) {
        match self.settings.reload() {
            Ok(_) => {
                log::info!("⚙️ 设置已重新加载");
                self.apply_settings();
            }
            Err(err) => log::warn!("⚙️ 重新加载设置失败，保留当前设置: {}", err),
        }
    }

    fn purge(&mut self, trigger: &str) {
        let config = self.cache_config();
        let report = purge_all(&config.save_dir);
        log::info!(
            "🗑️ {}清理: 删除 {} 个缓存文件（{} 个跳过）",
            trigger,
            report.removed.len(),
            report.failed.len()
        );
    }

    fn teardown(&mut self) {
        self.sweep_timer = None;
        self.keyboard = None;
    }

    /// 用户退出
    pub fn on_exit(&mut self) {
        self.teardown();
        if self.settings.current().cleanup_on_exit {
            self.purge("退出");
        }
        log::info!("👋 PicPaste 退出");
    }

    /// 系统关机 / 注销
    pub fn on_session_end(&mut self, reason: SessionEndReason) {
        self.teardown();
        if self.settings.current().cleanup_on_shutdown {
            let trigger = match reason {
                SessionEndReason::Shutdown => "关机",
                SessionEndReason::Logoff => "注销",
            };
            self.purge(trigger);
        }
    }

    /// 运行调度循环直到退出
    pub async fn run(mut self, mut events: UnboundedReceiver<AppEvent>) {
        while let Some(event) = events.recv().await {
            if self.handle(event) == Flow::Stop {
                break;
            }
        }
        self.teardown();
    }
}

/// 以系统剪贴板运行完整服务
pub async fn run_service(settings: SettingsStore) -> Result<(), AppError> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let mut app = App::new(SystemClipboard::new(), settings, tx.clone());
    app.start();
    start_listener(app.change_notifier())?;
    session::spawn_watchers(tx)?;
    app.run(rx).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{cached_file_name, list_cached_files};
    use crate::clipboard::MemoryClipboard;
    use crate::persist::CapturedImage;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("{}_{}", prefix, nanos));
        let _ = fs::create_dir_all(&dir);
        dir
    }

    fn store_in(dir: &Path, edit: impl FnOnce(&mut AppSettings)) -> SettingsStore {
        let mut settings = AppSettings {
            save_path: dir.join("cache"),
            ..AppSettings::default()
        };
        edit(&mut settings);
        let path = dir.join("settings.json");
        fs::write(&path, serde_json::to_string(&settings).expect("serialize"))
            .expect("write settings");
        SettingsStore::open(path).expect("open settings")
    }

    fn image_clipboard() -> MemoryClipboard {
        let mut clipboard = MemoryClipboard::new();
        clipboard.set_image(CapturedImage::from_rgba(2, 2, vec![42; 16]).expect("image"));
        clipboard
    }

    #[tokio::test]
    async fn immediate_capture_replaces_clipboard() {
        let dir = unique_temp_dir("picpaste_app_capture");
        let clipboard = image_clipboard();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut app = App::new(clipboard.clone(), store_in(&dir, |_| {}), tx);
        app.start();

        assert_eq!(app.handle(AppEvent::ClipboardChanged(CaptureEvent::now())), Flow::Continue);
        let reference = clipboard.file_reference().expect("clipboard replaced");
        assert!(reference.starts_with(dir.join("cache")));
        assert!(reference.exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn capture_falls_back_when_save_dir_disappears() {
        let dir = unique_temp_dir("picpaste_app_fallback");
        let clipboard = image_clipboard();
        let fallback = dir.join("fallback");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let store = store_in(&dir, |_| {}).with_fallback_dir(fallback.clone());
        let mut app = App::new(clipboard.clone(), store, tx);
        app.start();

        let cache = dir.join("cache");
        fs::remove_dir_all(&cache).expect("remove cache dir");
        fs::write(&cache, b"not a dir").expect("block cache dir");

        app.handle(AppEvent::ClipboardChanged(CaptureEvent::now()));
        let reference = clipboard.file_reference().expect("capture must not be lost");
        assert!(reference.starts_with(&fallback));
        assert!(reference.exists());
        assert_eq!(app.settings().save_path, fallback);

        let on_disk = SettingsStore::open(dir.join("settings.json")).expect("reopen");
        assert_eq!(on_disk.current().save_path, fallback);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn settings_saved_rebuilds_sweep_timer() {
        let dir = unique_temp_dir("picpaste_app_settings");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut app = App::new(MemoryClipboard::new(), store_in(&dir, |_| {}), tx);
        app.start();
        assert_eq!(app.sweep_interval(), None);

        let mut updated = app.settings().clone();
        updated.cleanup_interval_minutes = 60;
        app.handle(AppEvent::SettingsSaved(Box::new(updated)));
        assert_eq!(app.sweep_interval(), Some(Duration::from_secs(3600)));

        let on_disk = SettingsStore::open(dir.join("settings.json")).expect("reopen");
        assert_eq!(on_disk.current().cleanup_interval_minutes, 60);

        let mut disabled = app.settings().clone();
        disabled.cleanup_interval_minutes = 0;
        app.on_settings_saved(disabled);
        assert_eq!(app.sweep_interval(), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn exit_purges_only_when_configured() {
        let dir = unique_temp_dir("picpaste_app_exit");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut app = App::new(
            MemoryClipboard::new(),
            store_in(&dir, |s| s.cleanup_on_exit = false),
            tx.clone(),
        );
        let cache = dir.join("cache");
        fs::write(cache.join(cached_file_name(Local::now())), b"png").expect("seed");

        assert_eq!(app.handle(AppEvent::Exit), Flow::Stop);
        assert_eq!(list_cached_files(&cache).len(), 1);

        let mut app = App::new(MemoryClipboard::new(), store_in(&dir, |_| {}), tx);
        assert_eq!(app.handle(AppEvent::Exit), Flow::Stop);
        assert!(list_cached_files(&cache).is_empty());
        assert!(cache.is_dir());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn session_end_purges_and_acknowledges() {
        let dir = unique_temp_dir("picpaste_app_session");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut app = App::new(MemoryClipboard::new(), store_in(&dir, |_| {}), tx);
        let cache = dir.join("cache");
        fs::write(cache.join(cached_file_name(Local::now())), b"png").expect("seed");

        let (ack_tx, ack_rx) = std::sync::mpsc::channel();
        let flow = app.handle(AppEvent::SessionEnding {
            reason: SessionEndReason::Logoff,
            ack: Some(ack_tx),
        });
        assert_eq!(flow, Flow::Stop);
        assert!(ack_rx.try_recv().is_ok());
        assert!(list_cached_files(&cache).is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[cfg(not(target_os = "windows"))]
    #[tokio::test]
    async fn paste_mode_degrades_without_keyboard_observer() {
        let dir = unique_temp_dir("picpaste_app_degrade");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut app = App::new(
            MemoryClipboard::new(),
            store_in(&dir, |s| s.processing_mode = ProcessingMode::OnPaste),
            tx,
        );
        app.start();
        assert_eq!(app.settings().processing_mode, ProcessingMode::OnPaste);
        assert_eq!(app.effective_mode(), ProcessingMode::Immediate);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn run_loop_stops_on_exit() {
        let dir = unique_temp_dir("picpaste_app_run");
        let clipboard = image_clipboard();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let app = App::new(
            clipboard.clone(),
            store_in(&dir, |s| s.cleanup_on_exit = false),
            tx.clone(),
        );

        tx.send(AppEvent::ClipboardChanged(CaptureEvent::now())).expect("send");
        tx.send(AppEvent::Exit).expect("send");
        tx.send(AppEvent::ClipboardChanged(CaptureEvent::now())).expect("send");
        app.run(rx).await;

        assert_eq!(clipboard.write_count(), 1, "events after exit are not handled");

        let _ = fs::remove_dir_all(&dir);
    }
}
