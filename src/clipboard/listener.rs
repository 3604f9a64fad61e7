//! 剪贴板变化监听
//!
//! 监听线程由 `clipboard-master` 驱动，不轮询。每次系统通知：
//!
//! 1. 先尝试消费自身写入的抑制令牌，命中则忽略
//! 2. 与上次发出的事件间隔小于节流间隔时合并，并由尾沿线程补发一次
//! 3. 否则立即向调度循环投递 `CaptureEvent`
//!
//! 监听器退出或创建失败时按指数退避重启。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use clipboard_master::{CallbackResult, ClipboardHandler, Master};

use super::SelfWriteSuppressor;
use crate::capture::CaptureEvent;
use crate::error::AppError;
use crate::keyboard::ComboFlag;

const EVENT_MIN_INTERVAL_DEFAULT_MS: u64 = 80;
const EVENT_MIN_INTERVAL_MIN_MS: u64 = 20;
const EVENT_MIN_INTERVAL_MAX_MS: u64 = 5_000;
const RESTART_BASE_DELAY_MS: u64 = 100;
const RESTART_MAX_DELAY_MS: u64 = 5_000;

/// 截获事件的接收端
pub type CaptureSink = Arc<dyn Fn(CaptureEvent) + Send + Sync>;

fn normalize_event_min_interval_ms(value_ms: u64) -> u64 {
    value_ms.clamp(EVENT_MIN_INTERVAL_MIN_MS, EVENT_MIN_INTERVAL_MAX_MS)
}

fn compute_restart_backoff_ms(restart_attempt: u32) -> u64 {
    let exp = 1_u64 << restart_attempt.saturating_sub(1).min(6);
    RESTART_BASE_DELAY_MS
        .saturating_mul(exp)
        .min(RESTART_MAX_DELAY_MS)
}

fn debounce_remaining(elapsed: Duration, min_interval: Duration) -> Option<Duration> {
    if elapsed >= min_interval {
        None
    } else {
        Some(min_interval - elapsed)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum DebounceDecision {
    EmitNow,
    Throttle {
        remaining: Duration,
        start_tail_worker: bool,
    },
}

fn decide_debounce_action(
    elapsed: Duration,
    min_interval: Duration,
    tail_worker_running: bool,
) -> DebounceDecision {
    match debounce_remaining(elapsed, min_interval) {
        Some(remaining) => DebounceDecision::Throttle {
            remaining,
            start_tail_worker: !tail_worker_running,
        },
        None => DebounceDecision::EmitNow,
    }
}

/// 可在运行时调整的监听参数
#[derive(Debug, Clone)]
pub struct ListenerControl {
    min_interval_ms: Arc<AtomicU64>,
}

impl Default for ListenerControl {
    fn default() -> Self {
        Self::new(EVENT_MIN_INTERVAL_DEFAULT_MS)
    }
}

impl ListenerControl {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms: Arc::new(AtomicU64::new(normalize_event_min_interval_ms(
                min_interval_ms,
            ))),
        }
    }

    /// 更新节流间隔（限制在 20..=5000ms）
    pub fn set_min_interval_ms(&self, value_ms: u64) {
        let normalized = normalize_event_min_interval_ms(value_ms);
        self.min_interval_ms.store(normalized, Ordering::Relaxed);
        log::debug!("📋 剪贴板监听节流间隔已更新: {}ms", normalized);
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
struct DebounceState {
    last_emit_at: Option<Instant>,
    pending_change: bool,
    tail_worker_running: bool,
}

/// 变化通知的过滤与转发
///
/// 克隆后共享同一份节流状态；系统监听器和测试都通过 `notify()` 驱动它。
#[derive(Clone)]
pub struct ChangeNotifier {
    sink: CaptureSink,
    suppressor: SelfWriteSuppressor,
    paste_held: ComboFlag,
    control: ListenerControl,
    debounce_state: Arc<Mutex<DebounceState>>,
}

impl ChangeNotifier {
    pub fn new(
        sink: CaptureSink,
        suppressor: SelfWriteSuppressor,
        paste_held: ComboFlag,
        control: ListenerControl,
    ) -> Self {
        Self {
            sink,
            suppressor,
            paste_held,
            control,
            debounce_state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, DebounceState> {
        match self.debounce_state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("剪贴板节流状态锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    fn emit(&self) {
        (self.sink)(CaptureEvent {
            at: Instant::now(),
            paste_held: self.paste_held.is_held(),
        });
    }

    /// 处理一次系统剪贴板变化通知
    pub fn notify(&self) {
        if let Some(remaining) = self.suppressor.try_consume() {
            log::debug!("⏭️  忽略自身触发的剪贴板变化，剩余令牌: {}", remaining);
            return;
        }

        let now = Instant::now();
        let min_interval = self.control.min_interval();
        let mut emit_now = false;
        let mut schedule_tail_wait = None;

        {
            let mut state = self.lock_state();
            let elapsed = state
                .last_emit_at
                .map(|last| now.saturating_duration_since(last))
                .unwrap_or(min_interval);

            match decide_debounce_action(elapsed, min_interval, state.tail_worker_running) {
                DebounceDecision::Throttle {
                    remaining,
                    start_tail_worker,
                } => {
                    state.pending_change = true;
                    if start_tail_worker {
                        state.tail_worker_running = true;
                        schedule_tail_wait = Some(remaining);
                    }
                    log::trace!(
                        "⏱️ 剪贴板变化事件节流：{}ms < {}ms（尾沿补发）",
                        elapsed.as_millis(),
                        min_interval.as_millis()
                    );
                }
                DebounceDecision::EmitNow => {
                    state.last_emit_at = Some(now);
                    state.pending_change = false;
                    emit_now = true;
                }
            }
        }

        if let Some(wait_for) = schedule_tail_wait {
            self.spawn_tail_worker(wait_for);
        }

        if emit_now {
            self.emit();
        }
    }

    fn spawn_tail_worker(&self, initial_wait: Duration) {
        let notifier = self.clone();

        thread::spawn(move || {
            let mut wait_for = initial_wait;

            loop {
                if !wait_for.is_zero() {
                    thread::sleep(wait_for);
                }

                let now = Instant::now();
                let min_interval = notifier.control.min_interval();

                {
                    let mut state = notifier.lock_state();
                    if !state.pending_change {
                        state.tail_worker_running = false;
                        return;
                    }

                    let elapsed = state
                        .last_emit_at
                        .map(|last| now.saturating_duration_since(last))
                        .unwrap_or(min_interval);

                    if let Some(remaining) = debounce_remaining(elapsed, min_interval) {
                        wait_for = remaining;
                        continue;
                    }

                    state.pending_change = false;
                    state.last_emit_at = Some(now);
                    state.tail_worker_running = false;
                }

                notifier.emit();
                return;
            }
        });
    }
}

struct Handler {
    notifier: ChangeNotifier,
}

impl ClipboardHandler for Handler {
    fn on_clipboard_change(&mut self) -> CallbackResult {
        self.notifier.notify();
        CallbackResult::Next
    }

    fn on_clipboard_error(&mut self, error: std::io::Error) -> CallbackResult {
        log::error!("剪贴板错误：{}", error);
        CallbackResult::Next
    }
}

/// 在后台线程启动剪贴板监听（退出后自动重启）
pub fn start_listener(notifier: ChangeNotifier) -> Result<JoinHandle<()>, AppError> {
    let handle = thread::Builder::new()
        .name("picpaste-clipboard".to_string())
        .spawn(move || {
            let mut restart_attempt: u32 = 0;
            loop {
                match Master::new(Handler {
                    notifier: notifier.clone(),
                }) {
                    Ok(mut master) => {
                        restart_attempt = 0;
                        log::info!("📋 剪贴板监听已启动");
                        let _ = master.run();
                        log::warn!("📋 剪贴板监听已退出，将尝试重启");
                    }
                    Err(err) => {
                        log::error!("📋 创建剪贴板监听失败: {}", err);
                    }
                }

                restart_attempt = restart_attempt.saturating_add(1);
                let backoff_ms = compute_restart_backoff_ms(restart_attempt);
                log::warn!("📋 剪贴板监听 {}ms 后重试（attempt={}）", backoff_ms, restart_attempt);
                thread::sleep(Duration::from_millis(backoff_ms));
            }
        })?;
    Ok(handle)
}
