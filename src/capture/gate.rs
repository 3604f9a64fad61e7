//! 粘贴门控
//!
//! "立即处理"模式下每个截获事件都放行。"粘贴时处理"模式下，截获事件必须紧随
//! 粘贴组合键或与其同时发生才会被处理：
//!
//! - 事件发生时组合键正按住 → 立即处理
//! - 事件之前的关联窗口内刚按过组合键 → 立即处理，并消耗这次按键
//! - 否则丢弃。事件之后才出现的组合键不会回头处理它
//!
//! 每次按键最多放行一个截获事件。

use std::time::{Duration, Instant};

use super::CaptureEvent;
use crate::keyboard::PasteSignal;
use crate::settings::ProcessingMode;

/// 处理模式 + 关联窗口
#[derive(Debug, Clone)]
pub struct PasteGate {
    mode: ProcessingMode,
    window: Duration,
    last_paste: Option<Instant>,
}

fn within(earlier: Instant, later: Instant, window: Duration) -> bool {
    later.checked_duration_since(earlier).is_some_and(|gap| gap <= window)
}

impl PasteGate {
    pub fn new(mode: ProcessingMode, window: Duration) -> Self {
        Self {
            mode,
            window,
            last_paste: None,
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// 设置变更后重新配置，丢弃记录的按键
    pub fn reconfigure(&mut self, mode: ProcessingMode, window: Duration) {
        self.mode = mode;
        self.window = window;
        self.last_paste = None;
    }

    /// 截获事件到达，返回是否处理
    pub fn on_capture(&mut self, event: &CaptureEvent) -> bool {
        if self.mode == ProcessingMode::Immediate || event.paste_held {
            return true;
        }

        if let Some(paste_at) = self.last_paste.take() {
            if within(paste_at, event.at, self.window) {
                return true;
            }
        }

        log::debug!("⏭️ {}ms 内没有粘贴组合键，忽略本次变化", self.window.as_millis());
        false
    }

    /// 记录一次粘贴组合键，供随后到达的截获事件关联
    pub fn on_paste(&mut self, signal: PasteSignal) {
        if self.mode == ProcessingMode::OnPaste {
            self.last_paste = Some(signal.at);
        }
    }
}
