//! 全局粘贴组合键观察
//!
//! # 设计思路
//!
//! "粘贴时处理"模式需要知道用户何时按下了 Ctrl+V。观察器只观察、转发，
//! 从不吞掉按键；系统输入管线会阻塞等待回调返回，所以回调里只更新少量本地状态，
//! 再把信号投递到通道，由调度循环决定如何使用。
//!
//! # 实现思路
//!
//! - 左 / 右 / 通用 Ctrl 各自独立跟踪按下与抬起。
//! - 任一 Ctrl 按住时，V 从抬起变为按下才产生一次信号；按住 V 的自动重复不再触发。
//! - `ComboFlag` 反映组合键"此刻是否按住"，供剪贴板监听器给事件打标记。
//! - `hook` 子模块负责安装系统钩子（仅 Windows）。

pub mod hook;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub use hook::{install, KeyboardHook};

const VK_CONTROL: u32 = 0x11;
const VK_LCONTROL: u32 = 0xA2;
const VK_RCONTROL: u32 = 0xA3;
const VK_V: u32 = 0x56;

/// 观察器关心的按键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    LeftControl,
    RightControl,
    /// 不区分左右的 Ctrl
    Control,
    V,
    Other(u32),
}

impl Key {
    /// 由虚拟键码映射
    pub fn from_virtual_key(code: u32) -> Self {
        match code {
            VK_LCONTROL => Self::LeftControl,
            VK_RCONTROL => Self::RightControl,
            VK_CONTROL => Self::Control,
            VK_V => Self::V,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

/// 一次按键状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTransition {
    pub key: Key,
    pub direction: KeyDirection,
}

impl KeyTransition {
    pub fn down(key: Key) -> Self {
        Self {
            key,
            direction: KeyDirection::Down,
        }
    }

    pub fn up(key: Key) -> Self {
        Self {
            key,
            direction: KeyDirection::Up,
        }
    }
}

/// 粘贴组合键被按下
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasteSignal {
    pub at: Instant,
}

/// Ctrl+V 状态机
#[derive(Debug, Default, Clone)]
pub struct PasteComboTracker {
    left_ctrl: bool,
    right_ctrl: bool,
    generic_ctrl: bool,
    v_down: bool,
}

impl PasteComboTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ctrl_held(&self) -> bool {
        self.left_ctrl || self.right_ctrl || self.generic_ctrl
    }

    /// 组合键此刻是否按住
    pub fn combo_held(&self) -> bool {
        self.ctrl_held() && self.v_down
    }

    /// 喂入一次按键变化，组合键新按下时返回信号
    pub fn on_transition(&mut self, transition: KeyTransition) -> Option<PasteSignal> {
        let down = transition.direction == KeyDirection::Down;
        match transition.key {
            Key::LeftControl => self.left_ctrl = down,
            Key::RightControl => self.right_ctrl = down,
            Key::Control => self.generic_ctrl = down,
            Key::V => {
                let was_down = self.v_down;
                self.v_down = down;
                if down && !was_down && self.ctrl_held() {
                    return Some(PasteSignal { at: Instant::now() });
                }
            }
            Key::Other(_) => {}
        }
        None
    }
}

/// 组合键按住标志（跨线程共享）
#[derive(Debug, Clone, Default)]
pub struct ComboFlag(Arc<AtomicBool>);

impl ComboFlag {
    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, held: bool) {
        self.0.store(held, Ordering::SeqCst);
    }
}

/// 粘贴信号接收端，必须立即返回
pub type PasteSink = Arc<dyn Fn(PasteSignal) + Send + Sync>;

/// 按键事件观察器：状态机 + 标志 + 信号投递
pub struct PasteObserver {
    tracker: PasteComboTracker,
    flag: ComboFlag,
    sink: PasteSink,
}

impl std::fmt::Debug for PasteObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasteObserver")
            .field("tracker", &self.tracker)
            .field("flag", &self.flag)
            .finish()
    }
}

impl PasteObserver {
    pub fn new(flag: ComboFlag, sink: PasteSink) -> Self {
        Self {
            tracker: PasteComboTracker::new(),
            flag,
            sink,
        }
    }

    /// 处理一次按键变化
    pub fn observe(&mut self, transition: KeyTransition) {
        let signal = self.tracker.on_transition(transition);
        self.flag.set(self.tracker.combo_held());
        if let Some(signal) = signal {
            (self.sink)(signal);
        }
    }
}
