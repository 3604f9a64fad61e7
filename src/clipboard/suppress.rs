//! 自身写入抑制
//!
//! 每次主动写剪贴板前领取一个令牌，监听器收到变化时先尝试消费令牌，
//! 消费成功即视为自己触发的变化，不再截获。
//!
//! 令牌在 2 秒后过期；写入失败时 `SelfWriteGuard` 在 `Drop` 中归还令牌，
//! 避免之后一次真实的外部变化被误吞。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// 令牌有效期
pub const SUPPRESSION_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct SuppressorState {
    next_id: u64,
    tokens: Vec<(u64, Instant)>,
}

impl SuppressorState {
    fn prune(&mut self, now: Instant) {
        self.tokens.retain(|(_, expires_at)| *expires_at > now);
    }
}

/// 自身写入抑制器（可跨线程克隆共享）
#[derive(Debug, Clone)]
pub struct SelfWriteSuppressor {
    state: Arc<Mutex<SuppressorState>>,
    ttl: Duration,
}

impl Default for SelfWriteSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

impl SelfWriteSuppressor {
    pub fn new() -> Self {
        Self::with_ttl(SUPPRESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SuppressorState::default())),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SuppressorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("剪贴板抑制状态锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    /// 在写剪贴板之前调用，领取一个抑制令牌
    pub fn arm(&self) -> SelfWriteGuard {
        let mut state = self.lock();
        let now = Instant::now();
        state.prune(now);
        state.next_id = state.next_id.wrapping_add(1);
        let id = state.next_id;
        state.tokens.push((id, now + self.ttl));
        log::debug!("🚫 已设置剪贴板抑制令牌 #{}", id);

        SelfWriteGuard {
            suppressor: self.clone(),
            id,
            committed: false,
        }
    }

    /// 监听器调用：消费一个未过期令牌，返回剩余令牌数
    pub fn try_consume(&self) -> Option<usize> {
        let mut state = self.lock();
        state.prune(Instant::now());
        if state.tokens.is_empty() {
            return None;
        }
        state.tokens.remove(0);
        Some(state.tokens.len())
    }

    /// 当前未过期的令牌数
    pub fn pending(&self) -> usize {
        let mut state = self.lock();
        state.prune(Instant::now());
        state.tokens.len()
    }

    fn release(&self, id: u64) {
        let mut state = self.lock();
        state.tokens.retain(|(token, _)| *token != id);
    }
}

/// 一次自身写入的令牌守卫
///
/// 写入成功后调用 `commit()` 保留令牌；未提交就被丢弃时归还令牌。
#[derive(Debug)]
pub struct SelfWriteGuard {
    suppressor: SelfWriteSuppressor,
    id: u64,
    committed: bool,
}

impl SelfWriteGuard {
    /// 写入成功，令牌留给监听器消费
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SelfWriteGuard {
    fn drop(&mut self) {
        if !self.committed {
            self.suppressor.release(self.id);
            log::debug!("↩️ 写入未完成，归还剪贴板抑制令牌 #{}", self.id);
        }
    }
}
