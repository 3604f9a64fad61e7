//! 周期清扫定时器
//!
//! 定时器本身不做任何文件操作，只在每个周期调用一次回调
//! （实际由回调把"清扫"消息投递回调度循环，在调度线程上执行）。
//! 启动时立即触发一次，之后按固定间隔触发。
//!
//! 设置变更后必须整体销毁并重建定时器，而不是原地修改间隔：
//! `SweepTimer` 在 `Drop` 时中止后台任务。

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// 周期清扫定时器句柄
#[derive(Debug)]
pub struct SweepTimer {
    interval: Duration,
    handle: JoinHandle<()>,
}

impl SweepTimer {
    /// 启动定时器
    ///
    /// `interval_minutes` 为 0 时不调度任何后台任务，返回 `None`。
    /// 必须在 tokio 运行时内调用。
    pub fn spawn<F>(interval_minutes: u32, on_tick: F) -> Option<Self>
    where
        F: Fn() + Send + 'static,
    {
        if interval_minutes == 0 {
            log::info!("🧹 自动清理已禁用");
            return None;
        }
        let interval = Duration::from_secs(u64::from(interval_minutes) * 60);
        Some(Self::spawn_with_interval(interval, on_tick))
    }

    pub(crate) fn spawn_with_interval<F>(interval: Duration, on_tick: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // 第一次 tick 立即完成，对应启动时的初次清扫
                ticker.tick().await;
                on_tick();
            }
        });
        log::info!("🧹 自动清理已启动，间隔 {} 分钟", interval.as_secs() / 60);
        Self { interval, handle }
    }

    /// 清扫间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for SweepTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn zero_interval_schedules_nothing() {
        let (count, on_tick) = counter();
        assert!(SweepTimer::spawn(0, on_tick).is_none());
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_immediately_then_every_interval() {
        let (count, on_tick) = counter();
        let timer = SweepTimer::spawn(60, on_tick).expect("timer should start");
        assert_eq!(timer.interval(), Duration::from_secs(3600));

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "initial sweep at startup");

        time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        drop(timer);
        time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2, "dropped timer must stop ticking");
    }
}
