//! 时间轮定时器引擎
//! Timing wheel timer engine
//!
//! 固定数量的槽位组成一个环，每个槽位覆盖 `slot_interval` 的时间。
//! 刻度时钟每个间隔推进一次指针并处理新槽位；超过一圈的延迟通过剩余
//! 圈数表示。插入和删除都只锁定单个槽位。
//!
//! A fixed ring of slots, each covering `slot_interval` of time. The tick
//! clock advances the pointer once per interval and processes the new slot;
//! delays longer than one revolution are expressed as remaining rounds.
//! Insertion and removal only ever lock a single slot.

mod core;
mod entry;
mod stats;

pub use entry::TimerEntryId;
pub use stats::WheelStats;

use crate::timer::TimerContainer;
use crate::timer::callback::{Callback, panic_message};
use crate::timer::dispatch::{
    DEFAULT_POOL_QUEUE_CAPACITY, DispatchStrategy, InlineDispatch, PoolDispatch, SpawnDispatch,
};
use crate::timer::handle::{EntryControl, Ticker, Timer};
use self::core::WheelCore;
use self::entry::WheelShared;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info};

/// 时间轮定时器容器
/// Timing wheel timer container
///
/// 丢弃容器等同于调用 [`TimerContainer::shutdown`]。
/// Dropping the container is equivalent to [`TimerContainer::shutdown`].
pub struct TimerWheel {
    core: Arc<WheelCore>,
    shutdown_tx: watch::Sender<bool>,
}

impl TimerWheel {
    /// 在当前 tokio 运行时上创建时间轮并启动刻度时钟
    /// Create a timing wheel on the current tokio runtime and start its tick clock
    ///
    /// # Panics
    /// 不在 tokio 运行时中调用，或 `slot_count`、`slot_interval` 为零时 panic。
    /// Panics outside a tokio runtime or if `slot_count` or `slot_interval` is zero.
    pub fn new(
        slot_count: usize,
        slot_interval: Duration,
        dispatcher: Arc<dyn DispatchStrategy>,
    ) -> Self {
        Self::with_runtime(slot_count, slot_interval, dispatcher, Handle::current())
    }

    /// 在指定运行时上创建时间轮
    /// Create a timing wheel on the given runtime
    pub fn with_runtime(
        slot_count: usize,
        slot_interval: Duration,
        dispatcher: Arc<dyn DispatchStrategy>,
        runtime: Handle,
    ) -> Self {
        let core = Arc::new(WheelCore::new(slot_count, slot_interval, dispatcher));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        runtime.spawn(drive(core.clone(), shutdown_rx));
        Self { core, shutdown_tx }
    }

    /// 同步分发的时间轮：回调在刻度任务上直接执行
    /// Timing wheel with synchronous dispatch: callbacks run on the tick task
    pub fn new_sync(slot_count: usize, slot_interval: Duration) -> Self {
        Self::new(slot_count, slot_interval, Arc::new(InlineDispatch))
    }

    /// 异步分发的时间轮：每次触发启动一个新任务
    /// Timing wheel spawning one task per firing
    pub fn new_async(slot_count: usize, slot_interval: Duration) -> Self {
        Self::new(
            slot_count,
            slot_interval,
            Arc::new(SpawnDispatch::new(Handle::current())),
        )
    }

    /// 通过工作池执行回调的时间轮
    /// Timing wheel executing callbacks through a worker pool
    pub fn new_pooled(slot_count: usize, slot_interval: Duration, pool_size: usize) -> Self {
        let pool = PoolDispatch::new(pool_size, DEFAULT_POOL_QUEUE_CAPACITY, Handle::current());
        Self::new(slot_count, slot_interval, Arc::new(pool))
    }

    /// 获取统计信息
    /// Get statistics
    pub fn stats(&self) -> WheelStats {
        self.core.stats()
    }

    fn add(&self, delay: Duration, callback: Callback, recurring: bool) -> Arc<WheelControl> {
        let shared = self.core.schedule(delay, callback, recurring);
        Arc::new(WheelControl {
            core: self.core.clone(),
            shared,
        })
    }
}

impl TimerContainer for TimerWheel {
    fn set_timer(&self, delay: Duration, callback: Callback) -> Timer {
        Timer::new(self.add(delay, callback, false))
    }

    /// 周期至少为一个槽位间隔
    /// The effective period is at least one slot interval
    fn set_ticker(&self, period: Duration, callback: Callback) -> Ticker {
        Ticker::new(self.add(period, callback, true))
    }

    fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Timing wheel shutdown requested");
        }
    }
}

/// 时间轮条目的控制端
/// Control side of one wheel entry
struct WheelControl {
    core: Arc<WheelCore>,
    shared: Arc<WheelShared>,
}

impl EntryControl for WheelControl {
    fn stop(&self) {
        self.core.cancel(&self.shared);
    }

    fn reset(&self, delay: Duration) {
        self.core.reschedule(&self.shared, delay);
    }
}

/// 刻度时钟：每个槽位间隔推进一次，直到收到关闭信号
/// Tick clock: advances once per slot interval until shutdown is signalled
async fn drive(core: Arc<WheelCore>, mut shutdown_rx: watch::Receiver<bool>) {
    let interval = core.slot_interval();
    info!(
        slots = core.slot_count(),
        interval_ms = interval.as_millis(),
        dispatch = core.dispatcher_name(),
        "Timing wheel started"
    );

    let mut clock = interval_at(Instant::now() + interval, interval);
    // 落后时补齐错过的刻度，保持指针与墙钟对齐
    // Catch up on missed ticks so the pointer stays aligned with the clock
    clock.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            _ = clock.tick() => {
                if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| core.tick())) {
                    let panics = core.counters.record_panic();
                    error!(
                        panics,
                        message = %panic_message(payload.as_ref()),
                        "Timing wheel tick panicked, continuing with next tick"
                    );
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    let discarded = core.clear();
    info!(discarded, "Timing wheel shutdown completed");
}
