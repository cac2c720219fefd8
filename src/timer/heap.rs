//! 最小堆定时器引擎
//! Min-heap timer engine
//!
//! 按绝对触发时刻排序的二叉最小堆，由单个循环任务独占。所有修改经由添加、
//! 修改、删除三个通道到达（actor 模型）：插入 O(log n)，取消通过纪元墓碑
//! O(1) 完成。
//!
//! A binary min-heap ordered by absolute trigger instant, owned exclusively by
//! one loop task. Every mutation arrives through the add, modify and remove
//! channels (actor model): O(log n) insert, O(1) cancellation through epoch
//! tombstones.

mod commands;
mod entry;
mod event_loop;

#[cfg(test)]
mod tests;

pub use commands::HeapStats;

use crate::timer::callback::Callback;
use crate::timer::dispatch::{
    DEFAULT_POOL_QUEUE_CAPACITY, DispatchStrategy, InlineDispatch, PoolDispatch, SpawnDispatch,
};
use crate::timer::handle::{Ticker, Timer};
use crate::timer::TimerContainer;
use commands::{AddRequest, HeapControl, HeapCounters, HeapMailbox};
use entry::HeapEntry;
use event_loop::HeapLoop;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::info;

/// 默认的命令通道容量
/// Default command channel capacity
pub const DEFAULT_COMMAND_CAPACITY: usize = 1024;

/// 堆为空时的默认闹钟间隔
/// Default alarm delay while the heap is empty
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_secs(3600);

/// 周期定时器的最小周期，零周期会使循环空转
/// Minimum ticker period; a zero period would spin the loop
pub const MIN_TICKER_PERIOD: Duration = Duration::from_millis(1);

/// 堆引擎选项
/// Heap engine options
#[derive(Debug, Clone)]
pub struct HeapOptions {
    /// 每个命令通道的容量
    /// Capacity of each command channel
    pub command_capacity: usize,
    /// 堆为空时的闹钟间隔
    /// Alarm delay while the heap is empty
    pub idle_delay: Duration,
}

impl Default for HeapOptions {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            idle_delay: DEFAULT_IDLE_DELAY,
        }
    }
}

/// 最小堆定时器容器
/// Min-heap timer container
///
/// 丢弃容器等同于调用 [`TimerContainer::shutdown`]。
/// Dropping the container is equivalent to [`TimerContainer::shutdown`].
pub struct HeapTimer {
    mailbox: HeapMailbox,
    counters: Arc<HeapCounters>,
    shutdown_tx: watch::Sender<bool>,
}

impl HeapTimer {
    /// 在当前 tokio 运行时上创建堆定时器
    /// Create a heap timer on the current tokio runtime
    ///
    /// # Panics
    /// 不在 tokio 运行时中调用，或 `command_capacity` 为零时 panic。
    /// Panics outside a tokio runtime or if `command_capacity` is zero.
    pub fn new(dispatcher: Arc<dyn DispatchStrategy>, options: HeapOptions) -> Self {
        Self::with_runtime(dispatcher, options, Handle::current())
    }

    /// 在指定运行时上创建堆定时器
    /// Create a heap timer on the given runtime
    pub fn with_runtime(
        dispatcher: Arc<dyn DispatchStrategy>,
        options: HeapOptions,
        runtime: Handle,
    ) -> Self {
        assert!(
            options.command_capacity > 0,
            "command_capacity must be positive"
        );

        let (add_tx, add_rx) = mpsc::channel(options.command_capacity);
        let (modify_tx, modify_rx) = mpsc::channel(options.command_capacity);
        let (remove_tx, remove_rx) = mpsc::channel(options.command_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(HeapCounters::default());

        let event_loop = HeapLoop::new(
            add_rx,
            modify_rx,
            remove_rx,
            shutdown_rx,
            dispatcher,
            counters.clone(),
            options.idle_delay,
        );
        runtime.spawn(event_loop.supervise());

        Self {
            mailbox: HeapMailbox {
                add_tx,
                modify_tx,
                remove_tx,
                runtime,
            },
            counters,
            shutdown_tx,
        }
    }

    /// 同步分发的堆定时器：回调在循环任务上直接执行
    /// Heap timer with synchronous dispatch: callbacks run on the loop task
    pub fn new_sync() -> Self {
        Self::new(Arc::new(InlineDispatch), HeapOptions::default())
    }

    /// 异步分发的堆定时器：每次触发启动一个新任务
    /// Heap timer spawning one task per firing
    pub fn new_async() -> Self {
        Self::new(
            Arc::new(SpawnDispatch::new(Handle::current())),
            HeapOptions::default(),
        )
    }

    /// 通过工作池执行回调的堆定时器
    /// Heap timer executing callbacks through a worker pool
    pub fn new_pooled(pool_size: usize) -> Self {
        let pool = PoolDispatch::new(pool_size, DEFAULT_POOL_QUEUE_CAPACITY, Handle::current());
        Self::new(Arc::new(pool), HeapOptions::default())
    }

    /// 获取统计信息
    /// Get statistics
    pub fn stats(&self) -> HeapStats {
        self.counters.snapshot()
    }

    fn add(&self, delay: Duration, callback: Callback, recurring: bool) -> Arc<HeapControl> {
        let entry = Arc::new(HeapEntry::new(callback, recurring));
        self.mailbox.add(AddRequest {
            entry: entry.clone(),
            delay,
            requested_at: Instant::now(),
        });
        Arc::new(HeapControl {
            entry,
            mailbox: self.mailbox.clone(),
        })
    }
}

impl TimerContainer for HeapTimer {
    fn set_timer(&self, delay: Duration, callback: Callback) -> Timer {
        Timer::new(self.add(delay, callback, false))
    }

    fn set_ticker(&self, period: Duration, callback: Callback) -> Ticker {
        Ticker::new(self.add(period.max(MIN_TICKER_PERIOD), callback, true))
    }

    fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Heap timer shutdown requested");
        }
    }
}
