//! 回调分发策略
//! Callback dispatch strategies
//!
//! 决定到期回调如何被真正执行：在引擎循环上同步执行、每次触发启动一个
//! 新任务、或者交给有界工作池。策略在构造时注入，两种引擎共用。
//!
//! Decides how a due callback is actually executed: synchronously on the
//! engine loop, one fresh task per firing, or handed to a bounded worker
//! pool. The strategy is injected at construction and shared by both engines.

use crate::timer::callback::Callback;
use crate::timer::mailbox;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};

/// 默认的工作池队列容量
/// Default worker pool queue capacity
pub const DEFAULT_POOL_QUEUE_CAPACITY: usize = 1024;

/// 分发策略 trait
/// Dispatch strategy trait
pub trait DispatchStrategy: Send + Sync + 'static {
    /// 执行（或安排执行）一个到期回调，不得阻塞调用方
    /// Execute, or arrange execution of, a due callback without blocking the caller
    fn dispatch(&self, callback: Callback);

    /// 策略名称，用于日志
    /// Strategy name, used for logging
    fn name(&self) -> &'static str;
}

/// 同步分发：回调直接在引擎循环上执行
/// Synchronous dispatch: the callback runs inline on the engine loop
///
/// 保证严格的触发顺序，但慢回调会推迟之后所有的触发。
/// Preserves strict fire order, but a slow callback delays every later firing.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatch;

impl DispatchStrategy for InlineDispatch {
    fn dispatch(&self, callback: Callback) {
        callback.invoke();
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// 异步分发：每次触发启动一个新任务
/// Fire-and-forget dispatch: one fresh task per firing
#[derive(Debug, Clone)]
pub struct SpawnDispatch {
    runtime: Handle,
}

impl SpawnDispatch {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl DispatchStrategy for SpawnDispatch {
    fn dispatch(&self, callback: Callback) {
        self.runtime.spawn(async move {
            callback.invoke();
        });
    }

    fn name(&self) -> &'static str {
        "spawn"
    }
}

/// 有界工作池分发
/// Bounded worker pool dispatch
///
/// `workers` 个常驻任务从容量固定的通道中取回调执行；通道满时由临时任务
/// 完成等待式发送，稳态并发受限，突发时仍保持活性。
///
/// `workers` long-lived tasks drain a fixed-capacity channel of pending
/// callbacks. When the channel is full a temporary task performs the awaiting
/// send, bounding steady-state concurrency while staying live under bursts.
#[derive(Debug)]
pub struct PoolDispatch {
    queue_tx: mpsc::Sender<Callback>,
    runtime: Handle,
    workers: usize,
}

impl PoolDispatch {
    /// 创建工作池并立即启动所有工作者
    /// Create the pool and start every worker
    ///
    /// # Panics
    /// `workers` 或 `queue_capacity` 为零时 panic。
    /// Panics if `workers` or `queue_capacity` is zero.
    pub fn new(workers: usize, queue_capacity: usize, runtime: Handle) -> Self {
        assert!(workers > 0, "pool needs at least one worker");
        assert!(queue_capacity > 0, "pool queue capacity must be positive");

        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        for worker_id in 0..workers {
            runtime.spawn(run_worker(worker_id, queue_rx.clone()));
        }
        debug!(workers, queue_capacity, "Dispatch pool started");

        Self {
            queue_tx,
            runtime,
            workers,
        }
    }

    /// 工作者数量
    /// Number of workers
    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl DispatchStrategy for PoolDispatch {
    fn dispatch(&self, callback: Callback) {
        mailbox::post(&self.queue_tx, &self.runtime, "dispatch pool", callback);
    }

    fn name(&self) -> &'static str {
        "pool"
    }
}

/// 工作者循环：所有发送端关闭后退出
/// Worker loop, exits once every sender is gone
async fn run_worker(worker_id: usize, queue_rx: Arc<Mutex<mpsc::Receiver<Callback>>>) {
    loop {
        let next = {
            let mut rx = queue_rx.lock().await;
            rx.recv().await
        };
        match next {
            Some(callback) => {
                callback.invoke();
            }
            None => break,
        }
    }
    trace!(worker_id, "Dispatch pool worker stopped");
}
