//! 定时器容器模块
//! Timer Container Module
//!
//! 该模块提供两种实现同一契约的定时器引擎：基于最小堆的 actor 引擎，
//! 以及基于时间轮的分槽加锁引擎。两者共享同一套回调分发策略与句柄类型。
//!
//! This module provides two timer engines implementing the same contract:
//! an actor engine built on a min-heap, and a timing wheel engine with
//! per-slot locking. Both share the same callback dispatch strategies and
//! handle types.

pub mod callback;
pub mod dispatch;
pub mod handle;
pub mod heap;
pub mod wheel;

mod mailbox;


use std::time::Duration;

pub use callback::Callback;
pub use dispatch::{DispatchStrategy, InlineDispatch, PoolDispatch, SpawnDispatch};
pub use handle::{Ticker, Timer};
pub use heap::{HeapOptions, HeapStats, HeapTimer};
pub use wheel::{TimerWheel, WheelStats};

/// 定时器容器契约
/// Timer container contract
///
/// 所有调度操作都立即返回；条目由引擎异步调度。
/// Every scheduling operation returns immediately; the entry is scheduled
/// asynchronously by the engine.
pub trait TimerContainer: Send + Sync {
    /// 设置一次性执行的定时器
    /// Schedule `callback` to run once, `delay` from now
    fn set_timer(&self, delay: Duration, callback: Callback) -> Timer;

    /// 设置定期执行的定时器
    /// Schedule `callback` to run every `period` until the ticker is stopped
    fn set_ticker(&self, period: Duration, callback: Callback) -> Ticker;

    /// 停止引擎，丢弃所有未触发的条目
    /// Stop the engine and discard every pending entry
    fn shutdown(&self);
}
