//! 定时器句柄
//! Timer handles
//!
//! 句柄是能力而不是容器：它只引用一个已调度的条目以及其所属引擎。
//! `Stop`/`Reset` 作为控制操作交给所属引擎处理，调用方从不直接修改
//! 引擎的数据结构。丢弃句柄不会取消条目。
//!
//! A handle is a capability, not a container: it refers to exactly one
//! scheduled entry and its owning engine. `stop`/`reset` are control
//! operations handled by that engine; callers never mutate engine structures
//! directly. Dropping a handle does not cancel the entry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 引擎私有的条目控制接口
/// Engine-private control seam for one entry
pub(crate) trait EntryControl: Send + Sync + 'static {
    fn stop(&self);
    fn reset(&self, delay: Duration);
}

/// 一次性定时器句柄
/// One-shot timer handle
#[derive(Clone)]
pub struct Timer {
    control: Arc<dyn EntryControl>,
}

impl Timer {
    pub(crate) fn new(control: Arc<dyn EntryControl>) -> Self {
        Self { control }
    }

    /// 取消定时器；已经触发或已经停止时无任何效果
    /// Cancel the timer. No effect if it already fired or was already stopped.
    ///
    /// 与即将发生的触发竞争时，最多还会有一次已经交给分发策略的触发。
    /// When racing an imminent firing, at most one firing already handed to a
    /// dispatch strategy may still run.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// 重新调度：在调用时刻之后 `delay` 触发，与原始延迟无关
    /// Reschedule to fire `delay` after this call, independent of the original delay
    pub fn reset(&self, delay: Duration) {
        self.control.reset(delay);
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").finish_non_exhaustive()
    }
}

/// 周期定时器句柄
/// Recurring timer handle
///
/// 周期定时器在每次触发后由引擎隐式重置，因此只暴露 `stop`。
/// The engine re-arms a ticker after every firing, so only `stop` is exposed.
#[derive(Clone)]
pub struct Ticker {
    control: Arc<dyn EntryControl>,
}

impl Ticker {
    pub(crate) fn new(control: Arc<dyn EntryControl>) -> Self {
        Self { control }
    }

    /// 停止后续触发
    /// Stop future firings
    pub fn stop(&self) {
        self.control.stop();
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticker").finish_non_exhaustive()
    }
}
