//! 堆定时器条目实现
//! Heap timer entry implementation

use crate::timer::callback::Callback;
use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU64};
use std::time::Duration;
use tokio::time::Instant;

/// 句柄与循环共享的调度条目
/// Scheduled entry shared by the handle and the loop
///
/// 纪元（epoch）充当墓碑：句柄每次发出控制操作时领取一个新纪元，循环只接受
/// 比当前生效纪元更新的操作。堆中节点只有在其纪元等于生效纪元时才存活，
/// 因此取消只需 O(1) 地推进纪元，无需从堆中删除。
///
/// The epoch acts as the tombstone. Every control operation issued by a handle
/// takes a fresh epoch, and the loop only applies epochs newer than the live
/// one. A node in the heap is live only while its epoch equals the live epoch,
/// so cancelling is an O(1) epoch bump instead of a heap deletion.
#[derive(Debug)]
pub(crate) struct HeapEntry {
    pub(crate) callback: Callback,
    pub(crate) recurring: bool,
    /// 句柄侧已发出的最大纪元
    /// Highest epoch issued by the handle side
    issued_epoch: AtomicU64,
    /// 循环侧当前生效的纪元，只有循环任务写入
    /// Epoch currently in force, written only by the loop task
    live_epoch: AtomicU64,
}

impl HeapEntry {
    pub(crate) fn new(callback: Callback, recurring: bool) -> Self {
        Self {
            callback,
            recurring,
            issued_epoch: AtomicU64::new(0),
            live_epoch: AtomicU64::new(0),
        }
    }

    /// 为一次控制操作领取新纪元
    /// Take a fresh epoch for one control operation
    pub(crate) fn issue_epoch(&self) -> u64 {
        self.issued_epoch.fetch_add(1, atomic::Ordering::AcqRel) + 1
    }

    /// 应用一个纪元；若它不比生效纪元新则返回 false（过期的控制消息）
    /// Apply an epoch. Returns false for a stale control message.
    pub(crate) fn apply_epoch(&self, epoch: u64) -> bool {
        if epoch > self.live_epoch.load(atomic::Ordering::Acquire) {
            self.live_epoch.store(epoch, atomic::Ordering::Release);
            true
        } else {
            false
        }
    }

    pub(crate) fn is_live(&self, epoch: u64) -> bool {
        self.live_epoch.load(atomic::Ordering::Acquire) == epoch
    }
}

/// 无法表示的触发时刻被钳制到的远期上限（约30年）
/// Far-future cap for trigger instants that cannot be represented (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// 计算 `start` 之后 `delay` 的时刻，溢出时钳制
/// Instant `delay` after `start`, clamped on overflow
pub(crate) fn deadline_after(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// 堆中的节点
/// Node resident in the heap
#[derive(Debug)]
pub(crate) struct HeapNode {
    /// 绝对触发时刻
    /// Absolute trigger instant
    pub(crate) trigger: Instant,
    /// 周期（重置与周期触发时用于重新计算触发时刻）
    /// Period, used to recompute the trigger on reset or after a recurring firing
    pub(crate) period: Duration,
    pub(crate) epoch: u64,
    /// 插入序号，相同触发时刻按插入顺序触发
    /// Insertion sequence; equal triggers fire in insertion order
    pub(crate) seq: u64,
    pub(crate) entry: Arc<HeapEntry>,
}

impl HeapNode {
    pub(crate) fn is_live(&self) -> bool {
        self.entry.is_live(self.epoch)
    }
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.trigger == other.trigger && self.seq == other.seq
    }
}

impl Eq for HeapNode {}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // 反转比较，使 BinaryHeap 成为按最早触发排序的最小堆
        // Reversed so that BinaryHeap becomes a min-heap on the earliest trigger
        other
            .trigger
            .cmp(&self.trigger)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
