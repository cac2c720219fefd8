//! 时间轮定时器条目实现
//! Timer entry implementation for timing wheel

use crate::timer::callback::Callback;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// 定时器条目ID，用于在槽位中唯一标识定时器条目
/// Timer entry ID, used to uniquely identify timer entries within a slot
pub type TimerEntryId = u64;

/// 条目当前不在任何槽位中
/// The entry is currently not linked into any slot
pub(crate) const UNLINKED: usize = usize::MAX;

/// 句柄与时间轮共享的条目状态
/// Entry state shared by the handle and the wheel
#[derive(Debug)]
pub(crate) struct WheelShared {
    pub(crate) id: TimerEntryId,
    pub(crate) callback: Callback,
    pub(crate) recurring: bool,
    /// 已被停止；重新插入后会检查该标志
    /// Stopped; checked again after every insert
    pub(crate) cancelled: AtomicBool,
    /// 指向所在槽位的反向引用，配合条目ID实现 O(1) 删除
    /// Back-reference to the owning slot; together with the id it gives O(1) removal
    pub(crate) slot: AtomicUsize,
    /// 串行化同一句柄上的停止与重置
    /// Serializes stop and reset issued through the same handle
    pub(crate) control: Mutex<()>,
}

impl WheelShared {
    pub(crate) fn new(id: TimerEntryId, callback: Callback, recurring: bool) -> Self {
        Self {
            id,
            callback,
            recurring,
            cancelled: AtomicBool::new(false),
            slot: AtomicUsize::new(UNLINKED),
            control: Mutex::new(()),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 槽位中的定时器条目
/// Timer entry resident in a slot
#[derive(Debug)]
pub(crate) struct WheelEntry {
    /// 还需转过的整圈数
    /// Full revolutions still to wait
    pub(crate) rounds: usize,
    /// 配置的周期，周期触发后据此重新放置
    /// Configured period, used to re-place the entry after a recurring firing
    pub(crate) period: Duration,
    pub(crate) shared: Arc<WheelShared>,
}

impl WheelEntry {
    pub(crate) fn new(shared: Arc<WheelShared>, period: Duration) -> Self {
        Self {
            rounds: 0,
            period,
            shared,
        }
    }
}

/// 计算条目放置位置，返回 `(rounds, slot)`
/// Compute the placement of an entry, returning `(rounds, slot)`
///
/// `ticks = max(1, floor(delay / interval))` 个刻度之后到期；条目放在
/// `(pointer + ticks) mod slot_count` 槽位，并额外等待
/// `(ticks - 1) / slot_count` 整圈。整圈倍数的延迟因此恰好在第
/// `ticks` 个刻度触发，而不是多等一圈。
///
/// The entry is due `ticks = max(1, floor(delay / interval))` ticks from now.
/// It goes into slot `(pointer + ticks) mod slot_count` and waits
/// `(ticks - 1) / slot_count` extra revolutions, so a delay that is an exact
/// multiple of a revolution fires on tick `ticks` rather than one revolution late.
pub(crate) fn placement(
    delay: Duration,
    interval: Duration,
    slot_count: usize,
    pointer: usize,
) -> (usize, usize) {
    let slot_count_wide = slot_count as u128;
    let ticks = (delay.as_nanos() / interval.as_nanos()).max(1);
    let rounds = ((ticks - 1) / slot_count_wide).min(usize::MAX as u128) as usize;
    let offset = (ticks % slot_count_wide) as usize;
    let slot = (pointer % slot_count + offset) % slot_count;
    (rounds, slot)
}
