//! 时间轮核心实现
//! Timing wheel core implementation
//!
//! 每个槽位各自持有一把互斥锁，不存在全局锁：无关的定时器互不竞争。
//! 刻度循环是唯一推进指针的一方，并且在持有新槽位锁的同时发布指针，
//! 因此并发插入总能看到与其目标槽位一致的指针。
//!
//! Every slot owns its own mutex and there is no global lock, so unrelated
//! timers never contend. The tick loop is the only writer of the pointer and
//! publishes it while holding the new slot's lock, so a concurrent insert
//! always sees a pointer consistent with its target slot.

use crate::timer::callback::Callback;
use crate::timer::dispatch::DispatchStrategy;
use crate::timer::wheel::entry::{TimerEntryId, UNLINKED, WheelEntry, WheelShared, placement};
use crate::timer::wheel::stats::{WheelCounters, WheelStats};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

type Bucket = HashMap<TimerEntryId, WheelEntry>;

/// 时间轮实现
/// Timing wheel implementation
pub(crate) struct WheelCore {
    /// 槽位数组，每个槽位独立加锁
    /// Slot array, each slot independently locked
    slots: Box<[Mutex<Bucket>]>,
    slot_count: usize,
    /// 每个槽位的时间间隔
    /// Time interval per slot
    slot_interval: Duration,
    /// 当前指针位置，只有刻度循环写入
    /// Current pointer position, written only by the tick loop
    pointer: AtomicUsize,
    next_entry_id: AtomicU64,
    /// 刻度时钟已停止，之后的插入全部忽略
    /// The tick clock has stopped; every later insert is ignored
    stopped: AtomicBool,
    dispatcher: Arc<dyn DispatchStrategy>,
    pub(crate) counters: WheelCounters,
}

impl WheelCore {
    /// 创建新的时间轮
    /// Create new timing wheel
    ///
    /// # Panics
    /// `slot_count` 或 `slot_interval` 为零时 panic。
    /// Panics if `slot_count` or `slot_interval` is zero.
    pub(crate) fn new(
        slot_count: usize,
        slot_interval: Duration,
        dispatcher: Arc<dyn DispatchStrategy>,
    ) -> Self {
        assert!(
            slot_count > 0 && !slot_interval.is_zero(),
            "slot_count and slot_interval must be positive"
        );

        let slots = (0..slot_count)
            .map(|_| Mutex::new(Bucket::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            slot_count,
            slot_interval,
            pointer: AtomicUsize::new(0),
            next_entry_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
            dispatcher,
            counters: WheelCounters::default(),
        }
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub(crate) fn slot_interval(&self) -> Duration {
        self.slot_interval
    }

    pub(crate) fn dispatcher_name(&self) -> &'static str {
        self.dispatcher.name()
    }

    /// 创建并插入一个新条目
    /// Create and insert a new entry
    pub(crate) fn schedule(
        &self,
        delay: Duration,
        callback: Callback,
        recurring: bool,
    ) -> Arc<WheelShared> {
        let id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(WheelShared::new(id, callback, recurring));
        self.insert(WheelEntry::new(shared.clone(), delay));
        trace!(
            entry_id = id,
            delay_ms = delay.as_millis(),
            recurring,
            "Timer added to wheel"
        );
        shared
    }

    /// 在刻度锁之外插入条目，只锁目标槽位
    /// Insert an entry from outside the tick lock, locking only the target slot
    pub(crate) fn insert(&self, mut entry: WheelEntry) {
        loop {
            let pointer = self.pointer.load(Ordering::SeqCst);
            let (rounds, slot) =
                placement(entry.period, self.slot_interval, self.slot_count, pointer);
            let mut bucket = self.slots[slot].lock();
            // 刻度在计算与加锁之间推进了指针，重新计算
            // The tick advanced between placement and locking; place again
            if self.pointer.load(Ordering::SeqCst) != pointer {
                continue;
            }
            // 在槽位锁内检查：`clear` 先置位再逐个清空槽位，不会漏掉条目
            // Checked under the slot lock: `clear` sets the flag before draining
            // each slot, so no entry can slip in behind it
            if self.stopped.load(Ordering::SeqCst) {
                trace!(entry_id = entry.shared.id, "Wheel stopped, insert ignored");
                return;
            }
            entry.rounds = rounds;
            Self::link(&mut bucket, slot, entry);
            return;
        }
    }

    /// 在已持有槽位锁的情况下链接条目
    /// Link an entry while the slot lock is already held
    fn link(bucket: &mut Bucket, slot: usize, entry: WheelEntry) {
        let shared = entry.shared.clone();
        shared.slot.store(slot, Ordering::SeqCst);
        bucket.insert(shared.id, entry);
        // 停止与重新插入竞争时，由插入方负责撤回
        // When a stop races a re-insert, the inserting side backs the entry out
        if shared.is_cancelled() {
            bucket.remove(&shared.id);
            shared.slot.store(UNLINKED, Ordering::SeqCst);
        }
    }

    /// 从所在槽位移除条目，返回是否确实移除
    /// Remove an entry from its slot. Returns whether it was actually removed.
    ///
    /// 加锁后重新确认成员关系；若条目在此期间被刻度移动，则重试。
    /// Membership is re-verified under the slot lock; if a tick moved the entry
    /// in the meantime, the removal retries.
    pub(crate) fn unlink(&self, shared: &WheelShared) -> bool {
        loop {
            let slot = shared.slot.load(Ordering::SeqCst);
            if slot == UNLINKED {
                return false;
            }
            let mut bucket = self.slots[slot].lock();
            if bucket.remove(&shared.id).is_some() {
                shared.slot.store(UNLINKED, Ordering::SeqCst);
                return true;
            }
            if shared.slot.load(Ordering::SeqCst) == slot {
                // 已经触发，或正被刻度处理
                // Already fired, or in the hands of the tick
                return false;
            }
        }
    }

    /// 停止条目
    /// Stop an entry
    pub(crate) fn cancel(&self, shared: &WheelShared) {
        let _control = shared.control.lock();
        shared.cancelled.store(true, Ordering::SeqCst);
        if self.unlink(shared) {
            trace!(entry_id = shared.id, "Timer removed from wheel");
        }
    }

    /// 重置条目：移除后按新延迟重新插入
    /// Reset an entry: remove it, then insert it again with the new delay
    pub(crate) fn reschedule(&self, shared: &Arc<WheelShared>, delay: Duration) {
        let _control = shared.control.lock();
        self.unlink(shared);
        shared.cancelled.store(false, Ordering::SeqCst);
        self.insert(WheelEntry::new(shared.clone(), delay));
        trace!(
            entry_id = shared.id,
            delay_ms = delay.as_millis(),
            "Timer reset in wheel"
        );
    }

    /// 推进一个刻度并分发到期条目
    /// Advance one tick and dispatch due entries
    ///
    /// 扫描整个槽位，不会在第一个尚未到期的条目处提前退出。回调在释放
    /// 槽位锁之后才分发，回调中再次调度定时器不会死锁。
    ///
    /// The whole slot is scanned; there is no early exit at the first entry
    /// that is not yet due. Callbacks are dispatched after the slot lock is
    /// released, so a callback may schedule timers without deadlocking.
    pub(crate) fn tick(&self) {
        let started = Instant::now();
        let current = (self.pointer.load(Ordering::SeqCst) + 1) % self.slot_count;
        let mut due: Vec<Callback> = Vec::new();
        let mut deferred: Vec<WheelEntry> = Vec::new();

        {
            let mut bucket = self.slots[current].lock();
            self.pointer.store(current, Ordering::SeqCst);
            self.counters.record_slot_len(bucket.len());

            let mut expired = Vec::new();
            for (id, entry) in bucket.iter_mut() {
                if entry.rounds > 0 {
                    entry.rounds -= 1;
                } else {
                    expired.push(*id);
                }
            }

            for id in expired {
                let Some(mut entry) = bucket.remove(&id) else {
                    continue;
                };
                if entry.shared.is_cancelled() {
                    entry.shared.slot.store(UNLINKED, Ordering::SeqCst);
                    continue;
                }

                due.push(entry.shared.callback.clone());

                if !entry.shared.recurring {
                    entry.shared.slot.store(UNLINKED, Ordering::SeqCst);
                    continue;
                }

                let (rounds, slot) =
                    placement(entry.period, self.slot_interval, self.slot_count, current);
                if slot == current {
                    // 仍落在当前槽位：已持有锁，走内部链接路径
                    // Lands in the current slot again: the lock is held, use the internal link path
                    entry.rounds = rounds;
                    Self::link(&mut bucket, current, entry);
                } else {
                    deferred.push(entry);
                }
            }
        }

        for entry in deferred {
            self.insert(entry);
        }

        let fired = due.len();
        for callback in due {
            self.dispatcher.dispatch(callback);
        }

        self.counters.record_tick(started.elapsed());
        if fired > 1 {
            debug!(fired, slot = current, "Batch fired expired timers");
        } else if fired == 1 {
            trace!(slot = current, "Fired expired timer");
        }
    }

    /// 所有槽位中的条目数
    /// Entries across all slots
    pub(crate) fn pending(&self) -> usize {
        self.slots.iter().map(|slot| slot.lock().len()).sum()
    }

    /// 停止时间轮并清空所有槽位，返回丢弃的条目数
    /// Stop the wheel and clear every slot, returning how many entries were discarded
    pub(crate) fn clear(&self) -> usize {
        self.stopped.store(true, Ordering::SeqCst);
        let mut discarded = 0;
        for slot in self.slots.iter() {
            let mut bucket = slot.lock();
            discarded += bucket.len();
            for (_, entry) in bucket.drain() {
                entry.shared.slot.store(UNLINKED, Ordering::SeqCst);
            }
        }
        discarded
    }

    pub(crate) fn stats(&self) -> WheelStats {
        WheelStats {
            total_slots: self.slot_count,
            slot_interval: self.slot_interval,
            current_slot: self.pointer.load(Ordering::SeqCst),
            pending: self.pending(),
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            longest_tick: Duration::from_nanos(
                self.counters.longest_tick_nanos.load(Ordering::Relaxed),
            ),
            total_tick_time: Duration::from_nanos(
                self.counters.total_tick_nanos.load(Ordering::Relaxed),
            ),
            longest_slot_len: self.counters.longest_slot_len.load(Ordering::Relaxed),
            tick_panics: self.counters.tick_panics.load(Ordering::Relaxed),
        }
    }
}
