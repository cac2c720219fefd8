//! 时间轮统计信息
//! Timing wheel statistics
//!
//! 仅用于诊断，与正确性无关。
//! Diagnostic only, not required for correctness.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// 时间轮统计信息
/// Timing wheel statistics
#[derive(Debug, Clone)]
pub struct WheelStats {
    /// 总槽位数
    /// Total number of slots
    pub total_slots: usize,
    /// 槽位持续时间
    /// Slot duration
    pub slot_interval: Duration,
    /// 当前槽位
    /// Current slot
    pub current_slot: usize,
    /// 所有槽位中的条目数
    /// Entries across all slots
    pub pending: usize,
    /// 已执行的刻度数
    /// Ticks processed so far
    pub ticks: u64,
    /// 最长单次刻度处理时间
    /// Longest single tick processing time
    pub longest_tick: Duration,
    /// 刻度处理总时间
    /// Total tick processing time
    pub total_tick_time: Duration,
    /// 刻度扫描时观察到的最长槽位长度
    /// Longest slot length observed by a tick scan
    pub longest_slot_len: usize,
    /// 发生 panic 的刻度数
    /// Ticks that panicked
    pub tick_panics: u64,
}

impl WheelStats {
    /// 平均刻度处理时间
    /// Average tick processing time
    pub fn average_tick(&self) -> Duration {
        if self.ticks == 0 {
            return Duration::ZERO;
        }
        let average = self.total_tick_time.as_nanos() / self.ticks as u128;
        Duration::from_nanos(average.min(u64::MAX as u128) as u64)
    }
}

impl std::fmt::Display for WheelStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WheelStats {{ slots: {}, interval: {:?}, current: {}, pending: {}, ticks: {}, longest_tick: {:?}, avg_tick: {:?}, longest_slot: {}, panics: {} }}",
            self.total_slots,
            self.slot_interval,
            self.current_slot,
            self.pending,
            self.ticks,
            self.longest_tick,
            self.average_tick(),
            self.longest_slot_len,
            self.tick_panics
        )
    }
}

/// 刻度循环写入的计数器
/// Counters written by the tick loop
#[derive(Debug, Default)]
pub(crate) struct WheelCounters {
    pub(crate) ticks: AtomicU64,
    pub(crate) longest_tick_nanos: AtomicU64,
    pub(crate) total_tick_nanos: AtomicU64,
    pub(crate) longest_slot_len: AtomicUsize,
    pub(crate) tick_panics: AtomicU64,
}

impl WheelCounters {
    pub(crate) fn record_tick(&self, elapsed: Duration) {
        let nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.total_tick_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.longest_tick_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    pub(crate) fn record_slot_len(&self, len: usize) {
        self.longest_slot_len.fetch_max(len, Ordering::Relaxed);
    }

    pub(crate) fn record_panic(&self) -> u64 {
        self.tick_panics.fetch_add(1, Ordering::Relaxed) + 1
    }
}
