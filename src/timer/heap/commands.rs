//! 堆定时器命令定义
//! Heap timer command definitions
//!
//! 本模块包含调用方与堆定时器循环之间的通信协议：添加、修改（重置）、
//! 删除（停止）三类请求，以及投递这些请求的邮箱和统计信息。
//!
//! This module contains the protocol between callers and the heap timer loop:
//! add, modify (reset) and remove (stop) requests, the mailbox that posts
//! them, and the statistics.

use super::entry::HeapEntry;
use crate::timer::handle::EntryControl;
use crate::timer::mailbox;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// 添加请求
/// Add request
#[derive(Debug)]
pub(crate) struct AddRequest {
    pub(crate) entry: Arc<HeapEntry>,
    pub(crate) delay: Duration,
    /// 调用方发起请求的时刻，触发时刻由此计算
    /// Instant the caller issued the request; the trigger is computed from it
    pub(crate) requested_at: Instant,
}

/// 修改（重置）请求
/// Modify (reset) request
#[derive(Debug)]
pub(crate) struct ModifyRequest {
    pub(crate) entry: Arc<HeapEntry>,
    pub(crate) epoch: u64,
    pub(crate) delay: Duration,
    pub(crate) requested_at: Instant,
}

/// 删除（停止）请求
/// Remove (stop) request
#[derive(Debug)]
pub(crate) struct RemoveRequest {
    pub(crate) entry: Arc<HeapEntry>,
    pub(crate) epoch: u64,
}

/// 调用方一侧的三个命令通道
/// The three command channels, caller side
#[derive(Debug, Clone)]
pub(crate) struct HeapMailbox {
    pub(crate) add_tx: mpsc::Sender<AddRequest>,
    pub(crate) modify_tx: mpsc::Sender<ModifyRequest>,
    pub(crate) remove_tx: mpsc::Sender<RemoveRequest>,
    pub(crate) runtime: Handle,
}

impl HeapMailbox {
    pub(crate) fn add(&self, request: AddRequest) {
        mailbox::post(&self.add_tx, &self.runtime, "heap add", request);
    }

    pub(crate) fn modify(&self, request: ModifyRequest) {
        mailbox::post(&self.modify_tx, &self.runtime, "heap modify", request);
    }

    pub(crate) fn remove(&self, request: RemoveRequest) {
        mailbox::post(&self.remove_tx, &self.runtime, "heap remove", request);
    }
}

/// 堆定时器条目的控制端
/// Control side of one heap timer entry
pub(crate) struct HeapControl {
    pub(crate) entry: Arc<HeapEntry>,
    pub(crate) mailbox: HeapMailbox,
}

impl EntryControl for HeapControl {
    fn stop(&self) {
        let epoch = self.entry.issue_epoch();
        self.mailbox.remove(RemoveRequest {
            entry: self.entry.clone(),
            epoch,
        });
    }

    fn reset(&self, delay: Duration) {
        let requested_at = Instant::now();
        let epoch = self.entry.issue_epoch();
        self.mailbox.modify(ModifyRequest {
            entry: self.entry.clone(),
            epoch,
            delay,
            requested_at,
        });
    }
}

/// 堆定时器统计信息
/// Heap timer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// 堆中的节点数（包含尚未弹出的墓碑）
    /// Nodes in the heap, including tombstones not yet popped
    pub pending: usize,
    /// 已分发的触发次数
    /// Firings handed to the dispatch strategy
    pub fired: u64,
    /// 被丢弃的已取消节点数
    /// Cancelled nodes discarded without firing
    pub discarded: u64,
    /// 循环因内部 panic 重启的次数
    /// Times the loop restarted after an internal panic
    pub restarts: u64,
}

impl std::fmt::Display for HeapStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HeapStats {{ pending: {}, fired: {}, discarded: {}, restarts: {} }}",
            self.pending, self.fired, self.discarded, self.restarts
        )
    }
}

/// 循环写、调用方读的计数器
/// Counters written by the loop and read by callers
#[derive(Debug, Default)]
pub(crate) struct HeapCounters {
    pub(crate) pending: AtomicUsize,
    pub(crate) fired: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) restarts: AtomicU64,
}

impl HeapCounters {
    pub(crate) fn snapshot(&self) -> HeapStats {
        HeapStats {
            pending: self.pending.load(Ordering::Relaxed),
            fired: self.fired.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}
