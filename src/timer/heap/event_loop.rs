//! 堆定时器循环核心实现
//! Heap timer loop core implementation
//!
//! 单个任务独占最小堆，所有修改都通过通道到达，因此堆本身无需任何锁。
//! 循环体在 `catch_unwind` 中运行；内部 panic 后循环以同一份结构体状态
//! 重新进入，尚未触发的条目不会丢失。
//!
//! A single task owns the min-heap and every mutation arrives through a
//! channel, so the heap needs no lock at all. The loop body runs under
//! `catch_unwind`; after an internal panic it re-enters with the same
//! struct-level state, so pending entries are not lost.

use super::commands::{AddRequest, HeapCounters, ModifyRequest, RemoveRequest};
use super::entry::{HeapNode, deadline_after};
use crate::timer::callback::panic_message;
use crate::timer::dispatch::DispatchStrategy;
use futures::FutureExt;
use std::collections::BinaryHeap;
use std::collections::binary_heap::PeekMut;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Sleep, sleep_until};
use tracing::{debug, error, info, trace};

/// 堆定时器循环
/// Heap timer loop
pub(crate) struct HeapLoop {
    heap: BinaryHeap<HeapNode>,
    add_rx: mpsc::Receiver<AddRequest>,
    modify_rx: mpsc::Receiver<ModifyRequest>,
    remove_rx: mpsc::Receiver<RemoveRequest>,
    shutdown_rx: watch::Receiver<bool>,
    dispatcher: Arc<dyn DispatchStrategy>,
    counters: Arc<HeapCounters>,
    /// 堆为空时的闹钟间隔
    /// Alarm delay while the heap is empty
    idle_delay: Duration,
    next_seq: u64,
}

impl HeapLoop {
    pub(crate) fn new(
        add_rx: mpsc::Receiver<AddRequest>,
        modify_rx: mpsc::Receiver<ModifyRequest>,
        remove_rx: mpsc::Receiver<RemoveRequest>,
        shutdown_rx: watch::Receiver<bool>,
        dispatcher: Arc<dyn DispatchStrategy>,
        counters: Arc<HeapCounters>,
        idle_delay: Duration,
    ) -> Self {
        Self {
            heap: BinaryHeap::new(),
            add_rx,
            modify_rx,
            remove_rx,
            shutdown_rx,
            dispatcher,
            counters,
            idle_delay,
            next_seq: 0,
        }
    }

    /// 运行循环直到关闭，内部 panic 后自动重启
    /// Run until shutdown, restarting after internal panics
    pub(crate) async fn supervise(mut self) {
        info!(dispatch = self.dispatcher.name(), "Heap timer loop started");

        loop {
            match AssertUnwindSafe(self.run()).catch_unwind().await {
                Ok(()) => break,
                Err(payload) => {
                    let restarts = self.counters.restarts.fetch_add(1, Ordering::Relaxed) + 1;
                    error!(
                        panic = %panic_message(payload.as_ref()),
                        restarts,
                        pending = self.heap.len(),
                        "Heap timer loop panicked, restarting"
                    );
                }
            }
        }

        info!(discarded = self.heap.len(), "Heap timer loop shutdown completed");
    }

    /// 主循环
    /// Main loop
    async fn run(&mut self) {
        let alarm = sleep_until(self.next_deadline());
        tokio::pin!(alarm);

        loop {
            tokio::select! {
                Some(request) = self.add_rx.recv() => {
                    self.handle_add(request, alarm.as_mut());
                }
                Some(request) = self.modify_rx.recv() => {
                    self.handle_modify(request, alarm.as_mut());
                }
                Some(request) = self.remove_rx.recv() => {
                    self.handle_remove(request);
                }
                _ = &mut alarm => {}
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        debug!("Heap timer loop received shutdown");
                        return;
                    }
                }
            }

            self.fire_due(alarm.as_mut());
        }
    }

    fn handle_add(&mut self, request: AddRequest, alarm: Pin<&mut Sleep>) {
        // 在添加到达之前已被停止或重置
        // Stopped or reset before the add arrived
        if !request.entry.is_live(0) {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            trace!("Dropped add for an entry already superseded");
            return;
        }

        let node = HeapNode {
            trigger: deadline_after(request.requested_at, request.delay),
            period: request.delay,
            epoch: 0,
            seq: self.take_seq(),
            entry: request.entry,
        };
        trace!(
            delay_ms = request.delay.as_millis(),
            recurring = node.entry.recurring,
            "Timer added"
        );
        self.schedule(node, alarm);
    }

    /// 重置：推进纪元使旧节点成为墓碑，再经由添加路径插入新节点
    /// Reset: bump the epoch to tombstone the old node, then insert a fresh one via the add path
    fn handle_modify(&mut self, request: ModifyRequest, alarm: Pin<&mut Sleep>) {
        if !request.entry.apply_epoch(request.epoch) {
            trace!(epoch = request.epoch, "Ignored stale reset");
            return;
        }

        let node = HeapNode {
            trigger: deadline_after(request.requested_at, request.delay),
            period: request.delay,
            epoch: request.epoch,
            seq: self.take_seq(),
            entry: request.entry,
        };
        trace!(delay_ms = request.delay.as_millis(), "Timer reset");
        self.schedule(node, alarm);
    }

    fn handle_remove(&mut self, request: RemoveRequest) {
        if request.entry.apply_epoch(request.epoch) {
            trace!(epoch = request.epoch, "Timer cancelled");
        }
    }

    /// 插入节点；若它成为新的最小值则立即重设闹钟
    /// Insert a node, re-arming the alarm at once if it becomes the new minimum
    fn schedule(&mut self, node: HeapNode, alarm: Pin<&mut Sleep>) {
        if self.heap.peek().is_none_or(|root| node.trigger < root.trigger) {
            alarm.reset(node.trigger);
        }
        self.heap.push(node);
    }

    /// 弹出并分发所有到期节点，然后按新的堆顶重设闹钟
    /// Pop and dispatch every due node, then re-arm the alarm for the new root
    ///
    /// 周期节点在分发之前就放回堆中，计数器逐个节点更新：分发中途 panic
    /// 导致循环重启时，已弹出的周期定时器和统计都不会丢失。
    ///
    /// Recurring nodes go back into the heap before they are dispatched and the
    /// counters are updated per node, so a dispatch panic that restarts the loop
    /// loses neither the tickers already popped in this pass nor their counts.
    fn fire_due(&mut self, alarm: Pin<&mut Sleep>) {
        let now = Instant::now();
        let mut fired = 0u64;

        loop {
            let Some(root) = self.heap.peek_mut() else {
                break;
            };
            if root.trigger > now {
                break;
            }
            let node = PeekMut::pop(root);
            if !node.is_live() {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                self.counters.pending.store(self.heap.len(), Ordering::Relaxed);
                continue;
            }

            let callback = node.entry.callback.clone();
            if node.entry.recurring {
                let rearmed = HeapNode {
                    trigger: deadline_after(now, node.period),
                    seq: self.take_seq(),
                    ..node
                };
                self.heap.push(rearmed);
            }
            self.counters.pending.store(self.heap.len(), Ordering::Relaxed);

            self.dispatcher.dispatch(callback);
            self.counters.fired.fetch_add(1, Ordering::Relaxed);
            fired += 1;
        }

        if fired > 1 {
            debug!(fired, "Batch fired expired timers");
        }
        self.counters.pending.store(self.heap.len(), Ordering::Relaxed);

        alarm.reset(self.next_deadline());
    }

    fn next_deadline(&self) -> Instant {
        match self.heap.peek() {
            Some(root) => root.trigger,
            None => deadline_after(Instant::now(), self.idle_delay),
        }
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}
