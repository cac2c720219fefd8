//! 非阻塞投递
//! Non-blocking post
//!
//! 先尝试 `try_send`；通道满时交给一个临时任务执行等待式发送，
//! 调用方（包括引擎循环自身）永远不会被阻塞。
//!
//! Tries `try_send` first; when the channel is full a temporary task performs
//! the awaiting send, so the caller (including an engine loop) never blocks.

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// 投递消息，返回接收端是否仍然存活
/// Post a message. Returns whether the receiving side was still alive.
pub(crate) fn post<T: Send + 'static>(
    tx: &mpsc::Sender<T>,
    runtime: &Handle,
    channel: &'static str,
    msg: T,
) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(msg)) => {
            trace!(channel, "Channel full, deferring send to a temporary task");
            let tx = tx.clone();
            runtime.spawn(async move {
                if tx.send(msg).await.is_err() {
                    trace!(channel, "Receiver gone before deferred send completed");
                }
            });
            true
        }
        Err(TrySendError::Closed(_)) => {
            trace!(channel, "Receiver closed, message dropped");
            false
        }
    }
}
