//! 定时器回调
//! Timer callback

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::warn;

/// 可共享的零参数回调
/// Shareable zero-argument callback
///
/// 调用方拥有闭包，引擎只负责克隆和调用。周期定时器会多次调用同一个回调，
/// 因此要求 `Fn` 而不是 `FnOnce`。
///
/// The caller owns the closure; engines only clone and invoke it. Tickers
/// invoke the same callback many times, hence `Fn` rather than `FnOnce`.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn() + Send + Sync + 'static>);

impl Callback {
    /// 从闭包创建回调
    /// Create a callback from a closure
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// 调用回调并捕获其中的 panic，返回是否正常完成
    /// Invoke the callback, catching any panic. Returns whether it completed normally.
    pub fn invoke(&self) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.0)())) {
            Ok(()) => true,
            Err(payload) => {
                warn!(panic = %panic_message(payload.as_ref()), "Timer callback panicked");
                false
            }
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("callback", &"<closure>")
            .finish()
    }
}

/// 提取 panic 载荷中的文本信息
/// Extract the text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_invoke_runs_closure() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let callback = Callback::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(callback.invoke());
        assert!(callback.clone().invoke());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invoke_contains_panic() {
        let callback = Callback::new(|| panic!("boom"));
        assert!(!callback.invoke());
        // 仍然可以再次调用
        assert!(!callback.invoke());
    }

    #[test]
    fn test_panic_message_variants() {
        let static_payload: Box<dyn std::any::Any + Send> = Box::new("static");
        let owned_payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let other_payload: Box<dyn std::any::Any + Send> = Box::new(42u32);

        assert_eq!(panic_message(static_payload.as_ref()), "static");
        assert_eq!(panic_message(owned_payload.as_ref()), "owned");
        assert_eq!(panic_message(other_payload.as_ref()), "<non-string panic payload>");
    }
}
