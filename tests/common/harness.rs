//! tests/common/harness.rs
use kestrel_scheduler::Callback;
use std::sync::{
    Arc, Once,
    atomic::{AtomicUsize, Ordering},
};
use tracing_subscriber::fmt::format::FmtSpan;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "kestrel_scheduler=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer()
            .init();
    });
}

/// A callback that counts its invocations.
pub fn counting_callback() -> (Arc<AtomicUsize>, Callback) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let callback = Callback::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    (count, callback)
}
