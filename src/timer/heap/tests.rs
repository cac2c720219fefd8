//! 堆定时器测试
//! Heap timer tests

use super::*;
use crate::timer::dispatch::InlineDispatch;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Duration, Instant, sleep};

fn counter() -> (Arc<AtomicUsize>, Callback) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let callback = Callback::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    (count, callback)
}

fn recorder() -> (Arc<Mutex<Vec<Instant>>>, Callback) {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let f = fired.clone();
    let callback = Callback::new(move || {
        f.lock().push(Instant::now());
    });
    (fired, callback)
}

/// 第 `fail_at` 次分发时 panic，其余调用同步执行
/// Panics on dispatch number `fail_at`, runs every other callback inline
struct FaultyDispatch {
    calls: AtomicUsize,
    fail_at: usize,
}

impl FaultyDispatch {
    fn failing_at(fail_at: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_at,
        })
    }
}

impl DispatchStrategy for FaultyDispatch {
    fn dispatch(&self, callback: Callback) {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
            panic!("dispatch fault");
        }
        callback.invoke();
    }

    fn name(&self) -> &'static str {
        "faulty"
    }
}

#[tokio::test(start_paused = true)]
async fn test_timer_fires_exactly_once() {
    let timer = HeapTimer::new_sync();
    let (fired, callback) = recorder();
    let start = Instant::now();

    timer.set_timer(Duration::from_millis(50), callback);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(fired.lock().len(), 1);
    assert!(fired.lock()[0] - start >= Duration::from_millis(50));

    sleep(Duration::from_millis(500)).await;
    assert_eq!(fired.lock().len(), 1);
    assert_eq!(timer.stats().fired, 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_delay_timer_fires() {
    let timer = HeapTimer::new_sync();
    let (count, callback) = counter();

    timer.set_timer(Duration::ZERO, callback);

    sleep(Duration::from_millis(1)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_prevents_firing() {
    let timer = HeapTimer::new_sync();
    let (count, callback) = counter();

    let handle = timer.set_timer(Duration::from_secs(1), callback);
    handle.stop();
    // 重复停止没有效果
    handle.stop();

    sleep(Duration::from_millis(1200)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    let stats = timer.stats();
    assert_eq!(stats.fired, 0);
    assert_eq!(stats.discarded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_after_fire_is_noop() {
    let timer = HeapTimer::new_sync();
    let (count, callback) = counter();

    let handle = timer.set_timer(Duration::from_millis(10), callback);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    handle.stop();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_measures_from_call_time() {
    let timer = HeapTimer::new_sync();
    let (fired, callback) = recorder();

    let handle = timer.set_timer(Duration::from_millis(100), callback);
    sleep(Duration::from_millis(80)).await;

    let reset_at = Instant::now();
    handle.reset(Duration::from_millis(100));

    // 原始的 100ms 已经过去，但不应触发
    sleep(Duration::from_millis(50)).await;
    assert!(fired.lock().is_empty());

    sleep(Duration::from_millis(60)).await;
    let fired = fired.lock();
    assert_eq!(fired.len(), 1);
    let elapsed = fired[0] - reset_at;
    assert!(elapsed >= Duration::from_millis(100), "fired after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(110), "fired after {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_reset_shortens_delay() {
    let timer = HeapTimer::new_sync();
    let (count, callback) = counter();

    let handle = timer.set_timer(Duration::from_secs(10), callback);
    handle.reset(Duration::from_millis(30));

    sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // 原始的10秒节点已是墓碑
    sleep(Duration::from_secs(11)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_after_fire_rearms() {
    let timer = HeapTimer::new_sync();
    let (count, callback) = counter();

    let handle = timer.set_timer(Duration::from_millis(10), callback);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    handle.reset(Duration::from_millis(10));
    sleep(Duration::from_millis(20)).await;
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_last_control_operation_wins() {
    let timer = HeapTimer::new_sync();

    // 重置后立即停止：不触发
    let (stopped_count, callback) = counter();
    let stopped = timer.set_timer(Duration::from_millis(20), callback);
    stopped.reset(Duration::from_millis(30));
    stopped.stop();

    // 停止后立即重置：照常触发
    let (revived_count, callback) = counter();
    let revived = timer.set_timer(Duration::from_millis(20), callback);
    revived.stop();
    revived.reset(Duration::from_millis(30));

    sleep(Duration::from_millis(100)).await;
    assert_eq!(stopped_count.load(Ordering::SeqCst), 0);
    assert_eq!(revived_count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_repeats_until_stopped() {
    let timer = HeapTimer::new_sync();
    let (count, callback) = counter();

    let ticker = timer.set_ticker(Duration::from_millis(20), callback);
    sleep(Duration::from_millis(205)).await;
    ticker.stop();

    let fired = count.load(Ordering::SeqCst);
    assert!((9..=11).contains(&fired), "ticker fired {} times", fired);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), fired);
}

#[tokio::test(start_paused = true)]
async fn test_zero_period_ticker_is_clamped() {
    let timer = HeapTimer::new_sync();
    let (count, callback) = counter();

    let ticker = timer.set_ticker(Duration::ZERO, callback);
    sleep(Duration::from_millis(10)).await;
    ticker.stop();

    let fired = count.load(Ordering::SeqCst);
    assert!((9..=11).contains(&fired), "ticker fired {} times", fired);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_keeps_timer() {
    let timer = HeapTimer::new_sync();
    let (count, callback) = counter();

    drop(timer.set_timer(Duration::from_millis(10), callback));

    sleep(Duration::from_millis(20)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_pending() {
    let timer = HeapTimer::new_sync();
    let (count, callback) = counter();

    let handle = timer.set_timer(Duration::from_millis(50), callback);
    sleep(Duration::from_millis(1)).await;
    timer.shutdown();

    sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    // 关闭后的控制操作被静默忽略
    handle.reset(Duration::from_millis(10));
    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn test_loop_restarts_after_internal_panic() {
    let timer = HeapTimer::new(FaultyDispatch::failing_at(1), HeapOptions::default());
    let (first_count, first) = counter();
    let (second_count, second) = counter();

    timer.set_timer(Duration::from_millis(10), first);
    timer.set_timer(Duration::from_millis(50), second);

    sleep(Duration::from_millis(100)).await;

    // 第一次分发时 panic，条目已弹出而丢失；其余条目在重启后保留
    assert_eq!(first_count.load(Ordering::SeqCst), 0);
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
    assert_eq!(timer.stats().restarts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_survives_restart_in_same_pass() {
    let timer = HeapTimer::new(FaultyDispatch::failing_at(2), HeapOptions::default());
    let (ticks, ticker_callback) = counter();
    let (_, timer_callback) = counter();

    // 同一触发时刻：周期定时器先弹出并分发，随后的一次性定时器分发时 panic
    let ticker = timer.set_ticker(Duration::from_millis(10), ticker_callback);
    timer.set_timer(Duration::from_millis(10), timer_callback);

    sleep(Duration::from_millis(105)).await;
    ticker.stop();

    let fired = ticks.load(Ordering::SeqCst);
    assert!((9..=11).contains(&fired), "ticker fired {} times", fired);

    let stats = timer.stats();
    assert_eq!(stats.restarts, 1);
    assert_eq!(stats.fired, fired as u64);
    assert_eq!(stats.pending, 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_callback_does_not_stop_loop() {
    let timer = HeapTimer::new_sync();
    let (count, callback) = counter();

    timer.set_timer(Duration::from_millis(10), Callback::new(|| panic!("user failure")));
    timer.set_timer(Duration::from_millis(20), callback);

    sleep(Duration::from_millis(30)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(timer.stats().restarts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fires_in_trigger_order_under_concurrent_adds() {
    let timer = Arc::new(HeapTimer::new(Arc::new(InlineDispatch), HeapOptions::default()));
    let fired: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 25;

    let mut producers = Vec::new();
    for _ in 0..PRODUCERS {
        let timer = timer.clone();
        let fired = fired.clone();
        producers.push(tokio::spawn(async move {
            for _ in 0..PER_PRODUCER {
                let delay = Duration::from_millis(rand::rng().random_range(0..100));
                // 虚拟时间在两次 await 之间不前进，与循环计算触发时刻所用的请求时刻相同
                let trigger = Instant::now() + delay;
                let fired = fired.clone();
                timer.set_timer(
                    delay,
                    Callback::new(move || {
                        fired.lock().push(trigger);
                    }),
                );
                let pause = rand::rng().random_range(0..3);
                if pause == 0 {
                    tokio::task::yield_now().await;
                } else {
                    sleep(Duration::from_millis(pause)).await;
                }
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    sleep(Duration::from_millis(300)).await;

    let fired = fired.lock();
    assert_eq!(fired.len(), PRODUCERS * PER_PRODUCER);
    for pair in fired.windows(2) {
        assert!(pair[0] <= pair[1], "fired out of trigger order");
    }
    assert_eq!(timer.stats().fired, (PRODUCERS * PER_PRODUCER) as u64);
}
