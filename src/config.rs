//! 定义了定时器容器的可配置参数。
//! Defines configurable parameters for timer containers.

use crate::error::{Result, TimerError};
use crate::timer::dispatch::{
    DEFAULT_POOL_QUEUE_CAPACITY, DispatchStrategy, InlineDispatch, PoolDispatch, SpawnDispatch,
};
use crate::timer::heap::{DEFAULT_COMMAND_CAPACITY, DEFAULT_IDLE_DELAY, HeapOptions};
use crate::timer::{HeapTimer, TimerContainer, TimerWheel};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// A structure containing all configurable parameters for a timer container.
///
/// 包含定时器容器所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Which engine keeps the pending entries.
    /// 保存未触发条目的引擎。
    pub engine: EngineConfig,

    /// How a due callback is executed.
    /// 到期回调的执行方式。
    pub dispatch: DispatchConfig,

    /// Capacity of each heap command channel. Ignored by the timing wheel.
    /// 堆引擎每个命令通道的容量。时间轮忽略该参数。
    pub command_capacity: usize,

    /// Alarm delay of the heap loop while no entry is pending. Ignored by the
    /// timing wheel.
    /// 堆为空时循环的闹钟间隔。时间轮忽略该参数。
    pub idle_delay: Duration,
}

/// Engine selection.
///
/// 引擎选择。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineConfig {
    /// Min-heap owned by a single loop task.
    /// 由单个循环任务独占的最小堆。
    Heap,
    /// Timing wheel with per-slot locks.
    /// 分槽加锁的时间轮。
    Wheel {
        /// Number of slots in one revolution.
        /// 一圈中的槽位数。
        slot_count: usize,
        /// Time covered by one slot; the wheel's resolution.
        /// 每个槽位覆盖的时间，即时间轮的精度。
        slot_interval: Duration,
    },
}

/// Dispatch strategy selection.
///
/// 分发策略选择。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchConfig {
    /// Run callbacks on the engine's own task.
    /// 在引擎自身的任务上运行回调。
    Sync,
    /// Spawn one task per firing.
    /// 每次触发启动一个任务。
    Async,
    /// Run callbacks on a fixed number of workers.
    /// 在固定数量的工作者上运行回调。
    Pool {
        /// Number of worker tasks.
        /// 工作任务数。
        workers: usize,
        /// Capacity of the work queue before overflow sends are deferred.
        /// 工作队列容量，超出后发送改为延迟进行。
        queue_capacity: usize,
    },
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::Heap,
            dispatch: DispatchConfig::Async,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            idle_delay: DEFAULT_IDLE_DELAY,
        }
    }
}

impl TimerConfig {
    /// Default heap engine configuration.
    /// 默认的堆引擎配置。
    pub fn heap() -> Self {
        Self::default()
    }

    /// Timing wheel configuration with the given geometry.
    /// 使用给定槽位参数的时间轮配置。
    pub fn wheel(slot_count: usize, slot_interval: Duration) -> Self {
        Self {
            engine: EngineConfig::Wheel {
                slot_count,
                slot_interval,
            },
            ..Self::default()
        }
    }

    /// Replace the dispatch strategy.
    /// 替换分发策略。
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Check every parameter an engine constructor would otherwise reject.
    /// 检查所有会被引擎构造函数拒绝的参数。
    pub fn validate(&self) -> Result<()> {
        if let EngineConfig::Wheel {
            slot_count,
            slot_interval,
        } = self.engine
        {
            if slot_count == 0 {
                return Err(TimerError::ZeroSlotCount);
            }
            if slot_interval.is_zero() {
                return Err(TimerError::ZeroSlotInterval);
            }
        }

        if let DispatchConfig::Pool {
            workers,
            queue_capacity,
        } = self.dispatch
        {
            if workers == 0 {
                return Err(TimerError::EmptyPool);
            }
            if queue_capacity == 0 {
                return Err(TimerError::ZeroCapacity("dispatch pool queue"));
            }
        }

        if self.command_capacity == 0 {
            return Err(TimerError::ZeroCapacity("heap command channel"));
        }
        if self.idle_delay.is_zero() {
            return Err(TimerError::ZeroIdleDelay);
        }
        Ok(())
    }

    /// Validate the configuration and start the selected engine on the
    /// current tokio runtime.
    ///
    /// 校验配置并在当前 tokio 运行时上启动所选引擎。
    pub fn build(&self) -> Result<Box<dyn TimerContainer>> {
        self.validate()?;
        let runtime = Handle::try_current()?;
        let dispatcher = self.dispatch.build(&runtime);

        let container: Box<dyn TimerContainer> = match self.engine {
            EngineConfig::Heap => Box::new(HeapTimer::with_runtime(
                dispatcher,
                HeapOptions {
                    command_capacity: self.command_capacity,
                    idle_delay: self.idle_delay,
                },
                runtime,
            )),
            EngineConfig::Wheel {
                slot_count,
                slot_interval,
            } => Box::new(TimerWheel::with_runtime(
                slot_count,
                slot_interval,
                dispatcher,
                runtime,
            )),
        };
        Ok(container)
    }
}

impl DispatchConfig {
    /// Bounded pool with the default queue capacity.
    /// 使用默认队列容量的有界池。
    pub fn pool(workers: usize) -> Self {
        DispatchConfig::Pool {
            workers,
            queue_capacity: DEFAULT_POOL_QUEUE_CAPACITY,
        }
    }

    /// Create the strategy on the given runtime.
    ///
    /// 在给定运行时上创建分发策略。
    ///
    /// # Panics
    /// Panics on a pool without workers or queue capacity; call
    /// [`TimerConfig::validate`] first.
    pub fn build(&self, runtime: &Handle) -> Arc<dyn DispatchStrategy> {
        match *self {
            DispatchConfig::Sync => Arc::new(InlineDispatch),
            DispatchConfig::Async => Arc::new(SpawnDispatch::new(runtime.clone())),
            DispatchConfig::Pool {
                workers,
                queue_capacity,
            } => Arc::new(PoolDispatch::new(workers, queue_capacity, runtime.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::Callback;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_config() {
        let config = TimerConfig::default();
        assert_eq!(config.engine, EngineConfig::Heap);
        assert_eq!(config.dispatch, DispatchConfig::Async);
        assert_eq!(config.command_capacity, 1024);
        assert_eq!(config.idle_delay, Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_wheel() {
        let err = TimerConfig::wheel(0, Duration::from_millis(10))
            .validate()
            .unwrap_err();
        assert!(matches!(err, TimerError::ZeroSlotCount));

        let err = TimerConfig::wheel(8, Duration::ZERO).validate().unwrap_err();
        assert!(matches!(err, TimerError::ZeroSlotInterval));
    }

    #[test]
    fn test_validate_rejects_bad_pool() {
        let err = TimerConfig::heap()
            .with_dispatch(DispatchConfig::pool(0))
            .validate()
            .unwrap_err();
        assert!(matches!(err, TimerError::EmptyPool));

        let err = TimerConfig::heap()
            .with_dispatch(DispatchConfig::Pool {
                workers: 2,
                queue_capacity: 0,
            })
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "dispatch pool queue capacity must be positive");
    }

    #[test]
    fn test_validate_rejects_zero_heap_parameters() {
        let config = TimerConfig {
            command_capacity: 0,
            ..TimerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TimerError::ZeroCapacity("heap command channel"))
        ));

        let config = TimerConfig {
            idle_delay: Duration::ZERO,
            ..TimerConfig::default()
        };
        assert!(matches!(config.validate(), Err(TimerError::ZeroIdleDelay)));
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = TimerConfig::heap().build();
        assert!(matches!(result, Err(TimerError::NoRuntime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_every_combination() {
        let engines = [
            TimerConfig::heap(),
            TimerConfig::wheel(16, Duration::from_millis(5)),
        ];
        let dispatches = [
            DispatchConfig::Sync,
            DispatchConfig::Async,
            DispatchConfig::pool(2),
        ];

        let count = Arc::new(AtomicUsize::new(0));
        let mut containers = Vec::new();
        for engine in &engines {
            for dispatch in &dispatches {
                let container = engine.clone().with_dispatch(dispatch.clone()).build().unwrap();
                let c = count.clone();
                container.set_timer(
                    Duration::from_millis(20),
                    Callback::new(move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    }),
                );
                containers.push(container);
            }
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), engines.len() * dispatches.len());
    }
}
