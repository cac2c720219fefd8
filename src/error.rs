//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the timer scheduling library.
/// 定时器调度库的主要错误类型。
#[derive(Debug, Error)]
pub enum TimerError {
    /// A timing wheel was configured without any slots.
    /// 时间轮被配置为没有任何槽位。
    #[error("timing wheel slot count must be positive")]
    ZeroSlotCount,

    /// A timing wheel was configured with a zero slot interval.
    /// 时间轮的槽位间隔被配置为零。
    #[error("timing wheel slot interval must be positive")]
    ZeroSlotInterval,

    /// A bounded worker pool was configured without workers.
    /// 有界工作池被配置为没有任何工作者。
    #[error("dispatch pool needs at least one worker")]
    EmptyPool,

    /// A bounded channel was configured with zero capacity.
    /// The payload names the channel.
    ///
    /// 有界通道的容量被配置为零，载荷为通道名称。
    #[error("{0} capacity must be positive")]
    ZeroCapacity(&'static str),

    /// The heap loop was configured with a zero idle alarm delay.
    /// 堆循环的空闲闹钟间隔被配置为零。
    #[error("heap idle delay must be positive")]
    ZeroIdleDelay,

    /// Engines spawn their loops onto a tokio runtime; none was running.
    /// 引擎需要在tokio运行时上启动循环，但当前没有运行时。
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, TimerError>;
