#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the timer scheduling library.
//! 定时器调度库的根。

pub mod config;
pub mod error;
pub mod timer;

pub use config::{DispatchConfig, EngineConfig, TimerConfig};
pub use error::{Result, TimerError};
pub use timer::{Callback, HeapTimer, Ticker, Timer, TimerContainer, TimerWheel};
