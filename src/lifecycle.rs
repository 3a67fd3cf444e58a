//! 连接生命周期守卫模块
//! Connection Lifecycle Guard Module
//!
//! 该模块提供一个原子关闭标志、生命周期状态机以及一个完成信号，
//! 使任何线程都能判断连接是否仍然存活，并让关闭者等待异步断开完成。
//!
//! This module provides an atomic closed flag, the lifecycle state machine and
//! a completion signal. Together they let any thread decide whether a
//! connection is still live, and let a closer wait for an asynchronous
//! disconnect to finish.

mod guard;
mod state;

pub use guard::LifecycleGuard;
pub use state::LifecycleState;
