#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the pub/sub connection lifecycle library.
//! 发布/订阅连接生命周期库的根。

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod message;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use config::ConnectOptions;
pub use connection::Connection;
pub use error::{Error, Result};
pub use handler::ConnectionHandler;
pub use lifecycle::LifecycleState;
pub use message::{MessageDisposition, QoS, ReceivedMessage};
