//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use crate::transport::ReturnCode;
use thiserror::Error;

/// The primary error type for the connection lifecycle library.
/// 连接生命周期库的主要错误类型。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// `start` was called while a transport handle still exists.
    /// 在传输句柄仍然存在时调用了 `start`。
    #[error("transport handle already exists, close the connection before starting it again")]
    HandleExists,

    /// The operation needs a transport handle but the connection has none.
    /// 操作需要传输句柄，但连接没有句柄。
    #[error("no transport handle, the connection is not started")]
    NoHandle,

    /// A publish was attempted with an empty topic.
    /// 尝试使用空主题发布。
    #[error("topic is empty")]
    EmptyTopic,

    /// A publish was attempted with an empty payload.
    /// 尝试发布空载荷。
    #[error("payload is empty, topic: {0}")]
    EmptyPayload(String),

    /// A publish targeted a topic this connection never subscribed to.
    /// 发布的目标主题未被此连接订阅。
    #[error("topic is not subscribed: {0}")]
    TopicNotSubscribed(String),

    /// The transport refused to issue a request.
    /// 传输层拒绝发出请求。
    #[error("transport {op} failed, code: {code}")]
    Transport {
        /// The transport operation that failed.
        op: &'static str,
        /// The result code returned by the transport.
        code: ReturnCode,
    },

    /// The connect options are not usable.
    /// 连接选项无效。
    #[error("invalid connect options: {0}")]
    InvalidConfig(String),

    /// A restart tried to change the endpoint identity fixed by the first start.
    /// 重启尝试更改首次启动时确定的端点身份。
    #[error("endpoint identity cannot change after the first start")]
    IdentityMismatch,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        let kind = match err {
            Error::HandleExists => ErrorKind::AlreadyExists,
            Error::NoHandle => ErrorKind::NotConnected,
            Error::EmptyTopic | Error::EmptyPayload(_) | Error::InvalidConfig(_) => {
                ErrorKind::InvalidInput
            }
            Error::TopicNotSubscribed(_) => ErrorKind::PermissionDenied,
            Error::Transport { .. } => ErrorKind::Other,
            Error::IdentityMismatch => ErrorKind::InvalidInput,
        };
        std::io::Error::new(kind, err)
    }
}
