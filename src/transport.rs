//! Transport layer abstraction for the pub/sub client.
//!
//! The transport implements the wire protocol, keep-alive, QoS delivery and
//! automatic reconnect. This module only describes its boundary: the calls the
//! lifecycle core issues, and the [`EventDispatcher`] the transport calls back
//! from its own worker threads.
//!
//! 发布/订阅客户端的传输层抽象。
//!
//! 传输层实现线路协议、保活、QoS投递和自动重连。此模块只描述其边界：
//! 生命周期核心发出的调用，以及传输层从其工作线程回调的 [`EventDispatcher`]。

pub mod binding;
pub mod loopback;

use crate::{dispatcher::EventDispatcher, message::QoS};
use bytes::Bytes;
use std::{fmt, sync::Arc, time::Duration};

pub use binding::TransportBinding;
pub use loopback::{LoopbackBroker, LoopbackTransport};

/// A non-success result code returned when the transport refuses to issue a call.
///
/// 传输层拒绝发出调用时返回的非成功结果码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnCode(pub i32);

impl ReturnCode {
    /// Generic failure.
    pub const FAILURE: ReturnCode = ReturnCode(-1);
    /// The client is not connected.
    pub const DISCONNECTED: ReturnCode = ReturnCode(-3);
    /// Bad topic or payload arguments.
    pub const BAD_ARGUMENT: ReturnCode = ReturnCode(-8);
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of issuing a transport call. `Ok` means the request was accepted for
/// asynchronous processing, not that it completed.
///
/// 发出传输调用的结果。`Ok` 表示请求已被接受，而非已完成。
pub type IssueResult = std::result::Result<(), ReturnCode>;

/// Failure details carried by asynchronous failure callbacks.
///
/// 异步失败回调携带的失败详情。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// Transport specific failure code.
    pub code: i32,
    /// Human readable description.
    pub message: String,
}

impl TransportFailure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Connect options in the shape the transport consumes.
///
/// 传输层使用的连接选项。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConnectOptions {
    pub keep_alive_interval: Duration,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub automatic_reconnect: bool,
    pub min_retry_interval: Duration,
    pub max_retry_interval: Duration,
}

/// Factory for transport handles.
///
/// 传输句柄的工厂。
pub trait Transport: Send + Sync + 'static {
    /// The per-connection handle.
    type Client: TransportClient;

    /// Creates a handle for `uri`/`client_id`.
    ///
    /// `events` is the sink the handle must call from its worker threads for
    /// connect success/failure, connection loss, message arrival, publish
    /// acknowledgement and disconnect completion.
    fn create(
        &self,
        uri: &str,
        client_id: &str,
        events: Arc<EventDispatcher>,
    ) -> std::result::Result<Self::Client, ReturnCode>;
}

/// A live transport handle. Every call only issues a request; completion is
/// reported through the [`EventDispatcher`] registered at creation.
///
/// 活动的传输句柄。每个调用只发出请求，完成情况通过注册的 [`EventDispatcher`] 报告。
pub trait TransportClient: Send + 'static {
    /// Issues an asynchronous connect.
    fn connect(&mut self, options: &TransportConnectOptions) -> IssueResult;

    /// Issues a subscribe request.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> IssueResult;

    /// Issues an unsubscribe request.
    fn unsubscribe(&mut self, topic: &str) -> IssueResult;

    /// Issues a publish. Acknowledgement arrives as `publish_acknowledged`.
    fn publish(&mut self, topic: &str, payload: Bytes, qos: QoS) -> IssueResult;

    /// Issues a disconnect. Both success and failure must end in exactly one
    /// `disconnect_completed` call.
    fn disconnect(&mut self) -> IssueResult;

    /// Releases the handle. Called exactly once per handle.
    fn destroy(self)
    where
        Self: Sized,
    {
    }
}
