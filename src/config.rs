//! 定义了连接的可配置参数。
//! Defines configurable parameters for a connection.

use crate::error::{Error, Result};
use std::time::Duration;

/// A structure containing all parameters accepted by `Connection::start`.
///
/// Every field is passed through to the transport's connect options; the
/// lifecycle core itself only reads the endpoint identity.
///
/// 包含 `Connection::start` 接受的所有参数的结构体。
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// The broker URI, e.g. `tcp://localhost:1883`.
    /// 代理URI。
    pub uri: String,

    /// The client identifier presented to the broker.
    /// 提交给代理的客户端标识。
    pub client_id: String,

    /// Optional user name credential.
    /// 可选的用户名。
    pub username: Option<String>,

    /// Optional password credential.
    /// 可选的密码。
    pub password: Option<String>,

    /// Whether the transport should reconnect on its own after a lost connection.
    /// 连接断开后传输层是否自动重连。
    pub automatic_reconnect: bool,

    /// The first retry interval. The transport doubles it after each failed attempt.
    /// 最小重连间隔，每次失败后由传输层加倍。
    pub min_retry_interval: Duration,

    /// The upper bound for the retry interval.
    /// 最大重连间隔。
    pub max_retry_interval: Duration,

    /// The keep-alive interval negotiated with the broker.
    /// 与代理协商的保活间隔。
    pub keep_alive_interval: Duration,

    /// Whether the broker should discard previous session state.
    /// 代理是否丢弃之前的会话状态。
    pub clean_session: bool,
}

impl ConnectOptions {
    /// Creates options for the given endpoint with every other field defaulted.
    ///
    /// 为给定端点创建选项，其余字段使用默认值。
    pub fn new(uri: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Sets the user name and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Checks the options before any transport call is made.
    ///
    /// 在发出任何传输调用之前检查选项。
    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(Error::InvalidConfig("uri is empty".into()));
        }
        if self.client_id.is_empty() {
            return Err(Error::InvalidConfig("client id is empty".into()));
        }
        if self.min_retry_interval > self.max_retry_interval {
            return Err(Error::InvalidConfig(format!(
                "min retry interval {:?} exceeds max retry interval {:?}",
                self.min_retry_interval, self.max_retry_interval
            )));
        }
        if self.keep_alive_interval.is_zero() {
            return Err(Error::InvalidConfig("keep-alive interval is zero".into()));
        }
        Ok(())
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            uri: String::new(),
            client_id: String::new(),
            username: None,
            password: None,
            automatic_reconnect: true,
            min_retry_interval: Duration::from_secs(3),
            max_retry_interval: Duration::from_secs(60),
            keep_alive_interval: Duration::from_secs(30),
            clean_session: true,
        }
    }
}
