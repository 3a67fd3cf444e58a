//! Owns the transport handle of one connection.
//!
//! 持有单个连接的传输句柄。

use super::{Transport, TransportClient, TransportConnectOptions};
use crate::{
    config::ConnectOptions,
    dispatcher::EventDispatcher,
    error::{Error, Result},
};
use std::sync::Arc;
use tracing::{debug, info};

/// Translates the lifecycle core's options into transport connect options.
///
/// 将生命周期核心的选项转换为传输连接选项。
pub fn transport_connect_options(options: &ConnectOptions) -> TransportConnectOptions {
    TransportConnectOptions {
        keep_alive_interval: options.keep_alive_interval,
        clean_session: options.clean_session,
        username: options.username.clone(),
        password: options.password.clone(),
        automatic_reconnect: options.automatic_reconnect,
        min_retry_interval: options.min_retry_interval,
        max_retry_interval: options.max_retry_interval,
    }
}

/// The transport factory plus the handle it issued, if any.
///
/// Always accessed under the connection lock.
///
/// 传输工厂及其发出的句柄（如果有）。始终在连接锁下访问。
pub struct TransportBinding<T: Transport> {
    transport: T,
    client: Option<T::Client>,
}

impl<T: Transport> TransportBinding<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            client: None,
        }
    }

    pub fn has_handle(&self) -> bool {
        self.client.is_some()
    }

    /// Creates the handle and registers `events` as its callback sink.
    ///
    /// Fails with [`Error::HandleExists`] if the previous handle was never released.
    ///
    /// 创建句柄并将 `events` 注册为回调接收者。
    pub fn create(&mut self, options: &ConnectOptions, events: Arc<EventDispatcher>) -> Result<()> {
        if self.client.is_some() {
            return Err(Error::HandleExists);
        }
        let client = self
            .transport
            .create(&options.uri, &options.client_id, events)
            .map_err(|code| Error::Transport { op: "create", code })?;
        self.client = Some(client);
        debug!(uri = %options.uri, client_id = %options.client_id, "Transport handle created");
        Ok(())
    }

    /// Issues the asynchronous connect on the current handle.
    pub fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        let connect_options = transport_connect_options(options);
        self.client_mut()?
            .connect(&connect_options)
            .map_err(|code| Error::Transport { op: "connect", code })
    }

    /// The current handle, or [`Error::NoHandle`].
    pub fn client_mut(&mut self) -> Result<&mut T::Client> {
        self.client.as_mut().ok_or(Error::NoHandle)
    }

    /// Destroys the handle. Returns `false` if there was none.
    ///
    /// 销毁句柄。如果没有句柄则返回 `false`。
    pub fn release(&mut self) -> bool {
        match self.client.take() {
            Some(client) => {
                client.destroy();
                info!("Transport handle released");
                true
            }
            None => false,
        }
    }
}
