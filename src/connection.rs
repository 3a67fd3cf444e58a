//! 定义了单个发布/订阅连接。
//! Defines a single publish/subscribe connection.
//!
//! [`Connection`] is the thread-safe operation surface over one transport
//! handle. Callers on any thread may subscribe, unsubscribe and publish
//! concurrently while the transport delivers events from its own worker
//! threads; `close` waits until the transport acknowledges the disconnect.
//!
//! [`Connection`] 是单个传输句柄之上的线程安全操作接口。

use crate::{
    config::ConnectOptions,
    dispatcher::EventDispatcher,
    error::{Error, Result},
    handler::ConnectionHandler,
    lifecycle::{LifecycleGuard, LifecycleState},
    message::QoS,
    transport::{Transport, TransportBinding, TransportClient},
};
use bytes::Bytes;
use std::{
    collections::BTreeSet,
    fmt,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};
use tracing::{debug, info, trace, warn};

/// The endpoint identity fixed by the first `start`.
/// 首次 `start` 时确定的端点身份。
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    uri: String,
    client_id: String,
}

/// State guarded by the connection lock.
struct Session<T: Transport> {
    binding: TransportBinding<T>,
    subscriptions: BTreeSet<String>,
}

/// One logical client identity on top of a transport.
///
/// # Example
///
/// ```ignore
/// let broker = LoopbackBroker::new();
/// let conn = Connection::new(LoopbackTransport::new(&broker), handler);
/// conn.start(&ConnectOptions::new("tcp://localhost:1883", "dev0"))?;
/// conn.subscribe("test/topic", QoS::AtLeastOnce)?;
/// conn.publish("test/topic", "hello!", QoS::AtMostOnce)?;
/// conn.close().await?;
/// ```
pub struct Connection<T: Transport> {
    session: Mutex<Session<T>>,
    guard: Arc<LifecycleGuard>,
    handler: Arc<dyn ConnectionHandler>,
    endpoint: OnceLock<Endpoint>,
}

impl<T: Transport> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.guard.state();
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint.get())
            .field("state", &state)
            .field("live", &state.is_live())
            .field("closed", &self.guard.is_closed())
            .finish()
    }
}

impl<T: Transport> Connection<T> {
    /// Creates a connection in the pre-connected state. Nothing touches the
    /// transport until [`start`](Self::start).
    pub fn new(transport: T, handler: Arc<dyn ConnectionHandler>) -> Self {
        Self {
            session: Mutex::new(Session {
                binding: TransportBinding::new(transport),
                subscriptions: BTreeSet::new(),
            }),
            guard: Arc::new(LifecycleGuard::new()),
            handler,
            endpoint: OnceLock::new(),
        }
    }

    /// Creates the transport handle and issues the asynchronous connect.
    ///
    /// Fails if a handle already exists; a started connection must be closed
    /// before it can be started again. A connect request the transport refuses
    /// to issue is reported through `on_error`, but `start` still succeeds: the
    /// outcome of connecting always arrives as `on_connect`/`on_connect_fail`.
    ///
    /// 创建传输句柄并发出异步连接请求。
    pub fn start(&self, options: &ConnectOptions) -> Result<()> {
        options.validate().map_err(|err| self.report(err))?;

        let endpoint = self.endpoint.get_or_init(|| Endpoint {
            uri: options.uri.clone(),
            client_id: options.client_id.clone(),
        });
        if endpoint.uri != options.uri || endpoint.client_id != options.client_id {
            return Err(self.report(Error::IdentityMismatch));
        }

        let connect_issue = {
            let mut session = self.lock();
            let events = Arc::new(EventDispatcher::new(
                options.client_id.clone(),
                self.guard.clone(),
                self.handler.clone(),
            ));
            if let Err(err) = session.binding.create(options, events) {
                drop(session);
                return Err(self.report(err));
            }
            if let Err(state) = self.guard.open() {
                warn!(client_id = %options.client_id, ?state, "Connection is still closing");
                session.binding.release();
                drop(session);
                return Err(self.report(Error::HandleExists));
            }
            session.subscriptions.clear();
            session.binding.connect(options)
        };

        info!(uri = %options.uri, client_id = %options.client_id, "Connection started");
        if let Err(err) = connect_issue {
            warn!(client_id = %options.client_id, error = %err, "Connect request not issued");
            self.report(err);
        }
        Ok(())
    }

    /// Subscribes to `topic`.
    ///
    /// The topic is recorded before the transport acknowledges it and is not
    /// rolled back if the transport refuses the request; that refusal is only
    /// reported through `on_error`.
    ///
    /// 订阅 `topic`。主题在传输层确认之前记录，失败时不会回滚。
    pub fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        self.check_live()?;
        if topic.is_empty() {
            return Err(self.report(Error::EmptyTopic));
        }

        let issued = {
            let mut session = self.lock();
            let Session {
                binding,
                subscriptions,
                ..
            } = &mut *session;
            binding.client_mut().map(|client| {
                subscriptions.insert(topic.to_owned());
                client.subscribe(topic, qos)
            })
        };

        match issued {
            Err(err) => Err(self.report_unless_closed(err)),
            Ok(Err(code)) => {
                warn!(client_id = self.log_id(), topic, %code, "Subscribe not issued");
                self.report(Error::Transport {
                    op: "subscribe",
                    code,
                });
                Ok(())
            }
            Ok(Ok(())) => {
                debug!(client_id = self.log_id(), topic, qos = qos.level(), "Subscribe issued");
                Ok(())
            }
        }
    }

    /// Unsubscribes from `topic`. Mirrors [`subscribe`](Self::subscribe): the
    /// topic is forgotten before the transport confirms.
    ///
    /// 取消订阅 `topic`。
    pub fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.check_live()?;
        if topic.is_empty() {
            return Err(self.report(Error::EmptyTopic));
        }

        let issued = {
            let mut session = self.lock();
            let Session {
                binding,
                subscriptions,
                ..
            } = &mut *session;
            binding.client_mut().map(|client| {
                subscriptions.remove(topic);
                client.unsubscribe(topic)
            })
        };

        match issued {
            Err(err) => Err(self.report_unless_closed(err)),
            Ok(Err(code)) => {
                warn!(client_id = self.log_id(), topic, %code, "Unsubscribe not issued");
                self.report(Error::Transport {
                    op: "unsubscribe",
                    code,
                });
                Ok(())
            }
            Ok(Ok(())) => {
                debug!(client_id = self.log_id(), topic, "Unsubscribe issued");
                Ok(())
            }
        }
    }

    /// Publishes `payload` to `topic`.
    ///
    /// Only topics this connection has subscribed to may be published to.
    /// Empty topics and payloads are rejected without a transport call.
    ///
    /// 向 `topic` 发布 `payload`。只能发布到本连接已订阅的主题。
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>, qos: QoS) -> Result<()> {
        self.check_live()?;
        let payload = payload.into();
        if topic.is_empty() {
            return Err(self.report(Error::EmptyTopic));
        }
        if payload.is_empty() {
            return Err(self.report(Error::EmptyPayload(topic.to_owned())));
        }

        let issued = {
            let mut session = self.lock();
            let Session {
                binding,
                subscriptions,
                ..
            } = &mut *session;
            binding.client_mut().and_then(|client| {
                if !subscriptions.contains(topic) {
                    return Err(Error::TopicNotSubscribed(topic.to_owned()));
                }
                client
                    .publish(topic, payload, qos)
                    .map_err(|code| Error::Transport { op: "publish", code })
            })
        };

        match issued {
            Ok(()) => {
                trace!(client_id = self.log_id(), topic, qos = qos.level(), "Publish issued");
                Ok(())
            }
            Err(err) => {
                if let Error::Transport { code, .. } = &err {
                    warn!(client_id = self.log_id(), topic, %code, "Publish not issued");
                }
                Err(self.report_unless_closed(err))
            }
        }
    }

    /// Disconnects and releases the transport handle.
    ///
    /// Returns once the transport has completed (or failed) the disconnect and
    /// the handle is gone. The lock is not held while waiting, so transport
    /// callbacks keep flowing. Closing a connection that is already closed or
    /// is being closed by another caller returns `Ok` at once. Closing a
    /// connection that was never started reports [`Error::NoHandle`].
    ///
    /// If the transport refuses to issue the disconnect the connection is torn
    /// down locally and the refusal is returned after `on_close` has fired.
    ///
    /// 断开连接并释放传输句柄。在传输层完成断开且句柄释放后返回。
    pub async fn close(&self) -> Result<()> {
        let issued = {
            let mut session = self.lock();
            if !session.binding.has_handle() {
                if self.guard.state() == LifecycleState::Idle {
                    drop(session);
                    return Err(self.report(Error::NoHandle));
                }
                return Ok(());
            }
            if self.guard.is_closed() {
                // The transport finished the disconnect but the previous closer
                // never got to tear down.
                None
            } else if !self.guard.begin_closing() {
                debug!(client_id = self.log_id(), "Close already in progress");
                return Ok(());
            } else {
                Some(session.binding.client_mut().and_then(|client| {
                    client
                        .disconnect()
                        .map_err(|code| Error::Transport { op: "disconnect", code })
                }))
            }
        };

        let outcome = match issued {
            None => Ok(()),
            Some(Ok(())) => {
                debug!(client_id = self.log_id(), "Waiting for disconnect completion");
                self.guard.wait_for_completion().await;
                Ok(())
            }
            Some(Err(err)) => {
                warn!(client_id = self.log_id(), error = %err, "Disconnect not issued");
                let err = self.report(err);
                if self.guard.finish_close() {
                    self.handler.on_close();
                }
                Err(err)
            }
        };

        self.teardown();
        outcome
    }

    /// [`close`](Self::close) for callers outside an async context.
    ///
    /// 供非异步上下文调用的 [`close`](Self::close)。
    pub fn close_blocking(&self) -> Result<()> {
        futures::executor::block_on(self.close())
    }

    /// The broker URI, once started.
    pub fn uri(&self) -> Option<&str> {
        self.endpoint.get().map(|e| e.uri.as_str())
    }

    /// The client identifier, once started.
    pub fn client_id(&self) -> Option<&str> {
        self.endpoint.get().map(|e| e.client_id.as_str())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.guard.state()
    }

    /// Whether the connection is closed (or not yet started).
    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    /// Snapshot of the topics currently believed subscribed.
    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.iter().cloned().collect()
    }

    fn teardown(&self) {
        let mut session = self.lock();
        if session.binding.release() {
            session.subscriptions.clear();
            info!(client_id = self.log_id(), "Connection closed");
        }
    }

    /// Before the first start an operation is a caller mistake worth
    /// reporting; after a close it is silently ignored.
    fn check_live(&self) -> Result<()> {
        if !self.guard.is_closed() {
            return Ok(());
        }
        match self.guard.state() {
            LifecycleState::Idle => Err(self.report(Error::NoHandle)),
            state => {
                trace!(client_id = self.log_id(), ?state, "Operation on closed connection ignored");
                Err(Error::NoHandle)
            }
        }
    }

    /// A `close` may finish between `check_live` and taking the lock; the
    /// missing handle is then as silent as any other post-close operation.
    fn report_unless_closed(&self, err: Error) -> Error {
        if err == Error::NoHandle && self.guard.is_closed() {
            trace!(client_id = self.log_id(), "Handle released by a concurrent close");
            return err;
        }
        self.report(err)
    }

    fn report(&self, err: Error) -> Error {
        debug!(client_id = self.log_id(), error = %err, "Operation error");
        self.handler.on_error(&err.to_string());
        err
    }

    fn log_id(&self) -> &str {
        self.client_id().unwrap_or("-")
    }

    fn lock(&self) -> MutexGuard<'_, Session<T>> {
        // Transport calls never panic while holding the lock in normal operation;
        // a poisoned lock still holds consistent state.
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dropping a live connection disconnects it without waiting for the
/// transport to confirm. The last reference may be released on the transport's
/// own callback thread, which is the only thread that could deliver that
/// confirmation.
///
/// 丢弃存活的连接时发出断开请求，但不等待传输层确认。
impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.guard.is_closed() {
            if self.guard.begin_closing() {
                if let Ok(client) = session.binding.client_mut() {
                    if let Err(code) = client.disconnect() {
                        warn!(%code, "Disconnect on drop not issued");
                    }
                }
            }
            // A disconnect completing inline already fired on_close.
            if self.guard.finish_close() {
                self.handler.on_close();
            }
        }
        if session.binding.release() {
            session.subscriptions.clear();
            debug!("Connection dropped");
        }
    }
}
