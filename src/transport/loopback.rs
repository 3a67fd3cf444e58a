//! An in-process broker implementing [`Transport`].
//!
//! Each handle owns a worker thread that delivers its events, so callbacks
//! arrive on a thread other than the caller's, as with a networked transport.
//! The broker can refuse connects and drop every connection to exercise the
//! loss/reconnect path.
//!
//! 实现 [`Transport`] 的进程内代理。每个句柄拥有一个投递事件的工作线程。

use super::{IssueResult, ReturnCode, Transport, TransportClient, TransportConnectOptions, TransportFailure};
use crate::{
    dispatcher::EventDispatcher,
    message::{MessageDisposition, QoS, ReceivedMessage},
};
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering},
    },
    thread,
};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Protocol version stamped on delivered messages.
const PROTOCOL_VERSION: u8 = 4;
/// Deliveries attempted before a message that keeps being refused is dropped.
const MAX_DELIVERY_ATTEMPTS: u8 = 3;
/// Code reported when the broker refuses a connect.
const CONNECTION_REFUSED: i32 = 5;

/// Returns whether `topic` matches the subscription `filter`, honouring the
/// single-level `+` and multi-level `#` wildcards.
///
/// 判断 `topic` 是否匹配订阅过滤器 `filter`。
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

enum WorkerEvent {
    ConnectSucceeded(&'static str),
    ConnectFailed(TransportFailure),
    ConnectionLost(&'static str),
    Message { msg: ReceivedMessage, attempts: u8 },
    PublishAcked,
    DisconnectCompleted,
}

struct ClientEntry {
    client_id: String,
    tx: mpsc::UnboundedSender<WorkerEvent>,
    filters: HashMap<String, QoS>,
    connected: bool,
    automatic_reconnect: bool,
}

#[derive(Default)]
struct BrokerInner {
    clients: Mutex<HashMap<u64, ClientEntry>>,
    next_handle: AtomicU64,
    next_msg_id: AtomicU16,
    refuse_connects: AtomicBool,
}

impl BrokerInner {
    fn clients(&self) -> MutexGuard<'_, HashMap<u64, ClientEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The shared in-process broker. Cloning yields another reference to the same broker.
///
/// 共享的进程内代理。
#[derive(Clone, Default)]
pub struct LoopbackBroker {
    inner: Arc<BrokerInner>,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent connects fail with `on_connect_fail`.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse_connects.store(refuse, Ordering::Release);
    }

    /// Drops every connected client. Clients with automatic reconnect get
    /// `on_connect_lost` followed by `on_connect`; the others stay disconnected.
    ///
    /// 断开所有已连接的客户端。
    pub fn drop_connections(&self) {
        let mut clients = self.inner.clients();
        for entry in clients.values_mut().filter(|e| e.connected) {
            debug!(client_id = %entry.client_id, "Loopback broker dropping connection");
            let _ = entry.tx.send(WorkerEvent::ConnectionLost("connection reset by broker"));
            if entry.automatic_reconnect {
                let _ = entry.tx.send(WorkerEvent::ConnectSucceeded("automatic reconnect"));
            } else {
                entry.connected = false;
            }
        }
    }

    /// Number of live handles.
    pub fn client_count(&self) -> usize {
        self.inner.clients().len()
    }
}

/// A [`Transport`] whose handles attach to a [`LoopbackBroker`].
#[derive(Clone)]
pub struct LoopbackTransport {
    broker: LoopbackBroker,
}

impl LoopbackTransport {
    pub fn new(broker: &LoopbackBroker) -> Self {
        Self {
            broker: broker.clone(),
        }
    }
}

impl Transport for LoopbackTransport {
    type Client = LoopbackClient;

    fn create(
        &self,
        _uri: &str,
        client_id: &str,
        events: Arc<EventDispatcher>,
    ) -> Result<Self::Client, ReturnCode> {
        let broker = self.broker.inner.clone();
        let handle = broker.next_handle.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let retry = tx.downgrade();

        thread::Builder::new()
            .name(format!("loopback-{client_id}"))
            .spawn(move || run_worker(rx, retry, events))
            .map_err(|_| ReturnCode::FAILURE)?;

        broker.clients().insert(
            handle,
            ClientEntry {
                client_id: client_id.to_owned(),
                tx: tx.clone(),
                filters: HashMap::new(),
                connected: false,
                automatic_reconnect: false,
            },
        );
        Ok(LoopbackClient { handle, broker, tx })
    }
}

/// Delivers one handle's events until the handle is destroyed.
fn run_worker(
    mut rx: mpsc::UnboundedReceiver<WorkerEvent>,
    retry: mpsc::WeakUnboundedSender<WorkerEvent>,
    events: Arc<EventDispatcher>,
) {
    while let Some(event) = rx.blocking_recv() {
        match event {
            WorkerEvent::ConnectSucceeded(cause) => events.connect_succeeded(cause),
            WorkerEvent::ConnectFailed(failure) => events.connect_failed(&failure),
            WorkerEvent::ConnectionLost(description) => events.connection_lost(description),
            WorkerEvent::Message { msg, attempts } => {
                if events.message_arrived(&msg) == MessageDisposition::Redeliver
                    && attempts + 1 < MAX_DELIVERY_ATTEMPTS
                {
                    if let Some(tx) = retry.upgrade() {
                        trace!(topic = %msg.topic, attempts, "Redelivering message");
                        let _ = tx.send(WorkerEvent::Message {
                            msg,
                            attempts: attempts + 1,
                        });
                    }
                }
            }
            WorkerEvent::PublishAcked => events.publish_acknowledged(),
            WorkerEvent::DisconnectCompleted => events.disconnect_completed(Ok(())),
        }
    }
    trace!("Loopback worker finished");
}

/// A handle attached to a [`LoopbackBroker`].
pub struct LoopbackClient {
    handle: u64,
    broker: Arc<BrokerInner>,
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl LoopbackClient {
    fn send(&self, event: WorkerEvent) -> IssueResult {
        self.tx.send(event).map_err(|_| ReturnCode::FAILURE)
    }

    fn with_entry<R>(&self, f: impl FnOnce(&mut ClientEntry) -> R) -> Result<R, ReturnCode> {
        let mut clients = self.broker.clients();
        clients.get_mut(&self.handle).map(f).ok_or(ReturnCode::FAILURE)
    }
}

impl TransportClient for LoopbackClient {
    fn connect(&mut self, options: &TransportConnectOptions) -> IssueResult {
        if self.broker.refuse_connects.load(Ordering::Acquire) {
            return self.send(WorkerEvent::ConnectFailed(TransportFailure::new(
                CONNECTION_REFUSED,
                "connection refused",
            )));
        }
        self.with_entry(|entry| {
            entry.connected = true;
            entry.automatic_reconnect = options.automatic_reconnect;
        })?;
        self.send(WorkerEvent::ConnectSucceeded("connect"))
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> IssueResult {
        self.with_entry(|entry| {
            if !entry.connected {
                return Err(ReturnCode::DISCONNECTED);
            }
            entry.filters.insert(topic.to_owned(), qos);
            Ok(())
        })?
    }

    fn unsubscribe(&mut self, topic: &str) -> IssueResult {
        self.with_entry(|entry| {
            if !entry.connected {
                return Err(ReturnCode::DISCONNECTED);
            }
            entry.filters.remove(topic);
            Ok(())
        })?
    }

    fn publish(&mut self, topic: &str, payload: Bytes, qos: QoS) -> IssueResult {
        if topic.is_empty() || topic.contains(|c| c == '+' || c == '#') {
            return Err(ReturnCode::BAD_ARGUMENT);
        }
        let clients = self.broker.clients();
        let sender = clients.get(&self.handle).ok_or(ReturnCode::FAILURE)?;
        if !sender.connected {
            return Err(ReturnCode::DISCONNECTED);
        }

        for entry in clients.values().filter(|e| e.connected) {
            let granted = entry
                .filters
                .iter()
                .filter(|(filter, _)| topic_matches(filter, topic))
                .map(|(_, granted)| granted.level())
                .max();
            let Some(granted) = granted else { continue };
            let qos = QoS::try_from(granted.min(qos.level())).unwrap_or_default();
            let msg = ReceivedMessage {
                topic: topic.to_owned(),
                msg_id: self.broker.next_msg_id.fetch_add(1, Ordering::Relaxed),
                payload: payload.clone(),
                qos,
                protocol_version: PROTOCOL_VERSION,
            };
            let _ = entry.tx.send(WorkerEvent::Message { msg, attempts: 0 });
        }
        drop(clients);

        self.send(WorkerEvent::PublishAcked)
    }

    fn disconnect(&mut self) -> IssueResult {
        self.with_entry(|entry| {
            entry.connected = false;
            entry.filters.clear();
        })?;
        self.send(WorkerEvent::DisconnectCompleted)
    }
}

impl Drop for LoopbackClient {
    fn drop(&mut self) {
        // Removing the entry drops the broker's sender; the worker exits once
        // this handle's sender goes too.
        if let Some(entry) = self.broker.clients().remove(&self.handle) {
            debug!(client_id = %entry.client_id, "Loopback handle destroyed");
        }
    }
}
