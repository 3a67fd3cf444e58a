//! tests/common/harness.rs
use pubsub_lifecycle::{
    ConnectOptions, Connection, ConnectionHandler, MessageDisposition, QoS, ReceivedMessage,
    transport::{LoopbackBroker, LoopbackTransport},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_subscriber::fmt::format::FmtSpan;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "pubsub_lifecycle=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::FULL)
            .with_test_writer()
            .init();
    });
}

/// How long a test waits for an event before failing.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// One handler hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(String),
    ConnectLost(String),
    ConnectFail(String, i32),
    Msg(ReceivedMessage),
    Send,
    Close,
    Error(String),
}

/// What the handler does from inside `on_connect`, like the subscriber and
/// publisher clients of a typical demo.
#[derive(Debug, Clone)]
pub enum OnConnect {
    Nothing,
    Subscribe(String),
    Publish(String, String),
    SubscribeAndPublish(String, String),
}

type LoopbackConnection = Connection<LoopbackTransport>;

/// Forwards every hook to a channel the test reads from.
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<Event>,
    on_connect: OnConnect,
    refuse_messages: AtomicBool,
    conn: OnceLock<Weak<LoopbackConnection>>,
}

impl ChannelHandler {
    fn connection(&self) -> Option<Arc<LoopbackConnection>> {
        self.conn.get().and_then(Weak::upgrade)
    }

    fn run_on_connect(&self, conn: &LoopbackConnection) {
        // Errors surface through on_error.
        let _ = match &self.on_connect {
            OnConnect::Nothing => Ok(()),
            OnConnect::Subscribe(topic) => conn.subscribe(topic, QoS::AtLeastOnce),
            OnConnect::Publish(topic, payload) => {
                conn.publish(topic, payload.clone(), QoS::AtMostOnce)
            }
            OnConnect::SubscribeAndPublish(topic, payload) => conn
                .subscribe(topic, QoS::AtLeastOnce)
                .and_then(|_| conn.publish(topic, payload.clone(), QoS::AtLeastOnce)),
        };
    }
}

impl ConnectionHandler for ChannelHandler {
    /// Runs the configured action first, so the test sees its effects once
    /// the `Connect` event arrives.
    fn on_connect(&self, cause: &str) {
        if let Some(conn) = self.connection() {
            self.run_on_connect(&conn);
        }
        let _ = self.tx.send(Event::Connect(cause.to_string()));
    }

    fn on_connect_lost(&self, description: &str) {
        let _ = self.tx.send(Event::ConnectLost(description.to_string()));
    }

    fn on_connect_fail(&self, message: &str, code: i32) {
        let _ = self.tx.send(Event::ConnectFail(message.to_string(), code));
    }

    fn on_msg(&self, msg: &ReceivedMessage) -> MessageDisposition {
        let _ = self.tx.send(Event::Msg(msg.clone()));
        if self.refuse_messages.load(Ordering::Acquire) {
            MessageDisposition::Redeliver
        } else {
            MessageDisposition::Accepted
        }
    }

    fn on_send(&self) {
        let _ = self.tx.send(Event::Send);
    }

    fn on_close(&self) {
        let _ = self.tx.send(Event::Close);
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(Event::Error(message.to_string()));
    }
}

/// A connection on a loopback broker plus the stream of its handler events.
pub struct TestClient {
    pub conn: Arc<LoopbackConnection>,
    handler: Arc<ChannelHandler>,
    events: mpsc::UnboundedReceiver<Event>,
}

impl TestClient {
    pub fn new(broker: &LoopbackBroker, on_connect: OnConnect) -> Self {
        init_tracing();
        let (tx, events) = mpsc::unbounded_channel();
        let handler = Arc::new(ChannelHandler {
            tx,
            on_connect,
            refuse_messages: AtomicBool::new(false),
            conn: OnceLock::new(),
        });
        let conn = Arc::new(Connection::new(
            LoopbackTransport::new(broker),
            handler.clone(),
        ));
        handler
            .conn
            .set(Arc::downgrade(&conn))
            .expect("handler is bound once");
        Self {
            conn,
            handler,
            events,
        }
    }

    /// Makes the handler answer `Redeliver` for every message.
    pub fn refuse_messages(&self, refuse: bool) {
        self.handler.refuse_messages.store(refuse, Ordering::Release);
    }

    /// Creates the client and starts it as `client_id`.
    pub fn started(broker: &LoopbackBroker, client_id: &str, on_connect: OnConnect) -> Self {
        let client = Self::new(broker, on_connect);
        client
            .conn
            .start(&ConnectOptions::new("tcp://localhost:1883", client_id))
            .expect("start should succeed");
        client
    }

    /// The next event, failing the test if none arrives in time.
    pub async fn next_event(&mut self) -> Event {
        timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("handler dropped")
    }

    /// Skips events until one matches `pred`.
    pub async fn wait_for(&mut self, pred: impl Fn(&Event) -> bool) -> Event {
        loop {
            let event = self.next_event().await;
            if pred(&event) {
                return event;
            }
            tracing::debug!(?event, "Skipping event");
        }
    }

    /// Asserts that no event arrives within `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(Some(event)) = timeout(window, self.events.recv()).await {
            panic!("unexpected event: {event:?}");
        }
    }
}
