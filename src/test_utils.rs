//! Common testing infrastructure for the lifecycle core.
//!
//! 生命周期核心的通用测试基础设施。

use crate::{
    dispatcher::EventDispatcher,
    handler::ConnectionHandler,
    message::{MessageDisposition, QoS, ReceivedMessage},
    transport::{IssueResult, ReturnCode, Transport, TransportClient, TransportConnectOptions},
};
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

// --- Mock Transport ---

/// Every call the lifecycle core made on the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Create { uri: String, client_id: String },
    Connect(TransportConnectOptions),
    Subscribe { topic: String, qos: QoS },
    Unsubscribe { topic: String },
    Publish { topic: String, payload: Bytes, qos: QoS },
    Disconnect,
    Destroy,
}

/// How the mock completes a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectMode {
    /// Completes inside the `disconnect` call, on the caller's thread.
    Inline,
    /// Completes from a separate thread after the delay.
    Thread(Duration),
    /// Never completes on its own; the test calls the dispatcher.
    Manual,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<TransportCall>,
    failures: HashMap<&'static str, i32>,
    events: Option<Arc<EventDispatcher>>,
    disconnect_mode: DisconnectMode,
}

/// A transport that records calls and lets tests drive callbacks by hand.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                failures: HashMap::new(),
                events: None,
                disconnect_mode: DisconnectMode::Inline,
            })),
        }
    }
}

impl MockTransport {
    pub fn with_disconnect_mode(mode: DisconnectMode) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().disconnect_mode = mode;
        mock
    }

    /// Makes the next call to `op` return `code`.
    pub fn fail_next(&self, op: &'static str, code: i32) {
        self.state.lock().unwrap().failures.insert(op, code);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&TransportCall) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    /// The dispatcher registered by the most recent `create`.
    pub fn events(&self) -> Arc<EventDispatcher> {
        self.state
            .lock()
            .unwrap()
            .events
            .clone()
            .expect("no handle was created")
    }

    fn record(&self, op: &'static str, call: TransportCall) -> IssueResult {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.remove(op) {
            Some(code) => Err(ReturnCode(code)),
            None => Ok(()),
        }
    }
}

impl Transport for MockTransport {
    type Client = MockClient;

    fn create(
        &self,
        uri: &str,
        client_id: &str,
        events: Arc<EventDispatcher>,
    ) -> Result<Self::Client, ReturnCode> {
        self.record(
            "create",
            TransportCall::Create {
                uri: uri.into(),
                client_id: client_id.into(),
            },
        )?;
        self.state.lock().unwrap().events = Some(events.clone());
        Ok(MockClient {
            mock: self.clone(),
            events,
        })
    }
}

/// The handle issued by [`MockTransport`].
#[derive(Debug)]
pub struct MockClient {
    mock: MockTransport,
    events: Arc<EventDispatcher>,
}

impl TransportClient for MockClient {
    fn connect(&mut self, options: &TransportConnectOptions) -> IssueResult {
        self.mock
            .record("connect", TransportCall::Connect(options.clone()))
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> IssueResult {
        self.mock.record(
            "subscribe",
            TransportCall::Subscribe {
                topic: topic.into(),
                qos,
            },
        )
    }

    fn unsubscribe(&mut self, topic: &str) -> IssueResult {
        self.mock.record(
            "unsubscribe",
            TransportCall::Unsubscribe {
                topic: topic.into(),
            },
        )
    }

    fn publish(&mut self, topic: &str, payload: Bytes, qos: QoS) -> IssueResult {
        self.mock.record(
            "publish",
            TransportCall::Publish {
                topic: topic.into(),
                payload,
                qos,
            },
        )
    }

    fn disconnect(&mut self) -> IssueResult {
        self.mock.record("disconnect", TransportCall::Disconnect)?;
        let mode = self.mock.state.lock().unwrap().disconnect_mode;
        match mode {
            DisconnectMode::Inline => self.events.disconnect_completed(Ok(())),
            DisconnectMode::Thread(delay) => {
                let events = self.events.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    events.disconnect_completed(Ok(()));
                });
            }
            DisconnectMode::Manual => {}
        }
        Ok(())
    }

    fn destroy(self) {
        self.mock.state.lock().unwrap().calls.push(TransportCall::Destroy);
    }
}

// --- Recording Handler ---

/// One hook invocation seen by [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerEvent {
    Connect(String),
    ConnectLost(String),
    ConnectFail(String, i32),
    Msg(ReceivedMessage),
    Send,
    Close,
    Error(String),
}

/// A handler that records every hook invocation in order.
#[derive(Debug)]
pub struct RecordingHandler {
    events: Mutex<Vec<HandlerEvent>>,
    disposition: Mutex<MessageDisposition>,
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            disposition: Mutex::new(MessageDisposition::Accepted),
        }
    }
}

impl RecordingHandler {
    /// What `on_msg` answers from now on.
    pub fn set_disposition(&self, disposition: MessageDisposition) {
        *self.disposition.lock().unwrap() = disposition;
    }

    pub fn events(&self) -> Vec<HandlerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&HandlerEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                HandlerEvent::Error(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: HandlerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ConnectionHandler for RecordingHandler {
    fn on_connect(&self, cause: &str) {
        self.push(HandlerEvent::Connect(cause.into()));
    }

    fn on_connect_lost(&self, description: &str) {
        self.push(HandlerEvent::ConnectLost(description.into()));
    }

    fn on_connect_fail(&self, message: &str, code: i32) {
        self.push(HandlerEvent::ConnectFail(message.into(), code));
    }

    fn on_msg(&self, msg: &ReceivedMessage) -> MessageDisposition {
        self.push(HandlerEvent::Msg(msg.clone()));
        *self.disposition.lock().unwrap()
    }

    fn on_send(&self) {
        self.push(HandlerEvent::Send);
    }

    fn on_close(&self) {
        self.push(HandlerEvent::Close);
    }

    fn on_error(&self, message: &str) {
        self.push(HandlerEvent::Error(message.into()));
    }
}
