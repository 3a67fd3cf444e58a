//! 事件分发器 - 传输层工作线程的回调入口
//! Event Dispatcher - callback entry points for the transport's worker threads
//!
//! Every entry point consults the lifecycle guard before it touches anything,
//! so a callback that arrives after teardown is a no-op.
//!
//! 每个入口在触及任何状态之前都会检查生命周期守卫，因此在拆除后到达的回调不会产生任何效果。

use crate::{
    handler::ConnectionHandler,
    lifecycle::{LifecycleGuard, LifecycleState},
    message::{MessageDisposition, ReceivedMessage},
    transport::TransportFailure,
};
use std::{fmt, sync::Arc};
use tracing::{debug, trace, warn};

/// Routes transport events to the application handler of one connection.
///
/// 将传输事件路由到单个连接的应用处理器。
pub struct EventDispatcher {
    client_id: String,
    guard: Arc<LifecycleGuard>,
    handler: Arc<dyn ConnectionHandler>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("client_id", &self.client_id)
            .field("guard", &self.guard)
            .finish()
    }
}

impl EventDispatcher {
    pub(crate) fn new(
        client_id: String,
        guard: Arc<LifecycleGuard>,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Self {
        Self {
            client_id,
            guard,
            handler,
        }
    }

    /// The transport established (or re-established) the connection.
    ///
    /// 传输层建立（或重新建立）了连接。
    pub fn connect_succeeded(&self, cause: &str) {
        if self.guard.is_closed() {
            return;
        }
        if let Err(state) = self.guard.transition(LifecycleState::Connected) {
            debug!(client_id = %self.client_id, ?state, "Ignoring connect success");
            return;
        }
        debug!(client_id = %self.client_id, cause, "Connected");
        self.handler.on_connect(cause);
    }

    /// The transport lost the connection and will retry per its reconnect settings.
    ///
    /// 传输层丢失连接，将按照重连设置重试。
    pub fn connection_lost(&self, description: &str) {
        if self.guard.is_closed() {
            return;
        }
        if let Err(state) = self.guard.transition(LifecycleState::ConnectionLost) {
            debug!(client_id = %self.client_id, ?state, "Ignoring connection loss");
            return;
        }
        warn!(client_id = %self.client_id, description, "Connection lost");
        self.handler.on_connect_lost(description);
    }

    /// A connect attempt failed.
    pub fn connect_failed(&self, failure: &TransportFailure) {
        if self.guard.is_closed() || self.guard.state() == LifecycleState::Closing {
            return;
        }
        warn!(
            client_id = %self.client_id,
            code = failure.code,
            message = %failure.message,
            "Connect attempt failed"
        );
        self.handler.on_connect_fail(&failure.message, failure.code);
    }

    /// A message arrived. The message stays owned by the transport; the
    /// handler's disposition tells the transport to release or redeliver it.
    ///
    /// 收到消息。消息仍归传输层所有；处理器的返回值告诉传输层释放或重新投递。
    pub fn message_arrived(&self, msg: &ReceivedMessage) -> MessageDisposition {
        if self.guard.is_closed() {
            // Nobody will ever consume it; redelivery would loop.
            return MessageDisposition::Accepted;
        }
        trace!(
            client_id = %self.client_id,
            topic = %msg.topic,
            msg_id = msg.msg_id,
            len = msg.payload.len(),
            "Message arrived"
        );
        let disposition = self.handler.on_msg(msg);
        if disposition == MessageDisposition::Redeliver {
            debug!(client_id = %self.client_id, topic = %msg.topic, msg_id = msg.msg_id, "Message not accepted");
        }
        disposition
    }

    /// A publish was acknowledged.
    pub fn publish_acknowledged(&self) {
        if self.guard.is_closed() {
            return;
        }
        self.handler.on_send();
    }

    /// The disconnect issued by `close` finished, successfully or not.
    ///
    /// Fires `on_close` once per cycle and then releases the waiting closer.
    /// Completions that do not belong to a closing cycle are dropped.
    ///
    /// `close` 发出的断开已完成（无论成功与否）。每个周期只触发一次 `on_close`，然后释放等待的关闭者。
    pub fn disconnect_completed(&self, outcome: Result<(), TransportFailure>) {
        if self.guard.is_closed() {
            return;
        }
        if let Err(failure) = &outcome {
            if self.guard.state() == LifecycleState::Closing {
                warn!(
                    client_id = %self.client_id,
                    code = failure.code,
                    message = %failure.message,
                    "Disconnect failed"
                );
                self.handler
                    .on_error(&format!("disconnect failed, code: {}, {}", failure.code, failure.message));
            }
        }
        if !self.guard.finish_close() {
            debug!(client_id = %self.client_id, "Ignoring stray disconnect completion");
            return;
        }
        self.handler.on_close();
        self.guard.post_completion();
    }
}
