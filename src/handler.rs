//! The application-side event hooks.
//!
//! 应用层事件钩子。

use crate::message::{MessageDisposition, ReceivedMessage};

/// Receives connection events.
///
/// Hooks run on the transport's worker threads (or, for `on_error`, on the
/// thread that issued the failing operation). They are never called while the
/// connection lock is held, so a hook may call back into the `Connection`.
///
/// 接收连接事件。钩子在传输层的工作线程上运行，调用时从不持有连接锁。
pub trait ConnectionHandler: Send + Sync + 'static {
    /// The connection was established (initially or after an automatic reconnect).
    /// 连接成功。
    fn on_connect(&self, cause: &str);

    /// The connection dropped; the transport retries on its own.
    /// 连接断开（会自动重连）。
    fn on_connect_lost(&self, description: &str);

    /// A connect attempt failed.
    /// 连接失败。
    fn on_connect_fail(&self, message: &str, code: i32);

    /// A message arrived on a subscribed topic.
    ///
    /// Returning [`MessageDisposition::Redeliver`] asks the transport to
    /// deliver the message again later.
    ///
    /// 收到数据。返回 `Redeliver` 时传输层稍后会重新投递。
    fn on_msg(&self, msg: &ReceivedMessage) -> MessageDisposition;

    /// A publish was acknowledged by the transport.
    /// 发送成功。
    fn on_send(&self);

    /// The connection finished closing.
    /// 客户端关闭。
    fn on_close(&self);

    /// An operation failed.
    /// 操作错误。
    fn on_error(&self, message: &str);
}
