//! Message-level types shared by the transport boundary and the handler.
//!
//! 传输边界和处理器共享的消息类型。

use bytes::Bytes;

/// Delivery quality of service.
/// 投递服务质量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Acknowledged delivery, duplicates possible.
    AtLeastOnce,
    /// Assured single delivery.
    ExactlyOnce,
}

impl QoS {
    /// The numeric level used on the wire.
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = u8;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(other),
        }
    }
}

/// A message delivered by the transport.
///
/// The payload is the transport's buffer; handlers that need it beyond the
/// callback clone the `Bytes` (a reference count bump, not a copy).
///
/// 传输层投递的消息。载荷是传输层的缓冲区。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// The topic the message was published to.
    pub topic: String,
    /// The transport's message identifier.
    pub msg_id: u16,
    /// The message body.
    pub payload: Bytes,
    /// The QoS the message was delivered with.
    pub qos: QoS,
    /// The protocol version of the message structure.
    pub protocol_version: u8,
}

/// What the transport should do with a message after dispatch.
///
/// 分发后传输层应如何处理消息。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    /// The message was consumed; the transport releases its buffer.
    Accepted,
    /// The message was not consumed; the transport should deliver it again.
    Redeliver,
}
