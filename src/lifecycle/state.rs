//! Defines the lifecycle state machine of a connection.
//!
//! 定义连接的生命周期状态机。

/// The lifecycle state of a connection.
/// 连接的生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Constructed, never started (or fully torn down before the first start).
    /// 已构造，尚未启动。
    Idle = 0,

    /// A transport handle exists and a connect request has been issued.
    /// 传输句柄已存在，连接请求已发出。
    Connecting = 1,

    /// The transport reported a successful connect.
    /// 传输层报告连接成功。
    Connected = 2,

    /// The transport lost the connection and is retrying on its own.
    /// 传输层丢失连接并正在自动重试。
    ConnectionLost = 3,

    /// A disconnect has been issued and the closer is waiting for completion.
    /// 已发出断开请求，关闭者正在等待完成。
    Closing = 4,

    /// The disconnect completed. Nothing may act on the connection until it is
    /// started again.
    /// 断开已完成。
    Closed = 5,
}

impl LifecycleState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::ConnectionLost,
            4 => Self::Closing,
            5 => Self::Closed,
            _ => Self::Idle,
        }
    }

    /// 验证状态转换是否合法
    /// Validate if a state transition is legal
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, next) {
            // 启动或重启
            // Start or restart
            (Idle | Closed, Connecting) => true,

            (Connecting | ConnectionLost | Connected, Connected) => true,
            (Connected | Connecting, ConnectionLost) => true,

            (Connecting | Connected | ConnectionLost, Closing) => true,
            (Closing, Closed) => true,

            _ => false,
        }
    }

    /// Whether a handle exists in this state.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::ConnectionLost | Self::Closing
        )
    }
}
