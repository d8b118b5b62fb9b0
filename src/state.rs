//! 连接状态。
//! Connection state.

use std::fmt;

/// The manager-wide connection state.
///
/// 管理器范围内的连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Nothing running. The quiescent rest state.
    /// 没有任何工作者在运行。静止状态。
    #[default]
    Idle,
    /// Waiting for an inbound session.
    /// 等待入站会话。
    Listening,
    /// An outbound attempt is in flight.
    /// 出站连接尝试正在进行。
    Connecting,
    /// A session is established and pumped.
    /// 会话已建立并正在收发。
    Connected,
}

impl ConnectionState {
    /// The stable numeric code of the state.
    /// 状态的稳定数字编码。
    pub const fn code(self) -> u8 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Listening => 1,
            ConnectionState::Connecting => 2,
            ConnectionState::Connected => 3,
        }
    }
}

impl From<ConnectionState> for u8 {
    fn from(state: ConnectionState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for ConnectionState {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ConnectionState::Idle),
            1 => Ok(ConnectionState::Listening),
            2 => Ok(ConnectionState::Connecting),
            3 => Ok(ConnectionState::Connected),
            other => Err(other),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Listening => "listening",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}
