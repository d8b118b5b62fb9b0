//! 定义了会话管理器的可配置参数。
//! Defines configurable parameters for the session manager.

use std::num::NonZeroUsize;

/// A structure containing all configurable parameters of a `ConnectionManager`.
///
/// 包含 `ConnectionManager` 所有可配置参数的结构体。
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// The service record listeners are bound to and connects are aimed at.
    /// 监听器绑定、连接所指向的服务记录。
    pub service: ServiceRecord,

    /// Listener-related parameters.
    /// 监听相关参数。
    pub listener: ListenerConfig,

    /// Established-session parameters.
    /// 已建立会话的相关参数。
    pub session: SessionConfig,
}

/// The well-known service identifier both sides agree on.
///
/// 双方约定的服务标识。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceRecord {
    /// Human-readable service name advertised by the listener.
    /// 监听器广播的服务名称。
    pub name: String,
    /// Service UUID, textual form.
    /// 服务UUID，文本形式。
    pub uuid: String,
}

/// Listener-related parameters.
///
/// 监听相关参数。
#[derive(Debug, Clone, Default)]
pub struct ListenerConfig {
    /// Arm a fresh listener after every accepted session instead of leaving the
    /// slot empty until the next `start`.
    ///
    /// 每次接受会话后重新启动一个新的监听器，而不是等到下一次 `start`。
    pub rearm_accept: bool,
    /// Promote a session accepted while `Listening` straight to `Connected`
    /// instead of discarding it.
    ///
    /// 将 `Listening` 状态下接受的会话直接提升为 `Connected`，而不是丢弃它。
    pub promote_while_listening: bool,
}

/// Established-session parameters.
///
/// 已建立会话的相关参数。
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The maximum number of bytes a single read may return. Never zero, since
    /// an empty read is indistinguishable from end of stream.
    ///
    /// 单次读取最多返回的字节数。不能为零，因为空读取与流结束无法区分。
    pub read_buffer_size: NonZeroUsize,
    /// Re-arm the pump after every successful read, turning the one-shot read
    /// into a continuous receive loop.
    ///
    /// 每次成功读取后重新启动读取，使单次读取变为连续接收。
    pub rearm_reads: bool,
}

impl Default for ServiceRecord {
    fn default() -> Self {
        Self {
            name: "BlueMessage".to_string(),
            uuid: "fa87c0d0-afac-11de-8a39-0800200c9a66".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN),
            rearm_reads: false,
        }
    }
}

impl Config {
    /// A configuration that keeps accepting and receiving for as long as the
    /// manager is alive, and lets inbound peers connect to a listening manager.
    ///
    /// 只要管理器存活就持续接受和接收的配置，并允许入站对端连接到处于监听状态的管理器。
    pub fn continuous() -> Self {
        Self {
            service: ServiceRecord::default(),
            listener: ListenerConfig {
                rearm_accept: true,
                promote_while_listening: true,
            },
            session: SessionConfig {
                rearm_reads: true,
                ..SessionConfig::default()
            },
        }
    }
}

impl std::fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}
