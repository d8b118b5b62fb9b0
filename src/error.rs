//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the session manager and its transports.
/// 会话管理器及其传输层的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// The listener for the service record could not be opened.
    /// 无法为服务记录打开监听器。
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// An outbound connection attempt failed.
    /// 出站连接尝试失败。
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// A read or write on an established session failed, or the peer hung up.
    /// 已建立会话上的读写失败，或对端已挂断。
    #[error("session lost: {0}")]
    SessionLost(String),

    /// An inbound session arrived while another session was already connected.
    /// 在已有会话连接时到达了新的入站会话。
    #[error("inbound session rejected: already connected")]
    Rejected,

    /// The handle was closed, either locally or because its link went away.
    /// 句柄已关闭，可能是本地关闭，也可能是链路已断开。
    #[error("handle closed")]
    Closed,

    /// An underlying I/O error occurred.
    /// 发生了底层的I/O错误。
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A peer address could not be parsed by the transport.
    /// 传输层无法解析对端地址。
    #[error("address parsing error: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    /// The manager was created outside of a Tokio runtime.
    /// 管理器在 Tokio 运行时之外创建。
    #[error("no Tokio runtime available")]
    NoRuntime,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::Io(e) => e,
            Error::AddressParse(e) => std::io::Error::new(ErrorKind::InvalidInput, e),
            Error::TransportUnavailable(msg) => std::io::Error::new(ErrorKind::AddrInUse, msg),
            Error::ConnectFailed(msg) => std::io::Error::new(ErrorKind::ConnectionRefused, msg),
            Error::SessionLost(msg) => std::io::Error::new(ErrorKind::ConnectionReset, msg),
            Error::Rejected => ErrorKind::ConnectionRefused.into(),
            Error::Closed => ErrorKind::NotConnected.into(),
            Error::NoRuntime => std::io::Error::other("no Tokio runtime available"),
        }
    }
}
