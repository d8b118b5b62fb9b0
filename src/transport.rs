//! Transport capability abstraction.
//!
//! The manager never talks to a radio stack directly. It consumes these
//! traits, which model a stateful link: a listener that hands out inbound
//! sessions, and session handles that are created unconnected and then
//! connected. Every blocking operation is cancelled by closing its handle
//! from another task, which makes the pending call return an error.
//!
//! 传输能力抽象。
//!
//! 管理器从不直接访问无线协议栈，而是使用这些 trait。它们模拟了一个有状态的链路：
//! 监听器产出入站会话，会话句柄先以未连接状态创建然后再连接。
//! 每个阻塞操作都通过在另一个任务中关闭其句柄来取消，使挂起的调用返回错误。

pub mod memory;
pub mod tcp;

mod close;

use crate::{config::ServiceRecord, error::Result, peer::PeerIdentity};
use async_trait::async_trait;
use bytes::Bytes;
use std::{fmt::Debug, sync::Arc};

pub(crate) use close::CloseSignal;
pub use memory::{MemoryAdapter, MemoryRadio};
pub use tcp::TcpTransport;

/// A source of listeners and outbound session handles.
///
/// Both constructors are non-blocking; the manager calls them while holding
/// its lock.
///
/// 监听器和出站会话句柄的来源。
///
/// 两个构造方法都是非阻塞的；管理器在持有锁时调用它们。
pub trait Transport: Send + Sync + Debug + 'static {
    /// Opens a listener bound to the given service record.
    ///
    /// 打开一个绑定到指定服务记录的监听器。
    fn listen(&self, service: &ServiceRecord) -> Result<Arc<dyn Listener>>;

    /// Creates an unconnected session handle aimed at `peer`. The handle is
    /// connected with [`Session::connect`].
    ///
    /// 创建一个指向 `peer` 的未连接会话句柄，之后通过 [`Session::connect`] 连接。
    fn open_channel(&self, peer: &PeerIdentity, service: &ServiceRecord)
        -> Result<Arc<dyn Session>>;
}

/// A passive endpoint accepting inbound sessions.
///
/// 接受入站会话的被动端点。
#[async_trait]
pub trait Listener: Send + Sync + Debug {
    /// Waits for an inbound session. Returns an error once the listener is closed.
    ///
    /// 等待入站会话。监听器关闭后返回错误。
    async fn accept(&self) -> Result<(Arc<dyn Session>, PeerIdentity)>;

    /// Closes the listener, unblocking a pending `accept`. Idempotent.
    ///
    /// 关闭监听器并解除挂起的 `accept`。幂等。
    fn close(&self);
}

/// A duplex byte stream to one peer.
///
/// 到单个对端的双工字节流。
#[async_trait]
pub trait Session: Send + Sync + Debug {
    /// The peer on the other end.
    fn peer(&self) -> &PeerIdentity;

    /// Connects an outbound handle. Inbound sessions are already connected and
    /// return `Ok(())`.
    ///
    /// 连接出站句柄。入站会话已处于连接状态，直接返回 `Ok(())`。
    async fn connect(&self) -> Result<()>;

    /// Reads at most `max_len` bytes. End of stream is an error.
    ///
    /// 最多读取 `max_len` 字节。流结束视为错误。
    async fn read(&self, max_len: usize) -> Result<Bytes>;

    /// Writes the whole buffer.
    ///
    /// 写入整个缓冲区。
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Closes the session, unblocking pending calls. Idempotent and callable
    /// from any task.
    ///
    /// 关闭会话并解除所有挂起的调用。幂等，可在任意任务中调用。
    fn close(&self);
}
