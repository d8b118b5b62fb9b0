//! Events delivered from the manager to its collaborator.
//!
//! The sink is an unbounded channel: emitting never blocks a worker, and the
//! events of a single manager arrive in the order the manager observed them.
//!
//! 从管理器投递给协作方的事件。
//!
//! 事件汇是一个无界通道：发送事件不会阻塞工作者，同一管理器的事件按其观察到的顺序到达。

use crate::{
    error::{Error, Result},
    peer::PeerIdentity,
    state::ConnectionState,
};
use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::trace;

/// Notice emitted when an outbound attempt fails.
/// 出站连接失败时发出的提示。
pub const NOTICE_CONNECT_FAILED: &str = "Unable to Connect to device";
/// Notice emitted when an established session is lost.
/// 已建立的会话丢失时发出的提示。
pub const NOTICE_CONNECTION_LOST: &str = "Connection Lost";
/// Notice emitted when the listener cannot be opened.
/// 无法打开监听器时发出的提示。
pub const NOTICE_LISTEN_FAILED: &str = "Unable to listen for connections";

/// Something the collaborator should know about.
///
/// 协作方需要知道的事情。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The manager moved to a new state.
    /// 管理器进入了新的状态。
    StateChanged(ConnectionState),
    /// A read on the established session returned these bytes.
    /// 已建立会话上的一次读取返回了这些字节。
    DataReceived(Bytes),
    /// These bytes were written to the established session.
    /// 这些字节已写入已建立的会话。
    DataSent(Bytes),
    /// The connected peer.
    /// 已连接的对端。
    PeerIdentified(PeerIdentity),
    /// A human-readable notice, e.g. a recovered failure.
    /// 可读的提示信息，例如一次已恢复的失败。
    Notice(String),
}

/// The producing side, shared by the manager and its workers.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, EventStream { rx })
    }

    pub(crate) fn emit(&self, event: Event) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            trace!(?event, "event stream dropped, discarding event");
        }
    }
}

/// The consuming side handed to the collaborator.
///
/// 交给协作方的接收端。
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Waits for the next event. Fails once the manager is gone and every
    /// buffered event has been consumed.
    ///
    /// 等待下一个事件。当管理器已销毁且缓冲事件已全部消费后返回错误。
    pub async fn recv(&mut self) -> Result<Event> {
        self.rx.recv().await.ok_or(Error::Closed)
    }

    /// Returns a buffered event without waiting, if there is one.
    /// 如果有缓冲事件，则不等待直接返回。
    pub fn try_recv(&mut self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}
