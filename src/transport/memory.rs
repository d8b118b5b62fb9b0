//! An in-memory radio medium.
//!
//! A [`MemoryRadio`] is the shared "air". Each simulated device gets a
//! [`MemoryAdapter`] from it, which implements [`Transport`]. Listeners are
//! registered per (device address, service uuid); a connect is a rendezvous
//! that completes only when the remote listener accepts. The two ends of a link
//! share one close latch, so closing either end hangs up both.
//!
//! 内存中的无线介质。
//!
//! [`MemoryRadio`] 表示共享的“空中”介质。每个模拟设备从中获得一个实现了 [`Transport`]
//! 的 [`MemoryAdapter`]。监听器按（设备地址，服务UUID）注册；连接是一次会合，
//! 只有在远端监听器接受后才会完成。链路两端共享同一个关闭标志，关闭任一端都会挂断双方。

use super::{CloseSignal, Listener, Session, Transport};
use crate::{
    config::ServiceRecord,
    error::{Error, Result},
    peer::PeerIdentity,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Pending inbound links a listener may hold before connectors wait.
const ACCEPT_BACKLOG: usize = 16;

type ListenKey = (String, String);

/// The shared medium simulated devices talk over.
///
/// 模拟设备之间通信所用的共享介质。
#[derive(Debug, Clone, Default)]
pub struct MemoryRadio {
    inner: Arc<RadioInner>,
}

#[derive(Debug, Default)]
struct RadioInner {
    listeners: Mutex<HashMap<ListenKey, ListenEntry>>,
    next_listener_id: AtomicU64,
}

#[derive(Debug, Clone)]
struct ListenEntry {
    id: u64,
    tx: mpsc::Sender<Incoming>,
    closed: CloseSignal,
}

#[derive(Debug)]
struct Incoming {
    session: Arc<MemorySession>,
    ack: oneshot::Sender<()>,
}

impl RadioInner {
    fn registry(&self) -> MutexGuard<'_, HashMap<ListenKey, ListenEntry>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the adapter of a device with the given identity.
    ///
    /// 为具有给定身份的设备创建适配器。
    pub fn adapter(&self, local: PeerIdentity) -> MemoryAdapter {
        MemoryAdapter {
            local,
            radio: self.inner.clone(),
        }
    }

    /// Whether `address` currently has an open listener for `service`.
    ///
    /// `address` 当前是否有针对 `service` 的打开的监听器。
    pub fn is_listening(&self, address: &str, service: &ServiceRecord) -> bool {
        self.inner
            .registry()
            .get(&(address.to_string(), service.uuid.clone()))
            .is_some_and(|entry| !entry.closed.is_closed())
    }
}

/// One simulated device's view of a [`MemoryRadio`].
///
/// 单个模拟设备所见的 [`MemoryRadio`]。
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    local: PeerIdentity,
    radio: Arc<RadioInner>,
}

impl MemoryAdapter {
    pub fn local_identity(&self) -> &PeerIdentity {
        &self.local
    }
}

impl Transport for MemoryAdapter {
    fn listen(&self, service: &ServiceRecord) -> Result<Arc<dyn Listener>> {
        let key = (self.local.address().to_string(), service.uuid.clone());
        let mut registry = self.radio.registry();
        if registry.get(&key).is_some_and(|entry| !entry.closed.is_closed()) {
            return Err(Error::TransportUnavailable(format!(
                "service {service} is already bound on {}",
                self.local.address()
            )));
        }

        let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
        let closed = CloseSignal::new();
        let id = self.radio.next_listener_id.fetch_add(1, Ordering::Relaxed);
        registry.insert(
            key.clone(),
            ListenEntry {
                id,
                tx,
                closed: closed.clone(),
            },
        );
        debug!(device = %self.local, %service, "memory listener registered");

        Ok(Arc::new(MemoryListener {
            key,
            id,
            rx: tokio::sync::Mutex::new(rx),
            closed,
            radio: self.radio.clone(),
        }))
    }

    fn open_channel(
        &self,
        peer: &PeerIdentity,
        service: &ServiceRecord,
    ) -> Result<Arc<dyn Session>> {
        let link = CloseSignal::new();
        let (to_remote, remote_inbox) = mpsc::unbounded_channel();
        let (to_local, local_inbox) = mpsc::unbounded_channel();

        let remote_end = Arc::new(MemorySession::new(
            self.local.clone(),
            remote_inbox,
            to_local,
            link.clone(),
            None,
        ));
        let dial = Dial {
            key: (peer.address().to_string(), service.uuid.clone()),
            radio: self.radio.clone(),
            remote_end,
        };
        Ok(Arc::new(MemorySession::new(
            peer.clone(),
            local_inbox,
            to_remote,
            link,
            Some(dial),
        )))
    }
}

#[derive(Debug)]
struct MemoryListener {
    key: ListenKey,
    id: u64,
    rx: tokio::sync::Mutex<mpsc::Receiver<Incoming>>,
    closed: CloseSignal,
    radio: Arc<RadioInner>,
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&self) -> Result<(Arc<dyn Session>, PeerIdentity)> {
        let mut rx = tokio::select! {
            biased;
            _ = self.closed.closed() => return Err(Error::Closed),
            rx = self.rx.lock() => rx,
        };
        loop {
            let incoming = tokio::select! {
                biased;
                _ = self.closed.closed() => return Err(Error::Closed),
                incoming = rx.recv() => incoming.ok_or(Error::Closed)?,
            };
            let peer = incoming.session.peer().clone();
            if incoming.ack.send(()).is_ok() {
                let session: Arc<dyn Session> = incoming.session;
                return Ok((session, peer));
            }
            debug!(%peer, "connector gave up before accept, skipping");
        }
    }

    fn close(&self) {
        if self.closed.close() {
            let mut registry = self.radio.registry();
            if registry.get(&self.key).is_some_and(|entry| entry.id == self.id) {
                registry.remove(&self.key);
            }
        }
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.close();
    }
}

/// Where an outbound handle goes when it is connected.
#[derive(Debug)]
struct Dial {
    key: ListenKey,
    radio: Arc<RadioInner>,
    remote_end: Arc<MemorySession>,
}

#[derive(Debug)]
struct Inbox {
    rx: mpsc::UnboundedReceiver<Bytes>,
    pending: Bytes,
}

#[derive(Debug)]
struct MemorySession {
    peer: PeerIdentity,
    inbox: tokio::sync::Mutex<Inbox>,
    outbox: mpsc::UnboundedSender<Bytes>,
    link: CloseSignal,
    dial: Mutex<Option<Dial>>,
}

impl MemorySession {
    fn new(
        peer: PeerIdentity,
        rx: mpsc::UnboundedReceiver<Bytes>,
        outbox: mpsc::UnboundedSender<Bytes>,
        link: CloseSignal,
        dial: Option<Dial>,
    ) -> Self {
        Self {
            peer,
            inbox: tokio::sync::Mutex::new(Inbox {
                rx,
                pending: Bytes::new(),
            }),
            outbox,
            link,
            dial: Mutex::new(dial),
        }
    }

    fn take_dial(&self) -> Option<Dial> {
        self.dial.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Hands the remote end to the target listener and waits for it to accept.
    async fn rendezvous(&self, dial: Dial) -> Result<()> {
        let entry = dial.radio.registry().get(&dial.key).cloned();
        let Some(entry) = entry else {
            return Err(Error::ConnectFailed(format!(
                "no listener for service {} on {}",
                dial.key.1, dial.key.0
            )));
        };

        let (ack, ack_rx) = oneshot::channel();
        let incoming = Incoming {
            session: dial.remote_end,
            ack,
        };
        tokio::select! {
            biased;
            _ = self.link.closed() => return Err(Error::Closed),
            _ = entry.closed.closed() => {
                return Err(Error::ConnectFailed("remote listener closed".into()));
            }
            sent = entry.tx.send(incoming) => {
                sent.map_err(|_| Error::ConnectFailed("remote listener closed".into()))?;
            }
        }
        // An accepted link counts as connected even if it was hung up since.
        tokio::select! {
            biased;
            ack = ack_rx => ack.map_err(|_| {
                Error::ConnectFailed("remote listener closed before accepting".into())
            }),
            _ = self.link.closed() => Err(Error::Closed),
            _ = entry.closed.closed() => {
                Err(Error::ConnectFailed("remote listener closed before accepting".into()))
            }
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    async fn connect(&self) -> Result<()> {
        if self.link.is_closed() {
            return Err(Error::Closed);
        }
        let Some(dial) = self.take_dial() else {
            return Ok(());
        };
        let result = self.rendezvous(dial).await;
        if result.is_err() {
            self.link.close();
        }
        result
    }

    async fn read(&self, max_len: usize) -> Result<Bytes> {
        let mut inbox = tokio::select! {
            biased;
            _ = self.link.closed() => return Err(Error::SessionLost("link closed".into())),
            inbox = self.inbox.lock() => inbox,
        };
        if inbox.pending.is_empty() {
            let chunk = tokio::select! {
                biased;
                chunk = inbox.rx.recv() => {
                    chunk.ok_or_else(|| Error::SessionLost("remote end dropped".into()))?
                }
                _ = self.link.closed() => return Err(Error::SessionLost("link closed".into())),
            };
            inbox.pending = chunk;
        }
        let take = max_len.min(inbox.pending.len());
        Ok(inbox.pending.split_to(take))
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        if self.link.is_closed() {
            return Err(Error::SessionLost("link closed".into()));
        }
        self.outbox
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| Error::SessionLost("remote end dropped".into()))
    }

    fn close(&self) {
        if self.link.close() {
            debug!(peer = %self.peer, "memory link closed");
        }
    }
}
