//! A TCP implementation of the transport capability.
//!
//! Peers are addressed by `host:port` strings. Every listener binds the same
//! configured local address with `SO_REUSEADDR`, so the manager can close and
//! reopen listeners freely. Inbound peers are named after their socket address.
//!
//! 传输能力的TCP实现。
//!
//! 对端使用 `host:port` 字符串寻址。每个监听器都以 `SO_REUSEADDR` 绑定同一个配置的本地地址，
//! 因此管理器可以随意关闭并重新打开监听器。入站对端以其套接字地址命名。

use super::{CloseSignal, Listener, Session, Transport};
use crate::{
    config::ServiceRecord,
    error::{Error, Result},
    peer::PeerIdentity,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    future::poll_fn,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpListener, TcpSocket, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};
use tracing::{debug, info};

/// A transport over plain TCP sockets.
///
/// 基于普通TCP套接字的传输。
#[derive(Debug, Clone)]
pub struct TcpTransport {
    bind_addr: SocketAddr,
    backlog: u32,
}

impl TcpTransport {
    /// Creates a transport whose listeners bind `bind_addr`.
    ///
    /// 创建一个监听器绑定到 `bind_addr` 的传输。
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            backlog: 16,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    fn bind(&self) -> std::io::Result<TcpListener> {
        let socket = if self.bind_addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(self.bind_addr)?;
        socket.listen(self.backlog)
    }
}

impl Transport for TcpTransport {
    fn listen(&self, service: &ServiceRecord) -> Result<Arc<dyn Listener>> {
        let listener = self.bind().map_err(|e| {
            Error::TransportUnavailable(format!("cannot bind {}: {e}", self.bind_addr))
        })?;
        info!(addr = %self.bind_addr, %service, "tcp listener bound");
        Ok(Arc::new(TcpServiceListener {
            listener: Mutex::new(Some(listener)),
            closed: CloseSignal::new(),
        }))
    }

    fn open_channel(
        &self,
        peer: &PeerIdentity,
        _service: &ServiceRecord,
    ) -> Result<Arc<dyn Session>> {
        let remote: SocketAddr = peer.address().parse()?;
        Ok(Arc::new(TcpSession::outbound(peer.clone(), remote)))
    }
}

/// The socket is dropped as soon as the listener is closed, releasing the port
/// even while a task is still parked in `accept`.
#[derive(Debug)]
struct TcpServiceListener {
    listener: Mutex<Option<TcpListener>>,
    closed: CloseSignal,
}

impl TcpServiceListener {
    async fn accept_stream(&self) -> Result<(TcpStream, SocketAddr)> {
        poll_fn(|cx| {
            let guard = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_ref() {
                Some(listener) => listener.poll_accept(cx).map_err(Error::from),
                None => std::task::Poll::Ready(Err(Error::Closed)),
            }
        })
        .await
    }
}

#[async_trait]
impl Listener for TcpServiceListener {
    async fn accept(&self) -> Result<(Arc<dyn Session>, PeerIdentity)> {
        let (stream, addr) = tokio::select! {
            biased;
            _ = self.closed.closed() => return Err(Error::Closed),
            accepted = self.accept_stream() => accepted?,
        };
        let peer = PeerIdentity::anonymous(addr.to_string());
        debug!(%peer, "tcp session accepted");
        let session: Arc<dyn Session> = Arc::new(TcpSession::accepted(peer.clone(), stream));
        Ok((session, peer))
    }

    fn close(&self) {
        if self.closed.close() {
            self.listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }
}

#[derive(Debug)]
struct TcpSession {
    peer: PeerIdentity,
    remote: SocketAddr,
    reader: tokio::sync::Mutex<Option<OwnedReadHalf>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    closed: CloseSignal,
}

impl TcpSession {
    fn outbound(peer: PeerIdentity, remote: SocketAddr) -> Self {
        Self {
            peer,
            remote,
            reader: tokio::sync::Mutex::new(None),
            writer: tokio::sync::Mutex::new(None),
            closed: CloseSignal::new(),
        }
    }

    fn accepted(peer: PeerIdentity, stream: TcpStream) -> Self {
        let remote = stream.peer_addr().unwrap_or(SocketAddr::from(([0, 0, 0, 0], 0)));
        if let Err(error) = stream.set_nodelay(true) {
            debug!(%peer, %error, "cannot disable nagle on accepted stream");
        }
        let (reader, writer) = stream.into_split();
        Self {
            peer,
            remote,
            reader: tokio::sync::Mutex::new(Some(reader)),
            writer: tokio::sync::Mutex::new(Some(writer)),
            closed: CloseSignal::new(),
        }
    }

    fn lost(reason: impl std::fmt::Display) -> Error {
        Error::SessionLost(reason.to_string())
    }
}

#[async_trait]
impl Session for TcpSession {
    fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    async fn connect(&self) -> Result<()> {
        if self.closed.is_closed() {
            return Err(Error::Closed);
        }
        if self.writer.lock().await.is_some() {
            return Ok(());
        }

        let stream = tokio::select! {
            biased;
            _ = self.closed.closed() => return Err(Error::Closed),
            connected = TcpStream::connect(self.remote) => {
                connected.map_err(|e| Error::ConnectFailed(format!("{}: {e}", self.remote)))?
            }
        };
        if let Err(error) = stream.set_nodelay(true) {
            debug!(peer = %self.peer, %error, "cannot disable nagle on outbound stream");
        }
        let (reader, writer) = stream.into_split();
        *self.reader.lock().await = Some(reader);
        *self.writer.lock().await = Some(writer);
        debug!(peer = %self.peer, "tcp session connected");
        Ok(())
    }

    async fn read(&self, max_len: usize) -> Result<Bytes> {
        let mut guard = tokio::select! {
            biased;
            _ = self.closed.closed() => return Err(Self::lost("session closed")),
            guard = self.reader.lock() => guard,
        };
        let Some(reader) = guard.as_mut() else {
            return Err(Self::lost("session not connected"));
        };

        let mut buf = vec![0u8; max_len];
        let read = tokio::select! {
            biased;
            _ = self.closed.closed() => None,
            read = reader.read(&mut buf) => Some(read),
        };
        match read {
            None => {
                guard.take();
                Err(Self::lost("session closed"))
            }
            Some(Ok(0)) => Err(Self::lost("peer closed the stream")),
            Some(Ok(n)) => {
                buf.truncate(n);
                Ok(Bytes::from(buf))
            }
            Some(Err(e)) => Err(Self::lost(e)),
        }
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = tokio::select! {
            biased;
            _ = self.closed.closed() => return Err(Self::lost("session closed")),
            guard = self.writer.lock() => guard,
        };
        let Some(writer) = guard.as_mut() else {
            return Err(Self::lost("session not connected"));
        };

        let written = tokio::select! {
            biased;
            _ = self.closed.closed() => None,
            written = writer.write_all(data) => Some(written),
        };
        match written {
            None => {
                guard.take();
                Err(Self::lost("session closed"))
            }
            Some(written) => written.map_err(Self::lost),
        }
    }

    fn close(&self) {
        if !self.closed.close() {
            return;
        }
        // Halves parked in a pending read or write are dropped by that call.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        debug!(peer = %self.peer, "tcp session closed");
    }
}
