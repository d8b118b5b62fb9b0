//! The connection manager: authoritative state, worker slots and transitions.
//!
//! Every transition and every slot swap happens under one mutex. The mutex is
//! never held across an `.await`; the blocking transport calls run inside the
//! worker tasks, which report back through the `pub(crate)` callbacks below.
//!
//! 连接管理器：权威状态、工作者槽位与状态迁移。
//!
//! 所有状态迁移和槽位替换都在同一个互斥锁下进行。该锁从不跨越 `.await` 持有；
//! 阻塞的传输调用在工作者任务中执行，并通过下面的 `pub(crate)` 回调回报结果。

use crate::{
    config::Config,
    error::{Error, Result},
    event::{
        Event, EventSink, EventStream, NOTICE_CONNECT_FAILED, NOTICE_CONNECTION_LOST,
        NOTICE_LISTEN_FAILED,
    },
    peer::PeerIdentity,
    state::ConnectionState,
    transport::{Session, Transport},
    worker::{InitiatorWorker, ListenerWorker, SessionPump, WorkerId},
};
use bytes::Bytes;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};


/// A point-in-time view of the manager's state and worker slots.
///
/// 管理器状态与工作者槽位的时间点快照。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSnapshot {
    pub state: ConnectionState,
    pub listener: Option<WorkerId>,
    pub initiator: Option<WorkerId>,
    pub pump: Option<WorkerId>,
}

/// Manages the single peer session over a [`Transport`].
///
/// Operations are cheap and synchronous (apart from [`send`](Self::send)) and
/// may be called from any thread. Outcomes are reported on the [`EventStream`]
/// returned at construction. Dropping the manager stops it.
///
/// 管理基于 [`Transport`] 的单一对端会话。
///
/// 除 [`send`](Self::send) 外，所有操作都是轻量的同步操作，可以在任意线程调用。
/// 结果通过构造时返回的 [`EventStream`] 报告。丢弃管理器会将其停止。
#[derive(Debug)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

/// State shared between the manager handle and its workers.
#[derive(Debug)]
pub(crate) struct Shared {
    transport: Arc<dyn Transport>,
    config: Arc<Config>,
    runtime: Handle,
    events: EventSink,
    next_worker: AtomicU64,
    core: Mutex<Core>,
}

#[derive(Debug, Default)]
struct Core {
    state: ConnectionState,
    listener: Option<ListenerWorker>,
    initiator: Option<InitiatorWorker>,
    pump: Option<SessionPump>,
}

impl ConnectionManager {
    /// Creates an idle manager that spawns its workers on the current Tokio
    /// runtime.
    ///
    /// 创建一个空闲的管理器，其工作者在当前 Tokio 运行时上执行。
    pub fn new(transport: Arc<dyn Transport>, config: Config) -> Result<(Self, EventStream)> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Ok(Self::with_runtime(transport, config, runtime))
    }

    /// Creates an idle manager that spawns its workers on `runtime`.
    ///
    /// 创建一个空闲的管理器，其工作者在 `runtime` 上执行。
    pub fn with_runtime(
        transport: Arc<dyn Transport>,
        config: Config,
        runtime: Handle,
    ) -> (Self, EventStream) {
        let (events, stream) = EventSink::channel();
        let shared = Arc::new(Shared {
            transport,
            config: Arc::new(config),
            runtime,
            events,
            next_worker: AtomicU64::new(1),
            core: Mutex::new(Core::default()),
        });
        (Self { shared }, stream)
    }

    /// Goes back to listening: drops any outbound attempt and any session, and
    /// makes sure one listener is waiting.
    ///
    /// 回到监听状态：放弃所有出站尝试和会话，并确保有一个监听器在等待。
    pub fn start(&self) {
        let mut core = self.shared.lock();
        self.shared.start_locked(&mut core);
    }

    /// Cancels every worker and goes `Idle`.
    ///
    /// 取消所有工作者并进入 `Idle` 状态。
    pub fn stop(&self) {
        let mut core = self.shared.lock();
        if let Some(initiator) = core.initiator.take() {
            initiator.cancel();
        }
        if let Some(listener) = core.listener.take() {
            listener.cancel();
        }
        if let Some(pump) = core.pump.take() {
            pump.cancel();
        }
        self.shared.set_state(&mut core, ConnectionState::Idle);
    }

    /// Starts an outbound attempt to `peer`, superseding any attempt still in
    /// flight. An established session stays up until the new one is actually
    /// connected.
    ///
    /// 发起到 `peer` 的出站尝试，并取代仍在进行中的尝试。已建立的会话会保持到新会话真正连接为止。
    pub fn connect_to_peer(&self, peer: PeerIdentity) {
        let shared = &self.shared;
        let mut core = shared.lock();
        if let Some(stale) = core.initiator.take() {
            debug!(worker = %stale.id(), "superseding outbound attempt");
            stale.cancel();
        }

        let opened = {
            let _runtime = shared.runtime.enter();
            shared.transport.open_channel(&peer, &shared.config.service)
        };
        match opened {
            Ok(session) => {
                let id = shared.next_id();
                info!(worker = %id, %peer, "connecting");
                core.initiator = Some(InitiatorWorker::spawn(shared, id, session, peer));
                shared.set_state(&mut core, ConnectionState::Connecting);
            }
            Err(error) => {
                shared.set_state(&mut core, ConnectionState::Connecting);
                shared.connect_failed_locked(&mut core, &peer, &error);
            }
        }
    }

    /// Writes `data` to the connected peer. Dropped silently unless `Connected`.
    /// A successful write is reported as [`Event::DataSent`].
    ///
    /// 将 `data` 写给已连接的对端。非 `Connected` 状态下静默丢弃。
    /// 写入成功后报告 [`Event::DataSent`]。
    pub async fn send(&self, data: impl Into<Bytes>) {
        let data = data.into();
        let writer = {
            let core = self.shared.lock();
            if core.state != ConnectionState::Connected {
                trace!(state = %core.state, len = data.len(), "not connected, dropping payload");
                return;
            }
            core.pump
                .as_ref()
                .map(|pump| pump.writer(self.shared.events.clone()))
        };
        if let Some(writer) = writer {
            writer.write(data).await;
        }
    }

    pub fn current_state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// The state together with the ids of the workers occupying each slot.
    ///
    /// 状态以及各槽位中工作者的标识。
    pub fn snapshot(&self) -> ManagerSnapshot {
        let core = self.shared.lock();
        ManagerSnapshot {
            state: core.state,
            listener: core.listener.as_ref().map(ListenerWorker::id),
            initiator: core.initiator.as_ref().map(InitiatorWorker::id),
            pump: core.pump.as_ref().map(SessionPump::id),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> WorkerId {
        WorkerId(self.next_worker.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    fn set_state(&self, core: &mut Core, state: ConnectionState) {
        if core.state == state {
            return;
        }
        debug!(from = %core.state, to = %state, "state transition");
        core.state = state;
        self.events.emit(Event::StateChanged(state));
    }

    fn start_locked(self: &Arc<Self>, core: &mut Core) {
        if let Some(initiator) = core.initiator.take() {
            initiator.cancel();
        }
        if core.listener.is_none() {
            self.arm_listener_locked(core);
        }
        if let Some(pump) = core.pump.take() {
            pump.cancel();
        }
        self.set_state(core, ConnectionState::Listening);
    }

    fn arm_listener_locked(self: &Arc<Self>, core: &mut Core) {
        let opened = {
            let _runtime = self.runtime.enter();
            self.transport.listen(&self.config.service)
        };
        match opened {
            Ok(listener) => {
                let id = self.next_id();
                debug!(worker = %id, service = %self.config.service, "listening");
                core.listener = Some(ListenerWorker::spawn(self, id, listener));
            }
            Err(error) => {
                warn!(%error, "cannot open listener");
                self.events.emit(Event::Notice(NOTICE_LISTEN_FAILED.to_string()));
            }
        }
    }

    fn connect_failed_locked(self: &Arc<Self>, core: &mut Core, peer: &PeerIdentity, error: &Error) {
        warn!(%peer, %error, "outbound connect failed");
        self.events.emit(Event::Notice(NOTICE_CONNECT_FAILED.to_string()));
        self.start_locked(core);
    }

    /// Installs `session` as the established session. Any outbound attempt and
    /// any previous session are cancelled first.
    fn promote_locked(self: &Arc<Self>, core: &mut Core, session: Arc<dyn Session>, peer: PeerIdentity) {
        if let Some(initiator) = core.initiator.take() {
            initiator.cancel();
        }
        if let Some(previous) = core.pump.take() {
            previous.cancel();
        }
        let id = self.next_id();
        info!(worker = %id, %peer, "connected");
        core.pump = Some(SessionPump::spawn(self, id, session, peer.clone()));
        self.set_state(core, ConnectionState::Connected);
        self.events.emit(Event::PeerIdentified(peer));
    }

    pub(crate) fn initiator_connected(
        self: &Arc<Self>,
        id: WorkerId,
        session: Arc<dyn Session>,
        peer: PeerIdentity,
    ) {
        let mut core = self.lock();
        if core.initiator.as_ref().map(InitiatorWorker::id) != Some(id) {
            debug!(worker = %id, %peer, "superseded attempt connected, closing it");
            session.close();
            return;
        }
        core.initiator = None;
        self.promote_locked(&mut core, session, peer);
    }

    pub(crate) fn initiator_failed(self: &Arc<Self>, id: WorkerId, peer: PeerIdentity, error: Error) {
        let mut core = self.lock();
        if core.initiator.as_ref().map(InitiatorWorker::id) != Some(id) {
            debug!(worker = %id, %error, "cancelled attempt ended");
            return;
        }
        core.initiator = None;
        self.connect_failed_locked(&mut core, &peer, &error);
    }

    pub(crate) fn inbound_accepted(
        self: &Arc<Self>,
        id: WorkerId,
        session: Arc<dyn Session>,
        peer: PeerIdentity,
    ) {
        let mut core = self.lock();
        if core.listener.as_ref().map(ListenerWorker::id) != Some(id) {
            debug!(worker = %id, %peer, "superseded listener accepted, closing session");
            session.close();
            return;
        }
        core.listener = None;

        match core.state {
            ConnectionState::Connecting => {
                info!(%peer, "inbound session supersedes outbound attempt");
                self.promote_locked(&mut core, session, peer);
            }
            ConnectionState::Connected => {
                debug!(%peer, error = %Error::Rejected, "closing inbound session");
                session.close();
            }
            ConnectionState::Listening if self.config.listener.promote_while_listening => {
                self.promote_locked(&mut core, session, peer);
            }
            ConnectionState::Listening | ConnectionState::Idle => {
                debug!(%peer, state = %core.state, "discarding inbound session");
                session.close();
            }
        }

        if self.config.listener.rearm_accept
            && core.state != ConnectionState::Idle
            && core.listener.is_none()
        {
            self.arm_listener_locked(&mut core);
        }
    }

    pub(crate) fn listener_finished(&self, id: WorkerId) {
        let mut core = self.lock();
        if core.listener.as_ref().map(ListenerWorker::id) == Some(id) {
            core.listener = None;
        }
    }

    pub(crate) fn session_received(self: &Arc<Self>, id: WorkerId, data: Bytes) {
        let core = self.lock();
        let Some(pump) = core.pump.as_ref().filter(|pump| pump.id() == id) else {
            trace!(worker = %id, len = data.len(), "read from superseded session dropped");
            return;
        };
        self.events.emit(Event::DataReceived(data));
        if self.config.session.rearm_reads {
            pump.arm(self);
        }
    }

    pub(crate) fn session_lost(self: &Arc<Self>, id: WorkerId, error: Error) {
        let mut core = self.lock();
        if core.pump.as_ref().map(SessionPump::id) != Some(id) {
            debug!(worker = %id, %error, "closed session ended");
            return;
        }
        core.pump = None;
        warn!(worker = %id, %error, "connection lost");
        self.events.emit(Event::Notice(NOTICE_CONNECTION_LOST.to_string()));
        self.start_locked(&mut core);
    }
}
