//! The session pump: reads and writes on the established session.

use super::WorkerId;
use crate::{
    event::{Event, EventSink},
    manager::Shared,
    peer::PeerIdentity,
    transport::Session,
};
use bytes::Bytes;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Owns the established session.
///
/// Every arming performs exactly one read and reports it. Whether another read
/// follows is up to the manager.
///
/// 拥有已建立的会话。
///
/// 每次启动只执行一次读取并回报结果。是否继续读取由管理器决定。
#[derive(Debug)]
pub(crate) struct SessionPump {
    id: WorkerId,
    peer: PeerIdentity,
    session: Arc<dyn Session>,
}

impl SessionPump {
    /// Wraps `session` and arms the first read.
    pub(crate) fn spawn(
        shared: &Arc<Shared>,
        id: WorkerId,
        session: Arc<dyn Session>,
        peer: PeerIdentity,
    ) -> Self {
        let pump = Self { id, peer, session };
        pump.arm(shared);
        pump
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Spawns one read of at most `read_buffer_size` bytes.
    pub(crate) fn arm(&self, shared: &Arc<Shared>) {
        let max_len = shared.config().session.read_buffer_size.get();
        shared.runtime().spawn(read_once(
            self.id,
            self.session.clone(),
            max_len,
            Arc::downgrade(shared),
        ));
    }

    pub(crate) fn writer(&self, events: EventSink) -> PumpWriter {
        PumpWriter {
            id: self.id,
            session: self.session.clone(),
            events,
        }
    }

    /// Closes the session; pending reads and writes return with an error.
    pub(crate) fn cancel(&self) {
        debug!(worker = %self.id, peer = %self.peer, "closing session");
        self.session.close();
    }
}

async fn read_once(id: WorkerId, session: Arc<dyn Session>, max_len: usize, manager: Weak<Shared>) {
    let read = session.read(max_len).await;

    let Some(manager) = manager.upgrade() else {
        session.close();
        return;
    };

    match read {
        Ok(data) => manager.session_received(id, data),
        Err(error) => {
            session.close();
            manager.session_lost(id, error);
        }
    }
}

/// The write half of a pump, taken out of the manager so the write itself runs
/// without the manager lock.
///
/// 泵的写入端，从管理器中取出，使写入本身在不持有管理器锁的情况下进行。
#[derive(Debug)]
pub(crate) struct PumpWriter {
    id: WorkerId,
    session: Arc<dyn Session>,
    events: EventSink,
}

impl PumpWriter {
    pub(crate) async fn write(self, data: Bytes) {
        match self.session.write(&data).await {
            Ok(()) => {
                trace!(worker = %self.id, len = data.len(), "payload written");
                self.events.emit(Event::DataSent(data));
            }
            // Write failures surface through the read side as a lost session.
            Err(error) => debug!(worker = %self.id, %error, "write failed, dropping payload"),
        }
    }
}
