//! The initiator worker: a single outbound connect attempt.

use super::WorkerId;
use crate::{manager::Shared, peer::PeerIdentity, transport::Session};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Owns the unconnected handle of one outbound attempt.
///
/// 拥有一次出站尝试的未连接句柄。
#[derive(Debug)]
pub(crate) struct InitiatorWorker {
    id: WorkerId,
    peer: PeerIdentity,
    session: Arc<dyn Session>,
}

impl InitiatorWorker {
    pub(crate) fn spawn(
        shared: &Arc<Shared>,
        id: WorkerId,
        session: Arc<dyn Session>,
        peer: PeerIdentity,
    ) -> Self {
        shared.runtime().spawn(run(
            id,
            session.clone(),
            peer.clone(),
            Arc::downgrade(shared),
        ));
        Self { id, peer, session }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Closes the in-flight handle; a pending connect returns with an error.
    pub(crate) fn cancel(&self) {
        debug!(worker = %self.id, peer = %self.peer, "cancelling outbound attempt");
        self.session.close();
    }
}

async fn run(id: WorkerId, session: Arc<dyn Session>, peer: PeerIdentity, manager: Weak<Shared>) {
    let outcome = session.connect().await;

    let Some(manager) = manager.upgrade() else {
        session.close();
        return;
    };

    match outcome {
        Ok(()) => manager.initiator_connected(id, session, peer),
        Err(error) => {
            session.close();
            manager.initiator_failed(id, peer, error);
        }
    }
}
