//! The listener worker: one accept, then done.

use super::WorkerId;
use crate::{error::Error, manager::Shared, transport::Listener};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Owns one open listener and the task parked in its `accept`.
///
/// The worker is single-shot. After the accept resolves the listener is closed
/// and the manager decides whether a fresh worker is needed.
///
/// 拥有一个打开的监听器以及阻塞在其 `accept` 上的任务。
///
/// 该工作者只执行一次。accept 返回后监听器即被关闭，是否需要新的工作者由管理器决定。
#[derive(Debug)]
pub(crate) struct ListenerWorker {
    id: WorkerId,
    listener: Arc<dyn Listener>,
}

impl ListenerWorker {
    pub(crate) fn spawn(shared: &Arc<Shared>, id: WorkerId, listener: Arc<dyn Listener>) -> Self {
        shared
            .runtime()
            .spawn(run(id, listener.clone(), Arc::downgrade(shared)));
        Self { id, listener }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Closes the listener; a pending accept returns with an error.
    pub(crate) fn cancel(&self) {
        debug!(worker = %self.id, "cancelling listener");
        self.listener.close();
    }
}

async fn run(id: WorkerId, listener: Arc<dyn Listener>, manager: Weak<Shared>) {
    let accepted = listener.accept().await;
    listener.close();
    drop(listener);

    let Some(manager) = manager.upgrade() else {
        if let Ok((session, _)) = accepted {
            session.close();
        }
        return;
    };

    match accepted {
        Ok((session, peer)) => {
            debug!(worker = %id, %peer, "inbound session accepted");
            manager.inbound_accepted(id, session, peer);
        }
        Err(Error::Closed) => {
            debug!(worker = %id, "listener closed");
            manager.listener_finished(id);
        }
        Err(error) => {
            warn!(worker = %id, %error, "accept failed");
            manager.listener_finished(id);
        }
    }
}
