//! The three worker roles driven by the `ConnectionManager`.
//!
//! Each worker is a Tokio task parameterized by the one transport handle it
//! owns. A worker never touches manager state directly: it reports back through
//! the manager, which checks the worker's [`WorkerId`] against the current slot
//! before acting, so a superseded worker can never overwrite its replacement.
//!
//! 由 `ConnectionManager` 驱动的三种工作者角色。
//!
//! 每个工作者都是一个 Tokio 任务，参数为它所拥有的传输句柄。工作者从不直接修改管理器状态，
//! 而是回报给管理器；管理器在处理前会将工作者的 [`WorkerId`] 与当前槽位比对，
//! 因此被取代的工作者永远无法覆盖其替代者。

pub(crate) mod initiator;
pub(crate) mod listener;
pub(crate) mod pump;

use std::fmt;

pub(crate) use initiator::InitiatorWorker;
pub(crate) use listener::ListenerWorker;
pub(crate) use pump::SessionPump;

/// Identity of one worker instance, unique within its manager.
///
/// 工作者实例的标识，在其管理器内唯一。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub(crate) u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
