#![deny(clippy::expect_used, clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! Single-peer session management over a stateful link transport.
//! 基于有状态链路传输的单对端会话管理。

pub mod config;
pub mod error;
pub mod event;
pub mod manager;
pub mod peer;
pub mod state;
pub mod transport;
pub mod worker;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{Event, EventStream};
pub use manager::{ConnectionManager, ManagerSnapshot};
pub use peer::PeerIdentity;
pub use state::ConnectionState;
