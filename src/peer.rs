//! Remote endpoint identity.
//! 远端端点身份。

use std::fmt;

/// An opaque identifier plus a human-readable name of a remote endpoint.
///
/// The address is whatever the transport understands (a radio MAC, a
/// `host:port` string, ...); the manager never interprets it.
///
/// 远端端点的不透明标识符及可读名称。
///
/// 地址的格式由传输层决定，管理器从不解析它。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    address: String,
    name: String,
}

impl PeerIdentity {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// An identity whose display name is its address.
    /// 以地址作为显示名称的身份。
    pub fn anonymous(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: address.clone(),
            address,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.address {
            f.write_str(&self.address)
        } else {
            write!(f, "{} [{}]", self.name, self.address)
        }
    }
}
