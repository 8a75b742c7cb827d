//! Node and group identity (spec.md §3 "NodeAddress").

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Address family, kept distinct from `IpAddr`'s own v4/v6 tagging because
/// the wire contract (spec.md §6 `newNode`) names it as a separate field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    /// IPv4.
    Inet,
    /// IPv6.
    Inet6,
}

/// A single node's network identity plus its group-qualified route
/// identifier (`eid`).
///
/// `Ord`/`Hash` are derived so a `NodeAddress` can key a `HashMap` (per
/// spec.md §4.1's `ForeignRanges[addr]`) and be sorted deterministically,
/// which spec.md §9 recommends for breaking dump-recovery replica ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Host IP.
    pub host: IpAddr,
    /// Port.
    pub port: u16,
    /// Address family.
    pub family: AddressFamily,
}

impl NodeAddress {
    /// Construct a new address.
    pub fn new(host: IpAddr, port: u16, family: AddressFamily) -> Self {
        NodeAddress { host, port, family }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            AddressFamily::Inet => write!(f, "{}:{}", self.host, self.port),
            AddressFamily::Inet6 => write!(f, "[{}]:{}", self.host, self.port),
        }
    }
}

/// The id of a single replica group within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display)]
pub struct GroupId(pub u32);

/// A group-qualified route identifier, opaque to this crate beyond byte
/// equality (spec.md §6 `routes.getAddressEid`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Eid(pub Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_v4_without_brackets() {
        let a = NodeAddress::new("127.0.0.1".parse().unwrap(), 1025, AddressFamily::Inet);
        assert_eq!(a.to_string(), "127.0.0.1:1025");
    }

    #[test]
    fn display_formats_v6_with_brackets() {
        let a = NodeAddress::new("::1".parse().unwrap(), 1025, AddressFamily::Inet6);
        assert_eq!(a.to_string(), "[::1]:1025");
    }

    #[test]
    fn ord_is_total() {
        let a = NodeAddress::new("10.0.0.1".parse().unwrap(), 1, AddressFamily::Inet);
        let b = NodeAddress::new("10.0.0.2".parse().unwrap(), 1, AddressFamily::Inet);
        assert!(a < b);
    }
}
