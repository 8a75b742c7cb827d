//! Parses the CLI's `host:port:family` address shorthand into a
//! [`NodeAddress`]. This lives in `recovery-tools` rather than
//! `recovery-core` because address string formats are a CLI/config
//! concern, not something the core state machine needs an opinion on.

use anyhow::{bail, Context};

use recovery_core::address::{AddressFamily, NodeAddress};

/// Parse `"host:port:family"`, where `family` is `inet` or `inet6`.
pub fn parse(s: &str) -> anyhow::Result<NodeAddress> {
    let mut parts = s.rsplitn(3, ':');
    let family_str = parts.next().context("missing family in address")?;
    let port_str = parts.next().context("missing port in address")?;
    let host_str = parts.next().context("missing host in address")?;

    let family = match family_str {
        "inet" => AddressFamily::Inet,
        "inet6" => AddressFamily::Inet6,
        other => bail!("unknown address family {other:?}, expected \"inet\" or \"inet6\""),
    };
    let port: u16 = port_str
        .parse()
        .with_context(|| format!("invalid port {port_str:?} in address {s:?}"))?;
    let host = host_str
        .parse()
        .with_context(|| format!("invalid host {host_str:?} in address {s:?}"))?;

    Ok(NodeAddress::new(host, port, family))
}
