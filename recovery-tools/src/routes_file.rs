//! Loads a [`RouteTable`] from a JSON file (`--routes-file`). Acquiring the
//! routing table from the live cluster is explicitly out of scope for
//! `recovery-core` (spec.md §1); this is the file-based stand-in
//! `recovery-tools` supplies so the CLI is actually runnable end-to-end.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use recovery_core::address::{Eid, GroupId};
use recovery_core::key::KeyId;
use recovery_core::route::{RouteTable, RouteTableBuilder};

use crate::addr;

/// One `(range, owner)` entry as it appears in the routes file.
#[derive(Debug, Deserialize)]
struct FileEntry {
    group: u32,
    /// Inclusive lower bound, as a 128-hex-character string.
    lo: String,
    /// Exclusive upper bound, as a 128-hex-character string.
    hi: String,
    /// Owner address, `host:port:family`.
    owner: String,
    /// This owner's iterator eid within the group, as a hex string.
    eid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileTable {
    entries: Vec<FileEntry>,
}

/// Load and parse `path` into a [`RouteTable`].
pub fn load(path: &Path) -> anyhow::Result<RouteTable> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading routes file {}", path.display()))?;
    let file: FileTable = serde_json::from_str(&contents)
        .with_context(|| format!("parsing routes file {}", path.display()))?;

    let mut builder = RouteTableBuilder::new();
    for entry in file.entries {
        let group = GroupId(entry.group);
        let lo: KeyId = entry
            .lo
            .parse()
            .with_context(|| format!("parsing lo bound {:?}", entry.lo))?;
        let hi: KeyId = entry
            .hi
            .parse()
            .with_context(|| format!("parsing hi bound {:?}", entry.hi))?;
        let owner = addr::parse(&entry.owner)
            .with_context(|| format!("parsing owner address {:?}", entry.owner))?;
        builder = builder.with_range(group, lo, hi, owner.clone());
        if let Some(eid_hex) = entry.eid {
            let eid = hex::decode(&eid_hex).with_context(|| format!("parsing eid {eid_hex:?}"))?;
            builder = builder.with_eid(group, owner, Eid(eid));
        }
    }
    Ok(builder.build())
}
