//! The group-scoped routing table (spec.md §3 "RouteTable").

use std::collections::HashMap;

use itertools::Itertools;
use recovery_errors::{invariant, RecoveryResult};
use serde::{Deserialize, Serialize};

use crate::address::{Eid, GroupId, NodeAddress};
use crate::key::{KeyId, ID_MAX, ID_MIN};
use crate::range::HashRange;

/// One `(range, owner)` entry of a group's routing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    /// The range this entry covers.
    pub range: HashRange,
    /// The address that owns `range`.
    pub owner: NodeAddress,
}

#[derive(Debug, Clone, Default)]
struct GroupRoutes {
    /// Sorted by `range.lo`, partitioning `[ID_MIN, ID_MAX]`.
    entries: Vec<RouteEntry>,
    eids: HashMap<NodeAddress, Eid>,
}

/// An ordered set of `(range, owner)` mappings, one such set per group.
///
/// Construct via [`RouteTableBuilder`], or deserialize one produced
/// elsewhere with `serde` — acquiring the table from the cluster is
/// explicitly out of scope for this crate (spec.md §1).
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    groups: HashMap<GroupId, GroupRoutes>,
}

impl RouteTable {
    /// The address that routing maps `key` to within `group`, or `None` if
    /// `group` is unknown to this table.
    pub fn lookup_address(&self, key: &KeyId, group: GroupId) -> Option<NodeAddress> {
        let routes = self.groups.get(&group)?;
        // `entries` is sorted and contiguous, so a linear scan is correct;
        // a binary search would also work but the savings aren't worth the
        // complexity at the entry counts these tables realistically have.
        routes
            .entries
            .iter()
            .find(|e| e.range.contains(key))
            .map(|e| e.owner.clone())
    }

    /// The ranges `addr` owns within `group`, sorted by `lo`. Empty if
    /// `addr` owns nothing in `group` (including if `group` is unknown).
    pub fn owned_ranges(&self, group: GroupId, addr: &NodeAddress) -> RecoveryResult<Vec<HashRange>> {
        let Some(routes) = self.groups.get(&group) else {
            return Ok(Vec::new());
        };
        Ok(routes
            .entries
            .iter()
            .filter(|e| &e.owner == addr)
            .map(|e| e.range)
            .collect())
    }

    /// All distinct addresses that own at least one range of `group`.
    pub fn addresses_in_group(&self, group: GroupId) -> Vec<NodeAddress> {
        let Some(routes) = self.groups.get(&group) else {
            return Vec::new();
        };
        let mut addrs: Vec<NodeAddress> = routes
            .entries
            .iter()
            .map(|e| e.owner.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        addrs.sort();
        addrs
    }

    /// Whether `addr` owns at least one range of `group`.
    pub fn group_contains(&self, group: GroupId, addr: &NodeAddress) -> bool {
        self.groups
            .get(&group)
            .is_some_and(|routes| routes.entries.iter().any(|e| &e.owner == addr))
    }

    /// The iterator `eid` for `addr` within `group` (spec.md §6
    /// `routes.getAddressEid`).
    pub fn get_address_eid(&self, group: GroupId, addr: &NodeAddress) -> Option<&Eid> {
        self.groups.get(&group)?.eids.get(addr)
    }

    /// All group ids known to this table.
    pub fn groups(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self.groups.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Check that `group`'s entries partition `[ID_MIN, ID_MAX]`: sorted,
    /// non-overlapping, contiguous, with no gaps (spec.md §3 "Invariants").
    pub fn validate_group(&self, group: GroupId) -> RecoveryResult<()> {
        let Some(routes) = self.groups.get(&group) else {
            return Ok(());
        };
        invariant!(!routes.entries.is_empty(), "group {group} has no entries");
        invariant!(
            routes.entries[0].range.lo == ID_MIN,
            "group {group} routing table doesn't start at ID_MIN"
        );
        for (a, b) in routes.entries.iter().tuple_windows() {
            invariant!(
                a.range.hi == b.range.lo,
                "group {group} routing table has a gap or overlap between {:?} and {:?}",
                a.range,
                b.range
            );
        }
        invariant!(
            routes.entries.last().unwrap().range.hi == ID_MAX,
            "group {group} routing table doesn't end at ID_MAX"
        );
        Ok(())
    }
}

/// Builder for [`RouteTable`], used by tests and by whatever loads the
/// table from its external source (e.g. a JSON file, per
/// `recovery-tools`).
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    table: RouteTable,
}

impl RouteTableBuilder {
    /// Start building an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `(range, owner)` entry to `group`.
    pub fn with_range(mut self, group: GroupId, lo: KeyId, hi: KeyId, owner: NodeAddress) -> Self {
        let routes = self.table.groups.entry(group).or_default();
        routes.entries.push(RouteEntry {
            range: HashRange::new(lo, hi),
            owner,
        });
        routes.entries.sort_by_key(|e| e.range.lo);
        self
    }

    /// Record the iterator `eid` for `owner` within `group`.
    pub fn with_eid(mut self, group: GroupId, owner: NodeAddress, eid: Eid) -> Self {
        let routes = self.table.groups.entry(group).or_default();
        routes.eids.insert(owner, eid);
        self
    }

    /// Finish building. Does not validate partition invariants; call
    /// [`RouteTable::validate_group`] if that matters for the caller.
    pub fn build(self) -> RouteTable {
        self.table
    }
}
