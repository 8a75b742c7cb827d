//! Hash ranges and the [`foreign_ranges`] builder (spec.md §4.1 "RangeSet
//! builder").

use std::collections::HashMap;

use itertools::Itertools;
use recovery_errors::{invariant, RecoveryResult};
use serde::{Deserialize, Serialize};

use crate::address::{GroupId, NodeAddress};
use crate::key::{KeyId, ID_MAX, ID_MIN};
use crate::route::RouteTable;

/// A half-open range `[lo, hi)` of the key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRange {
    /// Inclusive lower bound.
    pub lo: KeyId,
    /// Exclusive upper bound.
    pub hi: KeyId,
}

impl HashRange {
    /// Construct a range, panicking in debug builds if `lo >= hi` (callers
    /// within this crate always pass validated bounds; see
    /// [`HashRange::checked`] for a fallible constructor).
    pub fn new(lo: KeyId, hi: KeyId) -> Self {
        debug_assert!(lo < hi, "HashRange bounds must satisfy lo < hi");
        HashRange { lo, hi }
    }

    /// Construct a range, returning an error rather than panicking when
    /// `lo >= hi`.
    pub fn checked(lo: KeyId, hi: KeyId) -> RecoveryResult<Self> {
        invariant!(lo < hi, "HashRange requires lo < hi");
        Ok(HashRange { lo, hi })
    }

    /// Whether `key` falls within this half-open range.
    pub fn contains(&self, key: &KeyId) -> bool {
        *key >= self.lo && *key < self.hi
    }
}

/// The outcome of [`foreign_ranges`] for one-node mode: either the normal
/// per-address map, or a signal that the supplied address isn't part of
/// this group's routing table at all, meaning the caller should skip the
/// whole group (spec.md §4.1 "Edge cases").
pub enum ForeignRangesResult {
    /// Foreign ranges keyed by address; addresses that own the entire
    /// keyspace are omitted.
    Ranges(HashMap<NodeAddress, Vec<HashRange>>),
    /// `one_node` was supplied but is absent from the group's routing
    /// table.
    SkipGroup,
}

/// Compute, for each address owning at least one range of `group` (or just
/// `one_node` if supplied), the list of ranges it does *not* own.
///
/// Pure and deterministic: no I/O, no randomness.
pub fn foreign_ranges(
    routes: &RouteTable,
    group: GroupId,
    one_node: Option<&NodeAddress>,
) -> RecoveryResult<ForeignRangesResult> {
    let addresses: Vec<NodeAddress> = match one_node {
        Some(addr) => {
            if !routes.group_contains(group, addr) {
                return Ok(ForeignRangesResult::SkipGroup);
            }
            vec![addr.clone()]
        }
        None => routes.addresses_in_group(group),
    };

    let mut result = HashMap::with_capacity(addresses.len());
    for addr in addresses {
        let owned = routes.owned_ranges(group, &addr)?;
        let foreign = complement(&owned)?;
        if !foreign.is_empty() {
            result.insert(addr, foreign);
        }
    }
    Ok(ForeignRangesResult::Ranges(result))
}

/// Complement a sorted, non-overlapping list of owned ranges within
/// `[ID_MIN, ID_MAX]`.
fn complement(owned: &[HashRange]) -> RecoveryResult<Vec<HashRange>> {
    if owned.is_empty() {
        return Ok(vec![HashRange::new(ID_MIN, ID_MAX)]);
    }

    for (a, b) in owned.iter().tuple_windows() {
        invariant!(a.hi <= b.lo, "owned ranges must be sorted and non-overlapping");
    }

    let mut foreign = Vec::new();
    if owned[0].lo > ID_MIN {
        foreign.push(HashRange::new(ID_MIN, owned[0].lo));
    }
    for (a, b) in owned.iter().tuple_windows() {
        if a.hi < b.lo {
            foreign.push(HashRange::new(a.hi, b.lo));
        }
    }
    if owned.last().unwrap().hi < ID_MAX {
        foreign.push(HashRange::new(owned.last().unwrap().hi, ID_MAX));
    }
    Ok(foreign)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteTableBuilder;

    fn key(byte: u8) -> KeyId {
        let mut bytes = [0u8; 64];
        bytes[0] = byte;
        KeyId::from_bytes(bytes)
    }

    fn addr(n: u8) -> NodeAddress {
        use crate::address::AddressFamily;
        NodeAddress::new(
            std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, n)),
            1025,
            AddressFamily::Inet,
        )
    }

    #[test]
    fn sole_owner_has_no_foreign_ranges() {
        let group = GroupId(1);
        let a = addr(1);
        let routes = RouteTableBuilder::new()
            .with_range(group, ID_MIN, ID_MAX, a.clone())
            .build();

        let ForeignRangesResult::Ranges(map) = foreign_ranges(&routes, group, None).unwrap()
        else {
            panic!("expected Ranges");
        };
        assert!(!map.contains_key(&a));
    }

    #[test]
    fn non_owner_sees_whole_keyspace() {
        let group = GroupId(1);
        let a = addr(1);
        let b = addr(2);
        let routes = RouteTableBuilder::new()
            .with_range(group, ID_MIN, ID_MAX, a.clone())
            .build();

        let ForeignRangesResult::Ranges(map) = foreign_ranges(&routes, group, Some(&b)).unwrap()
        else {
            panic!("expected Ranges");
        };
        // b owns nothing in this group, so it isn't even in the routing table.
        assert!(map.is_empty() || !map.contains_key(&b));
    }

    #[test]
    fn gap_between_owned_ranges_is_foreign() {
        let group = GroupId(1);
        let a = addr(1);
        let b = addr(2);
        let c = addr(3);
        let routes = RouteTableBuilder::new()
            .with_range(group, ID_MIN, key(10), a.clone())
            .with_range(group, key(10), key(20), b.clone())
            .with_range(group, key(20), ID_MAX, c.clone())
            .build();

        let ForeignRangesResult::Ranges(map) = foreign_ranges(&routes, group, None).unwrap()
        else {
            panic!("expected Ranges");
        };
        let a_foreign = &map[&a];
        assert_eq!(a_foreign.len(), 1);
        assert_eq!(a_foreign[0], HashRange::new(key(10), ID_MAX));

        let b_foreign = &map[&b];
        assert_eq!(
            b_foreign,
            &vec![
                HashRange::new(ID_MIN, key(10)),
                HashRange::new(key(20), ID_MAX)
            ]
        );
    }

    #[test]
    fn one_node_absent_from_group_skips() {
        let group = GroupId(1);
        let a = addr(1);
        let stranger = addr(99);
        let routes = RouteTableBuilder::new()
            .with_range(group, ID_MIN, ID_MAX, a)
            .build();

        assert!(matches!(
            foreign_ranges(&routes, group, Some(&stranger)).unwrap(),
            ForeignRangesResult::SkipGroup
        ));
    }

    #[test]
    fn union_of_foreign_and_owned_covers_whole_keyspace() {
        let group = GroupId(1);
        let a = addr(1);
        let b = addr(2);
        let routes = RouteTableBuilder::new()
            .with_range(group, ID_MIN, key(128), a.clone())
            .with_range(group, key(128), ID_MAX, b.clone())
            .build();

        let ForeignRangesResult::Ranges(map) = foreign_ranges(&routes, group, None).unwrap()
        else {
            panic!("expected Ranges");
        };
        let owned_a = routes.owned_ranges(group, &a).unwrap();
        let foreign_a = &map[&a];
        assert_eq!(owned_a.len() + foreign_a.len(), 2);
        assert_eq!(owned_a[0].lo, ID_MIN);
        assert_eq!(foreign_a[0].hi, ID_MAX);
    }

    /// For any partition of the keyspace into arbitrarily many owners, each
    /// owner's foreign ranges must tile exactly with its owned ranges: no
    /// gap, no overlap, full `[ID_MIN, ID_MAX]` coverage.
    #[test_strategy::proptest]
    fn foreign_ranges_tile_the_keyspace_with_owned_ranges(
        #[strategy(proptest::collection::btree_set(1u8..=254, 1..8))] raw_splits: std::collections::BTreeSet<u8>,
    ) {
        let group = GroupId(1);
        let mut builder = RouteTableBuilder::new();
        let mut lo = ID_MIN;
        let mut owner_idx = 0u8;
        for split in raw_splits {
            builder = builder.with_range(group, lo, key(split), addr(owner_idx));
            lo = key(split);
            owner_idx += 1;
        }
        builder = builder.with_range(group, lo, ID_MAX, addr(owner_idx));
        let routes = builder.build();
        routes.validate_group(group).unwrap();

        let ForeignRangesResult::Ranges(map) = foreign_ranges(&routes, group, None).unwrap()
        else {
            panic!("expected Ranges");
        };

        for a in routes.addresses_in_group(group) {
            let owned = routes.owned_ranges(group, &a).unwrap();
            let foreign = map.get(&a).cloned().unwrap_or_default();

            let mut tiled: Vec<HashRange> = owned.into_iter().chain(foreign).collect();
            tiled.sort_by_key(|r| r.lo);
            assert_eq!(tiled[0].lo, ID_MIN);
            assert_eq!(tiled.last().unwrap().hi, ID_MAX);
            for (x, y) in tiled.iter().tuple_windows() {
                assert_eq!(x.hi, y.lo);
            }
        }
    }
}
