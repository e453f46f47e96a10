// tests/property/triad_test.rs

//! Property-based tests for owner roles and owner selection.

use proptest::prelude::*;
use std::collections::HashSet;
use triadstore::core::triad::{OwnerTag, ServerGroup, TriadMember};

#[derive(Debug, Clone)]
struct Member {
    index: usize,
    live: bool,
}

impl TriadMember for Member {
    fn member_index(&self) -> usize {
        self.index
    }

    fn is_active(&self) -> bool {
        self.live
    }
}

fn group(liveness: &[bool]) -> ServerGroup<Member> {
    ServerGroup::from_members(
        liveness
            .iter()
            .enumerate()
            .map(|(index, &live)| Member { index, live })
            .collect(),
    )
}

proptest! {
    #[test]
    fn test_owners_are_distinct_and_cover_group(
        hash in any::<u64>(),
        liveness in prop::collection::vec(any::<bool>(), 1..=3)
    ) {
        let group = group(&liveness);
        let tag = OwnerTag::from_hash(hash);
        let owners = group.owners(tag);

        let indices: HashSet<usize> = owners.iter().map(|m| m.index).collect();
        prop_assert_eq!(indices.len(), owners.len());
        prop_assert_eq!(owners.len(), liveness.len());
        prop_assert_eq!(owners[0].index, group.primary(tag).index);
    }

    #[test]
    fn test_roles_never_repeat_a_member(
        hash in any::<u64>(),
        size in 2usize..=3
    ) {
        let group = group(&vec![true; size]);
        let tag = OwnerTag::from_hash(hash);
        let primary = group.primary(tag).index;
        let secondary = group.secondary(tag).map(|m| m.index);
        let tertiary = group.tertiary(tag).map(|m| m.index);

        prop_assert!(secondary.is_some());
        prop_assert_ne!(Some(primary), secondary);
        if let Some(tertiary) = tertiary {
            prop_assert_ne!(primary, tertiary);
            prop_assert_ne!(secondary, Some(tertiary));
        }
        prop_assert_eq!(tertiary.is_some(), size == 3);
    }

    #[test]
    fn test_pick_active_prefers_live_owner(
        hash in any::<u64>(),
        liveness in prop::collection::vec(any::<bool>(), 1..=3)
    ) {
        let group = group(&liveness);
        let tag = OwnerTag::from_hash(hash);
        let picked = group.pick_active(tag, None);

        prop_assert!(picked.is_some());
        let picked = picked.unwrap();
        if liveness.iter().any(|live| *live) {
            prop_assert!(picked.live);
            // No live owner ranks ahead of the picked one.
            let owners = group.owners(tag);
            let rank = owners.iter().position(|m| m.index == picked.index).unwrap();
            prop_assert!(owners[..rank].iter().all(|m| !m.live));
        } else {
            prop_assert_eq!(picked.index, group.primary(tag).index);
        }
    }

    #[test]
    fn test_pick_active_honours_exclusion(
        hash in any::<u64>(),
        liveness in prop::collection::vec(any::<bool>(), 2..=3),
        excluded in 0usize..3
    ) {
        let group = group(&liveness);
        let tag = OwnerTag::from_hash(hash);
        if let Some(picked) = group.pick_active(tag, Some(excluded)) {
            prop_assert_ne!(picked.index, excluded);
        }
    }
}
