// src/core/triad.rs

//! Implements replica ownership over a triad of servers.
//!
//! Every object hashes to one of six `OwnerTag`s. A tag is a permutation of the
//! member labels `A`, `B` and `C` and names which member of the object's
//! `ServerGroup` is primary, secondary and tertiary. Small groups degrade
//! gracefully: a one-server group owns everything in every role, and a two-server
//! group has no tertiary.
//!
//! The resolver is pure apart from the liveness query on members; it does no I/O
//! and holds no locks.

use std::fmt;
use std::sync::Arc;
use strum_macros::IntoStaticStr;

/// A member position inside a triad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntoStaticStr)]
pub enum Label {
    A,
    B,
    C,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::A, Label::B, Label::C];

    fn index(self) -> usize {
        self as usize
    }
}

/// The six-way rotation that assigns roles within a triad for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum OwnerTag {
    #[strum(serialize = "A_B")]
    AB,
    #[strum(serialize = "B_C")]
    BC,
    #[strum(serialize = "C_A")]
    CA,
    #[strum(serialize = "A_C")]
    AC,
    #[strum(serialize = "B_A")]
    BA,
    #[strum(serialize = "C_B")]
    CB,
}

impl OwnerTag {
    pub const ALL: [OwnerTag; 6] = [
        OwnerTag::AB,
        OwnerTag::BC,
        OwnerTag::CA,
        OwnerTag::AC,
        OwnerTag::BA,
        OwnerTag::CB,
    ];

    /// Derives the tag from an object key hash.
    pub fn from_hash(hash: u64) -> Self {
        Self::ALL[(hash % Self::ALL.len() as u64) as usize]
    }

    /// The nominal primary, secondary and tertiary labels.
    pub fn order(self) -> [Label; 3] {
        use Label::*;
        match self {
            OwnerTag::AB => [A, B, C],
            OwnerTag::BC => [B, C, A],
            OwnerTag::CA => [C, A, B],
            OwnerTag::AC => [A, C, B],
            OwnerTag::BA => [B, A, C],
            OwnerTag::CB => [C, B, A],
        }
    }
}

impl fmt::Display for OwnerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

/// What the resolver needs to know about a group member.
pub trait TriadMember {
    /// A cluster-wide index that identifies the member, used for exclusion.
    fn member_index(&self) -> usize;

    /// Whether the member's connection pool currently believes it is reachable.
    fn is_active(&self) -> bool;
}

impl<T: TriadMember + ?Sized> TriadMember for Arc<T> {
    fn member_index(&self) -> usize {
        (**self).member_index()
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }
}

/// The one to three servers eligible to hold replicas of an object.
#[derive(Debug, Clone)]
pub struct ServerGroup<T> {
    members: [Option<T>; 3],
}

impl<T: TriadMember> ServerGroup<T> {
    /// Builds a group from its labelled members.
    ///
    /// # Panics
    ///
    /// Panics if `c` is present while `b` is absent. That shape can only come from a
    /// broken topology configuration.
    pub fn new(a: T, b: Option<T>, c: Option<T>) -> Self {
        assert!(
            b.is_some() || c.is_none(),
            "server group has member C without member B"
        );
        Self {
            members: [Some(a), b, c],
        }
    }

    /// Builds a group from 1..=3 members in label order.
    ///
    /// # Panics
    ///
    /// Panics when `members` is empty or has more than three entries.
    pub fn from_members(members: Vec<T>) -> Self {
        assert!(
            (1..=3).contains(&members.len()),
            "server group needs 1 to 3 members, got {}",
            members.len()
        );
        let mut iter = members.into_iter();
        let a = iter.next();
        let b = iter.next();
        let c = iter.next();
        match a {
            Some(a) => Self::new(a, b, c),
            None => unreachable!("length checked above"),
        }
    }

    pub fn len(&self) -> usize {
        self.members.iter().filter(|m| m.is_some()).count()
    }

    /// Always false: a group has at least member `A`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, label: Label) -> Option<&T> {
        self.members[label.index()].as_ref()
    }

    pub fn members(&self) -> impl Iterator<Item = &T> {
        self.members.iter().flatten()
    }

    /// Resolves the primary, secondary and tertiary labels for `tag`.
    ///
    /// Each role takes its nominal label if that member is present and not already
    /// used by a higher role, otherwise the first present unused member in A, B, C
    /// order.
    fn role_labels(&self, tag: OwnerTag) -> [Option<Label>; 3] {
        if self.len() == 1 {
            return [Some(Label::A); 3];
        }

        let mut used = [false; 3];
        let mut roles = [None; 3];
        for (role, nominal) in tag.order().into_iter().enumerate() {
            let present_unused = |label: Label| {
                self.members[label.index()].is_some() && !used[label.index()]
            };
            let chosen = if present_unused(nominal) {
                Some(nominal)
            } else {
                Label::ALL.into_iter().find(|l| present_unused(*l))
            };
            if let Some(label) = chosen {
                used[label.index()] = true;
                roles[role] = Some(label);
            }
        }
        roles
    }

    fn role(&self, tag: OwnerTag, role: usize) -> Option<&T> {
        self.role_labels(tag)[role].and_then(|l| self.get(l))
    }

    /// The primary owner. Always present.
    pub fn primary(&self, tag: OwnerTag) -> &T {
        match self.role(tag, 0) {
            Some(member) => member,
            None => unreachable!("member A is always present"),
        }
    }

    pub fn secondary(&self, tag: OwnerTag) -> Option<&T> {
        self.role(tag, 1)
    }

    pub fn tertiary(&self, tag: OwnerTag) -> Option<&T> {
        self.role(tag, 2)
    }

    /// The distinct owners of `tag` in role order.
    pub fn owners(&self, tag: OwnerTag) -> Vec<&T> {
        let mut owners: Vec<&T> = Vec::with_capacity(3);
        for label in self.role_labels(tag).into_iter().flatten() {
            if let Some(member) = self.get(label)
                && !owners.iter().any(|o| o.member_index() == member.member_index())
            {
                owners.push(member);
            }
        }
        owners
    }

    /// Picks the best owner to talk to for `tag`.
    ///
    /// Returns the first live owner in role order that is not `excluding`. When no
    /// owner is live, falls back to the first non-excluded owner regardless of
    /// liveness, so a best-effort send still has a destination. `None` only when
    /// every owner is excluded.
    pub fn pick_active(&self, tag: OwnerTag, excluding: Option<usize>) -> Option<&T> {
        let owners = self.owners(tag);
        let allowed = |m: &&T| Some(m.member_index()) != excluding;

        owners
            .iter()
            .copied()
            .filter(allowed)
            .find(|m| m.is_active())
            .or_else(|| owners.iter().copied().find(allowed))
    }
}
