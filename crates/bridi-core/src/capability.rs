//! # Capability Checks
//!
//! Permission predicates over a document's access descriptor. Reads are
//! consulted for query start entities and `resolve` targets; writes guard
//! payload updates and document merges. Both are pure functions of the
//! acting user and the descriptor.

use crate::primitives::GENESIS_OWNER;
use crate::types::{AccessDescriptor, UserId};

/// Decides whether a user may read or modify a document.
pub trait Capability: Send + Sync {
    fn can_read(&self, user: Option<&UserId>, access: &AccessDescriptor) -> bool;

    fn can_write(&self, user: Option<&UserId>, access: &AccessDescriptor) -> bool;
}

/// Owner-based policy: a document is readable by its owner, and documents
/// owned by the genesis identity are readable by everyone (anonymous
/// users included). Only the owner may write, genesis documents included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerPolicy {
    genesis_owner: UserId,
}

impl OwnerPolicy {
    #[must_use]
    pub fn new(genesis_owner: UserId) -> Self {
        Self { genesis_owner }
    }

    #[must_use]
    pub fn genesis_owner(&self) -> &UserId {
        &self.genesis_owner
    }
}

impl Default for OwnerPolicy {
    fn default() -> Self {
        Self::new(UserId::new(GENESIS_OWNER))
    }
}

impl Capability for OwnerPolicy {
    fn can_read(&self, user: Option<&UserId>, access: &AccessDescriptor) -> bool {
        access.owner == self.genesis_owner || user == Some(&access.owner)
    }

    fn can_write(&self, user: Option<&UserId>, access: &AccessDescriptor) -> bool {
        user == Some(&access.owner)
    }
}

/// Grants everything. Useful for trusted in-process callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowAll;

impl Capability for AllowAll {
    fn can_read(&self, _user: Option<&UserId>, _access: &AccessDescriptor) -> bool {
        true
    }

    fn can_write(&self, _user: Option<&UserId>, _access: &AccessDescriptor) -> bool {
        true
    }
}
