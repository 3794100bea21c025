//! Offerer/answerer assignment.
//!
//! Both sides compute the same answer from the two identifiers alone, so no
//! coordination round-trip is needed. Identifiers are unique tokens, so ties
//! do not occur.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Initiates negotiation.
    Offerer,
    /// Waits for the offer.
    Answerer,
}

impl Role {
    pub fn flipped(self) -> Self {
        match self {
            Role::Offerer => Role::Answerer,
            Role::Answerer => Role::Offerer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Offerer => f.write_str("offerer"),
            Role::Answerer => f.write_str("answerer"),
        }
    }
}

/// Role of `local` towards `remote`: the lower identifier (ordinal byte
/// order) offers.
pub fn assign_role(local: &str, remote: &str) -> Role {
    if local < remote {
        Role::Offerer
    } else {
        Role::Answerer
    }
}

/// Whether `local` is the side allowed to start a role flip towards
/// `remote`. Only the greater identifier (the passive answerer) leads, so
/// the two sides never flip against each other.
pub fn is_flip_leader(local: &str, remote: &str) -> bool {
    local > remote
}
