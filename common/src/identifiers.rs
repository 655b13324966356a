//! Identifier types for fxpair entities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence number issued to every rate fetch.
///
/// Tokens are strictly increasing in issue order, which is what lets the rate
/// store tell a superseded response from the newest one regardless of the
/// order in which responses arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FetchToken(u64);

impl FetchToken {
    /// Token that precedes every issued token.
    pub const INITIAL: FetchToken = FetchToken(0);

    /// Create a token from a raw sequence number.
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The token issued right after this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the raw sequence number.
    pub fn seq(&self) -> u64 {
        self.0
    }
}

impl Default for FetchToken {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for FetchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
