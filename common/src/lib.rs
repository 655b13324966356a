//! fxpair Common Types
//!
//! Value types shared by the fxpair crates: currency codes, validated rates,
//! amount inputs as typed by a user, and the fetch tokens used to order
//! rate requests.

pub mod identifiers;
pub mod monetary;

pub use identifiers::*;
pub use monetary::*;
