//! Canonical peer identity.
//!
//! Chat networks hand out the same identity in several numeric shapes:
//! unsigned wide integers from one API surface, signed narrow ones from
//! another, and channel ids carrying a `-100` marker prefix. Every identity
//! comparison in this crate goes through [`PeerId`] so the shapes collapse
//! to one canonical value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker offset applied to channel ids in their wide form
/// (`-100xxxxxxxxxx`).
const CHANNEL_MARK: i64 = 1_000_000_000_000;

/// A canonicalized peer identity (user, group, or channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(i64);

impl PeerId {
    /// Canonicalize a signed id.
    ///
    /// Channel-marked wide forms are stripped to the bare id; other negative
    /// group ids lose their sign. Positive ids pass through.
    pub fn new(raw: i64) -> Self {
        Self(canonical(raw))
    }

    /// Canonicalize an unsigned wide id.
    ///
    /// Values beyond `i64::MAX` are reinterpreted as their two's-complement
    /// signed form before canonicalization, so both integer widths of one
    /// peer compare equal.
    pub fn from_unsigned(raw: u64) -> Self {
        Self(canonical(raw as i64))
    }

    /// The canonical numeric value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn canonical(raw: i64) -> i64 {
    if raw <= -CHANNEL_MARK {
        -raw - CHANNEL_MARK
    } else if raw < 0 {
        -raw
    } else {
        raw
    }
}

/// Compare an optionally-known peer against a known one, canonically.
///
/// Returns false when the left side is unknown.
pub fn same_peer(a: Option<PeerId>, b: PeerId) -> bool {
    a == Some(b)
}
