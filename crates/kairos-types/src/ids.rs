//! Strongly-typed identifiers.
//!
//! A newtype keeps solution-variable indices from being mixed up
//! with raw degree-of-freedom indices.

use serde::{Deserialize, Serialize};

/// Index of a solution variable (a contiguous block of degrees of freedom).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableId(pub u32);

impl VariableId {
    /// Returns the raw index as `usize` for array indexing.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for VariableId {
    fn from(val: u32) -> Self {
        Self(val)
    }
}

impl std::fmt::Display for VariableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "var{}", self.0)
    }
}
