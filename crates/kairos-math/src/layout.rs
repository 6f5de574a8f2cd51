//! Variable layout of a solution vector and per-variable weights.
//!
//! A solution vector is a flat array of degrees of freedom partitioned
//! into contiguous blocks, one block per solution variable:
//! ```text
//! values: [u0, u1, u2, | v0, v1, v2, | p0]
//!          var0          var1          var2
//! ```

use std::ops::Range;

use kairos_types::{KairosError, KairosResult, VariableId};
use serde::{Deserialize, Serialize};

/// Partition of a degree-of-freedom vector into solution variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableLayout {
    /// Number of degrees of freedom per variable.
    sizes: Vec<usize>,
    /// Start offset of each variable block (length = sizes.len() + 1).
    offsets: Vec<usize>,
}

impl VariableLayout {
    /// A layout with a single variable covering `n_dofs` entries.
    pub fn uniform(n_dofs: usize) -> Self {
        Self::from_sizes(vec![n_dofs])
    }

    /// A layout with one block per entry of `sizes`.
    pub fn from_sizes(sizes: Vec<usize>) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        offsets.push(0);
        for &size in &sizes {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + size);
        }
        Self { sizes, offsets }
    }

    /// Number of solution variables.
    pub fn n_variables(&self) -> usize {
        self.sizes.len()
    }

    /// Total number of degrees of freedom.
    pub fn n_dofs(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// Degree-of-freedom range of one variable, `None` if out of range.
    pub fn range(&self, var: VariableId) -> Option<Range<usize>> {
        let i = var.index();
        if i >= self.sizes.len() {
            return None;
        }
        Some(self.offsets[i]..self.offsets[i + 1])
    }

    /// Iterates over `(variable, dof range)` pairs in order.
    pub fn blocks(&self) -> impl Iterator<Item = (VariableId, Range<usize>)> + '_ {
        self.offsets
            .windows(2)
            .enumerate()
            .map(|(i, w)| (VariableId(i as u32), w[0]..w[1]))
    }

    /// Fails with `DimensionMismatch` unless `len` equals the dof count.
    pub fn check_len(&self, context: &str, len: usize) -> KairosResult<()> {
        if len != self.n_dofs() {
            return Err(KairosError::dimension(context, self.n_dofs(), len));
        }
        Ok(())
    }
}

/// Per-variable error weights, indexed by [`VariableId`].
///
/// An empty mapping weights every variable equally (weight 1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentWeights(Vec<f64>);

impl ComponentWeights {
    /// Explicit weights, one per variable.
    pub fn new(weights: Vec<f64>) -> Self {
        Self(weights)
    }

    /// Uniform weighting (the empty mapping).
    pub fn uniform() -> Self {
        Self(Vec::new())
    }

    /// True when no explicit weights are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of explicit weights.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Weight of `var`; 1 when the mapping is empty.
    pub fn weight(&self, var: VariableId) -> f64 {
        if self.0.is_empty() {
            1.0
        } else {
            self.0.get(var.index()).copied().unwrap_or(0.0)
        }
    }

    /// Raw weight slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Checks that a non-empty mapping covers exactly the variables of
    /// `layout` and that every weight is finite and non-negative.
    pub fn validate(&self, layout: &VariableLayout) -> KairosResult<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        if self.0.len() != layout.n_variables() {
            return Err(KairosError::dimension(
                "component weights",
                layout.n_variables(),
                self.0.len(),
            ));
        }
        for (i, &w) in self.0.iter().enumerate() {
            if !w.is_finite() || w < 0.0 {
                return Err(KairosError::InvalidConfig(format!(
                    "component weight for var{i} must be finite and >= 0, got {w}"
                )));
            }
        }
        Ok(())
    }
}
