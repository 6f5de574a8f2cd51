//! Error norms over solution-difference and residual vectors.
//!
//! Each variable block is reduced to a scalar in the chosen discrete
//! norm, scaled by its component weight, then the per-variable values
//! are combined in the same norm:
//!
//! ```text
//! L1:  Σ w_v ‖e_v‖₁
//! L2:  sqrt(Σ (w_v ‖e_v‖₂)²)
//! L∞:  max w_v ‖e_v‖∞
//! ```
//!
//! With uniform weights this reduces to the plain vector norm.

use kairos_types::{KairosError, KairosResult};
use serde::{Deserialize, Serialize};

use crate::layout::{ComponentWeights, VariableLayout};

/// Which discrete norm to evaluate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormType {
    /// Sum of absolute values.
    DiscreteL1,
    /// Euclidean norm.
    #[default]
    DiscreteL2,
    /// Largest absolute value.
    DiscreteLInf,
}

/// Deterministic, side-effect-free norm evaluator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormEvaluator {
    /// Norm used for both the per-variable reduction and the combination.
    pub norm_type: NormType,
}

impl NormEvaluator {
    /// Creates an evaluator for the given norm.
    pub fn new(norm_type: NormType) -> Self {
        Self { norm_type }
    }

    /// Weighted norm of `difference` partitioned by `layout`.
    ///
    /// Fails with `DimensionMismatch` if the vector length differs from
    /// the layout, or if non-empty `weights` do not cover exactly the
    /// layout's variables.
    pub fn evaluate(
        &self,
        difference: &[f64],
        layout: &VariableLayout,
        weights: &ComponentWeights,
    ) -> KairosResult<f64> {
        layout.check_len("norm input", difference.len())?;
        weights.validate(layout)?;

        let mut acc = 0.0_f64;
        for (var, range) in layout.blocks() {
            let w = weights.weight(var);
            let block = self.block_norm(difference[range].iter().copied());
            acc = self.combine(acc, w * block);
        }
        Ok(self.finish(acc))
    }

    /// Weighted norm of `a - b` without allocating the difference.
    pub fn difference(
        &self,
        a: &[f64],
        b: &[f64],
        layout: &VariableLayout,
        weights: &ComponentWeights,
    ) -> KairosResult<f64> {
        if a.len() != b.len() {
            return Err(KairosError::dimension("norm difference", a.len(), b.len()));
        }
        layout.check_len("norm difference", a.len())?;
        weights.validate(layout)?;

        let mut acc = 0.0_f64;
        for (var, range) in layout.blocks() {
            let w = weights.weight(var);
            let block = self.block_norm(
                a[range.clone()]
                    .iter()
                    .zip(&b[range])
                    .map(|(x, y)| x - y),
            );
            acc = self.combine(acc, w * block);
        }
        Ok(self.finish(acc))
    }

    /// Unweighted norm of a whole vector (single-variable view).
    pub fn vector(&self, values: &[f64]) -> f64 {
        let block = self.block_norm(values.iter().copied());
        self.finish(self.combine(0.0, block))
    }

    fn block_norm(&self, values: impl Iterator<Item = f64>) -> f64 {
        match self.norm_type {
            NormType::DiscreteL1 => values.map(f64::abs).sum(),
            NormType::DiscreteL2 => values.map(|v| v * v).sum::<f64>().sqrt(),
            NormType::DiscreteLInf => values.map(f64::abs).fold(0.0, nan_max),
        }
    }

    fn combine(&self, acc: f64, weighted: f64) -> f64 {
        match self.norm_type {
            NormType::DiscreteL1 => acc + weighted,
            NormType::DiscreteL2 => acc + weighted * weighted,
            NormType::DiscreteLInf => nan_max(acc, weighted),
        }
    }

    fn finish(&self, acc: f64) -> f64 {
        match self.norm_type {
            NormType::DiscreteL2 => acc.sqrt(),
            _ => acc,
        }
    }
}

/// `max` that propagates NaN so a poisoned vector never reports a finite norm.
fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}
