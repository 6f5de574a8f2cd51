//! Jacobi-preconditioned BiCGSTAB on top of `faer::matrix_free`.
//!
//! Iterative counterpart of [`FaerLuSolver`] that honours
//! [`LinearSolveControls`]: it stops once `‖b - Ax‖ < tolerance · ‖b‖` or
//! after `max_iterations`. Running out of iterations is not an error, the
//! last iterate is returned with `converged = false`. A non-finite iterate
//! (breakdown of the recurrence) is an error.

use faer::diag::Diag;
use faer::dyn_stack::{MemBuffer, MemStack};
use faer::matrix_free::bicgstab::{bicgstab, bicgstab_scratch, BicgError, BicgParams};
use faer::matrix_free::{IdentityPrecond, InitialGuessStatus};
use faer::sparse::SparseColMat;
use faer::{Col, Mat, Par};

use crate::faer_solver::FaerLuSolver;
use crate::sparse::{CsrMatrix, LinearSolveControls, LinearSolveReport, LinearSolver};

/// Diagonal entries at or below this magnitude are left unscaled.
const TINY_PIVOT: f64 = 1.0e-300;

struct Operator {
    csr: CsrMatrix,
    csc: SparseColMat<usize, f64>,
    /// Inverse diagonal; 1 where the diagonal entry is zero.
    inv_diag: Diag<f64>,
}

/// BiCGSTAB with diagonal (Jacobi) right preconditioning.
#[derive(Default)]
pub struct BiCgStabSolver {
    operator: Option<Operator>,
}

impl BiCgStabSolver {
    /// Creates a new solver with no matrix.
    pub fn new() -> Self {
        Self::default()
    }
}

fn l2(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

impl LinearSolver for BiCgStabSolver {
    fn factorize(&mut self, matrix: &CsrMatrix) -> Result<(), String> {
        self.operator = None;
        if matrix.rows != matrix.cols {
            return Err(format!(
                "Matrix must be square, got {}×{}",
                matrix.rows, matrix.cols
            ));
        }
        let diag = matrix.diagonal();
        let inv_diag = Col::from_fn(diag.len(), |i| {
            if diag[i].abs() > TINY_PIVOT {
                1.0 / diag[i]
            } else {
                1.0
            }
        })
        .into_diagonal();

        self.operator = Some(Operator {
            csr: matrix.clone(),
            csc: FaerLuSolver::csr_to_csc(matrix)?,
            inv_diag,
        });
        Ok(())
    }

    fn solve(
        &self,
        rhs: &[f64],
        solution: &mut [f64],
        controls: LinearSolveControls,
    ) -> Result<LinearSolveReport, String> {
        let op = self
            .operator
            .as_ref()
            .ok_or_else(|| "Solver not factorized. Call factorize() first.".to_string())?;
        let n = op.csr.rows;
        if rhs.len() != n || solution.len() != n {
            return Err(format!(
                "BiCGSTAB dimensions: matrix {n}, rhs {}, solution {}",
                rhs.len(),
                solution.len()
            ));
        }

        let b = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let mut x = Mat::<f64>::zeros(n, 1);

        let mut params = BicgParams::default();
        params.initial_guess = InitialGuessStatus::Zero;
        params.abs_tolerance = 0.0;
        params.rel_tolerance = controls.tolerance;
        params.max_iters = controls.max_iterations;

        let left = IdentityPrecond { dim: n };
        let mut buffer = MemBuffer::new(bicgstab_scratch(
            left,
            &op.inv_diag,
            &op.csc,
            1,
            Par::Seq,
        ));
        let result = bicgstab(
            x.as_mut(),
            left,
            &op.inv_diag,
            &op.csc,
            b.as_ref(),
            params,
            |_| {},
            Par::Seq,
            MemStack::new(&mut buffer),
        );

        for (i, out) in solution.iter_mut().enumerate() {
            *out = x[(i, 0)];
        }
        if solution.iter().any(|v| !v.is_finite()) {
            return Err("BiCGSTAB breakdown: non-finite iterate".into());
        }

        let (iterations, converged) = match result {
            Ok(info) => (info.iter_count, true),
            Err(BicgError::NoConvergence { .. }) => (controls.max_iterations, false),
        };

        // faer reports the initial residual on failure; measure the final one.
        let b_norm = l2(rhs);
        let residual = if b_norm > 0.0 {
            let mut ax = vec![0.0; n];
            op.csr.mul_vec(solution, &mut ax)?;
            let r: Vec<f64> = rhs.iter().zip(&ax).map(|(b, a)| b - a).collect();
            l2(&r) / b_norm
        } else {
            0.0
        };

        Ok(LinearSolveReport {
            iterations,
            residual,
            converged,
        })
    }

    fn is_factorized(&self) -> bool {
        self.operator.is_some()
    }

    fn name(&self) -> &str {
        "bicgstab_jacobi"
    }
}
