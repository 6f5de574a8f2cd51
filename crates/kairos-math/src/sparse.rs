//! Sparse matrix representation and linear-solver interface.
//!
//! Provides a CSR (Compressed Sparse Row) matrix for Jacobians and a
//! trait for the linear solves performed inside each nonlinear
//! iteration. Implementations: [`FaerLuSolver`](crate::faer_solver::FaerLuSolver)
//! (direct) and [`BiCgStabSolver`](crate::krylov::BiCgStabSolver) (iterative).

use serde::{Deserialize, Serialize};

/// Compressed Sparse Row (CSR) matrix.
///
/// Stores a sparse matrix in row-major order. Column indices are
/// sorted within each row and free of duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Row pointer array (length = rows + 1).
    /// `row_ptr[i]..row_ptr[i+1]` are the indices into `col_idx` and `values`
    /// for non-zeros in row `i`.
    pub row_ptr: Vec<usize>,
    /// Column indices of non-zero entries.
    pub col_idx: Vec<usize>,
    /// Non-zero values.
    pub values: Vec<f64>,
}

impl CsrMatrix {
    /// Creates an empty CSR matrix with the given dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_ptr: vec![0; rows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// The n×n identity.
    pub fn identity(n: usize) -> Self {
        Self {
            rows: n,
            cols: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    /// Returns the number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Creates a CSR matrix from triplets (row, col, value).
    ///
    /// Duplicate entries are summed. Entries outside the matrix
    /// bounds are rejected.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self, String> {
        if let Some(&(r, c, _)) = triplets.iter().find(|&&(r, c, _)| r >= rows || c >= cols) {
            return Err(format!(
                "Triplet ({r}, {c}) outside {rows}×{cols} matrix"
            ));
        }

        let mut sorted: Vec<(usize, usize, f64)> = triplets.to_vec();
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx = Vec::with_capacity(sorted.len());
        let mut values = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for (r, c, v) in sorted {
            if last == Some((r, c)) {
                if let Some(slot) = values.last_mut() {
                    *slot += v;
                }
                continue;
            }
            col_idx.push(c);
            values.push(v);
            row_ptr[r + 1] += 1;
            last = Some((r, c));
        }

        for i in 0..rows {
            row_ptr[i + 1] += row_ptr[i];
        }

        Ok(Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Iterates over stored entries as `(row, col, value)`.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.rows).flat_map(move |row| {
            (self.row_ptr[row]..self.row_ptr[row + 1])
                .map(move |idx| (row, self.col_idx[idx], self.values[idx]))
        })
    }

    /// Returns `shift * I + alpha * self` (square matrices only).
    pub fn shifted(&self, alpha: f64, shift: f64) -> Result<Self, String> {
        if self.rows != self.cols {
            return Err(format!(
                "Shift requires a square matrix, got {}×{}",
                self.rows, self.cols
            ));
        }
        let mut triplets: Vec<(usize, usize, f64)> = self
            .triplets()
            .map(|(r, c, v)| (r, c, alpha * v))
            .collect();
        triplets.extend((0..self.rows).map(|i| (i, i, shift)));
        Self::from_triplets(self.rows, self.cols, &triplets)
    }

    /// Computes `y = A x`.
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) -> Result<(), String> {
        if x.len() != self.cols || y.len() != self.rows {
            return Err(format!(
                "mul_vec dimensions: matrix {}×{}, x {}, y {}",
                self.rows,
                self.cols,
                x.len(),
                y.len()
            ));
        }
        for (row, out) in y.iter_mut().enumerate() {
            let mut sum = 0.0;
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                sum += self.values[idx] * x[self.col_idx[idx]];
            }
            *out = sum;
        }
        Ok(())
    }

    /// Diagonal entries (zero where no entry is stored).
    pub fn diagonal(&self) -> Vec<f64> {
        let n = self.rows.min(self.cols);
        let mut diag = vec![0.0; n];
        for (r, c, v) in self.triplets() {
            if r == c {
                diag[r] += v;
            }
        }
        diag
    }
}

/// Accuracy controls for one linear solve.
///
/// Direct solvers ignore both fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearSolveControls {
    /// Relative residual reduction `‖b - Ax‖ / ‖b‖` to reach.
    pub tolerance: f64,
    /// Iteration cap for iterative solvers.
    pub max_iterations: usize,
}

/// What a linear solve achieved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearSolveReport {
    /// Iterations performed (1 for a direct solve).
    pub iterations: usize,
    /// Final relative residual (0 for a direct solve).
    pub residual: f64,
    /// Whether the requested tolerance was met.
    pub converged: bool,
}

/// Trait for the linear solver used inside each nonlinear iteration.
///
/// The Jacobian changes every iteration, so `factorize` is called once
/// per Newton step followed by one `solve`.
pub trait LinearSolver: Send {
    /// Prepare for solves with `matrix` (factorization or preconditioner setup).
    fn factorize(&mut self, matrix: &CsrMatrix) -> Result<(), String>;

    /// Solve Ax = b for the last factorized matrix.
    /// Returns x in the provided output buffer.
    fn solve(
        &self,
        rhs: &[f64],
        solution: &mut [f64],
        controls: LinearSolveControls,
    ) -> Result<LinearSolveReport, String>;

    /// Returns true if the solver holds a valid factorization.
    fn is_factorized(&self) -> bool;

    /// Returns the solver's name.
    fn name(&self) -> &str;
}
