//! Integration tests for kairos-math.

use kairos_math::faer_solver::FaerLuSolver;
use kairos_math::krylov::BiCgStabSolver;
use kairos_math::layout::{ComponentWeights, VariableLayout};
use kairos_math::norm::{NormEvaluator, NormType};
use kairos_math::sparse::{CsrMatrix, LinearSolveControls, LinearSolver};
use kairos_types::{KairosError, VariableId};

fn controls(tolerance: f64, max_iterations: usize) -> LinearSolveControls {
    LinearSolveControls {
        tolerance,
        max_iterations,
    }
}

/// Unsymmetric, diagonally dominant 3×3 test matrix.
fn test_matrix() -> CsrMatrix {
    CsrMatrix::from_triplets(
        3,
        3,
        &[
            (0, 0, 4.0),
            (0, 1, 1.0),
            (1, 0, 2.0),
            (1, 1, 5.0),
            (1, 2, 1.0),
            (2, 1, -1.0),
            (2, 2, 3.0),
        ],
    )
    .unwrap()
}

fn residual_norm(a: &CsrMatrix, x: &[f64], b: &[f64]) -> f64 {
    let mut ax = vec![0.0; b.len()];
    a.mul_vec(x, &mut ax).unwrap();
    ax.iter()
        .zip(b)
        .map(|(l, r)| (l - r) * (l - r))
        .sum::<f64>()
        .sqrt()
}

// ─── Layout Tests ─────────────────────────────────────────────

#[test]
fn uniform_layout_has_one_variable() {
    let layout = VariableLayout::uniform(5);
    assert_eq!(layout.n_variables(), 1);
    assert_eq!(layout.n_dofs(), 5);
    assert_eq!(layout.range(VariableId(0)), Some(0..5));
    assert_eq!(layout.range(VariableId(1)), None);
}

#[test]
fn layout_blocks_are_contiguous() {
    let layout = VariableLayout::from_sizes(vec![2, 3, 1]);
    let blocks: Vec<_> = layout.blocks().collect();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0], (VariableId(0), 0..2));
    assert_eq!(blocks[1], (VariableId(1), 2..5));
    assert_eq!(blocks[2], (VariableId(2), 5..6));
    assert_eq!(layout.n_dofs(), 6);
}

#[test]
fn weights_must_cover_every_variable() {
    let layout = VariableLayout::from_sizes(vec![1, 1, 1]);
    let weights = ComponentWeights::new(vec![1.0, 2.0]);
    let err = weights.validate(&layout).unwrap_err();
    assert!(matches!(
        err,
        KairosError::DimensionMismatch {
            expected: 3,
            found: 2,
            ..
        }
    ));
}

#[test]
fn negative_weight_is_rejected() {
    let layout = VariableLayout::from_sizes(vec![1, 1]);
    let weights = ComponentWeights::new(vec![1.0, -0.5]);
    assert!(matches!(
        weights.validate(&layout),
        Err(KairosError::InvalidConfig(_))
    ));
}

#[test]
fn weights_serialize_as_plain_list() {
    let weights = ComponentWeights::new(vec![1.0, 0.5]);
    let json = serde_json::to_string(&weights).unwrap();
    assert_eq!(json, "[1.0,0.5]");
    let back: ComponentWeights = serde_json::from_str(&json).unwrap();
    assert_eq!(back, weights);
}

// ─── Norm Tests ───────────────────────────────────────────────

#[test]
fn zero_difference_has_zero_norm() {
    let layout = VariableLayout::from_sizes(vec![2, 2]);
    let zero = vec![0.0; 4];
    for norm_type in [NormType::DiscreteL1, NormType::DiscreteL2, NormType::DiscreteLInf] {
        let eval = NormEvaluator::new(norm_type);
        let uniform = eval.evaluate(&zero, &layout, &ComponentWeights::uniform()).unwrap();
        let weighted = eval
            .evaluate(&zero, &layout, &ComponentWeights::new(vec![3.0, 0.1]))
            .unwrap();
        assert_eq!(uniform, 0.0);
        assert_eq!(weighted, 0.0);
    }
}

#[test]
fn uniform_l2_matches_euclidean_norm() {
    let layout = VariableLayout::from_sizes(vec![1, 2]);
    let eval = NormEvaluator::default();
    let n = eval
        .evaluate(&[3.0, 4.0, 12.0], &layout, &ComponentWeights::uniform())
        .unwrap();
    assert!((n - 13.0).abs() < 1e-12);
}

#[test]
fn weighted_l2_scales_each_variable() {
    let layout = VariableLayout::from_sizes(vec![1, 1]);
    let eval = NormEvaluator::new(NormType::DiscreteL2);
    let n = eval
        .evaluate(&[3.0, 4.0], &layout, &ComponentWeights::new(vec![0.0, 2.0]))
        .unwrap();
    assert!((n - 8.0).abs() < 1e-12);
}

#[test]
fn l1_and_linf_norms() {
    let layout = VariableLayout::from_sizes(vec![2, 1]);
    let diff = [1.0, -2.0, 5.0];
    let l1 = NormEvaluator::new(NormType::DiscreteL1)
        .evaluate(&diff, &layout, &ComponentWeights::new(vec![2.0, 1.0]))
        .unwrap();
    let linf = NormEvaluator::new(NormType::DiscreteLInf)
        .evaluate(&diff, &layout, &ComponentWeights::new(vec![3.0, 1.0]))
        .unwrap();
    assert!((l1 - 11.0).abs() < 1e-12); // 2*(1+2) + 5
    assert!((linf - 6.0).abs() < 1e-12); // max(3*2, 5)
}

#[test]
fn norm_rejects_wrong_length() {
    let layout = VariableLayout::uniform(3);
    let err = NormEvaluator::default()
        .evaluate(&[1.0, 2.0], &layout, &ComponentWeights::uniform())
        .unwrap_err();
    assert!(matches!(err, KairosError::DimensionMismatch { .. }));
}

#[test]
fn norm_rejects_mismatched_weights() {
    let layout = VariableLayout::from_sizes(vec![1, 1]);
    let err = NormEvaluator::default()
        .evaluate(&[1.0, 2.0], &layout, &ComponentWeights::new(vec![1.0]))
        .unwrap_err();
    assert!(matches!(err, KairosError::DimensionMismatch { .. }));
}

#[test]
fn difference_matches_explicit_subtraction() {
    let layout = VariableLayout::from_sizes(vec![2, 1]);
    let weights = ComponentWeights::new(vec![1.0, 0.5]);
    let a = [1.0, 2.0, 3.0];
    let b = [0.5, 2.5, 1.0];
    let diff: Vec<f64> = a.iter().zip(&b).map(|(x, y)| x - y).collect();
    let eval = NormEvaluator::default();
    let direct = eval.evaluate(&diff, &layout, &weights).unwrap();
    let fused = eval.difference(&a, &b, &layout, &weights).unwrap();
    assert!((direct - fused).abs() < 1e-15);
}

#[test]
fn linf_propagates_nan() {
    let eval = NormEvaluator::new(NormType::DiscreteLInf);
    assert!(eval.vector(&[1.0, f64::NAN, 2.0]).is_nan());
}

// ─── Sparse Matrix Tests ─────────────────────────────────────

#[test]
fn csr_from_triplets() {
    let m = CsrMatrix::from_triplets(3, 3, &[(0, 0, 1.0), (1, 1, 2.0), (2, 2, 3.0)]).unwrap();
    assert_eq!(m.nnz(), 3);
    assert_eq!(m.row_ptr, vec![0, 1, 2, 3]);
}

#[test]
fn csr_sums_duplicates_and_sorts_columns() {
    let m = CsrMatrix::from_triplets(2, 2, &[(0, 1, 1.0), (0, 0, 2.0), (0, 1, 3.0)]).unwrap();
    assert_eq!(m.nnz(), 2);
    assert_eq!(m.col_idx, vec![0, 1]);
    assert_eq!(m.values, vec![2.0, 4.0]);
    assert_eq!(m.row_ptr, vec![0, 2, 2]);
}

#[test]
fn csr_rejects_out_of_bounds_triplet() {
    assert!(CsrMatrix::from_triplets(2, 2, &[(2, 0, 1.0)]).is_err());
}

#[test]
fn csr_shifted_builds_identity_minus_scaled() {
    let m = test_matrix();
    let shifted = m.shifted(-0.5, 1.0).unwrap();
    let diag = shifted.diagonal();
    assert!((diag[0] - (1.0 - 2.0)).abs() < 1e-15);
    assert!((diag[1] - (1.0 - 2.5)).abs() < 1e-15);
    assert!((diag[2] - (1.0 - 1.5)).abs() < 1e-15);
}

#[test]
fn identity_mul_vec() {
    let id = CsrMatrix::identity(3);
    let mut y = vec![0.0; 3];
    id.mul_vec(&[1.0, -2.0, 3.0], &mut y).unwrap();
    assert_eq!(y, vec![1.0, -2.0, 3.0]);
}

// ─── Linear Solver Tests ─────────────────────────────────────

#[test]
fn faer_lu_solves_unsymmetric_system() {
    let a = test_matrix();
    let b = [1.0, 2.0, 3.0];
    let mut solver = FaerLuSolver::new();
    assert!(!solver.is_factorized());
    solver.factorize(&a).unwrap();
    assert!(solver.is_factorized());

    let mut x = vec![0.0; 3];
    let report = solver.solve(&b, &mut x, controls(1e-12, 10)).unwrap();
    assert!(report.converged);
    assert!(residual_norm(&a, &x, &b) < 1e-10);
}

#[test]
fn faer_lu_rejects_non_square() {
    let m = CsrMatrix::new(2, 3);
    assert!(FaerLuSolver::new().factorize(&m).is_err());
}

#[test]
fn solve_before_factorize_fails() {
    let mut x = vec![0.0; 2];
    assert!(FaerLuSolver::new()
        .solve(&[1.0, 1.0], &mut x, controls(1e-8, 10))
        .is_err());
    assert!(BiCgStabSolver::new()
        .solve(&[1.0, 1.0], &mut x, controls(1e-8, 10))
        .is_err());
}

#[test]
fn bicgstab_reaches_tolerance() {
    let a = test_matrix();
    let b = [1.0, 2.0, 3.0];
    let mut solver = BiCgStabSolver::new();
    solver.factorize(&a).unwrap();

    let mut x = vec![0.0; 3];
    let report = solver.solve(&b, &mut x, controls(1e-12, 100)).unwrap();
    assert!(report.converged);
    assert!(report.iterations <= 100);
    assert!(residual_norm(&a, &x, &b) < 1e-9);
}

#[test]
fn bicgstab_respects_iteration_cap() {
    let n = 40;
    let mut triplets = Vec::new();
    for i in 0..n {
        triplets.push((i, i, 2.0));
        if i > 0 {
            triplets.push((i, i - 1, -1.0));
        }
        if i + 1 < n {
            triplets.push((i, i + 1, -1.0));
        }
    }
    let a = CsrMatrix::from_triplets(n, n, &triplets).unwrap();
    let b = vec![1.0; n];
    let mut solver = BiCgStabSolver::new();
    solver.factorize(&a).unwrap();

    let mut x = vec![0.0; n];
    let report = solver.solve(&b, &mut x, controls(1e-14, 2)).unwrap();
    assert_eq!(report.iterations, 2);
    assert!(!report.converged);
    assert!(report.residual > 1e-14);
}

#[test]
fn bicgstab_capped_solve_reports_measured_residual() {
    let n = 40;
    let mut triplets = Vec::new();
    for i in 0..n {
        triplets.push((i, i, 2.0));
        if i + 1 < n {
            triplets.push((i, i + 1, -1.5));
            triplets.push((i + 1, i, -0.5));
        }
    }
    let a = CsrMatrix::from_triplets(n, n, &triplets).unwrap();
    let b: Vec<f64> = (0..n).map(|i| 1.0 + i as f64).collect();
    let mut solver = BiCgStabSolver::new();
    solver.factorize(&a).unwrap();

    let mut x = vec![0.0; n];
    let report = solver.solve(&b, &mut x, controls(1e-14, 3)).unwrap();
    assert!(!report.converged);
    let b_norm = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    let measured = residual_norm(&a, &x, &b) / b_norm;
    assert!((report.residual - measured).abs() < 1e-12);
}

#[test]
fn bicgstab_handles_badly_scaled_rows() {
    let scale = [1.0e6, 1.0, 1.0e-3];
    let triplets: Vec<(usize, usize, f64)> = test_matrix()
        .triplets()
        .map(|(r, c, v)| (r, c, v * scale[r]))
        .collect();
    let a = CsrMatrix::from_triplets(3, 3, &triplets).unwrap();
    let b = [4.0e6, 2.0, 3.0e-3];
    let mut solver = BiCgStabSolver::new();
    solver.factorize(&a).unwrap();

    let mut x = vec![0.0; 3];
    let report = solver.solve(&b, &mut x, controls(1e-12, 50)).unwrap();
    assert!(report.converged);
    let b_norm = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    assert!(residual_norm(&a, &x, &b) / b_norm < 1e-10);
}

#[test]
fn bicgstab_zero_rhs_returns_zero() {
    let mut solver = BiCgStabSolver::new();
    solver.factorize(&test_matrix()).unwrap();
    let mut x = vec![1.0; 3];
    let report = solver.solve(&[0.0; 3], &mut x, controls(1e-8, 10)).unwrap();
    assert_eq!(report.iterations, 0);
    assert!(x.iter().all(|&v| v == 0.0));
}
