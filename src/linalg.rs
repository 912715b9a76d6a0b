//! Dense linear-algebra kernels: in-place Cholesky, triangular solves,
//! block-diagonal inverse-mass application, and the bounded
//! independent-column scan used by the rank-deficient projection fallback.
//!
//! Pure math routines with no solver state dependencies.

use nalgebra::{DMatrix, DVector};

use crate::types::ResolveError;

/// Pivot magnitude below which an upper-triangular entry is treated as zero.
pub(crate) const PIVOT_TOL: f64 = 1e-12;

/// Diagonal magnitude below which a Gauss-Seidel row update is skipped.
pub(crate) const MIN_DIAG: f64 = 1e-15;

/// In-place Cholesky (LL^T) factorization. Overwrites the lower triangle of
/// `m` with L; the upper triangle is left unchanged. Fails if the matrix is
/// not positive definite.
///
/// The pivot check is relative to the matrix's own diagonal: an exactly
/// rank-deficient matrix whose pivot cancellation leaves a tiny positive
/// rounding residue is rejected rather than factored into garbage.
pub(crate) fn cholesky_in_place(m: &mut DMatrix<f64>) -> Result<(), ResolveError> {
    let n = m.nrows();
    for j in 0..n {
        let orig = m[(j, j)];
        let mut diag = orig;
        for k in 0..j {
            diag -= m[(j, k)] * m[(j, k)];
        }
        if diag <= PIVOT_TOL * orig.abs() {
            return Err(ResolveError::CholeskyFailed);
        }
        let ljj = diag.sqrt();
        m[(j, j)] = ljj;

        for i in (j + 1)..n {
            let mut sum = m[(i, j)];
            for k in 0..j {
                sum -= m[(i, k)] * m[(j, k)];
            }
            m[(i, j)] = sum / ljj;
        }
    }
    Ok(())
}

/// Solve L*L^T*x = b in place, with L stored in the lower triangle of `l`.
/// On entry `x` contains b; on exit `x` contains the solution.
pub(crate) fn cholesky_solve_in_place(l: &DMatrix<f64>, x: &mut DVector<f64>) {
    let n = l.nrows();

    // Forward substitution: L*y = b
    for j in 0..n {
        for k in 0..j {
            x[j] -= l[(j, k)] * x[k];
        }
        x[j] /= l[(j, j)];
    }

    // Back substitution: L^T*z = y
    for j in (0..n).rev() {
        for k in (j + 1)..n {
            x[j] -= l[(k, j)] * x[k];
        }
        x[j] /= l[(j, j)];
    }
}

/// Multi-RHS variant of [`cholesky_solve_in_place`]: solves L*L^T*X = B for
/// every column of `x` in place.
pub(crate) fn cholesky_solve_matrix_in_place(l: &DMatrix<f64>, x: &mut DMatrix<f64>) {
    let n = l.nrows();
    let k = x.ncols();

    for c in 0..k {
        for j in 0..n {
            for r in 0..j {
                let lx = l[(j, r)] * x[(r, c)];
                x[(j, c)] -= lx;
            }
            x[(j, c)] /= l[(j, j)];
        }
        for j in (0..n).rev() {
            for r in (j + 1)..n {
                let lx = l[(r, j)] * x[(r, c)];
                x[(j, c)] -= lx;
            }
            x[(j, c)] /= l[(j, j)];
        }
    }
}

/// Solve U^T*U*x = b in place, with U an upper-triangular factor (the form
/// returned by the contact-space factorizer, `U = L^T`).
pub(crate) fn upper_factor_solve_in_place(u: &DMatrix<f64>, x: &mut DVector<f64>) {
    let n = u.nrows();

    // Forward substitution with U^T (lower triangular via transposed access)
    for j in 0..n {
        for k in 0..j {
            x[j] -= u[(k, j)] * x[k];
        }
        x[j] /= u[(j, j)];
    }

    // Back substitution with U
    for j in (0..n).rev() {
        for k in (j + 1)..n {
            x[j] -= u[(j, k)] * x[k];
        }
        x[j] /= u[(j, j)];
    }
}

/// Apply the block-diagonal inverse-mass operator `(Minv (x) I_d)` to `rhs`
/// without materializing the Kronecker product.
///
/// `minv` is `n x n`; `rhs` is `(n*d) x k` with object-major row blocks. The
/// result row-block for object `i` is `sum_j minv[i,j] * rhs_block[j]`.
pub(crate) fn apply_block_diag(minv: &DMatrix<f64>, rhs: &DMatrix<f64>, d: usize) -> DMatrix<f64> {
    let n = minv.nrows();
    let k = rhs.ncols();
    debug_assert_eq!(rhs.nrows(), n * d);

    let mut out = DMatrix::zeros(n * d, k);
    for i in 0..n {
        for j in 0..n {
            let w = minv[(i, j)];
            if w == 0.0 {
                continue;
            }
            for r in 0..d {
                for c in 0..k {
                    out[(i * d + r, c)] += w * rhs[(j * d + r, c)];
                }
            }
        }
    }
    out
}

/// Greedily select linearly independent columns of an upper-triangular
/// factor `r` by scanning for non-zero pivots.
///
/// Starts from column 0 and walks rightward: the candidate pivot for the
/// k-th selected column is row k of `r`. The scan visits each column at most
/// once (bounded by `n*d` total work) and stops as soon as `n` columns are
/// selected or no further non-zero pivot exists, returning whatever partial
/// rank was found.
pub(crate) fn independent_columns(r: &DMatrix<f64>, n: usize, tol: f64) -> Vec<usize> {
    let ncols = r.ncols();
    if ncols == 0 || n == 0 {
        return Vec::new();
    }

    let mut idx = vec![0_usize];
    let mut col = 0_usize;
    while idx.len() < n && idx.len() < r.nrows() {
        let row = idx.len();
        let mut found = None;
        for c in (col + 1)..ncols {
            if r[(row, c)].abs() > tol {
                found = Some(c);
                break;
            }
        }
        match found {
            Some(c) => {
                idx.push(c);
                col = c;
            }
            None => break,
        }
    }
    idx
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic pseudo-random SPD matrix via a simple LCG.
    pub(crate) fn random_spd(n: usize, seed: u64) -> DMatrix<f64> {
        let mut state = seed;
        let mut next = || -> f64 {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1);
            ((state >> 33) as f64) / f64::from(u32::MAX) - 0.5
        };
        let a = DMatrix::from_fn(n, n, |_, _| next());
        a.transpose() * &a + DMatrix::identity(n, n) * (n as f64)
    }

    #[test]
    fn cholesky_matches_nalgebra() {
        for &n in &[1, 2, 3, 5, 10] {
            let m = random_spd(n, 7 + n as u64);
            let rhs = DVector::from_fn(n, |i, _| (i as f64 + 1.0) * 0.3);

            let chol_ref = m.clone().cholesky().expect("nalgebra cholesky failed");
            let x_ref = chol_ref.solve(&rhs);

            let mut l = m.clone();
            cholesky_in_place(&mut l).expect("in-place cholesky failed");
            let mut x = rhs.clone();
            cholesky_solve_in_place(&l, &mut x);

            for i in 0..n {
                assert_relative_eq!(x[i], x_ref[i], epsilon = 1e-12, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn cholesky_rejects_non_spd() {
        let mut m = DMatrix::zeros(3, 3);
        assert!(cholesky_in_place(&mut m).is_err());

        let mut m = DMatrix::identity(3, 3);
        m[(1, 1)] = -1.0;
        assert!(cholesky_in_place(&mut m).is_err());
    }

    #[test]
    fn cholesky_rejects_rank_deficient_gram() {
        // Gram matrix of a matrix with a duplicated column: exactly rank
        // deficient, but the second pivot's cancellation can leave a tiny
        // positive rounding residue instead of a clean zero
        let mut j = DMatrix::from_fn(4, 2, |i, c| (i as f64 + 1.0) * 0.3 - c as f64);
        let col0 = j.column(0).into_owned();
        j.set_column(1, &col0);

        let mut gram = j.transpose() * &j;
        assert!(cholesky_in_place(&mut gram).is_err());
    }

    #[test]
    fn matrix_solve_matches_vector_solve() {
        let n = 6;
        let m = random_spd(n, 99);
        let mut l = m.clone();
        cholesky_in_place(&mut l).unwrap();

        let b = DMatrix::from_fn(n, 3, |i, j| (i as f64 + 1.0) * 0.1 - j as f64);
        let mut x_mat = b.clone();
        cholesky_solve_matrix_in_place(&l, &mut x_mat);

        for c in 0..3 {
            let mut x_vec = DVector::from_column_slice(b.column(c).as_slice());
            cholesky_solve_in_place(&l, &mut x_vec);
            for i in 0..n {
                assert_relative_eq!(x_mat[(i, c)], x_vec[i], epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn upper_factor_solve_round_trips() {
        let n = 5;
        let m = random_spd(n, 1234);
        let mut l = m.clone();
        cholesky_in_place(&mut l).unwrap();

        // Build the upper factor U = L^T with a clean upper triangle
        let mut u = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                u[(j, i)] = l[(i, j)];
            }
        }

        let b = DVector::from_fn(n, |i, _| i as f64 - 2.0);
        let mut x = b.clone();
        upper_factor_solve_in_place(&u, &mut x);

        // U^T U x should reproduce b (U^T U == M)
        let back = &m * &x;
        for i in 0..n {
            assert_relative_eq!(back[i], b[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn block_diag_matches_kronecker() {
        let n = 3;
        let d = 2;
        let minv = random_spd(n, 5);
        let rhs = DMatrix::from_fn(n * d, 4, |i, j| (i * 4 + j) as f64 * 0.01 - 0.1);

        // Explicit Kronecker reference
        let mut kron = DMatrix::zeros(n * d, n * d);
        for i in 0..n {
            for j in 0..n {
                for r in 0..d {
                    kron[(i * d + r, j * d + r)] = minv[(i, j)];
                }
            }
        }
        let expected = &kron * &rhs;
        let got = apply_block_diag(&minv, &rhs, d);

        for i in 0..n * d {
            for j in 0..4 {
                assert_relative_eq!(got[(i, j)], expected[(i, j)], epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn independent_columns_full_rank() {
        // Upper triangular with all pivots present on the superdiagonal band
        let r = DMatrix::from_row_slice(
            3,
            6,
            &[
                1.0, 2.0, 0.5, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.3, 0.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.2, 0.0, 0.0,
            ],
        );
        let idx = independent_columns(&r, 3, PIVOT_TOL);
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn independent_columns_skips_zero_pivots() {
        // Row 1 has a zero at column 1; the scan must jump to column 2
        let r = DMatrix::from_row_slice(
            3,
            5,
            &[
                1.0, 0.4, 0.1, 0.0, 0.0, //
                0.0, 0.0, 2.0, 0.3, 0.0, //
                0.0, 0.0, 0.0, 1.5, 0.1,
            ],
        );
        let idx = independent_columns(&r, 3, PIVOT_TOL);
        assert_eq!(idx, vec![0, 2, 3]);
    }

    #[test]
    fn independent_columns_returns_partial_rank() {
        // Only one non-zero row: the sought rank 3 is unreachable and the
        // scan must terminate with what it found
        let r = DMatrix::from_row_slice(
            3,
            4,
            &[
                1.0, 0.5, 0.2, 0.1, //
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.0,
            ],
        );
        let idx = independent_columns(&r, 3, PIVOT_TOL);
        assert_eq!(idx, vec![0]);
    }
}
