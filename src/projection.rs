//! Target-velocity projection: turn the caller's desired post-contact
//! relative velocity into a target the contact Jacobian can actually reach,
//! so the downstream cone program is neither infeasible nor unbounded.

use nalgebra::{DMatrix, DVector};

use crate::linalg::{
    cholesky_in_place, cholesky_solve_in_place, independent_columns, upper_factor_solve_in_place,
    PIVOT_TOL,
};
use crate::types::ContactDims;

/// Project `v_star` into the range of the contact Jacobian (no bilateral
/// constraints).
///
/// With `n_cld <= n` the target is reachable by construction and passes
/// through unchanged. With more contacts than degrees of freedom the
/// least-squares projection `J (J^T J)^-1 J^T v_star` is used; when `J^T J`
/// is singular (linearly dependent contact directions — and only that
/// condition) the Jacobian is QR-factored, a linearly independent column
/// subset of `R` is selected by a bounded greedy pivot scan, and the
/// projection is recomputed against that reduced basis.
#[must_use]
pub fn project_target_velocity(
    v_star: &DVector<f64>,
    jac: &DMatrix<f64>,
    dims: ContactDims,
) -> DVector<f64> {
    if dims.n_cld <= dims.n {
        return v_star.clone();
    }

    // Normal equations: v_star_c = J (J^T J)^-1 J^T v_star
    let mut gram = jac.transpose() * jac; // (n*d) x (n*d)
    if cholesky_in_place(&mut gram).is_ok() {
        let mut x = jac.transpose() * v_star;
        cholesky_solve_in_place(&gram, &mut x);
        return jac * x;
    }

    tracing::debug!("rank-deficient contact Jacobian, selecting columns via QR");
    project_against_reduced_basis(v_star, jac, dims)
}

/// Rank-deficiency fallback: rebuild a full-rank sub-Jacobian from a QR
/// factorization and least-squares project against it.
fn project_against_reduced_basis(
    v_star: &DVector<f64>,
    jac: &DMatrix<f64>,
    dims: ContactDims,
) -> DVector<f64> {
    let qr = jac.clone().qr();
    let q = qr.q(); // (n_cld*d) x (n*d)
    let r = qr.r(); // (n*d) x (n*d)

    let idx = independent_columns(&r, dims.n, PIVOT_TOL);
    let mut r_sel = DMatrix::zeros(r.nrows(), idx.len());
    for (c, &ci) in idx.iter().enumerate() {
        r_sel.set_column(c, &r.column(ci));
    }
    let jac_full_rank = q * r_sel; // (n_cld*d) x k

    let mut gram = jac_full_rank.transpose() * &jac_full_rank;
    if cholesky_in_place(&mut gram).is_err() {
        // Even the reduced basis is degenerate; hand the caller's target
        // through and let the fail-soft ladder absorb any infeasibility.
        tracing::warn!(
            selected = idx.len(),
            "reduced contact basis is still degenerate, leaving target unprojected"
        );
        return v_star.clone();
    }
    let mut x = jac_full_rank.transpose() * v_star;
    cholesky_solve_in_place(&gram, &mut x);
    jac_full_rank * x
}

/// Equality-aware target projection.
///
/// Closed form, no iteration: `v_star_c = A (A + reg*I)^-1 v_star`, reusing
/// the factor already computed for the cone program (`factor` is the upper
/// `F` with `F^T F = A + reg*I`). This maps the target onto the range of the
/// constrained contact operator, which is exactly the set of relative
/// velocities an impulse can produce on the constraint manifold.
#[must_use]
pub fn project_target_velocity_constrained(
    v_star: &DVector<f64>,
    a: &DMatrix<f64>,
    factor: &DMatrix<f64>,
) -> DVector<f64> {
    let mut x = v_star.clone();
    upper_factor_solve_in_place(factor, &mut x);
    a * x
}
