//! Reduced contact-space dynamics: building `A = J * Mhat_inv * J^T` (with
//! and without bilateral constraints) and its regularized Cholesky factor.

use nalgebra::DMatrix;

use crate::linalg::{apply_block_diag, cholesky_in_place, cholesky_solve_matrix_in_place};
use crate::types::{ContactDims, ResolveError};

/// The effective inverse-mass operator used to map impulses back to
/// generalized velocity.
///
/// `Plain` is the raw block-diagonal operator `Minv (x) I_d`. `Projected`
/// composes it with the bilateral-constraint projector so that every mapped
/// velocity stays on the constraint manifold.
#[derive(Debug, Clone, PartialEq)]
pub enum InverseMassMap {
    /// Raw inverse mass, no bilateral constraints.
    Plain {
        /// `n x n` inverse-mass matrix.
        minv: DMatrix<f64>,
        /// Spatial dimension of each row block.
        d: usize,
    },
    /// Inverse mass composed with the bilateral projector:
    /// `(Minv (x) I_d) * factor`.
    Projected {
        /// `n x n` inverse-mass matrix.
        minv: DMatrix<f64>,
        /// Spatial dimension of each row block.
        d: usize,
        /// `(n*d) x (n*d)` projector `I - J_e^T M_e (Minv J_e^T)^T` removing
        /// velocity components that violate the bilateral constraints.
        factor: DMatrix<f64>,
    },
}

impl InverseMassMap {
    /// Apply the operator to a `(n*d) x k` right-hand side.
    #[must_use]
    pub fn apply(&self, rhs: &DMatrix<f64>) -> DMatrix<f64> {
        match self {
            Self::Plain { minv, d } => apply_block_diag(minv, rhs, *d),
            Self::Projected { minv, d, factor } => apply_block_diag(minv, &(factor * rhs), *d),
        }
    }
}

/// Build the contact-space operator `A = J * (Minv (x) I_d) * J^T` from the
/// raw inverse mass, with no bilateral constraints.
#[must_use]
pub fn build_contact_operator(
    minv: &DMatrix<f64>,
    jac: &DMatrix<f64>,
    dims: ContactDims,
) -> (DMatrix<f64>, InverseMassMap) {
    let map = InverseMassMap::Plain {
        minv: minv.clone(),
        d: dims.d,
    };
    let a = jac * map.apply(&jac.transpose());
    (a, map)
}

/// Build the contact-space operator in the presence of bilateral (equality)
/// constraints `J_e` of shape `C x (n*d)`.
///
/// Forms the bilateral-constraint inertia `J_e * (Minv (x) I_d) * J_e^T`,
/// inverts it via Cholesky, and folds the resulting projector into the
/// inverse-mass map so that `A = J * Mhat_inv * J^T` already respects the
/// constraint manifold.
///
/// # Errors
///
/// [`ResolveError::SingularEqualityInertia`] when the equality rows are not
/// independent. This is fatal for the batch element: the caller is expected
/// to only take this path with genuinely independent constraints.
pub fn build_contact_operator_constrained(
    minv: &DMatrix<f64>,
    jac: &DMatrix<f64>,
    j_e: &DMatrix<f64>,
    dims: ContactDims,
) -> Result<(DMatrix<f64>, InverseMassMap), ResolveError> {
    let nd = dims.generalized();
    let j_e_t = j_e.transpose(); // (n*d) x C

    let minv_j_e_t = apply_block_diag(minv, &j_e_t, dims.d); // (n*d) x C
    let mut e_inertia = j_e * &minv_j_e_t; // C x C
    cholesky_in_place(&mut e_inertia).map_err(|_| ResolveError::SingularEqualityInertia)?;

    // X = (J_e Minv J_e^T)^-1 * (Minv J_e^T)^T, so the projector is
    // factor = I - J_e^T * X
    let mut x = minv_j_e_t.transpose(); // C x (n*d)
    cholesky_solve_matrix_in_place(&e_inertia, &mut x);
    let factor = DMatrix::identity(nd, nd) - j_e_t * x;

    let map = InverseMassMap::Projected {
        minv: minv.clone(),
        d: dims.d,
        factor,
    };
    let a = jac * map.apply(&jac.transpose());
    Ok((a, map))
}

/// Factor the regularized contact-space operator.
///
/// Returns the upper-triangular `F` with `F^T F = A + reg*I`, the quadratic
/// form handed to the cone-program backend.
///
/// # Errors
///
/// [`ResolveError::ContactOperatorNotPd`] when `A + reg*I` is not positive
/// definite — the regularization term is sized to prevent this for any PSD
/// `A` and positive `reg`, so a failure indicates malformed inputs.
pub fn factorize_contact_operator(
    a: &DMatrix<f64>,
    reg: f64,
) -> Result<DMatrix<f64>, ResolveError> {
    let m = a.nrows();
    let mut l = a.clone();
    for i in 0..m {
        l[(i, i)] += reg;
    }
    cholesky_in_place(&mut l).map_err(|_| ResolveError::ContactOperatorNotPd)?;

    // Transpose the lower factor into a clean upper triangle
    let mut f = DMatrix::zeros(m, m);
    for i in 0..m {
        for j in 0..=i {
            f[(j, i)] = l[(i, j)];
        }
    }
    Ok(f)
}
