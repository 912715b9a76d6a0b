//! The cone-program capability seam.
//!
//! Contact impulses are found by minimizing a kinetic-energy-like quadratic
//! over per-contact friction cones. The resolution core only needs "solve a
//! conic problem, return an optimal point or fail": any backend satisfying
//! that contract (interior-point, ADMM, projected Gauss-Seidel) plugs in
//! behind [`ConeSolver`]. The default backend is
//! [`PgsConeSolver`](crate::pgs::PgsConeSolver).

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Hard failure from a cone-program backend.
///
/// The resolution core treats all variants identically: escalate to the
/// penalized retry, then fall back to a zero impulse.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SolveError {
    /// The constraint set is empty.
    #[error("cone program is infeasible")]
    Infeasible,
    /// The objective decreases without bound over the constraint set.
    #[error("cone program is unbounded")]
    Unbounded,
    /// The backend failed to converge or produced non-finite iterates.
    #[error("cone program solver failed numerically")]
    Numerical,
}

/// Per-contact cone constraint.
///
/// The feasible set for one contact's `d`-block `(f_n, f_t)` is
/// `f_n >= normal_floor` and `||f_t|| <= mu * f_n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeConstraint {
    /// Coulomb friction coefficient (cone half-angle).
    pub mu: f64,
    /// Lower bound on the normal impulse: 0 for the compression phase, the
    /// restitution target for the restitution phase.
    pub normal_floor: f64,
}

/// How the cone constraints are enforced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConeEnforcement {
    /// Hard constraints: the returned point lies inside every cone.
    Exact,
    /// Penalized relaxation: the hard normal floor is replaced by a
    /// quadratic penalty `0.5 * weight * min(0, f_n - floor)^2`, leaving
    /// only non-negativity of the normal hard. The friction cone itself is
    /// still projected exactly against the updated normal. Used as the
    /// retry stage when the exact formulation fails.
    Penalized {
        /// Penalty weight on floor violation.
        weight: f64,
    },
}

/// One conic quadratic program.
///
/// The objective is `0.5 * f^T (F^T F) f + f^T b` where `F` is `factor` (the
/// regularized Cholesky factor of the contact-space operator) and `b` is
/// `linear`. The variable has one `d`-block per entry of `cones`, normal
/// component first.
#[derive(Debug, Clone, Copy)]
pub struct ConeProblem<'a> {
    /// Upper-triangular factor `F` with `F^T F = A + reg*I`.
    pub factor: &'a DMatrix<f64>,
    /// Linear objective term, length `n_cld * d`.
    pub linear: &'a DVector<f64>,
    /// Per-contact cone constraints, length `n_cld`.
    pub cones: &'a [ConeConstraint],
    /// Spatial dimension of each contact block.
    pub dim: usize,
    /// Hard or penalized constraint enforcement.
    pub enforcement: ConeEnforcement,
    /// Optional initial iterate (warm start). Callers own any cross-step
    /// impulse caching; the core never persists one.
    pub warm_start: Option<&'a DVector<f64>>,
}

/// A convex-cone-program solving capability.
///
/// Implementations must be deterministic for identical inputs and bound
/// their own iteration counts; the resolution core reacts only to hard
/// failure, never to slowness.
pub trait ConeSolver: Send + Sync {
    /// Solve the program, returning the optimal impulse or a hard failure.
    fn solve(&self, problem: &ConeProblem<'_>) -> Result<DVector<f64>, SolveError>;
}
