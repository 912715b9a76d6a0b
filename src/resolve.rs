//! The exposed resolution operation: build the reduced dynamics, run both
//! impulse phases, and compose the result into a full-batch velocity delta.

use nalgebra::{DMatrix, DVector};

use crate::cone::ConeSolver;
use crate::impulse::{solve_compression, solve_restitution};
use crate::operator::{
    build_contact_operator, build_contact_operator_constrained, factorize_contact_operator,
};
use crate::pgs::PgsConeSolver;
use crate::projection::{project_target_velocity, project_target_velocity_constrained};
use crate::types::{CbSolveFailure, ContactProblem, Regularization, ResolveError};

/// Two-phase contact-impulse resolver.
///
/// Configured once and reused across steps; every call is a pure function of
/// the supplied [`ContactProblem`] — no contact state persists inside the
/// resolver.
///
/// # Example
///
/// ```
/// use nalgebra::{DMatrix, DVector};
/// use sim_impulse::{ContactDims, ContactMaterial, ContactProblem, ContactResolver};
///
/// // Two unit point masses on one axis, approaching at relative velocity -1
/// let dims = ContactDims { n_cld: 1, d: 1, n: 2 };
/// let v = DMatrix::from_row_slice(1, 2, &[-0.5, 0.5]);
/// let minv = DMatrix::identity(2, 2);
/// let jac = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
/// let jac_v = DVector::from_element(1, -1.0);
/// let v_star = DVector::zeros(1);
/// let materials = [ContactMaterial::frictionless()];
///
/// let resolver = ContactResolver::default();
/// let dv = resolver
///     .resolve(&ContactProblem {
///         bs_idx: 0,
///         v: &v,
///         minv: &minv,
///         jac: &jac,
///         jac_v: &jac_v,
///         v_star: &v_star,
///         materials: &materials,
///         j_e: None,
///         dims,
///     })
///     .unwrap();
/// assert_eq!(dv.nrows(), 1);
/// ```
pub struct ContactResolver {
    regularization: Regularization,
    solver: Box<dyn ConeSolver>,
    on_failure: Option<CbSolveFailure>,
}

impl std::fmt::Debug for ContactResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactResolver")
            .field("regularization", &self.regularization)
            .field("solver", &"<dyn ConeSolver>")
            .field("on_failure", &self.on_failure)
            .finish()
    }
}

impl Default for ContactResolver {
    fn default() -> Self {
        Self {
            regularization: Regularization::default(),
            solver: Box::new(PgsConeSolver::new()),
            on_failure: None,
        }
    }
}

impl ContactResolver {
    /// Resolver with the default PGS backend and fixed regularization.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the diagonal regularization.
    #[must_use]
    pub fn with_regularization(mut self, regularization: Regularization) -> Self {
        self.regularization = regularization;
        self
    }

    /// Replace the cone-program backend.
    #[must_use]
    pub fn with_solver(mut self, solver: Box<dyn ConeSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Install a diagnostics hook invoked when both ladder stages of a phase
    /// fail and a zero impulse is substituted.
    #[must_use]
    pub fn with_failure_hook(mut self, hook: CbSolveFailure) -> Self {
        self.on_failure = Some(hook);
        self
    }

    /// Resolve one batch element's contact impulses.
    ///
    /// Returns the full-batch velocity delta: a zero-initialized
    /// `B x (n*d)` matrix with only row `bs_idx` written, so batch elements
    /// outside this problem are exactly untouched.
    ///
    /// # Errors
    ///
    /// Only the fatal class propagates: shape mismatches,
    /// [`ResolveError::SingularEqualityInertia`], and
    /// [`ResolveError::ContactOperatorNotPd`]. Cone-program failures degrade
    /// to a zero impulse instead.
    pub fn resolve(&self, problem: &ContactProblem<'_>) -> Result<DMatrix<f64>, ResolveError> {
        problem.validate()?;

        let mut dv = DMatrix::zeros(problem.v.nrows(), problem.v.ncols());
        if problem.dims.n_cld == 0 {
            return Ok(dv);
        }

        let row = self.resolve_delta_row(problem)?;
        dv.row_mut(problem.bs_idx).copy_from(&row.transpose());
        Ok(dv)
    }

    /// Compute the `(n*d)`-row delta for one problem without allocating the
    /// full batch matrix. Shared by [`resolve`](Self::resolve) and the
    /// batched front end.
    pub(crate) fn resolve_delta_row(
        &self,
        problem: &ContactProblem<'_>,
    ) -> Result<DVector<f64>, ResolveError> {
        let dims = problem.dims;

        // Reduced contact-space dynamics, equality-aware when J_e is present
        let (a, inverse_mass) = match problem.j_e {
            Some(j_e) => {
                build_contact_operator_constrained(problem.minv, problem.jac, j_e, dims)?
            }
            None => build_contact_operator(problem.minv, problem.jac, dims),
        };

        let reg = self.regularization.resolve();
        let factor = factorize_contact_operator(&a, reg)?;

        // A reachable target keeps the downstream cone program bounded
        let v_star_c = match problem.j_e {
            Some(_) => project_target_velocity_constrained(problem.v_star, &a, &factor),
            None => project_target_velocity(problem.v_star, problem.jac, dims),
        };

        // Compression phase
        let impulse = solve_compression(
            self.solver.as_ref(),
            &factor,
            problem.jac_v,
            problem.materials,
            dims,
            self.on_failure.as_ref(),
        );

        let mhat_jac_t = inverse_mass.apply(&problem.jac.transpose()); // (n*d) x (n_cld*d)
        let dv_comp = &mhat_jac_t * &impulse;

        // Restitution phase, targeting cor * (compression normal impulse)
        let v_prev_r = problem.v.row(problem.bs_idx).transpose() + &dv_comp;
        let jac_v_prev_r = problem.jac * &v_prev_r;
        let restitution_linear = &jac_v_prev_r - &v_star_c;
        let target_impulse = DVector::from_fn(dims.n_cld, |i, _| {
            problem.materials[i].restitution * impulse[i * dims.d]
        });

        let impulse_r = solve_restitution(
            self.solver.as_ref(),
            &factor,
            &restitution_linear,
            problem.materials,
            &target_impulse,
            dims,
            self.on_failure.as_ref(),
        );
        let dv_rest = &mhat_jac_t * &impulse_r;

        Ok(dv_comp + dv_rest)
    }
}
