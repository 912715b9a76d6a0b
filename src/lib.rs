//! Contact-impulse resolution for rigid-body simulation.
//!
//! Computes post-collision velocity corrections for batches of rigid bodies
//! in simultaneous multi-point contact, using a two-phase (compression then
//! restitution) impulse model posed as convex cone programs. Given current
//! velocities, an inverse-mass operator, contact Jacobians, and per-contact
//! friction/restitution coefficients, it produces the minimal velocity
//! correction consistent with non-penetration, Coulomb friction cones, and
//! restitution targets.
//!
//! Collision detection, Jacobian assembly, and time integration live
//! upstream and downstream of this crate: the only exposed operation is
//! [`ContactResolver::resolve`] (and its batched front end
//! [`ContactResolver::resolve_all`]).
//!
//! # Pipeline
//!
//! ```text
//! Minv, Jac, [J_e] ──► reduced dynamics A = J·M̂⁻¹·Jᵀ     (operator)
//!                      regularized factor FᵀF = A + reg·I (operator)
//! v_star ────────────► reachable target v_star_c          (projection)
//! Jac·v ─────────────► compression impulse                (impulse, cone, pgs)
//!                      restitution impulse                (impulse, cone, pgs)
//! impulses ──────────► dv scattered into batch row        (resolve)
//! ```
//!
//! # Failure policy
//!
//! Singular bilateral inertia and a non-PD regularized operator are fatal
//! and propagate as [`ResolveError`]. Cone-program failures never surface:
//! each phase retries once with a penalized relaxation and then degrades to
//! an exact zero impulse, trading a missed contact response for batch
//! survival.
//!
//! # Quick start
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use sim_impulse::{ContactDims, ContactMaterial, ContactProblem, ContactResolver};
//!
//! let dims = ContactDims { n_cld: 1, d: 1, n: 2 };
//! let v = DMatrix::from_row_slice(1, 2, &[-0.5, 0.5]);
//! let minv = DMatrix::identity(2, 2);
//! let jac = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
//! let jac_v = &jac * v.row(0).transpose();
//! let v_star = DVector::zeros(1);
//! let materials = [ContactMaterial::frictionless()];
//!
//! let resolver = ContactResolver::new();
//! let dv = resolver.resolve(&ContactProblem {
//!     bs_idx: 0,
//!     v: &v,
//!     minv: &minv,
//!     jac: &jac,
//!     jac_v: &jac_v,
//!     v_star: &v_star,
//!     materials: &materials,
//!     j_e: None,
//!     dims,
//! })?;
//! // The impulse cancels the approach velocity
//! assert!((dv[(0, 0)] - 0.5).abs() < 1e-3);
//! # Ok::<(), sim_impulse::ResolveError>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,      // mul_add style changes aren't always clearer
    clippy::too_many_lines,        // Solver sweeps naturally have many steps
    clippy::doc_markdown,          // Not all technical terms need backticks
)]

// Shared types (dimensions, materials, regularization, errors, callbacks)
pub mod types;

// Dense linear-algebra kernels (Cholesky, block-diagonal apply, pivot scan)
mod linalg;

// Reduced contact-space dynamics and regularized factorization
pub mod operator;

// Target-velocity projection (incl. rank-deficiency fallback)
pub mod projection;

// The cone-program capability seam
pub mod cone;

// Default projected Gauss-Seidel backend
pub mod pgs;

// Two-phase impulse solves with the fallback ladder
mod impulse;

// The exposed resolution operation
pub mod resolve;

// Batched resolution (rayon-parallel under the `parallel` feature)
mod batch;

pub use cone::{ConeConstraint, ConeEnforcement, ConeProblem, ConeSolver, SolveError};
pub use operator::InverseMassMap;
pub use pgs::{PgsConeSolver, PgsOptions};
pub use resolve::ContactResolver;
pub use types::{
    CbSolveFailure, ContactDims, ContactMaterial, ContactProblem, ImpulsePhase, Regularization,
    ResolveError, SolveFailure,
};
