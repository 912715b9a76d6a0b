//! Compression- and restitution-phase impulse solves with the layered
//! fallback policy: strict cone program, then a penalized relaxation, then
//! an exact zero impulse.
//!
//! Callers never observe backend errors; a doubly-failed solve degrades to a
//! missed contact response for that batch element rather than aborting the
//! step.

use nalgebra::{DMatrix, DVector};

use crate::cone::{ConeConstraint, ConeEnforcement, ConeProblem, ConeSolver};
use crate::types::{CbSolveFailure, ContactDims, ContactMaterial, ImpulsePhase, SolveFailure};

/// Penalty weight used by the retry stage. Stiff enough that a feasible
/// problem lands within solver tolerance of the hard-constraint optimum.
const PENALTY_WEIGHT: f64 = 1e6;

/// Solve the compression-phase impulse.
///
/// Minimizes the induced kinetic-energy-like objective with linear term
/// `jac_v` (the pre-contact contact-space velocity) over per-contact
/// friction cones with zero normal floors; non-penetration complementarity
/// is carried by the convex relaxation itself.
pub(crate) fn solve_compression(
    solver: &dyn ConeSolver,
    factor: &DMatrix<f64>,
    jac_v: &DVector<f64>,
    materials: &[ContactMaterial],
    dims: ContactDims,
    hook: Option<&CbSolveFailure>,
) -> DVector<f64> {
    let cones: Vec<ConeConstraint> = materials
        .iter()
        .map(|mat| ConeConstraint {
            mu: mat.mu,
            normal_floor: 0.0,
        })
        .collect();
    solve_with_ladder(
        solver,
        factor,
        jac_v,
        &cones,
        dims,
        ImpulsePhase::Compression,
        hook,
    )
}

/// Solve the restitution-phase impulse.
///
/// `linear` is `Jac_v_prev_r - v_star_c` (post-compression contact velocity
/// minus the reachable target); `target_impulse[i]` is the per-contact
/// restitution target `cor_i * impulse_comp_normal_i`, enforced as the
/// normal floor.
pub(crate) fn solve_restitution(
    solver: &dyn ConeSolver,
    factor: &DMatrix<f64>,
    linear: &DVector<f64>,
    materials: &[ContactMaterial],
    target_impulse: &DVector<f64>,
    dims: ContactDims,
    hook: Option<&CbSolveFailure>,
) -> DVector<f64> {
    let cones: Vec<ConeConstraint> = materials
        .iter()
        .zip(target_impulse.iter())
        .map(|(mat, &target)| ConeConstraint {
            mu: mat.mu,
            normal_floor: target.max(0.0),
        })
        .collect();
    solve_with_ladder(
        solver,
        factor,
        linear,
        &cones,
        dims,
        ImpulsePhase::Restitution,
        hook,
    )
}

/// The fallback ladder: strict, then penalized, then zero.
fn solve_with_ladder(
    solver: &dyn ConeSolver,
    factor: &DMatrix<f64>,
    linear: &DVector<f64>,
    cones: &[ConeConstraint],
    dims: ContactDims,
    phase: ImpulsePhase,
    hook: Option<&CbSolveFailure>,
) -> DVector<f64> {
    let strict = ConeProblem {
        factor,
        linear,
        cones,
        dim: dims.d,
        enforcement: ConeEnforcement::Exact,
        warm_start: None,
    };
    let first = match solver.solve(&strict) {
        Ok(impulse) => return impulse,
        Err(err) => err,
    };
    tracing::debug!(
        ?phase,
        error = %first,
        "strict cone solve failed, retrying with penalized relaxation"
    );

    let penalized = ConeProblem {
        enforcement: ConeEnforcement::Penalized {
            weight: PENALTY_WEIGHT,
        },
        ..strict
    };
    let second = match solver.solve(&penalized) {
        Ok(impulse) => return impulse,
        Err(err) => err,
    };
    tracing::warn!(
        ?phase,
        error = %second,
        "penalized cone solve failed, substituting zero impulse"
    );
    if let Some(cb) = hook {
        (cb.0)(&SolveFailure {
            phase,
            first,
            second,
        });
    }
    DVector::zeros(linear.len())
}
