//! Projected block Gauss-Seidel backend for the contact cone program.
//!
//! Solves `min 0.5 f^T (F^T F) f + f^T b` over per-contact friction cones in
//! dual (impulse) space: per-contact block updates, cone projection, and a
//! cost guard that reverts cost-increasing updates. The penalized mode
//! replaces the hard normal floor with a quadratic penalty solved in closed
//! form per block.

use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cone::{ConeConstraint, ConeEnforcement, ConeProblem, ConeSolver, SolveError};
use crate::linalg::MIN_DIAG;

/// Impulse magnitude beyond which the iteration is declared divergent.
const DIVERGENCE_LIMIT: f64 = 1e12;

/// Cost-guard threshold: block updates increasing the dual cost by more than
/// this are reverted.
const COST_GUARD_TOL: f64 = 1e-10;

/// Configuration for [`PgsConeSolver`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PgsOptions {
    /// Maximum number of Gauss-Seidel sweeps.
    pub max_iterations: usize,

    /// Convergence tolerance on the largest per-sweep impulse change.
    pub tolerance: f64,
}

impl Default for PgsOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
        }
    }
}

/// Projected block Gauss-Seidel cone-program solver.
///
/// Deterministic, allocation-light, and bounded by `max_iterations`. Sweeps
/// exit early once the largest per-sweep impulse change drops below
/// `tolerance`; when the budget runs out the final iterate is returned,
/// which is safe because the iterate is cone-feasible after every sweep.
/// Hard failure is reserved for non-finite ([`SolveError::Numerical`]) and
/// diverging ([`SolveError::Unbounded`]) iterates.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgsConeSolver {
    options: PgsOptions,
}

impl PgsConeSolver {
    /// Solver with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Solver with explicit options.
    #[must_use]
    pub fn with_options(options: PgsOptions) -> Self {
        Self { options }
    }
}

impl ConeSolver for PgsConeSolver {
    fn solve(&self, problem: &ConeProblem<'_>) -> Result<DVector<f64>, SolveError> {
        let m = problem.linear.len();
        let d = problem.dim;
        debug_assert_eq!(m, problem.cones.len() * d);
        debug_assert_eq!(problem.factor.shape(), (m, m));

        if m == 0 {
            return Ok(DVector::zeros(0));
        }

        let gram = problem.factor.transpose() * problem.factor;
        let b = problem.linear;

        let mut f = match problem.warm_start {
            Some(ws) if ws.len() == m => ws.clone(),
            _ => DVector::zeros(m),
        };
        // Feasible starting point
        for (ci, cone) in problem.cones.iter().enumerate() {
            project_block(&mut f.as_mut_slice()[ci * d..(ci + 1) * d], cone, floor_of(cone, problem.enforcement));
        }

        for _iter in 0..self.options.max_iterations {
            let mut max_delta = 0.0_f64;

            for (ci, cone) in problem.cones.iter().enumerate() {
                let base = ci * d;

                // Residuals at the current iterate, before this block moves
                let mut res_old = vec![0.0_f64; d];
                for (j, r) in res_old.iter_mut().enumerate() {
                    let row = base + j;
                    let mut res = b[row];
                    for c in 0..m {
                        res += gram[(row, c)] * f[c];
                    }
                    *r = res;
                }

                let old: Vec<f64> = f.as_slice()[base..base + d].to_vec();

                // Normal component
                let a_n = gram[(base, base)];
                if a_n > MIN_DIAG {
                    // q is the linear coefficient of the 1-D subproblem in
                    // f_n with all other components held at their old values
                    let q = res_old[0] - a_n * old[0];
                    f[base] = match problem.enforcement {
                        ConeEnforcement::Exact => (-q / a_n).max(cone.normal_floor),
                        ConeEnforcement::Penalized { weight } => {
                            let unconstrained = -q / a_n;
                            if unconstrained >= cone.normal_floor {
                                unconstrained
                            } else {
                                // Minimizer of 0.5*a*x^2 + q*x + 0.5*w*(x-t)^2
                                (weight * cone.normal_floor - q) / (a_n + weight)
                            }
                        }
                    };
                }

                // Tangential components
                for j in 1..d {
                    let row = base + j;
                    let a_t = gram[(row, row)];
                    if a_t > MIN_DIAG {
                        f[row] = old[j] - res_old[j] / a_t;
                    }
                }

                // Friction-cone projection relative to the updated normal
                let floor = floor_of(cone, problem.enforcement);
                project_block(&mut f.as_mut_slice()[base..base + d], cone, floor);

                // Cost guard (exact mode): revert updates that increase the
                // dual cost. Skipped in penalized mode, where the penalty
                // term is part of the objective and a revert would undo the
                // pull toward the floor.
                if matches!(problem.enforcement, ConeEnforcement::Exact) {
                    let mut cost = 0.0;
                    for j in 0..d {
                        let delta_j = f[base + j] - old[j];
                        cost += delta_j * res_old[j];
                        for k in 0..d {
                            let delta_k = f[base + k] - old[k];
                            cost += 0.5 * delta_j * gram[(base + j, base + k)] * delta_k;
                        }
                    }
                    if cost > COST_GUARD_TOL {
                        f.as_mut_slice()[base..base + d].copy_from_slice(&old);
                    }
                }

                for j in 0..d {
                    max_delta = max_delta.max((f[base + j] - old[j]).abs());
                }
            }

            if !f.iter().all(|x| x.is_finite()) {
                return Err(SolveError::Numerical);
            }
            if f.amax() > DIVERGENCE_LIMIT {
                return Err(SolveError::Unbounded);
            }
            if max_delta < self.options.tolerance {
                break;
            }
        }

        // Budget exhaustion is not a failure: the iterate is projected onto
        // the cones every sweep, so it is always feasible, and on
        // near-singular operators (redundant contacts) the sweep delta
        // contracts at the regularization scale and cannot meet an absolute
        // tolerance even though the iterate is already near-optimal.
        Ok(f)
    }
}

/// The effective hard floor a block is projected against.
fn floor_of(cone: &ConeConstraint, enforcement: ConeEnforcement) -> f64 {
    match enforcement {
        ConeEnforcement::Exact => cone.normal_floor,
        // The floor is a soft penalty; only non-negativity of the cone apex
        // remains hard.
        ConeEnforcement::Penalized { .. } => 0.0,
    }
}

/// Project one contact's `d`-block onto `{ f_n >= floor, ||f_t|| <= mu*f_n }`.
fn project_block(block: &mut [f64], cone: &ConeConstraint, floor: f64) {
    let d = block.len();
    block[0] = block[0].max(floor);

    if d == 1 {
        return;
    }
    let cap = cone.mu * block[0];
    let t_norm = block[1..].iter().map(|x| x * x).sum::<f64>().sqrt();
    if t_norm > cap {
        if cap <= 0.0 {
            for t in &mut block[1..] {
                *t = 0.0;
            }
        } else {
            let scale = cap / t_norm;
            for t in &mut block[1..] {
                *t *= scale;
            }
        }
    }
}
