//! Shared types: problem dimensions, materials, regularization, errors, and
//! the diagnostics callback hook.

use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cone::SolveError;

/// Dimensions of one contact-resolution problem.
///
/// The flattened generalized space has `n * d` entries (object-major: all `d`
/// components of object 0, then object 1, ...). The contact space has
/// `n_cld * d` entries, one `d`-block per contact with the normal direction
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactDims {
    /// Number of contact points active in this problem.
    pub n_cld: usize,
    /// Spatial dimension (2 or 3; 1 for normal-only problems).
    pub d: usize,
    /// Number of generalized bodies/points (`n_o * n_p`).
    pub n: usize,
}

impl ContactDims {
    /// Flattened generalized dimension `n * d`.
    #[must_use]
    pub fn generalized(&self) -> usize {
        self.n * self.d
    }

    /// Flattened contact-space dimension `n_cld * d`.
    #[must_use]
    pub fn contact_space(&self) -> usize {
        self.n_cld * self.d
    }
}

/// Per-contact material coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactMaterial {
    /// Coulomb friction coefficient (dimensionless, >= 0).
    ///
    /// Tangential impulse magnitude is bounded by `mu` times the normal
    /// impulse. 0 = frictionless.
    pub mu: f64,

    /// Coefficient of restitution (dimensionless, 0-1).
    ///
    /// 0 = perfectly inelastic, 1 = perfectly elastic. Sets the restitution
    /// target as a fraction of the compression-phase normal impulse.
    pub restitution: f64,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            mu: 0.5,
            restitution: 0.0,
        }
    }
}

impl ContactMaterial {
    /// Frictionless, inelastic contact.
    #[must_use]
    pub fn frictionless() -> Self {
        Self {
            mu: 0.0,
            restitution: 0.0,
        }
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, mu: f64) -> Self {
        self.mu = mu;
        self
    }

    /// Set the coefficient of restitution.
    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }
}

/// Diagonal regularization of the contact-space operator.
///
/// `Fixed` is used as-is and must be positive. `Learned` holds a raw
/// unconstrained parameter (e.g. maintained by an outer training loop) that
/// is mapped through softplus before use, so the effective value is always
/// strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Regularization {
    /// A fixed positive scalar.
    Fixed(f64),
    /// A raw parameter mapped through softplus: `reg = ln(1 + exp(raw))`.
    Learned(f64),
}

impl Default for Regularization {
    fn default() -> Self {
        Self::Fixed(0.01)
    }
}

impl Regularization {
    /// Resolve to the concrete positive scalar added to the diagonal.
    #[must_use]
    pub fn resolve(&self) -> f64 {
        match *self {
            Self::Fixed(reg) => reg,
            Self::Learned(raw) => softplus(raw),
        }
    }
}

/// Numerically stable softplus, `ln(1 + exp(x))`.
fn softplus(x: f64) -> f64 {
    if x > 30.0 {
        // exp(x) dominates; ln(1 + exp(x)) == x to machine precision
        x
    } else {
        x.exp().ln_1p()
    }
}

/// One batch element's contact-resolution inputs.
///
/// All tensors are borrowed from the caller; nothing is retained across
/// calls. `v` is the full-batch velocity state (`B x (n*d)`, one row per
/// batch element); only row `bs_idx` participates in this solve.
#[derive(Debug, Clone, Copy)]
pub struct ContactProblem<'a> {
    /// Row of `v` this problem resolves (and the row of the returned delta
    /// that is written).
    pub bs_idx: usize,
    /// Full-batch velocity state, `B x (n*d)`.
    pub v: &'a DMatrix<f64>,
    /// Inverse-mass operator, `n x n`, acting block-wise on the object index.
    pub minv: &'a DMatrix<f64>,
    /// Contact Jacobian, flattened `(n_cld*d) x (n*d)`.
    pub jac: &'a DMatrix<f64>,
    /// Pre-contact contact-space velocity `J * v[bs_idx]`, length `n_cld*d`.
    pub jac_v: &'a DVector<f64>,
    /// Desired post-contact relative velocity, length `n_cld*d`.
    pub v_star: &'a DVector<f64>,
    /// Per-contact materials, length `n_cld`.
    pub materials: &'a [ContactMaterial],
    /// Optional bilateral (equality) constraint Jacobian, `C x (n*d)`.
    pub j_e: Option<&'a DMatrix<f64>>,
    /// Problem dimensions.
    pub dims: ContactDims,
}

impl ContactProblem<'_> {
    /// Check all operand shapes against `dims`.
    pub(crate) fn validate(&self) -> Result<(), ResolveError> {
        let nd = self.dims.generalized();
        let m = self.dims.contact_space();

        if self.bs_idx >= self.v.nrows() {
            return Err(ResolveError::BatchIndexOutOfRange {
                bs_idx: self.bs_idx,
                batch: self.v.nrows(),
            });
        }
        check_shape("v", self.v.shape(), (self.v.nrows(), nd))?;
        check_shape("minv", self.minv.shape(), (self.dims.n, self.dims.n))?;
        check_shape("jac", self.jac.shape(), (m, nd))?;
        check_shape("jac_v", (self.jac_v.len(), 1), (m, 1))?;
        check_shape("v_star", (self.v_star.len(), 1), (m, 1))?;
        check_shape("materials", (self.materials.len(), 1), (self.dims.n_cld, 1))?;
        if let Some(j_e) = self.j_e {
            if j_e.nrows() == 0 {
                return Err(ResolveError::ShapeMismatch {
                    what: "j_e",
                    expected: (1, nd),
                    got: j_e.shape(),
                });
            }
            check_shape("j_e", j_e.shape(), (j_e.nrows(), nd))?;
        }
        Ok(())
    }
}

fn check_shape(
    what: &'static str,
    got: (usize, usize),
    expected: (usize, usize),
) -> Result<(), ResolveError> {
    if got == expected {
        Ok(())
    } else {
        Err(ResolveError::ShapeMismatch {
            what,
            expected,
            got,
        })
    }
}

/// Errors produced by contact resolution.
///
/// Only the fatal class reaches callers: cone-program failures are absorbed
/// by the retry/fail-soft ladder and never surface here.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResolveError {
    /// The bilateral-constraint inertia `J_e * Minv * J_e^T` is singular.
    /// The equality rows supplied by the assembly stage are not independent.
    #[error("bilateral-constraint inertia is singular")]
    SingularEqualityInertia,

    /// The regularized contact operator `A + reg*I` is not positive
    /// definite. Indicates malformed inputs (non-PSD inverse mass) or a
    /// non-positive regularization scalar.
    #[error("regularized contact operator is not positive definite")]
    ContactOperatorNotPd,

    /// A Cholesky factorization failed on a matrix expected to be SPD.
    #[error("Cholesky factorization failed (matrix not positive definite)")]
    CholeskyFailed,

    /// An operand does not match the shape implied by [`ContactDims`].
    #[error("shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Name of the offending operand.
        what: &'static str,
        /// Shape implied by the problem dimensions.
        expected: (usize, usize),
        /// Shape actually supplied.
        got: (usize, usize),
    },

    /// `bs_idx` does not select a row of the batch velocity state.
    #[error("batch index {bs_idx} out of range for batch of {batch}")]
    BatchIndexOutOfRange {
        /// The offending index.
        bs_idx: usize,
        /// Number of batch rows.
        batch: usize,
    },

    /// Two problems in a batched resolve target the same batch row.
    #[error("duplicate batch index {bs_idx} in batched resolve")]
    DuplicateBatchIndex {
        /// The duplicated index.
        bs_idx: usize,
    },
}

/// Which impulse phase a solve failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpulsePhase {
    /// Compression-phase impulse solve.
    Compression,
    /// Restitution-phase impulse solve.
    Restitution,
}

/// Report passed to the diagnostics hook when both ladder stages fail and a
/// zero impulse is substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveFailure {
    /// Phase in which the double failure occurred.
    pub phase: ImpulsePhase,
    /// Error from the strict formulation.
    pub first: SolveError,
    /// Error from the penalized retry.
    pub second: SolveError,
}

/// Thread-safe diagnostics callback wrapper that implements Debug.
///
/// Wraps `Arc<dyn Fn(&SolveFailure) + Send + Sync>` (`dyn Fn` has no Debug
/// impl of its own). Cloning shares the same callback.
pub struct CbSolveFailure(pub Arc<dyn Fn(&SolveFailure) + Send + Sync>);

impl Clone for CbSolveFailure {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl fmt::Debug for CbSolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CbSolveFailure(<fn>)")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn softplus_is_strictly_positive() {
        for raw in [-50.0, -5.0, -0.01, 0.0, 0.01, 5.0, 50.0] {
            let reg = Regularization::Learned(raw).resolve();
            assert!(reg > 0.0, "softplus({raw}) = {reg} must be positive");
        }
        // Large raw values pass through unchanged
        assert_eq!(Regularization::Learned(100.0).resolve(), 100.0);
        // Fixed values are untouched
        assert_eq!(Regularization::Fixed(0.25).resolve(), 0.25);
    }

    #[test]
    fn softplus_matches_reference_at_zero() {
        let reg = Regularization::Learned(0.0).resolve();
        assert!((reg - std::f64::consts::LN_2).abs() < 1e-15);
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        let dims = ContactDims { n_cld: 1, d: 2, n: 2 };
        let v = DMatrix::zeros(1, 4);
        let minv = DMatrix::identity(2, 2);
        let jac = DMatrix::zeros(2, 4);
        let jac_v = DVector::zeros(2);
        let v_star = DVector::zeros(2);
        let materials = [ContactMaterial::default()];

        let ok = ContactProblem {
            bs_idx: 0,
            v: &v,
            minv: &minv,
            jac: &jac,
            jac_v: &jac_v,
            v_star: &v_star,
            materials: &materials,
            j_e: None,
            dims,
        };
        assert!(ok.validate().is_ok());

        let bad_jac = DMatrix::zeros(3, 4);
        let bad = ContactProblem { jac: &bad_jac, ..ok };
        assert!(matches!(
            bad.validate(),
            Err(ResolveError::ShapeMismatch { what: "jac", .. })
        ));

        let out_of_range = ContactProblem { bs_idx: 5, ..ok };
        assert!(matches!(
            out_of_range.validate(),
            Err(ResolveError::BatchIndexOutOfRange { bs_idx: 5, batch: 1 })
        ));
    }
}
