//! Batched resolution: N independent contact problems, one velocity delta.
//!
//! Each problem targets a distinct batch row; the combined delta is the
//! row-wise union of the individual results. Resolution is parallelized
//! across CPU cores via rayon when the `parallel` feature is enabled;
//! sequential fallback when disabled. The two never differ in output —
//! problems share no mutable state.

use nalgebra::{DMatrix, DVector};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::resolve::ContactResolver;
use crate::types::{ContactProblem, ResolveError};

impl ContactResolver {
    /// Resolve a set of independent problems and accumulate their deltas
    /// into one full-batch matrix.
    ///
    /// Every problem must reference a velocity state of the same shape and
    /// target a distinct `bs_idx`; rows outside the targeted set remain
    /// exactly zero. An empty slice yields an empty matrix.
    ///
    /// # Errors
    ///
    /// Propagates the first fatal error from any element, plus
    /// [`ResolveError::DuplicateBatchIndex`] when two problems alias a row
    /// and a shape mismatch when the problems disagree on the batch shape.
    pub fn resolve_all(
        &self,
        problems: &[ContactProblem<'_>],
    ) -> Result<DMatrix<f64>, ResolveError> {
        let Some(first) = problems.first() else {
            return Ok(DMatrix::zeros(0, 0));
        };
        let shape = first.v.shape();
        for problem in problems {
            problem.validate()?;
            if problem.v.shape() != shape {
                return Err(ResolveError::ShapeMismatch {
                    what: "v",
                    expected: shape,
                    got: problem.v.shape(),
                });
            }
        }
        for (i, problem) in problems.iter().enumerate() {
            if problems[..i].iter().any(|p| p.bs_idx == problem.bs_idx) {
                return Err(ResolveError::DuplicateBatchIndex {
                    bs_idx: problem.bs_idx,
                });
            }
        }

        let rows = self.delta_rows(problems)?;

        let mut dv = DMatrix::zeros(shape.0, shape.1);
        for (bs_idx, row) in rows {
            dv.row_mut(bs_idx).copy_from(&row.transpose());
        }
        Ok(dv)
    }

    #[cfg(feature = "parallel")]
    fn delta_rows(
        &self,
        problems: &[ContactProblem<'_>],
    ) -> Result<Vec<(usize, DVector<f64>)>, ResolveError> {
        problems
            .par_iter()
            .map(|p| Ok((p.bs_idx, self.resolve_delta_row(p)?)))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn delta_rows(
        &self,
        problems: &[ContactProblem<'_>],
    ) -> Result<Vec<(usize, DVector<f64>)>, ResolveError> {
        problems
            .iter()
            .map(|p| Ok((p.bs_idx, self.resolve_delta_row(p)?)))
            .collect()
    }
}
