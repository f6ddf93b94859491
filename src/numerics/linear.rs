//! The linear-solve seam: `J . delta = -R` behind a narrow interface.
//!
//! The Newton solver treats both failure modes as a failed iteration
//! step (optionally retrying on a fallback backend), never as a fatal
//! system error.

use crate::numerics::sparse::CsrArena;
use kryst::solver::LinearSolver;
use kryst::{
    parallel::{NoComm, UniverseComm},
    preconditioner::PcSide,
};
use nalgebra::DVector;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinearSolveError {
    #[error("linear system is singular")]
    SingularSystem,
    #[error("linear solver did not converge within {iterations} iterations")]
    SolverNotConverged { iterations: usize },
}

pub trait LinearSolveService {
    fn solve(&self, matrix: &CsrArena, rhs: &DVector<f64>)
        -> Result<DVector<f64>, LinearSolveError>;
}

/// Direct backend: dense LU factorization. Intended for small systems
/// and for tests where an exact correction matters.
pub struct DenseLu;

impl LinearSolveService for DenseLu {
    fn solve(
        &self,
        matrix: &CsrArena,
        rhs: &DVector<f64>,
    ) -> Result<DVector<f64>, LinearSolveError> {
        let dense = matrix.to_dense();
        dense
            .lu()
            .solve(rhs)
            .ok_or(LinearSolveError::SingularSystem)
    }
}

/// Iterative backend: BiCGStab with Jacobi row scaling to improve
/// conditioning before the Krylov iteration.
pub struct BiCgStab {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for BiCgStab {
    fn default() -> Self {
        BiCgStab {
            tolerance: 1e-10,
            max_iterations: 2000,
        }
    }
}

impl LinearSolveService for BiCgStab {
    fn solve(
        &self,
        matrix: &CsrArena,
        rhs: &DVector<f64>,
    ) -> Result<DVector<f64>, LinearSolveError> {
        let n = matrix.n();
        let mut csr = matrix.to_kryst();

        // Jacobi row scaling: divide every row and its rhs entry by the
        // diagonal.
        let d: Vec<f64> = (0..n)
            .map(|row| {
                let diag = matrix.diagonal(row);
                if diag.abs() < 1e-12 { 1.0 } else { diag }
            })
            .collect();
        for row in 0..n {
            let scale = 1.0 / d[row];
            for val in csr.row_values_mut(row) {
                *val *= scale;
            }
        }
        let b: DVector<f64> = DVector::from_iterator(n, (0..n).map(|i| rhs[i] / d[i]));

        let op = kryst::matrix::op::CsrOp::new(Arc::new(csr));
        let mut solver =
            kryst::solver::bicgstab::BiCgStabSolver::new(self.tolerance, self.max_iterations);
        let mut workspace = kryst::context::ksp_context::Workspace::new(n);
        solver.setup_workspace(&mut workspace);

        let mut x = DVector::from_element(n, 0.0);
        let result = solver.solve(
            &op,
            None,
            b.as_slice(),
            x.as_mut_slice(),
            PcSide::Left,
            &UniverseComm::NoComm(NoComm {}),
            None,
            Some(&mut workspace),
        );

        match result {
            Ok(_) if x.iter().all(|v| v.is_finite()) => Ok(x),
            Ok(_) => Err(LinearSolveError::SingularSystem),
            Err(_) => Err(LinearSolveError::SolverNotConverged {
                iterations: self.max_iterations,
            }),
        }
    }
}
