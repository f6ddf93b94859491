//! Damped Newton iteration over the assembled system.
//!
//! State machine: Init -> Iterating -> {Converged, Diverged,
//! MaxIterationsExceeded}. Convergence accepts any of three criteria:
//! absolute residual norm, relative residual decrease, or update-norm
//! step tolerance. Divergence fires immediately on a non-finite
//! residual, or after a configured streak of consecutive residual
//! increases. Linear-solve failures are failed iteration steps (with an
//! optional fallback backend tried first), not fatal errors.

use crate::numerics::assembler::{Assembler, AssemblyError};
use crate::numerics::linear::LinearSolveService;
use crate::numerics::sparse::CsrArena;
use crate::numerics::time_integration::TimeWeights;
use crate::numerics::timing::{record_assembly, record_linear_solve};
use crate::numerics::{Convergence, ConvergenceMetric, Tolerance};
use nalgebra::DVector;
use thiserror::Error;

pub struct LineSearchConfig {
    /// Minimum step fraction before the search gives up.
    pub min_step: f64,
    /// Sufficient-decrease parameter.
    pub armijo_param: f64,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        LineSearchConfig {
            min_step: 1e-3,
            armijo_param: 1e-4,
        }
    }
}

pub struct NewtonConfig {
    pub max_iterations: u32,
    pub tolerance: Convergence,
    pub step_tolerance: f64,
    /// Consecutive residual increases tolerated before declaring
    /// divergence.
    pub max_growth_streak: u32,
    pub line_search: LineSearchConfig,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        NewtonConfig {
            max_iterations: 25,
            tolerance: Convergence {
                tolerance: Tolerance::Combined(1e-8, 1e-8),
                metric: ConvergenceMetric::L2Norm,
            },
            step_tolerance: 1e-12,
            max_growth_streak: 3,
            line_search: LineSearchConfig::default(),
        }
    }
}

pub struct SolverResult {
    pub solution: DVector<f64>,
    pub iterations: u32,
    pub final_residual: f64,
}

#[derive(Debug, Error)]
pub enum NewtonError {
    #[error("nonlinear iteration diverged after {iterations} iterations (residual {residual:.3e})")]
    Diverged { iterations: u32, residual: f64 },
    #[error("nonlinear iteration hit the {max_iterations}-iteration cap (residual {residual:.3e})")]
    MaxIterationsExceeded { max_iterations: u32, residual: f64 },
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

pub struct NewtonSolver {
    pub config: NewtonConfig,
    pub linear: Box<dyn LinearSolveService>,
    pub fallback: Option<Box<dyn LinearSolveService>>,
}

impl NewtonSolver {
    pub fn new(config: NewtonConfig, linear: Box<dyn LinearSolveService>) -> Self {
        NewtonSolver {
            config,
            linear,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn LinearSolveService>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Run the iteration from `initial_guess`. On success the returned
    /// iterate satisfies one of the convergence criteria; on failure the
    /// iterate must not be reused as a time-level solution.
    pub fn solve(
        &self,
        assembler: &mut Assembler,
        jacobian: &mut CsrArena,
        t: f64,
        weights: &TimeWeights,
        initial_guess: DVector<f64>,
        logging: bool,
    ) -> Result<SolverResult, NewtonError> {
        let n = initial_guess.len();
        let mut u = initial_guess;
        let mut residual = DVector::zeros(n);
        let mut trial_residual = DVector::zeros(n);

        let mut initial_residual: Option<f64> = None;
        let mut previous_residual: Option<f64> = None;
        let mut growth_streak = 0u32;

        if logging {
            println!("Newton solver started. {} unknowns.", n);
            println!("  Iter |  Residual  |  Fraction  | Alpha |");
            println!("-------|------------|------------|-------|");
        }

        for i in 0..self.config.max_iterations {
            record_assembly(|| {
                assembler.assemble_system(&u, t, weights, &mut residual, Some(jacobian))
            })?;

            let res_norm = self.config.tolerance.norm(&residual);
            if !res_norm.is_finite() {
                return Err(NewtonError::Diverged {
                    iterations: i,
                    residual: res_norm,
                });
            }

            let init = *initial_residual.get_or_insert(res_norm);
            if logging {
                println!(
                    "  {:4} | {:.4e} | {:.4e} |   -   |",
                    i,
                    res_norm,
                    res_norm / init
                );
            }

            if self.config.tolerance.check_tolerance(res_norm, init) {
                return Ok(SolverResult {
                    solution: u,
                    iterations: i,
                    final_residual: res_norm,
                });
            }

            if let Some(prev) = previous_residual {
                if res_norm > prev {
                    growth_streak += 1;
                    if growth_streak > self.config.max_growth_streak {
                        return Err(NewtonError::Diverged {
                            iterations: i,
                            residual: res_norm,
                        });
                    }
                } else {
                    growth_streak = 0;
                }
            }
            previous_residual = Some(res_norm);

            let rhs = -&residual;
            let delta = match record_linear_solve(|| self.linear.solve(jacobian, &rhs)) {
                Ok(delta) => delta,
                Err(primary) => match &self.fallback {
                    Some(fallback) => match fallback.solve(jacobian, &rhs) {
                        Ok(delta) => delta,
                        Err(_) => {
                            return Err(NewtonError::Diverged {
                                iterations: i,
                                residual: res_norm,
                            });
                        }
                    },
                    None => {
                        if logging {
                            eprintln!("linear solve failed at iteration {}: {}", i, primary);
                        }
                        return Err(NewtonError::Diverged {
                            iterations: i,
                            residual: res_norm,
                        });
                    }
                },
            };

            // Backtracking line search with the Armijo condition.
            let mut alpha = 1.0;
            let mut accepted = false;
            let mut accepted_norm = res_norm;
            while alpha >= self.config.line_search.min_step {
                let candidate = &u + &delta * alpha;
                // A trial step that leaves the domain of the
                // coefficients is rejected like any other failed step.
                let trial_ok = assembler
                    .assemble_residual(&candidate, t, weights, &mut trial_residual)
                    .is_ok();
                if trial_ok {
                    let trial_norm = self.config.tolerance.norm(&trial_residual);
                    let target = (1.0 - alpha * self.config.line_search.armijo_param) * res_norm;
                    if trial_norm.is_finite() && trial_norm < target {
                        u = candidate;
                        accepted_norm = trial_norm;
                        accepted = true;
                        break;
                    }
                }
                alpha *= 0.5;
            }

            if !accepted {
                if logging {
                    println!("  line search found no sufficient decrease");
                }
                return Err(NewtonError::Diverged {
                    iterations: i,
                    residual: res_norm,
                });
            }

            if logging {
                println!(
                    "  {:4} | {:.4e} | {:.4e} | {:.3} |",
                    i + 1,
                    accepted_norm,
                    accepted_norm / init,
                    alpha
                );
            }

            let update_norm = alpha * delta.norm();
            if update_norm < self.config.step_tolerance {
                return Ok(SolverResult {
                    solution: u,
                    iterations: i + 1,
                    final_residual: accepted_norm,
                });
            }
        }

        Err(NewtonError::MaxIterationsExceeded {
            max_iterations: self.config.max_iterations,
            residual: previous_residual.unwrap_or(f64::NAN),
        })
    }
}
