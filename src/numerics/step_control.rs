//! Adaptive time-step control: Propose -> Solve -> {Accept, Reject}.
//!
//! Accepted steps commit the integrator history, advance simulation
//! time, notify the archiver exactly once, and may grow dt; rejected
//! steps shrink dt and retry without advancing anything. Exhausting the
//! dt floor or the rejection cap is the only fatal outcome.

use crate::numerics::assembler::Assembler;
use crate::numerics::error_estimator::ErrorEstimator;
use crate::numerics::newton::{NewtonError, NewtonSolver, SolverResult};
use crate::numerics::sparse::{CsrArena, SparsityPattern};
use crate::numerics::split_operator::SplitOperatorNotConverged;
use crate::numerics::time_integration::{TimeIntegrator, TimeScheme};
use crate::processing::archiver::Archiver;
use nalgebra::DVector;
use thiserror::Error;

/// One physics bundled with everything its implicit solve needs: the
/// assembler, the time-level history, the Newton solver and the
/// fixed-pattern Jacobian arena.
pub struct TransportSystem<'a> {
    pub assembler: Assembler<'a>,
    pub integrator: TimeIntegrator,
    pub newton: NewtonSolver,
    pub jacobian: CsrArena,
}

impl<'a> TransportSystem<'a> {
    pub fn new(
        assembler: Assembler<'a>,
        scheme: TimeScheme,
        newton: NewtonSolver,
        initial: DVector<f64>,
    ) -> Self {
        let pattern = SparsityPattern::from_mesh(assembler.mesh(), assembler.dofs());
        assert_eq!(pattern.n, initial.len(), "initial condition has wrong length");
        TransportSystem {
            assembler,
            integrator: TimeIntegrator::new(scheme, initial),
            newton,
            jacobian: CsrArena::new(pattern),
        }
    }

    /// Latest accepted solution.
    pub fn solution(&self) -> &DVector<f64> {
        self.integrator.latest()
    }

    /// Attempt the window [t, t + dt]: build the history caches, predict
    /// an initial iterate, and run Newton at the new time level. Does
    /// not commit.
    pub fn solve_window(
        &mut self,
        t: f64,
        dt: f64,
        logging: bool,
    ) -> Result<SolverResult, NewtonError> {
        let weights = self.integrator.start_step(&mut self.assembler, t, dt)?;
        let guess = self.integrator.predict(dt);
        self.newton.solve(
            &mut self.assembler,
            &mut self.jacobian,
            t + dt,
            &weights,
            guess,
            logging,
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StepConfig {
    pub dt_initial: f64,
    /// Fatal floor for dt.
    pub dt_min: f64,
    pub dt_max: f64,
    pub growth_factor: f64,
    pub shrink_factor: f64,
    /// Grow dt when Newton converges within this many iterations.
    pub target_iterations: u32,
    /// Fatal cap on consecutive rejections of one step.
    pub max_rejections: u32,
    /// Enables error-based adaptation when an estimator is attached.
    pub error_tolerance: Option<f64>,
}

impl Default for StepConfig {
    fn default() -> Self {
        StepConfig {
            dt_initial: 1e-2,
            dt_min: 1e-10,
            dt_max: f64::INFINITY,
            growth_factor: 1.5,
            shrink_factor: 0.5,
            target_iterations: 5,
            max_rejections: 50,
            error_tolerance: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RejectReason {
    #[error(transparent)]
    Newton(NewtonError),
    #[error(transparent)]
    SplitOperator(SplitOperatorNotConverged),
}

#[derive(Debug, Error)]
#[error(
    "time stepping failed permanently at t = {last_accepted_time:.6e} \
     (attempted dt = {attempted_dt:.3e}, {rejections} rejections): {reason}"
)]
pub struct StepFailurePermanent {
    pub last_accepted_time: f64,
    pub attempted_dt: f64,
    pub rejections: u32,
    pub reason: RejectReason,
}

pub struct StepReport {
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    pub iterations: u32,
    pub residual: f64,
}

#[derive(Default)]
pub struct RunStats {
    pub steps: usize,
    pub newton_iterations: u32,
    pub rejections: u32,
    pub final_time: f64,
}

pub struct StepController {
    pub config: StepConfig,
    pub estimator: Option<Box<dyn ErrorEstimator>>,
    time: f64,
    dt: f64,
    attempted_dt: f64,
    rejections_this_step: u32,
    pub total_rejections: u32,
    step_index: usize,
}

impl StepController {
    pub fn new(config: StepConfig, t_start: f64) -> Self {
        let dt = config.dt_initial.min(config.dt_max);
        StepController {
            config,
            estimator: None,
            time: t_start,
            dt,
            attempted_dt: dt,
            rejections_this_step: 0,
            total_rejections: 0,
            step_index: 0,
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn ErrorEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn current_dt(&self) -> f64 {
        self.dt
    }

    pub fn steps_taken(&self) -> usize {
        self.step_index
    }

    /// Choose dt for the next attempt, clamped to the remaining window.
    pub fn propose(&mut self, t_end: f64) -> f64 {
        let remaining = t_end - self.time;
        let mut dt = self.dt.min(self.config.dt_max);
        if dt >= remaining {
            dt = remaining;
        } else if remaining - dt < self.config.dt_min {
            // Avoid leaving behind a sliver smaller than the floor.
            dt = remaining;
        }
        self.attempted_dt = dt;
        dt
    }

    /// Register an accepted step: advance time and adapt dt from the
    /// Newton iteration count and/or the error estimate.
    pub fn accept(&mut self, iterations: u32, error_estimate: Option<f64>) {
        self.time += self.attempted_dt;
        self.step_index += 1;
        self.rejections_this_step = 0;

        match (self.config.error_tolerance, error_estimate) {
            (Some(tol), Some(est)) => {
                let factor = (tol / est.max(1e-14))
                    .sqrt()
                    .clamp(self.config.shrink_factor, self.config.growth_factor);
                self.dt = (self.dt * factor).min(self.config.dt_max);
            }
            _ => {
                if iterations <= self.config.target_iterations {
                    self.dt = (self.dt * self.config.growth_factor).min(self.config.dt_max);
                }
            }
        }
    }

    /// Register a rejection: shrink dt and check the fatal conditions.
    /// Time does not advance and nothing is committed.
    pub fn reject(&mut self, reason: RejectReason) -> Result<(), StepFailurePermanent> {
        self.total_rejections += 1;
        self.rejections_this_step += 1;
        let attempted = self.attempted_dt;
        self.dt = attempted * self.config.shrink_factor;

        if self.dt < self.config.dt_min || self.rejections_this_step > self.config.max_rejections {
            return Err(StepFailurePermanent {
                last_accepted_time: self.time,
                attempted_dt: attempted,
                rejections: self.rejections_this_step,
                reason,
            });
        }
        Ok(())
    }

    /// One accepted step, retrying internally on rejection.
    pub fn advance(
        &mut self,
        system: &mut TransportSystem,
        t_end: f64,
        logging: bool,
    ) -> Result<StepReport, StepFailurePermanent> {
        loop {
            let dt = self.propose(t_end);
            let t = self.time;
            match system.solve_window(t, dt, logging) {
                Ok(result) => {
                    let previous = system.integrator.latest().clone();
                    system.integrator.commit(&result.solution, dt);
                    let estimate = self
                        .estimator
                        .as_ref()
                        .map(|e| e.estimate(&result.solution, &previous, dt));
                    self.accept(result.iterations, estimate);
                    return Ok(StepReport {
                        step: self.step_index,
                        time: self.time,
                        dt,
                        iterations: result.iterations,
                        residual: result.final_residual,
                    });
                }
                Err(e) => self.reject(RejectReason::Newton(e))?,
            }
        }
    }

    /// Drive the system to `t_end`, archiving every accepted step.
    pub fn run(
        &mut self,
        system: &mut TransportSystem,
        t_end: f64,
        archiver: &mut dyn Archiver,
        logging: bool,
    ) -> Result<RunStats, StepFailurePermanent> {
        let mut stats = RunStats::default();
        let tol = 1e-12 * t_end.abs().max(1.0);

        while t_end - self.time > tol {
            let report = self.advance(system, t_end, logging)?;
            stats.steps += 1;
            stats.newton_iterations += report.iterations;

            if logging {
                println!(
                    "Step {:>4} | t = {:.4e} | dt = {:.3e} | iters = {}",
                    report.step, report.time, report.dt, report.iterations
                );
            }

            if let Err(e) = archiver.record(report.step, report.time, system.solution()) {
                eprintln!("archiver failed at step {}: {}", report.step, e);
            }
        }

        stats.rejections = self.total_rejections;
        stats.final_time = self.time;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forced_divergence() -> RejectReason {
        RejectReason::Newton(NewtonError::Diverged {
            iterations: 1,
            residual: 1.0,
        })
    }

    #[test]
    fn dt_grows_on_fast_convergence() {
        let mut controller = StepController::new(StepConfig::default(), 0.0);
        let dt0 = controller.propose(1e6);
        controller.accept(2, None);
        assert!(controller.current_dt() > dt0);
    }

    #[test]
    fn rejection_cap_is_fatal() {
        let config = StepConfig {
            dt_initial: 1.0,
            dt_min: 1e-30,
            max_rejections: 3,
            ..Default::default()
        };
        let mut controller = StepController::new(config, 0.0);
        controller.propose(1e6);
        for _ in 0..3 {
            controller.propose(1e6);
            controller.reject(forced_divergence()).unwrap();
        }
        controller.propose(1e6);
        let err = controller.reject(forced_divergence()).unwrap_err();
        assert_eq!(err.rejections, 4);
        assert_eq!(err.last_accepted_time, 0.0);
    }

    #[test]
    fn error_estimate_drives_dt() {
        let config = StepConfig {
            dt_initial: 1.0,
            error_tolerance: Some(1e-2),
            ..Default::default()
        };
        let mut controller = StepController::new(config, 0.0);
        controller.propose(1e6);
        // Large estimate shrinks dt.
        controller.accept(2, Some(1.0));
        assert!(controller.current_dt() < 1.0);
    }
}
