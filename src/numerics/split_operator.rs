//! Split-operator sequencing of coupled physics within one time step.
//!
//! Each stage owns one physics and its implicit solve; the driver runs
//! the stages over a shared window [t, t + dt], either once (strict
//! sequential) or repeatedly until the cross-physics change drops below
//! a tolerance (iterative). No stage commits its time-level history
//! until the whole step is accepted; any stage failure or coupling
//! non-convergence rejects the step for every stage.

use crate::numerics::newton::NewtonError;
use crate::numerics::step_control::{
    RejectReason, StepController, StepFailurePermanent, TransportSystem,
};
use crate::processing::archiver::Archiver;
use nalgebra::DVector;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("split-operator coupling did not converge within {sweeps} sweeps (max change {max_change:.3e})")]
pub struct SplitOperatorNotConverged {
    pub sweeps: u32,
    pub max_change: f64,
}

#[derive(Clone, Copy, Debug)]
pub enum SplitStrategy {
    /// Each physics solved once per step, in order, using the other
    /// stages' latest candidates.
    Sequential,
    /// Repeat the sequence until the relative change of every stage's
    /// candidate drops below `tolerance`.
    Iterative { max_sweeps: u32, tolerance: f64 },
}

/// One physics inside a split-operator system.
pub trait SplitStage {
    fn name(&self) -> &str;

    /// Receive the other stages' current candidate fields before a solve.
    fn exchange(&mut self, others: &[&DVector<f64>]);

    /// Solve the window [t, t + dt] and store the result as the stage
    /// candidate. Returns the Newton iteration count.
    fn solve_window(&mut self, t: f64, dt: f64, logging: bool) -> Result<u32, NewtonError>;

    fn candidate(&self) -> &DVector<f64>;

    /// Drop the candidate back to the last committed level.
    fn reset_candidate(&mut self);

    /// Commit the candidate as the new time level. Called exactly once
    /// per accepted step, never on rejection.
    fn commit(&mut self, step: usize, time: f64, dt: f64);
}

/// [`SplitStage`] over a [`TransportSystem`], wiring the other stages'
/// fields into the assembler's coupling slot and archiving committed
/// levels.
pub struct TransportStage<'a> {
    name: String,
    pub system: TransportSystem<'a>,
    candidate: DVector<f64>,
    archiver: Option<Box<dyn Archiver>>,
}

impl<'a> TransportStage<'a> {
    pub fn new(name: impl Into<String>, system: TransportSystem<'a>) -> Self {
        let candidate = system.solution().clone();
        TransportStage {
            name: name.into(),
            system,
            candidate,
            archiver: None,
        }
    }

    pub fn with_archiver(mut self, archiver: Box<dyn Archiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }
}

impl SplitStage for TransportStage<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn exchange(&mut self, others: &[&DVector<f64>]) {
        if others.is_empty() {
            self.system.assembler.clear_coupling();
            return;
        }
        let num_nodes = self.system.assembler.mesh().num_nodes();
        let comps: Vec<usize> = others.iter().map(|f| f.len() / num_nodes).collect();
        let total: usize = comps.iter().sum();
        let mut merged = vec![0.0; num_nodes * total];
        for node in 0..num_nodes {
            let mut offset = 0;
            for (field, &nc) in others.iter().zip(&comps) {
                for c in 0..nc {
                    merged[node * total + offset + c] = field[node * nc + c];
                }
                offset += nc;
            }
        }
        self.system.assembler.set_coupling(merged, total);
    }

    fn solve_window(&mut self, t: f64, dt: f64, logging: bool) -> Result<u32, NewtonError> {
        let result = self.system.solve_window(t, dt, logging)?;
        self.candidate = result.solution;
        Ok(result.iterations)
    }

    fn candidate(&self) -> &DVector<f64> {
        &self.candidate
    }

    fn reset_candidate(&mut self) {
        self.candidate = self.system.solution().clone();
    }

    fn commit(&mut self, step: usize, time: f64, dt: f64) {
        self.system.integrator.commit(&self.candidate, dt);
        if let Some(archiver) = &mut self.archiver {
            if let Err(e) = archiver.record(step, time, &self.candidate) {
                eprintln!("archiver failed for stage {} at step {}: {}", self.name, step, e);
            }
        }
    }
}

#[derive(Debug)]
pub struct SplitReport {
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    /// Largest Newton iteration count over the stages of the last sweep.
    pub iterations: u32,
}

pub struct SplitOperatorDriver {
    pub strategy: SplitStrategy,
    pub controller: StepController,
}

impl SplitOperatorDriver {
    pub fn new(strategy: SplitStrategy, controller: StepController) -> Self {
        SplitOperatorDriver {
            strategy,
            controller,
        }
    }

    /// One accepted overall step, retrying with smaller dt on rejection.
    pub fn advance(
        &mut self,
        stages: &mut [&mut dyn SplitStage],
        t_end: f64,
        logging: bool,
    ) -> Result<SplitReport, StepFailurePermanent> {
        loop {
            let dt = self.controller.propose(t_end);
            let t = self.controller.time();

            match self.attempt_window(stages, t, dt, logging) {
                Ok(iterations) => {
                    self.controller.accept(iterations, None);
                    let step = self.controller.steps_taken();
                    let time = self.controller.time();
                    for stage in stages.iter_mut() {
                        stage.commit(step, time, dt);
                    }
                    return Ok(SplitReport {
                        step,
                        time,
                        dt,
                        iterations,
                    });
                }
                Err(reason) => {
                    for stage in stages.iter_mut() {
                        stage.reset_candidate();
                    }
                    self.controller.reject(reason)?;
                }
            }
        }
    }

    /// Drive all stages to `t_end`.
    pub fn run(
        &mut self,
        stages: &mut [&mut dyn SplitStage],
        t_end: f64,
        logging: bool,
    ) -> Result<(), StepFailurePermanent> {
        let tol = 1e-12 * t_end.abs().max(1.0);
        while t_end - self.controller.time() > tol {
            let report = self.advance(stages, t_end, logging)?;
            if logging {
                println!(
                    "Step {:>4} | t = {:.4e} | dt = {:.3e} | iters = {}",
                    report.step, report.time, report.dt, report.iterations
                );
            }
        }
        Ok(())
    }

    fn attempt_window(
        &self,
        stages: &mut [&mut dyn SplitStage],
        t: f64,
        dt: f64,
        logging: bool,
    ) -> Result<u32, RejectReason> {
        match self.strategy {
            SplitStrategy::Sequential => self.sweep(stages, t, dt, logging),
            SplitStrategy::Iterative {
                max_sweeps,
                tolerance,
            } => {
                let mut max_change = f64::INFINITY;
                for _sweep in 0..max_sweeps {
                    let previous: Vec<DVector<f64>> =
                        stages.iter().map(|s| s.candidate().clone()).collect();
                    let iterations = self.sweep(stages, t, dt, logging)?;
                    max_change = stages
                        .iter()
                        .zip(&previous)
                        .map(|(s, p)| (s.candidate() - p).norm() / (p.norm() + 1e-14))
                        .fold(0.0, f64::max);
                    if max_change < tolerance {
                        return Ok(iterations);
                    }
                }
                Err(RejectReason::SplitOperator(SplitOperatorNotConverged {
                    sweeps: max_sweeps,
                    max_change,
                }))
            }
        }
    }

    fn sweep(
        &self,
        stages: &mut [&mut dyn SplitStage],
        t: f64,
        dt: f64,
        logging: bool,
    ) -> Result<u32, RejectReason> {
        let mut max_iterations = 0;
        for i in 0..stages.len() {
            let others: Vec<DVector<f64>> = stages
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, s)| s.candidate().clone())
                .collect();
            let refs: Vec<&DVector<f64>> = others.iter().collect();
            stages[i].exchange(&refs);
            let iterations = stages[i]
                .solve_window(t, dt, logging)
                .map_err(RejectReason::Newton)?;
            max_iterations = max_iterations.max(iterations);
        }
        Ok(max_iterations)
    }
}
