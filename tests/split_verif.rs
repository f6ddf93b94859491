use femflow::discretization::dofmap::DofMap;
use femflow::models::transport::twophase_split_1d;
use femflow::numerics::assembler::Assembler;
use femflow::numerics::linear::DenseLu;
use femflow::numerics::newton::{NewtonConfig, NewtonError, NewtonSolver};
use femflow::numerics::split_operator::{
    SplitOperatorDriver, SplitStage, SplitStrategy, TransportStage,
};
use femflow::numerics::step_control::{StepConfig, StepController, TransportSystem};
use femflow::numerics::time_integration::TimeScheme;
use nalgebra::DVector;
use std::cell::RefCell;
use std::rc::Rc;

type EventLog = Rc<RefCell<Vec<String>>>;

/// Scripted stage: the candidate relaxes toward a fixed point by a
/// factor per solve, so the cross-physics iteration converges
/// geometrically. Every call is written to the shared event log.
struct MockStage {
    name: String,
    committed: DVector<f64>,
    candidate: DVector<f64>,
    target: f64,
    relaxation: f64,
    log: EventLog,
}

impl MockStage {
    fn new(name: &str, target: f64, relaxation: f64, log: EventLog) -> Self {
        MockStage {
            name: name.to_string(),
            committed: DVector::from_element(4, 0.0),
            candidate: DVector::from_element(4, 0.0),
            target,
            relaxation,
            log,
        }
    }
}

impl SplitStage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn exchange(&mut self, _others: &[&DVector<f64>]) {}

    fn solve_window(&mut self, _t: f64, _dt: f64, _logging: bool) -> Result<u32, NewtonError> {
        self.log.borrow_mut().push(format!("solve:{}", self.name));
        let target = DVector::from_element(self.candidate.len(), self.target);
        self.candidate = &self.candidate + (&target - &self.candidate) * self.relaxation;
        Ok(3)
    }

    fn candidate(&self) -> &DVector<f64> {
        &self.candidate
    }

    fn reset_candidate(&mut self) {
        self.log.borrow_mut().push(format!("reset:{}", self.name));
        self.candidate = self.committed.clone();
    }

    fn commit(&mut self, _step: usize, _time: f64, _dt: f64) {
        self.log.borrow_mut().push(format!("commit:{}", self.name));
        self.committed = self.candidate.clone();
    }
}

/// Iterative coupling must not commit any stage before the
/// cross-physics criterion holds: every solve event precedes every
/// commit event within the step, and each stage commits exactly once.
#[test]
fn iterative_mode_defers_commits_until_convergence() {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let mut a = MockStage::new("flow", 1.0, 0.9, log.clone());
    let mut b = MockStage::new("transport", 2.0, 0.9, log.clone());
    let mut stages: Vec<&mut dyn SplitStage> = vec![&mut a, &mut b];

    let controller = StepController::new(
        StepConfig {
            dt_initial: 0.1,
            ..Default::default()
        },
        0.0,
    );
    let mut driver = SplitOperatorDriver::new(
        SplitStrategy::Iterative {
            max_sweeps: 200,
            tolerance: 1e-8,
        },
        controller,
    );

    driver
        .advance(&mut stages, 1.0, false)
        .expect("coupling should converge");

    let events = log.borrow();
    let first_commit = events
        .iter()
        .position(|e| e.starts_with("commit"))
        .expect("stages must commit on acceptance");
    let last_solve = events
        .iter()
        .rposition(|e| e.starts_with("solve"))
        .unwrap();
    assert!(
        last_solve < first_commit,
        "no commit may happen before the coupling loop finished: {events:?}"
    );
    assert_eq!(events.iter().filter(|e| *e == "commit:flow").count(), 1);
    assert_eq!(
        events.iter().filter(|e| *e == "commit:transport").count(),
        1
    );
}

/// A stage that never settles: the driver must reject (resetting the
/// candidates, committing nothing) and shrink dt until the failure
/// becomes permanent.
#[test]
fn non_convergent_coupling_rejects_and_fails_permanently() {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    // relaxation 2.0 overshoots forever: |change| never decays.
    let mut a = MockStage::new("flow", 1.0, 2.0, log.clone());
    let mut stages: Vec<&mut dyn SplitStage> = vec![&mut a];

    let controller = StepController::new(
        StepConfig {
            dt_initial: 0.1,
            dt_min: 1e-3,
            max_rejections: 100,
            ..Default::default()
        },
        0.0,
    );
    let mut driver = SplitOperatorDriver::new(
        SplitStrategy::Iterative {
            max_sweeps: 5,
            tolerance: 1e-10,
        },
        controller,
    );

    let failure = driver.advance(&mut stages, 1.0, false).unwrap_err();
    assert_eq!(failure.last_accepted_time, 0.0);

    let events = log.borrow();
    assert!(events.iter().all(|e| !e.starts_with("commit")));
    assert!(events.iter().any(|e| e.starts_with("reset")));
}

/// Sequential strategy: one solve per stage per step, then commits.
#[test]
fn sequential_mode_solves_each_stage_once() {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let mut a = MockStage::new("flow", 1.0, 0.5, log.clone());
    let mut b = MockStage::new("transport", 2.0, 0.5, log.clone());
    let mut stages: Vec<&mut dyn SplitStage> = vec![&mut a, &mut b];

    let controller = StepController::new(
        StepConfig {
            dt_initial: 0.1,
            ..Default::default()
        },
        0.0,
    );
    let mut driver = SplitOperatorDriver::new(SplitStrategy::Sequential, controller);
    driver.advance(&mut stages, 1.0, false).unwrap();

    let log_ref = log.borrow();
    let events: Vec<&str> = log_ref.iter().map(|s| s.as_str()).collect();
    assert_eq!(
        events,
        vec![
            "solve:flow",
            "solve:transport",
            "commit:flow",
            "commit:transport"
        ]
    );
}

/// End-to-end: the split two-phase problem advances with the saturation
/// front moving downstream and all fields staying finite.
#[test]
fn twophase_split_advances() {
    let problem = twophase_split_1d(32);
    let mesh = &problem.mesh;
    let pressure_dofs = DofMap::new(mesh, 1);
    let saturation_dofs = DofMap::new(mesh, 1);

    let pressure_system = TransportSystem::new(
        Assembler::new(mesh, &pressure_dofs, &problem.pressure, &problem.pressure_bcs),
        TimeScheme::BackwardEuler,
        NewtonSolver::new(NewtonConfig::default(), Box::new(DenseLu)),
        problem.initial_pressure.clone(),
    );
    let saturation_system = TransportSystem::new(
        Assembler::new(
            mesh,
            &saturation_dofs,
            &problem.saturation,
            &problem.saturation_bcs,
        ),
        TimeScheme::BackwardEuler,
        NewtonSolver::new(NewtonConfig::default(), Box::new(DenseLu)),
        problem.initial_saturation.clone(),
    );

    let mut flow = TransportStage::new("pressure", pressure_system);
    let mut transport = TransportStage::new("saturation", saturation_system);
    let mut stages: Vec<&mut dyn SplitStage> = vec![&mut flow, &mut transport];

    let controller = StepController::new(
        StepConfig {
            dt_initial: 5e-3,
            dt_max: 2e-2,
            ..Default::default()
        },
        0.0,
    );
    let mut driver = SplitOperatorDriver::new(
        SplitStrategy::Iterative {
            max_sweeps: 20,
            tolerance: 1e-6,
        },
        controller,
    );

    driver
        .run(&mut stages, 0.1, false)
        .expect("two-phase run should succeed");
    drop(stages);

    let initial_mass: f64 = problem.initial_saturation.sum();
    let final_saturation = transport.candidate();
    assert!(final_saturation.iter().all(|s| s.is_finite()));
    assert!(
        final_saturation.sum() > initial_mass,
        "injection must increase total saturation"
    );
}
