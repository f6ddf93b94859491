use femflow::discretization::dofmap::DofMap;
use femflow::discretization::generator::interval_mesh;
use femflow::models::transport::{manufactured_exact, manufactured_linear_1d, nodal_values};
use femflow::numerics::assembler::Assembler;
use femflow::numerics::linear::DenseLu;
use femflow::numerics::newton::{NewtonConfig, NewtonError, NewtonSolver};
use femflow::numerics::sparse::{CsrArena, SparsityPattern};
use femflow::numerics::step_control::{
    RejectReason, StepConfig, StepController, TransportSystem,
};
use femflow::numerics::time_integration::{TimeScheme, TimeWeights};
use femflow::physics::bc::{BCRegistry, BCRule, BoundarySelector, Field, GeneralizedBC};
use femflow::physics::coefficients::{BurgersAdr, LinearAdr};
use femflow::physics::stabilization::StabilizationConfig;
use femflow::processing::archiver::MemoryArchiver;
use glam::DVec2;
use nalgebra::DVector;
use std::f64::consts::PI;
use std::sync::Arc;

/// Newton on the manufactured linear problem: the solution must land on
/// the exact answer within discretization error.
#[test]
fn newton_converges_to_manufactured_solution() {
    let (mesh, coefficients, bcs) = manufactured_linear_1d(32, 1.0, 1.0, 0.5);
    let dofs = DofMap::new(&mesh, 1);
    let mut assembler = Assembler::new(&mesh, &dofs, &coefficients, &bcs);
    let mut jacobian = CsrArena::new(SparsityPattern::from_mesh(&mesh, &dofs));

    let newton = NewtonSolver::new(NewtonConfig::default(), Box::new(DenseLu));
    let guess = DVector::zeros(dofs.n_dofs());
    let result = newton
        .solve(
            &mut assembler,
            &mut jacobian,
            0.0,
            &TimeWeights::steady(),
            guess,
            false,
        )
        .expect("newton should converge");

    assert!(result.final_residual < 1e-8);
    for (node, value) in result.solution.iter().enumerate() {
        let x = mesh.nodes[node].position.x;
        assert!(
            (value - manufactured_exact(x)).abs() < 0.05,
            "node {node}: {value} vs {}",
            manufactured_exact(x)
        );
    }
}

/// A linear problem means the Jacobian solve is exact: on a two-element
/// mesh Newton must converge in exactly one iteration.
#[test]
fn linear_problem_converges_in_one_iteration() {
    let (mesh, coefficients, bcs) = manufactured_linear_1d(2, 1.0, 1.0, 0.0);
    let dofs = DofMap::new(&mesh, 1);
    let mut assembler = Assembler::new(&mesh, &dofs, &coefficients, &bcs);
    let mut jacobian = CsrArena::new(SparsityPattern::from_mesh(&mesh, &dofs));

    let newton = NewtonSolver::new(NewtonConfig::default(), Box::new(DenseLu));
    let guess = DVector::zeros(dofs.n_dofs());
    let result = newton
        .solve(
            &mut assembler,
            &mut jacobian,
            0.0,
            &TimeWeights::steady(),
            guess,
            false,
        )
        .expect("newton should converge");

    assert_eq!(result.iterations, 1);
    assert!(result.final_residual < 1e-10);
}

/// Newton on the nonlinear Burgers problem with a manufactured source.
#[test]
fn newton_handles_nonlinear_burgers() {
    let mesh = interval_mesh(0.0, 1.0, 32);
    let dofs = DofMap::new(&mesh, 1);
    let diffusion = 0.05;
    let source = Arc::new(move |x: DVec2, _t: f64| {
        let s = (PI * x.x).sin();
        let c = (PI * x.x).cos();
        PI * s * c + diffusion * PI * PI * s
    });
    let coefficients = BurgersAdr::new(DVec2::new(1.0, 0.0), diffusion).with_source(source);
    let mut bcs = BCRegistry::default();
    for label in ["left", "right"] {
        bcs.add(BCRule {
            field: Field::from("u"),
            on: BoundarySelector::Label(label.into()),
            bc: GeneralizedBC::dirichlet(0.0),
        });
    }
    let mut assembler = Assembler::new(&mesh, &dofs, &coefficients, &bcs)
        .with_stabilization(StabilizationConfig::none());
    let mut jacobian = CsrArena::new(SparsityPattern::from_mesh(&mesh, &dofs));

    let config = NewtonConfig {
        max_iterations: 30,
        ..Default::default()
    };
    let newton = NewtonSolver::new(config, Box::new(DenseLu));
    let guess = nodal_values(&mesh, |p| 0.5 * (PI * p.x).sin());
    let result = newton
        .solve(
            &mut assembler,
            &mut jacobian,
            0.0,
            &TimeWeights::steady(),
            guess,
            false,
        )
        .expect("newton should converge on the manufactured Burgers problem");

    assert!(result.iterations <= 30);
    for (node, value) in result.solution.iter().enumerate() {
        let x = mesh.nodes[node].position.x;
        assert!((value - manufactured_exact(x)).abs() < 0.1);
    }
}

/// Forced rejections: dt halves every time, and once it underruns the
/// floor the controller reports the permanent failure with the full
/// context (floor 1e-6, shrink 0.5, dt0 = 1.0).
#[test]
fn rejection_cascade_hits_the_floor() {
    let config = StepConfig {
        dt_initial: 1.0,
        dt_min: 1e-6,
        shrink_factor: 0.5,
        max_rejections: 1000,
        ..Default::default()
    };
    let mut controller = StepController::new(config, 0.0);

    let forced = || {
        RejectReason::Newton(NewtonError::Diverged {
            iterations: 2,
            residual: 1e3,
        })
    };

    let mut attempted = Vec::new();
    let failure = loop {
        let dt = controller.propose(1e9);
        attempted.push(dt);
        match controller.reject(forced()) {
            Ok(()) => {}
            Err(e) => break e,
        }
    };

    for pair in attempted.windows(2) {
        assert!(pair[1] < pair[0], "dt must strictly decrease on rejection");
    }
    // 2^-20 is the first dt below 1e-6; the failing attempt ran at 2^-19.
    assert_eq!(failure.rejections, 20);
    assert!((failure.attempted_dt - 2.0_f64.powi(-19)).abs() < 1e-12);
    assert_eq!(failure.last_accepted_time, 0.0);
    assert!(matches!(
        failure.reason,
        RejectReason::Newton(NewtonError::Diverged { .. })
    ));
}

/// Backward Euler on a pure decay problem reproduces the exact discrete
/// recurrence u_{n+1} = u_n / (1 + sigma dt) at every node, and the
/// archiver sees exactly one record per accepted step.
#[test]
fn backward_euler_decay_recurrence() {
    let mesh = interval_mesh(0.0, 1.0, 8);
    let dofs = DofMap::new(&mesh, 1);
    let sigma = 1.0;
    let coefficients = LinearAdr::new(DVec2::ZERO, 0.0, sigma);
    let bcs = BCRegistry::default();
    let assembler = Assembler::new(&mesh, &dofs, &coefficients, &bcs);

    let initial = DVector::from_element(dofs.n_dofs(), 1.0);
    let newton = NewtonSolver::new(NewtonConfig::default(), Box::new(DenseLu));
    let mut system = TransportSystem::new(assembler, TimeScheme::BackwardEuler, newton, initial);

    let config = StepConfig {
        dt_initial: 0.1,
        growth_factor: 1.0,
        ..Default::default()
    };
    let mut controller = StepController::new(config, 0.0);
    let mut archiver = MemoryArchiver::default();

    let stats = controller
        .run(&mut system, 0.5, &mut archiver, false)
        .expect("decay run should succeed");

    assert_eq!(stats.steps, 5);
    assert_eq!(archiver.records.len(), 5);
    assert_eq!(stats.rejections, 0);

    // Product of the per-step decay factors actually taken.
    let mut expected = 1.0;
    let mut prev_t = 0.0;
    for (_, t, _) in &archiver.records {
        expected /= 1.0 + sigma * (t - prev_t);
        prev_t = *t;
    }
    for value in system.solution().iter() {
        assert!((value - expected).abs() < 1e-9);
    }
}

/// dt grows after fast-converging steps and is clamped at dt_max.
#[test]
fn dt_adaptation_grows_and_clamps() {
    let mesh = interval_mesh(0.0, 1.0, 4);
    let dofs = DofMap::new(&mesh, 1);
    let coefficients = LinearAdr::new(DVec2::ZERO, 0.0, 1.0);
    let bcs = BCRegistry::default();
    let assembler = Assembler::new(&mesh, &dofs, &coefficients, &bcs);

    let initial = DVector::from_element(dofs.n_dofs(), 1.0);
    let newton = NewtonSolver::new(NewtonConfig::default(), Box::new(DenseLu));
    let mut system = TransportSystem::new(assembler, TimeScheme::BackwardEuler, newton, initial);

    let config = StepConfig {
        dt_initial: 1e-3,
        dt_max: 4e-3,
        growth_factor: 2.0,
        ..Default::default()
    };
    let mut controller = StepController::new(config, 0.0);
    let mut archiver = MemoryArchiver::default();
    controller
        .run(&mut system, 0.05, &mut archiver, false)
        .unwrap();

    let mut max_dt: f64 = 0.0;
    let mut prev_t = 0.0;
    for (_, t, _) in &archiver.records {
        max_dt = max_dt.max(t - prev_t);
        prev_t = *t;
    }
    assert!(max_dt > 1e-3, "dt should have grown");
    assert!(max_dt <= 4e-3 + 1e-12, "dt must respect dt_max");
}
