//! Transient 2-D transport of a Gaussian pulse, solved with the
//! iterative linear backend and full stabilization.
//!
//! Run with: cargo run --example transient_transport

use femflow::discretization::dofmap::DofMap;
use femflow::models::transport::gaussian_hill_2d;
use femflow::numerics::assembler::Assembler;
use femflow::numerics::linear::{BiCgStab, DenseLu};
use femflow::numerics::newton::{NewtonConfig, NewtonSolver};
use femflow::numerics::step_control::{StepConfig, StepController, TransportSystem};
use femflow::numerics::time_integration::TimeScheme;
use femflow::physics::stabilization::StabilizationConfig;
use femflow::processing::archiver::CsvArchiver;
use femflow::processing::csv_writer;
use femflow::processing::summary::RunSummary;
use glam::DVec2;
use std::fs;

fn main() {
    fs::create_dir_all("output/transport").expect("Failed to create output directory");

    let size = 32;
    let velocity = DVec2::new(1.0, 0.5);
    let diffusion = 1e-3;
    let t_end = 0.4;

    println!("2-D transient transport");
    println!("  {size}x{size} quads, v = ({}, {}), a = {diffusion}", velocity.x, velocity.y);
    println!();

    let (mesh, coefficients, bcs, initial) = gaussian_hill_2d(size, size, velocity, diffusion);
    let dofs = DofMap::new(&mesh, 1);

    let stabilization = StabilizationConfig {
        subgrid: true,
        shock_capturing: true,
        interior_penalty: 1.0,
        ..Default::default()
    };
    let assembler =
        Assembler::new(&mesh, &dofs, &coefficients, &bcs).with_stabilization(stabilization);

    let newton = NewtonSolver::new(NewtonConfig::default(), Box::new(BiCgStab::default()))
        .with_fallback(Box::new(DenseLu));
    let mut system = TransportSystem::new(assembler, TimeScheme::BackwardEuler, newton, initial);

    let config = StepConfig {
        dt_initial: 2e-3,
        dt_max: 2e-2,
        ..Default::default()
    };
    let mut controller = StepController::new(config, 0.0);
    let mut archiver =
        CsvArchiver::new("output/transport", "u").expect("Failed to create archiver");

    let mut summary = RunSummary::from_problem(&mesh, 1, "backward Euler (adaptive)");
    match controller.run(&mut system, t_end, &mut archiver, true) {
        Ok(stats) => {
            summary.add_run_stats(&stats);
            archiver.finish().expect("Failed to write step index");
        }
        Err(e) => {
            eprintln!("run failed: {e}");
            std::process::exit(1);
        }
    }

    // Node coordinates for plotting the archived fields.
    let x: Vec<f64> = mesh.nodes.iter().map(|n| n.position.x).collect();
    let y: Vec<f64> = mesh.nodes.iter().map(|n| n.position.y).collect();
    csv_writer::write_xy("output/transport/nodes.csv", "x", "y", &x, &y)
        .expect("Failed to write node coordinates");

    summary.print_to_console();
}
