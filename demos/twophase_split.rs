//! Split-operator two-phase flow: an elliptic pressure stage and a
//! saturation transport stage, iterated to coupling convergence within
//! every time step.
//!
//! Run with: cargo run --example twophase_split

use femflow::discretization::dofmap::DofMap;
use femflow::models::transport::twophase_split_1d;
use femflow::numerics::assembler::Assembler;
use femflow::numerics::linear::DenseLu;
use femflow::numerics::newton::{NewtonConfig, NewtonSolver};
use femflow::numerics::split_operator::{
    SplitOperatorDriver, SplitStage, SplitStrategy, TransportStage,
};
use femflow::numerics::step_control::{StepConfig, StepController, TransportSystem};
use femflow::numerics::time_integration::TimeScheme;
use femflow::processing::archiver::CsvArchiver;
use femflow::processing::csv_writer;
use std::fs;

fn main() {
    fs::create_dir_all("output/twophase").expect("Failed to create output directory");

    let n_elements = 100;
    let t_end = 0.3;

    println!("Split-operator two-phase flow");
    println!("  {n_elements} elements, T = {t_end}");
    println!();

    let problem = twophase_split_1d(n_elements);
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

    let mut flow = TransportStage::new("pressure", pressure_system).with_archiver(Box::new(
        CsvArchiver::new("output/twophase", "p").expect("Failed to create pressure archiver"),
    ));
    let mut transport = TransportStage::new("saturation", saturation_system).with_archiver(
        Box::new(
            CsvArchiver::new("output/twophase", "s")
                .expect("Failed to create saturation archiver"),
        ),
    );
    let mut stages: Vec<&mut dyn SplitStage> = vec![&mut flow, &mut transport];

    let controller = StepController::new(
        StepConfig {
            dt_initial: 2e-3,
            dt_max: 1e-2,
            ..Default::default()
        },
        0.0,
    );
    let mut driver = SplitOperatorDriver::new(
        SplitStrategy::Iterative {
            max_sweeps: 25,
            tolerance: 1e-6,
        },
        controller,
    );

    if let Err(e) = driver.run(&mut stages, t_end, true) {
        eprintln!("run failed: {e}");
        std::process::exit(1);
    }
    drop(stages);

    let x: Vec<f64> = mesh.nodes.iter().map(|n| n.position.x).collect();
    csv_writer::write_xy(
        "output/twophase/final_saturation.csv",
        "x",
        "s",
        &x,
        transport.candidate().as_slice(),
    )
    .expect("Failed to write final saturation");

    println!();
    println!("Final saturation saved to output/twophase/final_saturation.csv");
}
