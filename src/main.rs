use femflow::discretization::dofmap::DofMap;
use femflow::models::transport::{advection_diffusion_1d, nodal_values};
use femflow::numerics::assembler::Assembler;
use femflow::numerics::error_estimator::TemporalDifference;
use femflow::numerics::linear::DenseLu;
use femflow::numerics::newton::{NewtonConfig, NewtonSolver};
use femflow::numerics::step_control::{StepConfig, StepController, TransportSystem};
use femflow::numerics::time_integration::TimeScheme;
use femflow::processing::archiver::CsvArchiver;
use femflow::processing::csv_writer;
use femflow::processing::summary::RunSummary;
use std::fs;

fn main() {
    fs::create_dir_all("output/main").expect("Failed to create output directory");

    let n_elements = 200;
    let velocity = 1.0;
    let diffusion = 1e-3;
    let t_end = 0.5;

    println!("Transient advection-diffusion");
    println!("  elements: {n_elements}, v = {velocity}, a = {diffusion}, T = {t_end}");
    println!();

    let (mesh, coefficients, bcs) = advection_diffusion_1d(n_elements, velocity, diffusion);
    let dofs = DofMap::new(&mesh, 1);

    let initial = nodal_values(&mesh, |p| if p.x < 1e-12 { 1.0 } else { 0.0 });
    save_initial_state(&mesh, &initial);

    let assembler = Assembler::new(&mesh, &dofs, &coefficients, &bcs);
    let newton = NewtonSolver::new(NewtonConfig::default(), Box::new(DenseLu));
    let mut system = TransportSystem::new(assembler, TimeScheme::Bdf2, newton, initial);

    let config = StepConfig {
        dt_initial: 1e-3,
        dt_max: 2e-2,
        error_tolerance: Some(1e-2),
        ..Default::default()
    };
    let mut controller = StepController::new(config, 0.0)
        .with_estimator(Box::new(TemporalDifference::default()));

    let mut summary = RunSummary::from_problem(&mesh, 1, "BDF2 (adaptive)");
    let mut archiver =
        CsvArchiver::new("output/main", "u").expect("Failed to create archiver");

    match controller.run(&mut system, t_end, &mut archiver, true) {
        Ok(stats) => {
            summary.add_run_stats(&stats);
            archiver.finish().expect("Failed to write step index");
            save_final_state(&mesh, system.solution().as_slice());
        }
        Err(e) => {
            eprintln!("run failed: {e}");
            std::process::exit(1);
        }
    }

    summary
        .write_to_file("output/main/simulation_summary.txt")
        .expect("Failed to write summary");
    summary.print_to_console();

    println!("Summary saved to output/main/simulation_summary.txt");
}

fn save_initial_state(mesh: &femflow::discretization::mesh::Mesh, initial: &nalgebra::DVector<f64>) {
    let x: Vec<f64> = mesh.nodes.iter().map(|n| n.position.x).collect();
    csv_writer::write_xy(
        "output/main/initial_state.csv",
        "x",
        "u0",
        &x,
        initial.as_slice(),
    )
    .expect("Failed to write initial state");
    println!("Initial state saved to output/main/initial_state.csv");
    println!();
}

fn save_final_state(mesh: &femflow::discretization::mesh::Mesh, solution: &[f64]) {
    let x: Vec<f64> = mesh.nodes.iter().map(|n| n.position.x).collect();
    csv_writer::write_xy("output/main/final_state.csv", "x", "u", &x, solution)
        .expect("Failed to write final state");
    println!("Final state saved to output/main/final_state.csv");
}
