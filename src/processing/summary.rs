use crate::discretization::mesh::Mesh;
use crate::numerics::step_control::RunStats;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Collected run statistics written as a text report at the end of a
/// simulation.
pub struct RunSummary {
    // Mesh info
    pub num_nodes: usize,
    pub num_elements: usize,
    pub num_faces: usize,
    pub num_boundary_faces: usize,
    pub min_diameter: f64,
    pub max_diameter: f64,

    // Discretization info
    pub n_dofs: usize,
    pub n_components: usize,
    pub scheme: String,

    // Stepping info
    pub steps: Option<usize>,
    pub rejections: Option<u32>,
    pub newton_iterations: Option<u32>,
    pub final_time: Option<f64>,
}

impl RunSummary {
    pub fn from_problem(mesh: &Mesh, n_components: usize, scheme: impl Into<String>) -> Self {
        let mut min_diameter = f64::INFINITY;
        let mut max_diameter: f64 = 0.0;
        for e in 0..mesh.num_elements() {
            let d = mesh.element_diameter(e);
            min_diameter = min_diameter.min(d);
            max_diameter = max_diameter.max(d);
        }

        RunSummary {
            num_nodes: mesh.num_nodes(),
            num_elements: mesh.num_elements(),
            num_faces: mesh.faces.len(),
            num_boundary_faces: mesh.faces.iter().filter(|f| f.is_boundary()).count(),
            min_diameter,
            max_diameter,
            n_dofs: mesh.num_nodes() * n_components,
            n_components,
            scheme: scheme.into(),
            steps: None,
            rejections: None,
            newton_iterations: None,
            final_time: None,
        }
    }

    pub fn add_run_stats(&mut self, stats: &RunStats) {
        self.steps = Some(stats.steps);
        self.rejections = Some(stats.rejections);
        self.newton_iterations = Some(stats.newton_iterations);
        self.final_time = Some(stats.final_time);
    }

    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}", "=".repeat(50))?;
        writeln!(out, "{:^50}", "SIMULATION SUMMARY")?;
        writeln!(out, "{}", "=".repeat(50))?;
        writeln!(out, "Mesh:")?;
        writeln!(out, "  Nodes:             {}", self.num_nodes)?;
        writeln!(out, "  Elements:          {}", self.num_elements)?;
        writeln!(
            out,
            "  Faces:             {} ({} boundary)",
            self.num_faces, self.num_boundary_faces
        )?;
        writeln!(
            out,
            "  Element diameter:  {:.3e} .. {:.3e}",
            self.min_diameter, self.max_diameter
        )?;
        writeln!(out, "Discretization:")?;
        writeln!(out, "  Unknowns:          {}", self.n_dofs)?;
        writeln!(out, "  Components:        {}", self.n_components)?;
        writeln!(out, "  Time scheme:       {}", self.scheme)?;
        if let (Some(steps), Some(rejections), Some(iters), Some(t)) = (
            self.steps,
            self.rejections,
            self.newton_iterations,
            self.final_time,
        ) {
            writeln!(out, "Stepping:")?;
            writeln!(out, "  Accepted steps:    {}", steps)?;
            writeln!(out, "  Rejections:        {}", rejections)?;
            writeln!(out, "  Newton iterations: {}", iters)?;
            if steps > 0 {
                writeln!(
                    out,
                    "  Avg iters/step:    {:.2}",
                    iters as f64 / steps as f64
                )?;
            }
            writeln!(out, "  Final time:        {:.6e}", t)?;
        }
        writeln!(out, "{}", "=".repeat(50))?;
        Ok(())
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        self.write_to(&mut file)
    }

    pub fn print_to_console(&self) {
        let mut stdout = io::stdout();
        self.write_to(&mut stdout).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::interval_mesh;

    #[test]
    fn summary_reports_mesh_counts() {
        let mesh = interval_mesh(0.0, 1.0, 10);
        let summary = RunSummary::from_problem(&mesh, 1, "backward Euler");
        assert_eq!(summary.num_nodes, 11);
        assert_eq!(summary.n_dofs, 11);
        assert_eq!(summary.num_boundary_faces, 2);

        let mut buf = Vec::new();
        summary.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("SIMULATION SUMMARY"));
        assert!(text.contains("backward Euler"));
    }
}
