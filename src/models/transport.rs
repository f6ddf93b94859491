//! Ready-made problem definitions used by the binary, the demos, the
//! integration tests and the benches.

use crate::discretization::generator::{interval_mesh, rectangle_mesh};
use crate::discretization::mesh::Mesh;
use crate::physics::bc::{BCRegistry, BCRule, BoundarySelector, Field, GeneralizedBC};
use crate::physics::coefficients::{
    BurgersAdr, LinearAdr, PressureFlow, SaturationTransport,
};
use glam::DVec2;
use nalgebra::DVector;
use std::f64::consts::PI;
use std::sync::Arc;

/// Sample a scalar function at the mesh nodes.
pub fn nodal_values(mesh: &Mesh, f: impl Fn(DVec2) -> f64) -> DVector<f64> {
    DVector::from_iterator(mesh.num_nodes(), mesh.nodes.iter().map(|n| f(n.position)))
}

/// 1-D linear advection-diffusion on [0, 1]: inflow value 1 on the
/// left, free outflow on the right.
pub fn advection_diffusion_1d(
    n_elements: usize,
    velocity: f64,
    diffusion: f64,
) -> (Mesh, LinearAdr, BCRegistry) {
    let mesh = interval_mesh(0.0, 1.0, n_elements);
    let coefficients = LinearAdr::new(DVec2::new(velocity, 0.0), diffusion, 0.0);

    let mut bcs = BCRegistry::default();
    bcs.add(BCRule {
        field: Field::from("u"),
        on: BoundarySelector::Label("left".into()),
        bc: GeneralizedBC::dirichlet(1.0),
    });
    bcs.add(BCRule {
        field: Field::from("u"),
        on: BoundarySelector::Label("right".into()),
        bc: GeneralizedBC::neumann(0.0),
    });

    (mesh, coefficients, bcs)
}

/// Exact solution of the manufactured problem below.
pub fn manufactured_exact(x: f64) -> f64 {
    (PI * x).sin()
}

/// 1-D advection-diffusion-reaction with the right-hand side chosen so
/// that `u = sin(pi x)` solves the steady problem exactly, with
/// homogeneous Dirichlet values on both ends.
pub fn manufactured_linear_1d(
    n_elements: usize,
    velocity: f64,
    diffusion: f64,
    reaction: f64,
) -> (Mesh, LinearAdr, BCRegistry) {
    let mesh = interval_mesh(0.0, 1.0, n_elements);
    let source = Arc::new(move |x: DVec2, _t: f64| {
        velocity * PI * (PI * x.x).cos()
            + diffusion * PI * PI * (PI * x.x).sin()
            + reaction * (PI * x.x).sin()
    });
    let coefficients =
        LinearAdr::new(DVec2::new(velocity, 0.0), diffusion, reaction).with_source(source);

    let mut bcs = BCRegistry::default();
    for label in ["left", "right"] {
        bcs.add(BCRule {
            field: Field::from("u"),
            on: BoundarySelector::Label(label.into()),
            bc: GeneralizedBC::dirichlet(0.0),
        });
    }

    (mesh, coefficients, bcs)
}

/// 2-D transport of a Gaussian pulse across the unit square.
pub fn gaussian_hill_2d(
    nx: usize,
    ny: usize,
    velocity: DVec2,
    diffusion: f64,
) -> (Mesh, LinearAdr, BCRegistry, DVector<f64>) {
    let mesh = rectangle_mesh(1.0, 1.0, nx, ny);
    let coefficients = LinearAdr::new(velocity, diffusion, 0.0);

    let mut bcs = BCRegistry::default();
    for label in ["left", "right", "bottom", "top"] {
        bcs.add(BCRule {
            field: Field::from("u"),
            on: BoundarySelector::Label(label.into()),
            bc: GeneralizedBC::dirichlet(0.0),
        });
    }

    let center = DVec2::new(0.3, 0.3);
    let sigma2 = 0.005;
    let initial = nodal_values(&mesh, |p| (-(p - center).length_squared() / (2.0 * sigma2)).exp());

    (mesh, coefficients, bcs, initial)
}

/// 1-D Burgers problem with a right-moving front: u = 1 upstream, 0
/// downstream.
pub fn burgers_1d(n_elements: usize, diffusion: f64) -> (Mesh, BurgersAdr, BCRegistry, DVector<f64>) {
    let mesh = interval_mesh(0.0, 1.0, n_elements);
    let coefficients = BurgersAdr::new(DVec2::new(1.0, 0.0), diffusion);

    let mut bcs = BCRegistry::default();
    bcs.add(BCRule {
        field: Field::from("u"),
        on: BoundarySelector::Label("left".into()),
        bc: GeneralizedBC::dirichlet(1.0),
    });
    bcs.add(BCRule {
        field: Field::from("u"),
        on: BoundarySelector::Label("right".into()),
        bc: GeneralizedBC::dirichlet(0.0),
    });

    let initial = nodal_values(&mesh, |p| if p.x < 0.2 { 1.0 } else { 0.0 });

    (mesh, coefficients, bcs, initial)
}

/// Everything needed to set up the two-stage split two-phase problem:
/// water injected on the left of a 1-D reservoir, pressure drop driving
/// the flow to the right.
pub struct TwophaseSplitProblem {
    pub mesh: Mesh,
    pub pressure: PressureFlow,
    pub saturation: SaturationTransport,
    pub pressure_bcs: BCRegistry,
    pub saturation_bcs: BCRegistry,
    pub initial_pressure: DVector<f64>,
    pub initial_saturation: DVector<f64>,
}

pub fn twophase_split_1d(n_elements: usize) -> TwophaseSplitProblem {
    let mesh = interval_mesh(0.0, 1.0, n_elements);
    let permeability = 1.0;
    let mobility_ratio = 2.0;
    let porosity = 0.2;

    let pressure = PressureFlow::new(permeability, mobility_ratio);
    let saturation = SaturationTransport::new(permeability, porosity);

    let mut pressure_bcs = BCRegistry::default();
    pressure_bcs.add(BCRule {
        field: Field::from("p"),
        on: BoundarySelector::Label("left".into()),
        bc: GeneralizedBC::dirichlet(1.0),
    });
    pressure_bcs.add(BCRule {
        field: Field::from("p"),
        on: BoundarySelector::Label("right".into()),
        bc: GeneralizedBC::dirichlet(0.0),
    });

    let mut saturation_bcs = BCRegistry::default();
    saturation_bcs.add(BCRule {
        field: Field::from("s"),
        on: BoundarySelector::Label("left".into()),
        bc: GeneralizedBC::dirichlet(1.0),
    });
    saturation_bcs.add(BCRule {
        field: Field::from("s"),
        on: BoundarySelector::Label("right".into()),
        bc: GeneralizedBC::neumann(0.0),
    });

    let initial_pressure = nodal_values(&mesh, |p| 1.0 - p.x);
    let initial_saturation = nodal_values(&mesh, |p| if p.x < 0.05 { 1.0 } else { 0.1 });

    TwophaseSplitProblem {
        mesh,
        pressure,
        saturation,
        pressure_bcs,
        saturation_bcs,
        initial_pressure,
        initial_saturation,
    }
}
