//! Concrete physics: the coefficient evaluators shipped with the crate.

use super::{CoefficientEvaluator, CoefficientTerms, PointState};
use glam::DVec2;
use num_dual::{first_derivative, Dual64, DualNum};
use std::sync::Arc;

/// Space/time-dependent source term.
pub type SourceFn = Arc<dyn Fn(DVec2, f64) -> f64 + Send + Sync>;

fn zero_source() -> SourceFn {
    Arc::new(|_, _| 0.0)
}

/// Constant-coefficient linear advection-diffusion-reaction:
/// `m = u`, `f = v u`, `a = const`, `r = sigma u - q(x, t)`.
pub struct LinearAdr {
    pub velocity: DVec2,
    pub diffusion: f64,
    pub reaction: f64,
    pub source: SourceFn,
    names: [&'static str; 1],
}

impl LinearAdr {
    pub fn new(velocity: DVec2, diffusion: f64, reaction: f64) -> Self {
        LinearAdr {
            velocity,
            diffusion,
            reaction,
            source: zero_source(),
            names: ["u"],
        }
    }

    pub fn with_source(mut self, source: SourceFn) -> Self {
        self.source = source;
        self
    }
}

impl CoefficientEvaluator for LinearAdr {
    fn n_components(&self) -> usize {
        1
    }

    fn component_names(&self) -> &[&'static str] {
        &self.names
    }

    fn evaluate(&self, x: DVec2, t: f64, state: &PointState, out: &mut CoefficientTerms) {
        let u = state.value[0];
        out.clear();
        out.mass[0] = u;
        out.dmass[0] = 1.0;
        out.advection[0] = self.velocity * u;
        out.dadvection[0] = self.velocity;
        out.diffusion[0] = self.diffusion;
        out.reaction[0] = self.reaction * u - (self.source)(x, t);
        out.dreaction[0] = self.reaction;
    }
}

/// Burgers-type nonlinear advection with linear diffusion:
/// `f = v u^2 / 2`. The flux derivative comes from a dual-number sweep
/// rather than hand-written calculus.
pub struct BurgersAdr {
    pub velocity: DVec2,
    pub diffusion: f64,
    pub source: SourceFn,
    names: [&'static str; 1],
}

impl BurgersAdr {
    pub fn new(velocity: DVec2, diffusion: f64) -> Self {
        BurgersAdr {
            velocity,
            diffusion,
            source: zero_source(),
            names: ["u"],
        }
    }

    pub fn with_source(mut self, source: SourceFn) -> Self {
        self.source = source;
        self
    }
}

impl CoefficientEvaluator for BurgersAdr {
    fn n_components(&self) -> usize {
        1
    }

    fn component_names(&self) -> &[&'static str] {
        &self.names
    }

    fn evaluate(&self, x: DVec2, t: f64, state: &PointState, out: &mut CoefficientTerms) {
        let u = state.value[0];
        out.clear();
        out.mass[0] = u;
        out.dmass[0] = 1.0;
        let (g, dg) = first_derivative(|v| v * v * Dual64::from_re(0.5), u);
        out.advection[0] = self.velocity * g;
        out.dadvection[0] = self.velocity * dg;
        out.diffusion[0] = self.diffusion;
        out.reaction[0] = -(self.source)(x, t);
    }
}

/// Incompressible two-phase flow in fractional-flow form with a
/// prescribed total velocity: a pressure equation with
/// saturation-dependent total mobility and a saturation equation
/// advected by the fractional-flow function.
///
/// Components: `p` (elliptic pressure) and `s` (wetting saturation).
/// Total mobility `lambda_t(s) = s^2 + (1 - s)^2 / mobility_ratio`,
/// fractional flow `F_w(s) = s^2 / lambda_t(s)`.
pub struct TwophaseFractionalFlow {
    pub permeability: f64,
    pub mobility_ratio: f64,
    pub porosity: f64,
    pub total_velocity: DVec2,
    pub capillary_diffusion: f64,
    pub pressure_source: SourceFn,
    pub saturation_source: SourceFn,
    names: [&'static str; 2],
}

impl TwophaseFractionalFlow {
    pub fn new(permeability: f64, mobility_ratio: f64, porosity: f64, total_velocity: DVec2) -> Self {
        TwophaseFractionalFlow {
            permeability,
            mobility_ratio,
            porosity,
            total_velocity,
            capillary_diffusion: 1e-3,
            pressure_source: zero_source(),
            saturation_source: zero_source(),
            names: ["p", "s"],
        }
    }

    pub(crate) fn total_mobility<T: DualNum<f64> + Copy>(mobility_ratio: f64, s: T) -> T {
        let one_minus_s = -s + T::from(1.0);
        s * s + one_minus_s * one_minus_s / T::from(mobility_ratio)
    }
}

impl CoefficientEvaluator for TwophaseFractionalFlow {
    fn n_components(&self) -> usize {
        2
    }

    fn component_names(&self) -> &[&'static str] {
        &self.names
    }

    fn evaluate(&self, x: DVec2, t: f64, state: &PointState, out: &mut CoefficientTerms) {
        let s = state.value[1];
        let m_ratio = self.mobility_ratio;
        out.clear();

        // Pressure: -div(k lambda_t(s) grad p) = q_p. Couples to the
        // saturation through the mobility.
        let (lambda_t, dlambda_ds) = first_derivative(|v| Self::total_mobility(m_ratio, v), s);
        out.diffusion[0] = self.permeability * lambda_t;
        out.ddiffusion[1] = self.permeability * dlambda_ds; // d a_p / d s
        out.reaction[0] = -(self.pressure_source)(x, t);

        // Saturation: phi ds/dt + div(v_t F_w(s)) = q_s.
        out.mass[1] = self.porosity * s;
        out.dmass[3] = self.porosity;
        let (fw, dfw_ds) =
            first_derivative(|v| v * v / Self::total_mobility(m_ratio, v), s);
        out.advection[1] = self.total_velocity * fw;
        out.dadvection[3] = self.total_velocity * dfw_ds; // d f_s / d s
        out.diffusion[1] = self.capillary_diffusion;
        out.reaction[1] = -(self.saturation_source)(x, t);
    }
}

/// Pressure half of a split two-phase system: the saturation field of
/// the other stage enters through the coupling slot and is frozen over
/// one stage solve, which is exactly the split-operator linearization.
pub struct PressureFlow {
    pub permeability: f64,
    pub mobility_ratio: f64,
    pub source: SourceFn,
    names: [&'static str; 1],
}

impl PressureFlow {
    pub fn new(permeability: f64, mobility_ratio: f64) -> Self {
        PressureFlow {
            permeability,
            mobility_ratio,
            source: zero_source(),
            names: ["p"],
        }
    }

    pub fn with_source(mut self, source: SourceFn) -> Self {
        self.source = source;
        self
    }
}

impl CoefficientEvaluator for PressureFlow {
    fn n_components(&self) -> usize {
        1
    }

    fn component_names(&self) -> &[&'static str] {
        &self.names
    }

    fn evaluate(&self, x: DVec2, t: f64, state: &PointState, out: &mut CoefficientTerms) {
        let s = state.coupled.first().copied().unwrap_or(1.0);
        out.clear();
        out.diffusion[0] =
            self.permeability * TwophaseFractionalFlow::total_mobility(self.mobility_ratio, s);
        out.reaction[0] = -(self.source)(x, t);
    }
}

/// Saturation half of a split two-phase system: advected by the Darcy
/// velocity reconstructed from the coupled pressure gradient.
pub struct SaturationTransport {
    pub permeability: f64,
    pub porosity: f64,
    pub capillary_diffusion: f64,
    pub source: SourceFn,
    names: [&'static str; 1],
}

impl SaturationTransport {
    pub fn new(permeability: f64, porosity: f64) -> Self {
        SaturationTransport {
            permeability,
            porosity,
            capillary_diffusion: 1e-3,
            source: zero_source(),
            names: ["s"],
        }
    }
}

impl CoefficientEvaluator for SaturationTransport {
    fn n_components(&self) -> usize {
        1
    }

    fn component_names(&self) -> &[&'static str] {
        &self.names
    }

    fn evaluate(&self, x: DVec2, t: f64, state: &PointState, out: &mut CoefficientTerms) {
        let s = state.value[0];
        let grad_p = state
            .coupled_gradient
            .first()
            .copied()
            .unwrap_or(DVec2::ZERO);
        let k = self.permeability;
        out.clear();

        out.mass[0] = self.porosity * s;
        out.dmass[0] = self.porosity;

        // Wetting-phase Darcy flux -k lambda_w(s) grad p with the
        // quadratic relative-permeability law lambda_w = s^2.
        let (mob_w, dmob_ds) = first_derivative(|v| v * v * Dual64::from_re(k), s);
        out.advection[0] = -grad_p * mob_w;
        out.dadvection[0] = -grad_p * dmob_ds;
        out.diffusion[0] = self.capillary_diffusion;
        out.reaction[0] = -(self.source)(x, t);
    }
}
