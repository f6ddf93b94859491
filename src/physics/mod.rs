pub mod bc;
pub mod coefficients;
pub mod flux;
pub mod stabilization;

use glam::DVec2;

/// Solution data at a single quadrature point: one value and one spatial
/// gradient per component, plus any coupled fields (values and
/// gradients) interpolated from another physics in a split-operator
/// system.
pub struct PointState<'a> {
    pub value: &'a [f64],
    pub gradient: &'a [DVec2],
    pub coupled: &'a [f64],
    pub coupled_gradient: &'a [DVec2],
}

/// Evaluated PDE terms at one quadrature point, written by a
/// [`CoefficientEvaluator`].
///
/// Per component `c`: storage/mass `m_c`, advective flux vector `f_c`,
/// scalar (isotropic) diffusion `a_c`, and reaction `r_c`, together with
/// their partial derivatives with respect to every component `k`, stored
/// row-major at `[c * ncomp + k]`. The weak-form residual the assembler
/// accumulates from these terms is
///
/// ```text
/// R_i = int  d/dt m(u) phi_i - f(u) . grad phi_i
///          + a(u) grad u . grad phi_i + r(u) phi_i  dx  + flux terms
/// ```
pub struct CoefficientTerms {
    pub ncomp: usize,
    pub mass: Vec<f64>,
    pub dmass: Vec<f64>,
    pub advection: Vec<DVec2>,
    pub dadvection: Vec<DVec2>,
    pub diffusion: Vec<f64>,
    pub ddiffusion: Vec<f64>,
    pub reaction: Vec<f64>,
    pub dreaction: Vec<f64>,
}

impl CoefficientTerms {
    pub fn new(ncomp: usize) -> Self {
        CoefficientTerms {
            ncomp,
            mass: vec![0.0; ncomp],
            dmass: vec![0.0; ncomp * ncomp],
            advection: vec![DVec2::ZERO; ncomp],
            dadvection: vec![DVec2::ZERO; ncomp * ncomp],
            diffusion: vec![0.0; ncomp],
            ddiffusion: vec![0.0; ncomp * ncomp],
            reaction: vec![0.0; ncomp],
            dreaction: vec![0.0; ncomp * ncomp],
        }
    }

    pub fn clear(&mut self) {
        self.mass.fill(0.0);
        self.dmass.fill(0.0);
        self.advection.fill(DVec2::ZERO);
        self.dadvection.fill(DVec2::ZERO);
        self.diffusion.fill(0.0);
        self.ddiffusion.fill(0.0);
        self.reaction.fill(0.0);
        self.dreaction.fill(0.0);
    }

    pub fn is_finite(&self) -> bool {
        self.mass.iter().all(|v| v.is_finite())
            && self.dmass.iter().all(|v| v.is_finite())
            && self.advection.iter().all(|v| v.is_finite())
            && self.dadvection.iter().all(|v| v.is_finite())
            && self.diffusion.iter().all(|v| v.is_finite())
            && self.ddiffusion.iter().all(|v| v.is_finite())
            && self.reaction.iter().all(|v| v.is_finite())
            && self.dreaction.iter().all(|v| v.is_finite())
    }
}

/// Pluggable PDE physics.
///
/// `evaluate` must be a pure function of its arguments: the assembler
/// calls it arbitrarily many times per iteration, in element order, and
/// relies on identical inputs producing identical outputs.
pub trait CoefficientEvaluator {
    fn n_components(&self) -> usize;

    /// Names used to match boundary-condition rules to components.
    fn component_names(&self) -> &[&'static str];

    fn evaluate(&self, x: DVec2, t: f64, state: &PointState, out: &mut CoefficientTerms);
}
