//! Numerical fluxes on element interfaces.
//!
//! Boundary faces get an upwind advective flux and a penalty-weak
//! diffusive flux built from the generalized BC coefficients; interior
//! faces (2-D) get an edge-based shock-capturing viscosity acting on the
//! two shared face nodes.

use super::bc::GeneralizedBC;
use super::CoefficientTerms;
use glam::DVec2;

const GRAD_FLOOR: f64 = 1e-14;

#[derive(Clone, Copy, Debug)]
pub struct BoundaryFluxConfig {
    /// Penalty constant for weak Dirichlet enforcement, scaled by a/h.
    pub penalty: f64,
}

impl Default for BoundaryFluxConfig {
    fn default() -> Self {
        BoundaryFluxConfig { penalty: 10.0 }
    }
}

/// Outcome of the per-point boundary flux for one component: the total
/// outward normal flux replacing `f . n - a grad u . n` in the weak
/// form. Derivatives with respect to the point values land in the
/// `dvalue` out-parameter; when the `-a grad u . n` consistency term is
/// active, `consistency_diffusion` carries the diffusion coefficient so
/// the assembler can add the gradient-coupled Jacobian entries (they
/// reach all element nodes through the basis gradients).
pub struct ComponentFlux {
    pub value: f64,
    pub consistency_diffusion: Option<f64>,
}

/// Evaluate the numerical flux for component `comp` at one boundary
/// quadrature point. `ghost_terms` are the coefficients evaluated with
/// the Dirichlet value substituted for `comp`; the assembler supplies
/// them whenever the rule has `alpha != 0`.
#[allow(clippy::too_many_arguments)]
pub fn boundary_component_flux(
    cfg: &BoundaryFluxConfig,
    rule: &GeneralizedBC,
    t: f64,
    x: DVec2,
    n: DVec2,
    h: f64,
    comp: usize,
    u: &[f64],
    grad_u: &[DVec2],
    terms: &CoefficientTerms,
    ghost_terms: Option<&CoefficientTerms>,
    dvalue: &mut [f64],
) -> ComponentFlux {
    let ncomp = terms.ncomp;
    dvalue[..ncomp].fill(0.0);

    let alpha = (rule.alpha)(t, x, n);
    let beta = (rule.beta)(t, x, n);
    let gamma = (rule.gamma)(t, x, n);

    let mut value = 0.0;
    let mut consistency_diffusion = None;

    // Advective part, upwinded on the linearized normal speed.
    let v_n = terms.dadvection[comp * ncomp + comp].dot(n);
    let inflow = v_n < 0.0;
    if inflow && alpha != 0.0 {
        // Inflow with a Dirichlet value: flux carries the boundary state.
        let ghost = ghost_terms.expect("ghost coefficients required for Dirichlet inflow");
        value += ghost.advection[comp].dot(n);
        for k in 0..ncomp {
            if k != comp {
                dvalue[k] += ghost.dadvection[comp * ncomp + k].dot(n);
            }
        }
    } else {
        value += terms.advection[comp].dot(n);
        for k in 0..ncomp {
            dvalue[k] += terms.dadvection[comp * ncomp + k].dot(n);
        }
    }

    // Diffusive part.
    if beta == 0.0 {
        // Dirichlet: interior-penalty enforcement plus consistency term.
        let g = gamma / alpha;
        let a = terms.diffusion[comp];
        let grad_n = grad_u[comp].dot(n);
        let mismatch = u[comp] - g;
        value += -a * grad_n + cfg.penalty * a / h * mismatch;
        dvalue[comp] += cfg.penalty * a / h;
        for k in 0..ncomp {
            dvalue[k] +=
                terms.ddiffusion[comp * ncomp + k] * (-grad_n + cfg.penalty / h * mismatch);
        }
        consistency_diffusion = Some(a);
    } else {
        // Robin/Neumann: the normal diffusive flux is prescribed as
        // a grad u . n = (gamma - alpha u) / beta.
        value += -(gamma - alpha * u[comp]) / beta;
        dvalue[comp] += alpha / beta;
    }

    ComponentFlux {
        value,
        consistency_diffusion,
    }
}

/// Lagged edge viscosity for an interior face, seeded by the jump in the
/// element gradients across the face and scaled by the advective normal
/// speed. Zero jump (smooth solution) gives zero viscosity.
pub fn interior_edge_viscosity(
    penalty: f64,
    gradient_jump: f64,
    gradient_magnitude: f64,
    advective_normal_speed: f64,
    face_area: f64,
) -> f64 {
    if penalty == 0.0 {
        return 0.0;
    }
    let indicator = gradient_jump / (gradient_magnitude + GRAD_FLOOR);
    0.5 * penalty * indicator * advective_normal_speed.abs() * face_area
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::coefficients::LinearAdr;
    use crate::physics::{CoefficientEvaluator, PointState};

    fn terms_for(coeff: &LinearAdr, u: f64, grad: DVec2) -> CoefficientTerms {
        let mut out = CoefficientTerms::new(1);
        let values = [u];
        let grads = [grad];
        coeff.evaluate(
            DVec2::ZERO,
            0.0,
            &PointState {
                value: &values,
                gradient: &grads,
                coupled: &[],
                coupled_gradient: &[],
            },
            &mut out,
        );
        out
    }

    #[test]
    fn outflow_uses_interior_state() {
        let coeff = LinearAdr::new(DVec2::new(2.0, 0.0), 0.0, 0.0);
        let u = [0.5];
        let grads = [DVec2::ZERO];
        let terms = terms_for(&coeff, u[0], grads[0]);
        let rule = GeneralizedBC::neumann(0.0);
        let mut dv = [0.0];
        let flux = boundary_component_flux(
            &BoundaryFluxConfig::default(),
            &rule,
            0.0,
            DVec2::new(1.0, 0.0),
            DVec2::new(1.0, 0.0),
            1.0,
            0,
            &u,
            &grads,
            &terms,
            None,
            &mut dv,
        );
        // f . n = v u = 1.0 outward
        assert!((flux.value - 1.0).abs() < 1e-14);
        assert!((dv[0] - 2.0).abs() < 1e-14);
    }

    #[test]
    fn dirichlet_inflow_carries_boundary_value() {
        let coeff = LinearAdr::new(DVec2::new(2.0, 0.0), 0.0, 0.0);
        let u = [0.5];
        let grads = [DVec2::ZERO];
        let terms = terms_for(&coeff, u[0], grads[0]);
        let ghost = terms_for(&coeff, 3.0, grads[0]);
        let rule = GeneralizedBC::dirichlet(3.0);
        let mut dv = [0.0];
        // Left boundary: normal -x, advective speed v.n = -2 < 0 (inflow).
        let flux = boundary_component_flux(
            &BoundaryFluxConfig { penalty: 0.0 },
            &rule,
            0.0,
            DVec2::ZERO,
            DVec2::new(-1.0, 0.0),
            1.0,
            0,
            &u,
            &grads,
            &terms,
            Some(&ghost),
            &mut dv,
        );
        // Advective part: f(g) . n = 2 * 3 * (-1) = -6; penalty disabled,
        // diffusion is zero so only the advective part remains.
        assert!((flux.value + 6.0).abs() < 1e-14);
    }

    #[test]
    fn edge_viscosity_vanishes_for_smooth_gradients() {
        let nu = interior_edge_viscosity(1.0, 0.0, 2.0, 1.5, 0.1);
        assert_eq!(nu, 0.0);
        let nu = interior_edge_viscosity(1.0, 1.0, 1.0, 2.0, 0.5);
        assert!(nu > 0.0);
    }
}
