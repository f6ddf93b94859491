//! Subgrid-error (ASGS) and shock-capturing stabilization.
//!
//! Both terms act per quadrature point on the strong residual of the
//! advective-reactive part (second derivatives vanish for P1 elements).
//! The subgrid tau uses the standard inverse-sum formula; the
//! shock-capturing viscosity is residual-scaled and lagged in the
//! Jacobian.

#[derive(Clone, Copy, Debug)]
pub struct StabilizationConfig {
    pub subgrid: bool,
    pub shock_capturing: bool,
    /// Diffusive tau constant (multiplies a / h^2).
    pub c1: f64,
    /// Advective tau constant (multiplies |v| / h).
    pub c2: f64,
    /// Shock-capturing viscosity constant.
    pub c_shock: f64,
    /// Interior-face edge viscosity scale; 0 disables the interface term.
    pub interior_penalty: f64,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        StabilizationConfig {
            subgrid: true,
            shock_capturing: false,
            c1: 4.0,
            c2: 2.0,
            c_shock: 0.25,
            interior_penalty: 0.0,
        }
    }
}

impl StabilizationConfig {
    pub fn none() -> Self {
        StabilizationConfig {
            subgrid: false,
            shock_capturing: false,
            interior_penalty: 0.0,
            ..Default::default()
        }
    }
}

/// Intrinsic-time scale `tau = 1 / (c1 a/h^2 + c2 |v|/h + m_rate + |r_rate|)`.
/// Returns 0 when every mechanism is absent (the term then drops out).
pub fn subgrid_tau(
    cfg: &StabilizationConfig,
    diffusion: f64,
    velocity_mag: f64,
    mass_rate: f64,
    reaction_rate: f64,
    h: f64,
) -> f64 {
    let denom = cfg.c1 * diffusion / (h * h)
        + cfg.c2 * velocity_mag / h
        + mass_rate.abs()
        + reaction_rate.abs();
    if denom <= f64::EPSILON {
        0.0
    } else {
        1.0 / denom
    }
}

/// Residual-scaled isotropic viscosity `nu = c h |R| / (|grad u| + eps)`.
pub fn shock_viscosity(
    cfg: &StabilizationConfig,
    strong_residual: f64,
    gradient_mag: f64,
    h: f64,
) -> f64 {
    cfg.c_shock * h * strong_residual.abs() / (gradient_mag + 1e-14)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tau_scales_inversely_with_mechanisms() {
        let cfg = StabilizationConfig::default();
        let weak = subgrid_tau(&cfg, 1e-3, 1.0, 0.0, 0.0, 0.1);
        let strong = subgrid_tau(&cfg, 1e-3, 10.0, 0.0, 0.0, 0.1);
        assert!(strong < weak);
        assert_eq!(subgrid_tau(&cfg, 0.0, 0.0, 0.0, 0.0, 0.1), 0.0);
    }

    #[test]
    fn shock_viscosity_grows_with_residual() {
        let cfg = StabilizationConfig {
            shock_capturing: true,
            ..Default::default()
        };
        let lo = shock_viscosity(&cfg, 0.1, 1.0, 0.1);
        let hi = shock_viscosity(&cfg, 1.0, 1.0, 0.1);
        assert!(hi > lo);
    }
}
