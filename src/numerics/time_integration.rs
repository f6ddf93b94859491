//! Implicit time-stepping weights and solution history.
//!
//! The integrator owns the time-level history (fixed depth set by the
//! scheme order) and turns it into the algebraic weighting the assembler
//! adds into the residual: a coefficient on the current mass term, a
//! pre-assembled history-side mass combination, and the theta blending
//! of the spatial operator. `commit` shifts the history forward on step
//! acceptance and is never called on rejection.

use crate::numerics::assembler::{Assembler, AssemblyError};
use nalgebra::DVector;
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimeScheme {
    BackwardEuler,
    /// Theta in (0, 1]: 1 is backward Euler, 0.5 is Crank-Nicolson.
    Theta(f64),
    Bdf2,
}

impl TimeScheme {
    fn history_depth(&self) -> usize {
        match self {
            TimeScheme::BackwardEuler | TimeScheme::Theta(_) => 1,
            TimeScheme::Bdf2 => 2,
        }
    }
}

/// The per-step weighting consumed by the assembler.
pub struct TimeWeights {
    /// Coefficient on the current mass vector `int m(u) phi`.
    pub mass_coeff: f64,
    /// Pre-assembled history-side mass combination, already scaled.
    pub mass_history: Option<DVector<f64>>,
    /// Implicit blending factor on the spatial operator.
    pub theta: f64,
    /// Pre-assembled `(1 - theta) S(u_old)` for theta schemes.
    pub spatial_history: Option<DVector<f64>>,
    pub dt: Option<f64>,
}

impl TimeWeights {
    /// No time derivative: a steady solve.
    pub fn steady() -> Self {
        TimeWeights {
            mass_coeff: 0.0,
            mass_history: None,
            theta: 1.0,
            spatial_history: None,
            dt: None,
        }
    }
}

pub struct TimeIntegrator {
    pub scheme: TimeScheme,
    /// Accepted solution levels, newest first.
    history: VecDeque<DVector<f64>>,
    previous_dt: Option<f64>,
}

impl TimeIntegrator {
    pub fn new(scheme: TimeScheme, initial: DVector<f64>) -> Self {
        if let TimeScheme::Theta(theta) = scheme {
            assert!(
                theta > 0.0 && theta <= 1.0,
                "theta must lie in (0, 1] for an implicit solve"
            );
        }
        let mut history = VecDeque::new();
        history.push_front(initial);
        TimeIntegrator {
            scheme,
            history,
            previous_dt: None,
        }
    }

    /// Latest accepted solution level.
    pub fn latest(&self) -> &DVector<f64> {
        &self.history[0]
    }

    /// Initial iterate for the new time level: linear extrapolation from
    /// the last two levels where available, otherwise the latest level.
    pub fn predict(&self, dt: f64) -> DVector<f64> {
        match (self.history.get(1), self.previous_dt) {
            (Some(older), Some(prev_dt)) if prev_dt > 0.0 => {
                let ratio = dt / prev_dt;
                let latest = &self.history[0];
                latest + (latest - older) * ratio
            }
            _ => self.history[0].clone(),
        }
    }

    /// Assemble the history-side caches for a step of size `dt` starting
    /// at time `t`, and return the weights for the implicit solve.
    pub fn start_step(
        &self,
        assembler: &mut Assembler,
        t: f64,
        dt: f64,
    ) -> Result<TimeWeights, AssemblyError> {
        let n = self.history[0].len();
        let mut scratch = DVector::zeros(n);

        match self.scheme {
            TimeScheme::BackwardEuler | TimeScheme::Theta(_) => {
                let theta = match self.scheme {
                    TimeScheme::Theta(theta) => theta,
                    _ => 1.0,
                };
                assembler.assemble_mass(&self.history[0], t, &mut scratch)?;
                let mass_history = -&scratch / dt;

                let spatial_history = if theta < 1.0 {
                    assembler.assemble_spatial(&self.history[0], t, &mut scratch)?;
                    Some(&scratch * (1.0 - theta))
                } else {
                    None
                };

                Ok(TimeWeights {
                    mass_coeff: 1.0 / dt,
                    mass_history: Some(mass_history),
                    theta,
                    spatial_history,
                    dt: Some(dt),
                })
            }
            TimeScheme::Bdf2 => {
                let (Some(older), Some(prev_dt)) = (self.history.get(1), self.previous_dt) else {
                    // First step: no second level yet, fall back to
                    // backward Euler.
                    assembler.assemble_mass(&self.history[0], t, &mut scratch)?;
                    return Ok(TimeWeights {
                        mass_coeff: 1.0 / dt,
                        mass_history: Some(-&scratch / dt),
                        theta: 1.0,
                        spatial_history: None,
                        dt: Some(dt),
                    });
                };

                // Variable-step BDF2 coefficients from the step ratio.
                let rho = dt / prev_dt;
                let alpha0 = (1.0 + 2.0 * rho) / ((1.0 + rho) * dt);
                let alpha1 = -(1.0 + rho) / dt;
                let alpha2 = rho * rho / ((1.0 + rho) * dt);

                assembler.assemble_mass(&self.history[0], t, &mut scratch)?;
                let mut mass_history = &scratch * alpha1;
                assembler.assemble_mass(older, t, &mut scratch)?;
                mass_history += &scratch * alpha2;

                Ok(TimeWeights {
                    mass_coeff: alpha0,
                    mass_history: Some(mass_history),
                    theta: 1.0,
                    spatial_history: None,
                    dt: Some(dt),
                })
            }
        }
    }

    /// Shift the history forward on step acceptance; the oldest level
    /// beyond the scheme's depth is discarded.
    pub fn commit(&mut self, accepted: &DVector<f64>, dt: f64) {
        self.history.push_front(accepted.clone());
        self.history.truncate(self.scheme.history_depth() + 1);
        self.previous_dt = Some(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictor_extrapolates_linearly() {
        let mut integrator =
            TimeIntegrator::new(TimeScheme::Bdf2, DVector::from_vec(vec![0.0, 0.0]));
        integrator.commit(&DVector::from_vec(vec![1.0, 2.0]), 0.5);
        // history: [1,2] (newest), [0,0]; prev_dt = 0.5
        let guess = integrator.predict(0.5);
        assert!((guess[0] - 2.0).abs() < 1e-14);
        assert!((guess[1] - 4.0).abs() < 1e-14);
    }

    #[test]
    fn predictor_copies_without_history() {
        let integrator =
            TimeIntegrator::new(TimeScheme::BackwardEuler, DVector::from_vec(vec![3.0]));
        let guess = integrator.predict(0.1);
        assert!((guess[0] - 3.0).abs() < 1e-15);
    }

    #[test]
    fn history_depth_is_bounded() {
        let mut integrator = TimeIntegrator::new(TimeScheme::Bdf2, DVector::from_vec(vec![0.0]));
        for k in 1..10 {
            integrator.commit(&DVector::from_vec(vec![k as f64]), 0.1);
        }
        assert_eq!(integrator.history.len(), 3);
        assert!((integrator.latest()[0] - 9.0).abs() < 1e-15);
    }

    #[test]
    fn bdf2_coefficients_sum_to_zero_for_constant_mass() {
        // With equal steps the coefficients are 3/(2 dt), -2/dt, 1/(2 dt).
        let dt = 0.25;
        let rho: f64 = 1.0;
        let alpha0 = (1.0 + 2.0 * rho) / ((1.0 + rho) * dt);
        let alpha1 = -(1.0 + rho) / dt;
        let alpha2 = rho * rho / ((1.0 + rho) * dt);
        assert!((alpha0 - 1.5 / dt).abs() < 1e-14);
        assert!((alpha0 + alpha1 + alpha2).abs() < 1e-12);
    }
}
