pub mod assembler;
pub mod error_estimator;
pub mod linear;
pub mod newton;
pub mod sparse;
pub mod split_operator;
pub mod step_control;
pub mod time_integration;
pub mod timing;

pub enum Tolerance {
    Absolute(f64),
    Relative(f64),
    Combined(f64, f64),
}

pub enum ConvergenceMetric {
    L2Norm,
    MaxNorm,
}

pub struct Convergence {
    pub tolerance: Tolerance,
    pub metric: ConvergenceMetric,
}

impl Convergence {
    pub fn norm(&self, vector: &nalgebra::DVector<f64>) -> f64 {
        match self.metric {
            ConvergenceMetric::L2Norm => vector.norm(),
            ConvergenceMetric::MaxNorm => vector.amax(),
        }
    }

    pub fn check_tolerance(&self, norm: f64, initial_norm: f64) -> bool {
        match self.tolerance {
            Tolerance::Absolute(tol) => norm < tol,
            Tolerance::Relative(tol) => norm / initial_norm < tol,
            Tolerance::Combined(abs_tol, rel_tol) => {
                norm < abs_tol || (norm / initial_norm) < rel_tol
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    #[test]
    fn combined_tolerance_accepts_either_criterion() {
        let conv = Convergence {
            tolerance: Tolerance::Combined(1e-8, 1e-4),
            metric: ConvergenceMetric::L2Norm,
        };
        assert!(conv.check_tolerance(1e-9, 1.0));
        assert!(conv.check_tolerance(1e-3, 1e2));
        assert!(!conv.check_tolerance(1e-3, 1.0));
    }

    #[test]
    fn max_norm_metric() {
        let conv = Convergence {
            tolerance: Tolerance::Absolute(1.0),
            metric: ConvergenceMetric::MaxNorm,
        };
        let v = DVector::from_vec(vec![0.1, -3.0, 0.2]);
        assert!((conv.norm(&v) - 3.0).abs() < 1e-15);
    }
}
