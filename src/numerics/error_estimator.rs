//! Temporal error estimation for step-size adaptation.

use nalgebra::DVector;

/// Optional collaborator of the step controller: given the accepted
/// solution, the previous level and the step size, return a scalar
/// estimate the dt-adaptation policy can compare against its tolerance.
pub trait ErrorEstimator {
    fn estimate(&self, accepted: &DVector<f64>, previous: &DVector<f64>, dt: f64) -> f64;
}

/// Scaled temporal-difference estimate: the RMS change per unit time.
pub struct TemporalDifference {
    pub scale: f64,
}

impl Default for TemporalDifference {
    fn default() -> Self {
        TemporalDifference { scale: 1.0 }
    }
}

impl ErrorEstimator for TemporalDifference {
    fn estimate(&self, accepted: &DVector<f64>, previous: &DVector<f64>, dt: f64) -> f64 {
        let n = accepted.len().max(1) as f64;
        (accepted - previous).norm() / (n.sqrt() * dt * self.scale)
    }
}
