//! Reference-element integration rules.
//!
//! Points live on the reference segment [0,1] (second coordinate unused)
//! or the reference triangle {(r,s): r,s >= 0, r+s <= 1}. Weights sum to
//! the reference measure (1 for the segment, 1/2 for the triangle).

pub struct QuadratureRule {
    pub points: Vec<[f64; 2]>,
    pub weights: Vec<f64>,
}

impl QuadratureRule {
    /// Gauss-Legendre rule on [0,1], exact for polynomials of degree
    /// 2n-1 where n is the point count.
    pub fn segment(order: usize) -> Self {
        // (point, weight) on [-1,1], mapped below.
        let raw: &[(f64, f64)] = match order {
            0 | 1 => &[(0.0, 2.0)],
            2 | 3 => {
                const P: f64 = 0.577_350_269_189_625_8; // 1/sqrt(3)
                &[(-P, 1.0), (P, 1.0)]
            }
            _ => {
                const P: f64 = 0.774_596_669_241_483_4; // sqrt(3/5)
                &[(-P, 5.0 / 9.0), (0.0, 8.0 / 9.0), (P, 5.0 / 9.0)]
            }
        };
        QuadratureRule {
            points: raw.iter().map(|&(x, _)| [0.5 * (x + 1.0), 0.0]).collect(),
            weights: raw.iter().map(|&(_, w)| 0.5 * w).collect(),
        }
    }

    /// Symmetric rule on the reference triangle.
    pub fn triangle(order: usize) -> Self {
        match order {
            0 | 1 => QuadratureRule {
                points: vec![[1.0 / 3.0, 1.0 / 3.0]],
                weights: vec![0.5],
            },
            2 => QuadratureRule {
                points: vec![
                    [1.0 / 6.0, 1.0 / 6.0],
                    [2.0 / 3.0, 1.0 / 6.0],
                    [1.0 / 6.0, 2.0 / 3.0],
                ],
                weights: vec![1.0 / 6.0; 3],
            },
            _ => QuadratureRule {
                points: vec![
                    [1.0 / 3.0, 1.0 / 3.0],
                    [0.6, 0.2],
                    [0.2, 0.6],
                    [0.2, 0.2],
                ],
                weights: vec![-27.0 / 96.0, 25.0 / 96.0, 25.0 / 96.0, 25.0 / 96.0],
            },
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrate_segment(rule: &QuadratureRule, f: impl Fn(f64) -> f64) -> f64 {
        rule.points
            .iter()
            .zip(&rule.weights)
            .map(|(p, w)| w * f(p[0]))
            .sum()
    }

    fn integrate_triangle(rule: &QuadratureRule, f: impl Fn(f64, f64) -> f64) -> f64 {
        rule.points
            .iter()
            .zip(&rule.weights)
            .map(|(p, w)| w * f(p[0], p[1]))
            .sum()
    }

    #[test]
    fn segment_weights_sum_to_measure() {
        for order in [1, 2, 3, 4, 5] {
            let rule = QuadratureRule::segment(order);
            let total: f64 = rule.weights.iter().sum();
            assert!((total - 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn segment_rules_are_exact_for_polynomials() {
        // 3-point Gauss integrates x^5 on [0,1] exactly (1/6).
        let rule = QuadratureRule::segment(5);
        assert!((integrate_segment(&rule, |x| x.powi(5)) - 1.0 / 6.0).abs() < 1e-14);
        // 2-point handles cubics: integral of x^3 is 1/4.
        let rule = QuadratureRule::segment(3);
        assert!((integrate_segment(&rule, |x| x.powi(3)) - 0.25).abs() < 1e-14);
    }

    #[test]
    fn triangle_rules_are_exact_for_polynomials() {
        let rule = QuadratureRule::triangle(2);
        // integral of r*s over the reference triangle = 1/24
        assert!((integrate_triangle(&rule, |r, s| r * s) - 1.0 / 24.0).abs() < 1e-14);
        let rule = QuadratureRule::triangle(3);
        // integral of r^3 = 1/20
        assert!((integrate_triangle(&rule, |r, _| r.powi(3)) - 0.05).abs() < 1e-14);
    }
}
