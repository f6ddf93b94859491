use glam::DVec2;
use std::sync::Arc;

/// Field identifier stored as a runtime string, matched against
/// [`crate::physics::CoefficientEvaluator::component_names`].
#[derive(Clone, Debug)]
pub struct Field(pub Arc<str>);

impl Field {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }
}

impl<T: Into<Arc<str>>> From<T> for Field {
    fn from(name: T) -> Self {
        Field::new(name)
    }
}

/// Shared function type for BC coefficients that may depend on time,
/// position and the outward unit normal.
pub type SFn = Arc<dyn Fn(f64, DVec2, DVec2) -> f64 + Send + Sync>;

/// Local trait allowing convenient conversion into [`SFn`].
pub trait IntoSFn {
    fn into_sfn(self) -> SFn;
}

/// Generalized boundary condition `alpha u + beta (a grad u . n) = gamma`.
#[derive(Clone)]
pub struct GeneralizedBC {
    pub alpha: SFn,
    pub beta: SFn,
    pub gamma: SFn,
}

impl GeneralizedBC {
    pub fn dirichlet(g: impl IntoSFn) -> Self {
        Self {
            alpha: c(1.0),
            beta: c(0.0),
            gamma: g.into_sfn(),
        }
    }

    pub fn neumann(q: impl IntoSFn) -> Self {
        Self {
            alpha: c(0.0),
            beta: c(1.0),
            gamma: q.into_sfn(),
        }
    }

    pub fn robin(k: impl IntoSFn, g: impl IntoSFn) -> Self {
        let kf = k.into_sfn();
        let gf = g.into_sfn();
        Self {
            alpha: kf.clone(),
            beta: c(1.0),
            gamma: Arc::new(move |t, x, n| kf(t, x, n) * gf(t, x, n)),
        }
    }

    /// The Dirichlet value `gamma / alpha`; only meaningful when
    /// `alpha != 0`.
    pub fn dirichlet_value(&self, t: f64, x: DVec2, n: DVec2) -> f64 {
        (self.gamma)(t, x, n) / (self.alpha)(t, x, n)
    }
}

fn c(val: f64) -> SFn {
    Arc::new(move |_, _, _| val)
}

impl IntoSFn for f64 {
    fn into_sfn(self) -> SFn {
        c(self)
    }
}

impl<F> IntoSFn for F
where
    F: Fn(f64, DVec2, DVec2) -> f64 + Send + Sync + 'static,
{
    fn into_sfn(self) -> SFn {
        Arc::new(self)
    }
}

#[derive(Clone)]
pub enum BoundarySelector {
    Label(String),
    Predicate(Arc<dyn Fn(DVec2, DVec2) -> bool + Send + Sync>),
}

#[derive(Clone)]
pub struct BCRule {
    pub field: Field,
    pub on: BoundarySelector,
    pub bc: GeneralizedBC,
}

#[derive(Default)]
pub struct BCRegistry {
    rules: Vec<BCRule>,
}

impl BCRegistry {
    pub fn add(&mut self, rule: BCRule) {
        self.rules.push(rule);
    }

    /// Last-added rule wins when several match.
    pub fn find_for<'a>(
        &'a self,
        field: impl AsRef<str>,
        label: &str,
        x: DVec2,
        n: DVec2,
    ) -> Option<&'a BCRule> {
        self.rules.iter().rev().find(|r| {
            r.field.0.as_ref() == field.as_ref()
                && match &r.on {
                    BoundarySelector::Label(l) => l == label,
                    BoundarySelector::Predicate(pred) => pred(x, n),
                }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_bc_by_field_and_label() {
        let mut reg = BCRegistry::default();
        reg.add(BCRule {
            field: Field::from("u"),
            on: BoundarySelector::Label("left".into()),
            bc: GeneralizedBC::dirichlet(1.0),
        });

        let x = DVec2::ZERO;
        let n = DVec2::new(-1.0, 0.0);
        let rule = reg.find_for("u", "left", x, n).expect("rule not found");
        assert_eq!(rule.field.0.as_ref(), "u");
        assert!((rule.bc.dirichlet_value(0.0, x, n) - 1.0).abs() < 1e-15);
        assert!(reg.find_for("u", "right", x, n).is_none());
        assert!(reg.find_for("v", "left", x, n).is_none());
    }

    #[test]
    fn later_rules_shadow_earlier_ones() {
        let mut reg = BCRegistry::default();
        reg.add(BCRule {
            field: Field::from("u"),
            on: BoundarySelector::Label("left".into()),
            bc: GeneralizedBC::dirichlet(1.0),
        });
        reg.add(BCRule {
            field: Field::from("u"),
            on: BoundarySelector::Label("left".into()),
            bc: GeneralizedBC::dirichlet(2.0),
        });
        let rule = reg
            .find_for("u", "left", DVec2::ZERO, DVec2::new(-1.0, 0.0))
            .unwrap();
        assert!((rule.bc.dirichlet_value(0.0, DVec2::ZERO, DVec2::ZERO) - 2.0).abs() < 1e-15);
    }
}
