//! Linear (P1) shape functions and affine reference-to-physical maps.

use super::mesh::{Element, Mesh};
use super::quadrature::QuadratureRule;
use glam::DVec2;

/// Everything the assembler needs about one element at the quadrature
/// points: physical point locations, integration factors (quadrature
/// weight times the mapping Jacobian determinant), shape values, and the
/// constant physical shape gradients.
pub struct ElementGeometry {
    pub num_nodes: usize,
    pub phys_points: Vec<DVec2>,
    pub integration_weights: Vec<f64>,
    pub shape: Vec<[f64; 3]>,
    pub grad: [DVec2; 3],
    pub measure: f64,
    pub diameter: f64,
}

/// P1 shape values on the reference element.
#[inline]
pub fn shape_values(element: &Element, point: [f64; 2]) -> [f64; 3] {
    match element {
        Element::Segment(_) => [1.0 - point[0], point[0], 0.0],
        Element::Triangle(_) => [1.0 - point[0] - point[1], point[0], point[1]],
    }
}

/// Evaluate the affine map and P1 basis for one element under the given
/// quadrature rule.
pub fn element_geometry(mesh: &Mesh, element_id: usize, rule: &QuadratureRule) -> ElementGeometry {
    let element = &mesh.elements[element_id];
    let measure = mesh.element_measure(element_id);
    let diameter = mesh.element_diameter(element_id);

    let grad = physical_gradients(mesh, element, measure);

    let num_nodes = element.num_nodes();
    let nodes = element.nodes();
    let mut phys_points = Vec::with_capacity(rule.len());
    let mut shape = Vec::with_capacity(rule.len());
    for &p in &rule.points {
        let n = shape_values(element, p);
        let mut x = DVec2::ZERO;
        for (i, &node) in nodes.iter().enumerate() {
            x += n[i] * mesh.nodes[node].position;
        }
        phys_points.push(x);
        shape.push(n);
    }

    // detJ equals the element measure divided by the reference measure;
    // reference weights already carry the reference measure.
    let integration_weights = rule
        .weights
        .iter()
        .map(|w| {
            w * match element {
                Element::Segment(_) => measure,
                Element::Triangle(_) => 2.0 * measure,
            }
        })
        .collect();

    ElementGeometry {
        num_nodes,
        phys_points,
        integration_weights,
        shape,
        grad,
        measure,
        diameter,
    }
}

/// Constant physical P1 gradients of an element, without the quadrature
/// bookkeeping of [`element_geometry`]. Used by face terms that only
/// need the gradients of a neighboring element.
pub fn element_gradients(mesh: &Mesh, element_id: usize) -> [DVec2; 3] {
    let measure = mesh.element_measure(element_id);
    physical_gradients(mesh, &mesh.elements[element_id], measure)
}

fn physical_gradients(mesh: &Mesh, element: &Element, measure: f64) -> [DVec2; 3] {
    match element {
        Element::Segment([a, b]) => {
            let tangent = (mesh.nodes[*b].position - mesh.nodes[*a].position) / measure;
            [-tangent / measure, tangent / measure, DVec2::ZERO]
        }
        Element::Triangle([a, b, c]) => {
            let pa = mesh.nodes[*a].position;
            let pb = mesh.nodes[*b].position;
            let pc = mesh.nodes[*c].position;
            let two_area = 2.0 * measure;
            // grad N_i = perp of the opposite edge over twice the area,
            // oriented so that N_i increases toward node i.
            [
                (pb - pc).perp() / -two_area,
                (pc - pa).perp() / -two_area,
                (pa - pb).perp() / -two_area,
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::{interval_mesh, rectangle_mesh};

    #[test]
    fn shape_functions_partition_unity() {
        let mesh = rectangle_mesh(1.0, 1.0, 2, 2);
        let rule = QuadratureRule::triangle(2);
        let geom = element_geometry(&mesh, 0, &rule);
        for q in 0..rule.len() {
            let sum: f64 = geom.shape[q].iter().sum();
            assert!((sum - 1.0).abs() < 1e-14);
        }
        let grad_sum = geom.grad[0] + geom.grad[1] + geom.grad[2];
        assert!(grad_sum.length() < 1e-13);
    }

    #[test]
    fn gradients_reproduce_linear_fields() {
        let mesh = rectangle_mesh(2.0, 1.0, 3, 2);
        let rule = QuadratureRule::triangle(1);
        for e in 0..mesh.num_elements() {
            let geom = element_geometry(&mesh, e, &rule);
            let nodes = mesh.elements[e].nodes();
            // u(x, y) = 3x - 2y + 1 has gradient (3, -2).
            let mut grad = DVec2::ZERO;
            for (i, &n) in nodes.iter().enumerate() {
                let p = mesh.nodes[n].position;
                grad += (3.0 * p.x - 2.0 * p.y + 1.0) * geom.grad[i];
            }
            assert!((grad - DVec2::new(3.0, -2.0)).length() < 1e-12);
        }
    }

    #[test]
    fn segment_integration_weights_sum_to_length() {
        let mesh = interval_mesh(0.0, 2.0, 4);
        let rule = QuadratureRule::segment(3);
        let geom = element_geometry(&mesh, 1, &rule);
        let total: f64 = geom.integration_weights.iter().sum();
        assert!((total - 0.5).abs() < 1e-14);
    }
}
