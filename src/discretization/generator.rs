use super::mesh::{Element, Face, Mesh, Node};
use glam::DVec2;
use std::collections::HashMap;

/// Build a structured 1-D interval mesh of `n` segments on [x0, x1].
///
/// Boundary faces are tagged "left" and "right"; interior faces sit on
/// the shared nodes with unit area and +x normal out of the left element.
pub fn interval_mesh(x0: f64, x1: f64, n: usize) -> Mesh {
    assert!(n >= 1, "interval mesh needs at least one element");
    let dx = (x1 - x0) / n as f64;

    let nodes: Vec<Node> = (0..=n)
        .map(|i| Node {
            position: DVec2::new(x0 + i as f64 * dx, 0.0),
        })
        .collect();

    let elements: Vec<Element> = (0..n).map(|i| Element::Segment([i, i + 1])).collect();

    let mut faces = Vec::with_capacity(n + 1);
    let mut face_tags = HashMap::new();

    faces.push(Face {
        area: 1.0,
        normal: DVec2::new(-1.0, 0.0),
        centroid: nodes[0].position,
        neighbor_elements: (0, None),
        nodes: vec![0],
    });
    face_tags.insert(0, "left".to_string());

    for i in 1..n {
        faces.push(Face {
            area: 1.0,
            normal: DVec2::new(1.0, 0.0),
            centroid: nodes[i].position,
            neighbor_elements: (i - 1, Some(i)),
            nodes: vec![i],
        });
    }

    faces.push(Face {
        area: 1.0,
        normal: DVec2::new(1.0, 0.0),
        centroid: nodes[n].position,
        neighbor_elements: (n - 1, None),
        nodes: vec![n],
    });
    face_tags.insert(faces.len() - 1, "right".to_string());

    Mesh {
        nodes,
        elements,
        faces,
        face_tags,
    }
}

/// Build a triangulated rectangle [0,w] x [0,h] with `nx` x `ny` quads,
/// each split into two counter-clockwise triangles.
///
/// Boundary edges are tagged "left"/"right"/"bottom"/"top".
pub fn rectangle_mesh(width: f64, height: f64, nx: usize, ny: usize) -> Mesh {
    assert!(nx >= 1 && ny >= 1, "rectangle mesh needs at least one quad");
    let dx = width / nx as f64;
    let dy = height / ny as f64;
    let stride = nx + 1;

    let mut nodes = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            nodes.push(Node {
                position: DVec2::new(i as f64 * dx, j as f64 * dy),
            });
        }
    }

    let mut elements = Vec::with_capacity(2 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let n00 = j * stride + i;
            let n10 = n00 + 1;
            let n01 = n00 + stride;
            let n11 = n01 + 1;
            elements.push(Element::Triangle([n00, n10, n11]));
            elements.push(Element::Triangle([n00, n11, n01]));
        }
    }

    // Discover faces from element edges: first visit owns the face (left
    // element, outward normal), second visit fills in the right neighbor.
    let mut faces: Vec<Face> = Vec::new();
    let mut edge_lookup: HashMap<(usize, usize), usize> = HashMap::new();

    for (elem_id, element) in elements.iter().enumerate() {
        let n = element.nodes();
        for k in 0..3 {
            let a = n[k];
            let b = n[(k + 1) % 3];
            let key = (a.min(b), a.max(b));
            if let Some(&face_id) = edge_lookup.get(&key) {
                faces[face_id].neighbor_elements.1 = Some(elem_id);
            } else {
                let pa = nodes[a].position;
                let pb = nodes[b].position;
                let dir = pb - pa;
                let len = dir.length();
                faces.push(Face {
                    area: len,
                    normal: DVec2::new(dir.y, -dir.x) / len,
                    centroid: 0.5 * (pa + pb),
                    neighbor_elements: (elem_id, None),
                    nodes: vec![a, b],
                });
                edge_lookup.insert(key, faces.len() - 1);
            }
        }
    }

    let mut face_tags = HashMap::new();
    let eps = 1e-12 * width.max(height);
    for (face_id, face) in faces.iter().enumerate() {
        if !face.is_boundary() {
            continue;
        }
        let c = face.centroid;
        let tag = if c.x < eps {
            "left"
        } else if c.x > width - eps {
            "right"
        } else if c.y < eps {
            "bottom"
        } else {
            "top"
        };
        face_tags.insert(face_id, tag.to_string());
    }

    Mesh {
        nodes,
        elements,
        faces,
        face_tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_face_normals_point_out_of_left_element() {
        let mesh = rectangle_mesh(1.0, 1.0, 2, 2);
        for face in mesh.faces.iter().filter(|f| !f.is_boundary()) {
            let (left, _) = face.neighbor_elements;
            // Centroid of the left element should lie behind the face plane.
            let nodes = mesh.elements[left].nodes();
            let centroid = nodes
                .iter()
                .map(|&n| mesh.nodes[n].position)
                .fold(DVec2::ZERO, |acc, p| acc + p)
                / 3.0;
            assert!((face.centroid - centroid).dot(face.normal) > 0.0);
        }
    }

    #[test]
    fn rectangle_boundary_tag_count() {
        let mesh = rectangle_mesh(1.0, 1.0, 4, 3);
        let count = |tag: &str| {
            mesh.face_tags
                .values()
                .filter(|t| t.as_str() == tag)
                .count()
        };
        assert_eq!(count("left"), 3);
        assert_eq!(count("right"), 3);
        assert_eq!(count("bottom"), 4);
        assert_eq!(count("top"), 4);
    }
}
