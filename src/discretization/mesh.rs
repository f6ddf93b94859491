use glam::DVec2;
use std::collections::HashMap;

/// A mesh vertex. One-dimensional meshes live on the x-axis (y = 0).
pub struct Node {
    pub position: DVec2,
}

/// A simplex element given as an ordered tuple of node indices.
/// Triangles are counter-clockwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Element {
    Segment([usize; 2]),
    Triangle([usize; 3]),
}

impl Element {
    #[inline]
    pub fn nodes(&self) -> &[usize] {
        match self {
            Element::Segment(n) => n,
            Element::Triangle(n) => n,
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes().len()
    }
}

/// An interface between two elements, or between an element and the
/// domain boundary.
///
/// `neighbor_elements` is (left_id, optional right_id); `None` on the
/// right marks a boundary face. The normal points out of the left
/// element. In 1-D a face is a single shared node with unit area.
pub struct Face {
    pub area: f64,
    pub normal: DVec2,
    pub centroid: DVec2,
    pub neighbor_elements: (usize, Option<usize>),
    pub nodes: Vec<usize>,
}

impl Face {
    #[inline]
    pub fn is_boundary(&self) -> bool {
        self.neighbor_elements.1.is_none()
    }
}

/// The complete computational grid. Connectivity is immutable after
/// construction; node indices are contiguous.
pub struct Mesh {
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
    pub faces: Vec<Face>,
    /// Labels for boundary faces, keyed by face index. Untagged boundary
    /// faces get the natural (zero-flux) condition.
    pub face_tags: HashMap<usize, String>,
}

impl Mesh {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Longest edge of the element.
    pub fn element_diameter(&self, element: usize) -> f64 {
        let nodes = self.elements[element].nodes();
        let mut diameter = 0.0f64;
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let d = (self.nodes[nodes[i]].position - self.nodes[nodes[j]].position).length();
                diameter = diameter.max(d);
            }
        }
        diameter
    }

    /// Signed measure: segment length or triangle area.
    pub fn element_measure(&self, element: usize) -> f64 {
        match &self.elements[element] {
            Element::Segment([a, b]) => (self.nodes[*b].position - self.nodes[*a].position).length(),
            Element::Triangle([a, b, c]) => {
                let pa = self.nodes[*a].position;
                let pb = self.nodes[*b].position;
                let pc = self.nodes[*c].position;
                0.5 * (pb - pa).perp_dot(pc - pa)
            }
        }
    }
}
