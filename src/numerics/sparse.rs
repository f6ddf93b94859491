//! Fixed-pattern sparse storage for the global Jacobian.
//!
//! The sparsity pattern is computed once from the mesh and DOF map (two
//! DOFs couple iff their nodes share an element) and reused for every
//! assembly pass; only the numeric values are rebuilt each iteration.

use crate::discretization::dofmap::DofMap;
use crate::discretization::mesh::Mesh;
use nalgebra::DMatrix;

/// CSR layout with sorted column indices per row.
pub struct SparsityPattern {
    pub n: usize,
    pub row_ptr: Vec<usize>,
    pub col_idx: Vec<usize>,
}

impl SparsityPattern {
    /// Couple every pair of DOFs whose nodes share an element (this
    /// includes the node with itself).
    pub fn from_mesh(mesh: &Mesh, dofs: &DofMap) -> Self {
        let num_nodes = mesh.num_nodes();
        let mut node_neighbors: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];
        for element in &mesh.elements {
            let nodes = element.nodes();
            for &a in nodes {
                for &b in nodes {
                    node_neighbors[a].push(b);
                }
            }
        }
        for neighbors in &mut node_neighbors {
            neighbors.sort_unstable();
            neighbors.dedup();
        }

        let ncomp = dofs.n_components;
        let n = dofs.n_dofs();
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        row_ptr.push(0);
        for node in 0..num_nodes {
            for _comp in 0..ncomp {
                for &neighbor in &node_neighbors[node] {
                    for k in 0..ncomp {
                        col_idx.push(dofs.global(neighbor, k));
                    }
                }
                row_ptr.push(col_idx.len());
            }
        }

        SparsityPattern { n, row_ptr, col_idx }
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    /// Offset of (row, col) in the value array, if the entry exists.
    #[inline]
    pub fn entry(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_idx[start..end]
            .binary_search(&col)
            .ok()
            .map(|k| start + k)
    }
}

/// Value arena over a fixed [`SparsityPattern`]. Zeroed at the start of
/// every assembly pass; scattering is strictly additive.
pub struct CsrArena {
    pub pattern: SparsityPattern,
    pub values: Vec<f64>,
}

impl CsrArena {
    pub fn new(pattern: SparsityPattern) -> Self {
        let nnz = pattern.nnz();
        CsrArena {
            pattern,
            values: vec![0.0; nnz],
        }
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.pattern.n
    }

    pub fn zero(&mut self) {
        self.values.fill(0.0);
    }

    /// Additive scatter. Out-of-pattern entries indicate a broken
    /// pattern and are a programming error.
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        match self.pattern.entry(row, col) {
            Some(k) => self.values[k] += value,
            None => panic!("entry ({row}, {col}) is outside the sparsity pattern"),
        }
    }

    pub fn diagonal(&self, row: usize) -> f64 {
        self.pattern
            .entry(row, row)
            .map(|k| self.values[k])
            .unwrap_or(0.0)
    }

    /// Export to the iterative backend's CSR type.
    pub fn to_kryst(&self) -> kryst::matrix::sparse::CsrMatrix<f64> {
        kryst::matrix::sparse::CsrMatrix::from_csr(
            self.pattern.n,
            self.pattern.n,
            self.pattern.row_ptr.clone(),
            self.pattern.col_idx.clone(),
            self.values.clone(),
        )
    }

    /// Dense export for the direct backend and for tests.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.pattern.n;
        let mut dense = DMatrix::zeros(n, n);
        for row in 0..n {
            for k in self.pattern.row_ptr[row]..self.pattern.row_ptr[row + 1] {
                dense[(row, self.pattern.col_idx[k])] = self.values[k];
            }
        }
        dense
    }
}
