//! Global residual and Jacobian assembly.
//!
//! The assembler traverses elements in mesh order (deterministic and
//! identical across residual and Jacobian passes), evaluates the
//! coefficient terms at every quadrature point, combines them with the
//! quadrature weights and the mapping determinant, and scatters the
//! local contributions additively into the global residual vector and
//! the fixed-pattern CSR Jacobian. Boundary faces contribute the
//! numerical flux; interior faces contribute the lagged edge viscosity.
//!
//! The assembler holds no state across calls beyond reusable scratch
//! buffers: every pass starts from zeroed outputs, so it is safe to call
//! repeatedly with different iterates.

use crate::discretization::basis::{element_geometry, element_gradients};
use crate::discretization::dofmap::DofMap;
use crate::discretization::mesh::Mesh;
use crate::discretization::quadrature::QuadratureRule;
use crate::numerics::sparse::CsrArena;
use crate::numerics::time_integration::TimeWeights;
use crate::physics::bc::BCRegistry;
use crate::physics::flux::{boundary_component_flux, interior_edge_viscosity, BoundaryFluxConfig};
use crate::physics::stabilization::{shock_viscosity, subgrid_tau, StabilizationConfig};
use crate::physics::{CoefficientEvaluator, CoefficientTerms, PointState};
use glam::DVec2;
use nalgebra::DVector;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("non-finite coefficient at element {element}, quadrature point {quad_point}")]
    NonFiniteCoefficient { element: usize, quad_point: usize },
    #[error("non-finite state value at dof {dof}")]
    NonFiniteState { dof: usize },
    #[error("non-finite boundary flux on face {face}")]
    NonFiniteFlux { face: usize },
}

#[derive(Clone, Copy)]
struct PassParts {
    spatial: bool,
    mass: bool,
    history: bool,
}

pub struct Assembler<'a> {
    mesh: &'a Mesh,
    dofs: &'a DofMap,
    coefficients: &'a dyn CoefficientEvaluator,
    bcs: &'a BCRegistry,
    pub stabilization: StabilizationConfig,
    pub boundary_flux: BoundaryFluxConfig,
    segment_rule: QuadratureRule,
    triangle_rule: QuadratureRule,
    face_rule: QuadratureRule,
    /// Nodal fields of another physics, interpolated to quadrature
    /// points and exposed through `PointState::coupled`.
    coupling: Option<(Vec<f64>, usize)>,

    // Scratch buffers reused across passes.
    terms: CoefficientTerms,
    ghost_terms: CoefficientTerms,
    elem_dofs: Vec<usize>,
    local_res: Vec<f64>,
    local_jac: Vec<f64>,
    value_q: Vec<f64>,
    grad_q: Vec<DVec2>,
    ghost_value: Vec<f64>,
    coupled_q: Vec<f64>,
    coupled_grad_q: Vec<DVec2>,
    flux_dvalue: Vec<f64>,
}

impl<'a> Assembler<'a> {
    pub fn new(
        mesh: &'a Mesh,
        dofs: &'a DofMap,
        coefficients: &'a dyn CoefficientEvaluator,
        bcs: &'a BCRegistry,
    ) -> Self {
        let ncomp = coefficients.n_components();
        assert_eq!(
            ncomp, dofs.n_components,
            "coefficient evaluator and dof map disagree on component count"
        );
        Assembler {
            mesh,
            dofs,
            coefficients,
            bcs,
            stabilization: StabilizationConfig::default(),
            boundary_flux: BoundaryFluxConfig::default(),
            segment_rule: QuadratureRule::segment(3),
            triangle_rule: QuadratureRule::triangle(2),
            face_rule: QuadratureRule::segment(2),
            coupling: None,
            terms: CoefficientTerms::new(ncomp),
            ghost_terms: CoefficientTerms::new(ncomp),
            elem_dofs: Vec::new(),
            local_res: Vec::new(),
            local_jac: Vec::new(),
            value_q: vec![0.0; ncomp],
            grad_q: vec![DVec2::ZERO; ncomp],
            ghost_value: vec![0.0; ncomp],
            coupled_q: Vec::new(),
            coupled_grad_q: Vec::new(),
            flux_dvalue: vec![0.0; ncomp],
        }
    }

    pub fn with_stabilization(mut self, config: StabilizationConfig) -> Self {
        self.stabilization = config;
        self
    }

    pub fn mesh(&self) -> &Mesh {
        self.mesh
    }

    pub fn dofs(&self) -> &DofMap {
        self.dofs
    }

    /// Install the other physics' nodal field for coupled evaluation.
    pub fn set_coupling(&mut self, nodal_values: Vec<f64>, n_components: usize) {
        self.coupled_q.resize(n_components, 0.0);
        self.coupled_grad_q.resize(n_components, DVec2::ZERO);
        self.coupling = Some((nodal_values, n_components));
    }

    pub fn clear_coupling(&mut self) {
        self.coupling = None;
        self.coupled_q.clear();
        self.coupled_grad_q.clear();
    }

    /// Residual and Jacobian for the current iterate under the given
    /// time weighting.
    pub fn assemble_system(
        &mut self,
        u: &DVector<f64>,
        t: f64,
        weights: &TimeWeights,
        residual: &mut DVector<f64>,
        jacobian: Option<&mut CsrArena>,
    ) -> Result<(), AssemblyError> {
        self.pass(
            u,
            t,
            weights,
            PassParts {
                spatial: true,
                mass: true,
                history: true,
            },
            residual,
            jacobian,
        )
    }

    /// Residual only; used by the Newton line search.
    pub fn assemble_residual(
        &mut self,
        u: &DVector<f64>,
        t: f64,
        weights: &TimeWeights,
        residual: &mut DVector<f64>,
    ) -> Result<(), AssemblyError> {
        self.assemble_system(u, t, weights, residual, None)
    }

    /// Raw mass vector `int m(u) phi_i`; the time integrator caches this
    /// for the history levels.
    pub fn assemble_mass(
        &mut self,
        u: &DVector<f64>,
        t: f64,
        out: &mut DVector<f64>,
    ) -> Result<(), AssemblyError> {
        let weights = TimeWeights {
            mass_coeff: 1.0,
            ..TimeWeights::steady()
        };
        self.pass(
            u,
            t,
            &weights,
            PassParts {
                spatial: false,
                mass: true,
                history: false,
            },
            out,
            None,
        )
    }

    /// Spatial residual `S(u)` alone (advection, diffusion, reaction,
    /// stabilization, boundary flux); the theta scheme caches this at
    /// the previous level.
    pub fn assemble_spatial(
        &mut self,
        u: &DVector<f64>,
        t: f64,
        out: &mut DVector<f64>,
    ) -> Result<(), AssemblyError> {
        self.pass(
            u,
            t,
            &TimeWeights::steady(),
            PassParts {
                spatial: true,
                mass: false,
                history: false,
            },
            out,
            None,
        )
    }

    fn pass(
        &mut self,
        u: &DVector<f64>,
        t: f64,
        weights: &TimeWeights,
        parts: PassParts,
        residual: &mut DVector<f64>,
        mut jacobian: Option<&mut CsrArena>,
    ) -> Result<(), AssemblyError> {
        if let Some(dof) = u.iter().position(|v| !v.is_finite()) {
            return Err(AssemblyError::NonFiniteState { dof });
        }

        residual.fill(0.0);
        if let Some(jac) = jacobian.as_deref_mut() {
            jac.zero();
        }

        for element_id in 0..self.mesh.num_elements() {
            self.element_contribution(
                element_id,
                u,
                t,
                weights,
                parts,
                residual,
                jacobian.as_deref_mut(),
            )?;
        }

        if parts.spatial {
            for face_id in 0..self.mesh.faces.len() {
                if self.mesh.faces[face_id].is_boundary() {
                    self.boundary_face_contribution(
                        face_id,
                        u,
                        t,
                        weights,
                        residual,
                        jacobian.as_deref_mut(),
                    )?;
                } else if self.stabilization.interior_penalty > 0.0 {
                    self.interior_face_contribution(
                        face_id,
                        u,
                        t,
                        weights,
                        residual,
                        jacobian.as_deref_mut(),
                    )?;
                }
            }
        }

        if parts.history {
            if let Some(history) = &weights.mass_history {
                *residual += history;
            }
            if let Some(history) = &weights.spatial_history {
                *residual += history;
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn element_contribution(
        &mut self,
        element_id: usize,
        u: &DVector<f64>,
        t: f64,
        weights: &TimeWeights,
        parts: PassParts,
        residual: &mut DVector<f64>,
        mut jacobian: Option<&mut CsrArena>,
    ) -> Result<(), AssemblyError> {
        let ncomp = self.dofs.n_components;
        let element = &self.mesh.elements[element_id];
        let rule = match element.num_nodes() {
            2 => &self.segment_rule,
            _ => &self.triangle_rule,
        };
        let geom = element_geometry(self.mesh, element_id, rule);
        let nn = geom.num_nodes;
        let nloc = nn * ncomp;

        self.dofs.element_dofs(element, &mut self.elem_dofs);
        self.local_res.clear();
        self.local_res.resize(nloc, 0.0);
        let want_jacobian = jacobian.is_some();
        if want_jacobian {
            self.local_jac.clear();
            self.local_jac.resize(nloc * nloc, 0.0);
        }

        let theta = if parts.spatial { weights.theta } else { 0.0 };
        let mass_coeff = if parts.mass { weights.mass_coeff } else { 0.0 };
        let h = geom.diameter;
        let nodes = element.nodes();

        for q in 0..geom.shape.len() {
            let w = geom.integration_weights[q];
            let shape = geom.shape[q];

            // Interpolate the iterate to the quadrature point.
            for c in 0..ncomp {
                let mut val = 0.0;
                let mut grad = DVec2::ZERO;
                for i in 0..nn {
                    let ui = u[self.elem_dofs[i * ncomp + c]];
                    val += shape[i] * ui;
                    grad += geom.grad[i] * ui;
                }
                self.value_q[c] = val;
                self.grad_q[c] = grad;
            }
            if let Some((nodal, nc)) = &self.coupling {
                for c in 0..*nc {
                    let mut val = 0.0;
                    let mut grad = DVec2::ZERO;
                    for i in 0..nn {
                        let vi = nodal[nodes[i] * nc + c];
                        val += shape[i] * vi;
                        grad += geom.grad[i] * vi;
                    }
                    self.coupled_q[c] = val;
                    self.coupled_grad_q[c] = grad;
                }
            }

            let state = PointState {
                value: &self.value_q,
                gradient: &self.grad_q,
                coupled: &self.coupled_q,
                coupled_gradient: &self.coupled_grad_q,
            };
            self.coefficients
                .evaluate(geom.phys_points[q], t, &state, &mut self.terms);
            if !self.terms.is_finite() {
                return Err(AssemblyError::NonFiniteCoefficient {
                    element: element_id,
                    quad_point: q,
                });
            }
            let terms = &self.terms;

            for c in 0..ncomp {
                // Strong residual of the first-order part; P1 second
                // derivatives vanish.
                let mut strong = terms.reaction[c];
                for k in 0..ncomp {
                    strong += terms.dadvection[c * ncomp + k].dot(self.grad_q[k]);
                }
                let v_c = terms.dadvection[c * ncomp + c];
                let tau = if parts.spatial && self.stabilization.subgrid {
                    subgrid_tau(
                        &self.stabilization,
                        terms.diffusion[c],
                        v_c.length(),
                        mass_coeff * terms.dmass[c * ncomp + c],
                        terms.dreaction[c * ncomp + c],
                        h,
                    )
                } else {
                    0.0
                };
                let nu_shock = if parts.spatial && self.stabilization.shock_capturing {
                    shock_viscosity(&self.stabilization, strong, self.grad_q[c].length(), h)
                } else {
                    0.0
                };

                for i in 0..nn {
                    let li = i * ncomp + c;
                    let mut r = 0.0;
                    if parts.spatial {
                        r += theta
                            * (-terms.advection[c].dot(geom.grad[i])
                                + (terms.diffusion[c] + nu_shock)
                                    * self.grad_q[c].dot(geom.grad[i])
                                + terms.reaction[c] * shape[i]);
                        if tau > 0.0 {
                            r += theta * tau * v_c.dot(geom.grad[i]) * strong;
                        }
                    }
                    if parts.mass {
                        r += mass_coeff * terms.mass[c] * shape[i];
                    }
                    self.local_res[li] += w * r;

                    if want_jacobian {
                        for j in 0..nn {
                            for k in 0..ncomp {
                                let lj = j * ncomp + k;
                                let mut jac = 0.0;
                                if parts.spatial {
                                    jac += theta
                                        * (-terms.dadvection[c * ncomp + k].dot(geom.grad[i])
                                            * shape[j]
                                            + terms.ddiffusion[c * ncomp + k]
                                                * self.grad_q[c].dot(geom.grad[i])
                                                * shape[j]
                                            + terms.dreaction[c * ncomp + k]
                                                * shape[i]
                                                * shape[j]);
                                    if k == c {
                                        jac += theta
                                            * (terms.diffusion[c] + nu_shock)
                                            * geom.grad[j].dot(geom.grad[i]);
                                    }
                                    if tau > 0.0 {
                                        // tau and the advective velocity are
                                        // lagged; the strong-residual
                                        // linearization is kept.
                                        let dstrong = terms.dadvection[c * ncomp + k]
                                            .dot(geom.grad[j])
                                            + terms.dreaction[c * ncomp + k] * shape[j];
                                        jac += theta * tau * v_c.dot(geom.grad[i]) * dstrong;
                                    }
                                }
                                if parts.mass {
                                    jac += mass_coeff
                                        * terms.dmass[c * ncomp + k]
                                        * shape[i]
                                        * shape[j];
                                }
                                self.local_jac[li * nloc + lj] += w * jac;
                            }
                        }
                    }
                }
            }
        }

        // Additive scatter into the global system.
        for li in 0..nloc {
            residual[self.elem_dofs[li]] += self.local_res[li];
        }
        if let Some(jac) = jacobian.as_deref_mut() {
            for li in 0..nloc {
                let row = self.elem_dofs[li];
                for lj in 0..nloc {
                    let v = self.local_jac[li * nloc + lj];
                    if v != 0.0 {
                        jac.add(row, self.elem_dofs[lj], v);
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn boundary_face_contribution(
        &mut self,
        face_id: usize,
        u: &DVector<f64>,
        t: f64,
        weights: &TimeWeights,
        residual: &mut DVector<f64>,
        mut jacobian: Option<&mut CsrArena>,
    ) -> Result<(), AssemblyError> {
        let Some(label) = self.mesh.face_tags.get(&face_id) else {
            // Untagged boundary: natural (zero-flux) condition.
            return Ok(());
        };
        let ncomp = self.dofs.n_components;
        let face = &self.mesh.faces[face_id];
        let element_id = face.neighbor_elements.0;
        let element = &self.mesh.elements[element_id];
        let elem_nodes = element.nodes();
        let grads = element_gradients(self.mesh, element_id);
        let h = self.mesh.element_diameter(element_id);
        let names = self.coefficients.component_names();
        let theta = weights.theta;

        // Face quadrature: a point in 1-D, a mapped segment rule in 2-D.
        let face_points: Vec<(f64, [f64; 2])> = if face.nodes.len() == 1 {
            vec![(face.area, [1.0, 0.0])]
        } else {
            self.face_rule
                .points
                .iter()
                .zip(&self.face_rule.weights)
                .map(|(p, w)| (w * face.area, [1.0 - p[0], p[0]]))
                .collect()
        };

        for (w_face, face_shape) in face_points {
            let mut x = DVec2::ZERO;
            for (fi, &node) in face.nodes.iter().enumerate() {
                x += face_shape[fi] * self.mesh.nodes[node].position;
            }

            // Interpolate the face state; gradients come from the owning
            // element.
            for c in 0..ncomp {
                let mut val = 0.0;
                for (fi, &node) in face.nodes.iter().enumerate() {
                    val += face_shape[fi] * u[self.dofs.global(node, c)];
                }
                self.value_q[c] = val;
                let mut grad = DVec2::ZERO;
                for (j, &node) in elem_nodes.iter().enumerate() {
                    grad += grads[j] * u[self.dofs.global(node, c)];
                }
                self.grad_q[c] = grad;
            }
            if let Some((nodal, nc)) = &self.coupling {
                for c in 0..*nc {
                    let mut val = 0.0;
                    for (fi, &node) in face.nodes.iter().enumerate() {
                        val += face_shape[fi] * nodal[node * nc + c];
                    }
                    self.coupled_q[c] = val;
                    let mut grad = DVec2::ZERO;
                    for (j, &node) in elem_nodes.iter().enumerate() {
                        grad += grads[j] * nodal[node * nc + c];
                    }
                    self.coupled_grad_q[c] = grad;
                }
            }

            let state = PointState {
                value: &self.value_q,
                gradient: &self.grad_q,
                coupled: &self.coupled_q,
                coupled_gradient: &self.coupled_grad_q,
            };
            self.coefficients.evaluate(x, t, &state, &mut self.terms);
            if !self.terms.is_finite() {
                return Err(AssemblyError::NonFiniteFlux { face: face_id });
            }

            for c in 0..ncomp {
                let Some(rule) = self.bcs.find_for(names[c], label, x, face.normal) else {
                    continue;
                };

                let has_dirichlet = (rule.bc.alpha)(t, x, face.normal) != 0.0;
                if has_dirichlet {
                    let g = rule.bc.dirichlet_value(t, x, face.normal);
                    self.ghost_value.copy_from_slice(&self.value_q);
                    self.ghost_value[c] = g;
                    let ghost_state = PointState {
                        value: &self.ghost_value,
                        gradient: &self.grad_q,
                        coupled: &self.coupled_q,
                        coupled_gradient: &self.coupled_grad_q,
                    };
                    self.coefficients
                        .evaluate(x, t, &ghost_state, &mut self.ghost_terms);
                    if !self.ghost_terms.is_finite() {
                        return Err(AssemblyError::NonFiniteFlux { face: face_id });
                    }
                }

                let flux = boundary_component_flux(
                    &self.boundary_flux,
                    &rule.bc,
                    t,
                    x,
                    face.normal,
                    h,
                    c,
                    &self.value_q,
                    &self.grad_q,
                    &self.terms,
                    has_dirichlet.then_some(&self.ghost_terms),
                    &mut self.flux_dvalue,
                );
                if !flux.value.is_finite() {
                    return Err(AssemblyError::NonFiniteFlux { face: face_id });
                }

                for (fi, &node_i) in face.nodes.iter().enumerate() {
                    let row = self.dofs.global(node_i, c);
                    residual[row] += w_face * theta * flux.value * face_shape[fi];

                    if let Some(jac) = jacobian.as_deref_mut() {
                        for (fj, &node_j) in face.nodes.iter().enumerate() {
                            for k in 0..ncomp {
                                let v = w_face
                                    * theta
                                    * face_shape[fi]
                                    * self.flux_dvalue[k]
                                    * face_shape[fj];
                                if v != 0.0 {
                                    jac.add(row, self.dofs.global(node_j, k), v);
                                }
                            }
                        }
                        if let Some(a) = flux.consistency_diffusion {
                            for (j, &node_j) in elem_nodes.iter().enumerate() {
                                let v = w_face
                                    * theta
                                    * face_shape[fi]
                                    * (-a * grads[j].dot(face.normal));
                                if v != 0.0 {
                                    jac.add(row, self.dofs.global(node_j, c), v);
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn interior_face_contribution(
        &mut self,
        face_id: usize,
        u: &DVector<f64>,
        t: f64,
        weights: &TimeWeights,
        residual: &mut DVector<f64>,
        mut jacobian: Option<&mut CsrArena>,
    ) -> Result<(), AssemblyError> {
        let face = &self.mesh.faces[face_id];
        // The edge term needs two shared face nodes; 1-D point faces
        // have no counterpart (interior fluxes cancel for continuous
        // elements).
        if face.nodes.len() != 2 {
            return Ok(());
        }
        let ncomp = self.dofs.n_components;
        let (left, right) = (face.neighbor_elements.0, face.neighbor_elements.1.unwrap());
        let grads_l = element_gradients(self.mesh, left);
        let grads_r = element_gradients(self.mesh, right);
        let nodes_l = self.mesh.elements[left].nodes();
        let nodes_r = self.mesh.elements[right].nodes();
        let theta = weights.theta;

        // Face-midpoint state for the advective speed.
        for c in 0..ncomp {
            let mut val = 0.0;
            for &node in &face.nodes {
                val += 0.5 * u[self.dofs.global(node, c)];
            }
            self.value_q[c] = val;
            self.grad_q[c] = DVec2::ZERO;
        }
        if let Some((nodal, nc)) = &self.coupling {
            for c in 0..*nc {
                let mut val = 0.0;
                for &node in &face.nodes {
                    val += 0.5 * nodal[node * nc + c];
                }
                self.coupled_q[c] = val;
                let mut grad = DVec2::ZERO;
                for (j, &node) in nodes_l.iter().enumerate() {
                    grad += grads_l[j] * nodal[node * nc + c];
                }
                self.coupled_grad_q[c] = grad;
            }
        }
        let state = PointState {
            value: &self.value_q,
            gradient: &self.grad_q,
            coupled: &self.coupled_q,
            coupled_gradient: &self.coupled_grad_q,
        };
        self.coefficients
            .evaluate(face.centroid, t, &state, &mut self.terms);
        if !self.terms.is_finite() {
            return Err(AssemblyError::NonFiniteFlux { face: face_id });
        }

        let (ni, nj) = (face.nodes[0], face.nodes[1]);
        for c in 0..ncomp {
            let mut grad_l = DVec2::ZERO;
            for (j, &node) in nodes_l.iter().enumerate() {
                grad_l += grads_l[j] * u[self.dofs.global(node, c)];
            }
            let mut grad_r = DVec2::ZERO;
            for (j, &node) in nodes_r.iter().enumerate() {
                grad_r += grads_r[j] * u[self.dofs.global(node, c)];
            }

            let jump = ((grad_l - grad_r).dot(face.normal)).abs();
            let speed = self.terms.dadvection[c * ncomp + c].dot(face.normal);
            let nu = interior_edge_viscosity(
                self.stabilization.interior_penalty,
                jump,
                grad_l.length() + grad_r.length(),
                speed,
                face.area,
            );
            if nu == 0.0 {
                continue;
            }

            let row_i = self.dofs.global(ni, c);
            let row_j = self.dofs.global(nj, c);
            let diff = u[row_i] - u[row_j];
            residual[row_i] += theta * nu * diff;
            residual[row_j] -= theta * nu * diff;

            if let Some(jac) = jacobian.as_deref_mut() {
                // nu is lagged.
                jac.add(row_i, row_i, theta * nu);
                jac.add(row_i, row_j, -theta * nu);
                jac.add(row_j, row_j, theta * nu);
                jac.add(row_j, row_i, -theta * nu);
            }
        }
        Ok(())
    }
}
