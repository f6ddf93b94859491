//! femflow — numerical solutions of time-dependent PDE systems
//! (transport, subsurface flow, multiphase flow) on unstructured meshes.
//!
//! The crate is organized around the residual/Jacobian assembly and the
//! nonlinear-in-time solve loop: [`numerics::assembler`] evaluates PDE
//! coefficients and stabilization terms at quadrature points over every
//! element and scatters them into a global residual and sparse Jacobian,
//! [`numerics::newton`] drives the Newton iteration against a pluggable
//! linear-solve backend, [`numerics::time_integration`] supplies the
//! implicit time-stepping weights, and [`numerics::step_control`] adapts
//! the step size and retries failed steps. Coupled multi-physics systems
//! are sequenced by [`numerics::split_operator`].

pub mod discretization;
pub mod models;
pub mod numerics;
pub mod physics;
pub mod processing;
