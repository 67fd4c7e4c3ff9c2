//! Implicit nonlinear time integration for block-structured dof systems.
//!
//! The [`NewmarkDirect`] integrator advances a [`Structure`] through
//! time: per step it moves the prescribed (dependent) dofs along their
//! constraint time tables, finds equilibrium of the active dofs with a
//! Newton-Raphson iteration (optionally staggered over dof-type groups)
//! and adapts the step size to the convergence behavior. Statics is the
//! same machinery without inertia terms.

pub mod equilibrium;
pub mod error;
pub mod newmark;
pub mod structure;
pub mod truss;

pub use equilibrium::EquilibriumOutcome;
pub use error::SolverError;
pub use newmark::{NewmarkConfig, NewmarkCoefficients, NewmarkDirect, SolveReport, StepRecord};
pub use structure::Structure;
pub use truss::{ThermalField, TrussBuilder, TrussStructure};
