//! Core data model for the nonlinear time-integration solver.
//!
//! Degrees of freedom are partitioned into *active* (J) dofs solved directly
//! by the Newton iteration and *dependent* (K) dofs determined from the
//! active ones through a linear constraint `dof_K = -C * dof_J + rhs(t)`.
//! All global vectors and tangent operators are block-structured twice:
//! by physical dof type (displacements, temperature, ...) and by the J/K
//! partition.

pub mod block;
pub mod block_matrix;
pub mod constraint;
pub mod dof;
pub mod time;

pub use block::{BlockScalar, BlockVector, DofVector};
pub use block_matrix::{BlockMatrix, DofMatrix};
pub use constraint::{ConstraintMatrix, ModelError, TimeTable};
pub use dof::{DofStatus, DofType};
pub use time::TimeControl;
