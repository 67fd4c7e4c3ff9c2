//! Interface between the time integrator and a discretized structure.

use crate::error::Result;
use nuto_model::{BlockMatrix, BlockVector, ConstraintMatrix, DofStatus};

/// A spatially discretized structure the Newmark scheme can integrate.
///
/// The integrator only talks to this trait: it reads and writes dof
/// values by time-derivative order (0 = value, 1 = velocity, 2 =
/// acceleration), assembles gradients and hessians for the current dof
/// values, and commits integration-point history once a step is
/// accepted.
///
/// Assembly is read-only; evaluating a gradient twice for the same dof
/// values gives the same result. Only [`Structure::set_dof_values`] and
/// [`Structure::update_static_data`] mutate state.
pub trait Structure {
    /// Dof counts and the currently active dof types.
    fn dof_status(&self) -> &DofStatus;

    /// Mutable access, used by the staggered dof-group loop.
    fn dof_status_mut(&mut self) -> &mut DofStatus;

    /// Linear constraints `dof_K = -C * dof_J + rhs(t)`.
    fn constraints(&self) -> &ConstraintMatrix;

    /// Highest time-derivative order carried by the dofs: 0 for a static
    /// problem, 1 for first-order transients, 2 for dynamics.
    fn num_time_derivatives(&self) -> usize;

    /// Dof values of the given derivative order.
    fn dof_values(&self, derivative: usize) -> &BlockVector;

    /// Overwrite the dof values of the given derivative order.
    fn set_dof_values(&mut self, derivative: usize, values: BlockVector);

    /// Announce the current simulated time before assembly. Structures
    /// whose constitutive inputs do not depend on time can ignore it.
    fn set_time(&mut self, _t: f64) {}

    /// Internal gradient (internal forces) for the current dof values.
    ///
    /// # Errors
    /// Fails when a constitutive evaluation fails.
    fn gradient(&self) -> Result<BlockVector>;

    /// Hessian of the given order for the current dof values: 0 is the
    /// stiffness, 1 the damping and 2 the mass operator.
    ///
    /// # Errors
    /// Fails when a constitutive evaluation fails.
    fn hessian(&self, order: usize) -> Result<BlockMatrix>;

    /// External loads at time `t`. Follows the load time tables only;
    /// independent of the current dof values.
    fn external_load(&self, t: f64) -> BlockVector;

    /// Recompute integration-point history from the committed history and
    /// the current dof values, then commit it. Calling this twice for the
    /// same dof values commits the same state.
    ///
    /// # Errors
    /// Fails when a constitutive evaluation fails.
    fn update_static_data(&mut self) -> Result<()>;
}
