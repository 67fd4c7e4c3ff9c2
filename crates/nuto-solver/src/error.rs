//! Error types of the time-integration solver.

use nuto_constitutive::ConstitutiveError;
use nuto_model::constraint::ModelError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

/// Errors raised by assembly and time integration.
///
/// Non-convergence of a single Newton iteration is not an error; the
/// time-step controller handles it by cutting the step. These variants
/// are the unrecoverable outcomes.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error(transparent)]
    Constitutive(#[from] ConstitutiveError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("initial state is not in equilibrium (residual {residual})")]
    InitialStateNotInEquilibrium { residual: String },

    #[error("no convergence at t = {time} with time step {timestep} (minimum {min_timestep})")]
    NoConvergence {
        time: f64,
        timestep: f64,
        min_timestep: f64,
    },

    #[error("effective stiffness matrix is singular at t = {time}")]
    SingularSystem { time: f64 },

    #[error("invalid solver configuration: {0}")]
    InvalidConfig(String),
}
