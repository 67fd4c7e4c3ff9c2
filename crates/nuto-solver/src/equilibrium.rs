//! Newton-Raphson equilibrium iteration with backtracking line search.
//!
//! One call drives the active dofs of the current dof-type group to
//! equilibrium at a fixed time. The iteration solves
//! H_eff * delta = -r with the constraint-condensed effective stiffness,
//! then backtracks the step width until the trial residual norm drops
//! below (1 - alpha) times the previous one, per dof-type block. A step
//! width at or below the minimum signals non-convergence by reporting
//! the maximum iteration count; the caller's time-step controller reacts
//! by cutting the step.

use crate::error::{Result, SolverError};
use crate::newmark::{NewmarkCoefficients, NewmarkConfig};
use crate::structure::Structure;
use nuto_model::{BlockScalar, BlockVector, ConstraintMatrix};
use tracing::{debug, trace};

/// Result of one equilibrium search.
#[derive(Debug, Clone)]
pub struct EquilibriumOutcome {
    pub converged: bool,
    /// Iterations spent; equals the maximum when the line search died.
    pub iterations: usize,
    pub residual_norm: BlockScalar,
}

/// State of the last accepted time step, used to reconstruct velocities
/// and accelerations from a displacement increment.
pub(crate) struct LastConverged {
    pub dof0: BlockVector,
    pub dof1: BlockVector,
    pub dof2: BlockVector,
}

/// Write `dof0` into the structure and, for transient problems, the
/// matching rates from the Newmark approximations. The acceleration is
/// only reconstructed when the structure carries a second derivative.
pub(crate) fn apply_dof_values<S: Structure>(
    structure: &mut S,
    dof0: &BlockVector,
    dynamics: Option<&NewmarkCoefficients>,
    last: &LastConverged,
) {
    if let Some(coefficients) = dynamics {
        let orders = structure.num_time_derivatives();
        let delta = dof0 - &last.dof0;
        if orders >= 1 {
            structure.set_dof_values(1, coefficients.velocity(&delta, &last.dof1, &last.dof2));
        }
        if orders >= 2 {
            structure.set_dof_values(2, coefficients.acceleration(&delta, &last.dof1, &last.dof2));
        }
    }
    structure.set_dof_values(0, dof0.clone());
}

/// Residual r = gradient + H2 * a + (H1 + mu * H2) * v - f_ext(t),
/// with the inertia and damping terms present only for structures that
/// carry the matching time derivatives.
pub(crate) fn compute_residual<S: Structure>(
    structure: &S,
    time: f64,
    mu_damping: f64,
) -> Result<BlockVector> {
    let orders = structure.num_time_derivatives();
    let mut residual = structure.gradient()?;
    if orders >= 1 {
        let status = structure.dof_status();
        let mut damping = structure.hessian(1)?;
        if orders >= 2 {
            let mass = structure.hessian(2)?;
            residual += &mass.mul_vector(structure.dof_values(2), status);
            if mu_damping != 0.0 {
                damping.add_scaled(&mass, mu_damping);
            }
        }
        residual += &damping.mul_vector(structure.dof_values(1), status);
    }
    residual -= &structure.external_load(time);
    Ok(residual)
}

/// Drive the currently active dofs to equilibrium at `time`.
///
/// The caller has already moved the dependent dofs to their constraint
/// values for `time`; this function only changes active dof values (and
/// the dependent ones through `delta_K = -C * delta_J`).
///
/// # Errors
/// [`SolverError::SingularSystem`] when the effective stiffness cannot
/// be factorized; constitutive failures are passed through.
pub(crate) fn find_equilibrium<S: Structure>(
    structure: &mut S,
    time: f64,
    dynamics: Option<&NewmarkCoefficients>,
    last: &LastConverged,
    config: &NewmarkConfig,
    tolerance: &BlockScalar,
) -> Result<EquilibriumOutcome> {
    let cmat: ConstraintMatrix = structure.constraints().clone();
    let orders = structure.num_time_derivatives();

    let mut dof0 = structure.dof_values(0).clone();
    apply_dof_values(structure, &dof0, dynamics, last);

    let residual = compute_residual(structure, time, config.mu_damping_mass)?;
    let mut residual_j = residual.apply_cmatrix(&cmat);
    let mut norm = {
        let status = structure.dof_status();
        residual_j.inf_norm(status)
    };
    if norm.is_below(tolerance) {
        return Ok(EquilibriumOutcome {
            converged: true,
            iterations: 0,
            residual_norm: norm,
        });
    }

    let mut iteration = 0;
    while iteration < config.max_iterations {
        // effective stiffness H0 + c1 (H1 + mu H2) + c2 H2, condensed onto J
        let mut h_eff = structure.hessian(0)?;
        if let Some(coefficients) = dynamics {
            h_eff.add_scaled(&structure.hessian(1)?, coefficients.c1());
            if orders >= 2 {
                h_eff.add_scaled(
                    &structure.hessian(2)?,
                    coefficients.c2() + coefficients.c1() * config.mu_damping_mass,
                );
            }
        }
        h_eff.apply_cmatrix(&cmat);

        let (dense, rhs) = {
            let status = structure.dof_status();
            (h_eff.jj_dense_active(status), residual_j.flatten_active(status))
        };
        let lu = dense.lu();
        let Some(solution) = lu.solve(&(-&rhs)) else {
            return Err(SolverError::SingularSystem { time });
        };

        let mut delta = BlockVector::zeros(structure.dof_status());
        {
            let status = structure.dof_status();
            delta.j.overwrite_active(status, &solution);
        }
        // delta_K = -C * delta_J, the constraint rhs moved at step start
        for dof in cmat.dof_types().collect::<Vec<_>>() {
            if cmat.num_entries(dof) > 0 {
                if let (Some(j_block), Some(k_block)) =
                    (delta.j.block(dof).cloned(), delta.k.block_mut(dof))
                {
                    k_block.copy_from(&(-cmat.mul(dof, &j_block)));
                }
            }
        }

        // backtracking line search on the residual norm; the step width
        // is halved after each trial, so the test for trial i uses the
        // width of trial i + 1
        let mut alpha = 1.0;
        let (trial_dof0, trial_residual_j, trial_norm) = loop {
            let trial = &dof0 + &(&delta * alpha);
            apply_dof_values(structure, &trial, dynamics, last);
            let trial_residual = compute_residual(structure, time, config.mu_damping_mass)?;
            let trial_residual_j = trial_residual.apply_cmatrix(&cmat);
            let trial_norm = trial_residual_j.inf_norm(structure.dof_status());
            trace!(time, iteration, alpha, norm = %trial_norm, "line search trial");

            alpha *= 0.5;
            let keep_searching = config.perform_line_search
                && alpha > config.min_line_search_step
                && trial_norm.exceeds(&norm.scaled(1.0 - alpha));
            if !keep_searching {
                break (trial, trial_residual_j, trial_norm);
            }
        };

        if config.perform_line_search && alpha <= config.min_line_search_step {
            // line search failed, report non-convergence
            apply_dof_values(structure, &dof0, dynamics, last);
            debug!(time, iteration, "line search fell below the minimum step width");
            return Ok(EquilibriumOutcome {
                converged: false,
                iterations: config.max_iterations,
                residual_norm: norm,
            });
        }

        dof0 = trial_dof0;
        residual_j = trial_residual_j;
        norm = trial_norm;
        iteration += 1;
        debug!(time, iteration, alpha, norm = %norm, "newton iteration");

        if norm.is_below(tolerance) {
            return Ok(EquilibriumOutcome {
                converged: true,
                iterations: iteration,
                residual_norm: norm,
            });
        }
    }

    Ok(EquilibriumOutcome {
        converged: false,
        iterations: config.max_iterations,
        residual_norm: norm,
    })
}
