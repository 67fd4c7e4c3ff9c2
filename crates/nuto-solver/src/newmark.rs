//! Newmark-beta implicit time integration with adaptive stepping.
//!
//! Within one step the displacement increment drives velocities and
//! accelerations through
//!
//! ```text
//! v = gamma / (beta dt)   * delta_u + (1 - gamma/beta) v_n + dt (1 - gamma/(2 beta)) a_n
//! a = 1 / (beta dt^2)     * delta_u - 1/(beta dt) v_n - (1/(2 beta) - 1) a_n
//! ```
//!
//! so the effective stiffness of the Newton iteration is
//! `H_eff = H0 + gamma/(beta dt) H1 + 1/(beta dt^2) H2`. The default
//! beta = 1/4, gamma = 1/2 (average acceleration) is unconditionally
//! stable and energy conserving for linear problems.
//!
//! The controller cuts the time step in half whenever the equilibrium
//! iteration fails and grows it by 1.5 when convergence was quick. A
//! step below the minimum is fatal. Every accepted step commits the
//! integration-point history, records postprocessing quantities and
//! polls the cancellation callback once.

use crate::equilibrium::{self, LastConverged};
use crate::error::{Result, SolverError};
use crate::structure::Structure;
use nuto_model::{BlockScalar, BlockVector, ConstraintMatrix, DofType, DofVector, TimeControl};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Parameters of the Newmark scheme and its equilibrium iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewmarkConfig {
    pub beta: f64,
    pub gamma: f64,
    /// Initial time step.
    pub timestep: f64,
    /// Upper bound for automatic time stepping.
    pub max_timestep: f64,
    /// Lower bound; defaults to the initial step halved six times.
    pub min_timestep: Option<f64>,
    /// Grow the step after quick convergence, shrink it on failure.
    pub automatic_timestepping: bool,
    pub max_iterations: usize,
    /// Residual tolerance applied to every dof type.
    pub tolerance: f64,
    /// Per-dof-type overrides of the residual tolerance.
    pub tolerances: BTreeMap<DofType, f64>,
    pub perform_line_search: bool,
    pub min_line_search_step: f64,
    /// Mass-proportional damping factor: the damping operator becomes
    /// `H1 + mu * H2`. Needs a structure with two time derivatives.
    pub mu_damping_mass: f64,
    /// Dof-type groups solved one after another per time step (block
    /// Gauss-Seidel). Empty means all dof types at once.
    pub staggered_groups: Vec<Vec<DofType>>,
}

impl NewmarkConfig {
    /// Average-acceleration scheme with the given initial time step.
    pub fn average_acceleration(timestep: f64) -> Self {
        Self {
            beta: 0.25,
            gamma: 0.5,
            timestep,
            max_timestep: timestep,
            min_timestep: None,
            automatic_timestepping: false,
            max_iterations: 20,
            tolerance: 1e-6,
            tolerances: BTreeMap::new(),
            perform_line_search: true,
            min_line_search_step: 0.01,
            mu_damping_mass: 0.0,
            staggered_groups: Vec::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.timestep <= 0.0 {
            return Err(SolverError::InvalidConfig(
                "time step must be positive".into(),
            ));
        }
        if self.beta <= 0.0 || self.gamma <= 0.0 {
            return Err(SolverError::InvalidConfig(
                "beta and gamma must be positive".into(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(SolverError::InvalidConfig(
                "at least one equilibrium iteration is needed".into(),
            ));
        }
        if self.max_timestep <= 0.0 {
            return Err(SolverError::InvalidConfig(
                "maximum time step must be positive".into(),
            ));
        }
        if self.staggered_groups.iter().any(|group| group.is_empty()) {
            return Err(SolverError::InvalidConfig(
                "staggered dof-type groups must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Per-step factors of the Newmark approximations.
#[derive(Debug, Clone, Copy)]
pub struct NewmarkCoefficients {
    beta: f64,
    gamma: f64,
    timestep: f64,
}

impl NewmarkCoefficients {
    pub fn new(beta: f64, gamma: f64, timestep: f64) -> Self {
        Self {
            beta,
            gamma,
            timestep,
        }
    }

    /// Velocity factor of the effective stiffness.
    pub fn c1(&self) -> f64 {
        self.gamma / (self.beta * self.timestep)
    }

    /// Acceleration factor of the effective stiffness.
    pub fn c2(&self) -> f64 {
        1.0 / (self.beta * self.timestep * self.timestep)
    }

    /// Velocity from the displacement increment over the step.
    pub fn velocity(
        &self,
        delta: &BlockVector,
        dof1_old: &BlockVector,
        dof2_old: &BlockVector,
    ) -> BlockVector {
        let mut v = delta * self.c1();
        v += &(dof1_old * (1.0 - self.gamma / self.beta));
        v += &(dof2_old * (self.timestep * (1.0 - self.gamma / (2.0 * self.beta))));
        v
    }

    /// Acceleration from the displacement increment over the step.
    pub fn acceleration(
        &self,
        delta: &BlockVector,
        dof1_old: &BlockVector,
        dof2_old: &BlockVector,
    ) -> BlockVector {
        let mut a = delta * self.c2();
        a -= &(dof1_old * (1.0 / (self.beta * self.timestep)));
        a -= &(dof2_old * (1.0 / (2.0 * self.beta) - 1.0));
        a
    }
}

/// One accepted time step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub time: f64,
    pub iterations: usize,
    pub residual_norm: BlockScalar,
    /// Converged dof values.
    pub dof_values: BlockVector,
    /// Residual on the dependent dofs: the reaction forces.
    pub reactions: DofVector,
    /// Internal work accumulated with the trapezoidal rule, relative to
    /// the start of the solve.
    pub internal_energy: f64,
    pub kinetic_energy: f64,
    /// Energy dissipated by damping, accumulated with the trapezoidal
    /// rule.
    pub damped_energy: f64,
    /// External work accumulated with the trapezoidal rule.
    pub external_work: f64,
}

/// Result of a completed (or cancelled) solve.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub records: Vec<StepRecord>,
    pub cancelled: bool,
    pub end_time: f64,
}

/// Newmark time integrator owning the structure it advances.
#[derive(Debug)]
pub struct NewmarkDirect<S: Structure> {
    structure: S,
    config: NewmarkConfig,
}

impl<S: Structure> NewmarkDirect<S> {
    pub fn new(structure: S, config: NewmarkConfig) -> Self {
        Self { structure, config }
    }

    pub fn structure(&self) -> &S {
        &self.structure
    }

    pub fn structure_mut(&mut self) -> &mut S {
        &mut self.structure
    }

    pub fn into_structure(self) -> S {
        self.structure
    }

    /// Advance the structure from its current state to `final_time`.
    ///
    /// # Errors
    /// [`SolverError::InitialStateNotInEquilibrium`] when the state at the
    /// start time violates the residual tolerance,
    /// [`SolverError::NoConvergence`] when step cutting reaches the
    /// minimum time step, and any assembly or factorization failure.
    pub fn solve(&mut self, final_time: f64) -> Result<SolveReport> {
        self.solve_with_cancel(final_time, || false)
    }

    /// Like [`Self::solve`], polling `cancel` once per accepted step and
    /// returning early with `cancelled = true` when it fires.
    pub fn solve_with_cancel(
        &mut self,
        final_time: f64,
        mut cancel: impl FnMut() -> bool,
    ) -> Result<SolveReport> {
        self.config.validate()?;
        if final_time <= 0.0 {
            return Err(SolverError::InvalidConfig(
                "final time must be positive".into(),
            ));
        }
        let orders = self.structure.num_time_derivatives();
        if self.config.mu_damping_mass != 0.0 && orders < 2 {
            return Err(SolverError::InvalidConfig(
                "mass-proportional damping needs a structure with two time derivatives".into(),
            ));
        }
        let tolerance = self.tolerance();
        let min_timestep = self
            .config
            .min_timestep
            .unwrap_or(self.config.timestep * 0.5_f64.powi(6));

        let mut time = TimeControl::new(self.config.timestep);
        time.set_max_timestep(self.config.max_timestep);
        time.set_min_timestep(min_timestep);

        self.prepare_initial_state(orders, &tolerance)?;

        let mut last = self.snapshot(orders);
        let mut external_prev = self.structure.external_load(0.0);
        let mut internal_prev = self.structure.gradient()?;
        let mut velocity_prev = if orders >= 1 {
            self.structure.dof_values(1).clone()
        } else {
            BlockVector::zeros(self.structure.dof_status())
        };
        let mut external_work = 0.0;
        let mut internal_energy = 0.0;
        let mut damped_energy = 0.0;
        let mut records = Vec::new();
        let mut cancelled = false;

        while time.current_time() < final_time - 1e-12 * final_time {
            if time.current_time() + time.timestep() > final_time {
                time.set_timestep(final_time - time.current_time());
            }
            let previous_time = time.current_time();
            time.proceed();
            let current_time = time.current_time();
            self.structure.set_time(current_time);

            // move the dependent dofs by the change of the constraint rhs
            let delta_brhs = {
                let status = self.structure.dof_status();
                let cmat = self.structure.constraints();
                &cmat.rhs_at(current_time, status) - &cmat.rhs_at(previous_time, status)
            };
            let mut dof0 = last.dof0.clone();
            dof0.k += &delta_brhs;
            self.structure.set_dof_values(0, dof0);

            let coefficients = (orders >= 1).then(|| {
                NewmarkCoefficients::new(self.config.beta, self.config.gamma, time.timestep())
            });

            let groups: Vec<Vec<DofType>> = if self.config.staggered_groups.is_empty() {
                vec![self.structure.dof_status().dof_types().collect()]
            } else {
                self.config.staggered_groups.clone()
            };

            let mut converged = true;
            let mut iterations = 0;
            let mut residual_norm = BlockScalar::empty();
            for group in &groups {
                self.structure.dof_status_mut().set_active_types(group);
                let outcome = equilibrium::find_equilibrium(
                    &mut self.structure,
                    current_time,
                    coefficients.as_ref(),
                    &last,
                    &self.config,
                    &tolerance,
                )?;
                iterations = iterations.max(outcome.iterations);
                residual_norm = outcome.residual_norm;
                if !outcome.converged {
                    converged = false;
                    break;
                }
            }
            self.structure.dof_status_mut().activate_all();

            if !converged {
                warn!(
                    time = current_time,
                    timestep = time.timestep(),
                    "no convergence"
                );
                self.restore(orders, &last);
                if !self.config.automatic_timestepping {
                    return Err(SolverError::NoConvergence {
                        time: current_time,
                        timestep: time.timestep(),
                        min_timestep,
                    });
                }
                // reduce the time step and start the step from scratch
                time.restore_previous_time();
                time.scale_timestep(0.5);
                if time.timestep() < min_timestep {
                    return Err(SolverError::NoConvergence {
                        time: time.current_time(),
                        timestep: time.timestep(),
                        min_timestep,
                    });
                }
                continue;
            }

            self.structure.update_static_data()?;

            let previous_dof0 = last.dof0.clone();
            last = self.snapshot(orders);

            let external = self.structure.external_load(current_time);
            let delta_u = &last.dof0 - &previous_dof0;
            external_work += 0.5 * (&external + &external_prev).dot(&delta_u);
            external_prev = external;

            let internal = self.structure.gradient()?;
            internal_energy += 0.5 * (&internal + &internal_prev).dot(&delta_u);
            internal_prev = internal;

            let mut kinetic_energy = 0.0;
            if orders >= 1 {
                let mut damping = self.structure.hessian(1)?;
                let status = self.structure.dof_status();
                let velocity = self.structure.dof_values(1);
                if orders >= 2 {
                    let mass = self.structure.hessian(2)?;
                    kinetic_energy = 0.5 * velocity.dot(&mass.mul_vector(velocity, status));
                    if self.config.mu_damping_mass != 0.0 {
                        damping.add_scaled(&mass, self.config.mu_damping_mass);
                    }
                }
                let mid_velocity = &(velocity + &velocity_prev) * 0.5;
                damped_energy += delta_u.dot(&damping.mul_vector(&mid_velocity, status));
                velocity_prev = velocity.clone();
            }

            let reactions = equilibrium::compute_residual(
                &self.structure,
                current_time,
                self.config.mu_damping_mass,
            )?
            .k;

            debug!(
                time = current_time,
                iterations,
                norm = %residual_norm,
                "time step accepted"
            );
            records.push(StepRecord {
                time: current_time,
                iterations,
                residual_norm,
                dof_values: last.dof0.clone(),
                reactions,
                internal_energy,
                kinetic_energy,
                damped_energy,
                external_work,
            });

            if self.config.automatic_timestepping
                && grows_timestep(iterations, self.config.max_iterations)
            {
                time.scale_timestep(1.5);
            }
            if cancel() {
                cancelled = true;
                break;
            }
        }

        info!(
            end_time = time.current_time(),
            steps = records.len(),
            cancelled,
            "time integration finished"
        );
        Ok(SolveReport {
            records,
            cancelled,
            end_time: time.current_time(),
        })
    }

    fn tolerance(&self) -> BlockScalar {
        let mut tolerance =
            BlockScalar::uniform(self.structure.dof_status(), self.config.tolerance);
        for (dof, value) in &self.config.tolerances {
            tolerance.set(*dof, *value);
        }
        tolerance
    }

    /// Set the dependent dofs to their t = 0 constraint values, compute
    /// the initial rate (accelerations for second-order problems,
    /// velocities for first-order ones) and verify equilibrium.
    fn prepare_initial_state(&mut self, orders: usize, tolerance: &BlockScalar) -> Result<()> {
        self.structure.set_time(0.0);
        let mut dof0 = self.structure.dof_values(0).clone();
        {
            let status = self.structure.dof_status();
            let cmat = self.structure.constraints();
            // dof_K = -C * dof_J + rhs(0)
            let mut k = DofVector::dependent_zeros(status);
            for dof in cmat.dof_types().collect::<Vec<_>>() {
                if let (Some(j_block), Some(k_block)) = (dof0.j.block(dof), k.block_mut(dof)) {
                    let coupled = cmat.mul(dof, j_block);
                    if coupled.len() == k_block.len() {
                        k_block.copy_from(&(-coupled));
                    }
                }
            }
            let rhs = cmat.rhs_at(0.0, status);
            k += &rhs;
            dof0.k = k;
        }
        self.structure.set_dof_values(0, dof0);

        let cmat = self.structure.constraints().clone();
        match orders {
            0 => {}
            1 => self.solve_initial_rate(1, &cmat)?,
            _ => self.solve_initial_rate(2, &cmat)?,
        }

        let residual =
            equilibrium::compute_residual(&self.structure, 0.0, self.config.mu_damping_mass)?;
        let norm = {
            let projected = residual.apply_cmatrix(&cmat);
            projected.inf_norm(self.structure.dof_status())
        };
        if !norm.is_below(tolerance) {
            return Err(SolverError::InitialStateNotInEquilibrium {
                residual: norm.to_string(),
            });
        }
        Ok(())
    }

    /// Balance the residual at t = 0 through the rate of the given
    /// derivative order: `hessian(order) * rate = -r`. Only dof types
    /// whose diagonal operator block carries entries take part; a
    /// temperature field without capacity, for example, keeps a zero
    /// rate instead of making the solve singular.
    fn solve_initial_rate(&mut self, order: usize, cmat: &ConstraintMatrix) -> Result<()> {
        let residual =
            equilibrium::compute_residual(&self.structure, 0.0, self.config.mu_damping_mass)?;
        let rhs_j = residual.apply_cmatrix(cmat);
        let mut operator = self.structure.hessian(order)?;
        operator.apply_cmatrix(cmat);

        let rate_types: Vec<DofType> = self
            .structure
            .dof_status()
            .dof_types()
            .filter(|dof| {
                operator
                    .jj
                    .block(*dof, *dof)
                    .is_some_and(|block| block.nnz() > 0)
            })
            .collect();
        if rate_types.is_empty() {
            return Ok(());
        }

        self.structure.dof_status_mut().set_active_types(&rate_types);
        let solution = {
            let status = self.structure.dof_status();
            let dense = operator.jj_dense_active(status);
            let flat = rhs_j.flatten_active(status);
            dense.lu().solve(&(-&flat))
        };
        let mut rate = self.structure.dof_values(order).clone();
        if let Some(flat) = &solution {
            let status = self.structure.dof_status();
            rate.j.overwrite_active(status, flat);
        }
        self.structure.dof_status_mut().activate_all();
        if solution.is_none() {
            return Err(SolverError::SingularSystem { time: 0.0 });
        }

        for dof in cmat.dof_types().collect::<Vec<_>>() {
            if cmat.num_entries(dof) > 0 {
                if let (Some(j_block), Some(k_block)) =
                    (rate.j.block(dof).cloned(), rate.k.block_mut(dof))
                {
                    k_block.copy_from(&(-cmat.mul(dof, &j_block)));
                }
            }
        }
        self.structure.set_dof_values(order, rate);
        Ok(())
    }

    fn snapshot(&self, orders: usize) -> LastConverged {
        let zeros = BlockVector::zeros(self.structure.dof_status());
        LastConverged {
            dof0: self.structure.dof_values(0).clone(),
            dof1: if orders >= 1 {
                self.structure.dof_values(1).clone()
            } else {
                zeros.clone()
            },
            dof2: if orders >= 2 {
                self.structure.dof_values(2).clone()
            } else {
                zeros
            },
        }
    }

    fn restore(&mut self, orders: usize, last: &LastConverged) {
        self.structure.set_dof_values(0, last.dof0.clone());
        if orders >= 1 {
            self.structure.set_dof_values(1, last.dof1.clone());
        }
        if orders >= 2 {
            self.structure.set_dof_values(2, last.dof2.clone());
        }
    }
}

/// Quick convergence grows the step: strictly under a quarter of the
/// iteration budget.
fn grows_timestep(iterations: usize, max_iterations: usize) -> bool {
    (iterations as f64) < 0.25 * max_iterations as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_threshold_is_a_quarter_of_the_budget() {
        assert!(grows_timestep(0, 4));
        assert!(!grows_timestep(1, 4));
        // a budget that is not a multiple of four still rounds up
        assert!(grows_timestep(2, 10));
        assert!(!grows_timestep(3, 10));
        assert!(grows_timestep(4, 20));
        assert!(!grows_timestep(5, 20));
    }

    #[test]
    fn validation_rejects_empty_staggered_groups() {
        let mut config = NewmarkConfig::average_acceleration(0.1);
        config.staggered_groups = vec![vec![DofType::Displacements], Vec::new()];
        assert!(config.validate().is_err());
    }
}
