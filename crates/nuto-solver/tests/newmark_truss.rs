//! End-to-end time integration on small truss models.

use approx::assert_relative_eq;
use nuto_constitutive::{
    AdditiveInputExplicitBuilder, AdditiveOutputBuilder, ConstantEigenstrain, InputTag, Law,
    LinearElastic, MisesPlasticity, MoistureShrinkage,
};
use nuto_model::{BlockVector, DofType, TimeTable};
use nuto_solver::{
    NewmarkConfig, NewmarkDirect, SolverError, Structure, ThermalField, TrussBuilder,
};

fn elastic() -> Law {
    Law::LinearElastic(LinearElastic::new(100.0, 0.0))
}

#[test]
fn static_bar_under_ramped_end_load() {
    // two elements, left end fixed, force ramped at the right end
    let truss = TrussBuilder::new(vec![0.0, 0.5, 1.0], 2.0, elastic())
        .constrain_node(0, TimeTable::constant(0.0))
        .add_load(2, TimeTable::ramp(0.0, 0.0, 1.0, 10.0))
        .build()
        .unwrap();

    let mut solver = NewmarkDirect::new(truss, NewmarkConfig::average_acceleration(0.25));
    let report = solver.solve(1.0).unwrap();

    assert_eq!(report.records.len(), 4);
    assert_relative_eq!(report.end_time, 1.0, max_relative = 1e-12);
    // u = F L / (E A)
    let truss = solver.into_structure();
    assert_relative_eq!(truss.displacement(2), 10.0 / 200.0, max_relative = 1e-8);
    assert_relative_eq!(truss.displacement(1), 10.0 / 400.0, max_relative = 1e-8);
}

#[test]
fn prescribed_displacement_produces_reactions() {
    let truss = TrussBuilder::new(vec![0.0, 1.0], 2.0, elastic())
        .constrain_node(0, TimeTable::constant(0.0))
        .constrain_node(1, TimeTable::ramp(0.0, 0.0, 1.0, 0.01))
        .build()
        .unwrap();

    let mut solver = NewmarkDirect::new(truss, NewmarkConfig::average_acceleration(0.5));
    let report = solver.solve(1.0).unwrap();

    let last = report.records.last().unwrap();
    let reactions = last.reactions.block(DofType::Displacements).unwrap();
    // sigma = E u / L = 1.0, reaction = -+ A sigma
    assert_relative_eq!(reactions[0], -2.0, max_relative = 1e-8);
    assert_relative_eq!(reactions[1], 2.0, max_relative = 1e-8);
    // external work stays zero, no external loads are applied
    assert_relative_eq!(last.external_work, 0.0);
}

#[test]
fn tied_nodes_move_together() {
    // node 2 tied to node 1, so the second element stays unstrained
    let truss = TrussBuilder::new(vec![0.0, 1.0, 2.0], 1.0, elastic())
        .constrain_node(0, TimeTable::constant(0.0))
        .tie_nodes(2, 1, 1.0)
        .add_load(1, TimeTable::ramp(0.0, 0.0, 1.0, 5.0))
        .build()
        .unwrap();

    let mut solver = NewmarkDirect::new(truss, NewmarkConfig::average_acceleration(0.25));
    solver.solve(1.0).unwrap();

    let truss = solver.into_structure();
    assert_relative_eq!(truss.displacement(1), 5.0 / 100.0, max_relative = 1e-8);
    assert_relative_eq!(truss.displacement(2), truss.displacement(1), max_relative = 1e-10);
}

#[test]
fn free_vibration_conserves_energy() {
    // single spring-mass: k = E A / L = 100, lumped mass at node 1 = 1
    let mut truss = TrussBuilder::new(
        vec![0.0, 1.0],
        1.0,
        Law::LinearElastic(LinearElastic::new(100.0, 0.0).with_density(2.0)),
    )
    .constrain_node(0, TimeTable::constant(0.0))
    .with_lumped_mass()
    .dynamic()
    .build()
    .unwrap();

    // release from a stretched state
    let u0 = 0.01;
    let mut values = BlockVector::zeros(truss.dof_status());
    values.j.block_mut(DofType::Displacements).unwrap()[0] = u0;
    truss.set_dof_values(0, values);

    let period = 2.0 * std::f64::consts::PI / 10.0;
    let mut config = NewmarkConfig::average_acceleration(period / 200.0);
    config.tolerance = 1e-9;
    let mut solver = NewmarkDirect::new(truss, config);
    let report = solver.solve(period).unwrap();

    let total = 0.5 * 100.0 * u0 * u0;
    for record in &report.records {
        let u = record.dof_values.j.block(DofType::Displacements).unwrap()[0];
        let strain_energy = 0.5 * 100.0 * u * u;
        assert_relative_eq!(
            strain_energy + record.kinetic_energy,
            total,
            max_relative = 1e-3
        );
    }
    // back at the initial amplitude after one period
    let truss = solver.into_structure();
    assert_relative_eq!(truss.displacement(1), u0, max_relative = 1e-2);
}

#[test]
fn staggered_solution_matches_monolithic_for_uncoupled_fields() {
    let build = || {
        TrussBuilder::new(vec![0.0, 1.0, 2.0], 1.0, elastic())
            .constrain_node(0, TimeTable::constant(0.0))
            .add_load(2, TimeTable::ramp(0.0, 0.0, 1.0, 4.0))
            .with_thermal_field(ThermalField {
                conductivity: 1.0,
                capacity: 0.0,
                constraints: vec![
                    (0, TimeTable::constant(0.0)),
                    (2, TimeTable::ramp(0.0, 0.0, 1.0, 10.0)),
                ],
            })
            .build()
            .unwrap()
    };

    let mut monolithic = NewmarkDirect::new(build(), NewmarkConfig::average_acceleration(0.25));
    monolithic.solve(1.0).unwrap();

    let mut config = NewmarkConfig::average_acceleration(0.25);
    config.staggered_groups = vec![
        vec![DofType::Displacements],
        vec![DofType::Temperature],
    ];
    let mut staggered = NewmarkDirect::new(build(), config);
    staggered.solve(1.0).unwrap();

    let a = monolithic.into_structure();
    let b = staggered.into_structure();
    for node in 0..3 {
        assert_relative_eq!(a.displacement(node), b.displacement(node), epsilon = 1e-10);
        assert_relative_eq!(
            a.nodal_value(DofType::Temperature, node, 0),
            b.nodal_value(DofType::Temperature, node, 0),
            epsilon = 1e-10
        );
    }
    // interior temperature interpolates the prescribed ends
    assert_relative_eq!(a.nodal_value(DofType::Temperature, 1, 0), 5.0, epsilon = 1e-8);
}

#[test]
fn additive_output_matches_the_summed_modulus() {
    let composite = AdditiveOutputBuilder::new()
        .add_law(Law::LinearElastic(LinearElastic::new(60.0, 0.0)))
        .add_law(Law::LinearElastic(LinearElastic::new(40.0, 0.0)))
        .build()
        .unwrap();

    let solve_tip = |law: Law| {
        let truss = TrussBuilder::new(vec![0.0, 1.0], 1.0, law)
            .constrain_node(0, TimeTable::constant(0.0))
            .add_load(1, TimeTable::ramp(0.0, 0.0, 1.0, 5.0))
            .build()
            .unwrap();
        let mut solver = NewmarkDirect::new(truss, NewmarkConfig::average_acceleration(0.5));
        solver.solve(1.0).unwrap();
        solver.into_structure().displacement(1)
    };

    let tip_composite = solve_tip(composite);
    let tip_reference = solve_tip(elastic());
    assert_relative_eq!(tip_composite, tip_reference, max_relative = 1e-10);
}

#[test]
fn eigenstrain_expands_the_bar_stress_free() {
    let law = AdditiveInputExplicitBuilder::new()
        .output_law(elastic())
        .add_modifier(
            Law::ConstantEigenstrain(ConstantEigenstrain::new(vec![2e-3])),
            InputTag::EngineeringStrain,
        )
        .build()
        .unwrap();

    let mut truss = TrussBuilder::new(vec![0.0, 1.0, 2.0], 1.0, law)
        .constrain_node(0, TimeTable::constant(0.0))
        .build()
        .unwrap();
    // the eigenstrain acts from t = 0, so start from the expanded state
    let mut values = BlockVector::zeros(truss.dof_status());
    let block = values.j.block_mut(DofType::Displacements).unwrap();
    block[0] = 2e-3;
    block[1] = 4e-3;
    truss.set_dof_values(0, values);

    let mut solver = NewmarkDirect::new(truss, NewmarkConfig::average_acceleration(0.5));
    let report = solver.solve(1.0).unwrap();

    // free expansion: tip displacement = eps0 * L, no reactions
    let truss = solver.into_structure();
    assert_relative_eq!(truss.displacement(2), 4e-3, epsilon = 1e-9);
    let reactions = report.records.last().unwrap().reactions
        .block(DofType::Displacements)
        .unwrap()
        .clone();
    assert_relative_eq!(reactions[0], 0.0, epsilon = 1e-7);
}

#[test]
fn shrinkage_follows_the_ambient_humidity() {
    let law = AdditiveInputExplicitBuilder::new()
        .output_law(elastic())
        .add_modifier(
            Law::MoistureShrinkage(MoistureShrinkage::new(-2e-3)),
            InputTag::EngineeringStrain,
        )
        .build()
        .unwrap();

    let truss = TrussBuilder::new(vec![0.0, 1.0], 1.0, law)
        .constrain_node(0, TimeTable::constant(0.0))
        .with_ambient_humidity(TimeTable::ramp(0.0, 0.0, 1.0, 0.8))
        .build()
        .unwrap();
    let mut solver = NewmarkDirect::new(truss, NewmarkConfig::average_acceleration(0.25));
    solver.solve(1.0).unwrap();

    // eps = coefficient * rh
    let truss = solver.into_structure();
    assert_relative_eq!(truss.displacement(1), -2e-3 * 0.8, epsilon = 1e-9);
}

#[test]
fn plastic_bar_hardens_and_unloads_elastically() {
    let law = Law::MisesPlasticity(
        MisesPlasticity::new(1000.0, 0.3, 1.0).with_isotropic_hardening(100.0),
    );
    // strain ramped to 0.01, then partially reversed
    let truss = TrussBuilder::new(vec![0.0, 1.0], 1.0, law)
        .constrain_node(0, TimeTable::constant(0.0))
        .constrain_node(
            1,
            TimeTable::from_points(vec![(0.0, 0.0), (1.0, 0.01), (2.0, 0.008)]).unwrap(),
        )
        .build()
        .unwrap();

    let mut config = NewmarkConfig::average_acceleration(0.1);
    config.tolerance = 1e-9;
    let mut solver = NewmarkDirect::new(truss, config);
    let report = solver.solve(2.0).unwrap();

    // loading branch: sigma = sigma_y + E H / (E + H) * (eps - eps_y)
    let peak = report
        .records
        .iter()
        .find(|r| (r.time - 1.0).abs() < 1e-9)
        .unwrap();
    let sigma_peak = 1.0 + 1000.0 * 100.0 / 1100.0 * (0.01 - 0.001);
    let reactions = peak.reactions.block(DofType::Displacements).unwrap();
    assert_relative_eq!(reactions[1], sigma_peak, max_relative = 1e-6);

    // unloading is elastic
    let last = report.records.last().unwrap();
    let reactions = last.reactions.block(DofType::Displacements).unwrap();
    assert_relative_eq!(
        reactions[1],
        sigma_peak - 1000.0 * 0.002,
        max_relative = 1e-6
    );
}

#[test]
fn non_convergence_is_fatal_without_automatic_stepping() {
    let law = Law::MisesPlasticity(
        MisesPlasticity::new(1000.0, 0.3, 1.0).with_isotropic_hardening(10.0),
    );
    let truss = TrussBuilder::new(vec![0.0, 0.5, 1.0], 1.0, law)
        .constrain_node(0, TimeTable::constant(0.0))
        .constrain_node(2, TimeTable::ramp(0.0, 0.0, 1.0, 0.01))
        .build()
        .unwrap();

    // one iteration cannot resolve the elastic-plastic transition
    let mut config = NewmarkConfig::average_acceleration(1.0);
    config.max_iterations = 1;
    config.perform_line_search = false;
    let mut solver = NewmarkDirect::new(truss, config);
    assert!(matches!(
        solver.solve(1.0),
        Err(SolverError::NoConvergence { .. })
    ));
}

#[test]
fn step_halving_stops_at_the_minimum_timestep() {
    let law = Law::MisesPlasticity(
        MisesPlasticity::new(1000.0, 0.3, 1.0).with_isotropic_hardening(10.0),
    );
    let truss = TrussBuilder::new(vec![0.0, 0.5, 1.0], 1.0, law)
        .constrain_node(0, TimeTable::constant(0.0))
        .constrain_node(2, TimeTable::ramp(0.0, 0.0, 1.0, 1.0))
        .build()
        .unwrap();

    // every step crosses further into the plastic branch, which a single
    // iteration cannot resolve, so the controller halves down to the limit
    let mut config = NewmarkConfig::average_acceleration(0.5);
    config.max_iterations = 1;
    config.perform_line_search = false;
    config.automatic_timestepping = true;
    let mut solver = NewmarkDirect::new(truss, config);
    let result = solver.solve(1.0);
    assert!(matches!(result, Err(SolverError::NoConvergence { .. })));
}

#[test]
fn automatic_timestepping_grows_quickly_converging_steps() {
    let truss = TrussBuilder::new(vec![0.0, 1.0], 1.0, elastic())
        .constrain_node(0, TimeTable::constant(0.0))
        .add_load(1, TimeTable::ramp(0.0, 0.0, 4.0, 1.0))
        .build()
        .unwrap();

    let mut config = NewmarkConfig::average_acceleration(0.1);
    config.automatic_timestepping = true;
    config.max_timestep = 0.4;
    let mut solver = NewmarkDirect::new(truss, config);
    let report = solver.solve(4.0).unwrap();

    let dt0 = report.records[0].time;
    let dt1 = report.records[1].time - report.records[0].time;
    assert_relative_eq!(dt0, 0.1, max_relative = 1e-12);
    assert_relative_eq!(dt1, 0.15, max_relative = 1e-12);
    // growth is capped at the maximum step
    let max_dt = report
        .records
        .windows(2)
        .map(|w| w[1].time - w[0].time)
        .fold(0.0_f64, f64::max);
    assert!(max_dt <= 0.4 + 1e-12);
}

#[test]
fn cancellation_stops_after_the_polled_step() {
    let truss = TrussBuilder::new(vec![0.0, 1.0], 1.0, elastic())
        .constrain_node(0, TimeTable::constant(0.0))
        .add_load(1, TimeTable::ramp(0.0, 0.0, 1.0, 1.0))
        .build()
        .unwrap();

    let mut solver = NewmarkDirect::new(truss, NewmarkConfig::average_acceleration(0.25));
    let report = solver.solve_with_cancel(1.0, || true).unwrap();
    assert!(report.cancelled);
    assert_eq!(report.records.len(), 1);
    assert_relative_eq!(report.end_time, 0.25, max_relative = 1e-12);
}

#[test]
fn initial_state_must_be_in_equilibrium() {
    // constant load is already nonzero at t = 0
    let truss = TrussBuilder::new(vec![0.0, 1.0], 1.0, elastic())
        .constrain_node(0, TimeTable::constant(0.0))
        .add_load(1, TimeTable::constant(5.0))
        .build()
        .unwrap();

    let mut solver = NewmarkDirect::new(truss, NewmarkConfig::average_acceleration(0.25));
    assert!(matches!(
        solver.solve(1.0),
        Err(SolverError::InitialStateNotInEquilibrium { .. })
    ));
}

#[test]
fn external_work_follows_the_trapezoidal_rule() {
    let truss = TrussBuilder::new(vec![0.0, 1.0], 1.0, elastic())
        .constrain_node(0, TimeTable::constant(0.0))
        .add_load(1, TimeTable::ramp(0.0, 0.0, 1.0, 10.0))
        .build()
        .unwrap();

    let mut solver = NewmarkDirect::new(truss, NewmarkConfig::average_acceleration(0.125));
    let report = solver.solve(1.0).unwrap();

    // quasi-static ramp: W = F u / 2 at the end, all of it stored
    let u = 10.0 / 100.0;
    let last = report.records.last().unwrap();
    assert_relative_eq!(last.external_work, 0.5 * 10.0 * u, max_relative = 1e-6);
    assert_relative_eq!(last.internal_energy, 0.5 * 10.0 * u, max_relative = 1e-6);
}

#[test]
fn dynamic_solve_handles_massless_temperature_dofs() {
    // the temperature dofs carry neither mass nor capacity; the initial
    // accelerations are solved on the displacement block alone
    let truss = TrussBuilder::new(
        vec![0.0, 1.0, 2.0],
        1.0,
        Law::LinearElastic(LinearElastic::new(100.0, 0.0).with_density(2.0)),
    )
    .constrain_node(0, TimeTable::constant(0.0))
    .with_thermal_field(ThermalField {
        conductivity: 1.0,
        capacity: 0.0,
        constraints: vec![
            (0, TimeTable::constant(0.0)),
            (2, TimeTable::ramp(0.0, 0.0, 1.0, 10.0)),
        ],
    })
    .with_lumped_mass()
    .dynamic()
    .build()
    .unwrap();

    let mut solver = NewmarkDirect::new(truss, NewmarkConfig::average_acceleration(0.05));
    let report = solver.solve(0.2).unwrap();
    assert_eq!(report.records.len(), 4);

    let truss = solver.into_structure();
    // steady conduction follows the ramped end temperature
    assert_relative_eq!(truss.nodal_value(DofType::Temperature, 2, 0), 2.0, epsilon = 1e-8);
    assert_relative_eq!(truss.nodal_value(DofType::Temperature, 1, 0), 1.0, epsilon = 1e-8);
    // nothing pushes the bar, it stays at rest
    assert_relative_eq!(truss.displacement(1), 0.0, epsilon = 1e-10);
}

#[test]
fn mass_damping_dissipates_the_vibration_energy() {
    // spring-mass as in the free vibration, mu = 1 gives 5% of critical
    let mut truss = TrussBuilder::new(
        vec![0.0, 1.0],
        1.0,
        Law::LinearElastic(LinearElastic::new(100.0, 0.0).with_density(2.0)),
    )
    .constrain_node(0, TimeTable::constant(0.0))
    .with_lumped_mass()
    .dynamic()
    .build()
    .unwrap();

    let u0 = 0.01;
    let mut values = BlockVector::zeros(truss.dof_status());
    values.j.block_mut(DofType::Displacements).unwrap()[0] = u0;
    truss.set_dof_values(0, values);

    let period = 2.0 * std::f64::consts::PI / 10.0;
    let mut config = NewmarkConfig::average_acceleration(period / 200.0);
    config.tolerance = 1e-9;
    config.mu_damping_mass = 1.0;
    let mut solver = NewmarkDirect::new(truss, config);
    let report = solver.solve(period).unwrap();

    // no external load: what leaves the strain and kinetic energy went
    // into the damper, step by step
    for record in &report.records {
        assert_relative_eq!(
            record.internal_energy + record.kinetic_energy + record.damped_energy,
            0.0,
            epsilon = 1e-8
        );
    }
    // exp(-2 zeta omega T) of the initial energy survives one period
    let total = 0.5 * 100.0 * u0 * u0;
    let dissipated = report.records.last().unwrap().damped_energy;
    assert!(dissipated > 0.4 * total, "dissipated {dissipated}");
    assert!(dissipated < 0.55 * total, "dissipated {dissipated}");
}

#[test]
fn mass_damping_requires_a_dynamic_structure() {
    let truss = TrussBuilder::new(vec![0.0, 1.0], 1.0, elastic())
        .constrain_node(0, TimeTable::constant(0.0))
        .add_load(1, TimeTable::ramp(0.0, 0.0, 1.0, 1.0))
        .build()
        .unwrap();

    let mut config = NewmarkConfig::average_acceleration(0.25);
    config.mu_damping_mass = 0.5;
    let mut solver = NewmarkDirect::new(truss, config);
    assert!(matches!(
        solver.solve(1.0),
        Err(SolverError::InvalidConfig(_))
    ));
}

#[test]
fn transient_conduction_relaxes_exponentially() {
    // lumped capacity 1 at the free node, conductance 1: dT/dt = -T
    let mut truss = TrussBuilder::new(vec![0.0, 1.0], 1.0, elastic())
        .constrain_node(0, TimeTable::constant(0.0))
        .with_thermal_field(ThermalField {
            conductivity: 1.0,
            capacity: 2.0,
            constraints: vec![(0, TimeTable::constant(0.0))],
        })
        .transient()
        .build()
        .unwrap();

    let mut values = BlockVector::zeros(truss.dof_status());
    values.j.block_mut(DofType::Temperature).unwrap()[0] = 1.0;
    truss.set_dof_values(0, values);

    let mut config = NewmarkConfig::average_acceleration(0.025);
    config.tolerance = 1e-10;
    let mut solver = NewmarkDirect::new(truss, config);
    solver.solve(0.5).unwrap();

    let truss = solver.into_structure();
    assert_relative_eq!(
        truss.nodal_value(DofType::Temperature, 1, 0),
        (-0.5_f64).exp(),
        max_relative = 1e-3
    );
}
