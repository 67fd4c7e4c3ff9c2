//! One-dimensional truss discretization.
//!
//! Nodes carry a displacement dof and, optionally, a temperature dof.
//! Elements are two-node bars with a single integration point; the
//! mechanical response comes from the attached constitutive law, the
//! thermal field is linear conduction with an optional lumped heat
//! capacity. Dirichlet values and nodal loads
//! follow piecewise-linear time tables, so prescribed dofs enter the
//! dependent (K) partition with a zero constraint row and a time-
//! dependent right-hand side. Tie constraints couple a dependent node to
//! an active master node through an actual constraint-matrix entry.

use crate::error::{Result, SolverError};
use crate::structure::Structure;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use nuto_constitutive::{Dimension, InputMap, InputTag, Law, OutputMap, OutputTag, StaticData};
use nuto_model::{BlockMatrix, BlockVector, ConstraintMatrix, DofStatus, DofType, TimeTable};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Position of one nodal dof in the J/K partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DofIndex {
    Active(usize),
    Dependent(usize),
}

/// Linear heat conduction along the truss.
#[derive(Debug, Clone)]
pub struct ThermalField {
    /// Conductivity per cross-section area.
    pub conductivity: f64,
    /// Volumetric heat capacity; zero for steady conduction.
    pub capacity: f64,
    /// Prescribed nodal temperatures.
    pub constraints: Vec<(usize, TimeTable)>,
}

/// Builder for [`TrussStructure`].
#[derive(Debug)]
pub struct TrussBuilder {
    coordinates: Vec<f64>,
    cross_section: f64,
    law: Law,
    displacement_constraints: Vec<(usize, TimeTable)>,
    tie_constraints: Vec<(usize, usize, f64)>,
    loads: Vec<(usize, TimeTable)>,
    thermal: Option<ThermalField>,
    ambient_humidity: Option<TimeTable>,
    lumped_mass: bool,
    num_time_derivatives: usize,
}

impl TrussBuilder {
    /// Truss along the given node coordinates with a uniform cross
    /// section and one law shared by all elements.
    pub fn new(coordinates: Vec<f64>, cross_section: f64, law: Law) -> Self {
        Self {
            coordinates,
            cross_section,
            law,
            displacement_constraints: Vec::new(),
            tie_constraints: Vec::new(),
            loads: Vec::new(),
            thermal: None,
            ambient_humidity: None,
            lumped_mass: false,
            num_time_derivatives: 0,
        }
    }

    /// Prescribe the displacement of a node over time.
    pub fn constrain_node(mut self, node: usize, value: TimeTable) -> Self {
        self.displacement_constraints.push((node, value));
        self
    }

    /// Tie the displacement of `slave` to `factor` times the one of
    /// `master`, `u_slave = factor * u_master`. The master node must
    /// stay active.
    pub fn tie_nodes(mut self, slave: usize, master: usize, factor: f64) -> Self {
        self.tie_constraints.push((slave, master, factor));
        self
    }

    /// Apply a nodal force following a time table.
    pub fn add_load(mut self, node: usize, force: TimeTable) -> Self {
        self.loads.push((node, force));
        self
    }

    /// Add a temperature dof per node with linear conduction.
    pub fn with_thermal_field(mut self, field: ThermalField) -> Self {
        self.thermal = Some(field);
        self
    }

    /// Feed a time-dependent relative humidity into the law.
    pub fn with_ambient_humidity(mut self, humidity: TimeTable) -> Self {
        self.ambient_humidity = Some(humidity);
        self
    }

    /// Use a lumped (row-sum) mass matrix instead of the consistent one.
    pub fn with_lumped_mass(mut self) -> Self {
        self.lumped_mass = true;
        self
    }

    /// Carry velocities and accelerations for dynamic analyses.
    pub fn dynamic(mut self) -> Self {
        self.num_time_derivatives = 2;
        self
    }

    /// Carry a single time derivative for first-order transient
    /// analyses, e.g. conduction with heat capacity.
    pub fn transient(mut self) -> Self {
        self.num_time_derivatives = self.num_time_derivatives.max(1);
        self
    }

    /// Number the dofs, build the constraint matrix and allocate the
    /// dof-value and static-data storage.
    ///
    /// # Errors
    /// [`SolverError::InvalidConfig`] for out-of-range node indices,
    /// doubly constrained nodes, a tie with a constrained master, a law
    /// without a displacement stiffness block, or a law that needs an
    /// input the truss cannot supply.
    pub fn build(self) -> Result<TrussStructure> {
        let num_nodes = self.coordinates.len();
        if num_nodes < 2 {
            return Err(SolverError::InvalidConfig(
                "a truss needs at least two nodes".into(),
            ));
        }

        // negotiate with the law up front: it must provide the
        // displacement stiffness block, and every input it asks for must
        // have a source here
        if !self.law.is_dof_combination_computable(
            DofType::Displacements,
            DofType::Displacements,
            0,
        ) {
            return Err(SolverError::InvalidConfig(
                "law cannot compute a displacement stiffness block".into(),
            ));
        }
        let mut requested = OutputMap::new();
        requested.request(OutputTag::EngineeringStress, Dimension::D1);
        requested.request(OutputTag::DStressDStrain, Dimension::D1);
        let required_inputs = self.law.required_inputs(&requested);
        if required_inputs.contains(&InputTag::RelativeHumidity) && self.ambient_humidity.is_none()
        {
            return Err(SolverError::InvalidConfig(
                "law needs a relative humidity input but no ambient humidity table is set".into(),
            ));
        }
        let check_node = |node: usize| -> Result<()> {
            if node >= num_nodes {
                return Err(SolverError::InvalidConfig(format!(
                    "node {node} out of range, {num_nodes} nodes"
                )));
            }
            Ok(())
        };
        for (node, _) in &self.displacement_constraints {
            check_node(*node)?;
        }
        for (slave, master, _) in &self.tie_constraints {
            check_node(*slave)?;
            check_node(*master)?;
        }
        for (node, _) in &self.loads {
            check_node(*node)?;
        }

        // dependent displacement dofs: prescribed nodes, then tie slaves
        let mut dependent: Vec<usize> = Vec::new();
        for (node, _) in &self.displacement_constraints {
            if dependent.contains(node) {
                return Err(SolverError::InvalidConfig(format!(
                    "node {node} is constrained twice"
                )));
            }
            dependent.push(*node);
        }
        for (slave, master, _) in &self.tie_constraints {
            if dependent.contains(slave) {
                return Err(SolverError::InvalidConfig(format!(
                    "node {slave} is constrained twice"
                )));
            }
            if dependent.contains(master) {
                return Err(SolverError::InvalidConfig(format!(
                    "tie master {master} must be an active node"
                )));
            }
            dependent.push(*slave);
        }

        let disp_numbering = number_dofs(num_nodes, &dependent);
        let num_active = num_nodes - dependent.len();

        let mut status = DofStatus::new();
        status.register(DofType::Displacements, num_active, dependent.len());

        let mut thermal_numbering = None;
        if let Some(field) = &self.thermal {
            let mut fixed: Vec<usize> = Vec::new();
            for (node, _) in &field.constraints {
                check_node(*node)?;
                if fixed.contains(node) {
                    return Err(SolverError::InvalidConfig(format!(
                        "temperature of node {node} is constrained twice"
                    )));
                }
                fixed.push(*node);
            }
            thermal_numbering = Some(number_dofs(num_nodes, &fixed));
            status.register(DofType::Temperature, num_nodes - fixed.len(), fixed.len());
        }

        let mut cmat = ConstraintMatrix::zeros(&status);
        let mut coo = CooMatrix::new(dependent.len(), num_active);
        for (slave, master, factor) in &self.tie_constraints {
            let DofIndex::Dependent(row) = disp_numbering[*slave] else {
                return Err(SolverError::InvalidConfig(format!(
                    "tie slave {slave} was not numbered dependent"
                )));
            };
            let DofIndex::Active(col) = disp_numbering[*master] else {
                return Err(SolverError::InvalidConfig(format!(
                    "tie master {master} must be an active node"
                )));
            };
            // dof_K = -C * dof_J + rhs, so the tie factor enters negated
            coo.push(row, col, -factor);
        }
        cmat.set_block(DofType::Displacements, CsrMatrix::from(&coo));
        for (node, table) in &self.displacement_constraints {
            if let DofIndex::Dependent(row) = disp_numbering[*node] {
                cmat.set_rhs_table(DofType::Displacements, row, table.clone());
            }
        }
        if let (Some(field), Some(numbering)) = (&self.thermal, &thermal_numbering) {
            for (node, table) in &field.constraints {
                if let DofIndex::Dependent(row) = numbering[*node] {
                    cmat.set_rhs_table(DofType::Temperature, row, table.clone());
                }
            }
        }

        let mut numbering = BTreeMap::new();
        numbering.insert(DofType::Displacements, disp_numbering);
        if let Some(thermal) = thermal_numbering {
            numbering.insert(DofType::Temperature, thermal);
        }

        let num_elements = num_nodes - 1;
        let static_data = (0..num_elements)
            .map(|_| self.law.allocate_static_data(Dimension::D1))
            .collect();
        let dof_values = (0..=self.num_time_derivatives)
            .map(|_| BlockVector::zeros(&status))
            .collect();

        Ok(TrussStructure {
            coordinates: self.coordinates,
            cross_section: self.cross_section,
            law: self.law,
            required_inputs,
            lumped_mass: self.lumped_mass,
            num_time_derivatives: self.num_time_derivatives,
            status,
            cmat,
            numbering,
            dof_values,
            static_data,
            loads: self.loads,
            thermal: self.thermal,
            ambient_humidity: self.ambient_humidity,
            time: 0.0,
        })
    }
}

fn number_dofs(num_nodes: usize, dependent: &[usize]) -> Vec<DofIndex> {
    let mut numbering = Vec::with_capacity(num_nodes);
    let mut next_active = 0;
    for node in 0..num_nodes {
        match dependent.iter().position(|d| *d == node) {
            Some(row) => numbering.push(DofIndex::Dependent(row)),
            None => {
                numbering.push(DofIndex::Active(next_active));
                next_active += 1;
            }
        }
    }
    numbering
}

/// Assembled truss, ready for the time integrator.
#[derive(Debug)]
pub struct TrussStructure {
    coordinates: Vec<f64>,
    cross_section: f64,
    law: Law,
    required_inputs: BTreeSet<InputTag>,
    lumped_mass: bool,
    num_time_derivatives: usize,
    status: DofStatus,
    cmat: ConstraintMatrix,
    numbering: BTreeMap<DofType, Vec<DofIndex>>,
    dof_values: Vec<BlockVector>,
    static_data: Vec<StaticData>,
    loads: Vec<(usize, TimeTable)>,
    thermal: Option<ThermalField>,
    ambient_humidity: Option<TimeTable>,
    time: f64,
}

impl TrussStructure {
    pub fn num_nodes(&self) -> usize {
        self.coordinates.len()
    }

    pub fn num_elements(&self) -> usize {
        self.coordinates.len() - 1
    }

    /// Nodal value of one dof type and derivative order, resolved
    /// through the J/K partition.
    pub fn nodal_value(&self, dof: DofType, node: usize, derivative: usize) -> f64 {
        let values = &self.dof_values[derivative];
        match self.numbering.get(&dof).map(|n| n[node]) {
            Some(DofIndex::Active(i)) => values.j.block(dof).map(|b| b[i]).unwrap_or(0.0),
            Some(DofIndex::Dependent(i)) => values.k.block(dof).map(|b| b[i]).unwrap_or(0.0),
            None => 0.0,
        }
    }

    /// Displacement of a node.
    pub fn displacement(&self, node: usize) -> f64 {
        self.nodal_value(DofType::Displacements, node, 0)
    }

    /// The attached law, for parameter access.
    pub fn law_mut(&mut self) -> &mut Law {
        &mut self.law
    }

    fn element_length(&self, element: usize) -> f64 {
        self.coordinates[element + 1] - self.coordinates[element]
    }

    fn element_strain(&self, element: usize) -> f64 {
        let d = DofType::Displacements;
        let u0 = self.nodal_value(d, element, 0);
        let u1 = self.nodal_value(d, element + 1, 0);
        (u1 - u0) / self.element_length(element)
    }

    /// Inputs for one element, restricted to what the law negotiated at
    /// build time.
    fn element_inputs(&self, element: usize) -> InputMap {
        let mut inputs = InputMap::new();
        inputs.insert_vector(
            InputTag::EngineeringStrain,
            DVector::from_element(1, self.element_strain(element)),
        );
        if self.required_inputs.contains(&InputTag::RelativeHumidity) {
            if let Some(humidity) = &self.ambient_humidity {
                inputs.insert_scalar(InputTag::RelativeHumidity, humidity.value_at(self.time));
            }
        }
        if self.required_inputs.contains(&InputTag::Time) {
            inputs.insert_scalar(InputTag::Time, self.time);
        }
        inputs
    }

    /// Evaluate the law of one element for the requested outputs.
    fn evaluate_element(&self, element: usize, outputs: &mut OutputMap) -> Result<StaticData> {
        let inputs = self.element_inputs(element);
        let data = self
            .law
            .evaluate(Dimension::D1, &inputs, outputs, &self.static_data[element])?;
        Ok(data)
    }

    fn scatter_vector(&self, dof: DofType, node: usize, value: f64, out: &mut BlockVector) {
        match self.numbering[&dof][node] {
            DofIndex::Active(i) => {
                if let Some(block) = out.j.block_mut(dof) {
                    block[i] += value;
                }
            }
            DofIndex::Dependent(i) => {
                if let Some(block) = out.k.block_mut(dof) {
                    block[i] += value;
                }
            }
        }
    }

    /// Assemble a symmetric 2x2 element matrix into the four quadrants
    /// of one dof-type block.
    fn scatter_matrix(
        &self,
        dof: DofType,
        element: usize,
        local: [[f64; 2]; 2],
        quadrants: &mut Quadrants,
    ) {
        let nodes = [element, element + 1];
        for (a, node_a) in nodes.iter().enumerate() {
            for (b, node_b) in nodes.iter().enumerate() {
                let value = local[a][b];
                if value == 0.0 {
                    continue;
                }
                match (self.numbering[&dof][*node_a], self.numbering[&dof][*node_b]) {
                    (DofIndex::Active(i), DofIndex::Active(j)) => quadrants.jj.push(i, j, value),
                    (DofIndex::Active(i), DofIndex::Dependent(j)) => quadrants.jk.push(i, j, value),
                    (DofIndex::Dependent(i), DofIndex::Active(j)) => quadrants.kj.push(i, j, value),
                    (DofIndex::Dependent(i), DofIndex::Dependent(j)) => {
                        quadrants.kk.push(i, j, value)
                    }
                }
            }
        }
    }

    fn stiffness(&self) -> Result<BlockMatrix> {
        let d = DofType::Displacements;
        // element tangents in parallel, scatter serially
        let tangents: Vec<f64> = (0..self.num_elements())
            .into_par_iter()
            .map(|element| {
                let mut outputs = OutputMap::new();
                outputs.request(OutputTag::DStressDStrain, Dimension::D1);
                self.evaluate_element(element, &mut outputs)?;
                let tangent = outputs
                    .slot(OutputTag::DStressDStrain)
                    .and_then(|slot| slot.calculated_matrix(OutputTag::DStressDStrain).ok())
                    .map(|m| m[(0, 0)])
                    .unwrap_or(0.0);
                Ok(tangent)
            })
            .collect::<Result<_>>()?;

        let mut quadrants = Quadrants::new(&self.status, d);
        for (element, tangent) in tangents.iter().enumerate() {
            let k = self.cross_section * tangent / self.element_length(element);
            self.scatter_matrix(d, element, [[k, -k], [-k, k]], &mut quadrants);
        }
        let mut matrix = BlockMatrix::new();
        quadrants.store(d, &mut matrix);

        if let Some(field) = &self.thermal {
            let t = DofType::Temperature;
            let mut quadrants = Quadrants::new(&self.status, t);
            for element in 0..self.num_elements() {
                let k = field.conductivity * self.cross_section / self.element_length(element);
                self.scatter_matrix(t, element, [[k, -k], [-k, k]], &mut quadrants);
            }
            quadrants.store(t, &mut matrix);
        }
        Ok(matrix)
    }

    /// Lumped heat-capacity matrix on the temperature block; empty
    /// without a thermal field or with zero capacity.
    fn capacity(&self) -> BlockMatrix {
        let mut matrix = BlockMatrix::new();
        if let Some(field) = &self.thermal {
            if field.capacity > 0.0 {
                let t = DofType::Temperature;
                let mut quadrants = Quadrants::new(&self.status, t);
                for element in 0..self.num_elements() {
                    let c = field.capacity * self.cross_section * self.element_length(element);
                    self.scatter_matrix(t, element, [[c / 2.0, 0.0], [0.0, c / 2.0]], &mut quadrants);
                }
                quadrants.store(t, &mut matrix);
            }
        }
        matrix
    }

    fn mass(&self) -> BlockMatrix {
        let d = DofType::Displacements;
        let density = self.law.density();
        let mut quadrants = Quadrants::new(&self.status, d);
        for element in 0..self.num_elements() {
            let m = density * self.cross_section * self.element_length(element);
            let local = if self.lumped_mass {
                [[m / 2.0, 0.0], [0.0, m / 2.0]]
            } else {
                [[m / 3.0, m / 6.0], [m / 6.0, m / 3.0]]
            };
            self.scatter_matrix(d, element, local, &mut quadrants);
        }
        let mut matrix = BlockMatrix::new();
        quadrants.store(d, &mut matrix);
        matrix
    }
}

/// COO scratch for the four quadrants of one dof-type block.
struct Quadrants {
    jj: CooMatrix<f64>,
    jk: CooMatrix<f64>,
    kj: CooMatrix<f64>,
    kk: CooMatrix<f64>,
}

impl Quadrants {
    fn new(status: &DofStatus, dof: DofType) -> Self {
        let nj = status.num_active(dof);
        let nk = status.num_dependent(dof);
        Self {
            jj: CooMatrix::new(nj, nj),
            jk: CooMatrix::new(nj, nk),
            kj: CooMatrix::new(nk, nj),
            kk: CooMatrix::new(nk, nk),
        }
    }

    fn store(self, dof: DofType, matrix: &mut BlockMatrix) {
        matrix.jj.set_block(dof, dof, CsrMatrix::from(&self.jj));
        matrix.jk.set_block(dof, dof, CsrMatrix::from(&self.jk));
        matrix.kj.set_block(dof, dof, CsrMatrix::from(&self.kj));
        matrix.kk.set_block(dof, dof, CsrMatrix::from(&self.kk));
    }
}

impl Structure for TrussStructure {
    fn dof_status(&self) -> &DofStatus {
        &self.status
    }

    fn dof_status_mut(&mut self) -> &mut DofStatus {
        &mut self.status
    }

    fn constraints(&self) -> &ConstraintMatrix {
        &self.cmat
    }

    fn num_time_derivatives(&self) -> usize {
        self.num_time_derivatives
    }

    fn dof_values(&self, derivative: usize) -> &BlockVector {
        &self.dof_values[derivative]
    }

    fn set_dof_values(&mut self, derivative: usize, values: BlockVector) {
        self.dof_values[derivative] = values;
    }

    fn set_time(&mut self, t: f64) {
        self.time = t;
    }

    fn gradient(&self) -> Result<BlockVector> {
        let d = DofType::Displacements;
        let forces: Vec<f64> = (0..self.num_elements())
            .into_par_iter()
            .map(|element| {
                let mut outputs = OutputMap::new();
                outputs.request(OutputTag::EngineeringStress, Dimension::D1);
                self.evaluate_element(element, &mut outputs)?;
                let stress = outputs
                    .slot(OutputTag::EngineeringStress)
                    .and_then(|slot| slot.calculated_vector(OutputTag::EngineeringStress).ok())
                    .map(|v| v[0])
                    .unwrap_or(0.0);
                Ok(stress * self.cross_section)
            })
            .collect::<Result<_>>()?;

        let mut gradient = BlockVector::zeros(&self.status);
        for (element, force) in forces.iter().enumerate() {
            self.scatter_vector(d, element, -force, &mut gradient);
            self.scatter_vector(d, element + 1, *force, &mut gradient);
        }

        if let Some(field) = &self.thermal {
            let t = DofType::Temperature;
            for element in 0..self.num_elements() {
                let k = field.conductivity * self.cross_section / self.element_length(element);
                let t0 = self.nodal_value(t, element, 0);
                let t1 = self.nodal_value(t, element + 1, 0);
                let flux = k * (t1 - t0);
                self.scatter_vector(t, element, -flux, &mut gradient);
                self.scatter_vector(t, element + 1, flux, &mut gradient);
            }
        }
        Ok(gradient)
    }

    fn hessian(&self, order: usize) -> Result<BlockMatrix> {
        match order {
            0 => self.stiffness(),
            1 => Ok(self.capacity()),
            2 => Ok(self.mass()),
            _ => Err(SolverError::InvalidConfig(format!(
                "hessian order {order} not supported"
            ))),
        }
    }

    fn external_load(&self, t: f64) -> BlockVector {
        let mut load = BlockVector::zeros(&self.status);
        for (node, table) in &self.loads {
            self.scatter_vector(DofType::Displacements, *node, table.value_at(t), &mut load);
        }
        load
    }

    fn update_static_data(&mut self) -> Result<()> {
        let new_data: Vec<StaticData> = (0..self.num_elements())
            .into_par_iter()
            .map(|element| {
                let mut outputs = OutputMap::new();
                outputs.request(OutputTag::EngineeringStress, Dimension::D1);
                self.evaluate_element(element, &mut outputs)
            })
            .collect::<Result<_>>()?;
        self.static_data = new_data;
        Ok(())
    }
}
