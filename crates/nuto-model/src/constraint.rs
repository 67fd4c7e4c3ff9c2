//! Linear constraints between dependent and active dofs.
//!
//! Dependent (K) dofs are recovered from the active (J) dofs through
//! `dof_K = -C * dof_J + rhs(t)` where `C` holds one sparse block per dof
//! type (constraints never couple different dof types) and the right-hand
//! side follows a piecewise-linear table in time.

use crate::dof::{DofStatus, DofType};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while building model-level tables.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("time table needs at least one point")]
    EmptyTimeTable,
    #[error("time table points must be sorted by time (t = {0} out of order)")]
    UnsortedTimeTable(f64),
}

/// Piecewise-linear function of time, clamped at both table ends.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeTable {
    points: Vec<(f64, f64)>,
}

impl TimeTable {
    /// Table that returns `value` for every time.
    pub fn constant(value: f64) -> Self {
        Self {
            points: vec![(0.0, value)],
        }
    }

    /// Linear ramp from `(t0, v0)` to `(t1, v1)`, clamped outside.
    pub fn ramp(t0: f64, v0: f64, t1: f64, v1: f64) -> Self {
        Self {
            points: vec![(t0, v0), (t1, v1)],
        }
    }

    /// Build a table from `(time, value)` pairs sorted by time.
    pub fn from_points(points: Vec<(f64, f64)>) -> Result<Self, ModelError> {
        if points.is_empty() {
            return Err(ModelError::EmptyTimeTable);
        }
        for pair in points.windows(2) {
            if pair[1].0 < pair[0].0 {
                return Err(ModelError::UnsortedTimeTable(pair[1].0));
            }
        }
        Ok(Self { points })
    }

    /// Interpolated value at time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if t <= first.0 {
            return first.1;
        }
        if t >= last.0 {
            return last.1;
        }
        for pair in self.points.windows(2) {
            let (t0, v0) = pair[0];
            let (t1, v1) = pair[1];
            if t <= t1 {
                if t1 == t0 {
                    return v1;
                }
                return v0 + (v1 - v0) * (t - t0) / (t1 - t0);
            }
        }
        last.1
    }
}

/// Sparse constraint matrix with time-dependent right-hand side.
#[derive(Debug, Clone)]
pub struct ConstraintMatrix {
    blocks: BTreeMap<DofType, CsrMatrix<f64>>,
    rhs_tables: BTreeMap<DofType, Vec<TimeTable>>,
}

impl ConstraintMatrix {
    /// Constraint matrix with zero blocks sized by `status` and constant
    /// zero right-hand sides.
    pub fn zeros(status: &DofStatus) -> Self {
        let mut blocks = BTreeMap::new();
        let mut rhs_tables = BTreeMap::new();
        for dof in status.dof_types() {
            let rows = status.num_dependent(dof);
            let cols = status.num_active(dof);
            blocks.insert(dof, CsrMatrix::zeros(rows, cols));
            rhs_tables.insert(dof, vec![TimeTable::constant(0.0); rows]);
        }
        Self { blocks, rhs_tables }
    }

    /// Replace the sparse block for one dof type.
    pub fn set_block(&mut self, dof: DofType, block: CsrMatrix<f64>) {
        self.blocks.insert(dof, block);
    }

    /// Set the right-hand-side time table of one dependent dof.
    pub fn set_rhs_table(&mut self, dof: DofType, dependent_index: usize, table: TimeTable) {
        if let Some(tables) = self.rhs_tables.get_mut(&dof) {
            if dependent_index < tables.len() {
                tables[dependent_index] = table;
            }
        }
    }

    /// Dof types with a constraint block.
    pub fn dof_types(&self) -> impl Iterator<Item = DofType> + '_ {
        self.blocks.keys().copied()
    }

    /// Number of nonzero entries in the block of `dof`.
    pub fn num_entries(&self, dof: DofType) -> usize {
        self.blocks.get(&dof).map(|b| b.nnz()).unwrap_or(0)
    }

    /// Whether any constraint actually couples dependent to active dofs.
    pub fn has_interacting_constraints(&self) -> bool {
        self.blocks.values().any(|b| b.nnz() > 0)
    }

    /// Sparse block of one dof type, if present.
    pub fn block(&self, dof: DofType) -> Option<&CsrMatrix<f64>> {
        self.blocks.get(&dof)
    }

    /// `C * v` for one dof type (active-sized input, dependent-sized output).
    pub fn mul(&self, dof: DofType, v: &DVector<f64>) -> DVector<f64> {
        match self.blocks.get(&dof) {
            Some(block) => block * v,
            None => DVector::zeros(0),
        }
    }

    /// `C^T * v` for one dof type (dependent-sized input, active-sized output).
    pub fn transpose_mul(&self, dof: DofType, v: &DVector<f64>) -> DVector<f64> {
        match self.blocks.get(&dof) {
            Some(block) => &block.transpose() * v,
            None => DVector::zeros(0),
        }
    }

    /// Constraint right-hand side at time `t`, sized like the K partition.
    pub fn rhs_at(&self, t: f64, status: &DofStatus) -> crate::block::DofVector {
        let mut rhs = crate::block::DofVector::dependent_zeros(status);
        for (dof, tables) in &self.rhs_tables {
            if let Some(block) = rhs.block_mut(*dof) {
                for (i, table) in tables.iter().enumerate() {
                    if i < block.len() {
                        block[i] = table.value_at(t);
                    }
                }
            }
        }
        rhs
    }
}
