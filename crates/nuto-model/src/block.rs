//! Block-partitioned vectors and per-dof-type scalars.
//!
//! A [`DofVector`] holds one dense sub-vector per dof type. A
//! [`BlockVector`] pairs two of them: the active (J) and dependent (K)
//! partitions. Residual norms are never collapsed into a single scalar;
//! a [`BlockScalar`] keeps one infinity norm per dof type so that every
//! physical field converges against its own tolerance.

use crate::constraint::ConstraintMatrix;
use crate::dof::{DofStatus, DofType};
use nalgebra::DVector;
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// One dense sub-vector per dof type.
#[derive(Debug, Clone, PartialEq)]
pub struct DofVector {
    blocks: BTreeMap<DofType, DVector<f64>>,
}

impl DofVector {
    /// Zero vector sized by the active (J) dof counts of `status`.
    pub fn active_zeros(status: &DofStatus) -> Self {
        let blocks = status
            .dof_types()
            .map(|dof| (dof, DVector::zeros(status.num_active(dof))))
            .collect();
        Self { blocks }
    }

    /// Zero vector sized by the dependent (K) dof counts of `status`.
    pub fn dependent_zeros(status: &DofStatus) -> Self {
        let blocks = status
            .dof_types()
            .map(|dof| (dof, DVector::zeros(status.num_dependent(dof))))
            .collect();
        Self { blocks }
    }

    /// Sub-vector for the given dof type, if registered.
    pub fn block(&self, dof: DofType) -> Option<&DVector<f64>> {
        self.blocks.get(&dof)
    }

    /// Mutable sub-vector for the given dof type, if registered.
    pub fn block_mut(&mut self, dof: DofType) -> Option<&mut DVector<f64>> {
        self.blocks.get_mut(&dof)
    }

    /// Dof types present in this vector.
    pub fn dof_types(&self) -> impl Iterator<Item = DofType> + '_ {
        self.blocks.keys().copied()
    }

    /// Set all entries to zero.
    pub fn set_zero(&mut self) {
        for block in self.blocks.values_mut() {
            block.fill(0.0);
        }
    }

    /// Componentwise infinity norm per dof type, restricted to the
    /// currently active dof types of `status`.
    pub fn inf_norm(&self, status: &DofStatus) -> BlockScalar {
        let values = self
            .blocks
            .iter()
            .filter(|(dof, _)| status.is_active(**dof))
            .map(|(dof, block)| {
                let norm = block.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
                (*dof, norm)
            })
            .collect();
        BlockScalar { values }
    }

    /// Concatenate the blocks of the active dof types into one dense
    /// vector, in the deterministic dof-type order of `status`.
    pub fn flatten_active(&self, status: &DofStatus) -> DVector<f64> {
        let total: usize = status
            .active_types()
            .map(|dof| self.blocks.get(&dof).map(|b| b.len()).unwrap_or(0))
            .sum();
        let mut flat = DVector::zeros(total);
        let mut offset = 0;
        for dof in status.active_types() {
            if let Some(block) = self.blocks.get(&dof) {
                flat.rows_mut(offset, block.len()).copy_from(block);
                offset += block.len();
            }
        }
        flat
    }

    /// Scatter a dense vector produced by [`Self::flatten_active`] back
    /// into the active blocks.
    pub fn overwrite_active(&mut self, status: &DofStatus, flat: &DVector<f64>) {
        let mut offset = 0;
        for dof in status.active_types() {
            if let Some(block) = self.blocks.get_mut(&dof) {
                block.copy_from(&flat.rows(offset, block.len()));
                offset += block.len();
            }
        }
    }

    /// Dot product over all shared dof types.
    pub fn dot(&self, other: &DofVector) -> f64 {
        self.blocks
            .iter()
            .filter_map(|(dof, block)| other.blocks.get(dof).map(|rhs| block.dot(rhs)))
            .sum()
    }

    fn zip_apply(&mut self, other: &DofVector, f: impl Fn(&mut f64, f64)) {
        for (dof, block) in &mut self.blocks {
            if let Some(rhs) = other.blocks.get(dof) {
                debug_assert_eq!(block.len(), rhs.len());
                for (a, b) in block.iter_mut().zip(rhs.iter()) {
                    f(a, *b);
                }
            }
        }
    }
}

impl Add<&DofVector> for &DofVector {
    type Output = DofVector;
    fn add(self, rhs: &DofVector) -> DofVector {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Sub<&DofVector> for &DofVector {
    type Output = DofVector;
    fn sub(self, rhs: &DofVector) -> DofVector {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Mul<f64> for &DofVector {
    type Output = DofVector;
    fn mul(self, factor: f64) -> DofVector {
        let blocks = self
            .blocks
            .iter()
            .map(|(dof, block)| (*dof, block * factor))
            .collect();
        DofVector { blocks }
    }
}

impl AddAssign<&DofVector> for DofVector {
    fn add_assign(&mut self, rhs: &DofVector) {
        self.zip_apply(rhs, |a, b| *a += b);
    }
}

impl SubAssign<&DofVector> for DofVector {
    fn sub_assign(&mut self, rhs: &DofVector) {
        self.zip_apply(rhs, |a, b| *a -= b);
    }
}

/// Active/dependent partition of a global block vector.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockVector {
    /// Active (J) partition
    pub j: DofVector,
    /// Dependent (K) partition
    pub k: DofVector,
}

impl BlockVector {
    /// Zero vector sized by `status`.
    pub fn zeros(status: &DofStatus) -> Self {
        Self {
            j: DofVector::active_zeros(status),
            k: DofVector::dependent_zeros(status),
        }
    }

    /// Set all entries of both partitions to zero.
    pub fn set_zero(&mut self) {
        self.j.set_zero();
        self.k.set_zero();
    }

    /// Dot product over both partitions.
    pub fn dot(&self, other: &BlockVector) -> f64 {
        self.j.dot(&other.j) + self.k.dot(&other.k)
    }

    /// Constrained projection `r_J - C^T * r_K` onto the active dofs.
    pub fn apply_cmatrix(&self, cmat: &ConstraintMatrix) -> DofVector {
        let mut out = self.j.clone();
        for dof in cmat.dof_types() {
            if let (Some(block), Some(k_block)) = (out.block_mut(dof), self.k.block(dof)) {
                if cmat.num_entries(dof) > 0 {
                    *block -= cmat.transpose_mul(dof, k_block);
                }
            }
        }
        out
    }
}

impl Add<&BlockVector> for &BlockVector {
    type Output = BlockVector;
    fn add(self, rhs: &BlockVector) -> BlockVector {
        BlockVector {
            j: &self.j + &rhs.j,
            k: &self.k + &rhs.k,
        }
    }
}

impl Sub<&BlockVector> for &BlockVector {
    type Output = BlockVector;
    fn sub(self, rhs: &BlockVector) -> BlockVector {
        BlockVector {
            j: &self.j - &rhs.j,
            k: &self.k - &rhs.k,
        }
    }
}

impl Mul<f64> for &BlockVector {
    type Output = BlockVector;
    fn mul(self, factor: f64) -> BlockVector {
        BlockVector {
            j: &self.j * factor,
            k: &self.k * factor,
        }
    }
}

impl AddAssign<&BlockVector> for BlockVector {
    fn add_assign(&mut self, rhs: &BlockVector) {
        self.j += &rhs.j;
        self.k += &rhs.k;
    }
}

impl SubAssign<&BlockVector> for BlockVector {
    fn sub_assign(&mut self, rhs: &BlockVector) {
        self.j -= &rhs.j;
        self.k -= &rhs.k;
    }
}

/// One scalar per dof type, used for residual norms and tolerances.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockScalar {
    values: BTreeMap<DofType, f64>,
}

impl BlockScalar {
    /// Same value for every registered dof type of `status`.
    pub fn uniform(status: &DofStatus, value: f64) -> Self {
        let values = status.dof_types().map(|dof| (dof, value)).collect();
        Self { values }
    }

    /// Empty scalar with no entries.
    pub fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Value for the given dof type.
    pub fn get(&self, dof: DofType) -> Option<f64> {
        self.values.get(&dof).copied()
    }

    /// Set the value for one dof type.
    pub fn set(&mut self, dof: DofType, value: f64) {
        self.values.insert(dof, value);
    }

    /// Every entry multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> BlockScalar {
        let values = self
            .values
            .iter()
            .map(|(dof, value)| (*dof, value * factor))
            .collect();
        BlockScalar { values }
    }

    /// True if any entry of `self` strictly exceeds the matching entry of
    /// `other`. Entries without a matching value count as exceeding.
    pub fn exceeds(&self, other: &BlockScalar) -> bool {
        self.values
            .iter()
            .any(|(dof, value)| other.values.get(dof).is_none_or(|o| value > o))
    }

    /// True iff every entry of `self` is strictly below the matching entry
    /// of `tolerance`. Entries without a matching tolerance fail the check.
    pub fn is_below(&self, tolerance: &BlockScalar) -> bool {
        self.values.iter().all(|(dof, value)| {
            tolerance
                .values
                .get(dof)
                .is_some_and(|tol| value < tol)
        })
    }
}

impl std::fmt::Display for BlockScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (dof, value) in &self.values {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{dof}: {value:.3e}")?;
            first = false;
        }
        Ok(())
    }
}
