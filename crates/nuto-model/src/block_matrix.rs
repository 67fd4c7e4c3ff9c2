//! Block-partitioned sparse matrices (hessians, tangent operators).
//!
//! Each [`BlockMatrix`] carries four [`DofMatrix`] quadrants (JJ, JK, KJ,
//! KK); each quadrant stores one CSR block per (row dof type, column dof
//! type) pair. Blocks that were never assembled are implicit zeros.

use crate::block::{BlockVector, DofVector};
use crate::constraint::ConstraintMatrix;
use crate::dof::{DofStatus, DofType};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::convert::serial::convert_csr_dense;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeMap;

/// Sparse blocks keyed by (row dof type, column dof type).
#[derive(Debug, Clone, Default)]
pub struct DofMatrix {
    blocks: BTreeMap<(DofType, DofType), CsrMatrix<f64>>,
}

impl DofMatrix {
    /// Empty matrix (all blocks implicit zero).
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
        }
    }

    /// Block for the given dof-type pair, if assembled.
    pub fn block(&self, row: DofType, col: DofType) -> Option<&CsrMatrix<f64>> {
        self.blocks.get(&(row, col))
    }

    /// Replace one block.
    pub fn set_block(&mut self, row: DofType, col: DofType, block: CsrMatrix<f64>) {
        self.blocks.insert((row, col), block);
    }

    /// Assembled (row, col) dof-type pairs.
    pub fn block_keys(&self) -> impl Iterator<Item = (DofType, DofType)> + '_ {
        self.blocks.keys().copied()
    }

    /// `self += other * factor`, allocating union sparsity where needed.
    pub fn add_scaled(&mut self, other: &DofMatrix, factor: f64) {
        for (key, rhs) in &other.blocks {
            let scaled = rhs * factor;
            match self.blocks.get_mut(key) {
                Some(block) => *block = &*block + &scaled,
                None => {
                    self.blocks.insert(*key, scaled);
                }
            }
        }
    }

    /// Matrix-vector product into a per-dof-type vector.
    ///
    /// `out[row] += block(row, col) * v[col]` for every assembled block.
    pub fn mul_into(&self, v: &DofVector, out: &mut DofVector) {
        for ((row, col), block) in &self.blocks {
            if block.nrows() == 0 || block.ncols() == 0 {
                continue;
            }
            if let (Some(rhs), Some(target)) = (v.block(*col), out.block_mut(*row)) {
                let product: DVector<f64> = block * rhs;
                *target += &product;
            }
        }
    }
}

/// Active/dependent quadrants of a global block matrix.
#[derive(Debug, Clone, Default)]
pub struct BlockMatrix {
    pub jj: DofMatrix,
    pub jk: DofMatrix,
    pub kj: DofMatrix,
    pub kk: DofMatrix,
}

impl BlockMatrix {
    /// Matrix with no assembled blocks.
    pub fn new() -> Self {
        Self::default()
    }

    /// `self += other * factor` on every quadrant.
    pub fn add_scaled(&mut self, other: &BlockMatrix, factor: f64) {
        self.jj.add_scaled(&other.jj, factor);
        self.jk.add_scaled(&other.jk, factor);
        self.kj.add_scaled(&other.kj, factor);
        self.kk.add_scaled(&other.kk, factor);
    }

    /// Product with a block vector: `out.J = JJ*v.J + JK*v.K`,
    /// `out.K = KJ*v.J + KK*v.K`.
    pub fn mul_vector(&self, v: &BlockVector, status: &DofStatus) -> BlockVector {
        let mut out = BlockVector::zeros(status);
        self.jj.mul_into(&v.j, &mut out.j);
        self.jk.mul_into(&v.k, &mut out.j);
        self.kj.mul_into(&v.j, &mut out.k);
        self.kk.mul_into(&v.k, &mut out.k);
        out
    }

    /// Condense the dependent dofs into the JJ quadrant:
    /// `JJ -= C_r^T * KJ + JK * C_c - C_r^T * KK * C_c`.
    ///
    /// Only dof types with actual constraint entries contribute.
    pub fn apply_cmatrix(&mut self, cmat: &ConstraintMatrix) {
        for (row, col) in self.kj.block_keys().collect::<Vec<_>>() {
            if cmat.num_entries(row) == 0 {
                continue;
            }
            let c_row_t = cmat.block(row).map(|c| c.transpose());
            if let (Some(ct), Some(kj)) = (&c_row_t, self.kj.block(row, col)) {
                let correction = ct * kj;
                self.sub_from_jj(row, col, &correction);
            }
        }
        for (row, col) in self.jk.block_keys().collect::<Vec<_>>() {
            if cmat.num_entries(col) == 0 {
                continue;
            }
            if let (Some(jk), Some(c_col)) = (self.jk.block(row, col), cmat.block(col)) {
                let correction = jk * c_col;
                self.sub_from_jj(row, col, &correction);
            }
        }
        for (row, col) in self.kk.block_keys().collect::<Vec<_>>() {
            if cmat.num_entries(row) == 0 || cmat.num_entries(col) == 0 {
                continue;
            }
            if let (Some(ct), Some(kk), Some(c_col)) = (
                cmat.block(row).map(|c| c.transpose()).as_ref(),
                self.kk.block(row, col),
                cmat.block(col),
            ) {
                let correction = &(ct * kk) * c_col;
                let negated = &correction * -1.0;
                self.sub_from_jj(row, col, &negated);
            }
        }
    }

    fn sub_from_jj(&mut self, row: DofType, col: DofType, correction: &CsrMatrix<f64>) {
        let negated = correction * -1.0;
        match self.jj.blocks.get_mut(&(row, col)) {
            Some(block) => *block = &*block + &negated,
            None => {
                self.jj.blocks.insert((row, col), negated);
            }
        }
    }

    /// Densify the JJ quadrant over the active dof types, in the
    /// deterministic dof-type order of `status`. The result pairs with
    /// [`DofVector::flatten_active`].
    pub fn jj_dense_active(&self, status: &DofStatus) -> DMatrix<f64> {
        let active: Vec<DofType> = status.active_types().collect();
        let sizes: Vec<usize> = active.iter().map(|d| status.num_active(*d)).collect();
        let total: usize = sizes.iter().sum();
        let offsets: Vec<usize> = sizes
            .iter()
            .scan(0, |acc, s| {
                let o = *acc;
                *acc += s;
                Some(o)
            })
            .collect();

        let mut dense = DMatrix::zeros(total, total);
        for (ri, row) in active.iter().enumerate() {
            for (ci, col) in active.iter().enumerate() {
                if let Some(block) = self.jj.block(*row, *col) {
                    if block.nrows() == 0 || block.ncols() == 0 {
                        continue;
                    }
                    let sub = convert_csr_dense(block);
                    dense
                        .view_mut((offsets[ri], offsets[ci]), (sizes[ri], sizes[ci]))
                        .copy_from(&sub);
                }
            }
        }
        dense
    }
}
