//! Degree-of-freedom types and the active/dependent partition bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Physical dof type carried by a node.
///
/// The solver treats each dof type as an independent block: residual norms,
/// tolerances and staggered solution steps are all resolved per dof type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DofType {
    /// Structural displacements
    Displacements,
    /// Temperature field
    Temperature,
    /// Relative humidity (moisture transport)
    RelativeHumidity,
}

impl DofType {
    /// All dof types known to the model.
    pub fn all() -> [DofType; 3] {
        [
            DofType::Displacements,
            DofType::Temperature,
            DofType::RelativeHumidity,
        ]
    }
}

impl std::fmt::Display for DofType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DofType::Displacements => "displacements",
            DofType::Temperature => "temperature",
            DofType::RelativeHumidity => "relative humidity",
        };
        write!(f, "{name}")
    }
}

/// Bookkeeping of dof counts and activation state per dof type.
///
/// `num_active`/`num_dependent` fix the block sizes of every
/// [`crate::BlockVector`] and [`crate::BlockMatrix`] built against this
/// status. The active set can be narrowed temporarily for staggered
/// (block Gauss-Seidel) solution steps.
#[derive(Debug, Clone, PartialEq)]
pub struct DofStatus {
    num_active: BTreeMap<DofType, usize>,
    num_dependent: BTreeMap<DofType, usize>,
    active_types: BTreeSet<DofType>,
}

impl DofStatus {
    /// Create a status with no dof types registered.
    pub fn new() -> Self {
        Self {
            num_active: BTreeMap::new(),
            num_dependent: BTreeMap::new(),
            active_types: BTreeSet::new(),
        }
    }

    /// Register a dof type with its active (J) and dependent (K) counts.
    /// Newly registered types start out active.
    pub fn register(&mut self, dof: DofType, num_active: usize, num_dependent: usize) {
        self.num_active.insert(dof, num_active);
        self.num_dependent.insert(dof, num_dependent);
        self.active_types.insert(dof);
    }

    /// All registered dof types, in deterministic order.
    pub fn dof_types(&self) -> impl Iterator<Item = DofType> + '_ {
        self.num_active.keys().copied()
    }

    /// Currently active dof types.
    pub fn active_types(&self) -> impl Iterator<Item = DofType> + '_ {
        self.active_types.iter().copied()
    }

    /// Whether the given dof type is currently active.
    pub fn is_active(&self, dof: DofType) -> bool {
        self.active_types.contains(&dof)
    }

    /// Restrict the active set to the given dof types.
    ///
    /// Types not registered in this status are ignored.
    pub fn set_active_types(&mut self, dofs: &[DofType]) {
        self.active_types = dofs
            .iter()
            .copied()
            .filter(|d| self.num_active.contains_key(d))
            .collect();
    }

    /// Activate every registered dof type.
    pub fn activate_all(&mut self) {
        self.active_types = self.num_active.keys().copied().collect();
    }

    /// Number of active (J) dofs of the given type.
    pub fn num_active(&self, dof: DofType) -> usize {
        self.num_active.get(&dof).copied().unwrap_or(0)
    }

    /// Number of dependent (K) dofs of the given type.
    pub fn num_dependent(&self, dof: DofType) -> usize {
        self.num_dependent.get(&dof).copied().unwrap_or(0)
    }

    /// Total number of active dofs over all types.
    pub fn total_active(&self) -> usize {
        self.num_active.values().sum()
    }
}

impl Default for DofStatus {
    fn default() -> Self {
        Self::new()
    }
}
