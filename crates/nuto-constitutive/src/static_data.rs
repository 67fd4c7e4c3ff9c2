//! History variables carried per integration point.
//!
//! Evaluation never mutates committed data: a law reads the committed
//! state and returns the trial state for the current dof values. The
//! structure commits the trial state once a time step is accepted, so
//! re-running an update for the same dof values is idempotent.

use crate::io::Dimension;
use nalgebra::DVector;

/// Committed history of one integration point.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticData {
    /// Law without history variables.
    None,
    /// Mises plasticity history.
    Mises(MisesHistory),
    /// One entry per sub-law of a composite, in registration order.
    Multiple(Vec<StaticData>),
}

impl StaticData {
    /// Sub-entries of a composite's data, if this is [`StaticData::Multiple`].
    pub fn as_multiple(&self) -> Option<&[StaticData]> {
        match self {
            StaticData::Multiple(entries) => Some(entries),
            _ => None,
        }
    }
}

/// Plastic history of the Mises return mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct MisesHistory {
    /// Plastic strain, engineering Voigt notation.
    pub plastic_strain: DVector<f64>,
    /// Back stress, Voigt notation.
    pub back_stress: DVector<f64>,
    /// Accumulated equivalent plastic strain.
    pub accumulated_plastic_strain: f64,
}

impl MisesHistory {
    /// Virgin state with zero plastic strain.
    pub fn zeros(dimension: Dimension) -> Self {
        let n = dimension.voigt();
        Self {
            plastic_strain: DVector::zeros(n),
            back_stress: DVector::zeros(n),
            accumulated_plastic_strain: 0.0,
        }
    }
}
