//! Typed input/output maps exchanged between elements and laws.
//!
//! An element builds an [`InputMap`] (strains, temperatures, ...) and an
//! [`OutputMap`] whose keys announce what it wants back (stress, tangents).
//! Laws fill the slots they know how to compute and mark them calculated;
//! slots a law does not handle stay untouched so composite laws can merge
//! contributions from several sub-laws.

use crate::error::{ConstitutiveError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spatial dimension of the element the law is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    D1,
    D2,
    D3,
}

impl Dimension {
    /// Number of spatial directions.
    pub fn spatial(self) -> usize {
        match self {
            Dimension::D1 => 1,
            Dimension::D2 => 2,
            Dimension::D3 => 3,
        }
    }

    /// Number of independent components of a symmetric second-order
    /// tensor in Voigt notation (1, 3 or 6).
    pub fn voigt(self) -> usize {
        match self {
            Dimension::D1 => 1,
            Dimension::D2 => 3,
            Dimension::D3 => 6,
        }
    }
}

/// Inputs a law may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InputTag {
    EngineeringStrain,
    Temperature,
    RelativeHumidity,
    Time,
}

/// Outputs an element may request from a law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputTag {
    EngineeringStress,
    DStressDStrain,
    EngineeringStrain,
    DStrainDRelativeHumidity,
    DStressDRelativeHumidity,
    DStrainDTemperature,
    DStressDTemperature,
}

/// Identifies a scalar material parameter for get/set access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterId {
    YoungsModulus,
    PoissonRatio,
    Density,
    InitialYieldStrength,
    IsotropicHardeningModulus,
    KinematicHardeningModulus,
    ShrinkageCoefficient,
}

/// A single constitutive input value.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Scalar(f64),
    Vector(DVector<f64>),
}

/// Inputs keyed by tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputMap {
    entries: BTreeMap<InputTag, InputValue>,
}

impl InputMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_scalar(&mut self, tag: InputTag, value: f64) {
        self.entries.insert(tag, InputValue::Scalar(value));
    }

    pub fn insert_vector(&mut self, tag: InputTag, value: DVector<f64>) {
        self.entries.insert(tag, InputValue::Vector(value));
    }

    pub fn contains(&self, tag: InputTag) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Scalar input for `tag`.
    ///
    /// # Errors
    /// [`ConstitutiveError::MissingInput`] if absent or not a scalar.
    pub fn scalar(&self, tag: InputTag) -> Result<f64> {
        match self.entries.get(&tag) {
            Some(InputValue::Scalar(v)) => Ok(*v),
            _ => Err(ConstitutiveError::MissingInput(tag)),
        }
    }

    /// Engineering strain in Voigt notation, checked against `dimension`.
    ///
    /// # Errors
    /// [`ConstitutiveError::MissingInput`] if absent,
    /// [`ConstitutiveError::InputDimensionMismatch`] on a length mismatch.
    pub fn strain(&self, dimension: Dimension) -> Result<&DVector<f64>> {
        match self.entries.get(&InputTag::EngineeringStrain) {
            Some(InputValue::Vector(v)) => {
                if v.len() == dimension.voigt() {
                    Ok(v)
                } else {
                    Err(ConstitutiveError::InputDimensionMismatch {
                        tag: InputTag::EngineeringStrain,
                        len: v.len(),
                        expected: dimension.voigt(),
                    })
                }
            }
            _ => Err(ConstitutiveError::MissingInput(InputTag::EngineeringStrain)),
        }
    }

    /// Subtract `delta` from the stored engineering strain.
    ///
    /// # Errors
    /// Same conditions as [`InputMap::strain`].
    pub fn subtract_strain(&mut self, dimension: Dimension, delta: &DVector<f64>) -> Result<()> {
        let expected = dimension.voigt();
        match self.entries.get_mut(&InputTag::EngineeringStrain) {
            Some(InputValue::Vector(v)) if v.len() == expected && delta.len() == expected => {
                *v -= delta;
                Ok(())
            }
            Some(InputValue::Vector(v)) => Err(ConstitutiveError::InputDimensionMismatch {
                tag: InputTag::EngineeringStrain,
                len: v.len().min(delta.len()),
                expected,
            }),
            _ => Err(ConstitutiveError::MissingInput(InputTag::EngineeringStrain)),
        }
    }
}

/// A single constitutive output value.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    Scalar(f64),
    Vector(DVector<f64>),
    Matrix(DMatrix<f64>),
}

impl OutputValue {
    fn zeroed_like(tag: OutputTag, dimension: Dimension) -> Self {
        let n = dimension.voigt();
        match tag {
            OutputTag::DStressDStrain => OutputValue::Matrix(DMatrix::zeros(n, n)),
            _ => OutputValue::Vector(DVector::zeros(n)),
        }
    }

    fn set_zero(&mut self) {
        match self {
            OutputValue::Scalar(v) => *v = 0.0,
            OutputValue::Vector(v) => v.fill(0.0),
            OutputValue::Matrix(m) => m.fill(0.0),
        }
    }
}

/// One requested output: the value buffer plus a calculated flag.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSlot {
    pub value: OutputValue,
    pub is_calculated: bool,
}

impl OutputSlot {
    fn empty(tag: OutputTag, dimension: Dimension) -> Self {
        Self {
            value: OutputValue::zeroed_like(tag, dimension),
            is_calculated: false,
        }
    }

    /// Vector payload of a calculated slot.
    ///
    /// # Errors
    /// [`ConstitutiveError::TangentNotCalculated`] if the slot was never
    /// filled or holds a different value kind.
    pub fn calculated_vector(&self, tag: OutputTag) -> Result<&DVector<f64>> {
        match (&self.value, self.is_calculated) {
            (OutputValue::Vector(v), true) => Ok(v),
            _ => Err(ConstitutiveError::TangentNotCalculated(tag)),
        }
    }

    /// Matrix payload of a calculated slot.
    ///
    /// # Errors
    /// [`ConstitutiveError::TangentNotCalculated`] if the slot was never
    /// filled or holds a different value kind.
    pub fn calculated_matrix(&self, tag: OutputTag) -> Result<&DMatrix<f64>> {
        match (&self.value, self.is_calculated) {
            (OutputValue::Matrix(m), true) => Ok(m),
            _ => Err(ConstitutiveError::TangentNotCalculated(tag)),
        }
    }
}

/// Requested outputs keyed by tag.
///
/// Which tags are present drives which quantities the laws compute; a law
/// never computes more than was asked for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputMap {
    slots: BTreeMap<OutputTag, OutputSlot>,
}

impl OutputMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `tag`, allocating a zeroed slot of the right shape.
    pub fn request(&mut self, tag: OutputTag, dimension: Dimension) {
        self.slots
            .entry(tag)
            .or_insert_with(|| OutputSlot::empty(tag, dimension));
    }

    pub fn contains(&self, tag: OutputTag) -> bool {
        self.slots.contains_key(&tag)
    }

    pub fn slot(&self, tag: OutputTag) -> Option<&OutputSlot> {
        self.slots.get(&tag)
    }

    pub fn slot_mut(&mut self, tag: OutputTag) -> Option<&mut OutputSlot> {
        self.slots.get_mut(&tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = OutputTag> + '_ {
        self.slots.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OutputTag, &OutputSlot)> {
        self.slots.iter().map(|(tag, slot)| (*tag, slot))
    }

    /// Store a vector value and mark the slot calculated. The slot must
    /// have been requested; unsolicited outputs are dropped.
    pub fn set_vector(&mut self, tag: OutputTag, value: DVector<f64>) {
        if let Some(slot) = self.slots.get_mut(&tag) {
            slot.value = OutputValue::Vector(value);
            slot.is_calculated = true;
        }
    }

    /// Store a matrix value and mark the slot calculated.
    pub fn set_matrix(&mut self, tag: OutputTag, value: DMatrix<f64>) {
        if let Some(slot) = self.slots.get_mut(&tag) {
            slot.value = OutputValue::Matrix(value);
            slot.is_calculated = true;
        }
    }

    /// Zero every slot and clear all calculated flags.
    pub fn set_zero(&mut self) {
        for slot in self.slots.values_mut() {
            slot.value.set_zero();
            slot.is_calculated = false;
        }
    }

    /// Fresh map with the same requested tags but empty slots.
    pub fn mirror_empty(&self, dimension: Dimension) -> OutputMap {
        let mut out = OutputMap::new();
        for tag in self.tags() {
            out.request(tag, dimension);
        }
        out
    }

    /// Add a calculated slot from a sub-law into this map and mark the
    /// target calculated.
    ///
    /// # Errors
    /// [`ConstitutiveError::IncompatibleOutput`] if the value kinds or
    /// shapes of source and target differ.
    pub fn accumulate(&mut self, tag: OutputTag, contribution: &OutputSlot) -> Result<()> {
        let Some(slot) = self.slots.get_mut(&tag) else {
            return Ok(());
        };
        match (&mut slot.value, &contribution.value) {
            (OutputValue::Scalar(a), OutputValue::Scalar(b)) => *a += b,
            (OutputValue::Vector(a), OutputValue::Vector(b)) if a.len() == b.len() => *a += b,
            (OutputValue::Matrix(a), OutputValue::Matrix(b)) if a.shape() == b.shape() => *a += b,
            _ => return Err(ConstitutiveError::IncompatibleOutput(tag)),
        }
        slot.is_calculated = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strain_access_checks_dimension() {
        let mut inputs = InputMap::new();
        inputs.insert_vector(InputTag::EngineeringStrain, DVector::from_element(6, 0.1));
        assert!(inputs.strain(Dimension::D3).is_ok());
        assert!(matches!(
            inputs.strain(Dimension::D1),
            Err(ConstitutiveError::InputDimensionMismatch { .. })
        ));
    }

    #[test]
    fn missing_scalar_input_is_an_error() {
        let inputs = InputMap::new();
        assert!(matches!(
            inputs.scalar(InputTag::RelativeHumidity),
            Err(ConstitutiveError::MissingInput(InputTag::RelativeHumidity))
        ));
    }

    #[test]
    fn requested_slots_start_uncalculated() {
        let mut outputs = OutputMap::new();
        outputs.request(OutputTag::EngineeringStress, Dimension::D3);
        outputs.request(OutputTag::DStressDStrain, Dimension::D3);

        let stress = outputs.slot(OutputTag::EngineeringStress).unwrap();
        assert!(!stress.is_calculated);
        assert!(matches!(&stress.value, OutputValue::Vector(v) if v.len() == 6));
        let tangent = outputs.slot(OutputTag::DStressDStrain).unwrap();
        assert!(matches!(&tangent.value, OutputValue::Matrix(m) if m.shape() == (6, 6)));
    }

    #[test]
    fn accumulate_sums_by_value_kind() {
        let mut outputs = OutputMap::new();
        outputs.request(OutputTag::EngineeringStress, Dimension::D1);

        let contribution = OutputSlot {
            value: OutputValue::Vector(DVector::from_element(1, 2.0)),
            is_calculated: true,
        };
        outputs
            .accumulate(OutputTag::EngineeringStress, &contribution)
            .unwrap();
        outputs
            .accumulate(OutputTag::EngineeringStress, &contribution)
            .unwrap();

        let slot = outputs.slot(OutputTag::EngineeringStress).unwrap();
        let v = slot.calculated_vector(OutputTag::EngineeringStress).unwrap();
        assert_eq!(v[0], 4.0);
    }

    #[test]
    fn accumulate_rejects_mismatched_kinds() {
        let mut outputs = OutputMap::new();
        outputs.request(OutputTag::EngineeringStress, Dimension::D1);
        let contribution = OutputSlot {
            value: OutputValue::Matrix(DMatrix::zeros(1, 1)),
            is_calculated: true,
        };
        assert!(matches!(
            outputs.accumulate(OutputTag::EngineeringStress, &contribution),
            Err(ConstitutiveError::IncompatibleOutput(_))
        ));
    }
}
