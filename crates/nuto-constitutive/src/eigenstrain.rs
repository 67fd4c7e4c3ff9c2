//! Strain-producing laws used as input modifiers.
//!
//! These laws output an engineering strain instead of a stress. Attached
//! to an additive-input composite they shift the strain seen by the
//! mechanical output law, which yields the additive decomposition
//! epsilon_mechanical = epsilon_total - epsilon_eigen.

use crate::error::{ConstitutiveError, Result};
use crate::io::{Dimension, InputMap, InputTag, OutputMap, OutputTag, ParameterId};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Fixed eigenstrain, independent of all inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantEigenstrain {
    /// Voigt components; the length fixes the dimension the law is valid for.
    pub strain: Vec<f64>,
}

impl ConstantEigenstrain {
    pub fn new(strain: Vec<f64>) -> Self {
        Self { strain }
    }

    fn strain_vector(&self, dimension: Dimension) -> Result<DVector<f64>> {
        if self.strain.len() != dimension.voigt() {
            return Err(ConstitutiveError::InputDimensionMismatch {
                tag: InputTag::EngineeringStrain,
                len: self.strain.len(),
                expected: dimension.voigt(),
            });
        }
        Ok(DVector::from_column_slice(&self.strain))
    }

    pub(crate) fn evaluate(
        &self,
        dimension: Dimension,
        _inputs: &InputMap,
        outputs: &mut OutputMap,
    ) -> Result<()> {
        // depends on no field, so it never claims a field derivative;
        // a composite that needs one must get it from another modifier
        if outputs.contains(OutputTag::EngineeringStrain) {
            outputs.set_vector(OutputTag::EngineeringStrain, self.strain_vector(dimension)?);
        }
        Ok(())
    }
}

/// Volumetric shrinkage strain proportional to relative humidity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoistureShrinkage {
    /// Strain per unit relative humidity, applied to the normal components.
    pub shrinkage_coefficient: f64,
}

impl MoistureShrinkage {
    pub fn new(shrinkage_coefficient: f64) -> Self {
        Self {
            shrinkage_coefficient,
        }
    }

    fn volumetric_direction(dimension: Dimension) -> DVector<f64> {
        let mut v = DVector::zeros(dimension.voigt());
        for i in 0..dimension.spatial() {
            v[i] = 1.0;
        }
        v
    }

    pub(crate) fn evaluate(
        &self,
        dimension: Dimension,
        inputs: &InputMap,
        outputs: &mut OutputMap,
    ) -> Result<()> {
        let direction = Self::volumetric_direction(dimension);
        if outputs.contains(OutputTag::EngineeringStrain) {
            let rh = inputs.scalar(InputTag::RelativeHumidity)?;
            outputs.set_vector(
                OutputTag::EngineeringStrain,
                &direction * (self.shrinkage_coefficient * rh),
            );
        }
        if outputs.contains(OutputTag::DStrainDRelativeHumidity) {
            outputs.set_vector(
                OutputTag::DStrainDRelativeHumidity,
                &direction * self.shrinkage_coefficient,
            );
        }
        Ok(())
    }

    pub(crate) fn parameter(&self, id: ParameterId) -> Result<f64> {
        match id {
            ParameterId::ShrinkageCoefficient => Ok(self.shrinkage_coefficient),
            _ => Err(ConstitutiveError::UnknownParameter(id, "MoistureShrinkage")),
        }
    }

    pub(crate) fn set_parameter(&mut self, id: ParameterId, value: f64) -> Result<()> {
        match id {
            ParameterId::ShrinkageCoefficient => {
                self.shrinkage_coefficient = value;
                Ok(())
            }
            _ => Err(ConstitutiveError::UnknownParameter(id, "MoistureShrinkage")),
        }
    }
}
