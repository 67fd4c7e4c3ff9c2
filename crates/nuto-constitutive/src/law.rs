//! Closed set of constitutive laws and their common dispatch surface.
//!
//! Elements only ever hold a [`Law`]; the enum dispatch replaces a
//! virtual-call hierarchy and keeps the set of laws closed, so matching
//! on a law is exhaustive and new laws are a compile-time event.

use crate::additive_input_explicit::AdditiveInputExplicit;
use crate::additive_output::AdditiveOutput;
use crate::eigenstrain::{ConstantEigenstrain, MoistureShrinkage};
use crate::error::{ConstitutiveError, Result};
use crate::io::{Dimension, InputMap, InputTag, OutputMap, OutputTag, ParameterId};
use crate::linear_elastic::LinearElastic;
use crate::mises::MisesPlasticity;
use crate::static_data::{MisesHistory, StaticData};
use nuto_model::DofType;
use std::collections::BTreeSet;

/// A constitutive law, leaf or composite.
#[derive(Debug, Clone, PartialEq)]
pub enum Law {
    LinearElastic(LinearElastic),
    MisesPlasticity(MisesPlasticity),
    ConstantEigenstrain(ConstantEigenstrain),
    MoistureShrinkage(MoistureShrinkage),
    AdditiveOutput(AdditiveOutput),
    AdditiveInputExplicit(AdditiveInputExplicit),
}

impl Law {
    /// Evaluate the law at one integration point.
    ///
    /// Reads the committed static data and fills the requested output
    /// slots; the returned static data is the trial state for the given
    /// inputs and is committed by the caller once the step is accepted.
    ///
    /// # Errors
    /// Any [`ConstitutiveError`]; composites wrap sub-law failures in
    /// [`ConstitutiveError::SubLaw`].
    pub fn evaluate(
        &self,
        dimension: Dimension,
        inputs: &InputMap,
        outputs: &mut OutputMap,
        data: &StaticData,
    ) -> Result<StaticData> {
        match self {
            Law::LinearElastic(law) => {
                law.evaluate(dimension, inputs, outputs)?;
                Ok(StaticData::None)
            }
            Law::MisesPlasticity(law) => {
                let StaticData::Mises(history) = data else {
                    return Err(ConstitutiveError::StaticDataMismatch);
                };
                Ok(StaticData::Mises(law.evaluate(
                    dimension, inputs, outputs, history,
                )?))
            }
            Law::ConstantEigenstrain(law) => {
                law.evaluate(dimension, inputs, outputs)?;
                Ok(StaticData::None)
            }
            Law::MoistureShrinkage(law) => {
                law.evaluate(dimension, inputs, outputs)?;
                Ok(StaticData::None)
            }
            Law::AdditiveOutput(law) => law.evaluate(dimension, inputs, outputs, data),
            Law::AdditiveInputExplicit(law) => law.evaluate(dimension, inputs, outputs, data),
        }
    }

    /// Fresh committed static data for one integration point.
    pub fn allocate_static_data(&self, dimension: Dimension) -> StaticData {
        match self {
            Law::LinearElastic(_) | Law::ConstantEigenstrain(_) | Law::MoistureShrinkage(_) => {
                StaticData::None
            }
            Law::MisesPlasticity(_) => StaticData::Mises(MisesHistory::zeros(dimension)),
            Law::AdditiveOutput(law) => law.allocate_static_data(dimension),
            Law::AdditiveInputExplicit(law) => law.allocate_static_data(dimension),
        }
    }

    /// Inputs the law needs to produce the requested outputs.
    ///
    /// Composites return the union over their sub-laws; the input-
    /// modifying composite always needs the engineering strain.
    pub fn required_inputs(&self, outputs: &OutputMap) -> BTreeSet<InputTag> {
        let mut set = BTreeSet::new();
        self.collect_required_inputs(outputs, &mut set);
        set
    }

    fn collect_required_inputs(&self, outputs: &OutputMap, set: &mut BTreeSet<InputTag>) {
        match self {
            Law::LinearElastic(_) | Law::MisesPlasticity(_) => {
                if outputs.contains(OutputTag::EngineeringStress)
                    || outputs.contains(OutputTag::DStressDStrain)
                {
                    set.insert(InputTag::EngineeringStrain);
                }
            }
            Law::ConstantEigenstrain(_) => {}
            Law::MoistureShrinkage(_) => {
                set.insert(InputTag::RelativeHumidity);
            }
            Law::AdditiveOutput(law) => {
                for sub in law.laws() {
                    sub.collect_required_inputs(outputs, set);
                }
            }
            Law::AdditiveInputExplicit(law) => {
                set.insert(InputTag::EngineeringStrain);
                law.output_law().collect_required_inputs(outputs, set);
                for sub in law.modifiers() {
                    sub.collect_required_inputs(outputs, set);
                }
            }
        }
    }

    /// Whether the law contributes a tangent block for the given row and
    /// column dof type at the given time-derivative order (0 stiffness,
    /// 1 damping, 2 mass). Composites report the union of their sub-laws.
    pub fn is_dof_combination_computable(
        &self,
        row: DofType,
        col: DofType,
        derivative: usize,
    ) -> bool {
        match self {
            Law::LinearElastic(_) | Law::MisesPlasticity(_) => {
                row == DofType::Displacements
                    && col == DofType::Displacements
                    && (derivative == 0 || derivative == 2)
            }
            Law::ConstantEigenstrain(_) => false,
            Law::MoistureShrinkage(_) => {
                derivative == 0
                    && row == DofType::Displacements
                    && col == DofType::RelativeHumidity
            }
            Law::AdditiveOutput(law) => law
                .laws()
                .iter()
                .any(|sub| sub.is_dof_combination_computable(row, col, derivative)),
            Law::AdditiveInputExplicit(law) => {
                law.output_law()
                    .is_dof_combination_computable(row, col, derivative)
                    || law
                        .modifiers()
                        .iter()
                        .any(|sub| sub.is_dof_combination_computable(row, col, derivative))
            }
        }
    }

    /// Mass density. Composites report the sum over the laws that carry
    /// one, matching the additive stress decomposition.
    pub fn density(&self) -> f64 {
        match self {
            Law::LinearElastic(law) => law.density,
            Law::MisesPlasticity(law) => law.density,
            Law::ConstantEigenstrain(_) | Law::MoistureShrinkage(_) => 0.0,
            Law::AdditiveOutput(law) => law.laws().iter().map(Law::density).sum(),
            Law::AdditiveInputExplicit(law) => law.output_law().density(),
        }
    }

    /// Read a scalar parameter.
    ///
    /// # Errors
    /// [`ConstitutiveError::UnknownParameter`] when the law does not
    /// carry the parameter. Composites do not expose parameters.
    pub fn parameter(&self, id: ParameterId) -> Result<f64> {
        match self {
            Law::LinearElastic(law) => law.parameter(id),
            Law::MisesPlasticity(law) => law.parameter(id),
            Law::MoistureShrinkage(law) => law.parameter(id),
            Law::ConstantEigenstrain(_) => {
                Err(ConstitutiveError::UnknownParameter(id, "ConstantEigenstrain"))
            }
            Law::AdditiveOutput(_) => Err(ConstitutiveError::UnknownParameter(id, "AdditiveOutput")),
            Law::AdditiveInputExplicit(_) => Err(ConstitutiveError::UnknownParameter(
                id,
                "AdditiveInputExplicit",
            )),
        }
    }

    /// Write a scalar parameter.
    ///
    /// # Errors
    /// Same conditions as [`Law::parameter`].
    pub fn set_parameter(&mut self, id: ParameterId, value: f64) -> Result<()> {
        match self {
            Law::LinearElastic(law) => law.set_parameter(id, value),
            Law::MisesPlasticity(law) => law.set_parameter(id, value),
            Law::MoistureShrinkage(law) => law.set_parameter(id, value),
            Law::ConstantEigenstrain(_) => {
                Err(ConstitutiveError::UnknownParameter(id, "ConstantEigenstrain"))
            }
            Law::AdditiveOutput(_) => Err(ConstitutiveError::UnknownParameter(id, "AdditiveOutput")),
            Law::AdditiveInputExplicit(_) => Err(ConstitutiveError::UnknownParameter(
                id,
                "AdditiveInputExplicit",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::additive_input_explicit::AdditiveInputExplicitBuilder;
    use crate::additive_output::AdditiveOutputBuilder;

    #[test]
    fn required_inputs_follow_requested_outputs() {
        let law = Law::LinearElastic(LinearElastic::new(100.0, 0.0));
        let mut outputs = OutputMap::new();
        assert!(law.required_inputs(&outputs).is_empty());

        outputs.request(OutputTag::EngineeringStress, Dimension::D1);
        let inputs = law.required_inputs(&outputs);
        assert!(inputs.contains(&InputTag::EngineeringStrain));
    }

    #[test]
    fn composite_inputs_are_the_union() {
        let law = AdditiveInputExplicitBuilder::new()
            .output_law(Law::LinearElastic(LinearElastic::new(100.0, 0.0)))
            .add_modifier(
                Law::MoistureShrinkage(MoistureShrinkage::new(-1e-3)),
                InputTag::EngineeringStrain,
            )
            .build()
            .unwrap();
        let outputs = OutputMap::new();
        let inputs = law.required_inputs(&outputs);
        assert!(inputs.contains(&InputTag::EngineeringStrain));
        assert!(inputs.contains(&InputTag::RelativeHumidity));
    }

    #[test]
    fn dof_combinations_union_over_sub_laws() {
        let law = AdditiveOutputBuilder::new()
            .add_law(Law::LinearElastic(LinearElastic::new(100.0, 0.0)))
            .add_law(Law::MoistureShrinkage(MoistureShrinkage::new(-1e-3)))
            .build()
            .unwrap();
        assert!(law.is_dof_combination_computable(
            DofType::Displacements,
            DofType::Displacements,
            0
        ));
        assert!(law.is_dof_combination_computable(
            DofType::Displacements,
            DofType::RelativeHumidity,
            0
        ));
        assert!(!law.is_dof_combination_computable(
            DofType::Temperature,
            DofType::Temperature,
            0
        ));
    }

    #[test]
    fn dof_combinations_distinguish_derivative_orders() {
        let law = Law::LinearElastic(LinearElastic::new(100.0, 0.0).with_density(1.0));
        assert!(law.is_dof_combination_computable(
            DofType::Displacements,
            DofType::Displacements,
            2
        ));
        assert!(!law.is_dof_combination_computable(
            DofType::Displacements,
            DofType::Displacements,
            1
        ));

        let shrinkage = Law::MoistureShrinkage(MoistureShrinkage::new(-1e-3));
        assert!(!shrinkage.is_dof_combination_computable(
            DofType::Displacements,
            DofType::RelativeHumidity,
            2
        ));
    }

    #[test]
    fn densities_sum_over_additive_output() {
        let law = AdditiveOutputBuilder::new()
            .add_law(Law::LinearElastic(
                LinearElastic::new(100.0, 0.0).with_density(2.0),
            ))
            .add_law(Law::LinearElastic(
                LinearElastic::new(50.0, 0.0).with_density(1.5),
            ))
            .build()
            .unwrap();
        assert_eq!(law.density(), 3.5);
    }

    #[test]
    fn static_data_shape_follows_composition() {
        let law = AdditiveOutputBuilder::new()
            .add_law(Law::MisesPlasticity(MisesPlasticity::new(100.0, 0.3, 1.0)))
            .add_law(Law::LinearElastic(LinearElastic::new(50.0, 0.0)))
            .build()
            .unwrap();
        let data = law.allocate_static_data(Dimension::D1);
        let entries = data.as_multiple().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], StaticData::Mises(_)));
        assert!(matches!(entries[1], StaticData::None));
    }
}
