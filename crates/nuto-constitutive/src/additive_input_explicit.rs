//! Composite law that modifies the strain seen by its output law.
//!
//! Exactly one output law produces stress; any number of modifier laws
//! each output an engineering strain that is subtracted from the total
//! strain before the output law runs. Requested stress derivatives with
//! respect to scalar fields follow from the chain rule
//! d sigma / d field = (d sigma / d eps) * (d eps_modifier / d field).
//!
//! Only engineering strain can be modified; registering a modifier for
//! any other input is rejected when the composite is built.

use crate::error::{ConstitutiveError, Result};
use crate::io::{Dimension, InputMap, InputTag, OutputMap, OutputTag};
use crate::law::Law;
use crate::static_data::StaticData;
use nalgebra::DVector;

/// Chain-rule pairs: requested stress derivative and the strain
/// derivative the modifiers must provide for it.
const CHAIN_RULE: [(OutputTag, OutputTag); 2] = [
    (
        OutputTag::DStressDRelativeHumidity,
        OutputTag::DStrainDRelativeHumidity,
    ),
    (
        OutputTag::DStressDTemperature,
        OutputTag::DStrainDTemperature,
    ),
];

/// Input-modifying composite. Built through
/// [`AdditiveInputExplicitBuilder`]; the attached laws are fixed once
/// built. Static data holds one entry per modifier, then the output law.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditiveInputExplicit {
    output_law: Box<Law>,
    modifiers: Vec<Law>,
}

impl AdditiveInputExplicit {
    pub fn output_law(&self) -> &Law {
        &self.output_law
    }

    pub fn modifiers(&self) -> &[Law] {
        &self.modifiers
    }

    pub(crate) fn allocate_static_data(&self, dimension: Dimension) -> StaticData {
        let mut entries: Vec<StaticData> = self
            .modifiers
            .iter()
            .map(|law| law.allocate_static_data(dimension))
            .collect();
        entries.push(self.output_law.allocate_static_data(dimension));
        StaticData::Multiple(entries)
    }

    pub(crate) fn evaluate(
        &self,
        dimension: Dimension,
        inputs: &InputMap,
        outputs: &mut OutputMap,
        data: &StaticData,
    ) -> Result<StaticData> {
        let entries = data
            .as_multiple()
            .filter(|entries| entries.len() == self.modifiers.len() + 1)
            .ok_or(ConstitutiveError::StaticDataMismatch)?;

        // which strain derivatives the chain rule will need
        let needed_strain_derivatives: Vec<OutputTag> = CHAIN_RULE
            .iter()
            .filter(|(stress_tag, _)| outputs.contains(*stress_tag))
            .map(|(_, strain_tag)| *strain_tag)
            .collect();

        let mut modified_inputs = inputs.clone();
        let mut strain_derivatives: Vec<(OutputTag, DVector<f64>)> = Vec::new();
        let mut new_entries = Vec::with_capacity(entries.len());

        for (index, (law, entry)) in self.modifiers.iter().zip(entries).enumerate() {
            let mut scratch = OutputMap::new();
            scratch.request(OutputTag::EngineeringStrain, dimension);
            for tag in &needed_strain_derivatives {
                scratch.request(*tag, dimension);
            }
            let new_entry = law
                .evaluate(dimension, &modified_inputs, &mut scratch, entry)
                .map_err(|source| ConstitutiveError::SubLaw {
                    index,
                    source: Box::new(source),
                })?;
            new_entries.push(new_entry);

            if let Some(slot) = scratch.slot(OutputTag::EngineeringStrain) {
                if slot.is_calculated {
                    let delta = slot.calculated_vector(OutputTag::EngineeringStrain)?;
                    modified_inputs.subtract_strain(dimension, delta)?;
                }
            }
            for tag in &needed_strain_derivatives {
                if let Some(slot) = scratch.slot(*tag) {
                    if slot.is_calculated {
                        let contribution = slot.calculated_vector(*tag)?.clone();
                        match strain_derivatives.iter_mut().find(|(t, _)| t == tag) {
                            Some((_, sum)) => *sum += &contribution,
                            None => strain_derivatives.push((*tag, contribution)),
                        }
                    }
                }
            }
        }

        // the chain rule needs the stress-strain tangent even when the
        // caller did not ask for it
        let needs_chain_rule = !needed_strain_derivatives.is_empty();
        let mut inner_outputs = outputs.mirror_empty(dimension);
        if needs_chain_rule {
            inner_outputs.request(OutputTag::DStressDStrain, dimension);
        }
        let output_entry = self
            .output_law
            .evaluate(dimension, &modified_inputs, &mut inner_outputs, entries.last().ok_or(ConstitutiveError::StaticDataMismatch)?)
            .map_err(|source| ConstitutiveError::SubLaw {
                index: self.modifiers.len(),
                source: Box::new(source),
            })?;
        new_entries.push(output_entry);

        for (tag, slot) in inner_outputs.iter() {
            if slot.is_calculated {
                if let Some(target) = outputs.slot_mut(tag) {
                    *target = slot.clone();
                }
            }
        }

        for (stress_tag, strain_tag) in CHAIN_RULE {
            if !outputs.contains(stress_tag) {
                continue;
            }
            let tangent = inner_outputs
                .slot(OutputTag::DStressDStrain)
                .ok_or(ConstitutiveError::TangentNotCalculated(stress_tag))?
                .calculated_matrix(OutputTag::DStressDStrain)
                .map_err(|_| ConstitutiveError::TangentNotCalculated(stress_tag))?;
            let strain_derivative = strain_derivatives
                .iter()
                .find(|(t, _)| *t == strain_tag)
                .map(|(_, v)| v)
                .ok_or(ConstitutiveError::TangentNotCalculated(stress_tag))?;
            outputs.set_vector(stress_tag, tangent * strain_derivative);
        }

        Ok(StaticData::Multiple(new_entries))
    }
}

/// One-shot builder for [`AdditiveInputExplicit`].
#[derive(Debug, Default)]
pub struct AdditiveInputExplicitBuilder {
    output_law: Option<Law>,
    extra_output_law: bool,
    modifiers: Vec<(Law, InputTag)>,
}

impl AdditiveInputExplicitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the single stress-producing law.
    pub fn output_law(mut self, law: Law) -> Self {
        if self.output_law.is_some() {
            self.extra_output_law = true;
        } else {
            self.output_law = Some(law);
        }
        self
    }

    /// Attach a modifier whose output is subtracted from `modified_input`.
    pub fn add_modifier(mut self, law: Law, modified_input: InputTag) -> Self {
        self.modifiers.push((law, modified_input));
        self
    }

    /// # Errors
    /// [`ConstitutiveError::MissingOutputLaw`] without an output law,
    /// [`ConstitutiveError::MultipleOutputLaws`] if two were attached,
    /// [`ConstitutiveError::NoOutputForInput`] for a modifier registered
    /// on anything but the engineering strain.
    pub fn build(self) -> Result<Law> {
        if self.extra_output_law {
            return Err(ConstitutiveError::MultipleOutputLaws);
        }
        let output_law = self.output_law.ok_or(ConstitutiveError::MissingOutputLaw)?;
        let mut modifiers = Vec::with_capacity(self.modifiers.len());
        for (law, input) in self.modifiers {
            if input != InputTag::EngineeringStrain {
                return Err(ConstitutiveError::NoOutputForInput(input));
            }
            modifiers.push(law);
        }
        Ok(Law::AdditiveInputExplicit(AdditiveInputExplicit {
            output_law: Box::new(output_law),
            modifiers,
        }))
    }
}
