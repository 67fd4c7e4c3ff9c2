//! Composite law that sums the outputs of its sub-laws.
//!
//! Every sub-law is evaluated with the same inputs into its own scratch
//! output map; calculated slots are then summed per output kind into the
//! caller's map. The first failing sub-law aborts the whole evaluation
//! with its index recorded in the error chain.

use crate::error::{ConstitutiveError, Result};
use crate::io::{Dimension, InputMap, OutputMap};
use crate::law::Law;
use crate::static_data::StaticData;

/// Output-summing composite. Built through [`AdditiveOutputBuilder`];
/// the attached laws are fixed once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditiveOutput {
    laws: Vec<Law>,
}

impl AdditiveOutput {
    pub fn laws(&self) -> &[Law] {
        &self.laws
    }

    pub(crate) fn allocate_static_data(&self, dimension: Dimension) -> StaticData {
        StaticData::Multiple(
            self.laws
                .iter()
                .map(|law| law.allocate_static_data(dimension))
                .collect(),
        )
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
            .filter(|entries| entries.len() == self.laws.len())
            .ok_or(ConstitutiveError::StaticDataMismatch)?;

        outputs.set_zero();
        let mut new_entries = Vec::with_capacity(self.laws.len());
        for (index, (law, entry)) in self.laws.iter().zip(entries).enumerate() {
            let mut scratch = outputs.mirror_empty(dimension);
            let new_entry = law
                .evaluate(dimension, inputs, &mut scratch, entry)
                .map_err(|source| ConstitutiveError::SubLaw {
                    index,
                    source: Box::new(source),
                })?;
            for (tag, slot) in scratch.iter() {
                if slot.is_calculated {
                    outputs.accumulate(tag, slot)?;
                }
            }
            new_entries.push(new_entry);
        }
        Ok(StaticData::Multiple(new_entries))
    }
}

/// One-shot builder for [`AdditiveOutput`]. Consuming the builder is the
/// only way to obtain the composite, so laws cannot be attached after
/// the composite is in use.
#[derive(Debug, Default)]
pub struct AdditiveOutputBuilder {
    laws: Vec<Law>,
}

impl AdditiveOutputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a sub-law. Evaluation and static-data order follow the
    /// attachment order.
    pub fn add_law(mut self, law: Law) -> Self {
        self.laws.push(law);
        self
    }

    /// # Errors
    /// [`ConstitutiveError::EmptyComposite`] if no law was attached.
    pub fn build(self) -> Result<Law> {
        if self.laws.is_empty() {
            return Err(ConstitutiveError::EmptyComposite);
        }
        Ok(Law::AdditiveOutput(AdditiveOutput { laws: self.laws }))
    }
}
