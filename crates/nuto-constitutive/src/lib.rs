//! Constitutive laws and their composition.
//!
//! A law maps typed inputs (strain, temperature, relative humidity) to
//! typed outputs (stress, tangents) at one integration point. Laws are a
//! closed enum ([`Law`]); composites combine leaf laws either by summing
//! their outputs ([`AdditiveOutput`]) or by modifying the strain seen by
//! a single output law ([`AdditiveInputExplicit`]). History variables
//! live in [`StaticData`], committed by the caller on step acceptance.

pub mod additive_input_explicit;
pub mod additive_output;
pub mod eigenstrain;
pub mod error;
pub mod io;
pub mod law;
pub mod linear_elastic;
pub mod mises;
pub mod static_data;

pub use additive_input_explicit::{AdditiveInputExplicit, AdditiveInputExplicitBuilder};
pub use additive_output::{AdditiveOutput, AdditiveOutputBuilder};
pub use eigenstrain::{ConstantEigenstrain, MoistureShrinkage};
pub use error::ConstitutiveError;
pub use io::{
    Dimension, InputMap, InputTag, InputValue, OutputMap, OutputSlot, OutputTag, OutputValue,
    ParameterId,
};
pub use law::Law;
pub use linear_elastic::LinearElastic;
pub use mises::MisesPlasticity;
pub use static_data::{MisesHistory, StaticData};
