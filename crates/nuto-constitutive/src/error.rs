//! Error types for constitutive-law evaluation.

use crate::io::{InputTag, OutputTag, ParameterId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConstitutiveError>;

/// Errors raised while configuring or evaluating constitutive laws.
///
/// Evaluation failures always abort the surrounding element/composite
/// evaluation; nothing is ever silently defaulted. Composite laws wrap
/// sub-law failures in [`ConstitutiveError::SubLaw`] so the textual chain
/// records the calling context.
#[derive(Error, Debug)]
pub enum ConstitutiveError {
    #[error("{law} is not implemented for {dimension}D")]
    NotImplemented {
        law: &'static str,
        dimension: usize,
    },

    #[error("missing required constitutive input {0:?}")]
    MissingInput(InputTag),

    #[error("input {tag:?} has {len} components, expected {expected}")]
    InputDimensionMismatch {
        tag: InputTag,
        len: usize,
        expected: usize,
    },

    #[error("unknown parameter {0:?} for law {1}")]
    UnknownParameter(ParameterId, &'static str),

    #[error("output {0:?} cannot be accumulated, value kinds differ")]
    IncompatibleOutput(OutputTag),

    #[error("value needed to determine {0:?} was not calculated")]
    TangentNotCalculated(OutputTag),

    #[error("no output is associated with modified input {0:?}")]
    NoOutputForInput(InputTag),

    #[error("a composite law needs at least one attached law")]
    EmptyComposite,

    #[error("additive-input law accepts exactly one output law, a second was attached")]
    MultipleOutputLaws,

    #[error("additive-input law has no output law attached")]
    MissingOutputLaw,

    #[error("static data does not match the law that allocated it")]
    StaticDataMismatch,

    #[error("while evaluating sub-law {index} of a composite: {source}")]
    SubLaw {
        index: usize,
        #[source]
        source: Box<ConstitutiveError>,
    },
}
