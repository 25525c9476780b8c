use miette::Diagnostic;
use thiserror::Error;

use crate::primitive::PrimitiveKind;

/// Result type for structuring operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while structuring a control flow graph.
///
/// All of these are per-region failures: the analysis records the error,
/// abandons the offending region and keeps structuring the rest of the
/// graph.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unsupported {ways}-way {role} node")]
    #[diagnostic(code(flowstruct::unsupported_fan_out))]
    UnsupportedFanOut { role: &'static str, ways: usize },

    #[error("unable to locate follow node of {kind}")]
    #[diagnostic(code(flowstruct::unresolvable_follow))]
    UnresolvableFollow { kind: PrimitiveKind },

    #[error("unable to locate latch node in the original control flow graph")]
    #[diagnostic(code(flowstruct::latch_resolution))]
    LatchResolution,
}
