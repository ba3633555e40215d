//! Dataflow Error Surfaces
//!
//! All of these are recoverable at the node level: a malformed construct
//! degrades the offending node to a no-op instead of aborting the run.

use thiserror::Error;

/// Malformed analysis representation (unknown operator, wrong context kind,
/// invalid job reference, dependency cycle).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("call graph error: {0}")]
pub struct CallGraphError(pub String);

/// A workflow expression could not be resolved to a value under the current
/// document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("workflow expression error: {0}")]
pub struct ExprValueError(pub String);

/// Engine-level failure: resource limits or a programmer-visible invariant
/// violation. Aborts the traversal of the current component.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    CallGraph(#[from] CallGraphError),

    #[error("analysis step limit of {0} exceeded")]
    StepLimit(usize),

    #[error("analysis deadline exceeded")]
    DeadlineExceeded,
}
