//! Dataflow analysis engine
//!
//! Abstract interpretation over GitHub Actions workflows and bash scripts:
//! the facts model, ownership contexts, expression evaluation, the analysis
//! graph and the fixed-point engine, plus the Bash and GitHub IR builders.

pub mod bash_nodes;
pub mod context;
pub mod engine;
pub mod error;
pub mod eval;
pub mod facts;
pub mod github_nodes;
pub mod graph;
pub mod models;
pub mod state;

pub use context::{ContextId, Contexts, CtxRef};
pub use engine::{Analysis, ExecutionLimits};
pub use error::{AnalysisError, CallGraphError, ExprValueError};
pub use eval::{Evaluator, ReadBindings};
pub use facts::{Location, LocationSpecifier, ScopeId, Scopes, Value};
pub use graph::{ExitKind, Graph, InterpretationKey, NodeId, NodeKind};
pub use state::{State, StateTransferFilter};
