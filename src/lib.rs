//! buildtrace - build pipeline dataflow analysis
//!
//! This library analyzes how a software component was built and released:
//! an abstract interpreter over GitHub Actions workflows and bash scripts
//! computes what flows into each observable sink (artifacts, releases,
//! variables, toolchain installs), and a commit finder resolves artifact
//! versions to the repository tags and commits they were built from.

pub mod analyzer;
pub mod ast;
pub mod dataflow;
pub mod parser;
pub mod repo;
pub mod workflow;

pub use analyzer::{Analyzer, AnalyzerError, AnalyzerOptions, FactReport};
pub use ast::types as bash_ast;
pub use dataflow::{Analysis, AnalysisError, CallGraphError, ExecutionLimits};
pub use parser::{parse, parse_expr, ParseError};
pub use repo::{
    determine_abstract_purl_type, find_commit, match_tags, AbstractPurlType, CommitFinderOutcome,
    FixedRepository, Purl, Repository,
};
pub use workflow::parse_workflow;
