//! GitHub Actions workflow documents
//!
//! Typed data model for workflow YAML and the expression extractor for
//! `${{ ... }}` contexts.

pub mod expr;
pub mod model;

pub use model::{
    parse_workflow, ActionStep, EnvMap, EnvValue, Job, Matrix, MatrixValue, NormalJob,
    ReusableWorkflowCallJob, RunStep, Scalar, Step, Strategy, StringOrList, Workflow,
};
