//! Workflow Document Model
//!
//! Serde data model for GitHub Actions workflow files. Mappings use
//! `IndexMap` so that jobs, steps, env entries and matrix axes iterate in
//! document order, which keeps the analysis deterministic.

use indexmap::IndexMap;
use serde::Deserialize;

/// A parsed workflow document.
#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "on")]
    pub on_triggers: Option<serde_yaml::Value>,
    #[serde(default)]
    pub env: Option<EnvMap>,
    pub jobs: IndexMap<String, Job>,
}

pub type EnvMap = IndexMap<String, EnvValue>;

/// A job is either a normal job with steps or a call to a reusable workflow.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Job {
    ReusableCall(ReusableWorkflowCallJob),
    Normal(NormalJob),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalJob {
    #[serde(rename = "runs-on")]
    pub runs_on: Option<serde_yaml::Value>,
    #[serde(default)]
    pub needs: Option<StringOrList>,
    #[serde(default)]
    pub env: Option<EnvMap>,
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReusableWorkflowCallJob {
    pub uses: String,
    #[serde(default)]
    pub with: Option<IndexMap<String, Scalar>>,
    #[serde(default)]
    pub needs: Option<StringOrList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Strategy {
    #[serde(default)]
    pub matrix: Option<Matrix>,
}

/// Matrix axes. Non-list entries (`include`/`exclude` blocks, expression
/// strings) are preserved but ignored by the interpretation.
pub type Matrix = IndexMap<String, MatrixValue>;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MatrixValue {
    List(Vec<Scalar>),
    Other(serde_yaml::Value),
}

/// A step either invokes an action (`uses`) or runs a shell snippet (`run`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Action(ActionStep),
    Run(RunStep),
    /// Steps with neither `uses` nor `run` (malformed documents).
    Other(serde_yaml::Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionStep {
    pub uses: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub with: Option<IndexMap<String, Scalar>>,
    #[serde(default)]
    pub env: Option<EnvMap>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStep {
    pub run: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub env: Option<EnvMap>,
}

/// `needs` accepts a single job id or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            StringOrList::One(s) => std::slice::from_ref(s).iter().map(String::as_str),
            StringOrList::Many(v) => v[..].iter().map(String::as_str),
        }
    }
}

/// YAML scalar in a `with:` block or matrix axis.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// String form the workflow runtime would substitute for this scalar.
    pub fn to_workflow_string(&self) -> String {
        match self {
            Scalar::Bool(true) => "true".to_string(),
            Scalar::Bool(false) => "false".to_string(),
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Env block values: strings (possibly with expressions), bools or numbers.
pub type EnvValue = Scalar;

/// Parse a workflow document from YAML text.
pub fn parse_workflow(source: &str) -> Result<Workflow, serde_yaml::Error> {
    serde_yaml::from_str(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name: Release
on:
  push:
    tags: ['v*']
env:
  LANG: en_US.UTF-8
jobs:
  build:
    runs-on: ubuntu-latest
    strategy:
      matrix:
        java: [11, 17]
    steps:
      - uses: actions/checkout@v3
      - uses: actions/setup-java@v3
        with:
          java-version: ${{ matrix.java }}
          distribution: temurin
      - id: build
        run: |
          mvn package
          echo "version=1.2.3" >> $GITHUB_OUTPUT
  publish:
    needs: build
    runs-on: ubuntu-latest
    steps:
      - uses: actions/upload-artifact@v3
        with:
          name: jars
          path: target/app.jar
  call:
    needs: [build]
    uses: ./.github/workflows/reusable.yml
    with:
      dry-run: true
"#;

    #[test]
    fn test_parse_sample_workflow() {
        let wf = parse_workflow(SAMPLE).expect("workflow should parse");
        assert_eq!(wf.name.as_deref(), Some("Release"));
        assert_eq!(wf.jobs.len(), 3);

        let Job::Normal(build) = &wf.jobs["build"] else {
            panic!("expected normal job");
        };
        assert_eq!(build.steps.len(), 3);
        let Step::Action(setup) = &build.steps[1] else {
            panic!("expected action step");
        };
        assert_eq!(setup.uses, "actions/setup-java@v3");
        let with = setup.with.as_ref().unwrap();
        assert_eq!(with["java-version"].as_str(), Some("${{ matrix.java }}"));

        let Step::Run(run) = &build.steps[2] else {
            panic!("expected run step");
        };
        assert_eq!(run.id.as_deref(), Some("build"));
        assert!(run.run.contains("GITHUB_OUTPUT"));

        let Job::ReusableCall(call) = &wf.jobs["call"] else {
            panic!("expected reusable call job");
        };
        assert_eq!(call.uses, "./.github/workflows/reusable.yml");
        assert_eq!(
            call.with.as_ref().unwrap()["dry-run"],
            Scalar::Bool(true)
        );
    }

    #[test]
    fn test_matrix_values_parse_as_scalars() {
        let wf = parse_workflow(SAMPLE).unwrap();
        let Job::Normal(build) = &wf.jobs["build"] else {
            panic!("expected normal job");
        };
        let matrix = build.strategy.as_ref().unwrap().matrix.as_ref().unwrap();
        let MatrixValue::List(java) = &matrix["java"] else {
            panic!("expected matrix list");
        };
        assert_eq!(java[0].to_workflow_string(), "11");
        assert_eq!(java[1].to_workflow_string(), "17");
    }

    #[test]
    fn test_workflow_without_name_parses() {
        let wf = parse_workflow("jobs:\n  build:\n    runs-on: ubuntu-latest\n    steps: []\n")
            .expect("nameless workflow should parse");
        assert!(wf.name.is_none());
        assert_eq!(wf.jobs.len(), 1);
    }

    #[test]
    fn test_job_order_is_document_order() {
        let wf = parse_workflow(SAMPLE).unwrap();
        let ids: Vec<&String> = wf.jobs.keys().collect();
        assert_eq!(ids, ["build", "publish", "call"]);
    }
}
