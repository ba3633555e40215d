//! Analyzer
//!
//! Main entry point for dataflow analysis runs. Owns the arenas and the
//! analysis graph, builds the root node for a workflow document or a bash
//! script, drives the fixed point, and extracts the fact report that checks
//! and the CLI consume.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::dataflow::context::{ContextId, CtxRef};
use crate::dataflow::engine::{Analysis, ExecutionLimits};
use crate::dataflow::error::AnalysisError;
use crate::dataflow::facts::{LocationSpecifier, Value};
use crate::dataflow::github_nodes;
use crate::dataflow::graph::NodeKind;
use crate::dataflow::state::State;
use crate::workflow::model::{parse_workflow, Workflow};

/// Options for creating an analyzer.
#[derive(Debug, Default)]
pub struct AnalyzerOptions {
    /// Repository checkout the analyzed pipeline belongs to; used to resolve
    /// scripts invoked by path.
    pub repo_path: Option<PathBuf>,
    /// Resource ceilings for the fixed-point traversal.
    pub limits: ExecutionLimits,
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid workflow document: {0}")]
    Workflow(#[from] serde_yaml::Error),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Facts extracted from the final analysis states.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FactReport {
    /// Toolchains installed by the pipeline.
    pub installed_packages: Vec<String>,
    /// Values stored as pipeline artifacts.
    pub artifacts: Vec<String>,
    /// Values published as releases.
    pub releases: Vec<String>,
    /// Workflow/job variables written during the run.
    pub variables: Vec<String>,
    /// Environment variable writes observed.
    pub env_vars: Vec<String>,
    /// Number of package build invocations reached.
    pub maven_builds: usize,
    /// Number of repository checkouts reached.
    pub checkouts: usize,
    /// Number of echo sinks reached.
    pub echoes: usize,
}

/// The main analyzer environment.
pub struct Analyzer {
    pub analysis: Analysis,
    root_context: ContextId,
}

impl Analyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        let mut analysis = Analysis::new(options.limits);
        let repo_path = options
            .repo_path
            .map(|path| path.canonicalize().unwrap_or(path));
        let root_context = analysis.create_root_context(repo_path);
        Analyzer {
            analysis,
            root_context,
        }
    }

    /// Analyze a workflow document already parsed into the AST shape.
    pub fn analyze_workflow(
        &mut self,
        workflow: Workflow,
        source_filepath: &str,
    ) -> Result<FactReport, AnalyzerError> {
        let root = github_nodes::build_raw_workflow(
            &mut self.analysis,
            workflow,
            self.root_context,
            source_filepath,
        );
        self.analysis.run(root)?;
        Ok(self.report())
    }

    /// Analyze workflow YAML text.
    pub fn analyze_workflow_str(
        &mut self,
        source: &str,
        source_filepath: &str,
    ) -> Result<FactReport, AnalyzerError> {
        let workflow = parse_workflow(source)?;
        self.analyze_workflow(workflow, source_filepath)
    }

    /// Analyze a workflow file on disk.
    pub fn analyze_workflow_file(&mut self, path: &Path) -> Result<FactReport, AnalyzerError> {
        let source = std::fs::read_to_string(path).map_err(|source| AnalyzerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.analyze_workflow_str(&source, &path.display().to_string())
    }

    /// Analyze a bash script in isolation.
    pub fn analyze_script(
        &mut self,
        source: &str,
        source_filepath: &str,
    ) -> Result<FactReport, AnalyzerError> {
        let script_ctx = self.analysis.contexts.create_bash_isolated(
            &mut self.analysis.scopes,
            self.root_context,
            source_filepath,
        );
        let root = self.analysis.graph.alloc(NodeKind::RawBashScript {
            script: Value::lit(source),
            ctx: CtxRef::owned_context(script_ctx),
        });
        self.analysis.run(root)?;
        Ok(self.report())
    }

    /// Analyze a bash script file on disk.
    pub fn analyze_script_file(&mut self, path: &Path) -> Result<FactReport, AnalyzerError> {
        let source = std::fs::read_to_string(path).map_err(|source| AnalyzerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.analyze_script(&source, &path.display().to_string())
    }

    /// Union of every node's after-states; the per-node states survive in
    /// the graph for finer-grained consumers.
    pub fn combined_state(&self) -> State {
        let mut combined = State::new();
        let mut seq = 0u64;
        for id in self.analysis.graph.ids() {
            for state in self.analysis.graph.node(id).afters.values() {
                crate::dataflow::state::transfer_state(
                    state,
                    &mut combined,
                    &crate::dataflow::state::StateTransferFilter::All,
                    &mut seq,
                    true,
                );
            }
        }
        combined
    }

    /// Extract the fact report from the final states.
    pub fn report(&self) -> FactReport {
        let combined = self.combined_state();
        let scopes = &self.analysis.scopes;
        let mut report = FactReport::default();

        for (loc, values) in combined.iter() {
            let scope_name = scopes.name(loc.scope);
            for value in values.keys() {
                match &loc.spec {
                    LocationSpecifier::Installed(_) => {
                        report
                            .installed_packages
                            .push(format!("{} = {}", loc.render(scopes), value));
                    }
                    LocationSpecifier::Artifact { .. }
                    | LocationSpecifier::ArtifactAnyFilename(_) => {
                        let line = format!("{} = {}", loc.render(scopes), value);
                        if scope_name == "releases" {
                            report.releases.push(line);
                        } else {
                            report.artifacts.push(line);
                        }
                    }
                    LocationSpecifier::Variable(_) => {
                        let line = format!("{} = {}", loc.render(scopes), value);
                        if scope_name == "job_vars" || scope_name == "workflow_vars" {
                            report.variables.push(line);
                        } else if scope_name == "env" {
                            report.env_vars.push(line);
                        }
                    }
                    _ => {}
                }
            }
        }

        for id in self.analysis.graph.ids() {
            match self.analysis.graph.node(id).kind {
                NodeKind::MavenBuild { .. } => report.maven_builds += 1,
                NodeKind::GitCheckout => report.checkouts += 1,
                NodeKind::BashEcho { .. } => report.echoes += 1,
                _ => {}
            }
        }
        report
    }

    /// Look up a written value anywhere in the final states, by scope name,
    /// variable name and literal value.
    pub fn has_variable(&self, scope_name: &str, var_name: &str, value: &str) -> bool {
        let combined = self.combined_state();
        let result = combined.iter().any(|(loc, values)| {
            self.analysis.scopes.name(loc.scope) == scope_name
                && matches!(
                    &loc.spec,
                    LocationSpecifier::Variable(name) if name.as_literal() == Some(var_name)
                )
                && values.keys().any(|v| v.as_literal() == Some(value))
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_workflow(source: &str) -> Analyzer {
        let mut analyzer = Analyzer::new(AnalyzerOptions::default());
        analyzer
            .analyze_workflow_str(source, "ci.yml")
            .expect("analysis should succeed");
        analyzer
    }

    #[test]
    fn test_github_output_becomes_step_output_variable() {
        let analyzer = run_workflow(
            r#"
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - id: build
        run: 'echo "version=1.2.3" >> $GITHUB_OUTPUT'
"#,
        );
        assert!(analyzer.has_variable("job_vars", "steps.build.outputs.version", "1.2.3"));
    }

    #[test]
    fn test_matrix_expansion_installs_both_versions() {
        let analyzer = run_workflow(
            r#"
jobs:
  build:
    runs-on: ubuntu-latest
    strategy:
      matrix:
        java: [11, 17]
    steps:
      - uses: actions/setup-java@v3
        with:
          java-version: ${{ matrix.java }}
          distribution: temurin
"#,
        );
        let combined = analyzer.combined_state();
        let mut versions: Vec<String> = Vec::new();
        for (loc, values) in combined.iter() {
            if !matches!(loc.spec, LocationSpecifier::Installed(_)) {
                continue;
            }
            for value in values.keys() {
                if let Value::InstalledPackage { version, .. } = value {
                    if let Some(v) = version.as_literal() {
                        versions.push(v.to_string());
                    }
                }
            }
        }
        versions.sort();
        versions.dedup();
        assert_eq!(versions, vec!["11".to_string(), "17".to_string()]);
        // Both matrix values are recorded as job variables too.
        assert!(analyzer.has_variable("job_vars", "matrix.java", "11"));
        assert!(analyzer.has_variable("job_vars", "matrix.java", "17"));
    }

    #[test]
    fn test_pipe_through_base64_reaches_console() {
        let analyzer = run_workflow(
            r#"
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: 'echo hello | base64'
"#,
        );
        let combined = analyzer.combined_state();
        let found = combined.iter().any(|(loc, values)| {
            analyzer.analysis.scopes.name(loc.scope) == "console"
                && values
                    .keys()
                    .any(|v| v.as_literal() == Some("aGVsbG8=\n"))
        });
        assert!(found, "expected base64-encoded pipe output on the console");
    }

    #[test]
    fn test_upload_artifact_references_build_output() {
        let analyzer = run_workflow(
            r#"
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: 'mvn package'
      - uses: actions/upload-artifact@v3
        with:
          name: jars
          path: target/app.jar
"#,
        );
        let report = analyzer.report();
        assert_eq!(report.maven_builds, 1);
        // The uploaded file resolves to the opaque build output.
        let combined = analyzer.combined_state();
        let uploaded = combined.iter().any(|(loc, values)| {
            matches!(loc.spec, LocationSpecifier::Artifact { .. })
                && values
                    .keys()
                    .any(|v| matches!(v, Value::ArbitraryNewData(_)))
        });
        assert!(uploaded, "expected artifact contents to be the build output");
    }

    #[test]
    fn test_upload_artifact_with_empty_path_still_records_artifact() {
        let analyzer = run_workflow(
            r#"
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/upload-artifact@v3
        with:
          name: jars
          path: ''
"#,
        );
        // A single blank path still produces an artifact write; only blank
        // entries within multi-line inputs are dropped.
        let report = analyzer.report();
        assert_eq!(report.artifacts.len(), 1);
    }

    #[test]
    fn test_jobs_run_in_needs_order_and_share_artifacts() {
        let analyzer = run_workflow(
            r#"
jobs:
  publish:
    runs-on: ubuntu-latest
    needs: build
    steps:
      - uses: actions/download-artifact@v3
        with:
          name: jars
  build:
    runs-on: ubuntu-latest
    steps:
      - run: 'mvn package'
      - uses: actions/upload-artifact@v3
        with:
          name: jars
          path: target/app.jar
"#,
        );
        // The downloading job's filesystem sees the uploaded file contents.
        let combined = analyzer.combined_state();
        let downloaded = combined.iter().any(|(loc, values)| {
            analyzer.analysis.scopes.name(loc.scope) == "filesystem"
                && matches!(
                    &loc.spec,
                    LocationSpecifier::Filesystem(path) if path.as_literal() == Some("app.jar")
                )
                && values
                    .keys()
                    .any(|v| matches!(v, Value::ArbitraryNewData(_)))
        });
        assert!(downloaded, "expected downloaded artifact on the second job's filesystem");
    }

    #[test]
    fn test_workflow_env_flows_into_script() {
        let analyzer = run_workflow(
            r#"
env:
  APP_VERSION: 9.9.9
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - id: out
        run: 'echo "v=$APP_VERSION" >> $GITHUB_OUTPUT'
"#,
        );
        assert!(analyzer.has_variable("job_vars", "steps.out.outputs.v", "9.9.9"));
    }

    #[test]
    fn test_release_action_publishes_files() {
        let analyzer = run_workflow(
            r#"
jobs:
  release:
    runs-on: ubuntu-latest
    steps:
      - uses: softprops/action-gh-release@v1
        with:
          files: |
            dist/a.jar
            dist/b.jar
"#,
        );
        let report = analyzer.report();
        assert_eq!(report.releases.len(), 2);
    }

    #[test]
    fn test_script_analysis_assignment_and_exit() {
        let mut analyzer = Analyzer::new(AnalyzerOptions::default());
        analyzer
            .analyze_script("VERSION=1.0\nexit\nVERSION=2.0\n", "release.sh")
            .expect("analysis should succeed");
        // Both assignments are explored: the analysis is not path sensitive
        // about reachability beyond exit within the same sequence, but the
        // exit statement stops the default flow, so only the first write is
        // observable afterwards.
        assert!(analyzer.has_variable("env", "VERSION", "1.0"));
        assert!(!analyzer.has_variable("env", "VERSION", "2.0"));
    }

    #[test]
    fn test_exit_in_function_stops_only_the_script() {
        use std::io::Write;

        // An inner script that exits from within a nested construct; the
        // outer script continues after invoking it.
        let unique = format!(
            "buildtrace-test-{}-{}",
            std::process::id(),
            line!()
        );
        let dir = std::env::temp_dir().join(unique);
        std::fs::create_dir_all(&dir).unwrap();
        let inner = dir.join("inner.sh");
        let mut file = std::fs::File::create(&inner).unwrap();
        writeln!(file, "finish() {{ if true; then exit; INNER_AFTER=1; fi; }}").unwrap();
        writeln!(file, "finish").unwrap();
        drop(file);

        let mut analyzer = Analyzer::new(AnalyzerOptions {
            repo_path: Some(dir.clone()),
            ..Default::default()
        });
        analyzer
            .analyze_script("./inner.sh\nOUTER_AFTER=1\n", "outer.sh")
            .expect("analysis should succeed");

        // The caller proceeds after the inner script's exit.
        assert!(analyzer.has_variable("env", "OUTER_AFTER", "1"));
        // Inside the inner script, the assignment after the exit on the same
        // path is unreachable.
        assert!(!analyzer.has_variable("env", "INNER_AFTER", "1"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rerun_reaches_fixed_point() {
        let source = r#"
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - id: build
        run: 'echo "version=1.2.3" >> $GITHUB_OUTPUT'
"#;
        let mut analyzer = Analyzer::new(AnalyzerOptions::default());
        let workflow = parse_workflow(source).unwrap();
        let root = github_nodes::build_raw_workflow(
            &mut analyzer.analysis,
            workflow,
            analyzer.root_context,
            "ci.yml",
        );
        analyzer.analysis.run(root).unwrap();
        let first = analyzer.combined_state();
        analyzer.analysis.run(root).unwrap();
        let second = analyzer.combined_state();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_for_loop_exits_cleanly() {
        let mut analyzer = Analyzer::new(AnalyzerOptions::default());
        analyzer
            .analyze_script("for f in; do X=1; done\nY=2\n", "loop.sh")
            .expect("analysis should succeed");
        assert!(analyzer.has_variable("env", "Y", "2"));
    }

    #[test]
    fn test_function_call_through_declaration() {
        let mut analyzer = Analyzer::new(AnalyzerOptions::default());
        analyzer
            .analyze_script(
                "set_version() { VERSION=3.3.3; }\nset_version\n",
                "funcs.sh",
            )
            .expect("analysis should succeed");
        assert!(analyzer.has_variable("env", "VERSION", "3.3.3"));
    }

    #[test]
    fn test_basename_evaluation_scenario() {
        use crate::dataflow::eval::{Evaluator, ReadBindings};
        use std::collections::BTreeSet;

        let analyzer = Analyzer::new(AnalyzerOptions::default());
        let state = State::new();
        let evaluator = Evaluator::new(&state, &analyzer.analysis.scopes);
        let result = evaluator.transform_value(&Value::basename(Value::lit("a/b/c.sh")));
        assert_eq!(
            result,
            BTreeSet::from([(Value::lit("c.sh"), ReadBindings::empty())])
        );
    }

    #[test]
    fn test_step_limit_aborts_run() {
        let mut analyzer = Analyzer::new(AnalyzerOptions {
            limits: ExecutionLimits {
                max_steps: 2,
                deadline: None,
            },
            ..Default::default()
        });
        let result = analyzer.analyze_script("A=1\nB=2\nC=3\nD=4\n", "big.sh");
        assert!(matches!(
            result,
            Err(AnalyzerError::Analysis(AnalysisError::StepLimit(2)))
        ));
    }
}
