//! GitHub Actions IR Builder
//!
//! Lowers a parsed workflow document into analysis-graph nodes: jobs in
//! dependency order, declarative env/matrix blocks as imperative writes, run
//! steps as bash scripts, and the modelled actions (toolchain setup,
//! artifact upload/download, releases, checkout).

use indexmap::IndexMap;

use crate::dataflow::context::{Context, ContextId, CtxRef};
use crate::dataflow::engine::Analysis;
use crate::dataflow::error::CallGraphError;
use crate::dataflow::facts::{ScopeId, Value};
use crate::dataflow::graph::{Cfg, InterpretationKey, NodeId, NodeKind, VarAssignKind};
use crate::workflow::expr::extract_value_from_expr_string;
use crate::workflow::model::{
    ActionStep, EnvMap, Matrix, MatrixValue, NormalJob, ReusableWorkflowCallJob, RunStep, Scalar,
    Step, StringOrList, Workflow,
};
use std::collections::BTreeMap;

// =============================================================================
// ENTRY
// =============================================================================

/// Create the interpretation node for a workflow document, with its owned
/// workflow context.
pub fn build_raw_workflow(
    analysis: &mut Analysis,
    workflow: Workflow,
    analysis_ctx: ContextId,
    source_filepath: &str,
) -> NodeId {
    let workflow_ctx =
        analysis
            .contexts
            .create_workflow(&mut analysis.scopes, analysis_ctx, source_filepath);
    analysis.graph.alloc(NodeKind::RawWorkflow {
        workflow,
        ctx: CtxRef::owned_context(workflow_ctx),
    })
}

// =============================================================================
// HELPERS
// =============================================================================

fn ctx_id(ctx: CtxRef) -> Result<ContextId, CallGraphError> {
    ctx.context_id()
        .ok_or_else(|| CallGraphError("expected a context reference".into()))
}

fn scope_of(ctx_ref: CtxRef, what: &str) -> Result<ScopeId, CallGraphError> {
    ctx_ref
        .scope_id()
        .ok_or_else(|| CallGraphError(format!("expected {what} scope reference")))
}

fn has_default(analysis: &Analysis, id: NodeId) -> bool {
    analysis
        .graph
        .node(id)
        .interpretations
        .contains_key(&InterpretationKey::Default)
}

fn default_interp(child: NodeId) -> Vec<(InterpretationKey, NodeId)> {
    vec![(InterpretationKey::Default, child)]
}

fn build_sequence(analysis: &mut Analysis, children: &[NodeId]) -> NodeId {
    let cfg = Cfg::from_sequence(children);
    let node = analysis.graph.alloc(NodeKind::SimpleSequence { cfg });
    for &child in children {
        analysis.graph.set_parent(child, node);
    }
    node
}

fn build_alternatives(analysis: &mut Analysis, children: Vec<NodeId>) -> NodeId {
    let node = analysis.graph.alloc(NodeKind::SimpleAlternatives {
        children: children.clone(),
    });
    for child in children {
        analysis.graph.set_parent(child, node);
    }
    node
}

/// Convert a `with:` block to value expressions. String inputs go through
/// expression extraction; unresolvable inputs are skipped.
fn convert_with_params(
    with: Option<&IndexMap<String, Scalar>>,
    var_scope: Option<ScopeId>,
) -> BTreeMap<String, Value> {
    let mut params = BTreeMap::new();
    let Some(with) = with else { return params };
    for (key, scalar) in with {
        let value = match scalar {
            Scalar::String(text) => match extract_value_from_expr_string(text, var_scope) {
                Ok(value) => value,
                Err(error) => {
                    tracing::debug!(input = key.as_str(), %error, "skipping unresolvable input");
                    continue;
                }
            },
            other => Value::lit(other.to_workflow_string()),
        };
        params.insert(key.clone(), value);
    }
    params
}

/// Split an action/workflow `uses` reference into name and version.
fn split_uses(uses: &str) -> (String, Option<String>) {
    match uses.rsplit_once('@') {
        Some((name, version)) if !version.is_empty() => {
            (name.to_string(), Some(version.to_string()))
        }
        Some((name, _)) => (name.to_string(), None),
        None => (uses.to_string(), None),
    }
}

/// Topological order of the job dependency graph; dependencies come first.
/// Ties resolve in document order.
fn topological_order(
    deps: &IndexMap<String, Vec<String>>,
) -> Result<Vec<String>, CallGraphError> {
    let mut order: Vec<String> = Vec::new();
    let mut emitted: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    while order.len() < deps.len() {
        let mut progressed = false;
        for (job_id, edges) in deps {
            if emitted.contains(job_id) {
                continue;
            }
            if edges.iter().all(|dep| emitted.contains(dep)) {
                order.push(job_id.clone());
                emitted.insert(job_id.clone());
                progressed = true;
            }
        }
        if !progressed {
            return Err(CallGraphError("job dependency cycle".into()));
        }
    }
    Ok(order)
}

fn find_job_id_case_insensitive(jobs: &IndexMap<String, NodeId>, job_id: &str) -> Option<String> {
    if jobs.contains_key(job_id) {
        return Some(job_id.to_string());
    }
    jobs.keys()
        .find(|candidate| candidate.eq_ignore_ascii_case(job_id))
        .cloned()
}

fn needs_edges(needs: Option<&StringOrList>) -> Vec<&str> {
    needs.map(|n| n.iter().collect()).unwrap_or_default()
}

// =============================================================================
// WORKFLOW / JOB INTERPRETATIONS
// =============================================================================

/// Interpret the document into the workflow control-flow node.
pub fn identify_raw_workflow(
    analysis: &mut Analysis,
    id: NodeId,
    workflow: &Workflow,
    ctx: CtxRef,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    if has_default(analysis, id) {
        return Ok(Vec::new());
    }
    let workflow_ctx = ctx_id(ctx)?;

    let mut jobs: IndexMap<String, NodeId> = IndexMap::new();
    for (job_id, job) in &workflow.jobs {
        let job_ctx = analysis
            .contexts
            .create_job(&mut analysis.scopes, workflow_ctx)?;
        let (normal, reusable) = match job {
            crate::workflow::model::Job::Normal(normal) => (Some(normal.clone()), None),
            crate::workflow::model::Job::ReusableCall(call) => (None, Some(call.clone())),
        };
        let node = analysis.graph.alloc(NodeKind::RawJob {
            job_id: job_id.clone(),
            normal,
            reusable,
            ctx: CtxRef::owned_context(job_ctx),
        });
        jobs.insert(job_id.clone(), node);
    }

    let mut deps: IndexMap<String, Vec<String>> = IndexMap::new();
    for (job_id, job) in &workflow.jobs {
        let needs = match job {
            crate::workflow::model::Job::Normal(normal) => needs_edges(normal.needs.as_ref()),
            crate::workflow::model::Job::ReusableCall(call) => needs_edges(call.needs.as_ref()),
        };
        let mut edges = Vec::new();
        for need in needs {
            let actual = find_job_id_case_insensitive(&jobs, need)
                .ok_or_else(|| CallGraphError(format!("needs refers to invalid job: {need}")))?;
            edges.push(actual);
        }
        deps.insert(job_id.clone(), edges);
    }
    let order = topological_order(&deps)?;

    let mut children: Vec<NodeId> = Vec::new();
    if let Some(env) = &workflow.env {
        children.push(analysis.graph.alloc(NodeKind::EnvBlock {
            env: env.clone(),
            ctx: ctx.non_owned(),
        }));
    }
    for job_id in &order {
        children.push(jobs[job_id]);
    }

    let cfg = Cfg::from_sequence(&children);
    let node = analysis.graph.alloc(NodeKind::WorkflowNode {
        ctx: ctx.non_owned(),
        cfg,
    });
    for child in children {
        analysis.graph.set_parent(child, node);
    }
    Ok(default_interp(node))
}

/// Interpret a job as either a normal job or a reusable workflow call.
pub fn identify_raw_job(
    analysis: &mut Analysis,
    id: NodeId,
    job_id: &str,
    normal: &Option<NormalJob>,
    reusable: &Option<ReusableWorkflowCallJob>,
    ctx: CtxRef,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    if has_default(analysis, id) {
        return Ok(Vec::new());
    }
    if let Some(normal) = normal {
        let node = build_normal_job(analysis, normal, job_id, ctx)?;
        return Ok(default_interp(node));
    }
    if let Some(call) = reusable {
        let job = ctx_id(ctx)?;
        let var_scope = analysis.contexts.get(job).as_job()?.job_variables.scope_id();
        let (uses_name, uses_version) = split_uses(&call.uses);
        let with_params = convert_with_params(call.with.as_ref(), var_scope);
        let node = analysis.graph.alloc(NodeKind::ReusableWorkflowCall {
            job_id: job_id.to_string(),
            ctx: ctx.non_owned(),
            uses_name,
            uses_version,
            with_params,
        });
        return Ok(default_interp(node));
    }
    Err(CallGraphError("invalid job".into()))
}

/// Build the control-flow node of a normal job: matrix, env, then steps.
fn build_normal_job(
    analysis: &mut Analysis,
    job: &NormalJob,
    job_id: &str,
    ctx: CtxRef,
) -> Result<NodeId, CallGraphError> {
    let job_ctx = ctx_id(ctx)?;
    let mut children: Vec<NodeId> = Vec::new();

    if let Some(matrix) = job.strategy.as_ref().and_then(|s| s.matrix.as_ref()) {
        children.push(analysis.graph.alloc(NodeKind::MatrixBlock {
            matrix: matrix.clone(),
            ctx: ctx.non_owned(),
        }));
    }
    if let Some(env) = &job.env {
        children.push(analysis.graph.alloc(NodeKind::EnvBlock {
            env: env.clone(),
            ctx: ctx.non_owned(),
        }));
    }
    for step in &job.steps {
        let step_id = match step {
            Step::Action(action) => action.id.as_deref(),
            Step::Run(run) => run.id.as_deref(),
            Step::Other(_) => None,
        };
        let step_ctx = analysis
            .contexts
            .create_step(&mut analysis.scopes, job_ctx, step_id)?;
        children.push(analysis.graph.alloc(NodeKind::RawStep {
            step: step.clone(),
            ctx: CtxRef::owned_context(step_ctx),
        }));
    }

    let cfg = Cfg::from_sequence(&children);
    let node = analysis.graph.alloc(NodeKind::NormalJobNode {
        job_id: job_id.to_string(),
        ctx: ctx.non_owned(),
        cfg,
    });
    for child in children {
        analysis.graph.set_parent(child, node);
    }
    Ok(node)
}

// =============================================================================
// STEP INTERPRETATIONS
// =============================================================================

/// Interpret a step as an action step or a run step.
pub fn identify_raw_step(
    analysis: &mut Analysis,
    id: NodeId,
    step: &Step,
    ctx: CtxRef,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    if has_default(analysis, id) {
        return Ok(Vec::new());
    }
    match step {
        Step::Action(action) => {
            let node = analysis.graph.alloc(NodeKind::RawActionStep {
                step: action.clone(),
                ctx: ctx.non_owned(),
            });
            Ok(default_interp(node))
        }
        Step::Run(run) => {
            let node = build_run_step(analysis, run, ctx)?;
            Ok(default_interp(node))
        }
        Step::Other(_) => Err(CallGraphError("invalid step".into())),
    }
}

/// Build the run-step node: optional env block, then the shell script.
fn build_run_step(
    analysis: &mut Analysis,
    run: &RunStep,
    ctx: CtxRef,
) -> Result<NodeId, CallGraphError> {
    let step_ctx = ctx_id(ctx)?;
    let mut children: Vec<NodeId> = Vec::new();
    if let Some(env) = &run.env {
        children.push(analysis.graph.alloc(NodeKind::EnvBlock {
            env: env.clone(),
            ctx: ctx.non_owned(),
        }));
    }
    let script_ctx =
        analysis
            .contexts
            .create_bash_from_run_step(&mut analysis.scopes, step_ctx, "")?;
    children.push(analysis.graph.alloc(NodeKind::RawBashScript {
        script: Value::lit(run.run.clone()),
        ctx: CtxRef::owned_context(script_ctx),
    }));

    let cfg = Cfg::from_sequence(&children);
    let node = analysis.graph.alloc(NodeKind::RunStep {
        ctx: ctx.non_owned(),
        cfg,
    });
    for child in children {
        analysis.graph.set_parent(child, node);
    }
    Ok(node)
}

/// Resolve an action step's `uses` and `with:` inputs.
pub fn identify_raw_action_step(
    analysis: &mut Analysis,
    id: NodeId,
    step: &ActionStep,
    ctx: CtxRef,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    if has_default(analysis, id) {
        return Ok(Vec::new());
    }
    let step_ctx = ctx_id(ctx)?;
    let job = analysis
        .contexts
        .get(step_ctx)
        .as_step()?
        .job
        .context_id()
        .ok_or_else(|| CallGraphError("step context lacks job".into()))?;
    let var_scope = analysis.contexts.get(job).as_job()?.job_variables.scope_id();

    let (uses_name, uses_version) = split_uses(&step.uses);
    let with_params = convert_with_params(step.with.as_ref(), var_scope);
    let node = analysis.graph.alloc(NodeKind::ActionStepNode {
        step: step.clone(),
        ctx: ctx.non_owned(),
        uses_name,
        uses_version,
        with_params,
    });
    Ok(default_interp(node))
}

/// Interpret the semantics of the supported actions.
pub fn identify_action_step(
    analysis: &mut Analysis,
    id: NodeId,
    ctx: CtxRef,
    uses_name: &str,
    with_params: &BTreeMap<String, Value>,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    if has_default(analysis, id) {
        return Ok(Vec::new());
    }
    let step_ctx = ctx_id(ctx)?;
    let step = analysis.contexts.get(step_ctx).as_step()?;
    let job = step
        .job
        .context_id()
        .ok_or_else(|| CallGraphError("step context lacks job".into()))?;
    let job_ctx = analysis.contexts.get(job).as_job()?;
    let filesystem = scope_of(job_ctx.filesystem, "filesystem")?;
    let workflow = job_ctx
        .workflow
        .context_id()
        .ok_or_else(|| CallGraphError("job context lacks workflow".into()))?;
    let workflow_ctx = analysis.contexts.get(workflow).as_workflow()?;
    let artifacts = scope_of(workflow_ctx.artifacts, "artifacts")?;
    let releases = scope_of(workflow_ctx.releases, "releases")?;

    let param = |name: &str| with_params.get(name).cloned();
    let param_or = |name: &str, fallback: &str| {
        with_params
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::lit(fallback))
    };

    let child = match uses_name {
        "actions/checkout" => analysis.graph.alloc(NodeKind::GitCheckout),

        "actions/setup-java" => analysis.graph.alloc(NodeKind::InstallPackage {
            scope: filesystem,
            name: Value::lit("java"),
            version: param_or("java-version", ""),
            distribution: param_or("distribution", ""),
            url: Value::lit("https://github.com/actions/setup-java"),
        }),

        "graalvm/setup-graalvm" => analysis.graph.alloc(NodeKind::InstallPackage {
            scope: filesystem,
            name: Value::lit("java"),
            version: param_or("java-version", ""),
            distribution: param_or("distribution", "graalvm"),
            url: Value::lit("https://github.com/graalvm/setup-graalvm"),
        }),

        "oracle-actions/setup-java" => analysis.graph.alloc(NodeKind::InstallPackage {
            scope: filesystem,
            name: Value::lit("java"),
            version: param_or("release", ""),
            distribution: param_or("website", "oracle.com"),
            url: Value::lit("https://github.com/oracle-actions/setup-java"),
        }),

        "actions/setup-python" => analysis.graph.alloc(NodeKind::InstallPackage {
            scope: filesystem,
            name: Value::lit("python"),
            version: param_or("python-version", ""),
            distribution: Value::lit(""),
            url: Value::lit(""),
        }),

        "actions/upload-artifact" => {
            let (Some(name), Some(path)) = (param("name"), param("path")) else {
                return noop_default(analysis);
            };
            let split = crate::dataflow::eval::split_str_expr(&path, '\n', -1);
            if let [single] = split.as_slice() {
                analysis.graph.alloc(NodeKind::UploadArtifact {
                    artifacts,
                    name,
                    file: Value::basename(single.clone()),
                    filesystem,
                    path: single.clone(),
                })
            } else {
                // Multi-line path inputs drop blank entries.
                let uploads: Vec<NodeId> = split
                    .into_iter()
                    .filter(|p| p != &Value::lit(""))
                    .map(|path| {
                        analysis.graph.alloc(NodeKind::UploadArtifact {
                            artifacts,
                            name: name.clone(),
                            file: Value::basename(path.clone()),
                            filesystem,
                            path,
                        })
                    })
                    .collect();
                if uploads.is_empty() {
                    analysis.graph.alloc(NodeKind::NoOp)
                } else {
                    build_sequence(analysis, &uploads)
                }
            }
        }

        "actions/download-artifact" => {
            let Some(name) = param("name") else {
                return noop_default(analysis);
            };
            analysis.graph.alloc(NodeKind::DownloadArtifact {
                artifacts,
                name,
                filesystem,
            })
        }

        "softprops/action-gh-release" => {
            let Some(files) = param("files") else {
                return noop_default(analysis);
            };
            let release_name = Value::lit(id.0.to_string());
            let split = crate::dataflow::eval::split_str_expr(&files, '\n', -1);
            if let [single] = split.as_slice() {
                analysis.graph.alloc(NodeKind::Release {
                    releases,
                    name: release_name,
                    file: Value::basename(single.clone()),
                    filesystem,
                    path: single.clone(),
                })
            } else {
                // Multi-line file inputs drop blank entries.
                let uploads: Vec<NodeId> = split
                    .into_iter()
                    .filter(|p| p != &Value::lit(""))
                    .map(|path| {
                        analysis.graph.alloc(NodeKind::Release {
                            releases,
                            name: release_name.clone(),
                            file: Value::basename(path.clone()),
                            filesystem,
                            path,
                        })
                    })
                    .collect();
                build_sequence(analysis, &uploads)
            }
        }

        _ => analysis.graph.alloc(NodeKind::NoOp),
    };
    Ok(default_interp(child))
}

fn noop_default(
    analysis: &mut Analysis,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    Ok(default_interp(analysis.graph.alloc(NodeKind::NoOp)))
}

/// Interpretation for nodes whose only expansion is a no-op (reusable
/// workflow calls are resolved but not yet modelled).
pub fn identify_noop_default(
    analysis: &mut Analysis,
    id: NodeId,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    if has_default(analysis, id) {
        return Ok(Vec::new());
    }
    noop_default(analysis)
}

// =============================================================================
// ENV / MATRIX BLOCKS
// =============================================================================

/// Interpret an env block into a sequence of variable writes.
pub fn identify_env_block(
    analysis: &mut Analysis,
    id: NodeId,
    env: &EnvMap,
    ctx: CtxRef,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    if has_default(analysis, id) {
        return Ok(Vec::new());
    }
    let owner = ctx_id(ctx)?;
    let (env_scope, var_scope) = match analysis.contexts.get(owner) {
        Context::Workflow(c) => (scope_of(c.env, "env")?, None),
        Context::Job(c) => (scope_of(c.env, "env")?, c.job_variables.scope_id()),
        Context::Step(c) => {
            let job = c
                .job
                .context_id()
                .ok_or_else(|| CallGraphError("step context lacks job".into()))?;
            (
                scope_of(c.env, "env")?,
                analysis.contexts.get(job).as_job()?.job_variables.scope_id(),
            )
        }
        _ => return Err(CallGraphError("env block in unexpected context".into())),
    };

    let mut writes: Vec<NodeId> = Vec::new();
    for (key, value) in env {
        let value = match value {
            Scalar::String(text) => match extract_value_from_expr_string(text, var_scope) {
                Ok(value) => value,
                Err(error) => {
                    tracing::debug!(var = key.as_str(), %error, "skipping unresolvable env entry");
                    continue;
                }
            },
            other => Value::lit(other.to_workflow_string()),
        };
        writes.push(analysis.graph.alloc(NodeKind::VarAssign {
            kind: VarAssignKind::GithubEnvVar,
            scope: env_scope,
            name: Value::lit(key.clone()),
            value,
        }));
    }

    let child = if writes.is_empty() {
        analysis.graph.alloc(NodeKind::NoOp)
    } else {
        build_sequence(analysis, &writes)
    };
    Ok(default_interp(child))
}

/// Interpret a matrix block: one set of alternatives per matrix key, each
/// alternative writing one of the key's values.
pub fn identify_matrix_block(
    analysis: &mut Analysis,
    id: NodeId,
    matrix: &Matrix,
    ctx: CtxRef,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    if has_default(analysis, id) {
        return Ok(Vec::new());
    }
    let job = ctx_id(ctx)?;
    let job_vars = scope_of(
        analysis.contexts.get(job).as_job()?.job_variables,
        "job_variables",
    )?;

    let mut alternative_sets: Vec<NodeId> = Vec::new();
    for (key, values) in matrix {
        let MatrixValue::List(values) = values else {
            // include/exclude blocks and expression strings are not expanded.
            continue;
        };
        let mut writes: Vec<NodeId> = Vec::new();
        for value in values {
            let value = match value {
                Scalar::String(text) => {
                    match extract_value_from_expr_string(text, Some(job_vars)) {
                        Ok(value) => value,
                        Err(error) => {
                            tracing::debug!(
                                axis = key.as_str(),
                                %error,
                                "skipping unresolvable matrix entry"
                            );
                            continue;
                        }
                    }
                }
                other => Value::lit(other.to_workflow_string()),
            };
            writes.push(analysis.graph.alloc(NodeKind::VarAssign {
                kind: VarAssignKind::GithubJobVar,
                scope: job_vars,
                name: Value::lit(format!("matrix.{key}")),
                value,
            }));
        }
        if !writes.is_empty() {
            alternative_sets.push(build_alternatives(analysis, writes));
        }
    }

    let child = if alternative_sets.is_empty() {
        analysis.graph.alloc(NodeKind::NoOp)
    } else {
        build_sequence(analysis, &alternative_sets)
    };
    Ok(default_interp(child))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topological_order_dependencies_first() {
        let mut deps = IndexMap::new();
        deps.insert("publish".to_string(), vec!["build".to_string()]);
        deps.insert("build".to_string(), Vec::new());
        deps.insert("test".to_string(), vec!["build".to_string()]);
        let order = topological_order(&deps).unwrap();
        assert_eq!(order[0], "build");
        assert!(order.iter().position(|j| j == "publish").unwrap() > 0);
    }

    #[test]
    fn test_topological_order_detects_cycle() {
        let mut deps = IndexMap::new();
        deps.insert("a".to_string(), vec!["b".to_string()]);
        deps.insert("b".to_string(), vec!["a".to_string()]);
        assert!(topological_order(&deps).is_err());
    }

    #[test]
    fn test_split_uses() {
        assert_eq!(
            split_uses("actions/setup-java@v3"),
            ("actions/setup-java".to_string(), Some("v3".to_string()))
        );
        assert_eq!(split_uses("local/action"), ("local/action".to_string(), None));
    }
}
