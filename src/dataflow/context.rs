//! Analysis Contexts
//!
//! A context is an ownership frame grouping related scopes: when the node
//! owning a context exits, the scopes the context owns are torn down (their
//! locations are filtered out of the transferred state). Contexts and scopes
//! live in arenas; every edge between them is an index tagged with whether
//! the reference is owning.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::dataflow::error::CallGraphError;
use crate::dataflow::facts::{LocationSpecifier, ScopeId, Scopes};

/// Index of a context in the context arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub u32);

/// Target of a context reference: either a scope or another context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefTarget {
    Scope(ScopeId),
    Context(ContextId),
}

/// A tagged reference: owning references control lifetime, non-owning
/// references are plain back-references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CtxRef {
    pub target: RefTarget,
    pub owned: bool,
}

impl CtxRef {
    pub fn owned_scope(id: ScopeId) -> Self {
        CtxRef {
            target: RefTarget::Scope(id),
            owned: true,
        }
    }

    pub fn scope(id: ScopeId) -> Self {
        CtxRef {
            target: RefTarget::Scope(id),
            owned: false,
        }
    }

    pub fn owned_context(id: ContextId) -> Self {
        CtxRef {
            target: RefTarget::Context(id),
            owned: true,
        }
    }

    pub fn context(id: ContextId) -> Self {
        CtxRef {
            target: RefTarget::Context(id),
            owned: false,
        }
    }

    /// The same reference without ownership.
    pub fn non_owned(self) -> Self {
        CtxRef {
            target: self.target,
            owned: false,
        }
    }

    pub fn scope_id(self) -> Option<ScopeId> {
        match self.target {
            RefTarget::Scope(id) => Some(id),
            RefTarget::Context(_) => None,
        }
    }

    pub fn context_id(self) -> Option<ContextId> {
        match self.target {
            RefTarget::Context(id) => Some(id),
            RefTarget::Scope(_) => None,
        }
    }
}

// =============================================================================
// CONTEXT KINDS
// =============================================================================

/// Root context, one per run.
#[derive(Debug, Clone)]
pub struct AnalysisCtx {
    /// Canonicalized repository checkout path, used to resolve and validate
    /// relative script invocations.
    pub repo_path: Option<PathBuf>,
}

/// Top-level scope of a workflow document.
#[derive(Debug, Clone)]
pub struct WorkflowCtx {
    pub analysis: CtxRef,
    pub artifacts: CtxRef,
    pub releases: CtxRef,
    pub env: CtxRef,
    pub workflow_variables: CtxRef,
    pub console: CtxRef,
    pub source_filepath: String,
}

/// A job within a workflow.
#[derive(Debug, Clone)]
pub struct JobCtx {
    pub workflow: CtxRef,
    pub filesystem: CtxRef,
    pub env: CtxRef,
    pub job_variables: CtxRef,
}

/// A step within a job.
#[derive(Debug, Clone)]
pub struct StepCtx {
    pub job: CtxRef,
    pub env: CtxRef,
    /// Name prefix for step output variables stored in the job variables,
    /// e.g. "steps.build.outputs.".
    pub output_var_prefix: Option<String>,
}

/// A bash script, whether from a run step, another script, or in isolation.
#[derive(Debug, Clone)]
pub struct BashScriptCtx {
    pub outer: CtxRef,
    pub filesystem: CtxRef,
    pub env: CtxRef,
    pub func_decls: CtxRef,
    pub stdin_scope: CtxRef,
    pub stdin_loc: LocationSpecifier,
    pub stdout_scope: CtxRef,
    pub stdout_loc: LocationSpecifier,
    pub source_filepath: String,
}

/// A pipe between two commands. Introduces the scope and location standing
/// for the pipe itself.
#[derive(Debug, Clone)]
pub struct PipeCtx {
    pub script: CtxRef,
    pub pipe_scope: CtxRef,
    pub pipe_loc: LocationSpecifier,
}

#[derive(Debug, Clone)]
pub enum Context {
    Analysis(AnalysisCtx),
    Workflow(WorkflowCtx),
    Job(JobCtx),
    Step(StepCtx),
    BashScript(BashScriptCtx),
    Pipe(PipeCtx),
}

impl Context {
    /// The direct scope/context references of this context, owned and
    /// non-owned alike.
    pub fn direct_refs(&self) -> Vec<CtxRef> {
        match self {
            Context::Analysis(_) => Vec::new(),
            Context::Workflow(c) => vec![
                c.analysis,
                c.artifacts,
                c.releases,
                c.env,
                c.workflow_variables,
                c.console,
            ],
            Context::Job(c) => vec![c.workflow, c.filesystem, c.env, c.job_variables],
            Context::Step(c) => vec![c.job, c.env],
            Context::BashScript(c) => vec![
                c.outer,
                c.filesystem,
                c.env,
                c.func_decls,
                c.stdin_scope,
                c.stdout_scope,
            ],
            Context::Pipe(c) => vec![c.script, c.pipe_scope],
        }
    }

    pub fn as_workflow(&self) -> Result<&WorkflowCtx, CallGraphError> {
        match self {
            Context::Workflow(c) => Ok(c),
            _ => Err(CallGraphError("expected workflow context".into())),
        }
    }

    pub fn as_job(&self) -> Result<&JobCtx, CallGraphError> {
        match self {
            Context::Job(c) => Ok(c),
            _ => Err(CallGraphError("expected job context".into())),
        }
    }

    pub fn as_step(&self) -> Result<&StepCtx, CallGraphError> {
        match self {
            Context::Step(c) => Ok(c),
            _ => Err(CallGraphError("expected step context".into())),
        }
    }

    pub fn as_bash(&self) -> Result<&BashScriptCtx, CallGraphError> {
        match self {
            Context::BashScript(c) => Ok(c),
            _ => Err(CallGraphError("expected bash script context".into())),
        }
    }

    pub fn as_pipe(&self) -> Result<&PipeCtx, CallGraphError> {
        match self {
            Context::Pipe(c) => Ok(c),
            _ => Err(CallGraphError("expected pipe context".into())),
        }
    }
}

// =============================================================================
// CONTEXT ARENA
// =============================================================================

/// Arena owning every context created during an analysis run.
#[derive(Debug, Default)]
pub struct Contexts {
    entries: Vec<Context>,
}

impl Contexts {
    pub fn new() -> Self {
        Contexts::default()
    }

    pub fn alloc(&mut self, context: Context) -> ContextId {
        let id = ContextId(self.entries.len() as u32);
        self.entries.push(context);
        id
    }

    pub fn get(&self, id: ContextId) -> &Context {
        &self.entries[id.0 as usize]
    }

    // -------------------------------------------------------------------------
    // Constructors for each context shape
    // -------------------------------------------------------------------------

    pub fn create_analysis(&mut self, repo_path: Option<PathBuf>) -> ContextId {
        self.alloc(Context::Analysis(AnalysisCtx { repo_path }))
    }

    /// New workflow context with its five owned scopes.
    pub fn create_workflow(
        &mut self,
        scopes: &mut Scopes,
        analysis: ContextId,
        source_filepath: impl Into<String>,
    ) -> ContextId {
        let artifacts = scopes.alloc("artifacts", None);
        let releases = scopes.alloc("releases", None);
        let env = scopes.alloc("env", None);
        let workflow_variables = scopes.alloc("workflow_vars", None);
        let console = scopes.alloc("console", None);
        self.alloc(Context::Workflow(WorkflowCtx {
            analysis: CtxRef::context(analysis),
            artifacts: CtxRef::owned_scope(artifacts),
            releases: CtxRef::owned_scope(releases),
            env: CtxRef::owned_scope(env),
            workflow_variables: CtxRef::owned_scope(workflow_variables),
            console: CtxRef::owned_scope(console),
            source_filepath: source_filepath.into(),
        }))
    }

    /// New job context; env and job variables inherit from the workflow.
    pub fn create_job(
        &mut self,
        scopes: &mut Scopes,
        workflow: ContextId,
    ) -> Result<ContextId, CallGraphError> {
        let wf = self.get(workflow).as_workflow()?;
        let wf_env = wf.env.scope_id();
        let wf_vars = wf.workflow_variables.scope_id();
        let filesystem = scopes.alloc("filesystem", None);
        let env = scopes.alloc("env", wf_env);
        let job_variables = scopes.alloc("job_vars", wf_vars);
        Ok(self.alloc(Context::Job(JobCtx {
            workflow: CtxRef::context(workflow),
            filesystem: CtxRef::owned_scope(filesystem),
            env: CtxRef::owned_scope(env),
            job_variables: CtxRef::owned_scope(job_variables),
        })))
    }

    /// New step context; env inherits from the job. The output variable
    /// prefix is derived from the step id when one is present.
    pub fn create_step(
        &mut self,
        scopes: &mut Scopes,
        job: ContextId,
        step_id: Option<&str>,
    ) -> Result<ContextId, CallGraphError> {
        let job_env = self.get(job).as_job()?.env.scope_id();
        let env = scopes.alloc("env", job_env);
        Ok(self.alloc(Context::Step(StepCtx {
            job: CtxRef::context(job),
            env: CtxRef::owned_scope(env),
            output_var_prefix: step_id.map(|id| format!("steps.{id}.outputs.")),
        })))
    }

    /// New bash script context for a run step. Reuses the job filesystem and
    /// the workflow console as stdout; env inherits from the step env.
    pub fn create_bash_from_run_step(
        &mut self,
        scopes: &mut Scopes,
        step: ContextId,
        source_filepath: impl Into<String>,
    ) -> Result<ContextId, CallGraphError> {
        let step_ctx = self.get(step).as_step()?;
        let step_env = step_ctx.env.scope_id();
        let job = step_ctx
            .job
            .context_id()
            .ok_or_else(|| CallGraphError("step context lacks job".into()))?;
        let job_ctx = self.get(job).as_job()?;
        let filesystem = job_ctx.filesystem;
        let workflow = job_ctx
            .workflow
            .context_id()
            .ok_or_else(|| CallGraphError("job context lacks workflow".into()))?;
        let console = self.get(workflow).as_workflow()?.console;

        let env = scopes.alloc("env", step_env);
        let func_decls = scopes.alloc("func_decls", None);
        let stdin = scopes.alloc("stdin", None);
        Ok(self.alloc(Context::BashScript(BashScriptCtx {
            outer: CtxRef::context(step),
            filesystem: filesystem.non_owned(),
            env: CtxRef::owned_scope(env),
            func_decls: CtxRef::owned_scope(func_decls),
            stdin_scope: CtxRef::owned_scope(stdin),
            stdin_loc: LocationSpecifier::Console,
            stdout_scope: console.non_owned(),
            stdout_loc: LocationSpecifier::Console,
            source_filepath: source_filepath.into(),
        })))
    }

    /// New bash script context for a script invoked from another script.
    /// Reuses the caller's filesystem, stdin and stdout; env inherits from
    /// the caller's env.
    pub fn create_bash_from_bash(
        &mut self,
        scopes: &mut Scopes,
        caller: ContextId,
        source_filepath: impl Into<String>,
    ) -> Result<ContextId, CallGraphError> {
        let caller_ctx = self.get(caller).as_bash()?.clone();
        let env = scopes.alloc("env", caller_ctx.env.scope_id());
        let func_decls = scopes.alloc("func_decls", None);
        Ok(self.alloc(Context::BashScript(BashScriptCtx {
            outer: CtxRef::context(caller),
            filesystem: caller_ctx.filesystem.non_owned(),
            env: CtxRef::owned_scope(env),
            func_decls: CtxRef::owned_scope(func_decls),
            stdin_scope: caller_ctx.stdin_scope.non_owned(),
            stdin_loc: caller_ctx.stdin_loc,
            stdout_scope: caller_ctx.stdout_scope.non_owned(),
            stdout_loc: caller_ctx.stdout_loc,
            source_filepath: source_filepath.into(),
        })))
    }

    /// New bash script context for a script analyzed in isolation.
    pub fn create_bash_isolated(
        &mut self,
        scopes: &mut Scopes,
        analysis: ContextId,
        source_filepath: impl Into<String>,
    ) -> ContextId {
        let filesystem = scopes.alloc("filesystem", None);
        let env = scopes.alloc("env", None);
        let func_decls = scopes.alloc("func_decls", None);
        let stdin = scopes.alloc("stdin", None);
        let stdout = scopes.alloc("stdout", None);
        self.alloc(Context::BashScript(BashScriptCtx {
            outer: CtxRef::context(analysis),
            filesystem: CtxRef::owned_scope(filesystem),
            env: CtxRef::owned_scope(env),
            func_decls: CtxRef::owned_scope(func_decls),
            stdin_scope: CtxRef::owned_scope(stdin),
            stdin_loc: LocationSpecifier::Console,
            stdout_scope: CtxRef::owned_scope(stdout),
            stdout_loc: LocationSpecifier::Console,
            source_filepath: source_filepath.into(),
        }))
    }

    /// New pipe context with its owned pipe scope.
    pub fn create_pipe(&mut self, scopes: &mut Scopes, script: ContextId) -> ContextId {
        let pipe = scopes.alloc("pipe", None);
        self.alloc(Context::Pipe(PipeCtx {
            script: CtxRef::context(script),
            pipe_scope: CtxRef::owned_scope(pipe),
            pipe_loc: LocationSpecifier::Console,
        }))
    }

    /// Derived script context with stdin replaced. The derived context owns
    /// nothing; the source context keeps scope ownership.
    pub fn with_stdin(
        &mut self,
        base: ContextId,
        stdin_scope: CtxRef,
        stdin_loc: LocationSpecifier,
    ) -> Result<ContextId, CallGraphError> {
        let mut ctx = self.get(base).as_bash()?.clone();
        ctx.filesystem = ctx.filesystem.non_owned();
        ctx.env = ctx.env.non_owned();
        ctx.func_decls = ctx.func_decls.non_owned();
        ctx.stdout_scope = ctx.stdout_scope.non_owned();
        ctx.stdin_scope = stdin_scope.non_owned();
        ctx.stdin_loc = stdin_loc;
        Ok(self.alloc(Context::BashScript(ctx)))
    }

    /// Derived script context with stdout replaced.
    pub fn with_stdout(
        &mut self,
        base: ContextId,
        stdout_scope: CtxRef,
        stdout_loc: LocationSpecifier,
    ) -> Result<ContextId, CallGraphError> {
        let mut ctx = self.get(base).as_bash()?.clone();
        ctx.filesystem = ctx.filesystem.non_owned();
        ctx.env = ctx.env.non_owned();
        ctx.func_decls = ctx.func_decls.non_owned();
        ctx.stdin_scope = ctx.stdin_scope.non_owned();
        ctx.stdout_scope = stdout_scope.non_owned();
        ctx.stdout_loc = stdout_loc;
        Ok(self.alloc(Context::BashScript(ctx)))
    }

    // -------------------------------------------------------------------------
    // Walks
    // -------------------------------------------------------------------------

    /// The (possibly transitive) containing step context of a bash script
    /// context, if the script ultimately runs inside a workflow step.
    pub fn containing_step(&self, bash: ContextId) -> Option<ContextId> {
        let mut cur = bash;
        loop {
            match self.get(cur) {
                Context::BashScript(c) => {
                    cur = c.outer.context_id()?;
                }
                Context::Step(_) => return Some(cur),
                _ => return None,
            }
        }
    }

    /// The containing analysis context of a bash script context.
    pub fn containing_analysis(&self, bash: ContextId) -> Result<ContextId, CallGraphError> {
        let mut cur = bash;
        loop {
            match self.get(cur) {
                Context::BashScript(c) => {
                    cur = c
                        .outer
                        .context_id()
                        .ok_or_else(|| CallGraphError("script outer is not a context".into()))?;
                }
                Context::Step(c) => {
                    let job = c
                        .job
                        .context_id()
                        .ok_or_else(|| CallGraphError("step context lacks job".into()))?;
                    let workflow = self
                        .get(job)
                        .as_job()?
                        .workflow
                        .context_id()
                        .ok_or_else(|| CallGraphError("job context lacks workflow".into()))?;
                    cur = self
                        .get(workflow)
                        .as_workflow()?
                        .analysis
                        .context_id()
                        .ok_or_else(|| CallGraphError("workflow context lacks analysis".into()))?;
                }
                Context::Analysis(_) => return Ok(cur),
                Context::Pipe(c) => {
                    cur = c
                        .script
                        .context_id()
                        .ok_or_else(|| CallGraphError("pipe context lacks script".into()))?;
                }
                _ => return Err(CallGraphError("unexpected containing context".into())),
            }
        }
    }

    /// The repository path recorded on the analysis context containing the
    /// given bash script context.
    pub fn repo_path_for(&self, bash: ContextId) -> Option<PathBuf> {
        let analysis = self.containing_analysis(bash).ok()?;
        match self.get(analysis) {
            Context::Analysis(c) => c.repo_path.clone(),
            _ => None,
        }
    }

    /// Collect the scopes transitively owned through an owning reference.
    /// A non-owning reference owns nothing.
    pub fn owned_scopes(&self, ctx_ref: CtxRef) -> BTreeSet<ScopeId> {
        let mut result = BTreeSet::new();
        if !ctx_ref.owned {
            return result;
        }
        self.collect_owned(ctx_ref.target, &mut result);
        result
    }

    fn collect_owned(&self, target: RefTarget, result: &mut BTreeSet<ScopeId>) {
        match target {
            RefTarget::Scope(id) => {
                result.insert(id);
            }
            RefTarget::Context(id) => {
                for r in self.get(id).direct_refs() {
                    if r.owned {
                        self.collect_owned(r.target, result);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_scopes_of_pipe_context() {
        let mut scopes = Scopes::new();
        let mut contexts = Contexts::new();
        let analysis = contexts.create_analysis(None);
        let script = contexts.create_bash_isolated(&mut scopes, analysis, "build.sh");
        let pipe = contexts.create_pipe(&mut scopes, script);

        let owned = contexts.owned_scopes(CtxRef::owned_context(pipe));
        assert_eq!(owned.len(), 1);
        let pipe_scope = contexts.get(pipe).as_pipe().unwrap().pipe_scope;
        assert_eq!(owned.iter().next().copied(), pipe_scope.scope_id());
    }

    #[test]
    fn test_non_owning_ref_owns_nothing() {
        let mut scopes = Scopes::new();
        let mut contexts = Contexts::new();
        let analysis = contexts.create_analysis(None);
        let script = contexts.create_bash_isolated(&mut scopes, analysis, "build.sh");
        assert!(contexts.owned_scopes(CtxRef::context(script)).is_empty());
    }

    #[test]
    fn test_script_context_owned_scopes() {
        let mut scopes = Scopes::new();
        let mut contexts = Contexts::new();
        let analysis = contexts.create_analysis(None);
        let script = contexts.create_bash_isolated(&mut scopes, analysis, "build.sh");
        // filesystem, env, func_decls, stdin, stdout
        assert_eq!(contexts.owned_scopes(CtxRef::owned_context(script)).len(), 5);
    }

    #[test]
    fn test_containing_step_walk() {
        let mut scopes = Scopes::new();
        let mut contexts = Contexts::new();
        let analysis = contexts.create_analysis(None);
        let workflow = contexts.create_workflow(&mut scopes, analysis, "ci.yml");
        let job = contexts.create_job(&mut scopes, workflow).unwrap();
        let step = contexts.create_step(&mut scopes, job, Some("build")).unwrap();
        let script = contexts
            .create_bash_from_run_step(&mut scopes, step, "")
            .unwrap();
        let nested = contexts
            .create_bash_from_bash(&mut scopes, script, "util.sh")
            .unwrap();

        assert_eq!(contexts.containing_step(nested), Some(step));
        assert_eq!(contexts.containing_analysis(nested).unwrap(), analysis);
        let step_ctx = contexts.get(step).as_step().unwrap();
        assert_eq!(
            step_ctx.output_var_prefix.as_deref(),
            Some("steps.build.outputs.")
        );
    }
}
