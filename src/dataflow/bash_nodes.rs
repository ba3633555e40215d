//! Bash IR Builder
//!
//! Lowers parsed bash statements into analysis-graph nodes and defines the
//! interpretations of statements and single commands. Statement expansion is
//! driven by the before-state: arguments whose resolved values tokenize as
//! multiple words expand into alternative interpretations, keyed by the
//! chosen expansions and the read bindings that produced them.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::types::{
    BinOp, BinaryCmd, Cmd, ElsePart, ForClause, FuncDecl, IfClause, Loop, RedirOp, Stmt, Word,
    WordPart,
};
use crate::dataflow::context::{BashScriptCtx, CtxRef};
use crate::dataflow::engine::Analysis;
use crate::dataflow::error::CallGraphError;
use crate::dataflow::eval::{split_str_expr, Evaluator, ReadBindings};
use crate::dataflow::facts::{Location, LocationSpecifier, ScopeId, Value};
use crate::dataflow::graph::{Cfg, ExitKind, InterpretationKey, NodeId, NodeKind, Succ, VarAssignKind};
use crate::dataflow::state::State;

// =============================================================================
// WORD CONVERSION
// =============================================================================

/// Either a literal or a read of an environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnvVar {
    pub is_env_var: bool,
    pub literal: String,
}

impl LiteralOrEnvVar {
    fn lit(literal: impl Into<String>) -> Self {
        LiteralOrEnvVar {
            is_env_var: false,
            literal: literal.into(),
        }
    }

    fn env(name: impl Into<String>) -> Self {
        LiteralOrEnvVar {
            is_env_var: true,
            literal: name.into(),
        }
    }
}

/// If the part is a read of an env var (possibly double-quoted, when
/// allowed), return the variable name.
fn parse_env_var_read_part(part: &WordPart, allow_dbl_quoted: bool) -> Option<String> {
    match part {
        WordPart::DblQuoted(parts) => {
            if !allow_dbl_quoted {
                return None;
            }
            match parts.as_slice() {
                [] => Some(String::new()),
                [inner] => parse_env_var_read_part(inner, false),
                _ => None,
            }
        }
        WordPart::ParamExp(p) if p.is_simple() => Some(p.param.clone()),
        _ => None,
    }
}

/// Parse a part sequence as literals and env var reads, or `None` if some
/// part is not representable this way.
fn parse_content(parts: &[WordPart], allow_dbl_quoted: bool) -> Option<Vec<LiteralOrEnvVar>> {
    let mut content = Vec::new();
    for part in parts {
        if let Some(var) = parse_env_var_read_part(part, allow_dbl_quoted) {
            content.push(LiteralOrEnvVar::env(var));
            continue;
        }
        match part {
            WordPart::Lit(text) => content.push(LiteralOrEnvVar::lit(text.clone())),
            WordPart::SglQuoted(text) => content.push(LiteralOrEnvVar::lit(text.clone())),
            WordPart::DblQuoted(inner) if allow_dbl_quoted => {
                content.extend(parse_content(inner, false)?);
            }
            _ => return None,
        }
    }
    Some(content)
}

/// Concatenate a literal/env-var sequence into one value expression.
fn convert_seq_to_value(content: &[LiteralOrEnvVar], env_scope: ScopeId) -> Value {
    let mut values = content.iter().map(|item| {
        if item.is_env_var {
            Value::read(Location::new(
                env_scope,
                LocationSpecifier::var_named(item.literal.clone()),
            ))
        } else {
            Value::lit(item.literal.clone())
        }
    });
    let first = values.next().unwrap_or_else(|| Value::lit(""));
    values.fold(first, Value::concat)
}

/// Convert a word into a value expression, alongside whether the value is
/// "quoted" (needing no further token expansion after resolution). Words
/// outside the representable shapes yield `None`.
fn convert_word_to_value(word: &Word, env_scope: ScopeId) -> Option<(Value, bool)> {
    match word.parts.as_slice() {
        [WordPart::DblQuoted(parts)] => {
            let content = parse_content(parts, false)?;
            Some((convert_seq_to_value(&content, env_scope), true))
        }
        [WordPart::SglQuoted(text)] => Some((Value::lit(text.clone()), true)),
        [WordPart::Lit(text)] => Some((Value::lit(text.clone()), true)),
        [WordPart::ParamExp(p)] if p.is_simple() => Some((
            Value::read(Location::new(
                env_scope,
                LocationSpecifier::var_named(p.param.clone()),
            )),
            false,
        )),
        _ => None,
    }
}

/// The stdout redirect targets of a statement, as filesystem locations.
fn stdout_redirects(stmt: &Stmt, filesystem: ScopeId, env_scope: ScopeId) -> BTreeSet<Location> {
    let mut redirects = BTreeSet::new();
    for redir in &stmt.redirs {
        if !matches!(
            redir.op,
            RedirOp::RdrOut | RedirOp::AppOut | RedirOp::RdrAll | RedirOp::AppAll
        ) {
            continue;
        }
        let Some(word) = &redir.word else { continue };
        if let Some((value, _)) = convert_word_to_value(word, env_scope) {
            redirects.insert(Location::new(
                filesystem,
                LocationSpecifier::Filesystem(Box::new(value)),
            ));
        }
    }
    redirects
}

/// Whether the location is the special GitHub output variable file.
fn is_github_output_loc(loc: &Location) -> bool {
    let LocationSpecifier::Filesystem(path) = &loc.spec else {
        return false;
    };
    let Value::Read(read_loc) = path.as_ref() else {
        return false;
    };
    let LocationSpecifier::Variable(name) = &read_loc.spec else {
        return false;
    };
    name.as_literal() == Some("GITHUB_OUTPUT")
}

fn bash_ctx<'a>(analysis: &'a Analysis, ctx: CtxRef) -> Result<&'a BashScriptCtx, CallGraphError> {
    let id = ctx
        .context_id()
        .ok_or_else(|| CallGraphError("expected a bash script context reference".into()))?;
    analysis.contexts.get(id).as_bash()
}

fn scope_of(ctx_ref: CtxRef, what: &str) -> Result<ScopeId, CallGraphError> {
    ctx_ref
        .scope_id()
        .ok_or_else(|| CallGraphError(format!("expected {what} scope reference")))
}

// =============================================================================
// NODE CONSTRUCTION
// =============================================================================

/// Build the node for a whole script: its statements in sequence.
pub fn build_bash_script(analysis: &mut Analysis, stmts: &[Stmt], ctx: CtxRef) -> NodeId {
    let children: Vec<NodeId> = stmts
        .iter()
        .map(|stmt| {
            analysis.graph.alloc(NodeKind::BashStatement {
                stmt: stmt.clone(),
                ctx: ctx.non_owned(),
            })
        })
        .collect();
    let cfg = Cfg::from_sequence(&children);
    let node = analysis.graph.alloc(NodeKind::BashScript {
        ctx: ctx.non_owned(),
        cfg,
    });
    for child in children {
        analysis.graph.set_parent(child, node);
    }
    node
}

/// Build a block node: like a script, but script-level exits propagate.
pub fn build_bash_block(analysis: &mut Analysis, stmts: &[Stmt], ctx: CtxRef) -> NodeId {
    let children: Vec<NodeId> = stmts
        .iter()
        .map(|stmt| {
            analysis.graph.alloc(NodeKind::BashStatement {
                stmt: stmt.clone(),
                ctx: ctx.non_owned(),
            })
        })
        .collect();
    let cfg = Cfg::from_sequence(&children);
    let node = analysis.graph.alloc(NodeKind::BashBlock {
        ctx: ctx.non_owned(),
        cfg,
    });
    for child in children {
        analysis.graph.set_parent(child, node);
    }
    node
}

/// Build an if node: condition, then both branches. The analysis is not
/// path sensitive, so both branches are always explored.
fn build_bash_if(analysis: &mut Analysis, clause: &IfClause, ctx: CtxRef) -> NodeId {
    let cond = build_bash_block(analysis, &clause.cond, ctx);
    let then_node = build_bash_block(analysis, &clause.then_stmts, ctx);
    let else_node = match &clause.else_part {
        None => None,
        Some(ElsePart::Else(stmts)) => Some(build_bash_block(analysis, stmts, ctx)),
        Some(ElsePart::Elif(nested)) => Some(build_bash_if(analysis, nested, ctx)),
    };

    let mut cfg = Cfg::new(cond);
    cfg.add(cond, ExitKind::Default, Succ::Node(then_node));
    cfg.add(then_node, ExitKind::Default, Succ::Exit(ExitKind::Default));
    match else_node {
        Some(else_node) => {
            cfg.add(cond, ExitKind::Default, Succ::Node(else_node));
            cfg.add(else_node, ExitKind::Default, Succ::Exit(ExitKind::Default));
        }
        None => {
            cfg.add(cond, ExitKind::Default, Succ::Exit(ExitKind::Default));
        }
    }

    let node = analysis.graph.alloc(NodeKind::BashIf {
        ctx: ctx.non_owned(),
        cfg,
    });
    analysis.graph.set_parent(cond, node);
    analysis.graph.set_parent(then_node, node);
    if let Some(else_node) = else_node {
        analysis.graph.set_parent(else_node, node);
    }
    node
}

/// Build a for node. The loop back edge is not modeled: the body executes
/// once over the join of everything that may reach it, which keeps the
/// fixed point terminating but under-approximates values after the loop.
fn build_bash_for(analysis: &mut Analysis, clause: &ForClause, ctx: CtxRef) -> NodeId {
    let body = build_bash_block(analysis, &clause.body, ctx);
    let mut children: Vec<NodeId> = Vec::new();
    if let Loop::CStyle { init, cond, post } = &clause.loop_header {
        if let Some(init) = init {
            children.push(build_bash_block(analysis, std::slice::from_ref(init), ctx));
        }
        if let Some(cond) = cond {
            children.push(build_bash_block(analysis, std::slice::from_ref(cond), ctx));
        }
        children.push(body);
        if let Some(post) = post {
            children.push(build_bash_block(analysis, std::slice::from_ref(post), ctx));
        }
    } else {
        children.push(body);
    }

    let cfg = Cfg::from_sequence(&children);
    let node = analysis.graph.alloc(NodeKind::BashFor {
        ctx: ctx.non_owned(),
        cfg,
    });
    for child in children {
        analysis.graph.set_parent(child, node);
    }
    node
}

/// Build a pipe node. A fresh pipe context supplies the scope and location
/// standing for the pipe: the left command's stdout and the right command's
/// stdin.
fn build_bash_pipe(
    analysis: &mut Analysis,
    cmd: &BinaryCmd,
    ctx: CtxRef,
) -> Result<NodeId, CallGraphError> {
    let script = ctx
        .context_id()
        .ok_or_else(|| CallGraphError("pipe outside a script context".into()))?;
    let pipe_ctx = analysis
        .contexts
        .create_pipe(&mut analysis.scopes, script);
    let (pipe_scope, pipe_loc) = {
        let pipe = analysis.contexts.get(pipe_ctx).as_pipe()?;
        (pipe.pipe_scope, pipe.pipe_loc.clone())
    };
    let from_ctx =
        analysis
            .contexts
            .with_stdout(script, pipe_scope, pipe_loc.clone())?;
    let to_ctx = analysis.contexts.with_stdin(script, pipe_scope, pipe_loc)?;

    let lhs = analysis.graph.alloc(NodeKind::BashStatement {
        stmt: (*cmd.lhs).clone(),
        ctx: CtxRef::context(from_ctx),
    });
    let rhs = analysis.graph.alloc(NodeKind::BashStatement {
        stmt: (*cmd.rhs).clone(),
        ctx: CtxRef::context(to_ctx),
    });

    let mut cfg = Cfg::new(lhs);
    cfg.add(lhs, ExitKind::Default, Succ::Node(rhs));
    cfg.add(rhs, ExitKind::Default, Succ::Exit(ExitKind::Default));
    let node = analysis.graph.alloc(NodeKind::BashPipe {
        ctx: CtxRef::owned_context(pipe_ctx),
        cfg,
    });
    analysis.graph.set_parent(lhs, node);
    analysis.graph.set_parent(rhs, node);
    Ok(node)
}

/// Build an `&&`/`||` node. Short-circuiting is intentionally collapsed to
/// sequencing; do not tighten this without re-justifying termination.
fn build_bash_and_or(analysis: &mut Analysis, cmd: &BinaryCmd, ctx: CtxRef) -> NodeId {
    let lhs = analysis.graph.alloc(NodeKind::BashStatement {
        stmt: (*cmd.lhs).clone(),
        ctx: ctx.non_owned(),
    });
    let rhs = analysis.graph.alloc(NodeKind::BashStatement {
        stmt: (*cmd.rhs).clone(),
        ctx: ctx.non_owned(),
    });
    let cfg = Cfg::from_sequence(&[lhs, rhs]);
    let node = analysis.graph.alloc(NodeKind::BashAndOr {
        ctx: ctx.non_owned(),
        cfg,
    });
    analysis.graph.set_parent(lhs, node);
    analysis.graph.set_parent(rhs, node);
    node
}

/// Build a function call node around the declared body.
fn build_bash_func_call(analysis: &mut Analysis, decl: &FuncDecl, ctx: CtxRef) -> NodeId {
    let body = std::slice::from_ref(decl.body.as_ref());
    let block = build_bash_block(analysis, body, ctx.non_owned());
    let cfg = Cfg::from_sequence(&[block]);
    let node = analysis.graph.alloc(NodeKind::BashFuncCall {
        ctx: ctx.non_owned(),
        cfg,
    });
    analysis.graph.set_parent(block, node);
    node
}

// =============================================================================
// INTERPRETATIONS
// =============================================================================

/// Interpret an unparsed script value: parse and build the script node, or
/// degrade to a no-op on parse failure.
pub fn identify_raw_bash_script(
    analysis: &mut Analysis,
    id: NodeId,
    script: &Value,
    ctx: CtxRef,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    if analysis
        .graph
        .node(id)
        .interpretations
        .contains_key(&InterpretationKey::Default)
    {
        return Ok(Vec::new());
    }
    let child = match script.as_literal() {
        Some(text) => match crate::parser::parse_script_cached(text) {
            Some(file) => build_bash_script(analysis, &file.stmts, ctx.non_owned()),
            None => analysis.graph.alloc(NodeKind::NoOp),
        },
        None => analysis.graph.alloc(NodeKind::NoOp),
    };
    Ok(vec![(InterpretationKey::Default, child)])
}

fn cartesian(choices: &[Vec<i64>]) -> Vec<Vec<i64>> {
    let mut result: Vec<Vec<i64>> = vec![Vec::new()];
    for options in choices {
        let mut next = Vec::with_capacity(result.len() * options.len());
        for prefix in &result {
            for &option in options {
                let mut extended = prefix.clone();
                extended.push(option);
                next.push(extended);
            }
        }
        result = next;
    }
    result
}

/// Interpret a bash statement according to its shape.
pub fn identify_bash_statement(
    analysis: &mut Analysis,
    id: NodeId,
    stmt: &Stmt,
    ctx: CtxRef,
    before: &State,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    let existing: BTreeSet<InterpretationKey> = analysis
        .graph
        .node(id)
        .interpretations
        .keys()
        .cloned()
        .collect();
    let has_default = existing.contains(&InterpretationKey::Default);

    match &stmt.cmd {
        Cmd::CallExpr(call) if call.args.is_empty() && call.assigns.len() == 1 => {
            if has_default {
                return Ok(Vec::new());
            }
            let env_scope = scope_of(bash_ctx(analysis, ctx)?.env, "env")?;
            let assign = &call.assigns[0];
            let content = match &assign.value {
                Some(word) => parse_content(&word.parts, true),
                None => Some(vec![LiteralOrEnvVar::lit("")]),
            };
            let child = match content {
                Some(content) => {
                    let value = convert_seq_to_value(&content, env_scope);
                    analysis.graph.alloc(NodeKind::VarAssign {
                        kind: VarAssignKind::BashEnvVar,
                        scope: env_scope,
                        name: Value::lit(assign.name.clone()),
                        value,
                    })
                }
                None => analysis.graph.alloc(NodeKind::NoOp),
            };
            Ok(vec![(InterpretationKey::Default, child)])
        }

        Cmd::CallExpr(call) if !call.args.is_empty() => {
            identify_command_statement(analysis, id, stmt, call.args.as_slice(), ctx, before, &existing)
        }

        Cmd::IfClause(clause) => {
            if has_default {
                return Ok(Vec::new());
            }
            let child = build_bash_if(analysis, clause, ctx);
            Ok(vec![(InterpretationKey::Default, child)])
        }

        Cmd::ForClause(clause) => {
            if has_default {
                return Ok(Vec::new());
            }
            let child = build_bash_for(analysis, clause, ctx);
            Ok(vec![(InterpretationKey::Default, child)])
        }

        Cmd::BinaryCmd(cmd) => {
            if has_default {
                return Ok(Vec::new());
            }
            let child = match cmd.op {
                BinOp::Pipe => build_bash_pipe(analysis, cmd, ctx)?,
                BinOp::AndStmt | BinOp::OrStmt => build_bash_and_or(analysis, cmd, ctx),
                BinOp::PipeAll => {
                    return Err(CallGraphError("unknown binary operator: |&".into()));
                }
            };
            Ok(vec![(InterpretationKey::Default, child)])
        }

        Cmd::FuncDecl(decl) => {
            if has_default {
                return Ok(Vec::new());
            }
            // Function declarations are stored as serialized definitions in
            // the function declaration scope.
            let func_decls = scope_of(bash_ctx(analysis, ctx)?.func_decls, "func_decls")?;
            let serialized = serde_json::to_string(decl)
                .map_err(|e| CallGraphError(format!("function serialization failed: {e}")))?;
            let child = analysis.graph.alloc(NodeKind::VarAssign {
                kind: VarAssignKind::BashFuncDecl,
                scope: func_decls,
                name: Value::lit(decl.name.clone()),
                value: Value::lit(serialized),
            });
            Ok(vec![(InterpretationKey::Default, child)])
        }

        Cmd::Block(block) => {
            if has_default {
                return Ok(Vec::new());
            }
            let child = build_bash_block(analysis, &block.stmts, ctx);
            Ok(vec![(InterpretationKey::Default, child)])
        }

        _ => {
            if has_default {
                return Ok(Vec::new());
            }
            let child = analysis.graph.alloc(NodeKind::NoOp);
            Ok(vec![(InterpretationKey::Default, child)])
        }
    }
}

/// Interpret a command statement: resolve the argument words and expand any
/// argument whose dynamic value tokenizes as multiple words, alongside the
/// alternative where it stays one constrained token.
#[allow(clippy::too_many_arguments)]
fn identify_command_statement(
    analysis: &mut Analysis,
    _id: NodeId,
    stmt: &Stmt,
    args: &[Word],
    ctx: CtxRef,
    before: &State,
    existing: &BTreeSet<InterpretationKey>,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    let bash = bash_ctx(analysis, ctx)?;
    let env_scope = scope_of(bash.env, "env")?;
    let filesystem = scope_of(bash.filesystem, "filesystem")?;

    let arg_vals: Vec<Option<(Value, bool)>> = args
        .iter()
        .map(|word| convert_word_to_value(word, env_scope))
        .collect();

    // Resolve unquoted arguments and collect multi-word tokenizations.
    let mut multitoken: BTreeMap<usize, Vec<(Vec<Word>, ReadBindings)>> = BTreeMap::new();
    {
        let evaluator = Evaluator::new(before, &analysis.scopes);
        for (index, arg) in arg_vals.iter().enumerate() {
            let Some((value, quoted)) = arg else { continue };
            if *quoted {
                continue;
            }
            for (resolved, bindings) in evaluator.transform_value(value) {
                if let Value::StringLiteral(literal) = resolved {
                    if let Some(words) = crate::parser::parse_expr_cached(&literal) {
                        if words.len() > 1 {
                            multitoken.entry(index).or_default().push((words, bindings));
                        }
                    }
                }
            }
        }
    }

    let arg_indices: Vec<usize> = multitoken.keys().copied().collect();
    let choices_per_arg: Vec<Vec<i64>> = arg_indices
        .iter()
        .map(|index| {
            let mut choices: Vec<i64> = (0..multitoken[index].len() as i64).collect();
            choices.push(-1);
            choices
        })
        .collect();

    let mut result = Vec::new();
    for choice in cartesian(&choices_per_arg) {
        let mut bindings_list: Vec<ReadBindings> = Vec::new();
        let mut expanded: BTreeMap<usize, Vec<Option<Value>>> = BTreeMap::new();
        for (position, &arg_index) in arg_indices.iter().enumerate() {
            let value_index = choice[position];
            if value_index >= 0 {
                let (words, bindings) = &multitoken[&arg_index][value_index as usize];
                bindings_list.push(bindings.clone());
                expanded.insert(
                    arg_index,
                    words
                        .iter()
                        .map(|word| convert_word_to_value(word, env_scope).map(|(v, _)| v))
                        .collect(),
                );
            } else {
                expanded.insert(
                    arg_index,
                    vec![arg_vals[arg_index]
                        .as_ref()
                        .map(|(v, _)| Value::SingleBashTokenConstraint(Box::new(v.clone())))],
                );
            }
        }

        let Some(combined) = ReadBindings::combine(&bindings_list) else {
            continue;
        };

        let mut full_args: Vec<Option<Value>> = Vec::new();
        for (index, arg) in arg_vals.iter().enumerate() {
            match expanded.get(&index) {
                Some(values) => full_args.extend(values.iter().cloned()),
                None => full_args.push(arg.as_ref().map(|(v, _)| v.clone())),
            }
        }

        let Some(Some(cmd_value)) = full_args.first().cloned() else {
            continue;
        };

        let key = InterpretationKey::Cmd {
            choice: choice.clone(),
            bindings: combined,
        };
        if existing.contains(&key) {
            continue;
        }
        let redirects = stdout_redirects(stmt, filesystem, env_scope);
        let child = analysis.graph.alloc(NodeKind::BashSingleCommand {
            stmt: stmt.clone(),
            ctx: ctx.non_owned(),
            cmd: cmd_value,
            args: full_args[1..].to_vec(),
            stdout_redirects: redirects,
        });
        result.push((key, child));
    }
    Ok(result)
}

/// Interpret a resolved single command by its command name.
#[allow(clippy::too_many_arguments)]
pub fn identify_bash_single_command(
    analysis: &mut Analysis,
    id: NodeId,
    _stmt: &Stmt,
    ctx: CtxRef,
    cmd: &Value,
    args: &[Option<Value>],
    redirects: &BTreeSet<Location>,
    before: &State,
) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
    let existing: BTreeSet<InterpretationKey> = analysis
        .graph
        .node(id)
        .interpretations
        .keys()
        .cloned()
        .collect();

    let resolved_cmds: Vec<(Value, ReadBindings)> = {
        let evaluator = Evaluator::new(before, &analysis.scopes);
        evaluator.transform_value(cmd).into_iter().collect()
    };

    let bash = bash_ctx(analysis, ctx)?.clone();
    let stdout_fallback = Location::new(
        scope_of(bash.stdout_scope, "stdout")?,
        bash.stdout_loc.clone(),
    );
    let stdin_loc = Location::new(scope_of(bash.stdin_scope, "stdin")?, bash.stdin_loc.clone());

    let mut result: Vec<(InterpretationKey, NodeId)> = Vec::new();
    let push = |result: &mut Vec<(InterpretationKey, NodeId)>,
                key: InterpretationKey,
                child: NodeId| {
        if !existing.contains(&key) && !result.iter().any(|(k, _)| k == &key) {
            result.push((key, child));
        }
    };

    for (resolved, bindings) in resolved_cmds {
        let Some(cmd_name) = resolved.as_literal().map(str::to_string) else {
            continue;
        };
        match cmd_name.as_str() {
            "echo" => {
                // Two interpretations: the concrete write to wherever stdout
                // goes, and for the GitHub output file the higher-level write
                // of the named step output variable.
                if redirects.len() <= 1 && args.len() == 1 {
                    let Some(Some(first_arg)) = args.first().cloned() else {
                        continue;
                    };
                    let target = redirects
                        .iter()
                        .next()
                        .cloned()
                        .unwrap_or_else(|| stdout_fallback.clone());

                    if is_github_output_loc(&target) {
                        if let Some(step_id) = ctx
                            .context_id()
                            .and_then(|c| analysis.contexts.containing_step(c))
                        {
                            let step = analysis.contexts.get(step_id).as_step()?.clone();
                            if let Some(prefix) = step.output_var_prefix.clone() {
                                let job = step.job.context_id().ok_or_else(|| {
                                    CallGraphError("step context lacks job".into())
                                })?;
                                let job_vars = scope_of(
                                    analysis.contexts.get(job).as_job()?.job_variables,
                                    "job_variables",
                                )?;
                                let split = split_str_expr(&first_arg, '=', 1);
                                if split.len() == 2 {
                                    let child = analysis.graph.alloc(NodeKind::VarAssign {
                                        kind: VarAssignKind::GithubJobVar,
                                        scope: job_vars,
                                        name: Value::concat(
                                            Value::lit(prefix),
                                            split[0].clone(),
                                        ),
                                        value: split[1].clone(),
                                    });
                                    push(
                                        &mut result,
                                        InterpretationKey::EchoGithubVar {
                                            bindings: bindings.clone(),
                                        },
                                        child,
                                    );
                                }
                            }
                        }
                    }

                    let child = analysis.graph.alloc(NodeKind::BashEcho {
                        target,
                        value: first_arg,
                    });
                    push(
                        &mut result,
                        InterpretationKey::Echo {
                            bindings: bindings.clone(),
                        },
                        child,
                    );
                }
            }
            "mvn" => {
                let is_build_goal = args.iter().flatten().any(|arg| {
                    matches!(
                        arg.as_literal(),
                        Some("package" | "install" | "deploy" | "verify")
                    )
                });
                if is_build_goal {
                    let data_id = analysis.fresh_data_id();
                    let child = analysis.graph.alloc(NodeKind::MavenBuild {
                        filesystem: scope_of(bash.filesystem, "filesystem")?,
                        data_id,
                    });
                    push(
                        &mut result,
                        InterpretationKey::MavenBuild {
                            bindings: bindings.clone(),
                        },
                        child,
                    );
                }
            }
            "exit" => {
                let child = analysis.graph.alloc(NodeKind::BashExitStmt);
                push(
                    &mut result,
                    InterpretationKey::Exit {
                        bindings: bindings.clone(),
                    },
                    child,
                );
            }
            "base64" => {
                if redirects.len() <= 1 {
                    let target = redirects
                        .iter()
                        .next()
                        .cloned()
                        .unwrap_or_else(|| stdout_fallback.clone());
                    if args.is_empty() {
                        let child = analysis.graph.alloc(NodeKind::Base64Encode {
                            input: stdin_loc.clone(),
                            output: target,
                        });
                        push(
                            &mut result,
                            InterpretationKey::Base64Encode {
                                bindings: bindings.clone(),
                            },
                            child,
                        );
                    } else if args.len() == 1
                        && args.iter().flatten().any(|arg| {
                            matches!(arg.as_literal(), Some("-d" | "--decode"))
                        })
                    {
                        let child = analysis.graph.alloc(NodeKind::Base64Decode {
                            input: stdin_loc.clone(),
                            output: target,
                        });
                        push(
                            &mut result,
                            InterpretationKey::Base64Decode {
                                bindings: bindings.clone(),
                            },
                            child,
                        );
                    }
                }
            }
            name if name.ends_with(".sh") => {
                if let Some(child) =
                    build_script_file_invocation(analysis, ctx, name)?
                {
                    push(
                        &mut result,
                        InterpretationKey::RunScriptFile {
                            bindings: bindings.clone(),
                        },
                        child,
                    );
                }
            }
            name => {
                // A command matching a declared function becomes a call to
                // the stored definition.
                let func_decls = scope_of(bash.func_decls, "func_decls")?;
                let read = Value::read(Location::new(
                    func_decls,
                    LocationSpecifier::var_named(name.to_string()),
                ));
                let resolved_funcs: Vec<(Value, ReadBindings)> = {
                    let evaluator = Evaluator::new(before, &analysis.scopes);
                    evaluator.transform_value(&read).into_iter().collect()
                };
                for (resolved_func, func_bindings) in resolved_funcs {
                    let Some(serialized) = resolved_func.as_literal() else {
                        continue;
                    };
                    let Some(combined) =
                        bindings.with_bindings(&func_bindings)
                    else {
                        continue;
                    };
                    let Ok(decl) = serde_json::from_str::<FuncDecl>(serialized) else {
                        continue;
                    };
                    let child = build_bash_func_call(analysis, &decl, ctx);
                    push(
                        &mut result,
                        InterpretationKey::FuncCall { bindings: combined },
                        child,
                    );
                }
            }
        }
    }

    // Commands that resolved to nothing modelled fall back to a no-op.
    if (!matches!(cmd, Value::StringLiteral(_)) || (result.is_empty() && existing.is_empty()))
        && !existing.contains(&InterpretationKey::Default)
        && !result.iter().any(|(k, _)| k == &InterpretationKey::Default)
    {
        let child = analysis.graph.alloc(NodeKind::NoOp);
        result.push((InterpretationKey::Default, child));
    }
    Ok(result)
}

/// Resolve and load a script file invoked from a script, rejecting paths
/// that escape the repository checkout.
fn build_script_file_invocation(
    analysis: &mut Analysis,
    ctx: CtxRef,
    script_name: &str,
) -> Result<Option<NodeId>, CallGraphError> {
    let Some(ctx_id) = ctx.context_id() else {
        return Ok(None);
    };
    let Some(repo_path) = analysis.contexts.repo_path_for(ctx_id) else {
        return Ok(None);
    };
    let joined = repo_path.join(script_name);
    let Ok(resolved) = joined.canonicalize() else {
        return Ok(None);
    };
    if !resolved.starts_with(&repo_path) {
        tracing::debug!(script = script_name, "script path escapes repository; skipped");
        return Ok(None);
    }
    let Ok(text) = std::fs::read_to_string(&resolved) else {
        return Ok(None);
    };

    let script_ctx = analysis.contexts.create_bash_from_bash(
        &mut analysis.scopes,
        ctx_id,
        resolved.to_string_lossy().to_string(),
    )?;
    Ok(Some(analysis.graph.alloc(NodeKind::RawBashScript {
        script: Value::lit(text),
        ctx: CtxRef::owned_context(script_ctx),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::ParamExp;

    #[test]
    fn test_parse_content_mixed_literal_and_var() {
        let parts = vec![
            WordPart::Lit("v".into()),
            WordPart::ParamExp(ParamExp {
                param: "VERSION".into(),
                op_text: None,
            }),
        ];
        let content = parse_content(&parts, true).unwrap();
        assert_eq!(content.len(), 2);
        assert!(!content[0].is_env_var);
        assert!(content[1].is_env_var);
    }

    #[test]
    fn test_parse_content_rejects_command_substitution() {
        let parts = vec![WordPart::CmdSubst("date".into())];
        assert!(parse_content(&parts, true).is_none());
    }

    #[test]
    fn test_convert_word_quoted_flag() {
        let mut scopes = crate::dataflow::facts::Scopes::new();
        let env = scopes.alloc("env", None);

        let plain = Word::lit("package");
        assert_eq!(
            convert_word_to_value(&plain, env),
            Some((Value::lit("package"), true))
        );

        let var = Word::new(vec![WordPart::ParamExp(ParamExp {
            param: "GOALS".into(),
            op_text: None,
        })]);
        let (value, quoted) = convert_word_to_value(&var, env).unwrap();
        assert!(!quoted);
        assert_eq!(
            value,
            Value::read(Location::new(env, LocationSpecifier::var_named("GOALS")))
        );
    }

    #[test]
    fn test_github_output_location_detection() {
        let mut scopes = crate::dataflow::facts::Scopes::new();
        let fs = scopes.alloc("filesystem", None);
        let env = scopes.alloc("env", None);
        let loc = Location::new(
            fs,
            LocationSpecifier::Filesystem(Box::new(Value::read(Location::new(
                env,
                LocationSpecifier::var_named("GITHUB_OUTPUT"),
            )))),
        );
        assert!(is_github_output_loc(&loc));
        let other = Location::new(
            fs,
            LocationSpecifier::filesystem(Value::lit("out.txt")),
        );
        assert!(!is_github_output_loc(&other));
    }

    #[test]
    fn test_cartesian_includes_keep_choice() {
        let products = cartesian(&[vec![0, 1, -1], vec![0, -1]]);
        assert_eq!(products.len(), 6);
        assert!(products.contains(&vec![-1, -1]));
        assert!(products.contains(&vec![1, 0]));
    }

    #[test]
    fn test_cartesian_of_nothing_is_single_empty_choice() {
        assert_eq!(cartesian(&[]), vec![Vec::<i64>::new()]);
    }
}
