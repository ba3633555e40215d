//! Analysis Graph
//!
//! The rooted directed graph the abstract interpreter traverses. Nodes are
//! either control-flow nodes (sequences, branches, loops, pipes), leaf
//! statement nodes with transfer functions, or interpretation nodes whose
//! children depend on their before-state. Nodes live in an arena; edges are
//! `NodeId` indices.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::types::Stmt;
use crate::dataflow::context::CtxRef;
use crate::dataflow::eval::ReadBindings;
use crate::dataflow::facts::{Location, ScopeId, Value};
use crate::dataflow::state::State;
use crate::workflow::model::{ActionStep, EnvMap, Matrix, NormalJob, ReusableWorkflowCallJob, Step, Workflow};

/// How a node was exited. The statement-level kinds cut across enclosing
/// control flow: enclosing constructs decide whether to propagate, convert
/// or swallow them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExitKind {
    Default,
    /// Exits the whole script.
    BashExit,
    /// Exits the current function.
    BashReturn,
}

/// Index of a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

/// A control-flow successor: another child node or an exit of the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Succ {
    Node(NodeId),
    Exit(ExitKind),
}

/// Control-flow table of a structured node: entry child plus edges out of
/// each child's exits.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    pub entry: Option<NodeId>,
    succs: BTreeMap<(NodeId, ExitKind), BTreeSet<Succ>>,
}

impl Cfg {
    pub fn new(entry: NodeId) -> Self {
        Cfg {
            entry: Some(entry),
            succs: BTreeMap::new(),
        }
    }

    /// Chain children in order; the last child exits the node.
    pub fn from_sequence(children: &[NodeId]) -> Self {
        let mut cfg = Cfg {
            entry: children.first().copied(),
            succs: BTreeMap::new(),
        };
        for pair in children.windows(2) {
            cfg.add(pair[0], ExitKind::Default, Succ::Node(pair[1]));
        }
        if let Some(&last) = children.last() {
            cfg.add(last, ExitKind::Default, Succ::Exit(ExitKind::Default));
        }
        cfg
    }

    pub fn add(&mut self, from: NodeId, exit: ExitKind, to: Succ) {
        self.succs.entry((from, exit)).or_default().insert(to);
    }

    pub fn successors(&self, from: NodeId, exit: ExitKind) -> BTreeSet<Succ> {
        self.succs
            .get(&(from, exit))
            .cloned()
            .unwrap_or_default()
    }
}

/// Kinds of variable assignment writes, kept on the node for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VarAssignKind {
    BashEnvVar,
    BashFuncDecl,
    GithubEnvVar,
    GithubJobVar,
}

/// Key identifying one interpretation of an interpretation node. Keys carry
/// the read bindings that selected them so re-evaluation with the same
/// bindings picks the same expansion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InterpretationKey {
    Default,
    /// Command with a chosen tuple of multi-token argument expansions
    /// (-1 for "keep as constrained single token").
    Cmd {
        choice: Vec<i64>,
        bindings: ReadBindings,
    },
    Echo { bindings: ReadBindings },
    EchoGithubVar { bindings: ReadBindings },
    MavenBuild { bindings: ReadBindings },
    Exit { bindings: ReadBindings },
    Base64Encode { bindings: ReadBindings },
    Base64Decode { bindings: ReadBindings },
    RunScriptFile { bindings: ReadBindings },
    FuncCall { bindings: ReadBindings },
}

/// The node kinds of the analysis graph.
#[derive(Debug, Clone)]
pub enum NodeKind {
    // ---- Leaf statement nodes -------------------------------------------
    NoOp,
    BashExitStmt,
    VarAssign {
        kind: VarAssignKind,
        scope: ScopeId,
        name: Value,
        value: Value,
    },
    BashEcho {
        target: Location,
        value: Value,
    },
    MavenBuild {
        filesystem: ScopeId,
        data_id: u64,
    },
    Base64Encode {
        input: Location,
        output: Location,
    },
    Base64Decode {
        input: Location,
        output: Location,
    },
    InstallPackage {
        scope: ScopeId,
        name: Value,
        version: Value,
        distribution: Value,
        url: Value,
    },
    UploadArtifact {
        artifacts: ScopeId,
        name: Value,
        file: Value,
        filesystem: ScopeId,
        path: Value,
    },
    DownloadArtifact {
        artifacts: ScopeId,
        name: Value,
        filesystem: ScopeId,
    },
    Release {
        releases: ScopeId,
        name: Value,
        file: Value,
        filesystem: ScopeId,
        path: Value,
    },
    GitCheckout,

    // ---- Structural nodes -----------------------------------------------
    SimpleSequence {
        cfg: Cfg,
    },
    /// All children are alternatives; each receives the before-state.
    SimpleAlternatives {
        children: Vec<NodeId>,
    },

    // ---- Bash nodes -------------------------------------------------------
    RawBashScript {
        script: Value,
        ctx: CtxRef,
    },
    BashScript {
        ctx: CtxRef,
        cfg: Cfg,
    },
    BashBlock {
        ctx: CtxRef,
        cfg: Cfg,
    },
    BashStatement {
        stmt: Stmt,
        ctx: CtxRef,
    },
    BashSingleCommand {
        stmt: Stmt,
        ctx: CtxRef,
        cmd: Value,
        args: Vec<Option<Value>>,
        stdout_redirects: BTreeSet<Location>,
    },
    BashIf {
        ctx: CtxRef,
        cfg: Cfg,
    },
    BashFor {
        ctx: CtxRef,
        cfg: Cfg,
    },
    BashPipe {
        ctx: CtxRef,
        cfg: Cfg,
    },
    BashAndOr {
        ctx: CtxRef,
        cfg: Cfg,
    },
    BashFuncCall {
        ctx: CtxRef,
        cfg: Cfg,
    },

    // ---- GitHub Actions nodes ---------------------------------------------
    RawWorkflow {
        workflow: Workflow,
        ctx: CtxRef,
    },
    WorkflowNode {
        ctx: CtxRef,
        cfg: Cfg,
    },
    RawJob {
        job_id: String,
        normal: Option<NormalJob>,
        reusable: Option<ReusableWorkflowCallJob>,
        ctx: CtxRef,
    },
    NormalJobNode {
        job_id: String,
        ctx: CtxRef,
        cfg: Cfg,
    },
    ReusableWorkflowCall {
        job_id: String,
        ctx: CtxRef,
        uses_name: String,
        uses_version: Option<String>,
        with_params: BTreeMap<String, Value>,
    },
    RawStep {
        step: Step,
        ctx: CtxRef,
    },
    RawActionStep {
        step: ActionStep,
        ctx: CtxRef,
    },
    ActionStepNode {
        step: ActionStep,
        ctx: CtxRef,
        uses_name: String,
        uses_version: Option<String>,
        with_params: BTreeMap<String, Value>,
    },
    RunStep {
        ctx: CtxRef,
        cfg: Cfg,
    },
    EnvBlock {
        env: EnvMap,
        ctx: CtxRef,
    },
    MatrixBlock {
        matrix: Matrix,
        ctx: CtxRef,
    },
}

/// Traversal class of a node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Has a transfer function.
    Leaf,
    /// Structured control flow with an entry and successor table.
    ControlFlow,
    /// Before-state flows to every child; afters join back.
    Fanout,
}

/// How a control-flow node reacts to a statement-level exit of a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Treat any exit as a default exit and follow the successor table
    /// (step and job boundaries).
    Swallow,
    /// Propagate the same exit kind out of this node.
    Propagate,
    /// The node itself exits normally (script boundary).
    ConvertToDefault,
    /// Function boundary: a return becomes a normal exit, a script exit
    /// keeps propagating.
    FuncBoundary,
}

impl NodeKind {
    pub fn class(&self) -> NodeClass {
        match self {
            NodeKind::NoOp
            | NodeKind::BashExitStmt
            | NodeKind::VarAssign { .. }
            | NodeKind::BashEcho { .. }
            | NodeKind::MavenBuild { .. }
            | NodeKind::Base64Encode { .. }
            | NodeKind::Base64Decode { .. }
            | NodeKind::InstallPackage { .. }
            | NodeKind::UploadArtifact { .. }
            | NodeKind::DownloadArtifact { .. }
            | NodeKind::Release { .. }
            | NodeKind::GitCheckout => NodeClass::Leaf,

            NodeKind::SimpleSequence { .. }
            | NodeKind::BashScript { .. }
            | NodeKind::BashBlock { .. }
            | NodeKind::BashIf { .. }
            | NodeKind::BashFor { .. }
            | NodeKind::BashPipe { .. }
            | NodeKind::BashAndOr { .. }
            | NodeKind::BashFuncCall { .. }
            | NodeKind::WorkflowNode { .. }
            | NodeKind::NormalJobNode { .. }
            | NodeKind::RunStep { .. } => NodeClass::ControlFlow,

            NodeKind::SimpleAlternatives { .. }
            | NodeKind::RawBashScript { .. }
            | NodeKind::BashStatement { .. }
            | NodeKind::BashSingleCommand { .. }
            | NodeKind::RawWorkflow { .. }
            | NodeKind::RawJob { .. }
            | NodeKind::ReusableWorkflowCall { .. }
            | NodeKind::RawStep { .. }
            | NodeKind::RawActionStep { .. }
            | NodeKind::ActionStepNode { .. }
            | NodeKind::EnvBlock { .. }
            | NodeKind::MatrixBlock { .. } => NodeClass::Fanout,
        }
    }

    pub fn cfg(&self) -> Option<&Cfg> {
        match self {
            NodeKind::SimpleSequence { cfg }
            | NodeKind::BashScript { cfg, .. }
            | NodeKind::BashBlock { cfg, .. }
            | NodeKind::BashIf { cfg, .. }
            | NodeKind::BashFor { cfg, .. }
            | NodeKind::BashPipe { cfg, .. }
            | NodeKind::BashAndOr { cfg, .. }
            | NodeKind::BashFuncCall { cfg, .. }
            | NodeKind::WorkflowNode { cfg, .. }
            | NodeKind::NormalJobNode { cfg, .. }
            | NodeKind::RunStep { cfg, .. } => Some(cfg),
            _ => None,
        }
    }

    pub fn exit_policy(&self) -> ExitPolicy {
        match self {
            NodeKind::BashScript { .. } => ExitPolicy::ConvertToDefault,
            NodeKind::BashFuncCall { .. } => ExitPolicy::FuncBoundary,
            NodeKind::BashBlock { .. }
            | NodeKind::BashIf { .. }
            | NodeKind::BashFor { .. }
            | NodeKind::BashPipe { .. }
            | NodeKind::BashAndOr { .. } => ExitPolicy::Propagate,
            _ => ExitPolicy::Swallow,
        }
    }

    /// The context reference whose owned scopes are cleared when this node's
    /// after-state transfers onward.
    pub fn ctx_ref(&self) -> Option<CtxRef> {
        match self {
            NodeKind::RawBashScript { ctx, .. }
            | NodeKind::BashScript { ctx, .. }
            | NodeKind::BashBlock { ctx, .. }
            | NodeKind::BashStatement { ctx, .. }
            | NodeKind::BashSingleCommand { ctx, .. }
            | NodeKind::BashIf { ctx, .. }
            | NodeKind::BashFor { ctx, .. }
            | NodeKind::BashPipe { ctx, .. }
            | NodeKind::BashAndOr { ctx, .. }
            | NodeKind::BashFuncCall { ctx, .. }
            | NodeKind::RawWorkflow { ctx, .. }
            | NodeKind::WorkflowNode { ctx, .. }
            | NodeKind::RawJob { ctx, .. }
            | NodeKind::NormalJobNode { ctx, .. }
            | NodeKind::ReusableWorkflowCall { ctx, .. }
            | NodeKind::RawStep { ctx, .. }
            | NodeKind::RawActionStep { ctx, .. }
            | NodeKind::ActionStepNode { ctx, .. }
            | NodeKind::RunStep { ctx, .. }
            | NodeKind::EnvBlock { ctx, .. }
            | NodeKind::MatrixBlock { ctx, .. } => Some(*ctx),
            _ => None,
        }
    }
}

/// A node with its traversal state.
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub before: State,
    pub afters: BTreeMap<ExitKind, State>,
    /// For interpretation nodes: children keyed by interpretation.
    pub interpretations: BTreeMap<InterpretationKey, NodeId>,
}

/// Arena of analysis graph nodes.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent: None,
            before: State::new(),
            afters: BTreeMap::new(),
            interpretations: BTreeMap::new(),
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn set_parent(&mut self, child: NodeId, parent: NodeId) {
        self.node_mut(child).parent = Some(parent);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// The alternative children of a fanout node.
    pub fn fanout_children(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        match &node.kind {
            NodeKind::SimpleAlternatives { children } => children.clone(),
            _ => node.interpretations.values().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cfg_sequence_wiring() {
        let mut graph = Graph::new();
        let a = graph.alloc(NodeKind::NoOp);
        let b = graph.alloc(NodeKind::NoOp);
        let cfg = Cfg::from_sequence(&[a, b]);
        assert_eq!(cfg.entry, Some(a));
        assert_eq!(
            cfg.successors(a, ExitKind::Default),
            BTreeSet::from([Succ::Node(b)])
        );
        assert_eq!(
            cfg.successors(b, ExitKind::Default),
            BTreeSet::from([Succ::Exit(ExitKind::Default)])
        );
    }

    #[test]
    fn test_empty_sequence_has_no_entry() {
        let cfg = Cfg::from_sequence(&[]);
        assert_eq!(cfg.entry, None);
    }
}
