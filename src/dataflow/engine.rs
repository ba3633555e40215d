//! Fixed-Point Engine
//!
//! Work-list traversal of the analysis graph. Before- and after-states only
//! grow; interpretation nodes are re-queried whenever their before-state
//! grows and their child sets extend monotonically. Determinism comes from
//! ordered containers everywhere iteration influences the traversal.

use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

use crate::dataflow::context::{ContextId, Contexts};
use crate::dataflow::error::{AnalysisError, CallGraphError};
use crate::dataflow::facts::Scopes;
use crate::dataflow::graph::{
    ExitKind, ExitPolicy, Graph, InterpretationKey, NodeClass, NodeId, NodeKind, Succ,
};
use crate::dataflow::state::{transfer_state, State, StateTransferFilter};
use crate::dataflow::{bash_nodes, github_nodes, models};

/// Resource ceilings checked between work-list items.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub max_steps: usize,
    pub deadline: Option<Instant>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        ExecutionLimits {
            max_steps: 200_000,
            deadline: None,
        }
    }
}

/// All state of one analysis run: the arenas, the graph and the counters.
#[derive(Debug)]
pub struct Analysis {
    pub scopes: Scopes,
    pub contexts: Contexts,
    pub graph: Graph,
    pub limits: ExecutionLimits,
    /// Monotone sequence for state debug labels.
    pub seq: u64,
    /// Counter for opaque `ArbitraryNewData` identities.
    pub data_counter: u64,
}

impl Analysis {
    pub fn new(limits: ExecutionLimits) -> Self {
        Analysis {
            scopes: Scopes::new(),
            contexts: Contexts::new(),
            graph: Graph::new(),
            limits,
            seq: 0,
            data_counter: 0,
        }
    }

    pub fn fresh_data_id(&mut self) -> u64 {
        self.data_counter += 1;
        self.data_counter
    }

    /// Run the traversal to a fixed point starting from the given root.
    pub fn run(&mut self, root: NodeId) -> Result<(), AnalysisError> {
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        let mut queued: BTreeSet<NodeId> = BTreeSet::new();
        queue.push_back(root);
        queued.insert(root);

        let mut steps = 0usize;
        while let Some(id) = queue.pop_front() {
            queued.remove(&id);
            steps += 1;
            if steps > self.limits.max_steps {
                return Err(AnalysisError::StepLimit(self.limits.max_steps));
            }
            if let Some(deadline) = self.limits.deadline {
                if Instant::now() > deadline {
                    return Err(AnalysisError::DeadlineExceeded);
                }
            }
            self.process(id, &mut queue, &mut queued);
        }
        Ok(())
    }

    fn enqueue(queue: &mut VecDeque<NodeId>, queued: &mut BTreeSet<NodeId>, id: NodeId) {
        if queued.insert(id) {
            queue.push_back(id);
        }
    }

    fn process(
        &mut self,
        id: NodeId,
        queue: &mut VecDeque<NodeId>,
        queued: &mut BTreeSet<NodeId>,
    ) {
        let class = self.graph.node(id).kind.class();
        let before = self.graph.node(id).before.clone();
        match class {
            NodeClass::Leaf => {
                let kind = self.graph.node(id).kind.clone();
                let afters = models::apply_effects(&kind, &before, &self.scopes, &mut self.seq);
                for (exit, state) in afters {
                    let changed = {
                        let node = self.graph.node_mut(id);
                        let target = node.afters.entry(exit).or_default();
                        let mut seq = self.seq;
                        let changed =
                            transfer_state(&state, target, &StateTransferFilter::All, &mut seq, false);
                        self.seq = seq;
                        changed
                    };
                    if changed {
                        self.route(id, exit, queue, queued);
                    }
                }
            }
            NodeClass::ControlFlow => {
                let entry = self.graph.node(id).kind.cfg().and_then(|cfg| cfg.entry);
                match entry {
                    Some(entry) => {
                        if self.join_before(entry, &before) {
                            Self::enqueue(queue, queued, entry);
                        }
                    }
                    None => {
                        // No children: the node passes its state through.
                        let changed = self.join_after(id, ExitKind::Default, &before);
                        if changed {
                            self.route(id, ExitKind::Default, queue, queued);
                        }
                    }
                }
            }
            NodeClass::Fanout => {
                match self.identify_new(id, &before) {
                    Ok(new_children) => {
                        for (key, child) in new_children {
                            self.graph.set_parent(child, id);
                            self.graph.node_mut(id).interpretations.insert(key, child);
                        }
                    }
                    Err(error) => {
                        // Malformed constructs degrade to a no-op expansion.
                        tracing::debug!(%error, "interpretation failed; falling back to no-op");
                        if !self
                            .graph
                            .node(id)
                            .interpretations
                            .contains_key(&InterpretationKey::Default)
                        {
                            let noop = self.graph.alloc(NodeKind::NoOp);
                            self.graph.set_parent(noop, id);
                            self.graph
                                .node_mut(id)
                                .interpretations
                                .insert(InterpretationKey::Default, noop);
                        }
                    }
                }
                for child in self.graph.fanout_children(id) {
                    if self.join_before(child, &before) {
                        Self::enqueue(queue, queued, child);
                    }
                }
            }
        }
    }

    /// Join a state into a node's before-state. Returns growth.
    fn join_before(&mut self, id: NodeId, state: &State) -> bool {
        let mut seq = self.seq;
        let changed = transfer_state(
            state,
            &mut self.graph.node_mut(id).before,
            &StateTransferFilter::All,
            &mut seq,
            true,
        );
        self.seq = seq;
        changed
    }

    /// Join a state into a node's after-state for an exit kind.
    fn join_after(&mut self, id: NodeId, exit: ExitKind, state: &State) -> bool {
        let mut seq = self.seq;
        let changed = transfer_state(
            state,
            self.graph.node_mut(id).afters.entry(exit).or_default(),
            &StateTransferFilter::All,
            &mut seq,
            true,
        );
        self.seq = seq;
        changed
    }

    /// Propagate a node's after-state for `exit` to its successors, applying
    /// the node's exit-state transfer filter so owned scopes do not leak.
    fn route(
        &mut self,
        id: NodeId,
        exit: ExitKind,
        queue: &mut VecDeque<NodeId>,
        queued: &mut BTreeSet<NodeId>,
    ) {
        let Some(after) = self.graph.node(id).afters.get(&exit).cloned() else {
            return;
        };
        let filter = match self.graph.node(id).kind.ctx_ref() {
            Some(ctx_ref) => {
                let excluded = self.contexts.owned_scopes(ctx_ref);
                if excluded.is_empty() {
                    StateTransferFilter::All
                } else {
                    StateTransferFilter::ExcludedScopes(excluded)
                }
            }
            None => StateTransferFilter::All,
        };
        let mut filtered = State::new();
        let mut seq = self.seq;
        transfer_state(&after, &mut filtered, &filter, &mut seq, true);
        self.seq = seq;

        let Some(parent) = self.graph.node(id).parent else {
            // Root exit: the after-state is the final result.
            return;
        };
        for succ in self.successors_of(parent, id, exit) {
            match succ {
                Succ::Node(next) => {
                    if self.join_before(next, &filtered) {
                        Self::enqueue(queue, queued, next);
                    }
                }
                Succ::Exit(parent_exit) => {
                    if self.join_after(parent, parent_exit, &filtered) {
                        self.route(parent, parent_exit, queue, queued);
                    }
                }
            }
        }
    }

    /// The successor set for a child's exit within its parent.
    fn successors_of(&self, parent: NodeId, child: NodeId, exit: ExitKind) -> BTreeSet<Succ> {
        let node = self.graph.node(parent);
        match node.kind.class() {
            // Children of fanout nodes exit straight through the node.
            NodeClass::Fanout => BTreeSet::from([Succ::Exit(exit)]),
            NodeClass::ControlFlow => {
                let Some(cfg) = node.kind.cfg() else {
                    return BTreeSet::new();
                };
                match exit {
                    ExitKind::Default => cfg.successors(child, ExitKind::Default),
                    ExitKind::BashExit | ExitKind::BashReturn => {
                        match node.kind.exit_policy() {
                            ExitPolicy::Swallow => cfg.successors(child, ExitKind::Default),
                            ExitPolicy::Propagate => BTreeSet::from([Succ::Exit(exit)]),
                            ExitPolicy::ConvertToDefault => {
                                BTreeSet::from([Succ::Exit(ExitKind::Default)])
                            }
                            ExitPolicy::FuncBoundary => {
                                if exit == ExitKind::BashReturn {
                                    BTreeSet::from([Succ::Exit(ExitKind::Default)])
                                } else {
                                    BTreeSet::from([Succ::Exit(ExitKind::BashExit)])
                                }
                            }
                        }
                    }
                }
            }
            NodeClass::Leaf => BTreeSet::new(),
        }
    }

    /// Compute the (possibly empty) set of new interpretations for a fanout
    /// node given its current before-state.
    fn identify_new(
        &mut self,
        id: NodeId,
        before: &State,
    ) -> Result<Vec<(InterpretationKey, NodeId)>, CallGraphError> {
        let kind = self.graph.node(id).kind.clone();
        match kind {
            NodeKind::SimpleAlternatives { .. } => Ok(Vec::new()),
            NodeKind::RawBashScript { script, ctx } => {
                bash_nodes::identify_raw_bash_script(self, id, &script, ctx)
            }
            NodeKind::BashStatement { stmt, ctx } => {
                bash_nodes::identify_bash_statement(self, id, &stmt, ctx, before)
            }
            NodeKind::BashSingleCommand {
                stmt,
                ctx,
                cmd,
                args,
                stdout_redirects,
            } => bash_nodes::identify_bash_single_command(
                self,
                id,
                &stmt,
                ctx,
                &cmd,
                &args,
                &stdout_redirects,
                before,
            ),
            NodeKind::RawWorkflow { workflow, ctx } => {
                github_nodes::identify_raw_workflow(self, id, &workflow, ctx)
            }
            NodeKind::RawJob {
                job_id,
                normal,
                reusable,
                ctx,
            } => github_nodes::identify_raw_job(self, id, &job_id, &normal, &reusable, ctx),
            NodeKind::RawStep { step, ctx } => github_nodes::identify_raw_step(self, id, &step, ctx),
            NodeKind::RawActionStep { step, ctx } => {
                github_nodes::identify_raw_action_step(self, id, &step, ctx)
            }
            NodeKind::ActionStepNode {
                ctx,
                uses_name,
                with_params,
                ..
            } => github_nodes::identify_action_step(self, id, ctx, &uses_name, &with_params),
            NodeKind::ReusableWorkflowCall { .. } => {
                github_nodes::identify_noop_default(self, id)
            }
            NodeKind::EnvBlock { env, ctx } => github_nodes::identify_env_block(self, id, &env, ctx),
            NodeKind::MatrixBlock { matrix, ctx } => {
                github_nodes::identify_matrix_block(self, id, &matrix, ctx)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Root context helper for driver code.
    pub fn create_root_context(&mut self, repo_path: Option<std::path::PathBuf>) -> ContextId {
        self.contexts.create_analysis(repo_path)
    }
}
