//! Parse tree reconstructed from a traversal.
//!
//! Rule nodes own the steps recorded while their rule was active; token nodes
//! own the step that consumed them. Cutting a tree at step `N` shows the parse
//! as it looked right after step `N`.

use crate::{
    arena::Arena,
    output::{DecisionPoint, SerializedNode, StepSummary, TraceInfo},
    step::{NodeType, Step, StepId, StepRef},
    traversal::Traversal,
};
use serde::{Serialize, Serializer};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{debug, trace, warn};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique node identifier, rendered as `ptn_<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ptn_{}", self.0)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Rule(String),
    /// Rendered token, e.g. `EINS ('1')`.
    Token(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseTreeNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub children: Vec<ParseTreeNode>,
    pub trace_steps: Vec<StepRef>,
}

impl ParseTreeNode {
    pub fn rule(name: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Rule(name.into()))
    }

    pub fn token(repr: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Token(repr.into()))
    }

    fn with_kind(kind: NodeKind) -> Self {
        Self {
            id: NodeId::next(),
            kind,
            children: Vec::new(),
            trace_steps: Vec::new(),
        }
    }

    pub fn rule_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Rule(name) => Some(name),
            NodeKind::Token(_) => None,
        }
    }

    pub fn token_repr(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Token(repr) => Some(repr),
            NodeKind::Rule(_) => None,
        }
    }

    pub fn node_type(&self) -> &'static str {
        match self.kind {
            NodeKind::Rule(_) => "rule",
            NodeKind::Token(_) => "token",
        }
    }

    /// Pre-order iteration over this node and everything below it.
    pub fn iter(&self) -> impl Iterator<Item = &ParseTreeNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    fn owns(&self, steps: &Arena<Step>, id: &StepId) -> bool {
        self.trace_steps.iter().any(|step| steps[*step].id == *id)
    }

    fn find_owner_mut<'a>(
        &'a mut self,
        steps: &Arena<Step>,
        id: &StepId,
    ) -> Option<&'a mut ParseTreeNode> {
        if self.owns(steps, id) {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_owner_mut(steps, id))
    }

    fn remove_descendant(&mut self, id: NodeId) -> Option<ParseTreeNode> {
        if let Some(position) = self.children.iter().position(|child| child.id == id) {
            return Some(self.children.remove(position));
        }
        self.children
            .iter_mut()
            .find_map(|child| child.remove_descendant(id))
    }

    fn copy_and_cut(&self, steps: &Arena<Step>, max_step_id: usize) -> Option<ParseTreeNode> {
        let trace_steps: Vec<StepRef> = self
            .trace_steps
            .iter()
            .copied()
            .filter(|step| steps[*step].id.root_index() <= max_step_id)
            .collect();
        if trace_steps.is_empty() {
            return None;
        }

        Some(ParseTreeNode {
            id: self.id,
            kind: self.kind.clone(),
            children: self
                .children
                .iter()
                .filter_map(|child| child.copy_and_cut(steps, max_step_id))
                .collect(),
            trace_steps,
        })
    }

    fn to_serialized(&self, steps: &Arena<Step>, verbose: bool) -> SerializedNode {
        let trace_info = if verbose {
            TraceInfo::Steps(
                self.trace_steps
                    .iter()
                    .map(|step| StepSummary::from(&steps[*step]))
                    .collect(),
            )
        } else {
            TraceInfo::collapsed()
        };

        SerializedNode {
            id: self.id.to_string(),
            node_type: self.node_type(),
            rule_name: self.rule_name().map(str::to_string),
            token: self.token_repr().map(str::to_string),
            trace_info,
            children: self
                .children
                .iter()
                .map(|child| child.to_serialized(steps, verbose))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseTree {
    root: Option<ParseTreeNode>,
    last_step_id: Option<usize>,
}

impl ParseTree {
    pub fn new(root: Option<ParseTreeNode>, last_step_id: Option<usize>) -> Self {
        Self { root, last_step_id }
    }

    /// Replays the main path: rule entries open nodes, rule exits close them,
    /// consumed tokens become leaves and everything else is attached to the
    /// innermost open rule.
    pub fn build_from_traversal(traversal: &Traversal) -> Self {
        let mut root = None;
        let mut stack: Vec<ParseTreeNode> = Vec::new();

        for &step_ref in traversal.main_path() {
            let step = traversal.step(step_ref);
            match step.node_type {
                NodeType::RuleEntry => {
                    let mut node = ParseTreeNode::rule(step.rule_name.clone());
                    node.trace_steps.push(step_ref);
                    stack.push(node);
                }
                NodeType::RuleExit => match stack.pop() {
                    Some(mut node) => {
                        if node.rule_name() != Some(step.rule_name.as_str()) {
                            warn!(
                                step = %step.id,
                                open = ?node.rule_name(),
                                exiting = %step.rule_name,
                                "rule exit does not match the innermost open rule"
                            );
                        }
                        node.trace_steps.push(step_ref);
                        attach(&mut stack, &mut root, node);
                    }
                    None => warn!(step = %step.id, rule = %step.rule_name, "rule exit without entry"),
                },
                NodeType::TokenConsume => {
                    let mut node = ParseTreeNode::token(step.current_token_repr.clone());
                    node.trace_steps.push(step_ref);
                    attach(&mut stack, &mut root, node);
                }
                _ => match stack.last_mut() {
                    Some(open) => open.trace_steps.push(step_ref),
                    None => trace!(step = %step.id, "dropping step recorded outside any rule"),
                },
            }
        }

        // Rules left open by a parse error still belong in the tree.
        while let Some(node) = stack.pop() {
            attach(&mut stack, &mut root, node);
        }

        Self {
            root,
            last_step_id: traversal.last_step_id(),
        }
    }

    pub fn root(&self) -> Option<&ParseTreeNode> {
        self.root.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn last_step_id(&self) -> Option<usize> {
        self.last_step_id
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ParseTreeNode> {
        self.root.iter().flat_map(|root| root.iter())
    }

    /// A copy containing only what existed right after step `max_step_id`.
    /// Node ids are preserved.
    pub fn copy_and_cut(&self, steps: &Arena<Step>, max_step_id: usize) -> ParseTree {
        let root = self
            .root
            .as_ref()
            .and_then(|root| root.copy_and_cut(steps, max_step_id));
        debug!(max_step_id, empty = root.is_none(), "cut tree");
        Self {
            root,
            last_step_id: self.last_step_id,
        }
    }

    /// Largest main-path index among the steps present in this tree.
    pub fn max_step_id(&self, steps: &Arena<Step>) -> Option<usize> {
        self.nodes()
            .flat_map(|node| node.trace_steps.iter())
            .filter_map(|step| steps[*step].id.main_index())
            .max()
    }

    pub fn find_owner(&self, steps: &Arena<Step>, id: &StepId) -> Option<&ParseTreeNode> {
        self.nodes().find(|node| node.owns(steps, id))
    }

    pub fn find_owner_mut(
        &mut self,
        steps: &Arena<Step>,
        id: &StepId,
    ) -> Option<&mut ParseTreeNode> {
        self.root.as_mut()?.find_owner_mut(steps, id)
    }

    pub fn find_step(&self, steps: &Arena<Step>, id: &StepId) -> Option<StepRef> {
        self.nodes()
            .flat_map(|node| node.trace_steps.iter())
            .copied()
            .find(|step| steps[*step].id == *id)
    }

    /// Removes the node with `id` together with its subtree. The root cannot be removed.
    pub fn remove_node(&mut self, id: NodeId) -> Option<ParseTreeNode> {
        self.root.as_mut()?.remove_descendant(id)
    }

    /// Decision points of the given types, in step order.
    pub fn decision_steps(&self, steps: &Arena<Step>, types: &[NodeType]) -> Vec<DecisionPoint> {
        let mut points: Vec<DecisionPoint> = self
            .nodes()
            .flat_map(|node| {
                node.trace_steps
                    .iter()
                    .map(move |step| (node, &steps[*step]))
            })
            .filter(|(_, step)| types.contains(&step.node_type))
            .map(|(node, step)| DecisionPoint {
                step_id: step.id.clone(),
                step_type: step.node_type,
                owner_node_id: node.id.to_string(),
                owner_node_type: node.node_type(),
                rule_name: step.rule_name.clone(),
                token: step.current_token_repr.clone(),
            })
            .collect();
        points.sort_by(|a, b| a.step_id.cmp(&b.step_id));
        points
    }

    pub fn decision_step_by_id(&self, steps: &Arena<Step>, id: &StepId) -> Option<DecisionPoint> {
        self.decision_steps(steps, &NodeType::DECISION_POINTS)
            .into_iter()
            .find(|point| point.step_id == *id)
    }

    pub fn to_serialized(&self, steps: &Arena<Step>, verbose: bool) -> Option<SerializedNode> {
        self.root
            .as_ref()
            .map(|root| root.to_serialized(steps, verbose))
    }

    pub fn to_json(&self, steps: &Arena<Step>, verbose: bool) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_serialized(steps, verbose))
    }
}

fn attach(stack: &mut [ParseTreeNode], root: &mut Option<ParseTreeNode>, node: ParseTreeNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return;
    }
    match root {
        Some(existing) => {
            warn!(node = %node.id, "second top-level node; attaching below the root");
            existing.children.push(node);
        }
        None => *root = Some(node),
    }
}
