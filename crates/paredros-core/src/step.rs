//! Recorded parse steps and the values they carry.
//!
//! A [`Step`] is one event of a parse as seen by the debugger: which state the
//! interpreter was in, which transitions were possible from there, which one was
//! taken, and a frozen snapshot of the token context. Steps form a doubly linked
//! main path, and every step owns one lazily populated alternative branch per
//! possible transition.

use crate::arena::ArenaId;
use serde::{Serialize, Serializer};
use smallvec::{SmallVec, smallvec};
use std::fmt;

pub type StepRef = ArenaId<Step>;

/// Identifier of a state in the interpreter's state network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StateId(pub u32);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for StateId {
    fn from(value: usize) -> Self {
        StateId(value as u32)
    }
}

/// Dotted step identifier: `7` on the main path, `7.2` for the second
/// alternative of step 7, `7.2.1` one level deeper.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepId(SmallVec<[usize; 2]>);

impl StepId {
    pub fn main(index: usize) -> Self {
        StepId(smallvec![index])
    }

    /// The id of the `ordinal`-th (1-based) alternative below this step.
    pub fn branch(&self, ordinal: usize) -> Self {
        let mut path = self.0.clone();
        path.push(ordinal);
        StepId(path)
    }

    /// The main-path index, if this id names a main-path step.
    pub fn main_index(&self) -> Option<usize> {
        match self.0.as_slice() {
            [index] => Some(*index),
            _ => None,
        }
    }

    pub fn path(&self) -> &[usize] {
        &self.0
    }

    pub fn root_index(&self) -> usize {
        self.0.first().copied().unwrap_or_default()
    }

    pub fn is_branch(&self) -> bool {
        self.0.len() > 1
    }

    pub fn parse(s: &str) -> Option<Self> {
        let path = s
            .split('.')
            .map(|part| part.trim().parse::<usize>().ok())
            .collect::<Option<SmallVec<[usize; 2]>>>()?;
        (!path.is_empty()).then_some(StepId(path))
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.0.iter();
        if let Some(first) = parts.next() {
            write!(f, "{}", first)?;
        }
        for part in parts {
            write!(f, ".{}", part)?;
        }
        Ok(())
    }
}

impl Serialize for StepId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeType {
    #[serde(rename = "Rule entry")]
    RuleEntry,
    #[serde(rename = "Rule exit")]
    RuleExit,
    #[serde(rename = "Token consume")]
    TokenConsume,
    Decision,
    Sync,
    Error,
    #[serde(rename = "Merged Decision")]
    MergedDecision,
    #[serde(rename = "Merged Sync")]
    MergedSync,
    #[serde(rename = "Alt candidate")]
    AltCandidate,
    #[serde(rename = "Alt chosen")]
    AltChosen,
}

impl NodeType {
    /// Decision points as listed by the tree: plain and merged decisions and syncs.
    pub const DECISION_POINTS: [NodeType; 4] = [
        NodeType::Decision,
        NodeType::MergedDecision,
        NodeType::Sync,
        NodeType::MergedSync,
    ];

    /// The type a merged group takes on, given the type of its first member.
    pub fn merged(self) -> NodeType {
        match self {
            NodeType::Decision => NodeType::MergedDecision,
            NodeType::Sync => NodeType::MergedSync,
            other => other,
        }
    }

    pub fn is_mergeable(self) -> bool {
        matches!(self, NodeType::Decision | NodeType::Sync)
    }

    pub fn is_decision_point(self) -> bool {
        Self::DECISION_POINTS.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::RuleEntry => "Rule entry",
            NodeType::RuleExit => "Rule exit",
            NodeType::TokenConsume => "Token consume",
            NodeType::Decision => "Decision",
            NodeType::Sync => "Sync",
            NodeType::Error => "Error",
            NodeType::MergedDecision => "Merged Decision",
            NodeType::MergedSync => "Merged Sync",
            NodeType::AltCandidate => "Alt candidate",
            NodeType::AltChosen => "Alt chosen",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transition consumes or does.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransitionLabel {
    /// Token names; either symbolic (`ID`) or quoted literals (`'+'`).
    Tokens(Vec<String>),
    /// Enter the named rule.
    Rule(String),
    /// Leave the current rule.
    Exit,
}

impl TransitionLabel {
    pub fn rule(name: impl Into<String>) -> Self {
        TransitionLabel::Rule(name.into())
    }

    pub fn token(name: impl Into<String>) -> Self {
        TransitionLabel::Tokens(vec![name.into()])
    }

    /// Label strings as they appear in the output.
    pub fn labels(&self) -> Vec<String> {
        match self {
            TransitionLabel::Tokens(names) => names.clone(),
            TransitionLabel::Rule(name) => vec![format!("Rule {}", name)],
            TransitionLabel::Exit => vec!["Exit".to_string()],
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, TransitionLabel::Exit)
    }

    pub fn enters_rule(&self, rule: &str) -> bool {
        matches!(self, TransitionLabel::Rule(name) if name == rule)
    }

    /// A token label matches by symbolic name or by literal text with quotes stripped.
    pub fn matches_token(&self, token: &TokenInfo) -> bool {
        match self {
            TransitionLabel::Tokens(names) => names.iter().any(|label| {
                token.name.as_deref() == Some(label.as_str()) || label.trim_matches('\'') == token.text
            }),
            _ => false,
        }
    }
}

impl fmt::Display for TransitionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.labels().join(", "))
    }
}

impl Serialize for TransitionLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.labels().serialize(serializer)
    }
}

/// A possible next move: the state it leads to and what it consumes.
///
/// Ordering compares `(target, label)`, which is the canonical order of a
/// merged transition list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Transition {
    pub target: StateId,
    pub label: TransitionLabel,
}

impl Transition {
    pub fn new(target: impl Into<StateId>, label: TransitionLabel) -> Self {
        Self {
            target: target.into(),
            label,
        }
    }
}

impl From<(u32, TransitionLabel)> for Transition {
    fn from((target, label): (u32, TransitionLabel)) -> Self {
        Self {
            target: StateId(target),
            label,
        }
    }
}

/// A token as seen by the debugger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TokenInfo {
    pub index: usize,
    /// Symbolic token name, `None` for tokens only known by their literal.
    pub name: Option<String>,
    pub text: String,
    pub start: Option<usize>,
    pub stop: Option<usize>,
}

impl TokenInfo {
    pub fn new(index: usize, name: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            index,
            name: name.map(str::to_string),
            text: text.into(),
            start: None,
            stop: None,
        }
    }

    pub fn with_span(mut self, start: usize, stop: usize) -> Self {
        self.start = Some(start);
        self.stop = Some(stop);
        self
    }
}

impl fmt::Display for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ('{}')", name, self.text),
            None => write!(f, "Literal ('{}')", self.text),
        }
    }
}

/// One recorded parse event.
///
/// Context fields are copied at record time and never change afterwards.
/// `alternative_branches` always has the same length and order as
/// `possible_transitions`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: StepId,
    pub node_type: NodeType,
    pub rule_name: String,
    pub state: StateId,
    pub current_token_repr: String,
    pub token_index: Option<usize>,
    pub lookahead: Vec<String>,
    pub input_text: String,
    pub possible_transitions: Vec<Transition>,
    /// 1-based index into `possible_transitions`; `None` while undetermined.
    pub chosen_transition_index: Option<usize>,
    pub alternative_branches: Vec<StepRef>,
    pub next_node: Option<StepRef>,
    pub previous_node: Option<StepRef>,
    /// Owner of an alternative branch.
    pub parent: Option<StepRef>,
    pub is_error_node: bool,
    /// Set once an alternative branch has had its own transitions computed.
    pub expanded: bool,
}

impl Step {
    pub fn new(id: StepId, node_type: NodeType, context: &StepContext) -> Self {
        Self {
            id,
            node_type,
            rule_name: context.rule_name.clone(),
            state: context.state,
            current_token_repr: context.current_token_repr.clone(),
            token_index: context.token_index,
            lookahead: context.lookahead.clone(),
            input_text: context.input_text.clone(),
            possible_transitions: Vec::new(),
            chosen_transition_index: None,
            alternative_branches: Vec::new(),
            next_node: None,
            previous_node: None,
            parent: None,
            is_error_node: false,
            expanded: false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.chosen_transition_index.is_some()
    }

    /// The chosen index as written to the output, `-1` when undetermined.
    pub fn chosen_or_unset(&self) -> i64 {
        self.chosen_transition_index
            .map(|index| index as i64)
            .unwrap_or(-1)
    }

    pub fn chosen_transition(&self) -> Option<&Transition> {
        self.chosen_transition_index
            .and_then(|index| self.possible_transitions.get(index.checked_sub(1)?))
    }

    /// 1-based index of the first transition consuming `token`.
    pub fn matching_token_transition(&self, token: &TokenInfo) -> Option<usize> {
        self.possible_transitions
            .iter()
            .position(|t| t.label.matches_token(token))
            .map(|i| i + 1)
    }

    /// 1-based index of the first transition entering `rule`.
    pub fn rule_transition(&self, rule: &str) -> Option<usize> {
        self.possible_transitions
            .iter()
            .position(|t| t.label.enters_rule(rule))
            .map(|i| i + 1)
    }

    pub fn exit_transition(&self) -> Option<usize> {
        self.possible_transitions
            .iter()
            .position(|t| t.label.is_exit())
            .map(|i| i + 1)
    }

    pub fn context(&self) -> StepContext {
        StepContext {
            state: self.state,
            rule_name: self.rule_name.clone(),
            current_token_repr: self.current_token_repr.clone(),
            token_index: self.token_index,
            lookahead: self.lookahead.clone(),
            input_text: self.input_text.clone(),
        }
    }
}

/// Context copied into a step when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepContext {
    pub state: StateId,
    pub rule_name: String,
    pub current_token_repr: String,
    pub token_index: Option<usize>,
    pub lookahead: Vec<String>,
    pub input_text: String,
}
