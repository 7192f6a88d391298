//! Serializable views of steps and trees.

use crate::step::{NodeType, StateId, Step, StepId};
use serde::Serialize;

/// One entry of a node's `trace_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSummary {
    pub step_id: StepId,
    pub node_type: NodeType,
    pub rule_name: String,
    pub state: StateId,
    pub current_token: String,
    pub chosen: i64,
    pub input_text: String,
    pub lookahead: Vec<String>,
    /// `[target_state, [labels...]]` per possible transition.
    pub possible_alternatives: Vec<(StateId, Vec<String>)>,
    pub is_error: bool,
}

impl From<&Step> for StepSummary {
    fn from(step: &Step) -> Self {
        Self {
            step_id: step.id.clone(),
            node_type: step.node_type,
            rule_name: step.rule_name.clone(),
            state: step.state,
            current_token: step.current_token_repr.clone(),
            chosen: step.chosen_or_unset(),
            input_text: step.input_text.clone(),
            lookahead: step.lookahead.clone(),
            possible_alternatives: step
                .possible_transitions
                .iter()
                .map(|t| (t.target, t.label.labels()))
                .collect(),
            is_error: step.is_error_node,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraceInfo {
    Steps(Vec<StepSummary>),
    Collapsed(&'static str),
}

impl TraceInfo {
    pub fn collapsed() -> Self {
        TraceInfo::Collapsed("collapsed")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerializedNode {
    pub id: String,
    pub node_type: &'static str,
    pub rule_name: Option<String>,
    pub token: Option<String>,
    pub trace_info: TraceInfo,
    pub children: Vec<SerializedNode>,
}

/// A decision step located in the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionPoint {
    pub step_id: StepId,
    pub step_type: NodeType,
    pub owner_node_id: String,
    pub owner_node_type: &'static str,
    #[serde(rename = "ruleName")]
    pub rule_name: String,
    pub token: String,
}
