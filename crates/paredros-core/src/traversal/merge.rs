//! Collapsing runs of consecutive decision steps.
//!
//! Prediction often walks through several decision states before anything is
//! consumed. Each run of adjacent `Decision`/`Sync` steps (optionally limited to
//! one rule) becomes a single merged step whose transitions are the sorted union
//! of the members' transitions and whose choice is the last member's choice.

use super::Traversal;
use crate::{
    config::MergeConfig,
    error::IntegrationError,
    step::{NodeType, Step, StepId, StepRef},
};
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// A run of main-path steps and the step that replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeGroup {
    pub members: Vec<StepRef>,
    pub merged: StepRef,
}

impl Traversal {
    /// Finds mergeable runs and builds a merged step for each.
    ///
    /// The main path is left untouched; see [`Traversal::replace_merged_nodes`].
    pub fn group_and_merge(
        &mut self,
        config: &MergeConfig,
    ) -> Result<Vec<MergeGroup>, IntegrationError> {
        let min_group_size = config.min_group_size.max(2);
        let mut runs: Vec<Vec<StepRef>> = Vec::new();
        let mut current: Vec<StepRef> = Vec::new();

        for &step_ref in &self.main_path {
            let step = &self.steps[step_ref];
            if !step.node_type.is_mergeable() {
                runs.push(std::mem::take(&mut current));
                continue;
            }

            let continues = current.last().is_none_or(|last| {
                !config.require_same_rule || self.steps[*last].rule_name == step.rule_name
            });
            if !continues {
                runs.push(std::mem::take(&mut current));
            }
            current.push(step_ref);
        }
        runs.push(current);

        runs.into_iter()
            .filter(|run| run.len() >= min_group_size)
            .map(|members| {
                let merged = self.merge_members(&members)?;
                Ok(MergeGroup { members, merged })
            })
            .collect()
    }

    fn merge_members(&mut self, members: &[StepRef]) -> Result<StepRef, IntegrationError> {
        let (Some(&first), Some(&last)) = (members.first(), members.last()) else {
            unreachable!("merge groups have at least two members");
        };

        let transitions = members
            .iter()
            .flat_map(|member| self.steps[*member].possible_transitions.iter().cloned())
            .sorted()
            .dedup()
            .collect::<Vec<_>>();

        let chosen = match self.steps[last].chosen_transition() {
            Some(taken) => Some(
                transitions
                    .iter()
                    .position(|t| t == taken)
                    .map(|i| i + 1)
                    .ok_or_else(|| IntegrationError::MergedChoiceLost {
                        step: self.steps[first].id.clone(),
                    })?,
            ),
            None => None,
        };

        // Each merged transition keeps the branch of the latest member offering it.
        let mut branches = Vec::with_capacity(transitions.len());
        for (i, transition) in transitions.iter().enumerate() {
            let existing = members.iter().rev().find_map(|member| {
                let step = &self.steps[*member];
                step.possible_transitions
                    .iter()
                    .position(|t| t == transition)
                    .and_then(|index| step.alternative_branches.get(index).copied())
            });
            let branch = match existing {
                Some(branch) => branch,
                None => {
                    let first_step = &self.steps[first];
                    let mut branch = Step::new(
                        first_step.id.branch(i + 1),
                        NodeType::AltCandidate,
                        &first_step.context(),
                    );
                    branch.state = transition.target;
                    self.steps.alloc(branch)
                }
            };
            branches.push(branch);
        }

        // State and id come from the first member, the token snapshot from the last.
        let first_step = &self.steps[first];
        let last_step = &self.steps[last];
        let merged = Step {
            node_type: first_step.node_type.merged(),
            current_token_repr: last_step.current_token_repr.clone(),
            token_index: last_step.token_index,
            lookahead: last_step.lookahead.clone(),
            input_text: last_step.input_text.clone(),
            possible_transitions: transitions,
            chosen_transition_index: chosen,
            alternative_branches: branches,
            next_node: None,
            previous_node: None,
            parent: None,
            is_error_node: members.iter().any(|m| self.steps[*m].is_error_node),
            ..first_step.clone()
        };

        debug!(
            step = %merged.id,
            members = members.len(),
            transitions = merged.possible_transitions.len(),
            "merged decision steps"
        );
        Ok(self.steps.alloc(merged))
    }

    /// Splices merged steps into the main path in place of their groups.
    pub fn replace_merged_nodes(&mut self, groups: &[MergeGroup]) {
        let by_first: FxHashMap<StepRef, StepRef> = groups
            .iter()
            .filter_map(|group| Some((*group.members.first()?, group.merged)))
            .collect();
        let members: FxHashSet<StepRef> = groups
            .iter()
            .flat_map(|group| group.members.iter().copied())
            .collect();

        self.main_path = self
            .main_path
            .iter()
            .filter_map(|step| match by_first.get(step) {
                Some(merged) => Some(*merged),
                None if members.contains(step) => None,
                None => Some(*step),
            })
            .collect();
        self.relink();

        for group in groups {
            for branch in self.steps[group.merged].alternative_branches.clone() {
                self.steps[branch].parent = Some(group.merged);
            }
        }
    }

    /// Merges, splices and renumbers in one go.
    pub fn simplify(&mut self, config: &MergeConfig) -> Result<(), IntegrationError> {
        if config.enabled {
            let before = self.len();
            let groups = self.group_and_merge(config)?;
            for (members, merged) in merged_ids(self, &groups) {
                debug!(
                    members = %members.iter().join(", "),
                    merged = %merged,
                    "replacing decision run"
                );
            }
            self.replace_merged_nodes(&groups);
            debug!(groups = groups.len(), before, after = self.len(), "simplified traversal");
        }
        self.fix_step_ids();
        Ok(())
    }
}

/// Convenience for callers that only hold ids.
pub fn merged_ids(traversal: &Traversal, groups: &[MergeGroup]) -> Vec<(Vec<StepId>, StepId)> {
    groups
        .iter()
        .map(|group| {
            (
                group
                    .members
                    .iter()
                    .map(|m| traversal.step(*m).id.clone())
                    .collect(),
                traversal.step(group.merged).id.clone(),
            )
        })
        .collect()
}
