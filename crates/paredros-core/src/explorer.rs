//! Interactive navigation over a recorded parse.
//!
//! The explorer keeps a cursor on the main path and shows the tree as it was
//! right after the cursor's step. At a step whose choice is still open it can
//! lay out every alternative as a candidate subtree; choosing one that the
//! parse did not take continues speculatively past the recorded path.

use crate::{
    error::{Error, NavigationError},
    oracle::DecisionOracle,
    output::{DecisionPoint, SerializedNode},
    step::{NodeType, Step, StepId, StepRef},
    traversal::Traversal,
    tree::{NodeId, ParseTree, ParseTreeNode},
};
use std::fmt;
use tracing::debug;

/// A candidate laid out during alternative expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub step: StepRef,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
struct Expansion {
    origin: StepRef,
    candidates: Vec<Candidate>,
}

/// Forks laid out by the last expansion, indexed by alternative. A slot is
/// emptied once its fork is chosen and becomes part of the working path.
#[derive(Debug, Clone)]
struct Forks {
    origin: StepRef,
    slots: Vec<Option<StepRef>>,
}

pub struct Explorer {
    traversal: Traversal,
    oracle: Box<dyn DecisionOracle>,
    original_tree: ParseTree,
    working_tree: ParseTree,
    current_step_id: usize,
    max_work_id: usize,
    expansion: Option<Expansion>,
    forks: Option<Forks>,
}

impl fmt::Debug for Explorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Explorer")
            .field("current_step_id", &self.current_step_id)
            .field("max_work_id", &self.max_work_id)
            .field("steps", &self.traversal.len())
            .field("expansion", &self.expansion)
            .finish()
    }
}

impl Explorer {
    /// Starts idle at the last recorded step.
    pub fn new(traversal: Traversal, oracle: Box<dyn DecisionOracle>) -> Self {
        let original_tree = ParseTree::build_from_traversal(&traversal);
        let start = traversal.last_step_id().unwrap_or_default();
        let mut explorer = Self {
            traversal,
            oracle,
            original_tree,
            working_tree: ParseTree::default(),
            current_step_id: start,
            max_work_id: 0,
            expansion: None,
            forks: None,
        };
        explorer.cut_to_step(start);
        explorer
    }

    pub fn traversal(&self) -> &Traversal {
        &self.traversal
    }

    pub fn original_tree(&self) -> &ParseTree {
        &self.original_tree
    }

    pub fn working_tree(&self) -> &ParseTree {
        &self.working_tree
    }

    pub fn current_step_id(&self) -> usize {
        self.current_step_id
    }

    pub fn max_work_id(&self) -> usize {
        self.max_work_id
    }

    pub fn last_step_id(&self) -> usize {
        self.traversal.last_step_id().unwrap_or_default()
    }

    pub fn in_alternative_expansion_mode(&self) -> bool {
        self.expansion.is_some()
    }

    /// Steps of the candidates currently laid out, in alternative order.
    pub fn candidates(&self) -> Vec<&Step> {
        self.expansion
            .iter()
            .flat_map(|expansion| expansion.candidates.iter())
            .map(|candidate| self.traversal.step(candidate.step))
            .collect()
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.current_step_ref().map(|step| self.traversal.step(step))
    }

    /// The cursor's step: a speculative step in the working tree if there is
    /// one, otherwise the recorded step.
    fn current_step_ref(&self) -> Option<StepRef> {
        let id = StepId::main(self.current_step_id);
        self.working_tree
            .find_step(self.traversal.steps(), &id)
            .or_else(|| self.traversal.main_step(self.current_step_id))
    }

    fn current_is_decision(&self) -> bool {
        self.current_step()
            .is_some_and(|step| step.possible_transitions.len() > 1)
    }

    fn cut_to_step(&mut self, step_id: usize) {
        self.working_tree = self
            .original_tree
            .copy_and_cut(self.traversal.steps(), step_id);
        self.max_work_id = self
            .working_tree
            .max_step_id(self.traversal.steps())
            .unwrap_or_default();
        self.current_step_id = step_id;
    }

    pub fn step_forward(&mut self) -> Result<(), Error> {
        self.cancel_alt_expansion();

        let next_id = self.current_step_id + 1;
        if next_id > self.last_step_id() {
            return Err(NavigationError::EndOfInput.into());
        }

        let step_ref = self
            .current_step_ref()
            .ok_or(NavigationError::NoStep(self.current_step_id))?;
        if self.traversal.step(step_ref).is_settled() {
            self.cut_to_step(next_id);
            debug!(step = next_id, "stepped forward");
            return Ok(());
        }

        match self.expand_alternatives()? {
            0 => {
                self.cancel_alt_expansion();
                Err(NavigationError::NoAlternatives(self.traversal.step(step_ref).id.clone()).into())
            }
            1 => self.choose_alternative(1),
            _ => Ok(()),
        }
    }

    /// Steps forward up to `count` times, stopping early at an open decision.
    pub fn step_forward_by(&mut self, count: usize) -> Result<(), Error> {
        for _ in 0..count {
            self.step_forward()?;
            if self.in_alternative_expansion_mode() {
                break;
            }
        }
        Ok(())
    }

    /// While candidates are laid out this only withdraws them.
    pub fn go_back_one_step(&mut self) -> Result<(), Error> {
        if self.in_alternative_expansion_mode() {
            self.cancel_alt_expansion();
            return Ok(());
        }
        if self.current_step_id == 0 {
            return Err(NavigationError::AtStart.into());
        }

        let new_id = self.current_step_id - 1;
        if self.current_step_id > self.max_work_id && self.remove_speculative_step(self.current_step_id) {
            self.current_step_id = new_id;
        } else {
            self.cut_to_step(new_id);
        }
        debug!(step = self.current_step_id, "stepped back");
        Ok(())
    }

    pub fn reset_to_step_id(&mut self, step_id: usize) -> Result<(), Error> {
        self.cancel_alt_expansion();
        let last = self.last_step_id();
        if step_id > last {
            return Err(NavigationError::StepOutOfRange { id: step_id, last }.into());
        }
        self.cut_to_step(step_id);
        debug!(step = step_id, "reset cursor");
        Ok(())
    }

    /// Moves forward at least once, until a step with several transitions,
    /// an open decision, or the end.
    pub fn step_until_next_decision(&mut self) -> Result<(), Error> {
        self.cancel_alt_expansion();
        self.step_forward()?;

        while !self.in_alternative_expansion_mode() && !self.current_is_decision() {
            let before = self.current_step_id;
            match self.step_forward() {
                Ok(()) if self.current_step_id == before && !self.in_alternative_expansion_mode() => break,
                Ok(()) => {}
                Err(Error::Navigation(err)) => {
                    debug!(error = %err, "stopped looking for the next decision");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Moves back at least once, until a step with several transitions or step 0.
    pub fn step_back_until_previous_decision(&mut self) -> Result<(), Error> {
        self.cancel_alt_expansion();
        self.go_back_one_step()?;

        while self.current_step_id > 0 && !self.current_is_decision() {
            self.go_back_one_step()?;
        }
        Ok(())
    }

    /// Lays out every alternative of the current step below its tree node and
    /// returns how many there are.
    pub fn expand_alternatives(&mut self) -> Result<usize, Error> {
        self.cancel_alt_expansion();

        let origin = self
            .current_step_ref()
            .ok_or(NavigationError::NoStep(self.current_step_id))?;
        let origin_id = self.traversal.step(origin).id.clone();
        let owner_id = self
            .working_tree
            .find_owner(self.traversal.steps(), &StepId::main(self.current_step_id))
            .map(|node| node.id)
            .ok_or(NavigationError::NoStep(self.current_step_id))?;

        let count = self.traversal.step(origin).possible_transitions.len();
        let mut slots = match self.forks.take() {
            Some(forks) if forks.origin == origin => forks.slots,
            _ => vec![None; count],
        };
        slots.resize(count, None);

        let mut nodes = Vec::with_capacity(count);
        for (i, slot) in slots.iter_mut().enumerate() {
            let candidate = match *slot {
                Some(fork) => fork,
                None => {
                    let branch = self
                        .traversal
                        .expand_alternative(origin, i + 1, self.oracle.as_ref())?;
                    *slot.insert(self.traversal.fork(branch))
                }
            };
            let mut node = ParseTreeNode::rule(self.traversal.step(candidate).rule_name.clone());
            node.trace_steps.push(candidate);
            nodes.push((candidate, node));
        }

        let Some(owner) = self
            .working_tree
            .find_owner_mut(self.traversal.steps(), &StepId::main(self.current_step_id))
        else {
            return Err(NavigationError::NoStep(self.current_step_id).into());
        };
        let candidates = nodes
            .into_iter()
            .map(|(step, node)| {
                let candidate = Candidate { step, node: node.id };
                owner.children.push(node);
                candidate
            })
            .collect::<Vec<_>>();

        debug!(
            step = %origin_id,
            owner = %owner_id,
            candidates = candidates.len(),
            "expanded alternatives"
        );
        self.forks = Some(Forks { origin, slots });
        self.expansion = Some(Expansion { origin, candidates });
        Ok(count)
    }

    pub fn choose_alternative(&mut self, k: usize) -> Result<(), Error> {
        let expansion = self.expansion.take().ok_or(NavigationError::NotExpanding)?;
        let available = expansion.candidates.len();
        if k == 0 || k > available {
            self.expansion = Some(expansion);
            return Err(NavigationError::InvalidAlternative { index: k, available }.into());
        }

        let origin = self.traversal.step(expansion.origin);
        let on_recorded_path = self.traversal.main_step(self.current_step_id) == Some(expansion.origin);
        if on_recorded_path && origin.chosen_transition_index == Some(k) {
            for candidate in &expansion.candidates {
                self.working_tree.remove_node(candidate.node);
            }
            let next_id = self.current_step_id + 1;
            if next_id > self.last_step_id() {
                return Err(NavigationError::EndOfInput.into());
            }
            self.cut_to_step(next_id);
            debug!(step = next_id, "continued on the recorded path");
            return Ok(());
        }

        for (i, candidate) in expansion.candidates.iter().enumerate() {
            if i + 1 != k {
                self.working_tree.remove_node(candidate.node);
            }
        }

        let chosen = expansion.candidates[k - 1];
        if let Some(forks) = self.forks.as_mut()
            && forks.origin == expansion.origin
            && let Some(slot) = forks.slots.get_mut(k - 1)
        {
            *slot = None;
        }
        let next_id = self.current_step_id + 1;
        self.traversal.step_mut(chosen.step).node_type = NodeType::AltChosen;
        self.traversal.renumber(chosen.step, StepId::main(next_id));
        self.current_step_id = next_id;
        debug!(step = next_id, alternative = k, "chose alternative");
        Ok(())
    }

    /// Withdraws the laid-out candidates. A no-op when nothing is expanded.
    pub fn cancel_alt_expansion(&mut self) {
        if let Some(expansion) = self.expansion.take() {
            for candidate in expansion.candidates {
                self.working_tree.remove_node(candidate.node);
            }
        }
    }

    /// Removes the speculative node whose first step has main id `step_id`.
    fn remove_speculative_step(&mut self, step_id: usize) -> bool {
        let id = StepId::main(step_id);
        let steps = self.traversal.steps();
        let target = self
            .working_tree
            .nodes()
            .find(|node| {
                node.trace_steps.first().is_some_and(|step| {
                    let step = &steps[*step];
                    step.id == id && step.node_type == NodeType::AltChosen
                })
            })
            .map(|node| node.id);

        target.is_some_and(|node| self.working_tree.remove_node(node).is_some())
    }

    pub fn decision_points(&self) -> Vec<DecisionPoint> {
        self.original_tree
            .decision_steps(self.traversal.steps(), &NodeType::DECISION_POINTS)
    }

    pub fn to_serialized(&self, verbose: bool) -> Option<SerializedNode> {
        self.working_tree.to_serialized(self.traversal.steps(), verbose)
    }

    pub fn to_json(&self, verbose: bool) -> Result<String, serde_json::Error> {
        self.working_tree.to_json(self.traversal.steps(), verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        oracle::{ParseContext, ParseEvent, Snapshot, StaticOracle},
        step::{StateId, TokenInfo, Transition, TransitionLabel},
        traversal::TraversalBuilder,
        tree::NodeKind,
    };
    use rstest::{fixture, rstest};

    fn oracle() -> StaticOracle {
        StaticOracle::new()
            .with_state(
                0usize,
                [
                    Transition::new(10usize, TransitionLabel::token("'a'")),
                    Transition::new(11usize, TransitionLabel::token("'b'")),
                ],
            )
            .with_state(
                1usize,
                [
                    Transition::new(10usize, TransitionLabel::token("'a'")),
                    Transition::new(11usize, TransitionLabel::token("'b'")),
                ],
            )
            .with_state(2usize, [Transition::new(3usize, TransitionLabel::token("'a'"))])
            .with_state(3usize, [Transition::new(4usize, TransitionLabel::rule("inner"))])
            .with_state(5usize, [Transition::new(6usize, TransitionLabel::token("'c'"))])
            .with_state(6usize, [Transition::new(6usize, TransitionLabel::Exit)])
            .with_state(7usize, [Transition::new(7usize, TransitionLabel::Exit)])
            .with_state(10usize, [Transition::new(7usize, TransitionLabel::Exit)])
            .with_state(11usize, [Transition::new(7usize, TransitionLabel::Exit)])
            .with_rule("start", 0usize)
            .with_rule("inner", 5usize)
    }

    fn at(state: u32, rule: &str) -> ParseContext {
        ParseContext {
            state: StateId(state),
            rule_name: rule.to_string(),
            ..ParseContext::default()
        }
    }

    /// 0 entry(open) 1 decision 2 'a' 3 entry inner 4 'c' 5 exit inner 6 exit start
    #[fixture]
    fn explorer() -> Explorer {
        let oracle = oracle();
        let a = TokenInfo::new(0, Some("A"), "a");
        let c = TokenInfo::new(1, Some("C"), "c");
        let events = [
            (ParseEvent::RuleEntry { rule: "start".into() }, at(0, "start")),
            (ParseEvent::Sync, at(1, "start")),
            (ParseEvent::Decision { rule: "start".into(), chosen: 1 }, at(1, "start")),
            (ParseEvent::TokenConsume { token: a }, at(2, "start")),
            (ParseEvent::RuleEntry { rule: "inner".into() }, at(3, "inner")),
            (ParseEvent::TokenConsume { token: c }, at(5, "inner")),
            (ParseEvent::RuleExit { rule: "inner".into() }, at(6, "inner")),
            (ParseEvent::RuleExit { rule: "start".into() }, at(7, "start")),
        ];
        let mut builder = TraversalBuilder::new();
        for (event, context) in events {
            builder
                .record(&event, &Snapshot::new(&oracle, context))
                .unwrap();
        }
        let mut traversal = builder.finish();
        traversal.simplify(&Default::default()).unwrap();
        Explorer::new(traversal, Box::new(oracle))
    }

    fn shape(node: &ParseTreeNode) -> String {
        let label = match &node.kind {
            NodeKind::Rule(name) => name.clone(),
            NodeKind::Token(repr) => repr.clone(),
        };
        if node.children.is_empty() {
            label
        } else {
            format!(
                "{}({})",
                label,
                node.children.iter().map(shape).collect::<Vec<_>>().join(" ")
            )
        }
    }

    fn working_shape(explorer: &Explorer) -> String {
        explorer
            .working_tree()
            .root()
            .map(shape)
            .unwrap_or_default()
    }

    #[rstest]
    fn test_starts_at_last_step(explorer: Explorer) {
        assert_eq!(explorer.current_step_id(), 6);
        assert_eq!(explorer.max_work_id(), 6);
        assert_eq!(explorer.working_tree(), explorer.original_tree());
        assert_eq!(working_shape(&explorer), "start(A ('a') inner(C ('c')))");
    }

    #[rstest]
    fn test_boundaries(mut explorer: Explorer) {
        assert_eq!(
            explorer.step_forward(),
            Err(Error::from(NavigationError::EndOfInput))
        );
        assert_eq!(
            explorer.reset_to_step_id(7),
            Err(Error::from(NavigationError::StepOutOfRange { id: 7, last: 6 }))
        );
        explorer.reset_to_step_id(0).unwrap();
        assert_eq!(
            explorer.go_back_one_step(),
            Err(Error::from(NavigationError::AtStart))
        );
        assert_eq!(
            explorer.choose_alternative(1),
            Err(Error::from(NavigationError::NotExpanding))
        );
        // cancelling with nothing expanded is allowed
        explorer.cancel_alt_expansion();
        assert_eq!(explorer.current_step_id(), 0);
    }

    #[rstest]
    #[case(0, "start")]
    #[case(2, "start(A ('a'))")]
    #[case(3, "start(A ('a') inner)")]
    fn test_reset_to_step_id(mut explorer: Explorer, #[case] step: usize, #[case] expected: &str) {
        explorer.reset_to_step_id(step).unwrap();
        assert_eq!(explorer.current_step_id(), step);
        assert_eq!(working_shape(&explorer), expected);
    }

    #[rstest]
    fn test_round_trip_stepping(mut explorer: Explorer) {
        for step in 0..explorer.last_step_id() {
            explorer.reset_to_step_id(step).unwrap();
            let before = explorer.working_tree().clone();
            explorer.step_forward().unwrap();
            explorer.go_back_one_step().unwrap();
            assert_eq!(explorer.working_tree(), &before, "round trip at step {}", step);
            assert_eq!(explorer.current_step_id(), step);
            assert!(!explorer.in_alternative_expansion_mode());
        }
    }

    #[rstest]
    fn test_open_decision_enters_expansion(mut explorer: Explorer) {
        explorer.reset_to_step_id(0).unwrap();
        explorer.step_forward().unwrap();
        assert!(explorer.in_alternative_expansion_mode());
        assert_eq!(explorer.current_step_id(), 0);
        assert_eq!(explorer.candidates().len(), 2);
        assert!(
            explorer
                .candidates()
                .iter()
                .all(|step| step.node_type == NodeType::AltCandidate)
        );
        assert_eq!(explorer.working_tree().root().unwrap().children.len(), 2);
    }

    #[rstest]
    fn test_choose_unrecorded_alternative(mut explorer: Explorer) {
        explorer.reset_to_step_id(0).unwrap();
        assert_eq!(explorer.expand_alternatives(), Ok(2));
        assert_eq!(
            explorer.choose_alternative(3),
            Err(Error::from(NavigationError::InvalidAlternative { index: 3, available: 2 }))
        );
        assert!(explorer.in_alternative_expansion_mode());

        explorer.choose_alternative(2).unwrap();
        assert!(!explorer.in_alternative_expansion_mode());
        assert_eq!(explorer.current_step_id(), 1);
        assert_eq!(explorer.max_work_id(), 0);
        let current = explorer.current_step().unwrap();
        assert_eq!(current.node_type, NodeType::AltChosen);
        assert_eq!(current.id, StepId::main(1));
        assert_eq!(current.state, StateId(11));
        assert_eq!(explorer.working_tree().root().unwrap().children.len(), 1);

        // the recorded alternatives are untouched
        let recorded = explorer.traversal().main_step(0).unwrap();
        let branch = explorer.traversal().step(recorded).alternative_branches[1];
        assert_eq!(explorer.traversal().step(branch).node_type, NodeType::AltCandidate);
        assert_eq!(explorer.traversal().step(branch).id.to_string(), "0.2");

        explorer.go_back_one_step().unwrap();
        assert_eq!(explorer.current_step_id(), 0);
        assert_eq!(working_shape(&explorer), "start");
    }

    #[rstest]
    fn test_speculative_steps_continue_and_unwind(mut explorer: Explorer) {
        explorer.reset_to_step_id(0).unwrap();
        let before = explorer.working_tree().clone();
        explorer.expand_alternatives().unwrap();
        explorer.choose_alternative(1).unwrap();

        // the only way on from 'a' is the exit, chosen automatically
        explorer.step_forward().unwrap();
        assert_eq!(explorer.current_step_id(), 2);
        assert!(!explorer.in_alternative_expansion_mode());
        assert_eq!(
            explorer.current_step().map(|s| s.node_type),
            Some(NodeType::AltChosen)
        );

        explorer.go_back_one_step().unwrap();
        explorer.go_back_one_step().unwrap();
        assert_eq!(explorer.current_step_id(), 0);
        assert_eq!(explorer.working_tree(), &before);
    }

    #[rstest]
    fn test_choosing_recorded_alternative_equals_step_forward(mut explorer: Explorer) {
        explorer.reset_to_step_id(1).unwrap();
        explorer.step_forward().unwrap();
        let expected = explorer.working_tree().clone();

        explorer.reset_to_step_id(1).unwrap();
        let chosen = explorer.current_step().unwrap().chosen_transition_index.unwrap();
        assert_eq!(explorer.expand_alternatives(), Ok(2));
        explorer.choose_alternative(chosen).unwrap();

        assert_eq!(explorer.working_tree(), &expected);
        assert_eq!(explorer.current_step_id(), 2);
    }

    #[rstest]
    fn test_expand_then_cancel(mut explorer: Explorer) {
        explorer.reset_to_step_id(1).unwrap();
        let before = explorer.working_tree().clone();
        explorer.expand_alternatives().unwrap();
        assert_ne!(explorer.working_tree(), &before);
        explorer.cancel_alt_expansion();
        assert_eq!(explorer.working_tree(), &before);
        assert_eq!(explorer.current_step_id(), 1);
    }

    #[rstest]
    fn test_reexpanding_reuses_candidates(mut explorer: Explorer) {
        explorer.reset_to_step_id(0).unwrap();
        explorer.expand_alternatives().unwrap();
        let allocated = explorer.traversal().steps().len();
        let first = explorer.expansion.clone().unwrap().candidates;

        for _ in 0..3 {
            explorer.cancel_alt_expansion();
            explorer.expand_alternatives().unwrap();
        }
        assert_eq!(explorer.traversal().steps().len(), allocated);
        let again = explorer.expansion.clone().unwrap().candidates;
        assert_eq!(
            first.iter().map(|c| c.step).collect::<Vec<_>>(),
            again.iter().map(|c| c.step).collect::<Vec<_>>()
        );

        // a chosen fork joins the working path, only its slot is forked anew
        explorer.choose_alternative(2).unwrap();
        let chosen = again[1].step;
        let fork_size = 1 + explorer.traversal().step(chosen).alternative_branches.len();
        explorer.go_back_one_step().unwrap();
        explorer.expand_alternatives().unwrap();
        let after = explorer.expansion.clone().unwrap().candidates;
        assert_eq!(after[0].step, again[0].step);
        assert_ne!(after[1].step, chosen);
        assert_eq!(explorer.traversal().step(after[1].step).node_type, NodeType::AltCandidate);
        assert_eq!(explorer.traversal().steps().len(), allocated + fork_size);
    }

    #[rstest]
    fn test_step_until_next_decision(mut explorer: Explorer) {
        explorer.reset_to_step_id(1).unwrap();
        explorer.step_until_next_decision().unwrap();
        assert_eq!(explorer.current_step_id(), 6);

        explorer.reset_to_step_id(0).unwrap();
        explorer.step_until_next_decision().unwrap();
        assert!(explorer.in_alternative_expansion_mode());
    }

    #[rstest]
    fn test_step_back_until_previous_decision(mut explorer: Explorer) {
        explorer.step_back_until_previous_decision().unwrap();
        assert_eq!(explorer.current_step_id(), 1);
        explorer.step_back_until_previous_decision().unwrap();
        assert_eq!(explorer.current_step_id(), 0);
        assert_eq!(
            explorer.step_back_until_previous_decision(),
            Err(Error::from(NavigationError::AtStart))
        );
    }

    #[rstest]
    fn test_step_forward_by(mut explorer: Explorer) {
        explorer.reset_to_step_id(1).unwrap();
        explorer.step_forward_by(3).unwrap();
        assert_eq!(explorer.current_step_id(), 4);
        assert_eq!(
            explorer.step_forward_by(5),
            Err(Error::from(NavigationError::EndOfInput))
        );
        assert_eq!(explorer.current_step_id(), 6);
    }

    #[rstest]
    fn test_decision_points_and_json(explorer: Explorer) {
        let points = explorer.decision_points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].step_id, StepId::main(1));

        let json: serde_json::Value = serde_json::from_str(&explorer.to_json(false).unwrap()).unwrap();
        assert_eq!(json["rule_name"], "start");
        assert_eq!(json["children"][1]["rule_name"], "inner");
    }
}
