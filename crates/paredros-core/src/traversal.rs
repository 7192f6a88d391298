//! The recorded parse: an arena of steps plus the main path through them.

pub mod merge;

use crate::{
    arena::Arena,
    error::{Error, IntegrationError, NavigationError},
    oracle::{DecisionOracle, InterpreterContext, ParseEvent},
    step::{NodeType, StateId, Step, StepId, StepRef, TransitionLabel},
};
use tracing::{debug, trace};

#[derive(Debug, Clone, Default)]
pub struct Traversal {
    steps: Arena<Step>,
    main_path: Vec<StepRef>,
}

impl Traversal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &Arena<Step> {
        &self.steps
    }

    pub fn step(&self, step: StepRef) -> &Step {
        &self.steps[step]
    }

    pub fn step_mut(&mut self, step: StepRef) -> &mut Step {
        &mut self.steps[step]
    }

    pub fn main_path(&self) -> &[StepRef] {
        &self.main_path
    }

    pub fn main_step(&self, index: usize) -> Option<StepRef> {
        self.main_path.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.main_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main_path.is_empty()
    }

    pub fn last_step_id(&self) -> Option<usize> {
        self.main_path.len().checked_sub(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.main_path.iter().map(|step| &self.steps[*step])
    }

    /// Resolves a dotted id by walking the main path, then alternative branches.
    pub fn step_by_id(&self, id: &StepId) -> Option<StepRef> {
        let (root, branch) = id.path().split_first()?;
        let mut current = self.main_step(*root)?;
        for ordinal in branch {
            current = *self.steps[current]
                .alternative_branches
                .get(ordinal.checked_sub(1)?)?;
        }
        Some(current)
    }

    fn push_main(&mut self, step: Step) -> StepRef {
        let step_ref = self.steps.alloc(step);
        if let Some(&last) = self.main_path.last() {
            self.steps[last].next_node = Some(step_ref);
            self.steps[step_ref].previous_node = Some(last);
        }
        self.main_path.push(step_ref);
        step_ref
    }

    /// Re-links `next_node`/`previous_node` to follow the main path.
    fn relink(&mut self) {
        for (i, step) in self.main_path.iter().enumerate() {
            let previous = i.checked_sub(1).map(|p| self.main_path[p]);
            let next = self.main_path.get(i + 1).copied();
            let step = &mut self.steps[*step];
            step.previous_node = previous;
            step.next_node = next;
        }
    }

    /// Replaces `owner`'s branches with fresh, unexpanded ones parallel to its transitions.
    fn create_branches(&mut self, owner: StepRef) {
        let context = self.steps[owner].context();
        let owner_id = self.steps[owner].id.clone();
        let transitions = self.steps[owner].possible_transitions.clone();

        let mut branches = Vec::with_capacity(transitions.len());
        for (i, transition) in transitions.iter().enumerate() {
            let mut branch = Step::new(owner_id.branch(i + 1), NodeType::AltCandidate, &context);
            branch.state = transition.target;
            branch.parent = Some(owner);
            if let TransitionLabel::Rule(rule) = &transition.label {
                branch.rule_name = rule.clone();
            }
            branches.push(self.steps.alloc(branch));
        }
        self.steps[owner].alternative_branches = branches;
    }

    /// Fills in the `k`-th (1-based) alternative of `owner` and returns it.
    ///
    /// A rule alternative continues at the rule's start state, a token
    /// alternative at the transition target, and an exit alternative has no
    /// successors. Expanding twice is a no-op.
    pub fn expand_alternative(
        &mut self,
        owner: StepRef,
        k: usize,
        oracle: &dyn DecisionOracle,
    ) -> Result<StepRef, Error> {
        let step = &self.steps[owner];
        let available = step.possible_transitions.len();
        let invalid = NavigationError::InvalidAlternative {
            index: k,
            available,
        };
        let index = k.checked_sub(1).filter(|i| *i < available).ok_or(invalid.clone())?;
        let branch = *step.alternative_branches.get(index).ok_or(invalid)?;

        if self.steps[branch].expanded {
            return Ok(branch);
        }

        let transition = step.possible_transitions[index].clone();
        let (state, rule_name, transitions) = match &transition.label {
            TransitionLabel::Rule(rule) => {
                let start = oracle.rule_start_state(rule)?;
                (start, rule.clone(), oracle.transitions_from(start)?)
            }
            TransitionLabel::Exit => (transition.target, step.rule_name.clone(), Vec::new()),
            TransitionLabel::Tokens(_) => (
                transition.target,
                step.rule_name.clone(),
                oracle.transitions_from(transition.target)?,
            ),
        };

        let alternative = &mut self.steps[branch];
        alternative.state = state;
        alternative.rule_name = rule_name;
        alternative.possible_transitions = transitions;
        alternative.expanded = true;
        self.create_branches(branch);

        trace!(step = %self.steps[branch].id, state = %state, "expanded alternative");
        Ok(branch)
    }

    /// Deep-copies a branch into fresh arena slots.
    pub fn fork(&mut self, branch: StepRef) -> StepRef {
        let mut copy = self.steps[branch].clone();
        copy.next_node = None;
        copy.previous_node = None;
        let children = std::mem::take(&mut copy.alternative_branches);
        let forked = self.steps.alloc(copy);

        let forked_children = children
            .into_iter()
            .map(|child| {
                let child = self.fork(child);
                self.steps[child].parent = Some(forked);
                child
            })
            .collect();
        self.steps[forked].alternative_branches = forked_children;
        forked
    }

    /// Sets the id of `step` and re-derives the ids of everything below it.
    pub fn renumber(&mut self, step: StepRef, id: StepId) {
        let branches = self.steps[step].alternative_branches.clone();
        for (i, branch) in branches.into_iter().enumerate() {
            self.renumber(branch, id.branch(i + 1));
        }
        self.steps[step].id = id;
    }

    /// Renumbers the main path `0..n` and the branches below each step.
    pub fn fix_step_ids(&mut self) {
        for (i, step) in self.main_path.clone().into_iter().enumerate() {
            self.renumber(step, StepId::main(i));
        }
    }
}

/// Turns interpreter events into a [`Traversal`].
///
/// Only the first error is recorded; every event after it is ignored.
#[derive(Debug, Default)]
pub struct TraversalBuilder {
    traversal: Traversal,
    error_recorded: bool,
}

impl TraversalBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traversal(&self) -> &Traversal {
        &self.traversal
    }

    pub fn has_error(&self) -> bool {
        self.error_recorded
    }

    pub fn finish(self) -> Traversal {
        self.traversal
    }

    /// Records one event, returning the step it created or updated.
    pub fn record<C: InterpreterContext + ?Sized>(
        &mut self,
        event: &ParseEvent,
        interpreter: &C,
    ) -> Result<Option<StepRef>, IntegrationError> {
        if self.error_recorded {
            trace!(event = event.name(), "ignoring event after first error");
            return Ok(None);
        }

        let context = interpreter.current_context();
        let transitions = interpreter.transitions_from(context.state)?;

        if let ParseEvent::Decision { chosen, .. } = event
            && (*chosen == 0 || *chosen > transitions.len())
        {
            let step = self
                .pending_step(context.state)
                .map(|pending| self.traversal.steps[pending].id.clone())
                .unwrap_or_else(|| StepId::main(self.traversal.main_path.len()));
            return Err(IntegrationError::ChosenIndexOutOfRange {
                step,
                index: *chosen,
                available: transitions.len(),
            });
        }

        self.resolve_previous(event, &context.rule_name);

        let node_type = match event {
            ParseEvent::RuleEntry { .. } => NodeType::RuleEntry,
            ParseEvent::RuleExit { .. } => NodeType::RuleExit,
            ParseEvent::TokenConsume { .. } => NodeType::TokenConsume,
            ParseEvent::Decision { .. } => NodeType::Decision,
            ParseEvent::Sync => NodeType::Sync,
            ParseEvent::Error { .. } => NodeType::Error,
        };

        let step_ref = match self.pending_step(context.state) {
            Some(existing) => {
                trace!(
                    event = event.name(),
                    step = %self.traversal.steps[existing].id,
                    "overwriting pending step at the same state"
                );
                let snapshot = context.to_step_context();
                let step = &mut self.traversal.steps[existing];
                step.node_type = node_type;
                step.rule_name = snapshot.rule_name;
                step.current_token_repr = snapshot.current_token_repr;
                step.token_index = snapshot.token_index;
                step.lookahead = snapshot.lookahead;
                step.input_text = snapshot.input_text;
                step.possible_transitions = transitions;
                self.traversal.create_branches(existing);
                existing
            }
            None => {
                let id = StepId::main(self.traversal.main_path.len());
                let mut step = Step::new(id, node_type, &context.to_step_context());
                step.possible_transitions = transitions;
                let step_ref = self.traversal.push_main(step);
                self.traversal.create_branches(step_ref);
                step_ref
            }
        };

        let step = &mut self.traversal.steps[step_ref];
        let available = step.possible_transitions.len();
        step.chosen_transition_index = match event {
            ParseEvent::TokenConsume { .. } | ParseEvent::RuleExit { .. } => {
                (available > 0).then_some(1)
            }
            ParseEvent::RuleEntry { .. } if available == 1 => Some(1),
            ParseEvent::RuleEntry { .. } => step.exit_transition(),
            ParseEvent::Decision { chosen, .. } => Some(*chosen),
            ParseEvent::Sync => None,
            ParseEvent::Error { message } => {
                debug!(step = %step.id, rule = %step.rule_name, message = %message, "recorded parse error");
                step.is_error_node = true;
                self.error_recorded = true;
                None
            }
        };

        trace!(
            event = event.name(),
            step = %step.id,
            state = %step.state,
            chosen = step.chosen_or_unset(),
            "recorded step"
        );
        Ok(Some(step_ref))
    }

    /// The last main-path step when it is still open at `state`; a new event
    /// there overwrites it instead of adding a step.
    fn pending_step(&self, state: StateId) -> Option<StepRef> {
        self.traversal.main_path.last().copied().filter(|last| {
            let last = &self.traversal.steps[*last];
            last.state == state && !last.is_settled()
        })
    }

    /// Settles the previous step's open choice from what just happened.
    fn resolve_previous(&mut self, event: &ParseEvent, current_rule: &str) {
        let Some(&last) = self.traversal.main_path.last() else {
            return;
        };
        let step = &mut self.traversal.steps[last];
        if step.is_settled() {
            return;
        }

        let resolved = match event {
            ParseEvent::TokenConsume { token } => step.matching_token_transition(token),
            ParseEvent::RuleEntry { rule } => step.rule_transition(rule),
            ParseEvent::RuleExit { .. } => step.exit_transition(),
            ParseEvent::Sync => step.rule_transition(current_rule),
            ParseEvent::Decision { .. } | ParseEvent::Error { .. } => None,
        };

        if let Some(index) = resolved {
            trace!(step = %step.id, chosen = index, "resolved previous choice");
            step.chosen_transition_index = Some(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        oracle::{ParseContext, Snapshot, StaticOracle},
        step::{StateId, TokenInfo, Transition},
    };
    use rstest::{fixture, rstest};

    fn token(name: &str, text: &str) -> TokenInfo {
        TokenInfo::new(0, Some(name), text)
    }

    #[fixture]
    fn oracle() -> StaticOracle {
        StaticOracle::new()
            .with_state(
                1usize,
                [
                    Transition::new(4usize, TransitionLabel::token("'1'")),
                    Transition::new(8usize, TransitionLabel::rule("tail")),
                ],
            )
            .with_state(
                2usize,
                [
                    Transition::new(4usize, TransitionLabel::token("'1'")),
                    Transition::new(8usize, TransitionLabel::rule("tail")),
                ],
            )
            .with_state(4usize, [Transition::new(5usize, TransitionLabel::Exit)])
            .with_state(5usize, [Transition::new(5usize, TransitionLabel::Exit)])
            .with_state(6usize, [Transition::new(8usize, TransitionLabel::rule("tail"))])
            .with_state(
                10usize,
                [Transition::new(11usize, TransitionLabel::token("'2'"))],
            )
            .with_state(11usize, [Transition::new(12usize, TransitionLabel::Exit)])
            .with_rule("tail", 10usize)
    }

    fn at(state: u32, rule: &str) -> ParseContext {
        ParseContext {
            state: StateId(state),
            rule_name: rule.to_string(),
            ..ParseContext::default()
        }
    }

    fn record(
        builder: &mut TraversalBuilder,
        oracle: &StaticOracle,
        event: ParseEvent,
        context: ParseContext,
    ) -> Option<StepRef> {
        builder
            .record(&event, &Snapshot::new(oracle, context))
            .unwrap()
    }

    #[rstest]
    fn test_rule_entry_chosen(oracle: StaticOracle) {
        let mut builder = TraversalBuilder::new();
        let entry = record(
            &mut builder,
            &oracle,
            ParseEvent::RuleEntry { rule: "start".into() },
            at(1, "start"),
        )
        .unwrap();
        assert_eq!(builder.traversal().step(entry).chosen_transition_index, None);

        let single = record(
            &mut builder,
            &oracle,
            ParseEvent::RuleEntry { rule: "tail".into() },
            at(6, "tail"),
        )
        .unwrap();
        assert_eq!(
            builder.traversal().step(single).chosen_transition_index,
            Some(1)
        );
        // entering `tail` settled the pending choice of the first step
        assert_eq!(
            builder.traversal().step(entry).chosen_transition_index,
            Some(2)
        );
    }

    #[rstest]
    fn test_token_consume_resolves_previous(oracle: StaticOracle) {
        let mut builder = TraversalBuilder::new();
        let sync = record(&mut builder, &oracle, ParseEvent::Sync, at(2, "start")).unwrap();
        record(
            &mut builder,
            &oracle,
            ParseEvent::TokenConsume {
                token: token("EINS", "1"),
            },
            at(4, "start"),
        );
        let traversal = builder.finish();
        assert_eq!(traversal.step(sync).chosen_transition_index, Some(1));
        assert_eq!(traversal.len(), 2);
        assert_eq!(
            traversal.iter().map(|s| s.chosen_or_unset()).collect::<Vec<_>>(),
            vec![1, 1]
        );
    }

    #[rstest]
    fn test_decision_overwrites_pending_sync(oracle: StaticOracle) {
        let mut builder = TraversalBuilder::new();
        let sync = record(&mut builder, &oracle, ParseEvent::Sync, at(2, "start")).unwrap();
        let decision = record(
            &mut builder,
            &oracle,
            ParseEvent::Decision {
                rule: "start".into(),
                chosen: 2,
            },
            at(2, "start"),
        )
        .unwrap();

        assert_eq!(sync, decision);
        let traversal = builder.finish();
        assert_eq!(traversal.len(), 1);
        let step = traversal.step(decision);
        assert_eq!(step.node_type, NodeType::Decision);
        assert_eq!(step.chosen_transition_index, Some(2));
        assert_eq!(step.alternative_branches.len(), 2);
    }

    #[rstest]
    fn test_overwrite_takes_latest_context(oracle: StaticOracle) {
        let mut builder = TraversalBuilder::new();
        let first = ParseContext {
            token: Some(token("T", "a")),
            token_index: Some(0),
            lookahead: vec!["A".into()],
            input_text: "⏺ a".into(),
            ..at(2, "start")
        };
        let second = ParseContext {
            rule_name: "inner".into(),
            token: Some(token("T", "b")),
            token_index: Some(1),
            lookahead: vec!["B".into(), "C".into()],
            input_text: "a ⏺ b".into(),
            ..at(2, "start")
        };

        let sync = record(&mut builder, &oracle, ParseEvent::Sync, first).unwrap();
        let decision = record(
            &mut builder,
            &oracle,
            ParseEvent::Decision {
                rule: "inner".into(),
                chosen: 1,
            },
            second,
        )
        .unwrap();

        assert_eq!(sync, decision);
        let traversal = builder.finish();
        let step = traversal.step(decision);
        assert_eq!(step.current_token_repr, "T ('b')");
        assert_eq!(step.rule_name, "inner");
        assert_eq!(step.token_index, Some(1));
        assert_eq!(step.lookahead, vec!["B".to_string(), "C".to_string()]);
        assert_eq!(step.input_text, "a ⏺ b");
        for branch in &step.alternative_branches {
            assert_eq!(traversal.step(*branch).current_token_repr, "T ('b')");
        }
    }

    #[rstest]
    fn test_decision_out_of_range(oracle: StaticOracle) {
        let mut builder = TraversalBuilder::new();
        let result = builder.record(
            &ParseEvent::Decision {
                rule: "start".into(),
                chosen: 3,
            },
            &Snapshot::new(&oracle, at(2, "start")),
        );
        assert_eq!(
            result,
            Err(IntegrationError::ChosenIndexOutOfRange {
                step: StepId::main(0),
                index: 3,
                available: 2
            })
        );
    }

    #[rstest]
    fn test_rejected_decision_leaves_traversal_unchanged(oracle: StaticOracle) {
        let mut builder = TraversalBuilder::new();
        record(
            &mut builder,
            &oracle,
            ParseEvent::RuleEntry { rule: "start".into() },
            at(1, "start"),
        );
        let before = builder.traversal().clone();

        let result = builder.record(
            &ParseEvent::Decision {
                rule: "start".into(),
                chosen: 2,
            },
            &Snapshot::new(&oracle, at(6, "start")),
        );
        assert_eq!(
            result,
            Err(IntegrationError::ChosenIndexOutOfRange {
                step: StepId::main(1),
                index: 2,
                available: 1
            })
        );
        assert_eq!(builder.traversal().len(), before.len());
        assert_eq!(builder.traversal().iter().collect::<Vec<_>>(), before.iter().collect::<Vec<_>>());

        let sync = record(&mut builder, &oracle, ParseEvent::Sync, at(2, "start")).unwrap();
        let result = builder.record(
            &ParseEvent::Decision {
                rule: "start".into(),
                chosen: 0,
            },
            &Snapshot::new(&oracle, at(2, "start")),
        );
        assert!(matches!(
            result,
            Err(IntegrationError::ChosenIndexOutOfRange { index: 0, .. })
        ));
        assert_eq!(builder.traversal().step(sync).node_type, NodeType::Sync);
        assert!(!builder.traversal().step(sync).is_settled());
    }

    #[rstest]
    fn test_unknown_state_is_integration_error(oracle: StaticOracle) {
        let mut builder = TraversalBuilder::new();
        let result = builder.record(&ParseEvent::Sync, &Snapshot::new(&oracle, at(99, "start")));
        assert!(matches!(result, Err(IntegrationError::Oracle(_))));
    }

    #[rstest]
    fn test_events_after_first_error_are_ignored(oracle: StaticOracle) {
        let mut builder = TraversalBuilder::new();
        record(
            &mut builder,
            &oracle,
            ParseEvent::RuleEntry { rule: "start".into() },
            at(1, "start"),
        );
        let error = record(
            &mut builder,
            &oracle,
            ParseEvent::Error {
                message: "no viable alternative".into(),
            },
            at(2, "start"),
        )
        .unwrap();
        let ignored = record(
            &mut builder,
            &oracle,
            ParseEvent::Error {
                message: "second".into(),
            },
            at(4, "start"),
        );

        assert!(ignored.is_none());
        assert!(builder.has_error());
        let traversal = builder.finish();
        assert_eq!(traversal.len(), 2);
        assert!(traversal.step(error).is_error_node);
        assert_eq!(traversal.iter().filter(|s| s.is_error_node).count(), 1);
    }

    #[rstest]
    fn test_links_and_branch_ids(oracle: StaticOracle) {
        let mut builder = TraversalBuilder::new();
        let first = record(&mut builder, &oracle, ParseEvent::Sync, at(1, "start")).unwrap();
        let second = record(
            &mut builder,
            &oracle,
            ParseEvent::RuleEntry { rule: "tail".into() },
            at(6, "tail"),
        )
        .unwrap();
        let traversal = builder.finish();

        assert_eq!(traversal.step(first).next_node, Some(second));
        assert_eq!(traversal.step(second).previous_node, Some(first));
        let branch = traversal.step(first).alternative_branches[1];
        assert_eq!(traversal.step(branch).id.to_string(), "0.2");
        assert_eq!(traversal.step(branch).parent, Some(first));
        assert_eq!(traversal.step(branch).rule_name, "tail");
        assert_eq!(
            traversal.step_by_id(&StepId::main(0).branch(2)),
            Some(branch)
        );
        assert_eq!(traversal.step_by_id(&StepId::main(0).branch(3)), None);
    }

    #[rstest]
    #[case(1, StateId(4), 1)]
    #[case(2, StateId(10), 1)]
    fn test_expand_alternative(
        oracle: StaticOracle,
        #[case] k: usize,
        #[case] state: StateId,
        #[case] children: usize,
    ) {
        let mut builder = TraversalBuilder::new();
        let owner = record(&mut builder, &oracle, ParseEvent::Sync, at(1, "start")).unwrap();
        let mut traversal = builder.finish();

        let branch = traversal.expand_alternative(owner, k, &oracle).unwrap();
        let again = traversal.expand_alternative(owner, k, &oracle).unwrap();
        assert_eq!(branch, again);

        let step = traversal.step(branch);
        assert!(step.expanded);
        assert_eq!(step.state, state);
        assert_eq!(step.alternative_branches.len(), children);
        let child = traversal.step(step.alternative_branches[0]);
        assert_eq!(child.id.to_string(), format!("0.{}.1", k));
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    fn test_expand_alternative_out_of_range(oracle: StaticOracle, #[case] k: usize) {
        let mut builder = TraversalBuilder::new();
        let owner = record(&mut builder, &oracle, ParseEvent::Sync, at(1, "start")).unwrap();
        let mut traversal = builder.finish();
        assert_eq!(
            traversal.expand_alternative(owner, k, &oracle),
            Err(Error::Navigation(NavigationError::InvalidAlternative {
                index: k,
                available: 2
            }))
        );
    }

    #[rstest]
    fn test_fork_isolates_mutation(oracle: StaticOracle) {
        let mut builder = TraversalBuilder::new();
        let owner = record(&mut builder, &oracle, ParseEvent::Sync, at(1, "start")).unwrap();
        let mut traversal = builder.finish();
        let branch = traversal.expand_alternative(owner, 2, &oracle).unwrap();

        let forked = traversal.fork(branch);
        traversal.renumber(forked, StepId::main(5));
        traversal.step_mut(forked).node_type = NodeType::AltChosen;

        assert_eq!(traversal.step(branch).id.to_string(), "0.2");
        assert_eq!(traversal.step(branch).node_type, NodeType::AltCandidate);
        let original_child = traversal.step(branch).alternative_branches[0];
        let forked_child = traversal.step(forked).alternative_branches[0];
        assert_ne!(original_child, forked_child);
        assert_eq!(traversal.step(original_child).id.to_string(), "0.2.1");
        assert_eq!(traversal.step(forked_child).id.to_string(), "5.1");
        assert_eq!(traversal.step(forked_child).parent, Some(forked));
    }
}
