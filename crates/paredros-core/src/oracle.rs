//! Seams between the debugger and whatever interpreter produced the parse.

use crate::{
    error::OracleError,
    step::{StateId, StepContext, TokenInfo, Transition},
};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Static knowledge about the interpreter's state network.
///
/// Asking about a state the network does not contain is an error, never an
/// empty answer.
pub trait DecisionOracle {
    /// Everything directly reachable from `state`, with epsilon moves followed.
    fn transitions_from(&self, state: StateId) -> Result<Vec<Transition>, OracleError>;

    fn rule_start_state(&self, rule: &str) -> Result<StateId, OracleError>;
}

impl<T: DecisionOracle + ?Sized> DecisionOracle for Rc<T> {
    fn transitions_from(&self, state: StateId) -> Result<Vec<Transition>, OracleError> {
        (**self).transitions_from(state)
    }

    fn rule_start_state(&self, rule: &str) -> Result<StateId, OracleError> {
        (**self).rule_start_state(rule)
    }
}

impl<T: DecisionOracle + ?Sized> DecisionOracle for &T {
    fn transitions_from(&self, state: StateId) -> Result<Vec<Transition>, OracleError> {
        (**self).transitions_from(state)
    }

    fn rule_start_state(&self, rule: &str) -> Result<StateId, OracleError> {
        (**self).rule_start_state(rule)
    }
}

/// Snapshot of the interpreter at the moment it emits an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseContext {
    pub state: StateId,
    pub rule_name: String,
    /// Next token to be consumed, `None` at end of input.
    pub token: Option<TokenInfo>,
    pub token_index: Option<usize>,
    pub lookahead: Vec<String>,
    pub input_text: String,
}

impl ParseContext {
    pub fn token_repr(&self) -> String {
        self.token
            .as_ref()
            .map(|token| token.to_string())
            .unwrap_or_else(|| "<EOF>".to_string())
    }

    pub(crate) fn to_step_context(&self) -> StepContext {
        StepContext {
            state: self.state,
            rule_name: self.rule_name.clone(),
            current_token_repr: self.token_repr(),
            token_index: self.token_index,
            lookahead: self.lookahead.clone(),
            input_text: self.input_text.clone(),
        }
    }
}

/// A live interpreter: an oracle that can also describe where it currently is.
pub trait InterpreterContext: DecisionOracle {
    fn current_context(&self) -> ParseContext;
}

/// Events an interpreter reports while parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    RuleEntry { rule: String },
    RuleExit { rule: String },
    TokenConsume { token: TokenInfo },
    /// `chosen` is a 1-based index into the transitions of the current state.
    Decision { rule: String, chosen: usize },
    Sync,
    Error { message: String },
}

impl ParseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ParseEvent::RuleEntry { .. } => "rule_entry",
            ParseEvent::RuleExit { .. } => "rule_exit",
            ParseEvent::TokenConsume { .. } => "token_consume",
            ParseEvent::Decision { .. } => "decision",
            ParseEvent::Sync => "sync",
            ParseEvent::Error { .. } => "error",
        }
    }
}

/// An oracle backed by a precomputed transition table.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    transitions: FxHashMap<StateId, Vec<Transition>>,
    rule_starts: FxHashMap<String, StateId>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(
        mut self,
        state: impl Into<StateId>,
        transitions: impl IntoIterator<Item = Transition>,
    ) -> Self {
        self.transitions
            .insert(state.into(), transitions.into_iter().collect());
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>, start: impl Into<StateId>) -> Self {
        self.rule_starts.insert(rule.into(), start.into());
        self
    }
}

impl DecisionOracle for StaticOracle {
    fn transitions_from(&self, state: StateId) -> Result<Vec<Transition>, OracleError> {
        self.transitions
            .get(&state)
            .cloned()
            .ok_or(OracleError::UnknownState(state))
    }

    fn rule_start_state(&self, rule: &str) -> Result<StateId, OracleError> {
        self.rule_starts
            .get(rule)
            .copied()
            .ok_or_else(|| OracleError::UnknownRule(rule.to_string()))
    }
}

/// An oracle paired with a context captured elsewhere, for replaying events
/// that were not produced by a live interpreter.
#[derive(Debug, Clone)]
pub struct Snapshot<'a, O: ?Sized> {
    pub oracle: &'a O,
    pub context: ParseContext,
}

impl<'a, O: DecisionOracle + ?Sized> Snapshot<'a, O> {
    pub fn new(oracle: &'a O, context: ParseContext) -> Self {
        Self { oracle, context }
    }
}

impl<O: DecisionOracle + ?Sized> DecisionOracle for Snapshot<'_, O> {
    fn transitions_from(&self, state: StateId) -> Result<Vec<Transition>, OracleError> {
        self.oracle.transitions_from(state)
    }

    fn rule_start_state(&self, rule: &str) -> Result<StateId, OracleError> {
        self.oracle.rule_start_state(rule)
    }
}

impl<O: DecisionOracle + ?Sized> InterpreterContext for Snapshot<'_, O> {
    fn current_context(&self) -> ParseContext {
        self.context.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::TransitionLabel;
    use rstest::rstest;

    #[rstest]
    #[case(Some(TokenInfo::new(2, Some("ZWEI"), "2")), "ZWEI ('2')")]
    #[case(None, "<EOF>")]
    fn test_token_repr(#[case] token: Option<TokenInfo>, #[case] expected: &str) {
        let context = ParseContext {
            token,
            ..ParseContext::default()
        };
        assert_eq!(context.token_repr(), expected);
    }

    #[test]
    fn test_static_oracle_rejects_unknown_state() {
        let oracle = StaticOracle::new()
            .with_state(1usize, [Transition::new(2usize, TransitionLabel::Exit)])
            .with_rule("start", 1usize);
        assert_eq!(oracle.transitions_from(StateId(1)).map(|t| t.len()), Ok(1));
        assert_eq!(
            oracle.transitions_from(StateId(7)),
            Err(OracleError::UnknownState(StateId(7)))
        );
        assert_eq!(
            oracle.rule_start_state("expr"),
            Err(OracleError::UnknownRule("expr".to_string()))
        );
    }

    #[test]
    fn test_snapshot_reports_captured_context() {
        let oracle = StaticOracle::new();
        let context = ParseContext {
            rule_name: "start".to_string(),
            ..ParseContext::default()
        };
        let snapshot = Snapshot::new(&oracle, context.clone());
        assert_eq!(snapshot.current_context(), context);
    }
}
