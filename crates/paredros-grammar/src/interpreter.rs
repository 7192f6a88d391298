//! Walks the state network over a token stream and reports every move.

use crate::{
    atn::{Atn, Edge, StateKind, TokenSet},
    error::Error,
    lexer::Token,
};
use itertools::Itertools;
use paredros_core::{
    Config, DecisionOracle, IntegrationError, InterpreterContext, OracleError, ParseContext,
    ParseEvent, StateId, Transition, Traversal, TraversalBuilder,
};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

/// Marks the parser's position in a step's `input_text`.
pub const CURSOR: &str = "⏺";

#[derive(Debug, Clone, Copy)]
struct Frame {
    rule: usize,
    /// Where the caller resumes; `None` for the start rule.
    follow: Option<usize>,
}

/// One simulated path during prediction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Probe {
    state: usize,
    position: usize,
    /// Follow states of rules entered during the simulation.
    calls: Vec<usize>,
    /// How many frames of the real call stack are still open.
    frames: usize,
}

#[derive(Debug)]
pub struct Interpreter<'a> {
    atn: &'a Atn,
    tokens: &'a [Token],
    config: &'a Config,
    position: usize,
    state: usize,
    stack: Vec<Frame>,
}

impl<'a> Interpreter<'a> {
    pub fn new(atn: &'a Atn, tokens: &'a [Token], config: &'a Config) -> Self {
        Self {
            atn,
            tokens,
            config,
            position: 0,
            state: 0,
            stack: Vec::new(),
        }
    }

    /// Parses the whole token stream from the first parser rule.
    ///
    /// Parse errors end the traversal with an error step; only integration
    /// failures are returned as `Err`.
    pub fn run(mut self) -> Result<Traversal, Error> {
        let atn = self.atn;
        let mut builder = TraversalBuilder::new();

        let start = atn.rule_at(0);
        self.stack.push(Frame {
            rule: 0,
            follow: None,
        });
        self.state = start.start;
        self.emit(
            &mut builder,
            ParseEvent::RuleEntry {
                rule: start.name.clone(),
            },
        )?;

        let limit = atn.len() * (self.config.max_prediction_depth + 1);
        let mut idle = 0usize;
        loop {
            if idle > limit {
                self.fail(
                    &mut builder,
                    format!("no progress at input '{}'", self.current_text()),
                )?;
                break;
            }

            let state = atn.state(self.state).ok_or_else(|| {
                IntegrationError::from(OracleError::UnknownState(StateId::from(self.state)))
            })?;

            if state.kind == StateKind::RuleStop {
                self.emit(
                    &mut builder,
                    ParseEvent::RuleExit {
                        rule: atn.rule_at(state.rule).name.clone(),
                    },
                )?;
                match self.stack.pop().and_then(|frame| frame.follow) {
                    Some(follow) => {
                        self.state = follow;
                        idle += 1;
                    }
                    None => break,
                }
                continue;
            }

            match state.edges.as_slice() {
                [] => {
                    self.fail(
                        &mut builder,
                        format!("no viable alternative at input '{}'", self.current_text()),
                    )?;
                    break;
                }
                [Edge::Epsilon { target }] => {
                    self.state = *target;
                    idle += 1;
                }
                [Edge::Match { set, target }] => {
                    let Some(token) = self.current().filter(|t| set.matches(t.token_type)) else {
                        self.fail(&mut builder, self.mismatch(set))?;
                        break;
                    };
                    let token = token.info(self.position, atn.vocabulary());
                    self.emit(&mut builder, ParseEvent::TokenConsume { token })?;
                    self.position += 1;
                    self.state = *target;
                    idle = 0;
                }
                [Edge::Rule { rule, target, follow }] => {
                    if self.stack.len() > self.config.max_prediction_depth {
                        self.fail(
                            &mut builder,
                            format!(
                                "rule nesting deeper than {} at input '{}'",
                                self.config.max_prediction_depth,
                                self.current_text()
                            ),
                        )?;
                        break;
                    }
                    self.stack.push(Frame {
                        rule: *rule,
                        follow: Some(*follow),
                    });
                    self.emit(
                        &mut builder,
                        ParseEvent::RuleEntry {
                            rule: atn.rule_at(*rule).name.clone(),
                        },
                    )?;
                    self.state = *target;
                    idle += 1;
                }
                edges => {
                    self.emit(&mut builder, ParseEvent::Sync)?;
                    let chosen = match self.predict(edges) {
                        Some(alt) => self.chosen_transition(alt)?.map(|chosen| (alt, chosen)),
                        None => None,
                    };
                    let Some((alt, chosen)) = chosen else {
                        self.fail(
                            &mut builder,
                            format!("no viable alternative at input '{}'", self.current_text()),
                        )?;
                        break;
                    };
                    self.emit(
                        &mut builder,
                        ParseEvent::Decision {
                            rule: atn.rule_at(state.rule).name.clone(),
                            chosen,
                        },
                    )?;
                    self.state = edges[alt].target();
                    idle += 1;
                }
            }
        }

        let traversal = builder.finish();
        debug!(
            steps = traversal.len(),
            consumed = self.position,
            "interpreted input"
        );
        Ok(traversal)
    }

    fn emit(&self, builder: &mut TraversalBuilder, event: ParseEvent) -> Result<(), Error> {
        builder.record(&event, self)?;
        Ok(())
    }

    fn fail(&self, builder: &mut TraversalBuilder, message: String) -> Result<(), Error> {
        debug!(state = self.state, position = self.position, message = %message, "parse error");
        self.emit(builder, ParseEvent::Error { message })
    }

    fn current(&self) -> Option<&'a Token> {
        self.tokens.get(self.position)
    }

    fn current_text(&self) -> String {
        self.current()
            .map(|token| token.text.clone())
            .unwrap_or_else(|| "<EOF>".to_string())
    }

    fn mismatch(&self, set: &TokenSet) -> String {
        let expected = set.labels(self.atn.vocabulary());
        let expected = match expected.as_slice() {
            [single] => single.clone(),
            _ => format!("{{{}}}", expected.join(", ")),
        };
        format!(
            "mismatched input '{}' expecting {}",
            self.current_text(),
            expected
        )
    }

    /// Picks the alternative that gets furthest over the remaining input,
    /// preferring the lowest one on ties. `None` when nothing matches at all.
    fn predict(&self, edges: &[Edge]) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (alt, edge) in edges.iter().enumerate() {
            let score = self.simulate(edge);
            trace!(state = self.state, alt = alt + 1, score, "scored alternative");
            if score > 0 && best.is_none_or(|(top, _)| score > top) {
                best = Some((score, alt));
            }
        }
        best.map(|(_, alt)| alt)
    }

    /// Scores one alternative: two points per token it can consume, plus one
    /// if it can finish the start rule.
    fn simulate(&self, edge: &Edge) -> usize {
        let origin = Probe {
            state: self.state,
            position: self.position,
            calls: Vec::new(),
            frames: self.stack.len(),
        };
        let mut pending: Vec<Probe> = self.advance(edge, &origin).into_iter().collect();
        let mut visited = FxHashSet::default();
        let mut best = 0;

        while let Some(mut probe) = pending.pop() {
            if !visited.insert(probe.clone()) {
                continue;
            }
            let consumed = 2 * (probe.position - self.position);
            best = best.max(consumed);

            let Some(state) = self.atn.state(probe.state) else {
                continue;
            };
            if state.kind != StateKind::RuleStop {
                pending.extend(state.edges.iter().filter_map(|edge| self.advance(edge, &probe)));
                continue;
            }

            if let Some(follow) = probe.calls.pop() {
                probe.state = follow;
                pending.push(probe);
                continue;
            }
            match probe
                .frames
                .checked_sub(1)
                .and_then(|frame| self.stack.get(frame))
                .and_then(|frame| frame.follow)
            {
                Some(follow) => {
                    probe.frames -= 1;
                    probe.state = follow;
                    pending.push(probe);
                }
                None => best = best.max(consumed + 1),
            }
        }
        best
    }

    fn advance(&self, edge: &Edge, probe: &Probe) -> Option<Probe> {
        match edge {
            Edge::Epsilon { target } => Some(Probe {
                state: *target,
                ..probe.clone()
            }),
            Edge::Match { set, target } => self
                .tokens
                .get(probe.position)
                .filter(|token| set.matches(token.token_type))
                .map(|_| Probe {
                    state: *target,
                    position: probe.position + 1,
                    ..probe.clone()
                }),
            Edge::Rule { target, follow, .. } => {
                (probe.calls.len() < self.config.max_prediction_depth).then(|| {
                    let mut calls = probe.calls.clone();
                    calls.push(*follow);
                    Probe {
                        state: *target,
                        calls,
                        ..probe.clone()
                    }
                })
            }
        }
    }

    /// The 1-based index, among the transitions of the current state, of the
    /// first transition alternative `alt` offers. One matching the current
    /// token wins over the rest.
    fn chosen_transition(&self, alt: usize) -> Result<Option<usize>, Error> {
        let transitions = self
            .atn
            .transitions_from(StateId::from(self.state))
            .map_err(IntegrationError::from)?;
        let closure = self.atn.closure(self.state);
        let offered = closure
            .iter()
            .filter(|(a, _)| *a == alt)
            .map(|(_, transition)| transition)
            .collect::<Vec<&Transition>>();

        let token = self
            .current()
            .map(|token| token.info(self.position, self.atn.vocabulary()));
        let pick = offered
            .iter()
            .find(|transition| {
                token
                    .as_ref()
                    .is_some_and(|token| transition.label.matches_token(token))
            })
            .or_else(|| offered.first());

        Ok(pick
            .and_then(|pick| transitions.iter().position(|t| t == *pick))
            .map(|index| index + 1))
    }
}

impl DecisionOracle for Interpreter<'_> {
    fn transitions_from(&self, state: StateId) -> Result<Vec<Transition>, OracleError> {
        self.atn.transitions_from(state)
    }

    fn rule_start_state(&self, rule: &str) -> Result<StateId, OracleError> {
        self.atn.rule_start_state(rule)
    }
}

impl InterpreterContext for Interpreter<'_> {
    fn current_context(&self) -> ParseContext {
        let vocabulary = self.atn.vocabulary();
        let ahead = &self.tokens[self.position.min(self.tokens.len())..];
        let lookahead = ahead
            .iter()
            .take(self.config.lookahead_depth)
            .enumerate()
            .map(|(i, token)| {
                if token.is_eof() {
                    "<EOF>".to_string()
                } else {
                    token.info(self.position + i, vocabulary).to_string()
                }
            })
            .collect();

        let consumed = self.tokens[..self.position.min(self.tokens.len())]
            .iter()
            .filter(|token| !token.is_eof())
            .map(|token| token.text.as_str());
        let upcoming = ahead
            .iter()
            .take(self.config.lookahead_depth)
            .filter(|token| !token.is_eof())
            .map(|token| token.text.as_str());
        let input_text = consumed
            .chain(std::iter::once(CURSOR))
            .chain(upcoming)
            .join(" ");

        ParseContext {
            state: StateId::from(self.state),
            rule_name: self
                .stack
                .last()
                .map(|frame| self.atn.rule_at(frame.rule).name.clone())
                .unwrap_or_default(),
            token: self
                .current()
                .filter(|token| !token.is_eof())
                .map(|token| token.info(self.position, vocabulary)),
            token_index: Some(self.position),
            lookahead,
            input_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{grammar::Grammar, lexer::Lexer};
    use paredros_core::NodeType;
    use rstest::rstest;

    const SIMPLETON: &str = r#"
grammar Simpleton_Reg;
startRule: EINS+ | zwoelf | DREI DREI | EINS ZWEI DREI;
zwoelf: EINS (ZWEI|DREI)+;
EINS: '1';
ZWEI: '2';
DREI: '3';
"#;

    fn interpret(source: &str, input: &str) -> Traversal {
        let grammar = Grammar::parse(source).unwrap();
        let atn = Atn::build(&grammar).unwrap();
        let tokens = Lexer::new(&grammar, atn.vocabulary()).unwrap().tokenize(input);
        let config = Config::default();
        Interpreter::new(&atn, &tokens, &config).run().unwrap()
    }

    fn shape(traversal: &Traversal) -> Vec<(NodeType, i64)> {
        traversal
            .iter()
            .map(|step| (step.node_type, step.chosen_or_unset()))
            .collect()
    }

    #[test]
    fn test_simpleton_123() {
        use NodeType::*;
        let traversal = interpret(SIMPLETON, "123");
        assert_eq!(
            shape(&traversal),
            vec![
                (RuleEntry, -1),
                (Decision, 2),
                (RuleEntry, 1),
                (TokenConsume, 1),
                (Decision, 1),
                (TokenConsume, 1),
                (Decision, 2),
                (Decision, 2),
                (TokenConsume, 1),
                (Decision, 3),
                (RuleExit, 1),
                (RuleExit, 1),
            ]
        );
        let rules = traversal
            .iter()
            .map(|step| step.rule_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(&rules[..3], &["startRule", "startRule", "zwoelf"]);
        assert_eq!(rules[11], "startRule");
        assert!(!traversal.iter().any(|step| step.is_error_node));
    }

    #[rstest]
    #[case("11", vec![
        (NodeType::RuleEntry, -1),
        (NodeType::Decision, 1),
        (NodeType::TokenConsume, 1),
        (NodeType::Decision, 1),
        (NodeType::TokenConsume, 1),
        (NodeType::Decision, 2),
        (NodeType::RuleExit, 1),
    ])]
    #[case("3", vec![
        (NodeType::RuleEntry, -1),
        (NodeType::Decision, 3),
        (NodeType::TokenConsume, 1),
        (NodeType::Error, -1),
    ])]
    #[case("44440y0x...", vec![(NodeType::RuleEntry, -1), (NodeType::Error, -1)])]
    fn test_simpleton_shapes(#[case] input: &str, #[case] expected: Vec<(NodeType, i64)>) {
        assert_eq!(shape(&interpret(SIMPLETON, input)), expected);
    }

    #[test]
    fn test_step_context() {
        let traversal = interpret(SIMPLETON, "123");
        let zwei = traversal.step(traversal.main_step(5).unwrap());
        assert_eq!(zwei.current_token_repr, "ZWEI ('2')");
        assert_eq!(zwei.token_index, Some(1));
        assert_eq!(zwei.lookahead, vec!["ZWEI ('2')", "DREI ('3')", "<EOF>"]);
        assert_eq!(zwei.input_text, "1 ⏺ 2 3");

        let exit = traversal.step(traversal.main_step(11).unwrap());
        assert_eq!(exit.current_token_repr, "<EOF>");
        assert_eq!(exit.input_text, "1 2 3 ⏺");
    }

    #[test]
    fn test_left_recursion_resolves_through_prediction() {
        let traversal = interpret("grammar G;\nexpr : expr '+' A | A ;\nA : 'a' ;", "a+a");
        let count = |node_type| {
            traversal
                .iter()
                .filter(|step| step.node_type == node_type)
                .count()
        };
        assert_eq!(count(NodeType::RuleEntry), 2);
        assert_eq!(count(NodeType::TokenConsume), 3);
        assert!(!traversal.iter().any(|step| step.is_error_node));
    }

    #[test]
    fn test_nested_rules_and_optional() {
        use NodeType::*;
        let traversal = interpret(
            "grammar G;\nstart : item* EOF ;\nitem : A B? ;\nA : 'a' ;\nB : 'b' ;",
            "aba",
        );
        let types = traversal.iter().map(|step| step.node_type).collect::<Vec<_>>();
        assert_eq!(types.iter().filter(|t| **t == RuleEntry).count(), 3);
        assert_eq!(types.iter().filter(|t| **t == TokenConsume).count(), 4);
        assert_eq!(types.last(), Some(&RuleExit));
        assert!(!traversal.iter().any(|step| step.is_error_node));
    }
}
