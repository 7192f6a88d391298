//! The state network compiled from a grammar's parser rules.
//!
//! Every parser rule gets a start state with a single epsilon edge into its
//! body and a stop state the body ends in. Blocks with several alternatives
//! and the `?`, `*` and `+` suffixes introduce decision states, whose edges
//! are numbered alternatives in source order.

use crate::{
    error::{Error, GrammarError},
    grammar::{Atom, Block, Element, Grammar, RepeatKind},
    vocabulary::{EOF, Vocabulary},
};
use itertools::Itertools;
use paredros_core::{DecisionOracle, OracleError, StateId, Transition, TransitionLabel};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Basic,
    RuleStart,
    RuleStop,
    Decision,
}

/// Token types an edge accepts. `Not` and `Any` never accept `EOF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSet {
    Token(usize),
    Set(Vec<usize>),
    Not(Vec<usize>),
    Any,
}

impl TokenSet {
    pub fn matches(&self, token_type: usize) -> bool {
        match self {
            TokenSet::Token(t) => *t == token_type,
            TokenSet::Set(types) => types.contains(&token_type),
            TokenSet::Not(types) => token_type != EOF && !types.contains(&token_type),
            TokenSet::Any => token_type != EOF,
        }
    }

    pub fn labels(&self, vocabulary: &Vocabulary) -> Vec<String> {
        match self {
            TokenSet::Token(t) => vec![vocabulary.display_name(*t)],
            TokenSet::Set(types) => types.iter().map(|t| vocabulary.display_name(*t)).collect(),
            TokenSet::Not(_) | TokenSet::Any => vocabulary
                .token_types()
                .filter(|t| self.matches(*t))
                .map(|t| vocabulary.display_name(t))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edge {
    Epsilon {
        target: usize,
    },
    Match {
        set: TokenSet,
        target: usize,
    },
    /// Calls `rule`, entering at `target` and resuming at `follow`.
    Rule {
        rule: usize,
        target: usize,
        follow: usize,
    },
}

impl Edge {
    pub fn target(&self) -> usize {
        match self {
            Edge::Epsilon { target } | Edge::Match { target, .. } | Edge::Rule { target, .. } => {
                *target
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtnState {
    pub rule: usize,
    pub kind: StateKind,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtnRule {
    pub name: String,
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone)]
pub struct Atn {
    states: Vec<AtnState>,
    rules: Vec<AtnRule>,
    rule_index: FxHashMap<String, usize>,
    vocabulary: Vocabulary,
}

#[derive(Debug, Clone, Copy)]
struct Handle {
    left: usize,
    right: usize,
}

impl Atn {
    pub fn build(grammar: &Grammar) -> Result<Self, Error> {
        if grammar.parser_rules.is_empty() {
            return Err(GrammarError::NoParserRules(grammar.name.clone()).into());
        }

        let mut atn = Atn {
            states: Vec::new(),
            rules: Vec::with_capacity(grammar.parser_rules.len()),
            rule_index: FxHashMap::default(),
            vocabulary: Vocabulary::from_grammar(grammar),
        };

        for (index, rule) in grammar.parser_rules.iter().enumerate() {
            let start = atn.add_state(index, StateKind::RuleStart);
            let stop = atn.add_state(index, StateKind::RuleStop);
            atn.rules.push(AtnRule {
                name: rule.name.clone(),
                start,
                stop,
            });
            atn.rule_index.insert(rule.name.clone(), index);
        }

        for (index, rule) in grammar.parser_rules.iter().enumerate() {
            let body = atn.block(index, &rule.name, &rule.body)?;
            let AtnRule { start, stop, .. } = atn.rules[index];
            atn.epsilon(start, body.left);
            atn.epsilon(body.right, stop);
        }

        debug!(
            grammar = %grammar.name,
            states = atn.states.len(),
            rules = atn.rules.len(),
            "built state network"
        );
        Ok(atn)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, state: usize) -> Option<&AtnState> {
        self.states.get(state)
    }

    pub fn rules(&self) -> &[AtnRule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&AtnRule> {
        self.rules.get(*self.rule_index.get(name)?)
    }

    pub fn rule_at(&self, index: usize) -> &AtnRule {
        &self.rules[index]
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    fn add_state(&mut self, rule: usize, kind: StateKind) -> usize {
        self.states.push(AtnState {
            rule,
            kind,
            edges: Vec::new(),
        });
        self.states.len() - 1
    }

    fn epsilon(&mut self, from: usize, target: usize) {
        self.states[from].edges.push(Edge::Epsilon { target });
    }

    fn block(&mut self, rule: usize, name: &str, block: &Block) -> Result<Handle, Error> {
        if let [alternative] = block.alternatives.as_slice() {
            return self.sequence(rule, name, &alternative.elements);
        }

        let decision = self.add_state(rule, StateKind::Decision);
        let end = self.add_state(rule, StateKind::Basic);
        for alternative in &block.alternatives {
            let handle = self.sequence(rule, name, &alternative.elements)?;
            self.epsilon(decision, handle.left);
            self.epsilon(handle.right, end);
        }
        Ok(Handle {
            left: decision,
            right: end,
        })
    }

    fn sequence(&mut self, rule: usize, name: &str, elements: &[Element]) -> Result<Handle, Error> {
        let mut handles = Vec::with_capacity(elements.len());
        for element in elements {
            handles.push(self.element(rule, name, element)?);
        }

        let (Some(first), Some(last)) = (handles.first().copied(), handles.last().copied()) else {
            let state = self.add_state(rule, StateKind::Basic);
            return Ok(Handle {
                left: state,
                right: state,
            });
        };
        for (from, to) in handles.iter().tuple_windows() {
            self.epsilon(from.right, to.left);
        }
        Ok(Handle {
            left: first.left,
            right: last.right,
        })
    }

    fn element(&mut self, rule: usize, name: &str, element: &Element) -> Result<Handle, Error> {
        let body = self.atom(rule, name, &element.atom)?;
        let Some(suffix) = element.suffix else {
            return Ok(body);
        };

        let end = self.add_state(rule, StateKind::Basic);
        let decision = self.add_state(rule, StateKind::Decision);
        // Greedy loops prefer the body, non-greedy ones prefer leaving.
        let (enter, leave) = (Edge::Epsilon { target: body.left }, Edge::Epsilon { target: end });
        self.states[decision].edges = if suffix.greedy {
            vec![enter, leave]
        } else {
            vec![leave, enter]
        };

        Ok(match suffix.kind {
            RepeatKind::Optional => {
                self.epsilon(body.right, end);
                Handle {
                    left: decision,
                    right: end,
                }
            }
            RepeatKind::ZeroOrMore => {
                self.epsilon(body.right, decision);
                Handle {
                    left: decision,
                    right: end,
                }
            }
            RepeatKind::OneOrMore => {
                self.epsilon(body.right, decision);
                Handle {
                    left: body.left,
                    right: end,
                }
            }
        })
    }

    fn atom(&mut self, rule: usize, name: &str, atom: &Atom) -> Result<Handle, Error> {
        match atom {
            Atom::Block(block) => self.block(rule, name, block),
            Atom::RuleRef(reference) => {
                let Some(&callee) = self.rule_index.get(reference) else {
                    return Err(GrammarError::UndefinedRule {
                        rule: name.to_string(),
                        reference: reference.clone(),
                    }
                    .into());
                };
                let left = self.add_state(rule, StateKind::Basic);
                let follow = self.add_state(rule, StateKind::Basic);
                let target = self.rules[callee].start;
                self.states[left].edges.push(Edge::Rule {
                    rule: callee,
                    target,
                    follow,
                });
                Ok(Handle {
                    left,
                    right: follow,
                })
            }
            Atom::TokenRef(_) | Atom::Literal(_) => {
                let set = TokenSet::Token(self.token_type(name, atom)?);
                Ok(self.match_edge(rule, set))
            }
            Atom::Wildcard => Ok(self.match_edge(rule, TokenSet::Any)),
            Atom::Not(inner) => {
                let set = TokenSet::Not(self.token_types(name, inner)?);
                Ok(self.match_edge(rule, set))
            }
            Atom::Range(..) | Atom::Set(_) => Err(GrammarError::Unsupported {
                rule: name.to_string(),
                construct: "character ranges and sets".to_string(),
            }
            .into()),
        }
    }

    fn match_edge(&mut self, rule: usize, set: TokenSet) -> Handle {
        let left = self.add_state(rule, StateKind::Basic);
        let right = self.add_state(rule, StateKind::Basic);
        self.states[left].edges.push(Edge::Match { set, target: right });
        Handle { left, right }
    }

    fn token_type(&self, name: &str, atom: &Atom) -> Result<usize, Error> {
        let token_type = match atom {
            Atom::TokenRef(token) => self.vocabulary.named_type(token),
            Atom::Literal(literal) => self.vocabulary.literal_type(literal),
            _ => None,
        };
        token_type.ok_or_else(|| {
            GrammarError::Unsupported {
                rule: name.to_string(),
                construct: "a token the vocabulary does not define".to_string(),
            }
            .into()
        })
    }

    /// Token types of an atom used under `~`.
    fn token_types(&self, name: &str, atom: &Atom) -> Result<Vec<usize>, Error> {
        match atom {
            Atom::TokenRef(_) | Atom::Literal(_) => Ok(vec![self.token_type(name, atom)?]),
            Atom::Block(block) => {
                let mut types = Vec::new();
                for alternative in &block.alternatives {
                    match alternative.elements.as_slice() {
                        [element] if element.suffix.is_none() => {
                            types.extend(self.token_types(name, &element.atom)?);
                        }
                        _ => return Err(unsupported_negation(name)),
                    }
                }
                Ok(types)
            }
            _ => Err(unsupported_negation(name)),
        }
    }

    /// Everything reachable from `state` through epsilon edges, tagged with
    /// the index of the outgoing edge it was reached through.
    ///
    /// A rule stop state only offers `Exit`. Rule calls are not followed; they
    /// show up as a single `Rule` transition to the follow state.
    pub fn closure(&self, state: usize) -> Vec<(usize, Transition)> {
        let Some(origin) = self.states.get(state) else {
            return Vec::new();
        };
        if origin.kind == StateKind::RuleStop {
            return vec![(0, Transition::new(state, TransitionLabel::Exit))];
        }

        let mut closure = Vec::new();
        for (alt, edge) in origin.edges.iter().enumerate() {
            let mut visited = FxHashSet::default();
            let mut stack = vec![edge];
            while let Some(edge) = stack.pop() {
                match edge {
                    Edge::Epsilon { target } => {
                        if !visited.insert(*target) {
                            continue;
                        }
                        let next = &self.states[*target];
                        if next.kind == StateKind::RuleStop {
                            closure.push((alt, Transition::new(*target, TransitionLabel::Exit)));
                        } else {
                            stack.extend(next.edges.iter().rev());
                        }
                    }
                    Edge::Match { set, target } => closure.push((
                        alt,
                        Transition::new(*target, TransitionLabel::Tokens(set.labels(&self.vocabulary))),
                    )),
                    Edge::Rule { rule, follow, .. } => closure.push((
                        alt,
                        Transition::new(*follow, TransitionLabel::rule(self.rules[*rule].name.clone())),
                    )),
                }
            }
        }
        closure
    }
}

fn unsupported_negation(name: &str) -> Error {
    GrammarError::Unsupported {
        rule: name.to_string(),
        construct: "a negated element that is not a token set".to_string(),
    }
    .into()
}

impl DecisionOracle for Atn {
    fn transitions_from(&self, state: StateId) -> Result<Vec<Transition>, OracleError> {
        if state.0 as usize >= self.states.len() {
            return Err(OracleError::UnknownState(state));
        }
        Ok(self
            .closure(state.0 as usize)
            .into_iter()
            .map(|(_, transition)| transition)
            .unique()
            .collect())
    }

    fn rule_start_state(&self, rule: &str) -> Result<StateId, OracleError> {
        self.rule(rule)
            .map(|rule| StateId::from(rule.start))
            .ok_or_else(|| OracleError::UnknownRule(rule.to_string()))
    }
}
