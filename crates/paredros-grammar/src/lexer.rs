//! A longest-match lexer built from a grammar's lexer rules.

use crate::{
    error::Error,
    grammar::{Atom, Block, Element, Grammar, RepeatKind},
    vocabulary::{EOF, TokenDef, Vocabulary},
};
use paredros_core::TokenInfo;
use regex_lite::Regex;
use std::fmt::Write;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token_type: usize,
    pub text: String,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset of the last character, inclusive.
    pub stop: usize,
    pub line: u32,
    pub column: usize,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        self.token_type == EOF
    }

    pub fn info(&self, index: usize, vocabulary: &Vocabulary) -> TokenInfo {
        TokenInfo::new(index, vocabulary.symbolic_name(self.token_type), self.text.clone())
            .with_span(self.start, self.stop)
    }
}

#[derive(Debug, Clone)]
struct LexerRule {
    name: String,
    token_type: usize,
    regex: Regex,
    hidden: bool,
}

#[derive(Debug, Clone)]
pub struct Lexer {
    rules: Vec<LexerRule>,
}

impl Lexer {
    /// Compiles every implicit literal and non-fragment lexer rule, in that order.
    pub fn new(grammar: &Grammar, vocabulary: &Vocabulary) -> Result<Self, Error> {
        let mut rules = Vec::new();

        for token_type in vocabulary.token_types() {
            if let Some(TokenDef {
                name: None,
                literal: Some(literal),
            }) = vocabulary.get(token_type)
            {
                rules.push(LexerRule {
                    name: format!("'{}'", literal),
                    token_type,
                    regex: compile(&format!("'{}'", literal), &regex_lite::escape(literal))?,
                    hidden: false,
                });
            }
        }

        for rule in grammar.lexer_rules.iter().filter(|rule| !rule.fragment) {
            let Some(token_type) = vocabulary.named_type(&rule.name) else {
                continue;
            };
            let mut builder = PatternBuilder {
                grammar,
                active: vec![rule.name.as_str()],
            };
            let pattern = builder.block(&rule.name, &rule.body)?;
            trace!(rule = %rule.name, pattern = %pattern, "compiled lexer rule");
            rules.push(LexerRule {
                name: rule.name.clone(),
                token_type,
                regex: compile(&rule.name, &pattern)?,
                hidden: rule.is_hidden(),
            });
        }

        debug!(rules = rules.len(), "built lexer");
        Ok(Self { rules })
    }

    /// Splits `input` into tokens, always ending with an `EOF` token.
    ///
    /// Characters no rule matches are reported and skipped.
    pub fn tokenize(&self, input: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut pos = 0;
        let mut line = 1u32;
        let mut column = 0usize;

        while pos < input.len() {
            let rest = &input[pos..];
            let best = self
                .rules
                .iter()
                .filter_map(|rule| {
                    let found = rule.regex.find(rest)?;
                    (found.end() > 0).then_some((rule, found.end()))
                })
                .fold(None, |best: Option<(&LexerRule, usize)>, (rule, len)| match best {
                    Some((_, longest)) if longest >= len => best,
                    _ => Some((rule, len)),
                });

            let len = match best {
                Some((rule, len)) => {
                    let text = &rest[..len];
                    if rule.hidden {
                        trace!(rule = %rule.name, text = %text, "skipped hidden token");
                    } else {
                        tokens.push(Token {
                            token_type: rule.token_type,
                            text: text.to_string(),
                            start: pos,
                            stop: pos + len - 1,
                            line,
                            column,
                        });
                    }
                    len
                }
                None => {
                    let Some(c) = rest.chars().next() else {
                        break;
                    };
                    warn!(line, column, "token recognition error at: '{}'", c);
                    c.len_utf8()
                }
            };

            for c in rest[..len].chars() {
                if c == '\n' {
                    line += 1;
                    column = 0;
                } else {
                    column += 1;
                }
            }
            pos += len;
        }

        tokens.push(Token {
            token_type: EOF,
            text: "<EOF>".to_string(),
            start: pos,
            stop: pos,
            line,
            column,
        });
        tokens
    }
}

fn compile(rule: &str, pattern: &str) -> Result<Regex, Error> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|err| Error::LexerPattern {
        rule: rule.to_string(),
        message: err.to_string(),
    })
}

/// Translates lexer rule bodies into regular expressions, inlining fragments.
struct PatternBuilder<'a> {
    grammar: &'a Grammar,
    /// Rules currently being inlined.
    active: Vec<&'a str>,
}

impl<'a> PatternBuilder<'a> {
    fn block(&mut self, rule: &str, block: &'a Block) -> Result<String, Error> {
        let mut alternatives = Vec::with_capacity(block.alternatives.len());
        for alternative in &block.alternatives {
            let mut sequence = String::new();
            for element in &alternative.elements {
                sequence.push_str(&self.element(rule, element)?);
            }
            alternatives.push(sequence);
        }
        Ok(alternatives.join("|"))
    }

    fn element(&mut self, rule: &str, element: &'a Element) -> Result<String, Error> {
        let pattern = self.atom(rule, &element.atom)?;
        Ok(match element.suffix {
            None => pattern,
            Some(suffix) => {
                let op = match suffix.kind {
                    RepeatKind::Optional => "?",
                    RepeatKind::ZeroOrMore => "*",
                    RepeatKind::OneOrMore => "+",
                };
                let lazy = if suffix.greedy { "" } else { "?" };
                format!("(?:{}){}{}", pattern, op, lazy)
            }
        })
    }

    fn atom(&mut self, rule: &str, atom: &'a Atom) -> Result<String, Error> {
        match atom {
            Atom::Literal(literal) => Ok(regex_lite::escape(literal)),
            Atom::Range(from, to) => Ok(class(&[(*from, *to)], false)),
            Atom::Set(raw) => Ok(class(&parse_set(raw), false)),
            Atom::Not(inner) => Ok(class(&self.char_ranges(rule, inner)?, true)),
            Atom::Wildcard => Ok("(?s:.)".to_string()),
            Atom::TokenRef(name) => {
                let body = self.referenced(rule, name)?;
                let pattern = self.block(name, body)?;
                self.active.pop();
                Ok(format!("(?:{})", pattern))
            }
            Atom::RuleRef(name) => Err(pattern_error(
                rule,
                format!("lexer rules cannot reference parser rule `{}`", name),
            )),
            Atom::Block(block) => Ok(format!("(?:{})", self.block(rule, block)?)),
        }
    }

    /// Looks up a referenced lexer rule and marks it active. Callers pop it.
    fn referenced(&mut self, rule: &str, name: &'a str) -> Result<&'a Block, Error> {
        if self.active.contains(&name) {
            return Err(pattern_error(
                rule,
                format!("recursive reference to `{}`", name),
            ));
        }
        let referenced = self
            .grammar
            .lexer_rule(name)
            .ok_or_else(|| pattern_error(rule, format!("undefined lexer rule `{}`", name)))?;
        self.active.push(name);
        Ok(&referenced.body)
    }

    /// The characters a negated atom excludes.
    fn char_ranges(&mut self, rule: &str, atom: &'a Atom) -> Result<Vec<(char, char)>, Error> {
        match atom {
            Atom::Set(raw) => Ok(parse_set(raw)),
            Atom::Range(from, to) => Ok(vec![(*from, *to)]),
            Atom::Literal(literal) => {
                let mut chars = literal.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(vec![(c, c)]),
                    _ => Err(pattern_error(
                        rule,
                        format!("cannot negate multi-character literal '{}'", literal),
                    )),
                }
            }
            Atom::Block(block) => self.block_ranges(rule, block),
            Atom::TokenRef(name) => {
                let body = self.referenced(rule, name)?;
                let ranges = self.block_ranges(name, body);
                self.active.pop();
                ranges
            }
            _ => Err(pattern_error(rule, "only character sets can be negated".to_string())),
        }
    }

    fn block_ranges(&mut self, rule: &str, block: &'a Block) -> Result<Vec<(char, char)>, Error> {
        let mut ranges = Vec::new();
        for alternative in &block.alternatives {
            match alternative.elements.as_slice() {
                [element] if element.suffix.is_none() => {
                    ranges.extend(self.char_ranges(rule, &element.atom)?);
                }
                _ => {
                    return Err(pattern_error(
                        rule,
                        "only single-character alternatives can be negated".to_string(),
                    ));
                }
            }
        }
        Ok(ranges)
    }
}

fn pattern_error(rule: &str, message: String) -> Error {
    Error::LexerPattern {
        rule: rule.to_string(),
        message,
    }
}

fn class(ranges: &[(char, char)], negated: bool) -> String {
    match (ranges.is_empty(), negated) {
        (true, false) => return r"[^\x{0}-\x{10FFFF}]".to_string(),
        (true, true) => return "(?s:.)".to_string(),
        _ => {}
    }

    let mut class = String::from(if negated { "[^" } else { "[" });
    for &(from, to) in ranges {
        if from == to {
            let _ = write!(class, r"\x{{{:X}}}", from as u32);
        } else {
            let _ = write!(class, r"\x{{{:X}}}-\x{{{:X}}}", from as u32, to as u32);
        }
    }
    class.push(']');
    class
}

/// Parses the raw contents of a `[...]` set into inclusive character ranges.
fn parse_set(raw: &str) -> Vec<(char, char)> {
    // (char, escaped)
    let mut items = Vec::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            items.push((c, false));
            continue;
        }
        let Some(escaped) = chars.next() else {
            items.push(('\\', true));
            break;
        };
        let c = match escaped {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'u' => {
                let digits: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    chars.by_ref().take_while(|c| *c != '}').collect()
                } else {
                    chars.by_ref().take(4).collect()
                };
                u32::from_str_radix(&digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            other => other,
        };
        items.push((c, true));
    }

    let mut ranges = Vec::new();
    let mut i = 0;
    while i < items.len() {
        match (items.get(i + 1), items.get(i + 2)) {
            (Some(('-', false)), Some(&(to, _))) => {
                ranges.push((items[i].0, to));
                i += 3;
            }
            _ => {
                ranges.push((items[i].0, items[i].0));
                i += 1;
            }
        }
    }
    ranges
}
