//! Token types known to a grammar.

use crate::grammar::{Atom, Grammar};
use rustc_hash::FxHashMap;
use tracing::warn;

/// Token type of the end-of-input token.
pub const EOF: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDef {
    /// Lexer rule name; `None` for literals only used in parser rules.
    pub name: Option<String>,
    /// Literal text, when the token always matches the same text.
    pub literal: Option<String>,
}

/// Assigns a token type to every lexer rule and every literal used directly
/// in parser rules.
///
/// Types are handed out in this order: `EOF`, implicit literals, lexer rules,
/// then token references no lexer rule defines.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    defs: Vec<TokenDef>,
    by_name: FxHashMap<String, usize>,
    by_literal: FxHashMap<String, usize>,
}

impl Vocabulary {
    pub fn from_grammar(grammar: &Grammar) -> Self {
        let mut vocabulary = Self::default();
        vocabulary.push(TokenDef {
            name: Some("EOF".to_string()),
            literal: None,
        });

        let defined: FxHashMap<&str, &str> = grammar
            .lexer_rules
            .iter()
            .filter(|rule| !rule.fragment)
            .filter_map(|rule| Some((rule.body.single_literal()?, rule.name.as_str())))
            .collect();

        for rule in &grammar.parser_rules {
            rule.body.visit_atoms(&mut |atom| {
                if let Atom::Literal(literal) = atom
                    && !defined.contains_key(literal.as_str())
                    && !vocabulary.by_literal.contains_key(literal)
                {
                    vocabulary.push(TokenDef {
                        name: None,
                        literal: Some(literal.clone()),
                    });
                }
            });
        }

        for rule in grammar.lexer_rules.iter().filter(|rule| !rule.fragment) {
            vocabulary.push(TokenDef {
                name: Some(rule.name.clone()),
                literal: rule.body.single_literal().map(str::to_string),
            });
        }

        for rule in &grammar.parser_rules {
            rule.body.visit_atoms(&mut |atom| {
                if let Atom::TokenRef(name) = atom
                    && !vocabulary.by_name.contains_key(name)
                {
                    warn!(rule = %rule.name, token = %name, "implicit definition of token");
                    vocabulary.push(TokenDef {
                        name: Some(name.clone()),
                        literal: None,
                    });
                }
            });
        }

        vocabulary
    }

    fn push(&mut self, def: TokenDef) {
        let token_type = self.defs.len();
        if let Some(name) = &def.name {
            self.by_name.entry(name.clone()).or_insert(token_type);
        }
        if let Some(literal) = &def.literal {
            self.by_literal.entry(literal.clone()).or_insert(token_type);
        }
        self.defs.push(def);
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn get(&self, token_type: usize) -> Option<&TokenDef> {
        self.defs.get(token_type)
    }

    pub fn literal_type(&self, literal: &str) -> Option<usize> {
        self.by_literal.get(literal).copied()
    }

    pub fn named_type(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn symbolic_name(&self, token_type: usize) -> Option<&str> {
        self.defs.get(token_type)?.name.as_deref()
    }

    /// `'+'` for tokens with a fixed literal, otherwise the symbolic name.
    pub fn display_name(&self, token_type: usize) -> String {
        match self.defs.get(token_type) {
            Some(TokenDef {
                literal: Some(literal),
                ..
            }) if token_type != EOF => format!("'{}'", literal),
            Some(TokenDef { name: Some(name), .. }) => name.clone(),
            _ => format!("<INVALID {}>", token_type),
        }
    }

    /// Every token type except `EOF`.
    pub fn token_types(&self) -> impl Iterator<Item = usize> {
        1..self.defs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn vocabulary() -> Vocabulary {
        let grammar = Grammar::parse(
            "grammar G;\nstart : A '+' B '1' UNDEFINED ;\nA : '1' ;\nB : [b]+ ;\nfragment F : 'f' ;\nWS : ' ' -> skip ;",
        )
        .unwrap();
        Vocabulary::from_grammar(&grammar)
    }

    #[test]
    fn test_type_order() {
        let vocabulary = vocabulary();
        assert_eq!(vocabulary.named_type("EOF"), Some(EOF));
        assert_eq!(vocabulary.literal_type("+"), Some(1));
        assert_eq!(vocabulary.named_type("A"), Some(2));
        assert_eq!(vocabulary.literal_type("1"), Some(2));
        assert_eq!(vocabulary.named_type("B"), Some(3));
        assert_eq!(vocabulary.named_type("WS"), Some(4));
        assert_eq!(vocabulary.named_type("UNDEFINED"), Some(5));
        assert_eq!(vocabulary.named_type("F"), None);
        assert_eq!(vocabulary.len(), 6);
    }

    #[rstest]
    #[case(0, "EOF")]
    #[case(1, "'+'")]
    #[case(2, "'1'")]
    #[case(3, "B")]
    #[case(9, "<INVALID 9>")]
    fn test_display_name(#[case] token_type: usize, #[case] expected: &str) {
        assert_eq!(vocabulary().display_name(token_type), expected);
    }
}
