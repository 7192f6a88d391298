//! Grammar files in the ANTLR `.g4` notation.

mod parser;

use crate::error::{Error, GrammarError};
use miette::{NamedSource, SourceSpan};
use rustc_hash::FxHashSet;
use std::{fs, path::Path};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrammarKind {
    #[default]
    Combined,
    Parser,
    Lexer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatKind {
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suffix {
    pub kind: RepeatKind,
    pub greedy: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Literal(String),
    /// `'a'..'z'`, lexer rules only.
    Range(char, char),
    /// Raw contents of a `[...]` set, lexer rules only.
    Set(String),
    Not(Box<Atom>),
    Wildcard,
    TokenRef(String),
    RuleRef(String),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub label: Option<String>,
    pub atom: Atom,
    pub suffix: Option<Suffix>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexerCommand {
    Skip,
    Channel(String),
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Alternative {
    pub elements: Vec<Element>,
    pub label: Option<String>,
    pub commands: Vec<LexerCommand>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub alternatives: Vec<Alternative>,
}

impl Block {
    /// Visits every atom in source order, descending into nested blocks.
    pub fn visit_atoms<'a>(&'a self, f: &mut impl FnMut(&'a Atom)) {
        for alternative in &self.alternatives {
            for element in &alternative.elements {
                visit_atom(&element.atom, f);
            }
        }
    }

    /// The literal this block matches when it is nothing but one literal.
    pub fn single_literal(&self) -> Option<&str> {
        match self.alternatives.as_slice() {
            [alternative] => match alternative.elements.as_slice() {
                [
                    Element {
                        atom: Atom::Literal(literal),
                        suffix: None,
                        ..
                    },
                ] => Some(literal),
                _ => None,
            },
            _ => None,
        }
    }
}

fn visit_atom<'a>(atom: &'a Atom, f: &mut impl FnMut(&'a Atom)) {
    f(atom);
    match atom {
        Atom::Not(inner) => visit_atom(inner, f),
        Atom::Block(block) => block.visit_atoms(f),
        _ => {}
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub fragment: bool,
    pub body: Block,
    /// Source text of the whole rule, `name : ... ;`.
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl Rule {
    pub fn is_lexer_rule(&self) -> bool {
        self.name.starts_with(|c: char| c.is_ascii_uppercase())
    }

    /// Skipped or routed to another channel, so never seen by the parser.
    pub fn is_hidden(&self) -> bool {
        self.body.alternatives.iter().any(|alternative| {
            alternative
                .commands
                .iter()
                .any(|command| matches!(command, LexerCommand::Skip | LexerCommand::Channel(_)))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grammar {
    pub name: String,
    pub kind: GrammarKind,
    pub imports: Vec<String>,
    pub parser_rules: Vec<Rule>,
    pub lexer_rules: Vec<Rule>,
    pub source: String,
}

impl Grammar {
    pub fn parse(source: &str) -> Result<Self, GrammarError> {
        Self::parse_named("<grammar>", source)
    }

    pub fn parse_named(name: &str, source: &str) -> Result<Self, GrammarError> {
        let grammar = parser::parse(source).map_err(|offset| {
            let line = source[..offset].matches('\n').count() as u32 + 1;
            GrammarError::Syntax {
                src: NamedSource::new(name, source.to_string()),
                span: SourceSpan::from((offset, 1usize.min(source.len() - offset))),
                line,
            }
        })?;
        grammar.validate()?;
        debug!(
            grammar = %grammar.name,
            parser_rules = grammar.parser_rules.len(),
            lexer_rules = grammar.lexer_rules.len(),
            "parsed grammar"
        );
        Ok(grammar)
    }

    /// Loads a grammar file and the grammars it imports from the same directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut grammar = Self::parse_named(&path.display().to_string(), &source)?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        for import in grammar.imports.clone() {
            let imported = dir.join(format!("{}.g4", import));
            if imported.exists() {
                grammar.merge_imported(Self::from_file(&imported)?);
            } else {
                warn!(grammar = %grammar.name, import = %import, "imported grammar not found");
            }
        }
        Ok(grammar)
    }

    /// Adds the rules of `other` that this grammar does not define itself.
    pub fn merge_imported(&mut self, other: Grammar) {
        let defined: FxHashSet<String> = self.rules().map(|rule| rule.name.clone()).collect();
        for rule in other.parser_rules {
            if !defined.contains(&rule.name) {
                self.parser_rules.push(rule);
            }
        }
        for rule in other.lexer_rules {
            if !defined.contains(&rule.name) {
                self.lexer_rules.push(rule);
            }
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.parser_rules.iter().chain(self.lexer_rules.iter())
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules().find(|rule| rule.name == name)
    }

    pub fn parser_rule(&self, name: &str) -> Option<&Rule> {
        self.parser_rules.iter().find(|rule| rule.name == name)
    }

    pub fn lexer_rule(&self, name: &str) -> Option<&Rule> {
        self.lexer_rules.iter().find(|rule| rule.name == name)
    }

    /// Parsing always begins with the first parser rule.
    pub fn start_rule(&self) -> Option<&Rule> {
        self.parser_rules.first()
    }

    fn validate(&self) -> Result<(), GrammarError> {
        let mut seen = FxHashSet::default();
        for rule in self.rules() {
            if !seen.insert(rule.name.as_str()) {
                return Err(GrammarError::DuplicateRule(rule.name.clone()));
            }
        }

        for rule in &self.parser_rules {
            let mut result = Ok(());
            rule.body.visit_atoms(&mut |atom| {
                if result.is_err() {
                    return;
                }
                match atom {
                    Atom::RuleRef(name) if self.parser_rule(name).is_none() => {
                        result = Err(GrammarError::UndefinedRule {
                            rule: rule.name.clone(),
                            reference: name.clone(),
                        });
                    }
                    Atom::Range(..) | Atom::Set(_) => {
                        result = Err(GrammarError::Unsupported {
                            rule: rule.name.clone(),
                            construct: "character ranges and sets".to_string(),
                        });
                    }
                    _ => {}
                }
            });
            result?;
        }

        for rule in &self.lexer_rules {
            let mut result = Ok(());
            rule.body.visit_atoms(&mut |atom| {
                if let Atom::RuleRef(name) = atom
                    && result.is_ok()
                {
                    result = Err(GrammarError::UndefinedRule {
                        rule: rule.name.clone(),
                        reference: name.clone(),
                    });
                }
            });
            result?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SIMPLETON: &str = r#"
grammar Simpleton_Reg;

startRule: EINS+ | zwoelf | DREI DREI | EINS ZWEI DREI;
zwoelf: EINS (ZWEI|DREI)+;

EINS: '1';
ZWEI: '2';
DREI: '3';
"#;

    #[test]
    fn test_parse_simpleton() {
        let grammar = Grammar::parse(SIMPLETON).unwrap();
        assert_eq!(grammar.name, "Simpleton_Reg");
        assert_eq!(grammar.kind, GrammarKind::Combined);
        assert_eq!(
            grammar.parser_rules.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["startRule", "zwoelf"]
        );
        assert_eq!(grammar.start_rule().map(|r| r.name.as_str()), Some("startRule"));
        assert_eq!(grammar.parser_rule("startRule").unwrap().body.alternatives.len(), 4);

        let zwoelf = grammar.parser_rule("zwoelf").unwrap();
        assert_eq!(zwoelf.text, "zwoelf: EINS (ZWEI|DREI)+;");
        assert_eq!((zwoelf.start_line, zwoelf.end_line), (5, 5));
        let loop_element = &zwoelf.body.alternatives[0].elements[1];
        assert_eq!(
            loop_element.suffix,
            Some(Suffix {
                kind: RepeatKind::OneOrMore,
                greedy: true
            })
        );

        assert_eq!(grammar.lexer_rule("ZWEI").unwrap().body.single_literal(), Some("2"));
    }

    #[test]
    fn test_parse_lexer_features() {
        let grammar = Grammar::parse(
            r#"
// line comment
lexer grammar Words;
options { caseInsensitive = false; }
/* block
   comment */
fragment DIGIT : [0-9] ;
NUMBER : DIGIT+ ('.' DIGIT*)? ;
WORD   : ~[ \t\r\n]+? ;
ANY    : . ;
NL     : '\r'? '\n' -> channel(HIDDEN) ;
WS     : [ \t]+ -> skip ;
"#,
        )
        .unwrap();

        assert_eq!(grammar.kind, GrammarKind::Lexer);
        let digit = grammar.lexer_rule("DIGIT").unwrap();
        assert!(digit.fragment);
        assert_eq!(digit.body.alternatives[0].elements[0].atom, Atom::Set("0-9".to_string()));

        let word = &grammar.lexer_rule("WORD").unwrap().body.alternatives[0].elements[0];
        assert!(matches!(&word.atom, Atom::Not(inner) if **inner == Atom::Set(" \\t\\r\\n".to_string())));
        assert_eq!(
            word.suffix,
            Some(Suffix {
                kind: RepeatKind::OneOrMore,
                greedy: false
            })
        );

        assert_eq!(
            grammar.lexer_rule("ANY").unwrap().body.alternatives[0].elements[0].atom,
            Atom::Wildcard
        );
        assert!(grammar.lexer_rule("NL").unwrap().is_hidden());
        assert_eq!(
            grammar.lexer_rule("WS").unwrap().body.alternatives[0].commands,
            vec![LexerCommand::Skip]
        );
        assert!(!grammar.lexer_rule("NUMBER").unwrap().is_hidden());
    }

    #[test]
    fn test_parse_labels_and_imports() {
        let grammar = Grammar::parse(
            r#"
parser grammar Expr;
import Common, Tokens;
expr : left=atom op+=('+'|'-') right=atom # binary
     | atom                               # single
     ;
atom : INT | '(' expr ')' | EOF ;
"#,
        )
        .unwrap();

        assert_eq!(grammar.kind, GrammarKind::Parser);
        assert_eq!(grammar.imports, vec!["Common", "Tokens"]);
        let expr = grammar.parser_rule("expr").unwrap();
        assert_eq!(expr.body.alternatives[0].label.as_deref(), Some("binary"));
        assert_eq!(expr.body.alternatives[1].label.as_deref(), Some("single"));
        let elements = &expr.body.alternatives[0].elements;
        assert_eq!(elements[0].label.as_deref(), Some("left"));
        assert_eq!(elements[0].atom, Atom::RuleRef("atom".to_string()));
        assert_eq!(elements[1].label.as_deref(), Some("op"));
        assert!(matches!(&elements[1].atom, Atom::Block(block) if block.alternatives.len() == 2));
        assert_eq!((expr.start_line, expr.end_line), (4, 6));
    }

    #[rstest]
    #[case(r"A: '\n';", "\n")]
    #[case(r"A: '\'';", "'")]
    #[case(r"A: 'A';", "A")]
    #[case(r"A: '\\';", "\\")]
    fn test_literal_escapes(#[case] rule: &str, #[case] expected: &str) {
        let grammar = Grammar::parse(&format!("lexer grammar L;\n{}", rule)).unwrap();
        assert_eq!(grammar.lexer_rule("A").unwrap().body.single_literal(), Some(expected));
    }

    #[rstest]
    #[case("grammar G;\nstart : A\nB : 'b';", 3)]
    #[case("grammar G\nstart : A ;", 2)]
    #[case("grammar G;\nstart : A ;\n\nB : ( 'b' ;", 4)]
    fn test_syntax_error_line(#[case] source: &str, #[case] line: u32) {
        match Grammar::parse(source) {
            Err(GrammarError::Syntax { line: actual, .. }) => assert_eq!(actual, line),
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    #[rstest]
    #[case(
        "grammar G;\nstart : missing ;",
        GrammarError::UndefinedRule { rule: "start".into(), reference: "missing".into() }
    )]
    #[case("grammar G;\nstart : A ;\nstart : B ;", GrammarError::DuplicateRule("start".into()))]
    fn test_validation(#[case] source: &str, #[case] expected: GrammarError) {
        let err = Grammar::parse(source).unwrap_err();
        assert_eq!(err.to_string(), expected.to_string());
    }

    #[test]
    fn test_merge_imported_keeps_own_rules() {
        let mut main = Grammar::parse("grammar Main;\nstart : A ;\nA : 'a' ;").unwrap();
        let common = Grammar::parse("grammar Common;\nother : B ;\nA : 'x' ;\nB : 'b' ;").unwrap();
        main.merge_imported(common);
        assert_eq!(main.lexer_rule("A").unwrap().body.single_literal(), Some("a"));
        assert!(main.lexer_rule("B").is_some());
        assert!(main.parser_rule("other").is_some());
        assert_eq!(main.start_rule().map(|r| r.name.as_str()), Some("start"));
    }
}
