use miette::{Diagnostic, NamedSource, SourceSpan};
use paredros_core::IntegrationError;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the grammar itself, found while loading it.
#[derive(Debug, Error, Diagnostic)]
pub enum GrammarError {
    #[error("Unexpected input in grammar at line {line}")]
    #[diagnostic(
        code(paredros::grammar::syntax),
        help("Check the rule ending near the indicated position; every rule ends with ';'.")
    )]
    Syntax {
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: SourceSpan,
        line: u32,
    },
    #[error("Rule `{0}` is defined more than once")]
    #[diagnostic(code(paredros::grammar::duplicate_rule))]
    DuplicateRule(String),
    #[error("Rule `{rule}` references undefined rule `{reference}`")]
    #[diagnostic(code(paredros::grammar::undefined_rule))]
    UndefinedRule { rule: String, reference: String },
    #[error("Rule `{rule}` uses {construct}, which is not supported there")]
    #[diagnostic(code(paredros::grammar::unsupported))]
    Unsupported { rule: String, construct: String },
    #[error("Grammar `{0}` has no parser rules to start from")]
    #[diagnostic(
        code(paredros::grammar::no_parser_rules),
        help("Lexer grammars cannot be debugged on their own.")
    )]
    NoParserRules(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Grammar(#[from] GrammarError),
    #[error("Lexer rule `{rule}` does not compile: {message}")]
    #[diagnostic(code(paredros::lexer::pattern))]
    LexerPattern { rule: String, message: String },
    #[error(transparent)]
    #[diagnostic(code(paredros::debugger))]
    Core(#[from] paredros_core::Error),
    #[error(transparent)]
    #[diagnostic(code(paredros::json))]
    Json(#[from] serde_json::Error),
    #[error("Failed to read {}: {source}", path.display())]
    #[diagnostic(code(paredros::io))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("No input has been parsed yet")]
    #[diagnostic(code(paredros::session), help("Parse an input before navigating."))]
    NotParsed,
}

impl From<IntegrationError> for Error {
    fn from(err: IntegrationError) -> Self {
        Error::Core(err.into())
    }
}

impl Error {
    /// Navigation mistakes are reported to the user and leave the session usable.
    pub fn is_navigation(&self) -> bool {
        matches!(self, Error::Core(err) if err.is_navigation())
    }
}
