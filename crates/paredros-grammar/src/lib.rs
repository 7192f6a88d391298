//! `paredros-grammar` loads ANTLR-style grammars and records parses for the
//! [`paredros_core`] debugger.
//!
//! A [`Grammar`] is parsed from `.g4` source, compiled into a lexer and a state
//! network ([`Atn`]), and then used by the [`Interpreter`] to parse input while
//! reporting every rule entry, decision and consumed token. The state network
//! doubles as the [`paredros_core::DecisionOracle`] the explorer consults when
//! it follows alternatives the parse never took.
//!
//! [`DebugSession`] wires all of this together.
//!
//! ## Examples
//!
//! ```rust
//! use paredros_core::Config;
//! use paredros_grammar::DebugSession;
//!
//! let mut session = DebugSession::from_source(
//!     r#"
//! grammar Simpleton_Reg;
//! startRule: EINS+ | zwoelf | DREI DREI | EINS ZWEI DREI;
//! zwoelf: EINS (ZWEI|DREI)+;
//! EINS: '1';
//! ZWEI: '2';
//! DREI: '3';
//! "#,
//!     Config::default(),
//! )
//! .unwrap();
//!
//! session.parse("123").unwrap();
//! assert!(!session.has_error());
//!
//! session.reset_to_step_id(0).unwrap();
//! let json = session.tree_json(false).unwrap();
//! assert!(json.contains("startRule"));
//! ```
mod atn;
mod error;
mod grammar;
mod interpreter;
mod lexer;
mod session;
mod vocabulary;

pub use atn::{Atn, AtnRule, AtnState, Edge, StateKind, TokenSet};
pub use error::{Error, GrammarError};
pub use grammar::{
    Alternative, Atom, Block, Element, Grammar, GrammarKind, LexerCommand, RepeatKind, Rule,
    Suffix,
};
pub use interpreter::{CURSOR, Interpreter};
pub use lexer::{Lexer, Token};
pub use session::DebugSession;
pub use vocabulary::{EOF, TokenDef, Vocabulary};
