//! Command-line interface for the paredros grammar debugger.
//!
//! This crate wires a [`paredros_grammar::DebugSession`] to a terminal: an
//! interactive stepping REPL plus non-interactive commands that print the parse
//! tree, the recorded trace or the decision points as JSON.
//!
//! # Usage
//!
//! The CLI is normally used through the `paredros` binary, but can be embedded:
//!
//! ```rust,no_run
//! use clap::Parser;
//! use paredros_cli::Cli;
//!
//! let cli = Cli::parse();
//! cli.run().expect("CLI execution failed");
//! ```
//!
//! # Command-line Examples
//!
//! Step through a parse interactively:
//! ```bash
//! paredros debug Simpleton.g4 input.txt
//! ```
//!
//! Print the tree as it looked after step 4:
//! ```bash
//! paredros tree Simpleton.g4 --text 123 --step 4
//! ```
pub mod cli;
pub mod debugger;

pub use cli::Cli;
pub use debugger::{Command, Debugger};
