use crate::debugger::Debugger;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, VerbosityFilter, WarnLevel};
use miette::{IntoDiagnostic, WrapErr, miette};
use paredros_core::Config;
use paredros_grammar::DebugSession;
use std::io::{self, Read};
use std::{fs, path::PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "paredros")]
#[command(version)]
#[command(after_help = "Examples:\n\n\
    To step through a parse interactively:\n\
    $ paredros debug Grammar.g4 input.txt\n\n\
    To print the parse tree as it stood after step 4:\n\
    $ paredros tree Grammar.g4 --text 123 --step 4\n\n\
    To list the decisions the parser made:\n\
    $ paredros decisions Grammar.g4 input.txt")]
#[command(
    about = "paredros records how a grammar parses an input and lets you step through it.",
    long_about = None
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Commands,

    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,
}

#[derive(Clone, Debug, clap::Args, Default)]
struct SessionArgs {
    /// ANTLR-style grammar file (.g4)
    grammar: PathBuf,

    /// File to parse; read from stdin when omitted
    input: Option<PathBuf>,

    /// Parse the given text instead of a file
    #[arg(short = 'e', long = "text", conflicts_with = "input")]
    text: Option<String>,

    /// Number of upcoming tokens recorded with each step
    #[arg(long, value_name = "N")]
    lookahead: Option<usize>,

    /// Keep consecutive decision steps apart instead of merging them
    #[arg(long, default_value_t = false)]
    no_merge: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start an interactive session stepping through the parse
    Debug {
        #[clap(flatten)]
        args: SessionArgs,
    },
    /// Print the parse tree as JSON
    Tree {
        #[clap(flatten)]
        args: SessionArgs,
        /// Include the steps behind every node
        #[arg(long, default_value_t = false)]
        detailed: bool,
        /// Show the tree as it stood after this step
        #[arg(long, value_name = "ID")]
        step: Option<usize>,
    },
    /// Print the recorded steps of the parse as JSON
    Trace {
        #[clap(flatten)]
        args: SessionArgs,
    },
    /// Print the decisions the parser made as JSON
    Decisions {
        #[clap(flatten)]
        args: SessionArgs,
    },
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        self.init_tracing();

        match &self.commands {
            Commands::Debug { args } => {
                if args.input.is_none() && args.text.is_none() {
                    return Err(miette!(
                        "The debug command needs an input file or --text, stdin is used for commands"
                    ));
                }
                let session = args.session()?;
                Debugger::new(session).run()
            }
            Commands::Tree {
                args,
                detailed,
                step,
            } => {
                let mut session = args.session()?;
                if let Some(step) = step {
                    session.reset_to_step_id(*step)?;
                }
                println!("{}", session.tree_json(*detailed)?);
                Ok(())
            }
            Commands::Trace { args } => {
                let session = args.session()?;
                let trace = session.trace()?;
                println!("{}", serde_json::to_string_pretty(&trace).into_diagnostic()?);
                Ok(())
            }
            Commands::Decisions { args } => {
                let session = args.session()?;
                let points = session.decision_points()?;
                println!("{}", serde_json::to_string_pretty(&points).into_diagnostic()?);
                Ok(())
            }
        }
    }

    fn init_tracing(&self) {
        let level = match self.verbose.filter() {
            VerbosityFilter::Off => "off",
            VerbosityFilter::Error => "error",
            VerbosityFilter::Warn => "warn",
            VerbosityFilter::Info => "info",
            VerbosityFilter::Debug => "debug",
            VerbosityFilter::Trace => "trace",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("paredros={}", level)));

        // A subscriber may already be installed when `run` is called repeatedly.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    }
}

impl SessionArgs {
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(depth) = self.lookahead {
            config.lookahead_depth = depth;
        }
        if self.no_merge {
            config.merge.enabled = false;
        }
        config
    }

    fn read_input(&self) -> miette::Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }

        match &self.input {
            Some(path) => fs::read_to_string(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to read input {}", path.display())),
            None => {
                let mut input = String::new();
                io::stdin()
                    .read_to_string(&mut input)
                    .into_diagnostic()?;
                Ok(input)
            }
        }
    }

    fn session(&self) -> miette::Result<DebugSession> {
        let config = self.config();
        debug!(?config, grammar = %self.grammar.display(), "loading grammar");

        let mut session = DebugSession::from_file(&self.grammar, config)?;
        session.parse(&self.read_input()?)?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const GRAMMAR: &str = "grammar Simpleton_Reg;\n\
        startRule: EINS+ | zwoelf | DREI DREI | EINS ZWEI DREI;\n\
        zwoelf: EINS (ZWEI|DREI)+;\n\
        EINS: '1';\n\
        ZWEI: '2';\n\
        DREI: '3';\n";

    fn grammar_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", GRAMMAR).unwrap();
        file
    }

    fn args(grammar: &NamedTempFile, text: &str) -> SessionArgs {
        SessionArgs {
            grammar: grammar.path().to_path_buf(),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_overrides() {
        let grammar = grammar_file();
        let args = SessionArgs {
            lookahead: Some(1),
            no_merge: true,
            ..args(&grammar, "123")
        };

        let config = args.config();
        assert_eq!(config.lookahead_depth, 1);
        assert!(!config.merge.enabled);
    }

    #[test]
    fn test_text_takes_precedence() {
        let grammar = grammar_file();
        assert_eq!(args(&grammar, "11").read_input().unwrap(), "11");
    }

    #[test]
    fn test_input_file() {
        let grammar = grammar_file();
        let mut input = NamedTempFile::new().unwrap();
        write!(input, "33").unwrap();

        let args = SessionArgs {
            grammar: grammar.path().to_path_buf(),
            input: Some(input.path().to_path_buf()),
            ..Default::default()
        };
        let session = args.session().unwrap();
        assert!(!session.has_error());
    }

    #[test]
    fn test_missing_input_file() {
        let grammar = grammar_file();
        let args = SessionArgs {
            grammar: grammar.path().to_path_buf(),
            input: Some(PathBuf::from("/nonexistent/paredros-input.txt")),
            ..Default::default()
        };
        assert!(args.read_input().is_err());
    }

    #[rstest]
    #[case::tree(|args| Commands::Tree { args, detailed: false, step: Some(2) })]
    #[case::detailed_tree(|args| Commands::Tree { args, detailed: true, step: None })]
    #[case::trace(|args| Commands::Trace { args })]
    #[case::decisions(|args| Commands::Decisions { args })]
    fn test_cli_json_commands(#[case] command: fn(SessionArgs) -> Commands) {
        let grammar = grammar_file();
        let cli = Cli {
            commands: command(args(&grammar, "123")),
            verbose: Verbosity::new(0, 0),
        };
        assert!(cli.run().is_ok());
    }

    #[test]
    fn test_cli_tree_step_out_of_range() {
        let grammar = grammar_file();
        let cli = Cli {
            commands: Commands::Tree {
                args: args(&grammar, "123"),
                detailed: true,
                step: Some(99),
            },
            verbose: Verbosity::new(0, 0),
        };
        assert!(cli.run().is_err());
    }

    #[test]
    fn test_cli_debug_requires_input() {
        let grammar = grammar_file();
        let cli = Cli {
            commands: Commands::Debug {
                args: SessionArgs {
                    grammar: grammar.path().to_path_buf(),
                    ..Default::default()
                },
            },
            verbose: Verbosity::new(0, 0),
        };
        assert!(cli.run().is_err());
    }
}
