use colored::*;
use itertools::Itertools;
use miette::IntoDiagnostic;
use paredros_core::{SerializedNode, Step, TraceInfo};
use paredros_grammar::{DebugSession, Error};
use rustyline::{
    At, Cmd, CompletionType, Config, EditMode, Editor, Helper, KeyCode, KeyEvent, Modifiers,
    Movement, Word,
    completion::Completer,
    error::ReadlineError,
    highlight::{CmdKind, Highlighter},
    hint::Hinter,
    validate::{ValidationContext, ValidationResult, Validator},
};
use std::{borrow::Cow, cmp::max, fmt};
use strum::IntoEnumIterator;

#[derive(Debug, Clone, strum::EnumIter)]
pub enum Command {
    Alternatives,
    Back,
    Cancel,
    Choose(usize),
    Decisions,
    Error(String),
    Goto(usize),
    Help,
    Info,
    Next,
    Prev,
    Quit,
    Rule,
    Step(Option<usize>),
    Tree(bool),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Alternatives => write!(f, "alternatives"),
            Command::Back => write!(f, "back"),
            Command::Cancel => write!(f, "cancel"),
            Command::Choose(_) => write!(f, "choose <k>"),
            Command::Decisions => write!(f, "decisions"),
            Command::Error(e) => write!(f, "error {}", e),
            Command::Goto(_) => write!(f, "goto <id>"),
            Command::Help => write!(f, "help"),
            Command::Info => write!(f, "info"),
            Command::Next => write!(f, "next"),
            Command::Prev => write!(f, "prev"),
            Command::Quit => write!(f, "quit"),
            Command::Rule => write!(f, "rule"),
            Command::Step(_) => write!(f, "step [n]"),
            Command::Tree(_) => write!(f, "tree [verbose]"),
        }
    }
}

impl Command {
    pub fn help(&self) -> String {
        match self {
            Command::Alternatives => "Show the alternatives of the current decision".to_string(),
            Command::Back => "Go back one step".to_string(),
            Command::Cancel => "Leave alternative selection".to_string(),
            Command::Choose(_) => "Follow alternative k instead of the recorded one".to_string(),
            Command::Decisions => "List the decisions made by the parser".to_string(),
            Command::Error(_) => "".to_string(),
            Command::Goto(_) => "Jump to the given step".to_string(),
            Command::Help => "Print command help".to_string(),
            Command::Info => "Print the current step".to_string(),
            Command::Next => "Run to the next decision".to_string(),
            Command::Prev => "Go back to the previous decision".to_string(),
            Command::Quit => "Quit the debugger".to_string(),
            Command::Rule => "Print the grammar rule of the current step".to_string(),
            Command::Step(_) => "Step forward n steps (default 1)".to_string(),
            Command::Tree(_) => "Print the parse tree built so far".to_string(),
        }
    }
}

impl From<String> for Command {
    fn from(s: String) -> Self {
        match s
            .as_str()
            .split_whitespace()
            .collect::<Vec<&str>>()
            .as_slice()
        {
            ["alternatives"] | ["a"] => Command::Alternatives,
            ["back"] | ["b"] => Command::Back,
            ["cancel"] => Command::Cancel,
            ["choose", k] | ["c", k] => match k.parse() {
                Ok(k) => Command::Choose(k),
                Err(_) => Command::Error(format!("Invalid alternative: {}", k)),
            },
            ["choose"] | ["c"] => Command::Error("No alternative provided for choose".to_string()),
            ["decisions"] | ["d"] => Command::Decisions,
            ["goto", id] | ["g", id] => match id.parse() {
                Ok(id) => Command::Goto(id),
                Err(_) => Command::Error(format!("Invalid step id: {}", id)),
            },
            ["goto"] | ["g"] => Command::Error("No step id provided for goto".to_string()),
            ["help"] | ["h"] => Command::Help,
            ["info"] | ["i"] => Command::Info,
            ["next"] | ["n"] => Command::Next,
            ["prev"] | ["p"] => Command::Prev,
            ["quit"] | ["q"] | ["exit"] => Command::Quit,
            ["rule"] | ["r"] => Command::Rule,
            ["step"] | ["s"] => Command::Step(None),
            ["step", n] | ["s", n] => match n.parse() {
                Ok(n) => Command::Step(Some(n)),
                Err(_) => Command::Error(format!("Invalid step count: {}", n)),
            },
            ["tree"] | ["t"] => Command::Tree(false),
            ["tree", "verbose"] | ["t", "verbose"] | ["tree", "v"] | ["t", "v"] => {
                Command::Tree(true)
            }
            _ => Command::Error(format!(
                "Unknown command: {}. Type 'help' to list commands.",
                s.trim()
            )),
        }
    }
}

/// Interactive stepping over a parsed [`DebugSession`].
#[derive(Debug)]
pub struct Debugger {
    session: DebugSession,
}

impl Debugger {
    pub fn new(session: DebugSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &DebugSession {
        &self.session
    }

    pub fn run(&mut self) -> miette::Result<()> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .color_mode(rustyline::ColorMode::Enabled)
            .build();
        let mut editor = Editor::with_config(config).into_diagnostic()?;

        editor.set_helper(Some(DebuggerLineHelper));
        editor.bind_sequence(
            KeyEvent(KeyCode::Left, Modifiers::CTRL),
            Cmd::Move(Movement::BackwardWord(1, Word::Big)),
        );
        editor.bind_sequence(
            KeyEvent(KeyCode::Right, Modifiers::CTRL),
            Cmd::Move(Movement::ForwardWord(1, At::AfterEnd, Word::Big)),
        );

        if self.session.has_error() {
            println!("{}", "The parse ended with an error.".red());
        }
        println!("{}", self.execute(Command::Info).unwrap_or_default());

        loop {
            let readline = match editor.readline("(paredros) ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e).into_diagnostic(),
            };

            if readline.trim().is_empty() {
                continue;
            }
            editor
                .add_history_entry(readline.as_str())
                .into_diagnostic()?;

            match Command::from(readline) {
                Command::Quit => break,
                Command::Error(e) => eprintln!("{}", e),
                command => match self.execute(command) {
                    Ok(output) if output.is_empty() => {}
                    Ok(output) => println!("{}", output),
                    Err(e) if e.is_navigation() => eprintln!("{}", e.to_string().red()),
                    Err(e) => eprintln!("{:?}", miette::Report::new(e)),
                },
            }
        }

        Ok(())
    }

    /// Runs one command and returns what it prints.
    pub fn execute(&mut self, command: Command) -> Result<String, Error> {
        match command {
            Command::Step(count) => {
                self.session.step_forward_by(count.unwrap_or(1))?;
                self.position()
            }
            Command::Back => {
                self.session.go_back_one_step()?;
                self.position()
            }
            Command::Goto(id) => {
                self.session.reset_to_step_id(id)?;
                self.position()
            }
            Command::Next => {
                self.session.step_until_next_decision()?;
                self.position()
            }
            Command::Prev => {
                self.session.step_back_until_previous_decision()?;
                self.position()
            }
            Command::Alternatives => {
                if !self.session.explorer()?.in_alternative_expansion_mode() {
                    self.session.expand_alternatives()?;
                }
                self.candidates()
            }
            Command::Choose(k) => {
                self.session.choose_alternative(k)?;
                self.position()
            }
            Command::Cancel => {
                self.session.cancel_alt_expansion()?;
                self.position()
            }
            Command::Info => self.position(),
            Command::Tree(verbose) => Ok(self
                .session
                .explorer()?
                .to_serialized(verbose)
                .map(|root| render_tree(&root, verbose))
                .unwrap_or_else(|| "(empty tree)".dimmed().to_string())),
            Command::Decisions => {
                let current = self.session.explorer()?.current_step_id();
                Ok(self
                    .session
                    .decision_points()?
                    .iter()
                    .map(|point| {
                        let id = format!("{:>5}", point.step_id.to_string());
                        let id = if point.step_id.main_index() == Some(current) {
                            format!("=>{}", id.yellow().bold())
                        } else {
                            format!("  {}", id.blue())
                        };
                        format!(
                            "{} {} in {} at {}",
                            id,
                            point.step_type,
                            point.rule_name.bright_green(),
                            point.token
                        )
                    })
                    .join("\n"))
            }
            Command::Rule => Ok(match self.session.current_rule() {
                Some(rule) => {
                    let lines = rule.text.lines().map(str::to_string).collect::<Vec<_>>();
                    print_source_code(rule.start_line as usize, lines)
                }
                None => "No grammar rule for the current step".to_string(),
            }),
            Command::Help => Ok(Command::iter()
                .filter(|c| !matches!(c, Command::Error(_)))
                .map(|c| format!("{:<16}{}", c.to_string(), c.help()))
                .join("\n")),
            Command::Quit | Command::Error(_) => Ok(String::new()),
        }
    }

    fn position(&self) -> Result<String, Error> {
        let explorer = self.session.explorer()?;
        let mut output = match explorer.current_step() {
            Some(step) => describe_step(step),
            None => format!("step {}", explorer.current_step_id()),
        };

        output.push_str(&format!(
            "\n{}",
            format!(
                "step {} of {}",
                explorer.current_step_id(),
                explorer.last_step_id()
            )
            .dimmed()
        ));
        if explorer.in_alternative_expansion_mode() {
            output.push_str(&format!(
                "\n{}",
                "choosing an alternative: use 'choose <k>' or 'cancel'".yellow()
            ));
        }
        Ok(output)
    }

    fn candidates(&self) -> Result<String, Error> {
        Ok(self
            .session
            .explorer()?
            .candidates()
            .iter()
            .enumerate()
            .map(|(i, step)| {
                format!(
                    "{:>4}: {} {} at {}",
                    (i + 1).to_string().bright_magenta(),
                    step.node_type,
                    step.rule_name.bright_green(),
                    step.current_token_repr
                )
            })
            .join("\n"))
    }
}

fn describe_step(step: &Step) -> String {
    let mut lines = vec![format!(
        "{} {} in {} (state {})",
        format!("[{}]", step.id).yellow().bold(),
        if step.is_error_node {
            step.node_type.to_string().red().bold()
        } else {
            step.node_type.to_string().bright_blue()
        },
        step.rule_name.bright_green(),
        step.state
    )];

    lines.push(format!("  token:     {}", step.current_token_repr));
    if !step.lookahead.is_empty() {
        lines.push(format!("  lookahead: {}", step.lookahead.join(" ")));
    }
    lines.push(format!("  input:     {}", step.input_text));

    if !step.possible_transitions.is_empty() {
        lines.push("  transitions:".to_string());
        lines.extend(
            step.possible_transitions
                .iter()
                .enumerate()
                .map(|(i, transition)| {
                    let marker = if step.chosen_transition_index == Some(i + 1) {
                        "=>".yellow().bold().to_string()
                    } else {
                        "  ".to_string()
                    };
                    format!(
                        "  {}{:>2}: {} -> {}",
                        marker,
                        i + 1,
                        transition.label,
                        transition.target
                    )
                }),
        );
    }

    lines.join("\n")
}

fn render_tree(root: &SerializedNode, verbose: bool) -> String {
    let mut lines = Vec::new();
    render_node(root, 0, verbose, &mut lines);
    lines.join("\n")
}

fn render_node(node: &SerializedNode, depth: usize, verbose: bool, lines: &mut Vec<String>) {
    let label = match (&node.rule_name, &node.token) {
        (Some(rule), _) => rule.bright_green().to_string(),
        (None, Some(token)) => token.clone(),
        (None, None) => node.node_type.to_string(),
    };
    let steps = match &node.trace_info {
        TraceInfo::Steps(steps) if verbose => format!(
            " {}",
            format!(
                "[{}]",
                steps.iter().map(|step| step.step_id.to_string()).join(", ")
            )
            .dimmed()
        ),
        _ => String::new(),
    };

    lines.push(format!("{}{}{}", "  ".repeat(depth), label, steps));
    for child in &node.children {
        render_node(child, depth + 1, verbose, lines);
    }
}

fn print_source_code(start_line: usize, lines: Vec<String>) -> String {
    let line_number_width = max((start_line + lines.len()).to_string().len(), 4);
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            format!(
                "{:>line_number_width$}| {}",
                (start_line + i).to_string().blue(),
                line
            )
        })
        .join("\n")
}

/// Highlight debugger commands and numbers
fn highlight_syntax(line: &str) -> Cow<'_, str> {
    let mut result = line.to_string();

    let commands_pattern = r"^(step|s|back|b|goto|g|next|n|prev|p|alternatives|a|choose|c|cancel|info|i|tree|t|decisions|d|rule|r|help|h|quit|q|exit)\b";
    if let Ok(re) = regex_lite::Regex::new(commands_pattern) {
        result = re
            .replace_all(&result, |caps: &regex_lite::Captures| {
                caps[0].bright_green().to_string()
            })
            .to_string();
    }

    if let Ok(re) = regex_lite::Regex::new(r"\b(verbose|v)\b") {
        result = re
            .replace_all(&result, |caps: &regex_lite::Captures| {
                caps[0].bright_blue().to_string()
            })
            .to_string();
    }

    if let Ok(re) = regex_lite::Regex::new(r"\b\d+\b") {
        result = re
            .replace_all(&result, |caps: &regex_lite::Captures| {
                caps[0].bright_magenta().to_string()
            })
            .to_string();
    }

    Cow::Owned(result)
}

pub struct DebuggerLineHelper;

impl Hinter for DebuggerLineHelper {
    type Hint = String;
}

impl Helper for DebuggerLineHelper {}
impl Completer for DebuggerLineHelper {
    type Candidate = String;
}

impl Highlighter for DebuggerLineHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        _default: bool,
    ) -> Cow<'b, str> {
        prompt.cyan().to_string().into()
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }

    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        highlight_syntax(line)
    }
}

impl Validator for DebuggerLineHelper {
    fn validate(&self, _ctx: &mut ValidationContext<'_>) -> Result<ValidationResult, ReadlineError> {
        // Every command fits on one line.
        Ok(ValidationResult::Valid(None))
    }

    fn validate_while_typing(&self) -> bool {
        false
    }
}
