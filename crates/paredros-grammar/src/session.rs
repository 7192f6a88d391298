use crate::{
    atn::Atn,
    error::Error,
    grammar::{Grammar, Rule},
    interpreter::Interpreter,
    lexer::{Lexer, Token},
};
use paredros_core::{Config, DecisionPoint, Explorer, Step, StepSummary};
use std::{path::Path, rc::Rc};
use tracing::info;

/// A grammar ready for debugging, plus the most recent parse made with it.
#[derive(Debug)]
pub struct DebugSession {
    grammar: Grammar,
    atn: Rc<Atn>,
    lexer: Lexer,
    config: Config,
    tokens: Vec<Token>,
    explorer: Option<Explorer>,
}

impl DebugSession {
    pub fn new(grammar: Grammar, config: Config) -> Result<Self, Error> {
        let atn = Atn::build(&grammar)?;
        let lexer = Lexer::new(&grammar, atn.vocabulary())?;
        Ok(Self {
            grammar,
            atn: Rc::new(atn),
            lexer,
            config,
            tokens: Vec::new(),
            explorer: None,
        })
    }

    pub fn from_file(path: impl AsRef<Path>, config: Config) -> Result<Self, Error> {
        Self::new(Grammar::from_file(path)?, config)
    }

    pub fn from_source(source: &str, config: Config) -> Result<Self, Error> {
        Self::new(Grammar::parse(source)?, config)
    }

    /// Lexes and interprets `input`, replacing any previous parse.
    ///
    /// Parse errors do not fail this call; they end the recorded traversal
    /// with an error step (see [`DebugSession::has_error`]).
    pub fn parse(&mut self, input: &str) -> Result<(), Error> {
        self.explorer = None;
        self.tokens = self.lexer.tokenize(input);

        let mut traversal = Interpreter::new(&self.atn, &self.tokens, &self.config).run()?;
        traversal.simplify(&self.config.merge)?;
        let has_error = traversal.iter().any(|step| step.is_error_node);
        info!(
            grammar = %self.grammar.name,
            tokens = self.tokens.len(),
            steps = traversal.len(),
            has_error,
            "parsed input"
        );

        let oracle = Box::new(Rc::clone(&self.atn));
        self.explorer = Some(Explorer::new(traversal, oracle));
        Ok(())
    }

    pub fn explorer(&self) -> Result<&Explorer, Error> {
        self.explorer.as_ref().ok_or(Error::NotParsed)
    }

    pub fn explorer_mut(&mut self) -> Result<&mut Explorer, Error> {
        self.explorer.as_mut().ok_or(Error::NotParsed)
    }

    pub fn step_forward(&mut self) -> Result<(), Error> {
        Ok(self.explorer_mut()?.step_forward()?)
    }

    pub fn step_forward_by(&mut self, count: usize) -> Result<(), Error> {
        Ok(self.explorer_mut()?.step_forward_by(count)?)
    }

    pub fn go_back_one_step(&mut self) -> Result<(), Error> {
        Ok(self.explorer_mut()?.go_back_one_step()?)
    }

    pub fn reset_to_step_id(&mut self, step_id: usize) -> Result<(), Error> {
        Ok(self.explorer_mut()?.reset_to_step_id(step_id)?)
    }

    pub fn step_until_next_decision(&mut self) -> Result<(), Error> {
        Ok(self.explorer_mut()?.step_until_next_decision()?)
    }

    pub fn step_back_until_previous_decision(&mut self) -> Result<(), Error> {
        Ok(self.explorer_mut()?.step_back_until_previous_decision()?)
    }

    pub fn expand_alternatives(&mut self) -> Result<usize, Error> {
        Ok(self.explorer_mut()?.expand_alternatives()?)
    }

    pub fn choose_alternative(&mut self, k: usize) -> Result<(), Error> {
        Ok(self.explorer_mut()?.choose_alternative(k)?)
    }

    pub fn cancel_alt_expansion(&mut self) -> Result<(), Error> {
        self.explorer_mut()?.cancel_alt_expansion();
        Ok(())
    }

    pub fn tree_json(&self, verbose: bool) -> Result<String, Error> {
        Ok(self.explorer()?.to_json(verbose)?)
    }

    pub fn current_step(&self) -> Result<Option<&Step>, Error> {
        Ok(self.explorer()?.current_step())
    }

    pub fn decision_points(&self) -> Result<Vec<DecisionPoint>, Error> {
        Ok(self.explorer()?.decision_points())
    }

    /// The simplified main path.
    pub fn trace(&self) -> Result<Vec<StepSummary>, Error> {
        Ok(self
            .explorer()?
            .traversal()
            .iter()
            .map(StepSummary::from)
            .collect())
    }

    pub fn has_error(&self) -> bool {
        self.explorer
            .as_ref()
            .is_some_and(|explorer| explorer.traversal().iter().any(|step| step.is_error_node))
    }

    pub fn rule_text(&self, name: &str) -> Option<&str> {
        self.grammar.rule(name).map(|rule| rule.text.as_str())
    }

    /// The grammar rule the cursor is in.
    pub fn current_rule(&self) -> Option<&Rule> {
        let step = self.explorer.as_ref()?.current_step()?;
        self.grammar.rule(&step.rule_name)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn atn(&self) -> &Atn {
        &self.atn
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
