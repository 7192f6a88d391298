use crate::step::{StateId, StepId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("State {0} does not exist in the state network")]
    UnknownState(StateId),
    #[error("Rule `{0}` does not exist in the grammar")]
    UnknownRule(String),
}

/// Mistakes made while driving the explorer. These leave the explorer unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavigationError {
    #[error("Cannot step beyond end of input.")]
    EndOfInput,
    #[error("Already at step 0; cannot go back further.")]
    AtStart,
    #[error("Step ID={id} is out of range (last step is {last})")]
    StepOutOfRange { id: usize, last: usize },
    #[error("Invalid alternative index {index}, there are {available} alternatives")]
    InvalidAlternative { index: usize, available: usize },
    #[error("Not in alternative expansion mode")]
    NotExpanding,
    #[error("No parse step at ID={0}")]
    NoStep(usize),
    #[error("Step {0} has an open decision but no alternatives to explore")]
    NoAlternatives(StepId),
}

/// The interpreter or the oracle broke a contract. Not recoverable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("Step {step} chose transition {index} but only {available} exist")]
    ChosenIndexOutOfRange {
        step: StepId,
        index: usize,
        available: usize,
    },
    #[error("Merged step {step} lost the transition chosen by its last member")]
    MergedChoiceLost { step: StepId },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
}

impl From<OracleError> for Error {
    fn from(err: OracleError) -> Self {
        Error::Integration(IntegrationError::Oracle(err))
    }
}

impl Error {
    pub fn is_navigation(&self) -> bool {
        matches!(self, Error::Navigation(_))
    }
}
