//! `paredros-core` replays a recorded parse and lets you walk through it.
//!
//! A grammar interpreter reports [`ParseEvent`]s while it parses. The
//! [`TraversalBuilder`] turns them into a chain of [`Step`]s, each carrying the
//! transitions that were possible at that point and the one that was taken.
//! [`Traversal::simplify`] collapses runs of prediction steps, [`ParseTree`]
//! rebuilds the tree the parse produced, and the [`Explorer`] moves a cursor
//! over it, including down alternatives the parser never took.
//!
//! ## Examples
//!
//! ```rust
//! use paredros_core::{
//!     Explorer, MergeConfig, ParseContext, ParseEvent, Snapshot, StateId, StaticOracle,
//!     TokenInfo, Transition, TransitionLabel, TraversalBuilder,
//! };
//!
//! let oracle = StaticOracle::new()
//!     .with_state(0usize, [Transition::new(1usize, TransitionLabel::token("'1'"))])
//!     .with_state(1usize, [Transition::new(1usize, TransitionLabel::Exit)])
//!     .with_rule("start", 0usize);
//!
//! let at = |state: u32| ParseContext {
//!     state: StateId(state),
//!     rule_name: "start".to_string(),
//!     ..ParseContext::default()
//! };
//! let token = TokenInfo::new(0, Some("EINS"), "1");
//!
//! let mut builder = TraversalBuilder::new();
//! for (event, context) in [
//!     (ParseEvent::RuleEntry { rule: "start".into() }, at(0)),
//!     (ParseEvent::TokenConsume { token }, at(0)),
//!     (ParseEvent::RuleExit { rule: "start".into() }, at(1)),
//! ] {
//!     builder.record(&event, &Snapshot::new(&oracle, context)).unwrap();
//! }
//!
//! let mut traversal = builder.finish();
//! traversal.simplify(&MergeConfig::default()).unwrap();
//!
//! let mut explorer = Explorer::new(traversal, Box::new(oracle));
//! assert_eq!(explorer.current_step_id(), 2);
//! explorer.reset_to_step_id(0).unwrap();
//! assert!(explorer.step_forward().is_ok());
//! ```
mod arena;
mod config;
mod error;
mod explorer;
mod oracle;
mod output;
mod step;
mod traversal;
mod tree;

pub use arena::{Arena, ArenaId};
pub use config::{Config, MergeConfig};
pub use error::{Error, IntegrationError, NavigationError, OracleError};
pub use explorer::{Candidate, Explorer};
pub use oracle::{
    DecisionOracle, InterpreterContext, ParseContext, ParseEvent, Snapshot, StaticOracle,
};
pub use output::{DecisionPoint, SerializedNode, StepSummary, TraceInfo};
pub use step::{
    NodeType, StateId, Step, StepContext, StepId, StepRef, TokenInfo, Transition, TransitionLabel,
};
pub use traversal::merge::{MergeGroup, merged_ids};
pub use traversal::{Traversal, TraversalBuilder};
pub use tree::{NodeId, NodeKind, ParseTree, ParseTreeNode};
