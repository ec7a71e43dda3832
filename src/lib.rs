//! A Thompson-style virtual machine for matching sequences of arbitrary values.
//!
//! Programs are graphs of [`Instr`]uctions, generic over an [`Engine`] that decides what the
//! values are and how they are tested. [`Pattern`]s over [`Token`]s compile into programs, and
//! [`merge`] combines many programs into one that shares their common prefixes.

pub mod engine;
pub mod error;
pub mod optimize;
pub mod pattern;
pub mod program;
pub mod token;

pub use engine::{Atoms, Dispatch, Engine, Equals, Identity, Keyer, Matcher};
pub use error::CompileError;
pub use optimize::merge;
pub use pattern::{Condition, Pattern};
pub use program::{Effect, Instr, MatchResult};
pub use token::{LabelKeyer, LabelMatcher, Op, Token, Tokens};
