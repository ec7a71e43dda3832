use thiserror::Error;

use crate::pattern::Pattern;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Capture groups, and repetitions other than `0..=1`, have no instruction encoding.
    #[error("unsupported pattern: {0:?}")]
    UnsupportedPattern(Pattern),
}
