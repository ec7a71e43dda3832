use std::sync::Arc;

use crate::error::CompileError;
use crate::program::Instr;
use crate::token::{LabelMatcher, Op, Token, Tokens};

/// A pattern over a sequence of tokens.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Each pattern in turn.
    Sequence(Vec<Pattern>),
    /// Any one of the patterns. Earlier patterns have priority.
    Or(Vec<Pattern>),
    /// The pattern repeated between `min` and `max` times. Only `0..=1` can be compiled.
    Repetition {
        pattern: Box<Pattern>,
        min: usize,
        max: Option<usize>,
    },
    /// A single token, satisfying the condition if there is one.
    Token(Option<Condition>),
    /// A named group. Cannot be compiled.
    Capture { name: String, pattern: Box<Pattern> },
}

/// A condition on a single token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Label { label: String, op: Op, input: String },
}

impl Pattern {
    pub fn token(condition: Condition) -> Self {
        Pattern::Token(Some(condition))
    }

    /// Any single token.
    pub fn any() -> Self {
        Pattern::Token(None)
    }

    /// `self` followed by `other`.
    pub fn then(self, other: Pattern) -> Self {
        let mut patterns = match self {
            Pattern::Sequence(patterns) => patterns,
            pattern => vec![pattern],
        };
        match other {
            Pattern::Sequence(more) => patterns.extend(more),
            pattern => patterns.push(pattern),
        }
        Pattern::Sequence(patterns)
    }

    /// `self`, or else `other`.
    pub fn or(self, other: Pattern) -> Self {
        let mut patterns = match self {
            Pattern::Or(patterns) => patterns,
            pattern => vec![pattern],
        };
        match other {
            Pattern::Or(more) => patterns.extend(more),
            pattern => patterns.push(pattern),
        }
        Pattern::Or(patterns)
    }

    pub fn repeat(self, min: usize, max: Option<usize>) -> Self {
        Pattern::Repetition {
            pattern: Box::new(self),
            min,
            max,
        }
    }

    /// Zero or one occurrence, preferring one.
    pub fn opt(self) -> Self {
        self.repeat(0, Some(1))
    }

    pub fn capture(self, name: impl Into<String>) -> Self {
        Pattern::Capture {
            name: name.into(),
            pattern: Box::new(self),
        }
    }

    /// Compiles the pattern into a program yielding `result`. If `check_end` is set, the
    /// pattern must also consume the whole input.
    pub fn compile<T, R>(
        &self,
        result: R,
        check_end: bool,
    ) -> Result<Instr<Tokens<T>, R>, CompileError>
    where
        T: Token + ?Sized,
        R: Clone,
    {
        let mut next = Instr::accept(result);
        if check_end {
            next = Instr::at_end(next);
        }
        self.compile_next(&Arc::new(next)).map(Arc::unwrap_or_clone)
    }

    /// Compiles the pattern, continuing at `next` once it has matched.
    pub fn compile_next<T, R>(
        &self,
        next: &Arc<Instr<Tokens<T>, R>>,
    ) -> Result<Arc<Instr<Tokens<T>, R>>, CompileError>
    where
        T: Token + ?Sized,
        R: Clone,
    {
        match self {
            Pattern::Sequence(patterns) => patterns
                .iter()
                .rev()
                .try_fold(next.clone(), |next, pattern| pattern.compile_next(&next)),
            Pattern::Or(patterns) => {
                let branches = patterns
                    .iter()
                    .map(|pattern| pattern.compile_next(next))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(Instr::split(branches)))
            }
            Pattern::Repetition {
                pattern,
                min: 0,
                max: Some(1),
            } => {
                let once = pattern.compile_next(next)?;
                Ok(Arc::new(Instr::split([once, next.clone()])))
            }
            Pattern::Token(None) => Ok(Arc::new(Instr::skip(next.clone()))),
            // the token is consumed once, after the whole condition has been tested
            Pattern::Token(Some(condition)) => {
                Ok(condition.compile_next(&Arc::new(Instr::skip(next.clone()))))
            }
            Pattern::Repetition { .. } | Pattern::Capture { .. } => {
                Err(CompileError::UnsupportedPattern(self.clone()))
            }
        }
    }
}

impl Condition {
    pub fn label(label: impl Into<String>, op: Op, input: impl Into<String>) -> Self {
        Condition::Label {
            label: label.into(),
            op,
            input: input.into(),
        }
    }

    pub fn equal(label: impl Into<String>, input: impl Into<String>) -> Self {
        Condition::label(label, Op::Equal, input)
    }

    pub fn and(self, other: Condition) -> Self {
        let mut conditions = match self {
            Condition::And(conditions) => conditions,
            condition => vec![condition],
        };
        conditions.push(other);
        Condition::And(conditions)
    }

    pub fn or(self, other: Condition) -> Self {
        let mut conditions = match self {
            Condition::Or(conditions) => conditions,
            condition => vec![condition],
        };
        conditions.push(other);
        Condition::Or(conditions)
    }

    /// Compiles the condition into zero-width tests, continuing at `next` if it holds.
    pub fn compile_next<T, R>(&self, next: &Arc<Instr<Tokens<T>, R>>) -> Arc<Instr<Tokens<T>, R>>
    where
        T: Token + ?Sized,
        R: Clone,
    {
        match self {
            Condition::And(conditions) => conditions
                .iter()
                .rev()
                .fold(next.clone(), |next, condition| condition.compile_next(&next)),
            Condition::Or(conditions) => Arc::new(Instr::split(
                conditions
                    .iter()
                    .map(|condition| condition.compile_next(next))
                    .collect::<Vec<_>>(),
            )),
            Condition::Label { label, op, input } => Arc::new(Instr::peek(
                LabelMatcher {
                    label: label.clone(),
                    op: *op,
                    input: input.clone(),
                },
                next.clone(),
            )),
        }
    }
}
