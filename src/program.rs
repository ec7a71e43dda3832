use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::slice;
use std::sync::Arc;

use crate::engine::{Atoms, Engine, Equals, Identity, Keyer, Matcher};

/// A single instruction, and through its continuations, a whole program.
///
/// Continuations are reference counted, so a subgraph may be shared by any number of parents.
/// Equality is structural, comparing each pair of shared subgraphs once. Hashing only looks at
/// the instruction itself and not at its continuations.
#[derive(derivative::Derivative)]
#[derivative(
    Debug(bound = "E::Matcher: fmt::Debug, E::Keyer: fmt::Debug, E::Key: fmt::Debug, R: fmt::Debug")
)]
#[derivative(Clone(bound = "E::Matcher: Clone, E::Keyer: Clone, E::Key: Clone, R: Clone"))]
pub enum Instr<E: Engine, R> {
    /// Kills the thread.
    End,
    /// Yields a result at the current position.
    Accept(R),
    /// Forks into several threads at the current position. Earlier branches have priority.
    ///
    /// Always holds at least two branches when built through [`Instr::split`].
    Split(Vec<Arc<Instr<E, R>>>),
    /// Consumes a value if the matcher accepts it.
    Match(E::Matcher, Arc<Instr<E, R>>),
    /// Tests a value without consuming it.
    Peek(E::Matcher, Arc<Instr<E, R>>),
    /// Consumes any value.
    Skip(Arc<Instr<E, R>>),
    /// Continues only at the end of the input.
    AtEnd(Arc<Instr<E, R>>),
    /// Continues at the instruction registered for the value's key, without consuming it.
    Lookup(E::Keyer, HashMap<E::Key, Arc<Instr<E, R>>>),
}

/// The outcome of evaluating one instruction against one value.
pub enum Effect<'a, E: Engine, R> {
    /// Evaluate these instructions against the same value.
    Current(&'a [Arc<Instr<E, R>>]),
    /// The value was consumed; evaluate these instructions against the next one.
    Next(&'a [Arc<Instr<E, R>>]),
    /// A result was produced.
    Yield(&'a R),
    /// The thread is dead.
    Dead,
}

/// A result, along with the number of values consumed to reach it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchResult<R> {
    pub result: R,
    pub length: usize,
}

impl<E: Engine, R> Instr<E, R> {
    pub fn accept(result: R) -> Self {
        Instr::Accept(result)
    }

    /// Builds a [`Split`](Instr::Split), normalizing zero branches to [`End`](Instr::End) and
    /// a single branch to that branch.
    pub fn split<I>(branches: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Arc<Self>>,
        Self: Clone,
    {
        let mut branches = branches.into_iter().map(Into::into).collect::<Vec<_>>();
        match branches.len() {
            0 => Instr::End,
            1 => branches.pop().map_or(Instr::End, Arc::unwrap_or_clone),
            _ => Instr::Split(branches),
        }
    }

    pub fn matching(matcher: E::Matcher, next: impl Into<Arc<Self>>) -> Self {
        Instr::Match(matcher, next.into())
    }

    pub fn peek(matcher: E::Matcher, next: impl Into<Arc<Self>>) -> Self {
        Instr::Peek(matcher, next.into())
    }

    pub fn skip(next: impl Into<Arc<Self>>) -> Self {
        Instr::Skip(next.into())
    }

    pub fn at_end(next: impl Into<Arc<Self>>) -> Self {
        Instr::AtEnd(next.into())
    }

    pub fn lookup<I, N>(keyer: E::Keyer, table: I) -> Self
    where
        I: IntoIterator<Item = (E::Key, N)>,
        N: Into<Arc<Self>>,
    {
        Instr::Lookup(
            keyer,
            table
                .into_iter()
                .map(|(key, next)| (key, next.into()))
                .collect(),
        )
    }

    /// Evaluates this instruction against `value`, which is `None` at the end of the input.
    pub fn evaluate(&self, value: Option<&E::Value>) -> Effect<'_, E, R> {
        match (self, value) {
            (Instr::End, _) => Effect::Dead,
            (Instr::Accept(result), _) => Effect::Yield(result),
            (Instr::Split(branches), _) => Effect::Current(branches),
            (Instr::Match(matcher, next), Some(value)) if matcher.matches(value) => {
                Effect::Next(slice::from_ref(next))
            }
            (Instr::Peek(matcher, next), Some(value)) if matcher.matches(value) => {
                Effect::Current(slice::from_ref(next))
            }
            (Instr::Skip(next), Some(_)) => Effect::Next(slice::from_ref(next)),
            (Instr::AtEnd(next), None) => Effect::Current(slice::from_ref(next)),
            (Instr::Lookup(keyer, table), Some(value)) => table
                .get(&keyer.key(value))
                .map_or(Effect::Dead, |next| Effect::Current(slice::from_ref(next))),
            _ => Effect::Dead,
        }
    }

    /// Executes the program against `input`.
    ///
    /// All threads advance in lockstep, one value at a time, so each value is read once and the
    /// input is never buffered. Results are reported in thread priority order within each
    /// position, and positions in increasing order.
    ///
    /// If `greedy` is `false`, returns only the results found at the first position that has any.
    /// Otherwise returns the results found at every position.
    ///
    /// Threads are not deduplicated, so a result reached along several paths is reported once per
    /// path. A sequence of `n` optional tokens reports a match of `k` tokens `n` choose `k` times.
    /// [`merge`](crate::merge) collapses equal paths.
    pub fn exec<'a, I>(&'a self, input: I, greedy: bool) -> Vec<MatchResult<R>>
    where
        I: IntoIterator,
        I::Item: Borrow<E::Value>,
        R: Clone,
    {
        let mut input = input.into_iter();

        let mut curr: Vec<&'a Self> = vec![self];
        let mut next: Vec<&'a Self> = Vec::new();

        let mut matches = Vec::new();
        let mut length = 0;

        loop {
            // `None` marks the end of the input, and is evaluated like any other value
            let token = input.next();
            let value: Option<&E::Value> = token
                .as_ref()
                .map(|token| <I::Item as Borrow<E::Value>>::borrow(token));

            // `curr` grows while it is walked; zero-width effects must be seen at this position
            let mut i = 0;
            while i < curr.len() {
                let instr = curr[i];
                match instr.evaluate(value) {
                    Effect::Current(instrs) => curr.extend(instrs.iter().map(|instr| &**instr)),
                    Effect::Next(instrs) => next.extend(instrs.iter().map(|instr| &**instr)),
                    Effect::Yield(result) => matches.push(MatchResult {
                        result: result.clone(),
                        length,
                    }),
                    Effect::Dead => {}
                }
                i += 1;
            }

            if !greedy && !matches.is_empty() {
                return matches;
            }
            if value.is_none() || next.is_empty() {
                return matches;
            }

            // `next` becomes the list of active threads, and `curr` is emptied to hold the
            // following position
            mem::swap(&mut curr, &mut next);
            next.clear();
            length += 1;
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result
    where
        E::Matcher: fmt::Debug,
        E::Keyer: fmt::Debug,
        E::Key: fmt::Debug,
        R: fmt::Debug,
    {
        let indent = depth * 2;
        write!(f, "{:indent$}", "")?;
        match self {
            Instr::End => writeln!(f, "end"),
            Instr::Accept(result) => writeln!(f, "accept {result:?}"),
            Instr::Split(branches) => {
                writeln!(f, "split")?;
                branches
                    .iter()
                    .try_for_each(|branch| branch.write_tree(f, depth + 1))
            }
            Instr::Match(matcher, next) => {
                writeln!(f, "match {matcher:?}")?;
                next.write_tree(f, depth + 1)
            }
            Instr::Peek(matcher, next) => {
                writeln!(f, "peek {matcher:?}")?;
                next.write_tree(f, depth + 1)
            }
            Instr::Skip(next) => {
                writeln!(f, "skip")?;
                next.write_tree(f, depth + 1)
            }
            Instr::AtEnd(next) => {
                writeln!(f, "at_end")?;
                next.write_tree(f, depth + 1)
            }
            Instr::Lookup(keyer, table) => {
                writeln!(f, "lookup {keyer:?}")?;
                for (key, next) in table {
                    writeln!(f, "{:indent$}  {key:?} =>", "")?;
                    next.write_tree(f, depth + 2)?;
                }
                Ok(())
            }
        }
    }
}

impl<T: Hash + Eq + Clone, R> Instr<Atoms<T>, R> {
    /// Consumes a value equal to `expected`.
    pub fn atom(expected: T, next: impl Into<Arc<Self>>) -> Self {
        Instr::Match(Equals(expected), next.into())
    }

    /// Dispatches on the value itself.
    pub fn lookup_atoms<I, N>(table: I) -> Self
    where
        I: IntoIterator<Item = (T, N)>,
        N: Into<Arc<Self>>,
    {
        Instr::lookup(Identity, table)
    }
}

impl<E: Engine, R> fmt::Display for Instr<E, R>
where
    E::Matcher: fmt::Debug,
    E::Keyer: fmt::Debug,
    E::Key: fmt::Debug,
    R: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

impl<E: Engine, R> Instr<E, R>
where
    E::Matcher: PartialEq,
    E::Keyer: PartialEq,
    R: PartialEq,
{
    /// Compares two continuations. `equal` holds the pairs already found equal.
    fn next_eq(
        a: &Arc<Self>,
        b: &Arc<Self>,
        equal: &mut HashSet<(*const Self, *const Self)>,
    ) -> bool {
        let pair = (Arc::as_ptr(a), Arc::as_ptr(b));
        if Arc::ptr_eq(a, b) || equal.contains(&pair) {
            return true;
        }
        // any difference makes the whole comparison fail, so only equal pairs are remembered
        let eq = a.structural_eq(b, equal);
        if eq {
            equal.insert(pair);
        }
        eq
    }

    fn structural_eq(&self, other: &Self, equal: &mut HashSet<(*const Self, *const Self)>) -> bool {
        match (self, other) {
            (Instr::End, Instr::End) => true,
            (Instr::Accept(a), Instr::Accept(b)) => a == b,
            (Instr::Split(a), Instr::Split(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| Self::next_eq(a, b, equal))
            }
            (Instr::Match(m, a), Instr::Match(n, b)) | (Instr::Peek(m, a), Instr::Peek(n, b)) => {
                m == n && Self::next_eq(a, b, equal)
            }
            (Instr::Skip(a), Instr::Skip(b)) | (Instr::AtEnd(a), Instr::AtEnd(b)) => {
                Self::next_eq(a, b, equal)
            }
            (Instr::Lookup(k, a), Instr::Lookup(l, b)) => {
                k == l
                    && a.len() == b.len()
                    && a
                        .iter()
                        .all(|(key, a)| b.get(key).is_some_and(|b| Self::next_eq(a, b, equal)))
            }
            _ => false,
        }
    }
}

impl<E: Engine, R> PartialEq for Instr<E, R>
where
    E::Matcher: PartialEq,
    E::Keyer: PartialEq,
    R: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(other, &mut HashSet::new())
    }
}

impl<E: Engine, R> Eq for Instr<E, R>
where
    E::Matcher: Eq,
    E::Keyer: Eq,
    R: Eq,
{
}

impl<E: Engine, R> Hash for Instr<E, R>
where
    E::Matcher: Hash,
    E::Keyer: Hash,
    R: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Instr::End => {}
            Instr::Accept(result) => result.hash(state),
            Instr::Split(branches) => branches.len().hash(state),
            Instr::Match(matcher, _) | Instr::Peek(matcher, _) => matcher.hash(state),
            Instr::Skip(_) | Instr::AtEnd(_) => {}
            // table iteration order is unspecified, so entries are left out
            Instr::Lookup(keyer, table) => {
                keyer.hash(state);
                table.len().hash(state);
            }
        }
    }
}
