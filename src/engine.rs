use std::hash::Hash;
use std::marker::PhantomData;

/// The [`Engine`] trait ties together the types an instruction graph operates on. Engines are
/// marker types; they are never constructed.
pub trait Engine {
    /// The type of value the engine classifies.
    type Value: ?Sized;
    /// The test for the [`Match`](crate::program::Instr::Match) and
    /// [`Peek`](crate::program::Instr::Peek) instructions.
    type Matcher: Matcher<Self::Value>;
    /// The key a [`Lookup`](crate::program::Instr::Lookup) table is indexed by.
    type Key: Hash + Eq;
    /// The classifier for the [`Lookup`](crate::program::Instr::Lookup) instruction.
    type Keyer: Keyer<Self::Value, Key = Self::Key>;
}

/// A pure test of a single value.
pub trait Matcher<V: ?Sized> {
    fn matches(&self, value: &V) -> bool;
}

/// A pure classification of a single value into a hashable key.
pub trait Keyer<V: ?Sized> {
    type Key;

    fn key(&self, value: &V) -> Self::Key;
}

/// Engines whose matchers can sometimes be replaced by a table lookup.
pub trait Dispatch: Engine {
    /// If `matcher` succeeds exactly when `keyer` classifies a value as `key`, returns that
    /// keyer and key. Matchers sharing a keyer are merged into a single lookup table by the
    /// [optimizer](crate::optimize::merge).
    fn dispatch(matcher: &Self::Matcher) -> Option<(Self::Keyer, Self::Key)>;
}

/// An engine over plain values, compared for equality.
#[derive(derivative::Derivative)]
#[derivative(Debug(bound = ""), Default(bound = ""), Clone(bound = ""), Copy(bound = ""))]
pub struct Atoms<T>(PhantomData<fn(&T)>);

impl<T: Hash + Eq + Clone> Engine for Atoms<T> {
    type Value = T;
    type Matcher = Equals<T>;
    type Key = T;
    type Keyer = Identity;
}

impl<T: Hash + Eq + Clone> Dispatch for Atoms<T> {
    fn dispatch(matcher: &Equals<T>) -> Option<(Identity, T)> {
        Some((Identity, matcher.0.clone()))
    }
}

/// Matches values equal to the expected one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Equals<T>(pub T);

impl<T: PartialEq> Matcher<T> for Equals<T> {
    fn matches(&self, value: &T) -> bool {
        self.0 == *value
    }
}

/// Keys every value by itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Identity;

impl<T: Clone> Keyer<T> for Identity {
    type Key = T;

    fn key(&self, value: &T) -> T {
        value.clone()
    }
}
