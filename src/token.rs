use std::borrow::Cow;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::marker::PhantomData;

use crate::engine::{Dispatch, Engine, Keyer, Matcher};

/// A value with named, string-valued attributes.
pub trait Token {
    fn attribute(&self, label: &str) -> Cow<'_, str>;
}

/// A bare string is its own text; the label is ignored.
impl Token for str {
    fn attribute(&self, _label: &str) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl Token for String {
    fn attribute(&self, label: &str) -> Cow<'_, str> {
        self.as_str().attribute(label)
    }
}

/// Missing attributes read as the empty string.
impl<S: BuildHasher> Token for HashMap<String, String, S> {
    fn attribute(&self, label: &str) -> Cow<'_, str> {
        Cow::Borrowed(self.get(label).map_or("", String::as_str))
    }
}

impl<T: Token + ?Sized> Token for &T {
    fn attribute(&self, label: &str) -> Cow<'_, str> {
        (**self).attribute(label)
    }
}

/// Comparison operator of a label condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Equal,
    NotEqual,
    HasPrefix,
    /// Declared by the condition language, but not implemented. Evaluating it panics.
    MatchesRegex,
}

/// Compares one attribute of a token against a literal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LabelMatcher {
    pub label: String,
    pub op: Op,
    pub input: String,
}

impl<T: Token + ?Sized> Matcher<T> for LabelMatcher {
    fn matches(&self, token: &T) -> bool {
        let value = token.attribute(&self.label);
        match self.op {
            Op::Equal => *value == *self.input,
            Op::NotEqual => *value != *self.input,
            Op::HasPrefix => value.starts_with(self.input.as_str()),
            Op::MatchesRegex => unimplemented!("regular expression conditions"),
        }
    }
}

/// Keys tokens by the value of one attribute.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LabelKeyer {
    pub label: String,
}

impl<T: Token + ?Sized> Keyer<T> for LabelKeyer {
    type Key = String;

    fn key(&self, token: &T) -> String {
        token.attribute(&self.label).into_owned()
    }
}

/// An engine over [`Token`]s, tested by label conditions.
#[derive(derivative::Derivative)]
#[derivative(Debug(bound = ""), Default(bound = ""), Clone(bound = ""), Copy(bound = ""))]
pub struct Tokens<T: ?Sized>(PhantomData<fn(&T)>);

impl<T: Token + ?Sized> Engine for Tokens<T> {
    type Value = T;
    type Matcher = LabelMatcher;
    type Key = String;
    type Keyer = LabelKeyer;
}

impl<T: Token + ?Sized> Dispatch for Tokens<T> {
    fn dispatch(matcher: &LabelMatcher) -> Option<(LabelKeyer, String)> {
        match matcher.op {
            Op::Equal => Some((
                LabelKeyer {
                    label: matcher.label.clone(),
                },
                matcher.input.clone(),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(op: Op, input: &str) -> LabelMatcher {
        LabelMatcher {
            label: "text".to_owned(),
            op,
            input: input.to_owned(),
        }
    }

    #[test]
    fn operators() {
        assert!(matcher(Op::Equal, "foo").matches("foo"));
        assert!(!matcher(Op::Equal, "foo").matches("food"));
        assert!(matcher(Op::NotEqual, "foo").matches("food"));
        assert!(!matcher(Op::NotEqual, "foo").matches("foo"));
        assert!(matcher(Op::HasPrefix, "fo").matches("foo"));
        assert!(!matcher(Op::HasPrefix, "oo").matches("foo"));
    }

    #[test]
    #[should_panic(expected = "regular expression")]
    fn regex_is_unimplemented() {
        matcher(Op::MatchesRegex, "f.*").matches("foo");
    }

    #[test]
    fn attribute_maps() {
        let token: HashMap<String, String> = [("pos", "noun"), ("text", "dog")]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let pos = LabelMatcher {
            label: "pos".to_owned(),
            op: Op::Equal,
            input: "noun".to_owned(),
        };
        assert!(pos.matches(&token));
        assert_eq!(
            LabelKeyer {
                label: "text".to_owned()
            }
            .key(&token),
            "dog"
        );
        assert_eq!(token.attribute("lemma"), "");
    }

    #[test]
    fn only_equality_dispatches() {
        assert_eq!(
            Tokens::<str>::dispatch(&matcher(Op::Equal, "foo")),
            Some((
                LabelKeyer {
                    label: "text".to_owned()
                },
                "foo".to_owned()
            ))
        );
        assert_eq!(Tokens::<str>::dispatch(&matcher(Op::HasPrefix, "foo")), None);
    }
}
