//! Merging of many programs into one.
//!
//! Programs compiled from separate patterns tend to start with the same equality tests. Running
//! them side by side as alternates tests every literal in turn. Merging them instead factors the
//! equality tests on each keyer into one [`Lookup`](Instr::Lookup) table, recursively, so that
//! programs sharing a prefix share the instructions for it, and dispatch on a literal costs one
//! hash lookup regardless of how many programs test it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::engine::{Dispatch, Engine};
use crate::program::Instr;

/// Merges `instructions` into a single program that yields the same results at the same
/// lengths as running each of them.
///
/// Structurally equal branches are kept once, so a result that two of the programs would both
/// yield at the same position is only yielded once. Subgraphs shared within the input are visited
/// once, and equal merged subgraphs are built once and shared in the output.
///
/// # Panics
///
/// Panics if any of the programs contains a [`Lookup`](Instr::Lookup) instruction.
pub fn merge<E, R, I>(instructions: I) -> Instr<E, R>
where
    E: Dispatch,
    E::Matcher: Clone + Hash + Eq,
    E::Keyer: Clone + Hash + Eq,
    E::Key: Clone,
    R: Clone + Hash + Eq,
    I: IntoIterator,
    I::Item: Into<Arc<Instr<E, R>>>,
{
    let mut merger = Merger::new();
    let merged = merger.merge(instructions.into_iter().map(Into::into).collect());
    drop(merger);
    Arc::unwrap_or_clone(merged)
}

/// An instruction with each continuation replaced by its id.
#[derive(PartialEq, Eq, Hash)]
enum Shape<M, R> {
    End,
    Accept(R),
    Split(Vec<usize>),
    Match(M, usize),
    Peek(M, usize),
    Skip(usize),
    AtEnd(usize),
}

/// State shared by the recursive merges of one [`merge`] call.
///
/// Every instruction reached gets an id, equal for structurally equal instructions, computed
/// once per `Arc`.
struct Merger<E: Engine, R> {
    /// Ids by address. Holding the `Arc` keeps the address from being reused.
    ids: HashMap<*const Instr<E, R>, (Arc<Instr<E, R>>, usize)>,
    shapes: HashMap<Shape<E::Matcher, R>, usize>,
    /// Merged programs, by the ids of their flattened branches.
    merged: HashMap<Vec<usize>, Arc<Instr<E, R>>>,
}

impl<E, R> Merger<E, R>
where
    E: Dispatch,
    E::Matcher: Clone + Hash + Eq,
    E::Keyer: Clone + Hash + Eq,
    E::Key: Clone,
    R: Clone + Hash + Eq,
{
    fn new() -> Self {
        Merger {
            ids: HashMap::new(),
            shapes: HashMap::new(),
            merged: HashMap::new(),
        }
    }

    fn merge(&mut self, instructions: Vec<Arc<Instr<E, R>>>) -> Arc<Instr<E, R>> {
        let mut flat = IndexMap::new();
        self.flatten(instructions, &mut flat);
        let key = flat.keys().copied().collect::<Vec<_>>();
        if let Some(merged) = self.merged.get(&key) {
            return merged.clone();
        }

        let mut tables: IndexMap<E::Keyer, IndexMap<E::Key, Vec<Arc<Instr<E, R>>>>> =
            IndexMap::new();
        let mut skips = Vec::new();
        let mut at_ends = Vec::new();
        let mut tests = Vec::new();
        let mut accepts = Vec::new();

        for instr in flat.into_values() {
            match &*instr {
                Instr::Accept(_) => accepts.push(instr.clone()),
                Instr::Match(matcher, next) => match E::dispatch(matcher) {
                    // the lookup doesn't consume, so the entry does
                    Some((keyer, key)) => tables
                        .entry(keyer)
                        .or_default()
                        .entry(key)
                        .or_default()
                        .push(Arc::new(Instr::Skip(next.clone()))),
                    None => {
                        let next = self.merge(vec![next.clone()]);
                        tests.push(Arc::new(Instr::Match(matcher.clone(), next)));
                    }
                },
                Instr::Peek(matcher, next) => match E::dispatch(matcher) {
                    Some((keyer, key)) => tables
                        .entry(keyer)
                        .or_default()
                        .entry(key)
                        .or_default()
                        .push(next.clone()),
                    None => {
                        let next = self.merge(vec![next.clone()]);
                        tests.push(Arc::new(Instr::Peek(matcher.clone(), next)));
                    }
                },
                Instr::Skip(next) => skips.push(next.clone()),
                Instr::AtEnd(next) => at_ends.push(next.clone()),
                // removed or rejected by `flatten`
                Instr::End | Instr::Split(_) | Instr::Lookup(..) => {}
            }
        }

        let mut branches = Vec::with_capacity(tables.len() + 2 + tests.len() + accepts.len());
        for (keyer, table) in tables {
            let table = table
                .into_iter()
                .map(|(key, nexts)| (key, self.merge(nexts)))
                .collect();
            branches.push(Arc::new(Instr::Lookup(keyer, table)));
        }
        if !skips.is_empty() {
            let next = self.merge(skips);
            branches.push(Arc::new(Instr::Skip(next)));
        }
        if !at_ends.is_empty() {
            let next = self.merge(at_ends);
            branches.push(Arc::new(Instr::AtEnd(next)));
        }
        branches.extend(tests);
        branches.extend(accepts);

        let merged = Arc::new(Instr::split(branches));
        self.merged.insert(key, merged.clone());
        merged
    }

    /// Inlines every [`Split`](Instr::Split) into `flat`, dropping dead ends and duplicates.
    fn flatten<I>(&mut self, instructions: I, flat: &mut IndexMap<usize, Arc<Instr<E, R>>>)
    where
        I: IntoIterator<Item = Arc<Instr<E, R>>>,
    {
        for instr in instructions {
            if let Instr::Split(branches) = &*instr {
                self.flatten(branches.iter().cloned(), flat);
            } else if !matches!(*instr, Instr::End) {
                let id = self.id(&instr);
                flat.entry(id).or_insert(instr);
            }
        }
    }

    fn id(&mut self, instr: &Arc<Instr<E, R>>) -> usize {
        if let Some(&(_, id)) = self.ids.get(&Arc::as_ptr(instr)) {
            return id;
        }
        let shape = match &**instr {
            Instr::End => Shape::End,
            Instr::Accept(result) => Shape::Accept(result.clone()),
            Instr::Split(branches) => {
                Shape::Split(branches.iter().map(|branch| self.id(branch)).collect())
            }
            Instr::Match(matcher, next) => Shape::Match(matcher.clone(), self.id(next)),
            Instr::Peek(matcher, next) => Shape::Peek(matcher.clone(), self.id(next)),
            Instr::Skip(next) => Shape::Skip(self.id(next)),
            Instr::AtEnd(next) => Shape::AtEnd(self.id(next)),
            Instr::Lookup(..) => panic!("cannot merge programs containing lookup instructions"),
        };
        let fresh = self.shapes.len();
        let id = *self.shapes.entry(shape).or_insert(fresh);
        self.ids.insert(Arc::as_ptr(instr), (instr.clone(), id));
        id
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::engine::{Atoms, Equals, Identity};

    type Atom = Instr<Atoms<char>, u32>;

    #[test]
    fn shares_prefixes() {
        let merged: Atom = merge([
            Atom::atom('a', Atom::atom('b', Instr::accept(1))),
            Atom::atom('a', Atom::atom('c', Instr::accept(2))),
        ]);
        let expected = Atom::lookup_atoms([(
            'a',
            Atom::skip(Atom::lookup_atoms([
                ('b', Atom::skip(Instr::accept(1))),
                ('c', Atom::skip(Instr::accept(2))),
            ])),
        )]);
        assert_eq!(merged, expected);
    }

    #[test]
    fn ordering() {
        let merged: Atom = merge([
            Atom::split([Instr::accept(9), Atom::at_end(Instr::accept(2))]),
            Atom::peek(Equals('x'), Instr::accept(3)),
            Atom::skip(Instr::accept(4)),
            Atom::atom('a', Instr::accept(5)),
            Atom::skip(Instr::accept(6)),
        ]);
        let expected = Atom::split([
            Atom::lookup_atoms([('x', Instr::accept(3)), ('a', Atom::skip(Instr::accept(5)))]),
            Atom::skip(Atom::split([Instr::accept(4), Instr::accept(6)])),
            Atom::at_end(Instr::accept(2)),
            Instr::accept(9),
        ]);
        assert_eq!(merged, expected);
    }

    #[test]
    fn collapses_duplicates_and_dead_ends() {
        let program = || Atom::atom('a', Instr::accept(1));
        let merged: Atom = merge([program(), Instr::End, program()]);
        assert_eq!(merged, Atom::lookup_atoms([('a', Atom::skip(Instr::accept(1)))]));
        let merged: Atom = merge(Vec::<Atom>::new());
        assert_eq!(merged, Instr::End);
        let merged: Atom = merge([Instr::End, Atom::split([Instr::End, Instr::End])]);
        assert_eq!(merged, Instr::End);
    }

    #[test]
    fn shares_equal_continuations() {
        let merged: Atom = merge([
            Atom::atom('a', Atom::atom('z', Instr::accept(1))),
            Atom::atom('b', Atom::atom('z', Instr::accept(1))),
        ]);
        let Instr::Lookup(_, table) = &merged else {
            panic!("expected a lookup:\n{merged}");
        };
        assert!(Arc::ptr_eq(&table[&'a'], &table[&'b']));
    }

    #[test]
    fn merges_shared_chains() {
        // each optional shares its continuation between both branches
        let chain = (0..40).fold(Arc::new(Atom::at_end(Instr::accept(1))), |next, _| {
            Arc::new(Atom::split([Arc::new(Atom::atom('a', next.clone())), next]))
        });
        let merged: Atom = merge([chain]);
        for n in [0, 1, 7, 40] {
            let input = vec!['a'; n];
            assert_eq!(merged.exec(input, true).len(), 1, "{n}");
        }
        assert!(merged.exec(vec!['a'; 41], true).is_empty());
    }

    #[test]
    #[should_panic(expected = "lookup")]
    fn rejects_lookups() {
        let _: Atom = merge([Instr::Lookup(Identity, Default::default()), Atom::accept(1)]);
    }
}
