// SPDX-License-Identifier: MPL-2.0

//! An incompatibility is a set of terms for different subjects
//! that should never be satisfied all together.

use std::fmt::Display;
use std::sync::Arc;

use crate::internal::{Arena, HashArena, Id, SmallMap};
use crate::{
    term, DerivationTree, Derived, External, Map, Provider, Subject, Term, ValueSet,
};

/// An incompatibility is a set of terms for different subjects
/// that should never be satisfied all together.
/// An incompatibility usually originates from a requirement edge.
/// For example, if package A at version 1 requires package B
/// at version 2, you can never have both terms `A = 1`
/// and `not B = 2` satisfied at the same time in a partial solution.
/// This would mean that we found a solution with package A at version 1
/// but not with package B at version 2.
/// Yet A at version 1 requires B at version 2 so this is not possible.
/// Therefore, the set `{ A = 1, not B = 2 }` is an incompatibility,
/// defined from the requirements of A at version 1.
///
/// Incompatibilities can also be derived from two other incompatibilities
/// during conflict resolution. Well-formedness invariant: an
/// incompatibility never holds two terms on the same subject.
#[derive(Debug, Clone)]
pub(crate) struct Incompatibility<S: Subject, VS: ValueSet> {
    subject_terms: SmallMap<Id<S>, Term<VS>>,
    /// The reason for the incompatibility.
    pub(crate) cause: Cause<S, VS>,
}

/// Type alias of unique identifiers for incompatibilities.
pub(crate) type IncompId<S, VS> = Id<Incompatibility<S, VS>>;

pub(crate) type IncompDpId<DP> = IncompId<<DP as Provider>::S, <DP as Provider>::VS>;

/// The origin of an incompatibility: the closed set of provenances a
/// conflict explanation can be built from.
#[derive(Debug, Clone)]
pub(crate) enum Cause<S: Subject, VS: ValueSet> {
    /// Initial incompatibility encoding the request itself: the root
    /// subject must take the requested value. This incompatibility drives
    /// the resolution, it requires that we pick the (virtual) root subject.
    Root(Id<S>, VS::V),
    /// Incompatibility encoding a requirement edge reported by the
    /// provider: every candidate of the first subject inside the set
    /// constrains the target subject to the target set.
    ///
    /// A missing target records that the provider had no candidate left
    /// inside the set, so we have to backtrack.
    Dependency(Id<S>, VS, Option<(Id<S>, VS)>),
    /// Derived from two antecedents during conflict resolution. Stores the
    /// antecedent ids; the antecedents are immutable once created, so the
    /// back-references form a DAG, never a cycle.
    ///
    /// For example, if a -> b and b -> c, we can derive a -> c.
    Conflict(IncompId<S, VS>, IncompId<S, VS>),
}

/// A Relation describes how a set of terms can be compared to an
/// incompatibility. Typically, the set of terms comes from the partial
/// solution.
#[derive(Eq, PartialEq, Debug)]
pub(crate) enum Relation<S: Subject> {
    /// We say that a set of terms S satisfies an incompatibility I
    /// if S satisfies every term in I.
    Satisfied,
    /// We say that S contradicts I
    /// if S contradicts at least one term in I.
    Contradicted(Id<S>),
    /// If S satisfies all but one of I's terms and is inconclusive for the
    /// remaining term, we say S "almost satisfies" I and we call the
    /// remaining term the "unsatisfied term".
    AlmostSatisfied(Id<S>),
    /// Otherwise, we say that their relation is inconclusive.
    Inconclusive,
}

impl<S: Subject, VS: ValueSet> Incompatibility<S, VS> {
    /// Create the initial incompatibility requiring the root subject.
    pub(crate) fn root(root: Id<S>, value: VS::V) -> Self {
        Self {
            subject_terms: SmallMap::One([(
                root,
                Term::Negative(VS::singleton(value.clone())),
            )]),
            cause: Cause::Root(root, value),
        }
    }

    /// Create an incompatibility to remember that the provider has no
    /// candidate left inside the given set.
    pub(crate) fn no_candidates(subject: Id<S>, term: Term<VS>) -> Self {
        let set = match &term {
            Term::Positive(set) => set.clone(),
            Term::Negative(_) => panic!("no candidate terms must be positive"),
        };
        Self {
            subject_terms: SmallMap::One([(subject, term)]),
            cause: Cause::Dependency(subject, set, None),
        }
    }

    /// Build an incompatibility from a given requirement edge.
    pub(crate) fn from_dependency(subject: Id<S>, set: VS, dep: (Id<S>, VS)) -> Self {
        let (dep_subject, dep_set) = dep;
        Self {
            subject_terms: if dep_set == VS::empty() {
                SmallMap::One([(subject, Term::Positive(set.clone()))])
            } else {
                SmallMap::Two([
                    (subject, Term::Positive(set.clone())),
                    (dep_subject, Term::Negative(dep_set.clone())),
                ])
            },
            cause: Cause::Dependency(subject, set, Some((dep_subject, dep_set))),
        }
    }

    pub(crate) fn as_dependency(&self) -> Option<(Id<S>, Id<S>)> {
        match &self.cause {
            Cause::Dependency(s, _, Some((t, _))) => Some((*s, *t)),
            _ => None,
        }
    }

    /// Merge dependants with the same requirement edge.
    ///
    /// When multiple candidates of a subject constrain another subject to
    /// the same set, we can merge the two into a single incompatibility.
    /// For example, if a@1 depends on b and a@2 depends on b, we can say
    /// instead a@1||2 depends on b.
    ///
    /// It is a special case of prior cause computation where the unified
    /// subject is the common dependant in the two incompatibilities
    /// expressing requirements.
    pub(crate) fn merge_dependents(&self, other: &Self) -> Option<Self> {
        // It is almost certainly a bug to call this method without checking
        // that self is a dependency.
        debug_assert!(self.as_dependency().is_some());
        // Check that both incompatibilities are of the shape p1 depends on
        // p2, with the same p1 and p2.
        let self_subjects = self.as_dependency()?;
        if self_subjects != other.as_dependency()? {
            return None;
        }
        let (s1, s2) = self_subjects;
        // We ignore self-dependencies. They are always either trivially true
        // or trivially false, as the subject's value implies whether the
        // constraint will always be fulfilled or always violated.
        if s1 == s2 {
            return None;
        }
        let dep_term = self.get(s2);
        // The target set must be the same in both cases to be able to merge
        // multiple source sets.
        if dep_term != other.get(s2) {
            return None;
        }
        Some(Self::from_dependency(
            s1,
            self.get(s1)
                .unwrap()
                .unwrap_positive()
                .union(other.get(s1).unwrap().unwrap_positive()),
            (
                s2,
                dep_term.map_or(VS::empty(), |term| term.unwrap_negative().clone()),
            ),
        ))
    }

    /// Prior cause of two incompatibilities using the rule of resolution.
    pub(crate) fn prior_cause(
        incompat: Id<Self>,
        satisfier_cause: Id<Self>,
        subject: Id<S>,
        incompatibility_store: &Arena<Self>,
    ) -> Self {
        let cause = Cause::Conflict(incompat, satisfier_cause);
        // Optimization to avoid cloning and dropping t1.
        let (t1, mut subject_terms) = incompatibility_store[incompat]
            .subject_terms
            .split_one(&subject)
            .unwrap();
        let satisfier_cause_terms = &incompatibility_store[satisfier_cause].subject_terms;
        subject_terms.merge(
            satisfier_cause_terms.iter().filter(|(s, _)| s != &&subject),
            |t1, t2| Some(t1.intersection(t2)),
        );
        let term = t1.union(satisfier_cause_terms.get(&subject).unwrap());
        if term != Term::any() {
            subject_terms.insert(subject, term);
        }
        Self {
            subject_terms,
            cause,
        }
    }

    /// Check if an incompatibility should mark the end of the algorithm:
    /// its terms reduce to nothing, or to the root assertion alone, meaning
    /// the request itself is provably unsatisfiable.
    pub(crate) fn is_failure(&self, root_subject: Id<S>, root_value: &VS::V) -> bool {
        if self.subject_terms.len() == 0 {
            true
        } else if self.subject_terms.len() > 1 {
            false
        } else {
            let (subject, term) = self.subject_terms.iter().next().unwrap();
            (subject == &root_subject) && term.contains(root_value)
        }
    }

    /// Get the term related to a given subject (if it exists).
    pub(crate) fn get(&self, subject: Id<S>) -> Option<&Term<VS>> {
        self.subject_terms.get(&subject)
    }

    /// Iterate over subjects.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Id<S>, &Term<VS>)> {
        self.subject_terms
            .iter()
            .map(|(subject, term)| (*subject, term))
    }

    // Reporting ###############################################################

    /// Retrieve parent causes if of type Conflict.
    pub(crate) fn causes(&self) -> Option<(Id<Self>, Id<Self>)> {
        match self.cause {
            Cause::Conflict(id1, id2) => Some((id1, id2)),
            _ => None,
        }
    }

    /// Build a derivation tree for error reporting.
    pub(crate) fn build_derivation_tree(
        self_id: Id<Self>,
        shared_ids: &crate::Set<Id<Self>>,
        store: &Arena<Self>,
        subject_store: &HashArena<S>,
        precomputed: &Map<Id<Self>, Arc<DerivationTree<S, VS>>>,
    ) -> DerivationTree<S, VS> {
        match store[self_id].cause.clone() {
            Cause::Conflict(id1, id2) => {
                let derived: Derived<S, VS> = Derived {
                    terms: store[self_id]
                        .subject_terms
                        .iter()
                        .map(|(&a, b)| (subject_store[a].clone(), b.clone()))
                        .collect(),
                    shared_id: shared_ids.get(&self_id).map(|id| id.into_raw()),
                    cause1: precomputed
                        .get(&id1)
                        .expect("non-topological calls building tree")
                        .clone(),
                    cause2: precomputed
                        .get(&id2)
                        .expect("non-topological calls building tree")
                        .clone(),
                };
                DerivationTree::Derived(derived)
            }
            Cause::Root(subject, value) => {
                DerivationTree::External(External::Root(subject_store[subject].clone(), value))
            }
            Cause::Dependency(subject, set, None) => DerivationTree::External(
                External::NoCandidates(subject_store[subject].clone(), set),
            ),
            Cause::Dependency(subject, set, Some((dep_subject, dep_set))) => {
                DerivationTree::External(External::Dependency(
                    subject_store[subject].clone(),
                    set,
                    subject_store[dep_subject].clone(),
                    dep_set,
                ))
            }
        }
    }
}

impl<'a, S: Subject, VS: ValueSet + 'a> Incompatibility<S, VS> {
    /// CF definition of Relation enum.
    pub(crate) fn relation(&self, terms: impl Fn(Id<S>) -> Option<&'a Term<VS>>) -> Relation<S> {
        let mut relation = Relation::Satisfied;
        for (&subject, incompat_term) in self.subject_terms.iter() {
            match terms(subject).map(|term| incompat_term.relation_with(term)) {
                Some(term::Relation::Satisfied) => {}
                Some(term::Relation::Contradicted) => {
                    return Relation::Contradicted(subject);
                }
                None | Some(term::Relation::Inconclusive) => {
                    // If a subject is not present, the intersection is the
                    // same as `Term::any`. According to the rules of
                    // satisfactions, the relation would be inconclusive.
                    // It could also be satisfied if the incompatibility term
                    // was also `Term::any`, but we systematically remove
                    // those from incompatibilities so we're safe on that
                    // front.
                    if relation == Relation::Satisfied {
                        relation = Relation::AlmostSatisfied(subject);
                    } else {
                        return Relation::Inconclusive;
                    }
                }
            }
        }
        relation
    }
}

impl<S: Subject, VS: ValueSet> Incompatibility<S, VS> {
    /// Display the incompatibility.
    ///
    /// Subjects are ordered by their cross-kind total order, so the
    /// rendered sentence is deterministic even when terms span several
    /// subject kinds.
    pub(crate) fn display<'a>(&'a self, subject_store: &'a HashArena<S>) -> impl Display + 'a {
        let mut terms = self.iter().collect::<Vec<_>>();
        terms.sort_by(|(a, _), (b, _)| subject_store[*a].total_cmp(&subject_store[*b]));
        match terms.as_slice() {
            [] => "version solving failed".into(),
            [(subject, Term::Positive(set))] => {
                format!("{} {} is forbidden", subject_store[*subject], set)
            }
            [(subject, Term::Negative(set))] => {
                format!("{} {} is mandatory", subject_store[*subject], set)
            }
            [(s_pos, Term::Positive(set_pos)), (s_neg, Term::Negative(set_neg))]
            | [(s_neg, Term::Negative(set_neg)), (s_pos, Term::Positive(set_pos))] => {
                External::Dependency(
                    &subject_store[*s_pos],
                    set_pos.clone(),
                    &subject_store[*s_neg],
                    set_neg.clone(),
                )
                .to_string()
            }
            slice => {
                let str_terms: Vec<_> = slice
                    .iter()
                    .map(|(s, term)| format!("{} {}", subject_store[*s], term))
                    .collect();
                str_terms.join(", ") + " are incompatible"
            }
        }
    }
}

// TESTS #######################################################################

#[cfg(test)]
pub(crate) mod tests {
    use std::cmp::Reverse;
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::internal::State;
    use crate::term::tests::strategy as term_strat;
    use crate::{OfflineProvider, Ranges};

    proptest! {

        /// For any three different subjects s1, s2 and s3,
        /// for any three terms t1, t2 and t3,
        /// if we have the two following incompatibilities:
        ///    { s1: t1, s2: not t2 }
        ///    { s2: t2, s3: t3 }
        /// the rule of resolution says that we can deduce the following
        /// incompatibility:
        ///    { s1: t1, s3: t3 }
        #[test]
        fn rule_of_resolution(t1 in term_strat(), t2 in term_strat(), t3 in term_strat()) {
            let mut store = Arena::new();
            let mut subject_store = HashArena::new();
            let s1 = subject_store.alloc("s1");
            let s2 = subject_store.alloc("s2");
            let s3 = subject_store.alloc("s3");
            let i1 = store.alloc(Incompatibility {
                subject_terms: SmallMap::Two([(s1, t1.clone()), (s2, t2.negate())]),
                cause: Cause::Dependency(s1, Ranges::full(), Some((s2, Ranges::full()))),
            });

            let i2 = store.alloc(Incompatibility {
                subject_terms: SmallMap::Two([(s2, t2), (s3, t3.clone())]),
                cause: Cause::Dependency(s2, Ranges::full(), Some((s3, Ranges::full()))),
            });

            let mut i3 = Map::default();
            i3.insert(s1, t1);
            i3.insert(s3, t3);

            let i_resolution = Incompatibility::prior_cause(i1, i2, s2, &store);
            assert_eq!(i_resolution.subject_terms.iter().map(|(&k, v)| (k, v.clone())).collect::<Map<_, _>>(), i3);
        }

    }

    /// Check that multiple self-dependencies are supported.
    ///
    /// The public API deduplicates requirements through a map, so we test
    /// them here manually.
    #[test]
    fn subject_depends_on_itself() {
        let cases: &[Vec<(String, Ranges<usize>)>] = &[
            vec![("foo".to_string(), Ranges::full())],
            vec![
                ("foo".to_string(), Ranges::full()),
                ("foo".to_string(), Ranges::full()),
            ],
            vec![
                ("foo".to_string(), Ranges::full()),
                ("foo".to_string(), Ranges::singleton(1usize)),
            ],
            vec![
                ("foo".to_string(), Ranges::singleton(1usize)),
                ("foo".to_string(), Ranges::from_range_bounds(1usize..2)),
                ("foo".to_string(), Ranges::from_range_bounds(1usize..3)),
            ],
        ];

        for case in cases {
            let mut state: State<OfflineProvider<String, Ranges<usize>>> =
                State::init("root".to_string(), 0, Vec::new());
            state.unit_propagation(state.root_subject).unwrap();

            // Add the root subject. Decisions always follow a
            // prioritization pass, as in the solver loop.
            let next = state
                .partial_solution
                .pick_highest_priority_subject(|_s, _set| (0, Reverse(0)))
                .unwrap();
            assert_eq!(next, state.root_subject);
            state.add_subject_value_requirements(
                next,
                0,
                [("foo".to_string(), Ranges::singleton(1usize))],
            );
            state.unit_propagation(next).unwrap();

            // Add a subject whose candidate depends on itself several times.
            let next = state
                .partial_solution
                .pick_highest_priority_subject(|_s, _set| (0, Reverse(0)))
                .unwrap();
            state.add_subject_value_requirements(next, 1, case.clone());
            state.unit_propagation(next).unwrap();

            assert!(state
                .partial_solution
                .pick_highest_priority_subject(|_s, _set| (0, Reverse(0)))
                .is_none());

            let solution: BTreeMap<String, usize> = state
                .partial_solution
                .extract_solution()
                .map(|(s, v)| (state.subject_store[s].clone(), v))
                .collect();
            let expected = BTreeMap::from([("root".to_string(), 0), ("foo".to_string(), 1)]);

            assert_eq!(solution, expected, "{:?}", case);
        }
    }
}
