// SPDX-License-Identifier: MPL-2.0

//! A term is the fundamental unit of operation of the solver.
//! It is a positive or negative expression regarding a set of values.

use std::fmt::{self, Display};

use crate::ValueSet;

/// A positive or negative expression regarding a set of acceptable values.
///
/// `Positive(set)` means the subject's value must be picked from `set`,
/// while `Negative(set)` means it must not. Terms about the same subject
/// combine by [intersection](Term::intersection), and the result never
/// depends on the order the terms were combined in.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Term<VS: ValueSet> {
    /// For example, `1.0.0 <= v < 2.0.0` is a positive expression that is
    /// evaluated true if a value is selected and belongs to that set.
    Positive(VS),
    /// The term `not (v < 3.0.0)` is a negative expression that is evaluated
    /// true if a value in that set is not selected, or if no value is
    /// selected at all.
    Negative(VS),
}

/// Base methods.
impl<VS: ValueSet> Term<VS> {
    /// A term that is always true.
    pub(crate) fn any() -> Self {
        Self::Negative(VS::empty())
    }

    /// A term that is never true.
    pub(crate) fn empty() -> Self {
        Self::Positive(VS::empty())
    }

    /// A positive term containing exactly that value.
    pub(crate) fn exact(value: VS::V) -> Self {
        Self::Positive(VS::singleton(value))
    }

    /// Simply check if a term is positive.
    pub(crate) fn is_positive(&self) -> bool {
        match self {
            Self::Positive(_) => true,
            Self::Negative(_) => false,
        }
    }

    /// Whether the term is a negated constraint. Relevant when rendering
    /// human-readable causes, where polarity decides the phrasing.
    pub fn is_negative(&self) -> bool {
        !self.is_positive()
    }

    /// Negate a term. Evaluation of a negated term always returns the
    /// opposite of the evaluation of the original one.
    pub(crate) fn negate(&self) -> Self {
        match self {
            Self::Positive(set) => Self::Negative(set.clone()),
            Self::Negative(set) => Self::Positive(set.clone()),
        }
    }

    /// Evaluate a term regarding a given choice of value.
    pub(crate) fn contains(&self, v: &VS::V) -> bool {
        match self {
            Self::Positive(set) => set.contains(v),
            Self::Negative(set) => !set.contains(v),
        }
    }

    /// Unwrap the set contained in a positive term.
    /// Will panic if used on a negative term.
    pub(crate) fn unwrap_positive(&self) -> &VS {
        match self {
            Self::Positive(set) => set,
            Self::Negative(_) => panic!("negative term cannot unwrap positive set"),
        }
    }

    /// Unwrap the set contained in a negative term.
    /// Will panic if used on a positive term.
    pub(crate) fn unwrap_negative(&self) -> &VS {
        match self {
            Self::Negative(set) => set,
            Self::Positive(_) => panic!("positive term cannot unwrap negative set"),
        }
    }
}

/// Set operations with terms.
impl<VS: ValueSet> Term<VS> {
    /// Compute the intersection of two terms.
    ///
    /// The intersection is commutative and associative in effect: combining
    /// a chain of terms about the same subject yields the same acceptable
    /// set regardless of order.
    pub fn intersection(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Positive(r1), Self::Positive(r2)) => Self::Positive(r1.intersection(r2)),
            (Self::Positive(r1), Self::Negative(r2)) => {
                Self::Positive(r1.intersection(&r2.complement()))
            }
            (Self::Negative(r1), Self::Positive(r2)) => {
                Self::Positive(r1.complement().intersection(r2))
            }
            (Self::Negative(r1), Self::Negative(r2)) => Self::Negative(r1.union(r2)),
        }
    }

    /// Check whether two terms are mutually exclusive.
    ///
    /// An optimization for the native implementation of checking whether the
    /// intersection of two sets is empty.
    pub(crate) fn is_disjoint(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Positive(r1), Self::Positive(r2)) => r1.is_disjoint(r2),
            (Self::Positive(r1), Self::Negative(r2)) => r1.subset_of(r2),
            (Self::Negative(r1), Self::Positive(r2)) => r2.subset_of(r1),
            // The union of the two sets must be the full set.
            (Self::Negative(r1), Self::Negative(r2)) => r1.union(r2) == VS::full(),
        }
    }

    /// Compute the union of two terms.
    /// If at least one term is negative, the union is also negative.
    pub(crate) fn union(&self, other: &Self) -> Self {
        self.negate().intersection(&other.negate()).negate()
    }

    /// Indicate if this term is a subset of another term.
    /// Just like for sets, `t1.subset_of(t2)` means that `t1 ⊆ t2`.
    pub(crate) fn subset_of(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Positive(r1), Self::Positive(r2)) => r1.subset_of(r2),
            (Self::Positive(r1), Self::Negative(r2)) => r1.is_disjoint(r2),
            (Self::Negative(r1), Self::Positive(r2)) => r1.complement().subset_of(r2),
            (Self::Negative(r1), Self::Negative(r2)) => r2.subset_of(r1),
        }
    }
}

/// Describe a relation between a set of terms S and another term t.
///
/// As a shorthand, we say that a term v satisfies or contradicts a term t
/// if {v} satisfies or contradicts it.
#[derive(Eq, PartialEq, Debug)]
pub(crate) enum Relation {
    /// We say that a set of terms S "satisfies" a term t
    /// if t must be true whenever every term in S is true.
    Satisfied,
    /// Conversely, S "contradicts" t if t must be false
    /// whenever every term in S is true.
    Contradicted,
    /// If neither of these is true we say that S is "inconclusive" for t.
    Inconclusive,
}

/// Relation between terms.
impl<VS: ValueSet> Term<VS> {
    /// Check if a set of terms satisfies this term.
    ///
    /// We say that a set of terms S satisfies a term t
    /// if t must be true whenever every term in S is true.
    ///
    /// It turns out that this can also be expressed with set operations:
    /// S satisfies t if and only if ⋂ S ⊆ t.
    fn satisfied_by(&self, terms_intersection: &Self) -> bool {
        terms_intersection.subset_of(self)
    }

    /// Check if a set of terms contradicts this term.
    ///
    /// We say that a set of terms S contradicts a term t
    /// if t must be false whenever every term in S is true.
    ///
    /// For a set of terms S, this is equivalent to ⋂ S ∩ t = ∅.
    fn contradicted_by(&self, terms_intersection: &Self) -> bool {
        terms_intersection.is_disjoint(self)
    }

    /// Check if a set of terms satisfies or contradicts this term.
    pub(crate) fn relation_with(&self, other_terms_intersection: &Self) -> Relation {
        if self.satisfied_by(other_terms_intersection) {
            Relation::Satisfied
        } else if self.contradicted_by(other_terms_intersection) {
            Relation::Contradicted
        } else {
            Relation::Inconclusive
        }
    }
}

impl<VS: ValueSet> Display for Term<VS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive(set) => write!(f, "{}", set),
            Self::Negative(set) => write!(f, "Not ( {} )", set),
        }
    }
}

// TESTS #######################################################################

#[cfg(test)]
pub(crate) mod tests {
    use proptest::prelude::*;
    use version_ranges::Ranges;

    use super::*;

    fn ranges_strategy() -> impl Strategy<Value = Ranges<u32>> {
        prop::collection::vec(any::<(u32, u32)>(), 0..4).prop_map(|segments| {
            let mut set = Ranges::empty();
            for (a, b) in segments {
                let (low, high) = if a <= b { (a, b) } else { (b, a) };
                set = set.union(&Ranges::between(low, high.saturating_add(1)));
            }
            set
        })
    }

    pub fn strategy() -> impl Strategy<Value = Term<Ranges<u32>>> {
        prop_oneof![
            ranges_strategy().prop_map(Term::Positive),
            ranges_strategy().prop_map(Term::Negative),
        ]
    }

    proptest! {

        /// Testing intersection commutativity.
        #[test]
        fn intersection_is_commutative(t1 in strategy(), t2 in strategy()) {
            prop_assert_eq!(t1.intersection(&t2), t2.intersection(&t1));
        }

        /// Testing intersection associativity: intersecting a chain of terms
        /// in any order yields the same acceptable set.
        #[test]
        fn intersection_is_associative(t1 in strategy(), t2 in strategy(), t3 in strategy()) {
            prop_assert_eq!(
                t1.intersection(&t2).intersection(&t3),
                t1.intersection(&t2.intersection(&t3))
            );
        }

        /// Testing double negation.
        #[test]
        fn double_negate_is_identity(t in strategy()) {
            prop_assert_eq!(&t.negate().negate(), &t);
        }

        /// Testing satisfied_by consistency with the subset relation.
        #[test]
        fn intersection_satisfied_by_both(t1 in strategy(), t2 in strategy()) {
            let inter = t1.intersection(&t2);
            prop_assert_eq!(t1.relation_with(&inter), Relation::Satisfied);
            prop_assert_eq!(t2.relation_with(&inter), Relation::Satisfied);
        }

        /// Testing is_disjoint consistency with the intersection.
        #[test]
        fn disjoint_iff_empty_intersection(t1 in strategy(), t2 in strategy()) {
            prop_assert_eq!(t1.is_disjoint(&t2), t1.intersection(&t2) == Term::empty());
        }

    }
}
