// SPDX-License-Identifier: MPL-2.0

//! The partial solution is the structured log of all assignments made so
//! far, with terms regrouped by subject in a [Map](crate::type_aliases::Map).

use std::cmp::Reverse;
use std::fmt::Display;
use std::hash::BuildHasherDefault;

use priority_queue::PriorityQueue;
use rustc_hash::FxHasher;

use crate::internal::{
    Arena, HashArena, Id, IncompDpId, IncompId, Incompatibility, Relation, SmallMap, SmallVec,
};
use crate::{Provider, Subject, Term, ValueSet};

type FnvIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub(crate) struct DecisionLevel(pub(crate) u32);

impl DecisionLevel {
    pub(crate) fn increment(self) -> Self {
        Self(self.0 + 1)
    }
}

/// The partial solution contains all subject assignments,
/// organized by subject and historically ordered.
#[derive(Clone, Debug)]
pub(crate) struct PartialSolution<DP: Provider> {
    next_global_index: u32,
    /// The number of decisions that have been made, equal to the number of
    /// subjects with decisions.
    current_decision_level: DecisionLevel,
    /// Store for all known subject decisions and subject derivations.
    ///
    /// "assignment" refers to both subjects with decisions and subjects with
    /// only derivations and no decision yet. We combine this in a single
    /// index map, where different sections (of indexes) contain subjects
    /// with different levels of information, and making a decision moves a
    /// subject from the derivations section to the decisions section.
    ///
    /// `[..current_decision_level]`: Subjects that have had a decision made,
    /// sorted by the `decision_level`. This section can be seen as the
    /// partial solution, it contains a mapping from subject to decided
    /// value. The sorting makes it very efficient to extract the solution,
    /// and to backtrack to a particular decision level. The
    /// `AssignmentsIntersection` is always a `Decision`.
    ///
    /// `[current_decision_level..]`: Subjects that are constrained by some
    /// other subject, but have not yet been decided. The
    /// `AssignmentsIntersection` is always a `Derivations`, the derivations
    /// store the obligations from the decided subjects. This section has two
    /// subsections to optimize the number of `prioritize` calls:
    ///
    /// `[current_decision_level..prioritize_decision_level]`: The
    /// assignments of subjects in this range have not changed since the last
    /// time `prioritize` was called, their priority in
    /// `prioritized_potential_subjects` is fresh. There is no sorting within
    /// this range.
    ///
    /// `[prioritize_decision_level..]`: The assignments of subjects in this
    /// range may have changed since the last time `prioritize` was called,
    /// their priority in `prioritized_potential_subjects` needs to be
    /// refreshed. There is no sorting within this range.
    #[allow(clippy::type_complexity)]
    subject_assignments: FnvIndexMap<Id<DP::S>, SubjectAssignments<DP::S, DP::VS>>,
    /// Index into `subject_assignments` to decide which subjects need to be
    /// re-prioritized.
    prioritize_decision_level: usize,
    /// The undecided subjects ordered by their `Priority`.
    ///
    /// The max heap allows quickly `pop`ing the highest priority subject.
    ///
    /// The `Reverse<u32>` is the discovery order of subjects used as
    /// tiebreaker. Its order is that of a breadth-first search.
    #[allow(clippy::type_complexity)]
    prioritized_potential_subjects:
        PriorityQueue<Id<DP::S>, (DP::Priority, Reverse<u32>), BuildHasherDefault<FxHasher>>,
    /// Whether we have never backtracked, to enable fast path optimizations.
    has_ever_backtracked: bool,
}

/// A subject assignment is either a decision or a list of (accumulated)
/// derivations without a decision.
#[derive(Clone, Debug)]
struct SubjectAssignments<S: Subject, VS: ValueSet> {
    /// Whether the assignment is a decision or a derivation.
    assignments_intersection: AssignmentsIntersection<VS>,
    /// All constraints on the subject's value from previous decisions,
    /// accumulated by decision level.
    dated_derivations: SmallVec<DatedDerivation<S, VS>>,
    /// Smallest [`DecisionLevel`] in `dated_derivations`.
    smallest_decision_level: DecisionLevel,
    /// Highest [`DecisionLevel`] in `dated_derivations`.
    highest_decision_level: DecisionLevel,
}

impl<S: Subject, VS: ValueSet> Display for SubjectAssignments<S, VS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let derivations: Vec<_> = self
            .dated_derivations
            .iter()
            .map(|dd| dd.to_string())
            .collect();
        write!(
            f,
            "decision range: {:?}..{:?}\nderivations:\n  {}\n,assignments_intersection: {}",
            self.smallest_decision_level,
            self.highest_decision_level,
            derivations.join("\n  "),
            self.assignments_intersection
        )
    }
}

#[derive(Clone, Debug)]
struct DatedDerivation<S: Subject, VS: ValueSet> {
    global_index: u32,
    /// Only decisions up to this level have been used to compute the
    /// accumulated term.
    decision_level: DecisionLevel,
    cause: IncompId<S, VS>,
    /// The intersection of all terms up to `decision_level`.
    ///
    /// It may not contain all terms of this `decision_level`, there may be
    /// more than one `DatedDerivation` per decision level.
    accumulated_intersection: Term<VS>,
}

impl<S: Subject, VS: ValueSet> Display for DatedDerivation<S, VS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}, cause: {:?}", self.decision_level, self.cause)
    }
}

#[derive(Clone, Debug)]
enum AssignmentsIntersection<VS: ValueSet> {
    /// A decision on this subject has been made at the given global index.
    Decision {
        global_index: u32,
        value: VS::V,
        /// The value, but as a positive singleton term.
        term: Term<VS>,
    },
    Derivations(Term<VS>),
}

impl<VS: ValueSet> Display for AssignmentsIntersection<VS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decision {
                global_index,
                value,
                term: _,
            } => {
                write!(f, "Decision: global index {}, v = {}", global_index, value)
            }
            Self::Derivations(term) => write!(f, "Derivations term: {}", term),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum SatisfierSearch<S: Subject, VS: ValueSet> {
    DifferentDecisionLevels {
        previous_satisfier_level: DecisionLevel,
    },
    SameDecisionLevels {
        satisfier_cause: IncompId<S, VS>,
    },
}

type SatisfiedMap<S, VS> = SmallMap<Id<S>, (Option<IncompId<S, VS>>, u32, DecisionLevel)>;

impl<DP: Provider> PartialSolution<DP> {
    /// Initialize an empty PartialSolution.
    pub(crate) fn empty() -> Self {
        Self {
            next_global_index: 0,
            current_decision_level: DecisionLevel(0),
            subject_assignments: FnvIndexMap::default(),
            prioritized_potential_subjects: PriorityQueue::default(),
            prioritize_decision_level: 0,
            has_ever_backtracked: false,
        }
    }

    pub(crate) fn display<'a>(&'a self, subject_store: &'a HashArena<DP::S>) -> impl Display + 'a {
        struct PSDisplay<'a, DP: Provider>(&'a PartialSolution<DP>, &'a HashArena<DP::S>);

        impl<DP: Provider> Display for PSDisplay<'_, DP> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut assignments: Vec<_> = self
                    .0
                    .subject_assignments
                    .iter()
                    .map(|(s, sa)| format!("{:?} = '{}': {}", s, self.1[*s], sa))
                    .collect();
                assignments.sort();
                write!(
                    f,
                    "next_global_index: {}\ncurrent_decision_level: {:?}\nsubject_assignments:\n{}",
                    self.0.next_global_index,
                    self.0.current_decision_level,
                    assignments.join("\t\n")
                )
            }
        }

        PSDisplay(self, subject_store)
    }

    /// Add a decision.
    pub(crate) fn add_decision(&mut self, subject: Id<DP::S>, value: DP::V) {
        // Check that add_decision is never used in the wrong context.
        if cfg!(debug_assertions) {
            match self.subject_assignments.get_mut(&subject) {
                None => panic!("Derivations must already exist"),
                Some(sa) => match &sa.assignments_intersection {
                    // Cannot be called when a decision has already been taken.
                    AssignmentsIntersection::Decision { .. } => {
                        panic!("Already existing decision")
                    }
                    // Cannot be called if the value is not contained in the
                    // terms' intersection.
                    AssignmentsIntersection::Derivations(term) => {
                        debug_assert!(
                            term.contains(&value),
                            "{:?}: {} was expected to be contained in {}",
                            subject,
                            value,
                            term,
                        )
                    }
                },
            }
            assert_eq!(
                self.prioritize_decision_level,
                self.subject_assignments.len()
            );
        }
        let new_idx = self.current_decision_level.0 as usize;
        self.current_decision_level = self.current_decision_level.increment();
        let (old_idx, _, sa) = self
            .subject_assignments
            .get_full_mut(&subject)
            .expect("Derivations must already exist");
        sa.highest_decision_level = self.current_decision_level;
        sa.assignments_intersection = AssignmentsIntersection::Decision {
            global_index: self.next_global_index,
            value: value.clone(),
            term: Term::exact(value),
        };
        // Maintain that the beginning of `subject_assignments` has all
        // decisions in sorted order.
        if new_idx != old_idx {
            self.subject_assignments.swap_indices(new_idx, old_idx);
        }
        self.next_global_index += 1;
    }

    /// Add a derivation.
    pub(crate) fn add_derivation(
        &mut self,
        subject: Id<DP::S>,
        cause: IncompDpId<DP>,
        store: &Arena<Incompatibility<DP::S, DP::VS>>,
    ) {
        use indexmap::map::Entry;
        let mut dated_derivation = DatedDerivation {
            global_index: self.next_global_index,
            decision_level: self.current_decision_level,
            cause,
            accumulated_intersection: store[cause].get(subject).unwrap().negate(),
        };
        self.next_global_index += 1;
        let sa_last_index = self.subject_assignments.len().saturating_sub(1);
        match self.subject_assignments.entry(subject) {
            Entry::Occupied(mut occupied) => {
                let idx = occupied.index();
                let sa = occupied.get_mut();
                sa.highest_decision_level = self.current_decision_level;
                match &mut sa.assignments_intersection {
                    // Check that add_derivation is never called in the wrong
                    // context.
                    AssignmentsIntersection::Decision { .. } => {
                        panic!("add_derivation should not be called after a decision")
                    }
                    AssignmentsIntersection::Derivations(t) => {
                        *t = t.intersection(&dated_derivation.accumulated_intersection);
                        dated_derivation.accumulated_intersection = t.clone();
                        if t.is_positive() {
                            // we can use `swap_indices` to make
                            // `prioritize_decision_level` only go down by 1,
                            // but the copying is slower than the larger search
                            self.prioritize_decision_level =
                                std::cmp::min(self.prioritize_decision_level, idx);
                        }
                    }
                }
                sa.dated_derivations.push(dated_derivation);
            }
            Entry::Vacant(v) => {
                let term = dated_derivation.accumulated_intersection.clone();
                if term.is_positive() {
                    self.prioritize_decision_level =
                        std::cmp::min(self.prioritize_decision_level, sa_last_index);
                }
                v.insert(SubjectAssignments {
                    smallest_decision_level: self.current_decision_level,
                    highest_decision_level: self.current_decision_level,
                    dated_derivations: SmallVec::one(dated_derivation),
                    assignments_intersection: AssignmentsIntersection::Derivations(term),
                });
            }
        }
    }

    #[cold]
    pub(crate) fn pick_highest_priority_subject(
        &mut self,
        mut prioritizer: impl FnMut(Id<DP::S>, &DP::VS) -> DP::Priority,
    ) -> Option<Id<DP::S>> {
        let check_all = self.prioritize_decision_level
            == self.current_decision_level.0.saturating_sub(1) as usize;
        let current_decision_level = self.current_decision_level;
        let prioritized_potential_subjects = &mut self.prioritized_potential_subjects;
        self.subject_assignments
            .get_range(self.prioritize_decision_level..)
            .unwrap()
            .iter()
            .filter(|(_, sa)| {
                // We only actually need to update the subject if it has been
                // changed since the last time we called prioritize. Which
                // means its highest decision level is the current decision
                // level, or if we backtracked in the meantime.
                check_all || sa.highest_decision_level == current_decision_level
            })
            .filter_map(|(&s, sa)| sa.assignments_intersection.potential_subject_filter(s))
            .for_each(|(s, set)| {
                let priority = prioritizer(s, set);
                prioritized_potential_subjects.push(s, (priority, Reverse(s.into_raw() as u32)));
            });
        self.prioritize_decision_level = self.subject_assignments.len();
        prioritized_potential_subjects.pop().map(|(s, _)| s)
    }

    /// If a partial solution has, for every positive derivation,
    /// a corresponding decision that satisfies that assignment,
    /// it's a total solution and version solving has succeeded.
    pub(crate) fn extract_solution(&self) -> impl Iterator<Item = (Id<DP::S>, DP::V)> + '_ {
        self.subject_assignments
            .iter()
            .take(self.current_decision_level.0 as usize)
            .map(|(&s, sa)| match &sa.assignments_intersection {
                AssignmentsIntersection::Decision {
                    global_index: _,
                    value: v,
                    term: _,
                } => (s, v.clone()),
                AssignmentsIntersection::Derivations(_) => {
                    // The invariant on the order in `self.subject_assignments`
                    // was broken.
                    let mut context = String::new();
                    for (id, assignment) in self
                        .subject_assignments
                        .iter()
                        .take(self.current_decision_level.0 as usize)
                    {
                        context.push_str(&format!(
                            " * {:?} {:?}\n",
                            id, assignment.assignments_intersection
                        ));
                    }
                    panic!(
                        "Derivations in the Decision part. Decision level {}\n{}",
                        self.current_decision_level.0, context
                    )
                }
            })
    }

    /// Backtrack the partial solution to a given decision level.
    pub(crate) fn backtrack(&mut self, decision_level: DecisionLevel) {
        self.current_decision_level = decision_level;
        self.subject_assignments.retain(|_, sa| {
            if sa.smallest_decision_level > decision_level {
                // Remove all entries that have a smallest decision level
                // higher than the backtrack target.
                false
            } else if sa.highest_decision_level <= decision_level {
                // Do not change entries older than the backtrack decision
                // level target.
                true
            } else {
                // smallest_decision_level <= decision_level < highest_decision_level
                //
                // Since decision_level < highest_decision_level, we can be
                // certain that there will be no decision in this subject's
                // assignments after backtracking, because such a decision
                // would have been the last assignment and it would have the
                // "highest_decision_level".

                // Truncate the history.
                while sa.dated_derivations.last().map(|dd| dd.decision_level) > Some(decision_level)
                {
                    sa.dated_derivations.pop();
                }
                debug_assert!(!sa.dated_derivations.is_empty());

                let last = sa.dated_derivations.last().unwrap();

                // Update highest_decision_level.
                sa.highest_decision_level = last.decision_level;

                // Reset the assignments intersection.
                sa.assignments_intersection =
                    AssignmentsIntersection::Derivations(last.accumulated_intersection.clone());
                true
            }
        });
        // Throw away all stored priority levels, and mark that they all need
        // to be recomputed.
        self.prioritized_potential_subjects.clear();
        self.prioritize_decision_level = self.current_decision_level.0.saturating_sub(1) as usize;
        self.has_ever_backtracked = true;
    }

    /// Add the decision if it does not produce any conflict with the new
    /// incompatibilities.
    ///
    /// In practice a conflict can only happen if one of the requirements
    /// (which are used to make the new incompatibilities) is already in the
    /// partial solution with an incompatible value.
    pub(crate) fn add_decision_checked(
        &mut self,
        subject: Id<DP::S>,
        value: DP::V,
        new_incompatibilities: std::ops::Range<IncompId<DP::S, DP::VS>>,
        store: &Arena<Incompatibility<DP::S, DP::VS>>,
    ) -> Option<IncompId<DP::S, DP::VS>> {
        if !self.has_ever_backtracked {
            // Fast path: nothing has yet gone wrong during this resolution.
            // This call is unlikely to be the first problem. So let's live
            // with a little bit of risk and add the decision without
            // checking the requirements. The worst that can happen is we
            // will have to do a full backtrack which only removes this one
            // decision.
            log::info!("add_decision: {subject:?} @ {value} without checking requirements");
            self.add_decision(subject, value);
            return None;
        }

        // Check if any of the requirements precludes deciding on this value.
        let subject_term = Term::exact(value.clone());
        let relation = |incompat: IncompId<DP::S, DP::VS>| {
            store[incompat].relation(|s| {
                // The current subject isn't part of the subject assignments
                // yet.
                if s == subject {
                    Some(&subject_term)
                } else {
                    self.term_intersection_for_subject(s)
                }
            })
        };
        if let Some(satisfied) = Id::range_to_iter(new_incompatibilities)
            .find(|incompat| relation(*incompat) == Relation::Satisfied)
        {
            log::info!("rejecting decision {subject:?} @ {value} because its requirements conflict");
            Some(satisfied)
        } else {
            log::info!("adding decision: {subject:?} @ {value}");
            self.add_decision(subject, value);
            None
        }
    }

    /// Check if the terms in the partial solution satisfy the
    /// incompatibility.
    pub(crate) fn relation(
        &self,
        incompat: &Incompatibility<DP::S, DP::VS>,
    ) -> Relation<DP::S> {
        incompat.relation(|subject| self.term_intersection_for_subject(subject))
    }

    /// Retrieve intersection of terms related to a subject.
    pub(crate) fn term_intersection_for_subject(&self, subject: Id<DP::S>) -> Option<&Term<DP::VS>> {
        self.subject_assignments
            .get(&subject)
            .map(|sa| sa.assignments_intersection.term())
    }

    /// Figure out if the satisfier and previous satisfier are of different
    /// decision levels.
    #[allow(clippy::type_complexity)]
    pub(crate) fn satisfier_search(
        &self,
        incompat: &Incompatibility<DP::S, DP::VS>,
        store: &Arena<Incompatibility<DP::S, DP::VS>>,
    ) -> (Id<DP::S>, SatisfierSearch<DP::S, DP::VS>) {
        let satisfied_map = Self::find_satisfier(incompat, &self.subject_assignments);
        let (&satisfier_subject, &(satisfier_cause, _, satisfier_decision_level)) = satisfied_map
            .iter()
            .max_by_key(|(_s, (_, global_index, _))| global_index)
            .unwrap();
        let previous_satisfier_level = Self::find_previous_satisfier(
            incompat,
            satisfier_subject,
            satisfied_map,
            &self.subject_assignments,
            store,
        );
        let search_result = if previous_satisfier_level >= satisfier_decision_level {
            SatisfierSearch::SameDecisionLevels {
                satisfier_cause: satisfier_cause.unwrap(),
            }
        } else {
            SatisfierSearch::DifferentDecisionLevels {
                previous_satisfier_level,
            }
        };
        (satisfier_subject, search_result)
    }

    /// A satisfier is the earliest assignment in the partial solution such
    /// that the incompatibility is satisfied by the partial solution up to
    /// and including that assignment.
    ///
    /// Returns a map indicating for each subject term when that was first
    /// satisfied in history. If we effectively found a satisfier, the
    /// returned map must be the same size as the incompatibility.
    ///
    /// Question: This is possible since we added a "global_index" to every
    /// dated derivation. It would be nice if we could get rid of it, but I
    /// don't know if then it will be possible to return a coherent
    /// previous_satisfier_level.
    #[allow(clippy::type_complexity)]
    fn find_satisfier(
        incompat: &Incompatibility<DP::S, DP::VS>,
        subject_assignments: &FnvIndexMap<Id<DP::S>, SubjectAssignments<DP::S, DP::VS>>,
    ) -> SatisfiedMap<DP::S, DP::VS> {
        let mut satisfied = SmallMap::Empty;
        for (subject, incompat_term) in incompat.iter() {
            let sa = subject_assignments.get(&subject).expect("Must exist");
            satisfied.insert(subject, sa.satisfier(subject, &incompat_term.negate()));
        }
        satisfied
    }

    /// Earliest assignment in the partial solution before satisfier such
    /// that the incompatibility is satisfied by the partial solution up to
    /// and including that assignment plus satisfier.
    #[allow(clippy::type_complexity)]
    fn find_previous_satisfier(
        incompat: &Incompatibility<DP::S, DP::VS>,
        satisfier_subject: Id<DP::S>,
        mut satisfied_map: SatisfiedMap<DP::S, DP::VS>,
        subject_assignments: &FnvIndexMap<Id<DP::S>, SubjectAssignments<DP::S, DP::VS>>,
        store: &Arena<Incompatibility<DP::S, DP::VS>>,
    ) -> DecisionLevel {
        // First, let's retrieve the previous derivations and the initial
        // accumulated term.
        let satisfier_sa = subject_assignments.get(&satisfier_subject).unwrap();
        let (satisfier_cause, _gidx, _dl) = satisfied_map.get(&satisfier_subject).unwrap();

        let accum_term = if let &Some(cause) = satisfier_cause {
            store[cause].get(satisfier_subject).unwrap().negate()
        } else {
            match &satisfier_sa.assignments_intersection {
                AssignmentsIntersection::Derivations(_) => panic!("must be a decision"),
                AssignmentsIntersection::Decision {
                    global_index: _,
                    value: _,
                    term,
                } => term.clone(),
            }
        };

        let incompat_term = incompat
            .get(satisfier_subject)
            .expect("satisfier subject not in incompat");

        satisfied_map.insert(
            satisfier_subject,
            satisfier_sa.satisfier(
                satisfier_subject,
                &accum_term.intersection(&incompat_term.negate()),
            ),
        );

        // Finally, let's identify the decision level of that previous
        // satisfier.
        let (_, &(_, _, decision_level)) = satisfied_map
            .iter()
            .max_by_key(|(_s, (_, global_index, _))| global_index)
            .unwrap();
        decision_level.max(DecisionLevel(1))
    }

    pub(crate) fn current_decision_level(&self) -> DecisionLevel {
        self.current_decision_level
    }
}

impl<S: Subject, VS: ValueSet> SubjectAssignments<S, VS> {
    fn satisfier(
        &self,
        subject: Id<S>,
        start_term: &Term<VS>,
    ) -> (Option<IncompId<S, VS>>, u32, DecisionLevel) {
        let empty = Term::empty();
        // Indicate if we found a satisfier in the list of derivations,
        // otherwise it will be the decision.
        let idx = self
            .dated_derivations
            .as_slice()
            .partition_point(|dd| !dd.accumulated_intersection.is_disjoint(start_term));
        if let Some(dd) = self.dated_derivations.as_slice().get(idx) {
            debug_assert_eq!(dd.accumulated_intersection.intersection(start_term), empty);
            return (Some(dd.cause), dd.global_index, dd.decision_level);
        }
        // If it wasn't found in the derivations, it must be the decision
        // which is last (if called in the right context).
        match &self.assignments_intersection {
            AssignmentsIntersection::Decision {
                global_index,
                value: _,
                term: _,
            } => (None, *global_index, self.highest_decision_level),
            AssignmentsIntersection::Derivations(accumulated_intersection) => {
                unreachable!(
                    concat!(
                        "while processing subject {:?}: ",
                        "accum_term = {} has overlap with incompat_term = {}, ",
                        "which means the last assignment should have been a decision, ",
                        "but instead it was a derivation. This shouldn't be possible! ",
                        "(Maybe your value ordering is broken?)"
                    ),
                    subject, accumulated_intersection, start_term
                )
            }
        }
    }
}

impl<VS: ValueSet> AssignmentsIntersection<VS> {
    /// Returns the term intersection of all assignments (decision included).
    fn term(&self) -> &Term<VS> {
        match self {
            Self::Decision {
                global_index: _,
                value: _,
                term,
            } => term,
            Self::Derivations(term) => term,
        }
    }

    /// A subject is a potential pick if there isn't an already selected
    /// value (no "decision") and if it contains at least one positive
    /// derivation term in the partial solution.
    fn potential_subject_filter<S: Subject>(&self, subject: Id<S>) -> Option<(Id<S>, &VS)> {
        match self {
            Self::Decision { .. } => None,
            Self::Derivations(term_intersection) => {
                if term_intersection.is_positive() {
                    Some((subject, term_intersection.unwrap_positive()))
                } else {
                    None
                }
            }
        }
    }
}
