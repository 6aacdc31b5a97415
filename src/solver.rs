// SPDX-License-Identifier: MPL-2.0

//! Conflict-driven version solving.
//!
//! It consists in efficiently finding a value for every constrained subject
//! (package version lines, platforms, ABI tags, interpreter identities)
//! that satisfies all the constraints of a given request. In addition, when
//! that is not possible, we try to provide a very human-readable and clear
//! explanation as to why that failed.
//!
//! The algorithm is generic and works for any type of subject and value as
//! long as subjects implement the [Subject] trait and value sets implement
//! [ValueSet](crate::ValueSet).
//!
//! ## API
//!
//! ```
//! # use version_solver::{resolve, OfflineProvider, Ranges, Resolution, SolveError};
//! #
//! # type NumVS = Ranges<u32>;
//! #
//! # fn try_main() -> Result<(), SolveError<OfflineProvider<&'static str, NumVS>>> {
//! #     let provider = OfflineProvider::<&str, NumVS>::new();
//! let outcome = resolve(&provider, "__ROOT__", 1u32, [("a", Ranges::full())])?;
//! match outcome {
//!     Resolution::Succeeded(selected) => { /* one value per subject */ }
//!     Resolution::Failed(tree) => { /* render the explanation chain */ }
//!     Resolution::TimedOut => { /* the budget ran out */ }
//! }
//! #     Ok(())
//! # }
//! # fn main() {
//! #     assert!(try_main().is_ok());
//! # }
//! ```
//!
//! Where `provider` supplies the candidates available for every subject, in
//! preference order, as well as the requirements every candidate declares,
//! by implementing the [Provider] trait. The root requirements belong to the
//! request itself and are passed to [resolve] directly; an unsolvable
//! request is reported as [Resolution::Failed] with the reason as clear as
//! possible, never as an error.

use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::internal::{Id, Incompatibility, State};
use crate::{
    DerivationTree, Map, Requirements, SelectedValues, SolveError, Subject, ValueSet,
};

/// The outcome of a resolution run: a first-class value, so that failing to
/// find a solution can be inspected and reported rather than handled as
/// control flow.
pub enum Resolution<DP: Provider> {
    /// A consistent assignment was found; one value per subject that
    /// appeared in any incompatibility during the run.
    Succeeded(SelectedValues<DP>),
    /// The request is proven unsatisfiable. The derivation tree explains
    /// why, and renders through a [Reporter](crate::Reporter).
    Failed(DerivationTree<DP::S, DP::VS>),
    /// The caller-supplied [Budget] was exhausted before the run could
    /// succeed or fail. Deliberately distinct from [Resolution::Failed]:
    /// nothing was proven.
    TimedOut,
}

impl<DP: Provider> Debug for Resolution<DP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded(selected) => f.debug_tuple("Succeeded").field(selected).finish(),
            Self::Failed(tree) => f.debug_tuple("Failed").field(tree).finish(),
            Self::TimedOut => f.write_str("TimedOut"),
        }
    }
}

/// An optional limit on how long a resolution may run.
///
/// The budget is checked once per propagation/decision cycle, so a run may
/// overshoot a deadline by at most one cycle plus one in-flight provider
/// call (the only non-interruptible segment).
#[derive(Debug, Clone, Copy, Default)]
pub struct Budget {
    max_cycles: Option<u64>,
    deadline: Option<Instant>,
}

impl Budget {
    /// No limit: the run ends only in success, proven failure, or an error.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Limit the run to the given number of propagation/decision cycles.
    pub fn cycles(max_cycles: u64) -> Self {
        Self {
            max_cycles: Some(max_cycles),
            ..Self::default()
        }
    }

    /// Limit the run to the given wall-clock duration from now.
    pub fn timeout(duration: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(duration),
            ..Self::default()
        }
    }

    fn exhausted(&self, cycles: u64) -> bool {
        self.max_cycles.is_some_and(|max| cycles >= max)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Finds a value for every constrained subject, or explains why that is
/// impossible, with no limit on how long it may take.
///
/// The root requirements come from the caller, not the [Provider]: `root`
/// is a virtual subject (conventionally named `__ROOT__`) deciding to
/// `root_value`, and each `(subject, set)` pair in `requirements` is a
/// requirement edge of that root.
#[cold]
pub fn resolve<DP: Provider>(
    provider: &DP,
    root: DP::S,
    root_value: impl Into<DP::V>,
    requirements: impl IntoIterator<Item = (DP::S, DP::VS)>,
) -> Result<Resolution<DP>, SolveError<DP>> {
    resolve_with(provider, root, root_value, requirements, Budget::unlimited())
}

/// Same as [resolve], bounded by a [Budget].
#[cold]
pub fn resolve_with<DP: Provider>(
    provider: &DP,
    root: DP::S,
    root_value: impl Into<DP::V>,
    requirements: impl IntoIterator<Item = (DP::S, DP::VS)>,
    budget: Budget,
) -> Result<Resolution<DP>, SolveError<DP>> {
    let root_value = root_value.into();
    let requirements: Vec<(DP::S, DP::VS)> = requirements.into_iter().collect();

    // Reject malformed requests before any propagation happens. Two
    // different constraints on the same subject are fine (they are solved
    // like any other conjunction, and may prove contradictory), but the
    // exact same requirement twice is a malformed request.
    for (i, (subject, set)) in requirements.iter().enumerate() {
        if set == &DP::VS::empty() {
            return Err(SolveError::EmptyRequirement(subject.clone()));
        }
        if requirements[..i].iter().any(|(s, r)| s == subject && r == set) {
            return Err(SolveError::DuplicateRequirement(subject.clone()));
        }
    }

    let mut state: State<DP> = State::init(root.clone(), root_value.clone(), requirements);
    let mut added_requirements: Map<Id<DP::S>, std::collections::BTreeSet<DP::V>> = Map::default();
    // The root's requirement incompatibilities were seeded at init, so its
    // decision can be added directly when its turn comes.
    added_requirements
        .entry(state.root_subject)
        .or_default()
        .insert(root_value.clone());
    let mut next = state.root_subject;
    let mut cycles: u64 = 0;
    loop {
        provider.should_cancel().map_err(SolveError::Cancelled)?;
        if budget.exhausted(cycles) {
            info!("budget exhausted after {} cycles", cycles);
            return Ok(Resolution::TimedOut);
        }
        cycles += 1;

        info!(
            "unit_propagation: {:?} = '{}'",
            &next, state.subject_store[next]
        );
        if let Err(tree) = state.unit_propagation(next) {
            return Ok(Resolution::Failed(tree));
        }

        debug!(
            "Partial solution after unit propagation: {}",
            state.partial_solution.display(&state.subject_store)
        );

        let Some(highest_priority_subject) =
            state.partial_solution.pick_highest_priority_subject(|s, set| {
                let stats = SubjectStatistics::new(s, &state.conflict_count);
                provider.prioritize(&state.subject_store[s], set, &stats)
            })
        else {
            return Ok(Resolution::Succeeded(
                state
                    .partial_solution
                    .extract_solution()
                    .map(|(s, v)| (state.subject_store[s].clone(), v))
                    .collect(),
            ));
        };
        next = highest_priority_subject;

        let term_intersection = state
            .partial_solution
            .term_intersection_for_subject(next)
            .ok_or_else(|| {
                SolveError::Failure("a subject was chosen but we don't have a term".into())
            })?;
        // The root's value was supplied with the request, the provider is
        // only consulted for every other subject.
        let decision = if next == state.root_subject {
            Some(root_value.clone())
        } else {
            provider
                .best_candidate(
                    &state.subject_store[next],
                    term_intersection.unwrap_positive(),
                )
                .map_err(|source| SolveError::CandidateRetrieval {
                    subject: state.subject_store[next].clone(),
                    source,
                })?
        };

        info!(
            "Provider chose: {:?} = '{}' @ {:?}",
            &next, state.subject_store[next], decision
        );

        // Pick the next compatible value.
        let v = match decision {
            None => {
                // Running out of candidates is a conflict, not a provider
                // error.
                let inc = Incompatibility::no_candidates(next, term_intersection.clone());
                state.add_incompatibility(inc);
                continue;
            }
            Some(x) => x,
        };

        if !term_intersection.contains(&v) {
            return Err(SolveError::Failure(
                "best_candidate picked a value outside of its set".into(),
            ));
        }

        let is_new_candidate = added_requirements
            .entry(next)
            .or_default()
            .insert(v.clone());

        if is_new_candidate {
            // Retrieve that candidate's requirements.
            let s = next;
            let requirements = provider
                .requirements(&state.subject_store[s], &v)
                .map_err(|source| SolveError::RequirementRetrieval {
                    subject: state.subject_store[s].clone(),
                    value: v.clone(),
                    source,
                })?;

            // Add that candidate if its requirements are not problematic.
            let dep_incompats =
                state.add_incompatibility_from_requirements(s, v.clone(), requirements);

            state.partial_solution.add_decision_checked(
                s,
                v,
                dep_incompats,
                &state.incompatibility_store,
            );
        } else {
            // The requirement incompatibilities are already in the store, so
            // we know there are no satisfied terms and can add the decision
            // directly.
            info!(
                "add_decision (already known candidate): {:?} = '{}' @ {}",
                &next, state.subject_store[next], v
            );
            state.partial_solution.add_decision(next, v);
        }
    }
}

/// Some statistics about how much trouble the resolver has had with a
/// subject.
pub struct SubjectStatistics {
    discovery_order: u32,
    conflict_count: u32,
}

impl SubjectStatistics {
    fn new<S: Subject>(sid: Id<S>, conflict_count: &Map<Id<S>, u32>) -> Self {
        Self {
            discovery_order: sid.into_raw() as u32,
            conflict_count: conflict_count.get(&sid).cloned().unwrap_or_default(),
        }
    }

    /// The number of subjects known by the solver when this subject was
    /// mentioned for the first time.
    ///
    /// The root subject will return `0`. Its direct requirements will start
    /// at `1` and go up from there. Prioritizing based on this value
    /// directly will lead to a depth first search of the resolution graph.
    /// Prioritizing based on the reverse of this value will lead to a
    /// breadth first search of the resolution graph.
    ///
    /// Note: The exact values depend on implementation details of the
    /// solver. So they should not be relied on and may change.
    pub fn discovery_order(&self) -> u32 {
        self.discovery_order
    }

    /// The number of times this subject was involved in a conflict that
    /// caused a back jump.
    ///
    /// When resolution is proceeding normally, this value will stay at `0`
    /// for all subjects. Therefore, using this for prioritization will not
    /// affect the properties of simple cases like checking a lock file.
    /// Prioritizing based on this value directly allows the resolver to
    /// focus on the subjects it is having the most problems with.
    ///
    /// Note: The exact values depend on implementation details of the
    /// solver. So they should not be relied on and may change.
    pub fn conflict_count(&self) -> u32 {
        self.conflict_count
    }
}

/// Trait that allows the algorithm to retrieve available candidates and
/// their requirements. An implementor needs to be supplied to the [resolve]
/// function.
pub trait Provider {
    /// How this provider identifies subjects.
    type S: Subject;

    /// How this provider stores the values candidates can take.
    type V: Debug + Display + Clone + Ord;

    /// How this provider stores sets of acceptable values.
    /// The sets must be able to process the same kind of value as this
    /// provider.
    ///
    /// A common choice is [`Ranges`][crate::Ranges].
    type VS: ValueSet<V = Self::V>;

    /// [Decision making](https://github.com/dart-lang/pub/blob/master/doc/solver.md#decision-making)
    /// is the process of choosing the next subject and value that will be
    /// appended to the partial solution.
    ///
    /// Every time such a decision must be made, the resolver looks at all
    /// the potential valid subjects that have changed, and asks the provider
    /// how important each one is. For each one it calls `prioritize` with
    /// the subject, the current set of acceptable values, and some
    /// statistics about how much trouble the resolver has had with that
    /// subject. The resolver will then pick the subject with the highest
    /// priority from all the potential valid subjects.
    ///
    /// The strategy employed to prioritize subjects cannot change the
    /// existence of a solution or not, but can drastically change the
    /// performance of the solver, or the properties of the solution. The
    /// documentation of Pub (PubGrub implementation for the dart programming
    /// language) states the following:
    ///
    /// > Pub chooses the latest matching version of the package
    /// > with the fewest versions that match the outstanding constraint.
    /// > This tends to find conflicts earlier if any exist,
    /// > since these packages will run out of versions to try more quickly.
    /// > But there's likely room for improvement in these heuristics.
    ///
    /// Note: the resolver may call this even when the set has not changed,
    /// if it is more efficient for the resolver's internal data structures.
    fn prioritize(
        &self,
        subject: &Self::S,
        set: &Self::VS,
        statistics: &SubjectStatistics,
    ) -> Self::Priority;

    /// The type returned from `prioritize`. The resolver does not care what
    /// type this is as long as it can pick a largest one and clone it.
    ///
    /// [`Reverse`](std::cmp::Reverse) can be useful if you want to pick the
    /// subject with the fewest candidates that match the outstanding
    /// constraint.
    type Priority: Ord + Clone;

    /// The kind of error returned from these methods.
    ///
    /// Returning this signals that resolution should fail with this error.
    /// It is never interpreted as "no candidates": a storage or network
    /// fault must not silently become a conflict.
    type Err: Error + 'static;

    /// Once the resolver has found the highest `Priority` subject from all
    /// potential valid subjects, it needs to know what value of that subject
    /// to try next. The candidates of a subject form a finite sequence in
    /// preference order, most-preferred first, restartable on every call;
    /// this returns the most-preferred candidate inside `set`, and `None`
    /// when no candidate is left in there.
    ///
    /// The most common pattern is to select the largest value that the set
    /// contains.
    fn best_candidate(
        &self,
        subject: &Self::S,
        set: &Self::VS,
    ) -> Result<Option<Self::V>, Self::Err>;

    /// Retrieves the requirements declared by a candidate value:
    /// for each constrained subject, the set of values this candidate
    /// accepts for it.
    fn requirements(
        &self,
        subject: &Self::S,
        value: &Self::V,
    ) -> Result<Requirements<Self::S, Self::VS>, Self::Err>;

    /// This is called fairly regularly during the resolution, if it returns
    /// an Err then resolution will be terminated with
    /// [SolveError::Cancelled]. This is helpful if you want to add some form
    /// of cooperative cancellation, or some form of user feedback if things
    /// are taking a while. An in-flight call to another provider method is
    /// the only segment that cannot be interrupted this way. If not provided
    /// the resolver will run as long as its [Budget] allows.
    fn should_cancel(&self) -> Result<(), Self::Err> {
        Ok(())
    }
}
