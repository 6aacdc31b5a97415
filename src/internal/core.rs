// SPDX-License-Identifier: MPL-2.0

//! Core state of the solver: the set of known incompatibilities, the
//! partial solution, and the propagation and conflict resolution machinery
//! tying them together.

use std::sync::Arc;

use crate::internal::{
    Arena, DecisionLevel, HashArena, Id, IncompDpId, Incompatibility, PartialSolution, Relation,
    SatisfierSearch, SmallVec,
};
use crate::{DerivationTree, Map, Provider, Set, Term, ValueSet};

/// Current state of the solving process.
pub(crate) struct State<DP: Provider> {
    pub(crate) root_subject: Id<DP::S>,
    root_value: DP::V,

    /// All incompatibilities indexed by subject.
    #[allow(clippy::type_complexity)]
    incompatibilities: Map<Id<DP::S>, Vec<IncompDpId<DP>>>,

    /// As an optimization, store the ids of incompatibilities that are
    /// already contradicted. For each one keep track of the decision level
    /// when it was found to be contradicted, to undo on backtrack.
    contradicted_incompatibilities: Map<IncompDpId<DP>, DecisionLevel>,

    /// All incompatibilities expressing requirement edges, with common
    /// dependants merged.
    #[allow(clippy::type_complexity)]
    merged_dependencies: Map<(Id<DP::S>, Id<DP::S>), SmallVec<IncompDpId<DP>>>,

    /// Partial solution.
    pub(crate) partial_solution: PartialSolution<DP>,

    /// The store is the reference storage for all incompatibilities.
    pub(crate) incompatibility_store: Arena<Incompatibility<DP::S, DP::VS>>,

    /// The store is the reference storage for all subjects.
    pub(crate) subject_store: HashArena<DP::S>,

    /// This is a stack of work to be done in `unit_propagation`.
    /// It can definitely be a local variable to that function, but
    /// this way we can reuse the same allocation for better performance.
    unit_propagation_buffer: SmallVec<Id<DP::S>>,

    /// How often a subject was involved in a conflict that caused a back
    /// jump. Feeds the provider's prioritization.
    pub(crate) conflict_count: Map<Id<DP::S>, u32>,
}

impl<DP: Provider> State<DP> {
    /// Initialization of the solving state with the caller's request: the
    /// root subject at its requested value, plus the root requirements.
    /// The root requirements come from the request, never from the
    /// provider, so their incompatibilities are seeded here.
    pub(crate) fn init(
        root_subject: DP::S,
        root_value: DP::V,
        root_requirements: Vec<(DP::S, DP::VS)>,
    ) -> Self {
        let mut incompatibility_store = Arena::new();
        let mut subject_store = HashArena::new();
        let root_subject = subject_store.alloc(root_subject);
        let root_incompat_id =
            incompatibility_store.alloc(Incompatibility::root(root_subject, root_value.clone()));
        let mut incompatibilities = Map::default();
        incompatibilities.insert(root_subject, vec![root_incompat_id]);
        let mut state = Self {
            root_subject,
            root_value: root_value.clone(),
            incompatibilities,
            contradicted_incompatibilities: Map::default(),
            merged_dependencies: Map::default(),
            partial_solution: PartialSolution::empty(),
            incompatibility_store,
            subject_store,
            unit_propagation_buffer: SmallVec::empty(),
            conflict_count: Map::default(),
        };
        state.add_incompatibility_from_requirements(root_subject, root_value, root_requirements);
        state
    }

    /// Add an incompatibility to the state.
    pub(crate) fn add_incompatibility(&mut self, incompat: Incompatibility<DP::S, DP::VS>) {
        let id = self.incompatibility_store.alloc(incompat);
        self.merge_incompatibility(id);
    }

    /// Add the incompatibilities of all requirement edges declared by one
    /// candidate value.
    pub(crate) fn add_incompatibility_from_requirements(
        &mut self,
        subject: Id<DP::S>,
        value: DP::V,
        requirements: impl IntoIterator<Item = (DP::S, DP::VS)>,
    ) -> std::ops::Range<IncompDpId<DP>> {
        // Create incompatibilities and allocate them in the store.
        let deps: Vec<(Id<DP::S>, DP::VS)> = requirements
            .into_iter()
            .map(|(dep_subject, dep_set)| (self.subject_store.alloc(dep_subject), dep_set))
            .collect();
        let new_incompats_id_range =
            self.incompatibility_store
                .alloc_iter(deps.into_iter().map(|(dep_subject, dep_set)| {
                    Incompatibility::from_dependency(
                        subject,
                        <DP::VS as ValueSet>::singleton(value.clone()),
                        (dep_subject, dep_set),
                    )
                }));
        // Merge the newly created incompatibilities with the older ones.
        for id in IncompDpId::<DP>::range_to_iter(new_incompats_id_range.clone()) {
            self.merge_incompatibility(id);
        }
        new_incompats_id_range
    }

    /// Add the requirements of one candidate and immediately decide on it,
    /// mirroring the solver's decision step.
    #[cfg(test)]
    pub(crate) fn add_subject_value_requirements(
        &mut self,
        subject: Id<DP::S>,
        value: DP::V,
        requirements: impl IntoIterator<Item = (DP::S, DP::VS)>,
    ) {
        let dep_incompats =
            self.add_incompatibility_from_requirements(subject, value.clone(), requirements);
        self.partial_solution.add_decision_checked(
            subject,
            value,
            dep_incompats,
            &self.incompatibility_store,
        );
    }

    /// Unit propagation is the core mechanism of the solving algorithm.
    /// CF <https://github.com/dart-lang/pub/blob/master/doc/solver.md#unit-propagation>
    ///
    /// For each almost-satisfied incompatibility, derive the negation of
    /// its single unsatisfied term; for each satisfied one, run conflict
    /// resolution. Loops until a fixed point is reached. Returns the
    /// explanation tree when a conflict reduces to the root itself,
    /// proving the request unsolvable.
    pub(crate) fn unit_propagation(
        &mut self,
        subject: Id<DP::S>,
    ) -> Result<(), DerivationTree<DP::S, DP::VS>> {
        self.unit_propagation_buffer.clear();
        self.unit_propagation_buffer.push(subject);
        while let Some(current_subject) = self.unit_propagation_buffer.pop() {
            // Iterate over incompatibilities in reverse order to evaluate
            // the newest (and typically most relevant) ones first.
            let mut conflict_id = None;
            for &incompat_id in self.incompatibilities[&current_subject].iter().rev() {
                if self
                    .contradicted_incompatibilities
                    .contains_key(&incompat_id)
                {
                    continue;
                }
                let current_incompat = &self.incompatibility_store[incompat_id];
                match self.partial_solution.relation(current_incompat) {
                    Relation::Satisfied => {
                        log::info!(
                            "Start conflict resolution because incompat satisfied:\n   {}",
                            current_incompat.display(&self.subject_store)
                        );
                        conflict_id = Some(incompat_id);
                        break;
                    }
                    Relation::AlmostSatisfied(subject_almost) => {
                        // Add `subject_almost` to the propagation buffer if
                        // not already present.
                        if !self
                            .unit_propagation_buffer
                            .as_slice()
                            .contains(&subject_almost)
                        {
                            self.unit_propagation_buffer.push(subject_almost);
                        }
                        // Add (not term) to the partial solution with
                        // incompat as cause.
                        self.partial_solution.add_derivation(
                            subject_almost,
                            incompat_id,
                            &self.incompatibility_store,
                        );
                        // With the partial solution updated, the
                        // incompatibility is now contradicted.
                        self.contradicted_incompatibilities
                            .insert(incompat_id, self.partial_solution.current_decision_level());
                    }
                    Relation::Contradicted(_) => {
                        self.contradicted_incompatibilities
                            .insert(incompat_id, self.partial_solution.current_decision_level());
                    }
                    Relation::Inconclusive => {}
                }
            }
            if let Some(incompat_id) = conflict_id {
                let (subject_almost, root_cause) = self
                    .conflict_resolution(incompat_id)
                    .map_err(|terminal| self.build_derivation_tree(terminal))?;
                self.unit_propagation_buffer.clear();
                self.unit_propagation_buffer.push(subject_almost);
                // Add to the partial solution with incompat as cause.
                self.partial_solution.add_derivation(
                    subject_almost,
                    root_cause,
                    &self.incompatibility_store,
                );
                // After conflict resolution and the partial solution update,
                // the root cause incompatibility is now contradicted.
                self.contradicted_incompatibilities
                    .insert(root_cause, self.partial_solution.current_decision_level());
            }
        }
        Ok(())
    }

    /// Return the root cause or the terminal incompatibility. CF
    /// <https://github.com/dart-lang/pub/blob/master/doc/solver.md#conflict-resolution>
    #[allow(clippy::type_complexity)]
    fn conflict_resolution(
        &mut self,
        incompatibility: IncompDpId<DP>,
    ) -> Result<(Id<DP::S>, IncompDpId<DP>), IncompDpId<DP>> {
        let mut current_incompat_id = incompatibility;
        let mut current_incompat_changed = false;
        loop {
            if self.incompatibility_store[current_incompat_id]
                .is_failure(self.root_subject, &self.root_value)
            {
                return Err(current_incompat_id);
            }
            let (subject, satisfier_search_result) = self.partial_solution.satisfier_search(
                &self.incompatibility_store[current_incompat_id],
                &self.incompatibility_store,
            );
            match satisfier_search_result {
                SatisfierSearch::DifferentDecisionLevels {
                    previous_satisfier_level,
                } => {
                    self.backtrack(
                        current_incompat_id,
                        current_incompat_changed,
                        previous_satisfier_level,
                    );
                    log::info!("backtrack to {:?}", previous_satisfier_level);
                    return Ok((subject, current_incompat_id));
                }
                SatisfierSearch::SameDecisionLevels { satisfier_cause } => {
                    let prior_cause = Incompatibility::prior_cause(
                        current_incompat_id,
                        satisfier_cause,
                        subject,
                        &self.incompatibility_store,
                    );
                    log::info!("prior cause: {}", prior_cause.display(&self.subject_store));
                    current_incompat_id = self.incompatibility_store.alloc(prior_cause);
                    current_incompat_changed = true;
                }
            }
        }
    }

    /// Backtracking.
    fn backtrack(
        &mut self,
        incompat: IncompDpId<DP>,
        incompat_changed: bool,
        decision_level: DecisionLevel,
    ) {
        self.partial_solution.backtrack(decision_level);
        // Forget contradictions that hold only under the decisions we just
        // removed.
        self.contradicted_incompatibilities
            .retain(|_, dl| *dl <= decision_level);
        // Every subject of the root cause was involved in this back jump.
        for (subject, _) in self.incompatibility_store[incompat].iter() {
            *self.conflict_count.entry(subject).or_default() += 1;
        }
        if incompat_changed {
            self.merge_incompatibility(incompat);
        }
    }

    /// Add this incompatibility into the set of all incompatibilities.
    ///
    /// Identical requirement edges from adjacent candidates collapse into a
    /// single incompatibility. This substantially reduces the total number
    /// of incompatibilities and makes it more efficient to detect if a
    /// candidate is contradicted by the partial solution.
    fn merge_incompatibility(&mut self, mut id: IncompDpId<DP>) {
        if let Some((s1, s2)) = self.incompatibility_store[id].as_dependency() {
            // If we are a dependency, there's a good chance we can be merged
            // with a previous dependency.
            let deps_lookup = self.merged_dependencies.entry((s1, s2)).or_default();
            if let Some((past, merged)) = deps_lookup.as_mut_slice().iter_mut().find_map(|past| {
                self.incompatibility_store[id]
                    .merge_dependents(&self.incompatibility_store[*past])
                    .map(|m| (past, m))
            }) {
                let new = self.incompatibility_store.alloc(merged);
                let past_id = *past;
                for (subject, _) in self.incompatibility_store[new].iter() {
                    self.incompatibilities
                        .entry(subject)
                        .or_default()
                        .retain(|i| *i != past_id);
                }
                *past = new;
                id = new;
            } else {
                deps_lookup.push(id);
            }
        }
        for (subject, term) in self.incompatibility_store[id].iter() {
            debug_assert_ne!(term, &Term::any());
            self.incompatibilities
                .entry(subject)
                .or_default()
                .push(id);
        }
    }

    // Error reporting #########################################################

    pub(crate) fn build_derivation_tree(
        &self,
        incompat: IncompDpId<DP>,
    ) -> DerivationTree<DP::S, DP::VS> {
        let mut all_ids: Set<IncompDpId<DP>> = Set::default();
        let mut shared_ids = Set::default();
        let mut stack = vec![incompat];
        while let Some(i) = stack.pop() {
            if let Some((id1, id2)) = self.incompatibility_store[i].causes() {
                if all_ids.contains(&i) {
                    shared_ids.insert(i);
                } else {
                    stack.push(id1);
                    stack.push(id2);
                }
            }
            all_ids.insert(i);
        }
        // To avoid recursion we need to generate trees in topological order.
        // That is to say we need to ensure that the causes are processed
        // before the incompatibility they effect.
        let mut sorted_ids = all_ids.into_iter().collect::<Vec<_>>();
        sorted_ids.sort_unstable_by_key(|id| id.into_raw());
        let mut precomputed = Map::default();
        for id in sorted_ids {
            let tree = Incompatibility::build_derivation_tree(
                id,
                &shared_ids,
                &self.incompatibility_store,
                &self.subject_store,
                &precomputed,
            );
            precomputed.insert(id, Arc::new(tree));
        }
        // Now the user can refer to the entire precomputed tree.
        precomputed
            .remove(&incompat)
            .expect("the root incompat of the tree is in the precomputed set")
            .as_ref()
            .clone()
    }
}
