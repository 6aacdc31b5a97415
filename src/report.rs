// SPDX-License-Identifier: MPL-2.0

//! Build a report as clear as possible as to why dependency solving failed.

use std::fmt::{self, Display};
use std::ops::Deref;
use std::sync::Arc;

use crate::{Map, Subject, Term, ValueSet};

/// Reporter trait.
pub trait Reporter<S, VS: ValueSet> {
    /// Output type of the report.
    type Output;

    /// Generate a report from the derivation tree describing the resolution
    /// failure.
    fn report(derivation_tree: &DerivationTree<S, VS>) -> Self::Output;
}

/// Derivation tree resulting in the impossibility to solve the requirements.
#[derive(Debug, Clone)]
pub enum DerivationTree<S, VS: ValueSet> {
    /// External incompatibility.
    External(External<S, VS>),
    /// Incompatibility derived from two others.
    Derived(Derived<S, VS>),
}

/// Incompatibilities that are not derived from others,
/// they have their own reason.
#[derive(Debug, Clone)]
pub enum External<S, VS: ValueSet> {
    /// Initial incompatibility for the request on the root subject.
    Root(S, VS::V),
    /// There is no candidate in the given set for this subject.
    NoCandidates(S, VS),
    /// Incompatibility coming from a requirement edge: every candidate of
    /// the first subject inside its set constrains the second subject to
    /// the second set.
    Dependency(S, VS, S, VS),
}

/// Incompatibility derived from two others.
#[derive(Debug, Clone)]
pub struct Derived<S, VS: ValueSet> {
    /// Terms of the incompatibility.
    pub terms: Map<S, Term<VS>>,
    /// Indicate if that incompatibility is present multiple times
    /// in the derivation tree.
    /// If that is the case, it has a unique id, provided in that option.
    /// Then, we should only explain it once,
    /// and refer to the explanation for the other times.
    pub shared_id: Option<usize>,
    /// First cause.
    pub cause1: Arc<DerivationTree<S, VS>>,
    /// Second cause.
    pub cause2: Arc<DerivationTree<S, VS>>,
}

impl<S: Subject, VS: ValueSet> DerivationTree<S, VS> {
    /// Merge the [NoCandidates](External::NoCandidates) external
    /// incompatibilities with the derived incompatibility they are paired
    /// with in the tree, so that reports do not spell out every exhausted
    /// candidate set on its own line.
    pub fn collapse_no_candidates(&mut self) {
        match self {
            DerivationTree::External(_) => {}
            DerivationTree::Derived(derived) => {
                match (
                    Arc::make_mut(&mut derived.cause1),
                    Arc::make_mut(&mut derived.cause2),
                ) {
                    (DerivationTree::External(External::NoCandidates(s, set)), ref mut cause) => {
                        cause.collapse_no_candidates();
                        *self = cause
                            .clone()
                            .merge_no_candidates(s.to_owned(), set.to_owned())
                            .unwrap_or_else(|| self.to_owned());
                    }
                    (ref mut cause, DerivationTree::External(External::NoCandidates(s, set))) => {
                        cause.collapse_no_candidates();
                        *self = cause
                            .clone()
                            .merge_no_candidates(s.to_owned(), set.to_owned())
                            .unwrap_or_else(|| self.to_owned());
                    }
                    _ => {
                        Arc::make_mut(&mut derived.cause1).collapse_no_candidates();
                        Arc::make_mut(&mut derived.cause2).collapse_no_candidates();
                    }
                }
            }
        }
    }

    fn merge_no_candidates(self, subject: S, set: VS) -> Option<Self> {
        match self {
            // Cannot merge into a derived incompatibility, its terms are
            // united by a shared cause.
            DerivationTree::Derived(_) => None,
            DerivationTree::External(External::Root(_, _)) => None,
            DerivationTree::External(External::NoCandidates(s, r)) => {
                if s == subject {
                    Some(DerivationTree::External(External::NoCandidates(
                        subject,
                        r.union(&set),
                    )))
                } else {
                    None
                }
            }
            DerivationTree::External(External::Dependency(s1, r1, s2, r2)) => {
                if s1 == subject {
                    Some(DerivationTree::External(External::Dependency(
                        subject,
                        r1.union(&set),
                        s2,
                        r2,
                    )))
                } else if s2 == subject {
                    Some(DerivationTree::External(External::Dependency(
                        s1,
                        r1,
                        subject,
                        r2.union(&set),
                    )))
                } else {
                    None
                }
            }
        }
    }
}

impl<S: Display, VS: ValueSet> Display for External<S, VS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(subject, value) => {
                write!(f, "we are solving requirements of {} {}", subject, value)
            }
            Self::NoCandidates(subject, set) => {
                if set == &VS::full() {
                    write!(f, "there is no available candidate for {}", subject)
                } else {
                    write!(f, "there is no candidate of {} in {}", subject, set)
                }
            }
            Self::Dependency(subject, set, dep_subject, dep_set) => {
                if set == &VS::full() && dep_set == &VS::full() {
                    write!(f, "{} depends on {}", subject, dep_subject)
                } else if set == &VS::full() {
                    write!(f, "{} depends on {} {}", subject, dep_subject, dep_set)
                } else if dep_set == &VS::full() {
                    write!(f, "{} {} depends on {}", subject, set, dep_subject)
                } else {
                    write!(
                        f,
                        "{} {} depends on {} {}",
                        subject, set, dep_subject, dep_set
                    )
                }
            }
        }
    }
}

/// Default reporter able to generate an explanation as a [String].
///
/// The report is a linear chain of sentences: every derived step combines
/// the text of its two antecedents, with line references `(1)` attached to
/// explanations that are needed more than once.
pub struct DefaultStringReporter {
    /// Number of explanations already with a line reference.
    ref_count: usize,
    /// Shared nodes that have already been marked with a line reference.
    /// The incompatibility ids are the keys, and the line references are the
    /// values.
    shared_with_ref: Map<usize, usize>,
    /// Accumulated lines of the report already generated.
    lines: Vec<String>,
}

impl DefaultStringReporter {
    /// Initialize the reporter.
    fn new() -> Self {
        Self {
            ref_count: 0,
            shared_with_ref: Map::default(),
            lines: Vec::new(),
        }
    }

    fn build_recursive<S: Subject, VS: ValueSet>(&mut self, derived: &Derived<S, VS>) {
        self.build_recursive_helper(derived);
        if let Some(id) = derived.shared_id {
            if self.shared_with_ref.get(&id).is_none() {
                self.add_line_ref();
                self.shared_with_ref.insert(id, self.ref_count);
            }
        };
    }

    fn build_recursive_helper<S: Subject, VS: ValueSet>(&mut self, current: &Derived<S, VS>) {
        match (current.cause1.deref(), current.cause2.deref()) {
            (DerivationTree::External(external1), DerivationTree::External(external2)) => {
                // Simplest case, we just combine two external
                // incompatibilities.
                self.lines.push(Self::explain_both_external(
                    external1,
                    external2,
                    &current.terms,
                ));
            }
            (DerivationTree::Derived(derived), DerivationTree::External(external)) => {
                // One cause is derived, so we explain this first, then we
                // add the external part, and finally conclude with the
                // current incompatibility.
                self.report_one_each(derived, external, &current.terms);
            }
            (DerivationTree::External(external), DerivationTree::Derived(derived)) => {
                self.report_one_each(derived, external, &current.terms);
            }
            (DerivationTree::Derived(derived1), DerivationTree::Derived(derived2)) => {
                // This is the most complex case since both causes are also
                // derived.
                match (
                    self.line_ref_of(derived1.shared_id),
                    self.line_ref_of(derived2.shared_id),
                ) {
                    // If both causes already have been referenced
                    // (shared_id), the explanation simply uses those
                    // references.
                    (Some(ref1), Some(ref2)) => self.lines.push(Self::explain_both_ref(
                        ref1,
                        derived1,
                        ref2,
                        derived2,
                        &current.terms,
                    )),
                    // Otherwise, if one only has a line number reference, we
                    // recursively call the one without reference and then
                    // add the one with reference to conclude.
                    (Some(ref1), None) => {
                        self.build_recursive(derived2);
                        self.lines
                            .push(Self::and_explain_ref(ref1, derived1, &current.terms));
                    }
                    (None, Some(ref2)) => {
                        self.build_recursive(derived1);
                        self.lines
                            .push(Self::and_explain_ref(ref2, derived2, &current.terms));
                    }
                    // Finally, if no line reference exists yet, we call
                    // recursively the first one and then,
                    //   - if this was a shared node, it will get a line ref
                    //     and we can simply recall this with the current
                    //     node,
                    //   - otherwise, we add a line reference to it,
                    //     recursively call on the second node, and finally
                    //     conclude.
                    (None, None) => {
                        if derived1.shared_id.is_some() {
                            self.build_recursive(derived1);
                            self.build_recursive_helper(current);
                        } else if derived2.shared_id.is_some() {
                            self.build_recursive(derived2);
                            self.build_recursive_helper(current);
                        } else {
                            self.build_recursive_helper(derived1);
                            self.add_line_ref();
                            let ref1 = self.ref_count;
                            self.build_recursive_helper(derived2);
                            self.add_line_ref();
                            let ref2 = self.ref_count;
                            self.lines.push(Self::explain_both_ref(
                                ref1,
                                derived1,
                                ref2,
                                derived2,
                                &current.terms,
                            ));
                        }
                    }
                }
            }
        }
    }

    fn report_one_each<S: Subject, VS: ValueSet>(
        &mut self,
        derived: &Derived<S, VS>,
        external: &External<S, VS>,
        current_terms: &Map<S, Term<VS>>,
    ) {
        match self.line_ref_of(derived.shared_id) {
            Some(ref_id) => self.lines.push(Self::explain_ref_and_external(
                ref_id,
                derived,
                external,
                current_terms,
            )),
            None => self.report_recurse_one_each(derived, external, current_terms),
        }
    }

    fn report_recurse_one_each<S: Subject, VS: ValueSet>(
        &mut self,
        derived: &Derived<S, VS>,
        external: &External<S, VS>,
        current_terms: &Map<S, Term<VS>>,
    ) {
        match (derived.cause1.deref(), derived.cause2.deref()) {
            // If the derived cause has itself one external prior cause, we
            // can chain the external explanations.
            (DerivationTree::Derived(prior_derived), DerivationTree::External(prior_external)) => {
                self.build_recursive(prior_derived);
                self.lines.push(Self::and_explain_prior_and_external(
                    prior_external,
                    external,
                    current_terms,
                ));
            }
            (DerivationTree::External(prior_external), DerivationTree::Derived(prior_derived)) => {
                self.build_recursive(prior_derived);
                self.lines.push(Self::and_explain_prior_and_external(
                    prior_external,
                    external,
                    current_terms,
                ));
            }
            _ => {
                self.build_recursive(derived);
                self.lines
                    .push(Self::and_explain_external(external, current_terms));
            }
        }
    }

    // String explanations #####################################################

    /// Simplest case, we just combine two external incompatibilities.
    fn explain_both_external<S: Subject, VS: ValueSet>(
        external1: &External<S, VS>,
        external2: &External<S, VS>,
        current_terms: &Map<S, Term<VS>>,
    ) -> String {
        format!(
            "Because {} and {}, {}.",
            external1,
            external2,
            Self::string_terms(current_terms)
        )
    }

    /// Both causes have already been explained so we use their refs.
    fn explain_both_ref<S: Subject, VS: ValueSet>(
        ref_id1: usize,
        derived1: &Derived<S, VS>,
        ref_id2: usize,
        derived2: &Derived<S, VS>,
        current_terms: &Map<S, Term<VS>>,
    ) -> String {
        format!(
            "Because {} ({}) and {} ({}), {}.",
            Self::string_terms(&derived1.terms),
            ref_id1,
            Self::string_terms(&derived2.terms),
            ref_id2,
            Self::string_terms(current_terms)
        )
    }

    /// One cause is derived (already explained so one-line), the other is
    /// external.
    fn explain_ref_and_external<S: Subject, VS: ValueSet>(
        ref_id: usize,
        derived: &Derived<S, VS>,
        external: &External<S, VS>,
        current_terms: &Map<S, Term<VS>>,
    ) -> String {
        format!(
            "Because {} ({}) and {}, {}.",
            Self::string_terms(&derived.terms),
            ref_id,
            external,
            Self::string_terms(current_terms)
        )
    }

    /// Add an external cause to the chain of explanations.
    fn and_explain_external<S: Subject, VS: ValueSet>(
        external: &External<S, VS>,
        current_terms: &Map<S, Term<VS>>,
    ) -> String {
        format!(
            "And because {}, {}.",
            external,
            Self::string_terms(current_terms)
        )
    }

    /// Add an already explained incompat to the chain of explanations.
    fn and_explain_ref<S: Subject, VS: ValueSet>(
        ref_id: usize,
        derived: &Derived<S, VS>,
        current_terms: &Map<S, Term<VS>>,
    ) -> String {
        format!(
            "And because {} ({}), {}.",
            Self::string_terms(&derived.terms),
            ref_id,
            Self::string_terms(current_terms)
        )
    }

    /// Add an already explained incompat to the chain of explanations.
    fn and_explain_prior_and_external<S: Subject, VS: ValueSet>(
        prior_external: &External<S, VS>,
        external: &External<S, VS>,
        current_terms: &Map<S, Term<VS>>,
    ) -> String {
        format!(
            "And because {} and {}, {}.",
            prior_external,
            external,
            Self::string_terms(current_terms)
        )
    }

    /// Try to print terms of an incompatibility in a human-readable way.
    ///
    /// Subjects are ordered by their cross-kind total order so the sentence
    /// is deterministic even when the terms span several subject kinds.
    pub fn string_terms<S: Subject, VS: ValueSet>(terms: &Map<S, Term<VS>>) -> String {
        let mut terms_vec = terms.iter().collect::<Vec<_>>();
        terms_vec.sort_by(|(s1, _), (s2, _)| s1.total_cmp(s2));
        match terms_vec.as_slice() {
            [] => "version solving failed".into(),
            // TODO: special case when that unique subject is the root.
            [(subject, Term::Positive(set))] => format!("{} {} is forbidden", subject, set),
            [(subject, Term::Negative(set))] => format!("{} {} is mandatory", subject, set),
            [(s_pos, Term::Positive(set_pos)), (s_neg, Term::Negative(set_neg))]
            | [(s_neg, Term::Negative(set_neg)), (s_pos, Term::Positive(set_pos))] => {
                External::Dependency(s_pos, set_pos.clone(), s_neg, set_neg.clone()).to_string()
            }
            slice => {
                let str_terms: Vec<_> = slice
                    .iter()
                    .map(|(s, term)| format!("{} {}", s, term))
                    .collect();
                str_terms.join(", ") + " are incompatible"
            }
        }
    }

    // Helper functions ########################################################

    fn add_line_ref(&mut self) {
        let new_count = self.ref_count + 1;
        self.ref_count = new_count;
        if let Some(line) = self.lines.last_mut() {
            *line = format!("{} ({})", line, new_count);
        }
    }

    fn line_ref_of(&self, shared_id: Option<usize>) -> Option<usize> {
        shared_id.and_then(|id| self.shared_with_ref.get(&id).cloned())
    }
}

impl<S: Subject, VS: ValueSet> Reporter<S, VS> for DefaultStringReporter {
    type Output = String;

    fn report(derivation_tree: &DerivationTree<S, VS>) -> Self::Output {
        match derivation_tree {
            DerivationTree::External(external) => external.to_string(),
            DerivationTree::Derived(derived) => {
                let mut reporter = Self::new();
                reporter.build_recursive(derived);
                reporter.lines.join("\n")
            }
        }
    }
}
