// SPDX-License-Identifier: MPL-2.0

use std::cell::Cell;
use std::convert::Infallible;
use std::fmt;

use version_solver::{
    resolve, resolve_with, Budget, DefaultStringReporter, OfflineProvider, Provider, Ranges,
    Reporter, Requirements, Resolution, SolveError, SubjectStatistics,
};

type NumVS = Ranges<u32>;

/// The provider prefers aaa @ 2, but bbb @ 1 only accepts aaa @ 1: the
/// discovered requirement must win over the provider's raw preference.
#[test]
fn backtracks_off_preferred_candidate() {
    let _ = env_logger::try_init();
    let mut provider = OfflineProvider::<_, NumVS>::new();
    provider.add_requirements("aaa", 1u32, []);
    provider.add_requirements("aaa", 2u32, []);
    provider.add_requirements("bbb", 1u32, [("aaa", Ranges::singleton(1u32))]);

    let outcome = resolve(
        &provider,
        "__ROOT__",
        1u32,
        [("bbb", Ranges::singleton(1u32))],
    );
    match outcome {
        Ok(Resolution::Succeeded(selected)) => {
            assert_eq!(selected.get(&"aaa"), Some(&1));
            assert_eq!(selected.get(&"bbb"), Some(&1));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

/// Contradictory root requirements are proven unsatisfiable without a
/// single provider call, and the report combines both root edges.
#[test]
fn contradictory_root_requirements_fail() {
    let provider = OfflineProvider::<_, NumVS>::new();

    let outcome = resolve(
        &provider,
        "__ROOT__",
        1u32,
        [
            ("aaa", Ranges::singleton(1u32)),
            ("aaa", Ranges::singleton(2u32)),
        ],
    );
    match outcome {
        Ok(Resolution::Failed(tree)) => {
            let report = DefaultStringReporter::report(&tree);
            // Both root edges on aaa appear in the explanation, whatever the
            // exact range formatting.
            assert_eq!(report.matches("depends on aaa").count(), 2, "{report}");
            assert!(report.contains("__ROOT__"), "{report}");
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

/// An unsatisfiable requirement edge ends in a failure whose explanation
/// names the edge.
#[test]
fn missing_candidate_explains_the_edge() {
    let mut provider = OfflineProvider::<_, NumVS>::new();
    provider.add_requirements("a", 1u32, [("b", Ranges::higher_than(2u32))]);
    provider.add_requirements("b", 1u32, []);

    let outcome = resolve(
        &provider,
        "__ROOT__",
        1u32,
        [("a", Ranges::full()), ("b", Ranges::full())],
    );
    match outcome {
        Ok(Resolution::Failed(mut tree)) => {
            let report = DefaultStringReporter::report(&tree);
            assert!(report.contains("depends on"), "{report}");
            assert!(report.contains("a"), "{report}");
            assert!(report.contains("b"), "{report}");

            // Collapsing the exhausted candidate sets shortens the chain but
            // keeps the edge visible.
            tree.collapse_no_candidates();
            let collapsed = DefaultStringReporter::report(&tree);
            assert!(collapsed.contains("depends on"), "{collapsed}");
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

/// A solvable request under a generous budget succeeds; the same request
/// with an exhausted budget reports `TimedOut`, never `Failed`.
#[test]
fn budget_exhaustion_is_not_failure() {
    let mut provider = OfflineProvider::<_, NumVS>::new();
    provider.add_requirements("a", 1u32, [("b", Ranges::full())]);
    provider.add_requirements("b", 1u32, []);

    let requirements = [("a", Ranges::full())];

    assert!(matches!(
        resolve_with(
            &provider,
            "__ROOT__",
            1u32,
            requirements.clone(),
            Budget::cycles(1000)
        ),
        Ok(Resolution::Succeeded(_))
    ));

    assert!(matches!(
        resolve_with(
            &provider,
            "__ROOT__",
            1u32,
            requirements,
            Budget::cycles(0)
        ),
        Ok(Resolution::TimedOut)
    ));
}

#[derive(Debug)]
struct Outage;

impl fmt::Display for Outage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("index storage outage")
    }
}

impl std::error::Error for Outage {}

/// Serves candidates from an in-memory index, but fails when asked for the
/// requirements of any candidate.
struct RequirementOutageProvider {
    provider: OfflineProvider<&'static str, NumVS>,
}

impl Provider for RequirementOutageProvider {
    type S = &'static str;
    type V = u32;
    type VS = NumVS;
    type Priority = (u32, std::cmp::Reverse<usize>);
    type Err = Outage;

    fn prioritize(
        &self,
        subject: &Self::S,
        set: &Self::VS,
        statistics: &SubjectStatistics,
    ) -> Self::Priority {
        self.provider.prioritize(subject, set, statistics)
    }

    fn best_candidate(&self, subject: &Self::S, set: &Self::VS) -> Result<Option<u32>, Outage> {
        Ok(self.provider.best_candidate(subject, set).unwrap())
    }

    fn requirements(
        &self,
        _subject: &Self::S,
        _value: &u32,
    ) -> Result<Requirements<&'static str, NumVS>, Outage> {
        Err(Outage)
    }
}

/// A storage fault while reading metadata aborts the run. It is never
/// converted into "no candidates", which would wrongly end in `Failed`.
#[test]
fn provider_error_aborts_instead_of_conflicting() {
    let mut provider = OfflineProvider::new();
    provider.add_requirements("a", 1u32, []);
    let provider = RequirementOutageProvider { provider };

    let outcome = resolve(&provider, "__ROOT__", 1u32, [("a", Ranges::full())]);
    match outcome {
        Err(SolveError::RequirementRetrieval {
            subject,
            value,
            source: Outage,
        }) => {
            assert_eq!(subject, "a");
            assert_eq!(value, 1);
        }
        Ok(resolution) => panic!("expected an error, got {:?}", resolution),
        Err(other) => panic!("expected a requirement retrieval error, got {:?}", other),
    }
}

/// Polls `should_cancel` and gives up after a fixed number of cycles.
struct CancellingProvider {
    provider: OfflineProvider<&'static str, NumVS>,
    polls_left: Cell<u32>,
}

impl Provider for CancellingProvider {
    type S = &'static str;
    type V = u32;
    type VS = NumVS;
    type Priority = (u32, std::cmp::Reverse<usize>);
    type Err = Outage;

    fn prioritize(
        &self,
        subject: &Self::S,
        set: &Self::VS,
        statistics: &SubjectStatistics,
    ) -> Self::Priority {
        self.provider.prioritize(subject, set, statistics)
    }

    fn best_candidate(&self, subject: &Self::S, set: &Self::VS) -> Result<Option<u32>, Outage> {
        Ok(self.provider.best_candidate(subject, set).unwrap())
    }

    fn requirements(
        &self,
        subject: &Self::S,
        value: &u32,
    ) -> Result<Requirements<&'static str, NumVS>, Outage> {
        Ok(self.provider.requirements(subject, value).unwrap())
    }

    fn should_cancel(&self) -> Result<(), Outage> {
        let left = self.polls_left.get();
        if left == 0 {
            return Err(Outage);
        }
        self.polls_left.set(left - 1);
        Ok(())
    }
}

#[test]
fn cancellation_is_cooperative() {
    let mut provider = OfflineProvider::new();
    provider.add_requirements("a", 1u32, []);
    let provider = CancellingProvider {
        provider,
        polls_left: Cell::new(1),
    };

    assert!(matches!(
        resolve(&provider, "__ROOT__", 1u32, [("a", Ranges::full())]),
        Err(SolveError::Cancelled(Outage))
    ));
}

/// Resolving twice against a deterministic provider replays the exact same
/// decisions, even when the run has to backtrack: the preferred x @ 2 needs
/// a y that does not exist, so both runs settle on x @ 1.
#[test]
fn replay_is_deterministic_after_backtracking() {
    let mut provider = OfflineProvider::<_, NumVS>::new();
    provider.add_requirements("x", 1u32, []);
    provider.add_requirements("x", 2u32, [("y", Ranges::singleton(2u32))]);
    provider.add_requirements("y", 1u32, []);

    let requirements = [("x", Ranges::full())];
    let first = resolve(&provider, "__ROOT__", 1u32, requirements.clone());
    let second = resolve(&provider, "__ROOT__", 1u32, requirements);
    match (first, second) {
        (Ok(Resolution::Succeeded(a)), Ok(Resolution::Succeeded(b))) => {
            assert_eq!(a, b);
            assert_eq!(a.get(&"x"), Some(&1));
        }
        _ => panic!("expected two successful resolutions"),
    }
}

/// `Infallible` providers never abort: the helper keeps the common case
/// ergonomic.
#[test]
fn infallible_provider_type_checks() {
    fn assert_infallible<DP: Provider<Err = Infallible>>(_provider: &DP) {}
    let provider = OfflineProvider::<&str, NumVS>::new();
    assert_infallible(&provider);
}
