// SPDX-License-Identifier: MPL-2.0

use std::convert::Infallible;

use version_solver::{
    resolve, OfflineProvider, Provider, Ranges, Requirements, Resolution, SelectedValues,
    SolveError, Subject, SubjectStatistics, ValueSet,
};

type NumVS = Ranges<u32>;

fn solution_of<DP: Provider>(
    outcome: Result<Resolution<DP>, SolveError<DP>>,
) -> SelectedValues<DP> {
    match outcome {
        Ok(Resolution::Succeeded(selected)) => selected,
        other => panic!("expected a successful resolution, got {:?}", other),
    }
}

#[test]
fn same_result_on_repeated_runs() {
    let mut provider = OfflineProvider::<_, NumVS>::new();

    provider.add_requirements("c", 0u32, []);
    provider.add_requirements("c", 2u32, []);
    provider.add_requirements("b", 0u32, []);
    provider.add_requirements("b", 1u32, [("c", Ranges::between(0u32, 1u32))]);

    let requirements = [("b", Ranges::full()), ("c", Ranges::full())];

    let one = solution_of(resolve(&provider, "a", 0u32, requirements.clone()));
    for _ in 0..10 {
        let other = solution_of(resolve(&provider, "a", 0u32, requirements.clone()));
        assert_eq!(one, other, "not the same result");
    }
}

#[test]
fn should_always_find_a_satisfier() {
    let mut provider = OfflineProvider::<_, NumVS>::new();
    provider.add_requirements("a", 0u32, [("b", Ranges::empty())]);
    assert!(matches!(
        resolve(&provider, "root", 0u32, [("a", Ranges::full())]),
        Ok(Resolution::Failed(_))
    ));

    provider.add_requirements("c", 0u32, [("a", Ranges::full())]);
    assert!(matches!(
        resolve(&provider, "root", 0u32, [("c", Ranges::full())]),
        Ok(Resolution::Failed(_))
    ));
}

#[test]
fn depend_on_self() {
    let mut provider = OfflineProvider::<_, NumVS>::new();
    provider.add_requirements("a", 0u32, [("a", Ranges::full())]);
    assert!(matches!(
        resolve(&provider, "root", 0u32, [("a", Ranges::singleton(0u32))]),
        Ok(Resolution::Succeeded(_))
    ));
    provider.add_requirements("a", 66u32, [("a", Ranges::singleton(111u32))]);
    assert!(matches!(
        resolve(&provider, "root", 0u32, [("a", Ranges::singleton(66u32))]),
        Ok(Resolution::Failed(_))
    ));
}

#[test]
fn empty_root_requirement_is_rejected() {
    let provider = OfflineProvider::<_, NumVS>::new();
    assert!(matches!(
        resolve(&provider, "root", 0u32, [("a", Ranges::empty())]),
        Err(SolveError::EmptyRequirement("a"))
    ));
}

#[test]
fn duplicate_root_requirement_is_rejected() {
    let mut provider = OfflineProvider::<_, NumVS>::new();
    provider.add_requirements("a", 1u32, []);
    assert!(matches!(
        resolve(
            &provider,
            "root",
            0u32,
            [("a", Ranges::full()), ("a", Ranges::full())]
        ),
        Err(SolveError::DuplicateRequirement("a"))
    ));
}

/// Test that the prioritization is stable across platforms.
#[test]
fn same_result_across_platforms() {
    struct UnprioritizingProvider<S: Subject, VS: ValueSet> {
        provider: OfflineProvider<S, VS>,
    }

    impl<S: Subject, VS: ValueSet> UnprioritizingProvider<S, VS> {
        fn new() -> Self {
            Self {
                provider: OfflineProvider::new(),
            }
        }

        pub fn add_requirements<I: IntoIterator<Item = (S, VS)>>(
            &mut self,
            subject: S,
            value: impl Into<VS::V>,
            requirements: I,
        ) {
            self.provider.add_requirements(subject, value, requirements);
        }
    }

    impl<S: Subject, VS: ValueSet> Provider for UnprioritizingProvider<S, VS> {
        type S = S;
        type V = VS::V;
        type VS = VS;
        type Priority = u32;
        type Err = Infallible;

        fn best_candidate(&self, subject: &S, set: &VS) -> Result<Option<VS::V>, Infallible> {
            self.provider.best_candidate(subject, set)
        }

        fn prioritize(
            &self,
            _subject: &Self::S,
            _set: &Self::VS,
            _statistics: &SubjectStatistics,
        ) -> Self::Priority {
            0
        }

        fn requirements(
            &self,
            subject: &S,
            value: &VS::V,
        ) -> Result<Requirements<S, VS>, Infallible> {
            self.provider.requirements(subject, value)
        }
    }

    let mut provider = UnprioritizingProvider::<_, NumVS>::new();

    let root_requirements = (0..1000)
        .map(|i| (i.to_string(), Ranges::full()))
        .collect::<Vec<_>>();

    for i in 0..1000 {
        let x = (0..1000)
            .filter(|j| *j != i)
            .map(|i| (i.to_string(), Ranges::<u32>::singleton(1u32)))
            .collect::<Vec<_>>();
        provider.add_requirements(i.to_string(), 2u32, x);
        provider.add_requirements(i.to_string(), 1u32, []);
    }

    let resolution = solution_of(resolve(
        &provider,
        "root".to_string(),
        1u32,
        root_requirements,
    ));
    let (s, _v) = resolution.into_iter().find(|(_s, v)| *v == 2).unwrap();
    assert_eq!(s, "0".to_string());
}
