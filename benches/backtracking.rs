// SPDX-License-Identifier: MPL-2.0

//! This bench monitors the performance of backtracking and term intersection.
//!
//! Requirements are constructed in a way that all candidates need to be
//! tested before finding a solution.

use criterion::*;
use version_solver::{resolve, OfflineProvider, Ranges};

/// A chain of subjects where every candidate of one subject pins the next
/// subject to a single value, and only the lowest candidate of the chain
/// head leads to a solution.
fn backtracking_singletons(c: &mut Criterion, subject_count: u32, candidate_count: u32) {
    let mut provider = OfflineProvider::<u32, Ranges<u32>>::new();

    provider.add_requirements(1u32, 0u32, []);

    for n in 1..subject_count {
        for v in 1..candidate_count {
            provider.add_requirements(n, v, [(n + 1, Ranges::singleton(v))]);
        }
    }

    c.bench_function("backtracking_singletons", |b| {
        b.iter(|| {
            let _ = resolve(&provider, 0u32, 0u32, [(1u32, Ranges::full())]);
        })
    });
}

/// Same chain shape, plus a subject pinned by the root whose value is only
/// compatible with the tail of the chain at one candidate.
fn backtracking_disjoint_versions(c: &mut Criterion, subject_count: u32, candidate_count: u32) {
    let mut provider = OfflineProvider::<u32, Ranges<u32>>::new();

    provider.add_requirements(1u32, 0u32, []);

    for n in 1..subject_count {
        for v in 1..candidate_count {
            provider.add_requirements(n, v, [(n + 1, Ranges::singleton(v))]);
        }
    }
    for v in 1..candidate_count {
        provider.add_requirements(subject_count, v, [(u32::MAX, Ranges::singleton(v))]);
    }

    for v in 0..candidate_count {
        provider.add_requirements(u32::MAX, v, []);
    }

    let root_requirements = [
        (1u32, Ranges::full()),
        (u32::MAX, Ranges::singleton(0u32)),
    ];

    c.bench_function("backtracking_disjoint_versions", |b| {
        b.iter(|| {
            let _ = resolve(&provider, 0u32, 0u32, root_requirements.clone());
        })
    });
}

/// A chain of subjects constrained by ranges instead of singletons, so the
/// solver accumulates and intersects wide terms while backtracking.
fn backtracking_ranges(c: &mut Criterion, subject_count: u32, candidate_count: u32) {
    let mut provider = OfflineProvider::<u32, Ranges<u32>>::new();

    provider.add_requirements(1u32, 0u32, []);

    for n in 1..subject_count {
        for v in 1..candidate_count {
            let set = Ranges::higher_than(candidate_count - v);
            provider.add_requirements(n, v, [(n + 1, set)]);
        }
    }

    c.bench_function("backtracking_ranges", |b| {
        b.iter(|| {
            let _ = resolve(&provider, 0u32, 0u32, [(1u32, Ranges::full())]);
        })
    });
}

fn bench_group(c: &mut Criterion) {
    backtracking_singletons(c, 100, 500);
    backtracking_disjoint_versions(c, 300, 200);
    backtracking_ranges(c, 5, 200);
}

criterion_group!(benches, bench_group);
criterion_main!(benches);
