// SPDX-License-Identifier: MPL-2.0

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::convert::Infallible;

use crate::{Map, Provider, Requirements, Subject, SubjectStatistics, ValueSet};

/// A basic implementation of [Provider] holding all candidate metadata in
/// memory, useful for tests and for resolving against a pre-fetched
/// snapshot of an index.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "VS::V: serde::Serialize, VS: serde::Serialize, S: serde::Serialize",
        deserialize = "VS::V: serde::Deserialize<'de>, VS: serde::Deserialize<'de>, S: serde::Deserialize<'de>"
    ))
)]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct OfflineProvider<S: Subject, VS: ValueSet> {
    candidates: Map<S, BTreeMap<VS::V, Requirements<S, VS>>>,
}

impl<S: Subject, VS: ValueSet> OfflineProvider<S, VS> {
    /// Creates an empty OfflineProvider with no candidates.
    pub fn new() -> Self {
        Self {
            candidates: Map::default(),
        }
    }

    /// Registers a candidate value of a subject together with the
    /// requirements it declares. Requirements must be added with a single
    /// call to [add_requirements](OfflineProvider::add_requirements); all
    /// subsequent calls for a given subject and value pair will replace the
    /// requirements with the new ones.
    ///
    /// The API does not allow adding requirements one at a time, to uphold
    /// the assumption that
    /// [OfflineProvider.requirements(s, v)](OfflineProvider::requirements)
    /// provides all requirements of a given subject (s) and value (v) pair.
    pub fn add_requirements<I: IntoIterator<Item = (S, VS)>>(
        &mut self,
        subject: S,
        value: impl Into<VS::V>,
        requirements: I,
    ) {
        let declared = requirements.into_iter().collect();
        let v = value.into();
        *self
            .candidates
            .entry(subject)
            .or_default()
            .entry(v)
            .or_default() = declared;
    }

    /// Lists subjects that have been saved.
    pub fn subjects(&self) -> impl Iterator<Item = &S> {
        self.candidates.keys()
    }

    /// Lists candidate values of a saved subject that fall inside the given
    /// set, in preference order (most-preferred first, i.e. highest first).
    /// Returns [None] if no information is available regarding that subject.
    pub fn candidates(&self, subject: &S, set: &VS) -> Option<Vec<VS::V>> {
        let versions = self.candidates.get(subject)?;
        Some(
            versions
                .keys()
                .rev()
                .filter(|v| set.contains(v))
                .cloned()
                .collect(),
        )
    }

    /// Lists requirements of a given subject and value.
    /// Returns [None] if no information is available regarding that subject
    /// and value pair.
    fn declared_requirements(&self, subject: &S, value: &VS::V) -> Option<Requirements<S, VS>> {
        self.candidates.get(subject)?.get(value).cloned()
    }
}

/// An implementation of [Provider] that contains all candidate information
/// available in memory. Subjects are prioritized by conflict count first,
/// then fewest candidates contained in the constraint. Candidates are
/// picked with the highest value first.
impl<S: Subject, VS: ValueSet> Provider for OfflineProvider<S, VS> {
    type S = S;
    type V = VS::V;
    type VS = VS;

    type Err = Infallible;

    #[inline]
    fn best_candidate(&self, subject: &S, set: &VS) -> Result<Option<VS::V>, Infallible> {
        Ok(self
            .candidates
            .get(subject)
            .and_then(|versions| versions.keys().rev().find(|v| set.contains(v)).cloned()))
    }

    type Priority = (u32, Reverse<usize>);

    #[inline]
    fn prioritize(
        &self,
        subject: &Self::S,
        set: &Self::VS,
        statistics: &SubjectStatistics,
    ) -> Self::Priority {
        let candidate_count = self
            .candidates
            .get(subject)
            .map(|versions| versions.keys().filter(|v| set.contains(v)).count())
            .unwrap_or(0);
        if candidate_count == 0 {
            return (u32::MAX, Reverse(0));
        }
        (statistics.conflict_count(), Reverse(candidate_count))
    }

    #[inline]
    fn requirements(
        &self,
        subject: &S,
        value: &VS::V,
    ) -> Result<Requirements<S, VS>, Infallible> {
        // Candidates handed out by `best_candidate` are always known, so an
        // unknown pair simply declares nothing.
        Ok(self
            .declared_requirements(subject, value)
            .unwrap_or_default())
    }
}
