// SPDX-License-Identifier: MPL-2.0

//! Handling errors.
//!
//! An unsolvable request is not an error: it surfaces as
//! [Resolution::Failed](crate::Resolution::Failed) together with its
//! explanation tree. [SolveError] covers the faults that abort a run
//! instead: provider failures, malformed requests, cooperative
//! cancellation and broken internal invariants.

use std::fmt::{self, Debug};

use thiserror::Error;

use crate::Provider;

/// Errors that may abort a [resolve](crate::resolve) run.
#[derive(Error)]
pub enum SolveError<DP: Provider> {
    /// Error arising when the implementer of [Provider] returned an error
    /// while enumerating the candidates of a subject.
    ///
    /// A provider failure is never converted into a conflict: a storage or
    /// network fault while reading candidate metadata must not be mistaken
    /// for "no candidates exist".
    #[error("Retrieving candidates of {subject} failed")]
    CandidateRetrieval {
        /// The subject whose candidates were being enumerated.
        subject: DP::S,
        /// Error raised by the implementer of [Provider].
        #[source]
        source: DP::Err,
    },

    /// Error arising when the implementer of [Provider] returned an error
    /// while fetching the requirements declared by a candidate.
    #[error("Retrieving requirements of {subject} {value} failed")]
    RequirementRetrieval {
        /// The subject whose requirements were being fetched.
        subject: DP::S,
        /// The candidate value whose requirements were being fetched.
        value: DP::V,
        /// Error raised by the implementer of [Provider].
        #[source]
        source: DP::Err,
    },

    /// A root requirement with an empty acceptable set can never be
    /// satisfied. Rejected before solving starts.
    #[error("The root requirement on {0} allows no value")]
    EmptyRequirement(DP::S),

    /// The exact same requirement appeared twice in the root set.
    /// Rejected before solving starts.
    #[error("Duplicate root requirement on {0}")]
    DuplicateRequirement(DP::S),

    /// The implementer of [Provider] requested cancellation of the run
    /// through [should_cancel](Provider::should_cancel).
    #[error("Solving cancelled")]
    Cancelled(#[source] DP::Err),

    /// Something unexpected happened inside the solver.
    /// Any variant of this is a bug, please report it.
    #[error("{0}")]
    Failure(String),
}

impl<DP: Provider> Debug for SolveError<DP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CandidateRetrieval { subject, source } => f
                .debug_struct("CandidateRetrieval")
                .field("subject", subject)
                .field("source", source)
                .finish(),
            Self::RequirementRetrieval {
                subject,
                value,
                source,
            } => f
                .debug_struct("RequirementRetrieval")
                .field("subject", subject)
                .field("value", value)
                .field("source", source)
                .finish(),
            Self::EmptyRequirement(subject) => {
                f.debug_tuple("EmptyRequirement").field(subject).finish()
            }
            Self::DuplicateRequirement(subject) => {
                f.debug_tuple("DuplicateRequirement").field(subject).finish()
            }
            Self::Cancelled(source) => f.debug_tuple("Cancelled").field(source).finish(),
            Self::Failure(message) => f.debug_tuple("Failure").field(message).finish(),
        }
    }
}
