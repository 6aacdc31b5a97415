// SPDX-License-Identifier: MPL-2.0

//! Conflict-driven version solving for package distribution indexes.
//!
//! Given a root set of constraints over *subjects* (the version line of a
//! package, a target platform, an ABI tag, an interpreter identity) and a
//! [Provider] of per-candidate requirement metadata, the solver computes a
//! consistent assignment of exactly one value per subject, or proves that no
//! such assignment exists and explains why. The algorithm belongs to the
//! PubGrub/CDCL family: unit propagation over a growing set of
//! incompatibilities, with backjumping and derived-conflict learning.
//!
//! When solving fails, the chain of derived conflicts is kept and can be
//! rendered as a linear sequence of human-readable sentences:
//!
//! ```txt
//! Because __ROOT__ 1 depends on a 1 and __ROOT__ 1 depends on a 2,
//!   version solving failed.
//! ```
//!
//! ## API
//!
//! ```
//! # use version_solver::{resolve, OfflineProvider, Ranges, Resolution, SolveError};
//! #
//! # fn try_main() -> Result<(), SolveError<OfflineProvider<&'static str, Ranges<u32>>>> {
//! #     let provider = OfflineProvider::<&str, Ranges<u32>>::new();
//! let outcome = resolve(&provider, "__ROOT__", 1u32, [("a", Ranges::full())])?;
//! #     assert!(matches!(outcome, Resolution::Failed(_)));
//! #     Ok(())
//! # }
//! # fn main() {
//! #     assert!(try_main().is_ok());
//! # }
//! ```
//!
//! The root requirements come from the caller; the [Provider] supplies the
//! candidates of every other subject, in preference order, together with the
//! requirements each candidate declares. Failure to find a solution is not an
//! error: [resolve] returns a [Resolution] value that is either `Succeeded`
//! with the selected values, `Failed` with the explanation tree, or
//! `TimedOut` when a caller-supplied [Budget] ran out. [SolveError] is
//! reserved for provider failures, malformed requests and broken internal
//! invariants.

#![warn(missing_docs)]

mod error;
mod provider;
mod report;
mod solver;
mod subject;
mod term;
mod type_aliases;
mod value_set;

mod internal;

pub use error::SolveError;
pub use provider::OfflineProvider;
pub use report::{DefaultStringReporter, DerivationTree, Derived, External, Reporter};
pub use solver::{resolve, resolve_with, Budget, Provider, Resolution, SubjectStatistics};
pub use subject::{DistSubject, Subject};
pub use term::Term;
pub use type_aliases::{Map, Requirements, SelectedValues, Set};
pub use value_set::ValueSet;
pub use version_ranges::Ranges;
