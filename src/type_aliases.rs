// SPDX-License-Identifier: MPL-2.0

//! Publicly exported type aliases.

use crate::Provider;

/// Map implementation used by the library.
pub type Map<K, V> = rustc_hash::FxHashMap<K, V>;

/// Set implementation used by the library.
pub type Set<V> = rustc_hash::FxHashSet<V>;

/// Concrete values picked by the library during [resolve](crate::resolve),
/// one per subject that appeared in any incompatibility during the run.
pub type SelectedValues<DP> = Map<<DP as Provider>::S, <DP as Provider>::V>;

/// The requirements declared by one candidate value: for each required
/// subject, the set of values that candidate accepts.
pub type Requirements<S, VS> = Map<S, VS>;
