// SPDX-License-Identifier: MPL-2.0

//! A subject identifies *what* a term constrains: the version line of one
//! package, the target platform, an ABI tag, an interpreter identity.
//!
//! The solver never looks inside a subject. All it needs is identity
//! (for interning and term bookkeeping) and a total order usable across
//! kinds, so that heterogeneous subjects can share sorting and printing
//! code in diagnostics and reports.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// An axis competed over during a resolution.
///
/// Each concrete kind defines a total order among its own subjects and
/// reports a stable kind name. When two subjects of different kinds are
/// compared directly, the kind name is the tiebreak, which keeps the
/// combined order total and stable. Subjects are immutable value types.
pub trait Subject: Clone + Eq + Hash + Debug + Display {
    /// Stable name of the kind this subject belongs to.
    fn kind(&self) -> &'static str;

    /// Total order among subjects of the same kind.
    fn same_kind_cmp(&self, other: &Self) -> Ordering;

    /// Total order across kinds: kind names first, then the kind's own
    /// order. Two subjects compare equal only if both their kind and
    /// their value do.
    fn total_cmp(&self, other: &Self) -> Ordering {
        self.kind()
            .cmp(other.kind())
            .then_with(|| self.same_kind_cmp(other))
    }
}

impl Subject for String {
    fn kind(&self) -> &'static str {
        "package"
    }

    fn same_kind_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl Subject for &str {
    fn kind(&self) -> &'static str {
        "package"
    }

    fn same_kind_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl Subject for u32 {
    fn kind(&self) -> &'static str {
        "package"
    }

    fn same_kind_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

/// The subjects a distribution index competes over.
///
/// Most constraints target the version line of one named package. A full
/// install additionally competes over the target platform, the ABI tag and
/// the interpreter identity; giving each its own kind lets one resolution
/// carry all four through the same solver, with the kind name keeping mixed
/// diagnostic output stably ordered. The values assigned to these subjects
/// are whatever `Ord` type the embedding provider chooses per kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DistSubject {
    /// The version line of the named package.
    Package(String),
    /// The target platform of the final install.
    Platform,
    /// The ABI tag the selected artifacts must agree on.
    Abi,
    /// The interpreter identity the selected artifacts must support.
    Interpreter,
}

impl Subject for DistSubject {
    fn kind(&self) -> &'static str {
        match self {
            Self::Package(_) => "package",
            Self::Platform => "platform",
            Self::Abi => "abi",
            Self::Interpreter => "interpreter",
        }
    }

    fn same_kind_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Package(a), Self::Package(b)) => a.cmp(b),
            // The other kinds are singletons.
            _ => Ordering::Equal,
        }
    }
}

impl Display for DistSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Package(name) => write!(f, "{}", name),
            Self::Platform => write!(f, "platform"),
            Self::Abi => write!(f, "abi"),
            Self::Interpreter => write!(f, "interpreter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_kind_order_is_total_and_stable() {
        let subjects = [
            DistSubject::Abi,
            DistSubject::Interpreter,
            DistSubject::Package("aaa".to_string()),
            DistSubject::Package("bbb".to_string()),
            DistSubject::Platform,
        ];
        for (i, a) in subjects.iter().enumerate() {
            for (j, b) in subjects.iter().enumerate() {
                assert_eq!(a.total_cmp(b), i.cmp(&j));
                // No two distinct subjects compare equal.
                assert_eq!(a.total_cmp(b) == Ordering::Equal, a == b);
            }
        }
    }

    #[test]
    fn mixed_kinds_sort_deterministically() {
        let mut subjects = vec![
            DistSubject::Platform,
            DistSubject::Package("zlib".to_string()),
            DistSubject::Abi,
            DistSubject::Package("attrs".to_string()),
        ];
        subjects.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            subjects,
            vec![
                DistSubject::Abi,
                DistSubject::Package("attrs".to_string()),
                DistSubject::Package("zlib".to_string()),
                DistSubject::Platform,
            ]
        );
    }
}
