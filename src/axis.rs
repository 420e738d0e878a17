//! Axis taxonomy — the operational dimensions a check may trigger.
//!
//! An [`Axis`] is either *declarable* (user code may name it in a
//! [`crate::spec::CheckSpecification`]) or *system* (only the engine may set
//! it — see [`Axis::is_system`]). [`AxisSet`] tracks which axes apply and
//! enforces the lattice/sibling closure rules so callers never have to
//! re-derive them by hand.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A single operational axis. `Ord`/`PartialOrd` are derived purely so
/// `AxisSet` can use a `BTreeSet` for deterministic iteration/serialization
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Axis {
    ManualInterventionRequired,
    DegradedComplete,
    DegradedPartial,
    DegradedMinor,
    CriticalWakePeopleUp,
    Inconsistency,
    /// Legacy alias of [`Axis::Inconsistency`], kept for wire back-compat:
    /// older consumers look for this exact name, so both are still emitted
    /// together even though new code should only ever declare
    /// `Inconsistency`.
    InternalInconsistency,
    External,
    AffectsCustomers,
    ProcessError,
    NotReady,
    RequiresReboot,

    // System axes — never declarable by user code (see `Axis::is_system`).
    SysCrashed,
    SysSlow,
    SysStale,
}

impl Axis {
    /// Returns `true` for axes the engine alone may set.
    pub fn is_system(self) -> bool {
        matches!(self, Axis::SysCrashed | Axis::SysSlow | Axis::SysStale)
    }

    /// Returns `true` for axes user code may declare in a specification.
    pub fn is_declarable(self) -> bool {
        !self.is_system()
    }
}

/// An ordered, deduplicated collection of axes with closure rules applied on
/// every mutation: declaring `INTERNAL_INCONSISTENCY` or `INCONSISTENCY`
/// adds the sibling, and declaring any `DEGRADED_*` axis expands downward
/// through the lattice (`COMPLETE` ⇒ `PARTIAL` ⇒ `MINOR`).
///
/// The same closure applies whether the set represents *declared* axes (at
/// specification time) or *activated* axes (at execution time) — both sides
/// follow the identical rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisSet(BTreeSet<Axis>);

impl AxisSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `axis`, applying the sibling/lattice closure. Returns `true`
    /// if the set changed.
    pub fn insert(&mut self, axis: Axis) -> bool {
        let mut changed = self.0.insert(axis);
        match axis {
            Axis::Inconsistency => changed |= self.0.insert(Axis::InternalInconsistency),
            Axis::InternalInconsistency => changed |= self.0.insert(Axis::Inconsistency),
            Axis::DegradedComplete => {
                changed |= self.0.insert(Axis::DegradedPartial);
                changed |= self.0.insert(Axis::DegradedMinor);
            }
            Axis::DegradedPartial => changed |= self.0.insert(Axis::DegradedMinor),
            _ => {}
        }
        changed
    }

    pub fn contains(&self, axis: Axis) -> bool {
        self.0.contains(&axis)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Axis> + '_ {
        self.0.iter().copied()
    }

    /// Union of `self` and `other`, with closure re-applied (closure is
    /// idempotent so this is equivalent to unioning then closing once).
    pub fn union(&self, other: &AxisSet) -> AxisSet {
        let mut out = self.clone();
        for axis in other.iter() {
            out.insert(axis);
        }
        out
    }

    pub fn extend(&mut self, other: &AxisSet) {
        for axis in other.iter() {
            self.insert(axis);
        }
    }
}

impl FromIterator<Axis> for AxisSet {
    fn from_iter<T: IntoIterator<Item = Axis>>(iter: T) -> Self {
        let mut set = AxisSet::new();
        for axis in iter {
            set.insert(axis);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inconsistency_sibling_is_automatic() {
        let mut set = AxisSet::new();
        set.insert(Axis::InternalInconsistency);
        assert!(set.contains(Axis::Inconsistency));
        assert!(set.contains(Axis::InternalInconsistency));
    }

    #[test]
    fn degraded_complete_expands_downward() {
        let mut set = AxisSet::new();
        set.insert(Axis::DegradedComplete);
        assert!(set.contains(Axis::DegradedComplete));
        assert!(set.contains(Axis::DegradedPartial));
        assert!(set.contains(Axis::DegradedMinor));
    }

    #[test]
    fn degraded_partial_expands_to_minor_only() {
        let mut set = AxisSet::new();
        set.insert(Axis::DegradedPartial);
        assert!(!set.contains(Axis::DegradedComplete));
        assert!(set.contains(Axis::DegradedPartial));
        assert!(set.contains(Axis::DegradedMinor));
    }

    #[test]
    fn system_axes_are_not_declarable() {
        assert!(Axis::SysCrashed.is_system());
        assert!(Axis::SysSlow.is_system());
        assert!(Axis::SysStale.is_system());
        assert!(!Axis::NotReady.is_system());
        assert!(Axis::NotReady.is_declarable());
    }

    #[test]
    fn union_reapplies_closure() {
        let mut a = AxisSet::new();
        a.insert(Axis::DegradedPartial);
        let mut b = AxisSet::new();
        b.insert(Axis::Inconsistency);
        let u = a.union(&b);
        assert!(u.contains(Axis::DegradedMinor));
        assert!(u.contains(Axis::InternalInconsistency));
    }
}
