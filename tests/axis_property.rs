//! Property-based tests for `AxisSet`'s lattice/sibling closure: whatever
//! sequence of axes is inserted, the closure invariants must hold, closure
//! must be idempotent, and union must not depend on argument order.

use healthkit::{Axis, AxisSet};
use proptest::prelude::*;

fn any_axis() -> impl Strategy<Value = Axis> {
    prop_oneof![
        Just(Axis::ManualInterventionRequired),
        Just(Axis::DegradedComplete),
        Just(Axis::DegradedPartial),
        Just(Axis::DegradedMinor),
        Just(Axis::CriticalWakePeopleUp),
        Just(Axis::Inconsistency),
        Just(Axis::InternalInconsistency),
        Just(Axis::External),
        Just(Axis::AffectsCustomers),
        Just(Axis::ProcessError),
        Just(Axis::NotReady),
        Just(Axis::RequiresReboot),
        Just(Axis::SysCrashed),
        Just(Axis::SysSlow),
        Just(Axis::SysStale),
    ]
}

fn closed_set_from(axes: &[Axis]) -> AxisSet {
    axes.iter().copied().collect()
}

proptest! {
    /// Whatever axes go in, the lattice/sibling rules documented on
    /// `AxisSet::insert` must hold on the result.
    #[test]
    fn closure_invariants_hold_for_any_insertion_sequence(axes in prop::collection::vec(any_axis(), 0..20)) {
        let set = closed_set_from(&axes);
        if set.contains(Axis::DegradedComplete) {
            prop_assert!(set.contains(Axis::DegradedPartial));
            prop_assert!(set.contains(Axis::DegradedMinor));
        }
        if set.contains(Axis::DegradedPartial) {
            prop_assert!(set.contains(Axis::DegradedMinor));
        }
        prop_assert_eq!(set.contains(Axis::Inconsistency), set.contains(Axis::InternalInconsistency));
    }

    /// Re-inserting every axis already in a closed set must not change it.
    #[test]
    fn closure_is_idempotent(axes in prop::collection::vec(any_axis(), 0..20)) {
        let once = closed_set_from(&axes);
        let mut twice = once.clone();
        for axis in once.iter() {
            twice.insert(axis);
        }
        prop_assert_eq!(once, twice);
    }

    /// `union` must not depend on which side the caller passes first.
    #[test]
    fn union_is_commutative(
        left in prop::collection::vec(any_axis(), 0..10),
        right in prop::collection::vec(any_axis(), 0..10),
    ) {
        let a = closed_set_from(&left);
        let b = closed_set_from(&right);
        prop_assert_eq!(a.union(&b), b.union(&a));
    }

    /// Every axis actually declared must survive closure, never be dropped.
    #[test]
    fn every_declared_axis_in_the_result_is_present(axes in prop::collection::vec(any_axis(), 0..20)) {
        let set = closed_set_from(&axes);
        for axis in &axes {
            prop_assert!(set.contains(*axis));
        }
    }
}
