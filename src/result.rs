//! [`CheckResult`] — the output of one [`crate::instance::CheckInstance`]
//! execution, and its derived fields (§3).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crate::axis::{Axis, AxisSet};
use crate::status::{StatusPart, Throwable};

/// Immutable result of one check execution. Constructed only by
/// [`crate::instance::CheckInstance::execute`]; every other field is derived
/// on demand rather than cached, so there is exactly one source of truth.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub check_name: String,
    pub parts: Vec<StatusPart>,
    pub structured_data: Option<String>,
    pub running_time_ns: u64,
    pub check_started: DateTime<Utc>,
    pub check_completed: DateTime<Utc>,
    /// Snapshot of the metadata this execution ran under, needed to derive
    /// `staleAfter` later (interval/expectedMaximumRunTime may differ across
    /// re-registrations, so the result pins the values it actually ran with).
    pub interval: std::time::Duration,
    pub expected_maximum_run_time: std::time::Duration,
}

impl CheckResult {
    /// `slow` = `runningTime > expectedMaximumRunTime`. When slow, a
    /// synthetic `SYS_SLOW` part is folded into the aggregated axes — but the
    /// part itself is *not* stored on `parts`, since slowness is a derived
    /// property of the run, not something a specification step declares.
    pub fn slow(&self) -> bool {
        self.running_time_ns > self.expected_maximum_run_time.as_nanos() as u64
    }

    /// `crashed` = any `WithThrowable{unhandled:true}` is present (P2).
    pub fn crashed(&self) -> bool {
        self.parts.iter().any(|p| {
            matches!(p, StatusPart::WithThrowable { unhandled: true, .. })
        })
    }

    /// `ok` = every part ok AND not slow AND not crashed (P1).
    pub fn ok(&self) -> bool {
        self.parts.iter().all(StatusPart::is_ok) && !self.slow() && !self.crashed()
    }

    /// Union of declared axes across all parts.
    pub fn declared_axes(&self) -> AxisSet {
        let mut set = AxisSet::new();
        for p in &self.parts {
            set.extend(&p.declared_axes());
        }
        set
    }

    /// Union of activated axes across all parts, plus the synthetic
    /// `SYS_SLOW` axis when `slow()` is true (P3). `SYS_STALE` is
    /// deliberately never added here — it is a report-time-only property
    /// (§4.5 step 4, P4).
    pub fn aggregated_axes(&self) -> AxisSet {
        let mut set = AxisSet::new();
        for p in &self.parts {
            set.extend(&p.activated_axes());
        }
        if self.slow() {
            set.insert(Axis::SysSlow);
        }
        set
    }

    /// `checkCompleted + 3 * (interval + expectedMaximumRunTime)` (§3).
    pub fn stale_after(&self) -> DateTime<Utc> {
        let window = self.interval + self.expected_maximum_run_time;
        self.check_completed + ChronoDuration::from_std(window * 3).unwrap_or(ChronoDuration::zero())
    }

    /// Structural equality — the signal used to decide whether a transition
    /// is worth publishing to observers. Compares part-by-part equality
    /// (delegated to [`crate::status::parts_structurally_equal`]) plus the
    /// aggregated axis-activation map as a distinct check, even though the
    /// latter is derivable from the parts — comparing it explicitly keeps
    /// this function correct even if `parts_structurally_equal`'s per-part
    /// logic is refined later.
    pub fn structurally_equal(&self, other: &CheckResult) -> bool {
        if self.aggregated_axes() != other.aggregated_axes() {
            return false;
        }
        crate::status::parts_structurally_equal(&self.parts, &other.parts)
    }
}

/// A `CheckResult` is the output of `CheckInstance::execute`; failures never
/// propagate out of it (§4.3 invariant). Builder used internally by
/// `CheckInstance` to assemble one.
pub(crate) struct CheckResultBuilder {
    check_name: String,
    parts: Vec<StatusPart>,
    structured_data: Option<String>,
    check_started: DateTime<Utc>,
    start_instant: std::time::Instant,
    interval: std::time::Duration,
    expected_maximum_run_time: std::time::Duration,
}

impl CheckResultBuilder {
    pub(crate) fn new(
        check_name: impl Into<String>,
        check_started: DateTime<Utc>,
        start_instant: std::time::Instant,
        interval: std::time::Duration,
        expected_maximum_run_time: std::time::Duration,
    ) -> Self {
        Self {
            check_name: check_name.into(),
            parts: Vec::new(),
            structured_data: None,
            check_started,
            start_instant,
            interval,
            expected_maximum_run_time,
        }
    }

    pub(crate) fn push(&mut self, part: StatusPart) {
        self.parts.push(part);
    }

    /// Last writer wins (§4.2 — "at most one structured-data step ... later
    /// ones overwrite").
    pub(crate) fn set_structured_data(&mut self, data: String) {
        self.structured_data = Some(data);
    }

    /// Apply the "assume worst" rule: append a throwable part and a
    /// synthetic `WithAxes` part with every declared axis activated (§4.3
    /// step 4, P2).
    pub(crate) fn record_unhandled_failure(&mut self, throwable: Throwable, declared: AxisSet) {
        self.parts.push(StatusPart::WithThrowable {
            description: Some("unhandled failure during check execution".to_string()),
            throwable,
            unhandled: true,
        });
        if !declared.is_empty() {
            let axis_map: Vec<(Axis, bool)> = declared.iter().map(|a| (a, true)).collect();
            self.parts.push(StatusPart::WithAxes {
                responsible_teams: Vec::new(),
                description: "check crashed — assuming worst for all declared axes".to_string(),
                axis_map,
                affected_entities: None,
                static_compare_string: Some("__crashed__".to_string()),
            });
        }
    }

    pub(crate) fn build(self, now: DateTime<Utc>) -> CheckResult {
        CheckResult {
            check_name: self.check_name,
            parts: self.parts,
            structured_data: self.structured_data,
            running_time_ns: self.start_instant.elapsed().as_nanos() as u64,
            check_started: self.check_started,
            check_completed: now,
            interval: self.interval,
            expected_maximum_run_time: self.expected_maximum_run_time,
        }
    }
}
