//! Status parts — the building blocks of a [`crate::result::CheckResult`],
//! and the structural-equality rule (§4.1) used to decide whether a change
//! is worth publishing to observers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::axis::{Axis, AxisSet};

/// Responsible-team reference. Source models this as a string-like enum
/// (spec §9); we keep the predefined members strongly typed and fall back to
/// `Other` for arbitrary strings so user code is never blocked.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ResponsibleRef {
    Developers,
    Operations,
    BackOffice,
    FrontOffice,
    Other(String),
}

impl ResponsibleRef {
    pub fn as_str(&self) -> &str {
        match self {
            ResponsibleRef::Developers => "DEVELOPERS",
            ResponsibleRef::Operations => "OPERATIONS",
            ResponsibleRef::BackOffice => "BACK_OFFICE",
            ResponsibleRef::FrontOffice => "FRONT_OFFICE",
            ResponsibleRef::Other(s) => s,
        }
    }
}

impl From<&str> for ResponsibleRef {
    fn from(s: &str) -> Self {
        match s {
            "DEVELOPERS" => ResponsibleRef::Developers,
            "OPERATIONS" => ResponsibleRef::Operations,
            "BACK_OFFICE" => ResponsibleRef::BackOffice,
            "FRONT_OFFICE" => ResponsibleRef::FrontOffice,
            other => ResponsibleRef::Other(other.to_string()),
        }
    }
}

impl From<String> for ResponsibleRef {
    fn from(s: String) -> Self {
        ResponsibleRef::from(s.as_str())
    }
}

impl From<ResponsibleRef> for String {
    fn from(r: ResponsibleRef) -> Self {
        r.as_str().to_string()
    }
}

/// `{type, id}` reference to an entity affected by a fault. Equality and
/// ordering are by both fields, and a set of these is compared order-
/// insensitively (spec §9 — "affected-entity equality uses set equality").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

/// A captured exception/failure carried by [`StatusPart::WithThrowable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Throwable {
    pub class_name: String,
    pub message: String,
    pub stack_trace: String,
}

impl Throwable {
    pub fn from_display(class_name: impl Into<String>, err: &dyn std::fmt::Display) -> Self {
        let message = err.to_string();
        Self {
            class_name: class_name.into(),
            stack_trace: message.clone(),
            message,
        }
    }
}

/// Link to supplementary material (runbook, dashboard, ticket).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub display_text: String,
    pub url: String,
}

/// One element of a [`crate::result::CheckResult`] (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StatusPart {
    /// Pure text line — no axes, no level.
    Info { text: String },
    /// A link to supplementary material.
    LinkPart { link: Link },
    /// A fault/status-bearing part: declares a subset of axes and which of
    /// those are currently activated.
    WithAxes {
        responsible_teams: Vec<ResponsibleRef>,
        description: String,
        axis_map: Vec<(Axis, bool)>,
        affected_entities: Option<BTreeSet<EntityRef>>,
        static_compare_string: Option<String>,
    },
    /// A captured failure. `unhandled` failures additionally carry
    /// `SYS_CRASHED` when aggregated (see [`crate::result::CheckResult`]).
    WithThrowable {
        description: Option<String>,
        throwable: Throwable,
        unhandled: bool,
    },
}

impl StatusPart {
    /// `true` iff every axis in a `WithAxes` part's map is inactive. Other
    /// variants that don't carry axes are trivially ok; `WithThrowable` is
    /// ok iff it isn't `unhandled` (an unhandled throwable always implies
    /// `SYS_CRASHED`, so it can never be "ok").
    pub fn is_ok(&self) -> bool {
        match self {
            StatusPart::Info { .. } | StatusPart::LinkPart { .. } => true,
            StatusPart::WithAxes { axis_map, .. } => axis_map.iter().all(|(_, active)| !*active),
            StatusPart::WithThrowable { unhandled, .. } => !*unhandled,
        }
    }

    /// Axes this part declares (regardless of activation).
    pub fn declared_axes(&self) -> AxisSet {
        match self {
            StatusPart::WithAxes { axis_map, .. } => {
                axis_map.iter().map(|(axis, _)| *axis).collect()
            }
            _ => AxisSet::new(),
        }
    }

    /// Axes this part has activated.
    pub fn activated_axes(&self) -> AxisSet {
        match self {
            StatusPart::WithAxes { axis_map, .. } => axis_map
                .iter()
                .filter(|(_, active)| *active)
                .map(|(axis, _)| *axis)
                .collect(),
            StatusPart::WithThrowable { unhandled, .. } if *unhandled => {
                [Axis::SysCrashed].into_iter().collect()
            }
            _ => AxisSet::new(),
        }
    }
}

/// Structural equality between two `WithAxes` parts (§4.1).
fn with_axes_equal(
    a_teams: &[ResponsibleRef],
    a_map: &[(Axis, bool)],
    a_entities: &Option<BTreeSet<EntityRef>>,
    a_compare: &Option<String>,
    a_desc: &str,
    b_teams: &[ResponsibleRef],
    b_map: &[(Axis, bool)],
    b_entities: &Option<BTreeSet<EntityRef>>,
    b_compare: &Option<String>,
    b_desc: &str,
) -> bool {
    if a_teams != b_teams {
        return false;
    }
    let a_ok = a_map.iter().all(|(_, active)| !*active);
    let b_ok = b_map.iter().all(|(_, active)| !*active);
    if a_ok && b_ok {
        let a_declared: AxisSet = a_map.iter().map(|(axis, _)| *axis).collect();
        let b_declared: AxisSet = b_map.iter().map(|(axis, _)| *axis).collect();
        return a_declared == b_declared;
    }
    if a_ok != b_ok {
        return false;
    }
    // Both not-ok: full axis maps must match.
    let a_full: AxisSet = a_map.iter().copied().filter(|(_, v)| *v).map(|(a, _)| a).collect();
    let b_full: AxisSet = b_map.iter().copied().filter(|(_, v)| *v).map(|(a, _)| a).collect();
    let a_declared: AxisSet = a_map.iter().map(|(axis, _)| *axis).collect();
    let b_declared: AxisSet = b_map.iter().map(|(axis, _)| *axis).collect();
    if a_declared != b_declared || a_full != b_full {
        return false;
    }
    match (a_entities, b_entities) {
        (Some(ae), Some(be)) => ae == be,
        (None, None) => match (a_compare, b_compare) {
            (Some(ac), Some(bc)) => ac == bc,
            (None, None) => a_desc == b_desc,
            _ => false,
        },
        _ => false,
    }
}

fn with_throwable_equal(a: &Throwable, a_unhandled: bool, b: &Throwable, b_unhandled: bool) -> bool {
    a_unhandled == b_unhandled
        && a.class_name == b.class_name
        && a.message == b.message
        && a.stack_trace == b.stack_trace
}

/// Compare two status-part sequences for structural equality (§4.1). Used
/// by [`crate::result::CheckResult::structurally_equal`] — callers should
/// generally use that instead, since the rule also checks the aggregated
/// axis map which is derived from the whole result, not just its parts.
pub fn parts_structurally_equal(a: &[StatusPart], b: &[StatusPart]) -> bool {
    fn with_axes(parts: &[StatusPart]) -> Vec<&StatusPart> {
        parts
            .iter()
            .filter(|p| matches!(p, StatusPart::WithAxes { .. }))
            .collect()
    }
    fn with_throwables(parts: &[StatusPart]) -> Vec<&StatusPart> {
        parts
            .iter()
            .filter(|p| matches!(p, StatusPart::WithThrowable { .. }))
            .collect()
    }

    let a_axes = with_axes(a);
    let b_axes = with_axes(b);
    if a_axes.len() != b_axes.len() {
        return false;
    }
    for (pa, pb) in a_axes.iter().zip(b_axes.iter()) {
        let (
            StatusPart::WithAxes {
                responsible_teams: at,
                description: ad,
                axis_map: am,
                affected_entities: ae,
                static_compare_string: ac,
            },
            StatusPart::WithAxes {
                responsible_teams: bt,
                description: bd,
                axis_map: bm,
                affected_entities: be,
                static_compare_string: bc,
            },
        ) = (pa, pb)
        else {
            unreachable!("filtered to WithAxes above");
        };
        if !with_axes_equal(at, am, ae, ac, ad, bt, bm, be, bc, bd) {
            return false;
        }
    }

    let a_thr = with_throwables(a);
    let b_thr = with_throwables(b);
    if a_thr.len() != b_thr.len() {
        return false;
    }
    for (pa, pb) in a_thr.iter().zip(b_thr.iter()) {
        let (
            StatusPart::WithThrowable {
                throwable: at,
                unhandled: au,
                ..
            },
            StatusPart::WithThrowable {
                throwable: bt,
                unhandled: bu,
                ..
            },
        ) = (pa, pb)
        else {
            unreachable!("filtered to WithThrowable above");
        };
        if !with_throwable_equal(at, *au, bt, *bu) {
            return false;
        }
    }

    true
}
