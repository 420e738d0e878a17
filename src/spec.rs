//! [`CheckSpecification`] — the builder surface user code uses to lay out a
//! check's steps (§4.2). Steps accumulate into an uncommitted sequence;
//! [`CheckSpecification::commit`] validates and atomically swaps them into a
//! [`CommittedSpec`], which [`crate::instance::CheckInstance`] executes.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::axis::{Axis, AxisSet};
use crate::error::HealthError;
use crate::status::{EntityRef, Link, ResponsibleRef, StatusPart, Throwable};

/// A future boxed for storage in a step closure, so `CheckSpecification` can
/// hold a `Vec<Step>` of heterogeneous async bodies behind one concrete type.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Arbitrary key→value scratch space shared across one execution's steps
/// (§4.2 — "a shared key→value map").
pub type SharedContext = Arc<AsyncMutex<HashMap<String, Box<dyn Any + Send>>>>;

fn new_shared_context() -> SharedContext {
    Arc::new(AsyncMutex::new(HashMap::new()))
}

/// Passed to every step body. Exposes the shared map, the terminator
/// constructors used by `check` steps, and a buffer for info/link/exception
/// parts a step wants to emit independent of (or before) its own verdict.
#[derive(Clone)]
pub struct CheckContext {
    shared: SharedContext,
    extra: Arc<AsyncMutex<Vec<StatusPart>>>,
}

impl CheckContext {
    fn new(shared: SharedContext) -> Self {
        Self { shared, extra: Arc::new(AsyncMutex::new(Vec::new())) }
    }

    /// Store a value under `key`, overwriting any previous value.
    pub async fn put(&self, key: impl Into<String>, value: impl Any + Send) {
        self.shared.lock().await.insert(key.into(), Box::new(value));
    }

    /// Fetch a previously `put` value, downcast to `T`. Returns `None` if
    /// absent or stored under a different type.
    pub async fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.shared
            .lock()
            .await
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Terminator: the check step is ok; no declared axis is activated
    /// unless the body calls [`Outcome::turn_on_axes`] — which it cannot,
    /// since activation from `ok` is never allowed to turn axes on (§4.2,
    /// "activation is monotonic downward only").
    pub fn ok(&self, description: impl Into<String>) -> Outcome {
        Outcome::new(description.into(), false)
    }

    /// Terminator: the check step faults; every axis the step declared is
    /// activated unless later removed via [`Outcome::turn_off_axes`].
    pub fn fault(&self, description: impl Into<String>) -> Outcome {
        Outcome::new(description.into(), true)
    }

    /// Terminator: faults iff `condition` is true, otherwise behaves as
    /// [`CheckContext::ok`].
    pub fn fault_conditionally(&self, condition: bool, description: impl Into<String>) -> Outcome {
        Outcome::new(description.into(), condition)
    }

    /// Emit an info line for this step, independent of whatever terminator
    /// it eventually calls (or doesn't — a `static_text`/`dynamic_text` step
    /// can call this too).
    pub async fn text(&self, line: impl Into<String>) {
        self.extra.lock().await.push(StatusPart::Info { text: line.into() });
    }

    /// Emit a link for this step, independent of its terminator.
    pub async fn link(&self, display_text: impl Into<String>, url: impl Into<String>) {
        self.extra.lock().await.push(StatusPart::LinkPart {
            link: Link { display_text: display_text.into(), url: url.into() },
        });
    }

    /// Record a handled exception for this step, independent of its
    /// terminator.
    pub async fn exception(&self, description: Option<String>, throwable: Throwable) {
        self.extra.lock().await.push(StatusPart::WithThrowable {
            description,
            throwable,
            unhandled: false,
        });
    }

    async fn take_extra_parts(&self) -> Vec<StatusPart> {
        std::mem::take(&mut *self.extra.lock().await)
    }
}

/// The result of a `check` step body. Returned by the terminator
/// constructors on [`CheckContext`]; chainable with `text`/`link`/
/// `exception`/`with_entities`/`with_compare_string`/`turn_off_axes`.
pub struct Outcome {
    description: String,
    faulted: bool,
    turned_off: BTreeSet<Axis>,
    entities: Option<BTreeSet<EntityRef>>,
    compare_string: Option<String>,
    extra_parts: Vec<StatusPart>,
}

impl Outcome {
    fn new(description: String, faulted: bool) -> Self {
        Self {
            description,
            faulted,
            turned_off: BTreeSet::new(),
            entities: None,
            compare_string: None,
            extra_parts: Vec::new(),
        }
    }

    /// Deactivate specific declared axes even though the step faulted.
    /// Never turns an axis *on* — only subtracts from the activated set
    /// `fault()` started with (§4.2: "never turn on — activation is
    /// monotonic downward only").
    pub fn turn_off_axes(mut self, axes: impl IntoIterator<Item = Axis>) -> Self {
        self.turned_off.extend(axes);
        self
    }

    pub fn with_entities(mut self, entities: impl IntoIterator<Item = EntityRef>) -> Self {
        self.entities = Some(entities.into_iter().collect());
        self
    }

    pub fn with_compare_string(mut self, compare_string: impl Into<String>) -> Self {
        self.compare_string = Some(compare_string.into());
        self
    }

    pub fn text(mut self, line: impl Into<String>) -> Self {
        self.extra_parts.push(StatusPart::Info { text: line.into() });
        self
    }

    pub fn link(mut self, display_text: impl Into<String>, url: impl Into<String>) -> Self {
        self.extra_parts.push(StatusPart::LinkPart {
            link: Link {
                display_text: display_text.into(),
                url: url.into(),
            },
        });
        self
    }

    pub fn exception(mut self, description: Option<String>, throwable: Throwable) -> Self {
        self.extra_parts.push(StatusPart::WithThrowable {
            description,
            throwable,
            unhandled: false,
        });
        self
    }
}

type TextFn = Box<dyn Fn(CheckContext) -> BoxFuture<'static, String> + Send + Sync>;
type CheckFn = Box<dyn Fn(CheckContext) -> BoxFuture<'static, Outcome> + Send + Sync>;

enum Step {
    StaticText(String),
    DynamicText(TextFn),
    Link(Link),
    StructuredData(TextFn),
    Check {
        responsible_teams: Vec<ResponsibleRef>,
        declared_axes: Vec<Axis>,
        body: CheckFn,
    },
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::StaticText(s) => f.debug_tuple("StaticText").field(s).finish(),
            Step::DynamicText(_) => f.debug_tuple("DynamicText").field(&"<fn>").finish(),
            Step::Link(l) => f.debug_tuple("Link").field(l).finish(),
            Step::StructuredData(_) => f.debug_tuple("StructuredData").field(&"<fn>").finish(),
            Step::Check {
                responsible_teams,
                declared_axes,
                ..
            } => f
                .debug_struct("Check")
                .field("responsible_teams", responsible_teams)
                .field("declared_axes", declared_axes)
                .field("body", &"<fn>")
                .finish(),
        }
    }
}

/// A mutable builder consumed once by user code (§4.2). Not `Clone`/`Send`
/// by design — it is built up synchronously inside a registration callback
/// and turned into a [`CommittedSpec`] before ever crossing a task boundary.
#[derive(Default)]
pub struct CheckSpecification {
    steps: Vec<Step>,
}

impl CheckSpecification {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn static_text(mut self, line: impl Into<String>) -> Self {
        self.steps.push(Step::StaticText(line.into()));
        self
    }

    pub fn dynamic_text<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        self.steps
            .push(Step::DynamicText(Box::new(move |ctx| Box::pin(f(ctx)))));
        self
    }

    pub fn link(mut self, display_text: impl Into<String>, url: impl Into<String>) -> Self {
        self.steps.push(Step::Link(Link {
            display_text: display_text.into(),
            url: url.into(),
        }));
        self
    }

    pub fn structured_data<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        self.steps
            .push(Step::StructuredData(Box::new(move |ctx| Box::pin(f(ctx)))));
        self
    }

    /// Declares the axes this step may activate and commits to a body that
    /// decides activation at execution time. `axes` must be non-empty and
    /// contain no system axis (enforced at `commit()`, not here, so
    /// specification authoring never fails mid-build).
    pub fn check<F, Fut>(
        mut self,
        responsible_teams: impl IntoIterator<Item = ResponsibleRef>,
        axes: impl IntoIterator<Item = Axis>,
        body: F,
    ) -> Self
    where
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        self.steps.push(Step::Check {
            responsible_teams: responsible_teams.into_iter().collect(),
            declared_axes: axes.into_iter().collect(),
            body: Box::new(move |ctx| Box::pin(body(ctx))),
        });
        self
    }

    /// Validate and freeze the accumulated steps (§4.2 validation rules).
    /// Committing an unchanged specification twice is idempotent (P13):
    /// each call produces an equivalent `CommittedSpec` from the same step
    /// sequence, since `commit` performs no stateful mutation beyond
    /// consuming `self`.
    pub fn commit(self) -> Result<CommittedSpec, HealthError> {
        let mut declared_union = AxisSet::new();

        for step in &self.steps {
            if let Step::Check { declared_axes, .. } = step {
                if declared_axes.is_empty() {
                    return Err(HealthError::InvalidSpecification {
                        reason: "a check step must declare at least one axis".to_string(),
                    });
                }
                for axis in declared_axes {
                    if axis.is_system() {
                        return Err(HealthError::InvalidSpecification {
                            reason: format!("{axis:?} is a system axis and cannot be declared by a check step"),
                        });
                    }
                    declared_union.insert(*axis);
                }
            }
        }

        Ok(CommittedSpec {
            steps: Arc::new(self.steps),
            declared_axes: declared_union,
        })
    }
}

/// The frozen, sharable result of [`CheckSpecification::commit`]. Cheap to
/// clone (an `Arc` underneath) so a re-commit can swap it into a running
/// [`crate::instance::CheckInstance`] without blocking in-flight executions.
#[derive(Clone, Debug)]
pub struct CommittedSpec {
    steps: Arc<Vec<Step>>,
    declared_axes: AxisSet,
}

impl CommittedSpec {
    /// Union of axes declared across every `check` step, closure-applied.
    /// Used by the registry's startup/readiness probes and by the "assume
    /// worst" crash rule.
    pub fn declared_axes(&self) -> &AxisSet {
        &self.declared_axes
    }

    /// Execute every step in order, appending produced parts to `parts` and
    /// the last structured-data write to `structured_data`. Returns `Err`
    /// with the failure's display text if a step body returns an error —
    /// callers (only [`crate::instance::CheckInstance`]) are responsible for
    /// converting that into the "assume worst" throwable part; this function
    /// itself never panics on ordinary step failures.
    pub(crate) async fn execute(
        &self,
        parts: &mut Vec<StatusPart>,
        structured_data: &mut Option<String>,
    ) {
        let shared = new_shared_context();
        for step in self.steps.iter() {
            let ctx = CheckContext::new(shared.clone());
            match step {
                Step::StaticText(text) => parts.push(StatusPart::Info { text: text.clone() }),
                Step::DynamicText(f) => {
                    let text = f(ctx.clone()).await;
                    parts.push(StatusPart::Info { text });
                    parts.extend(ctx.take_extra_parts().await);
                }
                Step::Link(link) => parts.push(StatusPart::LinkPart { link: link.clone() }),
                Step::StructuredData(f) => {
                    *structured_data = Some(f(ctx.clone()).await);
                    parts.extend(ctx.take_extra_parts().await);
                }
                Step::Check {
                    responsible_teams,
                    declared_axes,
                    body,
                } => {
                    let outcome = body(ctx.clone()).await;
                    let axis_map: Vec<(Axis, bool)> = declared_axes
                        .iter()
                        .map(|a| (*a, outcome.faulted && !outcome.turned_off.contains(a)))
                        .collect();
                    parts.push(StatusPart::WithAxes {
                        responsible_teams: responsible_teams.clone(),
                        description: outcome.description.clone(),
                        axis_map,
                        affected_entities: outcome.entities.clone(),
                        static_compare_string: outcome.compare_string.clone(),
                    });
                    parts.extend(ctx.take_extra_parts().await);
                    parts.extend(outcome.extra_parts);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_rejects_check_with_no_axes() {
        let spec = CheckSpecification::new().check(vec![], vec![], |ctx| async move { ctx.ok("fine") });
        let err = spec.commit().unwrap_err();
        assert!(matches!(err, HealthError::InvalidSpecification { .. }));
    }

    #[tokio::test]
    async fn commit_rejects_system_axis() {
        let spec = CheckSpecification::new().check(vec![], vec![Axis::SysCrashed], |ctx| async move {
            ctx.ok("fine")
        });
        let err = spec.commit().unwrap_err();
        assert!(matches!(err, HealthError::InvalidSpecification { .. }));
    }

    #[tokio::test]
    async fn commit_closes_sibling_and_lattice_axes() {
        let spec = CheckSpecification::new().check(
            vec![ResponsibleRef::Operations],
            vec![Axis::DegradedComplete],
            |ctx| async move { ctx.ok("fine") },
        );
        let committed = spec.commit().unwrap();
        assert!(committed.declared_axes().contains(Axis::DegradedPartial));
        assert!(committed.declared_axes().contains(Axis::DegradedMinor));
    }

    #[tokio::test]
    async fn ok_step_activates_nothing() {
        let spec = CheckSpecification::new().check(
            vec![ResponsibleRef::Operations],
            vec![Axis::NotReady],
            |ctx| async move { ctx.ok("ready") },
        );
        let committed = spec.commit().unwrap();
        let mut parts = Vec::new();
        let mut data = None;
        committed.execute(&mut parts, &mut data).await;
        assert!(parts[0].is_ok());
    }

    #[tokio::test]
    async fn fault_step_activates_all_declared_axes_by_default() {
        let spec = CheckSpecification::new().check(
            vec![ResponsibleRef::Operations],
            vec![Axis::NotReady, Axis::AffectsCustomers],
            |ctx| async move { ctx.fault("down") },
        );
        let committed = spec.commit().unwrap();
        let mut parts = Vec::new();
        let mut data = None;
        committed.execute(&mut parts, &mut data).await;
        let activated = parts[0].activated_axes();
        assert!(activated.contains(Axis::NotReady));
        assert!(activated.contains(Axis::AffectsCustomers));
    }

    #[tokio::test]
    async fn turn_off_axes_deactivates_only_named_axis() {
        let spec = CheckSpecification::new().check(
            vec![ResponsibleRef::Operations],
            vec![Axis::NotReady, Axis::AffectsCustomers],
            |ctx| async move { ctx.fault("partially down").turn_off_axes([Axis::AffectsCustomers]) },
        );
        let committed = spec.commit().unwrap();
        let mut parts = Vec::new();
        let mut data = None;
        committed.execute(&mut parts, &mut data).await;
        let activated = parts[0].activated_axes();
        assert!(activated.contains(Axis::NotReady));
        assert!(!activated.contains(Axis::AffectsCustomers));
    }

    #[tokio::test]
    async fn structured_data_last_write_wins() {
        let spec = CheckSpecification::new()
            .structured_data(|_ctx| async { "first".to_string() })
            .structured_data(|_ctx| async { "second".to_string() });
        let committed = spec.commit().unwrap();
        let mut parts = Vec::new();
        let mut data = None;
        committed.execute(&mut parts, &mut data).await;
        assert_eq!(data.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn check_context_can_emit_text_before_its_own_terminator() {
        let spec = CheckSpecification::new().check(
            vec![ResponsibleRef::Operations],
            vec![Axis::NotReady],
            |ctx| async move {
                ctx.text("dialing primary replica").await;
                ctx.link("runbook", "https://runbooks.example/db").await;
                ctx.ok("ready")
            },
        );
        let committed = spec.commit().unwrap();
        let mut parts = Vec::new();
        let mut data = None;
        committed.execute(&mut parts, &mut data).await;
        assert!(parts[0].is_ok());
        assert!(parts.iter().any(|p| matches!(p, StatusPart::Info { text } if text == "dialing primary replica")));
        assert!(parts.iter().any(|p| matches!(p, StatusPart::LinkPart { link } if link.display_text == "runbook")));
    }

    #[tokio::test]
    async fn shared_context_put_get_round_trips_across_steps() {
        let spec = CheckSpecification::new()
            .dynamic_text(|ctx| async move {
                ctx.put("count", 7i32).await;
                "wrote".to_string()
            })
            .check(vec![], vec![Axis::NotReady], |ctx| async move {
                let v: Option<i32> = ctx.get("count").await;
                ctx.fault_conditionally(v != Some(7), "unexpected")
            });
        let committed = spec.commit().unwrap();
        let mut parts = Vec::new();
        let mut data = None;
        committed.execute(&mut parts, &mut data).await;
        assert!(parts[1].is_ok());
    }
}
