//! [`CheckRunner`] (§4.4) — the per-check scheduler. The most concurrency-
//! sensitive component: one dedicated worker per check, an interval policy
//! that shortens while not-ok, on-demand refresh, a startup gate for slow
//! first executions, and change-detected observer publication.
//!
//! Concurrency primitives (§5 implementation note): the condition variable
//! is a [`tokio::sync::Notify`]; the edge-triggered "run again before
//! sleeping" flag is an [`std::sync::atomic::AtomicBool`]; the cached
//! `lastResult` plus "latch released on first result" are realized together
//! as a [`tokio::sync::watch`] channel, since a watch channel already gives
//! "holds latest value" and "notify waiters of a change" with the ordering
//! guarantee §5 requires; at-most-one-inflight (P10) is enforced by a
//! [`tokio::sync::Mutex<()>`] execution guard shared between the scheduled
//! worker and synchronous/forceFresh callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::axis::Axis;
use crate::clock::Clock;
use crate::error::RunnerError;
use crate::instance::CheckInstance;
use crate::logger::CheckLogger;
use crate::report::check_result_to_dto;
use crate::result::{CheckResult, CheckResultBuilder};
use crate::status::StatusPart;

/// One runner's published transition, handed to the registry's observer
/// fan-out worker.
#[derive(Clone)]
pub struct PublishedUpdate {
    pub name: String,
    pub result: Arc<CheckResult>,
}

/// Per-check scheduler. Constructed and owned by [`crate::registry::Registry`].
pub struct CheckRunner {
    name: String,
    sync: bool,
    interval: Duration,
    interval_when_not_ok: Duration,
    expected_maximum_run_time: Duration,
    startup_latch_grace: Duration,
    created_at: DateTime<Utc>,

    instance: Arc<CheckInstance>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn CheckLogger>,
    observer_tx: mpsc::Sender<PublishedUpdate>,

    watch_tx: watch::Sender<Option<Arc<CheckResult>>>,
    notify: Arc<Notify>,
    update_requested: AtomicBool,
    should_run: AtomicBool,
    execution_guard: AsyncMutex<()>,
    pending_refreshes: AsyncMutex<Vec<oneshot::Sender<Result<Arc<CheckResult>, RunnerError>>>>,
    worker_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl CheckRunner {
    pub fn new(
        name: impl Into<String>,
        sync: bool,
        interval: Duration,
        interval_when_not_ok: Duration,
        expected_maximum_run_time: Duration,
        startup_latch_grace: Duration,
        instance: Arc<CheckInstance>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn CheckLogger>,
        observer_tx: mpsc::Sender<PublishedUpdate>,
    ) -> Arc<Self> {
        let (watch_tx, _rx) = watch::channel(None);
        Arc::new(Self {
            name: name.into(),
            sync,
            interval,
            interval_when_not_ok,
            expected_maximum_run_time,
            startup_latch_grace,
            created_at: clock.now(),
            instance,
            clock,
            logger,
            observer_tx,
            watch_tx,
            notify: Arc::new(Notify::new()),
            update_requested: AtomicBool::new(false),
            should_run: AtomicBool::new(true),
            execution_guard: AsyncMutex::new(()),
            pending_refreshes: AsyncMutex::new(Vec::new()),
            worker_handle: AsyncMutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &crate::metadata::CheckMetadata {
        self.instance.metadata()
    }

    fn sleep_ok(&self) -> Duration {
        self.interval
    }

    fn sleep_not_ok(&self) -> Duration {
        self.interval_when_not_ok
    }

    /// Declared axes of the currently committed specification. Consulted by
    /// the slow-startup synthetic result and by the registry's probe
    /// filters.
    pub async fn declared_axes(&self) -> crate::axis::AxisSet {
        self.instance.declared_axes().await
    }

    /// Spawn the worker loop. Idempotent only in the sense that calling it
    /// twice replaces the tracked handle — callers (the registry) are
    /// expected to call this exactly once per `start`/`stop` cycle.
    pub fn start(self: &Arc<Self>) {
        self.should_run.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.worker_loop().await });
        if let Ok(mut slot) = self.worker_handle.try_lock() {
            *slot = Some(handle);
        }
    }

    /// Stop the worker, wait for its current iteration to finish, then
    /// cancel any refresh promises still outstanding (§4.4 "On stop()", §7).
    pub async fn stop(&self) {
        self.should_run.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
        let handle = self.worker_handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        let mut pending = self.pending_refreshes.lock().await;
        for sender in pending.drain(..) {
            let _ = sender.send(Err(RunnerError::Stopped));
        }
    }

    /// §4.4 "Wake-up signals" — `requestUpdate()`: at least one more
    /// execution happens after this call returns (P9), unless the runner
    /// stops first.
    pub fn request_update(&self) {
        self.update_requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Queue a one-shot refresh promise, resolved by the next completed
    /// execution (or rejected on stop/failure).
    pub async fn refresh_status(&self) -> oneshot::Receiver<Result<Arc<CheckResult>, RunnerError>> {
        let (tx, rx) = oneshot::channel();
        self.pending_refreshes.lock().await.push(tx);
        self.request_update();
        rx
    }

    /// Wait up to `timeout` for the next refresh (§5 "cancellation/timeout").
    pub async fn update_status_and_wait(&self, timeout: Duration) -> Result<Arc<CheckResult>, RunnerError> {
        let rx = self.refresh_status().await;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RunnerError::Stopped),
            Err(_) => Err(RunnerError::Timeout),
        }
    }

    /// §4.4: synchronous checks, and any `forceFresh` request, always
    /// execute on the caller's task; async checks otherwise return the
    /// cached result, or — if none exists yet — wait on the startup latch
    /// and fall back to a synthetic slow-startup result.
    pub async fn get_status(&self, force_fresh: bool) -> Arc<CheckResult> {
        if self.sync || force_fresh {
            return self.run_once().await;
        }

        if let Some(cached) = self.watch_tx.borrow().clone() {
            return cached;
        }

        let grace = self.expected_maximum_run_time + self.startup_latch_grace;
        let mut rx = self.watch_tx.subscribe();
        let waited = tokio::time::timeout(grace, async {
            loop {
                if rx.changed().await.is_err() {
                    return None;
                }
                if let Some(value) = rx.borrow().clone() {
                    return Some(value);
                }
            }
        })
        .await;

        match waited {
            Ok(Some(value)) => value,
            _ => Arc::new(self.synthetic_slow_startup_result().await),
        }
    }

    /// Execute once under the at-most-one-inflight guard (P10), update the
    /// cache, publish on structural change, emit to the logger when not-ok,
    /// and resolve queued refresh promises.
    async fn run_once(&self) -> Arc<CheckResult> {
        let _guard = self.execution_guard.lock().await;

        let result = Arc::new(self.instance.execute().await);

        let previous = self.watch_tx.borrow().clone();
        let changed = match &previous {
            Some(prior) => !prior.structurally_equal(&result),
            None => true,
        };
        self.watch_tx.send_replace(Some(result.clone()));

        if changed {
            let _ = self
                .observer_tx
                .try_send(PublishedUpdate {
                    name: self.name.clone(),
                    result: result.clone(),
                });
        }

        if !result.ok() {
            let dto = check_result_to_dto(self.instance.metadata(), &result, self.clock.now());
            self.logger.log_not_ok(&dto);
        }

        let mut pending = self.pending_refreshes.lock().await;
        for sender in pending.drain(..) {
            let _ = sender.send(Ok(result.clone()));
        }

        result
    }

    /// §4.4 "Slow startup": built when no result has arrived within
    /// `expectedMaximumRunTime + startupLatchGrace` of the first call.
    async fn synthetic_slow_startup_result(&self) -> CheckResult {
        let now = self.clock.now();
        let declared = self.instance.declared_axes().await;

        let mut builder = CheckResultBuilder::new(
            self.name.clone(),
            now,
            self.clock.instant(),
            self.interval,
            self.expected_maximum_run_time,
        );

        builder.push(StatusPart::Info {
            text: "check has not completed its first execution yet".to_string(),
        });

        if declared.contains(Axis::NotReady) {
            builder.push(StatusPart::WithAxes {
                responsible_teams: Vec::new(),
                description: "not ready — startup still in progress".to_string(),
                axis_map: vec![(Axis::NotReady, true)],
                affected_entities: None,
                static_compare_string: Some("__slow_startup_not_ready__".to_string()),
            });
        }

        let up_for = now.signed_duration_since(self.created_at);
        let assume_worst_after =
            chrono::Duration::from_std((self.interval + self.expected_maximum_run_time) * 2).unwrap_or_default();
        if up_for > assume_worst_after && !declared.is_empty() {
            let axis_map: Vec<(Axis, bool)> = declared.iter().map(|a| (a, true)).collect();
            builder.push(StatusPart::WithAxes {
                responsible_teams: Vec::new(),
                description: "async check has never completed — assuming worst".to_string(),
                axis_map,
                affected_entities: None,
                static_compare_string: Some("__slow_startup_assume_worst__".to_string()),
            });
        }

        builder.build(now)
    }

    /// The worker thread must never die. A single iteration's non-step work
    /// (cache update, observer publish, logging, refresh resolution) runs
    /// inside its own `tokio::spawn` so an unexpected panic anywhere in
    /// `run_once` — not just inside a check step — is caught as a
    /// `JoinError` instead of unwinding out of this loop. On that path,
    /// queued refresh promises are rejected with `RunnerError::ExecutionFailure`,
    /// the failure is logged, and the worker sleeps `sleep_not_ok()` before
    /// resuming, exactly as if the check itself had faulted.
    async fn worker_loop(self: Arc<Self>) {
        while self.should_run.load(Ordering::SeqCst) {
            self.update_requested.store(false, Ordering::SeqCst);

            let this = Arc::clone(&self);
            let outcome = tokio::spawn(async move { this.run_once().await }).await;

            let result = match outcome {
                Ok(result) => result,
                Err(join_err) => {
                    tracing::error!(
                        check = %self.name,
                        error = %join_err,
                        "worker iteration failed unexpectedly; assuming worst and continuing"
                    );
                    let mut pending = self.pending_refreshes.lock().await;
                    for sender in pending.drain(..) {
                        let _ = sender.send(Err(RunnerError::ExecutionFailure(join_err.to_string())));
                    }
                    drop(pending);

                    if !self.should_run.load(Ordering::SeqCst) {
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(self.sleep_not_ok()) => {}
                        _ = self.notify.notified() => {}
                    }
                    continue;
                }
            };

            if !self.should_run.load(Ordering::SeqCst) {
                break;
            }
            if self.update_requested.load(Ordering::SeqCst) {
                continue;
            }

            let sleep_for = if result.ok() { self.sleep_ok() } else { self.sleep_not_ok() };
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.notify.notified() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::metadata::CheckMetadataBuilder;
    use crate::spec::CheckSpecification;
    use crate::status::ResponsibleRef;
    use std::sync::atomic::AtomicU32;

    fn make_runner(
        sync: bool,
        ok: bool,
        clock: Arc<dyn Clock>,
    ) -> (Arc<CheckRunner>, mpsc::Receiver<PublishedUpdate>) {
        let metadata = CheckMetadataBuilder::new("db")
            .sync(sync)
            .interval_secs(600)
            .interval_when_not_ok_secs(5)
            .expected_maximum_run_time_secs(4)
            .build();
        let spec = CheckSpecification::new().check(
            vec![ResponsibleRef::Operations],
            vec![Axis::NotReady],
            move |ctx| async move {
                if ok {
                    ctx.ok("fine")
                } else {
                    ctx.fault("broken")
                }
            },
        );
        let committed = spec.commit().unwrap();
        let instance = Arc::new(CheckInstance::new(metadata.clone(), committed, clock.clone()));
        let (tx, rx) = mpsc::channel(16);
        let runner = CheckRunner::new(
            "db",
            metadata.sync,
            metadata.interval,
            metadata.interval_when_not_ok,
            metadata.expected_maximum_run_time,
            Duration::from_secs(2),
            instance,
            clock,
            Arc::new(crate::logger::NoopCheckLogger),
            tx,
        );
        (runner, rx)
    }

    #[tokio::test]
    async fn sync_get_status_executes_on_caller_task() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(Utc::now()));
        let (runner, _rx) = make_runner(true, true, clock);
        let result = runner.get_status(false).await;
        assert!(result.ok());
    }

    #[tokio::test]
    async fn force_fresh_bypasses_cache_even_when_async() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(Utc::now()));
        let (runner, _rx) = make_runner(false, true, clock);
        let result = runner.get_status(true).await;
        assert!(result.ok());
    }

    #[tokio::test]
    async fn async_get_status_falls_back_to_slow_startup_synthetic_result() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(Utc::now()));
        let (runner, _rx) = make_runner(false, true, clock);
        // No worker started, so lastResult is never populated; the latch
        // wait should time out quickly since the grace period is short.
        let result = tokio::time::timeout(Duration::from_secs(10), runner.get_status(false))
            .await
            .expect("get_status should not hang past the startup grace");
        assert!(!result.parts.is_empty());
    }

    #[tokio::test]
    async fn background_worker_publishes_on_structural_change_only() {
        let ok = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let calls = Arc::new(AtomicU32::new(0));
        let metadata = CheckMetadataBuilder::new("db")
            .interval_secs(600)
            .interval_when_not_ok_secs(1)
            .build();
        let ok_flag = ok.clone();
        let call_count = calls.clone();
        let spec = CheckSpecification::new().check(vec![ResponsibleRef::Operations], vec![Axis::NotReady], move |ctx| {
            let ok_flag = ok_flag.clone();
            let call_count = call_count.clone();
            async move {
                call_count.fetch_add(1, Ordering::SeqCst);
                if ok_flag.load(Ordering::SeqCst) {
                    ctx.ok("fine")
                } else {
                    ctx.fault("broken")
                }
            }
        });
        let committed = spec.commit().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(crate::clock::SystemClock);
        let instance = Arc::new(CheckInstance::new(metadata.clone(), committed, clock.clone()));
        let (tx, mut rx) = mpsc::channel(16);
        let runner = CheckRunner::new(
            "db",
            false,
            metadata.interval,
            metadata.interval_when_not_ok,
            metadata.expected_maximum_run_time,
            Duration::from_secs(2),
            instance,
            clock,
            Arc::new(crate::logger::NoopCheckLogger),
            tx,
        );
        runner.start();

        let first = rx.recv().await.expect("first execution publishes");
        assert!(first.result.ok());

        ok.store(false, Ordering::SeqCst);
        runner.request_update();
        let second = rx.recv().await.expect("transition to not-ok publishes");
        assert!(!second.result.ok());

        runner.stop().await;
    }
}
