//! [`Registry`] (§4.5) — keyed check ownership, the tri-state lifecycle,
//! report assembly, probe views, and observer fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::axis::Axis;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::HealthError;
use crate::instance::CheckInstance;
use crate::logger::{CheckLogger, TracingCheckLogger};
use crate::metadata::CheckMetadataBuilder;
use crate::report::{
    self, aggregate, check_result_to_dto, service_info_to_dto, CreateReportRequest, Probe, ReportDto,
};
use crate::runner::{CheckRunner, PublishedUpdate};
use crate::service_info::ServiceInfoProvider;
use crate::spec::CheckSpecification;

/// A subscriber to structural status changes (§6 `subscribeToStatusChanges`).
/// Invoked on the dedicated observer worker; kept synchronous so a panicking
/// observer can be caught without the unsoundness of unwinding across an
/// `.await` point.
pub type Observer = Arc<dyn Fn(PublishedUpdate) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Initialising,
    Running,
    Stopped { shutdown: bool },
}

/// Owns every registered check's [`CheckRunner`] and the registry-wide
/// observer fan-out worker. Cheap to share: construct once behind an `Arc`
/// (`Registry::new` already returns one).
pub struct Registry {
    lifecycle: SyncMutex<Lifecycle>,
    runners: RwLock<HashMap<String, Arc<CheckRunner>>>,
    observers: RwLock<Vec<Observer>>,
    finished_startup_checks: SyncMutex<HashSet<String>>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn CheckLogger>,
    service_info: Arc<dyn ServiceInfoProvider>,
    observer_tx: mpsc::Sender<PublishedUpdate>,
    fanout_shutdown: Arc<tokio::sync::Notify>,
    fanout_task: SyncMutex<Option<JoinHandle<()>>>,
}

impl Registry {
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn CheckLogger>,
        service_info: Arc<dyn ServiceInfoProvider>,
    ) -> Arc<Self> {
        let (observer_tx, observer_rx) = mpsc::channel(config.observer_channel_capacity);
        let fanout_shutdown = Arc::new(tokio::sync::Notify::new());

        let registry = Arc::new(Self {
            lifecycle: SyncMutex::new(Lifecycle::Initialising),
            runners: RwLock::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            finished_startup_checks: SyncMutex::new(HashSet::new()),
            config,
            clock,
            logger,
            service_info,
            observer_tx,
            fanout_shutdown: fanout_shutdown.clone(),
            fanout_task: SyncMutex::new(None),
        });

        // The fan-out task shares `registry.observers` via a clone of the
        // registry `Arc` itself, so `subscribe_to_status_changes` and the
        // worker always see the same list.
        let fanout_observers = Arc::clone(&registry);
        let handle = tokio::spawn(run_fanout(observer_rx, fanout_observers, fanout_shutdown));
        *registry.fanout_task.lock().unwrap() = Some(handle);

        registry
    }

    /// Convenience constructor wiring the default `tracing`-backed logger
    /// and the real system clock, the way most callers will use this crate.
    pub fn with_defaults(config: EngineConfig, service_info: Arc<dyn ServiceInfoProvider>) -> Arc<Self> {
        Self::new(config, Arc::new(SystemClock), Arc::new(TracingCheckLogger), service_info)
    }

    fn is_shutdown(&self) -> bool {
        matches!(*self.lifecycle.lock().unwrap(), Lifecycle::Stopped { shutdown: true })
    }

    /// Build `metadata`'s spec via `build`, commit it, and register the
    /// resulting runner. Autostarts the runner if the registry is already
    /// running (§6 `registerCheck`). Any interval/timeout `metadata` leaves
    /// unset is filled in from this registry's `EngineConfig` rather than
    /// the builder's own built-in defaults.
    pub async fn register<F>(&self, metadata: CheckMetadataBuilder, build: F) -> Result<(), HealthError>
    where
        F: FnOnce(CheckSpecification) -> CheckSpecification,
    {
        if self.is_shutdown() {
            return Err(HealthError::AlreadyShutdown);
        }

        let metadata = metadata.build_with_config(&self.config);
        let name = metadata.name.clone();
        {
            let runners = self.runners.read().await;
            if runners.contains_key(&name) {
                return Err(HealthError::Duplicate { name });
            }
        }

        let committed = build(CheckSpecification::new()).commit()?;
        let instance = Arc::new(CheckInstance::new(metadata.clone(), committed, self.clock.clone()));
        let runner = CheckRunner::new(
            name.clone(),
            metadata.sync,
            metadata.interval,
            metadata.interval_when_not_ok,
            metadata.expected_maximum_run_time,
            Duration::from_secs(self.config.startup_latch_grace_secs),
            instance,
            self.clock.clone(),
            self.logger.clone(),
            self.observer_tx.clone(),
        );

        let should_start = matches!(*self.lifecycle.lock().unwrap(), Lifecycle::Running);
        self.runners.write().await.insert(name, runner.clone());
        if should_start {
            runner.start();
        }
        Ok(())
    }

    pub async fn start_health_checks(&self) -> Result<(), HealthError> {
        {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            if matches!(*lifecycle, Lifecycle::Stopped { shutdown: true }) {
                return Err(HealthError::AlreadyShutdown);
            }
            *lifecycle = Lifecycle::Running;
        }
        let runners = self.runners.read().await;
        for runner in runners.values() {
            runner.start();
        }
        Ok(())
    }

    pub async fn stop_health_checks(&self) -> Result<(), HealthError> {
        {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            if matches!(*lifecycle, Lifecycle::Stopped { shutdown: true }) {
                return Err(HealthError::AlreadyShutdown);
            }
            *lifecycle = Lifecycle::Stopped { shutdown: false };
        }
        let runners = self.runners.read().await;
        for runner in runners.values() {
            runner.stop().await;
        }
        Ok(())
    }

    /// Stop every runner and permanently disable restart. Grants the
    /// observer fan-out worker up to `shutdown_grace_ms` to finish its
    /// current dispatch before the queue is abandoned (§4.5, §5).
    pub async fn shutdown(&self) {
        {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            *lifecycle = Lifecycle::Stopped { shutdown: true };
        }
        let runners = self.runners.read().await;
        for runner in runners.values() {
            runner.stop().await;
        }
        drop(runners);

        self.fanout_shutdown.notify_one();
        let handle = self.fanout_task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(Duration::from_millis(self.config.shutdown_grace_ms), handle).await;
        }
    }

    pub async fn trigger_update_for_health_check(&self, name: &str) -> Result<(), HealthError> {
        let runners = self.runners.read().await;
        let runner = runners.get(name).ok_or_else(|| HealthError::NoSuchCheck { name: name.to_string() })?;
        runner.request_update();
        Ok(())
    }

    pub async fn subscribe_to_status_changes(&self, observer: Observer) {
        self.observers.write().await.push(observer);
    }

    pub async fn get_registered_health_checks(&self) -> Vec<String> {
        self.runners.read().await.keys().cloned().collect()
    }

    /// §4.5 "Report assembly". Fails with `NotRunning` while the registry
    /// has never been started.
    pub async fn create_report(&self, req: CreateReportRequest) -> Result<ReportDto, HealthError> {
        if matches!(*self.lifecycle.lock().unwrap(), Lifecycle::Initialising) {
            return Err(HealthError::NotRunning);
        }

        let now = self.clock.now();
        let runners = self.runners.read().await;
        let mut checks = Vec::new();

        for (name, runner) in runners.iter() {
            if req.exclude_checks.contains(name) {
                continue;
            }
            let declared = runner.declared_axes().await;
            if let Some(wanted) = &req.axes {
                if !wanted.iter().any(|axis| declared.contains(axis)) {
                    continue;
                }
            }
            let result = runner.get_status(req.force_fresh_data).await;
            checks.push(check_result_to_dto(runner.metadata(), &result, now));
        }
        drop(runners);

        checks.sort_by(|a, b| a.name.cmp(&b.name));
        let (axes, ready, live, critical_fault) = aggregate(&checks);
        let service = service_info_to_dto(&self.service_info.service_info(), now);

        Ok(ReportDto {
            version: report::DTO_VERSION.to_string(),
            service,
            health_checks: checks,
            axes,
            ready,
            live,
            critical_fault,
            synchronous: req.force_fresh_data,
        })
    }

    async fn probe_report(&self, probe: Probe, extra_excludes: HashSet<String>) -> Result<ReportDto, HealthError> {
        let req = CreateReportRequest {
            axes: Some([probe.gate_axis()].into_iter().collect()),
            exclude_checks: extra_excludes,
            force_fresh_data: matches!(probe, Probe::Startup),
        };
        self.create_report(req).await
    }

    /// §4.5 startup probe: skips checks already known ready
    /// (`finishedStartupChecks`), forces fresh execution, and records every
    /// check that just reported ready so it is never queried again (P8).
    pub async fn get_startup_status(&self) -> Result<ReportDto, HealthError> {
        let already_finished = self.finished_startup_checks.lock().unwrap().clone();
        let report = self.probe_report(Probe::Startup, already_finished).await?;

        let mut finished = self.finished_startup_checks.lock().unwrap();
        for check in &report.health_checks {
            if !check.axes.activated.contains(&Axis::NotReady) {
                finished.insert(check.name.clone());
            }
        }
        Ok(report)
    }

    pub async fn get_readiness_status(&self) -> Result<ReportDto, HealthError> {
        self.probe_report(Probe::Readiness, HashSet::new()).await
    }

    pub async fn get_liveness_status(&self) -> Result<ReportDto, HealthError> {
        self.probe_report(Probe::Liveness, HashSet::new()).await
    }

    pub async fn get_critical_status(&self) -> Result<ReportDto, HealthError> {
        self.probe_report(Probe::Critical, HashSet::new()).await
    }
}

async fn run_fanout(mut rx: mpsc::Receiver<PublishedUpdate>, registry: Arc<Registry>, shutdown: Arc<tokio::sync::Notify>) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            maybe_update = rx.recv() => {
                match maybe_update {
                    Some(update) => dispatch(&registry, update).await,
                    None => break,
                }
            }
        }
    }
}

async fn dispatch(registry: &Registry, update: PublishedUpdate) {
    let observers = registry.observers.read().await.clone();
    for observer in observers {
        let name = update.name.clone();
        let payload = PublishedUpdate {
            name: name.clone(),
            result: update.result.clone(),
        };
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| observer(payload)));
        if outcome.is_err() {
            tracing::error!(check = %name, "observer panicked handling a status-change notification");
        }
    }
}
