//! End-to-end exercise of the registry against multiple runners: registration,
//! startup, report assembly, probe views, and observer notification. Builds
//! a small app-level object, drives it end-to-end, and asserts on the
//! resulting wire-shaped output.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use healthkit::{
    Axis, CheckMetadataBuilder, EngineConfig, NoopCheckLogger, Registry, ResponsibleRef,
    ServiceInfo, ServiceInfoProvider,
};

struct FixedServiceInfo;

impl ServiceInfoProvider for FixedServiceInfo {
    fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            host: "test-host".into(),
            project: "healthkit-integration".into(),
            cpus: 4,
            os: "linux".into(),
            memory_total_bytes: 8_000_000_000,
            memory_used_bytes: 1_000_000_000,
            load_average_one_min: 0.2,
            running_since: Utc::now(),
            properties: HashMap::new(),
        }
    }
}

fn test_registry() -> Arc<Registry> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Registry::new(
        EngineConfig::default(),
        Arc::new(healthkit::SystemClock),
        Arc::new(NoopCheckLogger),
        Arc::new(FixedServiceInfo),
    )
}

#[tokio::test]
async fn report_aggregates_multiple_checks() -> anyhow::Result<()> {
    let registry = test_registry();

    registry
        .register(
            CheckMetadataBuilder::new("database").sync(true),
            |spec| {
                spec.static_text("connection pool healthy").check(
                    vec![ResponsibleRef::Operations],
                    vec![Axis::NotReady, Axis::AffectsCustomers],
                    |ctx| async move { ctx.ok("reachable") },
                )
            },
        )
        .await?;

    registry
        .register(
            CheckMetadataBuilder::new("queue-depth").sync(true),
            |spec| {
                spec.check(
                    vec![ResponsibleRef::Developers],
                    vec![Axis::DegradedPartial],
                    |ctx| async move { ctx.fault("queue backed up").with_compare_string("queue-backed-up") },
                )
            },
        )
        .await?;

    registry.start_health_checks().await?;

    let report = registry
        .create_report(healthkit::CreateReportRequest {
            force_fresh_data: true,
            ..Default::default()
        })
        .await?;

    assert_eq!(report.health_checks.len(), 2);
    assert_eq!(report.service.project, "healthkit-integration");
    assert!(report.ready); // NotReady never activated
    assert!(report.axes.activated.contains(&Axis::DegradedPartial));

    registry.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn readiness_probe_only_includes_not_ready_checks() {
    let registry = test_registry();

    registry
        .register(
            CheckMetadataBuilder::new("readiness-gate").sync(true),
            |spec| {
                spec.check(vec![], vec![Axis::NotReady], |ctx| async move { ctx.ok("ready") })
            },
        )
        .await
        .unwrap();

    registry
        .register(
            CheckMetadataBuilder::new("unrelated").sync(true),
            |spec| {
                spec.check(vec![], vec![Axis::AffectsCustomers], |ctx| async move {
                    ctx.ok("fine")
                })
            },
        )
        .await
        .unwrap();

    registry.start_health_checks().await.unwrap();

    let readiness = registry.get_readiness_status().await.unwrap();
    assert_eq!(readiness.health_checks.len(), 1);
    assert_eq!(readiness.health_checks[0].name, "readiness-gate");

    registry.shutdown().await;
}

#[tokio::test]
async fn startup_probe_is_a_one_way_gate() {
    let registry = test_registry();

    registry
        .register(
            CheckMetadataBuilder::new("warms-up").sync(true),
            |spec| {
                spec.check(vec![], vec![Axis::NotReady], |ctx| async move { ctx.ok("ready") })
            },
        )
        .await
        .unwrap();

    registry.start_health_checks().await.unwrap();

    let first = registry.get_startup_status().await.unwrap();
    assert_eq!(first.health_checks.len(), 1);

    let second = registry.get_startup_status().await.unwrap();
    assert!(second.health_checks.is_empty(), "ready-once checks are never re-queried by the startup probe");

    registry.shutdown().await;
}

#[tokio::test]
async fn critical_axis_surfaces_as_critical_fault() {
    let registry = test_registry();

    registry
        .register(
            CheckMetadataBuilder::new("wake-on-call").sync(true),
            |spec| {
                spec.check(
                    vec![ResponsibleRef::Operations],
                    vec![Axis::CriticalWakePeopleUp],
                    |ctx| async move { ctx.fault("primary datastore unreachable") },
                )
            },
        )
        .await
        .unwrap();

    registry.start_health_checks().await.unwrap();

    let report = registry
        .create_report(healthkit::CreateReportRequest {
            force_fresh_data: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(report.critical_fault);

    let critical = registry.get_critical_status().await.unwrap();
    assert_eq!(critical.health_checks.len(), 1);

    registry.shutdown().await;
}

#[tokio::test]
async fn observer_receives_change_notification_and_shutdown_drains_cleanly() {
    let registry = test_registry();

    registry
        .register(CheckMetadataBuilder::new("watched"), |spec| {
            spec.check(vec![], vec![Axis::NotReady], |ctx| async move { ctx.ok("ready") })
        })
        .await
        .unwrap();

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = notifications.clone();
    registry
        .subscribe_to_status_changes(Arc::new(move |_update: healthkit::runner::PublishedUpdate| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

    registry.start_health_checks().await.unwrap();
    registry.trigger_update_for_health_check("watched").await.unwrap();

    for _ in 0..100 {
        if notifications.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(notifications.load(Ordering::SeqCst) > 0);

    registry.shutdown().await;

    let err = registry.trigger_update_for_health_check("watched").await;
    // Shutdown stops runners but the registry entry itself still exists, so
    // this still resolves — the check simply never runs again.
    assert!(err.is_ok());
}

#[tokio::test]
async fn duplicate_and_missing_check_errors_surface_correctly() {
    let registry = test_registry();
    registry
        .register(CheckMetadataBuilder::new("solo"), |spec| {
            spec.check(vec![], vec![Axis::NotReady], |ctx| async move { ctx.ok("fine") })
        })
        .await
        .unwrap();

    let dup = registry
        .register(CheckMetadataBuilder::new("solo"), |spec| {
            spec.check(vec![], vec![Axis::NotReady], |ctx| async move { ctx.ok("fine") })
        })
        .await;
    assert!(matches!(dup, Err(healthkit::HealthError::Duplicate { .. })));

    let missing = registry.trigger_update_for_health_check("ghost").await;
    assert!(matches!(missing, Err(healthkit::HealthError::NoSuchCheck { .. })));
}
