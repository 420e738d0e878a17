//! [`CheckInstance`] (§4.3) — a committed specification plus its metadata and
//! a clock. `execute()` always yields a well-formed [`CheckResult`]; it never
//! propagates a failure to the caller.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::metadata::CheckMetadata;
use crate::result::{CheckResult, CheckResultBuilder};
use crate::spec::CommittedSpec;
use crate::status::Throwable;

/// Owns one check's committed specification for the lifetime of its
/// [`crate::runner::CheckRunner`]. The specification is held behind a lock
/// rather than a plain field so [`CheckInstance::recommit`] can atomically
/// replace it without disturbing an execution already in flight.
pub struct CheckInstance {
    metadata: CheckMetadata,
    spec: RwLock<CommittedSpec>,
    clock: Arc<dyn Clock>,
}

impl CheckInstance {
    pub fn new(metadata: CheckMetadata, spec: CommittedSpec, clock: Arc<dyn Clock>) -> Self {
        Self {
            metadata,
            spec: RwLock::new(spec),
            clock,
        }
    }

    pub fn metadata(&self) -> &CheckMetadata {
        &self.metadata
    }

    pub async fn recommit(&self, spec: CommittedSpec) {
        *self.spec.write().await = spec;
    }

    /// Union of axes the current committed spec declares. Used by the
    /// runner's slow-startup synthetic result and by the registry's
    /// startup/readiness probe filters.
    pub async fn declared_axes(&self) -> crate::axis::AxisSet {
        self.spec.read().await.declared_axes().clone()
    }

    /// Execute the committed specification, producing a [`CheckResult`]. A
    /// step-body panic is caught at the task boundary — the whole step
    /// sequence runs inside its own `tokio::spawn`, and a `JoinError` is
    /// treated exactly like any other unhandled failure ("assume worst": every
    /// axis the specification declares is activated). `catch_unwind` cannot
    /// safely wrap work that spans an `.await` point, so this spawn boundary
    /// is the sanctioned way user-code panics are contained, the same
    /// conversion `HealthReporter::get_health_report` applies when a spawned
    /// check's `JoinError` becomes a `CheckStatus::Critical`.
    pub async fn execute(&self) -> CheckResult {
        let check_started = self.clock.now();
        let start_instant = self.clock.instant();
        let mut builder = CheckResultBuilder::new(
            self.metadata.name.clone(),
            check_started,
            start_instant,
            self.metadata.interval,
            self.metadata.expected_maximum_run_time,
        );

        let spec = self.spec.read().await.clone();
        let declared = spec.declared_axes().clone();

        let outcome = tokio::spawn(async move {
            let mut parts = Vec::new();
            let mut structured_data = None;
            spec.execute(&mut parts, &mut structured_data).await;
            (parts, structured_data)
        })
        .await;

        match outcome {
            Ok((parts, structured_data)) => {
                for part in parts {
                    builder.push(part);
                }
                if let Some(data) = structured_data {
                    builder.set_structured_data(data);
                }
            }
            Err(join_err) => {
                let throwable = Throwable::from_display("unhandled panic", &join_err);
                builder.record_unhandled_failure(throwable, declared);
            }
        }

        builder.build(self.clock.now())
    }
}
