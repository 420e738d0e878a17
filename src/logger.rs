//! Injected logger capability (§4.4 step 4, §4.7). The worker loop invokes
//! this best-effort after each not-ok execution; failures inside the logger
//! are caught by the caller and never affect the loop (§4.4, §7 tier 2).

use crate::report::HealthCheckDto;

/// Receives not-ok results for emission. Implementations must not block the
/// worker for long or panic — [`crate::runner::CheckRunner`] treats this call
/// as best-effort and swallows errors around it.
pub trait CheckLogger: Send + Sync {
    fn log_not_ok(&self, result: &HealthCheckDto);
}

/// Default logger, emitting through `tracing` in the same
/// `warn!(breaker = %self.name, ...)`-style structured-field form
/// `circuit_breaker.rs` uses. Crashed checks log at `error!`; any other
/// not-ok result logs at `warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCheckLogger;

impl CheckLogger for TracingCheckLogger {
    fn log_not_ok(&self, result: &HealthCheckDto) {
        if result.run_status.crashed {
            tracing::error!(
                check = %result.name,
                activated = ?result.axes.activated,
                "health check crashed"
            );
        } else {
            tracing::warn!(
                check = %result.name,
                activated = ?result.axes.activated,
                "health check not ok"
            );
        }
    }
}

/// No-op logger, useful for tests that don't want log noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCheckLogger;

impl CheckLogger for NoopCheckLogger {
    fn log_not_ok(&self, _result: &HealthCheckDto) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::report::{AxesDto, RunStatusDto};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample_dto(crashed: bool) -> HealthCheckDto {
        let now = Utc::now();
        HealthCheckDto {
            name: "db".into(),
            description: None,
            check_type: None,
            on_behalf_of: None,
            axes: AxesDto {
                specified: vec![Axis::NotReady],
                activated: vec![Axis::NotReady],
            },
            statuses: vec![],
            structured_data: None,
            run_status: RunStatusDto {
                running_time_in_ns: 1,
                check_started: now,
                check_completed: now,
                stale_after: now,
                stale: false,
                slow: false,
                crashed,
            },
        }
    }

    struct CountingLogger(Arc<AtomicUsize>);

    impl CheckLogger for CountingLogger {
        fn log_not_ok(&self, _result: &HealthCheckDto) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_logger_does_nothing() {
        NoopCheckLogger.log_not_ok(&sample_dto(false));
    }

    #[test]
    fn tracing_logger_handles_both_crashed_and_faulted() {
        TracingCheckLogger.log_not_ok(&sample_dto(true));
        TracingCheckLogger.log_not_ok(&sample_dto(false));
    }

    #[test]
    fn custom_logger_is_invoked() {
        let count = Arc::new(AtomicUsize::new(0));
        let logger = CountingLogger(count.clone());
        logger.log_not_ok(&sample_dto(false));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
