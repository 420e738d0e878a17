//! An in-process health-reporting engine for long-running services.
//!
//! Application code registers named [`CheckSpecification`]s against a
//! [`Registry`]; the registry runs each on a private [`CheckRunner`],
//! caches the latest [`CheckResult`], and aggregates them into a
//! [`ReportDto`] along the operational [`Axis`] taxonomy for orchestrators,
//! load balancers, and on-call tooling to consume.
//!
//! ```no_run
//! use healthkit::{Axis, CheckMetadataBuilder, EngineConfig, Registry, ResponsibleRef};
//! use healthkit::service_info::SysinfoServiceInfoProvider;
//! use chrono::Utc;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), healthkit::HealthError> {
//! let service_info = Arc::new(SysinfoServiceInfoProvider::new("my-service", Utc::now()));
//! let registry = Registry::with_defaults(EngineConfig::default(), service_info);
//!
//! registry
//!     .register(CheckMetadataBuilder::new("database"), |spec| {
//!         spec.check(vec![ResponsibleRef::Operations], vec![Axis::NotReady], |ctx| async move {
//!             ctx.ok("reachable")
//!         })
//!     })
//!     .await?;
//!
//! registry.start_health_checks().await?;
//! let report = registry.get_readiness_status().await?;
//! assert!(report.ready);
//! # Ok(())
//! # }
//! ```

pub mod axis;
pub mod clock;
pub mod config;
pub mod error;
pub mod instance;
pub mod logger;
pub mod metadata;
pub mod registry;
pub mod report;
pub mod result;
pub mod runner;
pub mod service_info;
pub mod spec;
pub mod status;

pub use axis::{Axis, AxisSet};
pub use clock::{Clock, SystemClock};
pub use config::EngineConfig;
pub use error::{HealthError, RunnerError};
pub use instance::CheckInstance;
pub use logger::{CheckLogger, NoopCheckLogger, TracingCheckLogger};
pub use metadata::{CheckMetadata, CheckMetadataBuilder};
pub use registry::{Observer, Registry};
pub use report::{CreateReportRequest, HealthCheckDto, ReportDto};
pub use result::CheckResult;
pub use runner::CheckRunner;
pub use service_info::{ServiceInfo, ServiceInfoProvider, SysinfoServiceInfoProvider};
pub use spec::{CheckContext, CheckSpecification, CommittedSpec, Outcome};
pub use status::{EntityRef, Link, ResponsibleRef, StatusPart, Throwable};
