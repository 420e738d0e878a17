//! `ServiceInfo` contract (§4.8) — the engine consumes host facts, it never
//! gathers them. [`SysinfoServiceInfoProvider`] is a convenience default
//! implementation, grounded on `clawd::resource_governor`'s use of the
//! `sysinfo` crate; the registry only ever depends on the trait.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use sysinfo::System;

/// Host facts surfaced verbatim in the report DTO's `service` block (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    pub host: String,
    pub project: String,
    pub cpus: u32,
    pub os: String,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub load_average_one_min: f64,
    pub running_since: DateTime<Utc>,
    pub properties: HashMap<String, String>,
}

/// Read-mostly, thread-safe collaborator supplying [`ServiceInfo`] (§5 —
/// "expected to be read-mostly and thread-safe").
pub trait ServiceInfoProvider: Send + Sync {
    fn service_info(&self) -> ServiceInfo;
}

/// Gathers real host facts via `sysinfo`. Present for convenience; not
/// required to satisfy the trait boundary.
pub struct SysinfoServiceInfoProvider {
    project: String,
    running_since: DateTime<Utc>,
    properties: HashMap<String, String>,
    sys: Mutex<System>,
}

impl SysinfoServiceInfoProvider {
    pub fn new(project: impl Into<String>, running_since: DateTime<Utc>) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        Self {
            project: project.into(),
            running_since,
            properties: HashMap::new(),
            sys: Mutex::new(sys),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl ServiceInfoProvider for SysinfoServiceInfoProvider {
    fn service_info(&self) -> ServiceInfo {
        let mut sys = self.sys.lock().unwrap();
        sys.refresh_memory();
        sys.refresh_cpu_usage();
        let load = System::load_average();

        ServiceInfo {
            host: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            project: self.project.clone(),
            cpus: sys.cpus().len() as u32,
            os: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
            memory_total_bytes: sys.total_memory(),
            memory_used_bytes: sys.used_memory(),
            load_average_one_min: load.one,
            running_since: self.running_since,
            properties: self.properties.clone(),
        }
    }
}
