//! [`CheckMetadata`] — the immutable descriptor supplied at registration.

use std::time::Duration;

use crate::config::EngineConfig;

/// Immutable descriptor for a registered check. `name` is the registry key
/// and must be unique (enforced by [`crate::registry::Registry::register`],
/// not here).
#[derive(Debug, Clone)]
pub struct CheckMetadata {
    pub name: String,
    pub description: Option<String>,
    pub check_type: Option<String>,
    pub on_behalf_of: Option<String>,
    /// `true` → always execute synchronously on request; `false` →
    /// background-scheduled by a [`crate::runner::CheckRunner`].
    pub sync: bool,
    pub interval: Duration,
    pub interval_when_not_ok: Duration,
    pub expected_maximum_run_time: Duration,
}

/// Builder for [`CheckMetadata`]. Mirrors the layered-default construction
/// style of `clawd::config::DaemonConfig::new` — explicit values win, then
/// the crate's built-in defaults.
#[derive(Debug, Clone)]
pub struct CheckMetadataBuilder {
    name: String,
    description: Option<String>,
    check_type: Option<String>,
    on_behalf_of: Option<String>,
    sync: bool,
    interval_secs: Option<u64>,
    interval_when_not_ok_secs: Option<u64>,
    expected_maximum_run_time_secs: Option<u64>,
}

impl CheckMetadataBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            check_type: None,
            on_behalf_of: None,
            sync: false,
            interval_secs: None,
            interval_when_not_ok_secs: None,
            expected_maximum_run_time_secs: None,
        }
    }

    pub fn description(mut self, d: impl Into<String>) -> Self {
        self.description = Some(d.into());
        self
    }

    pub fn check_type(mut self, t: impl Into<String>) -> Self {
        self.check_type = Some(t.into());
        self
    }

    pub fn on_behalf_of(mut self, o: impl Into<String>) -> Self {
        self.on_behalf_of = Some(o.into());
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = Some(secs);
        self
    }

    pub fn interval_when_not_ok_secs(mut self, secs: u64) -> Self {
        self.interval_when_not_ok_secs = Some(secs);
        self
    }

    pub fn expected_maximum_run_time_secs(mut self, secs: u64) -> Self {
        self.expected_maximum_run_time_secs = Some(secs);
        self
    }

    /// Build against the crate's built-in defaults, bypassing any engine-level
    /// override. Most call sites should go through [`Registry::register`],
    /// which uses [`Self::build_with_config`] instead.
    ///
    /// [`Registry::register`]: crate::registry::Registry::register
    pub fn build(self) -> CheckMetadata {
        self.build_with_config(&EngineConfig::default())
    }

    /// Build substituting `config`'s `default_interval_secs` /
    /// `default_interval_when_not_ok_secs` / `default_expected_max_run_time_secs`
    /// for any field this builder left unset (§4.6's explicit > TOML > built-in
    /// layering, carried one level further into the metadata it produces).
    pub fn build_with_config(self, config: &EngineConfig) -> CheckMetadata {
        let interval_secs = self.interval_secs.unwrap_or(config.default_interval_secs);
        // Clamp: intervalWhenNotOk must never exceed interval.
        let interval_when_not_ok_secs = self
            .interval_when_not_ok_secs
            .unwrap_or(config.default_interval_when_not_ok_secs)
            .min(interval_secs);
        let expected_maximum_run_time_secs = self
            .expected_maximum_run_time_secs
            .unwrap_or(config.default_expected_max_run_time_secs);

        CheckMetadata {
            name: self.name,
            description: self.description,
            check_type: self.check_type,
            on_behalf_of: self.on_behalf_of,
            sync: self.sync,
            interval: Duration::from_secs(interval_secs),
            interval_when_not_ok: Duration::from_secs(interval_when_not_ok_secs),
            expected_maximum_run_time: Duration::from_secs(expected_maximum_run_time_secs),
        }
    }
}
