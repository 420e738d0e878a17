//! [`EngineConfig`] (§4.6) — tunable defaults layered the way
//! `clawd::config::DaemonConfig::new` layers CLI/env/TOML: explicit
//! constructor arguments win, then an optional TOML file, then built-in
//! defaults.

use std::path::Path;

use serde::Deserialize;

const DEFAULT_INTERVAL_SECS: u64 = 600;
const DEFAULT_INTERVAL_WHEN_NOT_OK_SECS: u64 = 120;
const DEFAULT_EXPECTED_MAX_RUN_TIME_SECS: u64 = 4;
const DEFAULT_OBSERVER_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 800;
const DEFAULT_STARTUP_LATCH_GRACE_SECS: u64 = 2;

/// `healthkit.toml` — all fields optional overrides. Priority: explicit
/// constructor argument > TOML file > built-in default.
#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    default_interval_secs: Option<u64>,
    default_interval_when_not_ok_secs: Option<u64>,
    default_expected_max_run_time_secs: Option<u64>,
    observer_channel_capacity: Option<usize>,
    shutdown_grace_ms: Option<u64>,
    startup_latch_grace_secs: Option<u64>,
}

fn load_toml(dir: &Path) -> Option<TomlConfig> {
    let path = dir.join("healthkit.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "failed to parse healthkit.toml — using defaults");
            None
        }
    }
}

/// Engine-wide tunables substituted into [`crate::metadata::CheckMetadata`]
/// when a registration omits them, plus scheduler/observer knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub default_interval_secs: u64,
    pub default_interval_when_not_ok_secs: u64,
    pub default_expected_max_run_time_secs: u64,
    pub observer_channel_capacity: usize,
    pub shutdown_grace_ms: u64,
    pub startup_latch_grace_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: DEFAULT_INTERVAL_SECS,
            default_interval_when_not_ok_secs: DEFAULT_INTERVAL_WHEN_NOT_OK_SECS,
            default_expected_max_run_time_secs: DEFAULT_EXPECTED_MAX_RUN_TIME_SECS,
            observer_channel_capacity: DEFAULT_OBSERVER_CHANNEL_CAPACITY,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            startup_latch_grace_secs: DEFAULT_STARTUP_LATCH_GRACE_SECS,
        }
    }
}

impl EngineConfig {
    /// Build from explicit overrides layered on top of an optional
    /// `healthkit.toml` found in `config_dir`, falling back to built-in
    /// defaults for anything neither source supplies.
    pub fn new(
        config_dir: Option<&Path>,
        default_interval_secs: Option<u64>,
        default_interval_when_not_ok_secs: Option<u64>,
        default_expected_max_run_time_secs: Option<u64>,
    ) -> Self {
        let toml = config_dir.and_then(load_toml).unwrap_or_default();

        let default_interval_secs = default_interval_secs
            .or(toml.default_interval_secs)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        let default_interval_when_not_ok_secs = default_interval_when_not_ok_secs
            .or(toml.default_interval_when_not_ok_secs)
            .unwrap_or(DEFAULT_INTERVAL_WHEN_NOT_OK_SECS)
            .min(default_interval_secs);
        let default_expected_max_run_time_secs = default_expected_max_run_time_secs
            .or(toml.default_expected_max_run_time_secs)
            .unwrap_or(DEFAULT_EXPECTED_MAX_RUN_TIME_SECS);
        let observer_channel_capacity = toml
            .observer_channel_capacity
            .unwrap_or(DEFAULT_OBSERVER_CHANNEL_CAPACITY);
        let shutdown_grace_ms = toml.shutdown_grace_ms.unwrap_or(DEFAULT_SHUTDOWN_GRACE_MS);
        let startup_latch_grace_secs = toml
            .startup_latch_grace_secs
            .unwrap_or(DEFAULT_STARTUP_LATCH_GRACE_SECS);

        Self {
            default_interval_secs,
            default_interval_when_not_ok_secs,
            default_expected_max_run_time_secs,
            observer_channel_capacity,
            shutdown_grace_ms,
            startup_latch_grace_secs,
        }
    }

    /// Load from a `healthkit.toml` in `config_dir`, with built-in defaults
    /// for everything else.
    pub fn from_file(config_dir: &Path) -> Self {
        Self::new(Some(config_dir), None, None, None)
    }
}
