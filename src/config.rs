//! Runtime tuning knobs for the session engine, loaded from an optional JSON
//! file with baked-in defaults.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/session.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "EXAM_SESSION_CONFIG_PATH";

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(7);
const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_ROOM_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_SUBMIT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_SUBMIT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_SUBMIT_MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
/// Immutable tuning values shared by the session runtime and its tasks.
pub struct SessionTuning {
    /// Cadence of the countdown, one decrement per tick.
    pub tick_interval: Duration,
    /// Cadence of the background flush that retries dirty answers.
    pub autosave_interval: Duration,
    /// Quiet window before an edited answer is saved individually.
    pub debounce_delay: Duration,
    /// Cadence of the room status poll.
    pub room_poll_interval: Duration,
    /// How many times the submit pipeline runs before giving up.
    pub submit_max_attempts: u32,
    /// Backoff before the first submit retry; doubles on each failure.
    pub submit_initial_backoff: Duration,
    /// Upper bound for the submit retry backoff.
    pub submit_max_backoff: Duration,
    /// Remaining-seconds marks that trigger a one-shot warning notice.
    pub warning_thresholds: Vec<u64>,
}

impl SessionTuning {
    /// Load the tuning from disk, falling back to the built-in defaults when
    /// the file is absent or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawTuning>(&contents) {
                Ok(raw) => {
                    let tuning: Self = raw.into();
                    info!(path = %path.display(), "loaded session tuning from config");
                    tuning
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse session config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "session config not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read session config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
            room_poll_interval: DEFAULT_ROOM_POLL_INTERVAL,
            submit_max_attempts: DEFAULT_SUBMIT_MAX_ATTEMPTS,
            submit_initial_backoff: DEFAULT_SUBMIT_INITIAL_BACKOFF,
            submit_max_backoff: DEFAULT_SUBMIT_MAX_BACKOFF,
            warning_thresholds: default_warning_thresholds(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawTuning {
    tick_interval_ms: Option<u64>,
    autosave_interval_ms: Option<u64>,
    debounce_delay_ms: Option<u64>,
    room_poll_interval_ms: Option<u64>,
    submit_max_attempts: Option<u32>,
    submit_initial_backoff_ms: Option<u64>,
    submit_max_backoff_ms: Option<u64>,
    warning_thresholds_secs: Option<Vec<u64>>,
}

impl From<RawTuning> for SessionTuning {
    fn from(raw: RawTuning) -> Self {
        let defaults = Self::default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };

        let mut thresholds = raw
            .warning_thresholds_secs
            .unwrap_or(defaults.warning_thresholds);
        thresholds.sort_unstable_by(|a, b| b.cmp(a));
        thresholds.dedup();

        Self {
            tick_interval: millis(raw.tick_interval_ms, defaults.tick_interval),
            autosave_interval: millis(raw.autosave_interval_ms, defaults.autosave_interval),
            debounce_delay: millis(raw.debounce_delay_ms, defaults.debounce_delay),
            room_poll_interval: millis(raw.room_poll_interval_ms, defaults.room_poll_interval),
            submit_max_attempts: raw
                .submit_max_attempts
                .unwrap_or(defaults.submit_max_attempts)
                .max(1),
            submit_initial_backoff: millis(
                raw.submit_initial_backoff_ms,
                defaults.submit_initial_backoff,
            ),
            submit_max_backoff: millis(raw.submit_max_backoff_ms, defaults.submit_max_backoff),
            warning_thresholds: thresholds,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Warning marks shipped with the binary: ten minutes, five minutes, one minute.
fn default_warning_thresholds() -> Vec<u64> {
    vec![600, 300, 60]
}
