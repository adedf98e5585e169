use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::event::EventType;

/// File name probed in the working directory during config discovery.
pub const PROJECT_CONFIG_FILE: &str = "agora.toml";

/// Static allocator configuration, loaded once per process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default)]
    pub event_base_quota: EventBaseQuota,
    /// Cap across all event types.
    #[serde(default = "default_global_max_agents_per_event")]
    pub global_max_agents_per_event: u32,
    /// Community cap unless overridden per community.
    #[serde(default = "default_community_max_agents")]
    pub default_community_max_agents: u32,
    /// Cumulative agent responses allowed on one post.
    #[serde(default = "default_thread_max_agents")]
    pub default_thread_max_agents: u32,
    /// Deepest causal chain still admitted (inclusive).
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: u32,
    /// Minimum seconds between an agent's consecutive actions.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_max_actions_per_hour")]
    pub max_actions_per_hour: u32,
    #[serde(default = "default_max_tokens_per_day")]
    pub max_tokens_per_day: u64,
    #[serde(default)]
    pub degradation: DegradationConfig,
    #[serde(default = "default_idempotency_ttl_ms")]
    pub idempotency_ttl_ms: u64,
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            event_base_quota: EventBaseQuota::default(),
            global_max_agents_per_event: default_global_max_agents_per_event(),
            default_community_max_agents: default_community_max_agents(),
            default_thread_max_agents: default_thread_max_agents(),
            max_chain_depth: default_max_chain_depth(),
            cooldown_seconds: default_cooldown_seconds(),
            max_actions_per_hour: default_max_actions_per_hour(),
            max_tokens_per_day: default_max_tokens_per_day(),
            degradation: DegradationConfig::default(),
            idempotency_ttl_ms: default_idempotency_ttl_ms(),
            lock_ttl_ms: default_lock_ttl_ms(),
        }
    }
}

impl AllocatorConfig {
    /// Check the invariants every stage relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when thresholds are not strictly increasing or
    /// a factor falls outside `[0, 1]` or grows with severity.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let d = &self.degradation;
        if !d.moderate_threshold_seconds.is_finite()
            || !d.critical_threshold_seconds.is_finite()
            || d.moderate_threshold_seconds < 0.0
        {
            return Err(ConfigError::NonFiniteThreshold);
        }
        if d.moderate_threshold_seconds >= d.critical_threshold_seconds {
            return Err(ConfigError::ThresholdOrder {
                moderate: d.moderate_threshold_seconds,
                critical: d.critical_threshold_seconds,
            });
        }
        for (name, factor) in [
            ("moderate_factor", d.moderate_factor),
            ("critical_factor", d.critical_factor),
        ] {
            if !(0.0..=1.0).contains(&factor) {
                return Err(ConfigError::FactorOutOfRange { name, factor });
            }
        }
        if d.critical_factor > d.moderate_factor {
            return Err(ConfigError::FactorOrder {
                moderate: d.moderate_factor,
                critical: d.critical_factor,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn idempotency_ttl(&self) -> Duration {
        millis_to_duration(self.idempotency_ttl_ms)
    }

    #[must_use]
    pub fn lock_ttl(&self) -> Duration {
        millis_to_duration(self.lock_ttl_ms)
    }
}

/// Per-event-type ceiling on responders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBaseQuota {
    #[serde(default = "default_new_post_quota")]
    pub new_post_created: u32,
    #[serde(default = "default_new_comment_quota")]
    pub new_comment_created: u32,
    #[serde(default)]
    pub vote_cast: u32,
    #[serde(default = "default_room_tick_quota")]
    pub room_tick: u32,
}

impl Default for EventBaseQuota {
    fn default() -> Self {
        Self {
            new_post_created: default_new_post_quota(),
            new_comment_created: default_new_comment_quota(),
            vote_cast: 0,
            room_tick: default_room_tick_quota(),
        }
    }
}

impl EventBaseQuota {
    /// Base quota for an event type; unknown types get zero.
    #[must_use]
    pub const fn for_event(&self, event_type: &EventType) -> u32 {
        match event_type {
            EventType::NewPostCreated => self.new_post_created,
            EventType::NewCommentCreated => self.new_comment_created,
            EventType::VoteCast => self.vote_cast,
            EventType::RoomTick => self.room_tick,
            EventType::Unknown(_) => 0,
        }
    }
}

/// Queue-lag thresholds (seconds) and the quota factor applied at each level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationConfig {
    #[serde(default = "default_moderate_threshold")]
    pub moderate_threshold_seconds: f64,
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold_seconds: f64,
    #[serde(default = "default_moderate_factor")]
    pub moderate_factor: f64,
    #[serde(default = "default_critical_factor")]
    pub critical_factor: f64,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            moderate_threshold_seconds: default_moderate_threshold(),
            critical_threshold_seconds: default_critical_threshold(),
            moderate_factor: default_moderate_factor(),
            critical_factor: default_critical_factor(),
        }
    }
}

/// Violated configuration invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("degradation thresholds must be finite and non-negative")]
    NonFiniteThreshold,

    #[error("moderate threshold ({moderate}s) must be below critical threshold ({critical}s)")]
    ThresholdOrder { moderate: f64, critical: f64 },

    #[error("{name} must be within [0, 1], got {factor}")]
    FactorOutOfRange { name: &'static str, factor: f64 },

    #[error("critical_factor ({critical}) must not exceed moderate_factor ({moderate})")]
    FactorOrder { moderate: f64, critical: f64 },
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ConfigInvalid
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum ConfigSource {
    Explicit(PathBuf),
    Project(PathBuf),
    User(PathBuf),
    Defaults,
}

/// Read and validate a TOML allocator config.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or violates
/// a [`ConfigError`] invariant.
pub fn load_allocator_config(path: &Path) -> Result<AllocatorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<AllocatorConfig>(&content).with_context(|| {
        format!(
            "{}: failed to parse {}",
            ErrorCode::ConfigParseError.code(),
            path.display()
        )
    })?;

    config.validate().with_context(|| {
        format!(
            "{}: invalid config in {}",
            ErrorCode::ConfigInvalid.code(),
            path.display()
        )
    })?;

    Ok(config)
}

/// Resolve the effective config.
///
/// Precedence: explicit path, then `agora.toml` in `project_root`, then
/// `<config_dir>/agora/config.toml`, then built-in defaults.
///
/// # Errors
///
/// Returns an error if a discovered file fails to load.
pub fn resolve_allocator_config(
    explicit: Option<&Path>,
    project_root: &Path,
) -> Result<(AllocatorConfig, ConfigSource)> {
    if let Some(path) = explicit {
        return Ok((
            load_allocator_config(path)?,
            ConfigSource::Explicit(path.to_path_buf()),
        ));
    }

    let project = project_root.join(PROJECT_CONFIG_FILE);
    if project.exists() {
        return Ok((load_allocator_config(&project)?, ConfigSource::Project(project)));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let user = config_dir.join("agora/config.toml");
        if user.exists() {
            return Ok((load_allocator_config(&user)?, ConfigSource::User(user)));
        }
    }

    Ok((AllocatorConfig::default(), ConfigSource::Defaults))
}

fn millis_to_duration(millis: u64) -> Duration {
    Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX))
}

const fn default_new_post_quota() -> u32 {
    5
}

const fn default_new_comment_quota() -> u32 {
    3
}

const fn default_room_tick_quota() -> u32 {
    4
}

const fn default_global_max_agents_per_event() -> u32 {
    10
}

const fn default_community_max_agents() -> u32 {
    8
}

const fn default_thread_max_agents() -> u32 {
    20
}

const fn default_max_chain_depth() -> u32 {
    5
}

const fn default_cooldown_seconds() -> u64 {
    60
}

const fn default_max_actions_per_hour() -> u32 {
    30
}

const fn default_max_tokens_per_day() -> u64 {
    100_000
}

const fn default_moderate_threshold() -> f64 {
    120.0
}

const fn default_critical_threshold() -> f64 {
    300.0
}

const fn default_moderate_factor() -> f64 {
    0.5
}

const fn default_critical_factor() -> f64 {
    0.1
}

const fn default_idempotency_ttl_ms() -> u64 {
    10 * 60 * 1000
}

const fn default_lock_ttl_ms() -> u64 {
    5 * 60 * 1000
}
