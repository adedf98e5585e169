//! Queue-lag driven service levels.
//!
//! | Queue lag                    | Level    | Factor (default) |
//! |------------------------------|----------|------------------|
//! | < moderate threshold         | normal   | 1.0              |
//! | moderate ≤ lag < critical    | moderate | 0.5              |
//! | ≥ critical threshold         | critical | 0.1              |
//!
//! The level is a pure function of the last reported lag: there is no
//! hysteresis, so a single fast report moves the level straight back.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DegradationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    Normal,
    Moderate,
    Critical,
}

impl DegradationLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Moderate => "moderate",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot read by the quota calculator and candidate selector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationState {
    pub level: DegradationLevel,
    pub queue_lag_seconds: f64,
    /// Quota multiplier for `level`.
    pub factor: f64,
}

impl DegradationState {
    #[must_use]
    pub const fn normal() -> Self {
        Self {
            level: DegradationLevel::Normal,
            queue_lag_seconds: 0.0,
            factor: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DegradationMonitor {
    policy: DegradationConfig,
    lag_seconds: f64,
}

impl DegradationMonitor {
    #[must_use]
    pub const fn new(policy: DegradationConfig) -> Self {
        Self {
            policy,
            lag_seconds: 0.0,
        }
    }

    #[must_use]
    pub fn state(&self) -> DegradationState {
        let level = self.level_for(self.lag_seconds);
        DegradationState {
            level,
            queue_lag_seconds: self.lag_seconds,
            factor: self.factor_for(level),
        }
    }

    /// Record the latest observed lag. Negative and NaN values count as zero.
    pub fn report_lag(&mut self, lag_seconds: f64) {
        let lag = if lag_seconds.is_nan() {
            0.0
        } else {
            lag_seconds.max(0.0)
        };

        let before = self.level_for(self.lag_seconds);
        let after = self.level_for(lag);
        self.lag_seconds = lag;

        if before != after {
            if after > before {
                warn!(from = %before, to = %after, lag_seconds = lag, "degradation level raised");
            } else {
                info!(from = %before, to = %after, lag_seconds = lag, "degradation level lowered");
            }
        }
    }

    pub fn reset(&mut self) {
        self.lag_seconds = 0.0;
    }

    #[must_use]
    pub const fn policy(&self) -> &DegradationConfig {
        &self.policy
    }

    fn level_for(&self, lag: f64) -> DegradationLevel {
        if lag >= self.policy.critical_threshold_seconds {
            DegradationLevel::Critical
        } else if lag >= self.policy.moderate_threshold_seconds {
            DegradationLevel::Moderate
        } else {
            DegradationLevel::Normal
        }
    }

    const fn factor_for(&self, level: DegradationLevel) -> f64 {
        match level {
            DegradationLevel::Normal => 1.0,
            DegradationLevel::Moderate => self.policy.moderate_factor,
            DegradationLevel::Critical => self.policy.critical_factor,
        }
    }
}

impl Default for DegradationMonitor {
    fn default() -> Self {
        Self::new(DegradationConfig::default())
    }
}
