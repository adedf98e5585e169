//! Stage 2: multi-layer quota.
//!
//! `effective = floor(min(global, community, remaining_thread, event_base) × factor)`
//!
//! Thread consumption is fed back by the queue consumer after every
//! non-empty allocation, so a hot post's remaining quota shrinks for every
//! later event on it regardless of event type.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::{AllocatorConfig, EventBaseQuota};
use crate::degradation::DegradationState;
use crate::event::{EventPayload, EventType};

/// The subset of an event the quota layers look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaContext<'a> {
    pub event_type: EventType,
    pub community_id: &'a str,
    pub post_id: Option<&'a str>,
    pub room_id: Option<&'a str>,
}

impl<'a> QuotaContext<'a> {
    #[must_use]
    pub fn from_event(event: &'a EventPayload) -> Self {
        Self {
            event_type: event.event_type.clone(),
            community_id: &event.community_id,
            post_id: event.post_id.as_deref(),
            room_id: event.room_id.as_deref(),
        }
    }
}

/// Ceilings of the individual layers before the degradation factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaLimits {
    pub global_max: u32,
    pub community_max: u32,
    pub thread_max: u32,
    pub event_base: u32,
}

impl QuotaLimits {
    #[must_use]
    pub fn raw(&self) -> u32 {
        self.global_max
            .min(self.community_max)
            .min(self.thread_max)
            .min(self.event_base)
    }
}

#[derive(Debug, Clone)]
pub struct QuotaCalculator {
    global_max: u32,
    community_default: u32,
    thread_max: u32,
    event_base: EventBaseQuota,
    community_overrides: HashMap<String, u32>,
    thread_counters: HashMap<String, u32>,
}

impl QuotaCalculator {
    #[must_use]
    pub fn new(cfg: &AllocatorConfig) -> Self {
        Self {
            global_max: cfg.global_max_agents_per_event,
            community_default: cfg.default_community_max_agents,
            thread_max: cfg.default_thread_max_agents,
            event_base: cfg.event_base_quota,
            community_overrides: HashMap::new(),
            thread_counters: HashMap::new(),
        }
    }

    /// Effective number of agents allowed to respond.
    #[must_use]
    pub fn calculate(&self, ctx: &QuotaContext<'_>, degradation: &DegradationState) -> u32 {
        scale(self.limits(ctx).raw(), degradation.factor)
    }

    /// Per-layer ceilings for `ctx`, before scaling.
    #[must_use]
    pub fn limits(&self, ctx: &QuotaContext<'_>) -> QuotaLimits {
        QuotaLimits {
            global_max: self.global_max,
            community_max: self
                .community_overrides
                .get(ctx.community_id)
                .copied()
                .unwrap_or(self.community_default),
            thread_max: self.remaining_thread_quota(ctx.post_id),
            event_base: self.event_base.for_event(&ctx.event_type),
        }
    }

    pub fn set_community_override(&mut self, community_id: impl Into<String>, max: u32) {
        self.community_overrides.insert(community_id.into(), max);
    }

    pub fn clear_community_override(&mut self, community_id: &str) {
        self.community_overrides.remove(community_id);
    }

    /// Record `count` agents allocated against `post_id`.
    pub fn record_thread_allocation(&mut self, post_id: &str, count: u32) {
        let used = self.thread_counters.entry(post_id.to_string()).or_default();
        *used = used.saturating_add(count);
    }

    pub fn reset_thread_counters(&mut self) {
        self.thread_counters.clear();
    }

    /// Agents already allocated against `post_id` since the last reset.
    #[must_use]
    pub fn thread_used(&self, post_id: &str) -> u32 {
        self.thread_counters.get(post_id).copied().unwrap_or(0)
    }

    fn remaining_thread_quota(&self, post_id: Option<&str>) -> u32 {
        post_id.map_or(self.thread_max, |post_id| {
            self.thread_max.saturating_sub(self.thread_used(post_id))
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale(raw: u32, factor: f64) -> u32 {
    if !factor.is_finite() || factor <= 0.0 {
        return 0;
    }
    let scaled = (f64::from(raw) * factor).floor();
    if scaled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        scaled as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::degradation::DegradationLevel;

    fn state(level: DegradationLevel, factor: f64) -> DegradationState {
        DegradationState {
            level,
            queue_lag_seconds: 0.0,
            factor,
        }
    }

    fn ctx(event_type: EventType, post_id: Option<&str>) -> QuotaContext<'_> {
        QuotaContext {
            event_type,
            community_id: "c-general",
            post_id,
            room_id: None,
        }
    }

    #[test]
    fn event_base_is_the_binding_layer_by_default() {
        let calc = QuotaCalculator::new(&AllocatorConfig::default());
        let normal = DegradationState::normal();
        assert_eq!(calc.calculate(&ctx(EventType::NewPostCreated, None), &normal), 5);
        assert_eq!(calc.calculate(&ctx(EventType::NewCommentCreated, None), &normal), 3);
        assert_eq!(calc.calculate(&ctx(EventType::VoteCast, None), &normal), 0);
        assert_eq!(calc.calculate(&ctx(EventType::RoomTick, None), &normal), 4);
        assert_eq!(calc.calculate(&ctx(EventType::Unknown("PollClosed".to_string()), None), &normal), 0);
    }

    #[test]
    fn degradation_factor_floors() {
        let calc = QuotaCalculator::new(&AllocatorConfig::default());
        let post = ctx(EventType::NewPostCreated, None);
        assert_eq!(calc.calculate(&post, &state(DegradationLevel::Moderate, 0.5)), 2);
        assert_eq!(calc.calculate(&post, &state(DegradationLevel::Critical, 0.1)), 0);
        assert_eq!(calc.calculate(&post, &state(DegradationLevel::Critical, f64::NAN)), 0);
    }

    #[test]
    fn community_override_caps_quota() {
        let mut calc = QuotaCalculator::new(&AllocatorConfig::default());
        calc.set_community_override("c-general", 2);
        let normal = DegradationState::normal();
        assert_eq!(calc.calculate(&ctx(EventType::NewPostCreated, None), &normal), 2);

        calc.clear_community_override("c-general");
        assert_eq!(calc.calculate(&ctx(EventType::NewPostCreated, None), &normal), 5);
    }

    #[test]
    fn thread_counter_depresses_later_events() {
        let mut calc = QuotaCalculator::new(&AllocatorConfig::default());
        let normal = DegradationState::normal();
        let on_post = ctx(EventType::NewPostCreated, Some("p-hot"));

        calc.record_thread_allocation("p-hot", 17);
        assert_eq!(calc.thread_used("p-hot"), 17);
        assert_eq!(calc.calculate(&on_post, &normal), 3);

        calc.record_thread_allocation("p-hot", 5);
        assert_eq!(calc.limits(&on_post).thread_max, 0);
        assert_eq!(calc.calculate(&on_post, &normal), 0);

        assert_eq!(
            calc.calculate(&ctx(EventType::NewPostCreated, Some("p-cold")), &normal),
            5
        );

        calc.reset_thread_counters();
        assert_eq!(calc.calculate(&on_post, &normal), 5);
    }

    #[test]
    fn missing_post_id_uses_default_thread_cap() {
        let mut calc = QuotaCalculator::new(&AllocatorConfig::default());
        calc.record_thread_allocation("p-1", 100);
        let limits = calc.limits(&ctx(EventType::RoomTick, None));
        assert_eq!(limits.thread_max, 20);
    }

    #[test]
    fn global_cap_binds_when_lowest() {
        let cfg = AllocatorConfig {
            global_max_agents_per_event: 1,
            ..AllocatorConfig::default()
        };
        let calc = QuotaCalculator::new(&cfg);
        let limits = calc.limits(&ctx(EventType::NewPostCreated, None));
        assert_eq!(limits.raw(), 1);
    }
}
