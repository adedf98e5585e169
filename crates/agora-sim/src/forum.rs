//! Simulated forum: agent roster with activity history, posts, and the
//! root-event generator.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agora_core::{
    AgentCandidate, AgentRepository, AgentStatus, Clock, EventPayload, EventType, RepositoryError,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;
const RECENT_THREADS: usize = 5;

pub const TAGS: [&str; 8] = ["rust", "async", "databases", "ml", "gamedev", "security", "web", "ops"];

/// Static facts about a simulated agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: String,
    pub status: AgentStatus,
    pub tags: Vec<String>,
    pub community_ids: Vec<String>,
}

#[derive(Debug, Clone)]
struct AgentRecord {
    profile: AgentProfile,
    action_times_ms: VecDeque<i64>,
    token_spend: VecDeque<(i64, u64)>,
    recent_posts: VecDeque<String>,
}

impl AgentRecord {
    fn snapshot(&self, now_ms: i64) -> AgentCandidate {
        let actions = self
            .action_times_ms
            .iter()
            .filter(|&&at| now_ms - at < HOUR_MS)
            .count();
        let tokens: u64 = self
            .token_spend
            .iter()
            .filter(|(at, _)| now_ms - at < DAY_MS)
            .map(|(_, tokens)| tokens)
            .sum();

        AgentCandidate {
            agent_id: self.profile.agent_id.clone(),
            status: self.profile.status,
            tags: self.profile.tags.clone(),
            community_ids: self.profile.community_ids.clone(),
            actions_last_hour: u32::try_from(actions).unwrap_or(u32::MAX),
            tokens_last_day: tokens,
            last_action_at: self
                .action_times_ms
                .back()
                .and_then(|&at| DateTime::from_timestamp_millis(at)),
            recent_thread_post_ids: self.recent_posts.iter().cloned().collect(),
        }
    }

    fn prune(&mut self, now_ms: i64) {
        while self
            .action_times_ms
            .front()
            .is_some_and(|&at| now_ms - at >= HOUR_MS)
        {
            self.action_times_ms.pop_front();
        }
        while self
            .token_spend
            .front()
            .is_some_and(|&(at, _)| now_ms - at >= DAY_MS)
        {
            self.token_spend.pop_front();
        }
    }
}

/// Mutable forum state shared by the directory and the executor.
#[derive(Debug, Clone, Default)]
pub struct ForumState {
    agents: Vec<AgentRecord>,
    index: HashMap<String, usize>,
}

impl ForumState {
    #[must_use]
    pub fn new(profiles: Vec<AgentProfile>) -> Self {
        let index = profiles
            .iter()
            .enumerate()
            .map(|(i, p)| (p.agent_id.clone(), i))
            .collect();
        let agents = profiles
            .into_iter()
            .map(|profile| AgentRecord {
                profile,
                action_times_ms: VecDeque::new(),
                token_spend: VecDeque::new(),
                recent_posts: VecDeque::new(),
            })
            .collect();
        Self { agents, index }
    }

    /// Candidate snapshots with activity counters relative to `now_ms`.
    #[must_use]
    pub fn snapshot(&self, now_ms: i64) -> Vec<AgentCandidate> {
        self.agents.iter().map(|a| a.snapshot(now_ms)).collect()
    }

    /// Record a completed action. Unknown agents are ignored.
    pub fn record_action(&mut self, agent_id: &str, now_ms: i64, tokens: u64, post_id: Option<&str>) {
        let Some(&i) = self.index.get(agent_id) else {
            return;
        };
        let record = &mut self.agents[i];
        record.prune(now_ms);
        record.action_times_ms.push_back(now_ms);
        record.token_spend.push_back((now_ms, tokens));
        if let Some(post_id) = post_id {
            record.recent_posts.retain(|p| p != post_id);
            record.recent_posts.push_back(post_id.to_string());
            while record.recent_posts.len() > RECENT_THREADS {
                record.recent_posts.pop_front();
            }
        }
    }

    #[must_use]
    pub fn profiles(&self) -> Vec<AgentProfile> {
        self.agents.iter().map(|a| a.profile.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    #[must_use]
    pub fn agent_id(&self, i: usize) -> Option<&str> {
        self.agents.get(i).map(|a| a.profile.agent_id.as_str())
    }
}

pub type SharedForum = Arc<Mutex<ForumState>>;

pub fn lock_forum(forum: &SharedForum) -> MutexGuard<'_, ForumState> {
    forum.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generate a roster. `inactive_percent` of agents get a non-active status.
#[must_use]
pub fn generate_profiles(
    rng: &mut DeterministicRng,
    agent_count: usize,
    community_count: usize,
    inactive_percent: u8,
) -> Vec<AgentProfile> {
    const NON_ACTIVE: [AgentStatus; 3] = [
        AgentStatus::Limited,
        AgentStatus::Quarantined,
        AgentStatus::Banned,
    ];

    (0..agent_count)
        .map(|i| {
            let status = if rng.hit_rate_percent(inactive_percent) {
                rng.pick(NON_ACTIVE.len())
                    .map_or(AgentStatus::Banned, |k| NON_ACTIVE[k])
            } else {
                AgentStatus::Active
            };

            let tag_count = 1 + rng.next_bounded(3);
            let mut tags: Vec<String> = Vec::new();
            for _ in 0..tag_count {
                if let Some(k) = rng.pick(TAGS.len()) {
                    let tag = TAGS[k].to_string();
                    if !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
            }

            let mut community_ids = Vec::new();
            if let Some(c) = rng.pick(community_count) {
                community_ids.push(community_id(c));
            }
            if rng.hit_rate_percent(30) {
                if let Some(c) = rng.pick(community_count) {
                    let id = community_id(c);
                    if !community_ids.contains(&id) {
                        community_ids.push(id);
                    }
                }
            }

            AgentProfile {
                agent_id: format!("agent-{i}"),
                status,
                tags,
                community_ids,
            }
        })
        .collect()
}

#[must_use]
pub fn community_id(i: usize) -> String {
    format!("c-{i}")
}

/// [`AgentRepository`] over the live forum state. Every community sees
/// the whole roster; membership only affects scoring.
pub struct ForumDirectory {
    forum: SharedForum,
    clock: Arc<dyn Clock>,
}

impl ForumDirectory {
    #[must_use]
    pub fn new(forum: SharedForum, clock: Arc<dyn Clock>) -> Self {
        Self { forum, clock }
    }
}

impl AgentRepository for ForumDirectory {
    fn candidates(&self, _community_id: &str) -> Result<Vec<AgentCandidate>, RepositoryError> {
        Ok(lock_forum(&self.forum).snapshot(self.clock.now_millis()))
    }
}

/// Knobs for the root-event mix, all in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMix {
    pub post_percent: u8,
    pub comment_percent: u8,
    pub vote_percent: u8,
    /// Share of comments and votes aimed at the first post.
    pub hot_post_percent: u8,
}

impl Default for EventMix {
    fn default() -> Self {
        Self {
            post_percent: 35,
            comment_percent: 45,
            vote_percent: 15,
            hot_post_percent: 40,
        }
    }
}

#[derive(Debug, Clone)]
struct Post {
    post_id: String,
    community_id: String,
}

/// Produces root events (depth 0) authored by roster agents.
#[derive(Debug, Clone)]
pub struct EventGenerator {
    rng: DeterministicRng,
    mix: EventMix,
    community_count: usize,
    posts: Vec<Post>,
    next_event: u64,
}

impl EventGenerator {
    #[must_use]
    pub const fn new(rng: DeterministicRng, mix: EventMix, community_count: usize) -> Self {
        Self {
            rng,
            mix,
            community_count,
            posts: Vec::new(),
            next_event: 0,
        }
    }

    /// Next root event, or `None` if the roster is empty.
    pub fn next_event(&mut self, forum: &ForumState, now_ms: i64) -> Option<EventPayload> {
        let author = forum.agent_id(self.rng.pick(forum.len())?)?.to_string();
        let created_at = DateTime::from_timestamp_millis(now_ms)?;
        self.next_event += 1;
        let event_id = format!("evt-{}", self.next_event);

        let roll = self.rng.next_bounded(100);
        let post_cut = u64::from(self.mix.post_percent);
        let comment_cut = post_cut + u64::from(self.mix.comment_percent);
        let vote_cut = comment_cut + u64::from(self.mix.vote_percent);

        if roll < post_cut || self.posts.is_empty() {
            let community = community_id(self.rng.pick(self.community_count).unwrap_or(0));
            let post_id = format!("post-{}", self.posts.len() + 1);
            self.posts.push(Post {
                post_id: post_id.clone(),
                community_id: community.clone(),
            });
            let tags = self.draw_tags();
            return Some(
                EventPayload::new(event_id, EventType::NewPostCreated, community, author, created_at)
                    .with_post(post_id)
                    .with_tags(tags),
            );
        }

        let event_type = if roll < comment_cut {
            EventType::NewCommentCreated
        } else if roll < vote_cut {
            EventType::VoteCast
        } else {
            EventType::RoomTick
        };

        if event_type == EventType::RoomTick {
            let community = community_id(self.rng.pick(self.community_count).unwrap_or(0));
            let room = format!("room-{community}");
            return Some(
                EventPayload::new(event_id, event_type, community, author, created_at)
                    .with_room(room),
            );
        }

        let target = if self.rng.hit_rate_percent(self.mix.hot_post_percent) {
            0
        } else {
            self.rng.pick(self.posts.len()).unwrap_or(0)
        };
        let post = self.posts.get(target)?.clone();
        let tags = self.draw_tags();
        Some(
            EventPayload::new(event_id, event_type, post.community_id, author, created_at)
                .with_post(post.post_id)
                .with_tags(tags),
        )
    }

    fn draw_tags(&mut self) -> Vec<String> {
        let count = self.rng.next_bounded(3);
        (0..count)
            .filter_map(|_| self.rng.pick(TAGS.len()).map(|k| TAGS[k].to_string()))
            .collect()
    }

    #[must_use]
    pub fn hot_post_id(&self) -> Option<&str> {
        self.posts.first().map(|p| p.post_id.as_str())
    }
}
