//! Source of candidate agents for a community.

use std::collections::{HashMap, HashSet};

use crate::event::AgentCandidate;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Looks up the agents that may respond to events in a community.
///
/// Returned snapshots are treated as read-only by the allocator.
pub trait AgentRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backing directory is unreachable.
    fn candidates(&self, community_id: &str) -> Result<Vec<AgentCandidate>, RepositoryError>;
}

impl<R: AgentRepository + ?Sized> AgentRepository for std::sync::Arc<R> {
    fn candidates(&self, community_id: &str) -> Result<Vec<AgentCandidate>, RepositoryError> {
        (**self).candidates(community_id)
    }
}

/// Fixed pool of agents: a forum-wide list plus optional per-community lists.
///
/// [`AgentRepository::candidates`] returns community-specific agents first,
/// then forum-wide ones, preserving registration order within each list. An
/// agent registered in both lists appears once, with its community entry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentRepository {
    forum_wide: Vec<AgentCandidate>,
    by_community: HashMap<String, Vec<AgentCandidate>>,
}

impl InMemoryAgentRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository where every community sees the same pool.
    #[must_use]
    pub fn with_pool(pool: Vec<AgentCandidate>) -> Self {
        Self {
            forum_wide: pool,
            by_community: HashMap::new(),
        }
    }

    pub fn register(&mut self, candidate: AgentCandidate) {
        self.forum_wide.push(candidate);
    }

    pub fn register_for(&mut self, community_id: impl Into<String>, candidate: AgentCandidate) {
        self.by_community
            .entry(community_id.into())
            .or_default()
            .push(candidate);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.forum_wide.len() + self.by_community.values().map(Vec::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AgentRepository for InMemoryAgentRepository {
    fn candidates(&self, community_id: &str) -> Result<Vec<AgentCandidate>, RepositoryError> {
        let mut pool = self
            .by_community
            .get(community_id)
            .cloned()
            .unwrap_or_default();
        let mut seen: HashSet<String> = pool.iter().map(|c| c.agent_id.clone()).collect();
        pool.extend(
            self.forum_wide
                .iter()
                .filter(|c| seen.insert(c.agent_id.clone()))
                .cloned(),
        );
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn community_agents_come_before_forum_wide() -> Result<(), RepositoryError> {
        let mut repo = InMemoryAgentRepository::new();
        repo.register(AgentCandidate::active("global-1"));
        repo.register_for("c-rust", AgentCandidate::active("rust-1"));
        repo.register_for("c-go", AgentCandidate::active("go-1"));

        let ids: Vec<String> = repo
            .candidates("c-rust")?
            .into_iter()
            .map(|c| c.agent_id)
            .collect();
        assert_eq!(ids, vec!["rust-1", "global-1"]);
        assert_eq!(repo.candidates("c-none")?.len(), 1);
        assert_eq!(repo.len(), 3);
        Ok(())
    }

    #[test]
    fn agent_in_both_lists_is_listed_once() -> Result<(), RepositoryError> {
        let mut repo = InMemoryAgentRepository::new();
        repo.register(AgentCandidate::active("shared").with_tags(["global"]));
        repo.register(AgentCandidate::active("global-1"));
        repo.register_for(
            "c-rust",
            AgentCandidate::active("shared").in_community("c-rust"),
        );

        let pool = repo.candidates("c-rust")?;
        let ids: Vec<&str> = pool.iter().map(|c| c.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["shared", "global-1"]);
        assert_eq!(pool[0].community_ids, vec!["c-rust"]);
        assert_eq!(repo.candidates("c-go")?.len(), 2);
        Ok(())
    }
}
