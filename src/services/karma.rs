//! Karma economy: award and deduction hooks.
//!
//! Karma is a non-negative integer per agent. Awards fire from
//! contribution events; the store clamps at zero on deduction.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::ActivityEvent;
use crate::domain::ports::AgentRepository;

use super::activity_log::ActivityLog;

/// Award for a merged stream's author.
pub const MERGE_AWARD: i64 = 25;
/// Award for a scoring (non-comment) review, once per reviewer per stream.
pub const REVIEW_AWARD: i64 = 5;

pub struct KarmaService {
    agents: Arc<dyn AgentRepository>,
    activity: Arc<ActivityLog>,
}

impl KarmaService {
    pub fn new(agents: Arc<dyn AgentRepository>, activity: Arc<ActivityLog>) -> Self {
        Self { agents, activity }
    }

    pub async fn award(&self, agent_id: Uuid, amount: i64, reason: &str) -> DomainResult<i64> {
        debug_assert!(amount >= 0);
        if amount == 0 {
            let current = self.agents.adjust_karma(agent_id, 0).await?;
            return Ok(current);
        }
        let new_karma = self.agents.adjust_karma(agent_id, amount).await?;
        info!(agent_id = %agent_id, amount, reason, new_karma, "karma awarded");
        self.activity
            .record(
                ActivityEvent::new(Some(agent_id), "karma_award", "agent", agent_id)
                    .with_metadata(serde_json::json!({ "amount": amount, "reason": reason })),
            )
            .await;
        Ok(new_karma)
    }

    /// Deduct karma; the store clamps the balance at zero.
    pub async fn deduct(&self, agent_id: Uuid, amount: i64, reason: &str) -> DomainResult<i64> {
        debug_assert!(amount >= 0);
        let new_karma = self.agents.adjust_karma(agent_id, -amount).await?;
        info!(agent_id = %agent_id, amount, reason, new_karma, "karma deducted");
        self.activity
            .record(
                ActivityEvent::new(Some(agent_id), "karma_deduction", "agent", agent_id)
                    .with_metadata(serde_json::json!({ "amount": amount, "reason": reason })),
            )
            .await;
        Ok(new_karma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        all_migrations, create_test_pool, Migrator, SqliteActivityRepository,
        SqliteAgentRepository,
    };
    use crate::domain::models::Agent;

    async fn setup() -> (KarmaService, Arc<SqliteAgentRepository>) {
        let pool = create_test_pool().await.expect("pool");
        Migrator::new(pool.clone()).run(all_migrations()).await.expect("migrations");
        let agents = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let activity =
            Arc::new(ActivityLog::new(Arc::new(SqliteActivityRepository::new(pool.clone()))));
        (KarmaService::new(agents.clone(), activity), agents)
    }

    #[tokio::test]
    async fn test_award_and_clamp_at_zero() {
        let (karma, agents) = setup().await;
        let agent = Agent::new("k", "h".into(), "s".into());
        agents.create(&agent).await.unwrap();

        assert_eq!(karma.award(agent.id, MERGE_AWARD, "stream_merged").await.unwrap(), 25);
        assert_eq!(karma.award(agent.id, REVIEW_AWARD, "review").await.unwrap(), 30);
        // Deduction never takes the balance below zero.
        assert_eq!(karma.deduct(agent.id, 100, "penalty").await.unwrap(), 0);
    }
}
