//! Access resolution: effective levels, action checks, branch rules.

use chrono::Utc;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AccessLevel, Agent, AgentAccess, DirectPush, MaintainerRole, PermissionSource, RepoAction,
    Repository, ResolvedPermission,
};
use crate::domain::ports::AccessRepository;

pub struct AccessService<R: AccessRepository> {
    access: Arc<R>,
}

impl<R: AccessRepository> AccessService<R> {
    pub fn new(access: Arc<R>) -> Self {
        Self { access }
    }

    /// Effective access for `(agent, repo)` in strict precedence:
    /// owner > maintainer > unexpired grant > repository policy.
    /// Suspended and banned agents always resolve to `none`.
    pub async fn resolve_permissions(
        &self,
        agent: &Agent,
        repo: &Repository,
    ) -> DomainResult<ResolvedPermission> {
        if !agent.status.is_active() {
            return Ok(ResolvedPermission {
                level: AccessLevel::None,
                source: PermissionSource::Default,
            });
        }

        if let Some(maintainer) = self.access.get_maintainer(repo.id, agent.id).await? {
            return Ok(match maintainer.role {
                MaintainerRole::Owner => ResolvedPermission {
                    level: AccessLevel::Admin,
                    source: PermissionSource::Owner,
                },
                MaintainerRole::Maintainer => ResolvedPermission {
                    level: AccessLevel::Maintain,
                    source: PermissionSource::Maintainer,
                },
            });
        }

        if let Some(grant) = self.access.get_grant(repo.id, agent.id).await? {
            if !grant.is_expired(Utc::now()) {
                return Ok(ResolvedPermission {
                    level: grant.level,
                    source: PermissionSource::Grant,
                });
            }
        }

        let level = match repo.agent_access {
            AgentAccess::Public => AccessLevel::Write,
            AgentAccess::KarmaThreshold => {
                if agent.karma >= repo.min_karma {
                    AccessLevel::Write
                } else {
                    AccessLevel::Read
                }
            }
            AgentAccess::Allowlist => AccessLevel::None,
        };
        Ok(ResolvedPermission { level, source: PermissionSource::RepoPolicy })
    }

    /// Allow/deny an action; the error names the level that would be
    /// required.
    pub async fn can_perform(
        &self,
        agent: &Agent,
        repo: &Repository,
        action: RepoAction,
    ) -> DomainResult<ResolvedPermission> {
        let resolved = self.resolve_permissions(agent, repo).await?;
        let required = action.required_level();
        if resolved.level >= required {
            Ok(resolved)
        } else {
            Err(DomainError::Permission(format!(
                "{} on {} requires {} access, agent {} has {}",
                action.as_str(),
                repo.name,
                required.as_str(),
                agent.name,
                resolved.level.as_str()
            )))
        }
    }

    /// Evaluate branch rules for a direct push: highest priority rule
    /// whose pattern matches decides; no rule means no restriction
    /// beyond write access.
    pub async fn can_push_to_branch(
        &self,
        agent: &Agent,
        repo: &Repository,
        branch: &str,
    ) -> DomainResult<bool> {
        let rules = self.access.list_branch_rules(repo.id).await?;
        let Some(rule) = rules.iter().find(|r| r.matches(branch)) else {
            let resolved = self.resolve_permissions(agent, repo).await?;
            return Ok(resolved.level >= AccessLevel::Write);
        };

        match rule.direct_push {
            DirectPush::All => Ok(true),
            DirectPush::Maintainers => {
                Ok(self.access.get_maintainer(repo.id, agent.id).await?.is_some())
            }
            DirectPush::None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        all_migrations, create_test_pool, Migrator, SqliteAccessRepository, SqliteAgentRepository,
    };
    use crate::domain::models::{AccessGrant, AgentStatus, BranchRule, Maintainer};
    use crate::domain::ports::AgentRepository;
    use chrono::Duration;
    use uuid::Uuid;

    async fn setup() -> (Arc<SqliteAccessRepository>, Arc<SqliteAgentRepository>, sqlx::SqlitePool)
    {
        let pool = create_test_pool().await.expect("pool");
        Migrator::new(pool.clone()).run(all_migrations()).await.expect("migrations");
        (
            Arc::new(SqliteAccessRepository::new(pool.clone())),
            Arc::new(SqliteAgentRepository::new(pool.clone())),
            pool,
        )
    }

    async fn make_agent(agents: &SqliteAgentRepository, name: &str, karma: i64) -> Agent {
        let mut agent = Agent::new(name, "hash".into(), "salt".into());
        agent.karma = karma;
        agents.create(&agent).await.expect("create agent");
        agent
    }

    async fn make_repo(pool: &sqlx::SqlitePool, access: AgentAccess, min_karma: i64) -> Repository {
        use crate::adapters::sqlite::SqliteRepoRepository;
        use crate::domain::ports::RepoRepository;
        let repos = SqliteRepoRepository::new(pool.clone());
        let mut repo = Repository::new(format!("repo-{}", Uuid::new_v4()));
        repo.agent_access = access;
        repo.min_karma = min_karma;
        repos.create(&repo).await.expect("create repo");
        repo
    }

    #[tokio::test]
    async fn test_owner_resolves_admin() {
        let (access_repo, agents, pool) = setup().await;
        let service = AccessService::new(access_repo.clone());
        let agent = make_agent(&agents, "owner", 0).await;
        let repo = make_repo(&pool, AgentAccess::Allowlist, 0).await;

        access_repo
            .add_maintainer(&Maintainer {
                repo_id: repo.id,
                agent_id: agent.id,
                role: MaintainerRole::Owner,
                added_at: Utc::now(),
            })
            .await
            .unwrap();

        let resolved = service.resolve_permissions(&agent, &repo).await.unwrap();
        assert_eq!(resolved.level, AccessLevel::Admin);
        assert_eq!(resolved.source, PermissionSource::Owner);
    }

    #[tokio::test]
    async fn test_precedence_public_and_karma_threshold() {
        let (access_repo, agents, pool) = setup().await;
        let service = AccessService::new(access_repo);
        let poor = make_agent(&agents, "poor", 0).await;
        let rich = make_agent(&agents, "rich", 200).await;

        let public = make_repo(&pool, AgentAccess::Public, 0).await;
        assert_eq!(
            service.resolve_permissions(&poor, &public).await.unwrap().level,
            AccessLevel::Write
        );

        let gated = make_repo(&pool, AgentAccess::KarmaThreshold, 100).await;
        assert_eq!(
            service.resolve_permissions(&poor, &gated).await.unwrap().level,
            AccessLevel::Read
        );
        assert_eq!(
            service.resolve_permissions(&rich, &gated).await.unwrap().level,
            AccessLevel::Write
        );

        let allowlist = make_repo(&pool, AgentAccess::Allowlist, 0).await;
        assert_eq!(
            service.resolve_permissions(&rich, &allowlist).await.unwrap().level,
            AccessLevel::None
        );
    }

    #[tokio::test]
    async fn test_expired_grant_falls_through() {
        let (access_repo, agents, pool) = setup().await;
        let service = AccessService::new(access_repo.clone());
        let agent = make_agent(&agents, "grantee", 0).await;
        let repo = make_repo(&pool, AgentAccess::Allowlist, 0).await;

        access_repo
            .upsert_grant(&AccessGrant {
                repo_id: repo.id,
                agent_id: agent.id,
                level: AccessLevel::Maintain,
                expires_at: Some(Utc::now() - Duration::hours(1)),
                granted_at: Utc::now() - Duration::days(1),
            })
            .await
            .unwrap();

        let resolved = service.resolve_permissions(&agent, &repo).await.unwrap();
        assert_eq!(resolved.level, AccessLevel::None);
    }

    #[tokio::test]
    async fn test_banned_agent_resolves_none_despite_grants() {
        let (access_repo, agents, pool) = setup().await;
        let service = AccessService::new(access_repo.clone());
        let mut agent = make_agent(&agents, "bad", 0).await;
        let repo = make_repo(&pool, AgentAccess::Public, 0).await;

        access_repo
            .add_maintainer(&Maintainer {
                repo_id: repo.id,
                agent_id: agent.id,
                role: MaintainerRole::Owner,
                added_at: Utc::now(),
            })
            .await
            .unwrap();
        agents.set_status(agent.id, AgentStatus::Banned).await.unwrap();
        agent.status = AgentStatus::Banned;

        let resolved = service.resolve_permissions(&agent, &repo).await.unwrap();
        assert_eq!(resolved.level, AccessLevel::None);
    }

    #[tokio::test]
    async fn test_can_perform_denies_below_required() {
        let (access_repo, agents, pool) = setup().await;
        let service = AccessService::new(access_repo);
        let agent = make_agent(&agents, "writer", 0).await;
        let repo = make_repo(&pool, AgentAccess::Public, 0).await;

        assert!(service.can_perform(&agent, &repo, RepoAction::Write).await.is_ok());
        let err = service.can_perform(&agent, &repo, RepoAction::Settings).await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)));
    }

    #[tokio::test]
    async fn test_branch_rules_first_match_wins() {
        let (access_repo, agents, pool) = setup().await;
        let service = AccessService::new(access_repo.clone());
        let agent = make_agent(&agents, "pusher", 0).await;
        let repo = make_repo(&pool, AgentAccess::Public, 0).await;

        // Higher priority rule locks release/*; catch-all allows rest.
        access_repo
            .create_branch_rule(&BranchRule {
                id: Uuid::new_v4(),
                repo_id: repo.id,
                pattern: "release/".to_string(),
                direct_push: DirectPush::None,
                required_approvals: 2,
                require_tests_pass: true,
                priority: 100,
            })
            .await
            .unwrap();
        access_repo
            .create_branch_rule(&BranchRule {
                id: Uuid::new_v4(),
                repo_id: repo.id,
                pattern: "".to_string(),
                direct_push: DirectPush::All,
                required_approvals: 0,
                require_tests_pass: false,
                priority: 0,
            })
            .await
            .unwrap();

        assert!(!service.can_push_to_branch(&agent, &repo, "release/1.0").await.unwrap());
        assert!(service.can_push_to_branch(&agent, &repo, "streams/x/y").await.unwrap());
    }
}
