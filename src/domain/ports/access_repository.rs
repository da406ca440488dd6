//! Access grants, maintainer roster, and branch rules port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AccessGrant, BranchRule, Maintainer, MaintainerRole};

#[async_trait]
pub trait AccessRepository: Send + Sync {
    async fn upsert_grant(&self, grant: &AccessGrant) -> DomainResult<()>;

    async fn get_grant(&self, repo_id: Uuid, agent_id: Uuid) -> DomainResult<Option<AccessGrant>>;

    async fn revoke_grant(&self, repo_id: Uuid, agent_id: Uuid) -> DomainResult<()>;

    /// Insert a maintainer row; idempotent on `(repo, agent)`, updating
    /// the role if it changed.
    async fn add_maintainer(&self, maintainer: &Maintainer) -> DomainResult<()>;

    async fn remove_maintainer(&self, repo_id: Uuid, agent_id: Uuid) -> DomainResult<()>;

    async fn get_maintainer(&self, repo_id: Uuid, agent_id: Uuid)
        -> DomainResult<Option<Maintainer>>;

    async fn list_maintainers(&self, repo_id: Uuid) -> DomainResult<Vec<Maintainer>>;

    async fn count_with_role(&self, repo_id: Uuid, role: MaintainerRole) -> DomainResult<u32>;

    async fn create_branch_rule(&self, rule: &BranchRule) -> DomainResult<()>;

    /// Rules for a repository ordered by descending priority.
    async fn list_branch_rules(&self, repo_id: Uuid) -> DomainResult<Vec<BranchRule>>;
}
