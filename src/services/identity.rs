//! Identity: registration, API key issuance, and authentication.
//!
//! Keys are `gsw_` plus 32 hex characters of entropy. Only a salted
//! SHA-256 digest is stored; the plaintext is returned once at
//! registration. Verification compares digests in constant time and
//! never branches on partial matches.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::info;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Agent, AgentStatus};
use crate::domain::ports::AgentRepository;

const KEY_PREFIX: &str = "gsw_";

/// A freshly registered agent together with its one-time plaintext key.
#[derive(Debug, Clone)]
pub struct Registration {
    pub agent: Agent,
    pub api_key: String,
}

/// Identity attached to every coordinator call after authentication.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub agent: Agent,
}

impl AgentContext {
    pub fn agent_id(&self) -> Uuid {
        self.agent.id
    }
}

pub struct IdentityService<A: AgentRepository> {
    agents: Arc<A>,
}

impl<A: AgentRepository> IdentityService<A> {
    pub fn new(agents: Arc<A>) -> Self {
        Self { agents }
    }

    /// Register a new agent. The returned key is shown once and never
    /// persisted.
    pub async fn register(&self, name: &str, bio: Option<String>) -> DomainResult<Registration> {
        validate_agent_name(name)?;
        if self.agents.get_by_name(name).await?.is_some() {
            return Err(DomainError::Conflict(format!("agent name '{name}' is taken")));
        }

        let api_key = generate_key();
        let salt = generate_salt();
        let hash = hash_key(&salt, &api_key);

        let mut agent = Agent::new(name, hash, salt);
        agent.bio = bio;
        self.agents.create(&agent).await?;

        info!(agent = %agent.name, id = %agent.id, "registered agent");
        Ok(Registration { agent, api_key })
    }

    /// Resolve an agent by name, for the local CLI's `--as` flag.
    pub async fn context_by_name(&self, name: &str) -> DomainResult<AgentContext> {
        let agent = self
            .agents
            .get_by_name(name)
            .await?
            .ok_or_else(|| DomainError::not_found("agent", name))?;
        Self::check_account(&agent)?;
        Ok(AgentContext { agent })
    }

    /// Resolve a bearer token to an agent. Scans the active credential
    /// set and compares every candidate digest in constant time, so
    /// timing reveals nothing about which row (if any) matched.
    pub async fn authenticate(&self, token: &str) -> DomainResult<AgentContext> {
        if !token.starts_with(KEY_PREFIX) {
            return Err(DomainError::Auth("malformed API key".to_string()));
        }

        let credentials = self.agents.list_credentials().await?;
        let mut matched: Option<Uuid> = None;
        for credential in &credentials {
            let candidate = hash_key(&credential.salt, token);
            if bool::from(candidate.as_bytes().ct_eq(credential.hash.as_bytes())) {
                matched = Some(credential.agent_id);
            }
        }

        let agent_id = matched.ok_or_else(|| DomainError::Auth("invalid API key".to_string()))?;
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or_else(|| DomainError::Auth("invalid API key".to_string()))?;
        Self::check_account(&agent)?;
        Ok(AgentContext { agent })
    }

    fn check_account(agent: &Agent) -> DomainResult<()> {
        match agent.status {
            AgentStatus::Active => Ok(()),
            AgentStatus::Suspended => {
                Err(DomainError::Auth(format!("agent {} is suspended", agent.name)))
            }
            AgentStatus::Banned => Err(DomainError::Auth(format!("agent {} is banned", agent.name))),
        }
    }
}

fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{KEY_PREFIX}{hex}")
}

fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hash_key(salt: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn validate_agent_name(name: &str) -> DomainResult<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(DomainError::Validation(
            "agent name must be 1-64 characters".to_string(),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
        return Err(DomainError::Validation(format!(
            "agent name '{name}' may only contain alphanumerics, '-', '_', '.'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = generate_key();
        assert!(key.starts_with("gsw_"));
        assert_eq!(key.len(), 4 + 32);
        assert!(key[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_depends_on_salt_and_key() {
        let h1 = hash_key("salt-a", "gsw_abc");
        let h2 = hash_key("salt-b", "gsw_abc");
        let h3 = hash_key("salt-a", "gsw_def");
        assert_ne!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1, hash_key("salt-a", "gsw_abc"));
    }

    #[test]
    fn test_agent_name_validation() {
        assert!(validate_agent_name("agent-1").is_ok());
        assert!(validate_agent_name("worker_bee.2").is_ok());
        assert!(validate_agent_name("").is_err());
        assert!(validate_agent_name("has space").is_err());
        assert!(validate_agent_name(&"x".repeat(65)).is_err());
    }
}
