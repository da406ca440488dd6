//! Agent identity commands.

use serde::Serialize;

use crate::cli::output::{print, table, CommandOutput};
use crate::domain::errors::DomainResult;
use crate::domain::models::Agent;
use crate::services::Coordinator;

#[derive(Serialize)]
pub struct RegistrationOutput {
    pub id: String,
    pub name: String,
    pub api_key: String,
}

impl CommandOutput for RegistrationOutput {
    fn to_human(&self) -> String {
        format!(
            "registered agent {} ({})\napi key (shown once, store it now): {}",
            self.name, self.id, self.api_key
        )
    }
}

#[derive(Serialize)]
pub struct AgentOutput {
    pub id: String,
    pub name: String,
    pub bio: Option<String>,
    pub karma: i64,
    pub tier: String,
    pub status: String,
}

impl From<&Agent> for AgentOutput {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.to_string(),
            name: agent.name.clone(),
            bio: agent.bio.clone(),
            karma: agent.karma,
            tier: agent.tier().as_str().to_string(),
            status: agent.status.as_str().to_string(),
        }
    }
}

impl CommandOutput for AgentOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("agent:  {}", self.name),
            format!("id:     {}", self.id),
            format!("karma:  {} ({})", self.karma, self.tier),
            format!("status: {}", self.status),
        ];
        if let Some(ref bio) = self.bio {
            lines.push(format!("bio:    {bio}"));
        }
        lines.join("\n")
    }
}

#[derive(Serialize)]
pub struct AgentListOutput {
    pub agents: Vec<AgentOutput>,
}

impl CommandOutput for AgentListOutput {
    fn to_human(&self) -> String {
        if self.agents.is_empty() {
            return "no agents registered".to_string();
        }
        let mut t = table(&["NAME", "KARMA", "TIER", "STATUS"]);
        for agent in &self.agents {
            t.add_row(vec![
                agent.name.clone(),
                agent.karma.to_string(),
                agent.tier.clone(),
                agent.status.clone(),
            ]);
        }
        t.to_string()
    }
}

pub async fn handle_register(
    coordinator: &Coordinator,
    name: &str,
    bio: Option<String>,
    json: bool,
) -> DomainResult<()> {
    let registration = coordinator.register_agent(name, bio).await?;
    print(
        &RegistrationOutput {
            id: registration.agent.id.to_string(),
            name: registration.agent.name,
            api_key: registration.api_key,
        },
        json,
    );
    Ok(())
}

pub async fn handle_list(coordinator: &Coordinator, json: bool) -> DomainResult<()> {
    let agents = coordinator.list_agents().await?;
    print(&AgentListOutput { agents: agents.iter().map(Into::into).collect() }, json);
    Ok(())
}

pub async fn handle_info(coordinator: &Coordinator, name: &str, json: bool) -> DomainResult<()> {
    let agent = coordinator.get_agent(name).await?;
    print(&AgentOutput::from(&agent), json);
    Ok(())
}
