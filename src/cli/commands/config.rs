//! `config` command: read, set, or pull configuration.

use serde::Serialize;

use crate::cli::output::{print, CommandOutput, Message};
use crate::domain::errors::{DomainError, DomainResult};
use crate::services::{Config, Coordinator};

#[derive(Serialize)]
pub struct ConfigValueOutput {
    pub key: String,
    pub value: serde_json::Value,
}

impl CommandOutput for ConfigValueOutput {
    fn to_human(&self) -> String {
        format!("{} = {}", self.key, self.value)
    }
}

#[derive(Serialize)]
pub struct ConfigDumpOutput {
    pub config: Config,
}

impl CommandOutput for ConfigDumpOutput {
    fn to_human(&self) -> String {
        serde_json::to_string_pretty(&self.config)
            .unwrap_or_else(|_| "<unprintable configuration>".to_string())
    }
}

pub async fn handle_config(
    coordinator: &Coordinator,
    key: Option<String>,
    value: Option<String>,
    pull: bool,
    json: bool,
) -> DomainResult<()> {
    if pull {
        let applied = coordinator.sync_pull().await?;
        print(&Message::new(format!("pulled {applied} configuration updates")), json);
        return Ok(());
    }

    match (key, value) {
        (None, _) => {
            print(&ConfigDumpOutput { config: coordinator.config().clone() }, json);
            Ok(())
        }
        (Some(key), None) => {
            let value = coordinator
                .config()
                .get_key(&key)
                .map_err(|e| DomainError::Validation(e.to_string()))?;
            print(&ConfigValueOutput { key, value }, json);
            Ok(())
        }
        (Some(key), Some(value)) => {
            let mut config = coordinator.config().clone();
            config.set_key(&key, &value).map_err(|e| DomainError::Validation(e.to_string()))?;
            config
                .save(coordinator.root())
                .map_err(|e| DomainError::Validation(e.to_string()))?;
            print(&Message::new(format!("{key} updated (takes effect on next run)")), json);
            Ok(())
        }
    }
}
