//! CLI: clap command tree, handlers, and output rendering.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{
    AgentCommands, Cli, Commands, CouncilCommands, ReviewCommands, StreamCommands, TaskCommands,
    WorkspaceCommands,
};
