//! gitswarm CLI entry point.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use gitswarm::adapters::git::GitCliBackend;
use gitswarm::cli::commands::{
    agent, config as config_cmd, council, init, merge, review, status, stream, task, workspace,
};
use gitswarm::cli::{
    AgentCommands, Cli, Commands, CouncilCommands, ReviewCommands, StreamCommands, TaskCommands,
    WorkspaceCommands,
};
use gitswarm::domain::errors::DomainResult;
use gitswarm::services::Coordinator;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error ({}): {e}", e.wire_code());
            ExitCode::from(e.exit_code())
        }
    }
}

/// Guard for the non-blocking file writer; lives for the process.
static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GITSWARM_LOG")
        .unwrap_or_else(|_| EnvFilter::new("gitswarm=warn"));

    if let Ok(path) = std::env::var("GITSWARM_LOG_FILE") {
        let file = std::path::Path::new(&path);
        let dir = file.parent().unwrap_or_else(|| std::path::Path::new("."));
        let name = file.file_name().map_or_else(|| "gitswarm.log".into(), ToOwned::to_owned);
        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .try_init();
        return;
    }

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

async fn run(cli: Cli) -> DomainResult<()> {
    let root = PathBuf::from(".");
    let json = cli.json;

    // Init runs before any coordinator exists.
    if let Commands::Init { name, force } = cli.command {
        return init::handle_init(&root, name, force, json).await;
    }

    let coordinator = open_coordinator(&root).await?;
    dispatch(cli.command, &coordinator, json).await
}

async fn dispatch(command: Commands, coordinator: &Coordinator, json: bool) -> DomainResult<()> {
    match command {
        Commands::Init { .. } => unreachable!("handled before dispatch"),

        Commands::Agent(command) => match command {
            AgentCommands::Register { name, bio } => {
                agent::handle_register(coordinator, &name, bio, json).await
            }
            AgentCommands::List => agent::handle_list(coordinator, json).await,
            AgentCommands::Info { name } => agent::handle_info(coordinator, &name, json).await,
        },

        Commands::Workspace(command) => match command {
            WorkspaceCommands::Create { agent, name, task, parent } => {
                workspace::handle_create(coordinator, &agent, name, task, parent, json).await
            }
            WorkspaceCommands::List => workspace::handle_list(coordinator, json).await,
            WorkspaceCommands::Destroy { agent, abandon } => {
                workspace::handle_destroy(coordinator, &agent, abandon, json).await
            }
        },

        Commands::Commit { message, agent } => {
            workspace::handle_commit(coordinator, &agent, &message, json).await
        }

        Commands::Stream(command) => match command {
            StreamCommands::List { status } => {
                stream::handle_list(coordinator, status, json).await
            }
            StreamCommands::Info { stream } => {
                stream::handle_info(coordinator, &stream, json).await
            }
            StreamCommands::Diff { stream } => {
                stream::handle_diff(coordinator, &stream, json).await
            }
            StreamCommands::Submit { stream, agent } => {
                stream::handle_submit(coordinator, &stream, &agent, json).await
            }
        },

        Commands::Review(command) => match command {
            ReviewCommands::Submit { stream, agent, verdict, feedback, tested, human } => {
                review::handle_submit(
                    coordinator,
                    &stream,
                    &agent,
                    &verdict,
                    feedback,
                    tested,
                    human,
                    json,
                )
                .await
            }
            ReviewCommands::List { stream } => {
                review::handle_list(coordinator, &stream, json).await
            }
            ReviewCommands::Check { stream } => {
                review::handle_check(coordinator, &stream, json).await
            }
        },

        Commands::Merge { stream, agent } => {
            merge::handle_merge(coordinator, &stream, &agent, json).await
        }
        Commands::Stabilize { agent } => {
            merge::handle_stabilize(coordinator, &agent, json).await
        }
        Commands::Promote { agent } => merge::handle_promote(coordinator, &agent, json).await,

        Commands::Task(command) => match command {
            TaskCommands::Create { title, agent, description, priority, amount } => {
                task::handle_create(
                    coordinator,
                    &title,
                    &agent,
                    description,
                    &priority,
                    amount,
                    json,
                )
                .await
            }
            TaskCommands::List { status } => task::handle_list(coordinator, status, json).await,
            TaskCommands::Claim { task, agent, stream } => {
                task::handle_claim(coordinator, &task, &agent, stream, json).await
            }
            TaskCommands::Submit { claim, agent, notes } => {
                task::handle_submit(coordinator, &claim, &agent, notes, json).await
            }
            TaskCommands::Review { claim, agent, approve, reject } => {
                task::handle_review(coordinator, &claim, &agent, approve, reject, json).await
            }
        },

        Commands::Council(command) => match command {
            CouncilCommands::Create { agent, min_members, max_members, quorum, critical_quorum } => {
                council::handle_create(
                    coordinator,
                    &agent,
                    min_members,
                    max_members,
                    quorum,
                    critical_quorum,
                    json,
                )
                .await
            }
            CouncilCommands::Status => council::handle_status(coordinator, json).await,
            CouncilCommands::Propose { title, agent, action, expires_in_hours } => {
                council::handle_propose(
                    coordinator,
                    &title,
                    &agent,
                    &action,
                    expires_in_hours,
                    json,
                )
                .await
            }
            CouncilCommands::Vote { proposal, agent, choice } => {
                council::handle_vote(coordinator, &proposal, &agent, &choice, json).await
            }
            CouncilCommands::AddMember { name, agent, role } => {
                council::handle_add_member(coordinator, &name, &agent, &role, json).await
            }
            CouncilCommands::Proposals { status } => {
                council::handle_proposals(coordinator, status, json).await
            }
        },

        Commands::Status => status::handle_status(coordinator, json).await,
        Commands::Log { limit } => status::handle_log(coordinator, limit, json).await,

        Commands::Config { key, value, pull } => {
            config_cmd::handle_config(coordinator, key, value, pull, json).await
        }
    }
}

async fn open_coordinator(root: &std::path::Path) -> DomainResult<Coordinator> {
    let config = gitswarm::services::Config::load(root).map_err(|e| {
        gitswarm::DomainError::Validation(format!("configuration: {e}"))
    })?;
    let git = Arc::new(GitCliBackend::new(root.join(&config.repository.path)));
    Coordinator::open(root, git).await
}
