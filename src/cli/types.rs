//! CLI type definitions.
//!
//! Clap command structures for the gitswarm command tree.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gitswarm")]
#[command(about = "gitswarm - multi-agent git coordination", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the coordination state in the current directory
    Init {
        /// Repository name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Reinitialize even if already initialized
        #[arg(short, long)]
        force: bool,
    },

    /// Agent identity commands
    #[command(subcommand)]
    Agent(AgentCommands),

    /// Workspace (worktree) commands
    #[command(subcommand)]
    Workspace(WorkspaceCommands),

    /// Commit the agent's workspace
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,
    },

    /// Stream commands
    #[command(subcommand)]
    Stream(StreamCommands),

    /// Review commands
    #[command(subcommand)]
    Review(ReviewCommands),

    /// Request a merge of a stream into the buffer
    Merge {
        /// Stream id (full or prefix)
        stream: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,
    },

    /// Run the stabilization command against the buffer tip
    Stabilize {
        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,
    },

    /// Fast-forward the promote target onto the buffer
    Promote {
        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,
    },

    /// Task market commands
    #[command(subcommand)]
    Task(TaskCommands),

    /// Council commands
    #[command(subcommand)]
    Council(CouncilCommands),

    /// Repository status overview
    Status,

    /// Activity log
    Log {
        /// Maximum number of events
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Read or update configuration
    Config {
        /// Dotted key, e.g. sync.server_url
        key: Option<String>,

        /// New value (JSON or bare string)
        value: Option<String>,

        /// Pull configuration updates from the sync server
        #[arg(long)]
        pull: bool,
    },
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Register a new agent; prints the one-time API key
    Register {
        /// Unique agent name
        name: String,

        /// Optional bio
        #[arg(short, long)]
        bio: Option<String>,
    },
    /// List registered agents
    List,
    /// Show one agent
    Info {
        /// Agent name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum WorkspaceCommands {
    /// Create a stream plus a bound worktree
    Create {
        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// Stream name (generated if omitted)
        #[arg(short, long)]
        name: Option<String>,

        /// Task id to link
        #[arg(long)]
        task: Option<String>,

        /// Parent stream id (stacked work)
        #[arg(long)]
        parent: Option<String>,
    },
    /// List worktree bindings
    List,
    /// Remove the agent's worktree
    Destroy {
        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// Also abandon the bound stream
        #[arg(long)]
        abandon: bool,
    },
}

#[derive(Subcommand)]
pub enum StreamCommands {
    /// List streams
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Show one stream
    Info {
        /// Stream id (full or prefix)
        stream: String,
    },
    /// Diff a stream against its base
    Diff {
        /// Stream id (full or prefix)
        stream: String,
    },
    /// Submit a stream for review
    Submit {
        /// Stream id (full or prefix)
        stream: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,
    },
}

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// Submit or update a review
    Submit {
        /// Stream id (full or prefix)
        stream: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// approve, request_changes, or comment
        #[arg(short, long)]
        verdict: String,

        /// Review feedback
        #[arg(short, long)]
        feedback: Option<String>,

        /// The reviewer ran the change
        #[arg(long)]
        tested: bool,

        /// The reviewer is a human
        #[arg(long)]
        human: bool,
    },
    /// List reviews on a stream
    List {
        /// Stream id (full or prefix)
        stream: String,
    },
    /// Evaluate consensus for a stream
    Check {
        /// Stream id (full or prefix)
        stream: String,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Offer a task
    Create {
        /// Task title
        title: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// Task description
        #[arg(short, long)]
        description: Option<String>,

        /// low, medium, high, or critical
        #[arg(short, long, default_value = "medium")]
        priority: String,

        /// Bounty amount (karma award = max(1, amount/10))
        #[arg(long, default_value = "0")]
        amount: i64,
    },
    /// List tasks
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Claim an open task
    Claim {
        /// Task id (full or prefix)
        task: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// Stream id to link
        #[arg(long)]
        stream: Option<String>,
    },
    /// Submit a claim for review
    Submit {
        /// Claim id
        claim: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// Submission notes
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Review a submitted claim
    Review {
        /// Claim id
        claim: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// Approve the claim (rejects without this flag)
        #[arg(long, conflicts_with = "reject")]
        approve: bool,

        /// Reject the claim
        #[arg(long)]
        reject: bool,
    },
}

#[derive(Subcommand)]
pub enum CouncilCommands {
    /// Create the repository's council
    Create {
        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// Minimum members before the council activates
        #[arg(long, default_value = "3")]
        min_members: u32,

        /// Maximum seats
        #[arg(long, default_value = "9")]
        max_members: u32,

        /// Quorum for standard proposals
        #[arg(long, default_value = "2")]
        quorum: u32,

        /// Quorum for critical proposals
        #[arg(long, default_value = "3")]
        critical_quorum: u32,
    },
    /// Show council status and membership
    Status,
    /// Open a proposal (typed action as JSON)
    Propose {
        /// Proposal title
        title: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// Action payload, e.g. '{"type":"add_maintainer","agent_id":"…"}'
        #[arg(long)]
        action: String,

        /// Expiry in hours
        #[arg(long)]
        expires_in_hours: Option<i64>,
    },
    /// Vote on a proposal
    Vote {
        /// Proposal id
        proposal: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// for, against, or abstain
        #[arg(short, long)]
        choice: String,
    },
    /// Add a council member
    AddMember {
        /// Agent to seat
        name: String,

        /// Acting agent name
        #[arg(long = "as", value_name = "AGENT")]
        agent: String,

        /// chair or member
        #[arg(long, default_value = "member")]
        role: String,
    },
    /// List proposals
    Proposals {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
    },
}
