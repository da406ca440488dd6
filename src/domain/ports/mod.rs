//! Ports: the narrow interfaces between the core and its adapters.

pub mod access_repository;
pub mod activity_repository;
pub mod agent_repository;
pub mod council_repository;
pub mod git_backend;
pub mod merge_queue_repository;
pub mod repo_repository;
pub mod review_repository;
pub mod stream_repository;
pub mod sync_repository;
pub mod task_repository;

pub use access_repository::AccessRepository;
pub use activity_repository::ActivityRepository;
pub use agent_repository::{AgentCredential, AgentRepository};
pub use council_repository::CouncilRepository;
pub use git_backend::{
    CommandOutcome, CommitOutcome, FastForwardOutcome, GitBackend, MergeOutcome, WorktreeHandle,
};
pub use merge_queue_repository::MergeQueueRepository;
pub use repo_repository::{RepoRepository, StageChange};
pub use review_repository::ReviewRepository;
pub use stream_repository::{StreamFilter, StreamRepository};
pub use sync_repository::SyncRepository;
pub use task_repository::{TaskFilter, TaskRepository};
