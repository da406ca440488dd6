//! Embedded store: SQLite adapters for every repository port.

pub mod access_repository;
pub mod activity_repository;
pub mod agent_repository;
pub mod connection;
pub mod council_repository;
pub mod merge_queue_repository;
pub mod migrations;
pub mod repo_repository;
pub mod review_repository;
pub mod stream_repository;
pub mod sync_repository;
pub mod task_repository;

pub use access_repository::SqliteAccessRepository;
pub use activity_repository::SqliteActivityRepository;
pub use agent_repository::SqliteAgentRepository;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use council_repository::SqliteCouncilRepository;
pub use merge_queue_repository::SqliteMergeQueueRepository;
pub use migrations::{all_migrations, Migration, MigrationError, Migrator};
pub use repo_repository::SqliteRepoRepository;
pub use review_repository::SqliteReviewRepository;
pub use stream_repository::SqliteStreamRepository;
pub use sync_repository::SqliteSyncRepository;
pub use task_repository::SqliteTaskRepository;
