//! Git backend implementations.

pub mod cli_backend;
pub mod memory_backend;

pub use cli_backend::{validate_branch_name, GitCliBackend};
pub use memory_backend::MemoryGitBackend;
