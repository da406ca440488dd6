//! gitswarm — multi-agent git coordination.
//!
//! Agents open isolated streams (feature branches bound to per-agent
//! worktrees), commit, gather peer review, and merge into a staging
//! buffer once the repository's consensus rules are satisfied; green
//! stabilization runs promote the buffer to main. Governance spans
//! maintainer roles, councils with typed proposals, a task market, a
//! karma economy with tiered rate limits, and a client/server sync
//! protocol — one core shared by the embedded and distributed
//! deployments.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use services::Coordinator;
