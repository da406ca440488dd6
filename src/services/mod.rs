//! Services: the governance and coordination engine.

pub mod access;
pub mod activity_log;
pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod council;
pub mod identity;
pub mod karma;
pub mod merge_queue;
pub mod rate_limiter;
pub mod stage_engine;
pub mod stream_tracker;
pub mod sync;
pub mod task_market;

pub use access::AccessService;
pub use activity_log::ActivityLog;
pub use config::{Config, ConfigError};
pub use coordinator::{Coordinator, StatusSummary};
pub use council::{CouncilParams, CouncilService};
pub use identity::{AgentContext, IdentityService, Registration};
pub use karma::{KarmaService, MERGE_AWARD, REVIEW_AWARD};
pub use merge_queue::{MergeRequestOptions, MergeService, StabilizationOutcome};
pub use rate_limiter::{default_limits, LimitConfig, RateLimitDecision, RateLimiter};
pub use stage_engine::{requirements_for, AdvancementReport, StageEngine, UnmetRequirement};
pub use stream_tracker::{StreamOptions, StreamTracker, SubmittedReview};
pub use sync::{FlushReport, SyncService};
pub use task_market::{ClaimDecision, TaskMarket};
