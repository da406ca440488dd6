//! Domain entities and value types.

pub mod access;
pub mod activity;
pub mod agent;
pub mod consensus;
pub mod council;
pub mod merge_queue;
pub mod repository;
pub mod review;
pub mod stream;
pub mod sync;
pub mod task;

pub use access::{
    AccessGrant, AccessLevel, BranchRule, DirectPush, Maintainer, MaintainerRole,
    PermissionSource, RepoAction, ResolvedPermission,
};
pub use activity::{ActivityEvent, EventFilter};
pub use agent::{Agent, AgentStatus, KarmaTier};
pub use consensus::{ConsensusDecision, ConsensusReason};
pub use council::{
    Council, CouncilMember, CouncilRole, CouncilStatus, CouncilVote, Proposal, ProposalAction,
    ProposalStatus, VoteChoice,
};
pub use merge_queue::{MergeEntryStatus, MergeQueueEntry};
pub use repository::{
    AgentAccess, ConsensusAuthority, MergeMode, OwnershipModel, RepoSettingsPatch, RepoStage,
    Repository,
};
pub use review::{Review, ReviewVerdict};
pub use stream::{ReviewStatus, Stream, StreamStatus, WorktreeBinding};
pub use sync::{
    DeltaRow, PushReport, SyncCategory, SyncDelta, SyncEventType, SyncQueueItem,
};
pub use task::{Claim, ClaimStatus, Task, TaskPriority, TaskStatus};
