//! Hierarchical skill system
//!
//! Skills are reusable units of agent behavior organized in a three-tier
//! generality hierarchy. Retrieval falls back Specific → Domain → Meta
//! through embedding similarity, and when nothing better than the Meta
//! fallback exists, the evolution engine synthesizes a new skill on the fly
//! and persists it for future reuse.
//!
//! - `types`: the skill data model
//! - `store`: persistence and similarity-filtered retrieval
//! - `evolution`: LLM-driven drafting and refinement
//! - `manager`: the get-or-evolve orchestration point
//! - `events`: advisory lifecycle events
//! - `feedback`: rating-driven refinement loop

pub mod events;
pub mod evolution;
pub mod feedback;
pub mod manager;
pub mod store;
pub mod types;

pub use events::{ChannelEventSink, NullEventSink, SkillEvent, SkillEventSink};
pub use evolution::{EvolutionEngine, EvolutionOutcome, EvolutionRequest, RefineTarget};
pub use feedback::{FeedbackOutcome, FeedbackService, SkillFeedback};
pub use manager::DynamicSkillManager;
pub use store::{RetrievedSkill, SkillStore};
pub use types::{
    GLOBAL_TENANT, Skill, SkillContent, SkillLevel, UsageStats, builtin_meta_skills,
    default_meta_skill,
};
