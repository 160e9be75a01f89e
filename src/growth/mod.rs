//! Character growth: level and experience progression, attribute and skill
//! point spending, skill experience, post-cap paragon progression, prestige
//! resets and content mastery tracks.
//! State lives in sled trees behind the store traits; reads go through a
//! snapshot cache and milestones are published as fire-and-forget events.

pub mod cache;
pub mod curve;
pub mod engine;
pub mod errors;
pub mod events;
pub mod locks;
pub mod mastery;
pub mod paragon;
pub mod prestige;
pub mod progression;
pub mod storage;
pub mod types;

pub use cache::{
    mastery_key, paragon_key, prestige_key, progression_key, CacheClient, GrowthCache,
    MemoryCache, DEFAULT_TTL,
};
pub use curve::{
    experience_for_level, mastery_experience_for_level, mastery_level_for_experience,
    paragon_experience_for_level, skill_experience_for_level, skill_level_for_experience,
};
pub use engine::GrowthEngine;
pub use errors::GrowthError;
pub use events::{
    publish_best_effort, ChannelEventSink, EventEnvelope, EventSink, GrowthEvent,
    JournalEventSink, LogEventSink,
};
pub use locks::CharacterLocks;
pub use mastery::MasteryService;
pub use paragon::ParagonService;
pub use prestige::PrestigeService;
pub use progression::{ProgressionService, MAX_SKILL_PAGE};
pub use storage::{
    GrowthStore, GrowthStoreBuilder, MasteryStore, ParagonStore, PrestigeStore, ProgressionStore,
    SkillExperienceStore,
};
pub use types::*;
