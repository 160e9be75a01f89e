//! # Paragon Engine - Character Progression for Persistent Games
//!
//! Paragon Engine tracks how characters grow: experience and levels, spendable
//! attribute and skill points, per-skill experience, an uncapped paragon
//! track whose points are distributed across stats, prestige resets, and
//! per-content mastery tracks.
//!
//! ## Features
//!
//! - **Experience Curves**: Deterministic level, skill and paragon thresholds.
//! - **Point Economy**: Attribute, skill and paragon points with caps that are checked before any write.
//! - **Prestige & Mastery**: Level resets for a bonus multiplier, and linear mastery tracks with milestone rewards.
//! - **Persistence**: Versioned bincode rows in sled trees, created lazily on first read.
//! - **Snapshot Cache**: Optional read-through cache with invalidation after every write.
//! - **Events**: Fire-and-forget milestone notifications to the log, a journal tree, or a channel.
//! - **Per-Character Serialization**: Concurrent spends on one character cannot overdraw a balance.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paragon_engine::config::Config;
//! use paragon_engine::growth::{GrowthEngine, StatAllocation};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let engine = GrowthEngine::open(&config)?;
//!
//!     let hero = Uuid::new_v4();
//!     engine.progression().add_experience(hero, 150, "quest")?;
//!     engine.progression().allocate_attribute_point(hero, "strength")?;
//!
//!     engine.paragon().add_paragon_experience(hero, 1000)?;
//!     engine
//!         .paragon()
//!         .distribute_paragon_points(hero, &[StatAllocation::new("vitality", 5)])?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`growth`] - Curves, data model, stores, cache, events and the services
//! - [`config`] - Configuration management and validation
//! - [`validation`] - Attribute, skill and stat name normalization
//! - [`metrics`] - Process-local counters
//! - [`logutil`] - Escaping of caller-supplied labels in log lines
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ ProgressionService │ ParagonService  │ ← Rules, caps, level-up loops
//! │ PrestigeService    │ MasteryService  │
//! └──────────────────────────────────────┘
//!          │                    │
//! ┌─────────────────┐  ┌─────────────────┐
//! │  GrowthCache    │  │   EventSink     │ ← Snapshots / notifications
//! └─────────────────┘  └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  GrowthStore    │ ← sled persistence
//! └─────────────────┘
//! ```

pub mod config;
pub mod growth;
pub mod logutil;
pub mod metrics;
pub mod validation;
