//! Per-content mastery tracks (raid, dungeon, world boss, pvp, exploration).
//!
//! Each track levels linearly on its own base experience and unlocks extra
//! rewards at levels 5, 10 and 25.

use std::sync::Arc;

use log::info;
use uuid::Uuid;

use crate::growth::cache::{mastery_key, GrowthCache};
use crate::growth::errors::GrowthError;
use crate::growth::events::{publish_best_effort, EventSink, GrowthEvent};
use crate::growth::locks::CharacterLocks;
use crate::growth::storage::MasteryStore;
use crate::growth::types::{
    MasteryLevels, MasteryProgress, MasteryRecord, MasteryRewards, MasteryType,
};
use crate::metrics;

pub struct MasteryService {
    store: Arc<dyn MasteryStore>,
    cache: GrowthCache,
    events: Arc<dyn EventSink>,
    locks: CharacterLocks,
}

impl MasteryService {
    pub fn new(store: Arc<dyn MasteryStore>, cache: GrowthCache, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            cache,
            events,
            locks: CharacterLocks::new(),
        }
    }

    pub fn with_locks(mut self, locks: CharacterLocks) -> Self {
        self.locks = locks;
        self
    }

    fn load_or_create(&self, character_id: Uuid) -> Result<MasteryRecord, GrowthError> {
        if let Some(existing) = self.store.get_mastery(character_id)? {
            return Ok(existing);
        }
        let fresh = MasteryRecord::new(character_id);
        match self.store.create_mastery(&fresh) {
            Ok(()) => {
                info!("Created mastery tracks for character {}", character_id);
                Ok(fresh)
            }
            Err(GrowthError::AlreadyExists(_)) => self
                .store
                .get_mastery(character_id)?
                .ok_or_else(|| GrowthError::NotFound(format!("mastery: {}", character_id))),
            Err(e) => Err(e),
        }
    }

    fn cached(&self, character_id: Uuid) -> Result<MasteryRecord, GrowthError> {
        let key = mastery_key(character_id);
        self.locks.with_lock(&key, || {
            self.cache
                .get_or_load(&key, || self.load_or_create(character_id))
        })
    }

    /// Level and rewards of every track, created on first access.
    pub fn get_mastery_levels(&self, character_id: Uuid) -> Result<MasteryLevels, GrowthError> {
        Ok(MasteryLevels::from(&self.cached(character_id)?))
    }

    pub fn get_mastery_progress(
        &self,
        character_id: Uuid,
        mastery_type: &str,
    ) -> Result<MasteryProgress, GrowthError> {
        let kind: MasteryType = mastery_type.parse()?;
        let record = self.cached(character_id)?;
        Ok(MasteryProgress::from_track(character_id, &record.track(kind)))
    }

    pub fn get_mastery_rewards(
        &self,
        character_id: Uuid,
        mastery_type: &str,
    ) -> Result<MasteryRewards, GrowthError> {
        let kind: MasteryType = mastery_type.parse()?;
        let record = self.cached(character_id)?;
        Ok(MasteryRewards {
            character_id,
            mastery_type: kind,
            rewards: record.track(kind).rewards,
        })
    }

    /// Grant experience to one track.
    ///
    /// A mastery-level-up event is published only when the level changed, and
    /// lists the rewards that level change unlocked.
    pub fn add_mastery_experience(
        &self,
        character_id: Uuid,
        mastery_type: &str,
        amount: u64,
    ) -> Result<MasteryProgress, GrowthError> {
        let kind: MasteryType = mastery_type.parse()?;
        let key = mastery_key(character_id);
        let (previous_level, previous_rewards, track) = self.locks.with_lock(&key, || {
            let mut record = self.load_or_create(character_id)?;
            let track = record.track_mut(kind);
            let previous_level = track.level;
            let previous_rewards = track.rewards.len();
            track.grant(amount);
            let track = track.clone();
            record.touch();
            self.store.update_mastery(&record)?;
            self.cache.invalidate(&key);
            Ok((previous_level, previous_rewards, track))
        })?;

        if track.level > previous_level {
            metrics::inc_mastery_level_ups(u64::from(track.level - previous_level));
            info!(
                "Character {} reached {} mastery level {}",
                character_id, kind, track.level
            );
            publish_best_effort(
                self.events.as_ref(),
                GrowthEvent::MasteryLevelUp {
                    character_id,
                    mastery_type: kind,
                    previous_level,
                    level: track.level,
                    unlocked_rewards: track.rewards[previous_rewards..].to_vec(),
                },
            );
        }
        Ok(MasteryProgress::from_track(character_id, &track))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::cache::MemoryCache;
    use crate::growth::events::LogEventSink;
    use crate::growth::storage::GrowthStore;
    use tempfile::TempDir;

    fn service() -> (TempDir, Arc<GrowthStore>, MasteryService) {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(GrowthStore::open(dir.path()).expect("store"));
        let svc = MasteryService::new(
            store.clone(),
            GrowthCache::new(Arc::new(MemoryCache::new())),
            Arc::new(LogEventSink),
        );
        (dir, store, svc)
    }

    #[test]
    fn first_read_creates_all_tracks_at_level_one() {
        let (_dir, store, svc) = service();
        let id = Uuid::new_v4();
        let levels = svc.get_mastery_levels(id).unwrap();
        assert_eq!(levels.levels.len(), 5);
        assert!(levels.levels.values().all(|level| *level == 1));
        assert_eq!(levels.rewards[&MasteryType::Raid].len(), 2);
        assert!(store.get_mastery(id).unwrap().is_some());
    }

    #[test]
    fn unknown_type_is_rejected_before_any_write() {
        let (_dir, store, svc) = service();
        let id = Uuid::new_v4();
        let err = svc.add_mastery_experience(id, "fishing", 10).unwrap_err();
        assert!(matches!(err, GrowthError::UnknownMasteryType(_)));
        assert!(err.is_validation());
        assert!(svc.get_mastery_rewards(id, "").is_err());
        assert!(store.get_mastery(id).unwrap().is_none());
    }

    #[test]
    fn tracks_level_on_their_own_base_experience() {
        let (_dir, _store, svc) = service();
        let id = Uuid::new_v4();
        // World boss costs 10000 per level, exploration 4000.
        let boss = svc.add_mastery_experience(id, "world_boss", 20_000).unwrap();
        let explore = svc.add_mastery_experience(id, "exploration", 20_000).unwrap();
        assert_eq!(boss.current_level, 2);
        assert_eq!(explore.current_level, 5);
        assert_eq!(explore.experience_to_next_level, 4_000);

        let rewards = svc.get_mastery_rewards(id, "exploration").unwrap().rewards;
        assert_eq!(rewards.last().map(String::as_str), Some("exploration_elite_bonus"));
        let levels = svc.get_mastery_levels(id).unwrap();
        assert_eq!(levels.levels[&MasteryType::Raid], 1);
    }

    #[test]
    fn experience_accumulates_across_grants() {
        let (_dir, _store, svc) = service();
        let id = Uuid::new_v4();
        svc.add_mastery_experience(id, "raid", 7_999).unwrap();
        assert_eq!(svc.get_mastery_progress(id, "raid").unwrap().current_level, 1);
        let progress = svc.add_mastery_experience(id, "raid", 8_001).unwrap();
        assert_eq!(progress.current_level, 2);
        assert_eq!(progress.total_experience_earned, 16_000);
        assert_eq!(svc.get_mastery_progress(id, "RAID").unwrap(), progress);
    }
}
