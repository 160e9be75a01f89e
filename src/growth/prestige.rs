//! Prestige resets: a character at the required level trades its level for a
//! permanent bonus multiplier.
//!
//! The prestige row and the progression row are both written under the
//! character's progression lock, so a reset never interleaves with an
//! experience grant or a point spend.

use std::sync::Arc;

use chrono::Utc;
use log::info;
use uuid::Uuid;

use crate::growth::cache::{prestige_key, progression_key, GrowthCache};
use crate::growth::curve::experience_for_level;
use crate::growth::errors::GrowthError;
use crate::growth::events::{publish_best_effort, EventSink, GrowthEvent};
use crate::growth::locks::CharacterLocks;
use crate::growth::storage::{PrestigeStore, ProgressionStore};
use crate::growth::types::{GrowthRules, PrestigeBonuses, PrestigeInfo, PrestigeRecord};
use crate::metrics;

pub struct PrestigeService {
    progressions: Arc<dyn ProgressionStore>,
    store: Arc<dyn PrestigeStore>,
    cache: GrowthCache,
    events: Arc<dyn EventSink>,
    locks: CharacterLocks,
    rules: GrowthRules,
}

impl PrestigeService {
    pub fn new(
        progressions: Arc<dyn ProgressionStore>,
        store: Arc<dyn PrestigeStore>,
        cache: GrowthCache,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            progressions,
            store,
            cache,
            events,
            locks: CharacterLocks::new(),
            rules: GrowthRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: GrowthRules) -> Self {
        self.rules = rules;
        self
    }

    /// Must be the same table the progression service locks with.
    pub fn with_locks(mut self, locks: CharacterLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Resetting from level 1 would change nothing, so 2 is the floor.
    fn required_level(&self) -> u32 {
        self.rules.prestige_required_level.max(2)
    }

    fn load_or_create(&self, character_id: Uuid) -> Result<PrestigeRecord, GrowthError> {
        if let Some(existing) = self.store.get_prestige(character_id)? {
            return Ok(existing);
        }
        let fresh = PrestigeRecord::new(character_id);
        match self.store.create_prestige(&fresh) {
            Ok(()) => Ok(fresh),
            Err(GrowthError::AlreadyExists(_)) => self
                .store
                .get_prestige(character_id)?
                .ok_or_else(|| GrowthError::NotFound(format!("prestige: {}", character_id))),
            Err(e) => Err(e),
        }
    }

    fn character_level(&self, character_id: Uuid) -> Result<u32, GrowthError> {
        Ok(self
            .progressions
            .get_progression(character_id)?
            .map(|p| p.level)
            .unwrap_or(1))
    }

    /// Prestige standing for `character_id`, created on first access.
    ///
    /// The prestige snapshot is cached; the character level is always read
    /// from the progression store.
    pub fn get_prestige_info(&self, character_id: Uuid) -> Result<PrestigeInfo, GrowthError> {
        self.locks.with_lock(&progression_key(character_id), || {
            let record = self
                .cache
                .get_or_load(&prestige_key(character_id), || {
                    self.load_or_create(character_id)
                })?;
            let level = self.character_level(character_id)?;
            Ok(PrestigeInfo::from_record(&record, level, self.required_level()))
        })
    }

    /// Reset a character at or above the required level back to level 1.
    ///
    /// The reset adds [`crate::growth::types::PRESTIGE_MULTIPLIER_STEP`] to the
    /// multiplier and refreshes the xp and currency bonuses. Attributes,
    /// unspent points and lifetime experience are kept. The prestige row is
    /// written before the progression row: if the second write fails the
    /// character keeps both the bonus and its level.
    pub fn reset_prestige(&self, character_id: Uuid) -> Result<PrestigeInfo, GrowthError> {
        let required = self.required_level();
        let (previous_level, record) = self.locks.with_lock(&progression_key(character_id), || {
            let mut progression = match self.progressions.get_progression(character_id)? {
                Some(p) if p.level >= required => p,
                other => {
                    return Err(GrowthError::LevelRequirement {
                        required,
                        current: other.map_or(1, |p| p.level),
                    })
                }
            };

            let mut record = self.load_or_create(character_id)?;
            record.record_reset(Utc::now());
            record.touch();
            self.store.update_prestige(&record)?;
            self.cache.invalidate(&prestige_key(character_id));

            let previous_level = progression.level;
            progression.level = 1;
            progression.experience = 0;
            progression.experience_to_next = experience_for_level(2);
            progression.touch();
            self.progressions.update_progression(&progression)?;
            self.cache.invalidate(&progression_key(character_id));
            Ok((previous_level, record))
        })?;

        metrics::inc_prestige_resets();
        info!(
            "Prestige reset for character {} from level {} (multiplier {:.2})",
            character_id, previous_level, record.bonus_multiplier
        );
        publish_best_effort(
            self.events.as_ref(),
            GrowthEvent::PrestigeReset {
                character_id,
                previous_level,
                total_resets: record.total_resets,
                bonus_multiplier: record.bonus_multiplier,
            },
        );
        Ok(PrestigeInfo::from_record(&record, 1, required))
    }

    /// Bonus multipliers earned so far; empty for a character that never reset.
    ///
    /// Never creates a prestige record.
    pub fn get_prestige_bonuses(&self, character_id: Uuid) -> Result<PrestigeBonuses, GrowthError> {
        let bonuses = self
            .store
            .get_prestige(character_id)?
            .map(|record| record.bonuses)
            .unwrap_or_default();
        Ok(PrestigeBonuses {
            character_id,
            bonuses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::cache::MemoryCache;
    use crate::growth::events::LogEventSink;
    use crate::growth::storage::GrowthStore;
    use crate::growth::types::{CharacterProgression, BONUS_XP_MULTIPLIER};
    use tempfile::TempDir;

    fn service() -> (TempDir, Arc<GrowthStore>, PrestigeService) {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(GrowthStore::open(dir.path()).expect("store"));
        let svc = PrestigeService::new(
            store.clone(),
            store.clone(),
            GrowthCache::new(Arc::new(MemoryCache::new())),
            Arc::new(LogEventSink),
        );
        (dir, store, svc)
    }

    fn seed_level(store: &GrowthStore, id: Uuid, level: u32) {
        let mut p = CharacterProgression::new(id);
        p.level = level;
        p.experience = 40;
        p.experience_to_next = experience_for_level(level + 1);
        p.lifetime_experience = 1_000_000;
        p.attribute_points = 3;
        p.attributes.insert("strength".into(), 9);
        store.create_progression(&p).unwrap();
    }

    #[test]
    fn reset_below_required_level_is_rejected_without_writes() {
        let (_dir, store, svc) = service();
        let id = Uuid::new_v4();
        seed_level(&store, id, 49);
        let err = svc.reset_prestige(id).unwrap_err();
        assert!(matches!(
            err,
            GrowthError::LevelRequirement {
                required: 50,
                current: 49
            }
        ));
        assert!(store.get_prestige(id).unwrap().is_none());
        assert_eq!(store.get_progression(id).unwrap().unwrap().level, 49);
    }

    #[test]
    fn reset_without_a_progression_row_reports_level_one() {
        let (_dir, _store, svc) = service();
        let err = svc.reset_prestige(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, GrowthError::LevelRequirement { current: 1, .. }));
    }

    #[test]
    fn reset_trades_the_level_for_a_multiplier() {
        let (_dir, store, svc) = service();
        let id = Uuid::new_v4();
        seed_level(&store, id, 50);

        let info = svc.reset_prestige(id).unwrap();
        assert_eq!(info.total_resets, 1);
        assert!((info.bonus_multiplier - 1.1).abs() < 1e-9);
        assert_eq!(info.character_level, 1);
        assert!(!info.eligible);

        let p = store.get_progression(id).unwrap().unwrap();
        assert_eq!(p.level, 1);
        assert_eq!(p.experience, 0);
        assert_eq!(p.experience_to_next, 100);
        assert_eq!(p.lifetime_experience, 1_000_000);
        assert_eq!(p.attribute_points, 3);
        assert_eq!(p.attribute("strength"), 9);

        let bonuses = svc.get_prestige_bonuses(id).unwrap().bonuses;
        assert!((bonuses[BONUS_XP_MULTIPLIER] - 1.1).abs() < 1e-9);
    }

    #[test]
    fn custom_required_level_applies() {
        let (_dir, store, svc) = service();
        let svc = svc.with_rules(GrowthRules {
            prestige_required_level: 10,
            ..GrowthRules::default()
        });
        let id = Uuid::new_v4();
        seed_level(&store, id, 10);
        assert!(svc.get_prestige_info(id).unwrap().eligible);
        assert_eq!(svc.reset_prestige(id).unwrap().required_level, 10);
    }

    #[test]
    fn bonuses_for_unknown_character_are_empty_and_not_created() {
        let (_dir, store, svc) = service();
        let id = Uuid::new_v4();
        assert!(svc.get_prestige_bonuses(id).unwrap().bonuses.is_empty());
        assert!(store.get_prestige(id).unwrap().is_none());
    }
}
