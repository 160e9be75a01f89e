//! Character experience, level-ups, and attribute/skill point spending.
//!
//! Every mutation runs under the character's lock, reads the current row from
//! the store, writes it back, then invalidates the cached snapshot before
//! returning. Events go out after the lock is released.

use std::sync::Arc;

use log::{debug, info};
use uuid::Uuid;

use crate::growth::cache::{progression_key, GrowthCache};
use crate::growth::curve::{
    experience_for_level, skill_experience_for_level, skill_level_for_experience,
};
use crate::growth::errors::GrowthError;
use crate::growth::events::{publish_best_effort, EventSink, GrowthEvent};
use crate::growth::locks::CharacterLocks;
use crate::growth::storage::{ProgressionStore, SkillExperienceStore};
use crate::growth::types::{
    CharacterProgression, GrowthRules, SkillExperience, SkillProgressionPage,
};
use crate::logutil::escape_log;
use crate::metrics;
use crate::validation::{normalize_name, NameKind};

/// Largest page [`ProgressionService::get_skill_progression`] returns.
pub const MAX_SKILL_PAGE: usize = 100;

pub struct ProgressionService {
    progressions: Arc<dyn ProgressionStore>,
    skills: Arc<dyn SkillExperienceStore>,
    cache: GrowthCache,
    events: Arc<dyn EventSink>,
    locks: CharacterLocks,
    rules: GrowthRules,
}

impl ProgressionService {
    pub fn new(
        progressions: Arc<dyn ProgressionStore>,
        skills: Arc<dyn SkillExperienceStore>,
        cache: GrowthCache,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            progressions,
            skills,
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

    /// Share a lock table with other services writing the same store.
    pub fn with_locks(mut self, locks: CharacterLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn rules(&self) -> &GrowthRules {
        &self.rules
    }

    /// Cached progression for `character_id`, created on first access.
    ///
    /// The miss path (store read plus cache fill) holds the character's lock,
    /// so a fill can never land after a writer's invalidation.
    pub fn get_progression(&self, character_id: Uuid) -> Result<CharacterProgression, GrowthError> {
        let key = progression_key(character_id);
        self.locks.with_lock(&key, || {
            self.cache
                .get_or_load(&key, || self.load_or_create(character_id))
        })
    }

    fn load_or_create(&self, character_id: Uuid) -> Result<CharacterProgression, GrowthError> {
        if let Some(existing) = self.progressions.get_progression(character_id)? {
            return Ok(existing);
        }
        let fresh = CharacterProgression::new(character_id);
        match self.progressions.create_progression(&fresh) {
            Ok(()) => {
                info!("Created progression for character {}", character_id);
                Ok(fresh)
            }
            // Lost a creation race; the winner's row is authoritative.
            Err(GrowthError::AlreadyExists(_)) => self
                .progressions
                .get_progression(character_id)?
                .ok_or_else(|| GrowthError::NotFound(format!("progression: {}", character_id))),
            Err(e) => Err(e),
        }
    }

    fn save(&self, progression: &CharacterProgression) -> Result<(), GrowthError> {
        self.progressions.update_progression(progression)?;
        self.cache
            .invalidate(&progression_key(progression.character_id));
        Ok(())
    }

    /// Grant experience and roll over as many levels as it covers.
    ///
    /// Each level grants attribute and skill points; one level-up event is
    /// published per call, carrying the final level.
    pub fn add_experience(
        &self,
        character_id: Uuid,
        amount: u64,
        source: &str,
    ) -> Result<(), GrowthError> {
        let key = progression_key(character_id);
        let level_up = self.locks.with_lock(&key, || {
            let mut progression = self.load_or_create(character_id)?;
            let previous_level = progression.level.max(1);
            progression.level = previous_level;
            progression.experience_to_next = experience_for_level(previous_level + 1);
            progression.experience = progression.experience.saturating_add(amount);
            progression.lifetime_experience =
                progression.lifetime_experience.saturating_add(amount);

            while progression.experience >= progression.experience_to_next {
                progression.experience -= progression.experience_to_next;
                progression.level += 1;
                progression.experience_to_next = experience_for_level(progression.level + 1);
                progression.attribute_points = progression
                    .attribute_points
                    .saturating_add(self.rules.attribute_points_per_level);
                progression.skill_points = progression
                    .skill_points
                    .saturating_add(self.rules.skill_points_per_level);
            }
            progression.touch();
            self.save(&progression)?;

            debug!(
                "Granted {} experience to {} from {}",
                amount,
                character_id,
                escape_log(source)
            );
            Ok((progression.level > previous_level).then_some((previous_level, progression.level)))
        })?;

        metrics::record_experience_granted(source, amount);
        if let Some((previous_level, new_level)) = level_up {
            metrics::inc_level_ups(u64::from(new_level - previous_level));
            info!(
                "Character {} leveled up {} -> {}",
                character_id, previous_level, new_level
            );
            publish_best_effort(
                self.events.as_ref(),
                GrowthEvent::LevelUp {
                    character_id,
                    previous_level,
                    new_level,
                    source: source.to_string(),
                },
            );
        }
        Ok(())
    }

    fn load_skill(
        &self,
        character_id: Uuid,
        skill_id: &str,
    ) -> Result<(SkillExperience, bool), GrowthError> {
        match self.skills.get_skill_experience(character_id, skill_id)? {
            Some(skill) => Ok((skill, false)),
            None => Ok((SkillExperience::new(character_id, skill_id), true)),
        }
    }

    fn save_skill(&self, skill: &SkillExperience, is_new: bool) -> Result<(), GrowthError> {
        if is_new {
            self.skills.create_skill_experience(skill)
        } else {
            self.skills.update_skill_experience(skill)
        }
    }

    /// Grant skill experience; the skill level is re-derived from the total.
    ///
    /// A skill-leveled event is published whether or not the level changed.
    pub fn add_skill_experience(
        &self,
        character_id: Uuid,
        skill_id: &str,
        amount: u64,
    ) -> Result<(), GrowthError> {
        let skill_id = normalize_name(skill_id, NameKind::Skill)?;
        let key = progression_key(character_id);
        let event = self.locks.with_lock(&key, || {
            let (mut skill, is_new) = self.load_skill(character_id, &skill_id)?;
            let previous_level = skill_level_for_experience(skill.experience);
            skill.experience = skill.experience.saturating_add(amount);
            skill.level = skill_level_for_experience(skill.experience);
            skill.touch();
            self.save_skill(&skill, is_new)?;
            Ok(GrowthEvent::SkillLeveled {
                character_id,
                skill_id: skill_id.clone(),
                previous_level,
                level: skill.level,
                experience: skill.experience,
                bonus_experience: 0,
            })
        })?;

        if let GrowthEvent::SkillLeveled {
            previous_level,
            level,
            ..
        } = &event
        {
            if level > previous_level {
                metrics::inc_skill_level_ups(u64::from(level - previous_level));
                info!(
                    "Character {} skill {} reached level {}",
                    character_id, skill_id, level
                );
            }
        }
        publish_best_effort(self.events.as_ref(), event);
        Ok(())
    }

    /// Spend one attribute point on `attribute`.
    ///
    /// The cap is checked before the balance: an attribute already at the cap
    /// reports [`GrowthError::AttributeAtMaximum`] even with no points left.
    pub fn allocate_attribute_point(
        &self,
        character_id: Uuid,
        attribute: &str,
    ) -> Result<(), GrowthError> {
        let attribute = normalize_name(attribute, NameKind::Attribute)?;
        let key = progression_key(character_id);
        let event = self.locks.with_lock(&key, || {
            let mut progression = self.load_or_create(character_id)?;
            let current = progression.attribute(&attribute);
            if current >= self.rules.attribute_cap {
                return Err(GrowthError::AttributeAtMaximum {
                    attribute: attribute.clone(),
                    max: self.rules.attribute_cap,
                });
            }
            if progression.attribute_points < 1 {
                return Err(GrowthError::InsufficientPoints {
                    kind: "attribute",
                    required: 1,
                    available: progression.attribute_points,
                });
            }
            progression.attributes.insert(attribute.clone(), current + 1);
            progression.attribute_points -= 1;
            progression.touch();
            self.save(&progression)?;
            Ok(GrowthEvent::AttributeIncreased {
                character_id,
                attribute: attribute.clone(),
                value: current + 1,
                attribute_points: progression.attribute_points,
            })
        })?;

        metrics::inc_attribute_allocations();
        publish_best_effort(self.events.as_ref(), event);
        Ok(())
    }

    /// Spend one skill point on `skill_id`.
    ///
    /// The point buys exactly the experience the skill is missing to reach its
    /// next level, so the level stays derived from experience.
    ///
    /// The skill row is written before the point is spent. If the progression
    /// write then fails the skill keeps its new level and the point stays
    /// unspent; a failed skill write leaves both rows untouched.
    pub fn allocate_skill_point(&self, character_id: Uuid, skill_id: &str) -> Result<(), GrowthError> {
        let skill_id = normalize_name(skill_id, NameKind::Skill)?;
        let key = progression_key(character_id);
        let event = self.locks.with_lock(&key, || {
            let mut progression = self.load_or_create(character_id)?;
            if progression.skill_points < 1 {
                return Err(GrowthError::InsufficientPoints {
                    kind: "skill",
                    required: 1,
                    available: progression.skill_points,
                });
            }
            let (mut skill, is_new) = self.load_skill(character_id, &skill_id)?;
            let previous_level = skill_level_for_experience(skill.experience);
            let bonus = skill_experience_for_level(previous_level).saturating_sub(skill.experience);
            skill.experience = skill.experience.saturating_add(bonus);
            skill.level = skill_level_for_experience(skill.experience);
            skill.touch();

            self.save_skill(&skill, is_new)?;
            progression.skill_points -= 1;
            progression.touch();
            self.save(&progression)?;

            Ok(GrowthEvent::SkillLeveled {
                character_id,
                skill_id: skill_id.clone(),
                previous_level,
                level: skill.level,
                experience: skill.experience,
                bonus_experience: bonus,
            })
        })?;

        metrics::inc_skill_points_spent();
        metrics::inc_skill_level_ups(1);
        publish_best_effort(self.events.as_ref(), event);
        Ok(())
    }

    /// One page of the character's skills, most recently updated first.
    ///
    /// `limit` is clamped to 1..=[`MAX_SKILL_PAGE`].
    pub fn get_skill_progression(
        &self,
        character_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<SkillProgressionPage, GrowthError> {
        let limit = limit.clamp(1, MAX_SKILL_PAGE);
        let skills = self
            .skills
            .list_skill_experience(character_id, limit, offset)?;
        let total = self.skills.count_skill_experience(character_id)?;
        Ok(SkillProgressionPage {
            skills,
            total,
            limit,
            offset,
        })
    }
}
