use std::path::{Path, PathBuf};

use sled::IVec;
use uuid::Uuid;

use crate::growth::errors::GrowthError;
use crate::growth::events::EventEnvelope;
use crate::growth::types::{
    CharacterProgression, MasteryRecord, ParagonLevels, ParagonStandings, PrestigeRecord,
    SkillExperience, MASTERY_SCHEMA_VERSION, PARAGON_SCHEMA_VERSION, PRESTIGE_SCHEMA_VERSION,
    PROGRESSION_SCHEMA_VERSION, SKILL_SCHEMA_VERSION,
};

const TREE_PROGRESSION: &str = "growth_progression";
const TREE_SKILLS: &str = "growth_skills";
const TREE_PARAGON: &str = "growth_paragon";
const TREE_PRESTIGE: &str = "growth_prestige";
const TREE_MASTERY: &str = "growth_mastery";
const TREE_EVENTS: &str = "growth_events";

/// Row store for [`CharacterProgression`]. Each call is atomic for its row.
pub trait ProgressionStore: Send + Sync {
    fn get_progression(&self, character_id: Uuid)
        -> Result<Option<CharacterProgression>, GrowthError>;
    /// Fails with [`GrowthError::AlreadyExists`] when the row is present.
    fn create_progression(&self, record: &CharacterProgression) -> Result<(), GrowthError>;
    /// Fails with [`GrowthError::NotFound`] when the row is absent.
    fn update_progression(&self, record: &CharacterProgression) -> Result<(), GrowthError>;
}

/// Row store for per-(character, skill) experience.
pub trait SkillExperienceStore: Send + Sync {
    fn get_skill_experience(
        &self,
        character_id: Uuid,
        skill_id: &str,
    ) -> Result<Option<SkillExperience>, GrowthError>;
    fn create_skill_experience(&self, record: &SkillExperience) -> Result<(), GrowthError>;
    fn update_skill_experience(&self, record: &SkillExperience) -> Result<(), GrowthError>;
    /// Most recently updated first.
    fn list_skill_experience(
        &self,
        character_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SkillExperience>, GrowthError>;
    fn count_skill_experience(&self, character_id: Uuid) -> Result<u64, GrowthError>;
}

/// Row store for [`ParagonLevels`].
pub trait ParagonStore: Send + Sync {
    fn get_paragon(&self, character_id: Uuid) -> Result<Option<ParagonLevels>, GrowthError>;
    fn create_paragon(&self, record: &ParagonLevels) -> Result<(), GrowthError>;
    fn update_paragon(&self, record: &ParagonLevels) -> Result<(), GrowthError>;
    /// Rank inputs for a character at `level` with `points_total` earned.
    fn paragon_standings(&self, level: u32, points_total: u32)
        -> Result<ParagonStandings, GrowthError>;
}

/// Row store for [`PrestigeRecord`].
pub trait PrestigeStore: Send + Sync {
    fn get_prestige(&self, character_id: Uuid) -> Result<Option<PrestigeRecord>, GrowthError>;
    fn create_prestige(&self, record: &PrestigeRecord) -> Result<(), GrowthError>;
    fn update_prestige(&self, record: &PrestigeRecord) -> Result<(), GrowthError>;
}

/// Row store for [`MasteryRecord`], one row holding every track.
pub trait MasteryStore: Send + Sync {
    fn get_mastery(&self, character_id: Uuid) -> Result<Option<MasteryRecord>, GrowthError>;
    fn create_mastery(&self, record: &MasteryRecord) -> Result<(), GrowthError>;
    fn update_mastery(&self, record: &MasteryRecord) -> Result<(), GrowthError>;
}

trait Versioned {
    const ENTITY: &'static str;
    const SCHEMA: u8;
    fn schema_version(&self) -> u8;
}

impl Versioned for CharacterProgression {
    const ENTITY: &'static str = "progression";
    const SCHEMA: u8 = PROGRESSION_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
}

impl Versioned for SkillExperience {
    const ENTITY: &'static str = "skill";
    const SCHEMA: u8 = SKILL_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
}

impl Versioned for ParagonLevels {
    const ENTITY: &'static str = "paragon";
    const SCHEMA: u8 = PARAGON_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
}

impl Versioned for PrestigeRecord {
    const ENTITY: &'static str = "prestige";
    const SCHEMA: u8 = PRESTIGE_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
}

impl Versioned for MasteryRecord {
    const ENTITY: &'static str = "mastery";
    const SCHEMA: u8 = MASTERY_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct GrowthStoreBuilder {
    path: PathBuf,
    cache_capacity: Option<u64>,
}

impl GrowthStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache_capacity: None,
        }
    }

    /// Override sled's page cache size in bytes.
    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = Some(bytes);
        self
    }

    pub fn open(self) -> Result<GrowthStore, GrowthError> {
        std::fs::create_dir_all(&self.path)?;
        let mut config = sled::Config::new().path(&self.path);
        if let Some(bytes) = self.cache_capacity {
            config = config.cache_capacity(bytes);
        }
        GrowthStore::from_db(config.open()?)
    }
}

/// Sled-backed persistence for character progression, skills, paragon,
/// prestige and mastery state, plus the published event journal.
pub struct GrowthStore {
    db: sled::Db,
    progression: sled::Tree,
    skills: sled::Tree,
    paragon: sled::Tree,
    prestige: sled::Tree,
    mastery: sled::Tree,
    events: sled::Tree,
}

impl GrowthStore {
    /// Open (or create) the growth store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GrowthError> {
        GrowthStoreBuilder::new(path.as_ref()).open()
    }

    fn from_db(db: sled::Db) -> Result<Self, GrowthError> {
        Ok(Self {
            progression: db.open_tree(TREE_PROGRESSION)?,
            skills: db.open_tree(TREE_SKILLS)?,
            paragon: db.open_tree(TREE_PARAGON)?,
            prestige: db.open_tree(TREE_PRESTIGE)?,
            mastery: db.open_tree(TREE_MASTERY)?,
            events: db.open_tree(TREE_EVENTS)?,
            db,
        })
    }

    fn progression_key(character_id: Uuid) -> Vec<u8> {
        format!("progression:{}", character_id).into_bytes()
    }

    fn skill_prefix(character_id: Uuid) -> Vec<u8> {
        format!("skills:{}:", character_id).into_bytes()
    }

    fn skill_key(character_id: Uuid, skill_id: &str) -> Vec<u8> {
        format!("skills:{}:{}", character_id, skill_id).into_bytes()
    }

    fn paragon_key(character_id: Uuid) -> Vec<u8> {
        format!("paragon:{}", character_id).into_bytes()
    }

    fn prestige_key(character_id: Uuid) -> Vec<u8> {
        format!("prestige:{}", character_id).into_bytes()
    }

    fn mastery_key(character_id: Uuid) -> Vec<u8> {
        format!("mastery:{}", character_id).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, GrowthError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T>(bytes: IVec) -> Result<T, GrowthError>
    where
        T: serde::de::DeserializeOwned + Versioned,
    {
        let record: T = bincode::deserialize(&bytes)?;
        if record.schema_version() != T::SCHEMA {
            return Err(GrowthError::SchemaMismatch {
                entity: T::ENTITY,
                expected: T::SCHEMA,
                found: record.schema_version(),
            });
        }
        Ok(record)
    }

    fn read<T>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>, GrowthError>
    where
        T: serde::de::DeserializeOwned + Versioned,
    {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(Self::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert only if no row exists at `key`.
    fn insert_new<T>(tree: &sled::Tree, key: Vec<u8>, value: &T) -> Result<(), GrowthError>
    where
        T: serde::Serialize + Versioned,
    {
        let bytes = Self::serialize(value)?;
        let swapped = tree.compare_and_swap(&key, None as Option<&[u8]>, Some(bytes))?;
        if swapped.is_err() {
            return Err(GrowthError::AlreadyExists(format!(
                "{}: {}",
                T::ENTITY,
                String::from_utf8_lossy(&key)
            )));
        }
        tree.flush()?;
        Ok(())
    }

    /// Overwrite an existing row at `key`.
    fn replace<T>(tree: &sled::Tree, key: Vec<u8>, value: &T) -> Result<(), GrowthError>
    where
        T: serde::Serialize + Versioned,
    {
        if !tree.contains_key(&key)? {
            return Err(GrowthError::NotFound(format!(
                "{}: {}",
                T::ENTITY,
                String::from_utf8_lossy(&key)
            )));
        }
        let bytes = Self::serialize(value)?;
        tree.insert(key, bytes)?;
        tree.flush()?;
        Ok(())
    }

    /// Append a published event to the journal tree.
    pub fn append_event(&self, envelope: &EventEnvelope) -> Result<(), GrowthError> {
        let id = self.db.generate_id()?;
        let key = format!("events:{:020}", id).into_bytes();
        let bytes = serde_json::to_vec(envelope)?;
        self.events.insert(key, bytes)?;
        self.events.flush()?;
        Ok(())
    }

    /// Newest `limit` journaled events, newest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventEnvelope>, GrowthError> {
        self.events
            .scan_prefix(b"events:")
            .rev()
            .take(limit)
            .map(|entry| -> Result<EventEnvelope, GrowthError> {
                let (_key, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    /// Number of characters holding a progression record.
    pub fn count_progressions(&self) -> usize {
        self.progression.len()
    }
}

impl ProgressionStore for GrowthStore {
    fn get_progression(
        &self,
        character_id: Uuid,
    ) -> Result<Option<CharacterProgression>, GrowthError> {
        Self::read(&self.progression, &Self::progression_key(character_id))
    }

    fn create_progression(&self, record: &CharacterProgression) -> Result<(), GrowthError> {
        Self::insert_new(
            &self.progression,
            Self::progression_key(record.character_id),
            record,
        )
    }

    fn update_progression(&self, record: &CharacterProgression) -> Result<(), GrowthError> {
        Self::replace(
            &self.progression,
            Self::progression_key(record.character_id),
            record,
        )
    }
}

impl SkillExperienceStore for GrowthStore {
    fn get_skill_experience(
        &self,
        character_id: Uuid,
        skill_id: &str,
    ) -> Result<Option<SkillExperience>, GrowthError> {
        Self::read(&self.skills, &Self::skill_key(character_id, skill_id))
    }

    fn create_skill_experience(&self, record: &SkillExperience) -> Result<(), GrowthError> {
        Self::insert_new(
            &self.skills,
            Self::skill_key(record.character_id, &record.skill_id),
            record,
        )
    }

    fn update_skill_experience(&self, record: &SkillExperience) -> Result<(), GrowthError> {
        Self::replace(
            &self.skills,
            Self::skill_key(record.character_id, &record.skill_id),
            record,
        )
    }

    fn list_skill_experience(
        &self,
        character_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SkillExperience>, GrowthError> {
        let mut skills = self
            .skills
            .scan_prefix(Self::skill_prefix(character_id))
            .map(|entry| -> Result<SkillExperience, GrowthError> {
                let (_key, value) = entry?;
                Self::deserialize(value)
            })
            .collect::<Result<Vec<_>, _>>()?;
        // Keys sort by skill id; the page order is by recency.
        skills.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.skill_id.cmp(&b.skill_id))
        });
        Ok(skills.into_iter().skip(offset).take(limit).collect())
    }

    fn count_skill_experience(&self, character_id: Uuid) -> Result<u64, GrowthError> {
        let mut count = 0u64;
        for entry in self.skills.scan_prefix(Self::skill_prefix(character_id)) {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}

impl ParagonStore for GrowthStore {
    fn get_paragon(&self, character_id: Uuid) -> Result<Option<ParagonLevels>, GrowthError> {
        Self::read(&self.paragon, &Self::paragon_key(character_id))
    }

    fn create_paragon(&self, record: &ParagonLevels) -> Result<(), GrowthError> {
        Self::insert_new(&self.paragon, Self::paragon_key(record.character_id), record)
    }

    fn update_paragon(&self, record: &ParagonLevels) -> Result<(), GrowthError> {
        Self::replace(&self.paragon, Self::paragon_key(record.character_id), record)
    }

    fn paragon_standings(
        &self,
        level: u32,
        points_total: u32,
    ) -> Result<ParagonStandings, GrowthError> {
        let mut standings = ParagonStandings::default();
        for entry in self.paragon.iter() {
            let (_key, value) = entry?;
            let other: ParagonLevels = Self::deserialize(value)?;
            standings.total += 1;
            standings.level_sum += u64::from(other.paragon_level);
            standings.highest_level = standings.highest_level.max(other.paragon_level);
            let ahead = other.paragon_level > level
                || (other.paragon_level == level && other.paragon_points_total > points_total);
            if ahead {
                standings.ahead += 1;
            }
        }
        Ok(standings)
    }
}

impl PrestigeStore for GrowthStore {
    fn get_prestige(&self, character_id: Uuid) -> Result<Option<PrestigeRecord>, GrowthError> {
        Self::read(&self.prestige, &Self::prestige_key(character_id))
    }

    fn create_prestige(&self, record: &PrestigeRecord) -> Result<(), GrowthError> {
        Self::insert_new(&self.prestige, Self::prestige_key(record.character_id), record)
    }

    fn update_prestige(&self, record: &PrestigeRecord) -> Result<(), GrowthError> {
        Self::replace(&self.prestige, Self::prestige_key(record.character_id), record)
    }
}

impl MasteryStore for GrowthStore {
    fn get_mastery(&self, character_id: Uuid) -> Result<Option<MasteryRecord>, GrowthError> {
        Self::read(&self.mastery, &Self::mastery_key(character_id))
    }

    fn create_mastery(&self, record: &MasteryRecord) -> Result<(), GrowthError> {
        Self::insert_new(&self.mastery, Self::mastery_key(record.character_id), record)
    }

    fn update_mastery(&self, record: &MasteryRecord) -> Result<(), GrowthError> {
        Self::replace(&self.mastery, Self::mastery_key(record.character_id), record)
    }
}
