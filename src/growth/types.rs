use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::growth::curve::{
    experience_for_level, mastery_experience_for_level, mastery_level_for_experience,
    paragon_experience_for_level,
};
use crate::growth::errors::GrowthError;

pub const PROGRESSION_SCHEMA_VERSION: u8 = 1;
pub const SKILL_SCHEMA_VERSION: u8 = 1;
pub const PARAGON_SCHEMA_VERSION: u8 = 1;
pub const PRESTIGE_SCHEMA_VERSION: u8 = 1;
pub const MASTERY_SCHEMA_VERSION: u8 = 1;

// ============================================================================
// Rules
// ============================================================================

/// Tunable constants for point grants and caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthRules {
    /// Highest value any named attribute may reach
    #[serde(default = "default_attribute_cap")]
    pub attribute_cap: u32,
    /// Highest cumulative paragon points any single stat may hold
    #[serde(default = "default_paragon_stat_cap")]
    pub paragon_stat_cap: u32,
    #[serde(default = "default_attribute_points_per_level")]
    pub attribute_points_per_level: u32,
    #[serde(default = "default_skill_points_per_level")]
    pub skill_points_per_level: u32,
    /// Added to both the earned total and the available balance per paragon level
    #[serde(default = "default_paragon_points_per_level")]
    pub paragon_points_per_level: u32,
    /// Largest paragon experience accepted in one grant
    #[serde(default = "default_max_paragon_experience_per_grant")]
    pub max_paragon_experience_per_grant: u64,
    /// Character level a prestige reset requires
    #[serde(default = "default_prestige_required_level")]
    pub prestige_required_level: u32,
}

fn default_attribute_cap() -> u32 {
    25
}

fn default_paragon_stat_cap() -> u32 {
    100
}

fn default_attribute_points_per_level() -> u32 {
    2
}

fn default_skill_points_per_level() -> u32 {
    1
}

fn default_paragon_points_per_level() -> u32 {
    5
}

fn default_max_paragon_experience_per_grant() -> u64 {
    10_000_000
}

fn default_prestige_required_level() -> u32 {
    50
}

impl Default for GrowthRules {
    fn default() -> Self {
        Self {
            attribute_cap: default_attribute_cap(),
            paragon_stat_cap: default_paragon_stat_cap(),
            attribute_points_per_level: default_attribute_points_per_level(),
            skill_points_per_level: default_skill_points_per_level(),
            paragon_points_per_level: default_paragon_points_per_level(),
            max_paragon_experience_per_grant: default_max_paragon_experience_per_grant(),
            prestige_required_level: default_prestige_required_level(),
        }
    }
}

// ============================================================================
// Character progression
// ============================================================================

/// Level, experience and spendable balances for one character.
///
/// `experience` is progress inside the current level: the level-up loop
/// subtracts each threshold it crosses. `lifetime_experience` only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterProgression {
    pub character_id: Uuid,
    pub level: u32,
    pub experience: u64,
    pub experience_to_next: u64,
    pub lifetime_experience: u64,
    pub attribute_points: u32,
    pub skill_points: u32,
    pub attributes: BTreeMap<String, u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl CharacterProgression {
    pub fn new(character_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            character_id,
            level: 1,
            experience: 0,
            experience_to_next: experience_for_level(2),
            lifetime_experience: 0,
            attribute_points: 0,
            skill_points: 0,
            attributes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            schema_version: PROGRESSION_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Current value of a named attribute; unallocated attributes are 0.
    pub fn attribute(&self, name: &str) -> u32 {
        self.attributes.get(name).copied().unwrap_or(0)
    }

    /// Percent of the way to the next level, 0.0..100.0
    pub fn progress_percent(&self) -> f64 {
        if self.experience_to_next == 0 {
            return 0.0;
        }
        self.experience as f64 / self.experience_to_next as f64 * 100.0
    }
}

// ============================================================================
// Skill experience
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillExperience {
    pub id: Uuid,
    pub character_id: Uuid,
    pub skill_id: String,
    /// Always derived from `experience` via the skill curve
    pub level: u32,
    pub experience: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl SkillExperience {
    pub fn new(character_id: Uuid, skill_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            character_id,
            skill_id: skill_id.to_string(),
            level: 1,
            experience: 0,
            created_at: now,
            updated_at: now,
            schema_version: SKILL_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One page of a character's skills, most recently updated first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillProgressionPage {
    pub skills: Vec<SkillExperience>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

// ============================================================================
// Paragon
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagonAllocation {
    pub stat_type: String,
    pub points_allocated: u32,
}

/// A requested spend of paragon points on one stat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatAllocation {
    pub stat_type: String,
    pub points: u32,
}

impl StatAllocation {
    pub fn new(stat_type: impl Into<String>, points: u32) -> Self {
        Self {
            stat_type: stat_type.into(),
            points,
        }
    }
}

/// Post-cap progression for one character.
///
/// `paragon_points_total == paragon_points_spent + paragon_points_available`
/// after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagonLevels {
    pub character_id: Uuid,
    pub paragon_level: u32,
    pub paragon_points_total: u32,
    pub paragon_points_spent: u32,
    pub paragon_points_available: u32,
    pub experience_current: u64,
    pub experience_required: u64,
    pub allocations: Vec<ParagonAllocation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl ParagonLevels {
    pub fn new(character_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            character_id,
            paragon_level: 0,
            paragon_points_total: 0,
            paragon_points_spent: 0,
            paragon_points_available: 0,
            experience_current: 0,
            experience_required: paragon_experience_for_level(1),
            allocations: Vec::new(),
            created_at: now,
            updated_at: now,
            schema_version: PARAGON_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Points currently allocated to `stat`, 0 when it has no entry.
    pub fn points_for(&self, stat: &str) -> u32 {
        self.allocations
            .iter()
            .find(|a| a.stat_type == stat)
            .map(|a| a.points_allocated)
            .unwrap_or(0)
    }

    pub fn is_balanced(&self) -> bool {
        self.paragon_points_spent
            .checked_add(self.paragon_points_available)
            .is_some_and(|sum| sum == self.paragon_points_total)
    }

    pub fn experience_to_next_level(&self) -> u64 {
        self.experience_required
            .saturating_sub(self.experience_current)
    }

    /// Fraction of the current paragon level completed, 0.0..1.0
    pub fn progress(&self) -> f64 {
        if self.experience_required == 0 {
            return 0.0;
        }
        self.experience_current as f64 / self.experience_required as f64
    }

    pub fn points_by_stat(&self) -> BTreeMap<String, u32> {
        self.allocations
            .iter()
            .map(|a| (a.stat_type.clone(), a.points_allocated))
            .collect()
    }
}

/// Where a character sits among everyone holding a paragon record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParagonStandings {
    /// Characters with a higher level, or equal level and more points earned
    pub ahead: u64,
    pub total: u64,
    pub level_sum: u64,
    pub highest_level: u32,
}

/// Aggregate paragon view for one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagonStats {
    pub character_id: Uuid,
    pub paragon_level: u32,
    pub total_points_earned: u32,
    pub total_points_spent: u32,
    pub points_available: u32,
    pub points_by_stat: BTreeMap<String, u32>,
    /// 1-based position among all characters with paragon records
    pub global_rank: u64,
    /// Share of characters ranked below this one, 0.0..100.0
    pub percentile: f64,
    pub total_characters_with_paragon: u64,
    pub average_paragon_level: f64,
    pub highest_paragon_level: u32,
}

// ============================================================================
// Prestige
// ============================================================================

/// Multiplier gained per completed prestige reset.
pub const PRESTIGE_MULTIPLIER_STEP: f64 = 0.1;
pub const BONUS_XP_MULTIPLIER: &str = "xp_multiplier";
pub const BONUS_CURRENCY_MULTIPLIER: &str = "currency_multiplier";

/// Prestige history for one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrestigeRecord {
    pub character_id: Uuid,
    pub total_resets: u32,
    pub bonus_multiplier: f64,
    /// Empty until the first reset
    pub bonuses: BTreeMap<String, f64>,
    pub last_reset: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl PrestigeRecord {
    pub fn new(character_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            character_id,
            total_resets: 0,
            bonus_multiplier: 1.0,
            bonuses: BTreeMap::new(),
            last_reset: None,
            created_at: now,
            updated_at: now,
            schema_version: PRESTIGE_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Count one more reset and refresh the multiplier and bonus map.
    pub fn record_reset(&mut self, at: DateTime<Utc>) {
        self.total_resets = self.total_resets.saturating_add(1);
        // Recomputed from the count rather than accumulated.
        self.bonus_multiplier = 1.0 + PRESTIGE_MULTIPLIER_STEP * f64::from(self.total_resets);
        self.bonuses
            .insert(BONUS_XP_MULTIPLIER.to_string(), self.bonus_multiplier);
        self.bonuses
            .insert(BONUS_CURRENCY_MULTIPLIER.to_string(), self.bonus_multiplier);
        self.last_reset = Some(at);
    }
}

/// Prestige standing plus what the next reset needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrestigeInfo {
    pub character_id: Uuid,
    pub total_resets: u32,
    pub bonus_multiplier: f64,
    pub last_reset: Option<DateTime<Utc>>,
    pub character_level: u32,
    pub required_level: u32,
    pub eligible: bool,
}

impl PrestigeInfo {
    pub fn from_record(record: &PrestigeRecord, character_level: u32, required_level: u32) -> Self {
        Self {
            character_id: record.character_id,
            total_resets: record.total_resets,
            bonus_multiplier: record.bonus_multiplier,
            last_reset: record.last_reset,
            character_level,
            required_level,
            eligible: character_level >= required_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrestigeBonuses {
    pub character_id: Uuid,
    pub bonuses: BTreeMap<String, f64>,
}

// ============================================================================
// Mastery
// ============================================================================

/// Content categories with their own mastery track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryType {
    Raid,
    Dungeon,
    WorldBoss,
    Pvp,
    Exploration,
}

/// Levels at which a track unlocks an extra reward, with the reward suffix.
const MASTERY_MILESTONES: [(u32, &str); 3] =
    [(5, "elite_bonus"), (10, "legendary_bonus"), (25, "mythic_bonus")];

impl MasteryType {
    pub const ALL: [MasteryType; 5] = [
        MasteryType::Raid,
        MasteryType::Dungeon,
        MasteryType::WorldBoss,
        MasteryType::Pvp,
        MasteryType::Exploration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MasteryType::Raid => "raid",
            MasteryType::Dungeon => "dungeon",
            MasteryType::WorldBoss => "world_boss",
            MasteryType::Pvp => "pvp",
            MasteryType::Exploration => "exploration",
        }
    }

    /// Experience each mastery level costs on this track.
    pub fn base_experience(self) -> u64 {
        match self {
            MasteryType::Raid => 8000,
            MasteryType::Dungeon => 6000,
            MasteryType::WorldBoss => 10_000,
            MasteryType::Pvp => 7000,
            MasteryType::Exploration => 4000,
        }
    }

    pub fn experience_for_level(self, level: u32) -> u64 {
        mastery_experience_for_level(self.base_experience(), level)
    }

    pub fn level_for_experience(self, experience: u64) -> u32 {
        mastery_level_for_experience(self.base_experience(), experience)
    }

    fn starting_rewards(self) -> [&'static str; 2] {
        match self {
            MasteryType::Raid => ["raid_damage_bonus", "raid_health_bonus"],
            MasteryType::Dungeon => ["dungeon_speed_bonus", "dungeon_loot_bonus"],
            MasteryType::WorldBoss => ["world_boss_damage_bonus", "world_boss_crit_bonus"],
            MasteryType::Pvp => ["pvp_damage_bonus", "pvp_defense_bonus"],
            MasteryType::Exploration => {
                ["exploration_speed_bonus", "exploration_discovery_bonus"]
            }
        }
    }

    /// Every reward a track at `level` has unlocked, in unlock order.
    pub fn rewards_at(self, level: u32) -> Vec<String> {
        let mut rewards: Vec<String> = self
            .starting_rewards()
            .iter()
            .map(|r| r.to_string())
            .collect();
        for (milestone, suffix) in MASTERY_MILESTONES {
            if level >= milestone {
                rewards.push(format!("{}_{}", self.as_str(), suffix));
            }
        }
        rewards
    }
}

impl std::fmt::Display for MasteryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MasteryType {
    type Err = GrowthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        MasteryType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| GrowthError::UnknownMasteryType(wanted))
    }
}

/// One mastery track. `level` and `rewards` are derived from `experience`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryTrack {
    pub mastery_type: MasteryType,
    pub level: u32,
    /// Cumulative experience on this track
    pub experience: u64,
    pub rewards: Vec<String>,
}

impl MasteryTrack {
    pub fn new(mastery_type: MasteryType) -> Self {
        Self {
            mastery_type,
            level: 1,
            experience: 0,
            rewards: mastery_type.rewards_at(1),
        }
    }

    /// Add experience and re-derive level and rewards.
    pub fn grant(&mut self, amount: u64) {
        self.experience = self.experience.saturating_add(amount);
        self.level = self.mastery_type.level_for_experience(self.experience);
        self.rewards = self.mastery_type.rewards_at(self.level);
    }
}

/// All mastery tracks for one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryRecord {
    pub character_id: Uuid,
    pub tracks: BTreeMap<MasteryType, MasteryTrack>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl MasteryRecord {
    pub fn new(character_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            character_id,
            tracks: MasteryType::ALL
                .into_iter()
                .map(|kind| (kind, MasteryTrack::new(kind)))
                .collect(),
            created_at: now,
            updated_at: now,
            schema_version: MASTERY_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// The track for `kind`, added fresh if an older record lacks it.
    pub fn track_mut(&mut self, kind: MasteryType) -> &mut MasteryTrack {
        self.tracks
            .entry(kind)
            .or_insert_with(|| MasteryTrack::new(kind))
    }

    pub fn track(&self, kind: MasteryType) -> MasteryTrack {
        self.tracks
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| MasteryTrack::new(kind))
    }
}

/// Level and unlocked rewards for every track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryLevels {
    pub character_id: Uuid,
    pub levels: BTreeMap<MasteryType, u32>,
    pub rewards: BTreeMap<MasteryType, Vec<String>>,
}

impl From<&MasteryRecord> for MasteryLevels {
    fn from(record: &MasteryRecord) -> Self {
        let tracks = MasteryType::ALL.map(|kind| record.track(kind));
        Self {
            character_id: record.character_id,
            levels: tracks.iter().map(|t| (t.mastery_type, t.level)).collect(),
            rewards: tracks
                .iter()
                .map(|t| (t.mastery_type, t.rewards.clone()))
                .collect(),
        }
    }
}

/// Progress of one track through its current level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryProgress {
    pub character_id: Uuid,
    pub mastery_type: MasteryType,
    pub current_level: u32,
    /// Experience earned inside the current level
    pub current_experience: u64,
    pub experience_to_next_level: u64,
    /// 0.0..100.0
    pub progress_percent: f64,
    pub total_experience_earned: u64,
}

impl MasteryProgress {
    pub fn from_track(character_id: Uuid, track: &MasteryTrack) -> Self {
        let kind = track.mastery_type;
        let floor = kind.experience_for_level(track.level);
        let next = kind.experience_for_level(track.level.saturating_add(1));
        let span = next.saturating_sub(floor);
        let current = track.experience.saturating_sub(floor);
        Self {
            character_id,
            mastery_type: kind,
            current_level: track.level,
            current_experience: current,
            experience_to_next_level: next.saturating_sub(track.experience),
            progress_percent: if span == 0 {
                0.0
            } else {
                current as f64 / span as f64 * 100.0
            },
            total_experience_earned: track.experience,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryRewards {
    pub character_id: Uuid,
    pub mastery_type: MasteryType,
    pub rewards: Vec<String>,
}
