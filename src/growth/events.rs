//! Growth milestone notifications.
//!
//! Events are published after the state mutation is committed and are
//! at-most-once: a failed publish is logged and counted, never retried, and
//! never surfaced to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::growth::errors::GrowthError;
use crate::growth::storage::GrowthStore;
use crate::growth::types::{MasteryType, StatAllocation};
use crate::metrics;

pub const TOPIC_LEVEL_UP: &str = "character:level-up";
pub const TOPIC_SKILL_LEVELED: &str = "character:skill-leveled";
pub const TOPIC_ATTRIBUTE_INCREASED: &str = "character:attribute-increased";
pub const TOPIC_PARAGON_LEVEL_UP: &str = "character:paragon-level-up";
pub const TOPIC_PARAGON_POINTS_DISTRIBUTED: &str = "character:paragon-points-distributed";
pub const TOPIC_PRESTIGE_RESET: &str = "character:prestige-reset";
pub const TOPIC_MASTERY_LEVEL_UP: &str = "character:mastery-level-up";

/// A milestone worth telling other subsystems about.
#[derive(Debug, Clone, PartialEq)]
pub enum GrowthEvent {
    LevelUp {
        character_id: Uuid,
        previous_level: u32,
        new_level: u32,
        source: String,
    },
    SkillLeveled {
        character_id: Uuid,
        skill_id: String,
        previous_level: u32,
        level: u32,
        experience: u64,
        /// Experience granted by spending a skill point, 0 for plain grants
        bonus_experience: u64,
    },
    AttributeIncreased {
        character_id: Uuid,
        attribute: String,
        value: u32,
        attribute_points: u32,
    },
    ParagonLevelUp {
        character_id: Uuid,
        paragon_level: u32,
        points_available: u32,
    },
    ParagonPointsDistributed {
        character_id: Uuid,
        allocations: Vec<StatAllocation>,
        points_spent: u32,
        points_available: u32,
    },
    PrestigeReset {
        character_id: Uuid,
        /// Character level given up by the reset
        previous_level: u32,
        total_resets: u32,
        bonus_multiplier: f64,
    },
    MasteryLevelUp {
        character_id: Uuid,
        mastery_type: MasteryType,
        previous_level: u32,
        level: u32,
        unlocked_rewards: Vec<String>,
    },
}

impl GrowthEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            GrowthEvent::LevelUp { .. } => TOPIC_LEVEL_UP,
            GrowthEvent::SkillLeveled { .. } => TOPIC_SKILL_LEVELED,
            GrowthEvent::AttributeIncreased { .. } => TOPIC_ATTRIBUTE_INCREASED,
            GrowthEvent::ParagonLevelUp { .. } => TOPIC_PARAGON_LEVEL_UP,
            GrowthEvent::ParagonPointsDistributed { .. } => TOPIC_PARAGON_POINTS_DISTRIBUTED,
            GrowthEvent::PrestigeReset { .. } => TOPIC_PRESTIGE_RESET,
            GrowthEvent::MasteryLevelUp { .. } => TOPIC_MASTERY_LEVEL_UP,
        }
    }

    pub fn character_id(&self) -> Uuid {
        match self {
            GrowthEvent::LevelUp { character_id, .. }
            | GrowthEvent::SkillLeveled { character_id, .. }
            | GrowthEvent::AttributeIncreased { character_id, .. }
            | GrowthEvent::ParagonLevelUp { character_id, .. }
            | GrowthEvent::ParagonPointsDistributed { character_id, .. }
            | GrowthEvent::PrestigeReset { character_id, .. }
            | GrowthEvent::MasteryLevelUp { character_id, .. } => *character_id,
        }
    }

    /// Stamp the event with `timestamp` and flatten it to its wire form.
    pub fn into_envelope(self, timestamp: DateTime<Utc>) -> EventEnvelope {
        let topic = self.topic().to_string();
        let character_id = self.character_id();
        let payload = match self {
            GrowthEvent::LevelUp {
                previous_level,
                new_level,
                source,
                ..
            } => json!({
                "characterId": character_id,
                "previousLevel": previous_level,
                "newLevel": new_level,
                "source": source,
                "timestamp": timestamp,
            }),
            GrowthEvent::SkillLeveled {
                skill_id,
                previous_level,
                level,
                experience,
                bonus_experience,
                ..
            } => json!({
                "characterId": character_id,
                "skillId": skill_id,
                "previousLevel": previous_level,
                "level": level,
                "experience": experience,
                "bonusExperience": bonus_experience,
                "timestamp": timestamp,
            }),
            GrowthEvent::AttributeIncreased {
                attribute,
                value,
                attribute_points,
                ..
            } => json!({
                "characterId": character_id,
                "attribute": attribute,
                "value": value,
                "attributePoints": attribute_points,
                "timestamp": timestamp,
            }),
            GrowthEvent::ParagonLevelUp {
                paragon_level,
                points_available,
                ..
            } => json!({
                "characterId": character_id,
                "paragonLevel": paragon_level,
                "pointsAvailable": points_available,
                "timestamp": timestamp,
            }),
            GrowthEvent::ParagonPointsDistributed {
                allocations,
                points_spent,
                points_available,
                ..
            } => json!({
                "characterId": character_id,
                "allocations": allocations,
                "pointsSpent": points_spent,
                "pointsAvailable": points_available,
                "timestamp": timestamp,
            }),
            GrowthEvent::PrestigeReset {
                previous_level,
                total_resets,
                bonus_multiplier,
                ..
            } => json!({
                "characterId": character_id,
                "previousLevel": previous_level,
                "totalResets": total_resets,
                "bonusMultiplier": bonus_multiplier,
                "timestamp": timestamp,
            }),
            GrowthEvent::MasteryLevelUp {
                mastery_type,
                previous_level,
                level,
                unlocked_rewards,
                ..
            } => json!({
                "characterId": character_id,
                "masteryType": mastery_type,
                "previousLevel": previous_level,
                "level": level,
                "unlockedRewards": unlocked_rewards,
                "timestamp": timestamp,
            }),
        };
        EventEnvelope {
            topic,
            character_id,
            payload,
            timestamp,
        }
    }
}

/// Wire form of a published event: topic plus JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub topic: String,
    pub character_id: Uuid,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Destination for growth events.
pub trait EventSink: Send + Sync {
    fn publish(&self, envelope: &EventEnvelope) -> Result<(), GrowthError>;
}

/// Publish `event` and swallow any failure after logging it.
pub fn publish_best_effort(sink: &dyn EventSink, event: GrowthEvent) {
    let envelope = event.into_envelope(Utc::now());
    if let Err(e) = sink.publish(&envelope) {
        metrics::inc_publish_failed();
        warn!(
            "Failed to publish {} for character {}: {}",
            envelope.topic, envelope.character_id, e
        );
    }
}

/// Writes every event to the `events` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&self, envelope: &EventEnvelope) -> Result<(), GrowthError> {
        info!(target: "events", "{} {}", envelope.topic, envelope.payload);
        Ok(())
    }
}

/// Forwards events to an in-process subscriber.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: UnboundedSender<EventEnvelope>,
}

impl ChannelEventSink {
    pub fn new(tx: UnboundedSender<EventEnvelope>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, envelope: &EventEnvelope) -> Result<(), GrowthError> {
        self.tx
            .send(envelope.clone())
            .map_err(|_| GrowthError::Publish("event subscriber dropped".to_string()))
    }
}

/// Appends events to the store's journal tree.
#[derive(Clone)]
pub struct JournalEventSink {
    store: Arc<GrowthStore>,
}

impl JournalEventSink {
    pub fn new(store: Arc<GrowthStore>) -> Self {
        Self { store }
    }
}

impl EventSink for JournalEventSink {
    fn publish(&self, envelope: &EventEnvelope) -> Result<(), GrowthError> {
        self.store
            .append_event(envelope)
            .map_err(|e| GrowthError::Publish(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Refusing;

    impl EventSink for Refusing {
        fn publish(&self, _envelope: &EventEnvelope) -> Result<(), GrowthError> {
            Err(GrowthError::Publish("broker offline".into()))
        }
    }

    #[test]
    fn envelope_carries_topic_and_character() {
        let id = Uuid::new_v4();
        let envelope = GrowthEvent::LevelUp {
            character_id: id,
            previous_level: 1,
            new_level: 3,
            source: "quest".into(),
        }
        .into_envelope(Utc::now());
        assert_eq!(envelope.topic, TOPIC_LEVEL_UP);
        assert_eq!(envelope.character_id, id);
        assert_eq!(envelope.payload["newLevel"], 3);
        assert_eq!(envelope.payload["characterId"], id.to_string());
        assert!(envelope.payload.get("timestamp").is_some());
    }

    #[test]
    fn channel_sink_delivers_until_receiver_drops() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelEventSink::new(tx);
        let event = GrowthEvent::ParagonLevelUp {
            character_id: Uuid::new_v4(),
            paragon_level: 1,
            points_available: 5,
        };
        sink.publish(&event.clone().into_envelope(Utc::now()))
            .expect("delivered");
        let got = rx.try_recv().expect("queued");
        assert_eq!(got.topic, TOPIC_PARAGON_LEVEL_UP);

        drop(rx);
        let err = sink.publish(&event.into_envelope(Utc::now())).unwrap_err();
        assert!(matches!(err, GrowthError::Publish(_)));
    }

    #[test]
    fn best_effort_publish_swallows_failures() {
        let before = metrics::snapshot().publish_failed;
        publish_best_effort(
            &Refusing,
            GrowthEvent::AttributeIncreased {
                character_id: Uuid::new_v4(),
                attribute: "strength".into(),
                value: 3,
                attribute_points: 1,
            },
        );
        assert!(metrics::snapshot().publish_failed > before);
    }

    #[test]
    fn journal_sink_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GrowthStore::open(dir.path()).unwrap());
        let sink = JournalEventSink::new(store.clone());
        let id = Uuid::new_v4();
        for level in 2..=4 {
            let envelope = GrowthEvent::ParagonLevelUp {
                character_id: id,
                paragon_level: level,
                points_available: level * 5,
            }
            .into_envelope(Utc::now());
            sink.publish(&envelope).unwrap();
        }
        let recent = store.recent_events(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].payload["paragonLevel"], 4);
        assert_eq!(recent[1].payload["paragonLevel"], 3);
    }
}
