//! Prestige resets and mastery tracks on the shared store, cache and sink.
mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use uuid::Uuid;

use paragon_engine::growth::{
    experience_for_level, mastery_key, prestige_key, CacheClient, CharacterProgression,
    GrowthError, MasteryStore, MasteryType, PrestigeStore, ProgressionStore,
};

fn seed_level(h: &common::Harness, id: Uuid, level: u32) {
    let mut p = CharacterProgression::new(id);
    p.level = level;
    p.experience_to_next = experience_for_level(level + 1);
    p.skill_points = 4;
    h.store.create_progression(&p).unwrap();
}

#[test]
fn info_reports_eligibility_against_the_live_level() {
    let h = common::harness();
    let id = Uuid::new_v4();

    let info = h.engine.prestige().get_prestige_info(id).unwrap();
    assert_eq!(info.total_resets, 0);
    assert_eq!(info.bonus_multiplier, 1.0);
    assert_eq!(info.character_level, 1);
    assert_eq!(info.required_level, 50);
    assert!(!info.eligible);
    assert!(info.last_reset.is_none());
    assert!(h.store.get_prestige(id).unwrap().is_some());

    // The level is read live, not from the cached prestige snapshot.
    seed_level(&h, id, 50);
    assert!(h.engine.prestige().get_prestige_info(id).unwrap().eligible);
}

#[test]
fn repeated_resets_stack_the_multiplier_and_publish() {
    let h = common::harness();
    let id = Uuid::new_v4();
    seed_level(&h, id, 50);

    h.engine.prestige().reset_prestige(id).unwrap();
    assert_eq!(h.engine.progression().get_progression(id).unwrap().level, 1);

    // Climb back to 50 by hand and reset again.
    let mut p = h.store.get_progression(id).unwrap().unwrap();
    p.level = 55;
    h.store.update_progression(&p).unwrap();
    let info = h.engine.prestige().reset_prestige(id).unwrap();
    assert_eq!(info.total_resets, 2);
    assert!((info.bonus_multiplier - 1.2).abs() < 1e-9);

    let bonuses = h.engine.prestige().get_prestige_bonuses(id).unwrap().bonuses;
    assert_eq!(bonuses.len(), 2);
    assert!(bonuses.values().all(|m| (m - 1.2).abs() < 1e-9));

    let events = h.sink.events();
    assert_eq!(
        h.sink.topics(),
        vec!["character:prestige-reset", "character:prestige-reset"]
    );
    assert_eq!(events[1].payload["previousLevel"], 55);
    assert_eq!(events[1].payload["totalResets"], 2);

    // Unspent points survive a reset.
    assert_eq!(h.store.get_progression(id).unwrap().unwrap().skill_points, 4);
}

#[test]
fn reset_below_the_requirement_changes_nothing() {
    let h = common::harness();
    let id = Uuid::new_v4();
    seed_level(&h, id, 12);
    let before = h.engine.prestige().get_prestige_info(id).unwrap();

    let err = h.engine.prestige().reset_prestige(id).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(h.engine.prestige().get_prestige_info(id).unwrap(), before);
    assert_eq!(h.store.get_progression(id).unwrap().unwrap().level, 12);
    assert!(h.sink.events().is_empty());
}

#[test]
fn reset_evicts_the_prestige_snapshot() {
    let h = common::harness();
    let id = Uuid::new_v4();
    seed_level(&h, id, 60);
    h.engine.prestige().get_prestige_info(id).unwrap();
    assert!(h.cache.get(&prestige_key(id)).unwrap().is_some());

    h.engine.prestige().reset_prestige(id).unwrap();
    assert!(h.cache.get(&prestige_key(id)).unwrap().is_none());
    assert_eq!(
        h.engine.prestige().get_prestige_info(id).unwrap().total_resets,
        1
    );
}

#[test]
fn mastery_level_up_lists_the_unlocked_rewards() {
    let h = common::harness();
    let id = Uuid::new_v4();

    // Raid levels cost 8000 each: 80000 reaches level 10.
    let progress = h
        .engine
        .mastery()
        .add_mastery_experience(id, "raid", 80_000)
        .unwrap();
    assert_eq!(progress.current_level, 10);

    let events = h.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].topic, "character:mastery-level-up");
    assert_eq!(events[0].payload["masteryType"], "raid");
    assert_eq!(events[0].payload["previousLevel"], 1);
    assert_eq!(events[0].payload["level"], 10);
    assert_eq!(
        events[0].payload["unlockedRewards"],
        serde_json::json!(["raid_elite_bonus", "raid_legendary_bonus"])
    );

    // A grant that stays inside the level publishes nothing.
    h.engine
        .mastery()
        .add_mastery_experience(id, "raid", 100)
        .unwrap();
    assert_eq!(h.sink.events().len(), 1);

    let rewards = h.engine.mastery().get_mastery_rewards(id, "raid").unwrap();
    assert_eq!(rewards.mastery_type, MasteryType::Raid);
    assert_eq!(rewards.rewards.len(), 4);
}

#[test]
fn mastery_writes_evict_the_snapshot() {
    let h = common::harness();
    let id = Uuid::new_v4();
    h.engine.mastery().get_mastery_levels(id).unwrap();
    assert!(h.cache.get(&mastery_key(id)).unwrap().is_some());

    h.engine
        .mastery()
        .add_mastery_experience(id, "dungeon", 30_000)
        .unwrap();
    assert!(h.cache.get(&mastery_key(id)).unwrap().is_none());
    let levels = h.engine.mastery().get_mastery_levels(id).unwrap();
    assert_eq!(levels.levels[&MasteryType::Dungeon], 5);
}

#[test]
fn unknown_mastery_type_is_a_validation_error() {
    let h = common::harness();
    let id = Uuid::new_v4();
    let err = h
        .engine
        .mastery()
        .get_mastery_progress(id, "crafting")
        .unwrap_err();
    assert!(matches!(err, GrowthError::UnknownMasteryType(_)));
    assert!(h.store.get_mastery(id).unwrap().is_none());
}

#[test]
fn concurrent_mastery_grants_are_all_kept() {
    let h = Arc::new(common::harness());
    let id = Uuid::new_v4();
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let h = h.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                h.engine
                    .mastery()
                    .add_mastery_experience(id, "exploration", 1_000)
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    let progress = h
        .engine
        .mastery()
        .get_mastery_progress(id, "exploration")
        .unwrap();
    assert_eq!(progress.total_experience_earned, 8_000);
    assert_eq!(progress.current_level, 2);
}
