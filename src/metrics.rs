//! Process-local growth counters.
//! Read through [`snapshot`]; a future exporter can scrape the same values.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

static EXPERIENCE_GRANTED: AtomicU64 = AtomicU64::new(0);
static LEVEL_UPS: AtomicU64 = AtomicU64::new(0);
static SKILL_LEVEL_UPS: AtomicU64 = AtomicU64::new(0);
static ATTRIBUTE_ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static SKILL_POINTS_SPENT: AtomicU64 = AtomicU64::new(0);
static PARAGON_LEVEL_UPS: AtomicU64 = AtomicU64::new(0);
static PARAGON_POINTS_DISTRIBUTED: AtomicU64 = AtomicU64::new(0);
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static CACHE_MISSES: AtomicU64 = AtomicU64::new(0);
static CACHE_ERRORS: AtomicU64 = AtomicU64::new(0);
static PUBLISH_FAILED: AtomicU64 = AtomicU64::new(0);
static PRESTIGE_RESETS: AtomicU64 = AtomicU64::new(0);
static MASTERY_LEVEL_UPS: AtomicU64 = AtomicU64::new(0);

/// Distinct experience sources tracked before new ones fold into [`OTHER_SOURCE`].
pub const MAX_TRACKED_SOURCES: usize = 64;
/// Bucket for sources past the cap and for sources that normalize to nothing.
pub const OTHER_SOURCE: &str = "other";
const MAX_SOURCE_LEN: usize = 32;

static EXPERIENCE_BY_SOURCE: OnceLock<Mutex<HashMap<String, SourceCounter>>> = OnceLock::new();

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SourceCounter {
    pub grants: u64,
    pub experience: u64,
}

fn source_lock() -> &'static Mutex<HashMap<String, SourceCounter>> {
    EXPERIENCE_BY_SOURCE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Lowercased, trimmed label with anything outside `[a-z0-9_.-]` mapped to `_`.
fn normalize_source(source: &str) -> String {
    let label: String = source
        .trim()
        .chars()
        .take(MAX_SOURCE_LEN)
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if label.is_empty() {
        OTHER_SOURCE.to_string()
    } else {
        label
    }
}

/// Key under which `source` is counted, given what is already tracked.
fn source_bucket(tracked: &HashMap<String, SourceCounter>, source: &str) -> String {
    let label = normalize_source(source);
    if tracked.contains_key(&label) || tracked.len() < MAX_TRACKED_SOURCES {
        label
    } else {
        OTHER_SOURCE.to_string()
    }
}

/// Count one experience grant of `amount` from `source`.
///
/// Sources are normalized, and at most [`MAX_TRACKED_SOURCES`] distinct ones
/// are kept; the rest share the [`OTHER_SOURCE`] bucket.
pub fn record_experience_granted(source: &str, amount: u64) -> SourceCounter {
    EXPERIENCE_GRANTED.fetch_add(amount, Ordering::Relaxed);
    // A poisoned map only loses per-source detail; the total above is kept.
    let Ok(mut guard) = source_lock().lock() else {
        return SourceCounter::default();
    };
    let bucket = source_bucket(&guard, source);
    let counter = guard.entry(bucket).or_default();
    counter.grants = counter.grants.saturating_add(1);
    counter.experience = counter.experience.saturating_add(amount);
    *counter
}

pub fn experience_by_source() -> HashMap<String, SourceCounter> {
    source_lock()
        .lock()
        .map(|guard| guard.clone())
        .unwrap_or_default()
}

pub fn inc_level_ups(levels: u64) {
    LEVEL_UPS.fetch_add(levels, Ordering::Relaxed);
}
pub fn inc_skill_level_ups(levels: u64) {
    SKILL_LEVEL_UPS.fetch_add(levels, Ordering::Relaxed);
}
pub fn inc_attribute_allocations() {
    ATTRIBUTE_ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_skill_points_spent() {
    SKILL_POINTS_SPENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_paragon_level_ups() {
    PARAGON_LEVEL_UPS.fetch_add(1, Ordering::Relaxed);
}
pub fn add_paragon_points_distributed(points: u64) {
    PARAGON_POINTS_DISTRIBUTED.fetch_add(points, Ordering::Relaxed);
}
pub fn inc_cache_hit() {
    CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_cache_miss() {
    CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_cache_error() {
    CACHE_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_publish_failed() {
    PUBLISH_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_prestige_resets() {
    PRESTIGE_RESETS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_mastery_level_ups(levels: u64) {
    MASTERY_LEVEL_UPS.fetch_add(levels, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct Snapshot {
    pub experience_granted: u64,
    pub level_ups: u64,
    pub skill_level_ups: u64,
    pub attribute_allocations: u64,
    pub skill_points_spent: u64,
    pub paragon_level_ups: u64,
    pub paragon_points_distributed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,
    pub publish_failed: u64,
    pub prestige_resets: u64,
    pub mastery_level_ups: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        experience_granted: EXPERIENCE_GRANTED.load(Ordering::Relaxed),
        level_ups: LEVEL_UPS.load(Ordering::Relaxed),
        skill_level_ups: SKILL_LEVEL_UPS.load(Ordering::Relaxed),
        attribute_allocations: ATTRIBUTE_ALLOCATIONS.load(Ordering::Relaxed),
        skill_points_spent: SKILL_POINTS_SPENT.load(Ordering::Relaxed),
        paragon_level_ups: PARAGON_LEVEL_UPS.load(Ordering::Relaxed),
        paragon_points_distributed: PARAGON_POINTS_DISTRIBUTED.load(Ordering::Relaxed),
        cache_hits: CACHE_HITS.load(Ordering::Relaxed),
        cache_misses: CACHE_MISSES.load(Ordering::Relaxed),
        cache_errors: CACHE_ERRORS.load(Ordering::Relaxed),
        publish_failed: PUBLISH_FAILED.load(Ordering::Relaxed),
        prestige_resets: PRESTIGE_RESETS.load(Ordering::Relaxed),
        mastery_level_ups: MASTERY_LEVEL_UPS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experience_is_tracked_per_source() {
        // Unique source name: counters are process-global and tests run in parallel.
        let source = "metrics_test_dungeon";
        let first = record_experience_granted(source, 40);
        assert_eq!(first.grants, 1);
        assert_eq!(first.experience, 40);

        let second = record_experience_granted(source, 60);
        assert_eq!(second.grants, 2);
        assert_eq!(second.experience, 100);

        let by_source = experience_by_source();
        assert_eq!(by_source.get(source).map(|c| c.experience), Some(100));
        assert!(snapshot().experience_granted >= 100);
    }

    #[test]
    fn sources_are_normalized_before_counting() {
        record_experience_granted("  Metrics_Test Raid!  ", 5);
        let by_source = experience_by_source();
        assert!(by_source.contains_key("metrics_test_raid_"));
        assert!(!by_source.contains_key("  Metrics_Test Raid!  "));
        assert_eq!(normalize_source("   "), OTHER_SOURCE);
        assert_eq!(normalize_source(&"x".repeat(500)).len(), MAX_SOURCE_LEN);
    }

    #[test]
    fn sources_past_the_cap_fold_into_other() {
        let mut tracked = HashMap::new();
        for i in 0..MAX_TRACKED_SOURCES {
            tracked.insert(format!("source{}", i), SourceCounter::default());
        }
        assert_eq!(source_bucket(&tracked, "source7"), "source7");
        assert_eq!(source_bucket(&tracked, "SOURCE7"), "source7");
        assert_eq!(source_bucket(&tracked, "brand_new"), OTHER_SOURCE);

        tracked.remove("source0");
        assert_eq!(source_bucket(&tracked, "brand_new"), "brand_new");
    }

    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        inc_level_ups(3);
        inc_cache_miss();
        let after = snapshot();
        assert!(after.level_ups >= before.level_ups + 3);
        assert!(after.cache_misses > before.cache_misses);
    }
}
