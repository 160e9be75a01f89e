//! Experience curves for character levels, skill levels, paragon levels and
//! mastery tracks.
//!
//! All functions are pure. Levels below 1 are not meaningful inputs; they are
//! clamped rather than rejected.

/// Experience needed to reach `level` from the level below it:
/// `floor(100 * (level - 1)^1.5)`.
///
/// Call with `level + 1` for the threshold that ends the current level.
pub fn experience_for_level(level: u32) -> u64 {
    let steps = level.saturating_sub(1) as f64;
    (100.0 * steps.powf(1.5)).floor() as u64
}

/// Cumulative skill experience at which a skill at `level` advances:
/// `floor(50 * level^1.3)`.
pub fn skill_experience_for_level(level: u32) -> u64 {
    (50.0 * (level.max(1) as f64).powf(1.3)).floor() as u64
}

/// Skill level reached with `experience` cumulative skill experience.
///
/// Starts at level 1 and climbs while the experience covers the current
/// level's threshold, so a skill needs `skill_experience_for_level(L)` to
/// leave level `L`.
pub fn skill_level_for_experience(experience: u64) -> u32 {
    // Start from the inverse curve, then settle on the exact integer thresholds.
    let estimate = (experience as f64 / 50.0).powf(1.0 / 1.3).floor();
    let mut level = (estimate as u32).max(1);
    while level > 1 && experience < skill_experience_for_level(level - 1) {
        level -= 1;
    }
    while level < u32::MAX && experience >= skill_experience_for_level(level) {
        level += 1;
    }
    level
}

/// Paragon experience needed to complete paragon `level`: `floor(1000 * level^1.2)`.
pub fn paragon_experience_for_level(level: u32) -> u64 {
    (1000.0 * (level.max(1) as f64).powf(1.2)).floor() as u64
}

/// Cumulative mastery experience at which a track with `base` experience per
/// level reaches `level`: `base * level`. Level 1 needs nothing.
pub fn mastery_experience_for_level(base: u64, level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    base.saturating_mul(u64::from(level))
}

/// Mastery level held with `experience` cumulative experience on a track
/// with `base` experience per level. Never below 1.
pub fn mastery_level_for_experience(base: u64, experience: u64) -> u32 {
    let level = experience / base.max(1);
    u32::try_from(level).unwrap_or(u32::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_curve_matches_known_points() {
        assert_eq!(experience_for_level(1), 0);
        assert_eq!(experience_for_level(2), 100);
        assert_eq!(experience_for_level(3), 282);
        assert_eq!(experience_for_level(4), 519);
    }

    #[test]
    fn character_thresholds_are_positive_past_level_one() {
        for level in 2..200 {
            assert!(experience_for_level(level) > 0);
            assert!(experience_for_level(level + 1) > experience_for_level(level));
        }
    }

    #[test]
    fn skill_levels_follow_cumulative_thresholds() {
        assert_eq!(skill_experience_for_level(1), 50);
        assert_eq!(skill_experience_for_level(2), 123);
        assert_eq!(skill_level_for_experience(0), 1);
        assert_eq!(skill_level_for_experience(49), 1);
        assert_eq!(skill_level_for_experience(50), 2);
        assert_eq!(skill_level_for_experience(122), 2);
        assert_eq!(skill_level_for_experience(123), 3);
    }

    #[test]
    fn skill_level_keeps_growing_for_large_experience() {
        let level = skill_level_for_experience(10_000_000);
        assert!(level > 1_000);
        assert!(skill_experience_for_level(level - 1) <= 10_000_000);
        assert!(skill_experience_for_level(level) > 10_000_000);
        assert_eq!(skill_level_for_experience(u64::MAX), u32::MAX);
    }

    #[test]
    fn paragon_curve_matches_known_points() {
        assert_eq!(paragon_experience_for_level(1), 1000);
        assert_eq!(paragon_experience_for_level(2), 2297);
    }

    #[test]
    fn mastery_levels_are_linear_in_experience() {
        assert_eq!(mastery_experience_for_level(8000, 1), 0);
        assert_eq!(mastery_experience_for_level(8000, 2), 16_000);
        assert_eq!(mastery_level_for_experience(8000, 0), 1);
        assert_eq!(mastery_level_for_experience(8000, 15_999), 1);
        assert_eq!(mastery_level_for_experience(8000, 16_000), 2);
        assert_eq!(mastery_level_for_experience(4000, 100_000), 25);
        assert_eq!(mastery_level_for_experience(4000, u64::MAX), u32::MAX);
    }
}
