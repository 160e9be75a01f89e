//! Post-cap paragon progression: paragon experience, paragon levels, and
//! capped per-stat point distribution.

use std::sync::Arc;

use log::info;
use uuid::Uuid;

use crate::growth::cache::{paragon_key, GrowthCache};
use crate::growth::curve::paragon_experience_for_level;
use crate::growth::errors::GrowthError;
use crate::growth::events::{publish_best_effort, EventSink, GrowthEvent};
use crate::growth::locks::CharacterLocks;
use crate::growth::storage::ParagonStore;
use crate::growth::types::{
    GrowthRules, ParagonAllocation, ParagonLevels, ParagonStats, StatAllocation,
};
use crate::metrics;
use crate::validation::{normalize_name, NameKind};

pub struct ParagonService {
    store: Arc<dyn ParagonStore>,
    cache: GrowthCache,
    events: Arc<dyn EventSink>,
    locks: CharacterLocks,
    rules: GrowthRules,
}

impl ParagonService {
    pub fn new(store: Arc<dyn ParagonStore>, cache: GrowthCache, events: Arc<dyn EventSink>) -> Self {
        Self {
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

    pub fn with_locks(mut self, locks: CharacterLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Cached paragon record for `character_id`, created on first access.
    ///
    /// Misses are filled under the character's paragon lock.
    pub fn get_paragon_levels(&self, character_id: Uuid) -> Result<ParagonLevels, GrowthError> {
        let key = paragon_key(character_id);
        self.locks.with_lock(&key, || {
            self.cache
                .get_or_load(&key, || self.load_or_create(character_id))
        })
    }

    fn load_or_create(&self, character_id: Uuid) -> Result<ParagonLevels, GrowthError> {
        if let Some(existing) = self.store.get_paragon(character_id)? {
            return Ok(existing);
        }
        let fresh = ParagonLevels::new(character_id);
        match self.store.create_paragon(&fresh) {
            Ok(()) => {
                info!("Created paragon record for character {}", character_id);
                Ok(fresh)
            }
            Err(GrowthError::AlreadyExists(_)) => self
                .store
                .get_paragon(character_id)?
                .ok_or_else(|| GrowthError::NotFound(format!("paragon: {}", character_id))),
            Err(e) => Err(e),
        }
    }

    fn save(&self, record: &ParagonLevels) -> Result<(), GrowthError> {
        self.store.update_paragon(record)?;
        self.cache.invalidate(&paragon_key(record.character_id));
        Ok(())
    }

    /// Spend available paragon points across stats.
    ///
    /// The whole request is validated before anything is written: any entry
    /// with zero points, a total above the available balance, or a stat that
    /// would pass the per-stat cap rejects the entire batch. Entries naming the
    /// same stat are summed.
    pub fn distribute_paragon_points(
        &self,
        character_id: Uuid,
        allocations: &[StatAllocation],
    ) -> Result<ParagonLevels, GrowthError> {
        let requested = merge_requests(allocations)?;
        let total = requested.iter().try_fold(0u32, |sum, a| {
            sum.checked_add(a.points)
                .ok_or_else(|| GrowthError::InvalidAllocation("requested points overflow".into()))
        })?;

        let key = paragon_key(character_id);
        let updated = self.locks.with_lock(&key, || {
            let mut record = self.load_or_create(character_id)?;
            if total > record.paragon_points_available {
                return Err(GrowthError::InsufficientPoints {
                    kind: "paragon",
                    required: total,
                    available: record.paragon_points_available,
                });
            }
            for request in &requested {
                let current = record.points_for(&request.stat_type);
                if current.saturating_add(request.points) > self.rules.paragon_stat_cap {
                    return Err(GrowthError::StatCapExceeded {
                        stat: request.stat_type.clone(),
                        current,
                        requested: request.points,
                        cap: self.rules.paragon_stat_cap,
                    });
                }
            }

            for request in &requested {
                match record
                    .allocations
                    .iter_mut()
                    .find(|a| a.stat_type == request.stat_type)
                {
                    Some(entry) => entry.points_allocated += request.points,
                    None => record.allocations.push(ParagonAllocation {
                        stat_type: request.stat_type.clone(),
                        points_allocated: request.points,
                    }),
                }
            }
            record.allocations.retain(|a| a.points_allocated > 0);
            record.paragon_points_spent += total;
            record.paragon_points_available -= total;
            record.touch();
            self.save(&record)?;
            Ok(record)
        })?;

        metrics::add_paragon_points_distributed(u64::from(total));
        info!(
            "Distributed {} paragon points for character {}",
            total, character_id
        );
        publish_best_effort(
            self.events.as_ref(),
            GrowthEvent::ParagonPointsDistributed {
                character_id,
                allocations: requested,
                points_spent: total,
                points_available: updated.paragon_points_available,
            },
        );
        Ok(updated)
    }

    /// Grant paragon experience, rolling over as many paragon levels as it covers.
    ///
    /// Grants above [`GrowthRules::max_paragon_experience_per_grant`] are
    /// rejected with [`GrowthError::InvalidAllocation`] before anything is read.
    /// Publishes one paragon-level-up event per level gained.
    pub fn add_paragon_experience(&self, character_id: Uuid, amount: u64) -> Result<(), GrowthError> {
        let limit = self.rules.max_paragon_experience_per_grant;
        if amount > limit {
            return Err(GrowthError::InvalidAllocation(format!(
                "paragon experience grant {} exceeds the per-grant limit {}",
                amount, limit
            )));
        }

        let key = paragon_key(character_id);
        let grant = self.rules.paragon_points_per_level;
        let (previous_level, new_level, starting_available) = self.locks.with_lock(&key, || {
            let mut record = self.load_or_create(character_id)?;
            let previous_level = record.paragon_level;
            let starting_available = record.paragon_points_available;
            record.experience_required = paragon_experience_for_level(record.paragon_level + 1);
            record.experience_current = record.experience_current.saturating_add(amount);

            while record.experience_current >= record.experience_required {
                record.experience_current -= record.experience_required;
                record.paragon_level += 1;
                record.paragon_points_total = record.paragon_points_total.saturating_add(grant);
                record.paragon_points_available =
                    record.paragon_points_available.saturating_add(grant);
                record.experience_required =
                    paragon_experience_for_level(record.paragon_level + 1);
            }
            record.touch();
            self.save(&record)?;
            Ok((previous_level, record.paragon_level, starting_available))
        })?;

        // Per-level balances are recomputed from the starting balance.
        for paragon_level in previous_level + 1..=new_level {
            let levels_gained = paragon_level - previous_level;
            let points_available =
                starting_available.saturating_add(grant.saturating_mul(levels_gained));
            metrics::inc_paragon_level_ups();
            info!(
                "Character {} reached paragon level {}",
                character_id, paragon_level
            );
            publish_best_effort(
                self.events.as_ref(),
                GrowthEvent::ParagonLevelUp {
                    character_id,
                    paragon_level,
                    points_available,
                },
            );
        }
        Ok(())
    }

    /// Totals, per-stat points and global standing for an existing paragon record.
    pub fn get_paragon_stats(&self, character_id: Uuid) -> Result<ParagonStats, GrowthError> {
        let record = self
            .store
            .get_paragon(character_id)?
            .ok_or_else(|| GrowthError::NotFound(format!("paragon: {}", character_id)))?;
        let standings = self
            .store
            .paragon_standings(record.paragon_level, record.paragon_points_total)?;

        // The record itself is counted, so total >= 1.
        let total_players = standings.total.max(1);
        let global_rank = standings.ahead + 1;
        let percentile =
            total_players.saturating_sub(global_rank) as f64 / total_players as f64 * 100.0;

        Ok(ParagonStats {
            character_id,
            paragon_level: record.paragon_level,
            total_points_earned: record.paragon_points_total,
            total_points_spent: record.paragon_points_spent,
            points_available: record.paragon_points_available,
            points_by_stat: record.points_by_stat(),
            global_rank,
            percentile,
            total_characters_with_paragon: standings.total,
            average_paragon_level: standings.level_sum as f64 / total_players as f64,
            highest_paragon_level: standings.highest_level,
        })
    }
}

/// Validate and normalize a distribution request, summing repeated stats.
fn merge_requests(allocations: &[StatAllocation]) -> Result<Vec<StatAllocation>, GrowthError> {
    if allocations.is_empty() {
        return Err(GrowthError::InvalidAllocation(
            "at least one allocation is required".into(),
        ));
    }
    let mut merged: Vec<StatAllocation> = Vec::with_capacity(allocations.len());
    for allocation in allocations {
        if allocation.points < 1 {
            return Err(GrowthError::InvalidAllocation(format!(
                "{}: points must be at least 1",
                allocation.stat_type
            )));
        }
        let stat = normalize_name(&allocation.stat_type, NameKind::Stat)?;
        match merged.iter_mut().find(|m| m.stat_type == stat) {
            Some(existing) => {
                existing.points = existing.points.checked_add(allocation.points).ok_or_else(
                    || GrowthError::InvalidAllocation(format!("{}: points overflow", stat)),
                )?;
            }
            None => merged.push(StatAllocation::new(stat, allocation.points)),
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_repeated_stats_case_insensitively() {
        let merged = merge_requests(&[
            StatAllocation::new("Strength", 3),
            StatAllocation::new("agility", 1),
            StatAllocation::new("strength ", 2),
        ])
        .unwrap();
        assert_eq!(
            merged,
            vec![
                StatAllocation::new("strength", 5),
                StatAllocation::new("agility", 1)
            ]
        );
    }

    #[test]
    fn merge_rejects_zero_points_and_empty_requests() {
        let err = merge_requests(&[StatAllocation::new("luck", 0)]).unwrap_err();
        assert!(matches!(err, GrowthError::InvalidAllocation(_)));
        let err = merge_requests(&[]).unwrap_err();
        assert!(matches!(err, GrowthError::InvalidAllocation(_)));
    }

    #[test]
    fn merge_rejects_bad_stat_names() {
        let err = merge_requests(&[StatAllocation::new("", 1)]).unwrap_err();
        assert!(matches!(err, GrowthError::InvalidName(_)));
    }
}
