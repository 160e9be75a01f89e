//! Wiring for a running engine: one store, one cache, one sink and one lock
//! table shared by every service.

use std::sync::Arc;

use log::info;

use crate::config::{Config, EventSinkKind};
use crate::growth::cache::{GrowthCache, MemoryCache};
use crate::growth::errors::GrowthError;
use crate::growth::events::{EventSink, JournalEventSink, LogEventSink};
use crate::growth::locks::CharacterLocks;
use crate::growth::mastery::MasteryService;
use crate::growth::paragon::ParagonService;
use crate::growth::prestige::PrestigeService;
use crate::growth::progression::ProgressionService;
use crate::growth::storage::{GrowthStore, GrowthStoreBuilder};
use crate::growth::types::GrowthRules;

pub struct GrowthEngine {
    store: Arc<GrowthStore>,
    progression: ProgressionService,
    paragon: ParagonService,
    prestige: PrestigeService,
    mastery: MasteryService,
}

impl GrowthEngine {
    /// Open the store named by `config` and build every service over it.
    pub fn open(config: &Config) -> Result<Self, GrowthError> {
        let mut builder = GrowthStoreBuilder::new(&config.storage.data_dir);
        if let Some(bytes) = config.storage.cache_capacity_bytes {
            builder = builder.cache_capacity(bytes);
        }
        let store = Arc::new(builder.open()?);

        let cache = if config.cache.enabled {
            GrowthCache::new(Arc::new(MemoryCache::new())).with_ttl(config.cache.ttl())
        } else {
            GrowthCache::disabled()
        };
        let events: Arc<dyn EventSink> = match config.events.sink {
            EventSinkKind::Log => Arc::new(LogEventSink),
            EventSinkKind::Journal => Arc::new(JournalEventSink::new(store.clone())),
        };

        info!(
            "Growth engine opened at {} (cache {}, sink {:?})",
            config.storage.data_dir,
            if config.cache.enabled { "on" } else { "off" },
            config.events.sink
        );
        Ok(Self::from_parts(store, cache, events, config.rules))
    }

    /// Build the services from already constructed collaborators.
    pub fn from_parts(
        store: Arc<GrowthStore>,
        cache: GrowthCache,
        events: Arc<dyn EventSink>,
        rules: GrowthRules,
    ) -> Self {
        let locks = CharacterLocks::new();
        let progression = ProgressionService::new(
            store.clone(),
            store.clone(),
            cache.clone(),
            events.clone(),
        )
        .with_rules(rules)
        .with_locks(locks.clone());
        let paragon = ParagonService::new(store.clone(), cache.clone(), events.clone())
            .with_rules(rules)
            .with_locks(locks.clone());
        let prestige = PrestigeService::new(
            store.clone(),
            store.clone(),
            cache.clone(),
            events.clone(),
        )
        .with_rules(rules)
        .with_locks(locks.clone());
        let mastery = MasteryService::new(store.clone(), cache, events).with_locks(locks);
        Self {
            store,
            progression,
            paragon,
            prestige,
            mastery,
        }
    }

    pub fn progression(&self) -> &ProgressionService {
        &self.progression
    }

    pub fn paragon(&self) -> &ParagonService {
        &self.paragon
    }

    pub fn prestige(&self) -> &PrestigeService {
        &self.prestige
    }

    pub fn mastery(&self) -> &MasteryService {
        &self.mastery
    }

    pub fn store(&self) -> &Arc<GrowthStore> {
        &self.store
    }
}
