// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Expiring cache of resolved metadata values.
//!
//! All entries share one time-to-live. Expired entries are never returned; they are reclaimed
//! when a lookup observes them or when [`MetadataCache::purge_expired`] sweeps the map.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::field::MetadataField;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

#[derive(Debug)]
pub struct MetadataCache {
    ttl: Duration,
    entries: RwLock<HashMap<MetadataField, CacheEntry>>,
}

impl MetadataCache {
    /// A zero `ttl` is accepted: every entry is already expired when it is read back.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, field: MetadataField) -> Option<String> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(&field) {
                Some(entry) if !entry.is_expired(self.ttl, now) => {
                    return Some(entry.value.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have refreshed it between the two locks
        if entries
            .get(&field)
            .is_some_and(|entry| entry.is_expired(self.ttl, now))
        {
            entries.remove(&field);
        }
        None
    }

    pub fn set(&self, field: MetadataField, value: String) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(field, entry);
    }

    /// Removes every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.ttl, now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until they are reclaimed
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweeps expired entries every `ttl` until `cancel_token` fires. Nothing is spawned for a
    /// zero `ttl`, entries then never outlive the next lookup anyway.
    pub fn spawn_janitor(
        self: &Arc<Self>,
        cancel_token: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if self.ttl.is_zero() {
            return None;
        }
        let cache = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + cache.ttl, cache.ttl);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!("Purged {purged} expired metadata cache entries");
                        }
                    }
                    _ = cancel_token.cancelled() => {
                        debug!("Metadata cache janitor stopped");
                        break;
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(3_600);

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl() {
        let cache = MetadataCache::new(TTL);
        assert_eq!(cache.get(MetadataField::Region), None);

        cache.set(MetadataField::Region, "us-east-1".to_string());
        tokio::time::advance(TTL - Duration::from_secs(1)).await;

        assert_eq!(cache.get(MetadataField::Region).as_deref(), Some("us-east-1"));
        assert_eq!(cache.get(MetadataField::Region).as_deref(), Some("us-east-1"));
        assert_eq!(cache.get(MetadataField::AccountId), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_is_a_miss() {
        let cache = MetadataCache::new(TTL);
        cache.set(MetadataField::Region, "us-east-1".to_string());

        tokio::time::advance(TTL).await;

        assert_eq!(cache.get(MetadataField::Region), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_refreshes() {
        let cache = MetadataCache::new(TTL);
        cache.set(MetadataField::Region, "us-east-1".to_string());
        tokio::time::advance(TTL / 2).await;
        cache.set(MetadataField::Region, "eu-west-1".to_string());
        tokio::time::advance(TTL / 2).await;

        assert_eq!(cache.get(MetadataField::Region).as_deref(), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn test_zero_ttl_always_misses() {
        let cache = MetadataCache::new(Duration::ZERO);
        cache.set(MetadataField::Region, "us-east-1".to_string());
        assert_eq!(cache.get(MetadataField::Region), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = MetadataCache::new(TTL);
        cache.set(MetadataField::Region, "us-east-1".to_string());
        tokio::time::advance(TTL / 2).await;
        cache.set(MetadataField::AccountId, "123456789012".to_string());
        tokio::time::advance(TTL / 2).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(MetadataField::AccountId).as_deref(),
            Some("123456789012")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_sweeps_and_stops() {
        let cache = Arc::new(MetadataCache::new(TTL));
        let cancel_token = CancellationToken::new();
        let janitor = cache
            .spawn_janitor(cancel_token.clone())
            .expect("janitor should run with a non-zero ttl");

        cache.set(MetadataField::Region, "us-east-1".to_string());
        tokio::time::sleep(TTL + Duration::from_secs(1)).await;
        assert!(cache.is_empty());

        cancel_token.cancel();
        janitor.await.expect("janitor task failed");
    }

    #[tokio::test]
    async fn test_no_janitor_for_zero_ttl() {
        let cache = Arc::new(MetadataCache::new(Duration::ZERO));
        assert!(cache.spawn_janitor(CancellationToken::new()).is_none());
    }
}
