//! Memoised navigation answers keyed by grid endpoints.
//!
//! Keys are grid cells rather than world positions, so every agent standing
//! in the same cell and heading to the same cell shares one entry.

use bevy::prelude::*;
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};
use super::config::NavigationConfig;
use super::simplify::simplify_rdp;
use super::types::{AgentClass, CellRect, GridCell};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey {
    pub agent: AgentClass,
    pub start: GridCell,
    pub end: GridCell,
}

impl PathKey {
    pub fn new(agent: AgentClass, start: GridCell, end: GridCell) -> Self {
        Self { agent, start, end }
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    path: Vec<Vec3>,
    length: f32,
    usage: u32,
    last_access: Instant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PathCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub size: usize,
}

impl PathCacheStats {
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f32 / total as f32 }
    }
}

/// Capacity-bounded path cache with expiry and RDP simplification.
///
/// # Policy
///
/// - **Read:** an entry idle for `expiration` or longer is a miss and is
///   dropped. A hit bumps the usage counter and refreshes the timestamp.
/// - **Write:** at capacity, the entry with the lowest usage goes first,
///   oldest timestamp breaking ties. This is a recency/frequency hybrid, not
///   strict LRU.
/// - Paths of more than two points are simplified before storage.
/// - Every read returns a fresh copy of the stored points.
///
/// Not internally synchronised; the navigation service keeps it behind a
/// mutex.
#[derive(Clone, Debug)]
pub struct PathCache {
    entries: FxHashMap<PathKey, CacheEntry>,
    max_entries: usize,
    expiration: Duration,
    tolerance: f32,
    stats: PathCacheStats,
}

impl PathCache {
    pub fn new(max_entries: usize, expiration: Duration, tolerance: f32) -> Self {
        Self {
            entries: FxHashMap::default(),
            max_entries: max_entries.max(1),
            expiration,
            tolerance,
            stats: PathCacheStats::default(),
        }
    }

    pub fn from_config(config: &NavigationConfig) -> Self {
        Self::new(config.cache_max_entries, config.cache_expiration(), config.simplify_tolerance)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn stats(&self) -> PathCacheStats {
        PathCacheStats { size: self.entries.len(), ..self.stats }
    }

    #[inline]
    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_access) >= self.expiration
    }

    pub fn get(&mut self, start: GridCell, end: GridCell, agent: AgentClass) -> Option<(Vec<Vec3>, f32)> {
        self.get_at(start, end, agent, Instant::now())
    }

    pub fn get_at(&mut self, start: GridCell, end: GridCell, agent: AgentClass, now: Instant) -> Option<(Vec<Vec3>, f32)> {
        let key = PathKey::new(agent, start, end);
        let expired = match self.entries.get(&key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            self.entries.remove(&key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }

        let entry = self.entries.get_mut(&key)?;
        entry.usage = entry.usage.saturating_add(1);
        entry.last_access = now;
        self.stats.hits += 1;
        Some((entry.path.clone(), entry.length))
    }

    /// Store a path and return the copy that was stored (simplified when
    /// longer than two points).
    pub fn put(&mut self, start: GridCell, end: GridCell, agent: AgentClass, path: &[Vec3], length: f32) -> Vec<Vec3> {
        self.put_at(start, end, agent, path, length, Instant::now())
    }

    pub fn put_at(
        &mut self,
        start: GridCell,
        end: GridCell,
        agent: AgentClass,
        path: &[Vec3],
        length: f32,
        now: Instant,
    ) -> Vec<Vec3> {
        let key = PathKey::new(agent, start, end);
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.max_entries {
                if !self.evict_one() {
                    break;
                }
            }
        }

        let stored = if path.len() > 2 { simplify_rdp(path, self.tolerance) } else { path.to_vec() };
        self.entries.insert(
            key,
            CacheEntry { path: stored.clone(), length, usage: 0, last_access: now },
        );
        stored
    }

    /// Drop the least used entry, oldest first among equals.
    fn evict_one(&mut self) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by(|(ka, a), (kb, b)| {
                a.usage
                    .cmp(&b.usage)
                    .then(a.last_access.cmp(&b.last_access))
                    .then(ka.cmp(kb))
            })
            .map(|(k, _)| *k);
        match victim {
            Some(key) => {
                self.entries.remove(&key);
                self.stats.evictions += 1;
                true
            }
            None => false,
        }
    }

    /// Remove every entry, of any agent class, whose start or end lies in `area`.
    pub fn invalidate_area(&mut self, area: CellRect) -> usize {
        self.invalidate_where(|key| area.contains(key.start) || area.contains(key.end))
    }

    /// Like [`PathCache::invalidate_area`] but for one agent class only.
    pub fn invalidate_area_for(&mut self, agent: AgentClass, area: CellRect) -> usize {
        self.invalidate_where(|key| key.agent == agent && (area.contains(key.start) || area.contains(key.end)))
    }

    fn invalidate_where(&mut self, mut hit: impl FnMut(&PathKey) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !hit(key));
        let removed = before - self.entries.len();
        self.stats.invalidations += removed as u64;
        removed
    }

    pub fn invalidate_all(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.stats.invalidations += removed as u64;
        removed
    }

    /// Evict down to `target` entries.
    pub fn trim(&mut self, target: usize) -> usize {
        let mut removed = 0;
        while self.entries.len() > target && self.evict_one() {
            removed += 1;
        }
        removed
    }

    /// Remove every expired entry.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let expiration = self.expiration;
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.last_access) < expiration);
        let removed = before - self.entries.len();
        self.stats.expirations += removed as u64;
        removed
    }
}
