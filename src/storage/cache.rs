//! RowCache - derived per-fragment ranking of rows by cardinality
//!
//! The cache is never the source of truth for row contents. It is rebuilt
//! from the fragment's rows on open and updated on every mutation.
//!
//! - **Ranked**: bounded top-K ordered by count descending, then row id
//!   ascending. Updates are O(log K).
//! - **Lru**: bounded set of the most recently updated rows.
//! - **None**: no tracking.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Default number of rows tracked per fragment
pub const DEFAULT_CACHE_SIZE: u32 = 50_000;

/// How a fragment tracks row cardinalities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    None,
    Lru,
    #[default]
    Ranked,
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::None => write!(f, "none"),
            CacheType::Lru => write!(f, "lru"),
            CacheType::Ranked => write!(f, "ranked"),
        }
    }
}

impl std::str::FromStr for CacheType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CacheType::None),
            "lru" => Ok(CacheType::Lru),
            "ranked" => Ok(CacheType::Ranked),
            other => Err(format!("unknown cache type: {}", other)),
        }
    }
}

/// A row id with its cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub id: u64,
    pub count: u64,
}

impl Pair {
    pub fn new(id: u64, count: u64) -> Self {
        Self { id, count }
    }
}

/// Sort pairs by count descending, then id ascending
pub fn sort_pairs(pairs: &mut [Pair]) {
    pairs.sort_by_key(|p| (Reverse(p.count), p.id));
}

/// Per-fragment row cardinality cache
#[derive(Debug)]
pub enum RowCache {
    None,
    Lru(LruCache),
    Ranked(RankedCache),
}

impl RowCache {
    pub fn new(cache_type: CacheType, size: u32) -> Self {
        match cache_type {
            CacheType::None => RowCache::None,
            CacheType::Lru => RowCache::Lru(LruCache::new(size as usize)),
            CacheType::Ranked => RowCache::Ranked(RankedCache::new(size as usize)),
        }
    }

    pub fn cache_type(&self) -> CacheType {
        match self {
            RowCache::None => CacheType::None,
            RowCache::Lru(_) => CacheType::Lru,
            RowCache::Ranked(_) => CacheType::Ranked,
        }
    }

    /// Record the latest cardinality for a row
    pub fn update(&mut self, id: u64, count: u64) {
        match self {
            RowCache::None => {}
            RowCache::Lru(cache) => cache.update(id, count),
            RowCache::Ranked(cache) => cache.update(id, count),
        }
    }

    /// Last known cardinality of a row, if tracked
    pub fn get(&self, id: u64) -> Option<u64> {
        match self {
            RowCache::None => None,
            RowCache::Lru(cache) => cache.get(id),
            RowCache::Ranked(cache) => cache.get(id),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowCache::None => 0,
            RowCache::Lru(cache) => cache.len(),
            RowCache::Ranked(cache) => cache.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked rows ranked by count descending, then id ascending
    pub fn top(&self) -> Vec<Pair> {
        match self {
            RowCache::None => Vec::new(),
            RowCache::Lru(cache) => cache.top(),
            RowCache::Ranked(cache) => cache.top(),
        }
    }

    pub fn clear(&mut self) {
        match self {
            RowCache::None => {}
            RowCache::Lru(cache) => cache.clear(),
            RowCache::Ranked(cache) => cache.clear(),
        }
    }
}

/// Bounded top-K cache ordered by cardinality
#[derive(Debug)]
pub struct RankedCache {
    max_entries: usize,
    counts: HashMap<u64, u64>,
    rankings: BTreeSet<(Reverse<u64>, u64)>,
}

impl RankedCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            counts: HashMap::new(),
            rankings: BTreeSet::new(),
        }
    }

    pub fn update(&mut self, id: u64, count: u64) {
        if let Some(old) = self.counts.get(&id).copied() {
            self.rankings.remove(&(Reverse(old), id));
            self.rankings.insert((Reverse(count), id));
            self.counts.insert(id, count);
            return;
        }

        if self.max_entries == 0 {
            return;
        }

        let key = (Reverse(count), id);
        if self.counts.len() >= self.max_entries {
            // Full: only displace the lowest ranked entry
            match self.rankings.last().copied() {
                Some(lowest) if key < lowest => {
                    self.rankings.remove(&lowest);
                    self.counts.remove(&lowest.1);
                }
                _ => return,
            }
        }

        self.rankings.insert(key);
        self.counts.insert(id, count);
    }

    pub fn get(&self, id: u64) -> Option<u64> {
        self.counts.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn top(&self) -> Vec<Pair> {
        self.rankings
            .iter()
            .map(|(Reverse(count), id)| Pair::new(*id, *count))
            .collect()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.rankings.clear();
    }
}

/// Bounded cache of the most recently updated rows
#[derive(Debug)]
pub struct LruCache {
    capacity: usize,
    /// id -> (count, last touch)
    entries: HashMap<u64, (u64, u64)>,
    /// last touch -> id, oldest first
    recency: BTreeMap<u64, u64>,
    tick: u64,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
        }
    }

    pub fn update(&mut self, id: u64, count: u64) {
        if self.capacity == 0 {
            return;
        }

        self.tick += 1;
        if let Some((_, touched)) = self.entries.insert(id, (count, self.tick)) {
            self.recency.remove(&touched);
        }
        self.recency.insert(self.tick, id);

        while self.entries.len() > self.capacity {
            self.evict();
        }
    }

    fn evict(&mut self) {
        if let Some((_, id)) = self.recency.pop_first() {
            self.entries.remove(&id);
        }
    }

    pub fn get(&self, id: u64) -> Option<u64> {
        self.entries.get(&id).map(|(count, _)| *count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top(&self) -> Vec<Pair> {
        let mut pairs: Vec<Pair> = self
            .entries
            .iter()
            .map(|(id, (count, _))| Pair::new(*id, *count))
            .collect();
        sort_pairs(&mut pairs);
        pairs
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_type_parse_and_display() {
        assert_eq!("ranked".parse::<CacheType>().unwrap(), CacheType::Ranked);
        assert_eq!("LRU".parse::<CacheType>().unwrap(), CacheType::Lru);
        assert_eq!("none".parse::<CacheType>().unwrap(), CacheType::None);
        assert!("bogus".parse::<CacheType>().is_err());
        assert_eq!(CacheType::Lru.to_string(), "lru");
        assert_eq!(CacheType::default(), CacheType::Ranked);
    }

    #[test]
    fn test_ranked_ordering_breaks_ties_by_id() {
        let mut cache = RowCache::new(CacheType::Ranked, 10);
        cache.update(7, 3);
        cache.update(2, 5);
        cache.update(4, 3);
        cache.update(1, 1);

        assert_eq!(
            cache.top(),
            vec![
                Pair::new(2, 5),
                Pair::new(4, 3),
                Pair::new(7, 3),
                Pair::new(1, 1)
            ]
        );
    }

    #[test]
    fn test_ranked_is_bounded() {
        let mut cache = RankedCache::new(3);
        for id in 0..10u64 {
            cache.update(id, id * 10);
        }

        assert_eq!(cache.len(), 3);
        let ids: Vec<u64> = cache.top().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![9, 8, 7]);

        // A low count cannot displace anything
        cache.update(100, 1);
        assert_eq!(cache.get(100), None);

        // A tracked row keeps its slot even when it drops
        cache.update(9, 0);
        assert_eq!(cache.get(9), Some(0));
        assert_eq!(cache.top().last().copied(), Some(Pair::new(9, 0)));
    }

    #[test]
    fn test_ranked_keeps_zero_counts() {
        let mut cache = RowCache::new(CacheType::Ranked, 5);
        cache.update(3, 1);
        cache.update(3, 0);
        assert_eq!(cache.get(3), Some(0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_evicts_oldest() {
        let mut cache = RowCache::new(CacheType::Lru, 2);
        cache.update(1, 10);
        cache.update(2, 20);
        cache.update(1, 11);
        cache.update(3, 30);

        assert_eq!(cache.get(2), None);
        assert_eq!(cache.get(1), Some(11));
        assert_eq!(cache.top(), vec![Pair::new(3, 30), Pair::new(1, 11)]);
    }

    #[test]
    fn test_none_tracks_nothing() {
        let mut cache = RowCache::new(CacheType::None, 100);
        cache.update(1, 1);
        assert!(cache.is_empty());
        assert!(cache.top().is_empty());
        assert_eq!(cache.cache_type(), CacheType::None);
    }

    #[test]
    fn test_clear() {
        let mut cache = RowCache::new(CacheType::Ranked, 5);
        cache.update(1, 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
