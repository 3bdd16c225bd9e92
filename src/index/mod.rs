//! Bucketed interval index: sound-but-approximate candidate lookup over time.
//!
//! The index maps fixed-width time buckets to the set of item identifiers
//! whose window touches each bucket. A range query unions the member sets of
//! the buckets it covers, producing a candidate superset — zero false
//! negatives for indexed items, possible false positives. Callers confirm
//! exact overlap separately; the index never makes the final call.
//!
//! Memory is soft-bounded: once the live bucket count exceeds the configured
//! ceiling, a compression pass drops empty buckets and then evicts the oldest
//! ones. Eviction is best-effort and can hide old items — see
//! [`BucketIndex::compress`].

mod error;

pub use error::IndexError;

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::limits::*;
use crate::model::Ms;
use crate::observability;

/// Tuning knobs for [`BucketIndex`]. Validated at construction; a bad
/// configuration is the only error this module ever surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Width of one bucket in minutes.
    pub bucket_granularity_minutes: i64,
    /// Soft ceiling on the live bucket count.
    pub max_buckets: usize,
    /// When false the ceiling is advisory only and no bucket is ever dropped.
    pub enable_eviction: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            bucket_granularity_minutes: 15,
            max_buckets: 1000,
            enable_eviction: true,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.bucket_granularity_minutes <= 0 {
            return Err(IndexError::InvalidConfig("bucket granularity must be positive"));
        }
        if self.max_buckets == 0 {
            return Err(IndexError::InvalidConfig("max buckets must be positive"));
        }
        Ok(())
    }

    /// Read configuration from `GRIDLOCK_*` environment variables.
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bucket_granularity_minutes: std::env::var("GRIDLOCK_BUCKET_GRANULARITY_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.bucket_granularity_minutes),
            max_buckets: std::env::var("GRIDLOCK_MAX_BUCKETS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_buckets),
            enable_eviction: std::env::var("GRIDLOCK_ENABLE_EVICTION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.enable_eviction),
        }
    }
}

/// One fixed-width time slot and the identifiers whose windows touch it.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub start: Ms,
    pub end: Ms,
    members: HashSet<String>,
    /// Cached `members.len()`, recomputed by every mutation — never allowed
    /// to drift from the live set.
    cardinality: usize,
}

impl Bucket {
    fn new(start: Ms, end: Ms) -> Self {
        Self {
            start,
            end,
            members: HashSet::new(),
            cardinality: 0,
        }
    }

    fn add(&mut self, id: &str) {
        self.members.insert(id.to_string());
        self.cardinality = self.members.len();
    }

    fn remove(&mut self, id: &str) {
        self.members.remove(id);
        self.cardinality = self.members.len();
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }
}

/// Point-in-time snapshot of index health, for host dashboards and tests.
///
/// `total_memberships` counts bucket memberships, not distinct items — an
/// item spanning N buckets counts N times.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub bucket_count: usize,
    pub total_memberships: usize,
    pub mean_members_per_bucket: f64,
    pub accesses: u64,
    pub hits: u64,
    pub hit_rate: f64,
}

/// The bucketed interval index. Single-writer, synchronous, owned by the
/// host (or by a [`crate::resolver::ConflictResolver`]) — no process-wide
/// state. Wrap the whole structure in a lock before sharing across threads;
/// eviction and query must never interleave.
pub struct BucketIndex {
    granularity_ms: Ms,
    max_buckets: usize,
    enable_eviction: bool,
    /// Bucket key → bucket, ordered by key. A bucket exists iff an insert
    /// touched it and compression has not dropped it.
    buckets: BTreeMap<Ms, Bucket>,
    accesses: u64,
    hits: u64,
}

impl BucketIndex {
    pub fn new(config: IndexConfig) -> Result<Self, IndexError> {
        config.validate()?;
        Ok(Self {
            granularity_ms: config.bucket_granularity_minutes * 60_000,
            max_buckets: config.max_buckets,
            enable_eviction: config.enable_eviction,
            buckets: BTreeMap::new(),
            accesses: 0,
            hits: 0,
        })
    }

    /// Truncate a timestamp to its bucket key. Two timestamps share a key iff
    /// they fall in the same `[key, key + granularity)` window.
    pub fn bucket_key(&self, ts: Ms) -> Ms {
        ts.div_euclid(self.granularity_ms) * self.granularity_ms
    }

    pub fn granularity_ms(&self) -> Ms {
        self.granularity_ms
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket(&self, key: Ms) -> Option<&Bucket> {
        self.buckets.get(&key)
    }

    /// Add `id` to every bucket from `bucket_key(start)` through
    /// `bucket_key(end)` inclusive, creating buckets on demand. Set semantics
    /// make this idempotent.
    ///
    /// An absent endpoint means the item is not scheduled yet — silent no-op.
    /// Degenerate windows (`end <= start`) occupy no time and are skipped;
    /// windows outside the validity limits are discarded with a warning.
    pub fn insert(&mut self, id: &str, start: Option<Ms>, end: Option<Ms>) {
        let (Some(start), Some(end)) = (start, end) else {
            return;
        };
        if end <= start {
            return;
        }
        if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
            warn!(id, start, end, "discarding insert: timestamp outside validity window");
            return;
        }
        if end - start > MAX_SPAN_DURATION_MS {
            warn!(id, start, end, "discarding insert: window too wide to bucket");
            return;
        }

        let last = self.bucket_key(end);
        let mut key = self.bucket_key(start);
        while key <= last {
            let bucket = self
                .buckets
                .entry(key)
                .or_insert_with(|| Bucket::new(key, key + self.granularity_ms));
            bucket.add(id);
            key += self.granularity_ms;
        }

        if self.enable_eviction && self.buckets.len() > self.max_buckets {
            self.compress();
        }
    }

    /// Remove `id` from every live bucket. Unknown ids are a no-op. Buckets
    /// left empty stay live until the next compression pass.
    pub fn remove(&mut self, id: &str) {
        for bucket in self.buckets.values_mut() {
            bucket.remove(id);
        }
    }

    /// Union the member sets of every live bucket covering `[start, end)`,
    /// using the same key range as `insert`. The result is a candidate set:
    /// a superset of the truly overlapping items — callers must confirm
    /// exact overlap themselves.
    pub fn query_range(&mut self, start: Ms, end: Ms) -> HashSet<String> {
        self.accesses += 1;
        metrics::counter!(observability::INDEX_QUERIES_TOTAL).increment(1);

        let mut out = HashSet::new();
        if end <= start {
            return out;
        }
        let start = start.max(MIN_VALID_TIMESTAMP_MS);
        let end = end.min(MAX_VALID_TIMESTAMP_MS);
        if end <= start {
            return out;
        }

        let first = self.bucket_key(start);
        let last = self.bucket_key(end);
        let mut bucket_hits = 0u64;
        for bucket in self.buckets.range(first..=last).map(|(_, b)| b) {
            bucket_hits += 1;
            out.extend(bucket.members.iter().cloned());
        }
        self.hits += bucket_hits;
        metrics::counter!(observability::INDEX_BUCKET_HITS_TOTAL).increment(bucket_hits);
        out
    }

    /// Reclaim memory in two phases: drop every empty bucket, then — if the
    /// count still exceeds the ceiling — evict oldest (smallest-key) buckets
    /// until at or under it. The map's key order makes the eviction order
    /// implicit.
    ///
    /// Eviction is a deliberate tradeoff: an old, still-live window whose
    /// buckets get evicted stops surfacing as a candidate until the host
    /// re-indexes (`ConflictResolver::rebuild_from_snapshot`). Hosts are
    /// expected to re-index active data on every wholesale load rather than
    /// treat the index as complete. With eviction disabled this is a no-op.
    pub fn compress(&mut self) {
        if !self.enable_eviction {
            return;
        }
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.cardinality() > 0);
        let emptied = before - self.buckets.len();

        let mut evicted = 0usize;
        while self.buckets.len() > self.max_buckets {
            self.buckets.pop_first();
            evicted += 1;
        }

        if emptied > 0 || evicted > 0 {
            debug!(emptied, evicted, live = self.buckets.len(), "compressed bucket index");
            metrics::counter!(observability::INDEX_EVICTED_BUCKETS_TOTAL)
                .increment(evicted as u64);
            metrics::gauge!(observability::INDEX_LIVE_BUCKETS).set(self.buckets.len() as f64);
        }
    }

    /// Drop all buckets and reset both counters.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.accesses = 0;
        self.hits = 0;
        metrics::gauge!(observability::INDEX_LIVE_BUCKETS).set(0.0);
    }

    pub fn stats(&self) -> IndexStats {
        let bucket_count = self.buckets.len();
        let total_memberships: usize = self.buckets.values().map(|b| b.cardinality()).sum();
        let mean_members_per_bucket = if bucket_count == 0 {
            0.0
        } else {
            total_memberships as f64 / bucket_count as f64
        };
        let hit_rate = if self.accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.accesses as f64
        };
        IndexStats {
            bucket_count,
            total_memberships,
            mean_members_per_bucket,
            accesses: self.accesses,
            hits: self.hits,
            hit_rate,
        }
    }
}
