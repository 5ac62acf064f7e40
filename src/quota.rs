//! Per-user and per-group quota limits and usage accounting.
//!
//! Two table kinds, each kept once for users (keyed by uid) and once
//! for groups (keyed by gid): [`QuotaTable`] holds configured limits,
//! [`UsageTable`] holds running counts. The engine guards all four
//! with one reader/writer lock; usage counters are atomics bumped with
//! `fetch_add`, so counter updates are race-free under the read lock
//! and only structural inserts need the write lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Table key: a uid or gid widened to a signed integer.
pub type OwnerId = i64;

/// Configured limits for one user or group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaEntry {
    pub max_files: u64,
    pub max_dirs: u64,
    pub max_files_per_dir: u64,
    pub max_bytes: u64,
}

/// Running counts for one user or group.
#[derive(Debug, Default)]
pub struct UsageEntry {
    num_files: AtomicI64,
    num_dirs: AtomicI64,
    num_bytes: AtomicI64,
}

impl UsageEntry {
    pub fn new(num_files: i64, num_dirs: i64, num_bytes: i64) -> Self {
        Self {
            num_files: AtomicI64::new(num_files),
            num_dirs: AtomicI64::new(num_dirs),
            num_bytes: AtomicI64::new(num_bytes),
        }
    }

    pub fn num_files(&self) -> i64 {
        self.num_files.load(Ordering::Relaxed)
    }

    pub fn num_dirs(&self) -> i64 {
        self.num_dirs.load(Ordering::Relaxed)
    }

    pub fn num_bytes(&self) -> i64 {
        self.num_bytes.load(Ordering::Relaxed)
    }

    pub fn change_num_files(&self, delta: i64) {
        self.num_files.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn change_num_dirs(&self, delta: i64) {
        self.num_dirs.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn change_num_bytes(&self, delta: i64) {
        self.num_bytes.fetch_add(delta, Ordering::Relaxed);
    }
}

/// Ordered limit table for users or for groups.
#[derive(Debug, Default)]
pub struct QuotaTable {
    entries: BTreeMap<OwnerId, QuotaEntry>,
}

impl QuotaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or replaces) the quota for `id`.
    pub fn set(&mut self, id: OwnerId, entry: QuotaEntry) {
        self.entries.insert(id, entry);
    }

    /// Removes the quota for `id`, if any.
    pub fn clear(&mut self, id: OwnerId) {
        self.entries.remove(&id);
    }

    pub fn lookup(&self, id: OwnerId) -> Option<&QuotaEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered usage table for users or for groups.
#[derive(Debug, Default)]
pub struct UsageTable {
    entries: BTreeMap<OwnerId, UsageEntry>,
}

impl UsageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, id: OwnerId) -> Option<&UsageEntry> {
        self.entries.get(&id)
    }

    /// Inserts `entry` for `id`, replacing any previous record.
    pub fn put(&mut self, id: OwnerId, entry: UsageEntry) {
        self.entries.insert(id, entry);
    }

    /// Returns the record for `id`, creating a zeroed one if absent.
    pub fn ensure(&mut self, id: OwnerId) -> &UsageEntry {
        self.entries.entry(id).or_default()
    }
}

/// The four tables the engine keeps behind its quota lock.
#[derive(Debug, Default)]
pub struct QuotaState {
    pub user_quotas: QuotaTable,
    pub group_quotas: QuotaTable,
    pub user_usages: UsageTable,
    pub group_usages: UsageTable,
}

impl QuotaState {
    pub fn new(user_quotas: QuotaTable, group_quotas: QuotaTable) -> Self {
        Self {
            user_quotas,
            group_quotas,
            user_usages: UsageTable::new(),
            group_usages: UsageTable::new(),
        }
    }
}
