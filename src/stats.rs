use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics collected during one extraction pass
#[derive(Debug, Default)]
pub struct ExtractionStats {
    pub lines_read: AtomicU64,
    pub lines_skipped: AtomicU64,
    pub valid_items: AtomicU64,
    pub parse_failures: AtomicU64,
    pub items_sampled: AtomicU64,
    pub reservoir_replacements: AtomicU64,
    pub entities_created: AtomicU64,
    pub property_updates: AtomicU64,
    pub relationships_emitted: AtomicU64,
    pub relationships_dropped: AtomicU64,
}

/// Plain copy of [`ExtractionStats`] stored in the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub lines_skipped: u64,
    pub valid_items: u64,
    pub parse_failures: u64,
    pub items_sampled: u64,
    pub reservoir_replacements: u64,
    pub entities_created: u64,
    pub property_updates: u64,
    pub relationships_emitted: u64,
    pub relationships_dropped: u64,
}

impl ExtractionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_lines(&self, read: u64, skipped: u64) {
        self.lines_read.fetch_add(read, Ordering::Relaxed);
        self.lines_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn inc_valid(&self) {
        self.valid_items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_parse_failures(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sampled(&self) {
        self.items_sampled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_replacements(&self, count: u64) {
        self.reservoir_replacements
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_entities(&self) {
        self.entities_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_property_updates(&self) {
        self.property_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_relationships(&self, count: u64) {
        self.relationships_emitted
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_dropped(&self, count: u64) {
        self.relationships_dropped
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn lines(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.lines_skipped.load(Ordering::Relaxed)
    }

    pub fn valid(&self) -> u64 {
        self.valid_items.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.parse_failures.load(Ordering::Relaxed)
    }

    pub fn sampled(&self) -> u64 {
        self.items_sampled.load(Ordering::Relaxed)
    }

    pub fn replacements(&self) -> u64 {
        self.reservoir_replacements.load(Ordering::Relaxed)
    }

    pub fn entities(&self) -> u64 {
        self.entities_created.load(Ordering::Relaxed)
    }

    pub fn property_updates(&self) -> u64 {
        self.property_updates.load(Ordering::Relaxed)
    }

    pub fn relationships(&self) -> u64 {
        self.relationships_emitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.relationships_dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines(),
            lines_skipped: self.skipped(),
            valid_items: self.valid(),
            parse_failures: self.failures(),
            items_sampled: self.sampled(),
            reservoir_replacements: self.replacements(),
            entities_created: self.entities(),
            property_updates: self.property_updates(),
            relationships_emitted: self.relationships(),
            relationships_dropped: self.dropped(),
        }
    }
}
