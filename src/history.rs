use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::{MAX_ITEMS_CEIL, MAX_ITEMS_FLOOR};
use crate::errors::{ClipError, Result};
use crate::item::{ClipKind, ClipboardItem};
use crate::search::SearchCriteria;
use crate::store::SnapshotStore;

/// Derived, read-only statistics. Recomputed after every mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub copied_last_week: usize,
    pub most_copied_kind: Option<(ClipKind, u32)>,
    pub oldest_item_age_days: Option<i64>,
}

/// Outcome of an insert: which item the candidate landed on, whether it was
/// merged into an existing entry, and whether the item should be handed to
/// the metadata enricher.
#[derive(Debug, Clone, Copy)]
pub struct InsertOutcome {
    pub id: Uuid,
    pub merged: bool,
    pub needs_enrichment: bool,
}

/// The single writer over the item collection. Every mutating operation
/// re-sorts into the canonical order, recomputes stats, and persists via the
/// snapshot store before returning; persistence failures are logged and
/// swallowed, the in-memory state stays authoritative.
pub struct HistoryManager {
    items: Vec<ClipboardItem>,
    stats: Stats,
    store: SnapshotStore<ClipboardItem>,
    snapshot_digest: Option<String>,
    max_items: u32,
    retention_days: u32,
}

impl HistoryManager {
    pub fn open(store: SnapshotStore<ClipboardItem>, max_items: u32, retention_days: u32) -> Self {
        let mut manager = Self {
            items: store.load(),
            stats: Stats::default(),
            store,
            snapshot_digest: None,
            max_items: max_items.clamp(MAX_ITEMS_FLOOR, MAX_ITEMS_CEIL),
            retention_days,
        };
        manager.repair_pinned_orders();
        manager.trim_expired();
        manager.trim_to_limit();
        manager.commit();
        manager
    }

    /// Pick up writes made by another process. When the on-disk snapshot
    /// no longer matches what this manager last wrote, the collection is
    /// reloaded from disk so the next mutation builds on the external
    /// state instead of clobbering it. Returns whether a reload happened.
    pub fn reload_if_changed(&mut self) -> bool {
        let digest = self.store.digest();
        if digest == self.snapshot_digest {
            return false;
        }
        self.items = self.store.load();
        self.snapshot_digest = digest;
        self.repair_pinned_orders();
        self.canonical_sort();
        self.recompute_stats();
        true
    }

    pub fn items(&self) -> &[ClipboardItem] {
        &self.items
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&ClipboardItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// URL items still missing a title, for re-enqueueing enrichment after
    /// a load.
    pub fn unenriched_urls(&self) -> Vec<(Uuid, String)> {
        self.items
            .iter()
            .filter(|item| item.needs_enrichment())
            .map(|item| (item.id, item.display_text.clone()))
            .collect()
    }

    pub fn set_limits(&mut self, max_items: u32, retention_days: u32) {
        self.max_items = max_items.clamp(MAX_ITEMS_FLOOR, MAX_ITEMS_CEIL);
        self.retention_days = retention_days;
        self.trim_expired();
        self.trim_to_limit();
        self.commit();
    }

    /// Merge the candidate into the collection. A dedupe-key match only
    /// refreshes `copied_at` and moves the entry to the most-recent
    /// position; content fields are never overwritten by a re-copy.
    pub fn insert_or_refresh(&mut self, candidate: ClipboardItem) -> InsertOutcome {
        let key = candidate.dedupe_key();
        let outcome = match self.items.iter().position(|item| item.dedupe_key() == key) {
            Some(index) => {
                let mut existing = self.items.remove(index);
                existing.copied_at = Utc::now();
                let outcome = InsertOutcome {
                    id: existing.id,
                    merged: true,
                    needs_enrichment: existing.needs_enrichment(),
                };
                self.items.insert(0, existing);
                outcome
            }
            None => {
                let outcome = InsertOutcome {
                    id: candidate.id,
                    merged: false,
                    needs_enrichment: candidate.needs_enrichment(),
                };
                self.items.insert(0, candidate);
                outcome
            }
        };
        self.trim_to_limit();
        self.commit();
        outcome
    }

    pub fn enforce_limit(&mut self) {
        self.trim_to_limit();
        self.commit();
    }

    /// Permanently drop unpinned items older than the retention window.
    /// Pinned items are exempt unconditionally; 0 disables the policy.
    pub fn apply_retention_policy(&mut self) {
        if self.trim_expired() > 0 {
            self.commit();
        }
    }

    /// Flip the pin. Pinning appends to the end of the manual pin order;
    /// unpinning clears the slot. Returns the new pin state.
    pub fn toggle_pin(&mut self, id: Uuid) -> Result<bool> {
        let next_order = self
            .items
            .iter()
            .filter_map(|item| item.pinned_order)
            .max()
            .map(|order| order + 1)
            .unwrap_or(0);

        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| ClipError::NotFound(format!("item {}", id)))?;

        if item.is_pinned {
            item.is_pinned = false;
            item.pinned_order = None;
        } else {
            item.is_pinned = true;
            item.pinned_order = Some(next_order);
        }
        let pinned = item.is_pinned;
        self.commit();
        Ok(pinned)
    }

    /// Renumber `pinned_order` to the 0-based positions implied by the
    /// given sequence. Ids that are unknown or not pinned are skipped and
    /// do not consume a position.
    pub fn reorder_pinned(&mut self, order: &[Uuid]) {
        let mut position = 0u32;
        for id in order {
            if let Some(item) = self
                .items
                .iter_mut()
                .find(|item| item.id == *id && item.is_pinned)
            {
                item.pinned_order = Some(position);
                position += 1;
            }
        }
        self.commit();
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        let removed = self.items.len() != before;
        if removed {
            self.commit();
        }
        removed
    }

    pub fn clear_unpinned(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.is_pinned);
        let removed = before - self.items.len();
        self.commit();
        removed
    }

    pub fn clear_all(&mut self, keep_pinned: bool) -> usize {
        if keep_pinned {
            return self.clear_unpinned();
        }
        let removed = self.items.len();
        self.items.clear();
        self.commit();
        removed
    }

    /// Enrichment patch: set the fetched page title. No-op for unknown ids
    /// or items that already carry a title.
    pub fn apply_title(&mut self, id: Uuid, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        if item.kind != ClipKind::Url || item.url_title.is_some() {
            return false;
        }
        item.url_title = Some(title.to_string());
        self.commit();
        true
    }

    pub fn apply_thumbnail(&mut self, id: Uuid, bytes: Vec<u8>) -> bool {
        if bytes.is_empty() {
            return false;
        }
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        if item.kind != ClipKind::Url {
            return false;
        }
        item.url_thumbnail = Some(bytes);
        self.commit();
        true
    }

    pub fn search(&self, criteria: &SearchCriteria) -> Vec<&ClipboardItem> {
        self.items
            .iter()
            .filter(|item| criteria.matches(item))
            .collect()
    }

    fn trim_expired(&mut self) -> usize {
        if self.retention_days == 0 {
            return 0;
        }
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let before = self.items.len();
        self.items
            .retain(|item| item.is_pinned || item.copied_at >= cutoff);
        before - self.items.len()
    }

    fn trim_to_limit(&mut self) {
        let max = self.max_items as usize;
        if self.items.len() <= max {
            return;
        }

        self.canonical_sort();
        let pinned_count = self.items.iter().filter(|item| item.is_pinned).count();
        if pinned_count >= max {
            // Pinned overflow: keep the first `max` of the canonical pinned
            // view (ascending pinned_order); no unpinned items survive.
            self.items.truncate(max);
        } else {
            let allowed_unpinned = max - pinned_count;
            self.items.truncate(pinned_count + allowed_unpinned);
        }
    }

    /// Hand-edited or legacy snapshots can carry pinned items without a
    /// manual rank; give those a slot after the existing ones.
    fn repair_pinned_orders(&mut self) {
        let mut next = self
            .items
            .iter()
            .filter_map(|item| item.pinned_order)
            .max()
            .map(|order| order + 1)
            .unwrap_or(0);
        for item in &mut self.items {
            if item.is_pinned && item.pinned_order.is_none() {
                item.pinned_order = Some(next);
                next += 1;
            }
        }
    }

    fn canonical_sort(&mut self) {
        self.items.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then_with(|| match (a.is_pinned, b.is_pinned) {
                    (true, true) => a
                        .pinned_order
                        .cmp(&b.pinned_order)
                        .then_with(|| b.copied_at.cmp(&a.copied_at)),
                    _ => b.copied_at.cmp(&a.copied_at),
                })
        });
    }

    fn recompute_stats(&mut self) {
        let now = Utc::now();
        let week_ago = now - Duration::days(7);
        let copied_last_week = self
            .items
            .iter()
            .filter(|item| item.copied_at >= week_ago)
            .count();

        let most_copied_kind = if self.items.is_empty() {
            None
        } else {
            let mut counts: Vec<(ClipKind, usize)> = Vec::new();
            for item in &self.items {
                match counts.iter_mut().find(|(kind, _)| *kind == item.kind) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((item.kind, 1)),
                }
            }
            counts
                .into_iter()
                .max_by_key(|(_, count)| *count)
                .map(|(kind, count)| (kind, (count * 100 / self.items.len()) as u32))
        };

        let oldest_item_age_days = self
            .items
            .iter()
            .map(|item| item.copied_at)
            .min()
            .map(|oldest| (now - oldest).num_days());

        self.stats = Stats {
            copied_last_week,
            most_copied_kind,
            oldest_item_age_days,
        };
    }

    fn commit(&mut self) {
        self.canonical_sort();
        self.recompute_stats();
        match self.store.save(&self.items) {
            Ok(()) => self.snapshot_digest = self.store.digest(),
            Err(e) => tracing::warn!("history snapshot not written: {}", e),
        }
    }
}
