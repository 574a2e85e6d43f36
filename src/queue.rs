use uuid::Uuid;

use crate::device::{write_item, ClipboardDevice};
use crate::errors::Result;
use crate::item::{ClipboardItem, PasteQueueEntry};
use crate::store::SnapshotStore;

/// Independent FIFO of item snapshots. Entries embed a copy of the item, so
/// later history edits or evictions never reach the queue; the optional
/// source id is only a trace back to the history entry.
pub struct PasteQueue {
    entries: Vec<PasteQueueEntry>,
    store: SnapshotStore<PasteQueueEntry>,
}

impl PasteQueue {
    pub fn open(store: SnapshotStore<PasteQueueEntry>) -> Self {
        Self {
            entries: store.load(),
            store,
        }
    }

    pub fn entries(&self) -> &[PasteQueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enqueue(&mut self, item: ClipboardItem, source_item_id: Option<Uuid>) -> Uuid {
        let entry = PasteQueueEntry::new(item, source_item_id);
        let id = entry.id;
        self.entries.push(entry);
        self.commit();
        id
    }

    /// Move the entries at `from` (0-based positions) so they sit at `to`,
    /// keeping their relative order. Out-of-range sources are ignored and
    /// the target is clamped into range.
    pub fn move_items(&mut self, from: &[usize], to: usize) {
        let mut sources: Vec<usize> = from
            .iter()
            .copied()
            .filter(|&i| i < self.entries.len())
            .collect();
        sources.sort_unstable();
        sources.dedup();
        if sources.is_empty() {
            return;
        }

        let mut moved = Vec::with_capacity(sources.len());
        for &index in sources.iter().rev() {
            moved.push(self.entries.remove(index));
        }
        moved.reverse();

        // The target counts positions in the original list; account for the
        // extracted entries that sat before it.
        let shift = sources.iter().filter(|&&i| i < to).count();
        let target = to.saturating_sub(shift).min(self.entries.len());
        for (offset, entry) in moved.into_iter().enumerate() {
            self.entries.insert(target + offset, entry);
        }
        self.commit();
    }

    pub fn remove_entry(&mut self, id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.commit();
        }
        removed
    }

    /// Write the front entry's item to the device. With auto-remove the
    /// entry is consumed; otherwise it stays at the front for the next
    /// paste. An empty queue is a no-op.
    pub fn paste_next(
        &mut self,
        device: &mut dyn ClipboardDevice,
        auto_remove: bool,
    ) -> Result<Option<PasteQueueEntry>> {
        let Some(front) = self.entries.first() else {
            return Ok(None);
        };
        write_item(device, &front.item)?;
        let entry = if auto_remove {
            let entry = self.entries.remove(0);
            self.commit();
            entry
        } else {
            front.clone()
        };
        Ok(Some(entry))
    }

    fn commit(&mut self) {
        if let Err(e) = self.store.save(&self.entries) {
            tracing::warn!("paste queue snapshot not written: {}", e);
        }
    }
}
