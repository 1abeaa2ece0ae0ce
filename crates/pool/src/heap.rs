//! A min-heap of [`Slot`]s ordered by `active_count`, with a secondary
//! position index so a caller holding only an opaque id can still be told
//! `fix`/`remove` in O(log n) — the `heapIndex` field from spec.md §3's
//! `PoolEntry`, externalized as an id→index map instead of a field on the
//! entry itself (entries are plain values in a `Vec`, not `Arc`s).

use std::collections::HashMap;
use std::sync::Arc;

use duskmux_mux::AnyManager;

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) id: u64,
    pub(crate) manager: Arc<dyn AnyManager>,
    pub(crate) active_count: u32,
    pub(crate) closed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Heap {
    slots: Vec<Slot>,
    positions: HashMap<u64, usize>,
    next_id: u64,
}

impl Heap {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new(), positions: HashMap::new(), next_id: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn push(&mut self, manager: Arc<dyn AnyManager>, active_count: u32) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let index = self.slots.len();
        self.slots.push(Slot { id, manager, active_count, closed: false });
        self.positions.insert(id, index);
        self.sift_up(index);
        id
    }

    pub(crate) fn get(&self, id: u64) -> Option<&Slot> {
        self.positions.get(&id).map(|&i| &self.slots[i])
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Option<&mut Slot> {
        let idx = *self.positions.get(&id)?;
        Some(&mut self.slots[idx])
    }

    /// Restores heap order around `id` after its `active_count` changed
    /// externally. No-op if `id` is no longer present.
    pub(crate) fn fix(&mut self, id: u64) {
        if let Some(&idx) = self.positions.get(&id) {
            let moved_down = self.sift_down(idx);
            if !moved_down {
                self.sift_up(idx);
            }
        }
    }

    /// Removes `id` from the heap (closed-entry eviction, or
    /// activeCount=0-above-CACHE_FLOOR eviction). No-op if absent.
    pub(crate) fn remove(&mut self, id: u64) {
        let Some(&idx) = self.positions.get(&id) else { return };
        let last = self.slots.len() - 1;
        self.swap(idx, last);
        self.slots.pop();
        self.positions.remove(&id);
        if idx < self.slots.len() {
            if !self.sift_down(idx) {
                self.sift_up(idx);
            }
        }
    }

    /// Pops the minimum-`active_count` usable slot, per `acquireStream` step
    /// 1: discard closed entries encountered along the way, return the first
    /// slot under `max_streams_per_manager` (still present in the heap; the
    /// caller reinserts after bumping `active_count`, matching the spec's
    /// "atomically increment and reinsert" step).
    pub(crate) fn pop_usable(&mut self, max_streams_per_manager: u32) -> Option<u64> {
        loop {
            let idx = 0;
            if self.slots.is_empty() {
                return None;
            }
            let id = self.slots[idx].id;
            if self.slots[idx].closed {
                self.remove(id);
                continue;
            }
            if self.slots[idx].active_count >= max_streams_per_manager {
                // Root is saturated; since it's the minimum, every entry is
                // saturated. Leave the heap untouched.
                return None;
            }
            return Some(id);
        }
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.slots[parent].active_count <= self.slots[idx].active_count {
                break;
            }
            self.swap(parent, idx);
            idx = parent;
        }
    }

    /// Returns true if `idx` moved.
    fn sift_down(&mut self, mut idx: usize) -> bool {
        let start = idx;
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;
            if left < self.slots.len() && self.slots[left].active_count < self.slots[smallest].active_count {
                smallest = left;
            }
            if right < self.slots.len() && self.slots[right].active_count < self.slots[smallest].active_count {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
        idx != start
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.slots.swap(a, b);
        self.positions.insert(self.slots[a].id, a);
        self.positions.insert(self.slots[b].id, b);
    }

    #[cfg(test)]
    pub(crate) fn root_active_count(&self) -> Option<u32> {
        self.slots.first().map(|s| s.active_count)
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        for (id, &idx) in &self.positions {
            assert_eq!(self.slots[idx].id, *id, "H1: heap[e.heapIndex] == e");
        }
        for i in 0..self.slots.len() {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            if left < self.slots.len() {
                assert!(self.slots[i].active_count <= self.slots[left].active_count, "H2: heap property");
            }
            if right < self.slots.len() {
                assert!(self.slots[i].active_count <= self.slots[right].active_count, "H2: heap property");
            }
        }
    }
}
