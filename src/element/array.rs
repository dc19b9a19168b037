//! The `Array` CRDT: an ordered RGA-style list indexed by a splay tree.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::clock::TimeTicket;
use crate::element::Element;
use crate::error::{DocumentError, Result};
use crate::util::splay::{Handle, SplayTree, SplayValue};

#[derive(Clone)]
struct Slot {
    id: TimeTicket,
    value: Element,
    /// The latest `move_after`/`move_before` ticket applied to this slot,
    /// if any. The slot's effective position ticket is
    /// `moved_at.unwrap_or(id)` (`id == value.created_at()` by
    /// construction), per the max(created_at, moved_at) rule.
    moved_at: Option<TimeTicket>,
    removed_at: Option<TimeTicket>,
}

impl SplayValue for Slot {
    fn len(&self) -> usize {
        if self.removed_at.is_some() {
            0
        } else {
            1
        }
    }
}

/// An RGA list. Concurrent inserts that share the same anchor (`prev_id`)
/// are ordered newest-first: inserting after `P` walks past any existing
/// successor of `P` whose own id is greater than the new id before linking,
/// so two replicas that each insert once after `P` without seeing each
/// other's write still agree on the final order once both inserts are
/// known.
#[derive(Clone)]
pub struct Array {
    created_at: TimeTicket,
    moved_at: Option<TimeTicket>,
    removed_at: Option<TimeTicket>,
    tree: SplayTree<Slot>,
    /// Anchor each id was inserted after, for the concurrent-insert
    /// ordering rule above.
    anchors: BTreeMap<TimeTicket, Option<TimeTicket>>,
    handles: BTreeMap<TimeTicket, Handle>,
}

impl Array {
    /// A new, empty array.
    pub fn new(created_at: TimeTicket) -> Self {
        Self {
            created_at,
            moved_at: None,
            removed_at: None,
            tree: SplayTree::new(),
            anchors: BTreeMap::new(),
            handles: BTreeMap::new(),
        }
    }

    /// When this array was created.
    pub fn created_at(&self) -> TimeTicket {
        self.created_at
    }

    /// When this array was tombstoned, if ever.
    pub fn removed_at(&self) -> Option<TimeTicket> {
        self.removed_at
    }

    /// Tombstone this array at `at` if newer than any existing tombstone.
    pub fn set_removed_at(&mut self, at: TimeTicket) -> bool {
        if self.removed_at.map(|r| at > r).unwrap_or(true) {
            self.removed_at = Some(at);
            true
        } else {
            false
        }
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.tree.total_weight()
    }

    /// `true` if the array has no live elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `value` immediately after the element identified by
    /// `prev_id` (or at the head, if `None`), resolving concurrent-insert
    /// ties by id order. Returns the id (`value.created_at()`) of the
    /// inserted element.
    pub fn insert_after(&mut self, prev_id: Option<TimeTicket>, value: Element) -> Result<TimeTicket> {
        let id = value.created_at();
        let mut cursor = match prev_id {
            None => None,
            Some(pid) => Some(self.handle_for(pid)?),
        };

        loop {
            let next = match cursor {
                None => self.tree.first(),
                Some(h) => self.tree.successor(h),
            };
            let Some(next_handle) = next else { break };
            let next_id = self.tree.value(next_handle).id;
            let next_anchor = self.anchors.get(&next_id).copied().flatten();
            if next_anchor == prev_id && next_id > id {
                cursor = Some(next_handle);
                continue;
            }
            break;
        }

        let handle = self.tree.insert_after(
            cursor,
            Slot {
                id,
                value,
                moved_at: None,
                removed_at: None,
            },
        );
        self.handles.insert(id, handle);
        self.anchors.insert(id, prev_id);
        Ok(id)
    }

    /// Re-anchor the element identified by `id` to sit immediately after
    /// `ref_id` (or at the head, if `None`), stamping `moved_at`.
    ///
    /// A move is only applied if `at` is strictly newer than the slot's
    /// current effective position ticket (`moved_at.unwrap_or(id)`); a
    /// stale move (one whose ticket is older than a move already applied)
    /// is a no-op. This makes the result independent of delivery order:
    /// two concurrent moves of the same element converge on whichever
    /// carries the later ticket, regardless of which is applied first.
    pub fn move_after(&mut self, ref_id: Option<TimeTicket>, id: TimeTicket, at: TimeTicket) -> Result<()> {
        let handle = self.handle_for(id)?;
        let slot = self.tree.value(handle);
        let effective = slot.moved_at.unwrap_or(slot.id);
        if at <= effective {
            return Ok(());
        }
        let mut slot = self.tree.remove(handle);
        self.handles.remove(&id);
        slot.moved_at = Some(at);
        let new_handle = self.insert_after_internal(ref_id, slot)?;
        self.handles.insert(id, new_handle);
        Ok(())
    }

    fn insert_after_internal(&mut self, prev_id: Option<TimeTicket>, slot: Slot) -> Result<Handle> {
        let id = slot.id;
        let mut cursor = match prev_id {
            None => None,
            Some(pid) => Some(self.handle_for(pid)?),
        };
        loop {
            let next = match cursor {
                None => self.tree.first(),
                Some(h) => self.tree.successor(h),
            };
            let Some(next_handle) = next else { break };
            let next_id = self.tree.value(next_handle).id;
            let next_anchor = self.anchors.get(&next_id).copied().flatten();
            if next_anchor == prev_id && next_id > id {
                cursor = Some(next_handle);
                continue;
            }
            break;
        }
        let handle = self.tree.insert_after(cursor, slot);
        self.anchors.insert(id, prev_id);
        Ok(handle)
    }

    /// Tombstone the element identified by `id`.
    pub fn remove(&mut self, id: TimeTicket, executed_at: TimeTicket) -> Result<()> {
        let handle = self.handle_for(id)?;
        let slot = self.tree.value_mut(handle);
        if slot.removed_at.map(|r| executed_at > r).unwrap_or(true) {
            slot.removed_at = Some(executed_at);
            self.tree.update_weight(handle);
        }
        Ok(())
    }

    /// Tombstone the `index`-th live element. A remove at an out-of-range
    /// index is a no-op.
    pub fn remove_by_index(&mut self, index: usize, executed_at: TimeTicket) -> Result<()> {
        if index >= self.len() {
            return Ok(());
        }
        let (handle, _) = self.tree.find(index).expect("index < len implies a node exists");
        let slot = self.tree.value_mut(handle);
        slot.removed_at = Some(executed_at);
        self.tree.update_weight(handle);
        Ok(())
    }

    /// The live value at `index`, by position.
    pub fn get(&mut self, index: usize) -> Option<&Element> {
        let (handle, _) = self.tree.find(index)?;
        Some(&self.tree.value(handle).value)
    }

    /// The live value bound to `id`.
    pub fn get_by_id(&self, id: TimeTicket) -> Option<&Element> {
        let handle = *self.handles.get(&id)?;
        let slot = self.tree.value(handle);
        if slot.removed_at.is_some() {
            None
        } else {
            Some(&slot.value)
        }
    }

    /// The live value bound to `id`, mutably.
    pub fn get_mut_by_id(&mut self, id: TimeTicket) -> Result<&mut Element> {
        let handle = self.handle_for(id)?;
        Ok(&mut self.tree.value_mut(handle).value)
    }

    /// Find the live element created at `target`, searching this array's
    /// own slots and, recursively, any nested `Object`/`Array` values.
    pub fn find_mut(&mut self, target: TimeTicket) -> Option<&mut Element> {
        let handles = self.live_handles();
        for h in &handles {
            if self.tree.value(*h).id == target {
                return Some(&mut self.tree.value_mut(*h).value);
            }
        }
        for h in &handles {
            if let Some(found) = crate::element::find_mut(&mut self.tree.value_mut(*h).value, target) {
                return Some(found);
            }
        }
        None
    }

    fn live_handles(&mut self) -> Vec<Handle> {
        let mut out = Vec::new();
        let mut cur = self.tree.first();
        while let Some(h) = cur {
            if self.tree.value(h).removed_at.is_none() {
                out.push(h);
            }
            cur = self.tree.successor(h);
        }
        out
    }

    /// Live elements, in document order.
    pub fn iter(&mut self) -> Vec<&Element> {
        let n = self.len();
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            if let Some((h, _)) = self.tree.find(i) {
                out.push(&self.tree.value(h).value);
            }
        }
        out
    }

    /// Render as `[v, v, ...]`.
    pub fn to_json(&mut self) -> String {
        let mut out = String::from("[");
        for (i, v) in self.iter().into_iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&v.to_json());
        }
        out.push(']');
        out
    }

    /// Drop tombstoned slots whose `removed_at <= min_synced`. Returns the
    /// purged count.
    pub fn purge(&mut self, min_synced: TimeTicket) -> usize {
        let mut dead = Vec::new();
        let mut cur = self.tree.first();
        while let Some(h) = cur {
            let slot = self.tree.value(h);
            if slot.removed_at.map(|r| r <= min_synced).unwrap_or(false) {
                dead.push((h, slot.id));
            }
            cur = self.tree.successor(h);
        }
        for (h, id) in &dead {
            self.tree.remove(*h);
            self.handles.remove(id);
            self.anchors.remove(id);
        }
        dead.len()
    }

    /// Purge this array's own tombstones, then recurse into every live
    /// element's own nested garbage.
    pub fn purge_deep(&mut self, min_synced: TimeTicket) -> usize {
        let mut count = self.purge(min_synced);
        let handles = self.live_handles();
        for h in handles {
            count += crate::element::purge_deep(&mut self.tree.value_mut(h).value, min_synced);
        }
        count
    }

    fn handle_for(&self, id: TimeTicket) -> Result<Handle> {
        self.handles.get(&id).copied().ok_or(DocumentError::NotFound { ticket: id })
    }

    /// Checks this array's own tombstone ordering and every slot's
    /// `moved_at`/`removed_at` ordering against its `id`, then recurses
    /// into every live element.
    #[cfg(debug_assertions)]
    pub fn dbg_invariants(&mut self) -> bool {
        let own_ok = self.removed_at.map(|r| r > self.created_at).unwrap_or(true);
        if !own_ok {
            return false;
        }
        let mut cur = self.tree.first();
        while let Some(h) = cur {
            let slot = self.tree.value(h);
            let moved_ok = slot.moved_at.map(|m| m > slot.id).unwrap_or(true);
            let removed_ok = slot.removed_at.map(|r| r > slot.id).unwrap_or(true);
            if !moved_ok || !removed_ok {
                return false;
            }
            cur = self.tree.successor(h);
        }
        let handles = self.live_handles();
        handles.into_iter().all(|h| self.tree.value_mut(h).value.dbg_invariants())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ActorID;
    use crate::element::Primitive;

    fn t(n: u64) -> TimeTicket {
        TimeTicket::new(n, 0, Some(ActorID::new([1; 12])))
    }

    fn int_elem(v: i32, created: u64) -> Element {
        Element::Primitive {
            value: Primitive::Int32(v),
            created_at: t(created),
            moved_at: None,
            removed_at: None,
        }
    }

    #[test]
    fn insert_after_preserves_head_order() {
        let mut arr = Array::new(t(0));
        let a = arr.insert_after(None, int_elem(1, 1)).unwrap();
        arr.insert_after(Some(a), int_elem(2, 2)).unwrap();
        assert_eq!(arr.to_json(), "[1,2]");
    }

    #[test]
    fn concurrent_inserts_at_same_anchor_order_newest_first() {
        let mut arr = Array::new(t(0));
        let head = arr.insert_after(None, int_elem(0, 1)).unwrap();
        // Simulate two replicas both inserting after `head`, applied in
        // arrival order 5-then-9: the higher id must end up first.
        arr.insert_after(Some(head), int_elem(5, 5)).unwrap();
        arr.insert_after(Some(head), int_elem(9, 9)).unwrap();
        assert_eq!(arr.to_json(), "[0,9,5]");
    }

    #[test]
    fn remove_by_index_and_missing_id_is_noop_or_error() {
        let mut arr = Array::new(t(0));
        arr.insert_after(None, int_elem(1, 1)).unwrap();
        arr.insert_after(Some(t(1)), int_elem(2, 2)).unwrap();
        arr.remove_by_index(0, t(10)).unwrap();
        assert_eq!(arr.to_json(), "[2]");
        arr.remove_by_index(5, t(11)).unwrap(); // out-of-range no-op
        assert_eq!(arr.to_json(), "[2]");
    }

    #[test]
    fn concurrent_moves_converge_regardless_of_application_order() {
        // [1, 2, 3]; two concurrent moves of `1`: move-after-2 at ticket 10,
        // move-to-head at ticket 20. The later ticket (20, head) must win
        // no matter which order the two moves are applied in.
        let build = || {
            let mut arr = Array::new(t(0));
            let a = arr.insert_after(None, int_elem(1, 1)).unwrap();
            let b = arr.insert_after(Some(a), int_elem(2, 2)).unwrap();
            arr.insert_after(Some(b), int_elem(3, 3)).unwrap();
            (arr, a, b)
        };

        let (mut first, a, b) = build();
        first.move_after(Some(b), a, t(10)).unwrap();
        first.move_after(None, a, t(20)).unwrap();
        assert_eq!(first.to_json(), "[1,2,3]");

        let (mut second, a, b) = build();
        second.move_after(None, a, t(20)).unwrap();
        second.move_after(Some(b), a, t(10)).unwrap();
        assert_eq!(second.to_json(), "[1,2,3]");

        assert_eq!(first.to_json(), second.to_json());
    }
}
