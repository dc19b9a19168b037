//! `Text`: a block-structured sequence CRDT (an RGA-tree-split). Supports
//! concurrent insert, delete, and per-character styling with `O(log n)`
//! index lookup via a weighted splay tree, and `O(log n)` id lookup via a
//! left-leaning red-black tree.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::clock::{ActorID, TimeTicket};
use crate::error::{DocumentError, Result};
use crate::util::llrb::LLRBTree;
use crate::util::rht::RHT;
use crate::util::splay::{Handle, SplayTree, SplayValue};

/// A block's identity: the ticket that created it, plus an offset for
/// blocks produced by splitting an earlier block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId {
    /// The ticket of the edit that created this block (pre-split).
    pub created_at: TimeTicket,
    /// Offset within the original block this split piece starts at.
    pub offset: u32,
}

/// A text position: the node owning a character, plus the offset within
/// that node. Stable across edits that don't touch the node itself, unlike
/// a raw absolute index.
pub type TextPos = (NodeId, usize);

#[derive(Clone)]
struct NodeValue {
    id: NodeId,
    content: String,
    removed_at: Option<TimeTicket>,
    attrs: RHT<String>,
}

impl SplayValue for NodeValue {
    fn len(&self) -> usize {
        if self.removed_at.is_some() {
            0
        } else {
            self.content.chars().count()
        }
    }
}

/// Whether `node` may be deleted by an edit stamped `edited_at`, given the
/// per-actor visibility caps accumulated so far.
fn can_delete(node: &NodeValue, edited_at: TimeTicket, max_created_at_map: &BTreeMap<ActorID, TimeTicket>) -> bool {
    let actor = node.id.created_at.actor_id().unwrap_or(ActorID::initial());
    let cap = max_created_at_map.get(&actor).copied().unwrap_or(TimeTicket::initial());
    let visible = node.id.created_at > cap;
    let not_already_removed_later = node.removed_at.map(|r| edited_at > r).unwrap_or(true);
    visible && not_already_removed_later
}

/// An RGA-tree-split text sequence.
#[derive(Clone)]
pub struct Text {
    created_at: TimeTicket,
    moved_at: Option<TimeTicket>,
    removed_at: Option<TimeTicket>,
    by_index: SplayTree<NodeValue>,
    by_id: LLRBTree<NodeId, Handle>,
}

impl Text {
    /// A new, empty text sequence.
    pub fn new(created_at: TimeTicket) -> Self {
        Self {
            created_at,
            moved_at: None,
            removed_at: None,
            by_index: SplayTree::new(),
            by_id: LLRBTree::new(),
        }
    }

    /// When this text element was created.
    pub fn created_at(&self) -> TimeTicket {
        self.created_at
    }

    /// When this text element was tombstoned, if ever.
    pub fn removed_at(&self) -> Option<TimeTicket> {
        self.removed_at
    }

    /// Tombstone this text element at `at` if newer than any existing
    /// tombstone.
    pub fn set_removed_at(&mut self, at: TimeTicket) -> bool {
        if self.removed_at.map(|r| at > r).unwrap_or(true) {
            self.removed_at = Some(at);
            true
        } else {
            false
        }
    }

    /// Live content length, in chars.
    pub fn len(&self) -> usize {
        self.by_index.total_weight()
    }

    /// `true` if the text has no live content.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace `[from_idx, to_idx)` with `content` (`None`/empty for a pure
    /// delete), stamping every touched boundary with `edited_at`.
    /// `from_idx <= to_idx <= len()` or this returns
    /// [`DocumentError::InvalidArgument`].
    ///
    /// `max_created_at_map` caps per-actor visibility: a candidate node is
    /// only deleted if its own `created_at` is newer than the cap already
    /// recorded for its actor (or the actor has no entry yet), which keeps
    /// an older concurrent remote edit from deleting content a different
    /// actor inserted more recently. Each deleted node's `created_at`
    /// raises its actor's entry in the map, so the map can be threaded
    /// through a sequence of remote edits to preserve this ordering.
    pub fn edit(
        &mut self,
        from_idx: usize,
        to_idx: usize,
        content: Option<&str>,
        edited_at: TimeTicket,
        max_created_at_map: &mut BTreeMap<ActorID, TimeTicket>,
    ) -> Result<()> {
        if from_idx > to_idx {
            return Err(DocumentError::InvalidArgument {
                message: String::from("edit range `from` must not exceed `to`"),
            });
        }
        if to_idx > self.len() {
            return Err(DocumentError::InvalidArgument {
                message: alloc::format!("edit range `to={to_idx}` exceeds text length {}", self.len()),
            });
        }

        self.split_at(to_idx);
        self.split_at(from_idx);

        let right_handle = if to_idx == self.by_index.total_weight() {
            None
        } else {
            Some(self.by_index.find(to_idx).expect("to_idx in range").0)
        };
        let left_handle = if from_idx == 0 {
            None
        } else {
            Some(self.by_index.find(from_idx - 1).expect("from_idx - 1 in range").0)
        };

        let mut candidates = Vec::new();
        let mut cur = match left_handle {
            None => self.by_index.first(),
            Some(h) => self.by_index.successor(h),
        };
        while let Some(h) = cur {
            if Some(h) == right_handle {
                break;
            }
            candidates.push(h);
            cur = self.by_index.successor(h);
        }

        for h in candidates {
            let node = self.by_index.value(h);
            if !can_delete(node, edited_at, max_created_at_map) {
                continue;
            }
            let actor = node.id.created_at.actor_id().unwrap_or(ActorID::initial());
            let created_at = node.id.created_at;
            max_created_at_map
                .entry(actor)
                .and_modify(|cap| *cap = (*cap).max(created_at))
                .or_insert(created_at);
            let node = self.by_index.value_mut(h);
            node.removed_at = Some(edited_at);
            self.by_index.update_weight(h);
        }

        if let Some(text) = content {
            if !text.is_empty() {
                let id = NodeId {
                    created_at: edited_at,
                    offset: 0,
                };
                let handle = self.by_index.insert_after(
                    left_handle,
                    NodeValue {
                        id,
                        content: String::from(text),
                        removed_at: None,
                        attrs: RHT::new(),
                    },
                );
                self.by_id.put(id, handle);
            }
        }
        Ok(())
    }

    /// Set attributes on every block touching `[from_idx, to_idx)`.
    /// Attribute conflicts resolve via the per-block RHT's own
    /// last-writer-wins rule.
    pub fn style(
        &mut self,
        from_idx: usize,
        to_idx: usize,
        attrs: &[(String, String)],
        edited_at: TimeTicket,
    ) -> Result<()> {
        if from_idx > to_idx || to_idx > self.len() {
            return Err(DocumentError::InvalidArgument {
                message: String::from("invalid style range"),
            });
        }
        self.split_at(to_idx);
        self.split_at(from_idx);

        let right_handle = if to_idx == self.by_index.total_weight() {
            None
        } else {
            Some(self.by_index.find(to_idx).expect("to_idx in range").0)
        };
        let left_handle = if from_idx == 0 {
            None
        } else {
            Some(self.by_index.find(from_idx - 1).expect("from_idx - 1 in range").0)
        };

        let mut cur = match left_handle {
            None => self.by_index.first(),
            Some(h) => self.by_index.successor(h),
        };
        while let Some(h) = cur {
            if Some(h) == right_handle {
                break;
            }
            let node = self.by_index.value_mut(h);
            for (k, v) in attrs {
                node.attrs.set(k.clone(), v.clone(), edited_at);
            }
            cur = self.by_index.successor(h);
        }
        Ok(())
    }

    /// The live text content, in document order.
    pub fn to_string_value(&mut self) -> String {
        let mut out = String::with_capacity(self.len());
        let mut cur = self.by_index.first();
        // `first()`/`successor()` don't splay for weight purposes, so plain
        // structural traversal is safe here and doesn't disturb lookups.
        while let Some(h) = cur {
            let node = self.by_index.value(h);
            if node.removed_at.is_none() {
                out.push_str(&node.content);
            }
            cur = self.by_index.successor(h);
        }
        out
    }

    /// Render as a quoted JSON string of the live content.
    pub fn to_json(&self) -> String {
        let mut clone = self.clone();
        let content = clone.to_string_value();
        let mut out = String::with_capacity(content.len() + 2);
        out.push('"');
        for ch in content.chars() {
            match ch {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                c => out.push(c),
            }
        }
        out.push('"');
        out
    }

    /// Drop tombstoned blocks whose `removed_at <= min_synced` from both
    /// indices. Returns the purged count.
    pub fn purge(&mut self, min_synced: TimeTicket) -> usize {
        let mut dead = Vec::new();
        let mut cur = self.by_index.first();
        while let Some(h) = cur {
            let node = self.by_index.value(h);
            if node.removed_at.map(|r| r <= min_synced).unwrap_or(false) {
                dead.push((h, node.id));
            }
            cur = self.by_index.successor(h);
        }
        for (h, id) in &dead {
            self.by_index.remove(*h);
            self.by_id.remove(id);
        }
        dead.len()
    }

    /// Split the block covering absolute index `idx` into two blocks at
    /// that offset, if `idx` doesn't already sit on a block boundary.
    fn split_at(&mut self, idx: usize) {
        if idx == 0 {
            return;
        }
        let total = self.by_index.total_weight();
        if idx >= total {
            return;
        }
        let Some((handle, offset)) = self.by_index.find(idx) else {
            return;
        };
        if offset == 0 {
            return;
        }

        let (left, right, id, attrs) = {
            let node = self.by_index.value(handle);
            let chars: Vec<char> = node.content.chars().collect();
            let left: String = chars[..offset].iter().collect();
            let right: String = chars[offset..].iter().collect();
            (left, right, node.id, node.attrs.clone())
        };
        let removed_at = self.by_index.value(handle).removed_at;
        self.by_index.value_mut(handle).content = left;
        self.by_index.update_weight(handle);

        let right_id = NodeId {
            created_at: id.created_at,
            offset: id.offset + offset as u32,
        };
        let right_handle = self.by_index.insert_after(
            Some(handle),
            NodeValue {
                id: right_id,
                content: right,
                removed_at,
                attrs,
            },
        );
        self.by_id.put(right_id, right_handle);
    }

    /// Locate the node and in-node offset for absolute index `idx`.
    pub fn find_node_pos(&mut self, idx: usize) -> Option<(NodeId, usize)> {
        let (handle, offset) = self.by_index.find(idx)?;
        Some((self.by_index.value(handle).id, offset))
    }

    /// Convert `[from_idx, to_idx)` to a pair of node-id-based positions
    /// (`TextPos`), stable across edits elsewhere in the document — useful
    /// for a presence marker that must survive a concurrent edit before it.
    pub fn index_range_to_pos_range(&mut self, from_idx: usize, to_idx: usize) -> Result<(TextPos, TextPos)> {
        if from_idx > to_idx || to_idx > self.len() {
            return Err(DocumentError::InvalidArgument {
                message: String::from("index range out of bounds"),
            });
        }
        let empty = || DocumentError::InvalidArgument {
            message: String::from("text is empty"),
        };
        let from_pos = self.find_node_pos(from_idx).ok_or_else(empty)?;
        let to_pos = self.find_node_pos(to_idx).ok_or_else(empty)?;
        Ok((from_pos, to_pos))
    }

    /// The inverse of [`index_range_to_pos_range`](Self::index_range_to_pos_range).
    pub fn pos_range_to_index_range(&mut self, from_pos: TextPos, to_pos: TextPos) -> Result<(usize, usize)> {
        let from_idx = self.pos_to_index(from_pos)?;
        let to_idx = self.pos_to_index(to_pos)?;
        Ok((from_idx, to_idx))
    }

    fn pos_to_index(&mut self, pos: TextPos) -> Result<usize> {
        let (id, offset) = pos;
        let handle = *self
            .by_id
            .floor(&id)
            .map(|(_, h)| h)
            .ok_or(DocumentError::NotFound { ticket: id.created_at })?;
        Ok(self.by_index.index_of(handle) + offset)
    }

    /// Checks this text element's own tombstone ordering and every block's
    /// `removed_at` ordering against its `id.created_at`.
    #[cfg(debug_assertions)]
    pub fn dbg_invariants(&mut self) -> bool {
        if !self.removed_at.map(|r| r > self.created_at).unwrap_or(true) {
            return false;
        }
        let mut cur = self.by_index.first();
        while let Some(h) = cur {
            let node = self.by_index.value(h);
            if !node.removed_at.map(|r| r > node.id.created_at).unwrap_or(true) {
                return false;
            }
            cur = self.by_index.successor(h);
        }
        true
    }
}

/// Options for [`Text::edit`], matching §9's "configuration object" shape:
/// optional fields with explicit defaults, passed as a record.
#[derive(Debug, Clone, Default)]
pub struct EditConfig {
    /// Replacement content, if any.
    pub content: Option<String>,
    /// Per-actor visibility cap; empty for a purely local edit.
    pub max_created_at_map: BTreeMap<ActorID, TimeTicket>,
}

impl EditConfig {
    /// A pure delete (no replacement content).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the replacement content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Options for [`Text::style`].
#[derive(Debug, Clone, Default)]
pub struct StyleConfig {
    /// Attributes to set.
    pub attributes: Vec<(String, String)>,
}

impl StyleConfig {
    /// An empty style change.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attributes to apply.
    pub fn with_attributes(mut self, attributes: Vec<(String, String)>) -> Self {
        self.attributes = attributes;
        self
    }
}

impl Text {
    /// [`edit`](Self::edit) taking its options as an [`EditConfig`] rather
    /// than positional parameters.
    pub fn edit_with_config(&mut self, from_idx: usize, to_idx: usize, config: &mut EditConfig, edited_at: TimeTicket) -> Result<()> {
        self.edit(from_idx, to_idx, config.content.as_deref(), edited_at, &mut config.max_created_at_map)
    }

    /// [`style`](Self::style) taking its options as a [`StyleConfig`].
    pub fn style_with_config(&mut self, from_idx: usize, to_idx: usize, config: &StyleConfig, edited_at: TimeTicket) -> Result<()> {
        self.style(from_idx, to_idx, &config.attributes, edited_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ActorID;

    fn t(n: u64) -> TimeTicket {
        TimeTicket::new(n, 0, Some(ActorID::new([1; 12])))
    }

    #[test]
    fn edit_case_a_insert_then_overwrite_middle() {
        let mut text = Text::new(t(0));
        text.edit(0, 0, Some("ABCD"), t(1), &mut BTreeMap::new()).unwrap();
        assert_eq!(text.to_string_value(), "ABCD");
        text.edit(1, 3, Some("12"), t(2), &mut BTreeMap::new()).unwrap();
        assert_eq!(text.to_string_value(), "A12D");
    }

    #[test]
    fn edit_case_b_insert_newline_at_boundary() {
        let mut text = Text::new(t(0));
        text.edit(0, 0, Some("ABCD"), t(1), &mut BTreeMap::new()).unwrap();
        text.edit(3, 3, Some("\n"), t(2), &mut BTreeMap::new()).unwrap();
        assert_eq!(text.to_string_value(), "ABC\nD");
    }

    #[test]
    fn pure_delete_shrinks_content() {
        let mut text = Text::new(t(0));
        text.edit(0, 0, Some("hello"), t(1), &mut BTreeMap::new()).unwrap();
        text.edit(1, 3, None, t(2), &mut BTreeMap::new()).unwrap();
        assert_eq!(text.to_string_value(), "hlo");
    }

    #[test]
    fn style_sets_attributes_without_changing_content() {
        let mut text = Text::new(t(0));
        text.edit(0, 0, Some("hello"), t(1), &mut BTreeMap::new()).unwrap();
        text.style(
            1,
            3,
            &[(String::from("bold"), String::from("true"))],
            t(2),
        )
        .unwrap();
        assert_eq!(text.to_string_value(), "hello");
    }

    #[test]
    fn purge_removes_only_tombstones_below_watermark() {
        let mut text = Text::new(t(0));
        text.edit(0, 0, Some("hello"), t(1), &mut BTreeMap::new()).unwrap();
        text.edit(0, 5, None, t(5), &mut BTreeMap::new()).unwrap();
        assert_eq!(text.purge(t(3)), 0);
        assert_eq!(text.purge(t(10)), 1);
    }

    #[test]
    fn can_delete_respects_max_created_at_watermark() {
        let actor = ActorID::new([1; 12]);
        let mut text = Text::new(t(0));
        text.edit(0, 0, Some("hello"), t(1), &mut BTreeMap::new()).unwrap();

        // A watermark at or after the node's `created_at` means the actor
        // issuing this delete has already seen (and accounted for) it
        // through some other path, so the candidate is not deletable here.
        let mut already_seen = BTreeMap::new();
        already_seen.insert(actor, t(1));
        text.edit(0, 5, None, t(6), &mut already_seen).unwrap();
        assert_eq!(text.to_string_value(), "hello");

        // A watermark strictly before `created_at` means the node is new
        // to this actor, so the delete goes through.
        let mut unseen = BTreeMap::new();
        unseen.insert(actor, t(0));
        text.edit(0, 5, None, t(7), &mut unseen).unwrap();
        assert_eq!(text.to_string_value(), "");
    }

    #[test]
    fn edit_with_config_round_trips_through_positional_edit() {
        let mut text = Text::new(t(0));
        let mut config = EditConfig::new().with_content("hi");
        text.edit_with_config(0, 0, &mut config, t(1)).unwrap();
        assert_eq!(text.to_string_value(), "hi");
    }

    #[test]
    fn style_with_config_round_trips_through_positional_style() {
        let mut text = Text::new(t(0));
        text.edit(0, 0, Some("hi"), t(1), &mut BTreeMap::new()).unwrap();
        let config = StyleConfig::new().with_attributes(alloc::vec![(String::from("bold"), String::from("true"))]);
        text.style_with_config(0, 2, &config, t(2)).unwrap();
        assert_eq!(text.to_string_value(), "hi");
    }
}
