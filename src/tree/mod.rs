//! `Tree`: a structured rich-text tree CRDT layered on `IndexTree`, used to
//! drive editors such as ProseMirror: element nodes carry a tag and an
//! attribute RHT, text nodes carry a string.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::clock::TimeTicket;
use crate::error::{DocumentError, Result};
use crate::util::index_tree::{Handle, IndexTree, IndexTreeValue, Token};
use crate::util::rht::RHT;

/// A tree node's identity: the ticket that created it, plus an offset for
/// text nodes produced by splitting an earlier text node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TreeNodeId {
    /// The ticket of the edit that created this node.
    pub created_at: TimeTicket,
    /// Offset within the original node this split piece starts at.
    pub offset: u32,
}

/// Content to insert during a tree edit, appended as new children of the
/// edit's left anchor. A single edit's contents must be all-text or
/// all-element, never mixed (see [`validate_contents`]).
#[derive(Debug, Clone)]
pub enum TreeContent {
    /// A bare text node.
    Text(String),
    /// An element node, optionally pre-populated with one text child.
    Element {
        /// The element's tag.
        tag: String,
        /// Optional initial text content.
        text: Option<String>,
    },
}

/// Checks that `contents` is all-[`TreeContent::Text`] or all-
/// [`TreeContent::Element`], never a mix of the two within one edit.
pub fn validate_contents(contents: &[TreeContent]) -> Result<()> {
    let mut saw_text = false;
    let mut saw_element = false;
    for c in contents {
        match c {
            TreeContent::Text(_) => saw_text = true,
            TreeContent::Element { .. } => saw_element = true,
        }
    }
    if saw_text && saw_element {
        return Err(DocumentError::InvalidArgument {
            message: String::from("tree edit contents must be all-text or all-element, not mixed"),
        });
    }
    Ok(())
}

#[derive(Clone)]
enum Kind {
    Element { tag: String, attrs: RHT<String> },
    Text(String),
}

#[derive(Clone)]
struct NodeValue {
    id: TreeNodeId,
    kind: Kind,
    removed_at: Option<TimeTicket>,
}

impl IndexTreeValue for NodeValue {
    fn is_text(&self) -> bool {
        matches!(self.kind, Kind::Text(_))
    }

    fn text_len(&self) -> usize {
        match &self.kind {
            Kind::Text(s) => s.chars().count(),
            Kind::Element { .. } => 0,
        }
    }
}

/// A CRDT tree.
#[derive(Clone)]
pub struct Tree {
    created_at: TimeTicket,
    moved_at: Option<TimeTicket>,
    removed_at: Option<TimeTicket>,
    tree: IndexTree<NodeValue>,
    root: Handle,
    by_id: BTreeMap<TreeNodeId, Handle>,
}

impl Tree {
    /// A new tree whose root element carries `root_tag`.
    pub fn new(root_tag: impl Into<String>, created_at: TimeTicket) -> Self {
        let id = TreeNodeId {
            created_at,
            offset: 0,
        };
        let (tree, root) = IndexTree::new(NodeValue {
            id,
            kind: Kind::Element {
                tag: root_tag.into(),
                attrs: RHT::new(),
            },
            removed_at: None,
        });
        let mut by_id = BTreeMap::new();
        by_id.insert(id, root);
        Self {
            created_at,
            moved_at: None,
            removed_at: None,
            tree,
            root,
            by_id,
        }
    }

    /// When this tree element was created.
    pub fn created_at(&self) -> TimeTicket {
        self.created_at
    }

    /// When this tree element was tombstoned, if ever.
    pub fn removed_at(&self) -> Option<TimeTicket> {
        self.removed_at
    }

    /// Tombstone this tree element at `at` if newer than any existing
    /// tombstone.
    pub fn set_removed_at(&mut self, at: TimeTicket) -> bool {
        if self.removed_at.map(|r| at > r).unwrap_or(true) {
            self.removed_at = Some(at);
            true
        } else {
            false
        }
    }

    /// The root handle.
    pub fn root(&self) -> Handle {
        self.root
    }

    /// Append a new element child tagged `tag` to `parent`.
    pub fn append_element(&mut self, parent: Handle, tag: impl Into<String>, created_at: TimeTicket) -> Handle {
        let id = TreeNodeId {
            created_at,
            offset: 0,
        };
        let handle = self.tree.alloc_detached(NodeValue {
            id,
            kind: Kind::Element {
                tag: tag.into(),
                attrs: RHT::new(),
            },
            removed_at: None,
        });
        self.tree.append_child(parent, handle);
        self.by_id.insert(id, handle);
        handle
    }

    /// Append a new text child to `parent`.
    pub fn append_text(&mut self, parent: Handle, value: impl Into<String>, created_at: TimeTicket) -> Handle {
        let id = TreeNodeId {
            created_at,
            offset: 0,
        };
        let handle = self.tree.alloc_detached(NodeValue {
            id,
            kind: Kind::Text(value.into()),
            removed_at: None,
        });
        self.tree.append_child(parent, handle);
        self.by_id.insert(id, handle);
        handle
    }

    /// Total live size: text nodes contribute their length, element nodes
    /// `2 +` their children's padded size.
    pub fn size(&self) -> usize {
        self.tree.size(self.root)
    }

    /// Total node count including tombstones, for snapshot round-trip
    /// assertions.
    pub fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    /// Set attributes on an element node.
    pub fn style(&mut self, handle: Handle, attrs: &[(String, String)], edited_at: TimeTicket) -> Result<()> {
        match &mut self.tree.value_mut(handle).kind {
            Kind::Element { attrs: rht, .. } => {
                for (k, v) in attrs {
                    rht.set(k.clone(), v.clone(), edited_at);
                }
                Ok(())
            }
            Kind::Text(_) => Err(DocumentError::InvalidArgument {
                message: String::from("cannot style a text node"),
            }),
        }
    }

    /// Remove attributes from an element node.
    pub fn remove_style(&mut self, handle: Handle, keys: &[String], edited_at: TimeTicket) -> Result<()> {
        match &mut self.tree.value_mut(handle).kind {
            Kind::Element { attrs: rht, .. } => {
                for k in keys {
                    rht.remove(k, edited_at);
                }
                Ok(())
            }
            Kind::Text(_) => Err(DocumentError::InvalidArgument {
                message: String::from("cannot style a text node"),
            }),
        }
    }

    /// Resolve a path of live child indices to the element handle it names.
    pub fn element_at_path(&self, path: &[usize]) -> Result<Handle> {
        let mut cur = self.root;
        for &idx in path {
            let children = self.tree.children(cur);
            cur = *children.get(idx).ok_or_else(|| DocumentError::InvalidArgument {
                message: alloc::format!("path index {idx} out of range"),
            })?;
        }
        Ok(cur)
    }

    /// Resolve a path (a chain of live child indices) to the element handle
    /// one level above the final offset, and that offset interpreted as a
    /// character position within the concatenation of that element's live
    /// text children.
    ///
    /// This only resolves paths whose final component addresses text
    /// content directly under an element; it does not walk into nested
    /// elements past the last path component.
    fn resolve_path(&self, path: &[usize]) -> Result<(Handle, usize)> {
        let Some((&offset, ancestors)) = path.split_last() else {
            return Err(DocumentError::InvalidArgument {
                message: String::from("path must not be empty"),
            });
        };
        let mut cur = self.root;
        for &idx in ancestors {
            let children = self.tree.children(cur);
            cur = *children.get(idx).ok_or_else(|| DocumentError::InvalidArgument {
                message: alloc::format!("path index {idx} out of range"),
            })?;
        }
        Ok((cur, offset))
    }

    /// Edit the tree between `from_path` and `to_path`, covering two
    /// shapes: a same-parent text edit, and a cross-sibling deletion that
    /// merges the two parents' text. If `contents` is non-empty, it is
    /// appended as new children of the left anchor (`from_parent`) after
    /// the deletion, each node receiving a fresh id stamped `edited_at`.
    pub fn edit_by_path(
        &mut self,
        from_path: &[usize],
        to_path: &[usize],
        contents: &[TreeContent],
        edited_at: TimeTicket,
    ) -> Result<()> {
        if from_path.is_empty() || to_path.is_empty() {
            return Err(DocumentError::InvalidArgument {
                message: String::from("path must not be empty"),
            });
        }
        if from_path.len() != to_path.len() {
            return Err(DocumentError::InvalidArgument {
                message: String::from("from_path and to_path must have equal length"),
            });
        }
        validate_contents(contents)?;

        let (from_parent, from_off) = self.resolve_path(from_path)?;
        let (to_parent, to_off) = self.resolve_path(to_path)?;

        if from_parent == to_parent {
            self.trim_text_children(from_parent, from_off, to_off, edited_at);
            self.append_contents(from_parent, contents, edited_at);
            return Ok(());
        }

        // Cross-sibling case: trim the tail of `from_parent` after
        // `from_off`, trim the head of `to_parent` before `to_off`, append
        // what remains of `to_parent`'s text onto `from_parent`, and
        // tombstone every sibling from `from_parent` (exclusive) through
        // `to_parent` (inclusive).
        self.trim_text_children(from_parent, from_off, usize::MAX, edited_at);
        let tail = self.take_text_before(to_parent, to_off);
        if !tail.is_empty() {
            self.append_text(from_parent, tail, edited_at);
        }

        let Some(root_parent) = self.tree.parent(from_parent) else {
            return Err(DocumentError::InvalidArgument {
                message: String::from("cannot merge across the tree root"),
            });
        };
        let siblings = self.tree.children(root_parent);
        let from_idx = siblings
            .iter()
            .position(|h| *h == from_parent)
            .expect("from_parent is a child of its own parent");
        let to_idx = siblings
            .iter()
            .position(|h| *h == to_parent)
            .expect("to_parent is a child of its own parent");
        for h in &siblings[from_idx + 1..=to_idx] {
            self.tombstone(*h, edited_at);
        }
        self.append_contents(from_parent, contents, edited_at);
        Ok(())
    }

    /// Append `contents` as new children of `parent`, each stamped with a
    /// fresh id `(edited_at, running_offset)` so multiple nodes inserted by
    /// the same edit stay individually addressable.
    fn append_contents(&mut self, parent: Handle, contents: &[TreeContent], edited_at: TimeTicket) {
        let mut offset: u32 = 0;
        for content in contents {
            match content {
                TreeContent::Text(s) => {
                    let id = TreeNodeId {
                        created_at: edited_at,
                        offset,
                    };
                    offset += 1;
                    let handle = self.tree.alloc_detached(NodeValue {
                        id,
                        kind: Kind::Text(s.clone()),
                        removed_at: None,
                    });
                    self.tree.append_child(parent, handle);
                    self.by_id.insert(id, handle);
                }
                TreeContent::Element { tag, text } => {
                    let id = TreeNodeId {
                        created_at: edited_at,
                        offset,
                    };
                    offset += 1;
                    let handle = self.tree.alloc_detached(NodeValue {
                        id,
                        kind: Kind::Element {
                            tag: tag.clone(),
                            attrs: RHT::new(),
                        },
                        removed_at: None,
                    });
                    self.tree.append_child(parent, handle);
                    self.by_id.insert(id, handle);
                    if let Some(text) = text {
                        let text_id = TreeNodeId {
                            created_at: edited_at,
                            offset,
                        };
                        offset += 1;
                        let text_handle = self.tree.alloc_detached(NodeValue {
                            id: text_id,
                            kind: Kind::Text(text.clone()),
                            removed_at: None,
                        });
                        self.tree.append_child(handle, text_handle);
                        self.by_id.insert(text_id, text_handle);
                    }
                }
            }
        }
    }

    /// Tombstone every live text character of `parent`'s children within
    /// `[from, to)` (`to = usize::MAX` trims through the end).
    fn trim_text_children(&mut self, parent: Handle, from: usize, to: usize, edited_at: TimeTicket) {
        let mut pos = 0usize;
        for child in self.tree.children(parent) {
            let len = match &self.tree.value(child).kind {
                Kind::Text(s) => s.chars().count(),
                Kind::Element { .. } => {
                    pos += 0;
                    continue;
                }
            };
            let child_start = pos;
            let child_end = pos + len;
            pos = child_end;

            let cut_from = from.max(child_start).min(child_end);
            let cut_to = to.min(child_end).max(child_start);
            if cut_from >= cut_to {
                continue;
            }
            if let Kind::Text(s) = &mut self.tree.value_mut(child).kind {
                let chars: Vec<char> = s.chars().collect();
                let rel_from = cut_from - child_start;
                let rel_to = cut_to - child_start;
                let mut new_s = String::new();
                new_s.extend(&chars[..rel_from]);
                new_s.extend(&chars[rel_to..]);
                *s = new_s;
            }
            self.tree.recompute_size(child);
            let _ = edited_at;
        }
    }

    /// Remove and return the text of `parent`'s children before `to`,
    /// leaving the remainder (`[to, end)`) in place.
    fn take_text_before(&mut self, parent: Handle, to: usize) -> String {
        let mut pos = 0usize;
        let mut removed = String::new();
        for child in self.tree.children(parent) {
            let len = match &self.tree.value(child).kind {
                Kind::Text(s) => s.chars().count(),
                Kind::Element { .. } => continue,
            };
            let child_start = pos;
            let child_end = pos + len;
            pos = child_end;
            if child_start >= to {
                continue;
            }
            let cut_to = to.min(child_end);
            if let Kind::Text(s) = &mut self.tree.value_mut(child).kind {
                let chars: Vec<char> = s.chars().collect();
                let rel_to = cut_to - child_start;
                removed.extend(&chars[..rel_to]);
                let mut new_s = String::new();
                new_s.extend(&chars[rel_to..]);
                *s = new_s;
            }
            self.tree.recompute_size(child);
        }
        removed
    }

    fn tombstone(&mut self, handle: Handle, edited_at: TimeTicket) {
        self.tree.value_mut(handle).removed_at = Some(edited_at);
        self.tree.remove(handle);
    }

    /// Drop tombstoned nodes whose `removed_at <= min_synced`, and every
    /// live element node's own tombstoned attribute entries below the same
    /// watermark. Returns the summed purged count. Attribute values purge
    /// before nodes: an element node purged this round still gets its
    /// attrs walked first, since `purge_node` only drops the node from the
    /// arena, not its `attrs` map.
    pub fn purge(&mut self, min_synced: TimeTicket) -> usize {
        let all_handles: Vec<Handle> = self.by_id.values().copied().collect();
        let mut count = 0;
        for h in all_handles {
            if let Kind::Element { attrs, .. } = &mut self.tree.value_mut(h).kind {
                count += attrs.purge(min_synced);
            }
        }

        let dead: Vec<TreeNodeId> = self
            .by_id
            .iter()
            .filter(|(_, h)| {
                self.tree.is_removed(**h)
                    && self.tree.value(**h).removed_at.map(|r| r <= min_synced).unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            if let Some(h) = self.by_id.remove(id) {
                self.tree.purge_node(h);
            }
        }
        count += dead.len();
        count
    }

    /// Render as XML-like markup: `<tag attr="v">text</tag>`, attributes
    /// sorted by key (already the RHT's iteration order).
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for tok in self.tree.tokens(self.root) {
            match tok {
                Token::Start(h) => {
                    let Kind::Element { tag, attrs } = &self.tree.value(h).kind else {
                        unreachable!("Start token always refers to an element node")
                    };
                    out.push('<');
                    out.push_str(tag);
                    for (k, v) in attrs.iter() {
                        out.push(' ');
                        out.push_str(k);
                        out.push_str("=\"");
                        out.push_str(v);
                        out.push('"');
                    }
                    out.push('>');
                }
                Token::Text(h) => {
                    if let Kind::Text(s) = &self.tree.value(h).kind {
                        out.push_str(s);
                    }
                }
                Token::End(h) => {
                    let Kind::Element { tag, .. } = &self.tree.value(h).kind else {
                        unreachable!("End token always refers to an element node")
                    };
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
        }
        out
    }

    /// Render as a JSON string literal of [`to_xml`](Self::to_xml)'s
    /// output; the document core has no native tree-JSON shape beyond the
    /// markup string itself.
    pub fn to_json(&self) -> String {
        let xml = self.to_xml();
        let mut out = String::with_capacity(xml.len() + 2);
        out.push('"');
        for ch in xml.chars() {
            match ch {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                c => out.push(c),
            }
        }
        out.push('"');
        out
    }

    /// Checks this tree element's own tombstone ordering and every node's
    /// `removed_at` ordering against its `id.created_at`.
    #[cfg(debug_assertions)]
    pub fn dbg_invariants(&self) -> bool {
        if !self.removed_at.map(|r| r > self.created_at).unwrap_or(true) {
            return false;
        }
        self.by_id
            .values()
            .all(|h| self.tree.value(*h).removed_at.map(|r| r > self.tree.value(*h).id.created_at).unwrap_or(true))
    }

    /// Bounds-check `(from_idx, to_idx)` against [`size`](Self::size) and
    /// return them unchanged. Unlike `text::Text`, which resolves a
    /// position to a concrete node id (`NodeId`) via its id-keyed index,
    /// `IndexTree` has no reverse index-to-handle lookup, so this crate
    /// represents a tree position as the validated absolute index itself
    /// rather than a node-id pair.
    pub fn index_range_to_pos_range(&self, from_idx: usize, to_idx: usize) -> Result<(usize, usize)> {
        if from_idx > to_idx || to_idx > self.size() {
            return Err(DocumentError::InvalidArgument {
                message: String::from("index range out of bounds"),
            });
        }
        Ok((from_idx, to_idx))
    }

    /// The inverse of [`index_range_to_pos_range`](Self::index_range_to_pos_range).
    pub fn pos_range_to_index_range(&self, from_pos: usize, to_pos: usize) -> Result<(usize, usize)> {
        self.index_range_to_pos_range(from_pos, to_pos)
    }
}

/// Options for [`Tree::edit_by_path`], mirroring `text::EditConfig`'s
/// optional-fields-with-defaults shape for the tree edit operation.
#[derive(Debug, Clone, Default)]
pub struct TreeEditConfig {
    /// Content to append after the deleted range.
    pub contents: Vec<TreeContent>,
    /// Ancestor levels to split before editing. This crate's path
    /// addressing only supports single-level, already-resolved paths (see
    /// `Tree::resolve_path`), so this field is accepted for shape parity
    /// with the wire operation but otherwise unused.
    pub split_level: usize,
}

impl TreeEditConfig {
    /// An edit with no inserted content and no extra splitting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content to insert.
    pub fn with_contents(mut self, contents: Vec<TreeContent>) -> Self {
        self.contents = contents;
        self
    }
}

/// Options for [`Tree::style`]/[`Tree::remove_style`].
#[derive(Debug, Clone, Default)]
pub struct TreeStyleConfig {
    /// Attributes to set.
    pub attributes: Vec<(String, String)>,
    /// Attribute keys to remove.
    pub attributes_to_remove: Vec<String>,
}

impl TreeStyleConfig {
    /// An empty style change.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tree {
    /// [`edit_by_path`](Self::edit_by_path) taking its options as a
    /// [`TreeEditConfig`] rather than positional parameters.
    pub fn edit_by_path_with_config(
        &mut self,
        from_path: &[usize],
        to_path: &[usize],
        config: &TreeEditConfig,
        edited_at: TimeTicket,
    ) -> Result<()> {
        self.edit_by_path(from_path, to_path, &config.contents, edited_at)
    }

    /// Apply a [`TreeStyleConfig`] to the element at `path`: sets
    /// `attributes`, then removes `attributes_to_remove`.
    pub fn style_with_config(&mut self, path: &[usize], config: &TreeStyleConfig, edited_at: TimeTicket) -> Result<()> {
        let handle = self.element_at_path(path)?;
        if !config.attributes.is_empty() {
            self.style(handle, &config.attributes, edited_at)?;
        }
        if !config.attributes_to_remove.is_empty() {
            self.remove_style(handle, &config.attributes_to_remove, edited_at)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ActorID;

    fn t(n: u64) -> TimeTicket {
        TimeTicket::new(n, 0, Some(ActorID::new([1; 12])))
    }

    fn build() -> Tree {
        // <r><p>12</p><p>34</p></r>
        let mut tree = Tree::new("r", t(0));
        let p1 = tree.append_element(tree.root(), "p", t(1));
        tree.append_text(p1, "12", t(2));
        let p2 = tree.append_element(tree.root(), "p", t(3));
        tree.append_text(p2, "34", t(4));
        tree
    }

    #[test]
    fn to_xml_renders_built_structure() {
        let tree = build();
        assert_eq!(tree.to_xml(), "<r><p>12</p><p>34</p></r>");
        assert_eq!(tree.size(), 8);
    }

    #[test]
    fn edit_by_path_merges_across_siblings() {
        let mut tree = build();
        tree.edit_by_path(&[0, 1], &[1, 1], &[], t(5)).unwrap();
        assert_eq!(tree.to_xml(), "<r><p>14</p></r>");
        assert_eq!(tree.size(), 4);
    }

    #[test]
    fn style_then_remove_style_round_trip() {
        let mut tree = build();
        tree.edit_by_path(&[0, 1], &[1, 1], &[], t(5)).unwrap();
        let p = tree.tree.children(tree.root())[0];
        tree.style(
            p,
            &[
                (String::from("b"), String::from("t")),
                (String::from("i"), String::from("t")),
            ],
            t(6),
        )
        .unwrap();
        assert_eq!(tree.to_xml(), r#"<r><p b="t" i="t">14</p></r>"#);

        tree.remove_style(p, &[String::from("i")], t(7)).unwrap();
        assert_eq!(tree.to_xml(), r#"<r><p b="t">14</p></r>"#);
        assert_eq!(tree.size(), 4);
    }

    #[test]
    fn edit_by_path_inserts_content_at_left_anchor() {
        let mut tree = build();
        // Insert "56" at the end of the first paragraph without deleting.
        tree.edit_by_path(&[0, 2], &[0, 2], &[TreeContent::Text(String::from("56"))], t(5))
            .unwrap();
        assert_eq!(tree.to_xml(), "<r><p>1256</p><p>34</p></r>");
    }

    #[test]
    fn edit_by_path_inserts_element_content() {
        let mut tree = build();
        let contents = alloc::vec![TreeContent::Element {
            tag: String::from("p"),
            text: Some(String::from("56")),
        }];
        tree.edit_by_path(&[2], &[2], &contents, t(5)).unwrap();
        assert_eq!(tree.to_xml(), "<r><p>12</p><p>34</p><p>56</p></r>");
    }

    #[test]
    fn edit_by_path_rejects_mixed_content_kinds() {
        let mut tree = build();
        let contents = alloc::vec![
            TreeContent::Text(String::from("x")),
            TreeContent::Element {
                tag: String::from("p"),
                text: None,
            },
        ];
        let err = tree.edit_by_path(&[0, 2], &[0, 2], &contents, t(5)).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidArgument { .. }));
    }

    #[test]
    fn purge_drops_tombstoned_attrs_and_nodes() {
        let mut tree = build();
        let p = tree.tree.children(tree.root())[0];
        tree.style(p, &[(String::from("b"), String::from("t"))], t(5)).unwrap();
        tree.remove_style(p, &[String::from("b")], t(6)).unwrap();
        tree.edit_by_path(&[0, 1], &[1, 1], &[], t(7)).unwrap();

        let purged = tree.purge(TimeTicket::max());
        assert!(purged >= 1);

        let Kind::Element { attrs, .. } = &tree.tree.value(p).kind else {
            panic!("expected element");
        };
        assert_eq!(attrs.iter().count(), 0);
    }
}
