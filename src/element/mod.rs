//! The CRDT element model: the tagged union every value in a document is
//! made of. A sum type rather than dynamic dispatch, so serialisation and
//! deep copy stay total by construction.

pub mod array;
pub mod counter;
pub mod object;
pub mod primitive;

use alloc::string::String;

pub use array::Array;
pub use counter::{Counter, CounterValue};
pub use object::Object;
pub use primitive::Primitive;

use crate::clock::TimeTicket;
use crate::text::Text;
use crate::tree::Tree;

/// Any value that can live inside a document: a map key, an array slot, or
/// the document root itself.
#[derive(Debug, Clone)]
pub enum Element {
    /// An immutable leaf value.
    Primitive {
        /// The value.
        value: Primitive,
        /// When this binding was created.
        created_at: TimeTicket,
        /// The latest move ticket, if this element has been reordered
        /// within a parent array.
        moved_at: Option<TimeTicket>,
        /// When this binding was tombstoned, if ever.
        removed_at: Option<TimeTicket>,
    },
    /// A numeric counter.
    Counter(Counter),
    /// A keyed map.
    Object(Object),
    /// An ordered list.
    Array(Array),
    /// An RGA-tree-split text sequence.
    Text(Text),
    /// A structured tree (rich text / XML-like content).
    Tree(Tree),
}

/// Search `elem` and, recursively, its children for the element created at
/// `target`. Only `Object` and `Array` nest other elements; `Text` and
/// `Tree` are leaves as far as this search is concerned.
pub(crate) fn find_mut(elem: &mut Element, target: TimeTicket) -> Option<&mut Element> {
    match elem {
        Element::Object(o) => o.find_mut(target),
        Element::Array(a) => a.find_mut(target),
        _ => None,
    }
}

/// Purge `elem`'s own tombstones below `min_synced`, then recurse into any
/// nested `Object`/`Array` values. Returns the purged count.
pub(crate) fn purge_deep(elem: &mut Element, min_synced: TimeTicket) -> usize {
    match elem {
        Element::Object(o) => o.purge_deep(min_synced),
        Element::Array(a) => a.purge_deep(min_synced),
        Element::Text(t) => t.purge(min_synced),
        Element::Tree(t) => t.purge(min_synced),
        Element::Counter(_) | Element::Primitive { .. } => 0,
    }
}

impl Element {
    /// The type name used in error messages and debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Element::Primitive { value, .. } => value.type_name(),
            Element::Counter(_) => "counter",
            Element::Object(_) => "object",
            Element::Array(_) => "array",
            Element::Text(_) => "text",
            Element::Tree(_) => "tree",
        }
    }

    /// When this element was created. Unique within one document.
    pub fn created_at(&self) -> TimeTicket {
        match self {
            Element::Primitive { created_at, .. } => *created_at,
            Element::Counter(c) => c.created_at(),
            Element::Object(o) => o.created_at(),
            Element::Array(a) => a.created_at(),
            Element::Text(t) => t.created_at(),
            Element::Tree(t) => t.created_at(),
        }
    }

    /// When this element was tombstoned, if ever. Always `> created_at`
    /// when present.
    pub fn removed_at(&self) -> Option<TimeTicket> {
        match self {
            Element::Primitive { removed_at, .. } => *removed_at,
            Element::Counter(c) => c.removed_at(),
            Element::Object(o) => o.removed_at(),
            Element::Array(a) => a.removed_at(),
            Element::Text(t) => t.removed_at(),
            Element::Tree(t) => t.removed_at(),
        }
    }

    /// `true` if this element has been tombstoned.
    pub fn is_removed(&self) -> bool {
        self.removed_at().is_some()
    }

    /// Tombstone this element at `at`, if `at` is newer than any existing
    /// tombstone. Returns `true` if the tombstone was (re)applied.
    pub fn set_removed_at(&mut self, at: TimeTicket) -> bool {
        match self {
            Element::Primitive { removed_at, .. } => {
                if removed_at.map(|r| at > r).unwrap_or(true) {
                    *removed_at = Some(at);
                    true
                } else {
                    false
                }
            }
            Element::Counter(c) => c.set_removed_at(at),
            Element::Object(o) => o.set_removed_at(at),
            Element::Array(a) => a.set_removed_at(at),
            Element::Text(t) => t.set_removed_at(at),
            Element::Tree(t) => t.set_removed_at(at),
        }
    }

    /// Render this element (and, recursively, its children) the way
    /// `to_sorted_json` expects: keys sorted, no extraneous whitespace.
    pub fn to_json(&self) -> String {
        match self {
            Element::Primitive { value, .. } => value.to_json(),
            Element::Counter(c) => c.to_json(),
            Element::Object(o) => o.to_json(),
            Element::Array(a) => {
                // `Array::to_json` needs `&mut self` to drive splay-tree
                // lookups; elements are cloned for read-only rendering
                // paths rather than threading mutability through every
                // `to_json` caller.
                let mut clone = a.clone();
                clone.to_json()
            }
            Element::Text(t) => t.to_json(),
            Element::Tree(t) => t.to_json(),
        }
    }

    /// Checks this element's own tombstone ordering, then recurses into any
    /// nested structure's invariants.
    #[cfg(debug_assertions)]
    pub fn dbg_invariants(&mut self) -> bool {
        match self {
            Element::Primitive { created_at, removed_at, .. } => removed_at.map(|r| r > *created_at).unwrap_or(true),
            Element::Counter(c) => c.dbg_invariants(),
            Element::Object(o) => o.dbg_invariants(),
            Element::Array(a) => a.dbg_invariants(),
            Element::Text(t) => t.dbg_invariants(),
            Element::Tree(t) => t.dbg_invariants(),
        }
    }
}
