//! Operations, changes, and the change pack replay pipeline.
//!
//! An [`Operation`] always names the container it mutates by
//! `parent_created_at` rather than by key/index, so replaying it against a
//! different snapshot of the same logical document resolves correctly even
//! if local bookkeeping (key order, array position) has since shifted.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::clock::{ActorID, ChangeID, Checkpoint, TimeTicket};
use crate::element::{Element, Object, Primitive};
use crate::error::{DocumentError, Result};
use crate::tree::TreeContent;

/// `(key, value)` attribute pairs; values are already JSON-encoded strings.
pub type AttrList = Vec<(String, String)>;

/// The operation-specific payload.
#[derive(Debug, Clone)]
pub enum OperationKind {
    /// Set a key in the parent object.
    Set {
        /// The key to bind.
        key: String,
        /// The value to bind it to.
        value: Element,
    },
    /// Insert into the parent array immediately after `prev_created_at`
    /// (`None` inserts at the head).
    Add {
        /// The anchor to insert after.
        prev_created_at: Option<TimeTicket>,
        /// The value to insert.
        value: Element,
    },
    /// Re-anchor an existing array element after `prev_created_at`.
    Move {
        /// The new anchor.
        prev_created_at: Option<TimeTicket>,
        /// The element being moved.
        target_created_at: TimeTicket,
    },
    /// Tombstone the element created at `target_created_at` within the
    /// parent object or array.
    Remove {
        /// The element to tombstone.
        target_created_at: TimeTicket,
    },
    /// Replace `[from, to)` of the parent text with `content`
    /// (`None`/empty content is a pure delete).
    Edit {
        /// Start offset, inclusive.
        from: usize,
        /// End offset, exclusive.
        to: usize,
        /// Replacement content, if any.
        content: Option<String>,
        /// Per-actor visibility cap threading through a sequence of
        /// remote edits; see [`crate::text::Text::edit`].
        max_created_at_map: BTreeMap<ActorID, TimeTicket>,
    },
    /// Set attributes on `[from, to)` of the parent text.
    Style {
        /// Start offset, inclusive.
        from: usize,
        /// End offset, exclusive.
        to: usize,
        /// Attributes to set.
        attrs: AttrList,
    },
    /// Apply a delta to the parent counter.
    Increase {
        /// The delta, numeric (int or float; the counter truncates floats
        /// toward zero).
        delta: Primitive,
    },
    /// Edit `[from_path, to_path)` of the parent tree: tombstones the
    /// covered range and, if `contents` is non-empty, appends it as new
    /// children of the left anchor.
    TreeEdit {
        /// Start path, inclusive.
        from_path: Vec<usize>,
        /// End path, exclusive.
        to_path: Vec<usize>,
        /// Content to insert after the deleted range, if any.
        contents: Vec<TreeContent>,
    },
    /// Set attributes on the tree element at `path`.
    TreeStyle {
        /// Path to the element node.
        path: Vec<usize>,
        /// Attributes to set.
        attrs: AttrList,
    },
    /// Remove attributes from the tree element at `path`.
    TreeRemoveStyle {
        /// Path to the element node.
        path: Vec<usize>,
        /// Attribute keys to remove.
        keys: Vec<String>,
    },
}

/// One CRDT mutation, addressed to the container created at
/// `parent_created_at`.
#[derive(Debug, Clone)]
pub struct Operation {
    /// The container element this operation mutates (or the document's
    /// root ticket, for operations on the root object itself).
    pub parent_created_at: TimeTicket,
    /// The ticket stamped on whatever this operation creates or tombstones.
    pub executed_at: TimeTicket,
    /// The operation payload.
    pub kind: OperationKind,
}

/// A group of operations issued together under one [`ChangeID`].
#[derive(Debug, Clone)]
pub struct Change {
    /// This change's identity.
    pub id: ChangeID,
    /// The operations it carries, in issue order.
    pub operations: Vec<Operation>,
    /// An optional human-readable message, set via
    /// [`crate::clock::ChangeContext::set_message`].
    pub message: Option<String>,
}

/// A batch of changes exchanged between a client and a host. The wire shape
/// is opaque to this crate; the codec lives outside it.
#[derive(Debug, Clone)]
pub struct ChangePack {
    /// The document key this pack belongs to.
    pub document_key: String,
    /// The sender's sync checkpoint.
    pub checkpoint: Checkpoint,
    /// The changes carried by this pack.
    pub changes: Vec<Change>,
    /// A full snapshot of the root object, if this pack replaces local
    /// state rather than incrementally patching it.
    pub snapshot: Option<Vec<u8>>,
    /// The watermark below which every replica has observed all
    /// tombstones, safe to purge.
    pub min_synced_ticket: Option<TimeTicket>,
    /// `true` if the document itself has been removed.
    pub is_removed: bool,
}

/// Apply `op` to `root`, where `root_created_at` is the ticket that
/// identifies `root` itself (operations addressed to the document root use
/// this ticket rather than any key/index).
///
/// `NotFound` (missing parent) is the only error callers performing replay
/// should treat as "skip this operation": applying the same change against
/// two different replica states must yield byte-identical snapshots, which
/// requires a missing/removed parent to be silently idempotent rather than
/// a hard failure.
pub fn apply(root: &mut Object, root_created_at: TimeTicket, op: &Operation) -> Result<()> {
    if op.parent_created_at == root_created_at {
        return apply_to_object(root, op);
    }
    let Some(elem) = root.find_mut(op.parent_created_at) else {
        return Err(DocumentError::NotFound {
            ticket: op.parent_created_at,
        });
    };
    if elem.is_removed() {
        return Err(DocumentError::NotFound {
            ticket: op.parent_created_at,
        });
    }
    apply_to_element(elem, op)
}

fn apply_to_object(object: &mut Object, op: &Operation) -> Result<()> {
    match &op.kind {
        OperationKind::Set { key, value } => {
            object.set(key, value.clone())?;
            Ok(())
        }
        OperationKind::Remove { target_created_at } => object.remove_by_ticket(*target_created_at, op.executed_at),
        _ => Err(DocumentError::Unimplemented {
            what: alloc::format!("{:?} is not a valid operation on an object", op.kind),
        }),
    }
}

fn apply_to_element(elem: &mut Element, op: &Operation) -> Result<()> {
    match elem {
        Element::Object(o) => apply_to_object(o, op),
        Element::Array(a) => match &op.kind {
            OperationKind::Add { prev_created_at, value } => {
                a.insert_after(*prev_created_at, value.clone())?;
                Ok(())
            }
            OperationKind::Move {
                prev_created_at,
                target_created_at,
            } => a.move_after(*prev_created_at, *target_created_at, op.executed_at),
            OperationKind::Remove { target_created_at } => a.remove(*target_created_at, op.executed_at),
            _ => Err(DocumentError::Unimplemented {
                what: alloc::format!("{:?} is not a valid operation on an array", op.kind),
            }),
        },
        Element::Counter(c) => match &op.kind {
            OperationKind::Increase { delta } => c.increase(delta),
            _ => Err(DocumentError::Unimplemented {
                what: alloc::format!("{:?} is not a valid operation on a counter", op.kind),
            }),
        },
        Element::Text(t) => match &op.kind {
            OperationKind::Edit {
                from,
                to,
                content,
                max_created_at_map,
            } => {
                let mut map = max_created_at_map.clone();
                t.edit(*from, *to, content.as_deref(), op.executed_at, &mut map)
            }
            OperationKind::Style { from, to, attrs } => t.style(*from, *to, attrs, op.executed_at),
            _ => Err(DocumentError::Unimplemented {
                what: alloc::format!("{:?} is not a valid operation on text", op.kind),
            }),
        },
        Element::Tree(tree) => match &op.kind {
            OperationKind::TreeEdit {
                from_path,
                to_path,
                contents,
            } => tree.edit_by_path(from_path, to_path, contents, op.executed_at),
            OperationKind::TreeStyle { path, attrs } => {
                let handle = tree.element_at_path(path)?;
                tree.style(handle, attrs, op.executed_at)
            }
            OperationKind::TreeRemoveStyle { path, keys } => {
                let handle = tree.element_at_path(path)?;
                tree.remove_style(handle, keys, op.executed_at)
            }
            _ => Err(DocumentError::Unimplemented {
                what: alloc::format!("{:?} is not a valid operation on a tree", op.kind),
            }),
        },
        Element::Primitive { .. } => Err(DocumentError::Unimplemented {
            what: String::from("primitives are not a valid operation target"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ActorID;
    use crate::text::Text;

    fn t(n: u64) -> TimeTicket {
        TimeTicket::new(n, 0, Some(ActorID::new([1; 12])))
    }

    fn str_elem(s: &str, created: u64) -> Element {
        Element::Primitive {
            value: Primitive::Str(String::from(s)),
            created_at: t(created),
            moved_at: None,
            removed_at: None,
        }
    }

    #[test]
    fn set_on_root_applies_directly() {
        let mut root = Object::new(t(0));
        let op = Operation {
            parent_created_at: t(0),
            executed_at: t(1),
            kind: OperationKind::Set {
                key: String::from("k"),
                value: str_elem("v", 1),
            },
        };
        apply(&mut root, t(0), &op).unwrap();
        assert_eq!(root.get("k").unwrap().to_json(), r#""v""#);
    }

    #[test]
    fn set_on_nested_object_resolves_by_ticket() {
        let mut root = Object::new(t(0));
        let nested = Object::new(t(1));
        root.set("child", Element::Object(nested)).unwrap();

        let op = Operation {
            parent_created_at: t(1),
            executed_at: t(2),
            kind: OperationKind::Set {
                key: String::from("k"),
                value: str_elem("v", 2),
            },
        };
        apply(&mut root, t(0), &op).unwrap();

        let Element::Object(child) = root.get("child").unwrap() else {
            panic!("expected object");
        };
        assert_eq!(child.get("k").unwrap().to_json(), r#""v""#);
    }

    #[test]
    fn missing_parent_is_not_found_not_panic() {
        let mut root = Object::new(t(0));
        let op = Operation {
            parent_created_at: t(99),
            executed_at: t(1),
            kind: OperationKind::Set {
                key: String::from("k"),
                value: str_elem("v", 1),
            },
        };
        let err = apply(&mut root, t(0), &op).unwrap_err();
        assert!(matches!(err, DocumentError::NotFound { .. }));
    }

    #[test]
    fn edit_op_applies_to_nested_text() {
        let mut root = Object::new(t(0));
        root.set("body", Element::Text(Text::new(t(1)))).unwrap();

        let insert = Operation {
            parent_created_at: t(1),
            executed_at: t(2),
            kind: OperationKind::Edit {
                from: 0,
                to: 0,
                content: Some(String::from("ABCD")),
                max_created_at_map: BTreeMap::new(),
            },
        };
        apply(&mut root, t(0), &insert).unwrap();

        let overwrite = Operation {
            parent_created_at: t(1),
            executed_at: t(3),
            kind: OperationKind::Edit {
                from: 1,
                to: 3,
                content: Some(String::from("12")),
                max_created_at_map: BTreeMap::new(),
            },
        };
        apply(&mut root, t(0), &overwrite).unwrap();

        let Element::Text(text) = root.get_mut("body").unwrap() else {
            panic!("expected text");
        };
        assert_eq!(text.to_string_value(), "A12D");
    }
}
