//! The `Document` facade: the single mutation entry point over a CRDT
//! element tree.

use alloc::string::String;
use alloc::vec::Vec;

use crate::clock::{ActorID, ChangeContext, ChangeID, Checkpoint, TimeTicket};
use crate::element::Object;
use crate::error::{DocumentError, Result};
use crate::operation::{self, Change, ChangePack, Operation};

/// A document's attachment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Not yet attached to a client/session.
    Detached,
    /// Attached and mutable.
    Attached,
    /// Removed; no further mutation is accepted.
    Removed,
}

/// A CRDT document: a root [`Object`] plus the bookkeeping needed to run
/// local update sessions and replay remote changes.
pub struct Document {
    key: String,
    root: Object,
    root_created_at: TimeTicket,
    local_changes: Vec<Change>,
    checkpoint: Checkpoint,
    status: Status,
    min_synced_ticket: Option<TimeTicket>,
    change_id: ChangeID,
    max_lamport: u64,
}

impl Document {
    /// A new, detached document identified by `key`, owned by `actor`.
    pub fn new(key: impl Into<String>, actor: ActorID) -> Self {
        let root_created_at = TimeTicket::initial();
        Self {
            key: key.into(),
            root: Object::new(root_created_at),
            root_created_at,
            local_changes: Vec::new(),
            checkpoint: Checkpoint::initial(),
            status: Status::Detached,
            min_synced_ticket: None,
            change_id: ChangeID::initial(actor),
            max_lamport: 0,
        }
    }

    /// The document's key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The current attachment status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Mark the document attached (a host calls this once a session with a
    /// server/peer is established).
    pub fn attach(&mut self) {
        if self.status == Status::Detached {
            self.status = Status::Attached;
        }
    }

    /// The live root object, for read-only inspection.
    pub fn root(&self) -> &Object {
        &self.root
    }

    /// Render the document deterministically, with every object's keys in
    /// sorted order: the cross-replica equality oracle every convergence
    /// check in this crate compares against.
    pub fn to_sorted_json(&self) -> String {
        self.root.to_json()
    }

    /// Run `session` against a cloned root inside a fresh
    /// [`ChangeContext`], committing the clone back as the new root only if
    /// `session` succeeds. On error, the clone (and any operations it
    /// already pushed via [`ChangeContext::push`]) is discarded and
    /// `self.root` is untouched.
    ///
    /// `session` mutates `root` directly and pushes a matching
    /// [`Operation`] onto `ctx` for each mutation via `ctx.push(op)`; the
    /// context, not the closure's return value, is the single source of
    /// truth for what the committed [`Change`] carries, so the two can
    /// never drift out of sync the way a hand-built, separately-returned
    /// operation list could.
    pub fn update<F>(&mut self, message: Option<String>, session: F) -> Result<()>
    where
        F: FnOnce(&mut ChangeContext, &mut Object) -> Result<()>,
    {
        let span = tracing::debug_span!("document.update", key = %self.key);
        let _entered = span.enter();

        if self.status == Status::Removed {
            return Err(DocumentError::DocumentRemoved);
        }

        let next_id = self.change_id.next(self.max_lamport);
        let mut ctx = ChangeContext::new(next_id);
        if let Some(m) = message {
            ctx.set_message(m);
        }

        let mut clone = self.root.clone();
        session(&mut ctx, &mut clone)?;

        #[cfg(debug_assertions)]
        debug_assert!(clone.dbg_invariants(), "committed root violates an element invariant");

        let operations = ctx.take_operations();
        tracing::debug!(change_id = %next_id.client_seq(), op_count = operations.len(), "committing local change");

        self.root = clone;
        self.change_id = ctx.id();
        self.max_lamport = self.max_lamport.max(ctx.lamport());
        self.checkpoint = self.checkpoint.increased_client_seq();
        self.local_changes.push(Change {
            id: ctx.id(),
            operations,
            message: ctx.take_message(),
        });
        Ok(())
    }

    /// Replay every operation in `pack.changes` against the root. A missing
    /// or removed parent is logged and skipped rather than propagated; any
    /// other error aborts replay and leaves the root as of the last
    /// successfully applied operation. Callers that need atomic replay
    /// should clone first.
    ///
    /// `pack.snapshot`, if present, is a host-codec concern (the codec
    /// lives outside this crate) and is only logged here, not decoded.
    pub fn apply_change_pack(&mut self, pack: ChangePack) -> Result<()> {
        let span = tracing::debug_span!("document.apply_change_pack", key = %self.key, changes = pack.changes.len());
        let _entered = span.enter();

        if pack.snapshot.is_some() {
            tracing::warn!("change pack carries a snapshot; decoding is a host-codec responsibility, skipping");
        }

        for change in &pack.changes {
            for op in &change.operations {
                match operation::apply(&mut self.root, self.root_created_at, op) {
                    Ok(()) => {}
                    Err(DocumentError::NotFound { ticket }) => {
                        tracing::debug!(%ticket, "replay: parent not found, skipping operation");
                    }
                    Err(e) => return Err(e),
                }
            }
            self.max_lamport = self.max_lamport.max(change.id.lamport());
        }

        self.checkpoint = pack.checkpoint;
        if let Some(min_synced) = pack.min_synced_ticket {
            self.min_synced_ticket = Some(min_synced);
        }
        if pack.is_removed {
            self.status = Status::Removed;
        }

        if let Some(min_synced) = self.min_synced_ticket {
            let purged = self.garbage_collect(min_synced);
            tracing::debug!(purged, "garbage collected after change pack");
        }
        Ok(())
    }

    /// Snapshot local changes since the last checkpoint into a pack ready
    /// to ship.
    pub fn create_change_pack(&self) -> ChangePack {
        ChangePack {
            document_key: self.key.clone(),
            checkpoint: self.checkpoint,
            changes: self.local_changes.clone(),
            snapshot: None,
            min_synced_ticket: self.min_synced_ticket,
            is_removed: self.status == Status::Removed,
        }
    }

    /// Purge every tombstone at or below `upper` throughout the document.
    /// Returns the number of entries purged. Idempotent: a second call with
    /// the same `upper` purges nothing further.
    pub fn garbage_collect(&mut self, upper: TimeTicket) -> usize {
        self.root.purge_deep(upper)
    }
}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeMap;

    use super::*;
    use crate::element::{Element, Primitive};
    use crate::operation::OperationKind;
    use crate::text::Text;

    fn actor() -> ActorID {
        ActorID::new([7; 12])
    }

    #[test]
    fn update_commits_on_success_and_is_visible_in_root() {
        let mut doc = Document::new("d1", actor());
        doc.update(Some(String::from("set k")), |ctx, root| {
            let at = ctx.issue_time_ticket();
            let value = Element::Primitive {
                value: Primitive::Str(String::from("v")),
                created_at: at,
                moved_at: None,
                removed_at: None,
            };
            root.set("k", value.clone())?;
            ctx.push(Operation {
                parent_created_at: doc_root_ticket(),
                executed_at: at,
                kind: OperationKind::Set {
                    key: String::from("k"),
                    value,
                },
            });
            Ok(())
        })
        .unwrap();

        assert_eq!(doc.root().get("k").unwrap().to_json(), r#""v""#);
        assert_eq!(doc.to_sorted_json(), r#"{"k":"v"}"#);
    }

    fn doc_root_ticket() -> TimeTicket {
        TimeTicket::initial()
    }

    #[test]
    fn update_discards_clone_on_error() {
        let mut doc = Document::new("d1", actor());
        let err = doc.update(None, |_ctx, root| {
            root.set("a.b", Element::Primitive {
                value: Primitive::Int32(1),
                created_at: TimeTicket::initial(),
                moved_at: None,
                removed_at: None,
            })?; // invalid key, bails out
            Ok(())
        });
        assert!(err.is_err());
        assert_eq!(doc.root().len(), 0);
    }

    #[test]
    fn apply_change_pack_replays_remote_operations() {
        let mut doc = Document::new("d1", actor());
        let remote_actor = ActorID::new([9; 12]);
        let at = TimeTicket::new(1, 0, Some(remote_actor));
        let value = Element::Primitive {
            value: Primitive::Str(String::from("remote")),
            created_at: at,
            moved_at: None,
            removed_at: None,
        };
        let pack = ChangePack {
            document_key: String::from("d1"),
            checkpoint: Checkpoint::new(1, 0),
            changes: alloc::vec![Change {
                id: ChangeID::new(1, 1, remote_actor),
                operations: alloc::vec![Operation {
                    parent_created_at: TimeTicket::initial(),
                    executed_at: at,
                    kind: OperationKind::Set {
                        key: String::from("k"),
                        value,
                    },
                }],
                message: None,
            }],
            snapshot: None,
            min_synced_ticket: None,
            is_removed: false,
        };
        doc.apply_change_pack(pack).unwrap();
        assert_eq!(doc.root().get("k").unwrap().to_json(), r#""remote""#);
    }

    #[test]
    fn apply_change_pack_skips_missing_parent_without_erroring() {
        let mut doc = Document::new("d1", actor());
        let remote_actor = ActorID::new([9; 12]);
        let missing_parent = TimeTicket::new(5, 0, Some(remote_actor));
        let pack = ChangePack {
            document_key: String::from("d1"),
            checkpoint: Checkpoint::initial(),
            changes: alloc::vec![Change {
                id: ChangeID::new(1, 1, remote_actor),
                operations: alloc::vec![Operation {
                    parent_created_at: missing_parent,
                    executed_at: TimeTicket::new(2, 0, Some(remote_actor)),
                    kind: OperationKind::Set {
                        key: String::from("k"),
                        value: Element::Primitive {
                            value: Primitive::Null,
                            created_at: TimeTicket::new(2, 0, Some(remote_actor)),
                            moved_at: None,
                            removed_at: None,
                        },
                    },
                }],
                message: None,
            }],
            snapshot: None,
            min_synced_ticket: None,
            is_removed: false,
        };
        doc.apply_change_pack(pack).unwrap();
        assert_eq!(doc.root().len(), 0);
    }

    #[test]
    fn garbage_collect_is_idempotent() {
        let mut doc = Document::new("d1", actor());
        doc.update(None, |ctx, root| {
            let at = ctx.issue_time_ticket();
            root.set(
                "body",
                Element::Text(Text::new(at)),
            )?;
            Ok(())
        })
        .unwrap();

        doc.update(None, |ctx, root| {
            let at1 = ctx.issue_time_ticket();
            let at2 = ctx.issue_time_ticket();
            if let Element::Text(text) = root.get_mut("body").unwrap() {
                text.edit(0, 0, Some("hello"), at1, &mut BTreeMap::new())?;
                text.edit(0, 5, None, at2, &mut BTreeMap::new())?;
            }
            Ok(())
        })
        .unwrap();

        let upper = TimeTicket::max();
        let first = doc.garbage_collect(upper);
        let second = doc.garbage_collect(upper);
        assert!(first >= 1);
        assert_eq!(second, 0);
    }
}
