//! The `Object` CRDT: a keyed map with last-writer-wins conflict
//! resolution.

use alloc::string::String;

use crate::clock::TimeTicket;
use crate::element::Element;
use crate::error::{DocumentError, Result};
use crate::util::rht::{SetOutcome, RHT};

/// A CRDT map. Backed by [`RHT`], which already implements "newer ticket
/// wins, older write rejected" per key; this type adds the object-specific
/// validation (no `.` in keys, since `.` is the path separator used by
/// tooling that addresses nested elements).
#[derive(Debug, Clone)]
pub struct Object {
    created_at: TimeTicket,
    moved_at: Option<TimeTicket>,
    removed_at: Option<TimeTicket>,
    rht: RHT<Element>,
}

fn validate_key(key: &str) -> Result<()> {
    if key.contains('.') {
        return Err(DocumentError::InvalidArgument {
            message: alloc::format!("object key `{key}` may not contain `.`"),
        });
    }
    Ok(())
}

impl Object {
    /// A new, empty object.
    pub fn new(created_at: TimeTicket) -> Self {
        Self {
            created_at,
            moved_at: None,
            removed_at: None,
            rht: RHT::new(),
        }
    }

    /// When this object was created.
    pub fn created_at(&self) -> TimeTicket {
        self.created_at
    }

    /// When this object was tombstoned, if ever.
    pub fn removed_at(&self) -> Option<TimeTicket> {
        self.removed_at
    }

    /// Tombstone this object at `at` if `at` is newer than any existing
    /// tombstone. Returns `true` if applied.
    pub fn set_removed_at(&mut self, at: TimeTicket) -> bool {
        if self.removed_at.map(|r| at > r).unwrap_or(true) {
            self.removed_at = Some(at);
            true
        } else {
            false
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.rht.len()
    }

    /// `true` if the object has no live keys.
    pub fn is_empty(&self) -> bool {
        self.rht.is_empty()
    }

    /// Set `key` to `value`, keyed by `value.created_at()`. Rejects keys
    /// containing `.`. If a live value already occupies `key` with a newer
    /// or equal ticket, the write is silently dropped (last-writer-wins).
    pub fn set(&mut self, key: &str, value: Element) -> Result<SetOutcome> {
        validate_key(key)?;
        let ticket = value.created_at();
        Ok(self.rht.set(key, value, ticket))
    }

    /// The live value bound to `key`.
    pub fn get(&self, key: &str) -> Option<&Element> {
        self.rht.get(key)
    }

    /// The live value bound to `key`, mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Element> {
        self.rht.get_mut(key)
    }

    /// Tombstone the live value at `key`, stamping both the RHT binding and
    /// the element's own `removed_at`. A missing key is a no-op.
    pub fn remove(&mut self, key: &str, executed_at: TimeTicket) -> Result<()> {
        if let Some(elem) = self.rht.get_mut(key) {
            elem.set_removed_at(executed_at);
        }
        self.rht.remove(key, executed_at);
        Ok(())
    }

    /// Iterate live `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Element)> {
        self.rht.iter()
    }

    /// Find the live element created at `target`, searching this object's
    /// own bindings and, recursively, any nested `Object`/`Array` values.
    pub fn find_mut(&mut self, target: TimeTicket) -> Option<&mut Element> {
        let keys: alloc::vec::Vec<String> = self.rht.iter().map(|(k, _)| String::from(k)).collect();
        for k in &keys {
            if self.rht.get(k).map(|v| v.created_at()) == Some(target) {
                return self.rht.get_mut(k);
            }
        }
        for k in &keys {
            if let Some(v) = self.rht.get_mut(k) {
                if let Some(found) = crate::element::find_mut(v, target) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Tombstone the live binding whose value's `created_at == target`, the
    /// key-agnostic counterpart of [`remove`](Self::remove) used when
    /// operations address elements by ticket rather than by key. A missing
    /// target is a no-op.
    pub fn remove_by_ticket(&mut self, target: TimeTicket, executed_at: TimeTicket) -> Result<()> {
        let key = self.rht.iter().find(|(_, v)| v.created_at() == target).map(|(k, _)| String::from(k));
        if let Some(key) = key {
            self.remove(&key, executed_at)?;
        }
        Ok(())
    }

    /// Purge tombstoned bindings whose removal ticket is at or below
    /// `min_synced`.
    pub fn purge(&mut self, min_synced: TimeTicket) -> usize {
        self.rht.purge(min_synced)
    }

    /// Purge this object's own tombstoned bindings, then recurse into every
    /// live value's own nested garbage.
    pub fn purge_deep(&mut self, min_synced: TimeTicket) -> usize {
        let mut count = self.purge(min_synced);
        let keys: alloc::vec::Vec<String> = self.rht.iter().map(|(k, _)| String::from(k)).collect();
        for k in &keys {
            if let Some(v) = self.rht.get_mut(k) {
                count += crate::element::purge_deep(v, min_synced);
            }
        }
        count
    }

    /// Render as `{"k":v,...}` with keys in sorted order (already the RHT's
    /// iteration order).
    pub fn to_json(&self) -> String {
        let mut out = String::from("{");
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push('"');
            out.push_str(k);
            out.push_str("\":");
            out.push_str(&v.to_json());
        }
        out.push('}');
        out
    }

    /// Checks this object's own tombstone ordering, then recurses into
    /// every live value.
    #[cfg(debug_assertions)]
    pub fn dbg_invariants(&mut self) -> bool {
        if !self.removed_at.map(|r| r > self.created_at).unwrap_or(true) {
            return false;
        }
        let keys: alloc::vec::Vec<String> = self.rht.iter().map(|(k, _)| String::from(k)).collect();
        for k in &keys {
            if let Some(v) = self.rht.get_mut(k) {
                if !v.dbg_invariants() {
                    return false;
                }
            }
        }
        true
    }
}
