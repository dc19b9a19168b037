//! Register Hash Table: a per-key last-writer-wins map keyed by
//! [`TimeTicket`], used for object fields, text style attributes, and tree
//! node attributes alike.
//!
//! A plain `BTreeMap<String, V>` cannot express "newer ticket wins,
//! everything else is rejected (not merged) and the loser becomes GC-able";
//! that's what this type adds on top.

use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::clock::TimeTicket;

/// One RHT entry: the live or tombstoned value for a key.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    updated_at: TimeTicket,
    removed_at: Option<TimeTicket>,
}

/// The outcome of [`RHT::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// The write was newer than any existing entry for the key and was
    /// applied. If a live entry was shadowed, its ticket is returned so the
    /// caller can register a GC pair for it.
    Applied {
        /// The ticket of the value this write shadowed, if any.
        shadowed: Option<TimeTicket>,
    },
    /// The write was older than (or equal to) the current entry for the
    /// key and was rejected: last-writer-wins, older writes lose silently.
    Rejected,
}

/// A last-writer-wins register map keyed by string, ordered by
/// [`TimeTicket`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RHT<V> {
    #[cfg_attr(feature = "serde", serde(bound = ""))]
    entries: BTreeMap<String, RhtEntryWire<V>>,
}

// Kept as a thin newtype so the `serde` derive above doesn't need to reach
// into the private `Entry` type.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct RhtEntryWire<V>(Entry<V>);

impl<V> Default for RHT<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RHT<V> {
    /// An empty RHT.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Number of keys with a live (non-removed) entry.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.0.removed_at.is_none()).count()
    }

    /// `true` if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The live value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|e| e.0.removed_at.is_none())
            .map(|e| &e.0.value)
    }

    /// The live value for `key`, mutably, if any.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .get_mut(key)
            .filter(|e| e.0.removed_at.is_none())
            .map(|e| &mut e.0.value)
    }

    /// Set `key` to `value` with the given ticket. Last-writer-wins: if an
    /// existing live entry has a ticket `>= ticket`, the write is rejected.
    pub fn set(&mut self, key: impl Into<String>, value: V, ticket: TimeTicket) -> SetOutcome {
        let key = key.into();
        match self.entries.get(&key) {
            Some(existing) if existing.0.removed_at.is_none() && existing.0.updated_at >= ticket => {
                SetOutcome::Rejected
            }
            Some(existing) if existing.0.removed_at.is_none() => {
                let shadowed = existing.0.updated_at;
                self.entries.insert(
                    key,
                    RhtEntryWire(Entry {
                        value,
                        updated_at: ticket,
                        removed_at: None,
                    }),
                );
                SetOutcome::Applied {
                    shadowed: Some(shadowed),
                }
            }
            _ => {
                self.entries.insert(
                    key,
                    RhtEntryWire(Entry {
                        value,
                        updated_at: ticket,
                        removed_at: None,
                    }),
                );
                SetOutcome::Applied { shadowed: None }
            }
        }
    }

    /// Remove `key` (tombstone its live entry) at `ticket`. Returns the
    /// ticket of the value that was removed, for GC-pair bookkeeping.
    /// No-op (returns `None`) if the key has no live entry, or if `ticket`
    /// does not come after the entry's `updated_at`.
    pub fn remove(&mut self, key: &str, ticket: TimeTicket) -> Option<TimeTicket> {
        let entry = self.entries.get_mut(key)?;
        if entry.0.removed_at.is_some() || ticket <= entry.0.updated_at {
            return None;
        }
        let shadowed = entry.0.updated_at;
        entry.0.removed_at = Some(ticket);
        Some(shadowed)
    }

    /// Iterate over live `(key, value)` pairs in key order, already sorted
    /// the way `to_sorted_json` needs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.0.removed_at.is_none())
            .map(|(k, e)| (k.as_str(), &e.0.value))
    }

    /// Purge tombstoned entries whose `removed_at <= min_synced`. Returns
    /// the purged count.
    pub fn purge(&mut self, min_synced: TimeTicket) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.0.removed_at.map(|r| r > min_synced).unwrap_or(true));
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ActorID;

    fn t(lamport: u64) -> TimeTicket {
        TimeTicket::new(lamport, 0, Some(ActorID::new([1; 12])))
    }

    #[test]
    fn newer_write_wins() {
        let mut rht: RHT<&str> = RHT::new();
        assert_eq!(
            rht.set("k", "v1", t(1)),
            SetOutcome::Applied { shadowed: None }
        );
        assert_eq!(rht.get("k"), Some(&"v1"));

        let outcome = rht.set("k", "v2", t(2));
        assert_eq!(
            outcome,
            SetOutcome::Applied {
                shadowed: Some(t(1))
            }
        );
        assert_eq!(rht.get("k"), Some(&"v2"));
    }

    #[test]
    fn older_write_rejected_silently() {
        let mut rht: RHT<&str> = RHT::new();
        rht.set("k", "v2", t(5));
        let outcome = rht.set("k", "stale", t(2));
        assert_eq!(outcome, SetOutcome::Rejected);
        assert_eq!(rht.get("k"), Some(&"v2"));
    }

    #[test]
    fn remove_requires_newer_ticket() {
        let mut rht: RHT<&str> = RHT::new();
        rht.set("k", "v", t(3));
        assert_eq!(rht.remove("k", t(1)), None);
        assert_eq!(rht.get("k"), Some(&"v"));
        assert_eq!(rht.remove("k", t(5)), Some(t(3)));
        assert_eq!(rht.get("k"), None);
    }

    #[test]
    fn purge_drops_only_old_tombstones() {
        let mut rht: RHT<&str> = RHT::new();
        rht.set("a", "1", t(1));
        rht.remove("a", t(2));
        rht.set("b", "2", t(3));
        rht.remove("b", t(10));

        assert_eq!(rht.purge(t(5)), 1);
        assert_eq!(rht.len(), 0); // both keys are tombstoned (one purged)
        assert_eq!(rht.purge(t(20)), 1);
        assert_eq!(rht.purge(t(20)), 0);
    }

    #[test]
    fn iter_yields_only_live_entries_sorted_by_key() {
        let mut rht: RHT<i32> = RHT::new();
        rht.set("b", 2, t(1));
        rht.set("a", 1, t(2));
        rht.set("c", 3, t(3));
        rht.remove("b", t(4));

        let got: alloc::vec::Vec<_> = rht.iter().collect();
        assert_eq!(got, alloc::vec![("a", &1), ("c", &3)]);
    }
}
