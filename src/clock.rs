//! Lamport clock and replica identity.
//!
//! Every mutation in a document is timestamped with a [`TimeTicket`]: a
//! Lamport counter paired with a per-change delimiter and the actor that
//! issued it. Tickets are totally ordered, which is what lets two replicas
//! that applied the same set of changes in different order converge on the
//! same document: ties are broken structurally rather than by wall-clock
//! time.
//!
//! # Example
//!
//! ```
//! use crdt_document::clock::{ActorID, ChangeContext, ChangeID};
//!
//! let actor = ActorID::new([1; 12]);
//! let mut ctx = ChangeContext::new(ChangeID::initial(actor));
//!
//! let t1 = ctx.issue_time_ticket();
//! let t2 = ctx.issue_time_ticket();
//! assert!(t2.after(&t1));
//! ```

use core::cmp::Ordering;
use core::fmt;

use alloc::vec::Vec;

use crate::operation::Operation;

/// A 12-byte opaque replica identifier, displayed as 24 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActorID([u8; 12]);

impl ActorID {
    /// Build an actor id from raw bytes.
    pub const fn new(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// The all-zero actor id, used for initial/placeholder tickets.
    pub const fn initial() -> Self {
        Self([0; 12])
    }

    /// Raw bytes of the id.
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Render as the 24-character lowercase hex string used on the wire.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(24);
        for b in self.0 {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }

    /// Parse a 24-character hex string back into an actor id.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 24 {
            return None;
        }
        let mut out = [0u8; 12];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let byte_str = core::str::from_utf8(chunk).ok()?;
            out[i] = u8::from_str_radix(byte_str, 16).ok()?;
        }
        Some(Self(out))
    }
}

impl fmt::Display for ActorID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A Lamport-ordered timestamp: `(lamport, delimiter, actor)`.
///
/// Comparison is lexicographic over `(lamport, delimiter, actor_id)`, with a
/// missing actor (`None`) sorting before any present actor. This is the
/// total order every CRDT conflict rule in this crate resolves ties with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeTicket {
    lamport: u64,
    delimiter: u32,
    actor_id: Option<ActorID>,
}

impl TimeTicket {
    /// The smallest possible ticket: `(0, 0, None)`.
    pub const fn initial() -> Self {
        Self {
            lamport: 0,
            delimiter: 0,
            actor_id: None,
        }
    }

    /// A sentinel ticket greater than any ticket a real clock will ever
    /// issue. Used as an exclusive upper bound during bulk range operations.
    pub const fn max() -> Self {
        Self {
            lamport: u64::MAX,
            delimiter: u32::MAX,
            actor_id: None,
        }
    }

    /// Construct a ticket directly; used when replaying a ticket received
    /// from a remote peer.
    pub const fn new(lamport: u64, delimiter: u32, actor_id: Option<ActorID>) -> Self {
        Self {
            lamport,
            delimiter,
            actor_id,
        }
    }

    /// The Lamport scalar.
    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    /// The per-change delimiter (distinguishes multiple tickets issued at
    /// the same lamport value within one change).
    pub fn delimiter(&self) -> u32 {
        self.delimiter
    }

    /// The issuing actor, if any.
    pub fn actor_id(&self) -> Option<ActorID> {
        self.actor_id
    }

    /// `true` iff `self` comes strictly after `other` in the total order.
    pub fn after(&self, other: &Self) -> bool {
        self > other
    }

    /// Return a copy of this ticket with a different delimiter.
    pub fn with_delimiter(&self, delimiter: u32) -> Self {
        Self { delimiter, ..*self }
    }
}

impl PartialOrd for TimeTicket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeTicket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lamport
            .cmp(&other.lamport)
            .then_with(|| self.delimiter.cmp(&other.delimiter))
            .then_with(|| match (&self.actor_id, &other.actor_id) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.to_hex().cmp(&b.to_hex()),
            })
    }
}

impl fmt::Display for TimeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.lamport,
            self.delimiter,
            self.actor_id.map(|a| a.to_hex()).unwrap_or_default()
        )
    }
}

/// Wire-facing ticket shape: lamport as a decimal string so it round-trips
/// through JSON without precision loss, delimiter as `u32`, actor id as 24
/// hex chars or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeTicketStruct {
    /// Decimal-encoded Lamport value.
    pub lamport: String,
    /// Per-change delimiter.
    pub delimiter: u32,
    /// 24-hex actor id, or empty if absent.
    pub actor_id: String,
}

impl From<TimeTicket> for TimeTicketStruct {
    fn from(t: TimeTicket) -> Self {
        Self {
            lamport: t.lamport.to_string(),
            delimiter: t.delimiter,
            actor_id: t.actor_id.map(|a| a.to_hex()).unwrap_or_default(),
        }
    }
}

impl TryFrom<TimeTicketStruct> for TimeTicket {
    type Error = core::num::ParseIntError;

    fn try_from(s: TimeTicketStruct) -> Result<Self, Self::Error> {
        let lamport = s.lamport.parse()?;
        let actor_id = if s.actor_id.is_empty() {
            None
        } else {
            ActorID::from_hex(&s.actor_id)
        };
        Ok(Self {
            lamport,
            delimiter: s.delimiter,
            actor_id,
        })
    }
}

/// `(client_seq, lamport, actor)`, monotone per actor, identifies a
/// [`Change`](crate::operation::Change).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangeID {
    client_seq: u32,
    lamport: u64,
    actor: ActorID,
}

impl ChangeID {
    /// The first change id an actor issues.
    pub const fn initial(actor: ActorID) -> Self {
        Self {
            client_seq: 0,
            lamport: 0,
            actor,
        }
    }

    /// Build a change id directly (e.g. when replaying a remote change).
    pub const fn new(client_seq: u32, lamport: u64, actor: ActorID) -> Self {
        Self {
            client_seq,
            lamport,
            actor,
        }
    }

    /// The next change id for the same actor: bumps `client_seq` and
    /// advances `lamport` past `observed_lamport` (the highest lamport
    /// value observed so far, local or remote).
    pub fn next(&self, observed_lamport: u64) -> Self {
        Self {
            client_seq: self.client_seq + 1,
            lamport: self.lamport.max(observed_lamport) + 1,
            actor: self.actor,
        }
    }

    /// This change's client sequence number.
    pub fn client_seq(&self) -> u32 {
        self.client_seq
    }

    /// The Lamport value this change's first ticket was minted from.
    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    /// The actor that authored this change.
    pub fn actor(&self) -> ActorID {
        self.actor
    }
}

/// `(server_seq, client_seq)`, the server's view of sync progress for one
/// client, exchanged in a [`ChangePack`](crate::operation::ChangePack).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Checkpoint {
    server_seq: u64,
    client_seq: u32,
}

impl Checkpoint {
    /// The zero checkpoint, used before any sync has happened.
    pub const fn initial() -> Self {
        Self {
            server_seq: 0,
            client_seq: 0,
        }
    }

    /// Build a checkpoint directly.
    pub const fn new(server_seq: u64, client_seq: u32) -> Self {
        Self {
            server_seq,
            client_seq,
        }
    }

    /// The server sequence component.
    pub fn server_seq(&self) -> u64 {
        self.server_seq
    }

    /// The client sequence component.
    pub fn client_seq(&self) -> u32 {
        self.client_seq
    }

    /// Return a checkpoint advanced to a new server sequence.
    pub fn with_server_seq(&self, server_seq: u64) -> Self {
        Self {
            server_seq,
            ..*self
        }
    }

    /// Return a checkpoint advanced by one client sequence (a local change
    /// was created and is pending push).
    pub fn increased_client_seq(&self) -> Self {
        Self {
            client_seq: self.client_seq + 1,
            ..*self
        }
    }
}

/// The per-change ticket generator.
///
/// A `ChangeContext` is opened for the duration of one local mutation
/// session (see [`Document::update`](crate::document::Document::update))
/// and is the *only* mutable ticket-issuing state in the crate; there is
/// no process-global clock.
pub struct ChangeContext {
    id: ChangeID,
    lamport: u64,
    delimiter: u32,
    first_ticket_issued: bool,
    message: Option<String>,
    operations: Vec<Operation>,
    size_delta: i64,
    created_count: usize,
    removed_count: usize,
    gc_pairs: Vec<(TimeTicket, TimeTicket)>,
}

impl ChangeContext {
    /// Open a context bound to `id`. `id.lamport()` seeds the starting
    /// lamport value; the first [`issue_time_ticket`](Self::issue_time_ticket)
    /// call bumps it to `max(lamport, id.lamport()) + 1`.
    pub fn new(id: ChangeID) -> Self {
        Self {
            lamport: id.lamport(),
            id,
            delimiter: 0,
            first_ticket_issued: false,
            message: None,
            operations: Vec::new(),
            size_delta: 0,
            created_count: 0,
            removed_count: 0,
            gc_pairs: Vec::new(),
        }
    }

    /// Record `op` as part of the change this context is building. A
    /// session pushes the operation right after performing the matching
    /// mutation, so the two can never drift apart the way a
    /// separately-returned operation list could.
    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    /// Take the operations recorded so far via [`push`](Self::push),
    /// leaving the context's own list empty. Called once, by
    /// [`Document::update`](crate::document::Document::update), when the
    /// session closure returns successfully.
    pub fn take_operations(&mut self) -> Vec<Operation> {
        core::mem::take(&mut self.operations)
    }

    /// Index a newly created element for observability. `parent` is the
    /// ticket of the container it was just inserted into.
    pub fn register_element(&mut self, _elem_created_at: TimeTicket, _parent: TimeTicket) {
        self.created_count += 1;
    }

    /// Note that an element was tombstoned during this session, eligible
    /// for a future `garbage_collect` once its watermark is surpassed.
    pub fn register_removed_element(&mut self, _elem_created_at: TimeTicket) {
        self.removed_count += 1;
    }

    /// Note a `(parent, child)` pair now eligible for GC together (e.g. an
    /// RHT value shadowed by a newer write). This crate's purge walks each
    /// container's own tombstones directly rather than consulting a
    /// separate registry (see `Tree::purge`/`Object::purge_deep`), so this
    /// is bookkeeping for observability, not a correctness dependency.
    pub fn register_gc_pair(&mut self, parent: TimeTicket, child: TimeTicket) {
        self.gc_pairs.push((parent, child));
    }

    /// Accumulate a document size delta (bytes or element count, at the
    /// caller's discretion) for observability.
    pub fn acc(&mut self, diff: i64) {
        self.size_delta += diff;
    }

    /// The accumulated size delta so far.
    pub fn size_delta(&self) -> i64 {
        self.size_delta
    }

    /// Elements registered via [`register_element`](Self::register_element)
    /// this session.
    pub fn created_count(&self) -> usize {
        self.created_count
    }

    /// Elements registered via
    /// [`register_removed_element`](Self::register_removed_element) this
    /// session.
    pub fn removed_count(&self) -> usize {
        self.removed_count
    }

    /// GC pairs registered via [`register_gc_pair`](Self::register_gc_pair)
    /// this session.
    pub fn gc_pairs(&self) -> &[(TimeTicket, TimeTicket)] {
        &self.gc_pairs
    }

    /// Attach a human-readable message to the eventual `Change`.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Take the message set via [`set_message`](Self::set_message), if any.
    pub fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }

    /// This context's change id.
    pub fn id(&self) -> ChangeID {
        self.id
    }

    /// Issue the next ticket for this context.
    ///
    /// The first call in a context bumps `lamport := max(lamport,
    /// id.lamport()) + 1`; every call thereafter only increments the
    /// delimiter, keeping all tickets within one change at the same lamport
    /// value but in issue order.
    pub fn issue_time_ticket(&mut self) -> TimeTicket {
        if !self.first_ticket_issued {
            self.lamport += 1;
            self.first_ticket_issued = true;
        }
        let delimiter = self.delimiter;
        self.delimiter += 1;
        TimeTicket::new(self.lamport, delimiter, Some(self.id.actor()))
    }

    /// The lamport value this context is (or will be) stamped with.
    pub fn lamport(&self) -> u64 {
        self.lamport
    }
}
