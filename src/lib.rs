//! # crdt-document
//!
//! A CRDT document core for real-time collaborative editing: a JSON-like
//! document (objects, arrays, primitives, counters) plus text and tree
//! elements backed by RGA-style CRDTs, all timestamped by a Lamport clock
//! and replayable from a change log.
//!
//! A CRDT (Conflict-free Replicated Data Type) lets replicas mutate a
//! document independently and merge later without coordination: applying
//! the same set of changes in any order converges on the same document.
//! This crate provides the document model and the change pipeline; it does
//! not provide networking, persistence, or a CLI; callers own those.
//!
//! ## `no_std` Support
//!
//! This crate supports `no_std` environments via the `alloc` crate. Disable
//! the default `std` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! crdt-document = { version = "0.1", default-features = false }
//! ```
//!
//! ## Layout
//!
//! - [`clock`]: Lamport clock, actor identity, change ids.
//! - [`util`]: splay tree, LLRB tree, RHT, index tree.
//! - [`element`]: the CRDT element model: primitives, counters, objects,
//!   arrays.
//! - [`text`]: the RGA-tree-split text CRDT.
//! - [`tree`]: the CRDT tree (XML-like structured content).
//! - [`operation`]: operations, changes, and change packs.
//! - [`document`]: the `Document` facade: update sessions, change packs,
//!   garbage collection.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod clock;
pub mod document;
pub mod element;
pub mod error;
pub mod operation;
pub mod text;
pub mod tree;
pub mod util;

pub use document::Document;
pub use error::{DocumentError, Result};
