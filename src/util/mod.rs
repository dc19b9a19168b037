//! Ordered and indexed data structures used throughout the document core:
//! splay tree, left-leaning red-black tree, RHT, and index tree. Each is
//! self-contained and independently tested; the CRDT-facing modules compose
//! them rather than reimplementing tree mechanics.

pub mod index_tree;
pub mod llrb;
pub mod rht;
pub mod splay;

pub use index_tree::IndexTree;
pub use llrb::LLRBTree;
pub use rht::RHT;
pub use splay::SplayTree;
