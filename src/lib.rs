//! Version and compaction core of a log-structured merge-tree storage
//! engine.
//!
//! This crate owns the in-memory description of which sorted tables exist at
//! each level of the tree, the transactional edits that move that description
//! forward, and the policy that decides what to compact next. It reads and
//! writes no table data itself: table IO, the WAL, and memtables live with
//! the surrounding engine, which drives this crate through a small number of
//! choke points.
//!
//! # Structure
//!
//! ```text
//!  flush / compaction result
//!            │
//!            ▼
//!     ┌──────────────┐ accumulate ┌─────────────────┐
//!     │ VersionEdit  ├───────────►│ BulkVersionEdit │
//!     └──────┬───────┘            └────────┬────────┘
//!            │ encode/decode               │ apply
//!            ▼                             ▼
//!     ┌──────────────┐            ┌─────────────────┐   ┌─────────────┐
//!     │  manifest    │            │ Version (new)   ├──►│ VersionList │
//!     │  record      │            │ + zombie files  │   └─────────────┘
//!     └──────────────┘            └────────┬────────┘
//!                                          │ pick
//!                                          ▼
//!                                 ┌─────────────────┐
//!                                 │   Compaction    │
//!                                 └─────────────────┘
//! ```
//!
//! Versions are immutable once published: readers walk their levels and
//! level-0 sublevels without locking, and reference counts decide when a
//! superseded version (and the files only it references) can go away.
//!
//! The version state is persisted as a stream of [`manifest::VersionEdit`]
//! records; see [`manifest`] for the wire format.

pub mod compaction;
pub mod config;
pub mod error;
pub mod key;
pub mod manifest;
pub mod version;

pub use compaction::{pick_auto, pick_intra_l0, pick_l0_to_base, Compaction};
pub use config::CompactionConfig;
pub use error::{Error, Result};
pub use key::{internal_compare, BytewiseComparator, Comparator, InternalKey};
pub use manifest::{BulkVersionEdit, DeletedFileEntry, NewFileEntry, VersionEdit};
pub use version::{FileMetadata, L0Sublevels, Version, VersionList, NUM_LEVELS};
