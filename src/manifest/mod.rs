//! Manifest edits: the durable description of version changes.
//!
//! The manifest is essentially a WAL for database metadata instead of user
//! data. While the data WAL tracks changes to key-value pairs, the manifest
//! tracks changes to the tree structure itself - which tables exist, at what
//! levels, and the counters needed to resume numbering after a restart. On
//! startup the engine replays the manifest, accumulating every edit into a
//! [`BulkVersionEdit`] and applying the result to reconstruct the current
//! [`crate::version::Version`].
//!
//! # Wire Format
//!
//! Each edit is one record (record framing is the log writer's concern, not
//! handled here) holding a stream of `(uvarint tag, payload)` pairs in any
//! order, terminated by the end of the record:
//!
//! ```text
//! +-----+------------------------+------------------------------------+
//! | tag | field                  | payload                            |
//! +-----+------------------------+------------------------------------+
//! |   1 | comparator name        | length-prefixed bytes              |
//! |   2 | min unflushed log num  | uvarint                            |
//! |   3 | next file num          | uvarint                            |
//! |   4 | last sequence num      | uvarint                            |
//! |   5 | compact pointer        | obsolete; consumed and discarded   |
//! |   6 | deleted file           | uvarint level, uvarint file num    |
//! |   7 | new file (v1)          | level, file num, size, two keys    |
//! |   9 | obsolete prev log num  | uvarint                            |
//! | 100 | new file (v2)          | v1 plus the sequence number range  |
//! | 102 | new file (v3)          | v2 plus a path id (must be zero)   |
//! | 103 | new file (v4)          | v2 plus a custom-tag sub-stream    |
//! +-----+------------------------+------------------------------------+
//! ```
//!
//! Tags 200-203 describe column families, which this engine does not
//! support; they fail decoding. Inside a v4 entry the custom sub-stream
//! carries `(uvarint tag, length-prefixed field)` pairs until the terminator
//! tag 1: tag 2 is the needs-compaction marker, tag 6 the creation time.
//! Unknown custom tags with bit 6 set are fatal, others are skipped.
//!
//! Encoding emits v4 only when a custom field is non-default, and upgrades
//! v1 and v3 entries to v2 on the next write.

pub mod coding;
pub mod edit;

pub use edit::{BulkVersionEdit, DeletedFileEntry, NewFileEntry, VersionEdit};
