use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::key::InternalKey;

/// Metadata for one on-disk sorted table.
///
/// The descriptive fields are fixed once the metadata is published into a
/// version; only the reference count and the compaction markers change after
/// that, and they change atomically. Instances are shared across successive
/// versions by `Arc`, identified by file number.
pub struct FileMetadata {
    /// Globally unique file number.
    pub file_num: u64,
    /// Size of the file, in bytes.
    pub size: u64,
    /// Inclusive bounds for the internal keys stored in the table.
    pub smallest: InternalKey,
    pub largest: InternalKey,
    /// Range of sequence numbers present in the table.
    pub smallest_seq_num: u64,
    pub largest_seq_num: u64,
    /// True if the writer asked for this file to be compacted soon.
    pub marked_for_compaction: bool,
    /// Creation time in seconds since the epoch; 0 when unknown.
    pub creation_time: u64,

    // Runtime bookkeeping, excluded from equality and cloning.
    refs: AtomicU32,
    compacting: AtomicBool,
    intra_l0_compacting: AtomicBool,
}

impl FileMetadata {
    pub fn new(
        file_num: u64,
        size: u64,
        smallest: InternalKey,
        largest: InternalKey,
        smallest_seq_num: u64,
        largest_seq_num: u64,
    ) -> Self {
        Self {
            file_num,
            size,
            smallest,
            largest,
            smallest_seq_num,
            largest_seq_num,
            marked_for_compaction: false,
            creation_time: 0,
            refs: AtomicU32::new(0),
            compacting: AtomicBool::new(false),
            intra_l0_compacting: AtomicBool::new(false),
        }
    }

    /// Set the marked-for-compaction hint
    pub fn marked_for_compaction(mut self, marked: bool) -> Self {
        self.marked_for_compaction = marked;
        self
    }

    /// Set the creation time
    pub fn creation_time(mut self, creation_time: u64) -> Self {
        self.creation_time = creation_time;
        self
    }

    /// Number of versions (and short-lived holders) referencing this file.
    /// When it drops to zero the physical file is eligible for deletion.
    pub fn refs(&self) -> u32 {
        self.refs.load(Ordering::SeqCst)
    }

    pub fn retain(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    /// Drops one reference, returning the remaining count.
    pub fn release(&self) -> u32 {
        self.refs.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// True while an L->L+1 compaction reads this file.
    pub fn is_compacting(&self) -> bool {
        self.compacting.load(Ordering::SeqCst)
    }

    pub fn set_compacting(&self, compacting: bool) {
        self.compacting.store(compacting, Ordering::SeqCst);
    }

    /// True while an intra-level-0 compaction reads this file.
    pub fn is_intra_l0_compacting(&self) -> bool {
        self.intra_l0_compacting.load(Ordering::SeqCst)
    }

    pub fn set_intra_l0_compacting(&self, compacting: bool) {
        self.intra_l0_compacting.store(compacting, Ordering::SeqCst);
    }
}

// Equality covers only the published fields: the runtime state of two
// logically identical descriptors may differ.
impl PartialEq for FileMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.file_num == other.file_num
            && self.size == other.size
            && self.smallest == other.smallest
            && self.largest == other.largest
            && self.smallest_seq_num == other.smallest_seq_num
            && self.largest_seq_num == other.largest_seq_num
            && self.marked_for_compaction == other.marked_for_compaction
            && self.creation_time == other.creation_time
    }
}

impl Eq for FileMetadata {}

impl Clone for FileMetadata {
    fn clone(&self) -> Self {
        Self {
            file_num: self.file_num,
            size: self.size,
            smallest: self.smallest.clone(),
            largest: self.largest.clone(),
            smallest_seq_num: self.smallest_seq_num,
            largest_seq_num: self.largest_seq_num,
            marked_for_compaction: self.marked_for_compaction,
            creation_time: self.creation_time,
            refs: AtomicU32::new(0),
            compacting: AtomicBool::new(false),
            intra_l0_compacting: AtomicBool::new(false),
        }
    }
}

impl fmt::Debug for FileMetadata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:[{:?}-{:?}]",
            self.file_num, self.smallest, self.largest
        )
    }
}

/// Total size in bytes of all the given files.
pub fn total_size(files: &[Arc<FileMetadata>]) -> u64 {
    files.iter().map(|f| f.size).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{kind, InternalKey};

    fn create_test_meta(file_num: u64) -> FileMetadata {
        FileMetadata::new(
            file_num,
            1024,
            InternalKey::new(b"a".to_vec(), 1, kind::SET),
            InternalKey::new(b"z".to_vec(), 9, kind::SET),
            1,
            9,
        )
    }

    #[test]
    fn test_refs_lifecycle() {
        let meta = create_test_meta(1);
        assert_eq!(meta.refs(), 0);
        meta.retain();
        meta.retain();
        assert_eq!(meta.refs(), 2);
        assert_eq!(meta.release(), 1);
        assert_eq!(meta.release(), 0);
    }

    #[test]
    fn test_equality_ignores_runtime_state() {
        let a = create_test_meta(1);
        let b = create_test_meta(1);
        a.retain();
        a.set_compacting(true);
        assert_eq!(a, b);
    }

    #[test]
    fn test_clone_resets_runtime_state() {
        let a = create_test_meta(1);
        a.retain();
        a.set_intra_l0_compacting(true);
        let b = a.clone();
        assert_eq!(b.refs(), 0);
        assert!(!b.is_intra_l0_compacting());
        assert_eq!(a, b);
    }

    #[test]
    fn test_builder_hints() {
        let meta = create_test_meta(3).marked_for_compaction(true).creation_time(17);
        assert!(meta.marked_for_compaction);
        assert_eq!(meta.creation_time, 17);
    }

    #[test]
    fn test_total_size() {
        let files = vec![Arc::new(create_test_meta(1)), Arc::new(create_test_meta(2))];
        assert_eq!(total_size(&files), 2048);
    }
}
