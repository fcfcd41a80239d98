use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;

use crate::error::Result;
use crate::key::{internal_compare, Comparator, InternalKey};
use crate::manifest::coding::{full_uvarint, put_length_prefixed, put_uvarint, Decoder};
use crate::version::{FileMetadata, L0Sublevels, Version, NUM_LEVELS};
use crate::{errconsistency, errcorrupt};

// Tags for the version-edit disk format. Tag 8 is no longer used.
const TAG_COMPARATOR: u64 = 1;
const TAG_LOG_NUM: u64 = 2;
const TAG_NEXT_FILE_NUM: u64 = 3;
const TAG_LAST_SEQ_NUM: u64 = 4;
const TAG_COMPACT_POINTER: u64 = 5;
const TAG_DELETED_FILE: u64 = 6;
const TAG_NEW_FILE: u64 = 7;
const TAG_PREV_LOG_NUM: u64 = 9;
const TAG_NEW_FILE2: u64 = 100;
const TAG_NEW_FILE3: u64 = 102;
const TAG_NEW_FILE4: u64 = 103;
const TAG_COLUMN_FAMILY: u64 = 200;
const TAG_MAX_COLUMN_FAMILY: u64 = 203;

// The custom-tag sub-format used by TAG_NEW_FILE4.
const CUSTOM_TAG_TERMINATE: u64 = 1;
const CUSTOM_TAG_NEEDS_COMPACTION: u64 = 2;
const CUSTOM_TAG_CREATION_TIME: u64 = 6;
const CUSTOM_TAG_PATH_ID: u64 = 65;
const CUSTOM_TAG_NON_SAFE_IGNORE_MASK: u64 = 1 << 6;

/// A file deleted from a level. The file itself may still be referenced by
/// an addition at another level (a move).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeletedFileEntry {
    pub level: usize,
    pub file_num: u64,
}

/// A file added to a level, or moved there from a different level.
#[derive(Clone, Debug, PartialEq)]
pub struct NewFileEntry {
    pub level: usize,
    pub meta: Arc<FileMetadata>,
}

/// One transactional delta to the version state, as stored in the manifest.
///
/// An edit carries file additions and deletions plus the bookkeeping counters
/// the engine persists alongside them (log numbers, the next file number, and
/// the last sequence number). The comparator name is only present in the
/// first edit of a manifest and is used to verify that the store reopens with
/// the comparator it was created with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VersionEdit {
    pub comparator_name: Option<String>,

    /// Smallest log file number whose mutations have not been flushed to a
    /// table. 0 when unset.
    pub min_unflushed_log_num: u64,

    /// Historic LevelDB field, unused for decades but kept in the format.
    pub obsolete_prev_log_num: u64,

    /// The next file number. A single counter assigns numbers for log,
    /// manifest, and table files.
    pub next_file_num: u64,

    /// Upper bound on the sequence numbers present in flushed tables.
    pub last_seq_num: u64,

    // Deletions are a sorted set so the encoding is deterministic and a
    // decode/encode round trip is byte-identical.
    pub deleted_files: BTreeSet<DeletedFileEntry>,
    pub new_files: Vec<NewFileEntry>,
}

impl VersionEdit {
    /// Encodes the edit as one manifest record. Framing is the caller's
    /// concern; this writes only the `(tag, payload)` stream.
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut buf = Vec::new();
        if let Some(name) = &self.comparator_name {
            put_uvarint(&mut buf, TAG_COMPARATOR);
            put_length_prefixed(&mut buf, name.as_bytes());
        }
        if self.min_unflushed_log_num != 0 {
            put_uvarint(&mut buf, TAG_LOG_NUM);
            put_uvarint(&mut buf, self.min_unflushed_log_num);
        }
        if self.obsolete_prev_log_num != 0 {
            put_uvarint(&mut buf, TAG_PREV_LOG_NUM);
            put_uvarint(&mut buf, self.obsolete_prev_log_num);
        }
        if self.next_file_num != 0 {
            put_uvarint(&mut buf, TAG_NEXT_FILE_NUM);
            put_uvarint(&mut buf, self.next_file_num);
        }
        // The last sequence number is always written in the first edit of a
        // manifest (signaled by the comparator name), even when zero, for
        // compatibility with readers that require it there.
        if self.last_seq_num != 0 || self.comparator_name.is_some() {
            put_uvarint(&mut buf, TAG_LAST_SEQ_NUM);
            put_uvarint(&mut buf, self.last_seq_num);
        }
        for deleted in &self.deleted_files {
            put_uvarint(&mut buf, TAG_DELETED_FILE);
            put_uvarint(&mut buf, deleted.level as u64);
            put_uvarint(&mut buf, deleted.file_num);
        }
        for entry in &self.new_files {
            let meta = &entry.meta;
            let custom_fields = meta.marked_for_compaction || meta.creation_time != 0;
            if custom_fields {
                put_uvarint(&mut buf, TAG_NEW_FILE4);
            } else {
                put_uvarint(&mut buf, TAG_NEW_FILE2);
            }
            put_uvarint(&mut buf, entry.level as u64);
            put_uvarint(&mut buf, meta.file_num);
            put_uvarint(&mut buf, meta.size);
            put_length_prefixed(&mut buf, &meta.smallest.encode());
            put_length_prefixed(&mut buf, &meta.largest.encode());
            put_uvarint(&mut buf, meta.smallest_seq_num);
            put_uvarint(&mut buf, meta.largest_seq_num);
            if custom_fields {
                if meta.creation_time != 0 {
                    put_uvarint(&mut buf, CUSTOM_TAG_CREATION_TIME);
                    let mut field = Vec::new();
                    put_uvarint(&mut field, meta.creation_time);
                    put_length_prefixed(&mut buf, &field);
                }
                if meta.marked_for_compaction {
                    put_uvarint(&mut buf, CUSTOM_TAG_NEEDS_COMPACTION);
                    put_length_prefixed(&mut buf, &[1]);
                }
                put_uvarint(&mut buf, CUSTOM_TAG_TERMINATE);
            }
        }
        w.write_all(&buf)?;
        Ok(())
    }

    /// Decodes one framed manifest record.
    pub fn decode(record: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(record);
        let mut edit = VersionEdit::default();
        while !d.done() {
            let tag = d.read_uvarint()?;
            match tag {
                TAG_COMPARATOR => {
                    let name = d.read_bytes()?;
                    edit.comparator_name = Some(String::from_utf8_lossy(name).into_owned());
                }

                TAG_LOG_NUM => edit.min_unflushed_log_num = d.read_uvarint()?,

                TAG_NEXT_FILE_NUM => edit.next_file_num = d.read_uvarint()?,

                TAG_LAST_SEQ_NUM => edit.last_seq_num = d.read_uvarint()?,

                TAG_COMPACT_POINTER => {
                    // Compaction pointers are long obsolete; consume and drop.
                    read_level(&mut d)?;
                    d.read_bytes()?;
                }

                TAG_DELETED_FILE => {
                    let level = read_level(&mut d)?;
                    let file_num = d.read_uvarint()?;
                    edit.deleted_files.insert(DeletedFileEntry { level, file_num });
                }

                TAG_NEW_FILE | TAG_NEW_FILE2 | TAG_NEW_FILE3 | TAG_NEW_FILE4 => {
                    let level = read_level(&mut d)?;
                    let file_num = d.read_uvarint()?;
                    if tag == TAG_NEW_FILE3 {
                        let path_id = d.read_uvarint()?;
                        if path_id != 0 {
                            return errcorrupt!("new-file3: non-zero path id {path_id}");
                        }
                    }
                    let size = d.read_uvarint()?;
                    let smallest = InternalKey::decode(d.read_bytes()?);
                    let largest = InternalKey::decode(d.read_bytes()?);
                    let (smallest_seq_num, largest_seq_num) = if tag != TAG_NEW_FILE {
                        (d.read_uvarint()?, d.read_uvarint()?)
                    } else {
                        (0, 0)
                    };
                    let mut marked_for_compaction = false;
                    let mut creation_time = 0;
                    if tag == TAG_NEW_FILE4 {
                        loop {
                            let custom_tag = d.read_uvarint()?;
                            if custom_tag == CUSTOM_TAG_TERMINATE {
                                break;
                            }
                            let field = d.read_bytes()?;
                            match custom_tag {
                                CUSTOM_TAG_NEEDS_COMPACTION => {
                                    if field.len() != 1 {
                                        return errcorrupt!(
                                            "new-file4: needs-compaction field wrong size"
                                        );
                                    }
                                    marked_for_compaction = field[0] == 1;
                                }
                                CUSTOM_TAG_CREATION_TIME => {
                                    creation_time = full_uvarint(field)?;
                                }
                                CUSTOM_TAG_PATH_ID => {
                                    return errcorrupt!("new-file4: path-id field not supported");
                                }
                                _ => {
                                    if custom_tag & CUSTOM_TAG_NON_SAFE_IGNORE_MASK != 0 {
                                        return errcorrupt!(
                                            "new-file4: unsupported custom field {custom_tag}"
                                        );
                                    }
                                    // Safe to ignore; field already consumed.
                                }
                            }
                        }
                    }
                    edit.new_files.push(NewFileEntry {
                        level,
                        meta: Arc::new(
                            FileMetadata::new(
                                file_num,
                                size,
                                smallest,
                                largest,
                                smallest_seq_num,
                                largest_seq_num,
                            )
                            .marked_for_compaction(marked_for_compaction)
                            .creation_time(creation_time),
                        ),
                    });
                }

                TAG_PREV_LOG_NUM => edit.obsolete_prev_log_num = d.read_uvarint()?,

                TAG_COLUMN_FAMILY..=TAG_MAX_COLUMN_FAMILY => {
                    return errcorrupt!("column families are not supported");
                }

                _ => return errcorrupt!("unknown tag {tag}"),
            }
        }
        Ok(edit)
    }
}

fn read_level(d: &mut Decoder) -> Result<usize> {
    let level = d.read_uvarint()?;
    if level >= NUM_LEVELS as u64 {
        return errcorrupt!("level {level} out of range");
    }
    Ok(level as usize)
}

/// Summarizes the additions and deletions from a run of version edits, then
/// applies them in one step to produce the next version.
#[derive(Default)]
pub struct BulkVersionEdit {
    added: [Vec<Arc<FileMetadata>>; NUM_LEVELS],
    deleted: [HashSet<u64>; NUM_LEVELS],
}

impl BulkVersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one edit's additions and deletions into the accumulated state.
    ///
    /// # Panics
    ///
    /// Panics if an edit adds a file at a level where an earlier accumulated
    /// edit already deleted it; files move between levels, never back into
    /// the level they were deleted from.
    pub fn accumulate(&mut self, edit: &VersionEdit) {
        for deleted in &edit.deleted_files {
            self.deleted[deleted.level].insert(deleted.file_num);
        }
        for entry in &edit.new_files {
            if self.deleted[entry.level].contains(&entry.meta.file_num) {
                panic!(
                    "file {} deleted at level {} before it was inserted",
                    entry.meta.file_num, entry.level
                );
            }
            self.added[entry.level].push(entry.meta.clone());
        }
    }

    /// Applies the accumulated delta to `base` (absent means empty) and
    /// returns the resulting version together with the *zombies*: files that
    /// the delta removed and that no level of the new version references,
    /// keyed by file number with their sizes. Zombie files cannot be deleted
    /// from disk while an older live version still references them.
    ///
    /// The new version retains every file it contains; dropping it releases
    /// them again, so an abandoned apply has no lasting effect.
    pub fn apply(
        &self,
        base: Option<&Version>,
        cmp: &dyn Comparator,
        flush_split_bytes: u64,
    ) -> Result<(Version, HashMap<u64, u64>)> {
        let mut zombies: HashMap<u64, u64> = HashMap::new();
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        // Reused from the base when level 0 is untouched, rebuilt otherwise.
        let mut l0_sublevels: Option<Arc<L0Sublevels>> = None;

        for level in 0..NUM_LEVELS {
            let added = &self.added[level];
            let deleted = &self.deleted[level];

            if added.is_empty() && deleted.is_empty() {
                // No edits on this level; share the base's files.
                if let Some(base) = base {
                    levels[level] = base.levels[level].clone();
                    if level == 0 {
                        l0_sublevels = Some(base.l0_sublevels.clone());
                    }
                }
                continue;
            }

            let base_files: &[Arc<FileMetadata>] =
                base.map(|b| b.levels[level].as_slice()).unwrap_or(&[]);
            if base_files.is_empty() && added.is_empty() {
                return errconsistency!(
                    "level {level} has {} deleted files but no existing or added files",
                    deleted.len()
                );
            }

            if level == 0 {
                // Level 0 tolerates overlap, so the merge is a concatenation
                // re-sorted into by-seqnum order.
                let mut files = Vec::with_capacity(base_files.len() + added.len());
                for f in base_files.iter().chain(added.iter()) {
                    if deleted.contains(&f.file_num) {
                        zombies.insert(f.file_num, f.size);
                        continue;
                    }
                    files.push(f.clone());
                }
                files.sort_by_key(|f| (f.largest_seq_num, f.file_num));
                levels[0] = files;
                continue;
            }

            // Deeper levels stay sorted and disjoint: splice the sorted
            // additions into the (already sorted) base run, verifying that
            // each splice point leaves no overlap behind.
            let mut added_sorted = added.clone();
            added_sorted.sort_by(|a, b| internal_compare(cmp, &a.smallest, &b.smallest));

            let mut remaining = base_files;
            let out = &mut levels[level];
            for f in &added_sorted {
                if deleted.contains(&f.file_num) {
                    zombies.insert(f.file_num, f.size);
                    continue;
                }
                zombies.remove(&f.file_num);
                // First base file strictly after f; everything before it
                // precedes f in the output.
                let split = remaining
                    .partition_point(|bf| {
                        internal_compare(cmp, &bf.smallest, &f.largest) != std::cmp::Ordering::Greater
                    });
                for bf in &remaining[..split] {
                    if deleted.contains(&bf.file_num) {
                        zombies.insert(bf.file_num, bf.size);
                        continue;
                    }
                    zombies.remove(&bf.file_num);
                    out.push(bf.clone());
                }
                remaining = &remaining[split..];
                if let Some(prev) = out.last() {
                    if internal_compare(cmp, &prev.largest, &f.smallest) != std::cmp::Ordering::Less
                    {
                        return errconsistency!(
                            "L{level} files {} and {} have overlapping ranges: [{}-{}] vs [{}-{}]",
                            prev.file_num,
                            f.file_num,
                            cmp.format_key(&prev.smallest.user_key),
                            cmp.format_key(&prev.largest.user_key),
                            cmp.format_key(&f.smallest.user_key),
                            cmp.format_key(&f.largest.user_key)
                        );
                    }
                }
                out.push(f.clone());
            }
            for bf in remaining {
                if deleted.contains(&bf.file_num) {
                    zombies.insert(bf.file_num, bf.size);
                    continue;
                }
                zombies.remove(&bf.file_num);
                out.push(bf.clone());
            }
        }

        let l0_sublevels = match l0_sublevels {
            Some(s) => s,
            None => Arc::new(L0Sublevels::build(&levels[0], cmp, flush_split_bytes)),
        };
        let version = Version::with_sublevels(levels, l0_sublevels);
        version.check_ordering(cmp)?;

        tracing::debug!(
            zombies = zombies.len(),
            sublevels = version.l0_sublevels.sublevel_count(),
            "applied version edit batch"
        );
        Ok((version, zombies))
    }
}
