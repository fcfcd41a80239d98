//! Sublevel decomposition of level 0.
//!
//! Level 0 files may overlap in user-key space, which makes both reads and
//! compaction picking reason about the level as a stack of *sublevels*: an
//! ordered list of disjoint runs, each internally overlap-free. Sublevel 0
//! holds the oldest data; a taller stack means more overlapping rewrites of
//! the same key range and a stronger signal to compact.

use std::cmp::Ordering;
use std::sync::Arc;

use super::meta::FileMetadata;
use crate::key::Comparator;

/// The sublevel decomposition of one version's level 0.
///
/// Built once per version and shared (the decomposition is reused when a new
/// version leaves level 0 untouched).
#[derive(Debug)]
pub struct L0Sublevels {
    sublevels: Vec<Vec<Arc<FileMetadata>>>,
    flush_split_keys: Vec<Vec<u8>>,
}

impl L0Sublevels {
    /// Builds the decomposition for `files`, which must be in level-0 order
    /// (oldest first). Each file goes into the first sublevel where it
    /// overlaps nothing already placed, so newer files stack on top of the
    /// older files they shadow.
    pub fn build(files: &[Arc<FileMetadata>], cmp: &dyn Comparator, flush_split_bytes: u64) -> Self {
        let mut sublevels: Vec<Vec<Arc<FileMetadata>>> = Vec::new();
        for file in files {
            let slot = sublevels
                .iter_mut()
                .find(|sub| !sub.iter().any(|placed| user_ranges_overlap(cmp, file, placed)));
            match slot {
                Some(sub) => sub.push(file.clone()),
                None => sublevels.push(vec![file.clone()]),
            }
        }

        let flush_split_keys = compute_flush_split_keys(files, cmp, flush_split_bytes);

        Self {
            sublevels,
            flush_split_keys,
        }
    }

    pub fn sublevel_count(&self) -> usize {
        self.sublevels.len()
    }

    /// Sublevels in age order: index 0 is the oldest run.
    pub fn sublevels(&self) -> &[Vec<Arc<FileMetadata>>] {
        &self.sublevels
    }

    /// User keys at which a flush should split its level-0 output so no
    /// single file accumulates more than the configured byte threshold of
    /// overlapping payload. Empty when splitting is disabled.
    pub fn flush_split_keys(&self) -> &[Vec<u8>] {
        &self.flush_split_keys
    }
}

/// True if the user-key ranges of `a` and `b` intersect.
fn user_ranges_overlap(cmp: &dyn Comparator, a: &FileMetadata, b: &FileMetadata) -> bool {
    cmp.compare(&a.smallest.user_key, &b.largest.user_key) != Ordering::Greater
        && cmp.compare(&b.smallest.user_key, &a.largest.user_key) != Ordering::Greater
}

fn compute_flush_split_keys(
    files: &[Arc<FileMetadata>],
    cmp: &dyn Comparator,
    flush_split_bytes: u64,
) -> Vec<Vec<u8>> {
    let mut split_keys = Vec::new();
    if flush_split_bytes == 0 || files.is_empty() {
        return split_keys;
    }
    let mut ordered: Vec<&Arc<FileMetadata>> = files.iter().collect();
    ordered.sort_by(|a, b| cmp.compare(&a.smallest.user_key, &b.smallest.user_key));

    let mut accumulated = 0u64;
    for file in ordered {
        accumulated += file.size;
        if accumulated >= flush_split_bytes {
            let key = &file.largest.user_key;
            if split_keys
                .last()
                .map_or(true, |last| cmp.compare(last, key) == Ordering::Less)
            {
                split_keys.push(key.clone());
            }
            accumulated = 0;
        }
    }
    split_keys
}
