//! Versioned descriptions of the on-disk level layout.
//!
//! A [`Version`] is an immutable snapshot of which tables exist at each level
//! of the tree. Mutations never touch a published version: the manifest
//! writer accumulates [`crate::manifest::VersionEdit`]s into a
//! [`crate::manifest::BulkVersionEdit`] and applies them to produce a whole
//! new version, which is linked into the process-wide [`VersionList`].
//! Readers that captured an older version keep reading it unlocked until they
//! release it.
//!
//! Level invariants:
//!
//! - Level 0 files are kept in by-seqnum order (oldest first) and their
//!   user-key ranges may overlap; a [`L0Sublevels`] decomposition describes
//!   the overlap structure.
//! - Files in levels 1 and deeper are sorted by smallest internal key and are
//!   pairwise disjoint in user-key space.

pub mod meta;
pub mod sublevel;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, Weak};

use itertools::Itertools;

use crate::errconsistency;
use crate::error::Result;
use crate::key::{internal_compare, Comparator};
use std::cmp::Ordering;

pub use meta::{total_size, FileMetadata};
pub use sublevel::L0Sublevels;

/// Number of levels in the tree.
pub const NUM_LEVELS: usize = 7;

type ListInner = Mutex<Vec<Arc<Version>>>;

/// An immutable snapshot of the level layout.
///
/// The snapshot is logically reference counted: the engine and every reader
/// holding the version calls [`Version::retain`] / [`Version::release`], and
/// the release that drops the count to zero unlinks the version from its
/// list. Each file's metadata is retained for as long as the version is
/// alive, so a file referenced by any live version is never deleted from
/// disk.
#[derive(Debug)]
pub struct Version {
    refs: AtomicU32,

    /// Files per level. Level 0 is in by-seqnum order; deeper levels are
    /// sorted by smallest internal key.
    pub levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS],

    /// Sublevel decomposition of level 0, shared with the previous version
    /// when level 0 was not edited.
    pub l0_sublevels: Arc<L0Sublevels>,

    // Back-link to the list this version is in, if any. Borrowed, never
    // counted: the list owns the version, not the other way around.
    link: Mutex<Weak<ListInner>>,
}

impl Version {
    /// Creates a version from per-level file lists, computing the level-0
    /// sublevel decomposition. Retains every file.
    pub fn new(
        levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS],
        cmp: &dyn Comparator,
        flush_split_bytes: u64,
    ) -> Self {
        let sublevels = Arc::new(L0Sublevels::build(&levels[0], cmp, flush_split_bytes));
        Self::with_sublevels(levels, sublevels)
    }

    /// Creates a version reusing an existing sublevel decomposition. Retains
    /// every file.
    pub(crate) fn with_sublevels(
        levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS],
        l0_sublevels: Arc<L0Sublevels>,
    ) -> Self {
        for files in &levels {
            for f in files {
                f.retain();
            }
        }
        Self {
            refs: AtomicU32::new(0),
            levels,
            l0_sublevels,
            link: Mutex::new(Weak::new()),
        }
    }

    pub fn refs(&self) -> u32 {
        self.refs.load(AtomicOrdering::SeqCst)
    }

    pub fn retain(&self) {
        self.refs.fetch_add(1, AtomicOrdering::SeqCst);
    }

    /// Drops one reference. The release that transitions the count to zero
    /// unlinks the version from its list; the transition is serialized on
    /// the list mutex so no reader can revive the version mid-unlink.
    pub fn release(self: &Arc<Self>) -> Result<()> {
        if self.refs.fetch_sub(1, AtomicOrdering::SeqCst) != 1 {
            return Ok(());
        }
        let link = self.link.lock()?.clone();
        if let Some(list) = link.upgrade() {
            let mut versions = list.lock()?;
            if self.refs.load(AtomicOrdering::SeqCst) == 0 {
                versions.retain(|v| !Arc::ptr_eq(v, self));
            }
        }
        Ok(())
    }

    /// Returns every file at `level` whose user-key range intersects the
    /// inclusive range `[start, end]`.
    ///
    /// For levels 1 and deeper the files are disjoint and sorted, so two
    /// binary searches bound the contiguous overlapping run. Level 0 files
    /// may overlap each other: the range is expanded to the union of every
    /// matching file's range and the scan restarts, until a full pass adds
    /// no file.
    pub fn overlaps(
        &self,
        level: usize,
        cmp: &dyn Comparator,
        start: &[u8],
        end: &[u8],
    ) -> Vec<Arc<FileMetadata>> {
        if level == 0 {
            let mut start = start.to_vec();
            let mut end = end.to_vec();
            'expand: loop {
                let mut ret = Vec::new();
                for f in &self.levels[0] {
                    if cmp.compare(&f.largest.user_key, &start) == Ordering::Less {
                        // Completely before the range.
                        continue;
                    }
                    if cmp.compare(&f.smallest.user_key, &end) == Ordering::Greater {
                        // Completely after the range.
                        continue;
                    }
                    ret.push(f.clone());

                    let mut restart = false;
                    if cmp.compare(&f.smallest.user_key, &start) == Ordering::Less {
                        start = f.smallest.user_key.clone();
                        restart = true;
                    }
                    if cmp.compare(&f.largest.user_key, &end) == Ordering::Greater {
                        end = f.largest.user_key.clone();
                        restart = true;
                    }
                    if restart {
                        continue 'expand;
                    }
                }
                return ret;
            }
        }

        let files = &self.levels[level];
        let lower =
            files.partition_point(|f| cmp.compare(&f.largest.user_key, start) == Ordering::Less);
        let upper =
            files.partition_point(|f| cmp.compare(&f.smallest.user_key, end) != Ordering::Greater);
        files[lower..upper].to_vec()
    }

    /// Validates the level invariants: ascending file numbers for level 0,
    /// ascending and non-overlapping internal-key ranges for deeper levels.
    pub fn check_ordering(&self, cmp: &dyn Comparator) -> Result<()> {
        for (level, files) in self.levels.iter().enumerate() {
            if level == 0 {
                // Strictly ascending file numbers. Sequence numbers are no
                // substitute: an ingested file can carry a zero sequence
                // number together with an arbitrarily high file number.
                for (a, b) in files.iter().tuple_windows() {
                    if a.file_num >= b.file_num {
                        return errconsistency!(
                            "level 0 files are not in increasing file number order: {}, {}",
                            a.file_num,
                            b.file_num
                        );
                    }
                }
            } else {
                for f in files {
                    if internal_compare(cmp, &f.smallest, &f.largest) == Ordering::Greater {
                        return errconsistency!(
                            "L{} file {} has inconsistent bounds: [{}-{}]",
                            level,
                            f.file_num,
                            cmp.format_key(&f.smallest.user_key),
                            cmp.format_key(&f.largest.user_key)
                        );
                    }
                }
                for (a, b) in files.iter().tuple_windows() {
                    if internal_compare(cmp, &a.largest, &b.smallest) != Ordering::Less {
                        return errconsistency!(
                            "L{} files {} and {} are not in increasing key order: {} then {}",
                            level,
                            a.file_num,
                            b.file_num,
                            cmp.format_key(&a.largest.user_key),
                            cmp.format_key(&b.smallest.user_key)
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

impl Drop for Version {
    fn drop(&mut self) {
        for files in &self.levels {
            for f in files {
                f.release();
            }
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (level, files) in self.levels.iter().enumerate() {
            if files.is_empty() {
                continue;
            }
            write!(f, "{level}:")?;
            for file in files {
                write!(
                    f,
                    " {}-{}",
                    String::from_utf8_lossy(&file.smallest.user_key),
                    String::from_utf8_lossy(&file.largest.user_key)
                )?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The process-wide list of live versions, oldest first.
///
/// The engine pushes each published version at the back and enumerates the
/// list to compute which files are still referenced and must not be deleted
/// from disk. The mutex guards only the list itself; versions are read
/// without it.
pub struct VersionList {
    inner: Arc<ListInner>,
}

impl Default for VersionList {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionList {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.inner.lock()?.is_empty())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.lock()?.len())
    }

    /// Oldest live version.
    pub fn front(&self) -> Result<Option<Arc<Version>>> {
        Ok(self.inner.lock()?.first().cloned())
    }

    /// Most recently published version.
    pub fn back(&self) -> Result<Option<Arc<Version>>> {
        Ok(self.inner.lock()?.last().cloned())
    }

    /// Links a freshly published version at the back of the list.
    ///
    /// # Panics
    ///
    /// Panics if the version is already linked into a list.
    pub fn push_back(&self, version: &Arc<Version>) -> Result<()> {
        let mut link = version.link.lock()?;
        if link.upgrade().is_some() {
            panic!("version is already linked into a list");
        }
        *link = Arc::downgrade(&self.inner);
        self.inner.lock()?.push(version.clone());
        Ok(())
    }

    /// File numbers referenced by any live version. Physical deletion of a
    /// file must wait until it leaves this set.
    pub fn referenced_files(&self) -> Result<HashSet<u64>> {
        let versions = self.inner.lock()?;
        let mut referenced = HashSet::new();
        for version in versions.iter() {
            for files in &version.levels {
                for f in files {
                    referenced.insert(f.file_num);
                }
            }
        }
        Ok(referenced)
    }
}
