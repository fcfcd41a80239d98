//! Compaction picking.
//!
//! The picker is a pure function from a version plus run-time state to at
//! most one compaction plan; executing the plan (and marking its input files
//! as compacting) is the caller's job. Two shapes of plan exist:
//!
//! - **Leveled**: inputs at some level merged with the overlapping files one
//!   level deeper. Level 0 compacts into *Lbase*, the shallowest non-empty
//!   deeper level, and is triggered by its sublevel count; deeper levels are
//!   triggered by their total size.
//! - **Intra-L0**: a run of level-0 files rewritten into fewer level-0
//!   files. Chosen when level 0 wants compacting but Lbase is busy, to keep
//!   the read path from drowning in sublevels without touching deeper data.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::CompactionConfig;
use crate::key::Comparator;
use crate::version::{total_size, FileMetadata, Version, NUM_LEVELS};

/// A single compaction plan.
#[derive(Debug)]
pub enum Compaction {
    /// Merge `inputs` at `level` with `output_inputs` at `output_level`.
    Leveled {
        level: usize,
        output_level: usize,
        inputs: Vec<Arc<FileMetadata>>,
        output_inputs: Vec<Arc<FileMetadata>>,
    },
    /// Rewrite `inputs` within level 0.
    IntraL0 { inputs: Vec<Arc<FileMetadata>> },
}

/// Picks the next compaction for `version`, if any.
///
/// Level 0 has priority: once its sublevel count reaches the configured
/// threshold it compacts into Lbase, falling back to an intra-L0 rewrite
/// when that plan is blocked by an in-flight compaction. Otherwise the
/// deeper levels are scored by size and the highest-scoring level compacts
/// one file into its overlap at the next level.
pub fn pick_auto(
    version: &Version,
    cmp: &dyn Comparator,
    config: &CompactionConfig,
    earliest_unflushed_seq_num: u64,
) -> Option<Compaction> {
    if version.l0_sublevels.sublevel_count() >= config.level0_compaction_threshold {
        if let Some(compaction) = pick_l0_to_base(version, cmp) {
            return Some(compaction);
        }
        return pick_intra_l0(version, cmp, earliest_unflushed_seq_num);
    }
    pick_level(version, cmp, config)
}

/// Picks a level-0 into Lbase compaction, or nothing when the plan would
/// collide with an in-flight compaction.
pub fn pick_l0_to_base(version: &Version, cmp: &dyn Comparator) -> Option<Compaction> {
    let output_level = (1..NUM_LEVELS)
        .find(|&level| !version.levels[level].is_empty())
        .unwrap_or(NUM_LEVELS - 1);

    // Seed with every level-0 file that is free to move.
    let seeds: Vec<&Arc<FileMetadata>> = version.levels[0]
        .iter()
        .filter(|f| !f.is_compacting() && !f.is_intra_l0_compacting())
        .collect();
    let (mut start, mut end) = user_key_bounds(cmp, seeds.iter().copied())?;

    // Expand into the output level.
    let output_inputs = version.overlaps(output_level, cmp, &start, &end);
    if output_inputs.iter().any(|f| f.is_compacting()) {
        return None;
    }

    // Expand back into level 0 with the combined bounds; overlapping level-0
    // files can grow the input set. The regrown set must still be free.
    if let Some((lo, hi)) = user_key_bounds(cmp, output_inputs.iter()) {
        if cmp.compare(&lo, &start) == Ordering::Less {
            start = lo;
        }
        if cmp.compare(&hi, &end) == Ordering::Greater {
            end = hi;
        }
    }
    let inputs = version.overlaps(0, cmp, &start, &end);
    if inputs
        .iter()
        .any(|f| f.is_compacting() || f.is_intra_l0_compacting())
    {
        return None;
    }

    tracing::debug!(
        output_level,
        inputs = inputs.len(),
        output_inputs = output_inputs.len(),
        "picked level-0 compaction"
    );
    Some(Compaction::Leveled {
        level: 0,
        output_level,
        inputs,
        output_inputs,
    })
}

/// Picks a run of level-0 files to rewrite in place.
///
/// The candidate set is seeded from the oldest free level-0 file and expanded
/// across user-key overlap, then accumulated newest first. Accumulation
/// stops at the first file that is busy, that may still receive entries from
/// an unflushed memtable (`largest_seq_num >= earliest_unflushed_seq_num`),
/// or whose size would increase the work per file `bytes / k` of the run.
/// Runs shorter than two files are not worth rewriting.
pub fn pick_intra_l0(
    version: &Version,
    cmp: &dyn Comparator,
    earliest_unflushed_seq_num: u64,
) -> Option<Compaction> {
    let seed = version.levels[0].iter().find(|f| {
        !f.is_compacting()
            && !f.is_intra_l0_compacting()
            && f.largest_seq_num < earliest_unflushed_seq_num
    })?;
    let mut candidates =
        version.overlaps(0, cmp, &seed.smallest.user_key, &seed.largest.user_key);
    candidates.sort_by(|a, b| b.file_num.cmp(&a.file_num));

    let mut inputs: Vec<Arc<FileMetadata>> = Vec::new();
    let mut bytes = 0u64;
    for f in candidates {
        if f.is_compacting() || f.is_intra_l0_compacting() {
            break;
        }
        if f.largest_seq_num >= earliest_unflushed_seq_num {
            break;
        }
        let k = inputs.len() as u64;
        if k > 0 && (bytes + f.size) / (k + 1) > bytes / k {
            break;
        }
        bytes += f.size;
        inputs.push(f);
    }
    if inputs.len() < 2 {
        return None;
    }
    inputs.sort_by_key(|f| f.file_num);

    tracing::debug!(inputs = inputs.len(), bytes, "picked intra-level-0 compaction");
    Some(Compaction::IntraL0 { inputs })
}

/// Scores levels 1 and deeper by size and compacts the winner one file at a
/// time into the next level. A marked-for-compaction file raises its level's
/// score to at least the trigger point; within a level the oldest file (by
/// largest sequence number) goes first, marked files ahead of the rest.
fn pick_level(
    version: &Version,
    cmp: &dyn Comparator,
    config: &CompactionConfig,
) -> Option<Compaction> {
    let mut best: Option<(usize, f64)> = None;
    for level in 1..NUM_LEVELS - 1 {
        let files = &version.levels[level];
        if files.is_empty() {
            continue;
        }
        let mut score = total_size(files) as f64 / config.max_level_bytes(level) as f64;
        if score < 1.0 && files.iter().any(|f| f.marked_for_compaction) {
            score = 1.0;
        }
        if score >= 1.0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((level, score));
        }
    }
    let (level, score) = best?;

    let seed = version.levels[level]
        .iter()
        .filter(|f| !f.is_compacting())
        .min_by_key(|f| (!f.marked_for_compaction, f.largest_seq_num))?;
    let output_inputs = version.overlaps(
        level + 1,
        cmp,
        &seed.smallest.user_key,
        &seed.largest.user_key,
    );
    if output_inputs.iter().any(|f| f.is_compacting()) {
        return None;
    }

    tracing::debug!(level, score, seed = seed.file_num, "picked leveled compaction");
    Some(Compaction::Leveled {
        level,
        output_level: level + 1,
        inputs: vec![Arc::clone(seed)],
        output_inputs,
    })
}

/// Smallest and largest user key over `files`, or nothing when empty.
fn user_key_bounds<'a>(
    cmp: &dyn Comparator,
    files: impl Iterator<Item = &'a Arc<FileMetadata>>,
) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut bounds: Option<(Vec<u8>, Vec<u8>)> = None;
    for f in files {
        match &mut bounds {
            None => {
                bounds = Some((f.smallest.user_key.clone(), f.largest.user_key.clone()));
            }
            Some((start, end)) => {
                if cmp.compare(&f.smallest.user_key, start) == Ordering::Less {
                    *start = f.smallest.user_key.clone();
                }
                if cmp.compare(&f.largest.user_key, end) == Ordering::Greater {
                    *end = f.largest.user_key.clone();
                }
            }
        }
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{kind, BytewiseComparator, InternalKey};

    const CMP: BytewiseComparator = BytewiseComparator;

    fn sized_file(
        file_num: u64,
        size: u64,
        lo: &str,
        hi: &str,
        seq_lo: u64,
        seq_hi: u64,
    ) -> Arc<FileMetadata> {
        Arc::new(FileMetadata::new(
            file_num,
            size,
            InternalKey::new(lo.as_bytes().to_vec(), seq_hi, kind::SET),
            InternalKey::new(hi.as_bytes().to_vec(), seq_lo, kind::SET),
            seq_lo,
            seq_hi,
        ))
    }

    fn file(file_num: u64, lo: &str, hi: &str, seq_lo: u64, seq_hi: u64) -> Arc<FileMetadata> {
        sized_file(file_num, 1024, lo, hi, seq_lo, seq_hi)
    }

    fn version_with(levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS]) -> Version {
        Version::new(levels, &CMP, 0)
    }

    fn config(threshold: usize) -> CompactionConfig {
        CompactionConfig::new().level0_compaction_threshold(threshold)
    }

    fn input_nums(compaction: &Option<Compaction>) -> (Vec<u64>, Vec<u64>) {
        match compaction {
            Some(Compaction::Leveled {
                inputs,
                output_inputs,
                ..
            }) => (
                inputs.iter().map(|f| f.file_num).collect(),
                output_inputs.iter().map(|f| f.file_num).collect(),
            ),
            Some(Compaction::IntraL0 { inputs }) => {
                (inputs.iter().map(|f| f.file_num).collect(), Vec::new())
            }
            None => (Vec::new(), Vec::new()),
        }
    }

    #[test]
    fn test_threshold_not_met() {
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        levels[0] = vec![file(100, "i", "j", 101, 102)];
        levels[6] = vec![file(200, "f", "l", 51, 52)];
        let v = version_with(levels);

        assert!(pick_auto(&v, &CMP, &config(3), u64::MAX).is_none());

        let picked = pick_auto(&v, &CMP, &config(1), u64::MAX);
        let (l0, base) = input_nums(&picked);
        assert_eq!(l0, vec![100]);
        assert_eq!(base, vec![200]);
        match picked {
            Some(Compaction::Leveled {
                level,
                output_level,
                ..
            }) => {
                assert_eq!(level, 0);
                assert_eq!(output_level, 6);
            }
            other => panic!("expected leveled compaction, got {other:?}"),
        }
    }

    #[test]
    fn test_expands_across_overlapping_level0() {
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        levels[0] = vec![
            file(100, "i", "p", 1, 1),
            file(110, "j", "q", 2, 2),
            file(120, "r", "s", 3, 3),
        ];
        levels[6] = vec![file(200, "f", "s", 0, 0)];
        let v = version_with(levels);

        let picked = pick_auto(&v, &CMP, &config(2), u64::MAX);
        let (l0, base) = input_nums(&picked);
        assert_eq!(l0, vec![100, 110, 120]);
        assert_eq!(base, vec![200]);
    }

    #[test]
    fn test_defers_to_intra_l0_when_base_is_compacting() {
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        levels[0] = vec![
            file(100, "i", "p", 1, 1),
            file(110, "j", "q", 2, 2),
            file(120, "r", "s", 3, 3),
        ];
        let busy = file(200, "f", "s", 0, 0);
        busy.set_compacting(true);
        levels[6] = vec![busy];
        let v = version_with(levels);

        let picked = pick_auto(&v, &CMP, &config(2), u64::MAX);
        match &picked {
            Some(Compaction::IntraL0 { .. }) => {}
            other => panic!("expected intra-L0 compaction, got {other:?}"),
        }
        let (inputs, _) = input_nums(&picked);
        assert_eq!(inputs, vec![100, 110]);
    }

    #[test]
    fn test_intra_l0_unflushed_gate() {
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        levels[0] = (1..=4)
            .map(|n| file(n, "a", "z", n, n))
            .collect();
        let v = version_with(levels);

        let picked = pick_intra_l0(&v, &CMP, 5);
        let (inputs, _) = input_nums(&picked);
        assert_eq!(inputs, vec![1, 2, 3, 4]);

        // The newest file is gated, which blocks the whole plan even though
        // three older files pass the filter.
        assert!(pick_intra_l0(&v, &CMP, 4).is_none());
    }

    #[test]
    fn test_intra_l0_work_per_file_boundary() {
        let build = |head_size: u64| {
            let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
            levels[0] = vec![
                sized_file(1, head_size, "a", "z", 1, 1),
                sized_file(2, 1, "a", "z", 2, 2),
                sized_file(3, 1, "a", "z", 3, 3),
                sized_file(4, 1, "a", "z", 4, 4),
                sized_file(5, 1, "a", "z", 5, 5),
            ];
            version_with(levels)
        };

        // An oldest file of size 5 keeps the integer average flat at one.
        let picked = pick_intra_l0(&build(5), &CMP, u64::MAX);
        let (inputs, _) = input_nums(&picked);
        assert_eq!(inputs, vec![1, 2, 3, 4, 5]);

        // At size 6 the oldest file would raise the work per file.
        let picked = pick_intra_l0(&build(6), &CMP, u64::MAX);
        let (inputs, _) = input_nums(&picked);
        assert_eq!(inputs, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_intra_l0_large_newest_file_admitted() {
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        levels[0] = vec![
            sized_file(1, 1, "a", "z", 1, 1),
            sized_file(2, 1, "a", "z", 2, 2),
            sized_file(3, 1, "a", "z", 3, 3),
            sized_file(4, 1, "a", "z", 4, 4),
            sized_file(5, 6, "a", "z", 5, 5),
        ];
        let v = version_with(levels);

        // The large file is newest and accumulates first; it never fails the
        // admission check.
        let picked = pick_intra_l0(&v, &CMP, u64::MAX);
        let (inputs, _) = input_nums(&picked);
        assert_eq!(inputs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_intra_l0_never_returns_single_file() {
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        levels[0] = vec![file(1, "a", "z", 1, 1)];
        let v = version_with(levels);
        assert!(pick_intra_l0(&v, &CMP, u64::MAX).is_none());
    }

    #[test]
    fn test_intra_l0_stops_at_busy_file() {
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        let busy = file(3, "a", "z", 3, 3);
        busy.set_intra_l0_compacting(true);
        levels[0] = vec![file(1, "a", "z", 1, 1), file(2, "a", "z", 2, 2), busy];
        let v = version_with(levels);

        // The busy file is newest: accumulation stops before anything is
        // taken, so there is no plan.
        assert!(pick_intra_l0(&v, &CMP, u64::MAX).is_none());
    }

    #[test]
    fn test_intra_l0_work_per_file_monotone() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x10);

        for _ in 0..100 {
            let count = rng.gen_range(2..10u64);
            let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
            levels[0] = (1..=count)
                .map(|n| sized_file(n, rng.gen_range(1..1000), "a", "z", n, n))
                .collect();
            let v = version_with(levels);

            let Some(Compaction::IntraL0 { inputs }) = pick_intra_l0(&v, &CMP, u64::MAX) else {
                continue;
            };
            assert!(inputs.len() >= 2);
            // Work per file never increases while accumulating newest first.
            let mut ordered = inputs.clone();
            ordered.sort_by_key(|f| std::cmp::Reverse(f.file_num));
            let mut bytes = 0u64;
            let mut prev = u64::MAX;
            for (i, f) in ordered.iter().enumerate() {
                bytes += f.size;
                let per_file = bytes / (i as u64 + 1);
                assert!(per_file <= prev);
                prev = per_file;
            }
        }
    }

    #[test]
    fn test_intra_l0_respects_gate_and_markers() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x77);

        for _ in 0..100 {
            let count = rng.gen_range(2..12u64);
            let gate = rng.gen_range(1..=count + 1);
            let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
            levels[0] = (1..=count)
                .map(|n| {
                    let f = sized_file(n, rng.gen_range(1..100), "a", "z", n, n);
                    if rng.gen_bool(0.2) {
                        f.set_compacting(true);
                    }
                    f
                })
                .collect();
            let v = version_with(levels);

            if let Some(Compaction::IntraL0 { inputs }) = pick_intra_l0(&v, &CMP, gate) {
                for f in &inputs {
                    assert!(!f.is_compacting());
                    assert!(!f.is_intra_l0_compacting());
                    assert!(f.largest_seq_num < gate);
                }
            }
        }
    }

    #[test]
    fn test_level_score_triggers_compaction() {
        let cfg = CompactionConfig::new()
            .base_level_bytes(1000)
            .level_size_multiplier(10);
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        // Level 1 is over its 1000-byte budget; the oldest file seeds.
        levels[1] = vec![
            sized_file(10, 600, "a", "c", 5, 6),
            sized_file(11, 600, "d", "f", 1, 2),
        ];
        levels[2] = vec![sized_file(20, 600, "e", "k", 0, 0)];
        let v = version_with(levels);

        let picked = pick_auto(&v, &CMP, &cfg, u64::MAX);
        let (inputs, outputs) = input_nums(&picked);
        assert_eq!(inputs, vec![11]);
        assert_eq!(outputs, vec![20]);
    }

    #[test]
    fn test_level_under_budget_is_quiet() {
        let cfg = CompactionConfig::new().base_level_bytes(1 << 30);
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        levels[1] = vec![sized_file(10, 600, "a", "c", 1, 2)];
        let v = version_with(levels);
        assert!(pick_auto(&v, &CMP, &cfg, u64::MAX).is_none());
    }

    #[test]
    fn test_marked_file_raises_score() {
        let cfg = CompactionConfig::new().base_level_bytes(1 << 30);
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        let marked = Arc::new(
            FileMetadata::new(
                10,
                600,
                InternalKey::new(b"a".to_vec(), 2, kind::SET),
                InternalKey::new(b"c".to_vec(), 1, kind::SET),
                1,
                2,
            )
            .marked_for_compaction(true),
        );
        levels[1] = vec![marked, sized_file(11, 600, "d", "f", 3, 4)];
        let v = version_with(levels);

        let picked = pick_auto(&v, &CMP, &cfg, u64::MAX);
        let (inputs, _) = input_nums(&picked);
        assert_eq!(inputs, vec![10]);
    }

    #[test]
    fn test_level_pick_abandoned_when_output_busy() {
        let cfg = CompactionConfig::new().base_level_bytes(100);
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        levels[1] = vec![sized_file(10, 600, "a", "c", 1, 2)];
        let busy = sized_file(20, 600, "b", "k", 0, 0);
        busy.set_compacting(true);
        levels[2] = vec![busy];
        let v = version_with(levels);
        assert!(pick_auto(&v, &CMP, &cfg, u64::MAX).is_none());
    }

    #[test]
    fn test_l0_plan_abandoned_when_all_l0_busy() {
        let mut levels: [Vec<Arc<FileMetadata>>; NUM_LEVELS] = Default::default();
        let a = file(1, "a", "z", 1, 1);
        let b = file(2, "a", "z", 2, 2);
        a.set_compacting(true);
        b.set_compacting(true);
        levels[0] = vec![a, b];
        let v = version_with(levels);
        assert!(pick_auto(&v, &CMP, &config(1), u64::MAX).is_none());
    }
}
