//! Region sufficient statistics
//!
//! [`RegionStats`] owns every region-indexed array in the engine: the
//! live counts the sweep mutates, the running mean-direction sums, the
//! per-slot lifecycle tags, and the posterior sample sums the decode
//! pass reads. Live and sampled arrays can only be resized through
//! [`RegionStats::grow_to`], so they grow in lockstep and can never
//! desynchronize.
//!
//! Count arrays are flattened row-major with stride `expected_r`, the
//! capacity; growth restrides them, preserving every stored value and
//! zero-filling the new slots.

use std::collections::BTreeSet;

use crate::geo::{vec_axpy, Coordinate};
use crate::types::Lexicon;

/// Lifecycle tag for one region slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSlot {
    /// Capacity slot that has never been activated.
    Inactive,
    /// Active slot with zero toponym occupancy; a member of the empty
    /// set and a candidate for the CRP "new region" draw.
    Empty,
    /// Active slot with at least one toponym occupant.
    Occupied,
}

/// Posterior sample sums, mirroring every region-indexed live array.
#[derive(Debug, Clone, Default)]
struct SampleSums {
    word_by_region: Vec<f64>,
    region_by_doc: Vec<f64>,
    all_words_by_region: Vec<f64>,
    region_toponym_coord: Vec<Vec<Vec<f64>>>,
    mean_sum: Vec<[f64; 3]>,
    samples: usize,
}

/// All mutable region-indexed state for one training run.
#[derive(Debug, Clone)]
pub struct RegionStats {
    n_words: usize,
    n_docs: usize,

    /// Capacity: every region-indexed array holds this many slots
    expected_r: usize,

    /// Scored range: sweeps consider regions `0..current_r`
    current_r: usize,

    /// Expansion factor for capacity growth (0 disables growth)
    expansion_factor: f64,

    word_by_region: Vec<u32>,
    region_by_doc: Vec<u32>,
    all_words_by_region: Vec<u32>,
    toponym_by_region: Vec<u32>,
    region_toponym_coord: Vec<Vec<Vec<u32>>>,
    mean_sum: Vec<[f64; 3]>,

    slots: Vec<RegionSlot>,
    empty: BTreeSet<usize>,

    /// Candidate-list length per toponym id; shapes new coord rows
    coord_shape: Vec<usize>,

    sampled: SampleSums,
}

impl RegionStats {
    /// Statistics for a fixed, finite region set (discrete model).
    /// Every slot starts active and occupied; capacity never grows.
    pub fn fixed(n_regions: usize, n_words: usize, n_docs: usize) -> Self {
        let mut stats = Self::with_capacity(n_regions, n_words, n_docs, 0.0, Vec::new());
        stats.current_r = n_regions;
        for slot in stats.slots.iter_mut() {
            *slot = RegionSlot::Occupied;
        }
        stats
    }

    /// Statistics for a growing region set (spherical model). Slots
    /// start inactive; the model activates them during initialization
    /// and via the CRP draw.
    pub fn growable(
        initial_capacity: usize,
        n_words: usize,
        n_docs: usize,
        expansion_factor: f64,
        lexicon: &Lexicon,
    ) -> Self {
        let coord_shape = lexicon.coords.iter().map(Vec::len).collect();
        Self::with_capacity(
            initial_capacity,
            n_words,
            n_docs,
            expansion_factor,
            coord_shape,
        )
    }

    fn with_capacity(
        expected_r: usize,
        n_words: usize,
        n_docs: usize,
        expansion_factor: f64,
        coord_shape: Vec<usize>,
    ) -> Self {
        let coord_row =
            |shape: &[usize]| -> Vec<Vec<u32>> { shape.iter().map(|&c| vec![0; c]).collect() };
        let coord_row_f =
            |shape: &[usize]| -> Vec<Vec<f64>> { shape.iter().map(|&c| vec![0.0; c]).collect() };

        Self {
            n_words,
            n_docs,
            expected_r,
            current_r: 0,
            expansion_factor,
            word_by_region: vec![0; n_words * expected_r],
            region_by_doc: vec![0; n_docs * expected_r],
            all_words_by_region: vec![0; expected_r],
            toponym_by_region: vec![0; expected_r],
            region_toponym_coord: (0..expected_r).map(|_| coord_row(&coord_shape)).collect(),
            mean_sum: vec![[0.0; 3]; expected_r],
            slots: vec![RegionSlot::Inactive; expected_r],
            empty: BTreeSet::new(),
            sampled: SampleSums {
                word_by_region: vec![0.0; n_words * expected_r],
                region_by_doc: vec![0.0; n_docs * expected_r],
                all_words_by_region: vec![0.0; expected_r],
                region_toponym_coord: (0..expected_r).map(|_| coord_row_f(&coord_shape)).collect(),
                mean_sum: vec![[0.0; 3]; expected_r],
                samples: 0,
            },
            coord_shape,
        }
    }

    // ---- dimensions and lifecycle ------------------------------------

    /// Capacity of every region-indexed array.
    pub fn expected_r(&self) -> usize {
        self.expected_r
    }

    /// Vocabulary size W.
    pub fn n_words(&self) -> usize {
        self.n_words
    }

    /// Document count D.
    pub fn n_docs(&self) -> usize {
        self.n_docs
    }

    /// Scored region range; sweeps consider `0..current_r`.
    pub fn current_r(&self) -> usize {
        self.current_r
    }

    /// Slot tag for a region id.
    pub fn slot(&self, region: usize) -> RegionSlot {
        self.slots[region]
    }

    /// Ids currently in the empty-region set, ascending.
    pub fn empty_regions(&self) -> impl Iterator<Item = usize> + '_ {
        self.empty.iter().copied()
    }

    /// The designated next-new-region slot: the smallest empty id.
    pub fn designated_empty(&self) -> Option<usize> {
        self.empty.first().copied()
    }

    /// Activate the slot at the frontier as occupied and extend the
    /// scored range. Used during random initialization, where the CRP
    /// mass sits directly on the frontier slot.
    pub fn activate_next(&mut self) -> usize {
        let region = self.current_r;
        self.reserve(region + 1);
        self.slots[region] = RegionSlot::Occupied;
        self.current_r = region + 1;
        region
    }

    /// Install the fresh empty slot at the frontier (id `current_r`).
    /// Called once when initialization finishes and again whenever the
    /// fresh slot gets occupied.
    pub fn install_fresh(&mut self) {
        self.reserve(self.current_r + 1);
        self.slots[self.current_r] = RegionSlot::Empty;
        self.empty.insert(self.current_r);
    }

    /// Mark an empty slot as occupied after a CRP-backed draw landed on
    /// it. Occupying the fresh frontier slot extends the scored range
    /// and installs a replacement, keeping exactly one designated slot
    /// alive.
    pub fn occupy(&mut self, region: usize) {
        debug_assert_eq!(self.slots[region], RegionSlot::Empty);
        self.empty.remove(&region);
        self.slots[region] = RegionSlot::Occupied;
        if region == self.current_r {
            self.current_r = region + 1;
            self.install_fresh();
        }
    }

    /// Return a region whose toponym occupancy dropped to zero to the
    /// empty set. Its residual non-toponym counts stay on the books
    /// for conservation, but the samplers exclude the region from
    /// scoring, so those counts migrate out as their tokens resample;
    /// the mean sum is zeroed to drop accumulated float drift.
    pub fn release(&mut self, region: usize) {
        debug_assert_eq!(self.toponym_by_region[region], 0);
        self.slots[region] = RegionSlot::Empty;
        self.empty.insert(region);
        self.mean_sum[region] = [0.0; 3];
    }

    // ---- capacity growth ---------------------------------------------

    /// Whether free capacity has fallen below the configured headroom
    /// fraction. Checked at sweep boundaries.
    pub fn needs_expansion(&self) -> bool {
        if self.expansion_factor <= 0.0 {
            return false;
        }
        let free = (self.expected_r - self.current_r) as f64;
        let threshold =
            self.expansion_factor / (1.0 + self.expansion_factor) * self.expected_r as f64;
        free < threshold
    }

    /// Grow capacity by the configured factor.
    pub fn expand(&mut self) {
        let target = (self.expected_r as f64 * (1.0 + self.expansion_factor)).ceil() as usize;
        self.grow_to(target.max(self.expected_r + 1));
    }

    fn reserve(&mut self, needed: usize) {
        if needed > self.expected_r {
            let factor = if self.expansion_factor > 0.0 {
                1.0 + self.expansion_factor
            } else {
                2.0
            };
            let target = ((self.expected_r.max(1)) as f64 * factor).ceil() as usize;
            self.grow_to(target.max(needed));
        }
    }

    /// Resize every region-indexed array (live and sampled) to a new
    /// capacity in one operation, preserving all stored values and
    /// zero-filling new slots.
    pub fn grow_to(&mut self, new_expected_r: usize) {
        assert!(
            new_expected_r >= self.expected_r,
            "region capacity never shrinks"
        );
        if new_expected_r == self.expected_r {
            return;
        }
        let old = self.expected_r;

        self.word_by_region = restride(&self.word_by_region, self.n_words, old, new_expected_r);
        self.region_by_doc = restride(&self.region_by_doc, self.n_docs, old, new_expected_r);
        self.all_words_by_region.resize(new_expected_r, 0);
        self.toponym_by_region.resize(new_expected_r, 0);
        self.mean_sum.resize(new_expected_r, [0.0; 3]);
        self.slots.resize(new_expected_r, RegionSlot::Inactive);
        for _ in old..new_expected_r {
            self.region_toponym_coord
                .push(self.coord_shape.iter().map(|&c| vec![0; c]).collect());
        }

        self.sampled.word_by_region =
            restride(&self.sampled.word_by_region, self.n_words, old, new_expected_r);
        self.sampled.region_by_doc =
            restride(&self.sampled.region_by_doc, self.n_docs, old, new_expected_r);
        self.sampled.all_words_by_region.resize(new_expected_r, 0.0);
        self.sampled.mean_sum.resize(new_expected_r, [0.0; 3]);
        for _ in old..new_expected_r {
            self.sampled
                .region_toponym_coord
                .push(self.coord_shape.iter().map(|&c| vec![0.0; c]).collect());
        }

        self.expected_r = new_expected_r;
    }

    // ---- live count access -------------------------------------------

    #[inline]
    fn word_offset(&self, word: u32) -> usize {
        word as usize * self.expected_r
    }

    #[inline]
    fn doc_offset(&self, doc: u32) -> usize {
        doc as usize * self.expected_r
    }

    /// Count of `word` assigned to `region`.
    #[inline]
    pub fn word_region(&self, word: u32, region: usize) -> u32 {
        self.word_by_region[self.word_offset(word) + region]
    }

    /// Count of tokens in `doc` assigned to `region`.
    #[inline]
    pub fn doc_region(&self, doc: u32, region: usize) -> u32 {
        self.region_by_doc[self.doc_offset(doc) + region]
    }

    /// Total tokens assigned to `region`.
    #[inline]
    pub fn all_words(&self, region: usize) -> u32 {
        self.all_words_by_region[region]
    }

    /// Toponym occupancy of `region`.
    #[inline]
    pub fn toponym_count(&self, region: usize) -> u32 {
        self.toponym_by_region[region]
    }

    /// Times candidate `coord` of `toponym` was chosen in `region`.
    #[inline]
    pub fn coord_count(&self, region: usize, toponym: u32, coord: usize) -> u32 {
        self.region_toponym_coord[region][toponym as usize][coord]
    }

    /// Running (un-normalized) direction sum of `region`.
    #[inline]
    pub fn mean_sum(&self, region: usize) -> &[f64; 3] {
        &self.mean_sum[region]
    }

    /// Normalized mean direction of `region`, when it has one.
    pub fn region_direction(&self, region: usize) -> Option<Coordinate> {
        Coordinate::from_cartesian(self.mean_sum[region])
    }

    // ---- live count updates ------------------------------------------

    /// Add one non-toponym (or discrete-model) token's contribution.
    #[inline]
    pub fn increment_word(&mut self, word: u32, doc: u32, region: usize) {
        let wo = self.word_offset(word);
        let dofs = self.doc_offset(doc);
        self.word_by_region[wo + region] += 1;
        self.region_by_doc[dofs + region] += 1;
        self.all_words_by_region[region] += 1;
    }

    /// Remove one non-toponym (or discrete-model) token's contribution.
    #[inline]
    pub fn decrement_word(&mut self, word: u32, doc: u32, region: usize) {
        let wo = self.word_offset(word);
        let dofs = self.doc_offset(doc);
        self.word_by_region[wo + region] -= 1;
        self.region_by_doc[dofs + region] -= 1;
        self.all_words_by_region[region] -= 1;
    }

    /// Add one toponym token's contribution, including its chosen
    /// candidate coordinate.
    pub fn increment_toponym(
        &mut self,
        word: u32,
        doc: u32,
        region: usize,
        coord: usize,
        xyz: &[f64; 3],
    ) {
        self.increment_word(word, doc, region);
        self.toponym_by_region[region] += 1;
        self.region_toponym_coord[region][word as usize][coord] += 1;
        vec_axpy(&mut self.mean_sum[region], 1.0, xyz);
    }

    /// Remove one toponym token's contribution.
    pub fn decrement_toponym(
        &mut self,
        word: u32,
        doc: u32,
        region: usize,
        coord: usize,
        xyz: &[f64; 3],
    ) {
        self.decrement_word(word, doc, region);
        self.toponym_by_region[region] -= 1;
        self.region_toponym_coord[region][word as usize][coord] -= 1;
        vec_axpy(&mut self.mean_sum[region], -1.0, xyz);
    }

    // ---- posterior samples -------------------------------------------

    /// Fold the current live statistics into the running sample sums.
    /// Called once per sampling-phase sweep.
    pub fn collect_sample(&mut self) {
        for (sum, &live) in self
            .sampled
            .word_by_region
            .iter_mut()
            .zip(self.word_by_region.iter())
        {
            *sum += live as f64;
        }
        for (sum, &live) in self
            .sampled
            .region_by_doc
            .iter_mut()
            .zip(self.region_by_doc.iter())
        {
            *sum += live as f64;
        }
        for (sum, &live) in self
            .sampled
            .all_words_by_region
            .iter_mut()
            .zip(self.all_words_by_region.iter())
        {
            *sum += live as f64;
        }
        for (row_sum, row) in self
            .sampled
            .region_toponym_coord
            .iter_mut()
            .zip(self.region_toponym_coord.iter())
        {
            for (cell_sum, cell) in row_sum.iter_mut().zip(row.iter()) {
                for (s, &c) in cell_sum.iter_mut().zip(cell.iter()) {
                    *s += c as f64;
                }
            }
        }
        for (sum, live) in self.sampled.mean_sum.iter_mut().zip(self.mean_sum.iter()) {
            vec_axpy(sum, 1.0, live);
        }
        self.sampled.samples += 1;
    }

    /// Posterior samples collected so far.
    pub fn samples(&self) -> usize {
        self.sampled.samples
    }

    #[inline]
    fn per_sample(&self, sum: f64) -> f64 {
        debug_assert!(self.sampled.samples > 0);
        sum / self.sampled.samples as f64
    }

    /// Sample-averaged count of `word` in `region`.
    #[inline]
    pub fn averaged_word_region(&self, word: u32, region: usize) -> f64 {
        self.per_sample(self.sampled.word_by_region[self.word_offset(word) + region])
    }

    /// Sample-averaged count of `doc` tokens in `region`.
    #[inline]
    pub fn averaged_doc_region(&self, doc: u32, region: usize) -> f64 {
        self.per_sample(self.sampled.region_by_doc[self.doc_offset(doc) + region])
    }

    /// Sample-averaged total tokens in `region`.
    #[inline]
    pub fn averaged_all_words(&self, region: usize) -> f64 {
        self.per_sample(self.sampled.all_words_by_region[region])
    }

    /// Sample-averaged coordinate choice count.
    #[inline]
    pub fn averaged_coord_count(&self, region: usize, toponym: u32, coord: usize) -> f64 {
        self.per_sample(self.sampled.region_toponym_coord[region][toponym as usize][coord])
    }

    /// Sample-averaged direction sum of `region`.
    pub fn averaged_mean_sum(&self, region: usize) -> [f64; 3] {
        let s = &self.sampled.mean_sum[region];
        let n = self.sampled.samples as f64;
        debug_assert!(self.sampled.samples > 0);
        [s[0] / n, s[1] / n, s[2] / n]
    }
}

/// Copy rows from stride `old_stride` into stride `new_stride`,
/// zero-filling the widened tail of each row.
fn restride<T: Copy + Default>(
    old: &[T],
    rows: usize,
    old_stride: usize,
    new_stride: usize,
) -> Vec<T> {
    let mut out = vec![T::default(); rows * new_stride];
    for row in 0..rows {
        let src = &old[row * old_stride..(row + 1) * old_stride];
        out[row * new_stride..row * new_stride + old_stride].copy_from_slice(src);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::types::Lexicon;

    fn small_lexicon() -> Lexicon {
        Lexicon::new(vec![
            vec![
                Coordinate::from_degrees(0.0, 0.0),
                Coordinate::from_degrees(45.0, 45.0),
            ],
            vec![Coordinate::from_degrees(-20.0, 100.0)],
        ])
    }

    #[test]
    fn test_fixed_starts_occupied() {
        let stats = RegionStats::fixed(3, 5, 2);
        assert_eq!(stats.current_r(), 3);
        assert_eq!(stats.expected_r(), 3);
        assert_eq!(stats.slot(0), RegionSlot::Occupied);
        assert!(!stats.needs_expansion());
    }

    #[test]
    fn test_increment_decrement_roundtrip() {
        let mut stats = RegionStats::fixed(2, 4, 2);
        stats.increment_word(1, 0, 1);
        stats.increment_word(1, 0, 1);
        stats.increment_word(3, 1, 0);
        assert_eq!(stats.word_region(1, 1), 2);
        assert_eq!(stats.doc_region(0, 1), 2);
        assert_eq!(stats.all_words(1), 2);

        stats.decrement_word(1, 0, 1);
        assert_eq!(stats.word_region(1, 1), 1);
        assert_eq!(stats.all_words(1), 1);
        assert_eq!(stats.word_region(3, 0), 1);
    }

    #[test]
    fn test_toponym_updates_touch_mean_sum() {
        let lexicon = small_lexicon();
        let mut stats = RegionStats::growable(4, 4, 2, 0.5, &lexicon);
        stats.activate_next();

        let xyz = lexicon.xyz[0][1];
        stats.increment_toponym(0, 0, 0, 1, &xyz);
        assert_eq!(stats.toponym_count(0), 1);
        assert_eq!(stats.coord_count(0, 0, 1), 1);
        let sum = stats.mean_sum(0);
        assert!((sum[0] - xyz[0]).abs() < 1e-12);

        stats.decrement_toponym(0, 0, 0, 1, &xyz);
        assert_eq!(stats.toponym_count(0), 0);
        assert!(crate::geo::vec_norm(stats.mean_sum(0)) < 1e-12);
    }

    #[test]
    fn test_growth_preserves_counts() {
        let lexicon = small_lexicon();
        let mut stats = RegionStats::growable(2, 3, 2, 0.5, &lexicon);
        stats.activate_next();
        stats.activate_next();
        stats.increment_word(2, 1, 0);
        stats.increment_word(2, 1, 1);
        stats.increment_toponym(0, 0, 1, 0, &lexicon.xyz[0][0]);
        stats.collect_sample();

        let old_capacity = stats.expected_r();
        stats.grow_to(7);
        assert_eq!(stats.expected_r(), 7);
        assert!(stats.expected_r() > old_capacity);

        // Everything stored before the resize is intact
        assert_eq!(stats.word_region(2, 0), 1);
        assert_eq!(stats.word_region(2, 1), 1);
        assert_eq!(stats.doc_region(1, 0), 1);
        assert_eq!(stats.coord_count(1, 0, 0), 1);
        assert_eq!(stats.averaged_word_region(2, 0), 1.0);
        // New slots read zero
        assert_eq!(stats.word_region(2, 6), 0);
        assert_eq!(stats.all_words(5), 0);
    }

    #[test]
    fn test_lockstep_growth_of_sampled_arrays() {
        let lexicon = small_lexicon();
        let mut stats = RegionStats::growable(2, 2, 1, 0.5, &lexicon);
        stats.activate_next();
        stats.increment_word(0, 0, 0);
        stats.collect_sample();
        stats.collect_sample();
        stats.grow_to(5);
        assert_eq!(stats.samples(), 2);
        assert_eq!(stats.averaged_word_region(0, 0), 1.0);
        assert_eq!(stats.averaged_doc_region(0, 4), 0.0);
    }

    #[test]
    fn test_fresh_slot_protocol() {
        let lexicon = small_lexicon();
        let mut stats = RegionStats::growable(4, 2, 1, 0.5, &lexicon);
        let r0 = stats.activate_next();
        assert_eq!(r0, 0);
        stats.install_fresh();

        assert_eq!(stats.current_r(), 1);
        assert_eq!(stats.designated_empty(), Some(1));
        assert_eq!(stats.slot(1), RegionSlot::Empty);

        // Occupying the fresh slot extends the range and installs a new one
        stats.occupy(1);
        assert_eq!(stats.current_r(), 2);
        assert_eq!(stats.designated_empty(), Some(2));
        assert_eq!(stats.slot(1), RegionSlot::Occupied);
        assert_eq!(stats.slot(2), RegionSlot::Empty);
    }

    #[test]
    fn test_release_reenters_empty_set() {
        let lexicon = small_lexicon();
        let mut stats = RegionStats::growable(4, 2, 1, 0.5, &lexicon);
        stats.activate_next();
        stats.activate_next();
        stats.install_fresh();

        stats.release(0);
        // The reused id is smaller than the fresh slot, so it becomes
        // the designated next-new region
        assert_eq!(stats.designated_empty(), Some(0));
        assert_eq!(stats.slot(0), RegionSlot::Empty);

        stats.occupy(0);
        // Occupying a reused slot does not move the frontier
        assert_eq!(stats.current_r(), 2);
        assert_eq!(stats.designated_empty(), Some(2));
    }

    #[test]
    fn test_expansion_policy_threshold() {
        let lexicon = small_lexicon();
        // factor 0.5: growth triggers when free slots < 1/3 of capacity
        let mut stats = RegionStats::growable(6, 2, 1, 0.5, &lexicon);
        for _ in 0..4 {
            stats.activate_next();
        }
        assert!(!stats.needs_expansion()); // 2 free of 6 = 1/3 exactly
        stats.activate_next();
        assert!(stats.needs_expansion()); // 1 free of 6
        let before = stats.expected_r();
        stats.expand();
        assert_eq!(stats.expected_r(), 9);
        assert!(stats.expected_r() > before);
    }

    #[test]
    fn test_averaging_divides_by_sample_count() {
        let mut stats = RegionStats::fixed(2, 2, 1);
        stats.increment_word(0, 0, 0);
        stats.collect_sample();
        stats.increment_word(0, 0, 0);
        stats.collect_sample();
        // Sums 1 + 2 over two samples
        assert_eq!(stats.samples(), 2);
        assert!((stats.averaged_word_region(0, 0) - 1.5).abs() < 1e-12);
    }
}
