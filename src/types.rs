//! Core data structures for the sampling engine
//!
//! Everything is columnar (struct-of-arrays): the token columns share
//! one logical id space and the sweep loop walks them sequentially, so
//! parallel arrays keep the hot path cache-friendly.

use crate::error::ModelError;
use crate::geo::Coordinate;

/// Immutable token columns for one corpus, plus derived dimensions.
#[derive(Debug, Clone)]
pub struct Corpus {
    /// Vocabulary id per token [n]
    pub word: Vec<u32>,

    /// Document id per token [n]
    pub doc: Vec<u32>,

    /// Whether each token is a place name [n]
    pub toponym: Vec<bool>,

    /// Whether each token is a stopword (excluded from sampling) [n]
    pub stopword: Vec<bool>,

    /// Vocabulary size W (stopword-only ids excluded, per the token
    /// array file contract)
    pub n_words: usize,

    /// Document count D
    pub n_docs: usize,
}

impl Corpus {
    /// Build a corpus from parallel columns, deriving W and D.
    pub fn from_columns(
        word: Vec<u32>,
        doc: Vec<u32>,
        toponym: Vec<bool>,
        stopword: Vec<bool>,
    ) -> Result<Self, ModelError> {
        let n = word.len();
        if doc.len() != n || toponym.len() != n || stopword.len() != n {
            return Err(ModelError::Config(format!(
                "token columns disagree in length: {} / {} / {} / {}",
                word.len(),
                doc.len(),
                toponym.len(),
                stopword.len()
            )));
        }

        let mut max_word: Option<u32> = None;
        let mut max_doc: Option<u32> = None;
        for i in 0..n {
            if !stopword[i] {
                max_word = Some(max_word.map_or(word[i], |m| m.max(word[i])));
            }
            max_doc = Some(max_doc.map_or(doc[i], |m| m.max(doc[i])));
        }

        Ok(Self {
            word,
            doc,
            toponym,
            stopword,
            n_words: max_word.map_or(0, |m| m as usize + 1),
            n_docs: max_doc.map_or(0, |m| m as usize + 1),
        })
    }

    /// Number of tokens N.
    pub fn n_tokens(&self) -> usize {
        self.word.len()
    }
}

/// Candidate coordinates per toponym vocabulary id.
///
/// Toponym ids occupy the low range `0..n_toponyms()` of the vocabulary
/// id space; the candidate list order is fixed at load time and
/// `coord` assignments index into it.
#[derive(Debug, Clone)]
pub struct Lexicon {
    /// Candidate coordinates per toponym id, gazetteer order
    pub coords: Vec<Vec<Coordinate>>,

    /// Unit 3-vector embedding of each candidate, same shape as
    /// `coords`; precomputed because the sweep touches these per token
    pub xyz: Vec<Vec<[f64; 3]>>,

    /// Largest candidate list across all toponyms
    pub max_coords: usize,
}

impl Lexicon {
    /// Build a lexicon, embedding every candidate on the unit sphere.
    pub fn new(coords: Vec<Vec<Coordinate>>) -> Self {
        let xyz = coords
            .iter()
            .map(|list| list.iter().map(Coordinate::cartesian).collect())
            .collect();
        let max_coords = coords.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            coords,
            xyz,
            max_coords,
        }
    }

    /// Number of toponym vocabulary ids T.
    pub fn n_toponyms(&self) -> usize {
        self.coords.len()
    }

    /// Candidate count for one toponym id.
    pub fn candidate_count(&self, toponym: u32) -> usize {
        self.coords[toponym as usize].len()
    }
}

/// Gazetteer-derived candidate regions per toponym id (discrete model).
///
/// Candidate lists are explicit, with their lengths carried alongside;
/// the sweep never walks past a row's end.
#[derive(Debug, Clone)]
pub struct RegionFilter {
    /// Candidate region ids per toponym id
    pub candidates: Vec<Vec<u32>>,

    /// Fixed number of regions R
    pub n_regions: usize,
}

impl RegionFilter {
    /// Build a filter over `n_regions` regions, validating ids.
    pub fn new(candidates: Vec<Vec<u32>>, n_regions: usize) -> Result<Self, ModelError> {
        if n_regions == 0 {
            return Err(ModelError::Config(
                "region inventory must hold at least one region".to_string(),
            ));
        }
        for (toponym, list) in candidates.iter().enumerate() {
            if let Some(&r) = list.iter().find(|&&r| r as usize >= n_regions) {
                return Err(ModelError::Config(format!(
                    "toponym {toponym} names region {r}, but only {n_regions} regions exist"
                )));
            }
        }
        Ok(Self {
            candidates,
            n_regions,
        })
    }

    /// Candidate regions for one toponym id, empty when unknown.
    pub fn regions_for(&self, toponym: u32) -> &[u32] {
        self.candidates
            .get(toponym as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Mutable per-token assignment columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignments {
    /// Current region id per token [n]
    pub region: Vec<u32>,

    /// Candidate-coordinate index per token [n]; only meaningful for
    /// toponym tokens in the spherical model
    pub coord: Vec<u32>,
}

impl Assignments {
    /// Zeroed assignments for n tokens.
    pub fn new(n: usize) -> Self {
        Self {
            region: vec![0; n],
            coord: vec![0; n],
        }
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Whether the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Count token positions whose region differs from `other`.
    pub fn changes_from(&self, other: &Assignments) -> usize {
        self.region
            .iter()
            .zip(other.region.iter())
            .filter(|(a, b)| a != b)
            .count()
    }
}

/// Per-sweep bookkeeping reported by `train_sweep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    /// Tokens whose region assignment changed in this sweep
    pub changes: usize,

    /// Token resamples whose candidate mass summed to zero; the
    /// previous assignment was retained for each
    pub degenerate_draws: usize,
}

/// Summary for a completed training run.
#[derive(Debug, Clone, Default)]
pub struct TrainSummary {
    /// Sweeps executed (burn-in + sampling)
    pub sweeps: usize,

    /// Posterior samples collected
    pub samples: usize,

    /// Total degenerate draws across all sweeps
    pub degenerate_draws: usize,

    /// Active region count at the end of training (spherical model;
    /// fixed R for the discrete model)
    pub regions: usize,
}
