//! Spherical region sampler
//!
//! Nonparametric variant of the Gibbs sampler: the region inventory
//! grows through a Chinese-restaurant-process draw instead of being
//! fixed up front. Toponym tokens make a joint (region, candidate
//! coordinate) choice scored by document occupancy times a spherical
//! density around the region's mean direction; the designated empty
//! region enters the draw with `crp_alpha` prior mass split evenly
//! across the toponym's candidates. Non-toponym tokens resample over
//! the occupied regions with the usual Dirichlet-multinomial score;
//! a region whose toponym occupancy dropped to zero is excluded from
//! every draw until the CRP re-seats it, so the statistics its
//! remaining tokens carry migrate to live regions as those tokens
//! resample.

use tracing::{debug, info, warn};

use crate::anneal::{Annealer, MapDecoder};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::geo::spherical_density;
use crate::rng::{cumulative_draw, RandomSource};
use crate::stats::{RegionSlot, RegionStats};
use crate::types::{Assignments, Corpus, Lexicon, SweepStats, TrainSummary};

/// Gibbs sampler with CRP-driven region growth and per-toponym
/// candidate coordinates.
#[derive(Debug)]
pub struct SphericalRegionModel {
    corpus: Corpus,
    lexicon: Lexicon,
    config: ModelConfig,
    rng: RandomSource,
    annealer: Annealer,
    stats: RegionStats,
    assignments: Assignments,
    /// `beta * n_words`, the Dirichlet denominator mass
    beta_w: f64,
    /// Scratch score buffer, resized as the region range grows
    probs: Vec<f64>,
}

impl SphericalRegionModel {
    /// Build a model over a corpus and its toponym coordinate lexicon.
    /// Every toponym appearing in the corpus must have at least one
    /// candidate coordinate.
    pub fn new(
        corpus: Corpus,
        lexicon: Lexicon,
        config: ModelConfig,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        for i in 0..corpus.n_tokens() {
            if corpus.stopword[i] || !corpus.toponym[i] {
                continue;
            }
            let word = corpus.word[i];
            if lexicon.candidate_count(word) == 0 {
                return Err(ModelError::EmptyFilter { toponym: word });
            }
        }
        let annealer = Annealer::from_config(&config)?;
        let rng = RandomSource::new(config.seed);
        let stats = RegionStats::growable(
            config.initial_region_capacity,
            corpus.n_words,
            corpus.n_docs,
            config.expansion_factor,
            &lexicon,
        );
        let assignments = Assignments::new(corpus.n_tokens());
        let beta_w = config.beta * corpus.n_words as f64;
        Ok(Self {
            corpus,
            lexicon,
            config,
            rng,
            annealer,
            stats,
            assignments,
            beta_w,
            probs: Vec::new(),
        })
    }

    /// Seed the assignments in two passes. Toponym tokens run a CRP
    /// draw over the regions created so far (unit weight each) plus
    /// `crp_alpha` mass for a new region, picking a candidate
    /// coordinate uniformly. Non-toponym tokens then draw uniformly
    /// over the regions the first pass created.
    pub fn random_initialize(&mut self) {
        for i in 0..self.corpus.n_tokens() {
            if self.corpus.stopword[i] || !self.corpus.toponym[i] {
                continue;
            }
            let word = self.corpus.word[i];
            let doc = self.corpus.doc[i];

            let current = self.stats.current_r();
            let target = self.rng.next_uniform() * (current as f64 + self.config.crp_alpha);
            let region = if target < current as f64 {
                target as usize
            } else {
                self.stats.activate_next()
            };

            let candidates = self.lexicon.candidate_count(word);
            let coord = self.rng.below(candidates);
            let xyz = self.lexicon.xyz[word as usize][coord];
            self.stats.increment_toponym(word, doc, region, coord, &xyz);
            self.assignments.region[i] = region as u32;
            self.assignments.coord[i] = coord as u32;
        }

        // A corpus without toponyms still needs one region for the
        // second pass to draw from
        if self.stats.current_r() == 0 {
            self.stats.activate_next();
        }

        for i in 0..self.corpus.n_tokens() {
            if self.corpus.stopword[i] || self.corpus.toponym[i] {
                continue;
            }
            let word = self.corpus.word[i];
            let doc = self.corpus.doc[i];
            let region = self.rng.below(self.stats.current_r());
            self.stats.increment_word(word, doc, region);
            self.assignments.region[i] = region as u32;
        }

        self.stats.install_fresh();
    }

    fn resample_toponym(&mut self, i: usize, sweep: &mut SweepStats) {
        let word = self.corpus.word[i];
        let doc = self.corpus.doc[i];
        let old_region = self.assignments.region[i] as usize;
        let old_coord = self.assignments.coord[i] as usize;
        let old_xyz = self.lexicon.xyz[word as usize][old_coord];

        self.stats
            .decrement_toponym(word, doc, old_region, old_coord, &old_xyz);
        if self.stats.toponym_count(old_region) == 0
            && self.stats.slot(old_region) == RegionSlot::Occupied
        {
            self.stats.release(old_region);
        }

        let candidates = self.lexicon.candidate_count(word);
        let current = self.stats.current_r();
        let designated = self.stats.designated_empty();

        // One score block of `candidates` entries per scored region; the
        // fresh frontier slot contributes an extra block when designated
        let blocks = match designated {
            Some(e) if e >= current => current + 1,
            _ => current,
        };
        let len = blocks * candidates;
        if self.probs.len() < len {
            self.probs.resize(len, 0.0);
        }

        for j in 0..current {
            // A region whose toponyms all left scores zero until the
            // CRP re-seats it; its residual statistics drain as the
            // tokens carrying them get resampled elsewhere
            if self.stats.slot(j) != RegionSlot::Occupied {
                for k in 0..candidates {
                    self.probs[j * candidates + k] = 0.0;
                }
                continue;
            }
            let doc_count = self.stats.doc_region(doc, j) as f64;
            let mean = *self.stats.mean_sum(j);
            for k in 0..candidates {
                let xyz = &self.lexicon.xyz[word as usize][k];
                self.probs[j * candidates + k] =
                    doc_count * spherical_density(xyz, &mean, self.config.kappa);
            }
        }

        if let Some(empty) = designated {
            // The designated empty slot carries the CRP prior mass,
            // split evenly across the candidates. A reused slot below
            // the frontier overwrites its own block.
            let mass = self.config.crp_alpha / candidates as f64;
            for k in 0..candidates {
                self.probs[empty * candidates + k] = mass;
            }
        }

        let total = self.annealer.anneal_probs(&mut self.probs[..len]);
        if !total.is_finite() || total <= 0.0 {
            if self.stats.slot(old_region) == RegionSlot::Empty {
                self.stats.occupy(old_region);
            }
            self.stats
                .increment_toponym(word, doc, old_region, old_coord, &old_xyz);
            sweep.degenerate_draws += 1;
            return;
        }

        let target = self.rng.next_uniform() * total;
        let index = cumulative_draw(&self.probs[..len], target);
        let region = index / candidates;
        let coord = index % candidates;

        if self.stats.slot(region) == RegionSlot::Empty {
            self.stats.occupy(region);
        }
        let xyz = self.lexicon.xyz[word as usize][coord];
        self.stats.increment_toponym(word, doc, region, coord, &xyz);
        if region != old_region || coord != old_coord {
            sweep.changes += 1;
        }
        self.assignments.region[i] = region as u32;
        self.assignments.coord[i] = coord as u32;
    }

    fn resample_word(&mut self, i: usize, sweep: &mut SweepStats) {
        let word = self.corpus.word[i];
        let doc = self.corpus.doc[i];
        let old = self.assignments.region[i] as usize;

        self.stats.decrement_word(word, doc, old);

        let current = self.stats.current_r();
        if self.probs.len() < current {
            self.probs.resize(current, 0.0);
        }
        for j in 0..current {
            // Document occupancy enters unsmoothed here; a region the
            // document never touches scores zero, and so does a region
            // whose toponym occupancy dropped to zero
            if self.stats.slot(j) != RegionSlot::Occupied {
                self.probs[j] = 0.0;
                continue;
            }
            self.probs[j] = (self.stats.word_region(word, j) as f64 + self.config.beta)
                / (self.stats.all_words(j) as f64 + self.beta_w)
                * self.stats.doc_region(doc, j) as f64;
        }

        let total = self.annealer.anneal_probs(&mut self.probs[..current]);
        if !total.is_finite() || total <= 0.0 {
            self.stats.increment_word(word, doc, old);
            sweep.degenerate_draws += 1;
            return;
        }

        let target = self.rng.next_uniform() * total;
        let region = cumulative_draw(&self.probs[..current], target);
        self.stats.increment_word(word, doc, region);
        if region != old {
            sweep.changes += 1;
        }
        self.assignments.region[i] = region as u32;
    }

    /// One Gibbs sweep over every non-stopword token.
    fn train_sweep(&mut self) -> SweepStats {
        let mut sweep = SweepStats::default();
        for i in 0..self.corpus.n_tokens() {
            if self.corpus.stopword[i] {
                continue;
            }
            if self.corpus.toponym[i] {
                self.resample_toponym(i, &mut sweep);
            } else {
                self.resample_word(i, &mut sweep);
            }
        }
        sweep
    }

    /// Run the full annealing schedule, growing region capacity at
    /// sweep boundaries whenever free slots fall below the configured
    /// headroom.
    pub fn train(&mut self) -> Result<TrainSummary, ModelError> {
        let mut sweeps = 0;
        let mut degenerate_draws = 0;

        while self.annealer.advance() {
            if self.stats.needs_expansion() {
                self.stats.expand();
                debug!(
                    expected_r = self.stats.expected_r(),
                    current_r = self.stats.current_r(),
                    "expanded region capacity"
                );
            }

            let sweep = self.train_sweep();
            sweeps += 1;
            degenerate_draws += sweep.degenerate_draws;

            if sweep.degenerate_draws > 0 {
                warn!(
                    sweep = self.annealer.iteration(),
                    tokens = sweep.degenerate_draws,
                    "degenerate draws; previous assignments retained"
                );
                if self.config.fail_on_degenerate {
                    return Err(ModelError::SamplingDegenerate {
                        sweep: self.annealer.iteration(),
                        tokens: sweep.degenerate_draws,
                    });
                }
            }

            if self.annealer.collecting() {
                self.stats.collect_sample();
            }

            debug!(
                sweep = self.annealer.iteration(),
                temperature = self.annealer.temperature(),
                changes = sweep.changes,
                regions = self.stats.current_r(),
                "sweep complete"
            );
        }

        let summary = TrainSummary {
            sweeps,
            samples: self.stats.samples(),
            degenerate_draws,
            regions: self.stats.current_r(),
        };
        info!(
            sweeps = summary.sweeps,
            samples = summary.samples,
            regions = summary.regions,
            "training complete"
        );
        Ok(summary)
    }

    /// Replace every token's assignment with the maximum-a-posteriori
    /// (region, coordinate) choice under the sample-averaged statistics
    /// and averaged region means. No new regions are created here.
    pub fn decode(&mut self) -> Result<(), ModelError> {
        if self.stats.samples() == 0 {
            return Err(ModelError::NoSamples);
        }
        let decoder = MapDecoder;
        let current = self.stats.current_r();

        for i in 0..self.corpus.n_tokens() {
            if self.corpus.stopword[i] {
                continue;
            }
            let word = self.corpus.word[i];
            let doc = self.corpus.doc[i];

            if self.corpus.toponym[i] {
                let candidates = self.lexicon.candidate_count(word);
                let len = current * candidates;
                if self.probs.len() < len {
                    self.probs.resize(len, 0.0);
                }
                for j in 0..current {
                    let doc_count = self.stats.averaged_doc_region(doc, j);
                    let mean = self.stats.averaged_mean_sum(j);
                    for k in 0..candidates {
                        let xyz = &self.lexicon.xyz[word as usize][k];
                        self.probs[j * candidates + k] =
                            doc_count * spherical_density(xyz, &mean, self.config.kappa);
                    }
                }
                let total = decoder.anneal_probs(&mut self.probs[..len]);
                let index = cumulative_draw(&self.probs[..len], total);
                self.assignments.region[i] = (index / candidates) as u32;
                self.assignments.coord[i] = (index % candidates) as u32;
            } else {
                if self.probs.len() < current {
                    self.probs.resize(current, 0.0);
                }
                for j in 0..current {
                    self.probs[j] = (self.stats.averaged_word_region(word, j) + self.config.beta)
                        / (self.stats.averaged_all_words(j) + self.beta_w)
                        * (self.stats.averaged_doc_region(doc, j) + self.config.alpha);
                }
                let total = decoder.anneal_probs(&mut self.probs[..current]);
                let region = cumulative_draw(&self.probs[..current], total);
                self.assignments.region[i] = region as u32;
            }
        }
        Ok(())
    }

    /// Current token assignments.
    pub fn assignments(&self) -> &Assignments {
        &self.assignments
    }

    /// Region statistics, including posterior sample sums.
    pub fn stats(&self) -> &RegionStats {
        &self.stats
    }

    /// The corpus the model was built over.
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// The toponym coordinate lexicon.
    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }
}
