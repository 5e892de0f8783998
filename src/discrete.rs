//! Discrete region sampler
//!
//! Collapsed Gibbs sampler over a fixed, finite set of regions. Each
//! non-stopword token carries a region assignment; toponym tokens are
//! restricted to the candidate regions their gazetteer filter allows,
//! other tokens range over all regions. A sweep resamples every token
//! conditioned on all the others by decrementing its counts, scoring
//! each region, drawing from the annealed distribution, and
//! incrementing the counts of the drawn region.

use tracing::{debug, info, warn};

use crate::anneal::{Annealer, MapDecoder};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::rng::{cumulative_draw, RandomSource};
use crate::stats::RegionStats;
use crate::types::{Assignments, Corpus, RegionFilter, SweepStats, TrainSummary};

/// Gibbs sampler with a fixed region inventory.
#[derive(Debug)]
pub struct DiscreteRegionModel {
    corpus: Corpus,
    filter: RegionFilter,
    config: ModelConfig,
    rng: RandomSource,
    annealer: Annealer,
    stats: RegionStats,
    assignments: Assignments,
    /// `beta * n_words`, the Dirichlet denominator mass
    beta_w: f64,
    /// Scratch score buffer, one entry per region
    probs: Vec<f64>,
}

impl DiscreteRegionModel {
    /// Build a model over a corpus and its toponym region filter.
    /// Fails if any toponym appearing in the corpus has no candidate
    /// regions, which would make its tokens unsampleable.
    pub fn new(
        corpus: Corpus,
        filter: RegionFilter,
        config: ModelConfig,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        for i in 0..corpus.n_tokens() {
            if corpus.stopword[i] || !corpus.toponym[i] {
                continue;
            }
            let word = corpus.word[i];
            if filter.regions_for(word).is_empty() {
                return Err(ModelError::EmptyFilter { toponym: word });
            }
        }
        let annealer = Annealer::from_config(&config)?;
        let rng = RandomSource::new(config.seed);
        let stats = RegionStats::fixed(filter.n_regions, corpus.n_words, corpus.n_docs);
        let assignments = Assignments::new(corpus.n_tokens());
        let beta_w = config.beta * corpus.n_words as f64;
        let probs = vec![0.0; filter.n_regions];
        Ok(Self {
            corpus,
            filter,
            config,
            rng,
            annealer,
            stats,
            assignments,
            beta_w,
            probs,
        })
    }

    /// Assign every non-stopword token a starting region: toponyms draw
    /// uniformly from their candidate regions, other tokens uniformly
    /// from the full inventory.
    pub fn random_initialize(&mut self) {
        let n_regions = self.filter.n_regions;
        for i in 0..self.corpus.n_tokens() {
            if self.corpus.stopword[i] {
                continue;
            }
            let word = self.corpus.word[i];
            let doc = self.corpus.doc[i];
            let region = if self.corpus.toponym[i] {
                let candidates = self.filter.regions_for(word);
                candidates[self.rng.below(candidates.len())] as usize
            } else {
                self.rng.below(n_regions)
            };
            self.assignments.region[i] = region as u32;
            self.stats.increment_word(word, doc, region);
        }
    }

    /// One Gibbs sweep over every non-stopword token at the annealer's
    /// current temperature.
    fn train_sweep(&mut self) -> SweepStats {
        let mut sweep = SweepStats::default();
        let n_regions = self.filter.n_regions;

        for i in 0..self.corpus.n_tokens() {
            if self.corpus.stopword[i] {
                continue;
            }
            let word = self.corpus.word[i];
            let doc = self.corpus.doc[i];
            let old = self.assignments.region[i] as usize;

            self.stats.decrement_word(word, doc, old);

            if self.corpus.toponym[i] {
                self.probs.fill(0.0);
                for &j in self.filter.regions_for(word) {
                    let j = j as usize;
                    self.probs[j] =
                        region_score(&self.stats, word, doc, j, &self.config, self.beta_w);
                }
            } else {
                for j in 0..n_regions {
                    self.probs[j] =
                        region_score(&self.stats, word, doc, j, &self.config, self.beta_w);
                }
            }

            let total = self.annealer.anneal_probs(&mut self.probs);
            if !total.is_finite() || total <= 0.0 {
                // Degenerate mass; keep the previous assignment so the
                // sweep still leaves consistent counts
                self.stats.increment_word(word, doc, old);
                sweep.degenerate_draws += 1;
                continue;
            }

            let target = self.rng.next_uniform() * total;
            let new = cumulative_draw(&self.probs, target);
            self.stats.increment_word(word, doc, new);
            if new != old {
                sweep.changes += 1;
            }
            self.assignments.region[i] = new as u32;
        }

        sweep
    }

    /// Run the full annealing schedule: burn-in sweeps with decaying
    /// temperature, then sampling sweeps whose statistics accumulate
    /// into the posterior sample sums.
    pub fn train(&mut self) -> Result<TrainSummary, ModelError> {
        let mut sweeps = 0;
        let mut degenerate_draws = 0;

        while self.annealer.advance() {
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
    /// region under the sample-averaged statistics. Requires at least
    /// one collected posterior sample.
    pub fn decode(&mut self) -> Result<(), ModelError> {
        if self.stats.samples() == 0 {
            return Err(ModelError::NoSamples);
        }
        let decoder = MapDecoder;
        let n_regions = self.filter.n_regions;

        for i in 0..self.corpus.n_tokens() {
            if self.corpus.stopword[i] {
                continue;
            }
            let word = self.corpus.word[i];
            let doc = self.corpus.doc[i];

            if self.corpus.toponym[i] {
                self.probs.fill(0.0);
                for &j in self.filter.regions_for(word) {
                    let j = j as usize;
                    self.probs[j] =
                        averaged_score(&self.stats, word, doc, j, &self.config, self.beta_w);
                }
            } else {
                for j in 0..n_regions {
                    self.probs[j] =
                        averaged_score(&self.stats, word, doc, j, &self.config, self.beta_w);
                }
            }

            let total = decoder.anneal_probs(&mut self.probs);
            // Only the argmax entry is left standing
            let region = cumulative_draw(&self.probs, total);
            self.assignments.region[i] = region as u32;
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
}

/// Unnormalized conditional for assigning `word` in `doc` to `region`,
/// from the live counts with the token itself already decremented.
fn region_score(
    stats: &RegionStats,
    word: u32,
    doc: u32,
    region: usize,
    config: &ModelConfig,
    beta_w: f64,
) -> f64 {
    (stats.word_region(word, region) as f64 + config.beta)
        / (stats.all_words(region) as f64 + beta_w)
        * (stats.doc_region(doc, region) as f64 + config.alpha)
}

/// Same conditional over the sample-averaged counts, used for decoding.
fn averaged_score(
    stats: &RegionStats,
    word: u32,
    doc: u32,
    region: usize,
    config: &ModelConfig,
    beta_w: f64,
) -> f64 {
    (stats.averaged_word_region(word, region) + config.beta)
        / (stats.averaged_all_words(region) + beta_w)
        * (stats.averaged_doc_region(doc, region) + config.alpha)
}
