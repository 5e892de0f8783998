//! Annealing schedule for Gibbs sweeps
//!
//! The [`Annealer`] drives the outer iteration loop: it owns the
//! temperature schedule, decides when burn-in ends and posterior
//! samples start being collected, and sharpens or flattens candidate
//! probability vectors before each draw. Statistics accumulation itself
//! lives in [`crate::stats::RegionStats`] so live and averaged arrays
//! can never grow out of lockstep.

use crate::error::ModelError;

/// Temperatures closer than this are treated as equal.
pub const TEMPERATURE_EPSILON: f64 = 1e-9;

/// Where the annealer is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Temperature is interpolating; no samples are recorded.
    BurnIn,
    /// Temperature is pinned at target; every sweep's statistics are
    /// folded into the running sums.
    Sampling,
    /// Iteration budget exhausted.
    Done,
}

/// Temperature policy for a run.
#[derive(Debug, Clone, Copy)]
pub enum Schedule {
    /// Temperature pinned for the whole run. Used when initial and
    /// target temperature coincide, skipping simulated annealing.
    Fixed {
        /// The pinned temperature.
        temperature: f64,
    },
    /// Genuine simulated annealing: geometric interpolation from
    /// `initial` down to `target` across the burn-in iterations.
    Simulated {
        /// Temperature at the first burn-in iteration.
        initial: f64,
        /// Temperature reached when sampling starts.
        target: f64,
    },
}

impl Schedule {
    /// A pinned-temperature schedule.
    pub fn fixed(temperature: f64) -> Self {
        Self::Fixed { temperature }
    }

    /// A simulated-annealing schedule. Requesting one with nothing to
    /// anneal is a configuration error; use [`Schedule::fixed`] instead.
    pub fn simulated(initial: f64, target: f64) -> Result<Self, ModelError> {
        if (initial - target).abs() < TEMPERATURE_EPSILON {
            return Err(ModelError::Config(format!(
                "simulated annealing requested with initial temperature equal to target ({initial})"
            )));
        }
        Ok(Self::Simulated { initial, target })
    }

    /// Pick the schedule the way the configuration implies: equal
    /// temperatures mean a pinned run, anything else anneals.
    pub fn from_temperatures(initial: f64, target: f64) -> Self {
        if (initial - target).abs() < TEMPERATURE_EPSILON {
            Self::Fixed {
                temperature: target,
            }
        } else {
            Self::Simulated { initial, target }
        }
    }

    fn target(&self) -> f64 {
        match *self {
            Self::Fixed { temperature } => temperature,
            Self::Simulated { target, .. } => target,
        }
    }
}

/// Iteration and temperature state machine for one training run.
#[derive(Debug, Clone)]
pub struct Annealer {
    schedule: Schedule,
    burn_in: usize,
    sampling: usize,
    iteration: usize,
    phase: Phase,
    temperature: f64,
}

impl Annealer {
    /// Create an annealer over `burn_in` + `sampling` iterations.
    pub fn new(schedule: Schedule, burn_in: usize, sampling: usize) -> Result<Self, ModelError> {
        if let Schedule::Simulated { .. } = schedule {
            if burn_in == 0 {
                return Err(ModelError::Config(
                    "simulated annealing needs at least one burn-in iteration".to_string(),
                ));
            }
        }
        Ok(Self {
            schedule,
            burn_in,
            sampling,
            iteration: 0,
            phase: if burn_in == 0 {
                Phase::Sampling
            } else {
                Phase::BurnIn
            },
            temperature: match schedule {
                Schedule::Fixed { temperature } => temperature,
                Schedule::Simulated { initial, .. } => initial,
            },
        })
    }

    /// Build from the run configuration.
    pub fn from_config(config: &crate::config::ModelConfig) -> Result<Self, ModelError> {
        let schedule =
            Schedule::from_temperatures(config.initial_temperature, config.target_temperature);
        Self::new(
            schedule,
            config.burn_in_iterations,
            config.sampling_iterations,
        )
    }

    /// Step to the next outer iteration, setting phase and temperature
    /// for the sweep about to run. Returns `false` exactly when the
    /// iteration budget is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.iteration >= self.burn_in + self.sampling {
            self.phase = Phase::Done;
            return false;
        }

        if self.iteration < self.burn_in {
            self.phase = Phase::BurnIn;
            self.temperature = match self.schedule {
                Schedule::Fixed { temperature } => temperature,
                Schedule::Simulated { initial, target } => {
                    // Geometric interpolation; hits target exactly when
                    // sampling starts.
                    let fraction = self.iteration as f64 / self.burn_in as f64;
                    initial * (target / initial).powf(fraction)
                }
            };
        } else {
            self.phase = Phase::Sampling;
            self.temperature = self.schedule.target();
        }

        self.iteration += 1;
        true
    }

    /// Current sweep temperature.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 0-based index of the iteration most recently started.
    pub fn iteration(&self) -> usize {
        self.iteration.saturating_sub(1)
    }

    /// Whether the sweep that just ran should be folded into the
    /// posterior sample sums.
    pub fn collecting(&self) -> bool {
        self.phase == Phase::Sampling
    }

    /// Raise each unnormalized weight to `1 / temperature` and return
    /// the new total mass. No renormalization happens here; the draw
    /// divides by the returned total. At temperature 1.0 the vector is
    /// left untouched.
    pub fn anneal_probs(&self, probs: &mut [f64]) -> f64 {
        anneal_at(self.temperature, probs)
    }
}

fn anneal_at(temperature: f64, probs: &mut [f64]) -> f64 {
    if (temperature - 1.0).abs() < TEMPERATURE_EPSILON {
        return probs.iter().sum();
    }
    let inverse = 1.0 / temperature;
    let mut total = 0.0;
    for p in probs.iter_mut() {
        *p = p.powf(inverse);
        total += *p;
    }
    total
}

/// Zero-temperature decoder for the final deterministic sweep.
///
/// Keeps only the maximum-mass entry (the T -> 0 limit of annealing),
/// so the cumulative-sum draw lands on the maximum-a-posteriori
/// candidate no matter what the RNG produces. Never accumulates
/// samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapDecoder;

impl MapDecoder {
    /// Zero out everything but the first maximum entry; returns the
    /// remaining total (the maximum itself).
    pub fn anneal_probs(&self, probs: &mut [f64]) -> f64 {
        let mut best = 0usize;
        let mut best_mass = f64::NEG_INFINITY;
        for (i, &p) in probs.iter().enumerate() {
            if p > best_mass {
                best = i;
                best_mass = p;
            }
        }
        for (i, p) in probs.iter_mut().enumerate() {
            if i != best {
                *p = 0.0;
            }
        }
        probs[best]
    }
}
