//! Collapsed Gibbs sampling for document geolocation
//!
//! Jointly infers a region assignment per token (and a candidate
//! coordinate per toponym token) over a token-array corpus. Two
//! samplers: a discrete model with a fixed region inventory constrained
//! by a gazetteer filter, and a spherical model that grows its region
//! inventory nonparametrically and ties regions to directions on the
//! unit sphere. A simulated-annealing schedule drives the burn-in
//! temperature and the posterior sample accumulation that the final
//! maximum-a-posteriori decode reads.

pub mod anneal;
pub mod config;
pub mod discrete;
pub mod error;
pub mod geo;
pub mod io;
pub mod rng;
pub mod spherical;
pub mod stats;
pub mod types;

// Re-export core types
pub use anneal::{Annealer, MapDecoder, Phase, Schedule};
pub use config::ModelConfig;
pub use discrete::DiscreteRegionModel;
pub use error::ModelError;
pub use geo::Coordinate;
pub use io::{read_run, read_run_info, write_run, ModelMode, RunBundle};
pub use rng::RandomSource;
pub use spherical::SphericalRegionModel;
pub use stats::RegionStats;
pub use types::{Assignments, Corpus, Lexicon, RegionFilter, TrainSummary};

/// Our magic number for run file headers
pub const RUN_MAGIC: u32 = 0x47475253; // "GGRS" in hex

/// Version for binary format compatibility
pub const RUN_VERSION: u16 = 1;
