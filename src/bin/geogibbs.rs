//! geogibbs command-line interface
//!
//! `train` reads the token array plus the model's geometry input
//! (region filter or coordinate lexicon), runs the full annealing
//! schedule, decodes, and writes the run bundle. `info` summarizes a
//! bundle from its manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use geogibbs::{
    io, DiscreteRegionModel, ModelConfig, ModelMode, RunBundle, SphericalRegionModel,
};

/// Collapsed Gibbs sampling for document geolocation
#[derive(Parser, Debug)]
#[command(name = "geogibbs")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Fixed region inventory with a gazetteer region filter
    Discrete,
    /// Nonparametric region growth with candidate coordinates
    Spherical,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model, decode, and write the run bundle
    Train {
        /// Sampler to run
        #[arg(long, value_enum, default_value = "discrete")]
        mode: Mode,

        /// Token array file: `word doc is_toponym is_stopword` per line
        #[arg(long)]
        tokens: PathBuf,

        /// Region filter file: `toponym region region ...` (discrete)
        #[arg(long)]
        filter: Option<PathBuf>,

        /// Number of regions in the inventory (discrete)
        #[arg(long)]
        regions: Option<usize>,

        /// Candidate coordinate lexicon: `toponym lat,lng ...` (spherical)
        #[arg(long)]
        lexicon: Option<PathBuf>,

        /// TOML configuration file; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Random seed override; 0 draws the seed from entropy
        #[arg(long)]
        seed: Option<u64>,

        /// Output base path for the run bundle
        #[arg(long)]
        out: String,
    },

    /// Summarize a run bundle from its manifest
    Info {
        /// Base path of the run bundle
        #[arg(long)]
        run: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("geogibbs=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train {
            mode,
            tokens,
            filter,
            regions,
            lexicon,
            config,
            seed,
            out,
        } => {
            let mut model_config = match config {
                Some(path) => ModelConfig::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => ModelConfig::default(),
            };
            if let Some(seed) = seed {
                model_config.seed = seed;
            }

            let corpus = io::read_token_file(&tokens)
                .with_context(|| format!("reading tokens {}", tokens.display()))?;
            println!(
                "Loaded {} tokens ({} words, {} documents)",
                corpus.n_tokens(),
                corpus.n_words,
                corpus.n_docs
            );

            let bundle = match mode {
                Mode::Discrete => {
                    let filter_path = filter.context("--filter is required for discrete mode")?;
                    let n_regions = regions.context("--regions is required for discrete mode")?;
                    let region_filter = io::read_filter_file(&filter_path, n_regions)
                        .with_context(|| format!("reading filter {}", filter_path.display()))?;

                    let mut model = DiscreteRegionModel::new(corpus, region_filter, model_config)?;
                    model.random_initialize();
                    let summary = model.train()?;
                    model.decode()?;
                    println!(
                        "Trained {} sweeps, {} samples, {} regions",
                        summary.sweeps, summary.samples, summary.regions
                    );
                    RunBundle::from_model(ModelMode::Discrete, model.assignments(), model.stats())?
                }
                Mode::Spherical => {
                    let lexicon_path =
                        lexicon.context("--lexicon is required for spherical mode")?;
                    let coord_lexicon = io::read_lexicon_file(&lexicon_path)
                        .with_context(|| format!("reading lexicon {}", lexicon_path.display()))?;

                    let mut model = SphericalRegionModel::new(corpus, coord_lexicon, model_config)?;
                    model.random_initialize();
                    let summary = model.train()?;
                    model.decode()?;
                    println!(
                        "Trained {} sweeps, {} samples, {} regions",
                        summary.sweeps, summary.samples, summary.regions
                    );
                    RunBundle::from_model(ModelMode::Spherical, model.assignments(), model.stats())?
                }
            };

            io::write_run(&bundle, &out).with_context(|| format!("writing run {out}"))?;
            println!("Run saved to {out}");
            Ok(())
        }

        Command::Info { run } => {
            let info = io::read_run_info(&run).with_context(|| format!("reading run {run}"))?;
            println!("Run information:");
            println!("  Mode: {}", info.mode);
            println!("  Tokens: {}", info.n_tokens);
            println!("  Vocabulary: {}", info.n_words);
            println!("  Documents: {}", info.n_docs);
            println!("  Regions: {}", info.n_regions);
            println!("  Posterior samples: {}", info.samples);
            Ok(())
        }
    }
}
