//! σ-MART command-line interface.
//!
//! Computes interval transition-probability bounds for a partitioned
//! stochastic system and synthesizes piecewise-constant barrier
//! certificates from them.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mart_core::{
    BarrierAlgorithm, ProbabilityConfig, SynthesisConfig, UpperBoundMethod,
};
use mart_data::{
    load_partitions, load_probabilities, load_system, save_barrier_txt, save_certificate,
    save_probabilities,
};
use mart_geom::Hyperrectangle;
use mart_prob::{attach_probabilities, transition_probabilities};
use mart_synth::{post_compute_beta, synthesize_barrier};
use ndarray::Array1;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Upper-bound method selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum MethodArg {
    /// Box relaxation (fast, loose)
    Box,
    /// Projected gradient to convergence (tight, slow, default)
    #[default]
    Global,
    /// Conditional gradient with dual-gap termination
    FrankWolfe,
}

impl From<MethodArg> for UpperBoundMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Box => UpperBoundMethod::BoxApproximation,
            MethodArg::Global => UpperBoundMethod::GlobalSolver,
            MethodArg::FrankWolfe => UpperBoundMethod::frank_wolfe(),
        }
    }
}

impl std::fmt::Display for MethodArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodArg::Box => write!(f, "box"),
            MethodArg::Global => write!(f, "global"),
            MethodArg::FrankWolfe => write!(f, "frank-wolfe"),
        }
    }
}

/// Barrier algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum AlgorithmArg {
    /// Primal LP over upper probability bounds (default)
    #[default]
    Constant,
    /// Explicit dual of the primal LP
    Dual,
    /// Alternating LP / worst-case redistribution
    Iterative,
    /// Alias of the iterative scheme
    FrankWolfe,
    /// Projected subgradient descent
    GradientDescent,
    /// Sum-of-squares backend (not provided; rejected at run time)
    Sos,
}

impl From<AlgorithmArg> for BarrierAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Constant => BarrierAlgorithm::Constant,
            AlgorithmArg::Dual => BarrierAlgorithm::DualConstant,
            AlgorithmArg::Iterative => BarrierAlgorithm::Iterative,
            AlgorithmArg::FrankWolfe => BarrierAlgorithm::FrankWolfe,
            AlgorithmArg::GradientDescent => BarrierAlgorithm::GradientDescent,
            AlgorithmArg::Sos => BarrierAlgorithm::Sos,
        }
    }
}

impl std::fmt::Display for AlgorithmArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlgorithmArg::Constant => write!(f, "constant"),
            AlgorithmArg::Dual => write!(f, "dual"),
            AlgorithmArg::Iterative => write!(f, "iterative"),
            AlgorithmArg::FrankWolfe => write!(f, "frank-wolfe"),
            AlgorithmArg::GradientDescent => write!(f, "gradient-descent"),
            AlgorithmArg::Sos => write!(f, "sos"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum LogFormat {
    /// Human-readable text output (default)
    #[default]
    Text,
    /// JSON lines for machine parsing
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Parser)]
#[command(name = "mart")]
#[command(version)]
#[command(about = "Stochastic barrier certificate synthesis", long_about = None)]
struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProbabilityArgs {
    /// Upper-bound method
    #[arg(long, value_enum, default_value_t = MethodArg::Global)]
    method: MethodArg,

    /// Pruning threshold for negligible region pairs
    #[arg(long, default_value_t = 1e-12)]
    sparsity_eps: f64,

    /// Worker thread cap (default: all cores)
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Args)]
struct SynthesisArgs {
    /// Barrier synthesis algorithm
    #[arg(long, value_enum, default_value_t = AlgorithmArg::Constant)]
    algorithm: AlgorithmArg,

    /// Time horizon N in the certified bound η + N·β
    #[arg(long, default_value_t = 1)]
    horizon: usize,

    /// Initial region, per-coordinate lower bounds (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    initial_low: Vec<f64>,

    /// Initial region, per-coordinate upper bounds (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    initial_high: Vec<f64>,

    /// Obstacle region, per-coordinate lower bounds (comma-separated)
    #[arg(long, value_delimiter = ',')]
    obstacle_low: Option<Vec<f64>>,

    /// Obstacle region, per-coordinate upper bounds (comma-separated)
    #[arg(long, value_delimiter = ',')]
    obstacle_high: Option<Vec<f64>>,

    /// Re-optimize β per region after the solve
    #[arg(long, default_value_t = false)]
    post_beta: bool,

    /// Certificate output (JSON)
    #[arg(long)]
    out: PathBuf,

    /// Also write the barrier vector as plain text, one value per line
    #[arg(long)]
    barrier_txt: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute transition-probability bounds for a system over a partition
    Probabilities {
        /// System description (JSON)
        #[arg(long)]
        system: PathBuf,

        /// Region partition (JSON)
        #[arg(long)]
        partitions: PathBuf,

        /// Output probability dataset (JSON, sparse layout)
        #[arg(long)]
        out: PathBuf,

        #[command(flatten)]
        probability: ProbabilityArgs,
    },

    /// Synthesize a barrier certificate from precomputed probabilities
    Synthesize {
        /// Probability dataset (JSON, dense or sparse layout)
        #[arg(long)]
        probabilities: PathBuf,

        /// Region partition (JSON)
        #[arg(long)]
        partitions: PathBuf,

        #[command(flatten)]
        synthesis: SynthesisArgs,
    },

    /// Probabilities and synthesis in one run
    Certify {
        /// System description (JSON)
        #[arg(long)]
        system: PathBuf,

        /// Region partition (JSON)
        #[arg(long)]
        partitions: PathBuf,

        /// Also persist the probability dataset (JSON, sparse layout)
        #[arg(long)]
        probabilities_out: Option<PathBuf>,

        #[command(flatten)]
        probability: ProbabilityArgs,

        #[command(flatten)]
        synthesis: SynthesisArgs,
    },
}

fn init_logging(verbose: u8, format: LogFormat) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    match format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
            tracing::subscriber::set_global_default(subscriber).ok();
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber).ok();
        }
    }
}

fn probability_config(args: &ProbabilityArgs, report_progress: bool) -> ProbabilityConfig {
    ProbabilityConfig {
        upper_bound_method: args.method.into(),
        sparsity_eps: args.sparsity_eps,
        max_threads: args.threads,
        report_progress,
        ..Default::default()
    }
}

fn region_from_bounds(low: &[f64], high: &[f64], what: &str) -> Result<Hyperrectangle> {
    Hyperrectangle::new(
        Array1::from_vec(low.to_vec()),
        Array1::from_vec(high.to_vec()),
    )
    .with_context(|| format!("invalid {what} region"))
}

fn run_synthesis(
    regions: &[mart_prob::RegionWithProbabilities],
    args: &SynthesisArgs,
) -> Result<()> {
    let initial = region_from_bounds(&args.initial_low, &args.initial_high, "initial")?;
    let obstacle = match (&args.obstacle_low, &args.obstacle_high) {
        (Some(low), Some(high)) => Some(region_from_bounds(low, high, "obstacle")?),
        (None, None) => None,
        _ => bail!("obstacle region needs both --obstacle-low and --obstacle-high"),
    };

    let config = SynthesisConfig {
        algorithm: args.algorithm.into(),
        time_horizon: args.horizon,
        ..Default::default()
    };
    let mut certificate =
        synthesize_barrier(regions, &initial, obstacle.as_ref(), &config)
            .context("barrier synthesis failed")?;

    if args.post_beta {
        let (beta_updated, beta_per_region) = post_compute_beta(&certificate, regions)
            .context("post-solve beta refinement failed")?;
        info!(
            beta = certificate.beta,
            beta_updated, "post-solve beta refinement"
        );
        certificate.beta = beta_updated.max(config.decision_floor);
        certificate.beta_per_region = beta_per_region;
    }

    println!(
        "eta = {:.6e}, beta = {:.6e}, certified bound (N = {}) = {:.6e}",
        certificate.eta,
        certificate.beta,
        args.horizon,
        certificate.certified_bound(args.horizon)
    );

    save_certificate(&args.out, &certificate)
        .with_context(|| format!("writing certificate to {}", args.out.display()))?;
    if let Some(txt) = &args.barrier_txt {
        save_barrier_txt(txt, &certificate)
            .with_context(|| format!("writing barrier vector to {}", txt.display()))?;
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Probabilities {
            system,
            partitions,
            out,
            probability,
        } => {
            let system = load_system(&system).context("loading system")?;
            let partition = load_partitions(&partitions).context("loading partitions")?;
            let config = probability_config(&probability, cli.verbose >= 2);
            let matrices = transition_probabilities(&system, &partition, &config)
                .context("computing transition probabilities")?;
            info!(
                regions = matrices.num_regions(),
                nnz = matrices.upper.nnz(),
                density = matrices.upper.density(),
                "probability bounds computed"
            );
            save_probabilities(&out, &matrices)
                .with_context(|| format!("writing probabilities to {}", out.display()))?;
        }

        Commands::Synthesize {
            probabilities,
            partitions,
            synthesis,
        } => {
            let matrices =
                load_probabilities(&probabilities).context("loading probabilities")?;
            let partition = load_partitions(&partitions).context("loading partitions")?;
            let regions = attach_probabilities(&partition, &matrices)
                .context("pairing partitions with probabilities")?;
            run_synthesis(&regions, &synthesis)?;
        }

        Commands::Certify {
            system,
            partitions,
            probabilities_out,
            probability,
            synthesis,
        } => {
            let system = load_system(&system).context("loading system")?;
            let partition = load_partitions(&partitions).context("loading partitions")?;
            let config = probability_config(&probability, cli.verbose >= 2);
            let matrices = transition_probabilities(&system, &partition, &config)
                .context("computing transition probabilities")?;
            if let Some(out) = &probabilities_out {
                save_probabilities(out, &matrices)
                    .with_context(|| format!("writing probabilities to {}", out.display()))?;
            }
            let regions = attach_probabilities(&partition, &matrices)
                .context("pairing partitions with probabilities")?;
            run_synthesis(&regions, &synthesis)?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
