//! Thin command-line wrapper around the hypercut library.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use hypercut::prelude::*;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    Deterministic,
    Speed,
    HighQuality,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Hmetis,
    Metis,
}

#[derive(Parser, Debug)]
#[command(
    name = "hypercut",
    about = "Balanced k-way hypergraph partitioning",
    version
)]
struct Args {
    /// Input hypergraph file.
    hypergraph: PathBuf,

    /// Number of blocks.
    #[arg(short = 'k', long)]
    blocks: u32,

    /// Imbalance tolerance.
    #[arg(short, long, default_value_t = 0.03)]
    epsilon: f64,

    /// Objective: km1 or cut.
    #[arg(short, long, default_value = "km1")]
    objective: String,

    /// Random seed.
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Worker threads (0 = all available CPUs).
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// Configuration preset.
    #[arg(short, long, value_enum, default_value_t = PresetArg::Speed)]
    preset: PresetArg,

    /// INI-style configuration file applied on top of the preset.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input file format.
    #[arg(short, long, value_enum, default_value_t = FormatArg::Hmetis)]
    format: FormatArg,

    /// Write `<input>.part<k>.epsilon<eps>` with one block id per line.
    #[arg(long)]
    write_partition: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: Args) -> Result<(), HypercutError> {
    let mut ctx = Context::new();
    ctx.load_preset(match args.preset {
        PresetArg::Deterministic => Preset::Deterministic,
        PresetArg::Speed => Preset::Speed,
        PresetArg::HighQuality => Preset::HighQuality,
    });
    if let Some(config) = &args.config {
        ctx.configure_from_file(config)?;
    }
    ctx.set_parameter("NUM_BLOCKS", &args.blocks.to_string())?;
    ctx.set_parameter("EPSILON", &args.epsilon.to_string())?;
    ctx.set_parameter("OBJECTIVE", &args.objective)?;
    ctx.set_parameter("SEED", &args.seed.to_string())?;
    ctx.set_parameter("VERBOSE", if args.verbose { "1" } else { "0" })?;
    ctx.shared.num_threads = args.threads;

    let format = match args.format {
        FormatArg::Hmetis => FileFormat::Hmetis,
        FormatArg::Metis => FileFormat::Metis,
    };
    let raw = read_hypergraph_from_file(&args.hypergraph, format)?;
    let (hg, removed) = raw.into_hypergraph()?;
    if args.verbose {
        log::info!(
            "hypergraph: {} nodes, {} edges, {} pins ({} single-pin removed, {} parallel merged)",
            hg.num_nodes(),
            hg.num_edges(),
            hg.num_pins(),
            removed.single_pin,
            removed.parallel
        );
    }

    let pool = hypercut::initialize_thread_pool(ctx.shared.num_threads, ctx.partition.seed)?;
    let phg = pool.install(|| partition(hg, &ctx))?;

    let objective = metrics::objective(&phg, ctx.partition.objective);
    println!("objective ({}) = {}", ctx.partition.objective, objective);
    println!("imbalance = {:.4}", metrics::imbalance(&phg));
    if args.verbose {
        for p in 0..ctx.partition.k {
            log::info!("block {}: weight {}", p, phg.part_weight(p));
        }
    }

    if args.write_partition {
        let out = write_partition_file(
            &args.hypergraph,
            &phg.partition_vec(),
            ctx.partition.k,
            ctx.partition.epsilon,
        )?;
        println!("partition written to {}", out.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
