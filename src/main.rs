use clap::{Parser, ValueEnum};
use hashrf_tree_distances::config::{DEFAULT_COLLISION_FACTOR, HashRfConfig};
use hashrf_tree_distances::error::Result;
use hashrf_tree_distances::hashrf::pairwise_hashrf;
use hashrf_tree_distances::io::{Presentation, read_declared_trees, write_distances};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Compute pairwise Robinson-Foulds distances for a collection of trees with
/// the HashRF algorithm.
#[derive(Parser, Debug)]
#[command(
    name = "hashrf-dists",
    version,
    about = "Pairwise (weighted) RF distance matrix via universal hashing"
)]
struct Args {
    /// Newick or NEXUS tree file, optionally gzip-compressed
    input: PathBuf,

    /// Number of trees to use from the start of the file (0 = all)
    #[arg(default_value_t = 0)]
    num_trees: usize,

    /// Weighted RF distance using branch lengths
    #[arg(short = 'w', long = "weighted", default_value_t = false)]
    weighted: bool,

    /// Collision factor c in m2 > c * t * n
    #[arg(short = 'c', long = "collision-factor", default_value_t = DEFAULT_COLLISION_FACTOR)]
    collision_factor: u64,

    /// Output layout
    #[arg(short = 'p', long = "print", value_enum, default_value_t = PresentationArg::Matrix)]
    print: PresentationArg,

    /// Output path, `-` for stdout; a `.gz` suffix compresses the output
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,

    /// Only report the number of unique bipartitions
    #[arg(short = 'u', long = "unique-only", default_value_t = false)]
    unique_only: bool,

    /// Fixed seed for the hash coefficients
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Assemble the matrix on all cores
    #[arg(long = "parallel", default_value_t = false)]
    parallel: bool,

    /// Quiet mode: only warnings and errors on stderr
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PresentationArg {
    None,
    List,
    Rate,
    Matrix,
    Cmb,
    Tsv,
}

impl From<PresentationArg> for Presentation {
    fn from(arg: PresentationArg) -> Self {
        match arg {
            PresentationArg::None => Presentation::None,
            PresentationArg::List => Presentation::List,
            PresentationArg::Rate => Presentation::Rate,
            PresentationArg::Matrix => Presentation::Matrix,
            PresentationArg::Cmb => Presentation::LowerTriangle,
            PresentationArg::Tsv => Presentation::Tsv,
        }
    }
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let presentation = Presentation::from(args.print);
    // fail before hashing anything
    presentation.check(args.weighted)?;

    let config = HashRfConfig::default()
        .weighted(args.weighted)
        .collision_factor(args.collision_factor)
        .seed(args.seed)
        .parallel(args.parallel);

    let t0 = Instant::now();
    let named_trees = read_declared_trees(&args.input, args.num_trees)?;
    let (names, trees): (Vec<String>, Vec<_>) = named_trees.into_iter().unzip();
    info!(
        trees = trees.len(),
        secs = t0.elapsed().as_secs_f64(),
        "read input"
    );

    let t1 = Instant::now();
    let out = pairwise_hashrf(&trees, &config)?;
    info!(
        pairs = trees.len() * (trees.len() - 1) / 2,
        secs = t1.elapsed().as_secs_f64(),
        "computed {} distances",
        if args.weighted { "weighted RF" } else { "RF" }
    );

    if args.unique_only {
        println!("# of unique bipartitions = {}", out.unique_bipartitions);
        return Ok(());
    }

    let t2 = Instant::now();
    write_distances(&args.output, &names, &out.matrix, presentation)?;
    let target = if args.output.as_os_str() == "-" { "stdout" } else { "output" };
    info!(
        secs = t2.elapsed().as_secs_f64(),
        "wrote to {target}"
    );
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.quiet);

    if let Err(e) = run(&args) {
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }
}
