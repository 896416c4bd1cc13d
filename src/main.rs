use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kgsample::config::{self, ExtractConfig};
use kgsample::extract::run_extraction;
use kgsample::import::ImportConfig;
use kgsample::models::EntityKind;
use kgsample::relations::EdgePolicy;
use kgsample::sampling::SamplingMode;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "kgsample")]
#[command(about = "Sample RDF N-Triples and JSON-LD dumps into Neo4j import files")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample an N-Triples or JSON-LD file into CSV import files
    Extract(ExtractArgs),
    /// Load extracted CSV files into Neo4j
    Load(LoadArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Input file (.nt, .nt.bz2, .jsonld, .json)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for generated files
    #[arg(short, long)]
    output: PathBuf,

    /// Maximum number of items kept in the sample
    #[arg(long, default_value_t = config::DEFAULT_SAMPLE_SIZE)]
    sample: usize,

    /// N-Triples lines read per chunk
    #[arg(long, default_value_t = config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Uniform reservoir sample instead of the first N items
    #[arg(long)]
    random_sample: bool,

    /// Seed for reservoir sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Read the whole input in reservoir mode instead of stopping at 10x the sample size
    #[arg(long)]
    no_early_stop: bool,

    /// Resolve relationships to not-yet-seen entities after the pass instead of dropping them
    #[arg(long)]
    deferred_edges: bool,

    /// Dry run - don't write output files
    #[arg(long)]
    dry_run: bool,

    /// Clear the output directory before starting
    #[arg(long)]
    clean: bool,
}

#[derive(Args)]
struct LoadArgs {
    /// Directory containing kgsample output files
    #[arg(short, long)]
    output: PathBuf,

    /// Neo4j Bolt URI
    #[arg(long, env = "NEO4J_URI", default_value = config::DEFAULT_BOLT_URI)]
    bolt_uri: String,

    #[arg(long, env = "NEO4J_USER", default_value = config::DEFAULT_NEO4J_USER)]
    user: String,

    #[arg(long, env = "NEO4J_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    #[arg(long, env = "NEO4J_DATABASE", default_value = config::DEFAULT_NEO4J_DATABASE)]
    database: String,

    /// Import file URI prefix for Neo4j LOAD CSV
    #[arg(long, default_value = config::DEFAULT_IMPORT_PREFIX)]
    import_prefix: String,

    /// Clear existing Neo4j data before loading
    #[arg(long)]
    clean: bool,
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    if args.clean && !args.dry_run && args.output.exists() {
        info!("Cleaning output directory: {}", args.output.display());
        fs::remove_dir_all(&args.output).with_context(|| {
            format!("Failed to clean output directory: {}", args.output.display())
        })?;
    }

    let mut config = ExtractConfig::new(args.input, args.output);
    config.sample_size = args.sample;
    config.chunk_size = args.chunk_size;
    config.seed = args.seed;
    config.early_stop = !args.no_early_stop;
    config.dry_run = args.dry_run;
    if args.random_sample {
        config.mode = SamplingMode::Reservoir;
    }
    if args.deferred_edges {
        config.edge_policy = EdgePolicy::Deferred;
    }

    let start = Instant::now();
    let outcome = run_extraction(&config)?;
    let stats = &outcome.stats;

    println!();
    println!("=== Summary ===");
    println!("Input format:       {:?}", outcome.format);
    println!("Sampling mode:      {:?}", config.mode);
    println!("Elapsed time:       {:.2}s", start.elapsed().as_secs_f64());
    println!();
    println!("Lines read:         {}", stats.lines());
    println!("Lines skipped:      {}", stats.skipped());
    println!("Valid items:        {}", stats.valid());
    println!("Parse failures:     {}", stats.failures());
    println!("Sampled items:      {}", outcome.sample.len());
    println!("Replacements:       {}", stats.replacements());
    println!("Property updates:   {}", stats.property_updates());
    println!();
    for kind in EntityKind::ALL {
        let count = outcome.store.count(kind);
        if count > 0 {
            println!("{:<20}{count}", format!("{}:", kind.label()));
        }
    }
    println!("Relationships:      {}", stats.relationships());
    println!("Dropped edges:      {}", stats.dropped());
    if let Some(manifest) = &outcome.manifest {
        println!();
        println!(
            "Wrote {} node files to {}",
            manifest.nodes.len(),
            config.output_dir.display()
        );
    }

    Ok(())
}

fn run_load(args: LoadArgs) -> Result<()> {
    let config = ImportConfig {
        output_dir: args.output,
        bolt_uri: args.bolt_uri,
        user: args.user,
        password: args.password,
        database: args.database,
        import_prefix: args.import_prefix,
        clean: args.clean,
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("kgsample-load-worker")
        .enable_io()
        .enable_time()
        .build()?;
    rt.block_on(kgsample::import::run_import(config))
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::Load(args) => run_load(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
