use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use peptide_mapper::config::MapperConfig;
use peptide_mapper::driver::{AtomicWaitingHandler, BatchDriver, DriverOptions, QueryMode};
use peptide_mapper::index::{Corpus, FmIndex, FmParams, IndexMeta};
use peptide_mapper::io::lines::{TextLineReader, TextLineWriter};
use peptide_mapper::logging;
use peptide_mapper::mapper::FmMapper;
use peptide_mapper::policy::MatchingMode;
use peptide_mapper::util::mass::Tolerance;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "peptide-mapper",
    author,
    version,
    about = "Map peptides and sequence tags onto a protein database",
    arg_required_else_help = true
)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build an FM index of a protein FASTA
    Index {
        /// Protein FASTA file
        reference: String,
        /// Output prefix; the index is written to <prefix>.pmi
        #[arg(short, long, default_value = "proteins")]
        output: String,
        /// Occ sampling interval
        #[arg(long = "occ-block")]
        occ_block: Option<usize>,
        /// Suffix array sampling rate
        #[arg(long = "sa-sample")]
        sa_sample_rate: Option<u32>,
    },
    /// Map peptides or tags, one per line, and write CSV rows
    Map(MapArgs),
}

#[derive(Args, Debug)]
struct MapArgs {
    /// Prebuilt index (.pmi)
    #[arg(short = 'i', long = "index", conflicts_with = "fasta", required_unless_present = "fasta")]
    index: Option<String>,
    /// Build the index in memory from a protein FASTA
    #[arg(short = 'f', long = "fasta")]
    fasta: Option<String>,
    /// Query file, `-` for stdin
    input: String,
    /// Output CSV path (stdout if omitted)
    #[arg(short, long)]
    out: Option<String>,
    /// Query format
    #[arg(long = "mode", value_enum, default_value_t = QueryMode::Peptide)]
    mode: QueryMode,
    /// Shorthand for `--mode tag`
    #[arg(long, conflicts_with = "mode")]
    tags: bool,
    #[arg(short = 'm', long = "matching", value_enum)]
    matching: Option<MatchingMode>,
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,
    #[arg(long = "batch-size")]
    batch_size: Option<usize>,
    /// Add the prefix.PEPTIDE.suffix column
    #[arg(long)]
    flanking: bool,
    /// Mass tolerance of tag gaps, in Da unless --ppm is given
    #[arg(long)]
    tolerance: Option<f64>,
    #[arg(long, requires = "tolerance")]
    ppm: bool,
    /// Upper bound on literal candidates of an ambiguous query
    #[arg(long = "max-candidates")]
    max_candidates: Option<u64>,
    /// Abort the run when a query exceeds --max-candidates
    #[arg(long = "fail-on-overflow")]
    fail_on_overflow: bool,
    /// JSON config file; command-line flags override it
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose, cli.quiet);
    match cli.command {
        Commands::Index {
            reference,
            output,
            occ_block,
            sa_sample_rate,
        } => {
            let defaults = FmParams::default();
            let params = FmParams {
                occ_block: occ_block.unwrap_or(defaults.occ_block),
                sa_sample_rate: sa_sample_rate.unwrap_or(defaults.sa_sample_rate),
            };
            run_index(&reference, &output, params)
        }
        Commands::Map(args) => run_map(args),
    }
}

fn build_index(reference: &str, params: FmParams) -> Result<FmIndex> {
    let fh = File::open(reference).with_context(|| format!("cannot open protein FASTA '{}'", reference))?;
    let corpus = Corpus::from_fasta(BufReader::new(fh)).with_context(|| format!("cannot read '{}'", reference))?;
    log::info!(
        "reference: {} ({} proteins, {} residues)",
        reference,
        corpus.proteins().len(),
        corpus.residue_count()
    );

    let mut fm = FmIndex::build(corpus, params)?;
    fm.set_meta(IndexMeta {
        reference_file: Some(reference.to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    });
    Ok(fm)
}

fn run_index(reference: &str, output: &str, params: FmParams) -> Result<()> {
    let fm = build_index(reference, params)?;
    let out_path = format!("{}.pmi", output);
    fm.save_to_file(&out_path)
        .with_context(|| format!("cannot write index to '{}'", out_path))?;
    log::info!("FM index saved: {}", out_path);
    Ok(())
}

/// 配置文件为底，命令行参数覆盖。
fn resolve_config(args: &MapArgs) -> Result<MapperConfig> {
    let mut cfg = match &args.config {
        Some(path) => MapperConfig::from_json_file(path)?,
        None => MapperConfig::default(),
    };
    if let Some(m) = args.matching {
        cfg.matching = m;
    }
    if let Some(t) = args.threads {
        cfg.threads = t;
    }
    if let Some(b) = args.batch_size {
        cfg.batch_size = b;
    }
    if let Some(n) = args.max_candidates {
        cfg.max_candidates = n;
    }
    if let Some(tol) = args.tolerance {
        cfg.tolerance = if args.ppm { Tolerance::Ppm(tol) } else { Tolerance::Da(tol) };
    }
    cfg.flanking |= args.flanking;
    cfg.fail_on_overflow |= args.fail_on_overflow;
    cfg.validate()?;
    Ok(cfg)
}

fn run_map(args: MapArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;
    let index = match (&args.index, &args.fasta) {
        (Some(path), _) => {
            let fm = FmIndex::load_from_file(path).with_context(|| format!("cannot load index '{}'", path))?;
            if let Some(reference) = &fm.meta().reference_file {
                log::info!("index: {} (built from {})", path, reference);
            }
            fm
        }
        (None, Some(fasta)) => build_index(fasta, cfg.fm_params())?,
        (None, None) => anyhow::bail!("either --index or --fasta is required"),
    };
    let mapper = FmMapper::new(index);

    let mode = if args.tags { QueryMode::Tag } else { args.mode };
    let options = DriverOptions {
        mode,
        batch_size: cfg.batch_size,
        flanking: cfg.flanking,
        fail_on_overflow: cfg.fail_on_overflow,
    };
    log::debug!("config: {:?}", cfg);

    let input: Box<dyn std::io::BufRead + Send> = if args.input == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let fh = File::open(&args.input).with_context(|| format!("cannot open query file '{}'", args.input))?;
        Box::new(BufReader::new(fh))
    };
    let output: Box<dyn std::io::Write + Send> = match &args.out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create output '{}'", path))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };

    let handler = AtomicWaitingHandler::new();
    let driver = BatchDriver::new(
        &mapper,
        cfg.policy(),
        cfg.tag_params(),
        options,
        &handler,
        TextLineReader::new(input),
        TextLineWriter::new(output),
    );
    let summary = driver.run(cfg.threads)?;
    if summary.overflowed > 0 {
        log::warn!(
            "{} queries exceeded {} literal candidates and were skipped",
            summary.overflowed,
            cfg.max_candidates
        );
    }
    Ok(())
}
