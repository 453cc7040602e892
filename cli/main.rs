// ========================================================================================
//
//                            The clumping orchestrator
//
// ========================================================================================
//
// Reads a summary-statistics file, optionally reconciles it with a second file,
// attaches the precomputed link graph and coverage masks, clumps, and writes the
// retained variants as a tab-separated table.

#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Parser, ValueEnum};
use csv::WriterBuilder;
use gnomon_clump::columns::FieldSeparator;
use gnomon_clump::config::{ClumpConfig, ModeSetting};
use gnomon_clump::diagnostics::LogDiagnostics;
use gnomon_clump::engine::{ClumpOutcome, clump_by_chromosome, run_clumping};
use gnomon_clump::ingest::{merge_secondary, read_summary_statistics};
use gnomon_clump::links::{read_coverage, read_link_graph};
use gnomon_clump::locus::Locus;
use gnomon_clump::types::LocusIndex;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

// ========================================================================================
//                         Command-line interface definition
// ========================================================================================

/// Row order of the output table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputOrder {
    /// Chromosome (natural order), then position.
    Genomic,
    /// Most significant first.
    Rank,
    /// As read from the summary statistics.
    Input,
}

#[derive(Parser, Debug)]
#[clap(
    name = "gnomon-clump",
    version,
    about = "Clump GWAS summary statistics over a precomputed linkage graph."
)]
struct Args {
    /// Summary-statistics file (plain text or .gz).
    base: PathBuf,

    /// Pairwise link table: `ID_A ID_B [R2]` per line.
    #[clap(long, value_name = "PATH")]
    links: Option<PathBuf>,

    /// Coverage table: `ID bin[,bin...]` per line.
    #[clap(long, value_name = "PATH")]
    coverage: Option<PathBuf>,

    /// Second summary-statistics file whose alleles are reconciled with the base.
    /// Its layout comes from `[secondary.columns]` in the configuration when given.
    #[clap(long, value_name = "PATH")]
    secondary: Option<PathBuf>,

    /// TOML configuration file.
    #[clap(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Proxy clumping: absorb the coverage of neighbours with r2 at or above this value.
    #[clap(long, value_name = "R2")]
    proxy: Option<f64>,

    /// Treat the column options as 0-based indices of a header-less file.
    #[clap(long)]
    index: bool,

    #[clap(long)]
    chr: Option<String>,
    /// Reference (effect) allele column.
    #[clap(long)]
    a1: Option<String>,
    /// Alternate allele column.
    #[clap(long)]
    a2: Option<String>,
    #[clap(long)]
    stat: Option<String>,
    #[clap(long)]
    snp: Option<String>,
    #[clap(long)]
    bp: Option<String>,
    #[clap(long)]
    se: Option<String>,
    #[clap(long)]
    pvalue: Option<String>,

    /// Field separator: whitespace, tab, comma, or any single character.
    #[clap(long)]
    separator: Option<FieldSeparator>,

    /// Width of the coverage masks. Defaults to the largest bin in the coverage table plus one.
    #[clap(long)]
    bins: Option<usize>,

    /// Clump all chromosomes in one pass instead of in parallel.
    #[clap(long)]
    sequential: bool,

    #[clap(long, value_enum, default_value_t = OutputOrder::Genomic)]
    order: OutputOrder,

    /// Output path. Writes to standard output when omitted.
    #[clap(long, short)]
    out: Option<PathBuf>,
}

impl Args {
    /// Layers the command-line overrides on top of the configuration file.
    fn build_config(&self) -> Result<ClumpConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => ClumpConfig::load(path)?,
            None => ClumpConfig::default(),
        };

        let names = &mut config.columns.names;
        if let Some(value) = &self.chr {
            names.chr = Some(value.clone());
        }
        if let Some(value) = &self.a1 {
            names.reference = value.clone();
        }
        if let Some(value) = &self.a2 {
            names.alternate = Some(value.clone());
        }
        if let Some(value) = &self.stat {
            names.statistic = value.clone();
        }
        if let Some(value) = &self.snp {
            names.id = value.clone();
        }
        if let Some(value) = &self.bp {
            names.bp = Some(value.clone());
        }
        if let Some(value) = &self.se {
            names.se = Some(value.clone());
        }
        if let Some(value) = &self.pvalue {
            names.p = value.clone();
        }
        if self.index {
            config.columns.by_index = true;
        }
        if let Some(separator) = self.separator {
            config.columns.separator = separator;
        }

        if let Some(threshold) = self.proxy {
            config.clump.mode = ModeSetting::Proxy;
            config.clump.proxy_threshold = threshold;
        }
        if self.bins.is_some() {
            config.clump.bins = self.bins;
        }
        if self.sequential {
            config.clump.partition_by_chromosome = false;
        }

        config.validate()?;
        Ok(config)
    }
}

// ========================================================================================
//                           The main orchestration logic
// ========================================================================================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let start_time = Instant::now();
    let config = args.build_config()?;
    let mut diagnostics = LogDiagnostics;

    // --- Phase 1: Summary statistics ---
    eprintln!("> Reading summary statistics from {}", args.base.display());
    let columns = config.columns.resolve(&args.base, &mut diagnostics)?;
    let mut table = read_summary_statistics(&args.base, &columns, &mut diagnostics)?;
    if table.is_empty() {
        return Err(format!("No usable variants in {}", args.base.display()).into());
    }

    if let Some(path) = &args.secondary {
        eprintln!("> Reconciling alleles with {}", path.display());
        let secondary_columns = config.secondary_columns().resolve(path, &mut diagnostics)?;
        let summary = merge_secondary(&mut table, path, &secondary_columns, &mut diagnostics)?;
        eprintln!(
            "> {} matched, {} flipped, {} mismatched, {} not in the base file",
            summary.matched, summary.flipped, summary.mismatched, summary.absent
        );
    }

    // --- Phase 2: Linkage inputs ---
    if let Some(path) = &args.coverage {
        eprintln!("> Loading coverage bins from {}", path.display());
        read_coverage(path, &mut table, config.clump.bins, &mut diagnostics)?;
    }
    match &args.links {
        Some(path) => {
            eprintln!("> Loading link graph from {}", path.display());
            read_link_graph(path, &mut table, &mut diagnostics)?;
        }
        None => eprintln!("> No link graph given; every variant will be retained."),
    }

    // --- Phase 3: Clumping ---
    let mode = config.mode();
    let outcome = if config.clump.partition_by_chromosome {
        clump_by_chromosome(table.loci_mut(), mode, &mut diagnostics)
    } else {
        run_clumping(table.loci_mut(), mode)
    };
    eprintln!(
        "> Clumping finished: {} index variant(s), {} retained, {} clumped",
        outcome.index_loci.len(),
        outcome.retained.len(),
        outcome.clumped
    );

    // --- Phase 4: Output ---
    let loci = table.into_loci();
    let rows = output_rows(&loci, &outcome, args.order);
    match &args.out {
        Some(path) => {
            write_table(&loci, &rows, BufWriter::new(File::create(path)?))?;
            eprintln!("> Wrote {} variant(s) to {}", rows.len(), path.display());
        }
        None => write_table(&loci, &rows, io::stdout().lock())?,
    }

    eprintln!(
        "> Total execution time: {:.2?}",
        start_time.elapsed()
    );
    Ok(())
}

/// The retained variants in the requested order.
fn output_rows(loci: &[Locus], outcome: &ClumpOutcome, order: OutputOrder) -> Vec<LocusIndex> {
    let mut rows = outcome.retained.clone();
    match order {
        OutputOrder::Input => {}
        OutputOrder::Rank => rows.sort_by(|a, b| {
            gnomon_clump::rank::compare_significance(&loci[a.0], &loci[b.0])
        }),
        OutputOrder::Genomic => rows.sort_by(|a, b| {
            let (left, right) = (&loci[a.0], &loci[b.0]);
            natord::compare(left.chromosome(), right.chromosome())
                .then_with(|| left.position().cmp(&right.position()))
                .then_with(|| a.cmp(b))
        }),
    }
    rows
}

fn write_table<W: Write>(loci: &[Locus], rows: &[LocusIndex], sink: W) -> csv::Result<()> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(sink);
    writer.write_record([
        "SNP", "CHR", "BP", "REF", "ALT", "STAT", "SE", "P", "FLIPPED",
    ])?;
    for idx in rows {
        let locus = &loci[idx.0];
        let position = locus
            .position()
            .map(|bp| bp.to_string())
            .unwrap_or_default();
        let statistic = locus.statistic().to_string();
        let standard_error = locus.standard_error().to_string();
        let p_value = locus.p_value().to_string();
        writer.write_record([
            locus.id(),
            locus.chromosome(),
            position.as_str(),
            locus.reference(),
            locus.alternate(),
            statistic.as_str(),
            standard_error.as_str(),
            p_value.as_str(),
            if locus.is_flipped() { "1" } else { "0" },
        ])?;
    }
    writer.flush()?;
    Ok(())
}
