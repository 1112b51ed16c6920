use clap::Parser;
use likelihood_tree::alphabet::Alphabet;
use likelihood_tree::io::{read_fasta, read_newick, write_pattern_counts_tsv};
use likelihood_tree::reduce::Reduction;
use likelihood_tree::tree::{build_likelihood_tree, column_blocks, pattern_counts, restrict_partitions};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Build the deduplicated site-pattern likelihood tree for an alignment and
/// write its site-pattern count table (TSV).
#[derive(Parser, Debug)]
#[command(name = "likelihood-tree", version, about = "Site-pattern likelihood tree for a Newick tree and FASTA alignment")]
struct Args {
    /// Path to Newick tree file (plain or .gz)
    #[arg(short = 't', long = "tree")]
    tree: PathBuf,

    /// Path to aligned FASTA file (plain or .gz)
    #[arg(short = 'a', long = "alignment")]
    alignment: PathBuf,

    /// Output path for TSV pattern-count table (.gz compresses)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Number of bases per motif (1 = nucleotides, 3 = codons)
    #[arg(long = "motif-length", default_value_t = 1)]
    motif_length: usize,

    /// Reverse column order before counting
    #[arg(long = "reverse", default_value_t = false)]
    reverse: bool,

    /// Report unique pattern counts for consecutive blocks of this many columns
    #[arg(long = "partition-size")]
    partition_size: Option<usize>,

    /// Reduction strategy used by internal nodes
    #[arg(long = "reduction", value_enum, default_value_t = Reduction::default())]
    reduction: Reduction,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.quiet);

    if args.motif_length == 0 {
        error!("--motif-length must be at least 1");
        std::process::exit(2);
    }

    // Read inputs
    let t0 = Instant::now();
    let newick = match read_newick(&args.tree) {
        Ok(n) => n,
        Err(e) => {
            error!("Failed to read tree {:?}: {e}", args.tree);
            std::process::exit(2);
        }
    };
    let records = match read_fasta(&args.alignment) {
        Ok(r) if !r.is_empty() => r,
        Ok(_) => {
            error!("No sequences parsed from {:?}.", args.alignment);
            std::process::exit(2);
        }
        Err(e) => {
            error!("Failed to read alignment {:?}: {e}", args.alignment);
            std::process::exit(2);
        }
    };
    let n_seqs = records.len();
    let sequences: HashMap<String, String> = records.into_iter().collect();
    info!("Read {n_seqs} sequences in {:.3}s", t0.elapsed().as_secs_f64());

    // Build the likelihood tree
    let t1 = Instant::now();
    let alphabet = Alphabet::dna().with_motif_len(args.motif_length);
    let mut root = match build_likelihood_tree(&newick, &sequences, &alphabet, args.reduction) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to build likelihood tree: {e}");
            std::process::exit(3);
        }
    };
    if args.reverse {
        root = Arc::new(root.backward());
    }
    let unique = root.num_patterns() - 1;
    let ratio = if unique > 0 { root.len() as f64 / unique as f64 } else { 0.0 };
    info!(
        "Built tree '{}' with {:?} reduction in {:.3}s: {} columns, {unique} unique patterns ({ratio:.2}x)",
        root.name(),
        args.reduction,
        t1.elapsed().as_secs_f64(),
        root.len(),
    );

    if let Some(size) = args.partition_size {
        let t2 = Instant::now();
        let blocks = column_blocks(root.len(), size);
        let parts = match restrict_partitions(&root, &blocks) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to restrict partitions: {e}");
                std::process::exit(3);
            }
        };
        for (block, part) in blocks.iter().zip(&parts) {
            let (first, last) = (block.first().copied().unwrap_or(0), block.last().copied().unwrap_or(0));
            info!("Columns {first}-{last}: {} unique patterns", part.num_patterns() - 1);
        }
        info!("Restricted {} partitions in {:.3}s", parts.len(), t2.elapsed().as_secs_f64());
    }

    // Write the pattern table
    let t3 = Instant::now();
    let table = match pattern_counts(&root) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to collect site patterns: {e}");
            std::process::exit(3);
        }
    };
    if let Err(e) = write_pattern_counts_tsv(&args.output, &table) {
        error!("Failed to write output {:?}: {e}", args.output);
        std::process::exit(4);
    }
    info!("Writing to output {:.3}s", t3.elapsed().as_secs_f64());
}

fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
