//! Cell-barcode whitelisting.
//!
//! The driver in this module runs the whole front-end: barcode density
//! counting over the technical reads, knee-based (or whitelist-imported)
//! true-barcode selection, soft-map construction, and the optional
//! corrected-FASTQ dump. Everything downstream of the density pipeline is
//! single-threaded; the frequency counter is frozen once the pipeline
//! joins.

pub mod fastq_dump;
pub mod knee;
pub mod softmap;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::barcode::freq::FreqCounter;
use crate::barcode::model::BarcodeModel;
use crate::barcode::Protocol;
use crate::io::fastx::{FastxPairSource, FastxSource};
use crate::io::threads::{
    run_density_pipeline, DensityConfig, DensityStats, MINI_BATCH_SIZE,
};
use softmap::SoftMap;

// ---------------------------------------------------------------------------
// ProcessOpts
// ---------------------------------------------------------------------------

/// Tunables recognized by the whitelisting core.
#[derive(Debug, Clone)]
pub struct ProcessOpts {
    /// Upper bound on the ranks examined by the knee selector.
    pub max_num_barcodes: u32,
    /// Lower bound on the low-confidence region size.
    pub low_region_min_num_barcodes: u32,
    /// Minimum observed count for a neighbor to enter the soft map.
    pub freq_threshold: u32,
    /// Hard assignment: truncate every soft-map entry to one candidate.
    pub no_soft_map: bool,
    pub dump_features: bool,
    pub dump_barcode_map: bool,
    pub dump_umitools_map: bool,
    pub dump_fastq: bool,
    /// Barcode-free mode: skip the pipeline entirely.
    pub no_barcode: bool,
    pub quiet: bool,
    pub num_threads: u32,
    pub num_consumer_threads: u32,
    pub num_parsing_threads: u32,
    pub output_directory: PathBuf,
    /// When set and present on disk, bypasses knee selection.
    pub whitelist_file: Option<PathBuf>,
}

impl Default for ProcessOpts {
    fn default() -> Self {
        Self {
            max_num_barcodes: 100_000,
            low_region_min_num_barcodes: 200,
            freq_threshold: 10,
            no_soft_map: true,
            dump_features: false,
            dump_barcode_map: false,
            dump_umitools_map: false,
            dump_fastq: false,
            no_barcode: false,
            quiet: false,
            num_threads: 8,
            num_consumer_threads: 2,
            num_parsing_threads: 1,
            output_directory: PathBuf::from("."),
            whitelist_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessResult
// ---------------------------------------------------------------------------

/// Everything the front-end hands to downstream consumers.
pub struct ProcessResult {
    pub true_barcodes: HashSet<String>,
    pub soft_map: SoftMap,
    pub freq: FreqCounter,
    pub num_low_confidence: usize,
}

// ---------------------------------------------------------------------------
// process_barcodes
// ---------------------------------------------------------------------------

/// Run the full barcode front-end.
///
/// `barcode_files` carry the technical reads; `read_files` the biological
/// mates (only consumed when `dump_fastq` is set, in which case the
/// corrected records go to `fastq_out`).
pub fn process_barcodes(
    barcode_files: &[String],
    read_files: &[String],
    protocol: &Protocol,
    opts: &ProcessOpts,
    model: &dyn BarcodeModel,
    fastq_out: &mut dyn Write,
) -> Result<ProcessResult> {
    if opts.no_barcode {
        let mut true_barcodes = HashSet::new();
        true_barcodes.insert("AAA".to_string());
        return Ok(ProcessResult {
            true_barcodes,
            soft_map: SoftMap::new(),
            freq: FreqCounter::new(),
            num_low_confidence: 0,
        });
    }

    // Barcode density calculation.
    let freq = FreqCounter::new();
    let stats = DensityStats::new();
    let config = DensityConfig {
        num_threads: opts.num_threads,
        num_consumer_threads: opts.num_consumer_threads,
        num_parsing_threads: opts.num_parsing_threads,
        quiet: opts.quiet,
    };
    let fastx = FastxSource::new(barcode_files, MINI_BATCH_SIZE)?;
    run_density_pipeline(fastx, protocol, &freq, &config, &stats)?;

    let (total_seen, used) = stats.summary();
    info!("done barcode density calculation");
    info!("# barcodes used: {} / {}", used, total_seen);

    // True-barcode selection: whitelist import or knee.
    let mut num_low_confidence = 0usize;
    let mut true_barcodes = HashSet::new();
    let whitelist = opts.whitelist_file.as_ref().filter(|p| p.exists());
    if let Some(whitelist_path) = whitelist {
        let file = File::open(whitelist_path).with_context(|| {
            format!("failed to open whitelist {}", whitelist_path.display())
        })?;
        for line in BufReader::new(file).lines() {
            let barcode = line?;
            if !barcode.is_empty() {
                true_barcodes.insert(barcode);
            }
        }
        info!("done importing whitelist barcodes");
        info!("total {} whitelisted barcodes", true_barcodes.len());
    } else {
        let snapshot = freq.snapshot();
        let mut collapsed_frequency = Vec::with_capacity(snapshot.len());
        let mut col_map = Vec::with_capacity(snapshot.len());
        for (barcode, count) in snapshot {
            col_map.push(barcode);
            collapsed_frequency.push(count);
        }

        let (selected, low_n) =
            knee::select_true_barcodes(&collapsed_frequency, &col_map, opts)?;
        true_barcodes = selected;
        num_low_confidence = low_n;
        info!("done true barcode sampling");
    }

    // Soft-map construction.
    let mut soft_map =
        softmap::build_soft_map(&true_barcodes, &freq, opts.freq_threshold, model);
    info!("done indexing barcodes");
    info!("total unique barcodes found: {}", freq.len());
    info!("used barcodes except whitelist: {}", soft_map.len());

    if opts.dump_barcode_map {
        softmap::dump_soft_map(&soft_map, &opts.output_directory)?;
    }
    if opts.dump_umitools_map {
        softmap::dump_umitools_map(&soft_map, &true_barcodes, &opts.output_directory)?;
    }

    softmap::finalize_soft_map(&mut soft_map, &freq, opts.no_soft_map)?;

    // Optional corrected-FASTQ pass over the paired inputs.
    if opts.dump_fastq {
        let pairs = FastxPairSource::new(barcode_files, read_files, MINI_BATCH_SIZE)?;
        fastq_dump::write_fastq(
            pairs,
            protocol,
            &soft_map,
            &true_barcodes,
            opts.quiet,
            fastq_out,
        )
        .context("corrected FASTQ dump failed")?;
        info!("done dumping fastq file");
    }

    Ok(ProcessResult {
        true_barcodes,
        soft_map,
        freq,
        num_low_confidence,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::model::CoinTossModel;

    #[test]
    fn test_no_barcode_mode() {
        let opts = ProcessOpts {
            no_barcode: true,
            ..Default::default()
        };
        let protocol = Protocol::chromium();
        let mut out = Vec::new();
        let result =
            process_barcodes(&[], &[], &protocol, &opts, &CoinTossModel, &mut out)
                .unwrap();
        assert_eq!(result.true_barcodes.len(), 1);
        assert!(result.true_barcodes.contains("AAA"));
        assert!(result.soft_map.is_empty());
        assert!(result.freq.is_empty());
    }

    #[test]
    fn test_defaults_match_shipped_configuration() {
        let opts = ProcessOpts::default();
        assert_eq!(opts.max_num_barcodes, 100_000);
        assert_eq!(opts.low_region_min_num_barcodes, 200);
        assert_eq!(opts.freq_threshold, 10);
        assert!(opts.no_soft_map);
        assert!(opts.whitelist_file.is_none());
    }
}
