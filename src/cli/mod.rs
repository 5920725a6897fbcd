//! Command-line interface.
//!
//! Single-purpose binary: resolve the protocol geometry and option record,
//! run the barcode front-end, and record the run in `cmd_info.json`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::barcode::model::CoinTossModel;
use crate::barcode::{BarcodeEnd, Protocol};
use crate::io::run_info::write_cmd_info;
use crate::whitelist::{process_barcodes, ProcessOpts};

#[derive(Parser, Debug)]
#[command(name = "alevin-rs")]
#[command(about = "single-cell barcode whitelisting and correction", version)]
pub struct Cli {
    /// Technical (barcode + UMI) FASTQ files, optionally gzipped
    #[arg(short = '1', long = "barcodes", num_args = 1..)]
    pub barcode_files: Vec<String>,

    /// Biological FASTQ files paired with the technical reads
    #[arg(short = '2', long = "reads", num_args = 1..)]
    pub read_files: Vec<String>,

    /// Output directory
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Use the Drop-seq geometry (12 bp barcode + 8 bp UMI)
    #[arg(long)]
    pub dropseq: bool,

    /// Use the 10x Chromium v2 geometry (16 bp barcode + 10 bp UMI)
    #[arg(long)]
    pub chromium: bool,

    /// Use the 10x Chromium v3 geometry (16 bp barcode + 12 bp UMI)
    #[arg(long = "chromiumV3")]
    pub chromium_v3: bool,

    /// Use the 10x GemCode geometry (14 bp barcode + 10 bp UMI)
    #[arg(long)]
    pub gemcode: bool,

    /// Custom geometry: barcode length in bases
    #[arg(long, requires = "umi_length")]
    pub barcode_length: Option<usize>,

    /// Custom geometry: UMI length in bases
    #[arg(long, requires = "barcode_length")]
    pub umi_length: Option<usize>,

    /// Custom geometry: read end carrying the barcode (5 or 3)
    #[arg(long, default_value = "5")]
    pub end: u8,

    /// Upper bound on the ranks examined by the knee selector
    #[arg(long, default_value_t = 100_000)]
    pub max_num_barcodes: u32,

    /// Lower bound on the low-confidence region size
    #[arg(long, default_value_t = 200)]
    pub low_region_min_num_barcodes: u32,

    /// Minimum observed count for a neighbor to enter the soft map
    #[arg(long, default_value_t = 10)]
    pub freq_threshold: u32,

    /// Keep probabilistic (soft) assignments instead of the default hard
    /// single-candidate assignment
    #[arg(long)]
    pub soft_map: bool,

    /// Write frequency.txt with the selected barcodes and their counts
    #[arg(long)]
    pub dump_features: bool,

    /// Write barcodeSoftMaps.txt
    #[arg(long)]
    pub dump_barcode_map: bool,

    /// Write umitoolsMap.txt
    #[arg(long)]
    pub dump_umitools_map: bool,

    /// Write corrected FASTQ records to standard output
    #[arg(long)]
    pub dump_fastq: bool,

    /// Barcode-free mode: skip barcode processing entirely
    #[arg(long)]
    pub no_barcode: bool,

    /// Suppress the stderr progress surface
    #[arg(short, long)]
    pub quiet: bool,

    /// Total thread budget
    #[arg(short = 'p', long, default_value_t = 8)]
    pub threads: u32,

    /// Consumer threads for the density pipeline
    #[arg(long, default_value_t = 2)]
    pub consumer_threads: u32,

    /// Parsing threads for the density pipeline
    #[arg(long, default_value_t = 1)]
    pub parsing_threads: u32,

    /// Whitelist file (one barcode per line); bypasses knee selection
    #[arg(long)]
    pub whitelist: Option<PathBuf>,
}

impl Cli {
    /// Resolve the protocol flags into a geometry.
    ///
    /// More than one protocol flag is a fatal configuration error; no flag
    /// at all requires an explicit custom geometry.
    fn protocol(&self) -> Result<Protocol> {
        let named = [self.dropseq, self.chromium, self.chromium_v3, self.gemcode];
        if named.iter().filter(|&&f| f).count() > 1 {
            bail!("please specify only one single-cell protocol");
        }

        if self.dropseq {
            return Ok(Protocol::dropseq());
        }
        if self.chromium {
            return Ok(Protocol::chromium());
        }
        if self.chromium_v3 {
            return Ok(Protocol::chromium_v3());
        }
        if self.gemcode {
            return Ok(Protocol::gemcode());
        }

        match (self.barcode_length, self.umi_length) {
            (Some(bc_len), Some(umi_len)) => {
                let end = match self.end {
                    5 => BarcodeEnd::Five,
                    3 => BarcodeEnd::Three,
                    other => bail!("invalid barcode end {}; expected 5 or 3", other),
                };
                Ok(Protocol::custom(bc_len, umi_len, end))
            }
            _ => bail!(
                "no protocol specified; use one of --dropseq/--chromium/\
                 --chromiumV3/--gemcode or --barcode-length + --umi-length"
            ),
        }
    }

    fn opts(&self) -> ProcessOpts {
        ProcessOpts {
            max_num_barcodes: self.max_num_barcodes,
            low_region_min_num_barcodes: self.low_region_min_num_barcodes,
            freq_threshold: self.freq_threshold,
            no_soft_map: !self.soft_map,
            dump_features: self.dump_features,
            dump_barcode_map: self.dump_barcode_map,
            dump_umitools_map: self.dump_umitools_map,
            dump_fastq: self.dump_fastq,
            no_barcode: self.no_barcode,
            quiet: self.quiet,
            num_threads: self.threads,
            num_consumer_threads: self.consumer_threads,
            num_parsing_threads: self.parsing_threads,
            output_directory: self.output.clone(),
            whitelist_file: self.whitelist.clone(),
        }
    }
}

/// Parse the command line and run the front-end.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let protocol = cli.protocol()?;
    let opts = cli.opts();

    if !opts.no_barcode && cli.barcode_files.is_empty() {
        bail!("no barcode files specified (use -1/--barcodes)");
    }
    if opts.dump_fastq && cli.read_files.is_empty() {
        bail!("--dump-fastq needs the biological reads (use -2/--reads)");
    }

    std::fs::create_dir_all(&opts.output_directory).with_context(|| {
        format!(
            "failed to create output directory {}",
            opts.output_directory.display()
        )
    })?;

    let stdout = std::io::stdout();
    let mut fastq_out = std::io::BufWriter::new(stdout.lock());

    process_barcodes(
        &cli.barcode_files,
        &cli.read_files,
        &protocol,
        &opts,
        &CoinTossModel,
        &mut fastq_out,
    )?;
    fastq_out.flush()?;

    write_cmd_info(&opts.output_directory, &protocol, &opts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
