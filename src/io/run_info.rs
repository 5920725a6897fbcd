//! cmd_info.json writer — record of the options a run was invoked with.

use std::path::Path;

use anyhow::{Context, Result};

use crate::barcode::Protocol;
use crate::whitelist::ProcessOpts;

/// Write `cmd_info.json` into the output directory.
///
/// Records the full command line together with the resolved option values,
/// so a run can be reproduced without the invoking shell history.
pub fn write_cmd_info(
    out_dir: &Path,
    protocol: &Protocol,
    opts: &ProcessOpts,
) -> Result<()> {
    let cmdline: Vec<String> = std::env::args().collect();

    let info = serde_json::json!({
        "tool": "alevin-rs",
        "version": crate::VERSION,
        "cmdline": cmdline.join(" "),
        "protocol": protocol.name(),
        "barcode_length": protocol.barcode_len(),
        "umi_length": protocol.umi_len(),
        "max_num_barcodes": opts.max_num_barcodes,
        "low_region_min_num_barcodes": opts.low_region_min_num_barcodes,
        "freq_threshold": opts.freq_threshold,
        "no_soft_map": opts.no_soft_map,
        "dump_features": opts.dump_features,
        "dump_barcode_map": opts.dump_barcode_map,
        "dump_umitools_map": opts.dump_umitools_map,
        "dump_fastq": opts.dump_fastq,
        "no_barcode": opts.no_barcode,
        "num_threads": opts.num_threads,
        "num_consumer_threads": opts.num_consumer_threads,
        "num_parsing_threads": opts.num_parsing_threads,
        "output_directory": opts.output_directory.display().to_string(),
        "whitelist_file": opts
            .whitelist_file
            .as_ref()
            .map(|p| p.display().to_string()),
    });

    let path = out_dir.join("cmd_info.json");
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &info)?;
    Ok(())
}
