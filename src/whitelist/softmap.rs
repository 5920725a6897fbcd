//! Soft-assignment map from observed barcodes to true barcodes.
//!
//! For every true barcode, all 1-Hamming neighbors over {A,C,G,T} are
//! enumerated; a neighbor that was observed often enough (and is not itself
//! a true barcode) becomes a row of the candidate table. The injected
//! barcode model then assigns a posterior probability to each candidate.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::Rng;
use tracing::{info, warn};

use crate::barcode::freq::FreqCounter;
use crate::barcode::model::BarcodeModel;

/// Map from observed barcode to `(true barcode, probability)` candidates.
pub type SoftMap = HashMap<String, Vec<(String, f64)>>;

// ---------------------------------------------------------------------------
// Neighbor enumeration
// ---------------------------------------------------------------------------

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// All sequences at Hamming distance exactly 1 from `barcode`
/// (3·L neighbors for a length-L barcode).
pub fn find_neighbors(barcode: &str) -> Vec<String> {
    let bytes = barcode.as_bytes();
    let mut neighbors = Vec::with_capacity(3 * bytes.len());
    for pos in 0..bytes.len() {
        for &base in &BASES {
            if base == bytes[pos] {
                continue;
            }
            let mut n = bytes.to_vec();
            n[pos] = base;
            neighbors.push(String::from_utf8(n).expect("barcode is ASCII"));
        }
    }
    neighbors
}

// ---------------------------------------------------------------------------
// Soft-map construction
// ---------------------------------------------------------------------------

/// Build the soft map for a true-barcode set.
///
/// A neighbor `n` of true barcode `t` becomes a candidate row when `n` is
/// not itself true, was observed, and carries more than `freq_threshold`
/// reads. True barcodes never observed at all are tallied; if fewer than 50
/// true barcodes were observed (the imported-whitelist case), a warning
/// reports the zero-frequency count.
pub fn build_soft_map(
    true_barcodes: &HashSet<String>,
    freq: &FreqCounter,
    freq_threshold: u32,
    model: &dyn BarcodeModel,
) -> SoftMap {
    let mut candidates: HashMap<String, Vec<String>> = HashMap::new();
    let mut wrong_whitelist_count = 0usize;

    for true_barcode in true_barcodes {
        for neighbor in find_neighbors(true_barcode) {
            if true_barcodes.contains(&neighbor) {
                continue;
            }
            if let Some(count) = freq.find(&neighbor) {
                if count > freq_threshold {
                    candidates
                        .entry(neighbor)
                        .or_default()
                        .push(true_barcode.clone());
                }
            }
        }

        if !freq.contains(true_barcode) {
            wrong_whitelist_count += 1;
        }
    }
    info!("done populating the candidate matrix");

    if true_barcodes.len() - wrong_whitelist_count < 50 {
        warn!(
            "{} whitelisted barcodes with 0 frequency",
            wrong_whitelist_count
        );
    }

    let mut soft_map = SoftMap::with_capacity(candidates.len());
    for (observed, row) in candidates {
        let assigned = model.assign(&observed, &row, freq);
        soft_map.insert(observed, assigned);
    }
    soft_map
}

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

/// Log ambiguity statistics and, in hard-assignment mode, truncate every
/// candidate list to its single best entry with probability 1.0.
///
/// A soft-map key missing from the frequency counter indicates internal
/// corruption and is fatal.
pub fn finalize_soft_map(
    soft_map: &mut SoftMap,
    freq: &FreqCounter,
    no_soft_map: bool,
) -> Result<()> {
    let mut mm_bc_counts = 0u32;
    let mut mm_bc_read_count = 0u64;
    let mut soft_map_white_bc_set: HashSet<&str> = HashSet::new();

    for (observed, candidates) in soft_map.iter() {
        if candidates.len() > 1 {
            mm_bc_counts += 1;
            let Some(num_reads) = freq.find(observed) else {
                bail!("soft-map barcode {} missing from the frequency counter", observed);
            };
            for (true_bc, _) in candidates {
                soft_map_white_bc_set.insert(true_bc.as_str());
            }
            mm_bc_read_count += u64::from(num_reads);
        }
    }

    if !no_soft_map {
        info!("total ambiguous barcodes (soft-assigned): {}", mm_bc_counts);
        info!("total CB-level soft-assignable reads: {}", mm_bc_read_count);
        info!(
            "total whitelist cells ambiguous reads can be assigned to: {}",
            soft_map_white_bc_set.len()
        );
        if !soft_map_white_bc_set.is_empty() {
            info!(
                "expected gain/cell from soft assignment: {}",
                mm_bc_read_count / soft_map_white_bc_set.len() as u64
            );
        }
    }

    if no_soft_map {
        for candidates in soft_map.values_mut() {
            candidates.truncate(1);
            if let Some(first) = candidates.first_mut() {
                first.1 = 1.0;
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Dump files
// ---------------------------------------------------------------------------

/// Write `barcodeSoftMaps.txt`:
/// `observed \t k \t (true_i \t p_i)*` per observed barcode.
pub fn dump_soft_map(soft_map: &SoftMap, out_dir: &Path) -> Result<()> {
    let path = out_dir.join("barcodeSoftMaps.txt");
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);

    for (observed, candidates) in soft_map {
        write!(writer, "{}\t{}", observed, candidates.len())?;
        for (true_bc, prob) in candidates {
            write!(writer, "\t{}\t{}", true_bc, prob)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write `umitoolsMap.txt`: the inverted map, one line per true barcode
/// with the comma-separated observed barcodes assigned to it.
///
/// Ambiguous observations are hard-resolved by a uniform draw `r`, taking
/// the first candidate whose probability exceeds `r`. The draw is compared
/// against each probability directly rather than a running cumulative sum;
/// when no candidate wins, the observation lands in an unnamed bucket.
pub fn dump_umitools_map(
    soft_map: &SoftMap,
    true_barcodes: &HashSet<String>,
    out_dir: &Path,
) -> Result<()> {
    let mut rng = rand::thread_rng();
    let mut umitools_map: HashMap<String, Vec<&str>> = true_barcodes
        .iter()
        .map(|bc| (bc.clone(), Vec::new()))
        .collect();

    for (observed, candidates) in soft_map {
        let mut true_bc = String::new();
        if candidates.len() == 1 {
            true_bc = candidates[0].0.clone();
        } else {
            let rn: f64 = rng.gen();
            for (cand, prob) in candidates {
                if rn < *prob {
                    true_bc = cand.clone();
                    break;
                }
            }
        }
        umitools_map.entry(true_bc).or_default().push(observed.as_str());
    }

    let path = out_dir.join("umitoolsMap.txt");
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    for (true_bc, observed) in &umitools_map {
        writeln!(writer, "{}\t{}", true_bc, observed.join(","))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
