//! Knee detection on the barcode frequency distribution.
//!
//! Two-stage boundary selection: a distance-from-diagonal knee on the
//! log-cumulative rank curve, refined by a 1-D Gaussian kernel density
//! estimate over log10 frequencies. The accepted boundary is then extended
//! by a low-confidence region whose tail is pushed off any run of tied
//! frequencies, so the cut never lands inside a tie.

use std::collections::HashSet;
use std::io::Write;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use super::ProcessOpts;

/// KDE bandwidth factor.
const BW_METHOD: f64 = 0.01;

/// Number of evaluation points for the density estimate.
const X_SPACE: usize = 10_000;

/// Hard ceiling on the low-confidence region.
const LOW_REGION_MAX_NUM_BARCODES: usize = 1000;

/// Fraction of the boundary used to size the low-confidence region.
const LOW_CONFIDENCE_FRACTION: f64 = 0.5;

// ---------------------------------------------------------------------------
// Sorted index
// ---------------------------------------------------------------------------

/// Permutation of `0..v.len()` sorting `v` in descending order.
///
/// Uses an unstable sort; ties keep no particular order, so the result
/// inherits the (unspecified) snapshot iteration order of the counter.
pub fn sort_indexes(v: &[u32]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..v.len()).collect();
    idx.sort_unstable_by(|&i1, &i2| v[i2].cmp(&v[i1]));
    idx
}

// ---------------------------------------------------------------------------
// Left boundary (knee)
// ---------------------------------------------------------------------------

/// Find the knee of the log-cumulative frequency curve.
///
/// The curve is walked from the least-frequent side inward, cumulating
/// `freq[sorted_idx[topx_barcodes - i]]` for `i = 0..topx_barcodes`. Note
/// the walk starts one past the restricted range; when that index falls
/// outside the table the contribution is zero. This indexing is part of the
/// observable behavior and must not be "fixed".
///
/// For each rank `j`, a line through the origin with slope `freqs[j] / j`
/// is tested against all later points; the first `j` where no later point
/// lies above the line is the knee. The returned cutoff is additionally
/// walked left off any run of tied frequencies. Returns 0 when no knee
/// exists (the caller treats that as fatal).
pub fn left_boundary(sorted_idx: &[usize], topx_barcodes: usize, freq: &[u32]) -> usize {
    if topx_barcodes == 0 {
        return 0;
    }

    let mut cum_count = 0.0f64;
    let mut freqs = vec![0.0f64; topx_barcodes];
    for i in 0..topx_barcodes {
        let ind = topx_barcodes - i;
        if ind < sorted_idx.len() {
            cum_count += f64::from(freq[sorted_idx[ind]]);
        }
        freqs[i] = cum_count.ln();
    }

    let left_extreme = freqs[0];
    for j in 0..topx_barcodes {
        let y = freqs[j];
        if y == left_extreme {
            continue;
        }

        let slope = y / j as f64;
        let mut is_up = false;
        for (i, &curve_y) in freqs.iter().enumerate().skip(j + 1) {
            let line_y = slope * i as f64;
            if line_y > curve_y {
                is_up = true;
                break;
            }
        }

        if !is_up {
            // ignore all entries tied with the cutoff frequency
            let mut cutoff = topx_barcodes - j;
            let cutoff_frequency = freq[sorted_idx[cutoff]];
            let mut nearest_left = cutoff_frequency;
            while nearest_left == cutoff_frequency {
                if cutoff == 0 {
                    return 0;
                }
                cutoff -= 1;
                nearest_left = freq[sorted_idx[cutoff]];
            }
            return cutoff;
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Gaussian KDE refinement
// ---------------------------------------------------------------------------

/// Diagnostic values learned by the KDE pass.
#[derive(Debug, Clone, Copy)]
pub struct KdeDiagnostics {
    pub inv_covariance: f64,
    pub norm_factor: f64,
}

/// Refine the knee with a Gaussian kernel density estimate.
///
/// Counts above `0.001 * max_count` are log10-transformed; the density is
/// evaluated at `X_SPACE` points from the dataset max down to its min, and
/// each strict local minimum is converted back to a frequency threshold.
/// A minimum is accepted when its implied boundary lies within
/// `[0.1 * expect_cells, expect_cells]`; a boundary above `expect_cells`
/// rejects outright, one below a tenth of it moves on to the next minimum.
///
/// Returns `(accepted, boundary, diagnostics)`. A covariance of exactly
/// zero is fatal.
pub fn gaussian_kde(
    freq: &[u32],
    sorted_idx: &[usize],
    expect_cells: u32,
) -> Result<(bool, u32, KdeDiagnostics)> {
    let threshold = 0.001 * f64::from(freq[sorted_idx[0]]);

    // extract counts above threshold
    let mut log_dataset = Vec::new();
    let mut mean = 0.0f64;
    for &ind in sorted_idx {
        let count = f64::from(freq[ind]);
        if count <= threshold {
            break;
        }
        let count = count.log10();
        mean += count;
        log_dataset.push(count);
    }

    let num_elem = log_dataset.len();
    mean /= num_elem as f64;

    let mut covariance = 0.0f64;
    for &count in &log_dataset {
        covariance += (count - mean).powi(2);
    }
    covariance = (covariance * BW_METHOD) / (num_elem as f64 - 1.0);

    if covariance == 0.0 {
        bail!("zero covariance in Gaussian KDE");
    }

    let inv_covariance = 1.0 / covariance;
    let norm_factor =
        (2.0 * std::f64::consts::PI * covariance).sqrt() * num_elem as f64;
    let diag = KdeDiagnostics {
        inv_covariance,
        norm_factor,
    };

    // evaluate the density from the dataset max down to its min
    let decrement = (log_dataset[0] - log_dataset[num_elem - 1]) / X_SPACE as f64;
    let mut density = vec![0.0f64; X_SPACE];
    for &x in &log_dataset {
        let mut pred = log_dataset[0];
        for d in density.iter_mut() {
            let diff = x - pred;
            let energy = (diff * diff * inv_covariance) / 2.0;
            *d += (-energy).exp();
            pred -= decrement;
        }
    }

    // strict local minima of the density
    let mut local_mins = Vec::new();
    for i in 1..X_SPACE - 1 {
        if density[i - 1] > density[i] && density[i] < density[i + 1] {
            local_mins.push(i);
        }
    }

    for min_idx in local_mins {
        let freq_threshold = 10f64.powf(log_dataset[0] - (min_idx as f64 * decrement));
        let mut boundary = 0usize;
        while boundary < sorted_idx.len()
            && freq_threshold <= f64::from(freq[sorted_idx[boundary]])
        {
            boundary += 1;
        }
        if boundary > expect_cells as usize {
            return Ok((false, boundary as u32, diag));
        } else if f64::from(expect_cells) * 0.1 > boundary as f64 {
            continue;
        } else {
            return Ok((true, boundary as u32, diag));
        }
    }

    Ok((false, 0, diag))
}

// ---------------------------------------------------------------------------
// True barcode selection
// ---------------------------------------------------------------------------

/// Select the true-barcode set from a frequency snapshot.
///
/// `freq` and `col_map` are parallel: `col_map[i]` is the barcode whose
/// count is `freq[i]`. Returns the set together with the size of the
/// trailing low-confidence region.
pub fn select_true_barcodes(
    freq: &[u32],
    col_map: &[String],
    opts: &ProcessOpts,
) -> Result<(HashSet<String>, usize)> {
    let sorted_idx = sort_indexes(freq);
    let low_region_min = opts.low_region_min_num_barcodes as usize;

    let mut topx_barcodes = (opts.max_num_barcodes as usize).min(freq.len());
    topx_barcodes = left_boundary(&sorted_idx, topx_barcodes, freq);
    if topx_barcodes == 0 {
        bail!("cannot find left boundary of the frequency distribution");
    }
    info!("knee found left boundary at {}", topx_barcodes);

    let (gauss_ok, gauss_threshold, diag) =
        gaussian_kde(freq, &sorted_idx, topx_barcodes as u32)?;
    if gauss_ok {
        topx_barcodes = gauss_threshold as usize;
        info!("Gauss corrected boundary at {}", gauss_threshold);
    } else {
        warn!(
            "Gauss prediction {} too far from knee prediction, skipping it",
            gauss_threshold
        );
    }

    info!(
        "learned inv_covariance: {} norm_factor: {}",
        diag.inv_covariance, diag.norm_factor
    );
    if diag.inv_covariance == 0.0 || diag.norm_factor == 0.0 {
        bail!("invalid inv_covariance/norm_factor from Gaussian KDE");
    }

    let fraction_true_barcodes =
        (LOW_CONFIDENCE_FRACTION * topx_barcodes as f64) as usize;
    let low_region_num_barcodes = if fraction_true_barcodes < low_region_min {
        low_region_min
    } else if fraction_true_barcodes > LOW_REGION_MAX_NUM_BARCODES {
        LOW_REGION_MAX_NUM_BARCODES
    } else {
        fraction_true_barcodes
    };

    // Extend by the low-confidence region, then walk the cut left off any
    // run of tied frequencies, imitating a stable sort at the boundary.
    let mut threshold = (topx_barcodes + low_region_num_barcodes) as i64;
    let mut low_n = low_region_num_barcodes as i64;
    if threshold as usize >= freq.len() {
        let over = threshold - (freq.len() as i64 - 1);
        threshold -= over;
        low_n -= over;
    }
    let cutoff_frequency = freq[sorted_idx[threshold as usize]];
    let mut nearest_left = cutoff_frequency;
    while nearest_left == cutoff_frequency && threshold > 0 {
        threshold -= 1;
        low_n -= 1;
        nearest_left = freq[sorted_idx[threshold as usize]];
    }
    low_n += 1;
    threshold += 1;

    let threshold = threshold as usize;
    let low_n = low_n.max(0) as usize;
    info!(
        "total {} (has {} low confidence) barcodes",
        threshold, low_n
    );

    if opts.dump_features {
        dump_frequency(freq, &sorted_idx, col_map, threshold, opts)?;
    }

    let mut true_barcodes = HashSet::with_capacity(threshold);
    for &i in sorted_idx.iter().take(threshold) {
        true_barcodes.insert(col_map[i].clone());
    }
    Ok((true_barcodes, low_n))
}

/// Write `frequency.txt`: `barcode \t count` in descending-count order,
/// stopping after `threshold` lines or at the first zero count.
fn dump_frequency(
    freq: &[u32],
    sorted_idx: &[usize],
    col_map: &[String],
    threshold: usize,
    opts: &ProcessOpts,
) -> Result<()> {
    let path = opts.output_directory.join("frequency.txt");
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);

    let mut remaining = threshold;
    for &i in sorted_idx {
        let count = freq[i];
        if remaining == 0 || count == 0 {
            break;
        }
        writeln!(writer, "{}\t{}", col_map[i], count)?;
        remaining -= 1;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
