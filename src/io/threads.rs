//! Threading infrastructure — the barcode density pipeline.
//!
//! One producer thread reads FASTQ chunks and feeds them through a bounded
//! crossbeam channel to N consumer threads; each consumer extracts barcodes
//! and upserts into the shared frequency counter.
//!
//! Uses crossbeam scoped threads for natural lifetime management: worker
//! threads can borrow the counter and protocol without `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use crossbeam::channel;

use crate::barcode::extract::extract;
use crate::barcode::freq::FreqCounter;
use crate::barcode::Protocol;
use crate::io::fastx::{FastxSource, SeqChunk};

/// Number of reads per batch flowing through the channel.
pub const MINI_BATCH_SIZE: usize = 5000;

/// Emit a progress line every this many seen barcodes.
const PROGRESS_INTERVAL: u64 = 500_000;

// ---------------------------------------------------------------------------
// DensityConfig
// ---------------------------------------------------------------------------

/// Threading configuration for the density pass.
#[derive(Debug, Clone, Copy)]
pub struct DensityConfig {
    /// Total configured thread budget.
    pub num_threads: u32,
    /// Consumer threads when the budget allows it.
    pub num_consumer_threads: u32,
    /// Parsing threads. The fastx source is sequential, so parsing runs on
    /// one dedicated producer thread regardless; the knob is recorded for
    /// run metadata.
    pub num_parsing_threads: u32,
    /// Suppress the stderr progress surface.
    pub quiet: bool,
}

impl DensityConfig {
    /// Number of consumer threads to actually spawn.
    ///
    /// With a total budget of 3 or fewer threads there is no headroom next
    /// to the producer, so exactly one consumer runs.
    pub fn effective_consumers(&self) -> usize {
        if self.num_threads <= 3 {
            1
        } else {
            self.num_consumer_threads.max(1) as usize
        }
    }
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            num_threads: 8,
            num_consumer_threads: 2,
            num_parsing_threads: 1,
            quiet: false,
        }
    }
}

// ---------------------------------------------------------------------------
// DensityStats
// ---------------------------------------------------------------------------

/// Thread-safe counters for the density pass.
///
/// `total_seen` counts every read; `used` only those whose barcode survived
/// extraction. The two diverge on short reads and barcodes containing `N`.
pub struct DensityStats {
    pub total_seen: AtomicU64,
    pub used: AtomicU64,
}

impl DensityStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self {
            total_seen: AtomicU64::new(0),
            used: AtomicU64::new(0),
        }
    }

    /// Get `(total_seen, used)`.
    pub fn summary(&self) -> (u64, u64) {
        (
            self.total_seen.load(Ordering::Relaxed),
            self.used.load(Ordering::Relaxed),
        )
    }
}

impl Default for DensityStats {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// run_density_pipeline
// ---------------------------------------------------------------------------

/// Run the barcode density pipeline.
///
/// - The producer thread reads `MINI_BATCH_SIZE`-read chunks and sends them
///   through a bounded channel.
/// - Consumers extract the barcode from each read and upsert the counter.
/// - Every 500k seen barcodes one consumer takes the IO mutex and prints a
///   progress line to stderr (suppressed by `quiet`).
///
/// Consumers drain naturally once the producer drops the sender. A parser
/// I/O error is captured on the producer thread and returned after the
/// scope joins; the frequency counter must then be considered unusable.
pub fn run_density_pipeline(
    mut fastx: FastxSource,
    protocol: &Protocol,
    counter: &FreqCounter,
    config: &DensityConfig,
    stats: &DensityStats,
) -> Result<()> {
    let num_consumers = config.effective_consumers();
    let (sender, receiver) = channel::bounded::<SeqChunk>(num_consumers * 2);

    let io_mutex = Mutex::new(());
    let parse_error: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    let quiet = config.quiet;

    crossbeam::scope(|scope| {
        // Consumer threads
        for _ in 0..num_consumers {
            let recv = receiver.clone();
            let io_mutex = &io_mutex;
            scope.spawn(move |_| {
                while let Ok(chunk) = recv.recv() {
                    for seq in &chunk {
                        let seen = stats.total_seen.fetch_add(1, Ordering::Relaxed) + 1;
                        if !quiet && seen % PROGRESS_INTERVAL == 0 {
                            let _guard = io_mutex.lock().unwrap();
                            eprint!(
                                "\rprocessed {} Million barcodes",
                                seen / 1_000_000
                            );
                        }

                        if let Some((bc, _umi)) = extract(seq, protocol) {
                            counter.upsert(&bc);
                            stats.used.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
        // Drop the extra receiver clone so consumers exit when the sender
        // is dropped.
        drop(receiver);

        // Producer thread: reads chunks and sends them to consumers.
        let parse_error = &parse_error;
        scope.spawn(move |_| {
            let mut chunk = Vec::new();
            loop {
                match fastx.next_chunk(&mut chunk) {
                    Ok(true) => {
                        let batch = std::mem::take(&mut chunk);
                        if sender.send(batch).is_err() {
                            break; // consumers have shut down
                        }
                    }
                    Ok(false) => break, // EOF
                    Err(e) => {
                        *parse_error.lock().unwrap() = Some(e);
                        break;
                    }
                }
            }
            // sender dropped here, signaling consumers to exit.
        });
    })
    .map_err(|e| anyhow::anyhow!("thread panicked: {:?}", e))?;

    if !quiet {
        eprintln!();
    }

    if let Some(e) = parse_error.into_inner().unwrap() {
        return Err(e.context("barcode parsing failed"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fastq_with(dir: &std::path::Path, seqs: &[&str]) -> String {
        let path = dir.join("reads.fastq");
        let mut f = std::fs::File::create(&path).unwrap();
        for (i, seq) in seqs.iter().enumerate() {
            writeln!(f, "@r{}\n{}\n+\n{}", i, seq, "I".repeat(seq.len())).unwrap();
        }
        path.display().to_string()
    }

    #[test]
    fn test_effective_consumers_rule() {
        let mut config = DensityConfig::default();
        config.num_threads = 2;
        config.num_consumer_threads = 4;
        assert_eq!(config.effective_consumers(), 1);

        config.num_threads = 8;
        assert_eq!(config.effective_consumers(), 4);
    }

    #[test]
    fn test_density_counts_and_drops() {
        let dir = tempfile::tempdir().unwrap();
        // 4 bp barcode + 2 bp UMI; one read has N in the barcode, one is
        // too short. Both are seen but not used.
        let path = fastq_with(
            dir.path(),
            &["ACGTTTxx", "ACGTCCxx", "ACNTTTxx", "ACG"],
        );
        let protocol = Protocol::custom(4, 2, crate::barcode::BarcodeEnd::Five);
        let counter = FreqCounter::new();
        let stats = DensityStats::new();
        let config = DensityConfig {
            quiet: true,
            ..Default::default()
        };

        let fastx = FastxSource::new(&[path], MINI_BATCH_SIZE).unwrap();
        run_density_pipeline(fastx, &protocol, &counter, &config, &stats).unwrap();

        let (seen, used) = stats.summary();
        assert_eq!(seen, 4);
        assert_eq!(used, 2);
        assert_eq!(counter.find("ACGT"), Some(2));
        assert_eq!(counter.len(), 1);
    }

    #[test]
    fn test_density_many_reads_single_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let seqs: Vec<String> = (0..200).map(|_| "AAAACCxx".to_string()).collect();
        let refs: Vec<&str> = seqs.iter().map(|s| s.as_str()).collect();
        let path = fastq_with(dir.path(), &refs);

        let protocol = Protocol::custom(4, 2, crate::barcode::BarcodeEnd::Five);
        let counter = FreqCounter::new();
        let stats = DensityStats::new();
        let config = DensityConfig {
            num_threads: 2,
            quiet: true,
            ..Default::default()
        };

        let fastx = FastxSource::new(&[path], 16).unwrap();
        run_density_pipeline(fastx, &protocol, &counter, &config, &stats).unwrap();
        assert_eq!(counter.find("AAAA"), Some(200));
        assert_eq!(stats.summary(), (200, 200));
    }
}
