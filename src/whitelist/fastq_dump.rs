//! Corrected-FASTQ writer.
//!
//! Streams the (technical, biological) read pairs a second time, corrects
//! each observed barcode against the true set / soft map, and emits the
//! biological read with `name_barcode_umi` headers.

use std::collections::HashSet;
use std::io::Write;

use anyhow::Result;
use rand::Rng;

use crate::barcode::extract::extract;
use crate::barcode::Protocol;
use crate::io::fastx::FastxPairSource;
use crate::whitelist::softmap::SoftMap;

/// Emit a progress line every this many dumped reads.
const PROGRESS_INTERVAL: u64 = 500_000;

/// Rewrite the biological reads with corrected barcodes.
///
/// Per pair: the barcode and UMI come from the technical read. A barcode
/// already in the true set passes through; an ambiguous soft-map entry is
/// resolved with a uniform draw, taking the first candidate whose
/// probability exceeds the draw (compared directly, not cumulatively); a
/// single-candidate entry is taken as-is; anything else (including
/// unextractable reads) is skipped. Returns the number of records written.
pub fn write_fastq(
    mut pairs: FastxPairSource,
    protocol: &Protocol,
    soft_map: &SoftMap,
    true_barcodes: &HashSet<String>,
    quiet: bool,
    out: &mut dyn Write,
) -> Result<u64> {
    let mut rng = rand::thread_rng();
    let mut num_dumped = 0u64;
    let mut chunk = Vec::new();

    while pairs.next_chunk(&mut chunk)? {
        for rp in &chunk {
            let Some((barcode, umi)) = extract(&rp.tech_seq, protocol) else {
                continue;
            };

            let corrected: &str = if true_barcodes.contains(&barcode) {
                &barcode
            } else if let Some(candidates) = soft_map.get(&barcode) {
                if candidates.len() > 1 {
                    let rn: f64 = rng.gen();
                    let mut pick = "";
                    for (cand, prob) in candidates {
                        if rn < *prob {
                            pick = cand;
                            break;
                        }
                    }
                    pick
                } else {
                    &candidates[0].0
                }
            } else {
                continue;
            };

            out.write_all(b"@")?;
            out.write_all(&rp.name)?;
            writeln!(out, "_{}_{}", corrected, umi)?;
            out.write_all(&rp.bio_seq)?;
            out.write_all(b"\n+\n")?;
            out.write_all(&rp.bio_qual)?;
            out.write_all(b"\n")?;

            num_dumped += 1;
            if !quiet && num_dumped % PROGRESS_INTERVAL == 0 {
                eprint!("\rDumped {} reads", num_dumped);
            }
        }
    }
    if !quiet {
        eprintln!();
    }

    Ok(num_dumped)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::BarcodeEnd;

    fn fastq(path: &std::path::Path, records: &[(&str, &str)]) {
        let mut f = std::fs::File::create(path).unwrap();
        for (name, seq) in records {
            writeln!(f, "@{}\n{}\n+\n{}", name, seq, "J".repeat(seq.len())).unwrap();
        }
    }

    fn pair_source(
        dir: &std::path::Path,
        tech: &[(&str, &str)],
        bio: &[(&str, &str)],
    ) -> FastxPairSource {
        let pt = dir.join("tech.fastq");
        let pb = dir.join("bio.fastq");
        fastq(&pt, tech);
        fastq(&pb, bio);
        FastxPairSource::new(
            &[pt.display().to_string()],
            &[pb.display().to_string()],
            100,
        )
        .unwrap()
    }

    #[test]
    fn test_true_barcode_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let protocol = Protocol::custom(4, 2, BarcodeEnd::Five);
        let src = pair_source(
            dir.path(),
            &[("t1", "ACGTGGxx")],
            &[("read1", "GATTACA")],
        );

        let truth: HashSet<String> = ["ACGT".to_string()].into_iter().collect();
        let map = SoftMap::new();
        let mut out = Vec::new();
        let n = write_fastq(src, &protocol, &map, &truth, true, &mut out).unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "@read1_ACGT_GG\nGATTACA\n+\nJJJJJJJ\n"
        );
    }

    #[test]
    fn test_single_candidate_corrected() {
        let dir = tempfile::tempdir().unwrap();
        let protocol = Protocol::custom(4, 2, BarcodeEnd::Five);
        let src = pair_source(
            dir.path(),
            &[("t1", "ACGAGGxx")],
            &[("read1", "GATTACA")],
        );

        let truth: HashSet<String> = ["ACGT".to_string()].into_iter().collect();
        let mut map = SoftMap::new();
        map.insert("ACGA".to_string(), vec![("ACGT".to_string(), 1.0)]);
        let mut out = Vec::new();
        write_fastq(src, &protocol, &map, &truth, true, &mut out).unwrap();
        assert!(String::from_utf8(out)
            .unwrap()
            .starts_with("@read1_ACGT_GG\n"));
    }

    #[test]
    fn test_ambiguous_resolved_to_some_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let protocol = Protocol::custom(4, 2, BarcodeEnd::Five);
        let src = pair_source(
            dir.path(),
            &[("t1", "ACGAGGxx")],
            &[("read1", "GATTACA")],
        );

        let truth: HashSet<String> =
            ["ACGT".to_string(), "ACGC".to_string()].into_iter().collect();
        let mut map = SoftMap::new();
        // the draw lands below one of the two probabilities every time
        map.insert(
            "ACGA".to_string(),
            vec![("ACGT".to_string(), 1.0), ("ACGC".to_string(), 1.0)],
        );
        let mut out = Vec::new();
        write_fastq(src, &protocol, &map, &truth, true, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("@read1_ACGT_GG\n") || text.starts_with("@read1_ACGC_GG\n"));
    }

    #[test]
    fn test_unknown_and_short_reads_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let protocol = Protocol::custom(4, 2, BarcodeEnd::Five);
        let src = pair_source(
            dir.path(),
            &[("t1", "TTTTGGxx"), ("t2", "ACG")],
            &[("read1", "GATTACA"), ("read2", "CATCATC")],
        );

        let truth: HashSet<String> = ["ACGT".to_string()].into_iter().collect();
        let map = SoftMap::new();
        let mut out = Vec::new();
        let n = write_fastq(src, &protocol, &map, &truth, true, &mut out).unwrap();
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }
}
