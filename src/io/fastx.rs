//! FASTX reader — wraps `paraseq` for batched reading.
//!
//! Provides the sequence sources feeding the barcode pipelines: a
//! single-end source for the density pass (only the technical read is
//! needed) and a paired source for the FASTQ rewriter (barcode read plus
//! biological read with name and quality).
//!
//! Decompression (gzip, zstd, ...) is transparent via niffler, and multiple
//! input files are concatenated into one stream.

use anyhow::{Context, Result};

pub use paraseq::fastq;
pub use paraseq::Record;

// ---------------------------------------------------------------------------
// Batch types
// ---------------------------------------------------------------------------

/// A chunk of technical-read sequences for the density pass.
pub type SeqChunk = Vec<Vec<u8>>;

/// A read pair for the FASTQ rewriter: technical read + biological read.
///
/// `name`, `bio_seq`, and `bio_qual` come from the biological file; only
/// the sequence of the technical read is retained.
#[derive(Debug, Clone)]
pub struct ReadPair {
    pub tech_seq: Vec<u8>,
    pub name: Vec<u8>,
    pub bio_seq: Vec<u8>,
    pub bio_qual: Vec<u8>,
}

/// A chunk of read pairs.
pub type PairChunk = Vec<ReadPair>;

// ---------------------------------------------------------------------------
// FastxSource
// ---------------------------------------------------------------------------

/// Sequential single-end FASTQ reader producing chunks of raw sequences.
pub struct FastxSource {
    reader: fastq::Reader<Box<dyn std::io::Read + Send>>,
    record_set: fastq::RecordSet,
    chunk_size: usize,
}

impl FastxSource {
    /// Open one or more (optionally compressed) FASTQ files.
    pub fn new(paths: &[String], chunk_size: usize) -> Result<Self> {
        let r = open_concatenated_readers(paths)?;
        let reader = fastq::Reader::new(r);
        let record_set = reader.new_record_set();
        Ok(Self {
            reader,
            record_set,
            chunk_size,
        })
    }

    /// Read the next chunk of sequences into the provided buffer.
    ///
    /// Each underlying record set is drained completely, so a chunk may
    /// exceed `chunk_size` by up to one set.
    ///
    /// Returns `Ok(true)` if reads were produced, `Ok(false)` at EOF.
    pub fn next_chunk(&mut self, chunk: &mut SeqChunk) -> Result<bool> {
        chunk.clear();

        while chunk.len() < self.chunk_size {
            let has = self.record_set.fill(&mut self.reader)?;
            if !has {
                break;
            }
            for rec in self.record_set.iter() {
                let rec = rec?;
                chunk.push(rec.seq().into_owned());
            }
        }

        Ok(!chunk.is_empty())
    }
}

// ---------------------------------------------------------------------------
// FastxPairSource
// ---------------------------------------------------------------------------

/// Sequential reader over a (technical, biological) FASTQ file pair.
///
/// The two streams are consumed in lockstep; a length mismatch simply ends
/// the stream at the shorter file.
pub struct FastxPairSource {
    tech_reader: fastq::Reader<Box<dyn std::io::Read + Send>>,
    bio_reader: fastq::Reader<Box<dyn std::io::Read + Send>>,
    tech_set: fastq::RecordSet,
    bio_set: fastq::RecordSet,
    chunk_size: usize,
}

impl FastxPairSource {
    /// Open the technical and biological file sets.
    pub fn new(
        tech_paths: &[String],
        bio_paths: &[String],
        chunk_size: usize,
    ) -> Result<Self> {
        let rt = open_concatenated_readers(tech_paths)?;
        let tech_reader = fastq::Reader::new(rt);
        let tech_set = tech_reader.new_record_set();

        let rb = open_concatenated_readers(bio_paths)?;
        let bio_reader = fastq::Reader::new(rb);
        let bio_set = bio_reader.new_record_set();

        Ok(Self {
            tech_reader,
            bio_reader,
            tech_set,
            bio_set,
            chunk_size,
        })
    }

    /// Read the next chunk of read pairs.
    ///
    /// Each pair of record sets is drained completely, so a chunk may
    /// exceed `chunk_size` by up to one set.
    ///
    /// Returns `Ok(true)` if reads were produced, `Ok(false)` at EOF.
    pub fn next_chunk(&mut self, chunk: &mut PairChunk) -> Result<bool> {
        chunk.clear();

        while chunk.len() < self.chunk_size {
            let has_t = self.tech_set.fill(&mut self.tech_reader)?;
            let has_b = self.bio_set.fill(&mut self.bio_reader)?;
            if !has_t || !has_b {
                break;
            }

            let mut tech_iter = self.tech_set.iter();
            let mut bio_iter = self.bio_set.iter();
            loop {
                match (tech_iter.next(), bio_iter.next()) {
                    (Some(Ok(tech)), Some(Ok(bio))) => {
                        chunk.push(ReadPair {
                            tech_seq: tech.seq().into_owned(),
                            name: bio.id().to_vec(),
                            bio_seq: bio.seq().into_owned(),
                            bio_qual: bio.qual().map(|q| q.to_vec()).unwrap_or_default(),
                        });
                    }
                    (Some(Err(e)), _) | (_, Some(Err(e))) => return Err(e.into()),
                    _ => break,
                }
            }
        }

        Ok(!chunk.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Open a single file with automatic decompression (gzip, zstd, etc.).
fn open_with_decompression(path: &str) -> Result<Box<dyn std::io::Read + Send>> {
    let (reader, _format) = niffler::send::from_path(path)
        .with_context(|| format!("failed to open {}", path))?;
    Ok(reader)
}

/// Open multiple files and concatenate them into a single reader.
fn open_concatenated_readers(
    paths: &[String],
) -> Result<Box<dyn std::io::Read + Send>> {
    use std::io::Read;

    if paths.is_empty() {
        anyhow::bail!("no input files specified");
    }
    if paths.len() == 1 {
        return open_with_decompression(&paths[0]);
    }
    let mut readers: Vec<Box<dyn Read + Send>> = Vec::with_capacity(paths.len());
    for path in paths {
        readers.push(open_with_decompression(path)?);
    }
    Ok(Box::new(MultiReader { readers, current: 0 }))
}

/// Concatenating reader over multiple boxed readers.
struct MultiReader {
    readers: Vec<Box<dyn std::io::Read + Send>>,
    current: usize,
}

impl std::io::Read for MultiReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.current < self.readers.len() {
            let n = self.readers[self.current].read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.current += 1;
        }
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fastq(path: &std::path::Path, records: &[(&str, &str)]) {
        let mut f = std::fs::File::create(path).unwrap();
        for (name, seq) in records {
            writeln!(f, "@{}\n{}\n+\n{}", name, seq, "I".repeat(seq.len())).unwrap();
        }
    }

    #[test]
    fn test_single_end_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r1.fastq");
        write_fastq(&path, &[("r1", "ACGT"), ("r2", "TTTT"), ("r3", "GGGG")]);

        let mut src = FastxSource::new(&[path.display().to_string()], 2).unwrap();
        let mut chunk = Vec::new();
        let mut seqs: Vec<Vec<u8>> = Vec::new();
        while src.next_chunk(&mut chunk).unwrap() {
            seqs.extend(chunk.iter().cloned());
        }
        assert_eq!(
            seqs,
            vec![b"ACGT".to_vec(), b"TTTT".to_vec(), b"GGGG".to_vec()]
        );
    }

    #[test]
    fn test_concatenated_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("a.fastq");
        let p2 = dir.path().join("b.fastq");
        write_fastq(&p1, &[("a", "AAAA")]);
        write_fastq(&p2, &[("b", "CCCC")]);

        let mut src = FastxSource::new(
            &[p1.display().to_string(), p2.display().to_string()],
            10,
        )
        .unwrap();
        let mut chunk = Vec::new();
        let mut n = 0;
        while src.next_chunk(&mut chunk).unwrap() {
            n += chunk.len();
        }
        assert_eq!(n, 2);
    }

    #[test]
    fn test_paired_lockstep() {
        let dir = tempfile::tempdir().unwrap();
        let pt = dir.path().join("tech.fastq");
        let pb = dir.path().join("bio.fastq");
        write_fastq(&pt, &[("t1", "ACGTAC"), ("t2", "TTTTTT")]);
        write_fastq(&pb, &[("b1", "GATTACA"), ("b2", "CATCATC")]);

        let mut src = FastxPairSource::new(
            &[pt.display().to_string()],
            &[pb.display().to_string()],
            10,
        )
        .unwrap();
        let mut chunk = Vec::new();
        assert!(src.next_chunk(&mut chunk).unwrap());
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk[0].tech_seq, b"ACGTAC");
        assert_eq!(chunk[0].name, b"b1");
        assert_eq!(chunk[0].bio_seq, b"GATTACA");
        assert_eq!(chunk[0].bio_qual, b"IIIIIII");
        assert!(!src.next_chunk(&mut chunk).unwrap());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(FastxSource::new(&["/nonexistent/x.fastq".to_string()], 10).is_err());
        assert!(FastxSource::new(&[], 10).is_err());
    }
}
