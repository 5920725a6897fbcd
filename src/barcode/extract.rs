//! Barcode + UMI extraction from a raw technical read.
//!
//! Pure functions, safe to call from any worker thread.

use super::{BarcodeEnd, Protocol};

/// Check that a sequence consists only of A/C/G/T.
///
/// Barcodes containing `N` (or anything else) are rejected at extraction;
/// the read is silently dropped and only counted as "seen".
pub fn is_all_acgt(seq: &[u8]) -> bool {
    seq.iter()
        .all(|&b| matches!(b, b'A' | b'C' | b'G' | b'T'))
}

/// Extract the cell barcode and UMI from a raw read sequence.
///
/// For 3'-end protocols the read is character-reversed before slicing.
/// Returns `None` if the read is shorter than barcode + UMI, or if the
/// barcode contains any base outside {A,C,G,T}. The UMI is not
/// validity-checked.
pub fn extract(seq: &[u8], protocol: &Protocol) -> Option<(String, String)> {
    if seq.len() < protocol.tech_len() {
        return None;
    }

    let reversed;
    let seq = match protocol.end() {
        BarcodeEnd::Five => seq,
        BarcodeEnd::Three => {
            reversed = seq.iter().rev().copied().collect::<Vec<u8>>();
            &reversed[..]
        }
    };

    let bc = &seq[..protocol.barcode_len()];
    if !is_all_acgt(bc) {
        return None;
    }
    let umi = &seq[protocol.barcode_len()..protocol.tech_len()];

    // slices are ASCII by construction
    Some((
        String::from_utf8_lossy(bc).into_owned(),
        String::from_utf8_lossy(umi).into_owned(),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_prime_extract() {
        let p = Protocol::custom(4, 2, BarcodeEnd::Five);
        let (bc, umi) = extract(b"ACGTTTrest", &p).unwrap();
        assert_eq!(bc, "ACGT");
        assert_eq!(umi, "TT");
    }

    #[test]
    fn test_three_prime_reverses_before_slicing() {
        // After reversal "NNNNACGT" -> "TGCANNNN"; barcode = "TGCA".
        let p = Protocol::custom(4, 0, BarcodeEnd::Three);
        let (bc, umi) = extract(b"NNNNACGT", &p).unwrap();
        assert_eq!(bc, "TGCA");
        assert_eq!(umi, "");
    }

    #[test]
    fn test_short_read_rejected() {
        let p = Protocol::chromium();
        assert!(extract(b"ACGT", &p).is_none());
        // one base short of bc + umi
        assert!(extract(&b"A".repeat(25), &p).is_none());
        assert!(extract(&b"A".repeat(26), &p).is_some());
    }

    #[test]
    fn test_n_in_barcode_rejected() {
        let p = Protocol::custom(4, 2, BarcodeEnd::Five);
        assert!(extract(b"ACNTTTTT", &p).is_none());
        // N in the UMI region is tolerated
        let (bc, umi) = extract(b"ACGTNNTT", &p).unwrap();
        assert_eq!(bc, "ACGT");
        assert_eq!(umi, "NN");
    }

    #[test]
    fn test_is_all_acgt() {
        assert!(is_all_acgt(b"ACGTACGT"));
        assert!(!is_all_acgt(b"ACGNACGT"));
        assert!(!is_all_acgt(b"acgt"));
    }
}
