//! Pluggable barcode assignment model.
//!
//! Given an observed (non-whitelisted) barcode and its candidate true
//! barcodes, a model assigns a posterior probability to each candidate.
//! The model is injected into the soft-map builder so tests can substitute
//! a deterministic stub.

use super::freq::FreqCounter;

/// Posterior assignment of an observed barcode to candidate true barcodes.
///
/// Implementations must be deterministic given identical inputs and produce
/// probabilities in `[0, 1]`. Normalization is expected by downstream
/// consumers but is not enforced here.
pub trait BarcodeModel {
    fn assign(
        &self,
        observed: &str,
        candidates: &[String],
        freq: &FreqCounter,
    ) -> Vec<(String, f64)>;
}

// ---------------------------------------------------------------------------
// CoinTossModel
// ---------------------------------------------------------------------------

/// Default model: probability proportional to candidate frequency.
///
/// Each candidate true barcode receives `freq(candidate) / total` where
/// `total` sums over all candidates. Candidates absent from the frequency
/// table (possible under whitelist import) contribute zero; if no candidate
/// was observed at all, mass is split uniformly.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoinTossModel;

impl BarcodeModel for CoinTossModel {
    fn assign(
        &self,
        _observed: &str,
        candidates: &[String],
        freq: &FreqCounter,
    ) -> Vec<(String, f64)> {
        let counts: Vec<f64> = candidates
            .iter()
            .map(|c| f64::from(freq.find(c).unwrap_or(0)))
            .collect();
        let total: f64 = counts.iter().sum();

        if total == 0.0 {
            let p = 1.0 / candidates.len() as f64;
            return candidates.iter().map(|c| (c.clone(), p)).collect();
        }

        candidates
            .iter()
            .zip(counts)
            .map(|(c, n)| (c.clone(), n / total))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_proportional() {
        let fc = FreqCounter::new();
        for _ in 0..30 {
            fc.upsert("AAAA");
        }
        for _ in 0..10 {
            fc.upsert("CCCC");
        }
        let cands = vec!["AAAA".to_string(), "CCCC".to_string()];
        let probs = CoinTossModel.assign("AACA", &cands, &fc);
        assert_eq!(probs.len(), 2);
        assert!((probs[0].1 - 0.75).abs() < 1e-12);
        assert!((probs[1].1 - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_unobserved_candidates_fall_back_to_uniform() {
        let fc = FreqCounter::new();
        let cands = vec!["AAAA".to_string(), "CCCC".to_string()];
        let probs = CoinTossModel.assign("AACA", &cands, &fc);
        assert!((probs[0].1 - 0.5).abs() < 1e-12);
        assert!((probs[1].1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_probabilities_in_unit_interval() {
        let fc = FreqCounter::new();
        fc.upsert("AAAA");
        let cands = vec![
            "AAAA".to_string(),
            "CCCC".to_string(),
            "GGGG".to_string(),
        ];
        for (_, p) in CoinTossModel.assign("AACA", &cands, &fc) {
            assert!((0.0..=1.0).contains(&p));
        }
    }
}
