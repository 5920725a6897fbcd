//! Barcode geometry and extraction.
//!
//! Droplet-based single-cell protocols differ only in where the cell
//! barcode and UMI sit inside the technical read. The `Protocol` value
//! captures that geometry so the rest of the pipeline is protocol-agnostic:
//! the density pipeline, knee selector, and soft-map builder all consume a
//! `Protocol` by reference and never branch on the chemistry name.

pub mod extract;
pub mod freq;
pub mod model;

// ---------------------------------------------------------------------------
// BarcodeEnd
// ---------------------------------------------------------------------------

/// Which end of the technical read carries the barcode.
///
/// For `Three`, the read is character-reversed before slicing. Note this is
/// a plain reversal, not a reverse complement; callers that need biological
/// orientation must complement downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarcodeEnd {
    Five,
    Three,
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Single-cell protocol geometry.
///
/// A plain value: `barcode_len` bases of cell barcode followed by
/// `umi_len` bases of UMI, read from the `end` of the technical read.
#[derive(Debug, Clone)]
pub struct Protocol {
    name: &'static str,
    bc_len: usize,
    umi_len: usize,
    end: BarcodeEnd,
}

impl Protocol {
    /// Drop-seq: 12 bp barcode + 8 bp UMI.
    pub fn dropseq() -> Self {
        Self {
            name: "dropseq",
            bc_len: 12,
            umi_len: 8,
            end: BarcodeEnd::Five,
        }
    }

    /// 10x Chromium v2: 16 bp barcode + 10 bp UMI.
    pub fn chromium() -> Self {
        Self {
            name: "chromium",
            bc_len: 16,
            umi_len: 10,
            end: BarcodeEnd::Five,
        }
    }

    /// 10x Chromium v3: 16 bp barcode + 12 bp UMI.
    pub fn chromium_v3() -> Self {
        Self {
            name: "chromiumV3",
            bc_len: 16,
            umi_len: 12,
            end: BarcodeEnd::Five,
        }
    }

    /// 10x GemCode (v1): 14 bp barcode + 10 bp UMI.
    pub fn gemcode() -> Self {
        Self {
            name: "gemcode",
            bc_len: 14,
            umi_len: 10,
            end: BarcodeEnd::Five,
        }
    }

    /// User-defined geometry.
    pub fn custom(bc_len: usize, umi_len: usize, end: BarcodeEnd) -> Self {
        Self {
            name: "custom",
            bc_len,
            umi_len,
            end,
        }
    }

    /// Protocol name as shown in logs and run metadata.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Cell barcode length in bases.
    pub fn barcode_len(&self) -> usize {
        self.bc_len
    }

    /// UMI length in bases.
    pub fn umi_len(&self) -> usize {
        self.umi_len
    }

    /// Which read end carries the barcode.
    pub fn end(&self) -> BarcodeEnd {
        self.end
    }

    /// Total technical prefix length (barcode + UMI).
    pub fn tech_len(&self) -> usize {
        self.bc_len + self.umi_len
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_geometries() {
        let p = Protocol::dropseq();
        assert_eq!(p.name(), "dropseq");
        assert_eq!(p.barcode_len(), 12);
        assert_eq!(p.umi_len(), 8);
        assert_eq!(p.end(), BarcodeEnd::Five);

        let p = Protocol::chromium();
        assert_eq!((p.barcode_len(), p.umi_len()), (16, 10));

        let p = Protocol::chromium_v3();
        assert_eq!((p.barcode_len(), p.umi_len()), (16, 12));
        assert_eq!(p.tech_len(), 28);

        let p = Protocol::gemcode();
        assert_eq!((p.barcode_len(), p.umi_len()), (14, 10));
    }

    #[test]
    fn test_custom_geometry() {
        let p = Protocol::custom(4, 2, BarcodeEnd::Three);
        assert_eq!(p.name(), "custom");
        assert_eq!(p.barcode_len(), 4);
        assert_eq!(p.umi_len(), 2);
        assert_eq!(p.end(), BarcodeEnd::Three);
    }
}
