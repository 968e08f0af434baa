/*!
[`Sector`]: one logical sector read from media.

Grounded on the teacher crate's `trackdata.rs`/`sector_view.rs` sector
representation, narrowed to the fields `spec.md` §3 names.
*/

use crate::{chs::DiskChsn, Confidence, CONFIDENCE_MAX};

/// The closed set of sector-level status codes, shared between the
/// Commodore GCR adapter and any error-preserving container that stores a
/// per-sector status byte (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, Default)]
pub enum SectorStatus {
    #[default]
    Ok,
    HeaderNotFound,
    NoSync,
    DataNotFound,
    DataChecksum,
    HeaderChecksum,
    IdMismatch,
    WriteProtected,
    Extended,
}

impl SectorStatus {
    /// Whether this status still represents readable (if possibly wrong) data.
    pub fn is_ok(&self) -> bool {
        matches!(self, SectorStatus::Ok | SectorStatus::Extended)
    }
}

/// One logical sector, identified by `(cylinder, head, sector_id, size_code)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sector {
    pub address: DiskChsn,
    pub data: Vec<u8>,
    pub crc_ok: bool,
    pub deleted: bool,
    pub data_missing: bool,
    /// 0..=10000, permille x10. See `spec.md` §3.
    pub confidence: Confidence,
    pub status: SectorStatus,
    /// Optional per-sector controller status bytes, for error-preserving
    /// containers (D64-with-errors and similar).
    pub controller_status: Option<Vec<u8>>,
}

impl Sector {
    pub fn new(address: DiskChsn, data: Vec<u8>) -> Self {
        let status = SectorStatus::Ok;
        Self {
            address,
            data,
            crc_ok: true,
            deleted: false,
            data_missing: false,
            confidence: CONFIDENCE_MAX,
            status,
            controller_status: None,
        }
    }

    /// True when `data.len()` matches the size implied by the address's
    /// size code - the normal case per `spec.md` §3's payload-length
    /// invariant. Protection-scheme adapters may deliberately violate this;
    /// they must record the deviation in the track's diagnostic string.
    pub fn has_nominal_length(&self) -> bool {
        self.data.len() == self.address.size()
    }

    pub fn with_status(mut self, status: SectorStatus) -> Self {
        self.crc_ok = status.is_ok();
        self.status = status;
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence.min(CONFIDENCE_MAX);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sector_is_full_confidence_and_nominal() {
        let s = Sector::new(DiskChsn::new(1, 0, 1, 1), vec![0u8; 256]);
        assert_eq!(s.confidence, CONFIDENCE_MAX);
        assert!(s.has_nominal_length());
        assert_eq!(s.status, SectorStatus::Ok);
    }

    #[test]
    fn oversized_payload_is_flagged_non_nominal() {
        let s = Sector::new(DiskChsn::new(1, 0, 1, 1), vec![0u8; 300]);
        assert!(!s.has_nominal_length());
    }
}
