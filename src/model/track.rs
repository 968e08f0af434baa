/*!
[`Track`]: all data captured from one physical track.

Grounded on the teacher crate's `track/bitstream.rs` and `track/fluxstream.rs`
split between sector-level and flux-level track representations; this spec
folds both into one struct with optional flux fields, since `spec.md` §3
describes a single `Track` type with optional raw-bytes/revolution data
rather than a trait-object-per-resolution split.
*/

use crate::{model::{Sector, TrackEncoding}, Confidence, CONFIDENCE_MAX};

/// One captured revolution of a flux-preserving read: a list of flux
/// transition intervals (nanoseconds) plus the sample-counter timestamp of
/// the index mark that closed it. See `spec.md` §4.2.
#[derive(Debug, Clone, Default)]
pub struct Revolution {
    /// Flux transition intervals, in nanoseconds. Non-negative, and (per
    /// the invariant in `spec.md` §3) the cumulative timestamps they imply
    /// are monotonically non-decreasing by construction.
    pub flux_ns: Vec<f64>,
    /// Sample-counter value of the index mark that closed this revolution,
    /// or `None` for the trailing partial revolution with no closing index.
    pub index_timestamp: Option<u64>,
}

impl Revolution {
    pub fn transition_count(&self) -> usize {
        self.flux_ns.len()
    }
}

/// All data from one physical track, per `spec.md` §3.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_number: u16,
    pub side: u8,
    pub encoding: TrackEncoding,
    pub sectors: Vec<Sector>,
    /// The encoded bitstream as the device produced it, retained losslessly
    /// for flux/bitstream-class containers.
    pub raw_bytes: Option<Vec<u8>>,
    /// Per-revolution flux data, present only for flux-preserving sources.
    pub revolutions: Vec<Revolution>,
    /// Indices into `raw_bytes` where multi-revolution variance exceeded
    /// the configured weak-bit threshold.
    pub weak_positions: Vec<usize>,
    pub confidence: Confidence,
    pub diagnostic: String,
    /// Measured average RPM across revolutions, when known.
    pub avg_rpm: Option<f64>,
}

impl Track {
    pub fn new(track_number: u16, side: u8, encoding: TrackEncoding) -> Self {
        Self {
            track_number,
            side,
            encoding,
            sectors: Vec::new(),
            raw_bytes: None,
            revolutions: Vec::new(),
            weak_positions: Vec::new(),
            confidence: CONFIDENCE_MAX,
            diagnostic: String::new(),
            avg_rpm: None,
        }
    }

    pub fn revolution_count(&self) -> usize {
        self.revolutions.len()
    }

    /// True when every sector on this track reports [`crate::model::SectorStatus::Ok`].
    pub fn all_sectors_ok(&self) -> bool {
        self.sectors.iter().all(|s| s.status.is_ok())
    }

    /// Recompute `confidence` as the mean of per-sector confidences, or
    /// leave it untouched (full confidence) if the track carries no sectors
    /// yet (e.g. a flux-only track before bitcell decode).
    pub fn recompute_confidence(&mut self) {
        if self.sectors.is_empty() {
            return;
        }
        let sum: u32 = self.sectors.iter().map(|s| s.confidence as u32).sum();
        self.confidence = (sum / self.sectors.len() as u32) as Confidence;
    }

    pub fn push_diagnostic(&mut self, msg: impl AsRef<str>) {
        if !self.diagnostic.is_empty() {
            self.diagnostic.push_str("; ");
        }
        self.diagnostic.push_str(msg.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chs::DiskChsn;
    use crate::model::SectorStatus;

    #[test]
    fn confidence_is_mean_of_sectors() {
        let mut t = Track::new(0, 0, TrackEncoding::Mfm);
        t.sectors.push(Sector::new(DiskChsn::new(0, 0, 1, 1), vec![0; 256]).with_confidence(10000));
        t.sectors.push(Sector::new(DiskChsn::new(0, 0, 2, 1), vec![0; 256]).with_confidence(0));
        t.recompute_confidence();
        assert_eq!(t.confidence, 5000);
    }

    #[test]
    fn all_sectors_ok_false_on_any_bad_status() {
        let mut t = Track::new(0, 0, TrackEncoding::Mfm);
        t.sectors.push(Sector::new(DiskChsn::new(0, 0, 1, 1), vec![0; 256]));
        t.sectors
            .push(Sector::new(DiskChsn::new(0, 0, 2, 1), vec![0; 256]).with_status(SectorStatus::DataChecksum));
        assert!(!t.all_sectors_ok());
    }
}
