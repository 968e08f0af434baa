/*!
[`DiskImage`]: the container root of the universal disk model.

Per `spec.md` §3, the disk image exclusively owns its per-track records and
is produced by exactly one adapter's `open`. `diskimg` represents "lazily
produced by `read_track`" as an `Option<Track>` slot that starts `None` and
is filled in by [`crate::registry::FormatAdapter::read_track`] on first
access, rather than threading an adapter back-reference through the model
(see `DESIGN.md` for that Open Question's resolution).
*/

use crate::model::Track;

/// Nominal disk geometry. The per-track truth can differ (protection
/// schemes, variable sector counts); this is the value [`DiskImage::get_geometry`]
/// reports and the value adapters use to size their track array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskInfo {
    pub cylinders: u16,
    pub heads: u8,
    pub sectors_per_track: u8,
    pub sector_size: usize,
}

/// The container root (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct DiskImage {
    pub geometry: DiskInfo,
    pub format_id: &'static str,
    pub format_name: &'static str,
    /// Row-major `cylinder*heads+head` order; `None` entries are unformatted
    /// or unreadable tracks.
    tracks: Vec<Option<Track>>,
    pub source_file_size: Option<u64>,
    pub detected_format_display: String,
    pub source_checksum: Option<String>,
    pub read_only: bool,
}

impl DiskImage {
    pub fn new(geometry: DiskInfo, format_id: &'static str, format_name: &'static str) -> Self {
        let slots = geometry.cylinders as usize * geometry.heads as usize;
        Self {
            geometry,
            format_id,
            format_name,
            tracks: vec![None; slots],
            source_file_size: None,
            detected_format_display: format_name.to_string(),
            source_checksum: None,
            read_only: false,
        }
    }

    fn index(&self, cylinder: u16, head: u8) -> Option<usize> {
        if cylinder >= self.geometry.cylinders || head >= self.geometry.heads {
            return None;
        }
        Some(cylinder as usize * self.geometry.heads as usize + head as usize)
    }

    pub fn track(&self, cylinder: u16, head: u8) -> Option<&Track> {
        self.index(cylinder, head).and_then(|i| self.tracks[i].as_ref())
    }

    pub fn track_mut(&mut self, cylinder: u16, head: u8) -> Option<&mut Track> {
        self.index(cylinder, head).and_then(|i| self.tracks[i].as_mut())
    }

    /// Install a decoded track into its `(cylinder, head)` slot. Returns an
    /// error if the address is out of the disk's nominal geometry.
    pub fn set_track(&mut self, cylinder: u16, head: u8, track: Track) -> Result<(), crate::DiskImageError> {
        let idx = self
            .index(cylinder, head)
            .ok_or_else(|| crate::DiskImageError::RangeError(format!("c:{cylinder} h:{head} out of geometry")))?;
        self.tracks[idx] = Some(track);
        Ok(())
    }

    pub fn iter_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter_map(|t| t.as_ref())
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn get_geometry(&self) -> (u16, u8, u8, usize) {
        (
            self.geometry.cylinders,
            self.geometry.heads,
            self.geometry.sectors_per_track,
            self.geometry.sector_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackEncoding;

    fn geometry() -> DiskInfo {
        DiskInfo { cylinders: 2, heads: 1, sectors_per_track: 9, sector_size: 512 }
    }

    #[test]
    fn set_and_get_track_round_trips() {
        let mut disk = DiskImage::new(geometry(), "test", "Test Format");
        disk.set_track(1, 0, Track::new(1, 0, TrackEncoding::Mfm)).unwrap();
        assert!(disk.track(1, 0).is_some());
        assert!(disk.track(0, 0).is_none());
    }

    #[test]
    fn out_of_geometry_track_is_rejected() {
        let mut disk = DiskImage::new(geometry(), "test", "Test Format");
        assert!(disk.set_track(5, 0, Track::new(5, 0, TrackEncoding::Mfm)).is_err());
    }
}
