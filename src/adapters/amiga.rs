/*!
Amiga ADF: a raw-sector container, like D64, rather than a bitstream one -
ADF stores sectors after AmigaDOS's own MFM decode, not the encoded
bitstream (`spec.md` §4.4). Grounded on the teacher crate's treatment of
raw-sector PC-derived formats (`file_parsers::raw_sector` family) applied
to the Amiga's fixed DD/HD geometry instead.
*/

use crate::{
    chs::DiskChsn,
    model::{DiskInfo, Sector, Track, TrackEncoding},
    options::DecodeOptions,
    registry::{AdapterCaps, FormatAdapter, Match, OpenImage, ProbeScore, Weight},
    DiskImageError,
};

const CYLINDERS: u16 = 80;
const HEADS: u8 = 2;
const SECTOR_SIZE: usize = 512;
const SECTORS_DD: u8 = 11;
const SECTORS_HD: u8 = 22;

fn size_for(sectors_per_track: u8) -> usize {
    CYLINDERS as usize * HEADS as usize * sectors_per_track as usize * SECTOR_SIZE
}

fn geometry_for_size(len: usize) -> Option<u8> {
    if len == size_for(SECTORS_DD) {
        Some(SECTORS_DD)
    }
    else if len == size_for(SECTORS_HD) {
        Some(SECTORS_HD)
    }
    else {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdfAdapter;

struct OpenAdf {
    data: Vec<u8>,
    sectors_per_track: u8,
}

impl FormatAdapter for AdfAdapter {
    fn name(&self) -> &'static str {
        "adf"
    }
    fn description(&self) -> &'static str {
        "Commodore Amiga raw sector image (ADF)"
    }
    fn extensions(&self) -> &'static str {
        "adf"
    }
    fn format_id(&self) -> &'static str {
        "adf"
    }
    fn caps(&self) -> AdapterCaps {
        AdapterCaps::CAN_READ | AdapterCaps::CAN_WRITE | AdapterCaps::CAN_CREATE
    }

    fn probe(&self, data: &[u8], _filename: Option<&str>) -> ProbeScore {
        let mut score = ProbeScore::new();
        let Some(spt) = geometry_for_size(data.len())
        else {
            score.push(Match::negative("size", Weight::High, "not a known ADF size"));
            return score.finalize();
        };
        score.push(Match::positive("size", Weight::High, format!("matches ADF size ({spt} sectors/track)")));

        if data.len() >= 4 && &data[0..3] == b"DOS" && data[3] <= 5 {
            score.push(Match::positive("bootblock", Weight::Magic, "AmigaDOS bootblock signature"));

            if data.len() >= 1024 {
                let stored = u32::from_be_bytes(data[4..8].try_into().unwrap());
                if crate::util::amiga_bootblock_checksum(&data[0..1024]) == stored {
                    score.push(Match::positive("bootblock_checksum", Weight::High, "bootblock checksum valid"));
                }
                else {
                    score.push(Match::negative("bootblock_checksum", Weight::High, "bootblock checksum mismatch"));
                }
            }
        }
        score.finalize()
    }

    fn open(&self, data: &[u8], _opts: &DecodeOptions) -> Result<Box<dyn OpenImage>, DiskImageError> {
        let spt = geometry_for_size(data.len())
            .ok_or_else(|| DiskImageError::FormatError(format!("{} is not a known ADF size", data.len())))?;
        Ok(Box::new(OpenAdf { data: data.to_vec(), sectors_per_track: spt }))
    }

    fn create_blank(&self, geometry: DiskInfo) -> Result<Vec<u8>, DiskImageError> {
        let spt = if geometry.sectors_per_track > SECTORS_DD { SECTORS_HD } else { SECTORS_DD };
        Ok(vec![0u8; size_for(spt)])
    }
}

impl OpenImage for OpenAdf {
    fn geometry(&self) -> DiskInfo {
        DiskInfo { cylinders: CYLINDERS, heads: HEADS, sectors_per_track: self.sectors_per_track, sector_size: SECTOR_SIZE }
    }
    fn format_id(&self) -> &'static str {
        "adf"
    }
    fn format_name(&self) -> &'static str {
        "Amiga (ADF)"
    }

    fn read_track(&mut self, cylinder: u16, head: u8, _opts: &DecodeOptions) -> Result<Track, DiskImageError> {
        if cylinder >= CYLINDERS || head >= HEADS {
            return Err(DiskImageError::SeekError(format!("no such track {cylinder}/{head}")));
        }
        let track_index = cylinder as usize * HEADS as usize + head as usize;
        let track_bytes = self.sectors_per_track as usize * SECTOR_SIZE;
        let base = track_index * track_bytes;

        let mut track = Track::new(cylinder, head, TrackEncoding::Mfm);
        for s in 0..self.sectors_per_track {
            let off = base + s as usize * SECTOR_SIZE;
            let data = self.data[off..off + SECTOR_SIZE].to_vec();
            track.sectors.push(Sector::new(DiskChsn::new(cylinder, head, s, 2), data));
        }
        track.recompute_confidence();
        Ok(track)
    }

    fn write_track(&mut self, cylinder: u16, head: u8, track: &Track) -> Result<(), DiskImageError> {
        if cylinder >= CYLINDERS || head >= HEADS {
            return Err(DiskImageError::RangeError(format!("no such track {cylinder}/{head}")));
        }
        let track_index = cylinder as usize * HEADS as usize + head as usize;
        let track_bytes = self.sectors_per_track as usize * SECTOR_SIZE;
        let base = track_index * track_bytes;
        for sector in &track.sectors {
            let off = base + sector.address.sector() as usize * SECTOR_SIZE;
            let len = sector.data.len().min(SECTOR_SIZE);
            self.data[off..off + len].copy_from_slice(&sector.data[..len]);
        }
        Ok(())
    }

    fn supports_write(&self) -> bool {
        true
    }

    fn finalize(&self) -> Vec<u8> {
        self.data.clone()
    }
}
