/*!
Atari 8-bit ATR raw-sector container (`spec.md` §4.4, §6).

The 16-byte header (`spec.md` calls out its magic + size + sector-size
fields explicitly as a "bit-exact" contract) is grounded on the long-public
ATR layout: LE magic `0x0296`, then the image size in 16-byte paragraphs
split across a low 16-bit field and a high 8-bit field, then the sector
size, then six reserved bytes.
*/

use crate::{
    chs::DiskChsn,
    model::{DiskInfo, Sector, Track, TrackEncoding},
    options::DecodeOptions,
    registry::{AdapterCaps, FormatAdapter, Match, OpenImage, ProbeScore, Weight},
    DiskImageError,
};
use binrw::{binrw, BinRead, BinWrite};
use std::io::Cursor;

pub const ATR_MAGIC: u16 = 0x0296;
const HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct AtrAdapter;

struct OpenAtr {
    data: Vec<u8>,
    cylinders: u16,
    sectors_per_track: u8,
    sector_size: usize,
}

/// The 16-byte ATR header: LE magic, image size split across a 16-bit low
/// field and an 8-bit high field (both counted in 16-byte paragraphs),
/// sector size, and six reserved bytes.
#[derive(Debug, Clone, Copy)]
#[binrw]
#[brw(little)]
struct AtrHeader {
    magic: u16,
    size_lo: u16,
    sector_size: u16,
    size_hi: u8,
    _reserved: [u8; 9],
}

impl AtrHeader {
    fn total_paragraphs(&self) -> u32 {
        self.size_lo as u32 | ((self.size_hi as u32) << 16)
    }

    fn from_paragraphs(sector_size: u16, paragraphs: u32) -> Self {
        Self {
            magic: ATR_MAGIC,
            size_lo: (paragraphs & 0xFFFF) as u16,
            sector_size,
            size_hi: ((paragraphs >> 16) & 0xFF) as u8,
            _reserved: [0; 9],
        }
    }

    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LEN));
        self.write(&mut cursor).expect("fixed-size header write cannot fail");
        cursor.into_inner().try_into().expect("ATR header is exactly 16 bytes")
    }
}

fn parse_header(data: &[u8]) -> Option<(usize, usize)> {
    if data.len() < HEADER_LEN {
        return None;
    }
    let header = AtrHeader::read(&mut Cursor::new(&data[..HEADER_LEN])).ok()?;
    if header.magic != ATR_MAGIC {
        return None;
    }
    let total_bytes = header.total_paragraphs() as usize * 16;
    Some((total_bytes, header.sector_size as usize))
}

impl FormatAdapter for AtrAdapter {
    fn name(&self) -> &'static str {
        "atr"
    }
    fn description(&self) -> &'static str {
        "Atari 8-bit raw sector image (ATR)"
    }
    fn extensions(&self) -> &'static str {
        "atr"
    }
    fn format_id(&self) -> &'static str {
        "atr"
    }
    fn caps(&self) -> AdapterCaps {
        AdapterCaps::CAN_READ | AdapterCaps::CAN_WRITE | AdapterCaps::CAN_CREATE
    }

    fn probe(&self, data: &[u8], _filename: Option<&str>) -> ProbeScore {
        let mut score = ProbeScore::new();
        match parse_header(data) {
            Some((total_bytes, _)) => {
                score.push(Match::positive("magic", Weight::Magic, "0x0296 ATR signature"));
                if data.len() >= HEADER_LEN + total_bytes {
                    score.push(Match::positive("size", Weight::Medium, "header size matches payload length"));
                }
                else {
                    score.push(Match::negative("size", Weight::Medium, "header size exceeds payload length"));
                }
            }
            None => {
                score.push(Match::negative("magic", Weight::Magic, "missing 0x0296 ATR signature"));
            }
        }
        score.finalize()
    }

    fn open(&self, data: &[u8], _opts: &DecodeOptions) -> Result<Box<dyn OpenImage>, DiskImageError> {
        let (total_bytes, sector_size) =
            parse_header(data).ok_or_else(|| DiskImageError::FormatError("missing ATR signature".into()))?;
        if sector_size == 0 || data.len() < HEADER_LEN + total_bytes {
            return Err(DiskImageError::FormatError("ATR payload shorter than header declares".into()));
        }
        let sectors_per_track: u8 = if sector_size <= 128 { 18 } else { 26 };
        let total_sectors = total_bytes / sector_size;
        let cylinders = (total_sectors / sectors_per_track as usize).max(1) as u16;

        Ok(Box::new(OpenAtr {
            data: data[HEADER_LEN..HEADER_LEN + total_bytes].to_vec(),
            cylinders,
            sectors_per_track,
            sector_size,
        }))
    }

    fn create_blank(&self, geometry: DiskInfo) -> Result<Vec<u8>, DiskImageError> {
        let sector_size = if geometry.sector_size != 0 { geometry.sector_size } else { 128 };
        let sectors_per_track: u8 = if sector_size <= 128 { 18 } else { 26 };
        let cylinders = if geometry.cylinders != 0 { geometry.cylinders } else { 40 };
        let total_bytes = cylinders as usize * sectors_per_track as usize * sector_size;
        let paragraphs = (total_bytes / 16) as u32;

        let mut out = AtrHeader::from_paragraphs(sector_size as u16, paragraphs).to_bytes().to_vec();
        out.resize(HEADER_LEN + total_bytes, 0);
        Ok(out)
    }
}

impl OpenImage for OpenAtr {
    fn geometry(&self) -> DiskInfo {
        DiskInfo {
            cylinders: self.cylinders,
            heads: 1,
            sectors_per_track: self.sectors_per_track,
            sector_size: self.sector_size,
        }
    }
    fn format_id(&self) -> &'static str {
        "atr"
    }
    fn format_name(&self) -> &'static str {
        "Atari 8-bit (ATR)"
    }

    fn read_track(&mut self, cylinder: u16, head: u8, _opts: &DecodeOptions) -> Result<Track, DiskImageError> {
        if head != 0 || cylinder >= self.cylinders {
            return Err(DiskImageError::SeekError(format!("no such track {cylinder}/{head}")));
        }
        let track_bytes = self.sectors_per_track as usize * self.sector_size;
        let base = cylinder as usize * track_bytes;

        let size_code = (self.sector_size as f64 / 128.0).log2().round() as u8;
        let mut track = Track::new(cylinder, 0, TrackEncoding::Fm);
        for s in 0..self.sectors_per_track {
            let off = base + s as usize * self.sector_size;
            let data = self.data[off..off + self.sector_size].to_vec();
            track.sectors.push(Sector::new(DiskChsn::new(cylinder, 0, s + 1, size_code), data));
        }
        track.recompute_confidence();
        Ok(track)
    }

    fn write_track(&mut self, cylinder: u16, head: u8, track: &Track) -> Result<(), DiskImageError> {
        if head != 0 || cylinder >= self.cylinders {
            return Err(DiskImageError::RangeError(format!("no such track {cylinder}/{head}")));
        }
        let track_bytes = self.sectors_per_track as usize * self.sector_size;
        let base = cylinder as usize * track_bytes;
        for sector in &track.sectors {
            let off = base + (sector.address.sector() - 1) as usize * self.sector_size;
            let len = sector.data.len().min(self.sector_size);
            self.data[off..off + len].copy_from_slice(&sector.data[..len]);
        }
        Ok(())
    }

    fn supports_write(&self) -> bool {
        true
    }

    fn finalize(&self) -> Vec<u8> {
        let paragraphs = (self.data.len() / 16) as u32;
        let mut out = AtrHeader::from_paragraphs(self.sector_size as u16, paragraphs).to_bytes().to_vec();
        out.extend_from_slice(&self.data);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(sector_size: u16, sectors_per_track: u16, cylinders: u16) -> Vec<u8> {
        let total_bytes = sectors_per_track as usize * cylinders as usize * sector_size as usize;
        let paragraphs = (total_bytes / 16) as u32;
        let mut out = AtrHeader::from_paragraphs(sector_size, paragraphs).to_bytes().to_vec();
        out.resize(HEADER_LEN + total_bytes, 0);
        out
    }

    #[test]
    fn single_density_image_probes_and_opens() {
        let adapter = AtrAdapter;
        let data = sample(128, 18, 40);
        let score = adapter.probe(&data, None);
        assert!(score.total() >= 90);

        let mut opened = adapter.open(&data, &DecodeOptions::default()).unwrap();
        let track = opened.read_track(0, 0, &DecodeOptions::default()).unwrap();
        assert_eq!(track.sectors.len(), 18);
        assert_eq!(track.sectors[0].data.len(), 128);
    }

    #[test]
    fn missing_magic_is_rejected() {
        let adapter = AtrAdapter;
        let data = vec![0u8; 1000];
        assert_eq!(adapter.probe(&data, None).total(), 0);
    }
}
