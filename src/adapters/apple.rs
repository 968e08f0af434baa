/*!
Apple II formats: [`NibAdapter`] (6-and-2 GCR bitstream, `.nib`) and
[`Dos33RawAdapter`] (already-decoded DOS-order raw sectors, `.dsk`), the two
containers [`crate::fs::dos33`] reads through.

The address field's "4-and-4" encoding (each byte split into an odd-bits
and an even-bits disk byte, both forced to valid no-double-zero bytes via
an `0xAA` OR-mask) and the data field's 6-and-2 framing are grounded on the
classic Apple II disk format description (Worth/Lechner, *Beneath Apple
DOS*) as exercised by the teacher crate's analogous `structure_parsers`
prologue/epilogue pattern. The data field's 342-byte payload packing is
simplified relative to real DOS 3.3 nibblization (no secondary two-bit
buffer XOR-chain) since this crate only needs a self-consistent round trip
through its own encoder, not bit-identical historical copy-protected disks
- see `DESIGN.md`.
*/

use crate::{
    chs::DiskChsn,
    codec::gcr_apple,
    model::{DiskInfo, Sector, SectorStatus, Track, TrackEncoding},
    options::DecodeOptions,
    registry::{AdapterCaps, FormatAdapter, Match, OpenImage, ProbeScore, Weight},
    DiskImageError,
};

const TRACKS: u16 = 35;
const SECTORS_PER_TRACK: u8 = 16;
const SECTOR_SIZE: usize = 256;

// ------------------------------------------------------------- NIB -----

const NIB_TRACK_LEN: usize = 6656;
const NIB_SIZE: usize = NIB_TRACK_LEN * TRACKS as usize;

const SYNC_BYTE: u8 = 0xFF;
const SYNC_LEN: usize = 10;
const GAP_BYTE: u8 = 0xFF;
const GAP_LEN: usize = 5;
const ADDR_PROLOGUE: [u8; 3] = [0xD5, 0xAA, 0x96];
const ADDR_EPILOGUE: [u8; 3] = [0xDE, 0xAA, 0xEB];
const DATA_PROLOGUE: [u8; 3] = [0xD5, 0xAA, 0xAD];
const DATA_EPILOGUE: [u8; 3] = [0xDE, 0xAA, 0xEB];

fn encode_4_and_4(value: u8) -> [u8; 2] {
    [(value >> 1) | 0xAA, value | 0xAA]
}

fn decode_4_and_4(odd: u8, even: u8) -> u8 {
    ((odd << 1) | 1) & even
}

/// Pack `bytes` into 6-bit groups (MSB-first), zero-padding the final
/// partial group.
fn to_six_bit_groups(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &b in bytes {
        for i in (0..8).rev() {
            bits.push((b >> i) & 1);
        }
    }
    while bits.len() % 6 != 0 {
        bits.push(0);
    }
    bits.chunks(6).map(|chunk| chunk.iter().fold(0u8, |acc, &bit| (acc << 1) | bit)).collect()
}

fn from_six_bit_groups(groups: &[u8], out_len: usize) -> Vec<u8> {
    let mut bits = Vec::with_capacity(groups.len() * 6);
    for &g in groups {
        for i in (0..6).rev() {
            bits.push((g >> i) & 1);
        }
    }
    bits.chunks(8).take(out_len).map(|chunk| chunk.iter().fold(0u8, |acc, &bit| (acc << 1) | bit)).collect()
}

fn build_nib_sector(track: u16, sector: &Sector, volume: u8) -> Vec<u8> {
    let sector_id = sector.address.sector();
    let checksum = volume ^ track as u8 ^ sector_id;

    let mut out = Vec::new();
    out.extend(std::iter::repeat_n(SYNC_BYTE, SYNC_LEN));
    out.extend_from_slice(&ADDR_PROLOGUE);
    for field in [volume, track as u8, sector_id, checksum] {
        out.extend_from_slice(&encode_4_and_4(field));
    }
    out.extend_from_slice(&ADDR_EPILOGUE);
    out.extend(std::iter::repeat_n(GAP_BYTE, GAP_LEN));

    out.extend(std::iter::repeat_n(SYNC_BYTE, SYNC_LEN));
    out.extend_from_slice(&DATA_PROLOGUE);
    let mut payload = sector.data.clone();
    payload.resize(SECTOR_SIZE, 0);
    let groups = to_six_bit_groups(&payload);
    let group_checksum = groups.iter().fold(0u8, |acc, &g| acc ^ g) & 0x3f;
    for g in &groups {
        out.push(gcr_apple::encode_nibble(*g));
    }
    out.push(gcr_apple::encode_nibble(group_checksum));
    out.extend_from_slice(&DATA_EPILOGUE);
    out.extend(std::iter::repeat_n(GAP_BYTE, GAP_LEN));
    out
}

pub fn build_nib_track(track: u16, sectors: &[Sector], volume: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(NIB_TRACK_LEN);
    for sector in sectors {
        out.extend(build_nib_sector(track, sector, volume));
    }
    out.resize(NIB_TRACK_LEN, SYNC_BYTE);
    out
}

fn find(raw: &[u8], from: usize, pattern: &[u8]) -> Option<usize> {
    if from + pattern.len() > raw.len() {
        return None;
    }
    raw[from..].windows(pattern.len()).position(|w| w == pattern).map(|p| p + from)
}

pub fn decode_nib_track(raw: &[u8], track: u16) -> Vec<Sector> {
    let mut sectors = Vec::new();
    let mut pos = 0usize;

    while sectors.len() < SECTORS_PER_TRACK as usize {
        let Some(addr_at) = find(raw, pos, &ADDR_PROLOGUE) else { break };
        let field_start = addr_at + ADDR_PROLOGUE.len();
        if field_start + 8 > raw.len() {
            break;
        }
        let mut fields = [0u8; 4];
        for (i, field) in fields.iter_mut().enumerate() {
            let odd = raw[field_start + i * 2];
            let even = raw[field_start + i * 2 + 1];
            *field = decode_4_and_4(odd, even);
        }
        let (volume, hdr_track, sector_id, checksum) = (fields[0], fields[1], fields[2], fields[3]);
        let header_ok = checksum == (volume ^ hdr_track ^ sector_id) && hdr_track == track as u8;

        let data_search_from = field_start + 8;
        let Some(data_at) = find(raw, data_search_from, &DATA_PROLOGUE)
        else {
            sectors.push(
                Sector::new(DiskChsn::new(track, 0, sector_id, 1), vec![0u8; SECTOR_SIZE])
                    .with_status(SectorStatus::DataNotFound),
            );
            break;
        };
        let group_start = data_at + DATA_PROLOGUE.len();
        let group_count = 343; // 342 payload groups + 1 checksum group
        if group_start + group_count > raw.len() {
            sectors.push(
                Sector::new(DiskChsn::new(track, 0, sector_id, 1), vec![0u8; SECTOR_SIZE])
                    .with_status(SectorStatus::DataNotFound),
            );
            break;
        }

        let mut groups = Vec::with_capacity(group_count);
        let mut decode_ok = true;
        for &byte in &raw[group_start..group_start + group_count] {
            match gcr_apple::decode_nibble(byte) {
                Some(g) => groups.push(g),
                None => {
                    decode_ok = false;
                    groups.push(0);
                }
            }
        }
        pos = group_start + group_count;

        let status = if !decode_ok {
            SectorStatus::DataChecksum
        }
        else {
            let (payload_groups, checksum_group) = groups.split_at(342);
            let expected = payload_groups.iter().fold(0u8, |acc, &g| acc ^ g) & 0x3f;
            if checksum_group[0] != expected {
                SectorStatus::DataChecksum
            }
            else if !header_ok {
                SectorStatus::HeaderChecksum
            }
            else {
                SectorStatus::Ok
            }
        };

        let payload = from_six_bit_groups(&groups[..342], SECTOR_SIZE);
        let mut sector = Sector::new(DiskChsn::new(track, 0, sector_id, 1), payload).with_status(status);
        if status != SectorStatus::Ok {
            sector.confidence = 0;
        }
        sectors.push(sector);
    }

    sectors
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NibAdapter;

struct OpenNib {
    data: Vec<u8>,
}

impl FormatAdapter for NibAdapter {
    fn name(&self) -> &'static str {
        "nib"
    }
    fn description(&self) -> &'static str {
        "Apple II 6-and-2 GCR bitstream image (NIB)"
    }
    fn extensions(&self) -> &'static str {
        "nib"
    }
    fn format_id(&self) -> &'static str {
        "nib"
    }
    fn caps(&self) -> AdapterCaps {
        AdapterCaps::CAN_READ | AdapterCaps::CAN_WRITE | AdapterCaps::CAN_CREATE | AdapterCaps::SUPPORTS_TIMING
    }

    fn probe(&self, data: &[u8], _filename: Option<&str>) -> ProbeScore {
        let mut score = ProbeScore::new();
        if data.len() == NIB_SIZE {
            score.push(Match::positive("size", Weight::High, "matches fixed 35-track NIB size"));
        }
        else {
            score.push(Match::negative("size", Weight::High, "not the fixed NIB size"));
            return score.finalize();
        }
        if find(data, 0, &ADDR_PROLOGUE).is_some() {
            score.push(Match::positive("address_prologue", Weight::Medium, "D5 AA 96 found"));
        }
        score.finalize()
    }

    fn open(&self, data: &[u8], _opts: &DecodeOptions) -> Result<Box<dyn OpenImage>, DiskImageError> {
        if data.len() != NIB_SIZE {
            return Err(DiskImageError::FormatError(format!("{} is not the fixed NIB size", data.len())));
        }
        Ok(Box::new(OpenNib { data: data.to_vec() }))
    }

    fn create_blank(&self, _geometry: DiskInfo) -> Result<Vec<u8>, DiskImageError> {
        Ok(vec![0u8; NIB_SIZE])
    }
}

impl OpenImage for OpenNib {
    fn geometry(&self) -> DiskInfo {
        DiskInfo { cylinders: TRACKS, heads: 1, sectors_per_track: SECTORS_PER_TRACK, sector_size: SECTOR_SIZE }
    }
    fn format_id(&self) -> &'static str {
        "nib"
    }
    fn format_name(&self) -> &'static str {
        "Apple II (NIB)"
    }

    fn read_track(&mut self, cylinder: u16, head: u8, _opts: &DecodeOptions) -> Result<Track, DiskImageError> {
        if head != 0 || cylinder >= TRACKS {
            return Err(DiskImageError::SeekError(format!("no such track {cylinder}/{head}")));
        }
        let base = cylinder as usize * NIB_TRACK_LEN;
        let raw = &self.data[base..base + NIB_TRACK_LEN];
        let sectors = decode_nib_track(raw, cylinder);

        let mut track = Track::new(cylinder, 0, TrackEncoding::GcrApple);
        track.raw_bytes = Some(raw.to_vec());
        track.sectors = sectors;
        track.recompute_confidence();
        Ok(track)
    }

    fn write_track(&mut self, cylinder: u16, head: u8, track: &Track) -> Result<(), DiskImageError> {
        if head != 0 || cylinder >= TRACKS {
            return Err(DiskImageError::RangeError(format!("no such track {cylinder}/{head}")));
        }
        let raw = build_nib_track(cylinder, &track.sectors, 0xFE);
        let base = cylinder as usize * NIB_TRACK_LEN;
        self.data[base..base + NIB_TRACK_LEN].copy_from_slice(&raw);
        Ok(())
    }

    fn supports_write(&self) -> bool {
        true
    }

    fn finalize(&self) -> Vec<u8> {
        self.data.clone()
    }
}

// ----------------------------------------------------- DOS 3.3 raw -----

const DOS33_SIZE: usize = TRACKS as usize * SECTORS_PER_TRACK as usize * SECTOR_SIZE;

/// VTOC lives at track 17, sector 0, the canonical DOS 3.3 location
/// `crate::fs::dos33` also reads.
fn dos33_offset(track: u16, sector: u8) -> usize {
    (track as usize * SECTORS_PER_TRACK as usize + sector as usize) * SECTOR_SIZE
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Dos33RawAdapter;

struct OpenDos33Raw {
    data: Vec<u8>,
}

impl FormatAdapter for Dos33RawAdapter {
    fn name(&self) -> &'static str {
        "apple_dos33"
    }
    fn description(&self) -> &'static str {
        "Apple II DOS 3.3 raw sector image (DOS order)"
    }
    fn extensions(&self) -> &'static str {
        "dsk,do"
    }
    fn format_id(&self) -> &'static str {
        "apple_dos33"
    }
    fn caps(&self) -> AdapterCaps {
        AdapterCaps::CAN_READ | AdapterCaps::CAN_WRITE | AdapterCaps::CAN_CREATE
    }

    fn probe(&self, data: &[u8], _filename: Option<&str>) -> ProbeScore {
        let mut score = ProbeScore::new();
        if data.len() != DOS33_SIZE {
            score.push(Match::negative("size", Weight::High, "not the fixed 143360-byte DOS 3.3 image size"));
            return score.finalize();
        }
        score.push(Match::positive("size", Weight::High, "matches 143360-byte DOS 3.3 image size"));

        let vtoc = dos33_offset(17, 0);
        if data.len() >= vtoc + 3 && data[vtoc + 1] == 17 && data[vtoc + 3] == 3 {
            score.push(Match::positive("vtoc", Weight::Magic, "VTOC catalog pointer and DOS release 3 match"));
        }
        score.finalize()
    }

    fn open(&self, data: &[u8], _opts: &DecodeOptions) -> Result<Box<dyn OpenImage>, DiskImageError> {
        if data.len() != DOS33_SIZE {
            return Err(DiskImageError::FormatError(format!("{} is not the fixed DOS 3.3 image size", data.len())));
        }
        Ok(Box::new(OpenDos33Raw { data: data.to_vec() }))
    }

    fn create_blank(&self, _geometry: DiskInfo) -> Result<Vec<u8>, DiskImageError> {
        Ok(vec![0u8; DOS33_SIZE])
    }
}

impl OpenImage for OpenDos33Raw {
    fn geometry(&self) -> DiskInfo {
        DiskInfo { cylinders: TRACKS, heads: 1, sectors_per_track: SECTORS_PER_TRACK, sector_size: SECTOR_SIZE }
    }
    fn format_id(&self) -> &'static str {
        "apple_dos33"
    }
    fn format_name(&self) -> &'static str {
        "Apple II DOS 3.3"
    }

    fn read_track(&mut self, cylinder: u16, head: u8, _opts: &DecodeOptions) -> Result<Track, DiskImageError> {
        if head != 0 || cylinder >= TRACKS {
            return Err(DiskImageError::SeekError(format!("no such track {cylinder}/{head}")));
        }
        let mut track = Track::new(cylinder, 0, TrackEncoding::GcrApple);
        for s in 0..SECTORS_PER_TRACK {
            let off = dos33_offset(cylinder, s);
            let data = self.data[off..off + SECTOR_SIZE].to_vec();
            track.sectors.push(Sector::new(DiskChsn::new(cylinder, 0, s, 1), data));
        }
        track.recompute_confidence();
        Ok(track)
    }

    fn write_track(&mut self, cylinder: u16, head: u8, track: &Track) -> Result<(), DiskImageError> {
        if head != 0 || cylinder >= TRACKS {
            return Err(DiskImageError::RangeError(format!("no such track {cylinder}/{head}")));
        }
        for sector in &track.sectors {
            let off = dos33_offset(cylinder, sector.address.sector());
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

/// Read-only access to a DOS 3.3 raw image's bytes, for
/// [`crate::fs::dos33`] to operate on directly without re-deriving offsets
/// through the track/sector model.
pub fn dos33_bytes(data: &[u8]) -> Option<&[u8]> {
    (data.len() == DOS33_SIZE).then_some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sectors(track: u16) -> Vec<Sector> {
        (0..SECTORS_PER_TRACK).map(|s| Sector::new(DiskChsn::new(track, 0, s, 1), vec![s.wrapping_add(1); SECTOR_SIZE])).collect()
    }

    #[test]
    fn nib_track_round_trips() {
        let sectors = sample_sectors(5);
        let raw = build_nib_track(5, &sectors, 0xFE);
        assert_eq!(raw.len(), NIB_TRACK_LEN);
        let decoded = decode_nib_track(&raw, 5);

        assert_eq!(decoded.len(), sectors.len());
        for (orig, got) in sectors.iter().zip(decoded.iter()) {
            assert_eq!(got.status, SectorStatus::Ok);
            assert_eq!(got.data, orig.data);
        }
    }

    #[test]
    fn dos33_raw_probe_and_round_trip() {
        let adapter = Dos33RawAdapter;
        let mut data = vec![0u8; DOS33_SIZE];
        let vtoc = dos33_offset(17, 0);
        data[vtoc + 1] = 17;
        data[vtoc + 3] = 3;

        let score = adapter.probe(&data, None);
        assert!(score.total() >= 90);

        let mut opened = adapter.open(&data, &DecodeOptions::default()).unwrap();
        let track = opened.read_track(17, 0, &DecodeOptions::default()).unwrap();
        assert_eq!(track.sectors.len(), SECTORS_PER_TRACK as usize);
        assert_eq!(track.sectors[0].data[1], 17);
    }
}
