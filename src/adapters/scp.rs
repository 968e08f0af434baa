/*!
SuperCard Pro (SCP) flux container - a fixed-header, multi-revolution flux
capture format (`spec.md` §4.2, §6's "bit-exact container contracts").

Layout (16-byte header, a 168-entry track offset table, then one `TRK` block
per captured track) matches the long-public SCP file format specification.
Each `TRK` block's per-revolution 16-bit flux-tick words feed
[`crate::flux::fuse_revolutions`] and [`crate::flux::recover_bitcells`] - the
same multi-revolution engine the KryoFlux-stream adapter
([`crate::adapters::kryoflux`]) uses, differing only in framing.
*/

use crate::{
    flux::{fuse_revolutions, recover_bitcells},
    model::{DiskInfo, Track, TrackEncoding},
    options::DecodeOptions,
    registry::{AdapterCaps, FormatAdapter, Match, OpenImage, ProbeScore, Weight},
    DiskImageError,
};
use binrw::{binrw, BinRead};
use std::io::Cursor;

const MAGIC: &[u8; 3] = b"SCP";
const HEADER_LEN: usize = 16;
const TRACK_TABLE_ENTRIES: usize = 168;
const TRACK_TABLE_LEN: usize = TRACK_TABLE_ENTRIES * 4;

/// The fixed 16-byte SCP file header (`spec.md` §6's "bit-exact container
/// contract" for SCP), grounded on the teacher's `ScpFileHeader`.
#[derive(Debug, Clone, Copy)]
#[binrw]
#[brw(little)]
struct ScpFileHeader {
    id: [u8; 3],
    version: u8,
    disk_type: u8,
    num_revolutions: u8,
    start_track: u8,
    end_track: u8,
    flags: u8,
    bit_cell_width: u8,
    heads: u8,
    resolution: u8,
    checksum: u32,
}

/// The 168-entry little-endian track offset table, grounded on the
/// teacher's `ScpTrackOffsetTable`.
#[derive(Debug, Clone)]
#[binrw]
#[brw(little)]
struct ScpTrackOffsetTable {
    track_offsets: [u32; TRACK_TABLE_ENTRIES],
}

/// A `TRK` block's 4-byte header, grounded on the teacher's `ScpTrackHeader`.
#[derive(Debug, Clone, Copy)]
#[binrw]
#[brw(little)]
struct ScpTrackHeader {
    id: [u8; 3],
    track_number: u8,
}

/// One revolution's entry in a `TRK` block's per-revolution table, grounded
/// on the teacher's `ScpTrackRevolution`.
#[derive(Debug, Clone, Copy)]
#[binrw]
#[brw(little)]
struct ScpTrackRevolutionEntry {
    index_time: u32,
    entry_count: u32,
    data_offset: u32,
}

struct ScpHeader {
    num_revolutions: u8,
    start_track: u8,
    end_track: u8,
    heads: u8,
    resolution_ns: f64,
}

fn parse_header(data: &[u8]) -> Result<ScpHeader, DiskImageError> {
    if data.len() < HEADER_LEN + TRACK_TABLE_LEN || &data[0..3] != MAGIC {
        return Err(DiskImageError::FormatError("missing SCP signature".into()));
    }
    let header = ScpFileHeader::read(&mut Cursor::new(&data[..HEADER_LEN]))?;
    if &header.id != MAGIC {
        return Err(DiskImageError::FormatError("missing SCP signature".into()));
    }
    Ok(ScpHeader {
        num_revolutions: header.num_revolutions,
        start_track: header.start_track,
        end_track: header.end_track,
        heads: header.heads,
        resolution_ns: (header.resolution as f64 + 1.0) * 25.0,
    })
}

fn track_offsets(data: &[u8]) -> Vec<u32> {
    let table = ScpTrackOffsetTable::read(&mut Cursor::new(&data[HEADER_LEN..HEADER_LEN + TRACK_TABLE_LEN]))
        .expect("fixed-size offset table read cannot fail once length-checked");
    table.track_offsets.to_vec()
}

/// Decode one `TRK` block into per-revolution flux intervals (nanoseconds).
fn decode_trk_block(data: &[u8], block_at: usize, revolutions: u8, resolution_ns: f64) -> Result<Vec<Vec<f64>>, DiskImageError> {
    if block_at + 4 > data.len() {
        return Err(DiskImageError::FormatError("TRK block missing signature".into()));
    }
    let track_header = ScpTrackHeader::read(&mut Cursor::new(&data[block_at..block_at + 4]))?;
    if &track_header.id != b"TRK" {
        return Err(DiskImageError::FormatError("TRK block missing signature".into()));
    }
    let mut out = Vec::with_capacity(revolutions as usize);
    for rev in 0..revolutions as usize {
        let entry_at = block_at + 4 + rev * 12;
        if entry_at + 12 > data.len() {
            return Err(DiskImageError::CorruptData("SCP track table truncated".into()));
        }
        let entry = ScpTrackRevolutionEntry::read(&mut Cursor::new(&data[entry_at..entry_at + 12]))?;
        let entry_count = entry.entry_count as usize;
        let data_offset = entry.data_offset as usize;
        let start = block_at + data_offset;
        let end = start + entry_count * 2;
        if end > data.len() {
            return Err(DiskImageError::CorruptData("SCP flux data truncated".into()));
        }

        let mut ticks = Vec::with_capacity(entry_count);
        let mut carry: u64 = 0;
        for word in data[start..end].chunks_exact(2) {
            let value = u16::from_le_bytes([word[0], word[1]]) as u64;
            if value == 0 {
                carry += 0x1_0000;
            }
            else {
                ticks.push((carry + value) as f64 * resolution_ns);
                carry = 0;
            }
        }
        out.push(ticks);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScpAdapter;

struct OpenScp {
    data: Vec<u8>,
    offsets: Vec<u32>,
    header: ScpHeaderCopy,
}

/// `Copy` snapshot of the header fields `OpenImage` needs repeatedly.
#[derive(Debug, Clone, Copy)]
struct ScpHeaderCopy {
    num_revolutions: u8,
    cylinders: u16,
    heads: u8,
    resolution_ns: f64,
}

impl FormatAdapter for ScpAdapter {
    fn name(&self) -> &'static str {
        "scp"
    }
    fn description(&self) -> &'static str {
        "SuperCard Pro flux capture (SCP)"
    }
    fn extensions(&self) -> &'static str {
        "scp"
    }
    fn format_id(&self) -> &'static str {
        "scp"
    }
    fn caps(&self) -> AdapterCaps {
        AdapterCaps::CAN_READ | AdapterCaps::SUPPORTS_TIMING
    }

    fn probe(&self, data: &[u8], _filename: Option<&str>) -> ProbeScore {
        let mut score = ProbeScore::new();
        match parse_header(data) {
            Ok(_) => score.push(Match::positive("magic", Weight::Magic, "SCP signature and header present")),
            Err(_) => score.push(Match::negative("magic", Weight::Magic, "missing SCP signature")),
        };
        score.finalize()
    }

    fn open(&self, data: &[u8], _opts: &DecodeOptions) -> Result<Box<dyn OpenImage>, DiskImageError> {
        let header = parse_header(data)?;
        let offsets = track_offsets(data);
        let cylinders = (header.end_track.saturating_sub(header.start_track) as u16 / 2) + 1;
        Ok(Box::new(OpenScp {
            data: data.to_vec(),
            offsets,
            header: ScpHeaderCopy {
                num_revolutions: header.num_revolutions,
                cylinders,
                heads: if header.heads == 0 { 2 } else { 1 },
                resolution_ns: header.resolution_ns,
            },
        }))
    }
}

impl OpenImage for OpenScp {
    fn geometry(&self) -> DiskInfo {
        DiskInfo { cylinders: self.header.cylinders, heads: self.header.heads, sectors_per_track: 0, sector_size: 0 }
    }
    fn format_id(&self) -> &'static str {
        "scp"
    }
    fn format_name(&self) -> &'static str {
        "SuperCard Pro (SCP)"
    }

    fn read_track(&mut self, cylinder: u16, head: u8, opts: &DecodeOptions) -> Result<Track, DiskImageError> {
        let index = cylinder as usize * 2 + head as usize;
        let Some(&offset) = self.offsets.get(index)
        else {
            return Err(DiskImageError::SeekError(format!("no such track {cylinder}/{head}")));
        };
        if offset == 0 {
            return Err(DiskImageError::SeekError(format!("track {cylinder}/{head} unformatted")));
        }

        let revolutions_ns = decode_trk_block(&self.data, offset as usize, self.header.num_revolutions, self.header.resolution_ns)?;
        let fused = fuse_revolutions(&revolutions_ns, opts);
        let cells = recover_bitcells(&fused.flux_ns, 4000.0);
        let raw_bytes = crate::flux::pll::pack_cells(&cells);

        let mut track = Track::new(cylinder, head, TrackEncoding::Mfm);
        track.raw_bytes = Some(raw_bytes.clone());
        track.weak_positions = fused.weak_positions;
        track.sectors = crate::bitstream::mfm::extract_mfm_sectors(&raw_bytes);
        if !track.sectors.is_empty() {
            track.recompute_confidence();
        }
        else {
            track.confidence = fused.confidence.iter().copied().map(u32::from).sum::<u32>()
                .checked_div(fused.confidence.len() as u32)
                .unwrap_or(crate::CONFIDENCE_MAX as u32) as crate::Confidence;
        }
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_scp(revs: &[Vec<u16>]) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN + TRACK_TABLE_LEN];
        out[0..3].copy_from_slice(MAGIC);
        out[5] = revs.len() as u8; // num revolutions
        out[6] = 0; // start track
        out[7] = 0; // end track (single track for this test)
        out[10] = 1; // heads: side0 only
        out[11] = 79; // resolution byte -> (79+1)*25 = 2000ns/tick

        let block_at = out.len();
        out[16..20].copy_from_slice(&(block_at as u32).to_le_bytes());

        out.extend_from_slice(b"TRK");
        out.push(0);
        let table_len = revs.len() * 12;
        let mut cursor = 4 + table_len;
        let mut table = Vec::new();
        let mut flux_data = Vec::new();
        for rev in revs {
            table.extend_from_slice(&0u32.to_le_bytes()); // duration (unused by reader)
            table.extend_from_slice(&(rev.len() as u32).to_le_bytes());
            table.extend_from_slice(&(cursor as u32).to_le_bytes());
            cursor += rev.len() * 2;
            for &tick in rev {
                flux_data.extend_from_slice(&tick.to_le_bytes());
            }
        }
        out.extend_from_slice(&table);
        out.extend_from_slice(&flux_data);
        out
    }

    #[test]
    fn probes_and_decodes_a_single_track() {
        let rev = vec![2u16; 200];
        let data = build_scp(&[rev.clone(), rev.clone(), rev]);

        let adapter = ScpAdapter;
        assert!(adapter.probe(&data, None).total() >= 90);

        let mut opened = adapter.open(&data, &DecodeOptions::default()).unwrap();
        let track = opened.read_track(0, 0, &DecodeOptions::default()).unwrap();
        assert!(track.raw_bytes.is_some());
        assert!(track.weak_positions.is_empty());
    }

    #[test]
    fn unformatted_track_is_seek_error() {
        let rev = vec![2u16; 10];
        let data = build_scp(&[rev]);
        let adapter = ScpAdapter;
        let mut opened = adapter.open(&data, &DecodeOptions::default()).unwrap();
        let err = opened.read_track(1, 0, &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, DiskImageError::SeekError(_)));
    }
}
