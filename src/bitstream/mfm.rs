/*!
Generic IBM System 34-style MFM sector extractor/builder.

Operates on an already bitcell-decoded byte stream (the domain
[`crate::codec::mfm::decode_cells`] produces): address marks appear as the
literal byte sequence `0xA1 0xA1 0xA1 <type>`, exactly as a real MFM
controller's data separator would present them after clock recovery.
Grounded on the teacher crate's `structure_parsers::system34` marker
constants and CRC scheme (`util::crc_ibm_3740`, the IBM/ISO CRC-16 used by
System 34 IDAM/DAM records).
*/

use crate::{
    chs::DiskChsn,
    model::{Sector, SectorStatus},
    util::crc_ibm_3740,
};

pub const IDAM_MARKER: [u8; 4] = [0xA1, 0xA1, 0xA1, 0xFE];
pub const DAM_MARKER: [u8; 4] = [0xA1, 0xA1, 0xA1, 0xFB];
pub const DDAM_MARKER: [u8; 4] = [0xA1, 0xA1, 0xA1, 0xF8];
pub const GAP_BYTE: u8 = 0x4E;
pub const GAP2_LEN: usize = 22;
pub const GAP3_LEN: usize = 22;

fn find(data: &[u8], from: usize, pattern: &[u8]) -> Option<usize> {
    if from + pattern.len() > data.len() {
        return None;
    }
    data[from..].windows(pattern.len()).position(|w| w == pattern).map(|p| p + from)
}

/// Build a track's worth of MFM-decoded bytes (IDAM+CRC, gap, DAM+CRC, gap)
/// for each sector in order.
pub fn build_mfm_track(cylinder: u16, head: u8, sectors: &[Sector]) -> Vec<u8> {
    let mut out = Vec::new();
    for sector in sectors {
        let chsn = sector.address;
        out.extend_from_slice(&IDAM_MARKER);
        let id_field = [cylinder as u8, head, chsn.sector(), chsn.n];
        out.extend_from_slice(&id_field);
        let id_crc = crc_ibm_3740(&[&IDAM_MARKER[..], &id_field[..]].concat(), None);
        out.extend_from_slice(&id_crc.to_be_bytes());
        out.extend(std::iter::repeat_n(GAP_BYTE, GAP2_LEN));

        let marker = if sector.deleted { DDAM_MARKER } else { DAM_MARKER };
        out.extend_from_slice(&marker);
        out.extend_from_slice(&sector.data);
        let data_crc = crc_ibm_3740(&[&marker[..], &sector.data[..]].concat(), None);
        out.extend_from_slice(&data_crc.to_be_bytes());
        out.extend(std::iter::repeat_n(GAP_BYTE, GAP3_LEN));
    }
    out
}

/// Recover sectors from a decoded MFM byte stream. Unlike
/// [`crate::bitstream::gcr_commodore::decode_gcr_track`], the sector size
/// comes from the IDAM's size-code byte rather than being fixed, since
/// MFM-family containers allow variable sector sizes (`spec.md` §3).
pub fn extract_mfm_sectors(data: &[u8]) -> Vec<Sector> {
    let mut sectors = Vec::new();
    let mut pos = 0usize;

    while let Some(idam_at) = find(data, pos, &IDAM_MARKER) {
        let id_start = idam_at + IDAM_MARKER.len();
        if id_start + 4 + 2 > data.len() {
            break;
        }
        let id_field = &data[id_start..id_start + 4];
        let (cylinder, head, sector_id, n) = (id_field[0], id_field[1], id_field[2], id_field[3]);
        let stored_id_crc = u16::from_be_bytes([data[id_start + 4], data[id_start + 5]]);
        let computed_id_crc = crc_ibm_3740(&[&IDAM_MARKER[..], id_field].concat(), None);
        let header_ok = stored_id_crc == computed_id_crc;

        let search_from = id_start + 6;
        let dam_pos = find(data, search_from, &DAM_MARKER);
        let ddam_pos = find(data, search_from, &DDAM_MARKER);
        let (data_at, deleted) = match (dam_pos, ddam_pos) {
            (Some(d), Some(dd)) if dd < d => (dd, true),
            (Some(d), _) => (d, false),
            (None, Some(dd)) => (dd, true),
            (None, None) => {
                let size = DiskChsn::n_size(n);
                sectors.push(
                    Sector::new(DiskChsn::new(cylinder as u16, head, sector_id, n), vec![0u8; size])
                        .with_status(SectorStatus::DataNotFound),
                );
                break;
            }
        };

        let marker = if deleted { &DDAM_MARKER } else { &DAM_MARKER };
        let payload_start = data_at + marker.len();
        let size = DiskChsn::n_size(n);
        if payload_start + size + 2 > data.len() {
            sectors.push(
                Sector::new(DiskChsn::new(cylinder as u16, head, sector_id, n), vec![0u8; size])
                    .with_status(SectorStatus::DataNotFound),
            );
            break;
        }

        let payload = data[payload_start..payload_start + size].to_vec();
        let stored_data_crc = u16::from_be_bytes([data[payload_start + size], data[payload_start + size + 1]]);
        let computed_data_crc = crc_ibm_3740(&[&marker[..], &payload[..]].concat(), None);

        let status = if !header_ok {
            SectorStatus::HeaderChecksum
        }
        else if stored_data_crc != computed_data_crc {
            SectorStatus::DataChecksum
        }
        else {
            SectorStatus::Ok
        };

        let mut sector =
            Sector::new(DiskChsn::new(cylinder as u16, head, sector_id, n), payload).with_status(status);
        sector.deleted = deleted;
        if status != SectorStatus::Ok {
            sector.confidence = 0;
        }
        sectors.push(sector);
        pos = payload_start + size + 2;
    }

    sectors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(cyl: u16, s: u8, fill: u8) -> Sector {
        Sector::new(DiskChsn::new(cyl, 0, s, 2), vec![fill; 512])
    }

    #[test]
    fn round_trips_a_full_track() {
        let sectors: Vec<Sector> = (1..=9).map(|s| sector(5, s, s)).collect();
        let track = build_mfm_track(5, 0, &sectors);
        let decoded = extract_mfm_sectors(&track);

        assert_eq!(decoded.len(), sectors.len());
        for (orig, got) in sectors.iter().zip(decoded.iter()) {
            assert_eq!(got.status, SectorStatus::Ok);
            assert_eq!(got.data, orig.data);
        }
    }

    #[test]
    fn deleted_data_mark_is_preserved() {
        let mut s = sector(0, 1, 0xAA);
        s.deleted = true;
        let track = build_mfm_track(0, 0, &[s]);
        let decoded = extract_mfm_sectors(&track);
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].deleted);
    }

    #[test]
    fn data_crc_mismatch_is_flagged() {
        let sectors = vec![sector(0, 1, 0x11)];
        let mut track = build_mfm_track(0, 0, &sectors);
        let payload_start = IDAM_MARKER.len() + 4 + 2 + GAP2_LEN + DAM_MARKER.len();
        track[payload_start] ^= 0xFF;
        let decoded = extract_mfm_sectors(&track);
        assert_eq!(decoded[0].status, SectorStatus::DataChecksum);
    }
}
