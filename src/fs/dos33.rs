/*!
Apple DOS 3.3 filesystem layer (`spec.md` §4.5): VTOC, catalog chain, and
T/S-list file I/O above a 35-track/16-sector/256-byte sector source (either
[`crate::adapters::apple::Dos33RawAdapter`]'s raw image or a decoded
[`crate::adapters::apple::NibAdapter`] track set).

Grounded on the long-public DOS 3.3 disk layout (Worth/Lechner, *Beneath
Apple DOS*): VTOC at track 17 sector 0, a 7-entries-per-sector catalog
chain starting from the VTOC's pointer, and per-file T/S-list sectors
holding up to 122 track/sector pairs each. `spec.md` adds `get_free`,
`check_integrity`, `rename_file`, and `lock_file`/`unlock_file` beyond the
original four read/write operations; their data model (free-sector count
from the VTOC bitmap, lock bit in the file-type byte) is the same real
on-disk structure, not an invented extension.
*/

use crate::options::DecodeOptions;
use thiserror::Error;

pub const TRACKS: usize = 35;
pub const SECTORS_PER_TRACK: usize = 16;
pub const SECTOR_SIZE: usize = 256;
pub const CATALOG_ENTRY_SIZE: usize = 35;
pub const ENTRIES_PER_CATALOG_SECTOR: usize = 7;
pub const MAX_TS_PAIRS_PER_SECTOR: usize = 122;

#[derive(Error, Debug)]
pub enum FilesystemError {
    #[error("not a DOS 3.3 image: {0}")]
    NotDos33(String),
    #[error("track/sector {0}/{1} is out of range")]
    OutOfRange(u8, u8),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("file already exists: {0}")]
    FileExists(String),
    #[error("disk full: no free sectors remain")]
    DiskFull,
    #[error("catalog chain exceeded its walk limit ({0}); likely a cyclic chain")]
    CatalogChainTooLong(usize),
    #[error("T/S-list chain exceeded its walk limit ({0}); likely a cyclic chain")]
    TsListChainTooLong(usize),
    #[error("filename longer than 30 characters: {0}")]
    NameTooLong(String),
}

/// File type byte, excluding the locked-file high bit (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FileType {
    Text,
    IntegerBasic,
    ApplesoftBasic,
    Binary,
    SType,
    Relocatable,
    AType,
    BType,
}

impl FileType {
    fn from_byte(b: u8) -> Self {
        match b & 0x7f {
            0x00 => FileType::Text,
            0x01 => FileType::IntegerBasic,
            0x02 => FileType::ApplesoftBasic,
            0x04 => FileType::Binary,
            0x08 => FileType::SType,
            0x10 => FileType::Relocatable,
            0x20 => FileType::AType,
            _ => FileType::BType,
        }
    }
    fn to_byte(self) -> u8 {
        match self {
            FileType::Text => 0x00,
            FileType::IntegerBasic => 0x01,
            FileType::ApplesoftBasic => 0x02,
            FileType::Binary => 0x04,
            FileType::SType => 0x08,
            FileType::Relocatable => 0x10,
            FileType::AType => 0x20,
            FileType::BType => 0x40,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub file_type: FileType,
    pub locked: bool,
    pub first_ts_track: u8,
    pub first_ts_sector: u8,
    pub length_sectors: u16,
    /// `(catalog_track, catalog_sector, index_within_sector)`, needed by
    /// `rename_file`/`lock_file`/`delete_file` to locate the entry again.
    catalog_location: (u8, u8, usize),
}

fn offset(track: u8, sector: u8) -> Result<usize, FilesystemError> {
    if track as usize >= TRACKS || sector as usize >= SECTORS_PER_TRACK {
        return Err(FilesystemError::OutOfRange(track, sector));
    }
    Ok((track as usize * SECTORS_PER_TRACK + sector as usize) * SECTOR_SIZE)
}

fn read_sector<'a>(data: &'a [u8], track: u8, sector: u8) -> Result<&'a [u8], FilesystemError> {
    let off = offset(track, sector)?;
    data.get(off..off + SECTOR_SIZE).ok_or(FilesystemError::OutOfRange(track, sector))
}

/// Decode a 30-byte high-bit-set, `0xA0`-padded DOS 3.3 filename field.
fn decode_filename(raw: &[u8]) -> String {
    let stripped: Vec<u8> = raw.iter().map(|&b| b & 0x7f).collect();
    String::from_utf8_lossy(&stripped).trim_end_matches(' ').to_string()
}

fn encode_filename(name: &str) -> [u8; 30] {
    let mut out = [0xA0u8; 30];
    for (slot, byte) in out.iter_mut().zip(name.bytes().chain(std::iter::repeat(b' '))) {
        *slot = byte | 0x80;
    }
    out
}

/// The volume table of contents: track 17, sector 0.
#[derive(Debug, Clone)]
pub struct Vtoc {
    pub catalog_track: u8,
    pub catalog_sector: u8,
    pub dos_release: u8,
    pub volume: u8,
    pub max_ts_pairs: u8,
    pub tracks_per_disk: u8,
    pub sectors_per_track: u8,
    pub bytes_per_sector: u16,
    bitmap: [[bool; SECTORS_PER_TRACK]; TRACKS],
}

impl Vtoc {
    pub fn is_free(&self, track: u8, sector: u8) -> bool {
        self.bitmap.get(track as usize).and_then(|t| t.get(sector as usize)).copied().unwrap_or(false)
    }

    pub fn set_free(&mut self, track: u8, sector: u8, free: bool) {
        if let Some(t) = self.bitmap.get_mut(track as usize) {
            if let Some(s) = t.get_mut(sector as usize) {
                *s = free;
            }
        }
    }

    /// Total number of sectors currently marked free across the disk
    /// (`spec.md` §4.5's `get_free`).
    pub fn get_free(&self) -> u32 {
        self.bitmap.iter().flatten().filter(|&&free| free).count() as u32
    }

    fn encode_into(&self, sector: &mut [u8]) {
        sector[0x01] = self.catalog_track;
        sector[0x02] = self.catalog_sector;
        sector[0x03] = self.dos_release;
        sector[0x06] = self.volume;
        sector[0x27] = self.max_ts_pairs;
        sector[0x34] = self.tracks_per_disk;
        sector[0x35] = self.sectors_per_track;
        sector[0x36..0x38].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        for track in 0..TRACKS.min(self.tracks_per_disk as usize) {
            let base = 0x38 + track * 4;
            if base + 4 > sector.len() {
                break;
            }
            let mut low = 0u8;
            let mut high = 0u8;
            for s in 0..SECTORS_PER_TRACK.min(8) {
                if self.bitmap[track][s] {
                    low |= 1 << s;
                }
            }
            for s in 8..SECTORS_PER_TRACK {
                if self.bitmap[track][s] {
                    high |= 1 << (s - 8);
                }
            }
            sector[base] = high;
            sector[base + 1] = low;
        }
    }
}

/// Read and parse the VTOC from a 35x16x256 DOS 3.3 image.
pub fn read_vtoc(data: &[u8]) -> Result<Vtoc, FilesystemError> {
    let sector = read_sector(data, 17, 0)?;
    let tracks_per_disk = sector[0x34];
    let sectors_per_track = sector[0x35];
    if tracks_per_disk == 0 || sectors_per_track == 0 {
        return Err(FilesystemError::NotDos33("VTOC declares zero tracks or sectors per track".into()));
    }

    let mut bitmap = [[false; SECTORS_PER_TRACK]; TRACKS];
    for track in 0..TRACKS.min(tracks_per_disk as usize) {
        let base = 0x38 + track * 4;
        if base + 2 > sector.len() {
            break;
        }
        let high = sector[base];
        let low = sector[base + 1];
        for s in 0..SECTORS_PER_TRACK.min(8) {
            bitmap[track][s] = (low >> s) & 1 != 0;
        }
        for s in 8..SECTORS_PER_TRACK {
            bitmap[track][s] = (high >> (s - 8)) & 1 != 0;
        }
    }

    Ok(Vtoc {
        catalog_track: sector[0x01],
        catalog_sector: sector[0x02],
        dos_release: sector[0x03],
        volume: sector[0x06],
        max_ts_pairs: sector[0x27],
        tracks_per_disk,
        sectors_per_track,
        bytes_per_sector: u16::from_le_bytes([sector[0x36], sector[0x37]]),
        bitmap,
    })
}

fn write_vtoc(data: &mut [u8], vtoc: &Vtoc) -> Result<(), FilesystemError> {
    let off = offset(17, 0)?;
    vtoc.encode_into(&mut data[off..off + SECTOR_SIZE]);
    Ok(())
}

/// Walk the catalog chain starting at the VTOC's pointer, collecting every
/// non-empty, non-deleted entry (`spec.md` §4.5's `read_catalog`).
pub fn read_catalog(data: &[u8], vtoc: &Vtoc, opts: &DecodeOptions) -> Result<Vec<FileEntry>, FilesystemError> {
    let mut entries = Vec::new();
    let mut track = vtoc.catalog_track;
    let mut sector = vtoc.catalog_sector;
    let mut steps = 0usize;

    while !(track == 0 && sector == 0) {
        steps += 1;
        if steps > opts.catalog_chain_limit {
            return Err(FilesystemError::CatalogChainTooLong(opts.catalog_chain_limit));
        }
        let raw = read_sector(data, track, sector)?;
        let next_track = raw[0x01];
        let next_sector = raw[0x02];

        for i in 0..ENTRIES_PER_CATALOG_SECTOR {
            let base = 0x0B + i * CATALOG_ENTRY_SIZE;
            if base + CATALOG_ENTRY_SIZE > raw.len() {
                break;
            }
            let entry = &raw[base..base + CATALOG_ENTRY_SIZE];
            let ts_track = entry[0];
            if ts_track == 0x00 || ts_track == 0xFF {
                continue; // never used, or deleted
            }
            let type_byte = entry[2];
            entries.push(FileEntry {
                name: decode_filename(&entry[3..33]),
                file_type: FileType::from_byte(type_byte),
                locked: type_byte & 0x80 != 0,
                first_ts_track: ts_track,
                first_ts_sector: entry[1],
                length_sectors: u16::from_le_bytes([entry[33], entry[34]]),
                catalog_location: (track, sector, i),
            });
        }

        if next_track == track && next_sector == sector {
            break; // self-loop guard, in addition to the step counter
        }
        track = next_track;
        sector = next_sector;
    }

    Ok(entries)
}

pub fn find_entry(data: &[u8], vtoc: &Vtoc, name: &str, opts: &DecodeOptions) -> Result<FileEntry, FilesystemError> {
    read_catalog(data, vtoc, opts)?
        .into_iter()
        .find(|e| e.name == name)
        .ok_or_else(|| FilesystemError::FileNotFound(name.to_string()))
}

/// Walk a file's T/S-list chain and concatenate every referenced data
/// sector's bytes, in file order. Sparse T/S pairs (`0/0`, a hole in a
/// random-access text file) contribute a sector of zero bytes, matching
/// what DOS 3.3 itself returns for an unwritten record.
pub fn read_file(data: &[u8], entry: &FileEntry, opts: &DecodeOptions) -> Result<Vec<u8>, FilesystemError> {
    let mut out = Vec::with_capacity(entry.length_sectors as usize * SECTOR_SIZE);
    let mut track = entry.first_ts_track;
    let mut sector = entry.first_ts_sector;
    let mut steps = 0usize;

    loop {
        steps += 1;
        if steps > opts.ts_list_chain_limit {
            return Err(FilesystemError::TsListChainTooLong(opts.ts_list_chain_limit));
        }
        let ts_list = read_sector(data, track, sector)?;
        let next_track = ts_list[0x01];
        let next_sector = ts_list[0x02];

        for pair in 0..MAX_TS_PAIRS_PER_SECTOR {
            let base = 0x0C + pair * 2;
            if base + 2 > ts_list.len() {
                break;
            }
            let (t, s) = (ts_list[base], ts_list[base + 1]);
            if t == 0 && s == 0 {
                out.extend(std::iter::repeat_n(0u8, SECTOR_SIZE));
                continue;
            }
            out.extend_from_slice(read_sector(data, t, s)?);
        }

        if next_track == 0 && next_sector == 0 {
            break;
        }
        if next_track == track && next_sector == sector {
            break;
        }
        track = next_track;
        sector = next_sector;
    }

    Ok(out)
}

/// For a `Binary`-type file, the two little-endian header fields DOS 3.3
/// stores at the start of the first data sector: `(load_address, length)`.
pub fn binary_header(file_data: &[u8]) -> Option<(u16, u16)> {
    if file_data.len() < 4 {
        return None;
    }
    Some((u16::from_le_bytes([file_data[0], file_data[1]]), u16::from_le_bytes([file_data[2], file_data[3]])))
}

fn allocate_sector(vtoc: &mut Vtoc) -> Result<(u8, u8), FilesystemError> {
    for track in 0..vtoc.tracks_per_disk as usize {
        if track == 17 {
            continue; // reserved for VTOC/catalog
        }
        for sector in 0..vtoc.sectors_per_track as usize {
            if vtoc.bitmap[track][sector] {
                vtoc.bitmap[track][sector] = false;
                return Ok((track as u8, sector as u8));
            }
        }
    }
    Err(FilesystemError::DiskFull)
}

fn free_sector(vtoc: &mut Vtoc, track: u8, sector: u8) {
    vtoc.set_free(track, sector, true);
}

/// Create a new file, allocating a T/S-list sector plus enough data sectors
/// to hold `contents`, and appending a catalog entry (`spec.md` §4.5's
/// `create_file`). Returns an error if `name` already exists.
pub fn create_file(
    data: &mut [u8],
    name: &str,
    file_type: FileType,
    contents: &[u8],
    opts: &DecodeOptions,
) -> Result<(), FilesystemError> {
    if name.len() > 30 {
        return Err(FilesystemError::NameTooLong(name.to_string()));
    }
    let mut vtoc = read_vtoc(data)?;
    if find_entry(data, &vtoc, name, opts).is_ok() {
        return Err(FilesystemError::FileExists(name.to_string()));
    }

    let data_chunks: Vec<&[u8]> = contents.chunks(SECTOR_SIZE).collect();
    let data_chunks = if data_chunks.is_empty() { vec![&[][..]] } else { data_chunks };

    let mut ts_pairs = Vec::with_capacity(data_chunks.len());
    for chunk in &data_chunks {
        let (t, s) = allocate_sector(&mut vtoc)?;
        let off = offset(t, s)?;
        data[off..off + chunk.len()].copy_from_slice(chunk);
        ts_pairs.push((t, s));
    }

    let (ts_list_track, ts_list_sector) = allocate_sector(&mut vtoc)?;
    let ts_off = offset(ts_list_track, ts_list_sector)?;
    data[ts_off..ts_off + SECTOR_SIZE].fill(0);
    for (i, (t, s)) in ts_pairs.iter().enumerate() {
        let base = ts_off + 0x0C + i * 2;
        data[base] = *t;
        data[base + 1] = *s;
    }

    append_catalog_entry(
        data,
        &vtoc,
        name,
        file_type,
        ts_list_track,
        ts_list_sector,
        ts_pairs.len() as u16 + 1,
        opts,
    )?;
    write_vtoc(data, &vtoc)
}

fn append_catalog_entry(
    data: &mut [u8],
    vtoc: &Vtoc,
    name: &str,
    file_type: FileType,
    ts_track: u8,
    ts_sector: u8,
    length_sectors: u16,
    opts: &DecodeOptions,
) -> Result<(), FilesystemError> {
    let mut track = vtoc.catalog_track;
    let mut sector = vtoc.catalog_sector;
    let mut steps = 0usize;

    loop {
        steps += 1;
        if steps > opts.catalog_chain_limit {
            return Err(FilesystemError::CatalogChainTooLong(opts.catalog_chain_limit));
        }
        let off = offset(track, sector)?;
        for i in 0..ENTRIES_PER_CATALOG_SECTOR {
            let base = off + 0x0B + i * CATALOG_ENTRY_SIZE;
            if data[base] == 0x00 || data[base] == 0xFF {
                data[base] = ts_track;
                data[base + 1] = ts_sector;
                data[base + 2] = file_type.to_byte();
                data[base + 3..base + 33].copy_from_slice(&encode_filename(name));
                data[base + 33..base + 35].copy_from_slice(&length_sectors.to_le_bytes());
                return Ok(());
            }
        }
        let next_track = data[off + 0x01];
        let next_sector = data[off + 0x02];
        if next_track == 0 && next_sector == 0 {
            return Err(FilesystemError::DiskFull);
        }
        track = next_track;
        sector = next_sector;
    }
}

/// Mark a file's catalog entry deleted and free its data and T/S-list
/// sectors (`spec.md` §4.5's `delete_file`).
pub fn delete_file(data: &mut [u8], name: &str, opts: &DecodeOptions) -> Result<(), FilesystemError> {
    let mut vtoc = read_vtoc(data)?;
    let entry = find_entry(data, &vtoc, name, opts)?;

    let mut track = entry.first_ts_track;
    let mut sector = entry.first_ts_sector;
    let mut steps = 0usize;
    loop {
        steps += 1;
        if steps > opts.ts_list_chain_limit {
            return Err(FilesystemError::TsListChainTooLong(opts.ts_list_chain_limit));
        }
        let ts_off = offset(track, sector)?;
        let next_track = data[ts_off + 0x01];
        let next_sector = data[ts_off + 0x02];
        for pair in 0..MAX_TS_PAIRS_PER_SECTOR {
            let base = ts_off + 0x0C + pair * 2;
            let (t, s) = (data[base], data[base + 1]);
            if t != 0 || s != 0 {
                free_sector(&mut vtoc, t, s);
            }
        }
        free_sector(&mut vtoc, track, sector);
        if next_track == 0 && next_sector == 0 {
            break;
        }
        track = next_track;
        sector = next_sector;
    }

    let (ct, cs, idx) = entry.catalog_location;
    let off = offset(ct, cs)?;
    data[off + 0x0B + idx * CATALOG_ENTRY_SIZE] = 0xFF;
    write_vtoc(data, &vtoc)
}

/// Rename a file's catalog entry in place.
pub fn rename_file(data: &mut [u8], old_name: &str, new_name: &str, opts: &DecodeOptions) -> Result<(), FilesystemError> {
    if new_name.len() > 30 {
        return Err(FilesystemError::NameTooLong(new_name.to_string()));
    }
    let vtoc = read_vtoc(data)?;
    let entry = find_entry(data, &vtoc, old_name, opts)?;
    let (ct, cs, idx) = entry.catalog_location;
    let off = offset(ct, cs)?;
    let base = off + 0x0B + idx * CATALOG_ENTRY_SIZE;
    data[base + 3..base + 33].copy_from_slice(&encode_filename(new_name));
    Ok(())
}

fn set_locked(data: &mut [u8], name: &str, locked: bool, opts: &DecodeOptions) -> Result<(), FilesystemError> {
    let vtoc = read_vtoc(data)?;
    let entry = find_entry(data, &vtoc, name, opts)?;
    let (ct, cs, idx) = entry.catalog_location;
    let off = offset(ct, cs)?;
    let base = off + 0x0B + idx * CATALOG_ENTRY_SIZE + 2;
    if locked {
        data[base] |= 0x80;
    }
    else {
        data[base] &= 0x7f;
    }
    Ok(())
}

pub fn lock_file(data: &mut [u8], name: &str, opts: &DecodeOptions) -> Result<(), FilesystemError> {
    set_locked(data, name, true, opts)
}

pub fn unlock_file(data: &mut [u8], name: &str, opts: &DecodeOptions) -> Result<(), FilesystemError> {
    set_locked(data, name, false, opts)
}

/// Cross-check the VTOC bitmap against the catalog and every file's T/S
/// chain, returning one diagnostic string per inconsistency found
/// (`spec.md` §4.5's `check_integrity`): sectors marked allocated that no
/// file claims, sectors two files both claim, and T/S-list pairs pointing
/// outside the disk's declared geometry.
pub fn check_integrity(data: &[u8], opts: &DecodeOptions) -> Result<Vec<String>, FilesystemError> {
    let vtoc = read_vtoc(data)?;
    let mut issues = Vec::new();
    let mut claimed = [[false; SECTORS_PER_TRACK]; TRACKS];
    claimed[17][0] = true; // VTOC itself

    let entries = read_catalog(data, &vtoc, opts)?;
    for entry in &entries {
        let mut track = entry.first_ts_track;
        let mut sector = entry.first_ts_sector;
        let mut steps = 0usize;
        loop {
            steps += 1;
            if steps > opts.ts_list_chain_limit {
                issues.push(format!("{}: T/S-list chain exceeds walk limit", entry.name));
                break;
            }
            if track as usize >= TRACKS || sector as usize >= SECTORS_PER_TRACK {
                issues.push(format!("{}: T/S-list sector {track}/{sector} out of range", entry.name));
                break;
            }
            if claimed[track as usize][sector as usize] {
                issues.push(format!("{}: T/S-list sector {track}/{sector} already claimed", entry.name));
            }
            claimed[track as usize][sector as usize] = true;

            let Ok(ts_list) = read_sector(data, track, sector)
            else {
                issues.push(format!("{}: T/S-list sector {track}/{sector} unreadable", entry.name));
                break;
            };
            for pair in 0..MAX_TS_PAIRS_PER_SECTOR {
                let base = 0x0C + pair * 2;
                let (t, s) = (ts_list[base], ts_list[base + 1]);
                if t == 0 && s == 0 {
                    continue;
                }
                if t as usize >= TRACKS || s as usize >= SECTORS_PER_TRACK {
                    issues.push(format!("{}: data sector {t}/{s} out of range", entry.name));
                    continue;
                }
                if claimed[t as usize][s as usize] {
                    issues.push(format!("{}: data sector {t}/{s} already claimed", entry.name));
                }
                claimed[t as usize][s as usize] = true;
            }

            let next_track = ts_list[0x01];
            let next_sector = ts_list[0x02];
            if next_track == 0 && next_sector == 0 {
                break;
            }
            if next_track == track && next_sector == sector {
                issues.push(format!("{}: T/S-list chain self-loops at {track}/{sector}", entry.name));
                break;
            }
            track = next_track;
            sector = next_sector;
        }
    }

    for track in 0..vtoc.tracks_per_disk as usize {
        for sector in 0..vtoc.sectors_per_track as usize {
            let marked_free = vtoc.bitmap[track][sector];
            let is_claimed = claimed[track][sector];
            if marked_free && is_claimed {
                issues.push(format!("{track}/{sector} is marked free but is claimed by a file"));
            }
        }
    }

    Ok(issues)
}

/// A thin, stateful convenience wrapper bundling a parsed VTOC with its
/// backing bytes, for callers that want to issue several operations
/// without re-parsing the VTOC each time.
pub struct Dos33Filesystem<'a> {
    data: &'a mut [u8],
    pub vtoc: Vtoc,
}

impl<'a> Dos33Filesystem<'a> {
    pub fn open(data: &'a mut [u8]) -> Result<Self, FilesystemError> {
        let vtoc = read_vtoc(data)?;
        Ok(Self { data, vtoc })
    }

    pub fn catalog(&self, opts: &DecodeOptions) -> Result<Vec<FileEntry>, FilesystemError> {
        read_catalog(self.data, &self.vtoc, opts)
    }

    pub fn read_file(&self, entry: &FileEntry, opts: &DecodeOptions) -> Result<Vec<u8>, FilesystemError> {
        read_file(self.data, entry, opts)
    }

    pub fn get_free(&self) -> u32 {
        self.vtoc.get_free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_disk() -> Vec<u8> {
        let mut data = vec![0u8; TRACKS * SECTORS_PER_TRACK * SECTOR_SIZE];
        let vtoc_off = offset(17, 0).unwrap();
        data[vtoc_off + 0x01] = 17;
        data[vtoc_off + 0x02] = 15;
        data[vtoc_off + 0x03] = 3;
        data[vtoc_off + 0x06] = 254;
        data[vtoc_off + 0x27] = MAX_TS_PAIRS_PER_SECTOR as u8;
        data[vtoc_off + 0x34] = TRACKS as u8;
        data[vtoc_off + 0x35] = SECTORS_PER_TRACK as u8;
        data[vtoc_off + 0x36..vtoc_off + 0x38].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        for track in 0..TRACKS {
            if track == 17 {
                continue;
            }
            let base = vtoc_off + 0x38 + track * 4;
            data[base] = 0xFF; // sectors 8-15 free
            data[base + 1] = 0xFF; // sectors 0-7 free
        }
        // catalog sector (17,15): empty, chain ends here
        let cat_off = offset(17, 15).unwrap();
        data[cat_off + 0x01] = 0;
        data[cat_off + 0x02] = 0;
        data
    }

    #[test]
    fn reads_vtoc_geometry_and_free_count() {
        let data = blank_disk();
        let vtoc = read_vtoc(&data).unwrap();
        assert_eq!(vtoc.tracks_per_disk, 35);
        assert_eq!(vtoc.sectors_per_track, 16);
        // every track except 17 is fully free: 34 * 16 sectors.
        assert_eq!(vtoc.get_free(), 34 * 16);
    }

    #[test]
    fn create_read_delete_round_trips() {
        let mut data = blank_disk();
        let opts = DecodeOptions::default();
        let contents = vec![0x42u8; 700];
        create_file(&mut data, "HELLO", FileType::Binary, &contents, &opts).unwrap();

        let vtoc = read_vtoc(&data).unwrap();
        let entries = read_catalog(&data, &vtoc, &opts).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "HELLO");
        assert_eq!(entries[0].file_type, FileType::Binary);

        let read_back = read_file(&data, &entries[0], &opts).unwrap();
        assert!(read_back.len() >= contents.len());
        assert_eq!(&read_back[..contents.len()], &contents[..]);

        let issues = check_integrity(&data, &opts).unwrap();
        assert!(issues.is_empty(), "unexpected integrity issues: {issues:?}");

        delete_file(&mut data, "HELLO", &opts).unwrap();
        let vtoc_after = read_vtoc(&data).unwrap();
        let entries_after = read_catalog(&data, &vtoc_after, &opts).unwrap();
        assert!(entries_after.is_empty());
        assert_eq!(vtoc_after.get_free(), 34 * 16);
    }

    #[test]
    fn lock_and_rename_round_trip() {
        let mut data = blank_disk();
        let opts = DecodeOptions::default();
        create_file(&mut data, "A", FileType::Text, &[1, 2, 3], &opts).unwrap();

        lock_file(&mut data, "A", &opts).unwrap();
        let vtoc = read_vtoc(&data).unwrap();
        let entry = find_entry(&data, &vtoc, "A", &opts).unwrap();
        assert!(entry.locked);

        rename_file(&mut data, "A", "B", &opts).unwrap();
        let entry = find_entry(&data, &vtoc, "B", &opts).unwrap();
        assert_eq!(entry.name, "B");
        assert!(find_entry(&data, &vtoc, "A", &opts).is_err());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut data = blank_disk();
        let opts = DecodeOptions::default();
        create_file(&mut data, "A", FileType::Text, &[1], &opts).unwrap();
        assert!(matches!(create_file(&mut data, "A", FileType::Text, &[1], &opts), Err(FilesystemError::FileExists(_))));
    }
}
