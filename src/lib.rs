// Copyright (c) diskimg contributors
// SPDX-License-Identifier: MIT

//! # diskimg
//!
//! `diskimg` is a universal floppy-disk-image library: given a byte blob it
//! identifies which of dozens of historical disk-image container formats the
//! blob represents, decodes it into a uniform in-memory model spanning four
//! abstraction layers (raw magnetic flux, decoded bitstream, sector buffers,
//! filesystem entries), and can re-encode that model into any writable
//! target container.
//!
//! The crate is organized bottom-up, matching the layering the format
//! adapters are built on:
//!
//! - [`codec`] - primitive, stateless codecs (CRC, GCR nibble tables, MFM
//!   cell coding, RLE).
//! - [`bitstream`] - engines that synthesize a track's raw bytes from sector
//!   records and vice-versa.
//! - [`flux`] - the multi-revolution flux-transition decode engine shared by
//!   the SCP and KryoFlux-stream adapters.
//! - [`model`] - the universal in-memory disk representation every adapter
//!   populates ([`model::DiskImage`], [`model::Track`], [`model::Sector`]).
//! - [`registry`] - the [`registry::FormatAdapter`] trait, capability
//!   records, probe scoring, and the [`registry::Registry`] that ranks
//!   candidate adapters for a byte blob.
//! - [`adapters`] - the reference adapters: Commodore GCR (D64/G64), the
//!   data-driven raw-sector family, and the SCP/KryoFlux flux containers.
//! - [`fs`] - the DOS 3.3 filesystem layer built above the sector layer.
//! - [`convert`] - the round-trip conversion driver.
pub mod adapters;
pub mod bitstream;
pub mod chs;
pub mod codec;
pub mod convert;
pub mod error;
pub mod flux;
pub mod fs;
pub mod model;
pub mod options;
pub mod registry;
pub mod util;

pub use crate::{
    chs::{DiskChs, DiskChsn},
    convert::{convert, ConvertResult, LossNote},
    error::{DiskImageError, ErrorCode},
    model::{DiskImage, Sector, SectorStatus, Track, TrackEncoding},
    options::{DecodeOptions, FusionMethod},
    registry::Registry,
};

/// The largest sector payload any adapter in this crate will allocate for.
pub const MAXIMUM_SECTOR_SIZE: usize = 8192;
/// The sector size assumed when a format gives no better information.
pub const DEFAULT_SECTOR_SIZE: usize = 512;

/// Progress callback invoked periodically by long-running decodes (flux
/// fusion, multi-track conversion). Carries `(percent_complete, message)`.
///
/// Callers may signal cancellation by dropping their side of whatever
/// `user_data` handle they closed over; the core performs no cancellation
/// bookkeeping of its own and tolerates abandonment (see `spec.md` §5).
pub type ProgressCallback<'a> = Box<dyn FnMut(f64, &str) + 'a>;

/// Confidence is a fixed-point permille-times-ten value: `10000` is full
/// confidence, `0` is none. See `spec.md` §3 (`Sector`/`Track` confidence).
pub type Confidence = u16;
pub const CONFIDENCE_MAX: Confidence = 10_000;

/// The base bitcell/group encoding used on a track.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, strum::Display)]
pub enum DiskDataEncoding {
    #[default]
    Fm,
    Mfm,
    GcrCommodore,
    GcrApple,
    Raw,
}

/// Nominal rotational speed of the medium. All PC/Amiga/Atari/Commodore
/// drives rotate at 300 RPM except high-density 5.25" drives at 360 RPM.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DiskRpm {
    #[default]
    Rpm300,
    Rpm360,
    /// A measured non-standard RPM, e.g. from flux fusion (`spec.md` §4.2).
    Measured(u32),
}

impl std::fmt::Display for DiskRpm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskRpm::Rpm300 => write!(f, "300RPM"),
            DiskRpm::Rpm360 => write!(f, "360RPM"),
            DiskRpm::Measured(rpm) => write!(f, "{rpm}RPM"),
        }
    }
}
