/*!
The universal in-memory disk representation (`spec.md` §3).

Every format adapter reads from, and writes to, these three structures:
[`Sector`] (one logical sector), [`Track`] (everything on one physical
track), and [`DiskImage`] (the container root). Persistence lives entirely
in adapters; this module only holds the shape the adapters agree on.
*/

mod disk;
mod sector;
mod track;

pub use disk::{DiskImage, DiskInfo};
pub use sector::{Sector, SectorStatus};
pub use track::{Revolution, Track};

/// A track's base bitcell/group encoding. Alias of [`crate::DiskDataEncoding`]
/// so the model and the crate-wide encoding enum stay the same type.
pub type TrackEncoding = crate::DiskDataEncoding;
