/*!
Filesystem layer (`spec.md` §4.5): the DOS 3.3 VTOC/catalog/T-S-list
reader built above the sector model. This is the one filesystem this crate
implements; other filesystems (ProDOS, AmigaDOS, CBM DOS) are out of scope
per `spec.md`'s Non-goals, but the ambient sector layer underneath them
(`crate::model`, `crate::adapters`) already reads their raw-sector
containers.
*/

pub mod dos33;

pub use dos33::{Dos33Filesystem, FileEntry, FileType, FilesystemError};
