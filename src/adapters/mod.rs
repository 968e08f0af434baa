/*!
Format adapters (`spec.md` §4.3, §4.4, §6): the concrete [`crate::registry::FormatAdapter`]
implementations this crate ships.

- [`commodore`]: D64 (raw sector, with-errors + 40-track variants) and G64
  (GCR bitstream), sharing [`crate::bitstream::gcr_commodore`].
- [`amiga`]: ADF, a raw-sector container like D64 but for the Amiga's
  fixed DD/HD geometries.
- [`atari`]: ATR, the Atari 8-bit raw-sector container with its 16-byte header.
- [`apple`]: NIB (Apple II 6-and-2 GCR bitstream) and the DOS 3.3 raw
  `.dsk`/ProDOS `.po` sector containers.
- [`raw`]: the data-driven family of plain raw-sector geometries
  (`spec.md` §4.4) plus the MSA compressed container, expressed as a
  table rather than one adapter type per platform.
- [`scp`]/[`kryoflux`]: flux-preserving multi-revolution containers built
  on [`crate::flux`].
*/

pub mod amiga;
pub mod apple;
pub mod atari;
pub mod commodore;
pub mod kryoflux;
pub mod raw;
pub mod scp;

use crate::registry::Registry;

/// Register every adapter this crate implements, in the fixed order
/// `spec.md` §4.1's registration-order tie-break depends on.
pub fn register_all(registry: &mut Registry) {
    registry.register(Box::new(commodore::D64Adapter));
    registry.register(Box::new(commodore::G64Adapter));
    registry.register(Box::new(amiga::AdfAdapter));
    registry.register(Box::new(atari::AtrAdapter));
    registry.register(Box::new(apple::NibAdapter));
    registry.register(Box::new(apple::Dos33RawAdapter));
    registry.register(Box::new(scp::ScpAdapter));
    registry.register(Box::new(kryoflux::KryoFluxAdapter));
    raw::register_all(registry);
}
