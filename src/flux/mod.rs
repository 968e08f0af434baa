/*!
The multi-revolution flux-transition decode engine (`spec.md` §4.2).

This is the hardest read path: it decodes a variable-length-encoded stream
of flux-transition samples for up to N revolutions per track, aligns them,
fuses them into one track with per-transition confidence and a weak-bit
map, and exposes a simplified PLL to translate the fused flux list into a
bitcell stream the track-schema layer ([`crate::bitstream`]) can dispatch
on.

The opcode vocabulary and out-of-band block layout are grounded on the
teacher crate's `file_parsers::kryoflux` module (`OsbBlock`, and its
stream/index/stream-end/kf-info/eof dispatch), which in turn mirrors the
real KryoFlux stream format - `spec.md` §4.2 describes the same vocabulary
in its own words. Both the SCP and KryoFlux-stream containers
(`crate::adapters::scp`, `crate::adapters::kryoflux`) decode through this
one shared engine, differing only in how they locate and frame a track's
stream bytes.
*/

pub mod fusion;
pub mod pll;
pub mod stream;

pub use fusion::{fuse_revolutions, FusedTrack};
pub use pll::recover_bitcells;
pub use stream::{parse_flux_stream, ParsedRevolution, StreamParseResult};
