/*!
Bitstream engines (`spec.md` §2 layer 2): synthesize a track's worth of
encoded bytes from sector records, and recover sector records from a
track's encoded bytes.

Two reference engines are implemented, matching the two families `spec.md`
§4.3/§4.4 names:

- [`gcr_commodore`] - the Commodore 1541 GCR track schema (D64 sectors <->
  G64 raw track bytes), including the zone speed table and 4-to-5 packing.
- [`mfm`] - a generic IBM System 34-style MFM sector extractor/builder,
  grounded on the teacher crate's `structure_parsers::system34` marker
  constants, used by the raw-sector family's bitstream-capable variants.
*/

pub mod gcr_commodore;
pub mod mfm;
