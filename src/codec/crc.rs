//! CRC primitive codecs, re-exported here alongside the other primitive
//! codecs even though the implementations live in [`crate::util`] (shared
//! with non-codec consumers like KryoFlux OOB block trailers).

pub use crate::util::{crc32, crc_ibm_3740, crc_ibm_3740_byte, CRC_CCITT_INITIAL};
