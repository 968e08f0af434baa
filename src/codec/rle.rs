/*!
Run-length-encoding primitive codec.

MSA (Atari ST "Magic Shadow Archiver") raw sector images store repeated runs
of the same byte as a 3-byte escape sequence `[0xE5, byte, count]`. A literal
`0xE5` in the source data is itself escaped as a 1-run (`[0xE5, 0xE5, 1]`) so
the decoder never needs to special-case it.
*/

use crate::error::DiskImageError;

const ESCAPE: u8 = 0xE5;

pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>, DiskImageError> {
    let mut out = Vec::with_capacity(expected_len);
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        if byte == ESCAPE {
            if i + 3 > data.len() {
                return Err(DiskImageError::CorruptData("truncated MSA RLE escape sequence".into()));
            }
            let run_byte = data[i + 1];
            let count = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
            out.resize(out.len() + count, run_byte);
            i += 4;
        }
        else {
            out.push(byte);
            i += 1;
        }
    }

    if out.len() != expected_len {
        return Err(DiskImageError::CorruptData(format!(
            "RLE decompressed to {} bytes, expected {}",
            out.len(),
            expected_len
        )));
    }
    Ok(out)
}

/// Compress a byte slice with the same escape scheme `decompress` understands.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        let mut run = 1usize;
        while i + run < data.len() && data[i + run] == byte && run < u16::MAX as usize {
            run += 1;
        }

        if byte == ESCAPE || run >= 4 {
            out.push(ESCAPE);
            out.push(byte);
            out.extend_from_slice(&(run as u16).to_be_bytes());
        }
        else {
            out.extend(std::iter::repeat_n(byte, run));
        }
        i += run;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_runs_and_escaped_literal() {
        let mut data = vec![0u8; 200];
        data.extend(std::iter::repeat_n(0x42u8, 50));
        data.push(ESCAPE);
        data.push(0x01);

        let compressed = compress(&data);
        let decompressed = decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn rejects_length_mismatch() {
        let compressed = compress(&[1, 2, 3]);
        assert!(decompress(&compressed, 99).is_err());
    }
}
