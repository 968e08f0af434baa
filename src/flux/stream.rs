/*!
Flux sample-stream opcode parser.

Decodes the opcode vocabulary `spec.md` §4.2 describes: short/two-byte/
three-byte flux intervals, an overflow opcode, three NOP skip opcodes, and
an out-of-band (OOB) metadata escape carrying stream-info, index, stream-
end, key-value info, and end-of-file blocks. The opcode values themselves
(`0x00..=0x07` two-byte flux, `0x08/0x09/0x0A` NOP1/2/3, `0x0B` overflow,
`0x0C` three-byte flux, `0x0D` OOB, `0x0E..=0xFF` short flux) match the
real KryoFlux stream protocol, grounded on the teacher crate's
`file_parsers::kryoflux.rs` dispatch tables.
*/

use crate::{options::DecodeOptions, DiskImageError};

const OVERFLOW_TICKS: u64 = 0x1_0000;

const OOB_STREAM_INFO: u8 = 0x01;
const OOB_INDEX: u8 = 0x02;
const OOB_STREAM_END: u8 = 0x03;
const OOB_KF_INFO: u8 = 0x04;
const OOB_EOF: u8 = 0x0D;

/// One captured revolution's raw ticks plus, if an index OOB closed it, the
/// sample-counter timestamp of that index.
#[derive(Debug, Clone, Default)]
pub struct ParsedRevolution {
    pub ticks: Vec<u64>,
    pub index_sample_counter: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct StreamParseResult {
    pub revolutions: Vec<ParsedRevolution>,
    pub sample_clock_hz: f64,
    /// Non-fatal integrity findings: stream-position mismatches, missing
    /// index marks, truncation. Per `spec.md` §4.2/§7 these are warnings,
    /// not decode failures.
    pub warnings: Vec<String>,
    pub truncated: bool,
}

impl StreamParseResult {
    pub fn ns_per_tick(&self) -> f64 {
        1.0e9 / self.sample_clock_hz
    }

    /// Revolutions converted from raw ticks to nanosecond intervals.
    pub fn revolutions_ns(&self) -> Vec<Vec<f64>> {
        let scale = self.ns_per_tick();
        self.revolutions.iter().map(|r| r.ticks.iter().map(|&t| t as f64 * scale).collect()).collect()
    }
}

fn parse_kf_info(payload: &[u8], sample_clock_hz: &mut f64) {
    let Ok(text) = std::str::from_utf8(payload) else { return };
    for part in text.trim_end_matches('\0').split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            if key.trim().eq_ignore_ascii_case("sck") {
                if let Ok(hz) = value.trim().parse::<f64>() {
                    *sample_clock_hz = hz;
                }
            }
        }
    }
}

/// Parse a single track's flux sample stream into per-revolution tick lists.
///
/// Never fails on corrupt/truncated input except when a revolution would
/// exceed `opts.max_transitions_per_revolution` (the `memory-exhausted`
/// error `spec.md` §4.2 names) - every other anomaly becomes a warning so
/// callers can still read what the stream does contain (`spec.md` §7).
pub fn parse_flux_stream(data: &[u8], opts: &DecodeOptions) -> Result<StreamParseResult, DiskImageError> {
    log::debug!("parsing flux stream of {} bytes", data.len());
    let mut sample_clock_hz = opts.default_sample_clock_hz;
    let mut warnings = Vec::new();
    let mut revolutions: Vec<ParsedRevolution> = Vec::new();
    let mut current: Vec<u64> = Vec::new();
    let mut accumulator: u64 = 0;
    let mut stream_pos: u64 = 0;
    let mut reached_eof = false;

    let mut i = 0usize;
    while i < data.len() {
        let b = data[i];
        match b {
            0x00..=0x07 => {
                if i + 1 >= data.len() {
                    warnings.push("stream-truncated: two-byte flux opcode cut short".into());
                    break;
                }
                let interval = ((b as u64) << 8) | data[i + 1] as u64;
                accumulator += interval;
                current.push(accumulator);
                accumulator = 0;
                stream_pos += 2;
                i += 2;
            }
            0x08 => {
                stream_pos += 1;
                i += 1;
            }
            0x09 => {
                stream_pos += 2;
                i += 2;
            }
            0x0A => {
                stream_pos += 3;
                i += 3;
            }
            0x0B => {
                accumulator += OVERFLOW_TICKS;
                stream_pos += 1;
                i += 1;
            }
            0x0C => {
                if i + 2 >= data.len() {
                    warnings.push("stream-truncated: three-byte flux opcode cut short".into());
                    break;
                }
                let interval = u16::from_le_bytes([data[i + 1], data[i + 2]]) as u64;
                accumulator += interval;
                current.push(accumulator);
                accumulator = 0;
                stream_pos += 3;
                i += 3;
            }
            0x0D => {
                if i + 3 >= data.len() {
                    warnings.push("stream-truncated: OOB header cut short".into());
                    break;
                }
                let oob_type = data[i + 1];
                let size = u16::from_le_bytes([data[i + 2], data[i + 3]]) as usize;
                let payload_start = i + 4;
                if payload_start + size > data.len() {
                    warnings.push("stream-truncated: OOB payload cut short".into());
                    break;
                }
                let payload = &data[payload_start..payload_start + size];

                match oob_type {
                    OOB_STREAM_INFO | OOB_STREAM_END if payload.len() >= 4 => {
                        let claimed = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as u64;
                        if claimed != stream_pos {
                            warnings.push(format!(
                                "stream-position-mismatch: OOB claimed {claimed}, counted {stream_pos}"
                            ));
                        }
                    }
                    OOB_INDEX if payload.len() >= 8 => {
                        let claimed = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as u64;
                        if claimed != stream_pos {
                            warnings.push(format!(
                                "stream-position-mismatch: OOB claimed {claimed}, counted {stream_pos}"
                            ));
                        }
                        let sample_counter = u32::from_le_bytes(payload[4..8].try_into().unwrap()) as u64;
                        revolutions.push(ParsedRevolution {
                            ticks: std::mem::take(&mut current),
                            index_sample_counter: Some(sample_counter),
                        });
                    }
                    OOB_KF_INFO => parse_kf_info(payload, &mut sample_clock_hz),
                    OOB_EOF => reached_eof = true,
                    _ => {}
                }
                i = payload_start + size;
            }
            _ => {
                accumulator += b as u64;
                current.push(accumulator);
                accumulator = 0;
                stream_pos += 1;
                i += 1;
            }
        }
    }

    if !current.is_empty() {
        revolutions.push(ParsedRevolution { ticks: current, index_sample_counter: None });
    }
    if revolutions.iter().all(|r| r.index_sample_counter.is_none()) {
        warnings.push("no-index: zero index OOBs observed, treating stream as one revolution".into());
    }
    if !reached_eof {
        warnings.push("stream-truncated: OOB end-of-file not reached before input exhausted".into());
    }

    for rev in &revolutions {
        if rev.ticks.len() > opts.max_transitions_per_revolution {
            return Err(DiskImageError::ResourceExhausted(format!(
                "memory-exhausted: revolution has {} transitions, cap is {}",
                rev.ticks.len(),
                opts.max_transitions_per_revolution
            )));
        }
    }

    for warning in &warnings {
        log::warn!("{warning}");
    }
    log::debug!(
        "parsed {} revolution(s), sample clock {:.1} Hz, truncated={}",
        revolutions.len(),
        sample_clock_hz,
        !reached_eof
    );

    Ok(StreamParseResult { revolutions, sample_clock_hz, warnings, truncated: !reached_eof })
}

/// Average RPM across consecutive index-delimited revolutions, per
/// `spec.md` §4.2: `RPM = 60e9 / (Δticks * ns_per_tick)`.
pub fn average_rpm(result: &StreamParseResult) -> Option<f64> {
    let ns_per_tick = result.ns_per_tick();
    let counters: Vec<u64> =
        result.revolutions.iter().filter_map(|r| r.index_sample_counter).collect();
    if counters.len() < 2 {
        return None;
    }
    let mut rpms = Vec::new();
    for pair in counters.windows(2) {
        let delta = pair[1].saturating_sub(pair[0]);
        if delta == 0 {
            continue;
        }
        rpms.push(60.0e9 / (delta as f64 * ns_per_tick));
    }
    if rpms.is_empty() {
        return None;
    }
    Some(rpms.iter().sum::<f64>() / rpms.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_short_flux(buf: &mut Vec<u8>, ticks: u8) {
        assert!(ticks >= 0x0E);
        buf.push(ticks);
    }

    fn push_index(buf: &mut Vec<u8>, stream_pos: u32, sample_counter: u32) {
        buf.push(0x0D);
        buf.push(0x02);
        buf.extend_from_slice(&8u16.to_le_bytes());
        buf.extend_from_slice(&stream_pos.to_le_bytes());
        buf.extend_from_slice(&sample_counter.to_le_bytes());
    }

    fn push_eof(buf: &mut Vec<u8>) {
        buf.push(0x0D);
        buf.push(0x0D);
        buf.extend_from_slice(&0u16.to_le_bytes());
    }

    #[test]
    fn parses_uniform_revolutions_with_correct_rpm() {
        let opts = DecodeOptions::default();
        let mut data = Vec::new();
        // 3 revolutions of 100 transitions of 0x28 (40) ticks each, index every 100 transitions.
        for rev in 0..3 {
            for _ in 0..100 {
                push_short_flux(&mut data, 0x28);
            }
            let stream_pos = (rev + 1) * 100;
            push_index(&mut data, stream_pos, (rev + 1) * 100 * 40);
        }
        push_eof(&mut data);

        let result = parse_flux_stream(&data, &opts).unwrap();
        assert_eq!(result.revolutions.len(), 3);
        assert!(!result.truncated);
        assert!(result.warnings.iter().all(|w| !w.contains("mismatch")));
        for rev in &result.revolutions {
            assert_eq!(rev.ticks.len(), 100);
            assert!(rev.ticks.iter().all(|&t| t == 40));
        }

        let rpm = average_rpm(&result).unwrap();
        let expected_rpm = 60.0e9 / (4000.0 * result.ns_per_tick());
        assert!((rpm - expected_rpm).abs() < 1e-6);
    }

    #[test]
    fn two_byte_and_overflow_opcodes_accumulate_correctly() {
        let opts = DecodeOptions::default();
        let mut data = vec![0x00, 0x0A]; // two-byte flux: 10 ticks
        data.push(0x0B); // overflow: +65536
        data.push(0x20); // short flux: 32 ticks, total emitted = 65536+32
        push_eof(&mut data);

        let result = parse_flux_stream(&data, &opts).unwrap();
        assert_eq!(result.revolutions.len(), 1);
        assert_eq!(result.revolutions[0].ticks, vec![10, 65536 + 32]);
    }

    #[test]
    fn nop_opcodes_consume_correct_total_byte_counts() {
        let opts = DecodeOptions::default();
        let mut data = vec![0x20]; // short flux: 1 stream byte
        data.push(0x08); // NOP1: 1 stream byte total
        data.push(0x09); // NOP2: 2 stream bytes total
        data.extend_from_slice(&[0x0A, 0x00, 0x00]); // NOP3: 3 stream bytes total
        data.push(0x30); // short flux: 1 stream byte
        // total bytes consumed so far: 1 + 1 + 2 + 3 + 1 = 8
        push_index(&mut data, 8, 1000);
        push_eof(&mut data);

        let result = parse_flux_stream(&data, &opts).unwrap();
        assert!(
            result.warnings.iter().all(|w| !w.contains("mismatch")),
            "unexpected warnings: {:?}",
            result.warnings
        );
        assert_eq!(result.revolutions[0].ticks, vec![0x20, 0x30]);
    }

    #[test]
    fn missing_index_is_reported_as_single_revolution_warning() {
        let opts = DecodeOptions::default();
        let mut data = vec![0x20, 0x30, 0x40];
        push_eof(&mut data);
        let result = parse_flux_stream(&data, &opts).unwrap();
        assert_eq!(result.revolutions.len(), 1);
        assert!(result.warnings.iter().any(|w| w.starts_with("no-index")));
    }

    #[test]
    fn oversized_revolution_is_memory_exhausted() {
        let mut opts = DecodeOptions::default();
        opts.max_transitions_per_revolution = 2;
        let mut data = vec![0x20, 0x20, 0x20];
        push_eof(&mut data);
        let err = parse_flux_stream(&data, &opts).unwrap_err();
        assert!(matches!(err, DiskImageError::ResourceExhausted(_)));
    }
}
