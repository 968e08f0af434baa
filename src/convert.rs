/*!
Round-trip conversion driver (`spec.md` §6, §8 scenario S6): probe/open a
source image through the [`Registry`], then re-encode every decoded track
into a blank instance of a named target container, recording where the
target format had no way to preserve something the source carried. This is
the "orchestration glue" `spec.md` §4 budgets separately from the four
abstraction layers - it composes [`crate::registry::decode_all`]'s read
side with each writable adapter's [`crate::registry::FormatAdapter::create_blank`]
and [`crate::registry::OpenImage::write_track`]/[`crate::registry::OpenImage::finalize`]
on the write side.
*/

use crate::{
    model::DiskImage,
    options::DecodeOptions,
    registry::{AdapterCaps, Registry},
    DiskImageError,
};

/// One attribute the target format couldn't represent for a given track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossNote {
    pub cylinder: u16,
    pub head: u8,
    pub detail: String,
}

/// The result of [`convert`]/[`convert_disk_image`]: the re-encoded target
/// bytes, plus every lossiness note recorded while writing (`spec.md` §2:
/// "lossy conversions are flagged, not silently sanitised").
#[derive(Debug, Clone)]
pub struct ConvertResult {
    pub bytes: Vec<u8>,
    pub lossiness: Vec<LossNote>,
}

/// Detect and decode `source_bytes`, then re-encode it into
/// `target_adapter_name`'s container format (`spec.md` §6's
/// `convert(source_bytes, target_adapter_name) -> target_bytes`).
pub fn convert(
    registry: &Registry,
    source_bytes: &[u8],
    source_filename: Option<&str>,
    target_adapter_name: &str,
    opts: &DecodeOptions,
) -> Result<ConvertResult, DiskImageError> {
    let source = registry.open(source_bytes, source_filename, opts)?;
    convert_disk_image(registry, &source, target_adapter_name, opts)
}

/// Like [`convert`], but starting from an already-decoded [`DiskImage`] -
/// useful when the caller already probed/opened the source (or built one
/// in memory for a test) and doesn't want to re-detect it.
pub fn convert_disk_image(
    registry: &Registry,
    source: &DiskImage,
    target_adapter_name: &str,
    opts: &DecodeOptions,
) -> Result<ConvertResult, DiskImageError> {
    let target_adapter = registry
        .adapters()
        .iter()
        .find(|a| a.name() == target_adapter_name)
        .ok_or_else(|| DiskImageError::NotFound(format!("no adapter named '{target_adapter_name}'")))?;

    let required = AdapterCaps::CAN_WRITE | AdapterCaps::CAN_CREATE;
    if !target_adapter.caps().contains(required) {
        return Err(DiskImageError::UnsupportedFormat(format!(
            "{target_adapter_name} cannot be written to"
        )));
    }

    let blank = target_adapter.create_blank(source.geometry)?;
    let mut target = target_adapter.open(&blank, opts)?;
    let target_caps = target_adapter.caps();

    let mut lossiness = Vec::new();
    let (cylinders, heads, ..) = source.get_geometry();
    for cylinder in 0..cylinders {
        for head in 0..heads {
            let Some(track) = source.track(cylinder, head)
            else {
                continue;
            };

            match target.write_track(cylinder, head, track) {
                Ok(()) => {}
                Err(DiskImageError::RangeError(_) | DiskImageError::SeekError(_)) => {
                    lossiness.push(LossNote {
                        cylinder,
                        head,
                        detail: "target geometry has no matching track".into(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            }

            if !target_caps.contains(AdapterCaps::SUPPORTS_TIMING) {
                if track.revolution_count() > 0 {
                    lossiness.push(LossNote { cylinder, head, detail: "flux revolution timing discarded".into() });
                }
                if !track.weak_positions.is_empty() {
                    lossiness.push(LossNote { cylinder, head, detail: "weak-bit positions discarded".into() });
                }
            }
            if !target_caps.contains(AdapterCaps::SUPPORTS_ERRORS) && track.sectors.iter().any(|s| !s.status.is_ok()) {
                lossiness.push(LossNote { cylinder, head, detail: "per-sector error status discarded".into() });
            }
        }
    }

    Ok(ConvertResult { bytes: target.finalize(), lossiness })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::gcr_commodore::sectors_per_track;
    use crate::chs::DiskChsn;
    use crate::model::{DiskInfo, Sector};

    fn d64_with_sample_data() -> Vec<u8> {
        const TRACKS: u16 = 35;
        let payload: usize = (1..=TRACKS).map(|t| sectors_per_track(t) as usize).sum::<usize>() * 256;
        let mut data = vec![0u8; payload];

        let mut offset = 0usize;
        for t in 1..=TRACKS {
            for s in 0..sectors_per_track(t) {
                let value = (t as u8).wrapping_mul(7).wrapping_add(s);
                data[offset..offset + 256].fill(value);
                offset += 256;
            }
        }

        // BAM pointer at track 18 sector 0, so D64Adapter's probe recognizes it.
        let preceding: usize = (1..18).map(|t| sectors_per_track(t) as usize).sum();
        let bam_off = preceding * 256;
        data[bam_off] = 18;
        data[bam_off + 1] = 1;
        data
    }

    #[test]
    fn d64_to_g64_and_back_reproduces_original_bytes() {
        let registry = Registry::with_default_adapters();
        let original = d64_with_sample_data();
        let opts = DecodeOptions::default();

        let to_g64 = convert(&registry, &original, Some("disk.d64"), "g64", &opts).unwrap();
        assert!(to_g64.lossiness.is_empty());

        let back_to_d64 = convert(&registry, &to_g64.bytes, Some("disk.g64"), "d64", &opts).unwrap();
        assert!(back_to_d64.lossiness.is_empty());
        assert_eq!(back_to_d64.bytes, original);
    }

    #[test]
    fn unwritable_target_is_rejected() {
        let registry = Registry::with_default_adapters();
        let original = d64_with_sample_data();
        let opts = DecodeOptions::default();
        let err = convert(&registry, &original, Some("disk.d64"), "scp", &opts).unwrap_err();
        assert!(matches!(err, DiskImageError::UnsupportedFormat(_)));
    }

    #[test]
    fn unknown_target_adapter_name_is_not_found() {
        let registry = Registry::with_default_adapters();
        let original = d64_with_sample_data();
        let opts = DecodeOptions::default();
        let err = convert(&registry, &original, Some("disk.d64"), "nonexistent", &opts).unwrap_err();
        assert!(matches!(err, DiskImageError::NotFound(_)));
    }

    #[test]
    fn flux_timing_is_flagged_lossy_when_target_cannot_represent_it() {
        let registry = Registry::with_default_adapters();
        let geometry = DiskInfo { cylinders: 1, heads: 1, sectors_per_track: 1, sector_size: 256 };
        let mut source = DiskImage::new(geometry, "test", "Test");
        let mut track = crate::model::Track::new(1, 0, crate::model::TrackEncoding::GcrCommodore);
        track.sectors.push(Sector::new(DiskChsn::new(1, 0, 0, 1), vec![0u8; 256]));
        track.revolutions.push(crate::model::Revolution { flux_ns: vec![4000.0; 10], index_timestamp: Some(0) });
        source.set_track(0, 0, track).unwrap();

        let result = convert_disk_image(&registry, &source, "d64", &DecodeOptions::default()).unwrap();
        assert!(result.lossiness.iter().any(|l| l.detail.contains("revolution timing")));
    }
}
