/*!
Format registry & detection (`spec.md` §4.1, §6).

[`FormatAdapter`] is the per-format capability + probe + open contract;
[`OpenImage`] is the per-disk state an adapter's `open` hands back, playing
the role the original function-pointer table's per-format private data
field plays (`spec.md` §9) - it is just a trait object here, dropped
(closed) when the caller is done with it. [`Registry`] holds the ordered
set of adapters, exactly as `spec.md` §4.1/§9 describes: constructed once,
read-only thereafter, safe to share across threads without synchronization
(`spec.md` §5).
*/

mod probe;

pub use probe::{Match, ProbeDetail, ProbeScore, Weight};

use crate::{
    model::{DiskImage, DiskInfo, Track},
    options::DecodeOptions,
    DiskImageError,
};
use bitflags::bitflags;

bitflags! {
    /// An adapter's declared capabilities (`spec.md` §4.1).
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct AdapterCaps: u32 {
        const CAN_READ          = 0b0000_0001;
        const CAN_WRITE         = 0b0000_0010;
        const CAN_CREATE        = 0b0000_0100;
        const SUPPORTS_ERRORS   = 0b0000_1000;
        const SUPPORTS_TIMING   = 0b0001_0000;
    }
}

/// The per-format probe + open + read/write + close contract (`spec.md`
/// §4.1). Registered instances carry no interior mutability, so a
/// `Registry` of them is `Sync` (`spec.md` §5).
pub trait FormatAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Comma-separated extensions, lowercase, no leading dot.
    fn extensions(&self) -> &'static str;
    fn format_id(&self) -> &'static str;
    fn caps(&self) -> AdapterCaps;

    /// Inspect `data` (and optionally `filename`) and report a score.
    /// Must not allocate persistent state or retain pointers beyond the
    /// call (`spec.md` §4.1).
    fn probe(&self, data: &[u8], filename: Option<&str>) -> ProbeScore;

    /// Open `data`, returning per-disk state the caller drives via
    /// [`OpenImage`]. `spec.md` treats write-capability as declared by
    /// `caps().contains(CAN_WRITE)` *and* a functional `write_track`;
    /// callers should use [`adapter_write_capability_matches_flags`] to
    /// catch an adapter disagreeing with itself (`spec.md` §9 Open
    /// Question).
    fn open(&self, data: &[u8], opts: &DecodeOptions) -> Result<Box<dyn OpenImage>, DiskImageError>;

    /// Produce an empty, openable container matching `geometry` for
    /// [`crate::convert::convert`] to write into. Only adapters declaring
    /// `CAN_CREATE` need override this; the default rejects creation for
    /// read-only/flux-capture adapters where "blank" isn't a meaningful
    /// concept (`spec.md` §6's write-target contract).
    fn create_blank(&self, geometry: DiskInfo) -> Result<Vec<u8>, DiskImageError> {
        let _ = geometry;
        Err(DiskImageError::UnsupportedFormat(format!("{} cannot create a blank image", self.name())))
    }
}

/// Per-disk state produced by [`FormatAdapter::open`].
pub trait OpenImage {
    fn geometry(&self) -> DiskInfo;
    fn format_id(&self) -> &'static str;
    fn format_name(&self) -> &'static str;

    fn read_track(&mut self, cylinder: u16, head: u8, opts: &DecodeOptions) -> Result<Track, DiskImageError>;

    fn write_track(&mut self, _cylinder: u16, _head: u8, _track: &Track) -> Result<(), DiskImageError> {
        Err(DiskImageError::UnsupportedFormat("this adapter does not support writing".into()))
    }

    /// True once this adapter instance has a working `write_track`, used
    /// for the capability-flag/functional-support consistency check
    /// `spec.md` §9 calls for.
    fn supports_write(&self) -> bool {
        false
    }

    /// Serialize this opened image's current in-memory state back into a
    /// complete container byte buffer, reflecting every `write_track` call
    /// made so far. Used by [`crate::convert::convert`] once every target
    /// track has been written; adapters that store the whole container as
    /// a byte buffer already (the common case) just clone it, while
    /// adapters with a structured in-memory representation (e.g. G64's
    /// per-track offset table) serialize it here.
    fn finalize(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Returns `false` if an adapter's declared [`AdapterCaps::CAN_WRITE`] flag
/// disagrees with whether its opened state actually implements writing -
/// the bug `spec.md` §9's Open Question calls out.
pub fn adapter_write_capability_matches_flags(adapter: &dyn FormatAdapter, opened: &dyn OpenImage) -> bool {
    adapter.caps().contains(AdapterCaps::CAN_WRITE) == opened.supports_write()
}

/// Decode every track of an opened image into a full [`DiskImage`]. A
/// free function rather than a default trait method, since `OpenImage` is
/// used exclusively behind `Box<dyn OpenImage>` and a consuming default
/// method can't be dispatched dynamically.
pub fn decode_all(open: &mut dyn OpenImage, opts: &DecodeOptions) -> Result<DiskImage, DiskImageError> {
    let geometry = open.geometry();
    let mut disk = DiskImage::new(geometry, open.format_id(), open.format_name());
    for cylinder in 0..geometry.cylinders {
        for head in 0..geometry.heads {
            match open.read_track(cylinder, head, opts) {
                Ok(track) => disk.set_track(cylinder, head, track)?,
                Err(DiskImageError::SeekError(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }
    Ok(disk)
}

/// Release an opened disk's adapter-private state. With this crate's
/// trait-object modeling, `Drop` already does this; `close` exists for
/// parity with `spec.md` §6's external-interface enumeration and gives
/// embedders an explicit point to call.
pub fn close(_disk: DiskImage) {}

/// A minimum score for a probe candidate to be considered at all
/// (`spec.md` §4.1).
pub const DETECTION_THRESHOLD: i32 = 30;

/// One ranked probe result.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub adapter_name: &'static str,
    pub score: i32,
    pub detail: ProbeScore,
}

/// The ordered set of known format adapters (`spec.md` §4.1).
#[derive(Default)]
pub struct Registry {
    adapters: Vec<Box<dyn FormatAdapter>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a registry with every adapter this crate implements
    /// registered, in a fixed order (`spec.md` §4.1's "registration order"
    /// tie-break depends on this being stable).
    pub fn with_default_adapters() -> Self {
        let mut registry = Self::new();
        crate::adapters::register_all(&mut registry);
        registry
    }

    pub fn register(&mut self, adapter: Box<dyn FormatAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn adapters(&self) -> &[Box<dyn FormatAdapter>] {
        &self.adapters
    }

    fn find(&self, name: &str) -> Option<&dyn FormatAdapter> {
        self.adapters.iter().find(|a| a.name() == name).map(|a| a.as_ref())
    }

    /// Probe every registered adapter against `data`, and return every
    /// candidate scoring >= [`DETECTION_THRESHOLD`], sorted descending by
    /// score. Ties are broken by extension match against `filename`, then
    /// by registration order (`spec.md` §4.1).
    pub fn probe_all(&self, data: &[u8], filename: Option<&str>) -> Vec<Candidate> {
        log::debug!(
            "probing {} adapter(s) against {} bytes (filename={:?})",
            self.adapters.len(),
            data.len(),
            filename
        );
        let ext = filename
            .and_then(|f| f.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        let mut scored: Vec<(usize, Candidate, bool)> = self
            .adapters
            .iter()
            .enumerate()
            .map(|(i, adapter)| {
                let detail = adapter.probe(data, filename);
                let score = detail.total();
                let ext_match = ext
                    .as_deref()
                    .map(|e| adapter.extensions().split(',').any(|known| known.trim() == e))
                    .unwrap_or(false);
                (i, Candidate { adapter_name: adapter.name(), score, detail }, ext_match)
            })
            .filter(|(_, c, _)| c.score >= DETECTION_THRESHOLD)
            .collect();

        scored.sort_by(|(ia, a, ea), (ib, b, eb)| {
            b.score.cmp(&a.score).then(eb.cmp(ea)).then(ia.cmp(ib))
        });

        let candidates: Vec<Candidate> = scored.into_iter().map(|(_, c, _)| c).collect();
        match candidates.first() {
            Some(best) => log::debug!("top probe candidate: {} (score {})", best.adapter_name, best.score),
            None => log::warn!("no adapter scored >= {DETECTION_THRESHOLD}"),
        }
        candidates
    }

    /// Probe, pick the best-scoring candidate, and open it. Returns
    /// [`DiskImageError::UnknownFormat`] if no candidate scores >= 30
    /// (`spec.md` §4.1/§6) - not treated as corruption (`spec.md` §7).
    pub fn open(&self, data: &[u8], filename: Option<&str>, opts: &DecodeOptions) -> Result<DiskImage, DiskImageError> {
        let candidates = self.probe_all(data, filename);
        let best = candidates.first().ok_or(DiskImageError::UnknownFormat)?;
        log::debug!("opening {} bytes with adapter '{}'", data.len(), best.adapter_name);
        self.open_with(best.adapter_name, data, opts)
    }

    /// Open `data` with a specific named adapter, bypassing probing
    /// (`spec.md` §6).
    pub fn open_with(&self, adapter_name: &str, data: &[u8], opts: &DecodeOptions) -> Result<DiskImage, DiskImageError> {
        let adapter = self.find(adapter_name).ok_or_else(|| {
            log::error!("no adapter named '{adapter_name}'");
            DiskImageError::NotFound(format!("no adapter named '{adapter_name}'"))
        })?;
        let mut opened = adapter.open(data, opts).map_err(|e| {
            log::error!("adapter '{adapter_name}' failed to open: {e}");
            e
        })?;
        let mut disk = decode_all(opened.as_mut(), opts)?;
        disk.source_file_size = Some(data.len() as u64);
        disk.source_checksum = Some(sha1_smol::Sha1::from(data).digest().to_string());
        Ok(disk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_blob_yields_unknown_format_not_an_error_panic() {
        let registry = Registry::with_default_adapters();
        let junk = vec![0u8; 17];
        let err = registry.open(&junk, None, &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, DiskImageError::UnknownFormat));
    }

    #[test]
    fn probe_all_is_sorted_descending_by_score() {
        let registry = Registry::with_default_adapters();
        let data = vec![0u8; 901_120]; // ADF DD size, but not a real ADF signature
        let candidates = registry.probe_all(&data, Some("disk.adf"));
        for pair in candidates.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
