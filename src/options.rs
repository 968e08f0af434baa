/*!
Decode-time configuration.

`spec.md` leaves several thresholds as "configured" rather than fixed
constants (weak-bit CV threshold, fusion method, long-track threshold, loop
limits, transition capacity). [`DecodeOptions`] collects them into one
`Default`-backed struct threaded through [`crate::registry::Registry::open`]
and [`crate::convert::convert`], mirroring the teacher crate's `LoadOptions`
bitflags + builder pattern (`image_builder::ImageBuilder`) without any
process-wide mutable configuration (`spec.md` §5).
*/

/// How multiple flux revolutions are combined into one fused track.
///
/// See `spec.md` §4.2 "Fusion".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionMethod {
    /// Per-position median across revolutions.
    #[default]
    Median,
    /// Per-position arithmetic mean across revolutions.
    WeightedMean,
    /// Always take revolution 0 verbatim.
    Best,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
    /// Coefficient-of-variation above which a fused position is "weak".
    /// Default 0.15, per `spec.md` §3/§4.2.
    pub weak_bit_cv_threshold: f64,
    /// How revolutions are fused once aligned.
    pub fusion_method: FusionMethod,
    /// Number of leading transitions used for the alignment pattern match.
    /// Default 50.
    pub alignment_pattern_len: usize,
    /// Search window (in samples) the alignment offset is scanned over.
    /// Default 100.
    pub alignment_search_window: usize,
    /// Minimum transitions a revolution must have before alignment is
    /// attempted at all. Default 100.
    pub alignment_min_transitions: usize,
    /// Per-revolution transition capacity before a decode fails with
    /// `memory-exhausted`. Default 500_000.
    pub max_transitions_per_revolution: usize,
    /// Measured track length above which a track is flagged as a likely
    /// protection scheme, in raw bytes. Default 1.10x the nominal capacity;
    /// callers with format-specific knowledge should override it.
    pub long_track_threshold: Option<usize>,
    /// Catalog-chain walk limit (DOS 3.3). Default 50.
    pub catalog_chain_limit: usize,
    /// T/S-list chain walk limit (DOS 3.3). Default 500.
    pub ts_list_chain_limit: usize,
    /// Default sample clock, in Hz, used when a flux container does not
    /// override it: 24.027428 MHz / (ICK+1), ICK=2 (`spec.md` §4.2).
    pub default_sample_clock_hz: f64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        const MCK_HZ: f64 = 24_027_428.0;
        const ICK: f64 = 2.0;
        Self {
            weak_bit_cv_threshold: 0.15,
            fusion_method: FusionMethod::Median,
            alignment_pattern_len: 50,
            alignment_search_window: 100,
            alignment_min_transitions: 100,
            max_transitions_per_revolution: 500_000,
            long_track_threshold: None,
            catalog_chain_limit: 50,
            ts_list_chain_limit: 500,
            default_sample_clock_hz: MCK_HZ / (ICK + 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sample_clock_matches_spec() {
        let opts = DecodeOptions::default();
        // ~41.619 ns/tick, as spec.md §4.2 states.
        let ns_per_tick = 1.0e9 / opts.default_sample_clock_hz;
        assert!((ns_per_tick - 41.619).abs() < 0.01);
    }
}
