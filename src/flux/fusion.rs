/*!
Revolution alignment and fusion (`spec.md` §4.2 "Alignment"/"Fusion").

Aligns later revolutions to the first by a short pattern match over a
bounded search window, then fuses position-by-position, computing a
per-position confidence from the cross-revolution coefficient of
variation and collecting weak-bit positions above the configured
threshold.
*/

use crate::{options::{DecodeOptions, FusionMethod}, Confidence, CONFIDENCE_MAX};

#[derive(Debug, Clone)]
pub struct FusedTrack {
    pub flux_ns: Vec<f64>,
    pub confidence: Vec<Confidence>,
    pub weak_positions: Vec<usize>,
    /// `None` when alignment was skipped (fewer than two revolutions, or no
    /// revolution reached the minimum transition count).
    pub alignment_quality: Option<f64>,
}

/// Find the offset in `[-window, +window]` into `candidate` that best
/// matches `reference`'s leading `pattern_len` samples, within a ±10%
/// per-sample tolerance. Returns `(offset, quality)` where quality is the
/// fraction of compared samples that matched within tolerance.
fn best_alignment_offset(reference: &[f64], candidate: &[f64], pattern_len: usize, window: usize) -> (isize, f64) {
    let pattern_len = pattern_len.min(reference.len());
    if pattern_len == 0 {
        return (0, 0.0);
    }

    let mut best_offset: isize = 0;
    let mut best_score: f64 = -1.0;

    for offset in -(window as isize)..=(window as isize) {
        let mut matched = 0usize;
        let mut compared = 0usize;
        for (p, &ref_val) in reference.iter().take(pattern_len).enumerate() {
            let idx = p as isize + offset;
            if idx < 0 || idx as usize >= candidate.len() {
                continue;
            }
            compared += 1;
            let cand_val = candidate[idx as usize];
            if ref_val == 0.0 {
                if cand_val == 0.0 {
                    matched += 1;
                }
                continue;
            }
            if ((cand_val - ref_val) / ref_val).abs() <= 0.10 {
                matched += 1;
            }
        }
        if compared == 0 {
            continue;
        }
        let score = matched as f64 / compared as f64;
        if score > best_score {
            best_score = score;
            best_offset = offset;
        }
    }

    (best_offset, best_score.max(0.0))
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn confidence_from_cv(cv: f64) -> Confidence {
    let conf = 1.0 / (1.0 + 10.0 * cv);
    (conf * CONFIDENCE_MAX as f64).round().clamp(0.0, CONFIDENCE_MAX as f64) as Confidence
}

/// Fuse aligned revolutions per `spec.md` §4.2. `revolutions` must be
/// non-empty; each inner `Vec<f64>` is one revolution's flux intervals in
/// nanoseconds.
pub fn fuse_revolutions(revolutions: &[Vec<f64>], opts: &DecodeOptions) -> FusedTrack {
    assert!(!revolutions.is_empty(), "fuse_revolutions requires at least one revolution");
    log::debug!("fusing {} revolution(s) with method {:?}", revolutions.len(), opts.fusion_method);

    if revolutions.len() == 1 {
        log::debug!("single revolution, skipping alignment and fusion");
        let len = revolutions[0].len();
        return FusedTrack {
            flux_ns: revolutions[0].clone(),
            confidence: vec![5000; len],
            weak_positions: Vec::new(),
            alignment_quality: None,
        };
    }

    let can_align = revolutions.iter().any(|r| r.len() >= opts.alignment_min_transitions);
    let mut aligned: Vec<&[f64]> = vec![&revolutions[0][..]];
    let mut alignment_quality = None;

    if can_align {
        let mut total_quality = 0.0;
        for rev in &revolutions[1..] {
            let (offset, quality) =
                best_alignment_offset(&revolutions[0], rev, opts.alignment_pattern_len, opts.alignment_search_window);
            total_quality += quality;
            let start = offset.max(0) as usize;
            aligned.push(if start < rev.len() { &rev[start..] } else { &[] });
        }
        alignment_quality = Some(total_quality / (revolutions.len() - 1) as f64);
    }
    else {
        log::warn!(
            "no revolution reached the {}-transition alignment minimum; fusing without alignment",
            opts.alignment_min_transitions
        );
        aligned.extend(revolutions[1..].iter().map(|r| &r[..]));
    }

    let shortest = aligned.iter().map(|r| r.len()).min().unwrap_or(0);
    let mut fused = Vec::with_capacity(shortest);
    let mut confidence = Vec::with_capacity(shortest);
    let mut weak_positions = Vec::new();

    for pos in 0..shortest {
        let samples: Vec<f64> = aligned.iter().map(|r| r[pos]).collect();
        let (mean, std) = mean_std(&samples);
        let cv = if mean.abs() > f64::EPSILON { std / mean } else { 0.0 };

        if cv > opts.weak_bit_cv_threshold {
            weak_positions.push(pos);
        }
        confidence.push(confidence_from_cv(cv));

        let value = match opts.fusion_method {
            FusionMethod::Best => samples[0],
            FusionMethod::WeightedMean => mean,
            FusionMethod::Median => {
                let mut sorted = samples.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] }
            }
        };
        fused.push(value);
    }

    if !weak_positions.is_empty() {
        log::warn!(
            "{} of {} fused position(s) exceeded the weak-bit CV threshold ({})",
            weak_positions.len(),
            shortest,
            opts.weak_bit_cv_threshold
        );
    }

    FusedTrack { flux_ns: fused, confidence, weak_positions, alignment_quality }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_revolutions_have_full_confidence_and_no_weak_bits() {
        let rev: Vec<f64> = vec![4000.0; 200];
        let opts = DecodeOptions::default();
        let fused = fuse_revolutions(&[rev.clone(), rev.clone(), rev.clone()], &opts);

        assert!(fused.weak_positions.is_empty());
        assert!(fused.confidence.iter().all(|&c| c == CONFIDENCE_MAX));
        assert_eq!(fused.flux_ns.len(), 200);
        assert!(fused.flux_ns.iter().all(|&v| v == 4000.0));
    }

    #[test]
    fn scaled_revolution_produces_weak_bits_and_median_fusion() {
        let rev0: Vec<f64> = vec![4000.0; 200];
        let rev1: Vec<f64> = vec![4000.0; 200];
        let rev2: Vec<f64> = vec![4000.0 * 1.30; 200]; // 30% CoV-inducing noise
        let opts = DecodeOptions::default();
        let fused = fuse_revolutions(&[rev0.clone(), rev1, rev2], &opts);

        // every position sees the same 3-way spread, so every position is weak.
        assert_eq!(fused.weak_positions.len(), 200);
        assert!(fused.confidence.iter().all(|&c| c < CONFIDENCE_MAX));
        // median of {4000, 4000, 5200} is 4000 == revolution 0's value.
        assert!(fused.flux_ns.iter().all(|&v| (v - 4000.0).abs() < 1e-6));
    }

    #[test]
    fn single_revolution_gets_mid_confidence() {
        let opts = DecodeOptions::default();
        let fused = fuse_revolutions(&[vec![1000.0; 10]], &opts);
        assert!(fused.confidence.iter().all(|&c| c == 5000));
        assert!(fused.weak_positions.is_empty());
    }

    #[test]
    fn alignment_skipped_below_minimum_transitions() {
        let opts = DecodeOptions::default();
        let short_rev = vec![1000.0; 10];
        let fused = fuse_revolutions(&[short_rev.clone(), short_rev], &opts);
        assert!(fused.alignment_quality.is_none());
    }
}
