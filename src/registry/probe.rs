/*!
Probe scoring (`spec.md` §4.1).

A probe reports an ordered list of [`Match`]es; [`ProbeScore::finalize`]
blends them into a single `0..=100` total. The blending scheme is this
crate's concrete resolution of the spec's stated Open Question
(`DESIGN.md` records it): weights are fixed point values that sum and
saturate, with the MAGIC/HIGH-failure-implies-zero rule implemented as an
explicit override rather than emerging from the arithmetic, so it holds
exactly regardless of what else matched.
*/

/// Evidence weight classes, per `spec.md` §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Weight {
    Low,
    Medium,
    High,
    Magic,
}

impl Weight {
    /// Points contributed by one positive match of this weight. A single
    /// `Magic` positive match alone must score >= 90 (`spec.md` §4.1).
    fn points(self) -> i32 {
        match self {
            Weight::Low => 8,
            Weight::Medium => 20,
            Weight::High => 45,
            Weight::Magic => 92,
        }
    }
}

/// One piece of probe evidence.
#[derive(Debug, Clone)]
pub struct Match {
    pub field_name: String,
    pub weight: Weight,
    pub is_positive_match: bool,
    pub evidence: String,
}

impl Match {
    pub fn positive(field_name: impl Into<String>, weight: Weight, evidence: impl Into<String>) -> Self {
        Self { field_name: field_name.into(), weight, is_positive_match: true, evidence: evidence.into() }
    }

    pub fn negative(field_name: impl Into<String>, weight: Weight, evidence: impl Into<String>) -> Self {
        Self { field_name: field_name.into(), weight, is_positive_match: false, evidence: evidence.into() }
    }
}

/// Format-specific facts a probe wants to hand back to `open` without
/// re-parsing (`spec.md` §4.1's "detail union"). Kept as a small closed
/// enum rather than a trait object since every adapter in this crate only
/// needs one of a few shapes.
#[derive(Debug, Clone, Default)]
pub enum ProbeDetail {
    #[default]
    None,
    DiskType {
        type_byte: u8,
    },
    DosVariant {
        code: u8,
    },
    Geometry {
        cylinders: u16,
        heads: u8,
        sectors_per_track: u8,
        sector_size: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ProbeScore {
    pub matches: Vec<Match>,
    pub detail: ProbeDetail,
    total: i32,
}

impl ProbeScore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, m: Match) -> &mut Self {
        self.matches.push(m);
        self
    }

    pub fn with_detail(mut self, detail: ProbeDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Blend `self.matches` into a finalized `0..=100` score, and return a
    /// copy of `self` with the total fixed. Monotonic (adding a positive
    /// match never lowers the total) and saturating (never exceeds 100, per
    /// `spec.md` §8 properties 1 and 2), and a failed MAGIC or HIGH
    /// evidence check zeroes the score unless other MAGIC evidence
    /// compensates.
    pub fn finalize(mut self) -> Self {
        let mut total: i32 = 0;
        let mut magic_failed_without_compensation = false;
        let mut any_magic_positive = false;

        for m in &self.matches {
            let points = m.weight.points();
            if m.is_positive_match {
                total += points;
                if m.weight == Weight::Magic {
                    any_magic_positive = true;
                }
            }
            else {
                total -= points;
                if matches!(m.weight, Weight::Magic | Weight::High) {
                    magic_failed_without_compensation = true;
                }
            }
        }

        if magic_failed_without_compensation && !any_magic_positive {
            total = 0;
        }

        self.total = total.clamp(0, 100);
        self
    }

    pub fn total(&self) -> i32 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_magic_match_scores_at_least_90() {
        let mut score = ProbeScore::new();
        score.push(Match::positive("magic", Weight::Magic, "matched signature"));
        let score = score.finalize();
        assert!(score.total() >= 90);
    }

    #[test]
    fn score_never_exceeds_100() {
        let mut score = ProbeScore::new();
        for _ in 0..10 {
            score.push(Match::positive("field", Weight::Magic, "x"));
        }
        let score = score.finalize();
        assert_eq!(score.total(), 100);
    }

    #[test]
    fn adding_positive_match_never_decreases_total() {
        let mut base = ProbeScore::new();
        base.push(Match::positive("a", Weight::Medium, "x"));
        let base_total = base.clone().finalize().total();

        let mut more = base;
        more.push(Match::positive("b", Weight::Low, "y"));
        let more_total = more.finalize().total();

        assert!(more_total >= base_total);
    }

    #[test]
    fn adding_negative_match_never_increases_total() {
        let mut base = ProbeScore::new();
        base.push(Match::positive("a", Weight::Medium, "x"));
        let base_total = base.clone().finalize().total();

        let mut more = base;
        more.push(Match::negative("b", Weight::Low, "y"));
        let more_total = more.finalize().total();

        assert!(more_total <= base_total);
    }

    #[test]
    fn failed_high_size_check_zeroes_score_without_other_magic() {
        let mut score = ProbeScore::new();
        score.push(Match::positive("ext", Weight::Low, "extension match"));
        score.push(Match::negative("size", Weight::High, "size didn't match any known geometry"));
        assert_eq!(score.finalize().total(), 0);
    }

    #[test]
    fn failed_high_check_compensated_by_magic_survives() {
        let mut score = ProbeScore::new();
        score.push(Match::positive("signature", Weight::Magic, "matched"));
        score.push(Match::negative("size", Weight::High, "unusual size"));
        assert!(score.finalize().total() > 0);
    }
}
