use crate::config::QualityBands;

/// Length-banded heuristic for how much detail a case description carries.
///
/// Step function of character count: below `min_length` → 0.1, then 0.3, 0.5,
/// and 1.0 from `min_good_length` on. Non-decreasing in length.
pub struct QualityGate {
    bands: QualityBands,
    /// Threshold on the 0-10 scale.
    min_acceptable_score: f64,
}

impl QualityGate {
    pub fn new(bands: QualityBands, min_acceptable_score: f64) -> Self {
        Self {
            bands,
            min_acceptable_score,
        }
    }

    /// Quality score in [0, 1].
    pub fn score(&self, text: &str) -> f64 {
        let len = text.chars().count();
        if len < self.bands.min_length {
            0.1
        } else if len < self.bands.min_acceptable_length {
            0.3
        } else if len < self.bands.min_good_length {
            0.5
        } else {
            1.0
        }
    }

    /// True when the score (scaled to 0-10) falls short of the acceptance bar.
    pub fn is_low(&self, score: f64) -> bool {
        score * 10.0 < self.min_acceptable_score
    }
}
