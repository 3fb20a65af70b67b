use tantivy::Score;

/// Running maximum of the scores seen, NaN until the first one.
#[derive(Debug, Clone, Copy)]
pub struct MaxScoreTracker {
    max: Score,
}

impl Default for MaxScoreTracker {
    fn default() -> Self {
        Self { max: Score::NAN }
    }
}

impl MaxScoreTracker {
    pub fn record(&mut self, score: Score) {
        if self.max.is_nan() || score > self.max {
            self.max = score;
        }
    }

    pub fn max_score(&self) -> Score {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_nan() {
        assert!(MaxScoreTracker::default().max_score().is_nan());
    }

    #[test]
    fn test_keeps_maximum() {
        let mut tracker = MaxScoreTracker::default();
        for score in [0.3, 1.7, 0.9] {
            tracker.record(score);
        }
        assert_eq!(tracker.max_score(), 1.7);
    }
}
