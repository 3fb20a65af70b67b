use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tantivy::Score;

/// Ranking of buckets by document count or best score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketOrder {
    CountDesc,
    CountAsc,
    ScoreDesc,
    ScoreAsc,
}

impl Default for BucketOrder {
    fn default() -> Self {
        BucketOrder::CountDesc
    }
}

impl BucketOrder {
    /// Compares two buckets by `(doc_count, max_score)`. `Greater` means `a` ranks first.
    ///
    /// A NaN score means the bucket never saw a scored hit; such buckets rank
    /// last in both score orders.
    pub fn compare(self, a: (u64, Score), b: (u64, Score)) -> Ordering {
        match self {
            BucketOrder::CountDesc => a.0.cmp(&b.0),
            BucketOrder::CountAsc => b.0.cmp(&a.0),
            BucketOrder::ScoreDesc => compare_scores(a.1, b.1, false),
            BucketOrder::ScoreAsc => compare_scores(a.1, b.1, true),
        }
    }

    pub fn needs_scores(self) -> bool {
        matches!(self, BucketOrder::ScoreDesc | BucketOrder::ScoreAsc)
    }
}

fn compare_scores(a: Score, b: Score, ascending: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) if ascending => b.total_cmp(&a),
        (false, false) => a.total_cmp(&b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_orders() {
        assert_eq!(BucketOrder::CountDesc.compare((5, 0.0), (2, 9.0)), Ordering::Greater);
        assert_eq!(BucketOrder::CountAsc.compare((5, 0.0), (2, 9.0)), Ordering::Less);
        assert_eq!(BucketOrder::CountDesc.compare((3, 1.0), (3, 2.0)), Ordering::Equal);
    }

    #[test]
    fn test_score_orders() {
        assert_eq!(BucketOrder::ScoreDesc.compare((1, 2.0), (9, 1.0)), Ordering::Greater);
        assert_eq!(BucketOrder::ScoreAsc.compare((1, 2.0), (9, 1.0)), Ordering::Less);
    }

    #[test]
    fn test_nan_scores_rank_last() {
        for order in [BucketOrder::ScoreDesc, BucketOrder::ScoreAsc] {
            assert_eq!(order.compare((1, Score::NAN), (1, 0.1)), Ordering::Less);
            assert_eq!(order.compare((1, 0.1), (1, Score::NAN)), Ordering::Greater);
            assert_eq!(order.compare((1, Score::NAN), (1, Score::NAN)), Ordering::Equal);
        }
    }

    #[test]
    fn test_serde_names() {
        let order: BucketOrder = serde_json::from_str("\"score_asc\"").unwrap();
        assert_eq!(order, BucketOrder::ScoreAsc);
        assert_eq!(BucketOrder::default(), BucketOrder::CountDesc);
    }
}
