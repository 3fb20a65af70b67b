use super::{BucketDocCounts, MAX_BUCKET_ORD};
use crate::aggregations::agg_trait::{Agg, SubCollector};
use crate::aggregations::result::{AggregationValue, Bucket, InternalAggregation, MultiBuckets};
use crate::aggregations::sort::BucketOrder;
use crate::aggregations::tree::SubAggregations;
use crate::collector::{BucketOrd, CollectState, LeafBucketCollector, ScoreMode, SharedScorer};
use crate::context::{SearchContext, SegmentContext};
use crate::error::{Error, Result};
use crate::util::{OrderedQueue, SequentialBits};
use tantivy::query::{EnableScoring, Query, Weight};
use tantivy::DocId;
use tracing::debug;

/// One bucket per keyed query, plus an optional bucket for documents matching none.
///
/// A document is counted in every bucket whose query it matches.
pub struct FiltersAggregator {
    keys: Vec<String>,
    queries: Vec<Box<dyn Query>>,
    other_bucket_key: Option<String>,
    order: Option<BucketOrder>,
    weights: Vec<Box<dyn Weight>>,
    counts: BucketDocCounts,
}

impl FiltersAggregator {
    pub fn new(
        filters: Vec<(String, Box<dyn Query>)>,
        other_bucket_key: Option<String>,
        order: Option<BucketOrder>,
    ) -> Self {
        let (keys, queries) = filters.into_iter().unzip();
        Self {
            keys,
            queries,
            other_bucket_key,
            order,
            weights: Vec::new(),
            counts: BucketDocCounts::default(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    fn total_buckets(&self) -> usize {
        self.keys.len() + usize::from(self.other_bucket_key.is_some())
    }

    fn key(&self, idx: usize) -> &str {
        match self.keys.get(idx) {
            Some(key) => key,
            None => self.other_bucket_key.as_deref().unwrap_or_default(),
        }
    }

    /// Ordinal of filter `idx` inside owning bucket `owning`.
    ///
    /// Fails with [`Error::Capacity`] carrying the computed ordinal, saturated
    /// at `u64::MAX`, once it passes [`MAX_BUCKET_ORD`].
    pub fn bucket_ord(owning: BucketOrd, idx: usize, total_buckets: usize) -> Result<BucketOrd> {
        let ord = owning as u128 * total_buckets as u128 + idx as u128;
        if ord > MAX_BUCKET_ORD as u128 {
            return Err(Error::Capacity(BucketOrd::try_from(ord).unwrap_or(BucketOrd::MAX)));
        }
        Ok(ord as BucketOrd)
    }
}

impl Agg for FiltersAggregator {
    fn score_mode(&self) -> ScoreMode {
        ScoreMode::CompleteNoScores
    }

    fn pre_collection(&mut self, name: &str, ctx: &SearchContext<'_>) -> Result<()> {
        let scoring = EnableScoring::disabled_from_searcher(ctx.searcher);
        self.weights = self
            .queries
            .iter()
            .map(|query| query.weight(scoring))
            .collect::<tantivy::Result<_>>()?;
        debug!(aggregation = name, filters = self.weights.len(), "filter weights ready");
        Ok(())
    }

    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
        sub: SubCollector<'s>,
    ) -> Result<Box<dyn LeafBucketCollector + 's>> {
        if self.weights.len() != self.queries.len() {
            return Err(Error::Evaluation(
                "filters aggregation visited before pre-collection".to_string(),
            ));
        }
        let max_doc = segment.reader.max_doc();
        let bits = self
            .weights
            .iter()
            .map(|weight| Ok(SequentialBits::new(weight.scorer(segment.reader, 1.0)?, max_doc)))
            .collect::<Result<Vec<_>>>()?;
        let total_buckets = self.total_buckets();
        Ok(Box::new(FiltersLeaf {
            bits,
            total_buckets,
            has_other: self.other_bucket_key.is_some(),
            counts: &mut self.counts,
            sub,
        }))
    }

    fn build(
        &self,
        name: &str,
        owning_bucket: BucketOrd,
        subs: &mut SubAggregations<'_>,
    ) -> Result<InternalAggregation> {
        let total = self.total_buckets();
        let mut buckets = Vec::with_capacity(total);
        for idx in 0..total {
            let ord = Self::bucket_ord(owning_bucket, idx, total)?;
            let bucket = Bucket::new(
                self.key(idx),
                self.counts.bucket_doc_count(ord),
                subs.bucket_aggregations(ord)?,
            );
            buckets.push((idx, bucket));
        }

        let buckets = match self.order {
            Some(order) => {
                // Declaration order breaks ties, with the other bucket last.
                let mut queue = OrderedQueue::new(total, |a: &(usize, Bucket), b: &(usize, Bucket)| {
                    order
                        .compare(
                            (a.1.doc_count(), a.1.max_score()),
                            (b.1.doc_count(), b.1.max_score()),
                        )
                        .then_with(|| b.0.cmp(&a.0))
                });
                for bucket in buckets {
                    queue.insert_with_overflow(bucket);
                }
                queue.into_ranked_vec()
            }
            None => buckets,
        };

        Ok(InternalAggregation::new(
            name,
            AggregationValue::Filters(MultiBuckets::new(
                buckets.into_iter().map(|(_, bucket)| bucket).collect(),
            )),
        ))
    }

    fn build_empty(&self, name: &str, subs: &mut SubAggregations<'_>) -> Result<InternalAggregation> {
        let mut buckets = Vec::with_capacity(self.total_buckets());
        for idx in 0..self.total_buckets() {
            buckets.push(Bucket::new(self.key(idx), 0, subs.empty_aggregations()?));
        }
        Ok(InternalAggregation::new(
            name,
            AggregationValue::Filters(MultiBuckets::new(buckets)),
        ))
    }
}

struct FiltersLeaf<'s> {
    bits: Vec<SequentialBits>,
    total_buckets: usize,
    has_other: bool,
    counts: &'s mut BucketDocCounts,
    sub: SubCollector<'s>,
}

impl<'s> LeafBucketCollector for FiltersLeaf<'s> {
    fn set_scorer(&mut self, scorer: SharedScorer) {
        self.sub.set_scorer(scorer);
    }

    fn collect(&mut self, doc: DocId, bucket: BucketOrd) -> Result<CollectState> {
        let mut matched = false;
        for (idx, bits) in self.bits.iter_mut().enumerate() {
            if bits.get(doc)? {
                let ord = FiltersAggregator::bucket_ord(bucket, idx, self.total_buckets)?;
                self.counts.collect_bucket(&mut self.sub, doc, ord)?;
                matched = true;
            }
        }
        if !matched && self.has_other {
            let ord = FiltersAggregator::bucket_ord(bucket, self.bits.len(), self.total_buckets)?;
            self.counts.collect_bucket(&mut self.sub, doc, ord)?;
        }
        Ok(CollectState::Continue)
    }

    fn flush(&mut self) -> Result<()> {
        self.sub.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_ord_layout() {
        assert_eq!(FiltersAggregator::bucket_ord(0, 2, 3).unwrap(), 2);
        assert_eq!(FiltersAggregator::bucket_ord(4, 1, 3).unwrap(), 13);
    }

    #[test]
    fn test_bucket_ord_overflow_is_capacity_error() {
        let err = FiltersAggregator::bucket_ord(u64::MAX / 2, 0, 3).unwrap_err();
        assert!(matches!(err, Error::Capacity(u64::MAX)));
    }

    #[test]
    fn test_capacity_error_reports_computed_ordinal() {
        let owning = 1 << 30;
        let err = FiltersAggregator::bucket_ord(owning, 1, 3).unwrap_err();
        assert!(matches!(err, Error::Capacity(ord) if ord == 3 * owning + 1));
        assert!(err.to_string().contains("3221225473"));

        let last = MAX_BUCKET_ORD / 3;
        assert_eq!(FiltersAggregator::bucket_ord(last, 0, 3).unwrap(), 3 * last);
    }

    #[test]
    fn test_keys_include_other_last() {
        let agg = FiltersAggregator::new(
            vec![
                ("a".to_string(), Box::new(tantivy::query::AllQuery) as Box<dyn Query>),
                ("b".to_string(), Box::new(tantivy::query::EmptyQuery) as Box<dyn Query>),
            ],
            Some("rest".to_string()),
            None,
        );
        assert_eq!(agg.keys(), &["a".to_string(), "b".to_string()]);
        assert_eq!(agg.total_buckets(), 3);
        assert_eq!(agg.key(0), "a");
        assert_eq!(agg.key(2), "rest");
    }
}
