use super::BucketDocCounts;
use crate::aggregations::agg_trait::{Agg, SubCollector};
use crate::aggregations::result::{AggregationValue, Bucket, InternalAggregation, MultiBuckets};
use crate::aggregations::sort::BucketOrder;
use crate::aggregations::tree::SubAggregations;
use crate::collector::{BucketOrd, CollectState, LeafBucketCollector, ScoreMode, SharedScorer};
use crate::context::{SearchContext, SegmentContext};
use crate::error::{Error, Result};
use crate::util::OrderedQueue;
use std::collections::HashMap;
use tantivy::columnar::StrColumn;
use tantivy::schema::FieldType;
use tantivy::{DocId, Score};
use tracing::warn;

/// One bucket per distinct value of a string fast field.
pub struct TermsAggregator {
    field: String,
    size: Option<usize>,
    order: BucketOrder,
    state: TermsState,
    counts: BucketDocCounts,
}

#[derive(Default)]
struct TermsState {
    by_owning: HashMap<BucketOrd, OwningTerms>,
    /// Ordinals are handed out in first-seen order across all owning buckets.
    next_ord: BucketOrd,
}

#[derive(Default)]
struct OwningTerms {
    ordinals: HashMap<String, BucketOrd>,
    /// Documents without any value for the field.
    other_doc_count: u64,
}

impl TermsAggregator {
    /// `size` bounds the number of returned buckets, `None` returns all of them.
    pub fn new(field: impl Into<String>, size: Option<usize>, order: BucketOrder) -> Self {
        Self {
            field: field.into(),
            size,
            order,
            state: TermsState::default(),
            counts: BucketDocCounts::default(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    fn rank(order: BucketOrder, a: (BucketOrd, u64, Score), b: (BucketOrd, u64, Score)) -> std::cmp::Ordering {
        // Earlier ordinals win ties.
        order
            .compare((a.1, a.2), (b.1, b.2))
            .then_with(|| b.0.cmp(&a.0))
    }
}

impl Agg for TermsAggregator {
    fn score_mode(&self) -> ScoreMode {
        ScoreMode::CompleteNoScores
    }

    fn pre_collection(&mut self, name: &str, ctx: &SearchContext<'_>) -> Result<()> {
        let schema = ctx.schema();
        let field = schema.get_field(&self.field).map_err(|_| {
            Error::Configuration(format!(
                "terms aggregation '{}': unknown field '{}'",
                name, self.field
            ))
        })?;
        let entry = schema.get_field_entry(field);
        if !matches!(entry.field_type(), FieldType::Str(_)) || !entry.is_fast() {
            return Err(Error::Configuration(format!(
                "terms aggregation '{}': field '{}' must be a fast string field",
                name, self.field
            )));
        }
        Ok(())
    }

    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
        sub: SubCollector<'s>,
    ) -> Result<Box<dyn LeafBucketCollector + 's>> {
        let column = segment.reader.fast_fields().str(&self.field)?;
        if column.is_none() {
            warn!(field = %self.field, segment = segment.segment_ord, "terms field has no column in segment");
        }
        Ok(Box::new(TermsLeaf {
            column,
            ords: Vec::new(),
            value: String::new(),
            state: &mut self.state,
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
        let Some(terms) = self.state.by_owning.get(&owning_bucket) else {
            return self.build_empty(name, subs);
        };
        let capacity = self.size.unwrap_or(terms.ordinals.len());
        let order = self.order;

        let buckets = if order.needs_scores() {
            // Scores come from the sub-aggregations, so every bucket is materialized before ranking.
            let mut queue = OrderedQueue::new(capacity, |a: &(BucketOrd, Bucket), b: &(BucketOrd, Bucket)| {
                Self::rank(
                    order,
                    (a.0, a.1.doc_count(), a.1.max_score()),
                    (b.0, b.1.doc_count(), b.1.max_score()),
                )
            });
            for (key, &ord) in &terms.ordinals {
                let bucket = Bucket::new(
                    key.as_str(),
                    self.counts.bucket_doc_count(ord),
                    subs.bucket_aggregations(ord)?,
                );
                queue.insert_with_overflow((ord, bucket));
            }
            queue
                .into_ranked_vec()
                .into_iter()
                .map(|(_, bucket)| bucket)
                .collect()
        } else {
            // Only the buckets that make the page get their sub-aggregations built.
            let keys: Vec<(&str, BucketOrd)> = terms
                .ordinals
                .iter()
                .map(|(key, &ord)| (key.as_str(), ord))
                .collect();
            let mut queue = OrderedQueue::new(capacity, |a: &(BucketOrd, u64, usize), b: &(BucketOrd, u64, usize)| {
                Self::rank(order, (a.0, a.1, Score::NAN), (b.0, b.1, Score::NAN))
            });
            for (idx, &(_, ord)) in keys.iter().enumerate() {
                queue.insert_with_overflow((ord, self.counts.bucket_doc_count(ord), idx));
            }
            let mut buckets = Vec::with_capacity(queue.len());
            for (ord, doc_count, idx) in queue.into_ranked_vec() {
                buckets.push(Bucket::new(keys[idx].0, doc_count, subs.bucket_aggregations(ord)?));
            }
            buckets
        };

        Ok(InternalAggregation::new(
            name,
            AggregationValue::Terms {
                buckets: MultiBuckets::new(buckets),
                other_doc_count: terms.other_doc_count,
                bucket_count: terms.ordinals.len() as u64,
            },
        ))
    }

    fn build_empty(&self, name: &str, _subs: &mut SubAggregations<'_>) -> Result<InternalAggregation> {
        Ok(InternalAggregation::new(
            name,
            AggregationValue::Terms {
                buckets: MultiBuckets::default(),
                other_doc_count: 0,
                bucket_count: 0,
            },
        ))
    }
}

struct TermsLeaf<'s> {
    column: Option<StrColumn>,
    ords: Vec<u64>,
    value: String,
    state: &'s mut TermsState,
    counts: &'s mut BucketDocCounts,
    sub: SubCollector<'s>,
}

impl<'s> LeafBucketCollector for TermsLeaf<'s> {
    fn set_scorer(&mut self, scorer: SharedScorer) {
        self.sub.set_scorer(scorer);
    }

    fn collect(&mut self, doc: DocId, bucket: BucketOrd) -> Result<CollectState> {
        self.ords.clear();
        if let Some(column) = &self.column {
            self.ords.extend(column.term_ords(doc));
        }
        let terms = self.state.by_owning.entry(bucket).or_default();
        if self.ords.is_empty() {
            terms.other_doc_count += 1;
            return Ok(CollectState::Continue);
        }

        // Term ordinals follow the dictionary order, so equal values are adjacent once sorted.
        self.ords.sort_unstable();
        self.ords.dedup();

        let Some(column) = &self.column else {
            return Ok(CollectState::Continue);
        };
        for &term_ord in &self.ords {
            self.value.clear();
            if !column.ord_to_str(term_ord, &mut self.value)? {
                return Err(Error::Evaluation(format!(
                    "term ordinal {} is missing from the dictionary",
                    term_ord
                )));
            }
            match terms.ordinals.get(self.value.as_str()) {
                Some(&ord) => self.counts.collect_existing_bucket(&mut self.sub, doc, ord)?,
                None => {
                    let ord = self.state.next_ord;
                    self.state.next_ord += 1;
                    terms.ordinals.insert(self.value.clone(), ord);
                    self.counts.collect_bucket(&mut self.sub, doc, ord)?;
                }
            }
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
    use std::cmp::Ordering;

    #[test]
    fn test_new_keeps_field() {
        let agg = TermsAggregator::new("color", Some(2), BucketOrder::CountAsc);
        assert_eq!(agg.field(), "color");
        assert!(agg.state.by_owning.is_empty());
    }

    #[test]
    fn test_rank_breaks_ties_on_first_seen_ordinal() {
        let order = BucketOrder::CountDesc;
        assert_eq!(TermsAggregator::rank(order, (0, 3, 0.0), (1, 3, 0.0)), Ordering::Greater);
        assert_eq!(TermsAggregator::rank(order, (5, 1, 0.0), (1, 3, 0.0)), Ordering::Less);

        // Buckets without a scored hit fall behind, then keep first-seen order.
        let order = BucketOrder::ScoreDesc;
        assert_eq!(TermsAggregator::rank(order, (4, 1, 0.5), (0, 9, Score::NAN)), Ordering::Greater);
        assert_eq!(
            TermsAggregator::rank(order, (2, 1, Score::NAN), (3, 1, Score::NAN)),
            Ordering::Greater
        );
    }
}
