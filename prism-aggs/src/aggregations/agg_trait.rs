use crate::aggregations::bucket::{FiltersAggregator, TermsAggregator};
use crate::aggregations::metric::TopHitsAggregator;
use crate::aggregations::result::InternalAggregation;
use crate::aggregations::tree::SubAggregations;
use crate::collector::{BucketOrd, CollectState, LeafBucketCollector, ScoreMode, SharedScorer};
use crate::context::{SearchContext, SegmentContext};
use crate::error::Result;
use tantivy::DocId;
use tracing::trace;

/// Capabilities every aggregator variant provides to the tree.
pub trait Agg {
    /// Whether this aggregator itself reads scores. Children are accounted for by the tree.
    fn score_mode(&self) -> ScoreMode;

    fn pre_collection(&mut self, name: &str, ctx: &SearchContext<'_>) -> Result<()>;

    fn post_collection(&mut self, _name: &str, _ctx: &SearchContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Builds the segment leaf. Documents this aggregator routes to its own
    /// buckets are forwarded to `sub`.
    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
        sub: SubCollector<'s>,
    ) -> Result<Box<dyn LeafBucketCollector + 's>>;

    /// Materializes the result for one owning bucket.
    fn build(
        &self,
        name: &str,
        owning_bucket: BucketOrd,
        subs: &mut SubAggregations<'_>,
    ) -> Result<InternalAggregation>;

    /// The result of an aggregator that never saw a document.
    fn build_empty(&self, name: &str, subs: &mut SubAggregations<'_>) -> Result<InternalAggregation>;

    fn accepts_sub_aggregations(&self) -> bool {
        true
    }
}

pub enum Aggregator {
    Filters(FiltersAggregator),
    Terms(TermsAggregator),
    TopHits(TopHitsAggregator),
}

impl Aggregator {
    pub fn kind(&self) -> &'static str {
        match self {
            Aggregator::Filters(_) => "filters",
            Aggregator::Terms(_) => "terms",
            Aggregator::TopHits(_) => "top_hits",
        }
    }

    fn inner(&self) -> &dyn Agg {
        match self {
            Aggregator::Filters(agg) => agg,
            Aggregator::Terms(agg) => agg,
            Aggregator::TopHits(agg) => agg,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Agg {
        match self {
            Aggregator::Filters(agg) => agg,
            Aggregator::Terms(agg) => agg,
            Aggregator::TopHits(agg) => agg,
        }
    }
}

impl Agg for Aggregator {
    fn score_mode(&self) -> ScoreMode {
        self.inner().score_mode()
    }

    fn pre_collection(&mut self, name: &str, ctx: &SearchContext<'_>) -> Result<()> {
        self.inner_mut().pre_collection(name, ctx)
    }

    fn post_collection(&mut self, name: &str, ctx: &SearchContext<'_>) -> Result<()> {
        self.inner_mut().post_collection(name, ctx)
    }

    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
        sub: SubCollector<'s>,
    ) -> Result<Box<dyn LeafBucketCollector + 's>> {
        match self {
            Aggregator::Filters(agg) => agg.leaf_collector(segment, sub),
            Aggregator::Terms(agg) => agg.leaf_collector(segment, sub),
            Aggregator::TopHits(agg) => agg.leaf_collector(segment, sub),
        }
    }

    fn build(
        &self,
        name: &str,
        owning_bucket: BucketOrd,
        subs: &mut SubAggregations<'_>,
    ) -> Result<InternalAggregation> {
        self.inner().build(name, owning_bucket, subs)
    }

    fn build_empty(&self, name: &str, subs: &mut SubAggregations<'_>) -> Result<InternalAggregation> {
        self.inner().build_empty(name, subs)
    }

    fn accepts_sub_aggregations(&self) -> bool {
        self.inner().accepts_sub_aggregations()
    }
}

impl From<FiltersAggregator> for Aggregator {
    fn from(agg: FiltersAggregator) -> Self {
        Aggregator::Filters(agg)
    }
}

impl From<TermsAggregator> for Aggregator {
    fn from(agg: TermsAggregator) -> Self {
        Aggregator::Terms(agg)
    }
}

impl From<TopHitsAggregator> for Aggregator {
    fn from(agg: TopHitsAggregator) -> Self {
        Aggregator::TopHits(agg)
    }
}

/// The leaf of an aggregator's children, as seen by the aggregator.
///
/// Once the children report termination the aggregator keeps counting its own
/// buckets and stops forwarding.
pub struct SubCollector<'s> {
    leaf: Box<dyn LeafBucketCollector + 's>,
    terminated: bool,
}

impl<'s> SubCollector<'s> {
    pub fn new(leaf: Box<dyn LeafBucketCollector + 's>) -> Self {
        Self {
            leaf,
            terminated: false,
        }
    }

    pub fn set_scorer(&mut self, scorer: SharedScorer) {
        self.leaf.set_scorer(scorer);
    }

    pub fn collect(&mut self, doc: DocId, bucket: BucketOrd) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        if self.leaf.collect(doc, bucket)? == CollectState::Terminated {
            trace!(doc, bucket, "sub-aggregations terminated");
            self.terminated = true;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.leaf.flush()
    }
}
