//! Bucket-aware collection.
//!
//! A [`BucketCollector`] lives for the whole search and hands out one
//! [`LeafBucketCollector`] per segment. Leaves receive every matching document
//! together with the ordinal of the bucket it was routed to.

mod max_score;
mod multi;
mod ranked;
mod scorer;

pub use max_score::MaxScoreTracker;
pub use multi::MultiBucketCollector;
pub use ranked::RankedCollector;
pub use scorer::{Scorable, ScoreCachingScorer, SegmentScorer, SharedScorer};

#[cfg(test)]
pub(crate) use scorer::tests::ManualScorer;

use crate::context::{SearchContext, SegmentContext};
use crate::error::Result;
use tantivy::DocId;

/// Ordinal of a bucket inside one aggregator's private numbering.
pub type BucketOrd = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    /// Relevance scores are read.
    Complete,
    CompleteNoScores,
}

impl ScoreMode {
    pub fn needs_scores(self) -> bool {
        self == ScoreMode::Complete
    }

    pub fn combine(self, other: ScoreMode) -> ScoreMode {
        if self.needs_scores() || other.needs_scores() {
            ScoreMode::Complete
        } else {
            ScoreMode::CompleteNoScores
        }
    }
}

/// Outcome of visiting one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectState {
    Continue,
    /// The collector needs no further documents from this segment.
    Terminated,
}

/// Outcome of asking a collector for its segment leaf.
pub enum SegmentCollection<'s> {
    Collect(Box<dyn LeafBucketCollector + 's>),
    /// The collector has no interest in this segment.
    Terminated,
}

pub trait LeafBucketCollector {
    fn set_scorer(&mut self, _scorer: SharedScorer) {}

    fn collect(&mut self, doc: DocId, bucket: BucketOrd) -> Result<CollectState>;

    /// Called once after the last document of the segment, terminated or not.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait BucketCollector {
    fn score_mode(&self) -> ScoreMode;

    fn pre_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()>;

    fn post_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()>;

    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
    ) -> Result<SegmentCollection<'s>>;

    /// No-op collectors are dropped when siblings are combined.
    fn is_no_op(&self) -> bool {
        false
    }
}

impl<C: BucketCollector + ?Sized> BucketCollector for Box<C> {
    fn score_mode(&self) -> ScoreMode {
        (**self).score_mode()
    }

    fn pre_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()> {
        (**self).pre_collection(ctx)
    }

    fn post_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()> {
        (**self).post_collection(ctx)
    }

    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
    ) -> Result<SegmentCollection<'s>> {
        (**self).leaf_collector(segment)
    }

    fn is_no_op(&self) -> bool {
        (**self).is_no_op()
    }
}

impl<C: BucketCollector + ?Sized> BucketCollector for &mut C {
    fn score_mode(&self) -> ScoreMode {
        (**self).score_mode()
    }

    fn pre_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()> {
        (**self).pre_collection(ctx)
    }

    fn post_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()> {
        (**self).post_collection(ctx)
    }

    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
    ) -> Result<SegmentCollection<'s>> {
        (**self).leaf_collector(segment)
    }

    fn is_no_op(&self) -> bool {
        (**self).is_no_op()
    }
}

/// Collects nothing. Stands in for an aggregator without children.
pub struct NoOpCollector;

impl BucketCollector for NoOpCollector {
    fn score_mode(&self) -> ScoreMode {
        ScoreMode::CompleteNoScores
    }

    fn pre_collection(&mut self, _ctx: &SearchContext<'_>) -> Result<()> {
        Ok(())
    }

    fn post_collection(&mut self, _ctx: &SearchContext<'_>) -> Result<()> {
        Ok(())
    }

    fn leaf_collector<'s>(
        &'s mut self,
        _segment: &SegmentContext<'_>,
    ) -> Result<SegmentCollection<'s>> {
        Ok(SegmentCollection::Collect(Box::new(NoOpLeafCollector)))
    }

    fn is_no_op(&self) -> bool {
        true
    }
}

pub struct NoOpLeafCollector;

impl LeafBucketCollector for NoOpLeafCollector {
    fn collect(&mut self, _doc: DocId, _bucket: BucketOrd) -> Result<CollectState> {
        Ok(CollectState::Continue)
    }
}
