mod filters;
mod terms;

pub use filters::FiltersAggregator;
pub use terms::TermsAggregator;

use crate::aggregations::agg_trait::SubCollector;
use crate::collector::BucketOrd;
use crate::error::{Error, Result};
use std::collections::HashMap;
use tantivy::DocId;

/// Largest bucket ordinal an aggregator may allocate.
pub const MAX_BUCKET_ORD: BucketOrd = i32::MAX as BucketOrd;

/// Sparse per-ordinal document counts of one bucketing aggregator.
#[derive(Debug, Default)]
pub struct BucketDocCounts {
    counts: HashMap<BucketOrd, u64>,
}

impl BucketDocCounts {
    /// Counts `doc` in `bucket` and forwards it to the sub-aggregations.
    pub fn collect_bucket(&mut self, sub: &mut SubCollector<'_>, doc: DocId, bucket: BucketOrd) -> Result<()> {
        if bucket > MAX_BUCKET_ORD {
            return Err(Error::Capacity(bucket));
        }
        self.collect_existing_bucket(sub, doc, bucket)
    }

    /// Same as [`collect_bucket`](Self::collect_bucket) for an ordinal already known to be in range.
    pub fn collect_existing_bucket(
        &mut self,
        sub: &mut SubCollector<'_>,
        doc: DocId,
        bucket: BucketOrd,
    ) -> Result<()> {
        *self.counts.entry(bucket).or_insert(0) += 1;
        sub.collect(doc, bucket)
    }

    pub fn bucket_doc_count(&self, bucket: BucketOrd) -> u64 {
        self.counts.get(&bucket).copied().unwrap_or(0)
    }

    /// Number of ordinals that received at least one document.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
