//! Materialized aggregation results.
//!
//! Results are immutable once built. Max scores are computed on first read and
//! memoized.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};
use tantivy::{DocAddress, Score};

#[derive(Debug)]
pub struct InternalAggregation {
    name: String,
    value: AggregationValue,
    max_score: OnceCell<Score>,
}

#[derive(Debug)]
pub enum AggregationValue {
    Filters(MultiBuckets),
    Terms {
        buckets: MultiBuckets,
        /// Documents that had no value for the field.
        other_doc_count: u64,
        /// Number of distinct values seen, including those cut from the page.
        bucket_count: u64,
    },
    TopHits(TopHitsResult),
}

#[derive(Debug, Default)]
pub struct MultiBuckets {
    buckets: Vec<Bucket>,
    by_key: OnceCell<HashMap<String, usize>>,
}

#[derive(Debug)]
pub struct Bucket {
    key: String,
    doc_count: u64,
    aggregations: Vec<InternalAggregation>,
    max_score: OnceCell<Score>,
}

#[derive(Debug)]
pub struct TopHitsResult {
    /// Documents routed to the bucket.
    pub total: u64,
    pub max_score: Score,
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub address: DocAddress,
    /// NaN when scores were not tracked.
    pub score: Score,
    pub sort: Vec<SortValue>,
    pub source: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SortValue {
    U64(u64),
    I64(i64),
    F64(f64),
    Missing,
}

/// Maximum over the non-NaN scores, NaN when there are none.
pub fn max_ignoring_nan(scores: impl IntoIterator<Item = Score>) -> Score {
    scores
        .into_iter()
        .filter(|s| !s.is_nan())
        .fold(Score::NAN, |max, s| if max.is_nan() || s > max { s } else { max })
}

impl InternalAggregation {
    pub fn new(name: impl Into<String>, value: AggregationValue) -> Self {
        Self {
            name: name.into(),
            value,
            max_score: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &AggregationValue {
        &self.value
    }

    pub fn max_score(&self) -> Score {
        *self.max_score.get_or_init(|| match &self.value {
            AggregationValue::Filters(buckets) | AggregationValue::Terms { buckets, .. } => {
                max_ignoring_nan(buckets.iter().map(Bucket::max_score))
            }
            AggregationValue::TopHits(top_hits) => top_hits.max_score,
        })
    }

    /// Buckets in result order, empty for metric aggregations.
    pub fn buckets(&self) -> &[Bucket] {
        match &self.value {
            AggregationValue::Filters(buckets) | AggregationValue::Terms { buckets, .. } => {
                buckets.as_slice()
            }
            AggregationValue::TopHits(_) => &[],
        }
    }

    pub fn bucket_by_key(&self, key: &str) -> Option<&Bucket> {
        match &self.value {
            AggregationValue::Filters(buckets) | AggregationValue::Terms { buckets, .. } => {
                buckets.by_key(key)
            }
            AggregationValue::TopHits(_) => None,
        }
    }

    pub fn top_hits(&self) -> Option<&TopHitsResult> {
        match &self.value {
            AggregationValue::TopHits(top_hits) => Some(top_hits),
            _ => None,
        }
    }
}

impl MultiBuckets {
    pub fn new(buckets: Vec<Bucket>) -> Self {
        Self {
            buckets,
            by_key: OnceCell::new(),
        }
    }

    pub fn as_slice(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bucket> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn by_key(&self, key: &str) -> Option<&Bucket> {
        let index = self.by_key.get_or_init(|| {
            self.buckets
                .iter()
                .enumerate()
                .map(|(idx, bucket)| (bucket.key.clone(), idx))
                .collect()
        });
        index.get(key).map(|&idx| &self.buckets[idx])
    }
}

impl Bucket {
    pub fn new(key: impl Into<String>, doc_count: u64, aggregations: Vec<InternalAggregation>) -> Self {
        Self {
            key: key.into(),
            doc_count,
            aggregations,
            max_score: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }

    pub fn aggregations(&self) -> &[InternalAggregation] {
        &self.aggregations
    }

    pub fn aggregation(&self, name: &str) -> Option<&InternalAggregation> {
        self.aggregations.iter().find(|agg| agg.name == name)
    }

    /// Best score among the bucket's sub-aggregations, NaN if none saw a scored hit.
    pub fn max_score(&self) -> Score {
        *self
            .max_score
            .get_or_init(|| max_ignoring_nan(self.aggregations.iter().map(InternalAggregation::max_score)))
    }
}

impl TopHitsResult {
    pub fn empty() -> Self {
        Self {
            total: 0,
            max_score: Score::NAN,
            hits: Vec::new(),
        }
    }
}

fn finite(score: Score) -> Option<Score> {
    if score.is_nan() {
        None
    } else {
        Some(score)
    }
}

/// Serializes a list of results as a JSON object keyed by aggregation name.
pub struct NamedAggregations<'a>(pub &'a [InternalAggregation]);

impl Serialize for NamedAggregations<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for agg in self.0 {
            map.serialize_entry(&agg.name, agg)?;
        }
        map.end()
    }
}

pub fn aggregations_to_json(aggregations: &[InternalAggregation]) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(NamedAggregations(aggregations))
}

impl Serialize for InternalAggregation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match &self.value {
            AggregationValue::Filters(buckets) => {
                map.serialize_entry("buckets", &BucketList(buckets))?;
            }
            AggregationValue::Terms {
                buckets,
                other_doc_count,
                bucket_count,
            } => {
                map.serialize_entry("bucket_count", bucket_count)?;
                map.serialize_entry("sum_other_doc_count", other_doc_count)?;
                map.serialize_entry("buckets", &BucketList(buckets))?;
            }
            AggregationValue::TopHits(top_hits) => {
                map.serialize_entry("hits", top_hits)?;
            }
        }
        map.end()
    }
}

struct BucketList<'a>(&'a MultiBuckets);

impl Serialize for BucketList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for bucket in self.0.iter() {
            seq.serialize_element(bucket)?;
        }
        seq.end()
    }
}

impl Serialize for Bucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.aggregations.len()))?;
        map.serialize_entry("key", &self.key)?;
        map.serialize_entry("doc_count", &self.doc_count)?;
        for agg in &self.aggregations {
            map.serialize_entry(&agg.name, agg)?;
        }
        map.end()
    }
}

impl Serialize for TopHitsResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("total", &self.total)?;
        map.serialize_entry("max_score", &finite(self.max_score))?;
        map.serialize_entry("hits", &self.hits)?;
        map.end()
    }
}

impl Serialize for Hit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("_segment", &self.address.segment_ord)?;
        map.serialize_entry("_doc", &self.address.doc_id)?;
        map.serialize_entry("_score", &finite(self.score))?;
        if !self.sort.is_empty() {
            map.serialize_entry("sort", &self.sort)?;
        }
        map.serialize_entry("_source", &self.source)?;
        map.end()
    }
}
