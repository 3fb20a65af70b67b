//! Host search loop.
//!
//! Drives one query over every segment of a searcher, feeding matching
//! documents to the ranked collector and to the roots of an
//! [`AggregatorTree`] at the same time.

use crate::aggregations::result::NamedAggregations;
use crate::aggregations::{AggregatorTree, InternalAggregation};
use crate::collector::{
    BucketCollector, CollectState, MultiBucketCollector, RankedCollector, Scorable,
    SegmentCollection, SegmentScorer,
};
use crate::context::{SearchContext, SegmentContext};
use crate::error::Result;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::rc::Rc;
use std::time::Instant;
use tantivy::query::{EnableScoring, Query};
use tantivy::{DocAddress, Score, Searcher, TERMINATED};
use tracing::{debug, trace};

#[derive(Debug)]
pub struct SearchResponse {
    /// Live documents handed to the collectors.
    pub total_hits: u64,
    /// Best ranked documents first, empty when the search ran with limit 0.
    pub hits: Vec<(Score, DocAddress)>,
    pub aggregations: Vec<InternalAggregation>,
}

impl SearchResponse {
    pub fn aggregation(&self, name: &str) -> Option<&InternalAggregation> {
        self.aggregations.iter().find(|agg| agg.name() == name)
    }
}

#[derive(Clone)]
pub struct AggregationSearcher {
    searcher: Searcher,
}

impl AggregationSearcher {
    pub fn new(searcher: Searcher) -> Self {
        Self { searcher }
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    /// Runs `query`, keeping the `limit` best hits and collecting every root of `tree`.
    ///
    /// A tree can only be searched once; a second call fails with [`Error::Reuse`].
    ///
    /// [`Error::Reuse`]: crate::error::Error::Reuse
    pub fn search(
        &self,
        query: &dyn Query,
        limit: usize,
        tree: &mut AggregatorTree,
    ) -> Result<SearchResponse> {
        let start = Instant::now();
        let mut ranked = (limit > 0).then(RankedCollector::new);

        let total_hits = {
            let mut collectors: Vec<Box<dyn BucketCollector + '_>> = Vec::new();
            if let Some(ranked) = ranked.as_mut() {
                collectors.push(Box::new(ranked));
            }
            for collector in tree.collectors()? {
                collectors.push(Box::new(collector));
            }
            let mut composite = MultiBucketCollector::wrap(collectors);
            let ctx = SearchContext::new(&self.searcher, query, limit);
            composite.pre_collection(&ctx)?;
            let total_hits = self.collect_segments(query, &mut composite)?;
            composite.post_collection(&ctx)?;
            total_hits
        };

        let hits = match ranked {
            Some(ranked) => ranked.into_hits()?,
            None => Vec::new(),
        };
        let aggregations = tree.build_roots()?;

        debug!(
            total_hits,
            hits = hits.len(),
            aggregations = aggregations.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );
        Ok(SearchResponse {
            total_hits,
            hits,
            aggregations,
        })
    }

    fn collect_segments(
        &self,
        query: &dyn Query,
        composite: &mut Box<dyn BucketCollector + '_>,
    ) -> Result<u64> {
        let enable_scoring = if composite.score_mode().needs_scores() {
            EnableScoring::enabled_from_searcher(&self.searcher)
        } else {
            EnableScoring::disabled_from_searcher(&self.searcher)
        };
        let weight = query.weight(enable_scoring)?;

        let mut total_hits = 0u64;
        for (segment_ord, reader) in self.searcher.segment_readers().iter().enumerate() {
            let segment = SegmentContext::new(segment_ord as u32, reader);
            let mut leaf = match composite.leaf_collector(&segment)? {
                SegmentCollection::Collect(leaf) => leaf,
                SegmentCollection::Terminated => {
                    trace!(segment_ord, "Collectors skipped segment");
                    continue;
                }
            };

            let scorer = Rc::new(SegmentScorer::new(weight.scorer(reader, 1.0)?));
            leaf.set_scorer(scorer.clone());
            let alive_bitset = reader.alive_bitset();

            let mut doc = scorer.doc();
            while doc != TERMINATED {
                if alive_bitset.map_or(true, |bits| bits.is_alive(doc)) {
                    total_hits += 1;
                    if leaf.collect(doc, 0)? == CollectState::Terminated {
                        trace!(segment_ord, doc, "Collectors terminated segment early");
                        break;
                    }
                }
                doc = scorer.advance();
            }
            leaf.flush()?;
        }
        Ok(total_hits)
    }
}

struct RankedHits<'a>(&'a [(Score, DocAddress)]);

struct RankedHit<'a>(&'a (Score, DocAddress));

impl Serialize for RankedHits<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for hit in self.0 {
            seq.serialize_element(&RankedHit(hit))?;
        }
        seq.end()
    }
}

impl Serialize for RankedHit<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let (score, address) = self.0;
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("_segment", &address.segment_ord)?;
        map.serialize_entry("_doc", &address.doc_id)?;
        map.serialize_entry("_score", &(!score.is_nan()).then_some(*score))?;
        map.end()
    }
}

impl Serialize for SearchResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("total_hits", &self.total_hits)?;
        map.serialize_entry("hits", &RankedHits(&self.hits))?;
        map.serialize_entry("aggregations", &NamedAggregations(&self.aggregations))?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregations::{AggregationRequest, AggregationType};
    use crate::error::Error;
    use tantivy::doc;
    use tantivy::query::AllQuery;
    use tantivy::schema::{Schema, FAST, STORED, STRING};
    use tantivy::Index;

    fn index() -> Index {
        let mut schema_builder = Schema::builder();
        let color = schema_builder.add_text_field("color", STRING | FAST | STORED);
        let index = Index::create_in_ram(schema_builder.build());
        let mut writer = index.writer_with_num_threads(1, 50_000_000).unwrap();
        for value in ["red", "blue", "red"] {
            writer.add_document(doc!(color => value)).unwrap();
        }
        writer.commit().unwrap();
        index
    }

    #[test]
    fn test_limit_zero_skips_ranking() {
        let index = index();
        let searcher = AggregationSearcher::new(index.reader().unwrap().searcher());
        let mut tree = AggregatorTree::from_requests(
            &index,
            &[AggregationRequest::new("colors", AggregationType::terms("color"))],
        )
        .unwrap();

        let response = searcher.search(&AllQuery, 0, &mut tree).unwrap();
        assert_eq!(response.total_hits, 3);
        assert!(response.hits.is_empty());
        assert_eq!(response.aggregation("colors").unwrap().buckets().len(), 2);
    }

    #[test]
    fn test_empty_tree_only_ranks() {
        let index = index();
        let searcher = AggregationSearcher::new(index.reader().unwrap().searcher());
        let mut tree = AggregatorTree::new();

        let response = searcher.search(&AllQuery, 2, &mut tree).unwrap();
        assert_eq!(response.total_hits, 3);
        assert_eq!(response.hits.len(), 2);
        assert!(response.aggregations.is_empty());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["total_hits"], 3);
        assert_eq!(json["hits"].as_array().unwrap().len(), 2);
        assert!(json["aggregations"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_tree_is_single_use() {
        let index = index();
        let searcher = AggregationSearcher::new(index.reader().unwrap().searcher());
        let mut tree = AggregatorTree::from_requests(
            &index,
            &[AggregationRequest::new("colors", AggregationType::terms("color"))],
        )
        .unwrap();

        searcher.search(&AllQuery, 1, &mut tree).unwrap();
        let err = searcher.search(&AllQuery, 1, &mut tree).unwrap_err();
        assert!(matches!(err, Error::Reuse(_)));
    }
}
