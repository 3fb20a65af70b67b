use super::{
    BucketCollector, BucketOrd, CollectState, LeafBucketCollector, ScoreMode, SegmentCollection,
    SharedScorer,
};
use crate::context::{SearchContext, SegmentContext};
use crate::error::{Error, Result};
use tantivy::collector::{Collector, SegmentCollector, TopDocs};
use tantivy::{DocAddress, DocId, Score};

type TopDocsFruit = <TopDocs as Collector>::Fruit;
type TopDocsSegment = <TopDocs as Collector>::Child;

/// The host's top-level ranked collector, composed with the aggregators as one
/// more sibling.
///
/// Keeps the [`SearchContext::ranked_limit`] best hits of the search it is
/// prepared for.
#[derive(Default)]
pub struct RankedCollector {
    top_docs: Option<TopDocs>,
    fruits: Vec<TopDocsFruit>,
    total_hits: u64,
}

impl RankedCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    /// Merges the per-segment results, best hit first.
    pub fn into_hits(self) -> Result<Vec<(Score, DocAddress)>> {
        match self.top_docs {
            Some(top_docs) => Ok(top_docs.merge_fruits(self.fruits)?),
            None => Ok(Vec::new()),
        }
    }
}

impl BucketCollector for RankedCollector {
    fn score_mode(&self) -> ScoreMode {
        ScoreMode::Complete
    }

    fn pre_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()> {
        if ctx.ranked_limit == 0 {
            return Err(Error::Configuration(
                "ranked collector needs a limit of at least 1".to_string(),
            ));
        }
        self.top_docs = Some(TopDocs::with_limit(ctx.ranked_limit));
        self.fruits.clear();
        self.total_hits = 0;
        Ok(())
    }

    fn post_collection(&mut self, _ctx: &SearchContext<'_>) -> Result<()> {
        Ok(())
    }

    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
    ) -> Result<SegmentCollection<'s>> {
        let top_docs = self.top_docs.as_ref().ok_or_else(|| {
            Error::Evaluation("ranked collector used before pre-collection".to_string())
        })?;
        let child = top_docs.for_segment(segment.segment_ord, segment.reader)?;
        Ok(SegmentCollection::Collect(Box::new(RankedLeaf {
            child: Some(child),
            scorer: None,
            fruits: &mut self.fruits,
            total_hits: &mut self.total_hits,
        })))
    }
}

struct RankedLeaf<'s> {
    child: Option<TopDocsSegment>,
    scorer: Option<SharedScorer>,
    fruits: &'s mut Vec<TopDocsFruit>,
    total_hits: &'s mut u64,
}

impl<'s> LeafBucketCollector for RankedLeaf<'s> {
    fn set_scorer(&mut self, scorer: SharedScorer) {
        self.scorer = Some(scorer);
    }

    fn collect(&mut self, doc: DocId, _bucket: BucketOrd) -> Result<CollectState> {
        let score = self.scorer.as_ref().map_or(0.0, |s| s.score());
        if let Some(child) = self.child.as_mut() {
            child.collect(doc, score);
        }
        *self.total_hits += 1;
        Ok(CollectState::Continue)
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(child) = self.child.take() {
            self.fruits.push(child.harvest());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::doc;
    use tantivy::query::AllQuery;
    use tantivy::schema::{Schema, STRING};
    use tantivy::Index;

    fn index(docs: usize) -> Index {
        let mut schema_builder = Schema::builder();
        let color = schema_builder.add_text_field("color", STRING);
        let index = Index::create_in_ram(schema_builder.build());
        let mut writer = index.writer_with_num_threads(1, 50_000_000).unwrap();
        for _ in 0..docs {
            writer.add_document(doc!(color => "red")).unwrap();
        }
        writer.commit().unwrap();
        index
    }

    #[test]
    fn test_limit_comes_from_search_context() {
        let index = index(4);
        let searcher = index.reader().unwrap().searcher();
        let mut ranked = RankedCollector::new();
        ranked
            .pre_collection(&SearchContext::new(&searcher, &AllQuery, 3))
            .unwrap();

        let segment = SegmentContext::new(0, searcher.segment_reader(0));
        {
            let SegmentCollection::Collect(mut leaf) = ranked.leaf_collector(&segment).unwrap() else {
                panic!("ranked collector skipped the segment");
            };
            for doc in 0..4 {
                assert_eq!(leaf.collect(doc, 0).unwrap(), CollectState::Continue);
            }
            leaf.flush().unwrap();
        }

        assert_eq!(ranked.total_hits(), 4);
        let hits = ranked.into_hits().unwrap();
        let docs: Vec<DocId> = hits.iter().map(|(_, address)| address.doc_id).collect();
        assert_eq!(docs, vec![0, 1, 2]);
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let index = index(1);
        let searcher = index.reader().unwrap().searcher();
        let mut ranked = RankedCollector::new();
        let err = ranked
            .pre_collection(&SearchContext::new(&searcher, &AllQuery, 0))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_unprepared_collector_has_no_leaf() {
        let index = index(1);
        let searcher = index.reader().unwrap().searcher();
        let mut ranked = RankedCollector::new();
        let segment = SegmentContext::new(0, searcher.segment_reader(0));
        assert!(matches!(ranked.leaf_collector(&segment), Err(Error::Evaluation(_))));
        assert!(RankedCollector::new().into_hits().unwrap().is_empty());
    }
}
