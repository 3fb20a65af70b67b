use super::{
    BucketCollector, BucketOrd, CollectState, LeafBucketCollector, NoOpCollector, ScoreCachingScorer,
    ScoreMode, SegmentCollection, SharedScorer,
};
use crate::context::{SearchContext, SegmentContext};
use crate::error::Result;
use tantivy::DocId;
use tracing::trace;

/// Combines sibling collectors into one.
///
/// No-op collectors are dropped and a single remaining collector is returned
/// as is. When two or more children read scores, they share a scorer that
/// computes each document's score once.
pub struct MultiBucketCollector<'a> {
    collectors: Vec<Box<dyn BucketCollector + 'a>>,
    cache_scores: bool,
}

impl<'a> MultiBucketCollector<'a> {
    pub fn wrap(collectors: Vec<Box<dyn BucketCollector + 'a>>) -> Box<dyn BucketCollector + 'a> {
        let mut collectors: Vec<_> = collectors.into_iter().filter(|c| !c.is_no_op()).collect();
        match collectors.len() {
            0 => Box::new(NoOpCollector),
            1 => collectors.remove(0),
            _ => {
                let scoring = collectors
                    .iter()
                    .filter(|c| c.score_mode().needs_scores())
                    .count();
                Box::new(MultiBucketCollector {
                    collectors,
                    cache_scores: scoring >= 2,
                })
            }
        }
    }
}

impl<'a> BucketCollector for MultiBucketCollector<'a> {
    fn score_mode(&self) -> ScoreMode {
        self.collectors
            .iter()
            .fold(ScoreMode::CompleteNoScores, |mode, c| mode.combine(c.score_mode()))
    }

    fn pre_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()> {
        for collector in &mut self.collectors {
            collector.pre_collection(ctx)?;
        }
        Ok(())
    }

    fn post_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()> {
        for collector in &mut self.collectors {
            collector.post_collection(ctx)?;
        }
        Ok(())
    }

    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
    ) -> Result<SegmentCollection<'s>> {
        let mut leaves = Vec::with_capacity(self.collectors.len());
        for collector in &mut self.collectors {
            match collector.leaf_collector(segment)? {
                SegmentCollection::Collect(leaf) => leaves.push(leaf),
                SegmentCollection::Terminated => {
                    trace!(segment = segment.segment_ord, "child skips segment");
                }
            }
        }
        Ok(match leaves.len() {
            0 => SegmentCollection::Terminated,
            1 => SegmentCollection::Collect(leaves.remove(0)),
            _ => SegmentCollection::Collect(Box::new(MultiLeafBucketCollector {
                active: leaves,
                retired: Vec::new(),
                cache_scores: self.cache_scores,
            })),
        })
    }
}

struct MultiLeafBucketCollector<'s> {
    active: Vec<Box<dyn LeafBucketCollector + 's>>,
    // Terminated leaves still get flushed at the end of the segment.
    retired: Vec<Box<dyn LeafBucketCollector + 's>>,
    cache_scores: bool,
}

impl<'s> LeafBucketCollector for MultiLeafBucketCollector<'s> {
    fn set_scorer(&mut self, scorer: SharedScorer) {
        let scorer = if self.cache_scores {
            ScoreCachingScorer::wrap(scorer)
        } else {
            scorer
        };
        for leaf in &mut self.active {
            leaf.set_scorer(scorer.clone());
        }
    }

    fn collect(&mut self, doc: DocId, bucket: BucketOrd) -> Result<CollectState> {
        let mut idx = 0;
        while idx < self.active.len() {
            match self.active[idx].collect(doc, bucket)? {
                CollectState::Continue => idx += 1,
                CollectState::Terminated => {
                    // Vec::remove keeps the remaining leaves in registration order.
                    let leaf = self.active.remove(idx);
                    self.retired.push(leaf);
                }
            }
        }
        if self.active.is_empty() {
            Ok(CollectState::Terminated)
        } else {
            Ok(CollectState::Continue)
        }
    }

    fn flush(&mut self) -> Result<()> {
        for leaf in self.active.iter_mut().chain(self.retired.iter_mut()) {
            leaf.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ManualScorer;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tantivy::query::AllQuery;
    use tantivy::schema::{Schema, STRING};
    use tantivy::{doc, Index};

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records what it sees and terminates after `limit` documents.
    struct Recorder {
        name: &'static str,
        mode: ScoreMode,
        limit: Option<usize>,
        skip_segment: bool,
        log: Log,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                mode: ScoreMode::CompleteNoScores,
                limit: None,
                skip_segment: false,
                log: log.clone(),
            }
        }

        fn scoring(mut self) -> Self {
            self.mode = ScoreMode::Complete;
            self
        }

        fn limit(mut self, limit: usize) -> Self {
            self.limit = Some(limit);
            self
        }

        fn skip_segment(mut self) -> Self {
            self.skip_segment = true;
            self
        }
    }

    struct RecordingLeaf {
        name: &'static str,
        mode: ScoreMode,
        remaining: Option<usize>,
        scorer: Option<SharedScorer>,
        log: Log,
    }

    impl BucketCollector for Recorder {
        fn score_mode(&self) -> ScoreMode {
            self.mode
        }

        fn pre_collection(&mut self, _ctx: &SearchContext<'_>) -> Result<()> {
            self.log.borrow_mut().push(format!("{}:pre", self.name));
            Ok(())
        }

        fn post_collection(&mut self, _ctx: &SearchContext<'_>) -> Result<()> {
            self.log.borrow_mut().push(format!("{}:post", self.name));
            Ok(())
        }

        fn leaf_collector<'s>(
            &'s mut self,
            _segment: &SegmentContext<'_>,
        ) -> Result<SegmentCollection<'s>> {
            if self.skip_segment {
                return Ok(SegmentCollection::Terminated);
            }
            Ok(SegmentCollection::Collect(Box::new(RecordingLeaf {
                name: self.name,
                mode: self.mode,
                remaining: self.limit,
                scorer: None,
                log: self.log.clone(),
            })))
        }
    }

    impl LeafBucketCollector for RecordingLeaf {
        fn set_scorer(&mut self, scorer: SharedScorer) {
            self.scorer = Some(scorer);
        }

        fn collect(&mut self, doc: DocId, bucket: BucketOrd) -> Result<CollectState> {
            if let (true, Some(scorer)) = (self.mode.needs_scores(), &self.scorer) {
                scorer.score();
            }
            self.log
                .borrow_mut()
                .push(format!("{}:{}@{}", self.name, doc, bucket));
            match self.remaining.as_mut() {
                Some(remaining) => {
                    *remaining -= 1;
                    if *remaining == 0 {
                        Ok(CollectState::Terminated)
                    } else {
                        Ok(CollectState::Continue)
                    }
                }
                None => Ok(CollectState::Continue),
            }
        }

        fn flush(&mut self) -> Result<()> {
            self.log.borrow_mut().push(format!("{}:flush", self.name));
            Ok(())
        }
    }

    fn with_segment<R>(f: impl FnOnce(&SegmentContext<'_>, &SearchContext<'_>) -> R) -> R {
        let mut schema_builder = Schema::builder();
        let title = schema_builder.add_text_field("title", STRING);
        let index = Index::create_in_ram(schema_builder.build());
        let mut writer: tantivy::IndexWriter = index.writer_with_num_threads(1, 50_000_000).unwrap();
        writer.add_document(doc!(title => "a")).unwrap();
        writer.commit().unwrap();
        let searcher = index.reader().unwrap().searcher();
        let segment = SegmentContext::new(0, searcher.segment_reader(0));
        let ctx = SearchContext::new(&searcher, &AllQuery, 0);
        f(&segment, &ctx)
    }

    fn segment_leaf<'s>(
        collector: &'s mut Box<dyn BucketCollector + '_>,
        segment: &SegmentContext<'_>,
    ) -> Box<dyn LeafBucketCollector + 's> {
        match collector.leaf_collector(segment).unwrap() {
            SegmentCollection::Collect(leaf) => leaf,
            SegmentCollection::Terminated => panic!("expected a leaf"),
        }
    }

    #[test]
    fn test_wrap_drops_no_ops() {
        let log = Log::default();
        let wrapped = MultiBucketCollector::wrap(vec![Box::new(NoOpCollector), Box::new(NoOpCollector)]);
        assert!(wrapped.is_no_op());

        let wrapped = MultiBucketCollector::wrap(vec![
            Box::new(NoOpCollector),
            Box::new(Recorder::new("a", &log).scoring()),
        ]);
        assert!(!wrapped.is_no_op());
        assert_eq!(wrapped.score_mode(), ScoreMode::Complete);
    }

    #[test]
    fn test_lifecycle_runs_in_registration_order() {
        let log = Log::default();
        with_segment(|segment, ctx| {
            let mut wrapped = MultiBucketCollector::wrap(vec![
                Box::new(Recorder::new("a", &log)),
                Box::new(Recorder::new("b", &log)),
            ]);
            assert_eq!(wrapped.score_mode(), ScoreMode::CompleteNoScores);
            wrapped.pre_collection(ctx).unwrap();
            {
                let mut leaf = segment_leaf(&mut wrapped, segment);
                leaf.collect(0, 7).unwrap();
                leaf.flush().unwrap();
            }
            wrapped.post_collection(ctx).unwrap();
        });
        assert_eq!(
            *log.borrow(),
            vec!["a:pre", "b:pre", "a:0@7", "b:0@7", "a:flush", "b:flush", "a:post", "b:post"]
        );
    }

    #[test]
    fn test_terminated_child_is_compacted_out() {
        let log = Log::default();
        with_segment(|segment, _ctx| {
            let mut wrapped = MultiBucketCollector::wrap(vec![
                Box::new(Recorder::new("a", &log)),
                Box::new(Recorder::new("b", &log).limit(1)),
                Box::new(Recorder::new("c", &log)),
            ]);
            let mut leaf = segment_leaf(&mut wrapped, segment);
            assert_eq!(leaf.collect(0, 0).unwrap(), CollectState::Continue);
            assert_eq!(leaf.collect(1, 0).unwrap(), CollectState::Continue);
            leaf.flush().unwrap();
        });
        assert_eq!(
            *log.borrow(),
            vec!["a:0@0", "b:0@0", "c:0@0", "a:1@0", "c:1@0", "a:flush", "c:flush", "b:flush"]
        );
    }

    #[test]
    fn test_all_children_terminated_escalates() {
        let log = Log::default();
        with_segment(|segment, _ctx| {
            let mut wrapped = MultiBucketCollector::wrap(vec![
                Box::new(Recorder::new("a", &log).limit(1)),
                Box::new(Recorder::new("b", &log).limit(2)),
            ]);
            let mut leaf = segment_leaf(&mut wrapped, segment);
            assert_eq!(leaf.collect(0, 0).unwrap(), CollectState::Continue);
            assert_eq!(leaf.collect(1, 0).unwrap(), CollectState::Terminated);
        });
    }

    #[test]
    fn test_segment_skipping_children_are_excluded() {
        let log = Log::default();
        with_segment(|segment, _ctx| {
            let mut wrapped = MultiBucketCollector::wrap(vec![
                Box::new(Recorder::new("a", &log).skip_segment()),
                Box::new(Recorder::new("b", &log)),
            ]);
            let mut leaf = segment_leaf(&mut wrapped, segment);
            leaf.collect(4, 1).unwrap();
        });
        assert_eq!(*log.borrow(), vec!["b:4@1"]);

        with_segment(|segment, _ctx| {
            let mut wrapped = MultiBucketCollector::wrap(vec![
                Box::new(Recorder::new("a", &log).skip_segment()),
                Box::new(Recorder::new("b", &log).skip_segment()),
            ]);
            assert!(matches!(
                wrapped.leaf_collector(segment).unwrap(),
                SegmentCollection::Terminated
            ));
        });
    }

    #[test]
    fn test_scores_are_cached_for_scoring_siblings() {
        let log = Log::default();
        let manual = ManualScorer::new();
        with_segment(|segment, _ctx| {
            let mut wrapped = MultiBucketCollector::wrap(vec![
                Box::new(Recorder::new("a", &log).scoring()),
                Box::new(Recorder::new("b", &log).scoring()),
                Box::new(Recorder::new("c", &log).scoring()),
            ]);
            let mut leaf = segment_leaf(&mut wrapped, segment);
            leaf.set_scorer(manual.clone());
            manual.position(0, 1.5);
            leaf.collect(0, 0).unwrap();
            manual.position(1, 2.5);
            leaf.collect(1, 0).unwrap();
        });
        assert_eq!(manual.computed.get(), 2);
    }

    #[test]
    fn test_one_scoring_child_reads_each_score_once() {
        let log = Log::default();
        let manual = ManualScorer::new();
        with_segment(|segment, _ctx| {
            let mut wrapped = MultiBucketCollector::wrap(vec![
                Box::new(Recorder::new("a", &log).scoring()),
                Box::new(Recorder::new("b", &log)),
            ]);
            assert_eq!(wrapped.score_mode(), ScoreMode::Complete);
            let mut leaf = segment_leaf(&mut wrapped, segment);
            leaf.set_scorer(manual.clone());
            leaf.collect(0, 0).unwrap();
            manual.position(1, 0.5);
            leaf.collect(1, 0).unwrap();
        });
        assert_eq!(manual.computed.get(), 2);
    }
}
