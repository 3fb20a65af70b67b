use crate::aggregations::agg_trait::{Agg, SubCollector};
use crate::aggregations::result::{
    AggregationValue, Hit, InternalAggregation, SortValue, TopHitsResult,
};
use crate::aggregations::tree::SubAggregations;
use crate::collector::{
    BucketOrd, CollectState, LeafBucketCollector, MaxScoreTracker, ScoreMode, SharedScorer,
};
use crate::context::{SearchContext, SegmentContext};
use crate::error::{Error, Result};
use crate::util::OrderedQueue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tantivy::collector::{Collector, SegmentCollector, TopDocs};
use tantivy::columnar::Column;
use tantivy::schema::{FieldType, OwnedValue, Schema};
use tantivy::{DateTime, DocAddress, DocId, Score, Searcher, SegmentReader, TantivyDocument};
use tracing::debug;

pub const SCORE_FIELD: &str = "_score";
pub const DOC_FIELD: &str = "_doc";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopHitsConfig {
    #[serde(default)]
    pub from: usize,
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default)]
    pub sort: Vec<SortClause>,
    /// Compute scores and the max score even when sorting by field.
    #[serde(default)]
    pub track_scores: bool,
    /// Stored fields to return. Empty means all. A trailing `*` matches a prefix.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_size() -> usize {
    3
}

impl Default for TopHitsConfig {
    fn default() -> Self {
        Self {
            from: 0,
            size: default_size(),
            sort: Vec::new(),
            track_scores: false,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortClause {
    /// `_score`, `_doc` or a numeric or date fast field.
    pub field: String,
    /// Defaults to descending for `_score` and ascending otherwise.
    #[serde(default)]
    pub order: Option<SortOrder>,
    #[serde(default)]
    pub missing: MissingValues,
}

impl SortClause {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order: Some(order),
            missing: MissingValues::default(),
        }
    }

    fn effective_order(&self) -> SortOrder {
        self.order.unwrap_or(if self.field == SCORE_FIELD {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValues {
    First,
    #[default]
    Last,
}

impl TopHitsConfig {
    /// Plain relevance ranking, which is what an empty sort or a lone `_score desc` amount to.
    fn is_field_sorted(&self) -> bool {
        match self.sort.as_slice() {
            [] => false,
            [only] => !(only.field == SCORE_FIELD && only.effective_order() == SortOrder::Desc),
            _ => true,
        }
    }

    fn needs_scores(&self) -> bool {
        !self.is_field_sorted()
            || self.track_scores
            || self.sort.iter().any(|clause| clause.field == SCORE_FIELD)
    }

    fn keeps_field(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| matches_pattern(p, name));
        included && !self.exclude.iter().any(|p| matches_pattern(p, name))
    }
}

fn matches_pattern(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Score,
    Doc,
    U64,
    I64,
    F64,
    Date,
}

#[derive(Debug, Clone)]
struct ResolvedClause {
    field: String,
    key: SortKey,
    order: SortOrder,
    missing: MissingValues,
}

fn resolve_clause(clause: &SortClause, schema: &Schema) -> Result<ResolvedClause> {
    let unsortable = || Error::Configuration(format!("field:{} not support sort", clause.field));
    let key = match clause.field.as_str() {
        "" => return Err(unsortable()),
        SCORE_FIELD => SortKey::Score,
        DOC_FIELD => SortKey::Doc,
        name => {
            let field = schema.get_field(name).map_err(|_| unsortable())?;
            let entry = schema.get_field_entry(field);
            if !entry.is_fast() {
                return Err(unsortable());
            }
            match entry.field_type() {
                FieldType::U64(_) => SortKey::U64,
                FieldType::I64(_) => SortKey::I64,
                FieldType::F64(_) => SortKey::F64,
                FieldType::Date(_) => SortKey::Date,
                _ => return Err(unsortable()),
            }
        }
    };
    Ok(ResolvedClause {
        field: clause.field.clone(),
        key,
        order: clause.effective_order(),
        missing: clause.missing,
    })
}

/// Search-wide state resolved in pre-collection.
struct TopHitsPlan {
    searcher: Searcher,
    num_hits: usize,
    clauses: Vec<ResolvedClause>,
    field_sorted: bool,
    track_scores: bool,
}

type TopDocsFruit = <TopDocs as Collector>::Fruit;
type TopDocsSegment = <TopDocs as Collector>::Child;
type HitComparator = Box<dyn Fn(&SortedHit, &SortedHit) -> Ordering>;

struct SortedHit {
    address: DocAddress,
    score: Score,
    values: Vec<SortValue>,
}

enum RankedHits {
    Scored {
        top_docs: TopDocs,
        fruits: Vec<TopDocsFruit>,
    },
    Sorted {
        queue: OrderedQueue<SortedHit, HitComparator>,
        max_score: Option<MaxScoreTracker>,
    },
}

/// Everything collected for one bucket ordinal.
struct BucketHits {
    total: u64,
    ranked: RankedHits,
}

impl BucketHits {
    fn new(plan: &TopHitsPlan) -> Self {
        let ranked = if plan.field_sorted {
            let clauses: Vec<(SortOrder, MissingValues)> =
                plan.clauses.iter().map(|c| (c.order, c.missing)).collect();
            let cmp: HitComparator = Box::new(move |a, b| compare_hits(&clauses, a, b));
            RankedHits::Sorted {
                queue: OrderedQueue::new(plan.num_hits, cmp),
                max_score: plan.track_scores.then(MaxScoreTracker::default),
            }
        } else {
            RankedHits::Scored {
                top_docs: TopDocs::with_limit(plan.num_hits),
                fruits: Vec::new(),
            }
        };
        Self { total: 0, ranked }
    }
}

/// Rank order over sorted hits: `Greater` ranks first. Earlier documents win ties.
fn compare_hits(clauses: &[(SortOrder, MissingValues)], a: &SortedHit, b: &SortedHit) -> Ordering {
    for (idx, (order, missing)) in clauses.iter().enumerate() {
        let ord = compare_values(a.values[idx], b.values[idx], *order, *missing);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    b.address.cmp(&a.address)
}

fn compare_values(a: SortValue, b: SortValue, order: SortOrder, missing: MissingValues) -> Ordering {
    let missing_rank = match missing {
        MissingValues::First => Ordering::Greater,
        MissingValues::Last => Ordering::Less,
    };
    let natural = match (a, b) {
        (SortValue::Missing, SortValue::Missing) => return Ordering::Equal,
        (SortValue::Missing, _) => return missing_rank,
        (_, SortValue::Missing) => return missing_rank.reverse(),
        (SortValue::U64(a), SortValue::U64(b)) => a.cmp(&b),
        (SortValue::I64(a), SortValue::I64(b)) => a.cmp(&b),
        (a, b) => as_f64(a).total_cmp(&as_f64(b)),
    };
    match order {
        SortOrder::Desc => natural,
        SortOrder::Asc => natural.reverse(),
    }
}

fn as_f64(value: SortValue) -> f64 {
    match value {
        SortValue::U64(v) => v as f64,
        SortValue::I64(v) => v as f64,
        SortValue::F64(v) => v,
        SortValue::Missing => f64::NAN,
    }
}

/// Keeps the best documents of every bucket it is routed.
///
/// Without a sort, hits are ranked by relevance with tantivy's `TopDocs`; with
/// a sort they go through a bounded queue keyed by the sort values.
pub struct TopHitsAggregator {
    config: TopHitsConfig,
    plan: Option<TopHitsPlan>,
    buckets: HashMap<BucketOrd, BucketHits>,
}

impl TopHitsAggregator {
    pub fn new(config: TopHitsConfig) -> Self {
        Self {
            config,
            plan: None,
            buckets: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TopHitsConfig {
        &self.config
    }

    fn plan(&self) -> Result<&TopHitsPlan> {
        self.plan.as_ref().ok_or_else(|| {
            Error::Evaluation("top_hits aggregation used before pre-collection".to_string())
        })
    }

    fn fetch_source(&self, searcher: &Searcher, address: DocAddress) -> Result<BTreeMap<String, serde_json::Value>> {
        let schema = searcher.schema();
        let wanted: Vec<_> = schema
            .fields()
            .filter(|(_, entry)| entry.is_stored() && self.config.keeps_field(entry.name()))
            .collect();
        let mut source = BTreeMap::new();
        if wanted.is_empty() {
            return Ok(source);
        }

        let doc: TantivyDocument = searcher.doc(address)?;
        for (field, entry) in wanted {
            let mut values: Vec<serde_json::Value> = doc.get_all(field).filter_map(owned_value_to_json).collect();
            let value = match values.len() {
                0 => continue,
                1 => values.remove(0),
                _ => serde_json::Value::Array(values),
            };
            source.insert(entry.name().to_string(), value);
        }
        Ok(source)
    }
}

fn owned_value_to_json(value: &OwnedValue) -> Option<serde_json::Value> {
    Some(match value {
        OwnedValue::Str(s) => serde_json::Value::String(s.clone()),
        OwnedValue::U64(n) => serde_json::Value::Number((*n).into()),
        OwnedValue::I64(n) => serde_json::Value::Number((*n).into()),
        OwnedValue::F64(n) => serde_json::Value::Number(serde_json::Number::from_f64(*n)?),
        OwnedValue::Bool(b) => serde_json::Value::Bool(*b),
        OwnedValue::Date(d) => serde_json::Value::String(
            d.into_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| d.into_utc().to_string()),
        ),
        _ => return None,
    })
}

impl Agg for TopHitsAggregator {
    fn score_mode(&self) -> ScoreMode {
        if self.config.needs_scores() {
            ScoreMode::Complete
        } else {
            ScoreMode::CompleteNoScores
        }
    }

    fn pre_collection(&mut self, name: &str, ctx: &SearchContext<'_>) -> Result<()> {
        let clauses = self
            .config
            .sort
            .iter()
            .map(|clause| resolve_clause(clause, ctx.schema()))
            .collect::<Result<Vec<_>>>()?;
        let wanted = self.config.from.saturating_add(self.config.size);
        let num_hits = wanted.min(ctx.num_docs() as usize).max(1);
        debug!(
            aggregation = name,
            num_hits,
            sort = ?clauses.iter().map(|c| c.field.as_str()).collect::<Vec<_>>(),
            "top hits planned"
        );
        self.plan = Some(TopHitsPlan {
            searcher: ctx.searcher.clone(),
            num_hits,
            clauses,
            field_sorted: self.config.is_field_sorted(),
            track_scores: self.config.track_scores,
        });
        Ok(())
    }

    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
        _sub: SubCollector<'s>,
    ) -> Result<Box<dyn LeafBucketCollector + 's>> {
        let needs_scores = self.config.needs_scores();
        let plan = self.plan.as_ref().ok_or_else(|| {
            Error::Evaluation("top_hits aggregation used before pre-collection".to_string())
        })?;
        let columns = if plan.field_sorted {
            plan.clauses
                .iter()
                .map(|clause| SortColumn::open(clause, segment.reader))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        Ok(Box::new(TopHitsLeaf {
            plan,
            buckets: &mut self.buckets,
            segment_ord: segment.segment_ord,
            reader: segment.reader.clone(),
            segment_children: HashMap::new(),
            columns,
            scorer: None,
            needs_scores,
        }))
    }

    fn build(
        &self,
        name: &str,
        owning_bucket: BucketOrd,
        subs: &mut SubAggregations<'_>,
    ) -> Result<InternalAggregation> {
        let Some(hits) = self.buckets.get(&owning_bucket) else {
            return self.build_empty(name, subs);
        };
        let plan = self.plan()?;

        let (ranked, max_score): (Vec<(Score, DocAddress, Vec<SortValue>)>, Score) = match &hits.ranked {
            RankedHits::Scored { top_docs, fruits } => {
                let merged = top_docs.merge_fruits(fruits.clone())?;
                let max_score = merged.first().map_or(Score::NAN, |(score, _)| *score);
                let ranked = merged
                    .into_iter()
                    .map(|(score, address)| (score, address, Vec::new()))
                    .collect();
                (ranked, max_score)
            }
            RankedHits::Sorted { queue, max_score } => {
                let ranked = queue
                    .ranked()
                    .into_iter()
                    .map(|hit| (hit.score, hit.address, hit.values.clone()))
                    .collect();
                let max_score = max_score
                    .as_ref()
                    .map_or(Score::NAN, MaxScoreTracker::max_score);
                (ranked, max_score)
            }
        };

        let mut page = Vec::with_capacity(self.config.size.min(ranked.len()));
        for (score, address, sort) in ranked.into_iter().skip(self.config.from).take(self.config.size) {
            page.push(Hit {
                address,
                score,
                sort,
                source: self.fetch_source(&plan.searcher, address)?,
            });
        }

        Ok(InternalAggregation::new(
            name,
            AggregationValue::TopHits(TopHitsResult {
                total: hits.total,
                max_score,
                hits: page,
            }),
        ))
    }

    fn build_empty(&self, name: &str, _subs: &mut SubAggregations<'_>) -> Result<InternalAggregation> {
        Ok(InternalAggregation::new(
            name,
            AggregationValue::TopHits(TopHitsResult::empty()),
        ))
    }

    fn accepts_sub_aggregations(&self) -> bool {
        false
    }
}

enum SortColumn {
    Score,
    Doc,
    U64(Column<u64>),
    I64(Column<i64>),
    F64(Column<f64>),
    Date(Column<DateTime>),
    Absent,
}

impl SortColumn {
    fn open(clause: &ResolvedClause, reader: &SegmentReader) -> Result<Self> {
        let fast_fields = reader.fast_fields();
        let name = clause.field.as_str();
        let column = match clause.key {
            SortKey::Score => Some(SortColumn::Score),
            SortKey::Doc => Some(SortColumn::Doc),
            SortKey::U64 => fast_fields.column_opt::<u64>(name)?.map(SortColumn::U64),
            SortKey::I64 => fast_fields.column_opt::<i64>(name)?.map(SortColumn::I64),
            SortKey::F64 => fast_fields.column_opt::<f64>(name)?.map(SortColumn::F64),
            SortKey::Date => fast_fields.column_opt::<DateTime>(name)?.map(SortColumn::Date),
        };
        Ok(column.unwrap_or(SortColumn::Absent))
    }

    fn value(&self, doc: DocId, segment_ord: u32, score: Score) -> SortValue {
        let value = match self {
            SortColumn::Score => Some(SortValue::F64(score as f64)),
            SortColumn::Doc => Some(SortValue::U64(((segment_ord as u64) << 32) | doc as u64)),
            SortColumn::U64(column) => column.first(doc).map(SortValue::U64),
            SortColumn::I64(column) => column.first(doc).map(SortValue::I64),
            SortColumn::F64(column) => column.first(doc).map(SortValue::F64),
            SortColumn::Date(column) => column
                .first(doc)
                .map(|date| SortValue::I64(date.into_timestamp_micros())),
            SortColumn::Absent => None,
        };
        value.unwrap_or(SortValue::Missing)
    }
}

struct TopHitsLeaf<'s> {
    plan: &'s TopHitsPlan,
    buckets: &'s mut HashMap<BucketOrd, BucketHits>,
    segment_ord: u32,
    reader: SegmentReader,
    // Segment collectors of the score-ranked buckets seen in this segment.
    segment_children: HashMap<BucketOrd, TopDocsSegment>,
    columns: Vec<SortColumn>,
    scorer: Option<SharedScorer>,
    needs_scores: bool,
}

impl<'s> LeafBucketCollector for TopHitsLeaf<'s> {
    fn set_scorer(&mut self, scorer: SharedScorer) {
        self.scorer = Some(scorer);
    }

    fn collect(&mut self, doc: DocId, bucket: BucketOrd) -> Result<CollectState> {
        let score = match (&self.scorer, self.needs_scores) {
            (Some(scorer), true) => scorer.score(),
            (None, true) => 0.0,
            (_, false) => Score::NAN,
        };
        let plan = self.plan;
        let hits = self
            .buckets
            .entry(bucket)
            .or_insert_with(|| BucketHits::new(plan));
        hits.total += 1;

        match &mut hits.ranked {
            RankedHits::Scored { top_docs, .. } => {
                let child = match self.segment_children.entry(bucket) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        entry.insert(top_docs.for_segment(self.segment_ord, &self.reader)?)
                    }
                };
                child.collect(doc, score);
            }
            RankedHits::Sorted { queue, max_score } => {
                if let Some(tracker) = max_score {
                    tracker.record(score);
                }
                let values = self
                    .columns
                    .iter()
                    .map(|column| column.value(doc, self.segment_ord, score))
                    .collect();
                queue.insert_with_overflow(SortedHit {
                    address: DocAddress::new(self.segment_ord, doc),
                    score,
                    values,
                });
            }
        }
        Ok(CollectState::Continue)
    }

    fn flush(&mut self) -> Result<()> {
        for (bucket, child) in self.segment_children.drain() {
            if let Some(BucketHits {
                ranked: RankedHits::Scored { fruits, .. },
                ..
            }) = self.buckets.get_mut(&bucket)
            {
                fruits.push(child.harvest());
            }
        }
        Ok(())
    }
}
