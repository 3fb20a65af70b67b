mod top_hits;

pub use top_hits::{
    MissingValues, SortClause, SortOrder, TopHitsAggregator, TopHitsConfig, DOC_FIELD, SCORE_FIELD,
};
