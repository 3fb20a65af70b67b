mod agg_trait;
mod builder;
pub mod bucket;
pub mod metric;
pub mod result;
pub mod sort;
pub mod tree;
pub mod types;

pub use agg_trait::{Agg, Aggregator, SubCollector};
pub use builder::default_query_parser;
pub use bucket::{BucketDocCounts, FiltersAggregator, TermsAggregator, MAX_BUCKET_ORD};
pub use metric::{MissingValues, SortClause, SortOrder, TopHitsAggregator, TopHitsConfig};
pub use result::{
    aggregations_to_json, AggregationValue, Bucket, Hit, InternalAggregation, MultiBuckets,
    NamedAggregations, SortValue, TopHitsResult,
};
pub use sort::BucketOrder;
pub use tree::{AggregatorId, AggregatorNode, AggregatorTree, NodeCollector, SubAggregations};
pub use types::{AggregationRequest, AggregationType, AggregationsConfig, KeyedFilter};
