pub mod aggregations;
pub mod collector;
pub mod context;
pub mod error;
pub mod search;
pub mod util;

pub use aggregations::{AggregationRequest, AggregationType, AggregationsConfig, AggregatorTree};
pub use error::{Error, Result};
pub use search::{AggregationSearcher, SearchResponse};
