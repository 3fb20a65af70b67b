use crate::aggregations::metric::TopHitsConfig;
use crate::aggregations::sort::BucketOrder;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    pub name: String,
    #[serde(flatten)]
    pub agg_type: AggregationType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggs: Vec<AggregationRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationType {
    Filters {
        filters: Vec<KeyedFilter>,
        #[serde(default)]
        other_bucket_key: Option<String>,
        #[serde(default)]
        order: Option<BucketOrder>,
    },
    Terms {
        field: String,
        #[serde(default)]
        size: Option<usize>,
        #[serde(default)]
        order: Option<BucketOrder>,
    },
    TopHits(TopHitsConfig),
}

/// A filter bucket: its key and a query in the index's query syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedFilter {
    pub key: String,
    pub query: String,
}

/// A file or document holding the aggregations of one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationsConfig {
    #[serde(default)]
    pub aggregations: Vec<AggregationRequest>,
}

impl AggregationsConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Loads a `.yaml`/`.yml`, `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(Error::Configuration(format!(
                "unsupported aggregation file {:?}, expected .yaml, .toml or .json",
                path
            ))),
        }
    }
}
