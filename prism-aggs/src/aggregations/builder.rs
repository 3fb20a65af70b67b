use crate::aggregations::agg_trait::Aggregator;
use crate::aggregations::bucket::{FiltersAggregator, TermsAggregator};
use crate::aggregations::metric::{TopHitsAggregator, TopHitsConfig};
use crate::aggregations::tree::{AggregatorId, AggregatorTree};
use crate::aggregations::types::{AggregationRequest, AggregationType, KeyedFilter};
use crate::error::{Error, Result};
use std::collections::HashSet;
use tantivy::query::QueryParser;
use tantivy::schema::FieldType;
use tantivy::Index;

impl AggregationType {
    pub fn terms(field: impl Into<String>) -> AggregationType {
        AggregationType::Terms {
            field: field.into(),
            size: None,
            order: None,
        }
    }

    pub fn terms_with_size(field: impl Into<String>, size: usize) -> AggregationType {
        AggregationType::Terms {
            field: field.into(),
            size: Some(size),
            order: None,
        }
    }

    pub fn filters<K, Q>(filters: impl IntoIterator<Item = (K, Q)>) -> AggregationType
    where
        K: Into<String>,
        Q: Into<String>,
    {
        AggregationType::Filters {
            filters: filters
                .into_iter()
                .map(|(key, query)| KeyedFilter {
                    key: key.into(),
                    query: query.into(),
                })
                .collect(),
            other_bucket_key: None,
            order: None,
        }
    }

    pub fn filters_with_other<K, Q>(
        filters: impl IntoIterator<Item = (K, Q)>,
        other_bucket_key: impl Into<String>,
    ) -> AggregationType
    where
        K: Into<String>,
        Q: Into<String>,
    {
        match Self::filters(filters) {
            AggregationType::Filters { filters, order, .. } => AggregationType::Filters {
                filters,
                other_bucket_key: Some(other_bucket_key.into()),
                order,
            },
            other => other,
        }
    }

    pub fn top_hits(size: usize) -> AggregationType {
        AggregationType::TopHits(TopHitsConfig {
            size,
            ..Default::default()
        })
    }
}

impl AggregationRequest {
    pub fn new(name: impl Into<String>, agg_type: AggregationType) -> Self {
        Self {
            name: name.into(),
            agg_type,
            aggs: Vec::new(),
        }
    }

    pub fn with_sub_aggregation(mut self, sub: AggregationRequest) -> Self {
        self.aggs.push(sub);
        self
    }
}

/// Query parser for filter and search queries. Unqualified terms search every indexed string field.
pub fn default_query_parser(index: &Index) -> QueryParser {
    let schema = index.schema();
    let default_fields = schema
        .fields()
        .filter(|(_, entry)| entry.is_indexed() && matches!(entry.field_type(), FieldType::Str(_)))
        .map(|(field, _)| field)
        .collect();
    QueryParser::for_index(index, default_fields)
}

impl AggregatorTree {
    /// Validates `requests` and builds a fresh tree for one search over `index`.
    pub fn from_requests(index: &Index, requests: &[AggregationRequest]) -> Result<AggregatorTree> {
        let parser = default_query_parser(index);

        let mut tree = AggregatorTree::new();
        for request in requests {
            add_request(&mut tree, &parser, None, request)?;
        }
        Ok(tree)
    }
}

fn add_request(
    tree: &mut AggregatorTree,
    parser: &QueryParser,
    parent: Option<AggregatorId>,
    request: &AggregationRequest,
) -> Result<()> {
    let aggregator = build_aggregator(parser, request)?;
    let id = match parent {
        None => tree.add_root(request.name.as_str(), aggregator)?,
        Some(parent) => tree.add_child(parent, request.name.as_str(), aggregator)?,
    };
    for sub in &request.aggs {
        add_request(tree, parser, Some(id), sub)?;
    }
    Ok(())
}

fn build_aggregator(parser: &QueryParser, request: &AggregationRequest) -> Result<Aggregator> {
    let name = request.name.as_str();
    if name.trim().is_empty() {
        return Err(Error::Configuration("aggregation name must not be empty".to_string()));
    }

    let aggregator = match &request.agg_type {
        AggregationType::Filters {
            filters,
            other_bucket_key,
            order,
        } => {
            if filters.is_empty() {
                return Err(Error::Configuration(format!(
                    "filters aggregation '{}' needs at least one filter",
                    name
                )));
            }
            let mut seen = HashSet::new();
            let mut parsed = Vec::with_capacity(filters.len());
            for filter in filters {
                if !seen.insert(filter.key.as_str()) {
                    return Err(Error::Configuration(format!(
                        "filters aggregation '{}' has duplicate key '{}'",
                        name, filter.key
                    )));
                }
                let query = parser.parse_query(&filter.query).map_err(|err| {
                    Error::InvalidQuery(format!("filter '{}' of '{}': {}", filter.key, name, err))
                })?;
                parsed.push((filter.key.clone(), query));
            }
            if let Some(other) = other_bucket_key {
                if seen.contains(other.as_str()) {
                    return Err(Error::Configuration(format!(
                        "filters aggregation '{}': other bucket key '{}' is also a filter key",
                        name, other
                    )));
                }
            }
            Aggregator::from(FiltersAggregator::new(parsed, other_bucket_key.clone(), *order))
        }
        AggregationType::Terms { field, size, order } => {
            if field.is_empty() {
                return Err(Error::Configuration(format!(
                    "terms aggregation '{}' needs a field",
                    name
                )));
            }
            Aggregator::from(TermsAggregator::new(
                field.as_str(),
                *size,
                order.unwrap_or_default(),
            ))
        }
        AggregationType::TopHits(config) => {
            if let Some(clause) = config.sort.iter().find(|clause| clause.field.is_empty()) {
                return Err(Error::Configuration(format!(
                    "top_hits aggregation '{}' has a sort clause without field: {:?}",
                    name, clause
                )));
            }
            Aggregator::from(TopHitsAggregator::new(config.clone()))
        }
    };
    Ok(aggregator)
}
