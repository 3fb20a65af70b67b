use anyhow::{Context, Result};
use prism_aggs::aggregations::default_query_parser;
use prism_aggs::{AggregationSearcher, AggregationsConfig, AggregatorTree};
use std::path::Path;
use tantivy::query::{AllQuery, Query};
use tantivy::Index;

/// Run one search with the aggregations of `aggs_path` and print the response
pub fn run_search(
    index_path: &Path,
    aggs_path: &Path,
    query: Option<&str>,
    limit: usize,
    compact: bool,
) -> Result<()> {
    let index = Index::open_in_dir(index_path)
        .with_context(|| format!("Failed to open index at {:?}", index_path))?;
    let config = AggregationsConfig::load(aggs_path)
        .with_context(|| format!("Failed to load aggregations from {:?}", aggs_path))?;
    let mut tree = AggregatorTree::from_requests(&index, &config.aggregations)?;

    let query: Box<dyn Query> = match query {
        Some(text) => default_query_parser(&index)
            .parse_query(text)
            .with_context(|| format!("Invalid query '{}'", text))?,
        None => Box::new(AllQuery),
    };

    let searcher = AggregationSearcher::new(index.reader()?.searcher());
    let response = searcher.search(query.as_ref(), limit, &mut tree)?;
    tracing::info!(
        "{} matching documents, {} aggregations",
        response.total_hits,
        response.aggregations.len()
    );

    let output = if compact {
        serde_json::to_string(&response)?
    } else {
        serde_json::to_string_pretty(&response)?
    };
    println!("{}", output);
    Ok(())
}
