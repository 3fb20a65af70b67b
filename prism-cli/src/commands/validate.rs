use anyhow::{Context, Result};
use prism_aggs::aggregations::{AggregatorId, AggregatorTree};
use prism_aggs::AggregationsConfig;
use std::fmt;
use std::path::Path;
use tantivy::{Index, Searcher};
use tantivy_common::ByteCount;

/// Shape of the index a tree is validated against.
struct IndexSummary {
    segments: usize,
    docs: u64,
    size: ByteCount,
}

impl IndexSummary {
    fn from_searcher(searcher: &Searcher) -> Result<Self> {
        Ok(Self {
            segments: searcher.segment_readers().len(),
            docs: searcher.num_docs(),
            size: searcher.space_usage()?.total(),
        })
    }
}

impl fmt::Display for IndexSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Segments:           {}", self.segments)?;
        writeln!(f, "  Documents:          {}", self.docs)?;
        write!(f, "  Total size:         {}", self.size.human_readable())
    }
}

/// Build the aggregator tree for `aggs_path` against the index and print its shape
pub fn run_validate(index_path: &Path, aggs_path: &Path) -> Result<()> {
    let index = Index::open_in_dir(index_path)
        .with_context(|| format!("Failed to open index at {:?}", index_path))?;
    let config = AggregationsConfig::load(aggs_path)
        .with_context(|| format!("Failed to load aggregations from {:?}", aggs_path))?;
    let tree = AggregatorTree::from_requests(&index, &config.aggregations)
        .with_context(|| format!("Invalid aggregations in {:?}", aggs_path))?;

    let summary = IndexSummary::from_searcher(&index.reader()?.searcher())?;

    println!();
    println!("Index");
    println!("--------------------------------------------------------------------------------");
    println!("  Directory:          {:?}", index_path);
    println!("{}", summary);
    println!();
    println!("Aggregations ({} nodes)", tree.len());
    println!("--------------------------------------------------------------------------------");
    for root in tree.roots() {
        print_node(&tree, *root, 1)?;
    }
    println!();

    Ok(())
}

fn print_node(tree: &AggregatorTree, id: AggregatorId, depth: usize) -> Result<()> {
    let node = tree.node(id)?;
    println!(
        "{}{} ({})",
        "  ".repeat(depth),
        node.name(),
        node.aggregator().kind()
    );
    for child in node.children() {
        print_node(tree, *child, depth + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::doc;
    use tantivy::schema::{Schema, STORED, STRING};

    #[test]
    fn test_index_summary_counts_live_documents() {
        let mut schema_builder = Schema::builder();
        let color = schema_builder.add_text_field("color", STRING | STORED);
        let index = Index::create_in_ram(schema_builder.build());
        let mut writer = index.writer_with_num_threads(1, 50_000_000).unwrap();
        writer.add_document(doc!(color => "red")).unwrap();
        writer.add_document(doc!(color => "blue")).unwrap();
        writer.commit().unwrap();

        let summary = IndexSummary::from_searcher(&index.reader().unwrap().searcher()).unwrap();
        assert_eq!(summary.segments, 1);
        assert_eq!(summary.docs, 2);
        assert!(summary.size.get_bytes() > 0);

        let text = summary.to_string();
        assert!(text.contains("Documents:          2"));
        assert!(text.contains(&summary.size.human_readable()));
    }
}
