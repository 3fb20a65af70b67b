use tantivy::query::Query;
use tantivy::schema::Schema;
use tantivy::{Searcher, SegmentReader};

/// Search-wide state handed to every collector's pre and post collection hooks.
pub struct SearchContext<'a> {
    pub searcher: &'a Searcher,
    pub query: &'a dyn Query,
    /// Number of hits the host's top-level ranked collector keeps, 0 when hits are not ranked.
    pub ranked_limit: usize,
}

impl<'a> SearchContext<'a> {
    pub fn new(searcher: &'a Searcher, query: &'a dyn Query, ranked_limit: usize) -> Self {
        Self {
            searcher,
            query,
            ranked_limit,
        }
    }

    /// Field configuration of the searched index.
    pub fn schema(&self) -> &Schema {
        self.searcher.schema()
    }

    pub fn num_docs(&self) -> u64 {
        self.searcher.num_docs()
    }
}

/// The segment currently being visited.
#[derive(Clone, Copy)]
pub struct SegmentContext<'r> {
    pub segment_ord: u32,
    pub reader: &'r SegmentReader,
}

impl<'r> SegmentContext<'r> {
    pub fn new(segment_ord: u32, reader: &'r SegmentReader) -> Self {
        Self {
            segment_ord,
            reader,
        }
    }
}
