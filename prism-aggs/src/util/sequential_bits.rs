use crate::error::{Error, Result};
use tantivy::query::Scorer;
use tantivy::{DocId, DocSet, TERMINATED};

/// Forward-only membership test over a segment scorer.
///
/// Documents must be checked in non-decreasing order. Checking the same document
/// twice returns the cached answer without touching the scorer.
pub struct SequentialBits {
    scorer: Box<dyn Scorer>,
    max_doc: DocId,
    previous: Option<(DocId, bool)>,
}

impl SequentialBits {
    pub fn new(scorer: Box<dyn Scorer>, max_doc: DocId) -> Self {
        Self {
            scorer,
            max_doc,
            previous: None,
        }
    }

    pub fn get(&mut self, doc: DocId) -> Result<bool> {
        if doc >= self.max_doc {
            return Err(Error::Evaluation(format!(
                "doc {} is out of bounds, segment has {} docs",
                doc, self.max_doc
            )));
        }
        if let Some((previous, matched)) = self.previous {
            if doc == previous {
                return Ok(matched);
            }
            if doc < previous {
                return Err(Error::Evaluation(format!(
                    "membership must be checked in order, got doc {} after doc {}",
                    doc, previous
                )));
            }
        }

        let mut current = self.scorer.doc();
        if current != TERMINATED && current < doc {
            current = self.scorer.seek(doc);
        }
        let matched = current == doc;
        self.previous = Some((doc, matched));
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::query::{AllQuery, EnableScoring, Query, TermQuery};
    use tantivy::schema::{IndexRecordOption, Schema, STRING};
    use tantivy::{doc, Index, IndexWriter, Term};

    fn bits_for(colors: &[&str], wanted: &str) -> SequentialBits {
        let mut schema_builder = Schema::builder();
        let color = schema_builder.add_text_field("color", STRING);
        let index = Index::create_in_ram(schema_builder.build());
        let mut writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000).unwrap();
        for value in colors {
            writer.add_document(doc!(color => *value)).unwrap();
        }
        writer.commit().unwrap();

        let searcher = index.reader().unwrap().searcher();
        let query = TermQuery::new(
            Term::from_field_text(color, wanted),
            IndexRecordOption::Basic,
        );
        let weight = query
            .weight(EnableScoring::disabled_from_searcher(&searcher))
            .unwrap();
        let reader = searcher.segment_reader(0);
        SequentialBits::new(weight.scorer(reader, 1.0).unwrap(), reader.max_doc())
    }

    #[test]
    fn test_checks_in_order() {
        let mut bits = bits_for(&["red", "blue", "red", "green"], "red");
        assert!(bits.get(0).unwrap());
        assert!(!bits.get(1).unwrap());
        assert!(bits.get(2).unwrap());
        assert!(!bits.get(3).unwrap());
    }

    #[test]
    fn test_skipping_documents() {
        let mut bits = bits_for(&["red", "blue", "red", "green", "red"], "red");
        assert!(!bits.get(1).unwrap());
        assert!(bits.get(4).unwrap());
    }

    #[test]
    fn test_repeated_check_is_cached() {
        let mut bits = bits_for(&["blue", "red"], "red");
        assert!(bits.get(1).unwrap());
        assert!(bits.get(1).unwrap());
    }

    #[test]
    fn test_backwards_check_fails() {
        let mut bits = bits_for(&["red", "red", "red"], "red");
        bits.get(2).unwrap();
        let err = bits.get(0).unwrap_err();
        assert!(err.is_evaluation());
    }

    #[test]
    fn test_out_of_bounds_check_fails() {
        let mut bits = bits_for(&["red"], "red");
        assert!(matches!(bits.get(1), Err(Error::Evaluation(_))));
    }

    #[test]
    fn test_all_query_matches_everything() {
        let mut schema_builder = Schema::builder();
        let color = schema_builder.add_text_field("color", STRING);
        let index = Index::create_in_ram(schema_builder.build());
        let mut writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000).unwrap();
        writer.add_document(doc!(color => "a")).unwrap();
        writer.add_document(doc!(color => "b")).unwrap();
        writer.commit().unwrap();
        let searcher = index.reader().unwrap().searcher();
        let weight = AllQuery
            .weight(EnableScoring::disabled_from_searcher(&searcher))
            .unwrap();
        let reader = searcher.segment_reader(0);
        let mut bits = SequentialBits::new(weight.scorer(reader, 1.0).unwrap(), reader.max_doc());
        assert!(bits.get(0).unwrap());
        assert!(bits.get(1).unwrap());
    }
}
