use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tantivy::query::Scorer;
use tantivy::{DocId, DocSet, Score};

/// Read access to the document currently being visited and its relevance score.
pub trait Scorable {
    fn doc(&self) -> DocId;
    fn score(&self) -> Score;
}

/// A scorer shared by every leaf collector of one segment.
pub type SharedScorer = Rc<dyn Scorable>;

/// Host-side adapter over a tantivy segment scorer.
///
/// The host advances it; leaf collectors only read from it.
pub struct SegmentScorer {
    inner: RefCell<Box<dyn Scorer>>,
}

impl SegmentScorer {
    pub fn new(scorer: Box<dyn Scorer>) -> Self {
        Self {
            inner: RefCell::new(scorer),
        }
    }

    pub fn advance(&self) -> DocId {
        self.inner.borrow_mut().advance()
    }
}

impl Scorable for SegmentScorer {
    fn doc(&self) -> DocId {
        self.inner.borrow().doc()
    }

    fn score(&self) -> Score {
        self.inner.borrow_mut().score()
    }
}

/// Computes the wrapped score at most once per document.
pub struct ScoreCachingScorer {
    inner: SharedScorer,
    cached: Cell<Option<(DocId, Score)>>,
}

impl ScoreCachingScorer {
    pub fn wrap(inner: SharedScorer) -> SharedScorer {
        Rc::new(Self {
            inner,
            cached: Cell::new(None),
        })
    }
}

impl Scorable for ScoreCachingScorer {
    fn doc(&self) -> DocId {
        self.inner.doc()
    }

    fn score(&self) -> Score {
        let doc = self.inner.doc();
        if let Some((cached_doc, score)) = self.cached.get() {
            if cached_doc == doc {
                return score;
            }
        }
        let score = self.inner.score();
        self.cached.set(Some((doc, score)));
        score
    }
}
