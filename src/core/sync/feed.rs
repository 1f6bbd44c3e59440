//! Page cursor over a change source

use crate::adapters::source::Page;

/// Walks the pages of one entity's change sequence
///
/// The feed ends on the first page that returns fewer rows than requested.
///
/// ```
/// use fhir_inc_sync::core::sync::ChangeFeed;
///
/// let mut feed = ChangeFeed::new(100);
/// let page = feed.next_page().unwrap();
/// assert_eq!(page.offset, 0);
/// feed.advance(100);
/// assert_eq!(feed.next_page().unwrap().offset, 100);
/// feed.advance(42);
/// assert!(feed.next_page().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    next: Page,
    pages_read: usize,
    rows_read: usize,
    exhausted: bool,
}

impl ChangeFeed {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            next: Page::first(chunk_size.max(1)),
            pages_read: 0,
            rows_read: 0,
            exhausted: false,
        }
    }

    /// The page to request next, or `None` once the sequence is drained
    pub fn next_page(&self) -> Option<Page> {
        (!self.exhausted).then_some(self.next)
    }

    /// Records that the last requested page returned `rows` rows
    pub fn advance(&mut self, rows: usize) {
        self.pages_read += 1;
        self.rows_read += rows;
        if rows < self.next.limit {
            self.exhausted = true;
        } else {
            self.next = self.next.next();
        }
    }

    pub fn pages_read(&self) -> usize {
        self.pages_read
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }
}
