//! Context carried through a single page extraction

/// Which page is being parsed, for log lines and dropped-row reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseContext {
    pub page_number: u32,
    pub url: String,
}

impl ParseContext {
    pub fn new(page_number: u32, url: impl Into<String>) -> Self {
        Self {
            page_number,
            url: url.into(),
        }
    }
}

/// A row left out of the extraction and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRow {
    pub row_index: usize,
    pub reason: super::ParsingError,
}

/// Records pulled from one page plus the rows that were dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction<T> {
    pub records: Vec<T>,
    pub dropped: Vec<DroppedRow>,
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            dropped: Vec::new(),
        }
    }
}

impl<T> Extraction<T> {
    pub(crate) fn drop_row(&mut self, row_index: usize, reason: super::ParsingError) {
        self.dropped.push(DroppedRow { row_index, reason });
    }
}
