use super::fs::FsError;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug)]
pub enum SearchError {
    Fs(FsError),
    InvalidRegex(regex::Error),
    /// The file changed since the match ranges were computed.
    StaleMatch(String),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::Fs(e) => write!(f, "IO error: {}", e),
            SearchError::InvalidRegex(e) => write!(f, "Invalid regex: {}", e),
            SearchError::StaleMatch(path) => write!(f, "File changed since search: {}", path),
        }
    }
}

impl std::error::Error for SearchError {}

impl From<FsError> for SearchError {
    fn from(e: FsError) -> Self {
        SearchError::Fs(e)
    }
}

impl From<regex::Error> for SearchError {
    fn from(e: regex::Error) -> Self {
        SearchError::InvalidRegex(e)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchFlags {
    pub is_regex: bool,
    pub is_whole_word: bool,
    pub is_case_sensitive: bool,
}

/// Byte offsets into the scanned source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRange {
    pub start: usize,
    pub end: usize,
}

impl MatchRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatches {
    pub path: String,
    pub source: String,
    pub ranges: Vec<MatchRange>,
}
