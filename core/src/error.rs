use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("can't find backup {namespace}/{name}")]
    BackupNotFound { namespace: String, name: String },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Status update for backup {name} failed: {reason}")]
    StatusUpdate { name: String, reason: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid storage descriptor: {0}")]
    InvalidStorage(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Aggregate(AggregateError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A set of errors reported as one failure.
///
/// Never empty: [`AggregateError::new`] returns `None` when there is nothing
/// to report.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<Error>,
}

impl AggregateError {
    pub fn new(errors: Vec<Error>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    /// Collects the failures out of a list of results, dropping successes.
    pub fn from_results<I>(results: I) -> Option<Self>
    where
        I: IntoIterator<Item = Result<()>>,
    {
        Self::new(results.into_iter().filter_map(|r| r.err()).collect())
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut messages: Vec<String> = Vec::with_capacity(self.errors.len());
        for err in &self.errors {
            let msg = err.to_string();
            if !messages.contains(&msg) {
                messages.push(msg);
            }
        }

        if messages.len() == 1 {
            write!(f, "{}", messages[0])
        } else {
            write!(f, "[{}]", messages.join(", "))
        }
    }
}

impl std::error::Error for AggregateError {}

impl From<AggregateError> for Error {
    fn from(err: AggregateError) -> Self {
        Error::Aggregate(err)
    }
}
