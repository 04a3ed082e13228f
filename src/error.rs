use std::path::PathBuf;
use thiserror::Error;

/// Minimum expression length the trigram tokenizer can index.
pub const MIN_EXPRESSION_CHARS: usize = 3;
/// Longest expression accepted by search commands.
pub const MAX_EXPRESSION_CHARS: usize = 200;

/// Failures of a guild store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened or initialized. The guild is skipped.
    #[error("database {} is unavailable: {reason}", path.display())]
    Unavailable { path: PathBuf, reason: String },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("blocking database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("only read-only statements are allowed")]
    NotReadOnly,
}

/// User supplied search expressions that can't reach the index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("expressions must be at least {min} characters long")]
    TooShort { min: usize },

    #[error("expressions must be at most {max} characters long")]
    TooLong { max: usize },
}

/// Failures reported by the message source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Missing permission. Archived data is kept.
    #[error("access to channel {0} is forbidden")]
    Forbidden(u64),

    /// The channel is gone. Archived data may be removed.
    #[error("channel {0} was not found")]
    NotFound(u64),

    #[error("message source error: {0}")]
    Other(String),
}

/// Failure of a backfill step: the source or the store gave up.
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    /// Message shown to the user instead of an error report.
    pub fn user_message(&self) -> String {
        match self {
            QueryError::TooShort { min } => format!(
                "🐝 I can't search expressions shorter than {} characters.",
                min
            ),
            QueryError::TooLong { max } => format!(
                "🐝 I can't search expressions longer than {} characters.",
                max
            ),
        }
    }
}

/// Validates a search expression and returns it trimmed.
pub fn validate_expression(expression: &str) -> Result<&str, QueryError> {
    let trimmed = expression.trim();
    let chars = trimmed.chars().count();
    if chars < MIN_EXPRESSION_CHARS {
        return Err(QueryError::TooShort {
            min: MIN_EXPRESSION_CHARS,
        });
    }
    if chars > MAX_EXPRESSION_CHARS {
        return Err(QueryError::TooLong {
            max: MAX_EXPRESSION_CHARS,
        });
    }
    Ok(trimmed)
}
