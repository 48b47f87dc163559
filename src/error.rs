use thiserror::Error;

use crate::construct::Tid;

#[derive(Error, Debug)]
pub enum TopikaError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Identity collision: {0}")]
    Identity(String),
    #[error("Construct {0} has been removed or never existed")]
    Removed(Tid),
    #[error("Topic {topic} is still in use as {usage}")]
    InUse { topic: Tid, usage: &'static str },
    #[error("Transaction error: {0}")]
    Transaction(String),
    #[error("Commit applied {applied} of {total} commands before failing: {message}")]
    Commit {
        applied: usize,
        total: usize,
        message: String,
    },
    #[error("Cannot coerce '{value}' into {target}")]
    Coercion { value: String, target: &'static str },
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, TopikaError>;

// Helper conversions
impl From<rusqlite::Error> for TopikaError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
