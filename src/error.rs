//! Error taxonomy for an ingestion run.
//!
//! Upstream errors abort the run. Record and storage errors are recovered
//! per record: they are logged, counted and the run moves on.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The upstream source could not be reached after all allowed attempts,
    /// or answered with a terminal client error.
    #[error("upstream unavailable at {url}: {reason}")]
    UpstreamUnavailable { url: String, reason: String },

    /// A page body did not have the expected shape.
    #[error("upstream returned a malformed page at {url}: {reason}")]
    UpstreamMalformed { url: String, reason: String },

    /// A single raw record could not be cleaned.
    #[error("invalid record{}: field '{field}' {reason}", display_name(.name))]
    InvalidRecord {
        field: &'static str,
        name: Option<String>,
        reason: String,
    },

    /// A uniqueness constraint fired while writing an entity.
    #[error("storage conflict on {entity} '{name}': {source}")]
    StorageConflict {
        entity: &'static str,
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

fn display_name(name: &Option<String>) -> String {
    match name {
        Some(n) => format!(" '{}'", n),
        None => String::new(),
    }
}

impl IngestError {
    /// Fatal errors abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::UpstreamUnavailable { .. } | IngestError::UpstreamMalformed { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::UpstreamUnavailable { .. } => "UpstreamUnavailable",
            IngestError::UpstreamMalformed { .. } => "UpstreamMalformed",
            IngestError::InvalidRecord { .. } => "InvalidRecord",
            IngestError::StorageConflict { .. } => "StorageConflict",
            IngestError::Storage(_) => "Storage",
        }
    }

    pub(crate) fn invalid(
        field: &'static str,
        name: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        IngestError::InvalidRecord {
            field,
            name: name.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// Wrap a storage error, turning constraint violations into
    /// `StorageConflict` for the given entity.
    pub(crate) fn from_storage(entity: &'static str, name: &str, err: rusqlite::Error) -> Self {
        if is_constraint_violation(&err) {
            IngestError::StorageConflict {
                entity,
                name: name.to_string(),
                source: err,
            }
        } else {
            IngestError::Storage(err)
        }
    }
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
