//! The typed error hierarchy shared by every module.
//!
//! Construction-time variants (`Io`, `Format`, `InconsistentTopology`,
//! `InvalidConfiguration`) are fatal: they abort `Engine::build` and are meant to reach a
//! process terminator. `UnknownTaxon` is query-time and non-fatal: callers log it and
//! keep going with whatever taxa remain known.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum TaxonomyError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed row in {file} at line {line}: {reason}")]
    Format {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("taxon {external_id} has no resolvable parent {parent_external_id}")]
    InconsistentTopology {
        external_id: i64,
        parent_external_id: i64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown taxon: {0}")]
    UnknownTaxon(i64),
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;
