//! Artifactory Query Language (AQL) construction and validation
//!
//! [`AqlBuilder`] assembles `<domain>.find(<criteria>)` queries fluently and
//! validates its own state before emitting text. [`validate_aql_query`] is an
//! independent pre-flight check for caller-supplied query text.

mod builder;
mod validator;

pub use builder::{
    AqlBuilder, ChecksumAlgorithm, Comparison, ItemType, SortEntry, TimeField, to_aql_json,
};
pub use validator::validate_aql_query;

use thiserror::Error;

/// Domains a query may address
pub const DOMAINS: [&str; 3] = ["items", "builds", "entries"];

/// Largest accepted `limit`
pub const MAX_LIMIT: i64 = 10_000;

/// Query construction and validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Domain outside `items`, `builds`, `entries`
    #[error("invalid domain '{0}': must be one of items, builds, entries")]
    InvalidDomain(String),

    /// Negative limit
    #[error("limit must not be negative, got {0}")]
    NegativeLimit(i64),

    /// Negative offset
    #[error("offset must not be negative, got {0}")]
    NegativeOffset(i64),

    /// Limit above the maximum
    #[error("limit {limit} exceeds maximum of {max}")]
    LimitTooLarge {
        /// Requested limit
        limit: i64,
        /// Allowed maximum
        max: i64,
    },

    /// Sort field blank after trimming
    #[error("sort field must not be empty")]
    EmptySortField,

    /// Include field blank after trimming
    #[error("include field must not be empty")]
    EmptyIncludeField,

    /// Blank query text
    #[error("query is empty")]
    Empty,

    /// Text does not open with `<domain>.find(`
    #[error("query must start with items.find(, builds.find( or entries.find(")]
    MissingFind,

    /// Brackets do not pair up
    #[error("unbalanced {0}")]
    Unbalanced(String),

    /// `,,` somewhere in the text
    #[error("query contains consecutive commas")]
    DoubleComma,

    /// `{{` somewhere in the text
    #[error("query contains doubled opening braces")]
    DoubleBrace,

    /// Criteria could not be rendered as JSON
    #[error("failed to encode criteria: {0}")]
    Encoding(String),
}
