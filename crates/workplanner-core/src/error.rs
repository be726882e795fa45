use crate::view::ViewName;

/// Failure reading from the relational store.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// A view read failed (connection lost, view missing, bad row shape).
    #[error("view `{view}` unavailable: {message}")]
    Unavailable { view: ViewName, message: String },
    /// A non-view query failed.
    #[error("{query} failed: {message}")]
    Query {
        query: &'static str,
        message: String,
    },
    /// The store could not be opened at all.
    #[error("store connection failed: {0}")]
    Connection(String),
}
