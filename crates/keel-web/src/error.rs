//! Data-path errors for handlers.
//!
//! Route configuration mistakes (bad path shapes, conflicting trie
//! registrations) are programmer errors and panic at registration time;
//! this type covers what can legitimately go wrong while serving.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebError {
    /// The named path parameter was not captured by the matched route.
    #[error("web: path parameter {0} not found")]
    MissingParam(String),

    /// The query string has no such key.
    #[error("web: query key {0} not found")]
    MissingQuery(String),

    /// The form body has no such key.
    #[error("web: form key {0} not found")]
    MissingForm(String),

    #[error("web: body decode failed: {0}")]
    BodyDecode(String),

    #[error("web: response encode failed: {0}")]
    Encode(String),

    /// `render` was called but no engine is installed.
    #[error("web: no template engine configured")]
    NoTemplateEngine,

    #[error("web: render failed: {0}")]
    Render(String),
}
