//! Errors raised while compiling path templates.

use thiserror::Error;

/// Error returned by [`PathPattern::compile`](crate::PathPattern::compile).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The same parameter name appears twice in one template.
    #[error("duplicate path parameter ':{name}' in template '{template}'")]
    DuplicateParam {
        /// The repeated parameter name.
        name: String,
        /// The offending template.
        template: String,
    },

    /// The generated expression was rejected by the regex engine.
    #[error("invalid path template '{template}': {message}")]
    Invalid {
        /// The offending template.
        template: String,
        /// Message from the regex engine.
        message: String,
    },
}
