use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A cursor or node mutation was attempted outside a valid state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Unknown type, or text a serializer cannot convert.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The text is not a parsable path expression at all.
    #[error("invalid path `{path}`: {message}")]
    InvalidPath { path: String, message: String },

    /// Runtime failure while evaluating a path (unknown function, bad arity).
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    /// A reference marker points to an identity no primary declares.
    #[error("no node declares identity {0}")]
    IdNotFound(u32),
}

impl Error {
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Error::Serialization(message.into())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Error::Evaluation(message.into())
    }

    pub fn invalid_path(path: &str, message: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Wraps any error quick-xml can absorb (attribute, escape, io).
    pub(crate) fn xml(err: impl Into<quick_xml::Error>) -> Self {
        Error::Xml(err.into())
    }
}
