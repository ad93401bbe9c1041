use std::fmt;

/// Failure categories, mapped onto HTTP statuses and Elasticsearch error
/// types by the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    IllegalArgument,
    InvalidName,
    IndexNotFound,
    NotFound,
    AlreadyExists,
    LimitExceeded,
    VersionConflict,
    Unauthorized,
    Forbidden,
    BodyTooLarge,
    RateLimitExceeded,
    Timeout,
    MetadataNotFound,
    UnsupportedStorageType,
    UnsupportedOperation,
    InvalidState,
    Internal,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
    pub index: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context, index: None }
    }

    pub fn with_index(mut self, index: &str) -> Self {
        self.index = Some(index.to_string());
        self
    }

    pub fn illegal_argument(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::IllegalArgument, context.into())
    }

    pub fn invalid_name(name: &str, reason: &str) -> Self {
        Error::new(ErrorKind::InvalidName, format!("Invalid index name [{}], {}", name, reason))
    }

    pub fn index_not_found(name: &str) -> Self {
        Error::new(ErrorKind::IndexNotFound, format!("no such index [{}]", name)).with_index(name)
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context.into())
    }

    pub fn already_exists(name: &str) -> Self {
        Error::new(
            ErrorKind::AlreadyExists,
            format!("index [{}] already exists", name),
        )
        .with_index(name)
    }

    pub fn version_conflict(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::VersionConflict, context.into())
    }

    pub fn timeout(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Timeout, context.into())
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, context.into())
    }

    /// HTTP status code for this error kind.
    pub fn http_status(&self) -> u16 {
        match self.kind {
            ErrorKind::IllegalArgument
            | ErrorKind::InvalidName
            | ErrorKind::AlreadyExists
            | ErrorKind::LimitExceeded
            | ErrorKind::UnsupportedStorageType
            | ErrorKind::UnsupportedOperation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::IndexNotFound | ErrorKind::NotFound | ErrorKind::MetadataNotFound => 404,
            ErrorKind::VersionConflict => 409,
            ErrorKind::BodyTooLarge => 413,
            ErrorKind::RateLimitExceeded => 429,
            ErrorKind::Timeout => 503,
            ErrorKind::Io
            | ErrorKind::Parse
            | ErrorKind::InvalidState
            | ErrorKind::Internal => 500,
        }
    }

    /// Elasticsearch-compatible error type string.
    pub fn es_type(&self) -> &'static str {
        match self.kind {
            ErrorKind::IllegalArgument => "illegal_argument_exception",
            ErrorKind::InvalidName => "invalid_name",
            ErrorKind::IndexNotFound => "index_not_found_exception",
            ErrorKind::NotFound | ErrorKind::MetadataNotFound => "not_found",
            ErrorKind::AlreadyExists => "resource_already_exists_exception",
            ErrorKind::LimitExceeded => "limit_exceeded",
            ErrorKind::VersionConflict => "version_conflict_engine_exception",
            ErrorKind::Unauthorized | ErrorKind::Forbidden => "security_exception",
            ErrorKind::BodyTooLarge => "body_too_large",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::Timeout => "request_timeout",
            ErrorKind::UnsupportedStorageType => "unsupported_storage_type",
            ErrorKind::UnsupportedOperation => "unsupported_operation",
            ErrorKind::Io
            | ErrorKind::Parse
            | ErrorKind::InvalidState
            | ErrorKind::Internal => "internal_server_error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.es_type(), self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::new(ErrorKind::Parse, err.to_string())
    }
}

impl From<fst::Error> for Error {
    fn from(err: fst::Error) -> Self {
        Error::new(ErrorKind::Internal, format!("FST error: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Parse, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::illegal_argument("x").http_status(), 400);
        assert_eq!(Error::index_not_found("books").http_status(), 404);
        assert_eq!(Error::version_conflict("x").http_status(), 409);
        assert_eq!(Error::timeout("x").http_status(), 503);
        assert_eq!(Error::internal("x").http_status(), 500);
    }

    #[test]
    fn test_es_type() {
        assert_eq!(Error::index_not_found("a").es_type(), "index_not_found_exception");
        assert_eq!(
            Error::version_conflict("a").es_type(),
            "version_conflict_engine_exception"
        );
        assert_eq!(Error::invalid_name("!b", "must be lowercase").es_type(), "invalid_name");
    }
}
