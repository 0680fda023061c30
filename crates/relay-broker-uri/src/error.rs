//! Error taxonomy for URI parsing and resource/report key parsing.

use thiserror::Error;

/// `BadURI` from the error taxonomy: malformed connection URIs, fatal at the
/// call site (propagated from `init`/`parse` as a `SetupFailure`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerUriError {
    #[error("unrecognized scheme '{0}', expected amqp, amqps, or sqlite3")]
    UnknownScheme(String),

    #[error("malformed URI '{0}': {1}")]
    Malformed(String, String),

    #[error("username given without a password (or vice versa) in '{0}'")]
    IncompleteCredentials(String),

    #[error("sqlite3 file URI must use an absolute path, got '{0}'")]
    RelativePath(String),

    #[error("unrecognized mode '{0}', only 'memory' is supported")]
    UnknownMode(String),

    #[error("port '{0}' is not a valid port number")]
    InvalidPort(String),
}

/// `BadURI` for the smaller resource-key / report-key wire formats.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("resource key '{0}' must have 2 or 3 colon-separated parts")]
    BadResourceKeyArity(String),

    #[error("report key '{0}' must have 2 to 4 colon-separated parts")]
    BadReportKeyArity(String),

    #[error("key part '{0}' is empty")]
    EmptyPart(String),
}
