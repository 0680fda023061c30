//! Broker connection URI parsing plus the resource/report key wire formats
//! used throughout the listener runtime for resource-level locking and
//! scheduled-task parameters.

mod amqp;
mod error;
mod report_key;
mod resource_key;
mod sqlite;

pub use amqp::{AmqpScheme, AmqpUri};
pub use error::{BrokerUriError, KeyParseError};
pub use report_key::ReportKey;
pub use resource_key::ResourceKey;
pub use sqlite::{SqliteKind, SqliteUri};

use std::fmt;

/// Any broker connection URI this runtime understands, dispatched on scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerUri {
    Amqp(AmqpUri),
    Sqlite(SqliteUri),
}

impl BrokerUri {
    /// Parse a broker URI by inspecting its scheme prefix:
    /// `amqp:`/`amqps:` dispatch to [`AmqpUri`], `sqlite3:` to [`SqliteUri`].
    pub fn parse(s: &str) -> Result<Self, BrokerUriError> {
        let scheme = s
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .unwrap_or(s);
        match scheme {
            "amqp" | "amqps" => AmqpUri::parse(s).map(BrokerUri::Amqp),
            "sqlite3" => SqliteUri::parse(s).map(BrokerUri::Sqlite),
            other => Err(BrokerUriError::UnknownScheme(other.to_string())),
        }
    }

    pub fn as_amqp(&self) -> Option<&AmqpUri> {
        match self {
            BrokerUri::Amqp(uri) => Some(uri),
            BrokerUri::Sqlite(_) => None,
        }
    }

    pub fn as_sqlite(&self) -> Option<&SqliteUri> {
        match self {
            BrokerUri::Sqlite(uri) => Some(uri),
            BrokerUri::Amqp(_) => None,
        }
    }
}

impl fmt::Display for BrokerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerUri::Amqp(uri) => uri.fmt(f),
            BrokerUri::Sqlite(uri) => uri.fmt(f),
        }
    }
}
