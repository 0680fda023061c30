//! Embedded-SQL broker URI: `sqlite3::memory:` or
//! `sqlite3://[user:pass@]/absolute/path[?opt=val...]`.
//!
//! A file-form URI carrying `mode=memory` in its query is promoted to the
//! in-memory variant with the path retained as its identifier, so sqlite's
//! named-in-memory-database convention (`file:name?mode=memory&cache=shared`)
//! round-trips without losing the name.

use std::fmt;

use url::Url;

use crate::error::BrokerUriError;

/// Which concrete sqlite database a [`SqliteUri`] addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteKind {
    /// A transient in-memory database, optionally named so multiple
    /// connections can share it (`mode=memory`).
    Memory { identifier: Option<String> },
    /// An on-disk database at an absolute path.
    File { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteUri {
    kind: SqliteKind,
    user: Option<String>,
    password: Option<String>,
    query_options: Vec<(String, String)>,
}

impl SqliteUri {
    pub fn kind(&self) -> &SqliteKind {
        &self.kind
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn query_options(&self) -> &[(String, String)] {
        &self.query_options
    }

    /// Parse `sqlite3::memory:` or `sqlite3://[user:pass@]/path[?opt=val]`.
    pub fn parse(s: &str) -> Result<Self, BrokerUriError> {
        let rest = s
            .strip_prefix("sqlite3:")
            .ok_or_else(|| BrokerUriError::UnknownScheme(scheme_prefix(s)))?;

        if let Some(tail) = rest.strip_prefix(':') {
            if tail != "memory:" {
                return Err(BrokerUriError::Malformed(
                    s.to_string(),
                    "expected ':memory:' after 'sqlite3:'".to_string(),
                ));
            }
            return Ok(Self {
                kind: SqliteKind::Memory { identifier: None },
                user: None,
                password: None,
                query_options: Vec::new(),
            });
        }

        let url = Url::parse(s).map_err(|e| BrokerUriError::Malformed(s.to_string(), e.to_string()))?;
        let path = url.path().to_string();
        if !path.starts_with('/') {
            return Err(BrokerUriError::RelativePath(s.to_string()));
        }

        let user = non_empty(url.username());
        let password = url.password().map(|p| p.to_string());
        match (&user, &password) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(BrokerUriError::IncompleteCredentials(s.to_string()))
            }
            _ => {}
        }

        let mut mode: Option<String> = None;
        let mut query_options = Vec::new();
        for (k, v) in url.query_pairs() {
            if k == "mode" {
                mode = Some(v.into_owned());
            } else {
                query_options.push((k.into_owned(), v.into_owned()));
            }
        }

        let kind = match mode.as_deref() {
            None => SqliteKind::File { path },
            Some("memory") => SqliteKind::Memory {
                identifier: Some(path),
            },
            Some(other) => return Err(BrokerUriError::UnknownMode(other.to_string())),
        };

        Ok(Self {
            kind,
            user,
            password,
            query_options,
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn scheme_prefix(s: &str) -> String {
    s.split(':').next().unwrap_or(s).to_string()
}

impl fmt::Display for SqliteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SqliteKind::Memory { identifier: None } => write!(f, "sqlite3::memory:"),
            SqliteKind::Memory {
                identifier: Some(path),
            } => {
                write!(f, "sqlite3://")?;
                write_credentials(f, &self.user, &self.password)?;
                write!(f, "{}?mode=memory", path)?;
                for (k, v) in &self.query_options {
                    write!(f, "&{}={}", k, v)?;
                }
                Ok(())
            }
            SqliteKind::File { path } => {
                write!(f, "sqlite3://")?;
                write_credentials(f, &self.user, &self.password)?;
                write!(f, "{}", path)?;
                if !self.query_options.is_empty() {
                    write!(f, "?")?;
                    for (i, (k, v)) in self.query_options.iter().enumerate() {
                        if i > 0 {
                            write!(f, "&")?;
                        }
                        write!(f, "{}={}", k, v)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn write_credentials(
    f: &mut fmt::Formatter<'_>,
    user: &Option<String>,
    password: &Option<String>,
) -> fmt::Result {
    if let (Some(user), Some(password)) = (user, password) {
        write!(f, "{}:{}@", user, password)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_memory_form() {
        let uri = SqliteUri::parse("sqlite3::memory:").unwrap();
        assert_eq!(uri.kind(), &SqliteKind::Memory { identifier: None });
    }

    #[test]
    fn round_trips_bare_memory_form() {
        let uri = SqliteUri::parse("sqlite3::memory:").unwrap();
        assert_eq!(uri.to_string(), "sqlite3::memory:");
    }

    #[test]
    fn parses_absolute_file_path() {
        let uri = SqliteUri::parse("sqlite3:///var/lib/app/queue.db").unwrap();
        assert_eq!(
            uri.kind(),
            &SqliteKind::File {
                path: "/var/lib/app/queue.db".to_string()
            }
        );
    }

    #[test]
    fn requires_triple_slash_for_host_less_absolute_path() {
        let uri = SqliteUri::parse("sqlite3:///var/lib/app/queue.db").unwrap();
        assert_eq!(uri.kind(), &SqliteKind::File { path: "/var/lib/app/queue.db".to_string() });
    }

    #[test]
    fn mode_memory_promotes_file_form_to_named_memory() {
        let uri = SqliteUri::parse("sqlite3:///shared_db?mode=memory&cache=shared").unwrap();
        assert_eq!(
            uri.kind(),
            &SqliteKind::Memory {
                identifier: Some("/shared_db".to_string())
            }
        );
        assert_eq!(uri.query_options(), &[("cache".to_string(), "shared".to_string())]);
    }

    #[test]
    fn round_trips_named_memory_form() {
        let uri = SqliteUri::parse("sqlite3:///shared_db?mode=memory").unwrap();
        let wire = uri.to_string();
        assert_eq!(SqliteUri::parse(&wire).unwrap(), uri);
    }

    #[test]
    fn round_trips_file_form_with_credentials_and_options() {
        let uri =
            SqliteUri::parse("sqlite3://reader:secret@/var/lib/app/queue.db?busy_timeout=5000")
                .unwrap();
        let wire = uri.to_string();
        assert_eq!(SqliteUri::parse(&wire).unwrap(), uri);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(matches!(
            SqliteUri::parse("sqlite3:///db?mode=wal"),
            Err(BrokerUriError::UnknownMode(_))
        ));
    }

    #[test]
    fn rejects_unpaired_credentials() {
        assert!(SqliteUri::parse("sqlite3://reader@/db").is_err());
    }
}
