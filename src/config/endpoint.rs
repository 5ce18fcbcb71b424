//! Endpoint descriptors and connection string parsing
//!
//! Supports formats:
//! * postgres://[user[:password]@][host][:port][/database]
//! * postgres:///database (Unix socket, local)
//! * postgres:///database?host=/path/to/socket&port=5433 (Unix socket, custom directory)

use super::Credentials;
use crate::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default Postgres port
pub const DEFAULT_PORT: u16 = 5432;

/// Where the server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// TCP host and port
    Tcp {
        /// Host name or address
        host: String,
        /// Port
        port: u16,
    },
    /// Unix domain socket directory and port
    Unix {
        /// Socket directory
        dir: String,
        /// Port (part of the socket file name)
        port: u16,
    },
}

/// Address of the target server plus database name
///
/// Immutable once built; a [`ConnectionManager`](crate::ConnectionManager)
/// reuses the same descriptor for every reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    target: Target,
    database: String,
}

impl EndpointDescriptor {
    /// TCP endpoint
    pub fn tcp(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            target: Target::Tcp {
                host: host.into(),
                port,
            },
            database: database.into(),
        }
    }

    /// Unix socket endpoint
    pub fn unix(dir: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            target: Target::Unix {
                dir: dir.into(),
                port,
            },
            database: database.into(),
        }
    }

    /// Build from a host field as found in credential files.
    ///
    /// A host starting with `/` is a socket directory. Without an explicit
    /// `port`, a `host:port` value carries the port inline (bare IPv6
    /// addresses are left whole).
    pub fn from_host(host: &str, port: Option<u16>, database: impl Into<String>) -> Result<Self> {
        if host.starts_with('/') {
            return Ok(Self::unix(host, port.unwrap_or(DEFAULT_PORT), database));
        }

        match (port, host.split_once(':')) {
            (None, Some((name, inline))) if !inline.contains(':') => {
                let inline = inline
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid port in host {:?}", host)))?;
                Ok(Self::tcp(name, inline, database))
            }
            (port, _) => Ok(Self::tcp(host, port.unwrap_or(DEFAULT_PORT), database)),
        }
    }

    /// Parse a connection string, discarding any credentials it carries
    pub fn parse(s: &str) -> Result<Self> {
        Ok(ConnectionInfo::parse(s)?.endpoint)
    }

    /// Transport target
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Database name
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Full socket path for Unix targets
    pub fn socket_path(&self) -> Option<PathBuf> {
        match &self.target {
            Target::Unix { dir, port } => Some(construct_socket_path(dir, *port)),
            Target::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Tcp { host, port } => {
                write!(f, "postgres://{}:{}/{}", host, port, self.database)
            }
            Target::Unix { dir, port } => write!(
                f,
                "postgres:///{}?host={}&port={}",
                self.database, dir, port
            ),
        }
    }
}

/// Parsed connection string: endpoint plus credentials
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Where to connect
    pub endpoint: EndpointDescriptor,
    /// Who to connect as
    pub credentials: Credentials,
}

/// Resolve the default Unix socket directory
fn resolve_default_socket_dir() -> Option<String> {
    for dir in &["/run/postgresql", "/var/run/postgresql", "/tmp"] {
        if Path::new(dir).is_dir() {
            return Some(dir.to_string());
        }
    }
    None
}

/// Extract a query parameter value from a query string
fn parse_query_param(query_string: &str, param: &str) -> Option<String> {
    let query = query_string.trim_start_matches('?');
    if query.is_empty() {
        return None;
    }

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == param)
        .map(|(_, value)| value.to_string())
}

/// Socket file path for a directory and port
pub(crate) fn construct_socket_path(socket_dir: &str, port: u16) -> PathBuf {
    PathBuf::from(format!("{}/.s.PGSQL.{}", socket_dir, port))
}

fn reject_tls_params(query_string: &str) -> Result<()> {
    match parse_query_param(query_string, "sslmode").as_deref() {
        None | Some("disable") => Ok(()),
        Some(mode) => Err(Error::Config(format!(
            "sslmode={} is not supported; only plaintext connections are available",
            mode
        ))),
    }
}

impl ConnectionInfo {
    /// Parse connection string
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("postgres://")
            .or_else(|| s.strip_prefix("postgresql://"))
            .ok_or_else(|| {
                Error::Config("connection string must start with postgres://".into())
            })?;

        if rest.starts_with('/') {
            return Self::parse_unix(rest);
        }

        Self::parse_tcp(rest)
    }

    fn parse_unix(rest: &str) -> Result<Self> {
        let (path, query_string) = match rest.find('?') {
            Some(q_pos) => rest.split_at(q_pos),
            None => (rest, ""),
        };
        reject_tls_params(query_string)?;

        let path = path.trim_start_matches('/');
        let database = if path.is_empty() {
            whoami::username()
        } else {
            path.to_string()
        };

        let port = match parse_query_param(query_string, "port") {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("invalid port: {}", p)))?,
            None => DEFAULT_PORT,
        };

        let socket_dir = match parse_query_param(query_string, "host") {
            Some(dir) => dir,
            None => resolve_default_socket_dir().ok_or_else(|| {
                Error::Config(
                    "could not locate Unix socket directory. Set host query parameter explicitly."
                        .into(),
                )
            })?,
        };

        Ok(Self {
            endpoint: EndpointDescriptor::unix(socket_dir, port, database),
            credentials: Credentials::without_password(whoami::username()),
        })
    }

    fn parse_tcp(rest: &str) -> Result<Self> {
        // [user[:password]@]host[:port][/database][?params]
        let (auth, rest) = match rest.rfind('@') {
            Some(pos) => (Some(&rest[..pos]), &rest[pos + 1..]),
            None => (None, rest),
        };

        let credentials = match auth {
            Some(auth) => match auth.split_once(':') {
                Some((user, pass)) => Credentials::new(user, pass),
                None => Credentials::without_password(auth),
            },
            None => Credentials::without_password(whoami::username()),
        };

        let (rest, query_string) = match rest.find('?') {
            Some(q_pos) => rest.split_at(q_pos),
            None => (rest, ""),
        };
        reject_tls_params(query_string)?;

        let (host_port, database) = match rest.split_once('/') {
            Some((hp, db)) if !db.is_empty() => (hp, db.to_string()),
            Some((hp, _)) => (hp, whoami::username()),
            None => (rest, whoami::username()),
        };

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid port: {}", port)))?;
                (host, port)
            }
            None => (host_port, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(Error::Config("connection string has no host".into()));
        }

        Ok(Self {
            endpoint: EndpointDescriptor::tcp(host, port, database),
            credentials,
        })
    }
}
