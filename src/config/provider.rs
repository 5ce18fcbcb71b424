//! Credential providers
//!
//! A provider maps a logical database key (e.g. `"analytics"`) to the
//! host, database and login of the server behind it. The YAML provider uses
//! two files: `environment.yml` maps each key to an entry name and
//! `database.yml` holds the entries themselves.
//!
//! ```yaml
//! # environment.yml
//! analytics: analytics_production
//!
//! # database.yml
//! analytics_production:
//!   host: db1.internal
//!   port: 5432
//!   database: analytics
//!   username: reporter
//!   password: secret
//! ```

use super::{Credentials, EndpointDescriptor};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default environment file, relative to the working directory
pub const DEFAULT_ENVIRONMENT_FILE: &str = "config/environment.yml";

/// Default database file, relative to the working directory
pub const DEFAULT_DATABASE_FILE: &str = "config/database.yml";

/// Connection details for one database entry
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Host name, or Unix socket directory when it starts with `/`
    pub host: String,
    /// Port (defaults to 5432)
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name
    pub database: String,
    /// Login user
    pub username: String,
    /// Login password
    #[serde(default)]
    pub password: Option<String>,
}

impl DatabaseInfo {
    /// Split into the endpoint and credentials a manager is built from
    ///
    /// Fails when the host carries an inline port that is not a number.
    pub fn into_parts(self) -> Result<(EndpointDescriptor, Credentials)> {
        let endpoint = EndpointDescriptor::from_host(&self.host, self.port, self.database)?;
        let credentials = match self.password {
            Some(password) => Credentials::new(self.username, password),
            None => Credentials::without_password(self.username),
        };
        Ok((endpoint, credentials))
    }
}

impl fmt::Debug for DatabaseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Resolves a logical database key to connection details
pub trait CredentialProvider {
    /// Look up `key`. Missing or malformed entries are configuration errors.
    fn resolve(&self, key: &str) -> Result<DatabaseInfo>;
}

/// In-memory provider
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    entries: HashMap<String, DatabaseInfo>,
}

impl StaticCredentialProvider {
    /// Empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `info` under `key`
    pub fn with_entry(mut self, key: impl Into<String>, info: DatabaseInfo) -> Self {
        self.entries.insert(key.into(), info);
        self
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn resolve(&self, key: &str) -> Result<DatabaseInfo> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no database configured for key {:?}", key)))
    }
}

#[derive(Debug, Clone)]
enum YamlSource {
    Files { environment: PathBuf, database: PathBuf },
    Inline { environment: String, database: String },
}

/// Provider backed by `environment.yml` + `database.yml`
///
/// Files are read on every [`resolve`](CredentialProvider::resolve); a manager
/// resolves once, at construction.
#[derive(Debug, Clone)]
pub struct YamlCredentialProvider {
    source: YamlSource,
}

impl Default for YamlCredentialProvider {
    fn default() -> Self {
        Self::new(DEFAULT_ENVIRONMENT_FILE, DEFAULT_DATABASE_FILE)
    }
}

impl YamlCredentialProvider {
    /// Use explicit file paths
    pub fn new(environment: impl Into<PathBuf>, database: impl Into<PathBuf>) -> Self {
        Self {
            source: YamlSource::Files {
                environment: environment.into(),
                database: database.into(),
            },
        }
    }

    /// Use `environment.yml` and `database.yml` inside `dir`
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("environment.yml"), dir.join("database.yml"))
    }

    /// Use YAML documents already in memory
    pub fn from_yaml_strs(environment: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            source: YamlSource::Inline {
                environment: environment.into(),
                database: database.into(),
            },
        }
    }

    fn load(&self) -> Result<(String, String)> {
        match &self.source {
            YamlSource::Files {
                environment,
                database,
            } => Ok((read_file(environment)?, read_file(database)?)),
            YamlSource::Inline {
                environment,
                database,
            } => Ok((environment.clone(), database.clone())),
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))
}

impl CredentialProvider for YamlCredentialProvider {
    fn resolve(&self, key: &str) -> Result<DatabaseInfo> {
        let (environment, database) = self.load()?;

        let env_info: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(&environment)
            .map_err(|e| Error::Config(format!("malformed environment file: {}", e)))?;
        let entry_name = match env_info.get(key) {
            Some(serde_yaml::Value::String(name)) => name.clone(),
            Some(_) => {
                return Err(Error::Config(format!(
                    "environment entry {:?} is not a database name",
                    key
                )))
            }
            None => {
                return Err(Error::Config(format!(
                    "environment has no entry for {:?}",
                    key
                )))
            }
        };

        // Only the referenced entry is decoded; other entries may be incomplete.
        let mut db_info: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(&database)
            .map_err(|e| Error::Config(format!("malformed database file: {}", e)))?;
        let entry = db_info.remove(&entry_name).ok_or_else(|| {
            Error::Config(format!(
                "database file has no entry {:?} (referenced by {:?})",
                entry_name, key
            ))
        })?;
        let info: DatabaseInfo = serde_yaml::from_value(entry).map_err(|e| {
            Error::Config(format!("malformed database entry {:?}: {}", entry_name, e))
        })?;

        tracing::debug!(key, entry = %entry_name, host = %info.host, "resolved database credentials");
        Ok(info)
    }
}
