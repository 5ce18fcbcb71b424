//! Postgres driver configuration

use std::collections::HashMap;
use std::time::Duration;

/// Session options applied to every connection a [`PgDriver`](super::PgDriver) opens
///
/// Database and user come from the endpoint and credentials; this only holds
/// what the startup packet and the socket need beyond those.
///
/// # Examples
///
/// ```
/// use wire_lease::postgres::PgConfig;
/// use std::time::Duration;
///
/// let config = PgConfig::new()
///     .connect_timeout(Duration::from_secs(10))
///     .statement_timeout(Duration::from_secs(30))
///     .application_name("nightly-export");
/// assert_eq!(config.application_name.as_deref(), Some("nightly-export"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PgConfig {
    /// Limit on TCP connect plus startup and authentication (default: none)
    pub connect_timeout: Option<Duration>,
    /// Server-side statement timeout
    pub statement_timeout: Option<Duration>,
    /// Application name for Postgres logs
    pub application_name: Option<String>,
    /// Additional startup parameters
    pub params: HashMap<String, String>,
}

impl PgConfig {
    /// Defaults: no timeouts, no application name
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout
    ///
    /// Covers the socket connect and the whole authentication exchange.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the server-side statement timeout
    pub fn statement_timeout(mut self, duration: Duration) -> Self {
        self.statement_timeout = Some(duration);
        self
    }

    /// Set application name for Postgres logs
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Add a startup parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Startup packet parameters for `user` on `database`
    pub(crate) fn startup_params(&self, user: &str, database: &str) -> Vec<(String, String)> {
        let mut params = vec![
            ("user".to_string(), user.to_string()),
            ("database".to_string(), database.to_string()),
        ];

        if let Some(app_name) = &self.application_name {
            params.push(("application_name".to_string(), app_name.clone()));
        }

        if let Some(timeout) = self.statement_timeout {
            params.push((
                "statement_timeout".to_string(),
                timeout.as_millis().to_string(),
            ));
        }

        let mut extra: Vec<_> = self.params.iter().collect();
        extra.sort();
        for (k, v) in extra {
            params.push((k.clone(), v.clone()));
        }

        params
    }
}
