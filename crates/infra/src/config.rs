//! Ledger configuration loaded from the environment.

use tracing::warn;

pub const MAX_CONFLICT_RETRIES_ENV: &str = "RESINSTOCK_MAX_CONFLICT_RETRIES";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS_ENV: &str = "RESINSTOCK_DB_MAX_CONNECTIONS";
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Extra attempts a workflow makes after a concurrency conflict.
    pub max_conflict_retries: u32,
    /// Postgres connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Pool size used when `database_url` is set.
    pub db_max_connections: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Invalid values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_CONFLICT_RETRIES_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(n) => config.max_conflict_retries = n,
                Err(err) => warn!(
                    variable = MAX_CONFLICT_RETRIES_ENV,
                    value = %raw,
                    error = %err,
                    default = DEFAULT_MAX_CONFLICT_RETRIES,
                    "invalid retry count, using default"
                ),
            }
        }

        if let Some(raw) = lookup(DB_MAX_CONNECTIONS_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.db_max_connections = n,
                _ => warn!(
                    variable = DB_MAX_CONNECTIONS_ENV,
                    value = %raw,
                    default = DEFAULT_DB_MAX_CONNECTIONS,
                    "invalid pool size, using default"
                ),
            }
        }

        config.database_url = lookup(DATABASE_URL_ENV).filter(|url| !url.trim().is_empty());
        config
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        assert_eq!(LedgerConfig::from_lookup(lookup(&[])), LedgerConfig::default());
    }

    #[test]
    fn reads_retries_and_database_url() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (MAX_CONFLICT_RETRIES_ENV, " 7 "),
            (DATABASE_URL_ENV, "postgres://localhost/resinstock"),
            (DB_MAX_CONNECTIONS_ENV, "4"),
        ]));
        assert_eq!(config.db_max_connections, 4);
        assert_eq!(config.max_conflict_retries, 7);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/resinstock"));
    }

    #[test]
    fn invalid_retries_fall_back() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (MAX_CONFLICT_RETRIES_ENV, "lots"),
            (DATABASE_URL_ENV, "  "),
            (DB_MAX_CONNECTIONS_ENV, "0"),
        ]));
        assert_eq!(config.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert_eq!(config.max_conflict_retries, DEFAULT_MAX_CONFLICT_RETRIES);
        assert_eq!(config.database_url, None);
    }
}
