use std::path::PathBuf;
use std::time::Duration;

use opsync_core::payload::UnknownColumnPolicy;

use crate::executor::DEFAULT_MAX_WORKERS;
use crate::logging::LogFormat;

/// Default endpoint the operation batch is fetched from.
pub const DEFAULT_SOURCE_URL: &str = "http://localhost:3000/file";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub source_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Number of operations applied concurrently.
    pub max_workers: usize,
    pub db_max_connections: u32,
    /// Postgres schema tables are reflected from and created in.
    pub db_schema: String,
    pub unknown_columns: UnknownColumnPolicy,
    pub auto_create_tables: bool,
    pub log_dir: PathBuf,
    pub log_format: LogFormat,
    /// Run one cycle and exit instead of polling.
    pub run_once: bool,
    /// Where to write each batch report as JSON, if anywhere.
    pub report_file: Option<PathBuf>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                                   |
    /// |------------------------|-------------------------------------------|
    /// | `DATABASE_URL`         | required                                  |
    /// | `SOURCE_URL`           | `http://localhost:3000/file` (or a path)  |
    /// | `POLL_INTERVAL_SECS`   | `60`                                      |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                                      |
    /// | `MAX_WORKERS`          | `10`                                      |
    /// | `DB_MAX_CONNECTIONS`   | `MAX_WORKERS + 2`, at least `MAX_WORKERS` |
    /// | `DB_SCHEMA`            | `public`                                  |
    /// | `UNKNOWN_COLUMNS`      | `reject` (or `drop`)                      |
    /// | `AUTO_CREATE_TABLES`   | `true`                                    |
    /// | `LOG_DIR`              | `logs`                                    |
    /// | `LOG_FORMAT`           | `text` (or `json`)                        |
    /// | `RUN_ONCE`             | `false`                                   |
    /// | `REPORT_FILE`          | unset                                     |
    ///
    /// Durations, `MAX_WORKERS` and `DB_MAX_CONNECTIONS` must be non-zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let source_url = var("SOURCE_URL").unwrap_or_else(|| DEFAULT_SOURCE_URL.into());

        let poll_interval_secs: u64 =
            positive(&var, "POLL_INTERVAL_SECS", "a positive number of seconds", 60)?;
        let request_timeout_secs: u64 =
            positive(&var, "REQUEST_TIMEOUT_SECS", "a positive number of seconds", 30)?;

        let max_workers: usize =
            positive(&var, "MAX_WORKERS", "a positive integer", DEFAULT_MAX_WORKERS)?;
        let db_max_connections: u32 = positive(
            &var,
            "DB_MAX_CONNECTIONS",
            "a positive integer",
            u32::try_from(max_workers).unwrap_or(u32::MAX).saturating_add(2),
        )?;
        if usize::try_from(db_max_connections).is_ok_and(|c| c < max_workers) {
            return Err(ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                expected: "at least MAX_WORKERS",
                value: db_max_connections.to_string(),
            });
        }

        let db_schema = var("DB_SCHEMA").unwrap_or_else(|| "public".into());
        let unknown_columns = parse(
            &var,
            "UNKNOWN_COLUMNS",
            "'reject' or 'drop'",
            UnknownColumnPolicy::default(),
        )?;
        let auto_create_tables = flag(&var, "AUTO_CREATE_TABLES", true)?;
        let log_dir = var("LOG_DIR").map(PathBuf::from).unwrap_or_else(|| "logs".into());
        let log_format = parse(&var, "LOG_FORMAT", "'text' or 'json'", LogFormat::Text)?;
        let run_once = flag(&var, "RUN_ONCE", false)?;
        let report_file = var("REPORT_FILE").map(PathBuf::from);

        Ok(Self {
            database_url,
            source_url,
            poll_interval: Duration::from_secs(poll_interval_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_workers,
            db_max_connections,
            db_schema,
            unknown_columns,
            auto_create_tables,
            log_dir,
            log_format,
            run_once,
            report_file,
        })
    }
}

fn parse<T: std::str::FromStr>(
    var: impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}

/// Like [`parse`], but zero is rejected.
fn positive<T: std::str::FromStr + Default + PartialEq>(
    var: impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    let value = parse(var, name, expected, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            name,
            expected,
            value: "0".into(),
        });
    }
    Ok(value)
}

fn flag(
    var: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match var(name).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                expected: "a boolean",
                value: v,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        WorkerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/opsync")]).unwrap();
        assert_eq!(config.source_url, DEFAULT_SOURCE_URL);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.db_max_connections, 12);
        assert_eq!(config.db_schema, "public");
        assert_eq!(config.unknown_columns, UnknownColumnPolicy::Reject);
        assert!(config.auto_create_tables);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(!config.run_once);
        assert!(config.report_file.is_none());
    }

    #[test]
    fn database_url_is_required() {
        assert_matches!(load(&[]), Err(ConfigError::Missing("DATABASE_URL")));
        assert_matches!(
            load(&[("DATABASE_URL", "  ")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/x"),
            ("MAX_WORKERS", "4"),
            ("DB_MAX_CONNECTIONS", "20"),
            ("UNKNOWN_COLUMNS", "DROP"),
            ("AUTO_CREATE_TABLES", "no"),
            ("LOG_FORMAT", "json"),
            ("RUN_ONCE", "1"),
            ("REPORT_FILE", "/tmp/report.json"),
        ])
        .unwrap();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.db_max_connections, 20);
        assert_eq!(config.unknown_columns, UnknownColumnPolicy::Drop);
        assert!(!config.auto_create_tables);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.run_once);
        assert_eq!(config.report_file, Some(PathBuf::from("/tmp/report.json")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_matches!(
            load(&[("DATABASE_URL", "x"), ("MAX_WORKERS", "0")]),
            Err(ConfigError::Invalid { name: "MAX_WORKERS", .. })
        );
        assert_matches!(
            load(&[("DATABASE_URL", "x"), ("POLL_INTERVAL_SECS", "soon")]),
            Err(ConfigError::Invalid { name: "POLL_INTERVAL_SECS", .. })
        );
        assert_matches!(
            load(&[("DATABASE_URL", "x"), ("RUN_ONCE", "maybe")]),
            Err(ConfigError::Invalid { name: "RUN_ONCE", .. })
        );
    }

    #[test]
    fn zero_durations_and_pool_sizes_are_rejected() {
        for name in ["POLL_INTERVAL_SECS", "REQUEST_TIMEOUT_SECS", "DB_MAX_CONNECTIONS"] {
            assert_matches!(
                load(&[("DATABASE_URL", "x"), (name, "0")]),
                Err(ConfigError::Invalid { name: n, .. }) if n == name
            );
        }
    }

    #[test]
    fn pool_must_cover_every_worker() {
        assert_matches!(
            load(&[("DATABASE_URL", "x"), ("MAX_WORKERS", "8"), ("DB_MAX_CONNECTIONS", "4")]),
            Err(ConfigError::Invalid { name: "DB_MAX_CONNECTIONS", .. })
        );
        let config = load(&[
            ("DATABASE_URL", "x"),
            ("MAX_WORKERS", "8"),
            ("DB_MAX_CONNECTIONS", "8"),
        ])
        .unwrap();
        assert_eq!(config.db_max_connections, 8);
    }
}
