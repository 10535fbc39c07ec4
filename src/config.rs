use std::{env, str::FromStr, time::Duration};

use dotenvy::dotenv;

use crate::{
    constants::{
        DEFAULT_BIND_ADDR, DEFAULT_DB_MAX_CONNECTIONS, DEFAULT_DB_MIN_CONNECTIONS,
        DEFAULT_LEDGER_COMMIT_WAIT_MS, DEFAULT_LEDGER_MAX_ATTEMPTS, DEFAULT_LEDGER_RETRY_BACKOFF_MS,
        DEFAULT_REQUEST_TIMEOUT_MS,
    },
    error::ServiceError,
};

pub struct Config {
    pub database_url: String,
    pub jwt_public_key: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub request_timeout: Duration,
    pub ledger_max_attempts: u32,
    pub ledger_retry_backoff: Duration,
    pub ledger_commit_wait: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ServiceError> {
        dotenv().ok(); // Load environment variables
        Self::from_lookup(|name| env::var(name))
    }

    /// Builds the config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let required = |name: &str| {
            lookup(name).map_err(|e| ServiceError::EnvError(name.to_string(), e))
        };
        let optional = |name: &str| lookup(name).ok().filter(|v| !v.trim().is_empty());

        let min_connections = parse_or(optional("DB_MIN_CONNECTIONS"), "DB_MIN_CONNECTIONS", DEFAULT_DB_MIN_CONNECTIONS)?;
        let max_connections = parse_or(optional("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        if max_connections == 0 || min_connections > max_connections {
            return Err(ServiceError::InvalidEnv {
                name: "DB_MAX_CONNECTIONS".to_string(),
                value: max_connections.to_string(),
            });
        }

        let ledger_max_attempts = parse_or(optional("LEDGER_MAX_ATTEMPTS"), "LEDGER_MAX_ATTEMPTS", DEFAULT_LEDGER_MAX_ATTEMPTS)?;
        if ledger_max_attempts == 0 {
            return Err(ServiceError::InvalidEnv {
                name: "LEDGER_MAX_ATTEMPTS".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            jwt_public_key: required("JWT_PUBLIC_KEY")?,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_connections,
            min_connections,
            request_timeout: Duration::from_millis(parse_or(
                optional("REQUEST_TIMEOUT_MS"),
                "REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )?),
            ledger_max_attempts,
            ledger_retry_backoff: Duration::from_millis(parse_or(
                optional("LEDGER_RETRY_BACKOFF_MS"),
                "LEDGER_RETRY_BACKOFF_MS",
                DEFAULT_LEDGER_RETRY_BACKOFF_MS,
            )?),
            ledger_commit_wait: Duration::from_millis(parse_or(
                optional("LEDGER_COMMIT_WAIT_MS"),
                "LEDGER_COMMIT_WAIT_MS",
                DEFAULT_LEDGER_COMMIT_WAIT_MS,
            )?),
        })
    }

    /// Bound on one connection: reading the request, then the ledger's own
    /// deadline and commit wait. Always outlasts the ledger so its outcome
    /// reaches the client.
    pub fn connection_timeout(&self) -> Duration {
        self.request_timeout * 2 + self.ledger_commit_wait
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> Result<T, ServiceError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ServiceError::InvalidEnv {
            name: name.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Result<String, env::VarError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/coins"),
            ("JWT_PUBLIC_KEY", "pem"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_DB_MIN_CONNECTIONS);
        assert_eq!(config.request_timeout, Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS));
        assert_eq!(config.ledger_max_attempts, DEFAULT_LEDGER_MAX_ATTEMPTS);
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_lookup(lookup_from(&[("JWT_PUBLIC_KEY", "pem")]))
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::EnvError(name, _) if name == "DATABASE_URL"));
    }

    #[test]
    fn unparsable_number_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/coins"),
            ("JWT_PUBLIC_KEY", "pem"),
            ("REQUEST_TIMEOUT_MS", "soon"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, ServiceError::InvalidEnv { name, .. } if name == "REQUEST_TIMEOUT_MS"));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/coins"),
            ("JWT_PUBLIC_KEY", "pem"),
            ("LEDGER_MAX_ATTEMPTS", "0"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn connection_outlasts_ledger_deadline() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/coins"),
            ("JWT_PUBLIC_KEY", "pem"),
            ("REQUEST_TIMEOUT_MS", "1000"),
            ("LEDGER_COMMIT_WAIT_MS", "500"),
        ]))
        .unwrap();

        assert_eq!(config.ledger_commit_wait, Duration::from_millis(500));
        assert!(config.connection_timeout() > config.request_timeout + config.ledger_commit_wait);
    }
}
