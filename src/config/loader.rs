//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values supplied through the environment (`PORT`, `PROXY_PORT`) or flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOverrides {
    /// Listen port; replaces `listener.port`.
    pub port: Option<u16>,
    /// Backend port; installs the default route table when none is declared.
    pub proxy_port: Option<u16>,
}

impl EnvOverrides {
    /// Apply the overrides to a parsed configuration.
    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if config.routes.is_empty() {
            if let Some(proxy_port) = self.proxy_port {
                config.routes = GatewayConfig::default_routes(proxy_port);
            }
        }
    }
}

/// Parse configuration from TOML text without validating it.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load the configuration file (if any), apply environment overrides, and
/// validate the result.
pub fn load_config(path: Option<&Path>, overrides: &EnvOverrides) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_config(&content)?
        }
        None => GatewayConfig::default(),
    };

    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let config = parse_config(
            r#"
            [listener]
            host = "0.0.0.0"
            port = 3000

            [[routes]]
            prefix = "/api"
            target = "http://localhost:9000"
            rewrite_origin = true

            [[routes]]
            prefix = "/socket"
            target = "ws://localhost:9001"

            [upstream]
            upgrade_idle_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 3000);
        assert_eq!(config.routes.len(), 2);
        assert!(config.routes[0].rewrite_origin);
        assert!(!config.routes[1].upgrade);
        assert_eq!(config.upstream.upgrade_idle_secs, 30);
        assert_eq!(config.upstream.connect_timeout_secs, 5);
        assert_eq!(config.observability.event_queue_capacity, 1024);
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[[routes]]\nprefix = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_installs_default_routes() {
        let overrides = EnvOverrides {
            port: Some(8080),
            proxy_port: Some(5000),
        };
        let config = load_config(None, &overrides).unwrap();

        assert_eq!(config.listener.port, 8080);
        let prefixes: Vec<_> = config.routes.iter().map(|r| r.prefix.as_str()).collect();
        assert_eq!(prefixes, ["/api", "/ws"]);
        assert_eq!(config.routes[0].target, "http://localhost:5000");
        assert!(config.routes[0].rewrite_origin);
        assert!(config.routes[1].upgrade);
    }

    #[test]
    fn test_declared_routes_win_over_proxy_port() {
        let mut config = parse_config(
            r#"
            [[routes]]
            prefix = "/graphql"
            target = "http://127.0.0.1:4000"
            "#,
        )
        .unwrap();
        EnvOverrides {
            port: None,
            proxy_port: Some(5000),
        }
        .apply(&mut config);

        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].prefix, "/graphql");
    }

    #[test]
    fn test_missing_routes_fail_validation() {
        let err = load_config(None, &EnvOverrides::default()).unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors, vec![ValidationError::NoRoutes]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/gateway.toml")), &EnvOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
