//! Layered application configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1) serde defaults -> 2) YAML file (if given) -> 3) `SIDECAR_APP__*` env
//! (`__` separates nesting) -> 4) the sidecar's well-known variables
//! (`DAPR_HTTP_PORT`, `DAPR_GRPC_PORT`, `DAPR_API_TOKEN`, `APP_PORT`).

use std::path::Path;

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::Deserialize;
use sidecar_sdk::{AppServerConfig, LockProtocol};
use sidecar_transport::SidecarConfig;

pub const ENV_PREFIX: &str = "SIDECAR_APP__";

/// Well-known port variables injected next to the sidecar, and the key each feeds.
const SIDECAR_PORT_ENV: [(&str, &str); 3] = [
    ("DAPR_HTTP_PORT", "sidecar.http_port"),
    ("DAPR_GRPC_PORT", "sidecar.grpc_port"),
    ("APP_PORT", "server.port"),
];

/// Read verbatim; `Env` would type an all-digit token as a number.
const API_TOKEN_ENV: &str = "DAPR_API_TOKEN";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub sidecar: SidecarConfig,
    pub server: AppServerConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
    /// Topics the `serve` command subscribes to.
    pub subscriptions: Vec<SubscriptionConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub lock_protocol: LockProtocol,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    pub pubsub_name: String,
    pub topic: String,
    #[serde(default)]
    pub route: Option<String>,
}

impl AppConfig {
    /// Provider chain without extracting, so callers can add layers.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        for (var, key) in SIDECAR_PORT_ENV {
            figment = figment.merge(Env::raw().only(&[var]).map(move |_| key.into()));
        }
        if let Ok(token) = std::env::var(API_TOKEN_ENV) {
            figment = figment.merge(Serialized::default("sidecar.api_token", token));
        }
        figment
    }

    /// Load and validate the configuration.
    ///
    /// # Errors
    /// Returns an error if the file is missing or any layer does not match the schema.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path
            && !path.is_file()
        {
            anyhow::bail!("config file does not exist: {}", path.display());
        }
        let config: Self = Self::figment(path)
            .extract()
            .context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.server.max_body_size == 0 {
            anyhow::bail!("server.max_body_size must be greater than zero");
        }
        if self.sidecar.host.is_empty() {
            anyhow::bail!("sidecar.host must not be empty");
        }
        for sub in &self.subscriptions {
            if sub.pubsub_name.is_empty() || sub.topic.is_empty() {
                anyhow::bail!("subscriptions need both pubsub_name and topic");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use figment::Jail;
    use sidecar_sdk::PubSubAckPolicy;
    use std::time::Duration;

    #[test]
    fn defaults_apply_without_sources() {
        Jail::expect_with(|_jail| {
            let cfg: AppConfig = AppConfig::figment(None).extract()?;
            assert_eq!(cfg.sidecar.http_port, 3500);
            assert_eq!(cfg.sidecar.grpc_port, 50001);
            assert_eq!(cfg.server.port, 3000);
            assert_eq!(cfg.server.pubsub_ack, PubSubAckPolicy::Always);
            assert_eq!(cfg.client.lock_protocol, LockProtocol::Grpc);
            assert_eq!(cfg.logging.level, "info");
            assert!(cfg.subscriptions.is_empty());
            Ok(())
        });
    }

    #[test]
    fn yaml_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "app.yaml",
                r#"
sidecar:
  host: "10.0.0.5"
  request_timeout: "2s"
server:
  port: 4000
  pubsub_ack: retry_on_error
client:
  lock_protocol: http
subscriptions:
  - pubsub_name: redis
    topic: orders
"#,
            )?;
            let cfg: AppConfig = AppConfig::figment(Some(Path::new("app.yaml"))).extract()?;
            assert_eq!(cfg.sidecar.host, "10.0.0.5");
            assert_eq!(cfg.sidecar.request_timeout, Duration::from_secs(2));
            assert_eq!(cfg.sidecar.http_port, 3500);
            assert_eq!(cfg.server.port, 4000);
            assert_eq!(cfg.server.pubsub_ack, PubSubAckPolicy::RetryOnError);
            assert_eq!(cfg.client.lock_protocol, LockProtocol::Http);
            assert_eq!(cfg.subscriptions.len(), 1);
            assert!(cfg.subscriptions[0].route.is_none());
            Ok(())
        });
    }

    #[test]
    fn prefixed_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file("app.yaml", "server:\n  port: 4000\nlogging:\n  json: false\n")?;
            jail.set_env("SIDECAR_APP__SERVER__PORT", "4100");
            jail.set_env("SIDECAR_APP__LOGGING__JSON", "true");
            jail.set_env("SIDECAR_APP__SIDECAR__CONNECT_TIMEOUT", "250ms");

            let cfg: AppConfig = AppConfig::figment(Some(Path::new("app.yaml"))).extract()?;
            assert_eq!(cfg.server.port, 4100);
            assert!(cfg.logging.json);
            assert_eq!(cfg.sidecar.connect_timeout, Duration::from_millis(250));
            Ok(())
        });
    }

    #[test]
    fn sidecar_variables_win_over_everything() {
        Jail::expect_with(|jail| {
            jail.create_file("app.yaml", "sidecar:\n  http_port: 1111\n")?;
            jail.set_env("SIDECAR_APP__SIDECAR__HTTP_PORT", "2222");
            jail.set_env("DAPR_HTTP_PORT", "3333");
            jail.set_env("DAPR_GRPC_PORT", "4444");
            jail.set_env("DAPR_API_TOKEN", "token-from-env");
            jail.set_env("APP_PORT", "5555");

            let cfg: AppConfig = AppConfig::figment(Some(Path::new("app.yaml"))).extract()?;
            assert_eq!(cfg.sidecar.http_port, 3333);
            assert_eq!(cfg.sidecar.grpc_port, 4444);
            assert_eq!(
                cfg.sidecar.api_token.as_ref().map(|t| t.expose().to_owned()),
                Some("token-from-env".to_owned())
            );
            assert_eq!(cfg.server.port, 5555);
            Ok(())
        });
    }

    #[test]
    fn numeric_api_token_is_kept_as_text() {
        Jail::expect_with(|jail| {
            jail.set_env("DAPR_API_TOKEN", "0123456");
            let cfg: AppConfig = AppConfig::figment(None).extract()?;
            assert_eq!(
                cfg.sidecar.api_token.as_ref().map(|t| t.expose().to_owned()),
                Some("0123456".to_owned())
            );
            Ok(())
        });
    }

    #[test]
    fn numeric_api_token_from_prefixed_env_is_accepted() {
        Jail::expect_with(|jail| {
            jail.set_env("SIDECAR_APP__SIDECAR__API_TOKEN", "123456");
            let cfg: AppConfig = AppConfig::figment(None).extract()?;
            assert_eq!(
                cfg.sidecar.api_token.as_ref().map(|t| t.expose().to_owned()),
                Some("123456".to_owned())
            );
            Ok(())
        });
    }

    #[test]
    fn unknown_keys_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("app.yaml", "server:\n  prot: 4000\n")?;
            let result = AppConfig::figment(Some(Path::new("app.yaml"))).extract::<AppConfig>();
            assert!(result.is_err());
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn zero_body_limit_fails_validation() {
        let cfg = AppConfig {
            server: AppServerConfig {
                max_body_size: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
