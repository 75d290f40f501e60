use crate::dashboard::{DashboardConfig, LoginSettings, SiteTokenCache};
use crate::proxy::access::{Principal, Role};
use crate::proxy::middleware::AuthConfig;
use crate::proxy::types::*;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

pub use config::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub proxy: ProxySettings,
    pub dashboard: DashboardSettings,
    pub transport: TransportSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxySettings {
    pub request_timeout_secs: u64,
    pub max_request_size: RequestSizeLimit,
    pub combine_concurrency: CombineConcurrency,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardSettings {
    pub api_base: TargetUrl,
    pub authenticate_url: TargetUrl,
    pub username: String,
    pub password: String,
    pub token_cache_soft_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportSettings {
    /// Relay that owns the channels to the sites
    pub relay_url: TargetUrl,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthSettings {
    #[serde(default)]
    pub principals: Vec<PrincipalSettings>,
}

/// One bearer credential and the caller it identifies
#[derive(Debug, Deserialize, Clone)]
pub struct PrincipalSettings {
    pub token: BearerToken,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    #[serde(default)]
    pub roles: Vec<Role>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Settings {
    /// Load from `config/` relative to the working directory, using the
    /// `ENVIRONMENT` variable to pick the environment file
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self::load_from(Path::new("config"), &environment)
    }

    /// Load defaults, then `{dir}/default`, `{dir}/{environment}`,
    /// `{dir}/local`, then `EDGE_TUNNEL__*` environment variables
    pub fn load_from(dir: &Path, environment: &str) -> Result<Self, ConfigError> {
        let file = |name: &str| File::from(dir.join(name)).required(false);

        let config = Config::builder()
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8080)?
            .set_default("application.environment", environment)?
            .set_default("proxy.request_timeout_secs", ProxyConfig::DEFAULT_TIMEOUT_SECS)?
            .set_default(
                "proxy.max_request_size",
                ProxyConfig::DEFAULT_MAX_REQUEST_SIZE as u64,
            )?
            .set_default(
                "proxy.combine_concurrency",
                ProxyConfig::DEFAULT_COMBINE_CONCURRENCY as u64,
            )?
            .set_default("dashboard.api_base", DashboardConfig::DEFAULT_API_BASE)?
            .set_default(
                "dashboard.authenticate_url",
                DashboardConfig::DEFAULT_AUTHENTICATE_URL,
            )?
            .set_default("dashboard.username", "sherlock")?
            .set_default("dashboard.password", "$h3rl0ck!")?
            .set_default(
                "dashboard.token_cache_soft_limit",
                SiteTokenCache::DEFAULT_SOFT_LIMIT as u64,
            )?
            .set_default("transport.relay_url", "http://127.0.0.1:9090")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .add_source(file("default"))
            .add_source(file(environment))
            .add_source(file("local"))
            .add_source(Environment::with_prefix("EDGE_TUNNEL").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            max_request_size: self.proxy.max_request_size,
            request_timeout: Duration::from_secs(self.proxy.request_timeout_secs),
            combine_concurrency: self.proxy.combine_concurrency,
        }
    }

    pub fn dashboard_config(&self) -> DashboardConfig {
        DashboardConfig {
            api_base: self.dashboard.api_base.clone(),
            login: LoginSettings {
                authenticate_url: self.dashboard.authenticate_url.clone(),
                username: self.dashboard.username.clone(),
                password: self.dashboard.password.clone(),
            },
            token_cache_soft_limit: self.dashboard.token_cache_soft_limit,
        }
    }

    pub fn auth_config(&self) -> AuthConfig {
        self.auth
            .principals
            .iter()
            .fold(AuthConfig::default(), |auth, p| {
                auth.with_principal(
                    p.token.clone(),
                    Principal::new(p.tenant_id.clone(), p.user_id.clone(), p.roles.iter().copied()),
                )
            })
    }
}
