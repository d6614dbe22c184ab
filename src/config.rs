use secrecy::Secret;
use serde::Deserialize;

const DEFAULT_STALE_EVENT_MINUTES: i64 = 10;

/// Base URL and bearer token for an optional HTTP collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_token: Secret<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Bearer key required on every admin route
    pub admin_api_key: Secret<String>,

    // Shared fast-path cache, may carry credentials
    pub redis_url: Secret<String>,

    // Workspace provisioning backend
    pub workspace_api: Option<ClientConfig>,

    // Live session gateway
    pub realtime_gateway: Option<ClientConfig>,

    // CDN edge cache invalidation
    pub edge_cache_api: Option<ClientConfig>,

    pub stale_event_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let source = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Self::from_source(&source)
    }

    pub fn from_source(config: &config::Config) -> Result<Self, config::ConfigError> {
        let stale_event_minutes = config
            .get::<i64>("stale_event_minutes")
            .unwrap_or(DEFAULT_STALE_EVENT_MINUTES);
        if stale_event_minutes <= 0 {
            return Err(config::ConfigError::Message(
                "STALE_EVENT_MINUTES must be positive".to_string(),
            ));
        }

        Ok(Self {
            database_url: config.get("database_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            admin_api_key: Secret::new(config.get("admin_api_key")?),
            redis_url: Secret::new(redis_url(config)?),

            workspace_api: client_config(config, "workspace_api_url", "workspace_api_token")?,
            realtime_gateway: client_config(
                config,
                "realtime_gateway_url",
                "realtime_gateway_token",
            )?,
            edge_cache_api: client_config(config, "edge_cache_api_url", "edge_cache_api_token")?,

            stale_event_minutes,
        })
    }
}

fn redis_url(config: &config::Config) -> Result<String, config::ConfigError> {
    let redis_url: String = config.get("redis_url")?;
    let parsed = url::Url::parse(&redis_url)
        .map_err(|e| config::ConfigError::Message(format!("REDIS_URL is not a valid URL: {}", e)))?;
    match parsed.scheme() {
        "redis" | "rediss" => Ok(redis_url),
        scheme => Err(config::ConfigError::Message(format!(
            "REDIS_URL must use redis:// or rediss://, got {}://",
            scheme
        ))),
    }
}

/// Both keys present yields a client; both absent disables it. A lone key is
/// a configuration error.
fn client_config(
    config: &config::Config,
    url_key: &str,
    token_key: &str,
) -> Result<Option<ClientConfig>, config::ConfigError> {
    let url = config.get::<String>(url_key).ok();
    let token = config.get::<String>(token_key).ok();

    match (url, token) {
        (Some(base_url), Some(token)) => {
            url::Url::parse(&base_url).map_err(|e| {
                config::ConfigError::Message(format!(
                    "{} is not a valid URL: {}",
                    url_key.to_uppercase(),
                    e
                ))
            })?;
            Ok(Some(ClientConfig {
                base_url,
                api_token: Secret::new(token),
            }))
        }
        (None, None) => Ok(None),
        (Some(_), None) => Err(config::ConfigError::NotFound(token_key.to_uppercase())),
        (None, Some(_)) => Err(config::ConfigError::NotFound(url_key.to_uppercase())),
    }
}
