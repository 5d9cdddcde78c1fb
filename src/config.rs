use anyhow::Context;
use axum::http::HeaderValue;
use serde::Deserialize;
use std::env;
use std::fs;
use std::str::FromStr;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(anyhow::anyhow!("Invalid environment: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Environment::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Which persistence layer backs the repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Mongodb,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StorageBackend::Mongodb),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub linkedin: LinkedInConfig,
    #[serde(default)]
    pub deepseek: DeepSeekConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_mongodb_uri")]
    pub connection_uri: String,
    #[serde(default = "default_db_name")]
    pub db_name: String,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            connection_uri: default_mongodb_uri(),
            db_name: default_db_name(),
            connect_retries: default_connect_retries(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub env: Environment,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            env: Environment::default(),
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Allowed CORS origins for the current environment.
    ///
    /// # Errors
    /// Fails in production when no origin is configured.
    pub fn get_allowed_origins(
        &self,
        addr: &std::net::SocketAddr,
    ) -> anyhow::Result<Vec<HeaderValue>> {
        let origin_strings = match self.env {
            Environment::Production => {
                if self.allowed_origins.is_empty() {
                    anyhow::bail!(
                        "Production environment requires explicit allowed origins. \
                        Set the CLIENT_URL environment variable"
                    );
                }
                self.allowed_origins.clone()
            }
            Environment::Development => {
                let mut origins = vec![
                    "http://localhost:5173".to_string(),
                    "http://localhost:3000".to_string(),
                    format!("http://localhost:{}", addr.port()),
                    format!("http://127.0.0.1:{}", addr.port()),
                    format!("http://{}", addr),
                ];
                origins.extend(self.allowed_origins.clone());
                origins
            }
        };

        let headers: Vec<HeaderValue> = origin_strings
            .into_iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(header_value) => {
                    tracing::debug!("Allowed origin: {}", origin);
                    Some(header_value)
                }
                Err(e) => {
                    tracing::warn!("Failed to parse origin '{}': {}", origin, e);
                    None
                }
            })
            .collect();

        if headers.is_empty() {
            anyhow::bail!("No valid CORS origins configured");
        }

        Ok(headers)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_jwt_expiry_days")]
    pub expiry_days: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expiry_days: default_jwt_expiry_days(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LinkedInConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeepSeekConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_deepseek_url")]
    pub api_url: String,
    #[serde(default = "default_deepseek_model")]
    pub model: String,
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_deepseek_url(),
            model: default_deepseek_model(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_files: default_max_files(),
        }
    }
}

impl UploadConfig {
    /// Request body ceiling for multipart routes, with room for form fields.
    pub fn body_limit(&self) -> usize {
        self.max_file_bytes.saturating_mul(self.max_files) + 1024 * 1024
    }
}

fn default_mongodb_uri() -> String {
    "mongodb://localhost:27017/?replicaSet=rs0".to_string()
}
fn default_db_name() -> String {
    "persona_notes".to_string()
}
fn default_connect_retries() -> u32 {
    5
}
fn default_reconnect_delay_secs() -> u64 {
    5
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_jwt_expiry_days() -> i64 {
    7
}
fn default_bcrypt_cost() -> u32 {
    12
}
fn default_deepseek_url() -> String {
    "https://api.deepseek.com/chat/completions".to_string()
}
fn default_deepseek_model() -> String {
    "deepseek-chat".to_string()
}
fn default_max_requests() -> u32 {
    100
}
fn default_window_secs() -> u64 {
    15 * 60
}
fn default_max_file_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_max_files() -> usize {
    5
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut config = if non_empty_env("MONGODB_URI").is_some() {
            Config::default()
        } else {
            let config_str = fs::read_to_string("Config.toml").context(
                "Failed to read Config.toml. Use environment variables or provide Config.toml",
            )?;
            Config::from_toml_str(&config_str)?
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("Failed to parse Config.toml")
    }

    /// Environment variables win over Config.toml values.
    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Some(uri) = non_empty_env("MONGODB_URI") {
            self.database.connection_uri = uri;
        }
        if let Some(name) = non_empty_env("MONGODB_DB_NAME") {
            self.database.db_name = name;
        }
        if let Some(backend) = non_empty_env("STORAGE_BACKEND") {
            self.database.backend = backend.parse()?;
        }
        if let Some(host) = non_empty_env("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty_env("PORT") {
            self.server.port = port.parse().context("Invalid PORT")?;
        }
        if let Some(env_name) = non_empty_env("ENVIRONMENT").or_else(|| non_empty_env("NODE_ENV")) {
            self.server.env = env_name.parse()?;
        }
        if let Some(origins) = non_empty_env("CLIENT_URL") {
            self.server.allowed_origins = split_origins(&origins);
        }
        if let Some(level) = non_empty_env("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(secret) = non_empty_env("JWT_SECRET") {
            self.jwt.secret = secret;
        }
        if let Some(cost) = non_empty_env("BCRYPT_COST") {
            self.security.bcrypt_cost = cost.parse().context("Invalid BCRYPT_COST")?;
        }
        if let Some(client_id) = non_empty_env("GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(client_id);
        }
        if let Some(client_id) = non_empty_env("LINKEDIN_CLIENT_ID") {
            self.linkedin.client_id = Some(client_id);
        }
        if let Some(secret) = non_empty_env("LINKEDIN_CLIENT_SECRET") {
            self.linkedin.client_secret = Some(secret);
        }
        if let Some(uri) = non_empty_env("LINKEDIN_REDIRECT_URI") {
            self.linkedin.redirect_uri = Some(uri);
        }
        if let Some(key) = non_empty_env("DEEPSEEK_API_KEY") {
            self.deepseek.api_key = Some(key);
        }
        if let Some(url) = non_empty_env("DEEPSEEK_API_URL") {
            self.deepseek.api_url = url;
        }
        if let Some(model) = non_empty_env("DEEPSEEK_MODEL") {
            self.deepseek.model = model;
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.env == Environment::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_environment_aliases() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(
            "Development".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn fills_defaults_from_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [database]
            backend = "memory"

            [server]
            port = 8080
            env = "production"
            allowed_origins = ["https://notes.example.com"]

            [jwt]
            secret = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.backend, StorageBackend::Memory);
        assert_eq!(config.database.db_name, "persona_notes");
        assert_eq!(config.server.port, 8080);
        assert!(config.is_production());
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.jwt.expiry_days, 7);
        assert!(config.deepseek.api_key.is_none());
    }

    #[test]
    fn production_requires_explicit_origins() {
        let addr: std::net::SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let mut server = ServerConfig {
            env: Environment::Production,
            ..ServerConfig::default()
        };
        assert!(server.get_allowed_origins(&addr).is_err());

        server.allowed_origins = vec!["https://notes.example.com".to_string()];
        let origins = server.get_allowed_origins(&addr).unwrap();
        assert_eq!(origins.len(), 1);
    }

    #[test]
    fn development_allows_local_front_ends() {
        let addr: std::net::SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let origins = ServerConfig::default().get_allowed_origins(&addr).unwrap();
        assert!(origins.contains(&HeaderValue::from_static("http://localhost:5173")));
    }

    #[test]
    fn splits_client_urls() {
        assert_eq!(
            split_origins("https://a.example.com, https://b.example.com,"),
            vec!["https://a.example.com", "https://b.example.com"]
        );
    }
}
