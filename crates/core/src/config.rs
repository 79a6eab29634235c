use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_token: SecretString,
    pub app_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub search_failure_policy: SearchFailurePolicy,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// What a failed upstream search turns into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFailurePolicy {
    /// Report the search as having no results.
    FailOpen,
    /// Surface the upstream or connection error to the caller.
    FailClosed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub upstream_base_url: Option<String>,
    pub upstream_api_token: Option<String>,
    pub upstream_timeout_secs: Option<u64>,
    pub upstream_max_retries: Option<u32>,
    pub search_failure_policy: Option<SearchFailurePolicy>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig {
                base_url: "https://api.pipedrive.com/v1".to_string(),
                api_token: String::new().into(),
                app_url: "https://app.pipedrive.com".to_string(),
                timeout_secs: 30,
                max_retries: 3,
                retry_base_delay_ms: 200,
                retry_max_delay_ms: 5_000,
                search_failure_policy: SearchFailurePolicy::FailOpen,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for SearchFailurePolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_open" => Ok(Self::FailOpen),
            "fail_closed" => Ok(Self::FailClosed),
            other => Err(ConfigError::Validation(format!(
                "unsupported search failure policy `{other}` (expected fail_open|fail_closed)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("crmlink.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(upstream) = patch.upstream {
            if let Some(base_url) = upstream.base_url {
                self.upstream.base_url = base_url;
            }
            if let Some(api_token) = upstream.api_token {
                self.upstream.api_token = api_token.into();
            }
            if let Some(app_url) = upstream.app_url {
                self.upstream.app_url = app_url;
            }
            if let Some(timeout_secs) = upstream.timeout_secs {
                self.upstream.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = upstream.max_retries {
                self.upstream.max_retries = max_retries;
            }
            if let Some(retry_base_delay_ms) = upstream.retry_base_delay_ms {
                self.upstream.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(retry_max_delay_ms) = upstream.retry_max_delay_ms {
                self.upstream.retry_max_delay_ms = retry_max_delay_ms;
            }
            if let Some(policy) = upstream.search_failure_policy {
                self.upstream.search_failure_policy = policy;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let base_url =
            read_env("CRMLINK_UPSTREAM_BASE_URL").or_else(|| read_env("PIPEDRIVE_API_URL"));
        if let Some(value) = base_url {
            self.upstream.base_url = value;
        }
        let api_token =
            read_env("CRMLINK_UPSTREAM_API_TOKEN").or_else(|| read_env("PIPEDRIVE_API_TOKEN"));
        if let Some(value) = api_token {
            self.upstream.api_token = value.into();
        }
        if let Some(value) = read_env("CRMLINK_UPSTREAM_APP_URL") {
            self.upstream.app_url = value;
        }
        if let Some(value) = read_env("CRMLINK_UPSTREAM_TIMEOUT_SECS") {
            self.upstream.timeout_secs = parse_u64("CRMLINK_UPSTREAM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CRMLINK_UPSTREAM_MAX_RETRIES") {
            self.upstream.max_retries = parse_u32("CRMLINK_UPSTREAM_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("CRMLINK_UPSTREAM_RETRY_BASE_DELAY_MS") {
            self.upstream.retry_base_delay_ms =
                parse_u64("CRMLINK_UPSTREAM_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("CRMLINK_UPSTREAM_RETRY_MAX_DELAY_MS") {
            self.upstream.retry_max_delay_ms =
                parse_u64("CRMLINK_UPSTREAM_RETRY_MAX_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("CRMLINK_UPSTREAM_SEARCH_FAILURE_POLICY") {
            self.upstream.search_failure_policy = value.parse()?;
        }

        if let Some(value) = read_env("CRMLINK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CRMLINK_SERVER_PORT") {
            self.server.port = parse_u16("CRMLINK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CRMLINK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CRMLINK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CRMLINK_LOGGING_LEVEL").or_else(|| read_env("CRMLINK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CRMLINK_LOGGING_FORMAT").or_else(|| read_env("CRMLINK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.upstream_base_url {
            self.upstream.base_url = base_url;
        }
        if let Some(api_token) = overrides.upstream_api_token {
            self.upstream.api_token = api_token.into();
        }
        if let Some(timeout_secs) = overrides.upstream_timeout_secs {
            self.upstream.timeout_secs = timeout_secs;
        }
        if let Some(max_retries) = overrides.upstream_max_retries {
            self.upstream.max_retries = max_retries;
        }
        if let Some(policy) = overrides.search_failure_policy {
            self.upstream.search_failure_policy = policy;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_upstream(&self.upstream)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("crmlink.toml"), PathBuf::from("config/crmlink.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_upstream(upstream: &UpstreamConfig) -> Result<(), ConfigError> {
    if !is_http_url(upstream.base_url.trim()) {
        return Err(ConfigError::Validation(
            "upstream.base_url must start with http:// or https://".to_string(),
        ));
    }

    if upstream.api_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "upstream.api_token is required. Get it from Pipedrive > Personal preferences > API"
                .to_string(),
        ));
    }

    if !is_http_url(upstream.app_url.trim()) {
        return Err(ConfigError::Validation(
            "upstream.app_url must start with http:// or https://".to_string(),
        ));
    }

    if upstream.timeout_secs == 0 || upstream.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "upstream.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if upstream.max_retries > 10 {
        return Err(ConfigError::Validation(
            "upstream.max_retries must be in range 0..=10".to_string(),
        ));
    }

    if upstream.retry_base_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "upstream.retry_base_delay_ms must be greater than zero".to_string(),
        ));
    }

    if upstream.retry_max_delay_ms < upstream.retry_base_delay_ms {
        return Err(ConfigError::Validation(
            "upstream.retry_max_delay_ms must not be below upstream.retry_base_delay_ms"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    upstream: Option<UpstreamPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamPatch {
    base_url: Option<String>,
    api_token: Option<String>,
    app_url: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
    search_failure_policy: Option<SearchFailurePolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
