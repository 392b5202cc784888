use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub webhook: WebhookConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub base_url: String,
    pub bot_token: SecretString,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub token: SecretString,
    pub public_url: String,
    pub command_trigger: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub chat_base_url: Option<String>,
    pub chat_bot_token: Option<String>,
    pub webhook_token: Option<String>,
    pub webhook_public_url: Option<String>,
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
            chat: ChatConfig {
                base_url: "http://localhost:8065".to_string(),
                bot_token: String::new().into(),
                timeout_secs: 10,
            },
            webhook: WebhookConfig {
                token: String::new().into(),
                public_url: "http://localhost:8085".to_string(),
                command_trigger: "rent-a-carlos".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8085,
                health_check_port: 8086,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("rent-a-carlos.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(chat) = patch.chat {
            if let Some(base_url) = chat.base_url {
                self.chat.base_url = base_url;
            }
            if let Some(bot_token) = chat.bot_token {
                self.chat.bot_token = secret_value(bot_token);
            }
            if let Some(timeout_secs) = chat.timeout_secs {
                self.chat.timeout_secs = timeout_secs;
            }
        }

        if let Some(webhook) = patch.webhook {
            if let Some(token) = webhook.token {
                self.webhook.token = secret_value(token);
            }
            if let Some(public_url) = webhook.public_url {
                self.webhook.public_url = public_url;
            }
            if let Some(command_trigger) = webhook.command_trigger {
                self.webhook.command_trigger = command_trigger;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
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
        if let Some(value) = read_env("CARLOS_CHAT_BASE_URL") {
            self.chat.base_url = value;
        }
        if let Some(value) = read_env("CARLOS_CHAT_BOT_TOKEN") {
            self.chat.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("CARLOS_CHAT_TIMEOUT_SECS") {
            self.chat.timeout_secs = parse_u64("CARLOS_CHAT_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CARLOS_WEBHOOK_TOKEN") {
            self.webhook.token = secret_value(value);
        }
        if let Some(value) = read_env("CARLOS_WEBHOOK_PUBLIC_URL") {
            self.webhook.public_url = value;
        }
        if let Some(value) = read_env("CARLOS_WEBHOOK_COMMAND_TRIGGER") {
            self.webhook.command_trigger = value;
        }

        if let Some(value) = read_env("CARLOS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CARLOS_SERVER_PORT") {
            self.server.port = parse_u16("CARLOS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CARLOS_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("CARLOS_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("CARLOS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CARLOS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("CARLOS_LOGGING_LEVEL").or_else(|| read_env("CARLOS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CARLOS_LOGGING_FORMAT").or_else(|| read_env("CARLOS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.chat_base_url {
            self.chat.base_url = base_url;
        }
        if let Some(bot_token) = overrides.chat_bot_token {
            self.chat.bot_token = secret_value(bot_token);
        }
        if let Some(token) = overrides.webhook_token {
            self.webhook.token = secret_value(token);
        }
        if let Some(public_url) = overrides.webhook_public_url {
            self.webhook.public_url = public_url;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_chat(&self.chat)?;
        validate_webhook(&self.webhook)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("rent-a-carlos.toml"), PathBuf::from("config/rent-a-carlos.toml")]
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

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    if !is_http_url(chat.base_url.trim()) {
        return Err(ConfigError::Validation(
            "chat.base_url must start with http:// or https://".to_string(),
        ));
    }

    if chat.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "chat.bot_token is required. Create a bot account in System Console > Integrations > Bot Accounts and copy its access token".to_string(),
        ));
    }

    if chat.timeout_secs == 0 || chat.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "chat.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_webhook(webhook: &WebhookConfig) -> Result<(), ConfigError> {
    let token = webhook.token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "webhook.token is required; it authenticates every button, dialog and command callback"
                .to_string(),
        ));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "webhook.token must not contain whitespace".to_string(),
        ));
    }

    if !is_http_url(webhook.public_url.trim()) {
        return Err(ConfigError::Validation(
            "webhook.public_url must start with http:// or https://".to_string(),
        ));
    }

    let trigger = webhook.command_trigger.trim();
    if trigger.is_empty() || trigger.starts_with('/') || trigger.chars().any(char::is_whitespace)
    {
        return Err(ConfigError::Validation(
            "webhook.command_trigger must be a single word without a leading `/`".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.health_check_port == server.port {
        return Err(ConfigError::Validation(
            "server.health_check_port must differ from server.port".to_string(),
        ));
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

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    chat: Option<ChatPatch>,
    webhook: Option<WebhookPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    base_url: Option<String>,
    bot_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPatch {
    token: Option<String>,
    public_url: Option<String>,
    command_trigger: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
