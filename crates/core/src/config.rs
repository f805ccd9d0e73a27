use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::autosave::AutosavePolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub stripe: StripeConfig,
    pub email: EmailConfig,
    pub autosave: AutosaveConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub enabled: bool,
    pub secret_key: Option<SecretString>,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub sender_name: String,
    pub sender_address: String,
    pub template_dir: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
    pub saved_display_ms: u64,
}

impl AutosaveConfig {
    pub fn policy(&self) -> AutosavePolicy {
        AutosavePolicy {
            debounce: Duration::from_millis(self.debounce_ms),
            saved_display: Duration::from_millis(self.saved_display_ms),
        }
    }
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub stripe_enabled: Option<bool>,
    pub stripe_secret_key: Option<String>,
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
            database: DatabaseConfig {
                url: "sqlite://tafel.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            stripe: StripeConfig {
                enabled: false,
                secret_key: None,
                api_base_url: "https://api.stripe.com".to_string(),
            },
            email: EmailConfig {
                sender_name: "Tafel Events".to_string(),
                sender_address: "events@tafel.example".to_string(),
                template_dir: None,
            },
            autosave: AutosaveConfig { debounce_ms: 800, saved_display_ms: 2_000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tafel.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
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

        if let Some(stripe) = patch.stripe {
            if let Some(enabled) = stripe.enabled {
                self.stripe.enabled = enabled;
            }
            if let Some(secret_key) = stripe.secret_key {
                self.stripe.secret_key = Some(secret_value(secret_key));
            }
            if let Some(api_base_url) = stripe.api_base_url {
                self.stripe.api_base_url = api_base_url;
            }
        }

        if let Some(email) = patch.email {
            if let Some(sender_name) = email.sender_name {
                self.email.sender_name = sender_name;
            }
            if let Some(sender_address) = email.sender_address {
                self.email.sender_address = sender_address;
            }
            if let Some(template_dir) = email.template_dir {
                self.email.template_dir = Some(template_dir);
            }
        }

        if let Some(autosave) = patch.autosave {
            if let Some(debounce_ms) = autosave.debounce_ms {
                self.autosave.debounce_ms = debounce_ms;
            }
            if let Some(saved_display_ms) = autosave.saved_display_ms {
                self.autosave.saved_display_ms = saved_display_ms;
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
        if let Some(value) = read_env("TAFEL_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TAFEL_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TAFEL_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TAFEL_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TAFEL_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TAFEL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TAFEL_SERVER_PORT") {
            self.server.port = parse_u16("TAFEL_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TAFEL_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TAFEL_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TAFEL_STRIPE_ENABLED") {
            self.stripe.enabled = parse_bool("TAFEL_STRIPE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("TAFEL_STRIPE_SECRET_KEY") {
            self.stripe.secret_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TAFEL_STRIPE_API_BASE_URL") {
            self.stripe.api_base_url = value;
        }

        if let Some(value) = read_env("TAFEL_EMAIL_SENDER_NAME") {
            self.email.sender_name = value;
        }
        if let Some(value) = read_env("TAFEL_EMAIL_SENDER_ADDRESS") {
            self.email.sender_address = value;
        }
        if let Some(value) = read_env("TAFEL_EMAIL_TEMPLATE_DIR") {
            self.email.template_dir = Some(value);
        }

        if let Some(value) = read_env("TAFEL_AUTOSAVE_DEBOUNCE_MS") {
            self.autosave.debounce_ms = parse_u64("TAFEL_AUTOSAVE_DEBOUNCE_MS", &value)?;
        }
        if let Some(value) = read_env("TAFEL_AUTOSAVE_SAVED_DISPLAY_MS") {
            self.autosave.saved_display_ms = parse_u64("TAFEL_AUTOSAVE_SAVED_DISPLAY_MS", &value)?;
        }

        let log_level = read_env("TAFEL_LOGGING_LEVEL").or_else(|| read_env("TAFEL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TAFEL_LOGGING_FORMAT").or_else(|| read_env("TAFEL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.stripe_enabled {
            self.stripe.enabled = enabled;
        }
        if let Some(secret_key) = overrides.stripe_secret_key {
            self.stripe.secret_key = Some(secret_value(secret_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_stripe(&self.stripe)?;
        validate_email(&self.email)?;
        validate_autosave(&self.autosave)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tafel.toml"), PathBuf::from("config/tafel.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
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

fn validate_stripe(stripe: &StripeConfig) -> Result<(), ConfigError> {
    if !stripe.enabled {
        return Ok(());
    }

    let Some(secret_key) = &stripe.secret_key else {
        return Err(ConfigError::Validation(
            "stripe.enabled is true but stripe.secret_key is missing".to_string(),
        ));
    };

    let exposed = secret_key.expose_secret();
    if exposed.trim().is_empty() {
        return Err(ConfigError::Validation("stripe.secret_key must not be empty".to_string()));
    }
    if !exposed.starts_with("sk_") && !exposed.starts_with("rk_") {
        let hint = if exposed.starts_with("pk_") {
            " (hint: you may have used the publishable key instead of the secret key)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "stripe.secret_key must start with `sk_` or `rk_`{hint}"
        )));
    }

    if !stripe.api_base_url.starts_with("http://") && !stripe.api_base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "stripe.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    if email.sender_name.trim().is_empty() {
        return Err(ConfigError::Validation("email.sender_name must not be empty".to_string()));
    }
    if !email.sender_address.contains('@') {
        return Err(ConfigError::Validation(
            "email.sender_address must be a valid address".to_string(),
        ));
    }
    Ok(())
}

fn validate_autosave(autosave: &AutosaveConfig) -> Result<(), ConfigError> {
    if autosave.debounce_ms == 0 || autosave.debounce_ms > 60_000 {
        return Err(ConfigError::Validation(
            "autosave.debounce_ms must be in range 1..=60000".to_string(),
        ));
    }
    if autosave.saved_display_ms == 0 {
        return Err(ConfigError::Validation(
            "autosave.saved_display_ms must be greater than zero".to_string(),
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    stripe: Option<StripePatch>,
    email: Option<EmailPatch>,
    autosave: Option<AutosavePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StripePatch {
    enabled: Option<bool>,
    secret_key: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    sender_name: Option<String>,
    sender_address: Option<String>,
    template_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AutosavePatch {
    debounce_ms: Option<u64>,
    saved_display_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
