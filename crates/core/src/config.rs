use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub line: LineConfig,
    pub llm: LlmConfig,
    pub hotpepper: HotpepperConfig,
    pub billing: BillingConfig,
    pub server: ServerConfig,
    pub recommend: RecommendConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LineConfig {
    pub channel_secret: SecretString,
    pub channel_access_token: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct HotpepperConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub page_size: u32,
    pub result_cap: u32,
}

#[derive(Clone, Debug)]
pub struct BillingConfig {
    pub api_key: Option<SecretString>,
    pub api_base_url: String,
    pub webhook_secret: Option<String>,
    pub portal_return_url: Option<String>,
    /// Plan id → payment-provider price id, configured per deployment.
    pub prices: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RecommendConfig {
    /// How many shops one selection prompt asks the model for.
    pub pick_limit: u32,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub line_channel_secret: Option<String>,
    pub line_channel_access_token: Option<String>,
    pub llm_api_key: Option<String>,
    pub hotpepper_api_key: Option<String>,
    pub billing_api_key: Option<String>,
    pub pick_limit: Option<u32>,
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
                url: "sqlite://meshitomo.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            line: LineConfig {
                channel_secret: String::new().into(),
                channel_access_token: String::new().into(),
                api_base_url: "https://api.line.me".to_string(),
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                timeout_secs: 60,
            },
            hotpepper: HotpepperConfig {
                api_key: None,
                base_url: "https://webservice.recruit.co.jp/hotpepper/gourmet/v1/".to_string(),
                page_size: 20,
                result_cap: 100,
            },
            billing: BillingConfig {
                api_key: None,
                api_base_url: "https://api.stripe.com".to_string(),
                webhook_secret: None,
                portal_return_url: None,
                prices: HashMap::new(),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            recommend: RecommendConfig { pick_limit: 1 },
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("meshitomo.toml"));
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

        if let Some(line) = patch.line {
            if let Some(channel_secret) = line.channel_secret {
                self.line.channel_secret = secret_value(channel_secret);
            }
            if let Some(channel_access_token) = line.channel_access_token {
                self.line.channel_access_token = secret_value(channel_access_token);
            }
            if let Some(api_base_url) = line.api_base_url {
                self.line.api_base_url = api_base_url;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(hotpepper) = patch.hotpepper {
            if let Some(api_key) = hotpepper.api_key {
                self.hotpepper.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = hotpepper.base_url {
                self.hotpepper.base_url = base_url;
            }
            if let Some(page_size) = hotpepper.page_size {
                self.hotpepper.page_size = page_size;
            }
            if let Some(result_cap) = hotpepper.result_cap {
                self.hotpepper.result_cap = result_cap;
            }
        }

        if let Some(billing) = patch.billing {
            if let Some(api_key) = billing.api_key {
                self.billing.api_key = Some(secret_value(api_key));
            }
            if let Some(api_base_url) = billing.api_base_url {
                self.billing.api_base_url = api_base_url;
            }
            if let Some(webhook_secret) = billing.webhook_secret {
                self.billing.webhook_secret = Some(webhook_secret);
            }
            if let Some(portal_return_url) = billing.portal_return_url {
                self.billing.portal_return_url = Some(portal_return_url);
            }
            if let Some(prices) = billing.prices {
                self.billing.prices = prices;
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

        if let Some(recommend) = patch.recommend {
            if let Some(pick_limit) = recommend.pick_limit {
                self.recommend.pick_limit = pick_limit;
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
        if let Some(value) = read_env("MESHITOMO_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("MESHITOMO_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("MESHITOMO_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("MESHITOMO_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("MESHITOMO_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MESHITOMO_LINE_CHANNEL_SECRET") {
            self.line.channel_secret = secret_value(value);
        }
        if let Some(value) = read_env("MESHITOMO_LINE_CHANNEL_ACCESS_TOKEN") {
            self.line.channel_access_token = secret_value(value);
        }
        if let Some(value) = read_env("MESHITOMO_LINE_API_BASE_URL") {
            self.line.api_base_url = value;
        }

        if let Some(value) = read_env("MESHITOMO_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MESHITOMO_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("MESHITOMO_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("MESHITOMO_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("MESHITOMO_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MESHITOMO_HOTPEPPER_API_KEY") {
            self.hotpepper.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MESHITOMO_HOTPEPPER_BASE_URL") {
            self.hotpepper.base_url = value;
        }
        if let Some(value) = read_env("MESHITOMO_HOTPEPPER_RESULT_CAP") {
            self.hotpepper.result_cap = parse_u32("MESHITOMO_HOTPEPPER_RESULT_CAP", &value)?;
        }

        if let Some(value) = read_env("MESHITOMO_BILLING_API_KEY") {
            self.billing.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MESHITOMO_BILLING_API_BASE_URL") {
            self.billing.api_base_url = value;
        }
        if let Some(value) = read_env("MESHITOMO_BILLING_WEBHOOK_SECRET") {
            self.billing.webhook_secret = Some(value);
        }
        if let Some(value) = read_env("MESHITOMO_BILLING_PORTAL_RETURN_URL") {
            self.billing.portal_return_url = Some(value);
        }

        if let Some(value) = read_env("MESHITOMO_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MESHITOMO_SERVER_PORT") {
            self.server.port = parse_u16("MESHITOMO_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MESHITOMO_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MESHITOMO_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("MESHITOMO_RECOMMEND_PICK_LIMIT") {
            self.recommend.pick_limit = parse_u32("MESHITOMO_RECOMMEND_PICK_LIMIT", &value)?;
        }

        let log_level =
            read_env("MESHITOMO_LOGGING_LEVEL").or_else(|| read_env("MESHITOMO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MESHITOMO_LOGGING_FORMAT").or_else(|| read_env("MESHITOMO_LOG_FORMAT"));
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
        if let Some(channel_secret) = overrides.line_channel_secret {
            self.line.channel_secret = secret_value(channel_secret);
        }
        if let Some(channel_access_token) = overrides.line_channel_access_token {
            self.line.channel_access_token = secret_value(channel_access_token);
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(hotpepper_api_key) = overrides.hotpepper_api_key {
            self.hotpepper.api_key = Some(secret_value(hotpepper_api_key));
        }
        if let Some(billing_api_key) = overrides.billing_api_key {
            self.billing.api_key = Some(secret_value(billing_api_key));
        }
        if let Some(pick_limit) = overrides.pick_limit {
            self.recommend.pick_limit = pick_limit;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_line(&self.line)?;
        validate_llm(&self.llm)?;
        validate_hotpepper(&self.hotpepper)?;
        validate_server(&self.server)?;
        validate_recommend(&self.recommend)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("meshitomo.toml"), PathBuf::from("config/meshitomo.toml")]
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

fn validate_line(line: &LineConfig) -> Result<(), ConfigError> {
    if line.channel_secret.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "line.channel_secret is required. Get it from the LINE Developers console > Messaging API > Channel secret".to_string(),
        ));
    }
    if line.channel_access_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "line.channel_access_token is required. Issue one from the LINE Developers console > Messaging API > Channel access token".to_string(),
        ));
    }
    if !line.api_base_url.starts_with("http://") && !line.api_base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "line.api_base_url must start with http:// or https://".to_string(),
        ));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let missing =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation("llm.api_key is required".to_string()));
    }

    Ok(())
}

fn validate_hotpepper(hotpepper: &HotpepperConfig) -> Result<(), ConfigError> {
    let missing = hotpepper
        .api_key
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation("hotpepper.api_key is required".to_string()));
    }

    if hotpepper.page_size == 0 || hotpepper.page_size > 100 {
        return Err(ConfigError::Validation(
            "hotpepper.page_size must be in range 1..=100".to_string(),
        ));
    }

    if hotpepper.result_cap == 0 {
        return Err(ConfigError::Validation(
            "hotpepper.result_cap must be greater than zero".to_string(),
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

fn validate_recommend(recommend: &RecommendConfig) -> Result<(), ConfigError> {
    if recommend.pick_limit == 0 || recommend.pick_limit > 5 {
        return Err(ConfigError::Validation(
            "recommend.pick_limit must be in range 1..=5".to_string(),
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
    database: Option<DatabasePatch>,
    line: Option<LinePatch>,
    llm: Option<LlmPatch>,
    hotpepper: Option<HotpepperPatch>,
    billing: Option<BillingPatch>,
    server: Option<ServerPatch>,
    recommend: Option<RecommendPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LinePatch {
    channel_secret: Option<String>,
    channel_access_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HotpepperPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    page_size: Option<u32>,
    result_cap: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct BillingPatch {
    api_key: Option<String>,
    api_base_url: Option<String>,
    webhook_secret: Option<String>,
    portal_return_url: Option<String>,
    prices: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendPatch {
    pick_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
