use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commission::partners::DEFAULT_VAT_RATE_PERCENT;
use crate::commission::CalculationSettings;
use crate::domain::development::DevelopmentCatalog;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub commission: CommissionSettings,
    pub developments: DevelopmentsConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommissionSettings {
    pub vat_rate_percent: Decimal,
    pub default_commission_percent: Decimal,
}

/// Extra alias -> canonical development spellings, on top of the built-in set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DevelopmentsConfig {
    pub aliases: BTreeMap<String, String>,
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
    pub vat_rate_percent: Option<Decimal>,
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
                url: "sqlite://brokerage.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            commission: CommissionSettings::default(),
            developments: DevelopmentsConfig::default(),
        }
    }
}

impl Default for CommissionSettings {
    fn default() -> Self {
        Self {
            vat_rate_percent: DEFAULT_VAT_RATE_PERCENT,
            default_commission_percent: Decimal::ONE_HUNDRED,
        }
    }
}

impl CommissionSettings {
    pub fn calculation_settings(&self) -> CalculationSettings {
        CalculationSettings {
            commission_percent: self.default_commission_percent,
            vat_rate_percent: self.vat_rate_percent,
        }
    }
}

impl DevelopmentsConfig {
    pub fn catalog(&self) -> DevelopmentCatalog {
        DevelopmentCatalog::with_extra_aliases(
            self.aliases.iter().map(|(alias, canonical)| (alias.clone(), canonical.clone())),
        )
    }
}

impl FromStr for LogFormat {
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("brokerage.toml"));
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

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(commission) = patch.commission {
            if let Some(vat_rate_percent) = commission.vat_rate_percent {
                self.commission.vat_rate_percent = vat_rate_percent;
            }
            if let Some(default_commission_percent) = commission.default_commission_percent {
                self.commission.default_commission_percent = default_commission_percent;
            }
        }

        if let Some(developments) = patch.developments {
            self.developments.aliases.extend(developments.aliases);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BROKERAGE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BROKERAGE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("BROKERAGE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BROKERAGE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BROKERAGE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("BROKERAGE_LOGGING_LEVEL").or_else(|| read_env("BROKERAGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BROKERAGE_LOGGING_FORMAT").or_else(|| read_env("BROKERAGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("BROKERAGE_VAT_RATE") {
            self.commission.vat_rate_percent = parse_decimal("BROKERAGE_VAT_RATE", &value)?;
        }
        if let Some(value) = read_env("BROKERAGE_COMMISSION_PERCENT") {
            self.commission.default_commission_percent =
                parse_decimal("BROKERAGE_COMMISSION_PERCENT", &value)?;
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
        if let Some(vat_rate_percent) = overrides.vat_rate_percent {
            self.commission.vat_rate_percent = vat_rate_percent;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        validate_commission(&self.commission)?;
        validate_developments(&self.developments)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("brokerage.toml"), PathBuf::from("config/brokerage.toml")]
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

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_commission(commission: &CommissionSettings) -> Result<(), ConfigError> {
    if commission.vat_rate_percent < Decimal::ZERO
        || commission.vat_rate_percent > Decimal::ONE_HUNDRED
    {
        return Err(ConfigError::Validation(format!(
            "commission.vat_rate_percent must be in range 0..=100 (got {})",
            commission.vat_rate_percent
        )));
    }

    if commission.default_commission_percent <= Decimal::ZERO
        || commission.default_commission_percent > Decimal::ONE_HUNDRED
    {
        return Err(ConfigError::Validation(format!(
            "commission.default_commission_percent must be greater than 0 and at most 100 (got {})",
            commission.default_commission_percent
        )));
    }

    Ok(())
}

fn validate_developments(developments: &DevelopmentsConfig) -> Result<(), ConfigError> {
    if let Some((alias, _)) = developments
        .aliases
        .iter()
        .find(|(alias, canonical)| alias.trim().is_empty() || canonical.trim().is_empty())
    {
        return Err(ConfigError::Validation(format!(
            "developments.aliases entry `{alias}` must map a non-empty alias to a non-empty development"
        )));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
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

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    commission: Option<CommissionPatch>,
    developments: Option<DevelopmentsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct CommissionPatch {
    vat_rate_percent: Option<Decimal>,
    default_commission_percent: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct DevelopmentsPatch {
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}
