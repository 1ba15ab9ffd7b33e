use eyre::{Error, WrapErr};
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_CONFIG: &str = "research-match.toml";

#[derive(Debug, Default)]
pub struct Config {
    conf: toml::Table,
}

impl Config {
    pub fn load(file_name: &Path) -> Result<Config, Error> {
        let contents = std::fs::read_to_string(file_name)
            .wrap_err_with(|| format!("cannot load configuration file {}", file_name.display()))?;
        contents
            .parse::<Config>()
            .wrap_err_with(|| format!("cannot parse configuration file {}", file_name.display()))
    }

    /// Load the default configuration file if there is one.
    pub fn load_default() -> Result<Config, Error> {
        let path = Path::new(DEFAULT_CONFIG);
        if path.exists() {
            Config::load(path)
        } else {
            debug!("no {DEFAULT_CONFIG} found, using built-in defaults");
            Ok(Config::default())
        }
    }
}

impl FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Config, Self::Err> {
        Ok(Config {
            conf: toml::from_str(s)?,
        })
    }
}

pub fn get_config(config: &Config, section: &str, key: &str) -> Option<String> {
    config
        .conf
        .get(section)
        .and_then(|s| s.get(key))
        .map(|v| match v {
            toml::Value::String(s) => s.clone(),
            v => v.to_string(),
        })
}

fn get_parsed<T>(config: &Config, section: &str, key: &str, default: &str) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get_config(config, section, key)
        .unwrap_or_else(|| default.to_owned())
        .parse::<T>()
        .wrap_err_with(|| format!("cannot parse {section}.{key} configuration parameter"))
}

/// Service settings, resolved from the configuration file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub database_url: String,
    pub max_connections: u32,
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Settings {
    pub fn new(config: &Config) -> Result<Settings, Error> {
        let settings = Settings {
            bind: get_parsed(config, "server", "bind", "127.0.0.1:5000")?,
            database_url: get_config(config, "database", "url")
                .unwrap_or_else(|| "sqlite://research-match.db".to_owned()),
            max_connections: get_parsed(config, "database", "max_connections", "5")?,
            default_limit: get_parsed(config, "listing", "default_limit", "10")?,
            max_limit: get_parsed(config, "listing", "max_limit", "100")?,
        };
        ensure_positive("database.max_connections", settings.max_connections)?;
        ensure_positive("listing.max_limit", settings.max_limit)?;
        ensure_positive("listing.default_limit", settings.default_limit)?;
        Ok(settings)
    }
}

fn ensure_positive(name: impl Display, value: u32) -> Result<(), Error> {
    eyre::ensure!(value > 0, "{name} must be positive");
    Ok(())
}
