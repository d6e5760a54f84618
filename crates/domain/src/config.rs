//! Configuration shared by the delay server, the load balancer and the proxy.
//!
//! Ports and relay topology come from argv or `config.properties`; listener
//! knobs come from optional `DELAY_ECHO_*` variables after `.env` hydration.

use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
};

use strum_macros::{AsRefStr, EnumString};
use thiserror::Error;

/// Properties file consulted when no port is given on the command line.
pub const DEFAULT_PROPERTIES_FILE: &str = "config.properties";
/// Key holding the listening port inside the properties file.
pub const PORT_PROPERTY: &str = "server_port";
pub const STRATEGY_PROPERTY: &str = "balancing_strategy";
pub const UPSTREAMS_PROPERTY: &str = "upstream_ports";
pub const BACKEND_PORT_PROPERTY: &str = "proxy_port";
pub const REQUEST_LOG_PROPERTY: &str = "request_log";
pub const RESPONSE_LOG_PROPERTY: &str = "response_log";

const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_RELAY_HOST: &str = "127.0.0.1";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Where the listening port was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PortSource {
    CommandLine,
    PropertiesFile,
}

/// Listener configuration: the port from argv or `config.properties`, the
/// rest from optional `DELAY_ECHO_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    port: u16,
    port_source: PortSource,
    bind_host: String,
    workers: Option<usize>,
    shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Loads the configuration. `args` are the process arguments without the
    /// program name; the first one, when present, is the port.
    pub fn load<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        hydrate_env_file()?;

        let (port, port_source) = match args.into_iter().next() {
            Some(arg) => (parse_port(&arg, "argv[1]")?, PortSource::CommandLine),
            None => {
                let properties = Properties::load(&properties_path())?;
                (properties.port(PORT_PROPERTY)?, PortSource::PropertiesFile)
            }
        };

        let workers = match get_optional_var("DELAY_ECHO_WORKERS") {
            Some(raw) => Some(parse_positive("DELAY_ECHO_WORKERS", &raw)?),
            None => None,
        };
        let shutdown_timeout_secs = match get_optional_var("DELAY_ECHO_SHUTDOWN_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse()
                .map_err(|source| ConfigError::InvalidNumber {
                    key: "DELAY_ECHO_SHUTDOWN_TIMEOUT_SECS".to_string(),
                    source,
                })?,
            None => DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        };

        Ok(Self {
            port,
            port_source,
            bind_host: get_optional_var("DELAY_ECHO_BIND_HOST")
                .unwrap_or_else(|| DEFAULT_BIND_HOST.to_string()),
            workers,
            shutdown_timeout_secs,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn port_source(&self) -> PortSource {
        self.port_source
    }

    pub fn bind_host(&self) -> &str {
        &self.bind_host
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.bind_host.clone(), self.port)
    }

    pub fn workers(&self) -> Option<usize> {
        self.workers
    }

    pub fn shutdown_timeout_secs(&self) -> u64 {
        self.shutdown_timeout_secs
    }
}

/// Upstream selection policy for the load balancer. Parsed from the
/// `ROUND_ROBIN` / `LEAST_RESPONSE_TIME` spelling used in argv and
/// `config.properties`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BalancingStrategy {
    RoundRobin,
    LeastResponseTime,
}

/// Load balancer settings: `<strategy> <port> <upstream>...` on the command
/// line, or `balancing_strategy`, `server_port` and `upstream_ports` from the
/// properties file when no arguments are given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancerConfig {
    strategy: BalancingStrategy,
    listen_host: String,
    listen_port: u16,
    upstream_host: String,
    upstream_ports: Vec<u16>,
}

impl BalancerConfig {
    pub fn load<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        hydrate_env_file()?;

        let args: Vec<String> = args.into_iter().collect();
        let (strategy, listen_port, upstream_ports) = match args.split_first() {
            None => {
                let properties = Properties::load(&properties_path())?;
                (
                    parse_strategy(properties.required(STRATEGY_PROPERTY)?)?,
                    properties.port(PORT_PROPERTY)?,
                    parse_port_list(properties.required(UPSTREAMS_PROPERTY)?)?,
                )
            }
            Some((strategy, rest)) => {
                let (port, upstreams) = rest
                    .split_first()
                    .ok_or(ConfigError::MissingArgument { name: "server_port" })?;
                let upstream_ports = upstreams
                    .iter()
                    .map(|raw| parse_port(raw, UPSTREAMS_PROPERTY))
                    .collect::<Result<Vec<_>, _>>()?;
                (parse_strategy(strategy)?, parse_port(port, "argv[2]")?, upstream_ports)
            }
        };

        if upstream_ports.is_empty() {
            return Err(ConfigError::NoUpstreams);
        }

        Ok(Self {
            strategy,
            listen_host: relay_listen_host(),
            listen_port,
            upstream_host: relay_upstream_host(),
            upstream_ports,
        })
    }

    pub fn strategy(&self) -> BalancingStrategy {
        self.strategy
    }

    pub fn listen_address(&self) -> (String, u16) {
        (self.listen_host.clone(), self.listen_port)
    }

    pub fn upstream_host(&self) -> &str {
        &self.upstream_host
    }

    pub fn upstream_ports(&self) -> &[u16] {
        &self.upstream_ports
    }
}

/// Logging TCP proxy settings, read from the properties file only:
/// `server_port`, `proxy_port`, `request_log` and `response_log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    listen_host: String,
    listen_port: u16,
    backend_host: String,
    backend_port: u16,
    request_log: PathBuf,
    response_log: PathBuf,
}

impl ProxyConfig {
    pub fn load() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let properties = Properties::load(&properties_path())?;
        Ok(Self {
            listen_host: relay_listen_host(),
            listen_port: properties.port(PORT_PROPERTY)?,
            backend_host: relay_upstream_host(),
            backend_port: properties.port(BACKEND_PORT_PROPERTY)?,
            request_log: PathBuf::from(properties.required(REQUEST_LOG_PROPERTY)?),
            response_log: PathBuf::from(properties.required(RESPONSE_LOG_PROPERTY)?),
        })
    }

    pub fn listen_address(&self) -> (String, u16) {
        (self.listen_host.clone(), self.listen_port)
    }

    pub fn backend_address(&self) -> (String, u16) {
        (self.backend_host.clone(), self.backend_port)
    }

    pub fn request_log(&self) -> &Path {
        &self.request_log
    }

    pub fn response_log(&self) -> &Path {
        &self.response_log
    }
}

fn properties_path() -> PathBuf {
    get_optional_var("DELAY_ECHO_PROPERTIES_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROPERTIES_FILE))
}

fn relay_listen_host() -> String {
    get_optional_var("DELAY_ECHO_BIND_HOST").unwrap_or_else(|| DEFAULT_RELAY_HOST.to_string())
}

fn relay_upstream_host() -> String {
    get_optional_var("DELAY_ECHO_UPSTREAM_HOST").unwrap_or_else(|| DEFAULT_RELAY_HOST.to_string())
}

/// `key=value` entries of a properties file, keyed by trimmed name.
struct Properties {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl Properties {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let to_error = |source| ConfigError::PropertiesFile {
            path: path.to_path_buf(),
            source,
        };

        let mut entries = HashMap::new();
        for entry in dotenvy::from_path_iter(path).map_err(to_error)? {
            let (key, value) = entry.map_err(to_error)?;
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    fn required(&self, key: &'static str) -> Result<&str, ConfigError> {
        match self.entries.get(key) {
            Some(value) if !value.is_empty() => Ok(value.as_str()),
            _ => Err(ConfigError::MissingProperty {
                key,
                path: self.path.clone(),
            }),
        }
    }

    fn port(&self, key: &'static str) -> Result<u16, ConfigError> {
        parse_port(self.required(key)?, key)
    }
}

fn parse_strategy(raw: &str) -> Result<BalancingStrategy, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidStrategy {
            value: raw.to_string(),
        })
}

/// Parses `8081, 8082,8083`; blank segments are skipped.
fn parse_port_list(raw: &str) -> Result<Vec<u16>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| parse_port(segment, UPSTREAMS_PROPERTY))
        .collect()
}

fn parse_port(raw: &str, key: &str) -> Result<u16, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|source| ConfigError::InvalidNumber {
            key: key.to_string(),
            source,
        })
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    let value: usize = raw.parse().map_err(|source| ConfigError::InvalidNumber {
        key: key.to_string(),
        source,
    })?;
    if value == 0 {
        return Err(ConfigError::NotPositive { key });
    }
    Ok(value)
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("DELAY_ECHO_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration, the properties file or argument
/// parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("property `{key}` missing from {}", path.display())]
    MissingProperty { key: &'static str, path: PathBuf },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("missing command-line argument `{name}`")]
    MissingArgument { name: &'static str },
    #[error("unknown balancing strategy `{value}`")]
    InvalidStrategy { value: String },
    #[error("at least one upstream port is required")]
    NoUpstreams,
    #[error("`{key}` must be greater than zero")]
    NotPositive { key: &'static str },
    #[error("failed to read properties file {}: {source}", path.display())]
    PropertiesFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
