use std::{fs::read_to_string, net::SocketAddr, str::FromStr};

use anyhow::{Result, anyhow};
use clap::Parser;
use serde::Deserialize;

use service::limits::MAX_OPEN_TRANSACTIONS;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Server {
    ///
    /// UDP address the proxy listens for CoAP datagrams on.
    ///
    pub bind: SocketAddr,
    ///
    /// Address advertised as the proxy's own interface, used to reject a
    /// `Proxy-Uri` that points back at the proxy itself.
    ///
    pub external: SocketAddr,
    ///
    /// Upper bound on concurrently in-flight transaction pairs. Narrows,
    /// but can never exceed, the compiled `MAX_OPEN_TRANSACTIONS` ceiling.
    ///
    #[serde(default = "Server::max_open_transactions")]
    pub max_open_transactions: usize,
    ///
    /// Upper bound on cached responses.
    ///
    #[serde(default = "Server::max_cache_entries")]
    pub max_cache_entries: usize,
}

impl Server {
    fn max_open_transactions() -> usize {
        MAX_OPEN_TRANSACTIONS
    }

    fn max_cache_entries() -> usize {
        MAX_OPEN_TRANSACTIONS
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Cache {
    ///
    /// Used when the origin's `Max-Age` is absent or zero.
    ///
    #[serde(default = "Cache::default_max_age_secs")]
    pub default_max_age_secs: u32,
    ///
    /// Ceiling an oversize `Max-Age` is clamped to.
    ///
    #[serde(default = "Cache::max_age_ceiling_secs")]
    pub max_age_ceiling_secs: u32,
}

impl Cache {
    fn default_max_age_secs() -> u32 {
        60
    }

    fn max_age_ceiling_secs() -> u32 {
        86_400
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            default_max_age_secs: Self::default_max_age_secs(),
            max_age_ceiling_secs: Self::max_age_ceiling_secs(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub server: Server,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    ///
    /// Specify the configuration file path
    ///
    /// Example: coap-proxy --config /etc/coap-proxy/config.json5
    ///
    #[arg(long, short)]
    config: String,
}

impl Config {
    ///
    /// Load configuration from the file named on the command line.
    ///
    /// The compiled pool ceilings are hard limits: a config that asks for
    /// more than `MAX_OPEN_TRANSACTIONS` is rejected rather than silently
    /// clamped, since a silently smaller pool than the operator believes
    /// they configured is its own kind of bug.
    ///
    pub fn load() -> Result<Self> {
        let config: Self = serde_json5::from_str(&read_to_string(&Cli::parse().config)?)
            .map_err(|err| anyhow!("failed to parse config: {err}"))?;

        if config.server.max_open_transactions > MAX_OPEN_TRANSACTIONS {
            return Err(anyhow!(
                "server.max-open-transactions ({}) exceeds the compiled ceiling ({})",
                config.server.max_open_transactions,
                MAX_OPEN_TRANSACTIONS
            ));
        }

        if config.server.max_cache_entries > config.server.max_open_transactions {
            return Err(anyhow!(
                "server.max-cache-entries ({}) exceeds server.max-open-transactions ({})",
                config.server.max_cache_entries,
                config.server.max_open_transactions
            ));
        }

        Ok(config)
    }
}
