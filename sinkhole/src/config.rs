use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{Level, level_filters::LevelFilter};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default, ValueEnum)]
pub enum LogLevel {
    #[serde(rename = "trace")]
    Trace,
    #[serde(rename = "debug")]
    Debug,
    #[default]
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl From<LogLevel> for Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        LevelFilter::from_level(value.into())
    }
}

/// Command line flags. Anything given here overrides the config file.
#[derive(Debug, Parser)]
#[command(name = "sinkhole", version, about = "Blocklist-filtering DNS proxy")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, env = "SINKHOLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to answer DNS queries on
    #[arg(long)]
    pub port: Option<u16>,

    /// Path to the blocklist file
    #[arg(long)]
    pub blocklist: Option<PathBuf>,

    /// Upstream DNS server address (host:port)
    #[arg(long)]
    pub upstream: Option<SocketAddr>,

    /// Port for the web dashboard
    #[arg(long)]
    pub web_port: Option<u16>,

    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// IP address to listen on for DNS queries.
    #[serde(default = "default_server_ip")]
    pub ip: IpAddr,
    /// Port to listen on for DNS queries.
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Logging level for the server.
    #[serde(default)]
    pub log_level: LogLevel,
    /// Total budget for answering one query.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How long to wait for in-flight queries on shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            port: default_server_port(),
            log_level: LogLevel::default(),
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResolverConfig {
    #[serde(default = "default_upstream")]
    pub upstream: SocketAddr,
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            upstream: default_upstream(),
            timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlocklistConfig {
    #[serde(default = "default_blocklist_path")]
    pub path: PathBuf,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            path: default_blocklist_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_server_ip")]
    pub ip: IpAddr,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Directory with the static dashboard files.
    #[serde(default = "default_dashboard_dir")]
    pub dashboard_dir: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            port: default_web_port(),
            dashboard_dir: default_dashboard_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub blocklist: BlocklistConfig,
    #[serde(default)]
    pub web: WebConfig,
}

impl Config {
    /// Apply command line overrides on top of file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(path) = &cli.blocklist {
            self.blocklist.path = path.clone();
        }
        if let Some(upstream) = cli.upstream {
            self.resolver.upstream = upstream;
        }
        if let Some(port) = cli.web_port {
            self.web.port = port;
        }
        if let Some(level) = cli.log_level {
            self.server.log_level = level;
        }
    }

    pub fn dns_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.ip, self.server.port)
    }

    pub fn web_addr(&self) -> SocketAddr {
        SocketAddr::new(self.web.ip, self.web.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.server.shutdown_grace_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver.timeout_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },
}

fn decode_from_path(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Decode {
        path: path.to_path_buf(),
        message: e.message().into(),
    })
}

/// Load the config, then apply command line overrides.
///
/// A missing file is only tolerated at the default location, where built-in
/// defaults take its place.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => decode_from_path(path)?,
        None => match decode_from_path(Path::new(DEFAULT_CONFIG_PATH)) {
            Ok(cfg) => cfg,
            Err(ConfigError::NotFound(_)) => Config::default(),
            Err(e) => return Err(e.into()),
        },
    };

    config.apply_cli(cli);
    Ok(config)
}

fn default_server_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_server_port() -> u16 {
    53
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_upstream() -> SocketAddr {
    SocketAddr::from(([1, 1, 1, 1], 53))
}

fn default_upstream_timeout_ms() -> u64 {
    3000
}

fn default_blocklist_path() -> PathBuf {
    PathBuf::from("./config/blocklist.txt")
}

fn default_web_port() -> u16 {
    8080
}

fn default_dashboard_dir() -> PathBuf {
    PathBuf::from("./dashboard")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["sinkhole"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.dns_addr(), "0.0.0.0:53".parse().unwrap());
        assert_eq!(config.web_addr(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.resolver.upstream, "1.1.1.1:53".parse().unwrap());
        assert_eq!(config.upstream_timeout(), Duration::from_secs(3));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.server.log_level, LogLevel::Info);
        assert_eq!(config.blocklist.path, PathBuf::from("./config/blocklist.txt"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 5353
            log_level = "debug"

            [resolver]
            upstream = "9.9.9.9:53"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 5353);
        assert_eq!(config.server.log_level, LogLevel::Debug);
        assert_eq!(config.resolver.upstream, "9.9.9.9:53".parse().unwrap());
        assert_eq!(config.resolver.timeout_ms, 3000);
        assert_eq!(config.web, WebConfig::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 5353\n\n[web]\nport = 9000").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = load_config(&cli(&[
            "--config",
            &path,
            "--port",
            "1053",
            "--upstream",
            "8.8.8.8:53",
            "--blocklist",
            "/tmp/list.txt",
            "--log-level",
            "warn",
        ]))
        .unwrap();

        assert_eq!(config.server.port, 1053);
        assert_eq!(config.web.port, 9000);
        assert_eq!(config.resolver.upstream, "8.8.8.8:53".parse().unwrap());
        assert_eq!(config.blocklist.path, PathBuf::from("/tmp/list.txt"));
        assert_eq!(config.server.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_explicit_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");

        let err = load_config(&cli(&["--config", path.to_str().unwrap()])).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_invalid_file_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a number\"").unwrap();

        let err = load_config(&cli(&["--config", file.path().to_str().unwrap()])).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
    }

    #[test]
    fn test_log_level_filter() {
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
        assert_eq!(LevelFilter::from(LogLevel::Error), LevelFilter::ERROR);
    }
}
