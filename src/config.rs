//! Configuration module for sock-bench.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over the built-in defaults.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Which side of the benchmark this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Accept TCP connections one at a time and drain them
    TcpServer,
    /// Connect, greet, then stream filler data and report throughput
    TcpClient,
    /// Echo every UDP datagram back to its sender
    UdpServer,
    /// Send the greeting over UDP once per interval and wait for the echo
    UdpClient,
}

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "sock-bench")]
#[command(version)]
#[command(about = "TCP/UDP throughput benchmark client and server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Role to run
    #[arg(short, long, value_enum)]
    pub role: Option<Role>,

    /// Local address to listen on
    #[arg(long)]
    pub listen_host: Option<String>,

    /// Local port to listen on
    #[arg(short = 'p', long)]
    pub listen_port: Option<u16>,

    /// Number of pending connections the listen queue holds
    #[arg(long)]
    pub queue_depth: Option<u32>,

    /// Server scratch buffer size in bytes
    #[arg(long)]
    pub read_buffer_size: Option<usize>,

    /// Remote address to connect or send to
    #[arg(long)]
    pub remote_host: Option<String>,

    /// Remote port to connect or send to
    #[arg(long)]
    pub remote_port: Option<u16>,

    /// Client filler buffer size in bytes
    #[arg(short = 'l', long)]
    pub write_buffer_size: Option<usize>,

    /// Value of every filler byte
    #[arg(long)]
    pub filler_byte: Option<u8>,

    /// Greeting sent before streaming (a NUL terminator is appended)
    #[arg(long)]
    pub greeting: Option<String>,

    /// Throughput reporting interval in microseconds
    #[arg(short = 'i', long)]
    pub report_interval_us: Option<u64>,

    /// Stop streaming after this many filler bytes (default: never)
    #[arg(short = 'n', long)]
    pub max_bytes: Option<u64>,

    /// UDP receive buffer size in bytes
    #[arg(long)]
    pub udp_buffer_size: Option<usize>,

    /// UDP client receive timeout in milliseconds
    #[arg(long)]
    pub udp_timeout_ms: Option<u64>,

    /// UDP client pause between rounds in milliseconds
    #[arg(long)]
    pub udp_interval_ms: Option<u64>,

    /// Number of UDP client rounds (default: never stop)
    #[arg(long)]
    pub rounds: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub udp: UdpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct GeneralConfig {
    pub role: Option<Role>,
}

/// Server-side settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: u32,
    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_listen_port(),
            queue_depth: default_queue_depth(),
            read_buffer_size: default_buffer_size(),
        }
    }
}

/// Client-side settings
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_remote_host")]
    pub host: String,
    #[serde(default = "default_remote_port")]
    pub port: u16,
    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,
    #[serde(default = "default_filler_byte")]
    pub filler_byte: u8,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_report_interval_us")]
    pub report_interval_us: u64,
    pub max_bytes: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_remote_host(),
            port: default_remote_port(),
            write_buffer_size: default_buffer_size(),
            filler_byte: default_filler_byte(),
            greeting: default_greeting(),
            report_interval_us: default_report_interval_us(),
            max_bytes: None,
        }
    }
}

/// UDP echo settings
#[derive(Debug, Deserialize)]
pub struct UdpConfig {
    #[serde(default = "default_udp_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_udp_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_udp_interval_ms")]
    pub interval_ms: u64,
    pub rounds: Option<u64>,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_udp_buffer_size(),
            timeout_ms: default_udp_timeout_ms(),
            interval_ms: default_udp_interval_ms(),
            rounds: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
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

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    12345
}

fn default_queue_depth() -> u32 {
    1
}

fn default_buffer_size() -> usize {
    2 * 1024
}

fn default_remote_host() -> String {
    "192.168.1.102".to_string()
}

fn default_remote_port() -> u16 {
    12344
}

fn default_filler_byte() -> u8 {
    97 // b'a'
}

fn default_greeting() -> String {
    "Hello!".to_string()
}

fn default_report_interval_us() -> u64 {
    2_000 * 1_000 // 2 seconds
}

fn default_udp_buffer_size() -> usize {
    128
}

fn default_udp_timeout_ms() -> u64 {
    1_000
}

fn default_udp_interval_ms() -> u64 {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub listen_host: String,
    pub listen_port: u16,
    pub queue_depth: u32,
    pub read_buffer_size: usize,
    pub remote_host: String,
    pub remote_port: u16,
    pub write_buffer_size: usize,
    pub filler_byte: u8,
    pub greeting: String,
    pub report_interval_us: u64,
    pub max_bytes: Option<u64>,
    pub udp_buffer_size: usize,
    pub udp_timeout_ms: u64,
    pub udp_interval_ms: u64,
    pub rounds: Option<u64>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let server = ServerConfig::default();
        let client = ClientConfig::default();
        let udp = UdpConfig::default();

        Config {
            role: Role::TcpServer,
            listen_host: server.host,
            listen_port: server.port,
            queue_depth: server.queue_depth,
            read_buffer_size: server.read_buffer_size,
            remote_host: client.host,
            remote_port: client.port,
            write_buffer_size: client.write_buffer_size,
            filler_byte: client.filler_byte,
            greeting: client.greeting,
            report_interval_us: client.report_interval_us,
            max_bytes: client.max_bytes,
            udp_buffer_size: udp.buffer_size,
            udp_timeout_ms: udp.timeout_ms,
            udp_interval_ms: udp.interval_ms,
            rounds: udp.rounds,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over a parsed TOML config and validate the result.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let TomlConfig {
            general,
            server,
            client,
            udp,
            logging,
        } = toml_config;

        let config = Config {
            role: cli.role.or(general.role).ok_or(ConfigError::MissingRole)?,
            listen_host: cli.listen_host.unwrap_or(server.host),
            listen_port: cli.listen_port.unwrap_or(server.port),
            queue_depth: cli.queue_depth.unwrap_or(server.queue_depth),
            read_buffer_size: cli.read_buffer_size.unwrap_or(server.read_buffer_size),
            remote_host: cli.remote_host.unwrap_or(client.host),
            remote_port: cli.remote_port.unwrap_or(client.port),
            write_buffer_size: cli.write_buffer_size.unwrap_or(client.write_buffer_size),
            filler_byte: cli.filler_byte.unwrap_or(client.filler_byte),
            greeting: cli.greeting.unwrap_or(client.greeting),
            report_interval_us: cli.report_interval_us.unwrap_or(client.report_interval_us),
            max_bytes: cli.max_bytes.or(client.max_bytes),
            udp_buffer_size: cli.udp_buffer_size.unwrap_or(udp.buffer_size),
            udp_timeout_ms: cli.udp_timeout_ms.unwrap_or(udp.timeout_ms),
            udp_interval_ms: cli.udp_interval_ms.unwrap_or(udp.interval_ms),
            rounds: cli.rounds.or(udp.rounds),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                logging.level
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be at least 1"));
        }
        if self.read_buffer_size == 0 || self.write_buffer_size == 0 || self.udp_buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer sizes must be non-zero"));
        }
        if self.report_interval_us == 0 {
            return Err(ConfigError::Invalid("report_interval_us must be non-zero"));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    MissingRole,
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::MissingRole => {
                write!(f, "No role given: pass --role or set [general] role")
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
