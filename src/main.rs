//! TLS-terminating TCP proxy.
//!
//! Accepts TLS connections, terminates TLS with the configured identity and
//! relays the plaintext stream to one fixed backend over TCP.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                  TLS PROXY                    │
//!   TLS client       │  ┌──────────┐   ┌───────────┐   ┌─────────┐  │   plain TCP
//!  ──────────────────┼─▶│ listener │──▶│ handshake │──▶│  relay  │──┼──────────▶ backend
//!                    │  └──────────┘   └───────────┘   └─────────┘  │
//!                    │        ▲               ▲                      │
//!                    │  ┌─────┴───────────────┴────┐  ┌───────────┐ │
//!                    │  │ tls: identity → configs  │  │ lifecycle │ │
//!                    │  └──────────────────────────┘  └───────────┘ │
//!                    └──────────────────────────────────────────────┘
//! ```
//!
//! Startup is ordered: build server TLS config → bind listener → resolve
//! backend → accept loop. Any startup error exits with status 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use tls_proxy::config::{read_config, validate_config, ConfigError, ProxyConfig};
use tls_proxy::lifecycle;
use tls_proxy::observability::logging::{self, LogFormat};
use tls_proxy::observability::metrics;
use tls_proxy::ProxyError;

#[derive(Parser, Debug)]
#[command(name = "tls-proxy", version)]
#[command(about = "Terminate TLS and relay connections to a fixed TCP backend", long_about = None)]
struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen on this TCP address
    #[arg(long)]
    bind: Option<String>,

    /// Proxy connections to this TCP address
    #[arg(long)]
    proxy: Option<String>,

    /// Location of TLS CA file
    #[arg(long)]
    ca_file: Option<PathBuf>,

    /// Location of TLS cert file
    #[arg(long)]
    cert_file: Option<PathBuf>,

    /// Location of TLS key file
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Seconds each socket may live after accept or dial
    #[arg(long)]
    deadline_secs: Option<u64>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Config file (or defaults) with flags applied on top, then validated.
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(proxy) = self.proxy {
            config.backend.address = proxy;
        }
        if self.ca_file.is_some() {
            config.tls.ca_file = self.ca_file;
        }
        if self.cert_file.is_some() {
            config.tls.cert_file = self.cert_file;
        }
        if self.key_file.is_some() {
            config.tls.key_file = self.key_file;
        }
        if let Some(secs) = self.deadline_secs {
            config.timeouts.deadline_secs = secs;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(
        config.observability.log_format,
        &config.observability.log_level,
    );

    tracing::info!("tls-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ProxyConfig) -> Result<(), ProxyError> {
    if config.observability.metrics_enabled {
        // validated as a socket address
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr)?;
        }
    }

    let relay = lifecycle::start(&config).await?;

    tokio::select! {
        _ = relay.run() => {}
        _ = lifecycle::signals::wait_for_termination() => {
            tracing::info!("Termination signal received, exiting");
        }
    }

    Ok(())
}
