#![deny(unsafe_code)]

//! hapadmin: administer every HAProxy process of an installation at once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hapadmin_config::AppConfig;
use hapadmin_core::{HaProxy, MetricValue, ServerState, Weight};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Query and control HAProxy over its stats sockets.
#[derive(Parser)]
#[command(name = "hapadmin", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "hapadmin.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory holding one stats socket per process.
    #[arg(long, global = true)]
    socket_dir: Option<String>,

    /// A single stats socket.
    #[arg(long, global = true, conflicts_with = "socket_dir")]
    socket_file: Option<String>,

    /// TCP stats socket as host:port; repeat for several processes.
    #[arg(long = "address", global = true, conflicts_with_all = ["socket_dir", "socket_file"])]
    addresses: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the info block of every process.
    Info {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Print a metric folded across processes.
    Metric {
        name: String,

        /// Read the metric of this frontend.
        #[arg(long, conflicts_with = "backend")]
        frontend: Option<String>,

        /// Read the metric of this backend (or of a server in it).
        #[arg(long)]
        backend: Option<String>,

        /// Read the metric of this server; requires --backend.
        #[arg(long, requires = "backend")]
        server: Option<String>,
    },

    /// List frontends.
    Frontends,

    /// List backends.
    Backends,

    /// List servers.
    Servers {
        /// Only servers of this backend.
        #[arg(long)]
        backend: Option<String>,

        /// Print per-process stats as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Change the administrative state of a server.
    ServerState {
        backend: String,
        server: String,
        /// One of enable, disable, ready, drain, maint.
        state: String,
    },

    /// Change the weight of a server (absolute, or relative like 50%).
    ServerWeight {
        backend: String,
        server: String,
        weight: String,
    },

    /// Send a raw command to every process.
    Command {
        #[arg(required = true, trailing_var_arg = true)]
        words: Vec<String>,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config).await?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(&config.logging.level, cli.verbose))),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config { show } => cmd_config(&cli.config, &config, show),
        command => {
            let hap = HaProxy::connect(&config.connection)
                .await
                .context("failed to reach HAProxy")?;
            run(&hap, command).await
        }
    }
}

async fn run(hap: &HaProxy, command: Commands) -> Result<()> {
    match command {
        Commands::Info { json } => cmd_info(hap, json).await,
        Commands::Metric {
            name,
            frontend,
            backend,
            server,
        } => cmd_metric(hap, &name, frontend, backend, server).await,
        Commands::Frontends => cmd_frontends(hap).await,
        Commands::Backends => cmd_backends(hap).await,
        Commands::Servers { backend, json } => cmd_servers(hap, backend.as_deref(), json).await,
        Commands::ServerState {
            backend,
            server,
            state,
        } => {
            let state: ServerState = state.parse()?;
            let server = hap.backend(&backend).await?.server(&server).await?;
            server.set_state(state).await?;
            info!(backend = %backend, server = server.name(), %state, "server state changed");
            Ok(())
        }
        Commands::ServerWeight {
            backend,
            server,
            weight,
        } => {
            let weight: Weight = weight.parse()?;
            let server = hap.backend(&backend).await?.server(&server).await?;
            server.set_weight(weight).await?;
            info!(backend = %backend, server = server.name(), %weight, "server weight changed");
            Ok(())
        }
        Commands::Command { words } => {
            for (process, lines) in hap.command(&words.join(" ")).await? {
                println!("# process {process}");
                for line in lines {
                    println!("{line}");
                }
            }
            Ok(())
        }
        Commands::Config { .. } => bail!("config does not talk to HAProxy"),
    }
}

async fn cmd_info(hap: &HaProxy, json: bool) -> Result<()> {
    let info: BTreeMap<u32, _> = hap.info().await?.into_iter().collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    for (process, block) in info {
        println!("# process {process}");
        for (key, value) in block {
            println!("{key}: {value}");
        }
    }
    Ok(())
}

async fn cmd_metric(
    hap: &HaProxy,
    name: &str,
    frontend: Option<String>,
    backend: Option<String>,
    server: Option<String>,
) -> Result<()> {
    let value = match (frontend, backend, server) {
        (Some(frontend), _, _) => hap.frontend(&frontend).await?.metric(name).await?,
        (None, Some(backend), Some(server)) => {
            hap.backend(&backend)
                .await?
                .server(&server)
                .await?
                .metric(name)
                .await?
        }
        (None, Some(backend), None) => hap.backend(&backend).await?.metric(name).await?,
        (None, None, _) => hap.metric(name).await?,
    };
    println!("{value}");
    Ok(())
}

async fn cmd_frontends(hap: &HaProxy) -> Result<()> {
    for frontend in hap.frontends(None).await? {
        println!(
            "{}\t{}\t{}",
            frontend.name(),
            frontend.status().await?,
            frontend.requests().await?
        );
    }
    Ok(())
}

async fn cmd_backends(hap: &HaProxy) -> Result<()> {
    for backend in hap.backends(None).await? {
        println!(
            "{}\t{}\t{}",
            backend.name(),
            backend.status().await?,
            backend.requests().await?
        );
    }
    Ok(())
}

async fn cmd_servers(hap: &HaProxy, backend: Option<&str>, json: bool) -> Result<()> {
    let servers = hap.servers(backend).await?;
    if json {
        let mut out: BTreeMap<String, BTreeMap<u32, BTreeMap<String, MetricValue>>> = BTreeMap::new();
        for server in &servers {
            let per_process = server
                .stats_per_process()
                .await?
                .into_iter()
                .map(|(process, stats)| (process, typed(stats)))
                .collect();
            out.insert(
                format!("{}/{}", server.backend_name(), server.name()),
                per_process,
            );
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    for server in servers {
        println!(
            "{}/{}\t{}\t{}",
            server.backend_name(),
            server.name(),
            server.status().await?,
            server.weight().await?
        );
    }
    Ok(())
}

/// Typed view of a stats map, dropping empty columns.
fn typed(stats: BTreeMap<String, String>) -> BTreeMap<String, MetricValue> {
    stats
        .into_iter()
        .filter_map(|(field, raw)| MetricValue::convert(&raw).map(|value| (field, value)))
        .collect()
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        debug!(path = %path.display(), "config file not found, using defaults");
        Ok(AppConfig::default())
    }
}

/// Endpoint flags replace every endpoint source from the config file.
fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if cli.socket_dir.is_none() && cli.socket_file.is_none() && cli.addresses.is_empty() {
        return;
    }
    let connection = &mut config.connection;
    connection.socket_dir = cli.socket_dir.clone();
    connection.socket_file = cli.socket_file.clone();
    connection.addresses = cli.addresses.clone();
}

/// Log filter for the configured level, raised by each `-v`.
fn log_filter(level: &str, verbose: u8) -> String {
    match verbose {
        0 => level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hapadmin_test_utils::config::TestConfigBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_replace_config_sources() {
        let mut config = TestConfigBuilder::new().socket_file(Path::new("/run/haproxy.sock")).build();
        let cli = Cli::try_parse_from(["hapadmin", "--address", "10.0.0.1:9999", "frontends"]).unwrap();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.connection.socket_file, None);
        assert_eq!(config.connection.addresses, vec!["10.0.0.1:9999"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_flags_keep_config_sources() {
        let mut config = TestConfigBuilder::new().socket_dir(Path::new("/run/haproxy")).build();
        let cli = Cli::try_parse_from(["hapadmin", "backends"]).unwrap();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.connection.socket_dir.as_deref(), Some("/run/haproxy"));
    }

    #[test]
    fn test_conflicting_sources_are_rejected() {
        let result = Cli::try_parse_from([
            "hapadmin",
            "--socket-dir",
            "/run/haproxy",
            "--socket-file",
            "/run/haproxy.sock",
            "info",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_command_words_are_collected() {
        let cli = Cli::try_parse_from(["hapadmin", "command", "show", "errors", "-1"]).unwrap();
        match cli.command {
            Commands::Command { words } => assert_eq!(words.join(" "), "show errors -1"),
            _ => panic!("expected command subcommand"),
        }
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter("warn", 0), "warn");
        assert_eq!(log_filter("warn", 1), "debug");
        assert_eq!(log_filter("warn", 3), "trace");
    }

    #[test]
    fn test_typed_drops_empty_columns() {
        let stats = BTreeMap::from([
            ("stot".to_string(), "12".to_string()),
            ("status".to_string(), "UP".to_string()),
            ("lastsess".to_string(), String::new()),
        ]);
        let typed = typed(stats);
        assert_eq!(typed.len(), 2);
        assert_eq!(typed["stot"], MetricValue::Int(12));
    }

    #[tokio::test]
    async fn test_missing_config_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.logging.level, "info");

        let path = tmp.path().join("hapadmin.toml");
        tokio::fs::write(&path, "[connection]\nsocket_dir = \"/run/haproxy\"\n")
            .await
            .unwrap();
        let config = load_config(&path).await.unwrap();
        assert!(config.has_endpoint_source());
    }
}
