use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use windowlimit::config::WindowLimitConfig;
use windowlimit::guard::RequestGuard;
use windowlimit::ratelimit::{RateLimiter, Sweeper};

#[derive(Debug, Parser)]
#[command(name = "windowlimit", version, about = "Per-key fixed-window rate limiter")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a configuration file and print the resolved rules
    CheckConfig {
        /// Path to the YAML configuration
        path: PathBuf,
    },
    /// Replay a burst of requests from one client against a fresh limiter
    Simulate {
        /// Client identity (normally the peer address)
        #[arg(long, default_value = "127.0.0.1")]
        client: String,
        /// Resource path being requested
        #[arg(long, default_value = "/")]
        path: String,
        /// Number of requests to send
        #[arg(long, default_value_t = 31)]
        requests: u64,
        /// Optional YAML configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print one JSON object per request
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::CheckConfig { path } => check_config(path),
        Command::Simulate {
            client,
            path,
            requests,
            config,
            json,
        } => simulate(config, &client, &path, requests, json).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn check_config(path: PathBuf) -> anyhow::Result<()> {
    let config = WindowLimitConfig::from_file(&path)?;
    let rules = config.rule_set()?;
    info!(path = %path.display(), "Configuration is valid");

    println!("enabled: {}", config.limiter.enabled);
    println!("sweep interval: {}s", config.limiter.sweep_interval_secs);
    println!(
        "client identity: {}",
        if config.client_identity.trust_forwarded_for {
            config.client_identity.forwarded_header.as_str()
        } else {
            "peer address"
        }
    );
    let default = rules.default_limit();
    println!("default: {} per {}", default.quota.get(), default.window.label());
    for (prefix, limit) in rules.routes() {
        println!(
            "{}: {} per {}{}",
            prefix,
            limit.quota.get(),
            limit.window.label(),
            limit.name.as_deref().map(|n| format!(" ({})", n)).unwrap_or_default()
        );
    }
    Ok(())
}

async fn simulate(
    config_path: Option<PathBuf>,
    client: &str,
    path: &str,
    requests: u64,
    json: bool,
) -> anyhow::Result<()> {
    let config = WindowLimitConfig::load(config_path.as_deref())?;
    let limiter = Arc::new(RateLimiter::new());
    let sweeper = Sweeper::spawn(Arc::clone(limiter.store()), config.limiter.sweep_interval())?;
    let guard = RequestGuard::from_config(&config, limiter)?;

    info!(client = %client, path = %path, requests = requests, "Starting simulation");
    let mut rejected = 0u64;
    for n in 1..=requests {
        let decision = guard.check(client, path);
        if !decision.is_allowed() {
            rejected += 1;
        }

        if json {
            let headers: serde_json::Map<String, serde_json::Value> = decision
                .headers()
                .iter()
                .map(|(name, value)| (name.to_string(), serde_json::Value::from(value.as_str())))
                .collect();
            let line = serde_json::json!({
                "request": n,
                "allowed": decision.is_allowed(),
                "status": decision.status().unwrap_or(200),
                "headers": headers,
            });
            println!("{}", line);
        } else {
            let headers: Vec<String> = decision
                .headers()
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            println!(
                "#{:<4} {} {}",
                n,
                decision.status().unwrap_or(200),
                headers.join(" ")
            );
        }
    }

    info!(admitted = requests - rejected, rejected = rejected, "Simulation finished");
    sweeper.shutdown().await;
    Ok(())
}
