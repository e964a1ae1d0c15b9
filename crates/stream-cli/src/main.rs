mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::{fmt, EnvFilter};

use stream_api::state::AppState;
use stream_core::{Emission, HubTransport, LeaseManager};

/// Relay a channel's live status, title, category and follower changes to
/// connected clients as named events.
#[derive(Parser)]
#[command(name = "stream-events", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to the hub and serve webhook callbacks and the push channel.
    Serve {
        /// Path to TOML config file.
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Connect to a running push channel and print events as they arrive.
    Listen {
        /// Push channel URL.
        #[arg(default_value = "ws://127.0.0.1:8080/ws")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            run_serve(config).await;
        }
        Commands::Listen { url } => {
            fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                )
                .init();
            run_listen(url).await;
        }
    }
}

async fn run_serve(config_path: PathBuf) {
    let app_config = match config::AppConfig::load(&config_path) {
        Ok(c) => {
            init_tracing(&c.server.log_format);
            tracing::info!(path = %config_path.display(), "Loaded config file");
            c
        }
        Err(e) => {
            init_tracing("pretty");
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let (lease_config, channel_config) =
        match (app_config.lease_config(), app_config.channel_config()) {
            (Ok(l), Ok(c)) => (l, c),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Invalid configuration");
                std::process::exit(1);
            }
        };
    let hub_config = app_config.hub_config();

    if !lease_config.renews_before_expiry() {
        tracing::warn!(
            renewal_interval_secs = lease_config.renewal_interval.as_secs(),
            lease_seconds = lease_config.lease_seconds,
            "Renewal interval is not shorter than the lease; subscriptions may lapse between renewals"
        );
    }

    let topics = channel_config.topics();
    let transport = Arc::new(HubTransport::new(hub_config.clone(), &lease_config));
    let leases = LeaseManager::new(transport, &lease_config);

    let mut state = AppState::new(channel_config).with_lease_stats(leases.stats());
    if let Some(secret) = &hub_config.secret {
        state = state.with_secret(secret.as_str());
    }

    // Both ports are open before the hub is asked to verify anything.
    let webhook_listener = bind_or_exit(app_config.webhook.listen, "webhook").await;
    let push_listener = bind_or_exit(app_config.socket.listen, "push").await;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        stream_api::shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    tracing::info!(
        broadcaster_id = %state.monitor.broadcaster_id(),
        callback = %hub_config.callback,
        "Starting stream event relay"
    );
    leases.schedule_renewals(topics).await;

    let servers = tokio::try_join!(
        stream_api::serve_with_state(webhook_listener, state.clone(), stopped(stop_rx.clone())),
        stream_api::serve_push_channel(push_listener, state, stopped(stop_rx)),
    );

    tracing::info!("Shutdown signal received, unsubscribing...");
    leases.shutdown().await;

    if let Err(e) = servers {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}

async fn bind_or_exit(addr: std::net::SocketAddr, name: &str) -> TcpListener {
    match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(listener = name, %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn run_listen(url: String) {
    let multi = MultiProgress::new();
    let spinner_style = ProgressStyle::with_template("{spinner} {wide_msg}").expect("valid template");

    multi
        .println(format!(
            "{} {}",
            style("stream-events").bold(),
            style(env!("CARGO_PKG_VERSION")).dim()
        ))
        .ok();
    multi
        .println(format!("  {} {}", style("url:").dim(), style(&url).bold()))
        .ok();
    multi.println("").ok();
    multi
        .println(format!("{}", style("Press Ctrl+C to stop").dim()))
        .ok();
    multi.println("").ok();

    let spinner = multi.add(ProgressBar::new_spinner().with_style(spinner_style));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("{}", style("Connecting...").dim()));

    let mut ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            spinner.finish_and_clear();
            eprintln!("{} {}", style("Failed to connect:").red().bold(), e);
            std::process::exit(1);
        }
    };
    spinner.set_message(format!("{}", style("Waiting for events...").dim()));

    let shutdown = stream_api::shutdown_signal();
    tokio::pin!(shutdown);

    let mut received = 0u64;
    loop {
        tokio::select! {
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    spinner.finish_and_clear();
                    multi.println(format!("\n{}", style("Connection closed by server.").dim())).ok();
                    return;
                }
                Some(Ok(msg)) if msg.is_text() => {
                    let Ok(text) = msg.to_text() else { continue };
                    match serde_json::from_str::<Emission>(text) {
                        Ok(emission) => {
                            received += 1;
                            multi.println(format_emission(&emission)).ok();
                            spinner.set_message(format!(
                                "{}",
                                style(format!("{} events received", received)).dim()
                            ));
                        }
                        Err(e) => tracing::warn!(error = %e, "Ignoring unrecognised message"),
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    spinner.finish_and_clear();
                    eprintln!("{} {}", style("Connection error:").red().bold(), e);
                    std::process::exit(1);
                }
            },
            _ = &mut shutdown => {
                spinner.finish_and_clear();
                let _ = ws.close(None).await;
                multi.println(format!("\n{}", style("Listener stopped.").dim())).ok();
                return;
            }
        }
    }
}

fn format_emission(emission: &Emission) -> String {
    let ts = chrono::Local::now().format("%H:%M:%S");
    let name = format!("{:<18}", emission.event);
    let colored = match emission.event.as_str() {
        "new_stream" => style(name).green().bold(),
        "stream_offline" => style(name).red().bold(),
        "stream_uptime" => style(name).red(),
        "title_change" | "category_change" => style(name).yellow(),
        _ => style(name).cyan(),
    };
    let data = match &emission.data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("  {}  {} {}", style(ts).dim(), colored, data)
}

fn init_tracing(log_format: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .init();
        }
    }
}
