//! Airzone Notify CLI Entry Point
//!
//! This is the main entry point for the airzone-notify binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use airzone_notify::cli::config::Config;
use airzone_notify::cli::logging;
use airzone_notify::cloud::api::AirzoneClient;
use airzone_notify::connection::transport::WsConnector;
use airzone_notify::connection::websocket::{ShutdownHandle, Supervisor};
use airzone_notify::notify::ntfy::NtfySink;
use airzone_notify::notify::sink::{LogSink, Notification, NotificationSink, Notifier};

#[derive(Parser)]
#[command(name = "airzone-notify")]
#[command(author, version, about = "Airzone Notify - Push notifications for Airzone Cloud installations")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/airzone-notify.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the event stream and forward notifications
    Run {
        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// List the installations of the account
    Installations,
    /// Show unread Airzone Cloud notifications
    Notifications,
    /// Send a test notification through ntfy
    NotifyTest,
    /// Print a systemd unit for the bridge
    Install {
        /// Service name
        #[arg(short, long, default_value = "airzone-notify")]
        name: String,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Install { name } => {
            install_service(name, &cli.config);
            return Ok(());
        }
        Commands::Version => {
            show_version();
            return Ok(());
        }
        _ => {}
    }

    let config = Config::load(&cli.config)?;
    let _log_guard = logging::init(&config.logging, cli.verbose)?;
    debug!(config = ?config.redacted(), "Configuration loaded");

    match cli.command {
        Commands::Run { dry_run } => run_bridge(config, dry_run).await,
        Commands::Installations => list_installations(&config).await,
        Commands::Notifications => show_notifications(&config).await,
        Commands::NotifyTest => send_test_notification(&config).await,
        Commands::Install { .. } | Commands::Version => Ok(()),
    }
}

async fn login(config: &Config) -> Result<(AirzoneClient, String)> {
    let client = AirzoneClient::new(&config.airzone.api_url)?;
    let token = client
        .login(&config.airzone.email, &config.airzone.password)
        .await
        .context("Failed to log in to Airzone Cloud")?;
    Ok((client, token))
}

async fn run_bridge(config: Config, dry_run: bool) -> Result<()> {
    config.validate()?;
    info!("Starting Airzone Notify...");

    let (client, token) = login(&config).await?;

    client
        .log_unread_notifications(&token, &config.airzone.lang)
        .await
        .context("Failed to fetch Airzone notifications")?;

    let installation = client
        .find_installation(&token, &config.airzone.installation)
        .await?;

    let sink: Arc<dyn NotificationSink> = if dry_run {
        info!("Dry run: notifications are logged only");
        Arc::new(LogSink)
    } else {
        Arc::new(NtfySink::new(&config.ntfy)?)
    };

    let connector = Arc::new(WsConnector::new(config.connection.connect_timeout()));
    let mut supervisor = Supervisor::new(
        &config.airzone.websocket_url,
        &token,
        installation,
        connector,
        Notifier::new(sink),
    )
    .with_reconnect_interval(config.connection.reconnect_interval());

    tokio::spawn(watch_signals(supervisor.shutdown_handle()));

    supervisor.run().await
}

/// Map SIGINT / SIGTERM to an intentional stop
async fn watch_signals(handle: ShutdownHandle) {
    loop {
        if let Err(e) = wait_for_signal().await {
            warn!(error = %e, "Failed to listen for shutdown signals");
            return;
        }

        if handle.stop() {
            info!("Shutdown signal received, closing event stream");
        } else {
            debug!("Shutdown already in progress");
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

async fn list_installations(config: &Config) -> Result<()> {
    let (client, token) = login(config).await?;
    let installations = client.installations(&token).await?;

    if installations.is_empty() {
        println!("No installations found");
        return Ok(());
    }
    for installation in installations {
        println!("{}  {}", installation.id, installation.name);
    }
    Ok(())
}

async fn show_notifications(config: &Config) -> Result<()> {
    let (client, token) = login(config).await?;
    let notifications = client.notifications(&token, &config.airzone.lang).await?;

    let unread: Vec<_> = notifications.iter().filter(|n| !n.data.read).collect();
    if unread.is_empty() {
        println!("No unread notifications");
    }
    for notification in unread {
        println!("[{}] {}", notification.data.date(), notification.data.title);
    }
    Ok(())
}

async fn send_test_notification(config: &Config) -> Result<()> {
    let sink = NtfySink::new(&config.ntfy)?;
    let notification = Notification::new(
        "Airzone Notify - Test",
        "Notifications from **Airzone Notify** are reaching this topic.",
    )
    .with_tag("white_check_mark");

    sink.send(&notification)
        .await
        .context("Failed to send test notification")?;
    println!("Test notification sent to topic '{}'", config.ntfy.topic);
    Ok(())
}

fn install_service(name: &str, config: &Path) {
    println!("Installing service: {}", name);

    let service_content = format!(
        r#"[Unit]
Description=Airzone Notify
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart=/usr/local/bin/airzone-notify --config {} run
Restart=always
RestartSec=5
Environment=RUST_LOG=info

[Install]
WantedBy=multi-user.target
"#,
        config.display()
    );

    let service_path = format!("/etc/systemd/system/{}.service", name);
    println!("Service file would be created at: {}", service_path);
    println!("\nService content:");
    println!("{}", service_content);
    println!("\nTo install manually, run:");
    println!("  sudo cp airzone-notify /usr/local/bin/");
    println!("  sudo nano {}", service_path);
    println!("  sudo systemctl daemon-reload");
    println!("  sudo systemctl enable {}", name);
    println!("  sudo systemctl start {}", name);
}

fn show_version() {
    println!("airzone-notify {}", env!("CARGO_PKG_VERSION"));
    println!("Bridge from the Airzone Cloud event stream to ntfy");
    println!();
    println!("Features:");
    println!("  - Airzone Cloud event stream with keep-alive");
    println!("  - Reconnection after a fixed delay");
    println!("  - Setpoint, power, mode, eco, sleep, antifreeze and rename alerts");
    println!("  - ntfy push notifications");
}
