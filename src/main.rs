mod cmd_config;
mod config;
mod health;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ssolink::crypto::PlainCipher;
use ssolink::sign::{NoSigner, Signer, UrlSigner};
use ssolink::{AppInfo, PushReceiver, SessionHandle, SessionStore, TransportSession};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "ssolink", about = "SSO transport session client", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hold a session open in the foreground
    Serve,
    /// Connect, issue one command and print the response
    Send {
        /// Command name, e.g. trpc.qq_new_tech.status_svc.StatusService.SsoHeartBeat
        command: String,
        /// Request payload as hex
        #[arg(long, default_value = "")]
        payload: String,
        /// Response deadline in seconds (default from config)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Query a running `serve` through its health endpoint
    Status,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Create default settings.json
    Init,
    /// Show current configuration (secrets masked)
    Show,
    /// Set a config value (dot notation: server.host)
    Set {
        /// Config key path
        key: String,
        /// Value to set
        value: String,
    },
    /// Print config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::default_config_path);

    if let Commands::Config { action } = &cli.command {
        return cmd_config::run(action, &config_path);
    }

    let is_serve = matches!(cli.command, Commands::Serve);

    // Init logging: one-shot commands → stderr (warn), serve → stdout (info)
    if is_serve {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stdout)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let config = AppConfig::load_or_default(&config_path)?;
    info!("Config loaded");

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Send {
            command,
            payload,
            timeout,
        } => send(config, &command, &payload, timeout).await,
        Commands::Status => status(&config).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// Load the session identity, creating and saving a fresh device if absent.
fn load_session(config: &AppConfig) -> Result<SessionStore> {
    let path = config.session_path();
    if path.exists() {
        return SessionStore::load(&path);
    }
    let store = SessionStore::empty();
    store.save(&path)?;
    info!("Created new device identity at {}", path.display());
    Ok(store)
}

/// Build the session from config: signer, client profile and identity.
async fn open_session(config: &AppConfig) -> Result<(TransportSession, PushReceiver)> {
    let store = load_session(config)?;

    let url_signer = match &config.sign {
        Some(sign) => Some(Arc::new(UrlSigner::new(
            &sign.url,
            sign.http_proxy.as_deref(),
        )?)),
        None => None,
    };

    let app = match (&config.app_info, &url_signer) {
        (Some(app), _) => app.clone(),
        (None, Some(signer)) => match signer.app_info().await {
            Ok(Some(app)) => app,
            Ok(None) => AppInfo::default(),
            Err(e) => {
                warn!("Failed to fetch app info from sign server: {e:#}");
                AppInfo::default()
            }
        },
        (None, None) => AppInfo::default(),
    };
    info!("Client profile {} ({})", app.current_version, app.os);

    let signer: Arc<dyn Signer> = match url_signer {
        Some(signer) => signer,
        None => Arc::new(NoSigner),
    };

    Ok(TransportSession::new(
        config.transport_options(),
        app,
        SessionHandle::new(store),
        Arc::new(PlainCipher),
        signer,
    ))
}

async fn serve(config: AppConfig) -> Result<()> {
    let (session, mut pushes) = open_session(&config).await?;

    // Start health server (also acts as single-instance guard)
    let mut shutdown_rx = health::start_health_server(config.health_port, session.clone()).await?;

    let push_task = tokio::spawn(async move {
        while let Some(push) = pushes.recv().await {
            info!(
                "[push] {} seq={} code={} ({} bytes)",
                push.command,
                push.sequence,
                push.return_code,
                push.payload.len()
            );
        }
    });

    if let Err(e) = session.connect().await {
        warn!("{e}; retrying in the background");
    } else if session.identity().snapshot().await.has_credentials() {
        if let Err(e) = session.online().await {
            warn!("Failed to go online: {e}");
        }
    } else {
        info!("No login credentials yet; connection stays unregistered");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = shutdown_rx.recv() => info!("Shutdown signal received via RPC"),
    }

    if session.state().is_connected() && session.identity().snapshot().await.has_credentials() {
        match session.offline().await {
            Ok(msg) => info!("Went offline: {msg}"),
            Err(e) => warn!("Failed to go offline: {e}"),
        }
    }
    session.close().await;
    push_task.abort();
    Ok(())
}

async fn send(config: AppConfig, command: &str, payload: &str, timeout: Option<u64>) -> Result<()> {
    let payload = hex::decode(payload.trim()).context("--payload must be hex")?;
    let timeout = timeout
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| config.request_timeout());

    let (session, _pushes) = open_session(&config).await?;
    session.connect().await?;
    let result = session.send(command, &payload, timeout).await;
    session.close().await;

    let resp = result?;
    let out = serde_json::json!({
        "command": resp.command,
        "sequence": resp.sequence,
        "return_code": resp.return_code,
        "extra": resp.extra,
        "payload": hex::encode(&resp.payload),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn status(config: &AppConfig) -> Result<()> {
    let url = format!("http://127.0.0.1:{}/health", config.health_port);
    let resp = match reqwest::get(&url).await {
        Ok(resp) => resp,
        Err(_) => {
            println!("ssolink is not running (no answer on port {})", config.health_port);
            return Ok(());
        }
    };
    let health: health::HealthResponse = resp.json().await?;
    println!("ssolink {} ({})", health.version, health.status);
    println!("  state:   {}", health.state);
    println!("  uin:     {}", health.uin);
    println!("  pending: {}", health.pending);
    println!("  uptime:  {}s", health.uptime);
    Ok(())
}
