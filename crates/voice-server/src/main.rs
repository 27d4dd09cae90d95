use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{info, warn};

mod admin;
mod app_state;
mod audio_sink;
mod config;
mod credential;
mod group_registry;
mod head_drop;
mod position_tracker;
mod router;
mod session_registry;
mod settings;
mod signaling_hub;
mod udp_transport;
mod webrtc_transport;

use app_state::AppState;
use config::ServerConfig;
use credential::{CredentialStore, FileCredentialStore};
use settings::ServerSettings;
use signaling_hub::SignalingState;
use udp_transport::UdpTransport;
use webrtc_transport::WebRtcTransport;

#[derive(Parser)]
#[command(name = "voice-server", about = "Proximity voice chat server")]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long)]
    config: Option<String>,

    /// Signalling (WebSocket) port, overrides config.
    #[arg(long)]
    signaling_port: Option<u16>,

    /// Native UDP voice port, overrides config.
    #[arg(long)]
    voice_port: Option<u16>,

    /// Bind address (IP), overrides config.
    #[arg(long)]
    host: Option<String>,

    /// Path to the runtime settings file (JSON), overrides config.
    #[arg(long)]
    settings: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "voice_server=info".into()))
        .init();

    let args = Args::parse();

    let mut config = if let Some(path) = &args.config {
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read config file: {path}"))?;
        toml::from_str(&content)?
    } else {
        ServerConfig::default()
    };
    if let Some(port) = args.signaling_port {
        config.signaling_port = port;
    }
    if let Some(port) = args.voice_port {
        config.voice_port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(path) = args.settings {
        config.settings_path = path;
    }

    let settings_path = std::path::Path::new(&config.settings_path);
    let server_settings = if settings_path.exists() {
        ServerSettings::load_from_file(settings_path).with_context(|| format!("failed to load settings: {}", config.settings_path))?
    } else {
        ServerSettings::default()
    };

    info!(
        host = %config.host,
        signaling_port = config.signaling_port,
        voice_port = config.voice_port,
        admin_bind = %config.admin_bind,
        "voice server starting"
    );

    let credentials: Box<dyn CredentialStore> = Box::new(
        FileCredentialStore::load_or_create(&config.credential_store_path)
            .with_context(|| format!("failed to load credential store: {}", config.credential_store_path))?,
    );
    let app_state = Arc::new(AppState::new(credentials, server_settings));
    let webrtc = Arc::new(WebRtcTransport::new(&config, &app_state.settings_snapshot().await)?);

    let udp_socket = bind_udp_socket(&config.host, config.voice_port).await?;
    info!(host = %config.host, port = config.voice_port, "udp voice socket bound");
    let udp_transport = Arc::new(UdpTransport::new(udp_socket, app_state.clone()));
    tokio::spawn(udp_transport.run());

    let signaling_state = SignalingState { app: app_state.clone(), webrtc: webrtc.clone() };
    tokio::spawn(signaling_hub::run_group_event_broadcaster(signaling_state.clone()));
    tokio::spawn(signaling_hub::run_session_sweeper(signaling_state.clone(), Duration::from_secs(5)));

    let admin_state = app_state.clone();
    let admin_bind = config.admin_bind.clone();
    tokio::spawn(async move {
        if let Err(err) = admin::run(admin_state, &admin_bind).await {
            warn!(%err, "admin listener exited");
        }
    });

    let app = signaling_hub::router(signaling_state);
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.signaling_port))
        .await
        .with_context(|| format!("failed to bind signalling port on {}:{}", config.host, config.signaling_port))?;
    info!(host = %config.host, port = config.signaling_port, "signalling listener bound, serving /voice");

    axum::serve(listener, app).await.context("signalling server exited")?;
    Ok(())
}

async fn bind_udp_socket(host: &str, port: u16) -> Result<Arc<UdpSocket>> {
    let sock = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))
        .context("failed to create UDP socket")?;
    let _ = sock.set_recv_buffer_size(2 * 1024 * 1024);
    let _ = sock.set_send_buffer_size(2 * 1024 * 1024);
    let addr: std::net::SocketAddr = format!("{host}:{port}").parse().with_context(|| format!("invalid UDP address {host}:{port}"))?;
    sock.bind(&addr.into()).with_context(|| format!("failed to bind UDP on {host}:{port}"))?;
    sock.set_nonblocking(true).context("failed to set UDP socket non-blocking")?;
    let std_sock: std::net::UdpSocket = sock.into();
    Ok(Arc::new(UdpSocket::from_std(std_sock).context("failed to wrap UDP socket in tokio")?))
}
