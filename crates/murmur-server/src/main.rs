//! murmur binary: speaks a tracked member's messages into their voice channel.
//!
//! Starts the voice session actor and an axum HTTP server with structured
//! logging, and tears the voice session down on SIGTERM/SIGINT.

use murmur_server::{app, config, AppState};
use murmur_voice::{
    LoopbackTransport, ProcessSinkTransport, TransportConfig, TransportKind, TtsService,
    VoiceSession, VoiceTransport,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("MURMUR_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn build_transport(config: &TransportConfig) -> Arc<dyn VoiceTransport> {
    match config.kind {
        TransportKind::Loopback => Arc::new(LoopbackTransport::new(config.bytes_per_second)),
        TransportKind::Process => Arc::new(
            ProcessSinkTransport::new(config.program.clone(), config.args.clone())
                .with_byte_rate(config.bytes_per_second),
        ),
    }
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration, the agent cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    if config.bot.target_member.is_none() {
        tracing::warn!("no target member configured, nothing will be spoken until one is set");
    }

    let transport = build_transport(&config.transport);
    tracing::info!(kind = ?config.transport.kind, "voice transport selected");

    let (session, session_task) = VoiceSession::spawn(transport, &config.voice);
    let tts = TtsService::new(&config.tts).expect("failed to initialize speech synthesis");

    let state = AppState::new(session.clone(), Arc::new(tts), &config.bot);
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting murmur agent");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    if let Err(e) = session.shutdown().await {
        tracing::warn!("voice session already stopped: {}", e);
    }
    if let Err(e) = session_task.await {
        tracing::error!("voice session task failed: {}", e);
    }

    tracing::info!("murmur agent shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
