//! dexhub binary entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dexhub::cli::{run_devices_command, Cli, Command};
use dexhub::config::{Config, TtsMode};
use dexhub::server::{build_router, AppState, GatewayServer};
use dexhub::speech::{GeminiTts, SayCommand, Synthesizer, Transcriber, WhisperCommand};
use dexhub::trust::authenticator::RequestAuthenticator;
use dexhub::trust::pairing::{ConsoleDelivery, PairingCoordinator};
use dexhub::trust::registry::{DeviceRegistry, JsonFileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("loading configuration")?;
    if let Some(bind) = &cli.bind {
        config.bind = bind.parse().context("parsing --bind address")?;
    }

    let store = Arc::new(JsonFileStore::new(config.registry_path.clone()));
    let registry = DeviceRegistry::open(store)
        .await
        .context("loading device registry")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, registry).await,
        Command::Devices(command) => run_devices_command(command, registry).await,
    }
}

async fn serve(config: Config, registry: DeviceRegistry) -> anyhow::Result<()> {
    let authenticator = RequestAuthenticator::new(registry.clone(), config.rate_limits.clone());
    let pairing = PairingCoordinator::new(registry, Arc::new(ConsoleDelivery));

    let transcriber: Arc<dyn Transcriber> = Arc::new(WhisperCommand::new(
        config.speech.stt_command.clone(),
        config.speech.stt_args.clone(),
    ));
    let synthesizer: Arc<dyn Synthesizer> = match config.speech.tts_mode {
        TtsMode::Local => Arc::new(SayCommand::new()),
        TtsMode::Gemini => {
            // Presence of the key is validated at config load.
            let api_key = config
                .speech
                .gemini_api_key
                .clone()
                .context("gemini TTS selected without an API key")?;
            Arc::new(GeminiTts::new(api_key, config.speech.gemini_voice.clone()))
        }
    };

    let state = AppState {
        authenticator,
        pairing: pairing.clone(),
        transcriber,
        synthesizer,
        max_body_bytes: config.max_body_bytes,
    };
    let app = build_router(state, &config.allowed_origins)?;

    let mut server = GatewayServer::new(config.bind, app, pairing);
    server.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    server.shutdown().await;
    Ok(())
}
