use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use avatar_gateway::engines::{
    BatchRecognitionEngine, HttpCompletionService, RecordStore, RestSynthesisEngine,
    SearchRecordStore,
};
use avatar_gateway::{
    ApiServer, ApiState, Config, SessionRegistry, SpeechInputController, TriggerPolicy, TurnEngine,
    auth,
};

/// Avatar gateway - real-time conversational voice-avatar sessions
#[derive(Parser)]
#[command(name = "avatar-gateway", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long, env = "GATEWAY_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,avatar_gateway=info",
        1 => "info,avatar_gateway=debug",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    let port = cli.port.unwrap_or(config.port);
    tracing::info!(region = %config.speech.region, port, "starting avatar gateway");

    let completion = Arc::new(HttpCompletionService::new(
        config.completion.endpoint.clone(),
        config.completion.api_key.clone(),
        config.completion.deployment.clone(),
    ));
    let records: Option<Arc<dyn RecordStore>> = config.records.as_ref().map(|r| {
        SearchRecordStore::new(r.url.clone(), r.api_key.clone(), r.index.clone()).into_dyn()
    });
    if records.is_none() {
        tracing::warn!("no record store configured, lookup tools disabled");
    }

    let policy = TriggerPolicy::from_config(&config.dialogue)?;
    let turn = Arc::new(TurnEngine::new(
        completion,
        records,
        policy,
        config.dialogue.clone(),
        config.completion.max_tokens,
    ));

    let recognition = Arc::new(BatchRecognitionEngine::new(
        config.speech.transcription_model.clone(),
    ));
    let input = Arc::new(SpeechInputController::new(recognition, Arc::clone(&turn)));

    let (speech_token, _speech_refresher) = auth::spawn_speech_token_refresher(&config.speech);
    let (relay_token, _relay_refresher) = auth::spawn_relay_token_refresher(&config.speech);

    let registry = Arc::new(SessionRegistry::new());
    let _sweeper = registry.spawn_idle_sweeper(config.idle_timeout_secs);

    let state = Arc::new(ApiState {
        registry,
        input,
        turn,
        synthesis: Arc::new(RestSynthesisEngine::new()),
        speech: config.speech.clone(),
        dialogue: config.dialogue.clone(),
        speech_token,
        relay_token,
        ice_override: config.ice_override.clone(),
    });

    ApiServer::new(state, port).serve().await?;
    Ok(())
}
