//! podcast-streamer: unattended LLM podcast with live chat reactions.

mod api;
mod chat;
mod config;
mod error;
mod generator;
mod history;
mod llm;
mod player;
mod prompts;
mod sanitize;
mod shutdown;
mod speech;
mod store;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chat::credentials::{StaticCredentials, TwitchTokenManager};
use chat::irc::TwitchIrcSource;
use chat::supervisor::{ChatSupervisor, RetryPolicy};
use config::{Config, Role, SpeechBackend, StoreBackend};
use speech::{HttpSpeechSynthesizer, SilentSynthesizer, SpeechSynthesizer};
use store::{MemoryQueueStore, QueueStore, RedisQueueStore};

#[derive(Parser, Debug)]
#[command(name = "podcast-streamer", about = "Unattended LLM podcast with live chat reactions")]
struct Args {
    /// Path to podcast.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which loops to run in this process
    #[arg(short, long, value_enum, default_value = "all")]
    role: Role,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Suppress noisy HTTP client internals
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info,redis=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn,redis=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("podcast-streamer starting (role: {:?})", args.role);

    let config = Config::load(args.config.as_deref())?;
    config.validate(args.role)?;

    let cancel = CancellationToken::new();
    shutdown::cancel_on_ctrl_c(cancel.clone());

    let store: Arc<dyn QueueStore> = match config.store.backend {
        StoreBackend::Redis => {
            let url = config.redis.url();
            let store = RedisQueueStore::connect(&url).await?;
            info!("Connected to Redis at {}:{}", config.redis.host, config.redis.port);
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory queue store, queues are lost on exit");
            Arc::new(MemoryQueueStore::new())
        }
    };

    let mut tasks = JoinSet::new();

    if args.role.runs_generator() {
        let credentials = Arc::new(StaticCredentials::new(config.llm.api_token.clone()));
        let llm = Arc::new(llm::LlmClient::new(config.llm.clone(), credentials)?);
        let mut generator =
            generator::ContentGenerator::new(store.clone(), llm, config.queues.clone(), config.generator.clone());
        let cancel = cancel.clone();
        tasks.spawn(async move { generator.run(cancel).await });
    }

    if args.role.runs_player() {
        // Opening the audio device blocks briefly; done once and shared
        let speech: Arc<dyn SpeechSynthesizer> = match config.speech.backend {
            SpeechBackend::Http => Arc::new(HttpSpeechSynthesizer::new(config.speech.clone())?),
            SpeechBackend::Silent => Arc::new(SilentSynthesizer::new()),
        };

        let mut consumer =
            player::PlaybackConsumer::new(store.clone(), speech.clone(), config.queues.clone(), config.player.clone());
        if config.history.enabled {
            match history::PlaybackHistory::in_home() {
                Some(history) => consumer = consumer.with_history(history),
                None => warn!("No home directory, playback history disabled"),
            }
        }

        if config.api.enabled {
            let state = api::ApiState {
                store: store.clone(),
                queues: config.queues.clone(),
                speech,
                stats: consumer.stats(),
            };
            api::start_api(state, config.api.port).await;
        }

        let cancel = cancel.clone();
        tasks.spawn(async move { consumer.run(cancel).await });
    }

    let chat_only = args.role == Role::Chat;
    if chat_only || (args.role.runs_chat() && config.chat.enabled) {
        let source = TwitchIrcSource::new(&config.chat, store.clone(), config.queues.chat.clone());
        let credentials = Arc::new(TwitchTokenManager::new(&config.chat));
        let supervisor = ChatSupervisor::new(source, credentials, RetryPolicy::from_config(&config.chat));
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(e) = supervisor.run(cancel.clone()).await {
                error!("Chat ingestion gave up: {e}");
                if chat_only {
                    cancel.cancel();
                }
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!("Task panicked: {e}");
            cancel.cancel();
        }
    }

    info!("podcast-streamer stopped");
    Ok(())
}
