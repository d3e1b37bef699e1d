//! Binary entry point: loads configuration, wires the device link, chat
//! backend, speech output and listener, then runs the voice loop.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use jasp::assistant::{Assistant, Interrupt};
use jasp::chat::OllamaBackend;
use jasp::config::{AppConfig, DEFAULT_CONFIG_PATH};
use jasp::conversation::ConversationContext;
use jasp::device::{DeviceLink, KeywordMatcher};
use jasp::handlers::{build_router, Session};
use jasp::listener::{ConsoleListener, Listener};
use jasp::retrieval::WebRetriever;
use jasp::speech::{CommandSpeaker, Speaker};

/// Upper bound for one web lookup.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// JASP - voice assistant for the electronics bench
#[derive(Parser)]
#[command(name = "jasp", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial port of the controller board (skips discovery)
    #[arg(long, env = "JASP_SERIAL_PORT")]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long, env = "JASP_SERIAL_BAUD")]
    baud: Option<u32>,

    /// Chat model name
    #[arg(long, env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Chat server root URL
    #[arg(long, env = "OLLAMA_URL")]
    ollama_url: Option<String>,

    /// Run without the controller board
    #[arg(long)]
    no_device: bool,

    /// Read utterances from stdin instead of the microphone
    #[arg(long)]
    text: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "info,jasp=debug",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(&cli.config);
    if let Some(port) = cli.port.clone() {
        config.serial_port = Some(port);
    }
    if let Some(baud) = cli.baud {
        config.serial_baud = baud;
    }
    if let Some(model) = cli.model.clone() {
        config.ollama_model = model;
    }
    if let Some(url) = cli.ollama_url.clone() {
        config.ollama_url = url;
    }

    let mut device = DeviceLink::new().with_settle_delay(config.settle_delay());
    if cli.no_device {
        tracing::info!("hardware disabled");
    } else {
        let matcher = KeywordMatcher::new(&config.port_keywords);
        device.connect(config.serial_port.as_deref(), config.serial_baud, &matcher);
    }

    let personality = config.prompts.get(config.personality);
    let context = ConversationContext::new(personality).with_window(config.history_window);
    let session = Session::new(device, context, speaker(&config))
        .with_personalities(config.prompts.clone())
        .with_sensor_timeout(config.sensor_timeout())
        .with_serious_mode(config.personality.is_serious());

    let router = build_router(&config.custom_commands).context("building command table")?;
    let backend = OllamaBackend::new(
        &config.ollama_url,
        config.ollama_model.clone(),
        config.temperature,
        config.request_timeout(),
    )
    .context("building chat client")?;
    tracing::info!(url = %config.ollama_url, model = backend.model(), "chat backend ready");

    let mut assistant = Assistant::new(session, router, Box::new(backend), listener(&cli, &config)?)
        .with_serious_prefix(config.serious_prefix.clone());
    if config.web_search {
        let retriever = WebRetriever::new(config.search_url.clone(), SEARCH_TIMEOUT)
            .context("building web client")?;
        assistant = assistant.with_retriever(Box::new(retriever));
    }

    assistant.run(interrupt()).await;
    Ok(())
}

fn speaker(config: &AppConfig) -> Box<dyn Speaker> {
    match &config.tts_program {
        Some(program) => Box::new(CommandSpeaker::new(program.clone(), config.tts_args.clone())),
        None => Box::new(CommandSpeaker::platform_default()),
    }
}

#[cfg(feature = "voice")]
fn listener(cli: &Cli, config: &AppConfig) -> anyhow::Result<Box<dyn Listener>> {
    if cli.text {
        return Ok(Box::new(ConsoleListener::stdin()));
    }
    let whisper = jasp::audio::WhisperListener::new(&config.whisper_model)
        .context("loading speech recognizer")?;
    Ok(Box::new(whisper))
}

#[cfg(not(feature = "voice"))]
fn listener(cli: &Cli, _config: &AppConfig) -> anyhow::Result<Box<dyn Listener>> {
    if !cli.text {
        tracing::info!("built without the voice feature, reading utterances from stdin");
    }
    Ok(Box::new(ConsoleListener::stdin()))
}

/// Resolves on Ctrl-C. A failed handler install never fires.
fn interrupt() -> Interrupt {
    Box::pin(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
}
