use std::io::Write as _;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use parlo_core::config::{Config, ServicesConfig};
use parlo_media::{
    AudioRecorder, CpalCaptureSource, NoopUnlocker, RodioSink, SpeakerHandle,
    SpeechSynthesisPlayer,
};
use parlo_services::{
    HttpLanguagePairClient, HttpSpeechClient, HttpTranscriptionClient, HttpTranslationClient,
};
use parlo_session::{TurnController, TurnEvent, TurnOutcome};

#[derive(Parser)]
#[command(
    name = "parlo",
    about = "Two-way voice translation from the terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive conversation
    Talk {
        /// Base URL of the translation services, overriding the config file
        #[arg(long)]
        endpoint: Option<String>,

        /// Input device name (see `parlo devices`)
        #[arg(long)]
        device: Option<String>,

        /// Start with voice output on
        #[arg(long)]
        voice: bool,
    },

    /// List available input devices
    Devices,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Talk {
            endpoint,
            device,
            voice,
        } => talk(config, endpoint, device, voice).await,
        Commands::Devices => {
            for name in CpalCaptureSource::list_devices()? {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn talk(
    config: Config,
    endpoint: Option<String>,
    device: Option<String>,
    voice: bool,
) -> anyhow::Result<()> {
    let services = match (endpoint, config.services.clone()) {
        (Some(base_url), Some(mut svc)) => {
            svc.base_url = base_url;
            svc
        }
        (Some(base_url), None) => ServicesConfig::new(base_url),
        (None, Some(svc)) => svc,
        (None, None) => anyhow::bail!(
            "no services configured; set services.base_url in the config file or pass --endpoint"
        ),
    };
    info!(endpoint = %services.base_url, "Using translation services");

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let controller = Arc::new(TurnController::new(
        Arc::new(HttpTranscriptionClient::from_config(&services)),
        Arc::new(HttpLanguagePairClient::from_config(&services)),
        Arc::new(HttpTranslationClient::from_config(&services)),
        event_tx,
    ));

    let player = SpeechSynthesisPlayer::new(
        Arc::new(HttpSpeechClient::from_config(&services)),
        Box::new(RodioSink::new()),
        Box::new(NoopUnlocker),
    );
    let speaker = parlo_media::speaker::spawn(player);
    if voice || config.voice_enabled() {
        speaker.set_enabled(true);
    }

    let device = device.or_else(|| config.audio.as_ref().and_then(|a| a.device.clone()));
    debug!(?device, sample_rate = config.sample_rate(), "Opening input device");
    let source = CpalCaptureSource::new(device.as_deref(), config.sample_rate())?;
    let mut recorder = AudioRecorder::new(Box::new(source));

    tokio::spawn(print_events(event_rx, speaker.clone()));

    println!("parlo - press Enter to start and stop recording");
    println!("Commands: /voice on|off, /say, /cancel, /langs, /history, /quit");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        speaker.interaction();

        match line.trim() {
            "" => {
                if recorder.is_recording() {
                    match recorder.stop() {
                        Ok(clip) => {
                            debug!(bytes = clip.data.len(), "Clip captured");
                            let controller = controller.clone();
                            tokio::spawn(async move {
                                if controller.begin_turn(clip).await == TurnOutcome::Busy {
                                    println!("(still working on the previous turn)");
                                }
                            });
                        }
                        Err(e) => eprintln!("{e}"),
                    }
                } else {
                    match recorder.start() {
                        Ok(()) => println!("Recording... press Enter to stop"),
                        Err(e) => eprintln!("{e}"),
                    }
                }
            }
            "/quit" | "/q" => break,
            "/voice on" => {
                speaker.set_enabled(true);
                println!("Voice output on");
            }
            "/voice off" => {
                speaker.set_enabled(false);
                speaker.cancel();
                println!("Voice output off");
            }
            "/say" => match controller.latest_translation() {
                Some(text) => speaker.play_now(text),
                None => println!("Nothing to say yet"),
            },
            "/cancel" => {
                controller.cancel_active();
                speaker.cancel();
                println!("Cancelled");
            }
            "/langs" => match controller.language_pair() {
                Some(pair) => println!(
                    "{} ({}) <-> {} ({})",
                    pair.source.name, pair.source.code, pair.target.name, pair.target.code
                ),
                None => println!("Languages not detected yet; speak a first turn"),
            },
            "/history" => {
                for msg in controller.messages() {
                    println!(
                        "[{}] {} -> {}: {} | {}",
                        msg.timestamp.format("%H:%M:%S"),
                        msg.source_lang,
                        msg.target_lang,
                        msg.original_text,
                        msg.translated_text
                    );
                }
            }
            other => println!("Unknown command: {other}"),
        }
    }

    speaker.cancel();
    Ok(())
}

/// Print pipeline events as they happen and feed the speaker.
async fn print_events(mut rx: mpsc::UnboundedReceiver<TurnEvent>, speaker: SpeakerHandle) {
    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::Transcript { text, language } => {
                println!("[{language}] {text}");
            }
            TurnEvent::LanguagesResolved { pair } => {
                println!(
                    "Languages detected: {} <-> {}",
                    pair.source.name, pair.target.name
                );
            }
            TurnEvent::PartialTranslation { text } => {
                print!("\r> {text}");
                let _ = std::io::stdout().flush();
                speaker.text_updated(text);
            }
            TurnEvent::MessageAdded { message } => {
                println!("\r> {}", message.translated_text);
                speaker.finalized(message.translated_text);
            }
            TurnEvent::TurnError { message, .. } => {
                eprintln!("\rerror: {message}");
            }
        }
    }
}
