use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use voxling_core::config::Config;
use voxling_dialogue::{DialogueClient, DialogueEngine, DialogueResult};
use voxling_gateway::{start_file_server, start_gateway, GatewayState};
use voxling_speech::asr::collect_transcript;
use voxling_speech::{AsrClient, SpeechRecognizer, SpeechSynthesizer, TtsClient};

#[derive(Parser)]
#[command(
    name = "voxling",
    about = "Voice companion gateway — ASR, dialogue, and TTS behind one WebSocket",
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
    /// Start the session server and the media file service
    Serve {
        /// WebSocket port (default: 8765)
        #[arg(long)]
        port: Option<u16>,

        /// Static file service port (default: 5000)
        #[arg(long)]
        files_port: Option<u16>,
    },

    /// One-shot dialogue round-trip (prints the reply and emotion value)
    Ask {
        message: String,
    },

    /// Synthesize speech for a piece of text
    Say {
        text: String,
    },

    /// Recognize speech from a local audio file
    Transcribe {
        path: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show effective settings
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
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
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Serve { port, files_port } => {
            serve(config, port, files_port).await?;
        }
        Commands::Ask { message } => {
            let client = DialogueClient::new(config.dialogue());
            match client.respond(&message, None).await {
                DialogueResult::Success { reply, emotion } => {
                    println!("{reply}");
                    println!("(emotion: {emotion})");
                }
                DialogueResult::Failure { message } => {
                    anyhow::bail!("dialogue failed: {message}");
                }
            }
        }
        Commands::Say { text } => {
            let storage = config.storage();
            storage.ensure_dirs()?;
            let client = TtsClient::new(config.tts(), storage.reply_dir.clone());
            let audio = client.synthesize(&text).await?;
            println!("{} ({} bytes)", audio.path.display(), audio.bytes);
        }
        Commands::Transcribe { path } => {
            let client = AsrClient::new(config.asr());
            let mut stream = client.execute(Path::new(&path)).await?;
            let transcript = collect_transcript(&mut stream).await?;
            println!("{transcript}");
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
        },
        Commands::Status => {
            let gateway = config.gateway();
            let storage = config.storage();
            println!("Voxling v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Gateway port: {}", gateway.port);
            println!("File service port: {}", gateway.files_port);
            println!("Upload dir: {}", storage.upload_dir.display());
            println!("Reply dir: {}", storage.reply_dir.display());
        }
    }

    Ok(())
}

async fn serve(config: Config, port: Option<u16>, files_port: Option<u16>) -> anyhow::Result<()> {
    let gateway = config.gateway();
    let port = port.unwrap_or(gateway.port);
    let files_port = files_port.unwrap_or(gateway.files_port);

    let storage = config.storage();
    storage.ensure_dirs()?;

    let config = Arc::new(config);
    let asr = Arc::new(AsrClient::new(config.asr()));
    let dialogue = Arc::new(DialogueClient::new(config.dialogue()));
    let tts = Arc::new(TtsClient::new(config.tts(), storage.reply_dir.clone()));

    let state = Arc::new(GatewayState::new(config.clone(), asr, dialogue, tts));

    tracing::info!(port, files_port, "starting Voxling");

    // Two independently owned services; neither holds state of the other.
    tokio::try_join!(
        start_gateway(state, port),
        start_file_server(config, files_port),
    )?;

    Ok(())
}
