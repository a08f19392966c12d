//! Voxpipe server binary: accepts raw-PCM dialogue connections over TCP.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voxpipe::config::PipelineConfig;
use voxpipe::llm::OpenAiChatModel;
use voxpipe::pipeline::coordinator::Collaborators;
use voxpipe::segmenter::classifier::EnergyClassifier;
use voxpipe::server::Server;
use voxpipe::stt::HttpRecognizer;
use voxpipe::tts::HttpSynthesizer;

#[derive(Parser)]
#[command(name = "voxpipe-server", about = "Streaming voice-dialogue server")]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxpipe=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let server = Server::bind(config).await?;
    server
        .run(Arc::new(|config: &PipelineConfig| Collaborators {
            classifier: Box::new(EnergyClassifier::new(
                config.audio.sample_rate,
                config.segmenter.energy_threshold,
            )),
            recognizer: Box::new(HttpRecognizer::new(config.asr.clone())),
            language_model: Box::new(OpenAiChatModel::new(config.llm.clone())),
            synthesizer: Box::new(HttpSynthesizer::new(config.tts.clone())),
        }))
        .await?;
    Ok(())
}
