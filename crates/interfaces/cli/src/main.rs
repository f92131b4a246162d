mod seed;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use viva_config::AppConfig;
use viva_core::{LanguageModel as _, SimilarityIndex as _, TextToSpeech as _};

#[derive(Debug, Parser)]
#[command(
    name = "viva",
    version,
    about = "Adaptive technical-interview orchestrator"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the session gateway (default).
    Serve,
    /// Load an externally produced question plan and create a ready
    /// interview.
    Seed {
        /// JSON plan file: questions with ideal answers.
        #[arg(long)]
        plan: PathBuf,
    },
    /// Probe the configured adapter endpoints.
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    // RUST_LOG wins; the config file supplies the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone())),
        )
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => viva_server::serve(config).await,
        Commands::Seed { plan } => seed::run(config, &plan).await,
        Commands::Doctor => doctor(config).await,
    }
}

async fn doctor(config: AppConfig) -> Result<()> {
    if config.adapters.use_mock_adapters {
        println!("mock adapters are enabled; nothing to probe");
        return Ok(());
    }

    let ports = viva_server::build_ports(&config).await?;

    match ports.tts.available_voices().await {
        Ok(voices) => println!("tts: ok ({} voices)", voices.len()),
        Err(err) => println!("tts: FAILED ({err})"),
    }
    match ports.similarity.similarity("ping", "ping").await {
        Ok(score) => println!("embeddings: ok (self-similarity {score:.2})"),
        Err(err) => println!("embeddings: FAILED ({err})"),
    }
    match ports
        .llm
        .generate_question(&["connectivity check".to_string()], "easy")
        .await
    {
        Ok(_) => println!("llm: ok"),
        Err(err) => println!("llm: FAILED ({err})"),
    }
    println!("stt: not probed (requires an audio sample)");
    Ok(())
}
