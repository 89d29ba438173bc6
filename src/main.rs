use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use deepguard_core::detector::{Detector, HealthStatus};
use deepguard_core::frame::{Frame, MIME_JPEG, MIME_PNG};
use deepguard_core::settings::{Settings, SettingsStore};
use deepguard_detect::HttpDetector;

#[derive(Parser)]
#[command(name = "deepguard", about = "Deepfake detection service client")]
struct Cli {
    /// Detection service base URL (defaults to the configured endpoint)
    #[arg(long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the detection service's health endpoint
    Health,
    /// Run one detection on an image file and print the result
    Scan { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::default();
    if let Some(endpoint) = cli.endpoint {
        settings.api_endpoint = endpoint;
    }
    let endpoint = settings.api_endpoint.clone();
    let detector = HttpDetector::new(SettingsStore::new(settings));

    match cli.command {
        Command::Health => match detector.health().await {
            HealthStatus::Online { app_name } => {
                println!("API Online - {app_name}");
            }
            HealthStatus::Offline { reason } => {
                eprintln!("API Offline - {reason}");
                std::process::exit(1);
            }
        },
        Command::Scan { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mime = match file.extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("png") => MIME_PNG,
                _ => MIME_JPEG,
            };
            let frame = Frame {
                bytes: bytes.into(),
                mime,
            };

            tracing::info!(file = %file.display(), endpoint = %endpoint, "analyzing frame");
            let result = detector.analyze(&frame).await?;

            println!("Prediction: {}", result.prediction);
            println!("Confidence: {:.1}%", result.confidence);
            if let Some(score) = result.frequency_score {
                println!("Frequency:  {:.1}%", score * 100.0);
            }
            if let Some(seconds) = result.processing_time {
                println!("Scan time:  {seconds:.2}s");
            }
        }
    }

    Ok(())
}
