use anyhow::Result;
use autosage::prelude::*;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autosage")]
#[command(about = "Upload a vehicle photo and get a full vehicle rundown", long_about = None)]
struct Cli {
    /// Gemini model name (defaults to GEMINI_MODEL or gemini-2.5-flash)
    #[arg(long, short = 'm', global = true)]
    model: Option<String>,

    /// Seconds to wait for the model before giving up
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one vehicle image and print the result
    Analyze {
        /// Path to a .jpg, .jpeg or .png file
        image: Option<PathBuf>,
    },
    /// Upload and analyze images from a simple menu
    Interactive,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = GeminiConfig::default();
    if config.api_key.trim().is_empty() {
        warn!("GOOGLE_API_KEY is not set; analyses will fail until it is configured");
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    info!(model = %config.model, timeout_secs = cli.timeout, "Gemini gateway configured");

    let timeout = Duration::from_secs(cli.timeout);
    let gateway = GeminiGateway::with_config(config);
    let analyzer = VehicleAnalyzer::new(Arc::new(gateway)).with_timeout(timeout);

    match cli.command {
        Commands::Analyze { image } => run_once(&analyzer, image).await,
        Commands::Interactive => run_interactive_mode(&analyzer).await,
    }
}

async fn run_once(analyzer: &VehicleAnalyzer, image: Option<PathBuf>) -> Result<()> {
    let mut session = AnalysisSession::new();

    if let Some(path) = image {
        if let Err(e) = session.upload(&path) {
            error!("Failed to upload {}: {}", path.display(), e);
            println!("Could not use {}: {}", path.display(), e);
            return Ok(());
        }
    }

    analyze_and_print(analyzer, &session).await;
    Ok(())
}

async fn analyze_and_print(analyzer: &VehicleAnalyzer, session: &AnalysisSession) {
    if session.has_upload() {
        println!("AI is analyzing vehicle...");
    }

    match session.analyze(analyzer).await {
        SessionOutcome::NeedsUpload => {
            println!("{}", autosage::shell::UPLOAD_FIRST_MESSAGE);
        }
        SessionOutcome::Completed(result) => {
            println!("\n=== Vehicle Details ===");
            println!("{}", result);
            println!("=======================\n");
            if result.is_success() {
                println!("Analysis Completed Successfully!");
            }
        }
    }
}

async fn run_interactive_mode(analyzer: &VehicleAnalyzer) -> Result<()> {
    println!("AutoSage - Vehicle Expert AI");
    println!("============================");
    println!("Upload any vehicle image and get full vehicle information instantly!");

    let mut session = AnalysisSession::new();
    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        println!("\nMain Menu:");
        match session.current_file() {
            Some(path) => println!("  (uploaded: {})", path.display()),
            None => println!("  (no image uploaded)"),
        }
        println!("1. Upload Vehicle Image");
        println!("2. Analyze Vehicle");
        println!("3. Clear Upload");
        println!("4. Exit");
        print!("\nEnter your choice (1-4): ");
        io::stdout().flush()?;

        input.clear();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        match input.trim() {
            "1" => {
                print!("Path to image (jpg, jpeg, png): ");
                io::stdout().flush()?;

                input.clear();
                stdin.lock().read_line(&mut input)?;
                let path = input.trim();

                if path.is_empty() {
                    continue;
                }
                match session.upload(path) {
                    Ok(payload) => {
                        println!("Uploaded {} ({} bytes, {})", path, payload.len(), payload.mime_type)
                    }
                    Err(e) => println!("Upload failed: {}", e),
                }
            }
            "2" => analyze_and_print(analyzer, &session).await,
            "3" => {
                session.clear();
                println!("Upload cleared");
            }
            "4" => {
                println!("Exiting AutoSage");
                break;
            }
            _ => {
                println!("Invalid choice. Please enter a number between 1 and 4.");
            }
        }
    }

    Ok(())
}
