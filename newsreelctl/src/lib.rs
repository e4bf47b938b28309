use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use newsreel_core::{load_config, Pipeline, PipelineReport};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] newsreel_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no API key: pass --api-key or set OPENAI_API_KEY")]
    MissingApiKey,
    #[error("no article body: pass --body or --body-file")]
    MissingArticle,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Newsreel command-line interface", long_about = None)]
pub struct Cli {
    /// Path to the main newsreel.toml
    #[arg(long, default_value = "configs/newsreel.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generates a short vertical video from one article
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Article headline
    #[arg(long)]
    pub title: String,
    /// Article body as inline text
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,
    /// File containing the article body
    #[arg(long)]
    pub body_file: Option<PathBuf>,
    /// OpenAI API key (falls back to OPENAI_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,
}

impl GenerateArgs {
    fn body_text(&self) -> Result<String> {
        if let Some(body) = &self.body {
            return Ok(body.clone());
        }
        if let Some(path) = &self.body_file {
            return Ok(std::fs::read_to_string(path)?);
        }
        Err(AppError::MissingArticle)
    }

    fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        std::env::var("OPENAI_API_KEY").map_err(|_| AppError::MissingApiKey)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing();
    match cli.command {
        Commands::Generate(args) => {
            let config = load_config(&cli.config)?;
            let body = args.body_text()?;
            let api_key = args.resolve_api_key()?;
            let pipeline = Pipeline::open_ai(config, api_key);
            let report = pipeline.run(&args.title, &body).await;
            print_report(&report, cli.format)?;
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_report(report: &PipelineReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!("title: {}", report.title);
            for scene in &report.scenes {
                println!(
                    "scene {}: imaged={} clipped={}",
                    scene.scene_id, scene.imaged, scene.clipped
                );
            }
            match &report.result.final_video {
                Some(path) => println!("final video: {}", path.display()),
                None => println!("final video: not produced"),
            }
            match &report.result.thumbnail {
                Some(path) => println!("thumbnail: {}", path.display()),
                None => println!("thumbnail: not produced"),
            }
            println!("completed at: {}", report.completed_at.to_rfc3339());
        }
    }
    Ok(())
}
