use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// D-Bus client proxy for the facekeepd daemon.
#[zbus::proxy(
    interface = "org.facekeep.Face1",
    default_service = "org.facekeep.Face1",
    default_path = "/org/facekeep/Face1"
)]
trait Face {
    async fn people(&self) -> zbus::Result<String>;
    async fn register(&self, name: &str, images: Vec<Vec<u8>>) -> zbus::Result<String>;
    async fn recognize(&self, image: Vec<u8>, threshold: f64) -> zbus::Result<String>;
    async fn train(&self) -> zbus::Result<u64>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facekeep", about = "Facekeep face registration and recognition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered identity names
    People,
    /// Register face samples for an identity from image files
    Register {
        /// Identity name
        #[arg(short, long)]
        name: String,
        /// One or more image files, each containing one face
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Recognize faces in an image against the current model
    Recognize {
        /// Image file to scan
        file: PathBuf,
        /// Distance threshold override (lower = stricter)
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Force a synchronous full retrain
    Train,
    /// Show daemon status
    Status,
}

/// Pretty-print a JSON reply, falling back to the raw string.
fn print_reply(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(v) => println!("{}", serde_json::to_string_pretty(&v).unwrap_or_else(|_| raw.into())),
        Err(_) => println!("{raw}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let proxy = FaceProxy::new(&connection)
        .await
        .context("connecting to facekeepd")?;

    match cli.command {
        Commands::People => {
            print_reply(&proxy.people().await?);
        }
        Commands::Register { name, files } => {
            let mut images = Vec::with_capacity(files.len());
            for file in &files {
                let bytes = std::fs::read(file)
                    .with_context(|| format!("reading {}", file.display()))?;
                images.push(bytes);
            }
            print_reply(&proxy.register(&name, images).await?);
        }
        Commands::Recognize { file, threshold } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            // Non-positive threshold selects the daemon default.
            print_reply(&proxy.recognize(bytes, threshold.unwrap_or(0.0)).await?);
        }
        Commands::Train => {
            let samples = proxy.train().await?;
            println!("model trained on {samples} samples");
        }
        Commands::Status => {
            print_reply(&proxy.status().await?);
        }
    }

    Ok(())
}
