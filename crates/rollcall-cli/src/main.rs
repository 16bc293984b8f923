use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use rollcall_core::PrecomputedExtractor;
use rollcall_service::{spawn_service, Config};
use rollcall_store::Store;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a student from pre-extracted embedding files
    Register {
        /// Unique student identifier
        #[arg(short, long)]
        student_id: String,
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Embedding files (JSON array of fixed-length float arrays, one per face)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Mark attendance from a pre-extracted embedding file
    Mark {
        /// Embedding file for the captured frame
        file: PathBuf,
    },
    /// List registered students
    Students,
    /// Remove a registered student
    Remove {
        /// Student identifier to remove
        student_id: String,
    },
    /// List attendance records, newest first
    Attendance {
        /// Restrict to one UTC calendar day (YYYY-MM-DD)
        #[arg(short, long)]
        day: Option<NaiveDate>,
    },
    /// Export all attendance records as CSV
    ExportCsv {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let store = Arc::new(Store::open(&config.db_path, config.embedding_dim)?);

    match cli.command {
        Commands::Register {
            student_id,
            name,
            files,
        } => {
            let service = spawn_service(
                Box::new(PrecomputedExtractor::new(config.embedding_dim)),
                store.clone(),
                config.tolerance,
                config.thumbnail_dir(),
            )?;
            let mut images = Vec::with_capacity(files.len());
            for file in &files {
                images.push(
                    std::fs::read(file)
                        .with_context(|| format!("reading {}", file.display()))?,
                );
            }
            let identity = service.register(student_id, name, images).await?;
            println!(
                "registered {} ({}) with {} embedding(s)",
                identity.student_id,
                identity.name,
                identity.embeddings.len()
            );
        }
        Commands::Mark { file } => {
            let service = spawn_service(
                Box::new(PrecomputedExtractor::new(config.embedding_dim)),
                store.clone(),
                config.tolerance,
                config.thumbnail_dir(),
            )?;
            let image = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let marks = service.mark(image).await?;
            if marks.is_empty() {
                println!("no face detected");
            } else {
                println!("{}", serde_json::to_string_pretty(&marks)?);
            }
        }
        Commands::Students => {
            let corpus = store.encodings().all()?;
            if corpus.is_empty() {
                println!("no students registered");
            }
            for identity in corpus {
                println!(
                    "{}  {}  embeddings={}  thumbnail={}",
                    identity.student_id,
                    identity.name,
                    identity.embeddings.len(),
                    identity.thumbnail.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Remove { student_id } => {
            if store.encodings().remove(&student_id)? {
                println!("removed {student_id}");
            } else {
                println!("no such student: {student_id}");
            }
        }
        Commands::Attendance { day } => {
            let records = match day {
                Some(day) => store.ledger().list_for_day(day)?,
                None => store.ledger().list_all()?,
            };
            if records.is_empty() {
                println!("no attendance records");
            }
            for record in records {
                println!(
                    "{}  {}  {}  {}",
                    record.timestamp.to_rfc3339(),
                    record.student_id,
                    record.name,
                    record.status
                );
            }
        }
        Commands::ExportCsv { output } => {
            let records = store.ledger().list_all()?;
            let writer: Box<dyn std::io::Write> = match &output {
                Some(path) => Box::new(
                    std::fs::File::create(path)
                        .with_context(|| format!("creating {}", path.display()))?,
                ),
                None => Box::new(std::io::stdout()),
            };
            let mut csv_writer = csv::Writer::from_writer(writer);
            csv_writer.write_record(["Student ID", "Name", "Timestamp", "Status"])?;
            for record in &records {
                csv_writer.write_record([
                    record.student_id.as_str(),
                    record.name.as_str(),
                    &record.timestamp.to_rfc3339(),
                    record.status.as_str(),
                ])?;
            }
            csv_writer.flush()?;
            if let Some(path) = output {
                eprintln!("wrote {} record(s) to {}", records.len(), path.display());
            }
        }
    }

    Ok(())
}
