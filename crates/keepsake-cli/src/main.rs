use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use keepsake_cli::content_type_for_path;
use keepsake_cli::setup::build_services;
use keepsake_cli::telemetry::init_tracing;
use keepsake_core::{BackendKind, Config, ErrorMetadata};
use keepsake_engine::{UploadError, UploadRequest};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "keepsake")]
#[command(about = "Store photos across a primary and a fallback object store")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload one or more photos
    Upload {
        /// Files to upload (more than one runs as a batch)
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Content type; inferred from the extension when omitted
        #[arg(long, value_name = "MIME")]
        content_type: Option<String>,

        /// Per-upload deadline in milliseconds
        #[arg(long, value_name = "MS")]
        deadline_ms: Option<u64>,
    },

    /// Probe both backends and print their health
    Health,

    /// Print the stored record of a photo
    Get {
        #[arg(value_name = "UUID")]
        id: Uuid,
    },

    /// Delete an object left behind by a failed upload
    RemoveOrphan {
        /// Backend holding the object: primary or secondary
        #[arg(long, value_name = "BACKEND")]
        backend: BackendKind,

        /// Storage key reported by the failed upload
        #[arg(value_name = "KEY")]
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log_format);

    let services = build_services(&config).await?;

    match args.command {
        Command::Upload {
            files,
            content_type,
            deadline_ms,
        } => {
            let deadline = deadline_ms.map(Duration::from_millis);
            let mut requests = Vec::with_capacity(files.len());
            for path in &files {
                requests.push(read_request(path, content_type.as_deref(), deadline).await?);
            }

            if requests.len() == 1 {
                let request = requests.remove(0);
                let photo = services
                    .engine
                    .store(request)
                    .await
                    .map_err(upload_failure)?;
                println!("{}", serde_json::to_string_pretty(&photo)?);
            } else {
                let outcome = services
                    .engine
                    .store_batch(requests)
                    .await
                    .map_err(upload_failure)?;
                let items: Vec<_> = files
                    .iter()
                    .zip(&outcome.results)
                    .map(|(path, result)| match result {
                        Ok(photo) => json!({ "file": path, "photo": photo }),
                        Err(e) => json!({
                            "file": path,
                            "error": e.error_code(),
                            "message": e.client_message(),
                        }),
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "successful": outcome.success_count(),
                        "failed": outcome.failure_count(),
                        "items": items,
                    }))?
                );
            }
        }

        Command::Health => {
            let prober = services.engine.prober();
            let primary = prober.check_health(BackendKind::Primary).await;
            let secondary = prober.check_health(BackendKind::Secondary).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "primary": primary,
                    "secondary": secondary,
                }))?
            );
        }

        Command::Get { id } => match services.engine.get(id).await? {
            Some(photo) => println!("{}", serde_json::to_string_pretty(&photo)?),
            None => anyhow::bail!("Photo {} not found", id),
        },

        Command::RemoveOrphan { backend, key } => {
            services
                .storage(backend)
                .delete(&key)
                .await
                .with_context(|| format!("Failed to delete {} from {} backend", key, backend))?;
            tracing::info!(backend = %backend, key = %key, "Orphaned object removed");
        }
    }

    Ok(())
}

async fn read_request(
    path: &Path,
    content_type: Option<&str>,
    deadline: Option<Duration>,
) -> Result<UploadRequest> {
    let content_type = match content_type {
        Some(ct) => ct.to_string(),
        None => content_type_for_path(path)
            .with_context(|| {
                format!(
                    "Cannot infer content type of {}; pass --content-type",
                    path.display()
                )
            })?
            .to_string(),
    };

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut request = UploadRequest::new(Bytes::from(data), content_type);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        request = request.with_file_name(name);
    }
    if let Some(deadline) = deadline {
        request = request.with_deadline(deadline);
    }
    Ok(request)
}

fn upload_failure(err: UploadError) -> anyhow::Error {
    tracing::error!(error = %err, code = err.error_code(), "Upload failed");
    anyhow::anyhow!("{} ({})", err.client_message(), err.error_code())
}
