use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::{codec, Comparator, FaceSummary, ProgressReport};
use facematch_gemini::{GeminiComparator, GeminiConfig};
use futures::StreamExt;
use std::path::{Path, PathBuf};

// `#[zbus::proxy]` generates `FacematchProxy` (async) and `FacematchProxyBlocking`.
#[zbus::proxy(
    interface = "org.freedesktop.Facematch1",
    default_service = "org.freedesktop.Facematch1",
    default_path = "/org/freedesktop/Facematch1"
)]
trait Facematch {
    async fn register(&self, name: &str, image: &[u8], media_type: &str) -> zbus::Result<String>;
    async fn delete(&self, id: &str) -> zbus::Result<bool>;
    async fn list_faces(&self) -> zbus::Result<String>;
    async fn get_image(&self, id: &str) -> zbus::Result<(Vec<u8>, String)>;
    async fn recognize(&self, image: &[u8], media_type: &str) -> zbus::Result<String>;
    async fn cancel(&self, attempt_id: &str) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;

    #[zbus(signal)]
    fn recognition_progress(&self, attempt_id: &str, report: &str) -> zbus::Result<()>;
}

#[derive(Parser)]
#[command(name = "facematch", about = "Face registry and recognition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a named face image
    Register {
        /// Display name for this face
        #[arg(short, long)]
        name: String,
        /// Image file
        image: PathBuf,
    },
    /// Check an image against the registered faces
    Recognize {
        /// Image file
        image: PathBuf,
    },
    /// List registered faces
    List,
    /// Remove a registered face
    Delete {
        /// Face ID to remove
        id: String,
    },
    /// Write a registered face image to a file
    Export {
        /// Face ID to export
        id: String,
        /// Output path
        out: PathBuf,
        /// Write a `data:` URL instead of the raw image bytes
        #[arg(long)]
        data_url: bool,
    },
    /// Show daemon status
    Status,
    /// Compare two images directly, without the daemon
    Compare { first: PathBuf, second: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Register { name, image } => {
            let (bytes, media_type) = read_image(&image)?;
            let id = daemon().await?.register(&name, &bytes, &media_type).await?;
            println!("Registered {} as {id}", name.trim());
        }
        Commands::Recognize { image } => recognize(&daemon().await?, &image).await?,
        Commands::List => {
            let faces: Vec<FaceSummary> = serde_json::from_str(&daemon().await?.list_faces().await?)?;
            if faces.is_empty() {
                println!("No faces registered");
            }
            for face in faces {
                println!(
                    "{}  {:<24} {:<11} {:>9} B  {}",
                    face.id,
                    face.name,
                    face.mime_type,
                    face.byte_len,
                    face.registered_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Commands::Delete { id } => {
            if daemon().await?.delete(&id).await? {
                println!("Removed {id}");
            } else {
                println!("No face with id {id}");
            }
        }
        Commands::Export { id, out, data_url } => {
            let (bytes, media_type) = daemon().await?.get_image(&id).await?;
            let contents = export_contents(bytes, &media_type, data_url)?;
            std::fs::write(&out, &contents)
                .with_context(|| format!("cannot write {}", out.display()))?;
            println!("Wrote {} ({media_type}, {} bytes)", out.display(), contents.len());
        }
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&daemon().await?.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Compare { first, second } => compare(&first, &second).await?,
    }

    Ok(())
}

async fn daemon() -> Result<FacematchProxy<'static>> {
    let connection = zbus::Connection::session()
        .await
        .context("cannot connect to the session bus")?;
    Ok(FacematchProxy::new(&connection).await?)
}

/// Read an image file and work out its media type.
fn read_image(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let Some(media_type) = codec::media_type_for(path, &bytes) else {
        bail!("{} is not a recognized image file", path.display());
    };
    Ok((bytes, media_type.to_string()))
}

/// File contents for `export`: the raw image, or its `data:` URL.
fn export_contents(bytes: Vec<u8>, media_type: &str, data_url: bool) -> Result<Vec<u8>> {
    if !data_url {
        return Ok(bytes);
    }
    Ok(codec::encode(&bytes, media_type)?.to_data_url().into_bytes())
}

/// What a Ctrl-C during `recognize` does.
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Ask the daemon to stop after the comparison in flight.
    Cancel,
    /// Stop waiting and exit.
    Abort,
}

fn next_interrupt(presses: &mut u32) -> Interrupt {
    *presses += 1;
    if *presses == 1 {
        Interrupt::Cancel
    } else {
        Interrupt::Abort
    }
}

/// Start an attempt and print its progress until it reaches a terminal state.
///
/// A failed attempt (including an empty registry) exits non-zero.
async fn recognize(proxy: &FacematchProxy<'_>, image: &Path) -> Result<()> {
    let (bytes, media_type) = read_image(image)?;

    // Subscribe before starting so no transition is missed.
    let mut progress = proxy.receive_recognition_progress().await?;
    let attempt_id = proxy.recognize(&bytes, &media_type).await?;
    tracing::debug!(attempt = %attempt_id, "recognition started");

    let mut presses = 0;
    loop {
        let signal = tokio::select! {
            signal = progress.next() => signal,
            _ = tokio::signal::ctrl_c() => {
                match next_interrupt(&mut presses) {
                    Interrupt::Cancel => {
                        if proxy.cancel(&attempt_id).await? {
                            println!("Cancelling after the current comparison (Ctrl-C again to quit)...");
                        }
                    }
                    Interrupt::Abort => bail!("interrupted; attempt {attempt_id} left to finish in the daemon"),
                }
                continue;
            }
        };
        let Some(signal) = signal else { break };
        let args = signal.args()?;
        if *args.attempt_id() != attempt_id.as_str() {
            continue;
        }
        let report: ProgressReport = serde_json::from_str(args.report())?;
        if !report.terminal {
            println!("{}", report.message);
            continue;
        }
        if report.status == "failed" {
            bail!("{}", report.message);
        }
        println!("{}", report.message);
        return Ok(());
    }

    bail!("daemon went away before the attempt finished")
}

/// One comparator call on two local files, bypassing the daemon.
async fn compare(first: &Path, second: &Path) -> Result<()> {
    let config = GeminiConfig::from_env()?;
    let comparator = GeminiComparator::new(&config)?;
    let first = codec::encode_file(first)?;
    let second = codec::encode_file(second)?;

    let same = comparator.compare(&first, &second).await?;
    println!("Same person: {}", if same { "yes" } else { "no" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_interrupt_cancels_second_aborts() {
        let mut presses = 0;
        assert_eq!(next_interrupt(&mut presses), Interrupt::Cancel);
        assert_eq!(next_interrupt(&mut presses), Interrupt::Abort);
        assert_eq!(next_interrupt(&mut presses), Interrupt::Abort);
    }

    #[test]
    fn test_export_raw_bytes() {
        let contents = export_contents(b"abc".to_vec(), "image/jpeg", false).unwrap();
        assert_eq!(contents, b"abc");
    }

    #[test]
    fn test_export_data_url() {
        let contents = export_contents(b"abc".to_vec(), "image/jpeg", true).unwrap();
        assert_eq!(contents, b"data:image/jpeg;base64,YWJj");
    }
}
