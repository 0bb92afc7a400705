//! NNA classifier client entry point.
//!
//! ```text
//! nna-client roi.gray                       Classify one 32x32 gray8 ROI
//! nna-client --format f32 a.bin b.bin       Classify raw f32 frames
//! nna-client --host 10.0.0.2 --json *.gray  Print a JSON report
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nna_core::{ClassifierClient, ConnectionInfo, DEFAULT_PORT, INPUT_SIDE, NnaError, TOTAL_BYTES};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Raw 32x32 8-bit grayscale pixels.
    Gray8,
    /// Raw little-endian f32 frame.
    F32,
}

#[derive(Parser, Debug)]
#[command(name = "nna-client", about = "Send regions of interest to an NNA classifier")]
struct Cli {
    /// Server host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Input file encoding.
    #[arg(short, long, value_enum, default_value_t = Format::Gray8)]
    format: Format,

    /// Print a JSON report instead of one line per file.
    #[arg(long)]
    json: bool,

    /// Input files, one frame each.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

// ── Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Classification {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    server: String,
    results: Vec<Classification>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let info = ConnectionInfo::new(cli.host.clone(), cli.port);
    let mut client = ClassifierClient::connect(&info).await?;
    info!(server = %info, files = cli.files.len(), "connected");

    let results = classify_all(&mut client, &cli.files, cli.format).await;

    if cli.json {
        let report = Report {
            server: info.to_string(),
            results,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&results));
    }

    Ok(())
}

/// Classify every file in order. A broken connection ends the run.
async fn classify_all<S>(
    client: &mut ClassifierClient<S>,
    files: &[PathBuf],
    format: Format,
) -> Vec<Classification>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let file = path.display().to_string();
        let outcome = classify_file(client, path, format).await;

        match &outcome {
            Ok(class) => info!(%file, class, "classified"),
            Err(e) => warn!(%file, "classification failed: {e}"),
        }

        let fatal = outcome.as_ref().is_err_and(is_fatal);
        results.push(Classification {
            file,
            class: outcome.as_ref().ok().copied(),
            error: outcome.err().map(|e| e.to_string()),
        });
        if fatal {
            break;
        }
    }
    results
}

/// Errors after which the connection can no longer be trusted.
fn is_fatal(e: &NnaError) -> bool {
    matches!(
        e,
        NnaError::ConnectionClosed | NnaError::Connection(_) | NnaError::ProtocolViolation(_)
    )
}

/// One line per file.
fn render_text(results: &[Classification]) -> String {
    let mut out = String::new();
    for r in results {
        match (&r.class, &r.error) {
            (Some(class), _) => out.push_str(&format!("{}: class {class}\n", r.file)),
            (None, Some(error)) => out.push_str(&format!("{}: error: {error}\n", r.file)),
            (None, None) => {}
        }
    }
    out
}

/// Read one input file and classify it. The result byte is signed on
/// the wire.
async fn classify_file<S>(
    client: &mut ClassifierClient<S>,
    path: &Path,
    format: Format,
) -> Result<i8, NnaError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| NnaError::Other(format!("cannot read input: {e}")))?;
    let byte = match format {
        Format::Gray8 => {
            let expected = INPUT_SIDE * INPUT_SIDE;
            if data.len() != expected {
                return Err(NnaError::InvalidFrameLength {
                    expected,
                    actual: data.len(),
                });
            }
            client.classify_roi(&data).await?
        }
        Format::F32 => {
            if data.len() != TOTAL_BYTES {
                return Err(NnaError::InvalidFrameLength {
                    expected: TOTAL_BYTES,
                    actual: data.len(),
                });
            }
            client.send_frame(&data).await?
        }
    };
    Ok(byte as i8)
}

// ── Tests ────────────────────────────────────────────────────────
