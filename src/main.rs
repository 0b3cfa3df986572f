use anyhow::{bail, Context, Result};
use capture_session::{sim, CaptureController, CaptureOptions, CaptureSession, CaptureStatus};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Run a capture session against the simulated platform
#[derive(Debug, Parser)]
#[command(name = "capture-session", version)]
struct Args {
    /// Config file (TOML, JSON, YAML...); CAPTURE_* env vars override it
    #[arg(long)]
    config: Option<String>,

    /// How long to record, in milliseconds
    #[arg(long, default_value_t = 1500)]
    record_ms: u64,

    /// Take a still image before recording
    #[arg(long)]
    snap: bool,

    /// Record audio only
    #[arg(long)]
    audio_only: bool,

    /// Directory to write captured artifacts to
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut options = match &args.config {
        Some(path) => CaptureOptions::load(path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => CaptureOptions::default(),
    };
    if args.audio_only {
        options.video = false;
        options.audio = true;
        options.audio_mime_type = "audio/wav".to_string();
    }

    info!("Capture session demo (simulated platform)");
    let controller = CaptureController::new(options, sim::platform());
    let mut watch = controller.watch();

    controller.activate().await;
    let session = wait_for(&mut watch, |s| {
        matches!(s.status, CaptureStatus::Previewing | CaptureStatus::Denied)
    })
    .await?;
    if session.status == CaptureStatus::Denied {
        bail!("Device access denied: {:?}", session.last_error);
    }
    info!(
        "Previewing on {:?} ({} devices)",
        session.chosen_device_id,
        session.devices.len()
    );

    let mut session = session;
    if args.snap {
        controller.snap().await;
        session =
            wait_for(&mut watch, |s| s.captured_image.is_some() || s.last_error.is_some()).await?;
    }

    // image-only sessions are complete after the snapshot
    if session.status != CaptureStatus::Captured {
        controller.start().await;
        wait_for(&mut watch, |s| s.status == CaptureStatus::Capturing).await?;
        tokio::time::sleep(Duration::from_millis(args.record_ms)).await;
        controller.stop().await;

        session = wait_for(&mut watch, |s| {
            matches!(s.status, CaptureStatus::Captured | CaptureStatus::Previewing)
        })
        .await?;
    }
    println!("{}", serde_json::to_string_pretty(session.as_ref())?);

    if let Some(dir) = &args.output {
        write_artifacts(dir, &session)?;
    }

    controller.deactivate().await;
    info!("Session deactivated");
    Ok(())
}

async fn wait_for(
    watch: &mut tokio::sync::watch::Receiver<Arc<CaptureSession>>,
    predicate: impl FnMut(&Arc<CaptureSession>) -> bool,
) -> Result<Arc<CaptureSession>> {
    let session = tokio::time::timeout(Duration::from_secs(10), watch.wait_for(predicate))
        .await
        .context("Timed out waiting for the capture session")?
        .context("Capture session closed")?;
    Ok(Arc::clone(&session))
}

fn write_artifacts(dir: &Path, session: &CaptureSession) -> Result<()> {
    std::fs::create_dir_all(dir).context("Failed to create output directory")?;

    let media = session
        .captured_video
        .iter()
        .chain(session.captured_audio.iter())
        .map(|m| (&m.blob, "recording"));
    let image = session.captured_image.iter().map(|i| (&i.blob, "snapshot"));

    for (blob, stem) in media.chain(image) {
        let path = dir.join(format!("{}.{}", stem, extension(&blob.mime_type)));
        std::fs::write(&path, blob.bytes())
            .with_context(|| format!("Failed to write {:?}", path))?;
        info!("Wrote {} bytes to {:?}", blob.len(), path);
    }
    Ok(())
}

fn extension(mime_type: &str) -> &str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "audio/wav" => "wav",
        other => other.rsplit('/').next().unwrap_or("bin"),
    }
}
