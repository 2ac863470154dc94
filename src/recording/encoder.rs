//! External capture process wrapper.
//!
//! One `MediaEncoderProcess` owns one spawned ffmpeg reading a live stream
//! URL and writing a local artifact. Launch is verified with a short grace
//! window so immediate spawn/exit failures surface as launch errors instead
//! of a silent dead capture. Teardown asks ffmpeg to finish cleanly (a single
//! `q` on stdin) and falls back to a hard kill after a bounded wait.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Grace window for detecting immediate spawn/exit failures.
const LAUNCH_GRACE: Duration = Duration::from_secs(2);

/// Bounded wait for a graceful exit before the process is force-killed.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct EncodingParams {
    pub video_bitrate: String,
    pub fps: u32,
    /// WxH, e.g. "1280x720".
    pub resolution: String,
}

pub struct MediaEncoderProcess {
    child: Child,
    output_path: PathBuf,
}

impl MediaEncoderProcess {
    /// Locate the ffmpeg binary, preferring an explicit configured path.
    pub fn resolve_binary(configured: &str) -> Result<PathBuf> {
        if !configured.is_empty() {
            let path = PathBuf::from(configured);
            if path.exists() {
                return Ok(path);
            }
            bail!("Configured ffmpeg path does not exist: {}", configured);
        }
        which::which("ffmpeg").context("ffmpeg not found on PATH")
    }

    /// Spawn the capture process against a live stream URL and wait out the
    /// grace window to catch immediate failures.
    pub async fn launch(
        ffmpeg: &Path,
        stream_url: &str,
        output_path: &Path,
        params: &EncodingParams,
    ) -> Result<Self> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create recording output directory")?;
        }

        let mut child = Command::new(ffmpeg)
            .args(["-i", stream_url])
            .args(["-c:v", "libx264"])
            .args(["-crf", "23"])
            .args(["-c:a", "aac"])
            .args(["-b:a", "128k"])
            .args(["-b:v", &params.video_bitrate])
            .args(["-r", &params.fps.to_string()])
            .args(["-s", &params.resolution])
            .args(["-pix_fmt", "yuv420p"])
            .args(["-movflags", "+faststart"])
            .arg("-y")
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn ffmpeg")?;

        tokio::time::sleep(LAUNCH_GRACE).await;

        if let Some(status) = child.try_wait().context("Failed to check ffmpeg status")? {
            bail!("ffmpeg exited immediately with {}", status);
        }

        info!(
            "Capture process started for {} -> {:?}",
            stream_url, output_path
        );

        Ok(Self {
            child,
            output_path: output_path.to_path_buf(),
        })
    }

    /// Ask the process to finish cleanly and wait for it, reading back the
    /// artifact size once it has exited. Force-kills after a bounded timeout.
    pub async fn request_stop(mut self) -> Result<u64> {
        if let Some(mut stdin) = self.child.stdin.take() {
            // ffmpeg treats a single 'q' on stdin as a graceful-quit request.
            if let Err(e) = stdin.write_all(b"q").await {
                warn!("Failed to signal capture process: {}", e);
            }
            let _ = stdin.flush().await;
            drop(stdin);
        }

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait for ffmpeg")?;
                if !status.success() {
                    warn!("Capture process exited with {}", status);
                }
                let size = tokio::fs::metadata(&self.output_path)
                    .await
                    .context("Capture output file missing after stop")?
                    .len();
                info!(
                    "Capture stopped, artifact {:?} ({} bytes)",
                    self.output_path, size
                );
                Ok(size)
            }
            Err(_) => {
                self.child
                    .kill()
                    .await
                    .context("Failed to kill capture process")?;
                bail!(
                    "Capture process did not stop gracefully within {}s",
                    STOP_TIMEOUT.as_secs()
                );
            }
        }
    }

    /// Whether the process handle is still alive.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}
