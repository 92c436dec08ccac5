// ============================================================================
// File: src/transcoder.rs
// WAV upload checks and the ffmpeg-backed MP3 encoder
// ============================================================================

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::ToolError;

const MIB: u64 = 1024 * 1024;

/// Largest upload accepted for conversion
pub const MAX_WAV_BYTES: u64 = 100 * MIB;

const WAV_MIME_TYPES: [&str; 3] = ["audio/wav", "audio/x-wav", "audio/wave"];

/// An uploaded audio file awaiting conversion
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl AudioFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Rejects anything the engine should never see: wrong type, empty, or
/// over the size ceiling.
pub fn validate_wav(name: &str, mime: Option<&str>, size: u64) -> Result<(), ToolError> {
    let by_extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
    let by_mime = mime.is_some_and(|m| WAV_MIME_TYPES.contains(&m));

    if !by_extension && !by_mime {
        return Err(ToolError::UnsupportedFile(name.to_string()));
    }
    if size == 0 {
        return Err(ToolError::Validation("The selected file is empty".to_string()));
    }
    if size > MAX_WAV_BYTES {
        return Err(ToolError::FileTooLarge {
            size_mib: size as f64 / MIB as f64,
            limit_mib: MAX_WAV_BYTES / MIB,
        });
    }
    Ok(())
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn wav_to_mp3(&self, wav: &[u8]) -> Result<Vec<u8>, ToolError>;
}

/// Runs the ffmpeg binary inside a scratch directory. The binary is probed
/// once, on first use.
pub struct FfmpegTranscoder {
    binary: PathBuf,
    ready: OnceCell<()>,
}

impl FfmpegTranscoder {
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            ready: OnceCell::new(),
        }
    }

    async fn load(&self) -> Result<(), ToolError> {
        let binary = &self.binary;
        self.ready
            .get_or_try_init(|| async move {
                let probe = Command::new(binary)
                    .arg("-version")
                    .output()
                    .await
                    .map_err(|e| {
                        ToolError::Transcode(format!(
                            "Failed to initialize audio converter ({}): {}",
                            binary.display(),
                            e
                        ))
                    })?;
                if !probe.status.success() {
                    return Err(ToolError::Transcode(
                        "Failed to initialize audio converter".to_string(),
                    ));
                }
                info!("audio converter loaded from {}", binary.display());
                Ok(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn wav_to_mp3(&self, wav: &[u8]) -> Result<Vec<u8>, ToolError> {
        self.load().await?;

        let scratch = tempfile::tempdir()
            .map_err(|e| ToolError::Transcode(format!("Could not create a work directory: {}", e)))?;
        let input = scratch.path().join("input.wav");
        let output = scratch.path().join("output.mp3");

        tokio::fs::write(&input, wav)
            .await
            .map_err(|e| ToolError::Transcode(e.to_string()))?;

        debug!("running {} -i input.wav -q:a 4 output.mp3", self.binary.display());
        let run = Command::new(&self.binary)
            .current_dir(scratch.path())
            .args(["-i", "input.wav", "-q:a", "4", "output.mp3"])
            .output()
            .await
            .map_err(|e| ToolError::Transcode(e.to_string()))?;

        if !run.status.success() {
            let stderr = String::from_utf8_lossy(&run.stderr);
            let last_line = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(ToolError::Transcode(format!(
                "Please try with a different file. ({})",
                last_line
            )));
        }

        tokio::fs::read(&output)
            .await
            .map_err(|e| ToolError::Transcode(e.to_string()))
    }
}
