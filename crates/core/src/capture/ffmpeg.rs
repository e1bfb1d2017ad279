use std::path::Path;

use image::{DynamicImage, ImageFormat};
use tokio::{fs, process::Command};
use tracing::debug;

use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    /// Seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Bytes.
    pub size: u64,
}

/// Seam between the capture engine and whatever decodes pictures.
pub trait VideoDecoder: Send + Sync {
    async fn probe(&self, source: &Path) -> Result<VideoMetadata, CaptureError>;

    /// Seeks to `timestamp` and rasterizes the visible picture.
    async fn grab(&self, source: &Path, timestamp: f64) -> Result<DynamicImage, CaptureError>;
}

/// Decoder backed by the `ffprobe` and `ffmpeg` executables.
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoder;

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self
    }
}

fn load_failed(source: &Path, reason: impl Into<String>) -> CaptureError {
    CaptureError::LoadFailed {
        source_path: source.to_path_buf(),
        reason: reason.into(),
    }
}

/// Reads duration and picture size out of `ffprobe -print_format json` output.
fn parse_probe_output(
    source: &Path,
    json: &serde_json::Value,
) -> Result<(f64, u32, u32), CaptureError> {
    let duration = json["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| load_failed(source, "duration unavailable"))?;

    let stream = json["streams"]
        .as_array()
        .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
        .ok_or_else(|| load_failed(source, "no video stream"))?;

    let dimension = |key: &str| {
        stream[key]
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
    };
    let (Some(width), Some(height)) = (dimension("width"), dimension("height")) else {
        return Err(load_failed(source, "picture size unavailable"));
    };

    Ok((duration, width, height))
}

impl VideoDecoder for FfmpegDecoder {
    async fn probe(&self, source: &Path) -> Result<VideoMetadata, CaptureError> {
        let size = fs::metadata(source)
            .await
            .map_err(|e| load_failed(source, e.to_string()))?
            .len();

        let output = Command::new("ffprobe")
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(source)
            .output()
            .await
            .map_err(|e| load_failed(source, format!("failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(load_failed(
                source,
                format!("ffprobe exited with {}", output.status),
            ));
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| load_failed(source, format!("unreadable ffprobe output: {e}")))?;
        let (duration, width, height) = parse_probe_output(source, &json)?;

        debug!(source = %source.display(), duration, width, height, size, "probed video");
        Ok(VideoMetadata {
            duration,
            width,
            height,
            size,
        })
    }

    async fn grab(&self, source: &Path, timestamp: f64) -> Result<DynamicImage, CaptureError> {
        let capture_failed = |reason: String| CaptureError::CaptureFailed { timestamp, reason };

        let output = Command::new("ffmpeg")
            .arg("-v")
            .arg("error")
            .arg("-ss")
            .arg(format!("{timestamp:.3}"))
            .arg("-i")
            .arg(source)
            .arg("-frames:v")
            .arg("1")
            .arg("-f")
            .arg("image2pipe")
            .arg("-vcodec")
            .arg("png")
            .arg("pipe:1")
            .output()
            .await
            .map_err(|e| capture_failed(format!("failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(capture_failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        if output.stdout.is_empty() {
            return Err(capture_failed("ffmpeg returned no picture".to_string()));
        }

        image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
            .map_err(|e| capture_failed(e.to_string()))
    }
}
