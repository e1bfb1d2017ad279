//! Frame capture engine: owns the active video and turns a sampling plan into
//! an ordered list of JPEG frames.

pub mod ffmpeg;
pub mod sampling;

use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use ffmpeg::{FfmpegDecoder, VideoDecoder, VideoMetadata};
pub use sampling::{SamplingSchedule, encode_jpeg, fit_within};

use crate::{
    error::CaptureError,
    types::{Frame, SamplingPlan},
};

/// A loaded video. Holds the per-session thumbnail directory until released.
#[derive(Debug)]
pub struct VideoHandle {
    pub id: String,
    pub source: PathBuf,
    pub metadata: VideoMetadata,
    thumbnail_dir: Option<PathBuf>,
    released: bool,
}

impl VideoHandle {
    pub fn duration(&self) -> f64 {
        self.metadata.duration
    }

    pub fn width(&self) -> u32 {
        self.metadata.width
    }

    pub fn height(&self) -> u32 {
        self.metadata.height
    }

    pub fn name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    pub fn thumbnail_dir(&self) -> Option<&Path> {
        self.thumbnail_dir.as_deref()
    }

    /// Drops the thumbnails written for this video. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(dir) = &self.thumbnail_dir {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => debug!(video_id = %self.id, dir = %dir.display(), "removed thumbnails"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(video_id = %self.id, error = %e, "failed to remove thumbnails"),
            }
        }
    }
}

impl Drop for VideoHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Capture session. At most one video is active; loading another releases
/// the previous one first.
pub struct FrameCapture<D> {
    decoder: D,
    thumbnail_root: Option<PathBuf>,
    active: Option<VideoHandle>,
}

async fn remove_thumbnails(frames: &[Frame]) {
    for path in frames.iter().filter_map(|f| f.thumbnail.as_ref()) {
        if let Err(e) = fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove thumbnail");
        }
    }
}

impl<D: VideoDecoder> FrameCapture<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            thumbnail_root: None,
            active: None,
        }
    }

    /// Writes a JPEG thumbnail per frame under `root/<video-id>/`.
    pub fn with_thumbnails(mut self, root: impl Into<PathBuf>) -> Self {
        self.thumbnail_root = Some(root.into());
        self
    }

    pub fn active(&self) -> Option<&VideoHandle> {
        self.active.as_ref()
    }

    pub async fn load(&mut self, source: &Path) -> Result<&VideoHandle, CaptureError> {
        self.release();

        let metadata = self.decoder.probe(source).await?;
        let id = format!("video-{}", Uuid::new_v4().simple());
        let thumbnail_dir = self.thumbnail_root.as_ref().map(|root| root.join(&id));

        info!(
            video_id = %id,
            source = %source.display(),
            duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            "video loaded"
        );

        Ok(&*self.active.insert(VideoHandle {
            id,
            source: source.to_path_buf(),
            metadata,
            thumbnail_dir,
            released: false,
        }))
    }

    /// Captures every scheduled timestamp in order. The first failure aborts
    /// the whole call and no frames are returned.
    pub async fn extract<F>(
        &self,
        plan: &SamplingPlan,
        mut on_progress: F,
    ) -> Result<Vec<Frame>, CaptureError>
    where
        F: FnMut(f64, &Frame),
    {
        let handle = self
            .active
            .as_ref()
            .filter(|h| !h.released)
            .ok_or(CaptureError::NoVideoLoaded)?;

        let schedule = SamplingSchedule::new(handle.duration(), plan);
        let total = schedule.remaining();

        if let Some(dir) = &handle.thumbnail_dir {
            fs::create_dir_all(dir).await?;
        }

        debug!(
            video_id = %handle.id,
            total,
            interval = plan.interval_seconds(),
            "extracting frames"
        );

        let mut frames = Vec::with_capacity(total);
        for (index, timestamp) in schedule.enumerate() {
            match self.capture_one(handle, timestamp).await {
                Ok(frame) => {
                    on_progress((index + 1) as f64 / total as f64, &frame);
                    frames.push(frame);
                }
                Err(e) => {
                    remove_thumbnails(&frames).await;
                    return Err(e);
                }
            }
        }

        info!(video_id = %handle.id, frames = frames.len(), "extraction finished");
        Ok(frames)
    }

    async fn capture_one(
        &self,
        handle: &VideoHandle,
        timestamp: f64,
    ) -> Result<Frame, CaptureError> {
        let picture = self.decoder.grab(&handle.source, timestamp).await?;
        // Sized from the decoded picture, which may be rotated relative to the metadata.
        let jpeg = encode_jpeg(&picture, fit_within(picture.width(), picture.height()))?;

        let mut frame = Frame::new(timestamp, jpeg, None);
        if let (Some(dir), Some(image)) = (&handle.thumbnail_dir, &frame.image) {
            let path = dir.join(format!("{}.jpg", frame.id));
            fs::write(&path, image).await?;
            frame.thumbnail = Some(path);
        }
        Ok(frame)
    }

    /// Releases the active video, if any. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(mut handle) = self.active.take() {
            handle.release();
        }
    }
}
