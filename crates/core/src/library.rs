//! The working set of one video: capture session, in-memory frames and their
//! persisted copies.

use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{debug, info, warn};

use crate::{
    analyzer::DescriptionProvider,
    capture::{FrameCapture, VideoDecoder},
    catalog::{Catalog, FrameRecord},
    error::{CaptureError, FrameSpeakError, Result, StoreError},
    provider::ProviderConfig,
    scheduler::{analyze_one, run_batch},
    store::Store,
    types::{
        AnalysisOutcome, BatchProgress, BatchSummary, Frame, FrameDescription, FrameSummary,
        SamplingPlan, VideoInfo,
    },
};

pub struct VideoLibrary<D, S> {
    capture: FrameCapture<D>,
    catalog: Catalog<S>,
    video: Option<VideoInfo>,
    frames: Vec<Frame>,
}

impl<D: VideoDecoder, S: Store> VideoLibrary<D, S> {
    pub fn new(capture: FrameCapture<D>, store: S) -> Self {
        Self {
            capture,
            catalog: Catalog::new(store),
            video: None,
            frames: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog<S> {
        &self.catalog
    }

    pub fn current_video(&self) -> Option<&VideoInfo> {
        self.video.as_ref()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, frame_id: &str) -> Option<&Frame> {
        self.frames.iter().find(|f| f.id == frame_id)
    }

    fn frame_mut(&mut self, frame_id: &str) -> Result<&mut Frame> {
        self.frames
            .iter_mut()
            .find(|f| f.id == frame_id)
            .ok_or_else(|| FrameSpeakError::FrameNotFound(frame_id.to_string()))
    }

    /// Starts a new session for `source`. The previous session is released
    /// but its persisted records are kept.
    pub async fn load_video(&mut self, source: &Path) -> Result<&VideoInfo> {
        self.frames.clear();
        self.video = None;

        let handle = self.capture.load(source).await?;
        let video = VideoInfo {
            id: handle.id.clone(),
            name: handle.name(),
            duration: handle.duration(),
            width: handle.width(),
            height: handle.height(),
            size: handle.metadata.size,
            frames: Vec::new(),
            created_at: now_millis(),
        };

        self.catalog.save_video_info(&video).await?;
        Ok(&*self.video.insert(video))
    }

    /// Samples the loaded video. Nothing is kept or persisted unless every
    /// timestamp was captured.
    pub async fn extract_frames<F>(
        &mut self,
        plan: &SamplingPlan,
        on_progress: F,
    ) -> Result<&[Frame]>
    where
        F: FnMut(f64, &Frame),
    {
        let frames = self.capture.extract(plan, on_progress).await?;
        let video = self
            .video
            .as_mut()
            .ok_or(CaptureError::NoVideoLoaded)?;

        // A re-extraction replaces the previous run's frames.
        self.catalog.delete_video_frames(&video.id).await?;
        for frame in &frames {
            if let Some(record) = FrameRecord::from_frame(&video.id, frame) {
                self.catalog.save_frame(&record).await?;
            }
        }
        video.frames = frames.iter().map(FrameSummary::from).collect();
        self.catalog.save_video_info(video).await?;

        info!(video_id = %video.id, frames = frames.len(), "frames stored");
        self.frames = frames;
        Ok(&self.frames)
    }

    /// Reopens a persisted video with its frames and descriptions. The capture
    /// session is released; reopened frames carry no thumbnail.
    pub async fn open_video(&mut self, video_id: &str) -> Result<&VideoInfo> {
        self.capture.release();

        let video = self
            .catalog
            .get_video_info(video_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection: "videos",
                key: video_id.to_string(),
            })?;
        self.frames = self
            .catalog
            .video_frames(video_id)
            .await?
            .into_iter()
            .map(FrameRecord::into_frame)
            .collect();

        debug!(video_id, frames = self.frames.len(), "video reopened");
        Ok(&*self.video.insert(video))
    }

    /// Returns the description dropped when a described frame is marked
    /// analyzing again.
    pub fn set_analyzing(
        &mut self,
        frame_id: &str,
        analyzing: bool,
    ) -> Result<Option<FrameDescription>> {
        Ok(self.frame_mut(frame_id)?.set_analyzing(analyzing))
    }

    pub async fn update_frame_description(
        &mut self,
        frame_id: &str,
        description: FrameDescription,
    ) -> Result<()> {
        self.frame_mut(frame_id)?.set_description(description.clone());
        self.catalog
            .update_frame_description(frame_id, &description)
            .await?;
        Ok(())
    }

    /// Describes one frame on demand. On failure the frame keeps whatever
    /// description it had and can be analyzed again.
    pub async fn analyze_frame<P: DescriptionProvider>(
        &mut self,
        frame_id: &str,
        provider: &P,
        config: &ProviderConfig,
    ) -> Result<FrameDescription> {
        config.validate()?;

        let frame = self.frame_mut(frame_id)?;
        let image = frame
            .image
            .clone()
            .ok_or_else(|| FrameSpeakError::MissingImage(frame_id.to_string()))?;
        let previous = frame.set_analyzing(true);

        match analyze_one(provider, frame_id, &image, config).await {
            AnalysisOutcome::Success { description, .. } => {
                self.update_frame_description(frame_id, description.clone())
                    .await?;
                Ok(description)
            }
            AnalysisOutcome::Failure { error, .. } => {
                warn!(frame_id, error = %error, "frame analysis failed");
                let frame = self.frame_mut(frame_id)?;
                frame.set_analyzing(false);
                if let Some(previous) = previous {
                    frame.set_description(previous);
                }
                Err(error.into())
            }
        }
    }

    /// Runs the batch scheduler over the current frames and persists every
    /// description it produced.
    pub async fn analyze_all<P, F>(
        &mut self,
        provider: &P,
        config: &ProviderConfig,
        on_progress: F,
    ) -> Result<BatchSummary>
    where
        P: DescriptionProvider,
        F: FnMut(BatchProgress),
    {
        config.validate()?;

        let pending: Vec<String> = self
            .frames
            .iter()
            .filter(|f| f.is_pending())
            .map(|f| f.id.clone())
            .collect();

        let summary = run_batch(&mut self.frames, provider, config, on_progress).await;

        for frame in self.frames.iter().filter(|f| pending.contains(&f.id)) {
            if let Some(description) = frame.description() {
                self.catalog
                    .update_frame_description(&frame.id, description)
                    .await?;
            }
        }
        Ok(summary)
    }

    /// Ends the session and deletes the current video with its frames.
    /// Calling it without a current video does nothing.
    pub async fn clear_video(&mut self) -> Result<()> {
        self.capture.release();
        self.frames.clear();
        if let Some(video) = self.video.take() {
            self.catalog.delete_video(&video.id).await?;
            info!(video_id = %video.id, "video cleared");
        }
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
