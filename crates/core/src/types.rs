use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CaptureError, ProviderError};

/// Bilingual description of a single frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescription {
    pub en: String,
    pub zh: String,
}

/// One rasterized, timestamped still taken from a video.
///
/// `analyzing` and `description` are only mutated through [`Frame::set_analyzing`]
/// and [`Frame::set_description`], so a frame is never both in flight and described.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: String,
    pub timestamp: f64,
    /// JPEG bytes.
    pub image: Option<Vec<u8>>,
    pub thumbnail: Option<PathBuf>,
    description: Option<FrameDescription>,
    analyzing: bool,
}

impl Frame {
    pub fn new(timestamp: f64, image: Vec<u8>, thumbnail: Option<PathBuf>) -> Self {
        Self {
            id: new_frame_id(),
            timestamp,
            image: Some(image),
            thumbnail,
            description: None,
            analyzing: false,
        }
    }

    /// Rebuilds a frame from persisted parts.
    pub fn restore(
        id: String,
        timestamp: f64,
        image: Option<Vec<u8>>,
        thumbnail: Option<PathBuf>,
        description: Option<FrameDescription>,
    ) -> Self {
        Self {
            id,
            timestamp,
            image,
            thumbnail,
            description,
            analyzing: false,
        }
    }

    pub fn description(&self) -> Option<&FrameDescription> {
        self.description.as_ref()
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing
    }

    /// Marks the frame as in flight. Starting an analysis drops any previous
    /// description, which is handed back to the caller.
    pub fn set_analyzing(&mut self, analyzing: bool) -> Option<FrameDescription> {
        self.analyzing = analyzing;
        if analyzing {
            self.description.take()
        } else {
            None
        }
    }

    pub fn set_description(&mut self, description: FrameDescription) {
        self.description = Some(description);
        self.analyzing = false;
    }

    /// Undescribed, idle frames with image data are the only ones a batch
    /// picks up.
    pub fn is_pending(&self) -> bool {
        self.description.is_none() && self.image.is_some() && !self.analyzing
    }
}

fn new_frame_id() -> String {
    format!("frame-{}", Uuid::new_v4().simple())
}

/// Lightweight frame entry kept on the persisted video record. Thumbnail
/// paths die with the capture session and are left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub id: String,
    pub timestamp: f64,
}

impl From<&Frame> for FrameSummary {
    fn from(frame: &Frame) -> Self {
        Self {
            id: frame.id.clone(),
            timestamp: frame.timestamp,
        }
    }
}

/// Persisted video metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub name: String,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub frames: Vec<FrameSummary>,
    /// Unix millis.
    pub created_at: u64,
}

pub const ALLOWED_INTERVALS: [u32; 3] = [3, 5, 10];
pub const DEFAULT_MAX_FRAMES: usize = 100;

/// Interval/cap pair controlling which timestamps are captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    interval_seconds: u32,
    max_frames: usize,
}

impl SamplingPlan {
    pub fn new(interval_seconds: u32, max_frames: usize) -> Result<Self, CaptureError> {
        if !ALLOWED_INTERVALS.contains(&interval_seconds) {
            return Err(CaptureError::InvalidInterval(interval_seconds));
        }
        Ok(Self {
            interval_seconds,
            max_frames,
        })
    }

    pub fn interval_seconds(&self) -> u32 {
        self.interval_seconds
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }
}

impl Default for SamplingPlan {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

/// Per-frame result of one analysis request.
#[derive(Debug)]
pub enum AnalysisOutcome {
    Success {
        frame_id: String,
        description: FrameDescription,
    },
    Failure {
        frame_id: String,
        error: ProviderError,
    },
}

impl AnalysisOutcome {
    pub fn frame_id(&self) -> &str {
        match self {
            AnalysisOutcome::Success { frame_id, .. } => frame_id,
            AnalysisOutcome::Failure { frame_id, .. } => frame_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub success_count: usize,
    pub failure_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Empty,
    AllSucceeded,
    AllFailed,
    Mixed,
}

impl BatchSummary {
    pub fn outcome(&self) -> BatchOutcome {
        match (self.success_count, self.failure_count) {
            (0, 0) => BatchOutcome::Empty,
            (_, 0) => BatchOutcome::AllSucceeded,
            (0, _) => BatchOutcome::AllFailed,
            _ => BatchOutcome::Mixed,
        }
    }
}
