//! Sample still frames from a video and describe each one with a vision
//! language model, in English and Chinese.

pub mod analyzer;
pub mod capture;
pub mod catalog;
pub mod error;
pub mod export;
pub mod library;
pub mod parser;
pub mod provider;
pub mod scheduler;
pub mod store;
pub mod types;

pub use analyzer::{DescriptionProvider, HttpProvider};
pub use capture::{FfmpegDecoder, FrameCapture, VideoDecoder, VideoHandle, VideoMetadata};
pub use catalog::{Catalog, FrameRecord};
pub use error::{CaptureError, FrameSpeakError, ProviderError, Result, StoreError};
pub use export::{export_markdown, format_timestamp};
pub use library::VideoLibrary;
pub use parser::{UNPARSED_ZH, is_unparsed, parse_description};
pub use provider::{ProviderConfig, ProviderKind};
pub use scheduler::{CONCURRENCY_LIMIT, run_batch};
pub use store::{Collection, FsStore, MemoryStore, Store};
pub use types::{
    AnalysisOutcome, BatchOutcome, BatchProgress, BatchSummary, Frame, FrameDescription,
    SamplingPlan, VideoInfo,
};
