//! Batch analysis with a fixed ceiling on in-flight requests.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    analyzer::DescriptionProvider,
    provider::ProviderConfig,
    types::{AnalysisOutcome, BatchProgress, BatchSummary, Frame},
};

pub const CONCURRENCY_LIMIT: usize = 3;

/// Analyzes a single image and tags the result with its frame id.
pub async fn analyze_one<P: DescriptionProvider>(
    provider: &P,
    frame_id: &str,
    image: &[u8],
    config: &ProviderConfig,
) -> AnalysisOutcome {
    match provider.analyze(image, config).await {
        Ok(description) => AnalysisOutcome::Success {
            frame_id: frame_id.to_string(),
            description,
        },
        Err(error) => AnalysisOutcome::Failure {
            frame_id: frame_id.to_string(),
            error,
        },
    }
}

/// Describes every pending frame, [`CONCURRENCY_LIMIT`] at a time.
///
/// Each chunk is fully settled before the next one starts; a failed frame is
/// left without a description and never stops the batch. `on_progress` fires
/// once per chunk.
pub async fn run_batch<P, F>(
    frames: &mut [Frame],
    provider: &P,
    config: &ProviderConfig,
    mut on_progress: F,
) -> BatchSummary
where
    P: DescriptionProvider,
    F: FnMut(BatchProgress),
{
    let pending: Vec<usize> = frames
        .iter()
        .enumerate()
        .filter(|(_, frame)| frame.is_pending())
        .map(|(index, _)| index)
        .collect();

    let total = pending.len();
    let mut summary = BatchSummary::default();
    if total == 0 {
        return summary;
    }

    info!(total, provider = config.kind.as_str(), "batch analysis started");

    let mut processed = 0;
    for chunk in pending.chunks(CONCURRENCY_LIMIT) {
        for &index in chunk {
            frames[index].set_analyzing(true);
        }

        let outcomes = {
            let view: &[Frame] = frames;
            let requests = chunk.iter().filter_map(|&index| {
                let frame = &view[index];
                let image = frame.image.as_deref()?;
                Some(analyze_one(provider, &frame.id, image, config))
            });
            join_all(requests).await
        };
        debug!(chunk = chunk.len(), "chunk settled");

        for (&index, outcome) in chunk.iter().zip(outcomes) {
            let frame = &mut frames[index];
            match outcome {
                AnalysisOutcome::Success { description, .. } => {
                    frame.set_description(description);
                    summary.success_count += 1;
                }
                AnalysisOutcome::Failure { frame_id, error } => {
                    warn!(frame_id = %frame_id, error = %error, "frame analysis failed");
                    frame.set_analyzing(false);
                    summary.failure_count += 1;
                }
            }
        }

        processed += chunk.len();
        on_progress(BatchProgress {
            completed: processed.min(total),
            total,
        });
    }

    info!(
        succeeded = summary.success_count,
        failed = summary.failure_count,
        "batch analysis finished"
    );
    summary
}
