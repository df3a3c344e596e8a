//! Worker pool that refreshes a batch of videos concurrently
//!
//! Jobs are pushed once onto a bounded MPMC channel sized to the batch and
//! the sending side is dropped, so workers drain until the channel reports
//! disconnection. Every job yields exactly one outcome on a result channel of
//! the same capacity, which keeps both sides from ever blocking on a full
//! buffer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use flume::{Receiver, Sender};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::VideoRecord;
use crate::refresh::detector::detect_changes;
use crate::refresh::store::RefreshStore;
use crate::services::{MetadataError, MetadataSource};

/// Failure while refreshing a single video. Never affects sibling jobs.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),

    #[error("refresh cancelled")]
    Cancelled,
}

#[derive(Clone)]
pub struct RefreshEngine {
    store: Arc<dyn RefreshStore>,
    source: Arc<dyn MetadataSource>,
    workers: usize,
    cancel: CancellationToken,
}

impl RefreshEngine {
    pub fn new(
        store: Arc<dyn RefreshStore>,
        source: Arc<dyn MetadataSource>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            source,
            workers: workers.max(1),
            cancel,
        }
    }

    /// Refresh every video of the batch and return those whose assets
    /// should be downloaded again. Output order is unspecified.
    pub async fn refresh(&self, videos: Vec<VideoRecord>) -> Vec<VideoRecord> {
        let total = videos.len();
        if total == 0 {
            return Vec::new();
        }

        // One timestamp for every row written in this cycle
        let at = Utc::now();

        let (job_tx, job_rx) = flume::bounded::<VideoRecord>(total);
        let (result_tx, result_rx) = flume::bounded::<Option<VideoRecord>>(total);

        for video in videos {
            // Capacity equals the batch and a receiver is held, so this never fails
            if job_tx.send(video).is_err() {
                break;
            }
        }
        drop(job_tx);

        let worker_count = self.workers.min(total);
        let mut handles = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            let engine = self.clone();
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            handles.push(tokio::spawn(async move {
                engine.run_worker(worker, jobs, results, at).await;
            }));
        }
        drop(job_rx);
        drop(result_tx);

        let mut flagged = Vec::new();
        for _ in 0..total {
            match result_rx.recv_async().await {
                Ok(Some(video)) => flagged.push(video),
                Ok(None) => {}
                Err(_) => {
                    warn!("All refresh workers exited before reporting every job");
                    break;
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Refresh worker panicked");
            }
        }

        flagged
    }

    async fn run_worker(
        &self,
        worker: usize,
        jobs: Receiver<VideoRecord>,
        results: Sender<Option<VideoRecord>>,
        at: DateTime<Utc>,
    ) {
        while let Ok(video) = jobs.recv_async().await {
            let video_id = video.id.clone();

            let outcome = match self.refresh_video(video, at).await {
                Ok(Some(video)) => {
                    info!(worker, video_id = %video_id, "Video should be downloaded");
                    Some(video)
                }
                Ok(None) => None,
                Err(RefreshError::Cancelled) => {
                    debug!(worker, video_id = %video_id, "Skipped refresh, shutting down");
                    None
                }
                Err(e) => {
                    warn!(worker, video_id = %video_id, error = %e, "Failed to refresh video");
                    None
                }
            };

            if results.send_async(outcome).await.is_err() {
                break;
            }
        }

        debug!(worker, "Refresh worker done");
    }

    /// Fetch, diff and persist one video.
    ///
    /// Returns the updated record when its assets should be fetched again,
    /// either because of this refresh or an earlier verdict still pending.
    pub async fn refresh_video(
        &self,
        video: VideoRecord,
        at: DateTime<Utc>,
    ) -> Result<Option<VideoRecord>, RefreshError> {
        if self.cancel.is_cancelled() {
            return Err(RefreshError::Cancelled);
        }

        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return Err(RefreshError::Cancelled),
            result = self.source.fetch(&video.id) => result,
        };

        let metadata = match fetched {
            Ok(metadata) => Some(metadata),
            // A known video vanishing from the source means it went private
            Err(MetadataError::NotFound) if video.fetched => None,
            Err(e) => return Err(e.into()),
        };

        let changes = detect_changes(&video, metadata.as_ref(), at);
        debug!(
            video_id = %video.id,
            fields = changes.fields.len(),
            counters = changes.counters.len(),
            redownload = changes.redownload,
            pending = video.pending_download,
            "Detected changes"
        );
        let write = changes.into_write();
        let flagged = write.video.pending_download;

        if self.cancel.is_cancelled() {
            return Err(RefreshError::Cancelled);
        }

        self.store
            .commit_refresh(&write)
            .await
            .map_err(RefreshError::Storage)?;

        Ok(flagged.then_some(write.video))
    }
}
