//! Metadata refresh and blobber queue derivation
//!
//! One cycle lists the active videos, refreshes them on the worker pool and
//! queues a fetch ticket for every blobber of each video flagged for a
//! redownload.

pub mod detector;
pub mod engine;
pub mod queue;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

pub use engine::RefreshEngine;
pub use queue::QueueDeriver;
pub use store::RefreshStore;

/// Summary of one refresh cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub active: usize,
    pub flagged: usize,
    pub tickets_created: usize,
    pub enqueue_failures: usize,
}

#[derive(Clone)]
pub struct RefreshCycle {
    store: Arc<dyn RefreshStore>,
    engine: RefreshEngine,
    deriver: QueueDeriver,
}

impl RefreshCycle {
    pub fn new(store: Arc<dyn RefreshStore>, engine: RefreshEngine) -> Self {
        let deriver = QueueDeriver::new(store.clone());
        Self {
            store,
            engine,
            deriver,
        }
    }

    /// Run one full cycle. Only failing to list the batch aborts it.
    pub async fn run(&self) -> Result<CycleReport> {
        let started = Instant::now();

        let videos = self
            .store
            .list_active_videos()
            .await
            .context("Failed to list active videos")?;
        let active = videos.len();

        let flagged = self.engine.refresh(videos).await;

        let mut report = CycleReport {
            active,
            flagged: flagged.len(),
            ..Default::default()
        };

        // Verdicts are already committed, so queueing runs even during shutdown.
        // A failed video keeps its pending verdict and is queued next cycle.
        for video in &flagged {
            match self.deriver.enqueue(&video.id).await {
                Ok(created) => report.tickets_created += created,
                Err(e) => {
                    report.enqueue_failures += 1;
                    warn!(video_id = %video.id, error = %format!("{:#}", e), "Failed to queue blob fetch");
                }
            }
        }

        info!(
            active = report.active,
            flagged = report.flagged,
            tickets_created = report.tickets_created,
            enqueue_failures = report.enqueue_failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Refresh cycle finished"
        );

        Ok(report)
    }
}
