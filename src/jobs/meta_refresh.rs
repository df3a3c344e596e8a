//! Scheduled metadata refresh

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::refresh::{CycleReport, RefreshCycle};

/// Run one refresh cycle unless the previous one is still in progress
pub async fn run_refresh_cycle(cycle: &RefreshCycle, running: &Mutex<()>) -> Option<CycleReport> {
    let Ok(_guard) = running.try_lock() else {
        warn!("Previous metadata refresh still running, skipping tick");
        return None;
    };

    info!("Running metadata refresh");
    match cycle.run().await {
        Ok(report) => Some(report),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Metadata refresh failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::db::Database;
    use crate::refresh::testing::ScriptedSource;
    use crate::refresh::{RefreshEngine, RefreshStore};

    async fn cycle() -> RefreshCycle {
        let db = Database::in_memory().await.unwrap();
        let store: Arc<dyn RefreshStore> = Arc::new(db);
        let engine = RefreshEngine::new(
            store.clone(),
            Arc::new(ScriptedSource::new()),
            2,
            CancellationToken::new(),
        );
        RefreshCycle::new(store, engine)
    }

    #[tokio::test]
    async fn test_runs_when_idle() {
        let running = Mutex::new(());
        let report = run_refresh_cycle(&cycle().await, &running).await;
        assert_eq!(report, Some(CycleReport::default()));
    }

    #[tokio::test]
    async fn test_skips_overlapping_tick() {
        let running = Mutex::new(());
        let _held = running.lock().await;
        assert_eq!(run_refresh_cycle(&cycle().await, &running).await, None);
    }
}
