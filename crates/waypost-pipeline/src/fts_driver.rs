//! FTS Driver (spec §4.5): consumes the transfer queue, enumerates files via
//! the transfer-host agent, submits one multi-file FTS job, and records
//! `TRANSFERRING`. Unlike staging/prepare, the FTS semaphore token is
//! released by the poller on a terminal FTS state, not here.

use crate::fts::FtsClient;
use crate::semaphore::PermitRegistry;
use std::sync::Arc;
use waypost_core::error::Result;
use waypost_core::types::FileListResponse;
use waypost_core::TransferStatus;
use waypost_db::Database;
use waypost_queue::QueueConsumer;

pub struct FtsDriver {
    db: Arc<Database>,
    permits: Arc<PermitRegistry>,
    agent_client: reqwest::Client,
    agent_port: u16,
    fts: Arc<dyn FtsClient>,
}

impl FtsDriver {
    pub fn new(
        db: Arc<Database>,
        permits: Arc<PermitRegistry>,
        agent_client: reqwest::Client,
        agent_port: u16,
        fts: Arc<dyn FtsClient>,
    ) -> Self {
        Self {
            db,
            permits,
            agent_client,
            agent_port,
            fts,
        }
    }

    pub async fn run(self: Arc<Self>, consumer: QueueConsumer) -> Result<()> {
        consumer
            .run(move |transfer_id| {
                let this = self.clone();
                async move { this.handle(transfer_id).await }
            })
            .await
    }

    async fn handle(&self, transfer_id: String) -> Result<()> {
        // The FTS semaphore token is released by the poller, not here (spec §4.5, §9).
        let permit = self.permits.acquire().await;
        self.permits.stash(&transfer_id, permit);

        let transfer = match self.db.get(&transfer_id).await? {
            Some(t) => t,
            None => {
                tracing::error!(transfer_id, "transfer-queue message for unknown transfer");
                self.permits.release(&transfer_id);
                return Ok(());
            }
        };

        if transfer.status != TransferStatus::PreparingDone {
            // Redelivered message: this transfer already moved past PREPARINGDONE on an
            // earlier delivery. Gate here, like mark_staging/mark_preparing do for their
            // stages, so redelivery never produces a duplicate file-list request or a
            // duplicate, now-orphaned FTS job.
            tracing::warn!(transfer_id, status = %transfer.status, "redelivered transfer message, already past PREPARINGDONE");
            self.permits.release(&transfer_id);
            return Ok(());
        }

        let stager_path = transfer.stager_path.clone().unwrap_or_default();
        let stager_hostname = transfer.stager_hostname.clone().unwrap_or_default();
        let files_uri = format!("https://{stager_hostname}:{}/files", self.agent_port);

        let files = match self
            .agent_client
            .post(&files_uri)
            .form(&[("dir", stager_path.as_str())])
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<FileListResponse>().await {
                    Ok(body) if body.success => body.files,
                    Ok(_) | Err(_) => {
                        self.db
                            .mark_error(&transfer_id, "transfer-host agent returned malformed file list")
                            .await?;
                        self.permits.release(&transfer_id);
                        return Ok(());
                    }
                }
            }
            Ok(resp) => {
                let status = resp.status();
                self.db
                    .mark_error(&transfer_id, &format!("error retrieving file list: {status}"))
                    .await?;
                self.permits.release(&transfer_id);
                return Ok(());
            }
            Err(e) => {
                self.db
                    .mark_error(&transfer_id, &format!("error contacting agent for file list: {e}"))
                    .await?;
                self.permits.release(&transfer_id);
                return Ok(());
            }
        };

        let src_root = format!("gsiftp://{stager_hostname}{}", stager_path.trim_end_matches('/'));
        let dst_root = transfer.destination_path.trim_end_matches('/').to_string();

        let pairs: Vec<(String, String)> = files
            .iter()
            .map(|f| (format!("{src_root}/{f}"), format!("{dst_root}/{f}")))
            .collect();

        match self.fts.submit(&pairs).await {
            Ok(fts_id) => {
                if !self.db.mark_transferring(&transfer_id, &fts_id).await? {
                    tracing::warn!(transfer_id, "transfer advanced past PREPARINGDONE concurrently, dropping");
                    self.permits.release(&transfer_id);
                }
                // On success the token stays held; the poller releases it.
                Ok(())
            }
            Err(e) => {
                self.db
                    .mark_error(&transfer_id, &format!("error submitting to FTS: {e}"))
                    .await?;
                self.permits.release(&transfer_id);
                Ok(())
            }
        }
    }
}
