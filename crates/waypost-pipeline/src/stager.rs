//! Stager Driver (spec §4.3): consumes the staging queue, hands each
//! transfer to the stager over mTLS, and holds a staging-stage semaphore
//! token until the StagingFinish callback releases it.

use crate::mtls;
use crate::semaphore::PermitRegistry;
use std::sync::Arc;
use waypost_core::config::StagerConfig;
use waypost_core::error::Result;
use waypost_db::Database;
use waypost_queue::{QueueConsumer, QueueProducer};

pub struct StagerDriver {
    db: Arc<Database>,
    permits: Arc<PermitRegistry>,
    client: reqwest::Client,
    config: StagerConfig,
    callback_url: String,
    prepare_queue: QueueProducer,
}

impl StagerDriver {
    pub fn new(
        db: Arc<Database>,
        permits: Arc<PermitRegistry>,
        config: StagerConfig,
        callback_url: String,
        prepare_queue: QueueProducer,
    ) -> Result<Self> {
        let client = mtls::build_client(&config.cert_path, &config.key_path)?;
        Ok(Self {
            db,
            permits,
            client,
            config,
            callback_url,
            prepare_queue,
        })
    }

    /// Run the consume loop. Intended to be `tokio::spawn`ed for the
    /// lifetime of the process (spec §9).
    pub async fn run(self: Arc<Self>, consumer: QueueConsumer) -> Result<()> {
        consumer
            .run(move |transfer_id| {
                let this = self.clone();
                async move { this.handle(transfer_id).await }
            })
            .await
    }

    async fn handle(&self, transfer_id: String) -> Result<()> {
        // Token acquired before ack, released by StagingFinish (spec §4.3).
        let permit = self.permits.acquire().await;
        self.permits.stash(&transfer_id, permit);

        let transfer = match self.db.get(&transfer_id).await? {
            Some(t) => t,
            None => {
                tracing::error!(transfer_id, "staging message for unknown transfer");
                self.permits.release(&transfer_id);
                return Ok(());
            }
        };

        if !self.db.mark_staging(&transfer_id).await? {
            tracing::warn!(transfer_id, "redelivered staging message, already past SUBMITTED");
            self.permits.release(&transfer_id);
            return Ok(());
        }

        let result = self
            .client
            .post(&self.config.uri)
            .form(&[
                ("transfer_id", transfer_id.as_str()),
                ("product_id", transfer.product_id.as_str()),
                ("callback", self.callback_url.as_str()),
            ])
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(transfer_id, "submitted to stager");
                Ok(())
            }
            Ok(resp) => {
                let status = resp.status();
                self.db
                    .mark_error(&transfer_id, &format!("stager rejected request: {status}"))
                    .await?;
                self.permits.release(&transfer_id);
                Ok(())
            }
            Err(e) => {
                self.db
                    .mark_error(&transfer_id, &format!("error contacting stager: {e}"))
                    .await?;
                self.permits.release(&transfer_id);
                Ok(())
            }
        }
    }

    /// Handle the StagingFinish callback (spec §4.3, §6 `/doneStaging`).
    ///
    /// Returns `true` if this call performed the transition (the semaphore
    /// release happens here, never at ack time — spec §9).
    pub async fn finish_staging(
        &self,
        transfer_id: &str,
        success: bool,
        staged_to: Option<&str>,
        path: Option<&str>,
        msg: Option<&str>,
    ) -> Result<bool> {
        if !success {
            let advanced = self
                .db
                .mark_error(transfer_id, msg.unwrap_or("stager reported failure"))
                .await?;
            self.permits.release(transfer_id);
            return Ok(advanced);
        }

        let path = path.unwrap_or_default();
        let staged_to = staged_to.unwrap_or_default();

        let advanced = self
            .db
            .mark_staging_done(transfer_id, path, staged_to, msg)
            .await?;

        if !advanced {
            // Not in STAGING anymore: redelivered or stale callback (spec §4.1 tie-break).
            return Ok(false);
        }

        self.prepare_queue.publish(transfer_id).await?;
        self.permits.release(transfer_id);
        Ok(true)
    }
}
