//! Prepare Driver (spec §4.4): consumes the prepare queue. A transfer with
//! no `prepare_activity` advances straight to `PREPARINGDONE`; otherwise the
//! transfer-host agent's `/prepare` is invoked and the driver awaits
//! PrepareFinish, mirroring the Stager Driver's semaphore-across-callback
//! contract.

use crate::mtls;
use crate::semaphore::PermitRegistry;
use std::sync::Arc;
use waypost_core::config::PrepareConfig;
use waypost_core::error::Result;
use waypost_db::Database;
use waypost_queue::{QueueConsumer, QueueProducer};

pub struct PrepareDriver {
    db: Arc<Database>,
    permits: Arc<PermitRegistry>,
    client: reqwest::Client,
    callback_url: String,
    agent_port: u16,
    transfer_queue: QueueProducer,
}

impl PrepareDriver {
    pub fn new(
        db: Arc<Database>,
        permits: Arc<PermitRegistry>,
        config: &PrepareConfig,
        agent_port: u16,
        callback_url: String,
        transfer_queue: QueueProducer,
    ) -> Result<Self> {
        let client = mtls::build_client(&config.cert_path, &config.key_path)?;
        Ok(Self {
            db,
            permits,
            client,
            callback_url,
            agent_port,
            transfer_queue,
        })
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
        let permit = self.permits.acquire().await;
        self.permits.stash(&transfer_id, permit);

        let transfer = match self.db.get(&transfer_id).await? {
            Some(t) => t,
            None => {
                tracing::error!(transfer_id, "prepare message for unknown transfer");
                self.permits.release(&transfer_id);
                return Ok(());
            }
        };

        match transfer.prepare_activity {
            None => {
                // No-op advance branch (spec §4.4, testable property #10): no outbound call.
                if self
                    .db
                    .mark_preparing_done(&transfer_id, waypost_core::TransferStatus::StagingDone)
                    .await?
                {
                    self.transfer_queue.publish(&transfer_id).await?;
                }
                self.permits.release(&transfer_id);
                Ok(())
            }
            Some(activity) => {
                if !self.db.mark_preparing(&transfer_id).await? {
                    tracing::warn!(transfer_id, "redelivered prepare message, already past STAGINGDONE");
                    self.permits.release(&transfer_id);
                    return Ok(());
                }

                let hostname = transfer.stager_hostname.unwrap_or_default();
                let stager_path = transfer.stager_path.unwrap_or_default();
                let prepare_uri = format!("https://{hostname}:{}/prepare", self.agent_port);

                let result = self
                    .client
                    .post(&prepare_uri)
                    .form(&[
                        ("transfer_id", transfer_id.as_str()),
                        ("dir", stager_path.as_str()),
                        ("prepare", activity.as_str()),
                        ("callback", self.callback_url.as_str()),
                    ])
                    .send()
                    .await;

                match result {
                    Ok(resp) if resp.status().is_success() => Ok(()),
                    Ok(resp) => {
                        let status = resp.status();
                        self.db
                            .mark_error(&transfer_id, &format!("prepare service rejected request: {status}"))
                            .await?;
                        self.permits.release(&transfer_id);
                        Ok(())
                    }
                    Err(e) => {
                        self.db
                            .mark_error(&transfer_id, &format!("error contacting prepare service: {e}"))
                            .await?;
                        self.permits.release(&transfer_id);
                        Ok(())
                    }
                }
            }
        }
    }

    /// Handle the PrepareFinish callback (spec §4.4, §6 `/donePrepare`).
    pub async fn finish_prepare(&self, transfer_id: &str, success: bool, msg: Option<&str>) -> Result<bool> {
        if !success {
            let advanced = self
                .db
                .mark_error(transfer_id, msg.unwrap_or("prepare service reported failure"))
                .await?;
            self.permits.release(transfer_id);
            return Ok(advanced);
        }

        let advanced = self
            .db
            .mark_preparing_done(transfer_id, waypost_core::TransferStatus::Preparing)
            .await?;

        if !advanced {
            return Ok(false);
        }

        self.transfer_queue.publish(transfer_id).await?;
        self.permits.release(transfer_id);
        Ok(true)
    }
}
