use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use waypost_core::error::Result;
use waypost_core::types::Transfer;
use waypost_core::TransferStatus;

/// Persistence layer over the single `transfers` table.
///
/// Every status write that advances the machine binds the expected prior
/// status into the `WHERE` clause, so redelivered queue messages and
/// overlapping poller ticks only ever apply their transition once.
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transfers (
                transfer_id TEXT PRIMARY KEY,
                product_id TEXT NOT NULL,
                destination_path TEXT NOT NULL,
                submitter TEXT NOT NULL,
                prepare_activity TEXT,
                status TEXT NOT NULL,
                extra_status TEXT,
                stager_path TEXT,
                stager_hostname TEXT,
                stager_status TEXT,
                fts_id TEXT,
                fts_details TEXT,
                time_submitted TIMESTAMPTZ,
                time_staging TIMESTAMPTZ,
                time_staging_done TIMESTAMPTZ,
                time_transferring TIMESTAMPTZ,
                time_error TIMESTAMPTZ,
                time_success TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS transfers_status_idx ON transfers (status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert the initial `INIT` row for a newly submitted transfer (spec §4.2 step 3).
    pub async fn insert_init(
        &self,
        transfer_id: &str,
        product_id: &str,
        destination_path: &str,
        submitter: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transfers (transfer_id, product_id, destination_path, submitter, status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(transfer_id)
        .bind(product_id)
        .bind(destination_path)
        .bind(submitter)
        .bind(TransferStatus::Init.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// `INIT -> SUBMITTED` after the staging-queue publish succeeds (spec §4.2 step 5).
    pub async fn mark_submitted(&self, transfer_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfers SET status = $1, time_submitted = $2
            WHERE transfer_id = $3 AND status = $4
            "#,
        )
        .bind(TransferStatus::Submitted.as_str())
        .bind(Utc::now())
        .bind(transfer_id)
        .bind(TransferStatus::Init.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `SUBMITTED -> STAGING` once the Stager Driver's POST is accepted (spec §4.3 step 2).
    pub async fn mark_staging(&self, transfer_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfers SET status = $1, time_staging = $2
            WHERE transfer_id = $3 AND status = $4
            "#,
        )
        .bind(TransferStatus::Staging.as_str())
        .bind(Utc::now())
        .bind(transfer_id)
        .bind(TransferStatus::Submitted.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `STAGING -> STAGINGDONE` on a successful StagingFinish callback (spec §4.3).
    pub async fn mark_staging_done(
        &self,
        transfer_id: &str,
        stager_path: &str,
        stager_hostname: &str,
        stager_status: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfers
            SET status = $1, time_staging_done = $2, stager_path = $3,
                stager_hostname = $4, stager_status = $5
            WHERE transfer_id = $6 AND status = $7
            "#,
        )
        .bind(TransferStatus::StagingDone.as_str())
        .bind(Utc::now())
        .bind(stager_path)
        .bind(stager_hostname)
        .bind(stager_status)
        .bind(transfer_id)
        .bind(TransferStatus::Staging.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `STAGINGDONE -> PREPARING` when the Prepare Driver dequeues and has an activity to run.
    pub async fn mark_preparing(&self, transfer_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfers SET status = $1
            WHERE transfer_id = $2 AND status = $3
            "#,
        )
        .bind(TransferStatus::Preparing.as_str())
        .bind(transfer_id)
        .bind(TransferStatus::StagingDone.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `STAGINGDONE -> PREPARINGDONE` or `PREPARING -> PREPARINGDONE` (spec §4.4 both branches).
    pub async fn mark_preparing_done(&self, transfer_id: &str, from: TransferStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfers SET status = $1
            WHERE transfer_id = $2 AND status = $3
            "#,
        )
        .bind(TransferStatus::PreparingDone.as_str())
        .bind(transfer_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `PREPARINGDONE -> TRANSFERRING` once FTS accepts the submitted job (spec §4.5 step 5).
    pub async fn mark_transferring(&self, transfer_id: &str, fts_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfers SET status = $1, time_transferring = $2, fts_id = $3
            WHERE transfer_id = $4 AND status = $5
            "#,
        )
        .bind(TransferStatus::Transferring.as_str())
        .bind(Utc::now())
        .bind(fts_id)
        .bind(transfer_id)
        .bind(TransferStatus::PreparingDone.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `TRANSFERRING -> SUCCESS` on a poll observing FTS `FINISHED` (spec §4.6 step 3).
    pub async fn mark_success(&self, transfer_id: &str, fts_details: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfers SET status = $1, time_success = $2, fts_details = $3
            WHERE transfer_id = $4 AND status = $5
            "#,
        )
        .bind(TransferStatus::Success.as_str())
        .bind(Utc::now())
        .bind(fts_details)
        .bind(transfer_id)
        .bind(TransferStatus::Transferring.as_str())
        .execute(&self.pool)
        .await?;

        let advanced = result.rows_affected() == 1;
        if !advanced {
            tracing::warn!(transfer_id, "mark_success found no row in TRANSFERRING, dropping stale FTS observation");
        }
        Ok(advanced)
    }

    /// Update `fts_details` only, for a poll that observes a non-terminal FTS state.
    pub async fn update_fts_details(&self, transfer_id: &str, fts_details: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transfers SET fts_details = $1
            WHERE transfer_id = $2 AND status = $3
            "#,
        )
        .bind(fts_details)
        .bind(transfer_id)
        .bind(TransferStatus::Transferring.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Transition `transfer_id` to `ERROR` from any non-terminal prior status (spec §4.1).
    ///
    /// Unlike the forward transitions, this one doesn't check the prior status beyond
    /// "not already terminal" — `ERROR` is reachable from every non-terminal state.
    pub async fn mark_error(&self, transfer_id: &str, extra_status: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfers SET status = $1, time_error = $2, extra_status = $3
            WHERE transfer_id = $4
              AND status NOT IN ($5, $6)
            "#,
        )
        .bind(TransferStatus::Error.as_str())
        .bind(Utc::now())
        .bind(extra_status)
        .bind(transfer_id)
        .bind(TransferStatus::Success.as_str())
        .bind(TransferStatus::Error.as_str())
        .execute(&self.pool)
        .await?;

        let advanced = result.rows_affected() == 1;
        if !advanced {
            tracing::debug!(transfer_id, "mark_error found transfer already terminal, dropping");
        }
        Ok(advanced)
    }

    pub async fn get(&self, transfer_id: &str) -> Result<Option<Transfer>> {
        let row = sqlx::query_as::<_, TransferRow>("SELECT * FROM transfers WHERE transfer_id = $1")
            .bind(transfer_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|r| r.try_into().ok()))
    }

    /// All transfers currently in `TRANSFERRING`, polled each FTS Poller tick (spec §4.6 step 1).
    pub async fn list_transferring(&self) -> Result<Vec<Transfer>> {
        let rows = sqlx::query_as::<_, TransferRow>(
            "SELECT * FROM transfers WHERE status = $1 ORDER BY time_transferring ASC",
        )
        .bind(TransferStatus::Transferring.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(|r| r.try_into().ok()).collect())
    }

    /// Rows stuck in `INIT`, for the operator `gc-init` command.
    ///
    /// `INIT` rows have no `time_submitted` (it's set on the `SUBMITTED` transition), so this
    /// can't filter by age itself; the operator decides which ids are actually stale.
    pub async fn list_init(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT transfer_id FROM transfers WHERE status = $1")
            .bind(TransferStatus::Init.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| row.get("transfer_id")).collect())
    }

    /// Delete a row stuck in `INIT`. Only ever called by operator tooling, never by the pipeline.
    pub async fn delete_init(&self, transfer_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM transfers WHERE transfer_id = $1 AND status = $2")
            .bind(transfer_id)
            .bind(TransferStatus::Init.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[derive(sqlx::FromRow)]
struct TransferRow {
    transfer_id: String,
    product_id: String,
    destination_path: String,
    submitter: String,
    prepare_activity: Option<String>,
    status: String,
    extra_status: Option<String>,
    stager_path: Option<String>,
    stager_hostname: Option<String>,
    stager_status: Option<String>,
    fts_id: Option<String>,
    fts_details: Option<String>,
    time_submitted: Option<chrono::DateTime<Utc>>,
    time_staging: Option<chrono::DateTime<Utc>>,
    time_staging_done: Option<chrono::DateTime<Utc>>,
    time_transferring: Option<chrono::DateTime<Utc>>,
    time_error: Option<chrono::DateTime<Utc>>,
    time_success: Option<chrono::DateTime<Utc>>,
}

impl TryFrom<TransferRow> for Transfer {
    type Error = anyhow::Error;

    fn try_from(row: TransferRow) -> std::result::Result<Self, Self::Error> {
        Ok(Transfer {
            transfer_id: row.transfer_id,
            product_id: row.product_id,
            destination_path: row.destination_path,
            submitter: row.submitter,
            prepare_activity: row.prepare_activity,
            status: row.status.parse().map_err(|e: waypost_core::WaypostError| anyhow::anyhow!(e))?,
            extra_status: row.extra_status,
            stager_path: row.stager_path,
            stager_hostname: row.stager_hostname,
            stager_status: row.stager_status,
            fts_id: row.fts_id,
            fts_details: row.fts_details,
            time_submitted: row.time_submitted,
            time_staging: row.time_staging,
            time_staging_done: row.time_staging_done,
            time_transferring: row.time_transferring,
            time_error: row.time_error,
            time_success: row.time_success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_row(status: &str) -> TransferRow {
        TransferRow {
            transfer_id: "t1".to_string(),
            product_id: "P001".to_string(),
            destination_path: "gsiftp://dst.example/inbox".to_string(),
            submitter: "/O=Example/CN=alice".to_string(),
            prepare_activity: None,
            status: status.to_string(),
            extra_status: None,
            stager_path: None,
            stager_hostname: None,
            stager_status: None,
            fts_id: None,
            fts_details: None,
            time_submitted: None,
            time_staging: None,
            time_staging_done: None,
            time_transferring: None,
            time_error: None,
            time_success: None,
        }
    }

    #[test]
    fn row_conversion_parses_known_status() {
        let transfer: Transfer = bare_row("STAGINGDONE").try_into().unwrap();
        assert_eq!(transfer.status, TransferStatus::StagingDone);
    }

    #[test]
    fn row_conversion_rejects_unknown_status() {
        let result: std::result::Result<Transfer, _> = bare_row("BOGUS").try_into();
        assert!(result.is_err());
    }
}
