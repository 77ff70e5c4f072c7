use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;
use std::sync::Arc;
use waypost_db::Database;

use crate::config;

#[derive(Subcommand)]
pub enum TransferCommands {
    /// Show a single transfer's current row
    Show {
        /// Transfer id
        transfer_id: String,
    },

    /// List transfers stuck in INIT (submitted but never queued)
    ListInit,

    /// Delete an INIT row, e.g. after confirming the client never retried
    /// the submit (spec.md leaves INIT garbage collection to the operator)
    GcInit {
        /// Transfer id
        transfer_id: String,
    },
}

pub async fn handle(config_path: &Path, cmd: TransferCommands) -> Result<()> {
    let config = config::load_config(config_path)
        .await
        .context("Failed to load configuration")?;
    let db = Arc::new(Database::new(&config.database_url).await.context("Failed to connect to database")?);

    match cmd {
        TransferCommands::Show { transfer_id } => match db.get(&transfer_id).await? {
            Some(transfer) => println!("{}", serde_json::to_string_pretty(&transfer)?),
            None => println!("no such transfer: {transfer_id}"),
        },
        TransferCommands::ListInit => {
            let ids = db.list_init().await?;
            if ids.is_empty() {
                println!("no transfers stuck in INIT");
            } else {
                for id in ids {
                    println!("{id}");
                }
            }
        }
        TransferCommands::GcInit { transfer_id } => {
            if db.delete_init(&transfer_id).await? {
                println!("deleted INIT row {transfer_id}");
            } else {
                println!("{transfer_id} was not in INIT (already progressed, or unknown)");
            }
        }
    }

    Ok(())
}
