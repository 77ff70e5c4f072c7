use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use waypost_core::dn::DnAllowList;
use waypost_core::WaypostConfig;
use waypost_db::Database;
use waypost_http::{AppState, HttpServer};
use waypost_pipeline::fts::HttpFtsClient;
use waypost_pipeline::{mtls, FtsDriver, FtsPoller, PermitRegistry, PrepareDriver, StagerDriver};
use waypost_queue::Broker;

use crate::config;

pub async fn init_config(config_path: &Path) -> Result<()> {
    let default_config = WaypostConfig::default();
    config::save_config(config_path, &default_config).await?;
    println!("Configuration file created at: {}", config_path.display());
    println!("\nPlease review and edit the configuration before starting the server.");
    Ok(())
}

/// Start the waypost pipeline coordinator: the HTTPS API, the staging/prepare/
/// FTS drivers, and the FTS poller, all sharing one database and one broker
/// connection.
pub async fn run(config_path: &Path) -> Result<()> {
    info!("Starting waypost pipeline coordinator...");

    let config = config::load_config(config_path)
        .await
        .context("Failed to load configuration")?;
    info!("Configuration loaded from {}", config_path.display());

    let db = Arc::new(
        Database::new(&config.database_url)
            .await
            .context("Failed to initialize database")?,
    );
    info!("Database connection established");

    let broker = Broker::connect(&config.broker.url).context("Failed to connect to broker")?;

    let staging_producer = broker.producer(config.broker.staging_queue.clone());
    let prepare_producer = broker.producer(config.broker.prepare_queue.clone());
    let transfer_producer = broker.producer(config.broker.transfer_queue.clone());

    let staging_consumer = broker.consumer(config.broker.staging_queue.clone(), "waypost-stager");
    let prepare_consumer = broker.consumer(config.broker.prepare_queue.clone(), "waypost-prepare");
    let transfer_consumer = broker.consumer(config.broker.transfer_queue.clone(), "waypost-fts");

    let staging_permits = Arc::new(PermitRegistry::new(config.staging.concurrent_max));
    let prepare_permits = Arc::new(PermitRegistry::new(config.prepare.concurrent_max));
    let fts_permits = Arc::new(PermitRegistry::new(config.fts.concurrent_max));

    let staging_callback = format!("{}/doneStaging", config.callback_base_url);
    let prepare_callback = format!("{}/donePrepare", config.callback_base_url);

    let stager = Arc::new(
        StagerDriver::new(
            db.clone(),
            staging_permits.clone(),
            config.staging.clone(),
            staging_callback,
            prepare_producer,
        )
        .context("Failed to build stager driver")?,
    );

    let prepare = Arc::new(
        PrepareDriver::new(
            db.clone(),
            prepare_permits.clone(),
            &config.prepare,
            config.agent_port,
            prepare_callback,
            transfer_producer,
        )
        .context("Failed to build prepare driver")?,
    );

    let fts_client = mtls::build_client(&config.fts.cert_path, &config.fts.key_path)
        .context("Failed to build FTS client")?;
    let fts_backend = Arc::new(HttpFtsClient::new(fts_client.clone(), config.fts.server.clone()));

    let fts_driver = Arc::new(FtsDriver::new(
        db.clone(),
        fts_permits.clone(),
        fts_client,
        config.agent_port,
        fts_backend.clone(),
    ));

    let poller = Arc::new(FtsPoller::new(
        db.clone(),
        fts_permits.clone(),
        fts_backend,
        config.fts.polling_interval_secs,
    ));

    let stager_handle = {
        let stager = stager.clone();
        tokio::spawn(async move {
            if let Err(e) = stager.run(staging_consumer).await {
                tracing::error!(error = %e, "stager driver exited");
            }
        })
    };

    let prepare_handle = {
        let prepare = prepare.clone();
        tokio::spawn(async move {
            if let Err(e) = prepare.run(prepare_consumer).await {
                tracing::error!(error = %e, "prepare driver exited");
            }
        })
    };

    let fts_handle = tokio::spawn(async move {
        if let Err(e) = fts_driver.run(transfer_consumer).await {
            tracing::error!(error = %e, "FTS driver exited");
        }
    });

    let poller_handle = tokio::spawn(async move {
        poller.run().await;
    });

    let state = AppState {
        db: db.clone(),
        allowed_submitter_dns: Arc::new(DnAllowList::new(config.allowed_submitter_dns.clone())),
        staging_queue: staging_producer,
        stager,
        prepare,
        stager_dn: Arc::from(config.staging.callback_dn.as_str()),
        agent_dn: Arc::from(config.prepare.callback_dn.as_str()),
    };

    let listen_addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Invalid listen_addr in configuration")?;

    let http_server = HttpServer::new(state, listen_addr, config.tls.cert_path.clone(), config.tls.key_path.clone());
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    info!("waypost is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    stager_handle.abort();
    prepare_handle.abort();
    fts_handle.abort();
    poller_handle.abort();
    http_handle.abort();

    Ok(())
}
