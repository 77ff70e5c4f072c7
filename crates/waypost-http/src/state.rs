use std::sync::Arc;
use waypost_core::dn::DnAllowList;
use waypost_db::Database;
use waypost_pipeline::{PrepareDriver, StagerDriver};
use waypost_queue::QueueProducer;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub allowed_submitter_dns: Arc<DnAllowList>,
    pub staging_queue: QueueProducer,
    pub stager: Arc<StagerDriver>,
    pub prepare: Arc<PrepareDriver>,
    pub stager_dn: Arc<str>,
    pub agent_dn: Arc<str>,
}
