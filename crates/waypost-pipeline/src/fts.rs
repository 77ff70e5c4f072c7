//! FTS submission/polling surface (spec §4.5, §4.6). The distilled spec
//! treats FTS as an opaque third party; this trait is the seam, mirroring
//! the original's thin wrapper around `fts3.rest.client.easy`
//! (`Context`/`new_transfer`/`new_job`/`submit`/`get_job_status`).

use async_trait::async_trait;
use waypost_core::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtsJobState {
    Submitted,
    Active,
    Finished,
    Failed,
}

#[derive(Debug, Clone)]
pub struct FtsJobStatus {
    pub state: FtsJobState,
    /// Raw server-reported detail, stored verbatim into `fts_details`.
    pub details: String,
}

#[async_trait]
pub trait FtsClient: Send + Sync {
    /// Submit one job moving every `(src, dst)` pair, returning the job id.
    async fn submit(&self, transfers: &[(String, String)]) -> Result<String>;

    async fn status(&self, fts_id: &str) -> Result<FtsJobStatus>;
}

/// Production client talking to a real FTS3 REST endpoint over mTLS.
pub struct HttpFtsClient {
    client: reqwest::Client,
    server: String,
}

impl HttpFtsClient {
    pub fn new(client: reqwest::Client, server: String) -> Self {
        Self { client, server }
    }
}

#[derive(serde::Serialize)]
struct FtsJobRequest<'a> {
    files: Vec<FtsFileEntry<'a>>,
}

#[derive(serde::Serialize)]
struct FtsFileEntry<'a> {
    sources: Vec<&'a str>,
    destinations: Vec<&'a str>,
}

#[derive(serde::Deserialize)]
struct FtsSubmitResponse {
    job_id: String,
}

#[derive(serde::Deserialize)]
struct FtsStatusResponse {
    job_state: String,
}

#[async_trait]
impl FtsClient for HttpFtsClient {
    async fn submit(&self, transfers: &[(String, String)]) -> Result<String> {
        let files = transfers
            .iter()
            .map(|(src, dst)| FtsFileEntry {
                sources: vec![src.as_str()],
                destinations: vec![dst.as_str()],
            })
            .collect();

        let resp = self
            .client
            .post(format!("{}/jobs", self.server))
            .json(&FtsJobRequest { files })
            .send()
            .await?
            .error_for_status()?
            .json::<FtsSubmitResponse>()
            .await?;

        Ok(resp.job_id)
    }

    async fn status(&self, fts_id: &str) -> Result<FtsJobStatus> {
        let resp = self
            .client
            .get(format!("{}/jobs/{fts_id}", self.server))
            .send()
            .await?;

        let body = resp.text().await?;
        let parsed: FtsStatusResponse = serde_json::from_str(&body)
            .map_err(|e| waypost_core::WaypostError::Other(anyhow::anyhow!("bad FTS status payload: {e}")))?;

        let state = match parsed.job_state.as_str() {
            "FINISHED" => FtsJobState::Finished,
            "FAILED" => FtsJobState::Failed,
            "SUBMITTED" => FtsJobState::Submitted,
            _ => FtsJobState::Active,
        };

        Ok(FtsJobStatus { state, details: body })
    }
}

/// In-memory double for tests: jobs default to `Submitted` and can be
/// nudged to a terminal state via `set_state`.
#[cfg(any(test, feature = "test-util"))]
pub struct FakeFtsClient {
    states: std::sync::Mutex<std::collections::HashMap<String, FtsJobState>>,
    next_id: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-util"))]
impl FakeFtsClient {
    pub fn new() -> Self {
        Self {
            states: std::sync::Mutex::new(std::collections::HashMap::new()),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    pub fn set_state(&self, fts_id: &str, state: FtsJobState) {
        self.states.lock().unwrap().insert(fts_id.to_string(), state);
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl FtsClient for FakeFtsClient {
    async fn submit(&self, _transfers: &[(String, String)]) -> Result<String> {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let fts_id = format!("fake-job-{id}");
        self.states.lock().unwrap().insert(fts_id.clone(), FtsJobState::Submitted);
        Ok(fts_id)
    }

    async fn status(&self, fts_id: &str) -> Result<FtsJobStatus> {
        let state = self
            .states
            .lock()
            .unwrap()
            .get(fts_id)
            .cloned()
            .unwrap_or(FtsJobState::Active);
        Ok(FtsJobStatus {
            state,
            details: "fake status".to_string(),
        })
    }
}
