use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a `Transfer`, per the state machine in spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferStatus {
    Init,
    Submitted,
    Staging,
    StagingDone,
    Preparing,
    PreparingDone,
    Transferring,
    Success,
    Error,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Init => "INIT",
            TransferStatus::Submitted => "SUBMITTED",
            TransferStatus::Staging => "STAGING",
            TransferStatus::StagingDone => "STAGINGDONE",
            TransferStatus::Preparing => "PREPARING",
            TransferStatus::PreparingDone => "PREPARINGDONE",
            TransferStatus::Transferring => "TRANSFERRING",
            TransferStatus::Success => "SUCCESS",
            TransferStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Success | TransferStatus::Error)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = crate::error::WaypostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(TransferStatus::Init),
            "SUBMITTED" => Ok(TransferStatus::Submitted),
            "STAGING" => Ok(TransferStatus::Staging),
            "STAGINGDONE" => Ok(TransferStatus::StagingDone),
            "PREPARING" => Ok(TransferStatus::Preparing),
            "PREPARINGDONE" => Ok(TransferStatus::PreparingDone),
            "TRANSFERRING" => Ok(TransferStatus::Transferring),
            "SUCCESS" => Ok(TransferStatus::Success),
            "ERROR" => Ok(TransferStatus::Error),
            other => Err(crate::error::WaypostError::InvalidConfig(format!(
                "unknown transfer status: {other}"
            ))),
        }
    }
}

/// The single core entity: a request to move `product_id` to `destination_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub transfer_id: String,
    pub product_id: String,
    pub destination_path: String,
    pub submitter: String,
    pub prepare_activity: Option<String>,
    pub status: TransferStatus,
    pub extra_status: Option<String>,
    pub stager_path: Option<String>,
    pub stager_hostname: Option<String>,
    pub stager_status: Option<String>,
    pub fts_id: Option<String>,
    pub fts_details: Option<String>,
    pub time_submitted: Option<DateTime<Utc>>,
    pub time_staging: Option<DateTime<Utc>>,
    pub time_staging_done: Option<DateTime<Utc>>,
    pub time_transferring: Option<DateTime<Utc>>,
    pub time_error: Option<DateTime<Utc>>,
    pub time_success: Option<DateTime<Utc>>,
}

/// Request body accepted by the Submit Endpoint (spec §4.2, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub product_id: String,
    pub destination_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub transfer_id: String,
}

/// Body posted by the stager to `/doneStaging` (spec §4.3, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct StagingFinishRequest {
    pub transfer_id: String,
    pub product_id: String,
    pub success: bool,
    pub staged_to: Option<String>,
    pub path: Option<String>,
    pub msg: Option<String>,
}

/// Body posted by the transfer-host agent to `/donePrepare` (spec §4.4, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct PrepareFinishRequest {
    pub transfer_id: String,
    pub success: bool,
    pub msg: Option<String>,
}

/// Response shape of the transfer-host agent's `/files` endpoint (spec §4.5, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct FileListResponse {
    pub success: bool,
    pub files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_as_str() {
        for status in [
            TransferStatus::Init,
            TransferStatus::Submitted,
            TransferStatus::Staging,
            TransferStatus::StagingDone,
            TransferStatus::Preparing,
            TransferStatus::PreparingDone,
            TransferStatus::Transferring,
            TransferStatus::Success,
            TransferStatus::Error,
        ] {
            let parsed: TransferStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn only_success_and_error_are_terminal() {
        assert!(TransferStatus::Success.is_terminal());
        assert!(TransferStatus::Error.is_terminal());
        assert!(!TransferStatus::Transferring.is_terminal());
    }

    #[test]
    fn rejects_unknown_status_string() {
        assert!("BOGUS".parse::<TransferStatus>().is_err());
    }
}
