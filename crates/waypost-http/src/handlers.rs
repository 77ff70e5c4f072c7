use crate::api::ApiResponse;
use crate::extract::PeerDn;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use waypost_core::types::{PrepareFinishRequest, StagingFinishRequest, SubmitRequest, SubmitResponse};

pub async fn root() -> &'static str {
    "waypost\n"
}

fn is_valid_gsiftp_destination(destination_path: &str) -> bool {
    match url::Url::parse(destination_path) {
        Ok(url) => url.scheme() == "gsiftp" && !url.host_str().unwrap_or("").is_empty(),
        Err(_) => false,
    }
}

/// `POST /submitTransfer` (spec §4.2, §6).
pub async fn submit_transfer(
    State(state): State<AppState>,
    peer: PeerDn,
    Json(req): Json<SubmitRequest>,
) -> std::result::Result<(StatusCode, Json<ApiResponse<SubmitResponse>>), StatusCode> {
    let submitter = match peer.as_str() {
        Some(dn) if state.allowed_submitter_dns.contains(dn) => dn.to_string(),
        Some(_) | None => return Err(StatusCode::FORBIDDEN),
    };

    if !is_valid_gsiftp_destination(&req.destination_path) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let transfer_id = Uuid::new_v4().to_string();

    state
        .db
        .insert_init(&transfer_id, &req.product_id, &req.destination_path, &submitter)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to insert transfer row");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    state.staging_queue.publish(&transfer_id).await.map_err(|e| {
        tracing::error!(error = %e, transfer_id, "failed to publish to staging queue");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    state.db.mark_submitted(&transfer_id).await.map_err(|e| {
        tracing::error!(error = %e, transfer_id, "failed to mark SUBMITTED");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(SubmitResponse { transfer_id })),
    ))
}

#[derive(Deserialize)]
pub struct TransferIdQuery {
    pub transfer_id: String,
}

/// `GET /transferStatus` (spec §4.2 Status Endpoint, §6).
pub async fn transfer_status(
    State(state): State<AppState>,
    peer: PeerDn,
    Query(q): Query<TransferIdQuery>,
) -> std::result::Result<Json<waypost_core::types::Transfer>, StatusCode> {
    let transfer = state
        .db
        .get(&q.transfer_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    match peer.as_str() {
        Some(dn) if dn == transfer.submitter => Ok(Json(transfer)),
        _ => Err(StatusCode::FORBIDDEN),
    }
}

#[derive(Deserialize)]
pub struct StagingFinishQuery {
    pub transfer_id: String,
    pub product_id: String,
    pub success: bool,
    pub staged_to: Option<String>,
    pub path: Option<String>,
    pub msg: Option<String>,
}

/// `GET/POST /doneStaging` (spec §4.3, §6). DN-only auth per spec §9's resolution
/// of the authcode open question: only the configured stager DN is accepted.
pub async fn done_staging(
    State(state): State<AppState>,
    peer: PeerDn,
    Query(q): Query<StagingFinishQuery>,
) -> StatusCode {
    match peer.as_str() {
        Some(dn) if dn == state.stager_dn.as_ref() => {}
        _ => return StatusCode::FORBIDDEN,
    }

    let req = StagingFinishRequest {
        transfer_id: q.transfer_id,
        product_id: q.product_id,
        success: q.success,
        staged_to: q.staged_to,
        path: q.path,
        msg: q.msg,
    };

    match state
        .stager
        .finish_staging(
            &req.transfer_id,
            req.success,
            req.staged_to.as_deref(),
            req.path.as_deref(),
            req.msg.as_deref(),
        )
        .await
    {
        Ok(true) => StatusCode::OK,
        Ok(false) => {
            tracing::warn!(transfer_id = %req.transfer_id, "StagingFinish callback did not match expected prior state");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            tracing::error!(error = %e, transfer_id = %req.transfer_id, "error processing StagingFinish");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Deserialize)]
pub struct PrepareFinishQuery {
    pub transfer_id: String,
    pub success: bool,
    pub msg: Option<String>,
}

/// `GET/POST /donePrepare` (spec §4.4, §6).
pub async fn done_prepare(
    State(state): State<AppState>,
    peer: PeerDn,
    Query(q): Query<PrepareFinishQuery>,
) -> StatusCode {
    match peer.as_str() {
        Some(dn) if dn == state.agent_dn.as_ref() => {}
        _ => return StatusCode::FORBIDDEN,
    }

    let req = PrepareFinishRequest {
        transfer_id: q.transfer_id,
        success: q.success,
        msg: q.msg,
    };

    match state
        .prepare
        .finish_prepare(&req.transfer_id, req.success, req.msg.as_deref())
        .await
    {
        Ok(true) => StatusCode::OK,
        Ok(false) => {
            tracing::warn!(transfer_id = %req.transfer_id, "PrepareFinish callback did not match expected prior state");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            tracing::error!(error = %e, transfer_id = %req.transfer_id, "error processing PrepareFinish");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_gsiftp_with_host() {
        assert!(is_valid_gsiftp_destination("gsiftp://dest.example.org/data/out"));
    }

    #[test]
    fn rejects_non_gsiftp_scheme() {
        assert!(!is_valid_gsiftp_destination("https://dest.example.org/data/out"));
    }

    #[test]
    fn rejects_missing_host() {
        assert!(!is_valid_gsiftp_destination("gsiftp:///data/out"));
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(!is_valid_gsiftp_destination("not a url"));
    }
}
