use axum::{
    body::Bytes,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use commonware_codec::{DecodeExt, Encode, ReadExt};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest};
use commonware_utils::from_hex;
use serde::Serialize;
use std::sync::Arc;
use wagerline_types::Submission;

use crate::submission::{apply_submission, SubmitError};
use crate::Simulator;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
    height: u64,
}

#[derive(Serialize)]
struct AccountResponse {
    nonce: u64,
    balance: u64,
}

fn internal_error(err: anyhow::Error) -> Response {
    tracing::error!(?err, "state query failed");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn encoded<T: Encode>(value: Option<T>) -> Response {
    match value {
        Some(value) => (StatusCode::OK, value.encode().to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, vec![]).into_response(),
    }
}

pub(super) async fn healthz(AxumState(simulator): AxumState<Arc<Simulator>>) -> Response {
    match simulator.height().await {
        Ok(height) => Json(HealthzResponse { ok: true, height }).into_response(),
        Err(err) => internal_error(err),
    }
}

pub(super) async fn submit(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    body: Bytes,
) -> Response {
    let submission = match Submission::decode(&mut body.as_ref()) {
        Ok(submission) => submission,
        Err(err) => {
            tracing::warn!(?err, len = body.len(), "failed to decode submission");
            return (StatusCode::BAD_REQUEST, "decode_error").into_response();
        }
    };
    match apply_submission(&simulator, submission).await {
        Ok(_) => (StatusCode::OK, "").into_response(),
        Err(SubmitError::InvalidSignature { .. }) => {
            (StatusCode::BAD_REQUEST, "invalid_signature").into_response()
        }
        Err(SubmitError::NonceTooFarAhead { .. }) => {
            (StatusCode::BAD_REQUEST, "nonce_too_far_ahead").into_response()
        }
        Err(err @ SubmitError::State(_)) => {
            tracing::error!(%err, "submission failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err @ SubmitError::MempoolFull { .. }) => {
            tracing::warn!(%err, "submission refused");
            (StatusCode::SERVICE_UNAVAILABLE, "mempool_full").into_response()
        }
    }
}

pub(super) async fn get_receipt(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(digest): Path<String>,
) -> Response {
    let Some(raw) = from_hex(&digest) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Ok(digest) = Digest::decode(&mut raw.as_slice()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    encoded(simulator.query_receipt(&digest).await)
}

pub(super) async fn get_wager(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = id.parse::<u64>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match simulator.query_wager(id).await {
        Ok(wager) => encoded(wager),
        Err(err) => internal_error(err),
    }
}

pub(super) async fn get_vault(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = id.parse::<u64>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match simulator.query_vault(id).await {
        Ok(vault) => encoded(vault),
        Err(err) => internal_error(err),
    }
}

pub(super) async fn get_account(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(pubkey): Path<String>,
) -> Response {
    let raw = match from_hex(&pubkey) {
        Some(raw) => raw,
        None => return StatusCode::BAD_REQUEST.into_response(),
    };
    let public_key = match PublicKey::read(&mut raw.as_slice()) {
        Ok(pk) => pk,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match simulator.query_account(&public_key).await {
        Ok((nonce, balance)) => Json(AccountResponse { nonce, balance }).into_response(),
        Err(err) => internal_error(err),
    }
}
