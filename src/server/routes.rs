//! HTTP handlers for the gateway endpoints.
//!
//! Protected speech routes run behind the authentication middleware; the
//! pairing and admin routes are unauthenticated but loopback-gated inside
//! the coordinator.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{PairingError, SpeechError};
use crate::server::AppState;
use crate::speech::SynthesizedAudio;
use crate::trust::registry::DeviceRole;

impl IntoResponse for PairingError {
    fn into_response(self) -> Response {
        let status = match &self {
            PairingError::InvalidCode
            | PairingError::CodeExpired
            | PairingError::LocalOnlyViolation { .. } => StatusCode::FORBIDDEN,
            PairingError::ProofOfPossessionFailed | PairingError::InvalidPublicKey { .. } => {
                StatusCode::UNAUTHORIZED
            }
            PairingError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "registry failure during pairing operation");
        }
        (status, self.to_string()).into_response()
    }
}

impl IntoResponse for SpeechError {
    fn into_response(self) -> Response {
        let status = match &self {
            SpeechError::EmptyText => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "speech engine failure");
        }
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPairingRequest {
    pub code: String,
    pub public_key: String,
    pub signature: String,
    #[serde(default)]
    pub role: DeviceRole,
}

#[derive(Debug, Serialize)]
pub struct ConfirmPairingResponse {
    pub device_id: String,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SttResponse {
    pub text: String,
}

/// POST /pair/request: issue a pairing code, delivered out of band.
pub async fn pair_request(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<StatusResponse>, PairingError> {
    state.pairing.request_pairing(addr.ip()).await?;
    Ok(Json(StatusResponse {
        status: "Code generated",
    }))
}

/// POST /pair/confirm: exchange a code plus proof for a device id.
pub async fn pair_confirm(
    State(state): State<AppState>,
    Json(request): Json<ConfirmPairingRequest>,
) -> Result<Json<ConfirmPairingResponse>, PairingError> {
    let device_id = state
        .pairing
        .confirm_pairing(
            &request.code,
            &request.public_key,
            &request.signature,
            request.role,
        )
        .await?;
    Ok(Json(ConfirmPairingResponse {
        device_id,
        status: "Paired",
    }))
}

/// POST /admin/devices/revoke: disable a device, keeping its record.
pub async fn revoke_device(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<StatusResponse>, PairingError> {
    let revoked = state.pairing.revoke(&request.device_id, addr.ip()).await?;
    Ok(Json(StatusResponse {
        status: if revoked { "Revoked" } else { "Not Found" },
    }))
}

/// POST /stt: transcribe the raw audio body.
pub async fn speech_to_text(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SttResponse>, SpeechError> {
    let transcript = state.transcriber.transcribe(&body).await?;
    Ok(Json(SttResponse {
        text: transcript.text,
    }))
}

/// POST /tts: synthesize speech for the given text.
pub async fn text_to_speech(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<Json<SynthesizedAudio>, SpeechError> {
    if request.text.trim().is_empty() {
        return Err(SpeechError::EmptyText);
    }
    let audio = state.synthesizer.synthesize(&request.text).await?;
    Ok(Json(audio))
}
