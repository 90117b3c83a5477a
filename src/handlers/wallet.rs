//! Wallet session handlers
//!
//! Thin JSON wrappers around [`SessionOrchestrator`]. Every failure is
//! rendered by [`wallet_error_response`] so the UI sees one error shape.

use actix_web::{web, HttpResponse, Result};
use serde_json::json;

use super::types::{
    PrepareSignRequest, PrepareSignResponse, RegisterResponse, RegistrationOptionsQuery,
    RegistrationOptionsResponse,
};
use crate::error::WalletError;
use crate::session::{ActionKind, SessionOrchestrator};
use crate::webauthn::{AuthenticationResponse, RegistrationResponse};

/// Default user name shown by the authenticator
const DEFAULT_USER_NAME: &str = "Passvote voter";

/// Convert a `WalletError` raised while running `action` to an HTTP response
#[must_use]
pub fn wallet_error_response(error: &WalletError, action: ActionKind) -> HttpResponse {
    let mut response = match error {
        WalletError::MalformedCredential(_) => HttpResponse::BadRequest(),
        WalletError::Busy { .. }
        | WalletError::StaleChallenge(_)
        | WalletError::NoActiveAccount
        | WalletError::NotInitialized => HttpResponse::Conflict(),
        WalletError::TransactionExpired { .. } => HttpResponse::Gone(),
        WalletError::DeploymentRejected(_)
        | WalletError::SubmissionRejected(_)
        | WalletError::Ledger(_) => HttpResponse::BadGateway(),
        WalletError::InvalidKeyMaterial(_) | WalletError::Storage(_) => {
            HttpResponse::InternalServerError()
        }
    };

    response.json(json!({
        "error": error.code(),
        "phase": error.phase_in(action),
        "message": error.user_message()
    }))
}

fn respond<T: serde::Serialize>(
    action: ActionKind,
    result: Result<T, WalletError>,
) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => {
            log::warn!("{action} failed ({}): {e}", e.code());
            wallet_error_response(&e, action)
        }
    }
}

/// Current session snapshot
///
/// # Errors
///
/// Never fails; the `Result` matches the actix handler convention
pub async fn get_session(session: web::Data<SessionOrchestrator>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(session.snapshot()))
}

/// Load or provision the bundler keypair and stored account
///
/// # Errors
///
/// Wallet errors are rendered as JSON responses, not returned
pub async fn init_session(session: web::Data<SessionOrchestrator>) -> Result<HttpResponse> {
    Ok(respond(ActionKind::Initialize, session.init().await))
}

/// Passkey registration ceremony options
///
/// # Errors
///
/// Never fails; the `Result` matches the actix handler convention
pub async fn registration_options(
    query: web::Query<RegistrationOptionsQuery>,
    session: web::Data<SessionOrchestrator>,
) -> Result<HttpResponse> {
    let user_name = query
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_USER_NAME);

    Ok(HttpResponse::Ok().json(RegistrationOptionsResponse {
        public_key: session.registration_options(user_name),
    }))
}

/// Deploy the account for a completed registration ceremony
///
/// # Errors
///
/// Wallet errors are rendered as JSON responses, not returned
pub async fn register(
    body: web::Json<RegistrationResponse>,
    session: web::Data<SessionOrchestrator>,
) -> Result<HttpResponse> {
    let result = session
        .on_register(&body)
        .await
        .map(|deployee| RegisterResponse { deployee });
    Ok(respond(ActionKind::Register, result))
}

/// Build a vote transaction and return the signing ceremony options
///
/// # Errors
///
/// Wallet errors are rendered as JSON responses, not returned
pub async fn prepare_sign(
    body: web::Json<PrepareSignRequest>,
    session: web::Data<SessionOrchestrator>,
) -> Result<HttpResponse> {
    let result = session.prepare_sign(body.vote).await.map(|presign| {
        let public_key = session.authentication_options(&presign);
        PrepareSignResponse {
            presign,
            public_key,
        }
    });
    Ok(respond(ActionKind::PrepareSign, result))
}

/// Submit the prepared vote with the signing ceremony result
///
/// # Errors
///
/// Wallet errors are rendered as JSON responses, not returned
pub async fn sign(
    body: web::Json<AuthenticationResponse>,
    session: web::Data<SessionOrchestrator>,
) -> Result<HttpResponse> {
    Ok(respond(ActionKind::Sign, session.on_sign(&body).await))
}

/// Clear stored keys and session state
///
/// # Errors
///
/// Wallet errors are rendered as JSON responses, not returned
pub async fn reset_session(session: web::Data<SessionOrchestrator>) -> Result<HttpResponse> {
    let result = session.reset().map(|()| session.snapshot());
    Ok(respond(ActionKind::Reset, result))
}
