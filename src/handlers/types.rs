// Request and response bodies of the wallet endpoints
use serde::{Deserialize, Serialize};

use crate::keystore::DeployeeAddress;
use crate::ledger::VoteChoice;
use crate::signing::PresignData;
use crate::webauthn::{AuthenticationOptions, RegistrationOptions};

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Deserialize)]
pub struct RegistrationOptionsQuery {
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct RegistrationOptionsResponse {
    #[serde(rename = "publicKey")]
    pub public_key: RegistrationOptions,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub deployee: DeployeeAddress,
}

#[derive(Deserialize)]
pub struct PrepareSignRequest {
    pub vote: VoteChoice,
}

#[derive(Serialize)]
pub struct PrepareSignResponse {
    pub presign: PresignData,
    #[serde(rename = "publicKey")]
    pub public_key: AuthenticationOptions,
}
