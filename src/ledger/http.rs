//! HTTP implementation of [`LedgerClient`]
//!
//! Contract calls go to a JSON relay that owns the transaction encoding; the
//! faucet is the network's friendbot, called with a plain GET.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    BuiltAuthTransaction, LedgerClient, LedgerError, SignedTransaction, SubmitResult, VoteChoice,
    VoteTally,
};
use crate::keypair::BundlerKeypair;
use crate::settings::LedgerSettings;

/// Ledger client speaking JSON to the relay service
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    client: Client,
    relay_url: Url,
    friendbot_url: Url,
    network_passphrase: String,
    vote_contract_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployRequest<'a> {
    network_passphrase: &'a str,
    source: String,
    salt: String,
    public_key: String,
    source_signature: String,
}

#[derive(Deserialize)]
struct DeployResponse {
    address: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildRequest<'a> {
    network_passphrase: &'a str,
    contract_id: &'a str,
    source: &'a str,
    account: &'a str,
    vote: VoteChoice,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildResponse {
    envelope: String,
    hash: String,
    last_ledger: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    network_passphrase: &'a str,
    #[serde(flatten)]
    transaction: &'a SignedTransaction,
}

#[derive(Deserialize)]
struct LatestLedgerResponse {
    sequence: u32,
}

impl HttpLedgerClient {
    /// Create a client from the ledger settings
    ///
    /// # Errors
    ///
    /// Returns an error if a configured URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(settings: &LedgerSettings) -> anyhow::Result<Self> {
        let mut relay = settings.relay_url.clone();
        // Url::join replaces the last segment unless the base ends with '/'
        if !relay.ends_with('/') {
            relay.push('/');
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            relay_url: Url::parse(&relay)?,
            friendbot_url: Url::parse(&settings.friendbot_url)?,
            network_passphrase: settings.network_passphrase.clone(),
            vote_contract_id: settings.vote_contract_id.clone(),
        })
    }

    fn relay_endpoint(&self, path: &str) -> Result<Url, LedgerError> {
        self.relay_url
            .join(path)
            .map_err(|e| LedgerError::Transport(format!("invalid relay path {path}: {e}")))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, LedgerError> {
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: Response) -> Result<Response, LedgerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {body}")
        };

        if status.is_client_error() {
            Err(LedgerError::Rejected(detail))
        } else {
            Err(LedgerError::Transport(detail))
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn create_funded_test_account(&self, public_key: &str) -> Result<(), LedgerError> {
        let mut url = self.friendbot_url.clone();
        url.query_pairs_mut().append_pair("addr", public_key);

        log::debug!("Requesting faucet funding for {public_key}");
        let response = self.client.get(url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn deploy_account_contract(
        &self,
        funding: &BundlerKeypair,
        salt: &[u8; 32],
        public_key: &[u8],
    ) -> Result<String, LedgerError> {
        let mut signed = Vec::with_capacity(salt.len() + public_key.len());
        signed.extend_from_slice(salt);
        signed.extend_from_slice(public_key);

        let request = DeployRequest {
            network_passphrase: &self.network_passphrase,
            source: funding.public_key(),
            salt: STANDARD.encode(salt),
            public_key: STANDARD.encode(public_key),
            source_signature: funding.sign_base64(&signed),
        };

        let response = self
            .client
            .post(self.relay_endpoint("deploy")?)
            .json(&request)
            .send()
            .await?;
        let deployed: DeployResponse = Self::read_json(response).await?;

        if deployed.address.is_empty() {
            return Err(LedgerError::InvalidResponse(
                "deployment returned an empty address".to_string(),
            ));
        }
        Ok(deployed.address)
    }

    async fn build_auth_transaction(
        &self,
        source_public_key: &str,
        account: &str,
        vote: VoteChoice,
    ) -> Result<BuiltAuthTransaction, LedgerError> {
        let request = BuildRequest {
            network_passphrase: &self.network_passphrase,
            contract_id: &self.vote_contract_id,
            source: source_public_key,
            account,
            vote,
        };

        let response = self
            .client
            .post(self.relay_endpoint("transactions/build")?)
            .json(&request)
            .send()
            .await?;
        let built: BuildResponse = Self::read_json(response).await?;

        let hash = STANDARD
            .decode(&built.hash)
            .map_err(|e| LedgerError::InvalidResponse(format!("authorization hash: {e}")))?;
        if hash.len() != 32 {
            return Err(LedgerError::InvalidResponse(format!(
                "authorization hash is {} bytes, expected 32",
                hash.len()
            )));
        }

        Ok(BuiltAuthTransaction {
            envelope: built.envelope,
            hash,
            last_ledger: built.last_ledger,
        })
    }

    async fn latest_ledger(&self) -> Result<u32, LedgerError> {
        let response = self
            .client
            .get(self.relay_endpoint("ledger/latest")?)
            .send()
            .await?;
        let latest: LatestLedgerResponse = Self::read_json(response).await?;
        Ok(latest.sequence)
    }

    async fn submit_signed_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<SubmitResult, LedgerError> {
        let request = SubmitRequest {
            network_passphrase: &self.network_passphrase,
            transaction,
        };

        let response = self
            .client
            .post(self.relay_endpoint("transactions/submit")?)
            .json(&request)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn query_votes(
        &self,
        funding: &BundlerKeypair,
        account: &str,
    ) -> Result<VoteTally, LedgerError> {
        let mut url = self.relay_endpoint(&format!("votes/{account}"))?;
        url.query_pairs_mut()
            .append_pair("source", &funding.public_key())
            .append_pair("contractId", &self.vote_contract_id);

        let response = self.client.get(url).send().await?;
        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use std::collections::HashMap;

    fn settings_for(base: &str) -> LedgerSettings {
        LedgerSettings {
            relay_url: base.to_string(),
            friendbot_url: format!("{base}/friendbot"),
            network_passphrase: "Test SDF Network ; September 2015".to_string(),
            vote_contract_id: "CVOTE".to_string(),
            request_timeout_seconds: 5,
        }
    }

    /// Serve a tiny relay on an ephemeral port and return its base URL
    fn start_relay() -> String {
        let server = HttpServer::new(|| {
            App::new()
                .route(
                    "/friendbot",
                    web::get().to(|query: web::Query<HashMap<String, String>>| async move {
                        if query.get("addr").is_some_and(|addr| addr.starts_with('G')) {
                            HttpResponse::Ok().json(serde_json::json!({"successful": true}))
                        } else {
                            HttpResponse::BadRequest().body("op_already_exists")
                        }
                    }),
                )
                .route(
                    "/ledger/latest",
                    web::get().to(|| async {
                        HttpResponse::Ok().json(serde_json::json!({"sequence": 1234}))
                    }),
                )
                .route(
                    "/transactions/build",
                    web::post().to(|body: web::Json<serde_json::Value>| async move {
                        assert_eq!(body["contractId"], "CVOTE");
                        HttpResponse::Ok().json(serde_json::json!({
                            "envelope": "AAAAenvelope",
                            "hash": STANDARD.encode([1u8; 32]),
                            "lastLedger": 1300,
                        }))
                    }),
                )
                .route(
                    "/transactions/submit",
                    web::post().to(|| async {
                        HttpResponse::BadRequest().body("tx_bad_auth")
                    }),
                )
                .route(
                    "/deploy",
                    web::post().to(|| async { HttpResponse::ServiceUnavailable().finish() }),
                )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{addr}")
    }

    #[test]
    fn test_relay_url_without_trailing_slash_keeps_path() {
        let client = HttpLedgerClient::new(&settings_for("http://relay.test/api")).unwrap();
        assert_eq!(
            client.relay_endpoint("ledger/latest").unwrap().as_str(),
            "http://relay.test/api/ledger/latest"
        );
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(HttpLedgerClient::new(&settings_for("not a url")).is_err());
    }

    #[actix_web::test]
    async fn test_build_and_latest_ledger_decode_relay_json() {
        let client = HttpLedgerClient::new(&settings_for(&start_relay())).unwrap();

        assert_eq!(client.latest_ledger().await.unwrap(), 1234);

        let built = client
            .build_auth_transaction("GSOURCE", "CACCOUNT", VoteChoice::Yes)
            .await
            .unwrap();
        assert_eq!(built.envelope, "AAAAenvelope");
        assert_eq!(built.hash, vec![1u8; 32]);
        assert_eq!(built.last_ledger, 1300);
    }

    #[actix_web::test]
    async fn test_status_codes_map_to_error_kinds() {
        let client = HttpLedgerClient::new(&settings_for(&start_relay())).unwrap();
        let bundler = BundlerKeypair::from_seed([1u8; 32]);

        client
            .create_funded_test_account(&bundler.public_key())
            .await
            .unwrap();
        assert!(matches!(
            client.create_funded_test_account("nope").await,
            Err(LedgerError::Rejected(_))
        ));
        assert!(matches!(
            client
                .deploy_account_contract(&bundler, &[0u8; 32], &[4u8; 65])
                .await,
            Err(LedgerError::Transport(_))
        ));

        let transaction = SignedTransaction {
            envelope: "AAAAenvelope".to_string(),
            source: bundler.public_key(),
            source_signature: bundler.sign_base64(b"digest"),
            passkey: super::super::PasskeySignature {
                credential_id: "cred".to_string(),
                authenticator_data: "auth".to_string(),
                client_data_json: "client".to_string(),
                signature: "sig".to_string(),
            },
        };
        match client.submit_signed_transaction(&transaction).await {
            Err(LedgerError::Rejected(detail)) => assert!(detail.contains("tx_bad_auth")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
