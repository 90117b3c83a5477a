use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use passvote::{
    handlers::configure_services,
    keystore::{FileStore, KeyStore},
    ledger::{HttpLedgerClient, LedgerClient},
    session::SessionOrchestrator,
    settings::WalletSettings,
    webauthn::WebAuthnService,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings =
        WalletSettings::load().map_err(|e| anyhow::anyhow!("Failed to load settings: {e}"))?;

    let store = FileStore::open(&settings.storage.path)
        .with_context(|| format!("Failed to open key store at {}", settings.storage.path))?;
    let keystore = Arc::new(KeyStore::new(Arc::new(store)));

    let ledger: Arc<dyn LedgerClient> = Arc::new(
        HttpLedgerClient::new(&settings.ledger).context("Failed to configure ledger client")?,
    );
    if settings.ledger.vote_contract_id.is_empty() {
        log::warn!("No vote contract configured; set VOTE_CONTRACT_ID before voting");
    }

    let session = web::Data::new(SessionOrchestrator::new(
        keystore,
        ledger,
        WebAuthnService::new(settings.passkey.clone()),
    ));

    // A failed init is recoverable through /session/init or /session/reset
    if let Err(e) = session.init().await {
        log::error!("Startup initialization failed: {e}");
    }

    start_server(session, &settings).await
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    session: web::Data<SessionOrchestrator>,
    settings: &WalletSettings,
) -> anyhow::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, settings);

    // Configure CORS for the voting UI
    let cors_origins = settings.get_cors_origins();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Content-Type", "Accept"])
            .max_age(3600);

        App::new()
            .app_data(session.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await?;

    Ok(())
}

fn print_startup_info(bind_address: &str, settings: &WalletSettings) {
    println!("Starting Passvote wallet on http://{bind_address}");
    println!("Key store: {}", settings.storage.path);
    println!("Ledger relay: {}", settings.ledger.relay_url);
    println!("Passkey relying party: {} ({})", settings.passkey.rp_id, settings.passkey.rp_origin);
    println!();
    println!("Session endpoints:");
    println!("  GET  /session                  - Session snapshot");
    println!("  POST /session/init             - Load or provision the bundler keypair");
    println!("  GET  /passkey/register/options - Passkey registration options");
    println!("  POST /session/register         - Deploy the passkey account");
    println!("  POST /session/sign/prepare     - Build a vote transaction");
    println!("  POST /session/sign             - Submit the signed vote");
    println!("  POST /session/reset            - Forget keys and account");
    println!();
    println!("System endpoints:");
    println!("  GET  /ping                     - Health check");
}
