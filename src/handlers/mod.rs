// HTTP request handlers for the wallet session
pub mod health;
pub mod types;
pub mod wallet;


use actix_web::web;

// Re-export the main handler functions
pub use health::health;
pub use wallet::{
    get_session, init_session, prepare_sign, register, registration_options, reset_session,
    sign, wallet_error_response,
};

/// Register every endpoint on an actix service config
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::get().to(health))
        .route("/session", web::get().to(get_session))
        .route("/session/init", web::post().to(init_session))
        .route(
            "/passkey/register/options",
            web::get().to(registration_options),
        )
        .route("/session/register", web::post().to(register))
        .route("/session/sign/prepare", web::post().to(prepare_sign))
        .route("/session/sign", web::post().to(sign))
        .route("/session/reset", web::post().to(reset_session));
}
