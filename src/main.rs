#![warn(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use passgate::handlers::{
    authentication_options, health, login, register, registration_options, AppState,
};
use passgate::storage::{
    InMemoryChallengeStore, InMemoryCredentialStore, InMemoryUserEntityStore,
};
use passgate::webauthn::types::RpEntity;
use passgate::{RelyingPartyOperations, RelyingPartySettings};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = RelyingPartySettings::load()
        .map_err(|e| std::io::Error::other(format!("failed to load settings: {e}")))?;
    settings
        .validate()
        .map_err(|e| std::io::Error::other(format!("invalid relying party configuration: {e}")))?;

    // A bad engine configuration refuses startup here, before binding.
    let operations = RelyingPartyOperations::new(
        RpEntity {
            id: settings.rp_id.clone(),
            name: settings.rp_name.clone(),
        },
        settings.allowed_origins.clone(),
        Arc::new(InMemoryUserEntityStore::new()),
        Arc::new(InMemoryCredentialStore::new()),
    )
    .map_err(|e| std::io::Error::other(format!("invalid relying party configuration: {e}")))?
    .allow_cross_origin(settings.allow_cross_origin)
    .reject_unsolicited_extensions(settings.reject_unsolicited_extensions)
    .user_verification(settings.user_verification_requirement())
    .timeout_ms(settings.timeout_ms());

    let state = web::Data::new(AppState {
        operations,
        challenges: Arc::new(InMemoryChallengeStore::new()),
        settings: settings.clone(),
    });

    let bind_address = settings.bind_address();
    print_startup_info(&bind_address, &settings);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .route(
                "/webauthn/register/options",
                web::post().to(registration_options),
            )
            .route("/webauthn/register", web::post().to(register))
            .route(
                "/webauthn/authenticate/options",
                web::post().to(authentication_options),
            )
            .route("/login/webauthn", web::post().to(login))
            .route("/ping", web::get().to(health))
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &RelyingPartySettings) {
    println!("Starting passgate relying party on http://{bind_address}");
    println!("Relying Party ID: {}", settings.rp_id);
    println!("Allowed origins:  {}", settings.allowed_origins.join(", "));
    println!();
    println!("WebAuthn endpoints:");
    println!("  POST /webauthn/register/options     - Registration options");
    println!("  POST /webauthn/register             - Verify a new credential");
    println!("  POST /webauthn/authenticate/options - Authentication options");
    println!("  POST /login/webauthn                - Verify an assertion");
    println!("  GET  /ping                          - Health check");
}
