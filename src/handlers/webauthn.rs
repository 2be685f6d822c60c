//! `WebAuthn` request handlers
//!
//! The four ceremony endpoints. This layer is deliberately thin: it owns
//! the session cookie, the challenge store, and the response shapes, and
//! hands every decision to the ceremony engine. Failure kinds never reach
//! the client; they are logged server-side with the session key so the
//! responses cannot be used as a verification oracle.

use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder, Result};
use serde::Deserialize;
use serde_json::json;

use crate::settings::RelyingPartySettings;
use crate::storage::{CeremonyOptions, ChallengeStore};
use crate::webauthn::types::{AssertionCredential, RegistrationCredential};
use crate::webauthn::{AuthenticationRequest, RegistrationRequest, RelyingPartyOperations};

const SESSION_COOKIE: &str = "passgate_session";

/// Shared application state: the ceremony engine and the challenge store.
pub struct AppState {
    pub operations: RelyingPartyOperations,
    pub challenges: Arc<dyn ChallengeStore>,
    pub settings: RelyingPartySettings,
}

/// Body of `POST /webauthn/register/options`. All members are optional;
/// an empty body registers under the demo account.
#[derive(Deserialize, Default)]
pub struct RegistrationOptionsRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

const DEFAULT_USERNAME: &str = "demo";

/// Body of `POST /webauthn/register`.
#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "publicKey")]
    pub public_key: RegisterRequestBody,
}

#[derive(Deserialize)]
pub struct RegisterRequestBody {
    pub credential: RegistrationCredential,
    #[serde(default)]
    pub label: Option<String>,
}

/// Body of `POST /webauthn/authenticate/options`.
#[derive(Deserialize, Default)]
pub struct AuthenticationOptionsRequest {
    #[serde(default)]
    pub username: Option<String>,
}

/// Issue registration options and park them in the challenge store.
///
/// # Errors
/// Infallible at this layer; engine failures become error responses.
pub async fn registration_options(
    req: HttpRequest,
    body: Option<web::Json<RegistrationOptionsRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let username = body.username.as_deref().unwrap_or(DEFAULT_USERNAME);
    let display_name = body.display_name.as_deref().unwrap_or(username);
    let options = match state.operations.start_registration(username, display_name) {
        Ok(options) => options,
        Err(e) => {
            log::error!("failed to build registration options: {e}");
            return Ok(HttpResponse::InternalServerError()
                .json(json!({"error": "options_unavailable"})));
        }
    };

    let session_key = session_key(&req);
    state
        .challenges
        .save(&session_key, CeremonyOptions::Creation(options.clone()));

    let mut response = HttpResponse::Ok();
    attach_session_cookie(&mut response, &req, &session_key);
    Ok(response.json(options))
}

/// Verify a registration response against the pending options.
///
/// # Errors
/// Infallible at this layer; verification failures map to
/// `{"verified": false}`.
pub async fn register(
    req: HttpRequest,
    body: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let session_key = session_key(&req);
    let Some(CeremonyOptions::Creation(options)) = state.challenges.load_and_consume(&session_key)
    else {
        log::warn!("registration without a pending ceremony, session={session_key}");
        return Ok(HttpResponse::BadRequest().json(json!({"verified": false})));
    };

    let body = body.into_inner();
    let request = RegistrationRequest {
        options,
        credential: body.public_key.credential,
        label: body.public_key.label.unwrap_or_default(),
    };

    match state.operations.register_credential(&request) {
        Ok(record) => {
            log::info!(
                "registered credential {} for session {session_key}",
                record.credential_id.to_base64url()
            );
            Ok(HttpResponse::Ok().json(json!({"verified": true})))
        }
        Err(e) => {
            log::warn!(
                "registration failed: kind={} credential={} session={session_key}",
                e.kind(),
                request.credential.raw_id.to_base64url()
            );
            Ok(HttpResponse::BadRequest().json(json!({"verified": false})))
        }
    }
}

/// Issue authentication options and park them in the challenge store.
///
/// # Errors
/// Infallible at this layer; engine failures become error responses.
pub async fn authentication_options(
    req: HttpRequest,
    body: Option<web::Json<AuthenticationOptionsRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let username = body.as_ref().and_then(|b| b.username.as_deref());
    let options = match state.operations.start_authentication(username) {
        Ok(options) => options,
        Err(e) => {
            log::error!("failed to build authentication options: {e}");
            return Ok(HttpResponse::InternalServerError()
                .json(json!({"error": "options_unavailable"})));
        }
    };

    let session_key = session_key(&req);
    state
        .challenges
        .save(&session_key, CeremonyOptions::Request(options.clone()));

    let mut response = HttpResponse::Ok();
    attach_session_cookie(&mut response, &req, &session_key);
    Ok(response.json(options))
}

/// Verify an assertion and establish the authenticated principal.
///
/// # Errors
/// Infallible at this layer; verification failures redirect to the error
/// URL.
pub async fn login(
    req: HttpRequest,
    body: web::Json<AssertionCredential>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let session_key = session_key(&req);
    let Some(CeremonyOptions::Request(options)) = state.challenges.load_and_consume(&session_key)
    else {
        log::warn!("assertion without a pending ceremony, session={session_key}");
        return Ok(HttpResponse::BadRequest().json(json!({"errorUrl": state.settings.error_url})));
    };

    let request = AuthenticationRequest {
        options,
        credential: body.into_inner(),
    };

    match state.operations.authenticate(&request) {
        Ok(authenticated) => {
            let user = state
                .operations
                .users()
                .find_by_handle(&authenticated.user_handle);
            log::info!(
                "authenticated {} via credential {} for session {session_key}",
                user.as_ref().map_or("<unknown user>", |u| u.name.as_str()),
                authenticated.credential_id.to_base64url()
            );
            Ok(HttpResponse::Ok().json(json!({
                "authenticated": true,
                "redirectUrl": state.settings.redirect_url,
            })))
        }
        Err(e) => {
            log::warn!(
                "authentication failed: kind={} credential={} session={session_key}",
                e.kind(),
                request.credential.raw_id.to_base64url()
            );
            Ok(HttpResponse::BadRequest().json(json!({"errorUrl": state.settings.error_url})))
        }
    }
}

/// Liveness probe.
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

/// The ceremony session key: the cookie when present, a fresh key
/// otherwise.
fn session_key(req: &HttpRequest) -> String {
    req.cookie(SESSION_COOKIE)
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), |c| c.value().to_string())
}

fn attach_session_cookie(
    response: &mut HttpResponseBuilder,
    req: &HttpRequest,
    session_key: &str,
) {
    if req.cookie(SESSION_COOKIE).is_none() {
        let cookie = Cookie::build(SESSION_COOKIE, session_key.to_string())
            .path("/")
            .http_only(true)
            .finish();
        response.cookie(cookie);
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;
    use actix_web::test::TestRequest;

    use super::*;
    use crate::storage::{
        InMemoryChallengeStore, InMemoryCredentialStore, InMemoryUserEntityStore,
    };
    use crate::webauthn::types::RpEntity;

    fn state() -> web::Data<AppState> {
        let settings = RelyingPartySettings {
            rp_id: "example.localhost".to_string(),
            allowed_origins: vec!["https://example.localhost:8443".to_string()],
            ..RelyingPartySettings::default()
        };
        let operations = RelyingPartyOperations::new(
            RpEntity {
                id: settings.rp_id.clone(),
                name: settings.rp_name.clone(),
            },
            settings.allowed_origins.clone(),
            Arc::new(InMemoryUserEntityStore::new()),
            Arc::new(InMemoryCredentialStore::new()),
        )
        .unwrap();
        web::Data::new(AppState {
            operations,
            challenges: Arc::new(InMemoryChallengeStore::new()),
            settings,
        })
    }

    #[actix_web::test]
    async fn registration_options_set_a_session_cookie() {
        let state = state();
        let req = TestRequest::post().to_http_request();
        let body = web::Json(RegistrationOptionsRequest {
            username: Some("alice".to_string()),
            display_name: Some("Alice".to_string()),
        });

        let response = registration_options(req, Some(body), state).await.unwrap();
        assert!(response.status().is_success());
        let cookie = response
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE);
        assert!(cookie.is_some());
    }

    #[actix_web::test]
    async fn register_without_pending_ceremony_is_not_verified() {
        let state = state();
        let req = TestRequest::post().to_http_request();
        let credential_json = serde_json::json!({
            "publicKey": {
                "credential": {
                    "id": "AQID",
                    "rawId": "AQID",
                    "type": "public-key",
                    "response": {
                        "clientDataJSON": "e30",
                        "attestationObject": "oA"
                    }
                },
                "label": "Phone"
            }
        });
        let body: RegisterRequest = serde_json::from_value(credential_json).unwrap();

        let response = register(req, web::Json(body), state).await.unwrap();
        assert_eq!(response.status(), actix_web::http::StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["verified"], false);
    }
}
