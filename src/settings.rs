//! Relying-party settings
//!
//! Environment-driven configuration for the server binary. The values
//! needed by the ceremony engine (RP identity, origins, policy) are
//! validated at startup; a bad configuration refuses to start rather than
//! failing mid-ceremony.

use serde::{Deserialize, Serialize};

/// Settings for the relying party and its HTTP wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingPartySettings {
    /// Relying Party ID: the effective domain credentials are scoped to.
    pub rp_id: String,
    /// Relying Party display name.
    pub rp_name: String,
    /// Origins accepted in client data, comma-separated in the environment.
    pub allowed_origins: Vec<String>,
    /// Whether `crossOrigin: true` client data is accepted.
    pub allow_cross_origin: bool,
    /// Whether unsolicited client extension outputs fail the ceremony.
    pub reject_unsolicited_extensions: bool,
    /// User verification requirement conveyed in options.
    pub user_verification: String,
    /// Ceremony timeout in seconds, conveyed to the client.
    pub timeout_seconds: u64,
    /// Bind address for the HTTP server.
    pub host: String,
    pub port: u16,
    /// Where a successful login redirects, and where a failed one lands.
    pub redirect_url: String,
    pub error_url: String,
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Passgate".to_string(),
            allowed_origins: vec!["https://localhost:8443".to_string()],
            allow_cross_origin: false,
            reject_unsolicited_extensions: false,
            user_verification: "preferred".to_string(),
            timeout_seconds: 300,
            host: "127.0.0.1".to_string(),
            port: 8443,
            redirect_url: "/".to_string(),
            error_url: "/login?error".to_string(),
        }
    }
}

impl RelyingPartySettings {
    /// Load settings from `PASSGATE_*` environment variables, falling back
    /// to the defaults. Also initializes the logger.
    ///
    /// # Errors
    /// Returns an error for a malformed port number.
    pub fn load() -> anyhow::Result<Self> {
        let _ = env_logger::try_init();

        let mut settings = Self::default();
        if let Ok(rp_id) = std::env::var("PASSGATE_RP_ID") {
            settings.rp_id = rp_id;
        }
        if let Ok(rp_name) = std::env::var("PASSGATE_RP_NAME") {
            settings.rp_name = rp_name;
        }
        if let Ok(origins) = std::env::var("PASSGATE_ALLOWED_ORIGINS") {
            settings.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Ok(value) = std::env::var("PASSGATE_ALLOW_CROSS_ORIGIN") {
            settings.allow_cross_origin = value == "true";
        }
        if let Ok(value) = std::env::var("PASSGATE_REJECT_UNSOLICITED_EXTENSIONS") {
            settings.reject_unsolicited_extensions = value == "true";
        }
        if let Ok(value) = std::env::var("PASSGATE_USER_VERIFICATION") {
            settings.user_verification = value;
        }
        if let Ok(value) = std::env::var("PASSGATE_TIMEOUT_SECONDS") {
            settings.timeout_seconds = value.parse()?;
        }
        if let Ok(host) = std::env::var("PASSGATE_HOST") {
            settings.host = host;
        }
        if let Ok(port) = std::env::var("PASSGATE_PORT") {
            settings.port = port.parse()?;
        }
        if let Ok(url) = std::env::var("PASSGATE_REDIRECT_URL") {
            settings.redirect_url = url;
        }
        if let Ok(url) = std::env::var("PASSGATE_ERROR_URL") {
            settings.error_url = url;
        }
        Ok(settings)
    }

    /// Validate the relying-party identity against the origin list.
    ///
    /// The RP ID has to be a registrable suffix of, or equal to, every
    /// allowed origin's host, or registered credentials would be unusable
    /// from those origins.
    ///
    /// # Errors
    /// Returns an error for an empty RP ID, an empty origin list, an
    /// unparseable origin, or an origin whose host does not match the
    /// RP ID.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rp_id.is_empty() {
            anyhow::bail!("rp_id must not be empty");
        }
        if self.allowed_origins.is_empty() {
            anyhow::bail!("allowed_origins must not be empty");
        }
        for origin in &self.allowed_origins {
            let parsed = url::Url::parse(origin)
                .map_err(|e| anyhow::anyhow!("origin {origin} does not parse: {e}"))?;
            let host = parsed
                .host_str()
                .ok_or_else(|| anyhow::anyhow!("origin {origin} has no host"))?;
            if host != self.rp_id && !host.ends_with(&format!(".{}", self.rp_id)) {
                anyhow::bail!(
                    "rp_id {} is not a registrable suffix of origin {origin}",
                    self.rp_id
                );
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ceremony timeout in milliseconds as conveyed in options.
    #[must_use]
    pub fn timeout_ms(&self) -> u32 {
        u32::try_from(self.timeout_seconds.saturating_mul(1000)).unwrap_or(u32::MAX)
    }

    /// The user-verification requirement for generated options.
    #[must_use]
    pub fn user_verification_requirement(
        &self,
    ) -> crate::webauthn::types::UserVerificationRequirement {
        use crate::webauthn::types::UserVerificationRequirement;
        match self.user_verification.as_str() {
            "required" => UserVerificationRequirement::Required,
            "discouraged" => UserVerificationRequirement::Discouraged,
            _ => UserVerificationRequirement::Preferred,
        }
    }
}
