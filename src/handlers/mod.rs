// HTTP request handlers
pub mod webauthn;

// Re-export the main handler functions
pub use webauthn::{
    authentication_options, health, login, register, registration_options, AppState,
};
