//! Persistence contracts and in-memory implementations
//!
//! The engine talks to three stores: ceremony-scoped options (challenges),
//! credential records, and user entities. The in-memory implementations
//! back the demo server and the tests; production deployments implement
//! the same traits over their own database.

mod challenge;
mod credentials;

pub use challenge::{CeremonyOptions, ChallengeStore, InMemoryChallengeStore};
pub use credentials::{
    CredentialStore, InMemoryCredentialStore, InMemoryUserEntityStore, UserEntityStore,
};
