// Authentication module
// OAuth authorization-code flow and per-user credential storage

mod exchange;
mod manager;
mod store;
mod types;

pub use manager::CredentialManager;
pub use store::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
pub use types::{CredentialRecord, OAuthSettings};

pub(crate) use exchange::body_as_details;
