//! Local settings persistence (SQLite).

mod preferences;
mod schema;
mod settings;
mod types;

pub use schema::Database;
pub use settings::CredentialSettings;
pub use types::DatabaseError;
