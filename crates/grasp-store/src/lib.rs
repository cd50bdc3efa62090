pub mod chat;
pub mod configs;
pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;

pub use chat::ChatRepo;
pub use configs::ConfigRepo;
pub use database::Database;
pub use error::StoreError;
