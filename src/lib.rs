pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod remote;
pub mod store;
pub mod vault;

pub use api::routes;
pub use error::GatewayError;
pub use model::*;
pub use remote::pool::ClientPool;
pub use store::{MemoryStore, PostgresStore, Store};
pub use vault::CredentialVault;
