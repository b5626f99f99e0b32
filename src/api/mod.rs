pub mod auth;
pub mod endpoint_handlers;
pub mod execute_handlers;
pub mod instance_handlers;
pub mod routes;

pub use auth::ApiKey;
pub use routes::{cors_layer, create_router, AppState};
