pub mod capability;
pub mod common;
pub mod endpoint;
pub mod execution;
pub mod instance;
pub mod schema;
pub mod user_context;

pub use capability::*;
pub use common::*;
pub use endpoint::*;
pub use execution::*;
pub use instance::*;
pub use schema::*;
pub use user_context::*;
