pub mod client;
pub mod http;
pub mod limiter;
pub mod pool;
pub mod stub;

pub use client::{RemoteConnector, RemoteSession};
pub use http::HttpConnector;
pub use pool::{ClientPool, Handle, PoolStatus, RebuildReport};
pub use stub::{StubConnector, StubState};
