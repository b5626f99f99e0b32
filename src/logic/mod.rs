pub mod dispatch;
pub mod introspect;
pub mod registry;
pub mod retention;
pub mod synthesize;
pub mod validate;

pub use dispatch::{CallerAuth, CallerMeta, DispatchOutcome};
pub use registry::{BatchDeployRequest, DeployReport};
pub use retention::SweepReport;
