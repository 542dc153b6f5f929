//! Master planning and plan dispatch
//!
//! - `types`: plan and task data model with dependency validation
//! - `router`: manual and automatic routing of requests to plugins
//! - `dispatcher`: sequential plan execution with contained task failures

mod dispatcher;
mod router;
mod types;

pub use dispatcher::{DispatchReport, PlanDispatcher, TaskOutcome, TaskResult};
pub use router::{MasterRouter, RouteRequest};
pub use types::{AUTO_TARGET, CHITCHAT_TARGET, MasterPlan, PlanTask};
