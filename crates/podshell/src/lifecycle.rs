//! Pod lifecycle: provisioning, readiness polling, attach and teardown.
//!
//! ```text
//! Requested -> Provisioning -> Ready -> Attached -> Destroying -> Destroyed
//! Requested | Provisioning | Attached -> Failed -> Destroying
//! Provisioning | Ready -> Destroying
//! ```

pub mod controller;
pub mod guard;
pub mod state;

pub use controller::PodController;
pub use guard::{DestroyGuard, DestroyOutcome, Teardown};
pub use state::{LifecycleCallback, LifecycleEvent, LifecycleManager, PodState};
