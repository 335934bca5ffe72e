//! Worker version lifecycle and update discovery.

pub mod coordinator;
pub mod source;
pub mod version;

pub use coordinator::{Activation, CoordinatorStatus, InstallOutcome, UpdateCoordinator};
pub use source::{ReleaseInfo, UpdateSource};
pub use version::{WorkerState, WorkerVersion};
