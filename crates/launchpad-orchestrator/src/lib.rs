//! launchpad-orchestrator — the app lifecycle state machine.
//!
//! Every mutating intent takes the app's lock, re-reads the registry record,
//! checks its precondition and then drives the collaborators. Externally
//! visible steps are bracketed by a durable pending marker so a crash at any
//! point can be settled by [`Orchestrator::recover`]. The registry is only
//! advanced after the collaborators succeed, so a failure always leaves the
//! app in its last successfully entered state.

pub mod clock;
pub mod drift;
pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod recovery;
pub mod settings;
pub mod status;

#[cfg(feature = "testkit")]
pub mod testkit;

pub use clock::{Clock, SystemClock};
pub use drift::DriftMonitor;
pub use error::{LifecycleError, LifecycleResult};
pub use locks::AppLocks;
pub use orchestrator::{Collaborators, Orchestrator};
pub use settings::OrchestratorSettings;
pub use status::{AppStatus, DriftReport, EnvironmentStatus, RecoveryOutcome};
