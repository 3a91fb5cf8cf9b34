pub mod insights;
pub mod orchestrator;
pub mod reconcile;
pub mod sync_actor;

pub use orchestrator::{OrchestratorSettings, SyncOrchestrator};
pub use sync_actor::{SyncActorMessage, SyncHandle};
