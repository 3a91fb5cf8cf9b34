use crate::api::YouTubeSource;
use crate::db::SnapshotStore;
use crate::error::PulseError;
use crate::google_oauth::AccessTokenProvider;
use crate::service::orchestrator::SyncOrchestrator;
use crate::types::{ConnectionReport, RunSummary};

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

/// Public messages handled by the sync actor.
#[derive(Debug)]
pub enum SyncActorMessage {
    /// Sync every active connection and reply with the run summary.
    RunSync(RpcReplyPort<RunSummary>),
    /// Replay every available report for one connection.
    Backfill(i64, RpcReplyPort<Result<ConnectionReport, PulseError>>),
}

/// Handle for interacting with the sync actor. Runs queue up behind each
/// other; two triggers never overlap.
#[derive(Clone)]
pub struct SyncHandle {
    actor: ActorRef<SyncActorMessage>,
}

impl SyncHandle {
    pub async fn run_sync(&self) -> Result<RunSummary, PulseError> {
        ractor::call!(self.actor, SyncActorMessage::RunSync)
            .map_err(|e| PulseError::RactorError(format!("RunSync RPC failed: {e}")))
    }

    pub async fn backfill(&self, connection_id: i64) -> Result<ConnectionReport, PulseError> {
        ractor::call!(self.actor, SyncActorMessage::Backfill, connection_id)
            .map_err(|e| PulseError::RactorError(format!("Backfill RPC failed: {e}")))?
    }

    pub fn stop(&self) {
        self.actor.stop(None);
    }
}

pub struct SyncActorState<S, V, Y> {
    orchestrator: Arc<SyncOrchestrator<S, V, Y>>,
    runs: u64,
}

struct SyncActor<S, V, Y> {
    _marker: PhantomData<fn() -> (S, V, Y)>,
}

#[ractor::async_trait]
impl<S, V, Y> Actor for SyncActor<S, V, Y>
where
    S: SnapshotStore + 'static,
    V: AccessTokenProvider + 'static,
    Y: YouTubeSource + 'static,
{
    type Msg = SyncActorMessage;
    type State = SyncActorState<S, V, Y>;
    type Arguments = Arc<SyncOrchestrator<S, V, Y>>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        orchestrator: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!("SyncActor started");
        Ok(SyncActorState {
            orchestrator,
            runs: 0,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SyncActorMessage::RunSync(rp) => {
                state.runs += 1;
                debug!(run = state.runs, "sync run requested");
                let summary = state.orchestrator.run().await;
                let _ = rp.send(summary);
            }
            SyncActorMessage::Backfill(connection_id, rp) => {
                debug!(connection_id, "backfill requested");
                let result = state.orchestrator.backfill_connection(connection_id).await;
                let _ = rp.send(result);
            }
        }
        Ok(())
    }
}

/// Spawn the sync actor around `orchestrator` and return a handle.
pub async fn spawn<S, V, Y>(orchestrator: SyncOrchestrator<S, V, Y>) -> Result<SyncHandle, PulseError>
where
    S: SnapshotStore + 'static,
    V: AccessTokenProvider + 'static,
    Y: YouTubeSource + 'static,
{
    let actor = SyncActor {
        _marker: PhantomData,
    };
    let (actor, _jh) = Actor::spawn(None, actor, Arc::new(orchestrator))
        .await
        .map_err(|e| PulseError::RactorError(format!("failed to spawn SyncActor: {e}")))?;
    Ok(SyncHandle { actor })
}
