//! The expiration sweeper.
//!
//! A single background task ticks at a bounded cadence and drives the
//! `pending -> expired` transition for overdue requests. Duplicate
//! ticks are no-ops thanks to the engine's state guard, so running the
//! sweeper alongside lazy expiry in the decision paths is safe.

use opsgate_core::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::ApprovalEngine;

/// Default sweep cadence.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(30);

/// Handle to the running sweeper task.
#[derive(Debug)]
pub struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn the sweeper on the current runtime.
    #[must_use]
    pub fn spawn(engine: Arc<ApprovalEngine>, period: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = engine.expire_due(Timestamp::now()).await {
                            tracing::error!(error = %e, "expiry sweep failed");
                        }
                    },
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    },
                }
            }
            tracing::debug!("sweeper stopped");
        });
        Self { shutdown, handle }
    }

    /// Signal the sweeper to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sweep behavior over real records is covered by the engine
    // integration tests; this only checks task lifecycle.
    #[tokio::test]
    async fn test_spawn_and_stop() {
        use opsgate_audit::{AuditLog, HistorySigner, TracingSink};
        use opsgate_authz::{Authorizer, PolicyTable, RoleMap};
        use opsgate_store::Store;
        use opsgate_wrappers::{GatewayLimits, WrapperRegistry, WrapperRunner};

        let store = Store::in_memory(HistorySigner::new(&[1u8; 32]).unwrap())
            .await
            .unwrap();
        let audit = AuditLog::new(Arc::new(TracingSink));
        let authz = Arc::new(Authorizer::new(
            Arc::new(RoleMap::builtin()),
            Arc::new(PolicyTable::from_policies(Vec::new()).unwrap()),
        ));
        let registry = Arc::new(crate::OperationRegistry::builtin(
            crate::RegistryContext::default(),
        ));
        let runner = Arc::new(WrapperRunner::new(
            Arc::new(WrapperRegistry::new()),
            GatewayLimits::default(),
            audit.clone(),
        ));
        let engine = Arc::new(ApprovalEngine::new(store, authz, registry, runner, audit));

        let sweeper = Sweeper::spawn(engine, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        sweeper.stop().await;
    }
}
