//! DNSCrypt liveness prober
//!
//! A background task that periodically asks the orchestrator to check its
//! relay set. The check itself lives with the orchestrator so its outcome
//! can be applied under the orchestrator lock; this module owns the timing,
//! the task lifecycle and the pure decision table.

use std::sync::Weak;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::ProbeConfig;
use crate::store::ModeChange;

/// Result of refreshing the relay set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The relay answered with its reachable servers (possibly none)
    Live(Vec<String>),
    /// The refresh itself failed
    Failed(String),
    /// DNSCrypt is selected but the engine has no relay running
    NoRelay,
}

/// What to do with a probe outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeDecision {
    /// Drop DNSCrypt and fall back to the default DoH endpoint
    Fallback { reason: String },
    /// Servers are live and a crypt migration is pending: re-apply the crypt mode
    RepairCryptMode,
    /// Only record the live servers
    Keep,
}

/// Decide how to react to a probe outcome
pub fn decide(outcome: &ProbeOutcome, mode_change: ModeChange) -> ProbeDecision {
    match outcome {
        ProbeOutcome::NoRelay => ProbeDecision::Fallback {
            reason: "no DNSCrypt relay running".to_string(),
        },
        ProbeOutcome::Failed(err) => ProbeDecision::Fallback { reason: err.clone() },
        ProbeOutcome::Live(servers) if servers.is_empty() => ProbeDecision::Fallback {
            reason: "no live DNSCrypt servers".to_string(),
        },
        ProbeOutcome::Live(_) if mode_change == ModeChange::DnsCrypt => {
            ProbeDecision::RepairCryptMode
        }
        ProbeOutcome::Live(_) => ProbeDecision::Keep,
    }
}

/// Something the prober can ask for a liveness check
#[async_trait]
pub trait LivenessTarget: Send + Sync + 'static {
    /// Run one liveness cycle
    async fn probe_cycle(&self);
}

/// Handle on a running prober task
///
/// Dropping the handle stops the task after its current cycle.
pub struct ProberTask {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl ProberTask {
    /// Spawn a prober for `target`
    ///
    /// The task only holds a weak reference and exits once the target is gone.
    pub fn spawn<T: LivenessTarget>(target: Weak<T>, config: &ProbeConfig) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let mut wait = config.initial_delay();
        let interval = config.interval();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        log::debug!("Liveness prober stopped");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }

                let Some(target) = target.upgrade() else {
                    break;
                };
                target.probe_cycle().await;
                drop(target);

                match interval {
                    Some(next) => wait = next,
                    None => break,
                }
            }
        });

        Self { shutdown_tx, task }
    }

    /// Ask the task to stop; does not wait for it
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ProberTask {
    fn drop(&mut self) {
        self.stop();
    }
}
