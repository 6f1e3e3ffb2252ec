use crate::types::Trigger;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

/// Emit `Trigger::Tick` every `period`, starting immediately.
///
/// The task ends when the receiving side is dropped.
pub fn spawn_ticker(period: Duration, tx: mpsc::Sender<Trigger>) -> AbortHandle {
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if tx.send(Trigger::Tick).await.is_err() {
                debug!("Trigger receiver closed, stopping ticker");
                return;
            }
        }
    });
    handle.abort_handle()
}
