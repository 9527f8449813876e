use super::MessageBuffer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// SweeperHandle owns the background expiry task.
/// Dropping the handle also ends the task: the shutdown channel closes
/// and the loop exits right away.
///
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the task to stop and waits until it has exited.
    ///
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "message sweeper ended abnormally");
        }
    }
}

/// Starts the periodic expiry pass over the buffer.
/// Must be called from within a tokio runtime.
///
pub fn spawn_sweeper(buffer: Arc<MessageBuffer>, every: Duration) -> SweeperHandle {
    let (shutdown, mut stop) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    buffer.sweep();
                }
            }
        }
        debug!("message sweeper stopped");
    });

    info!(interval_secs = every.as_secs(), "message sweeper started");

    SweeperHandle { shutdown, task }
}
