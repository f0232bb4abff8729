use std::future::Future;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::realtime::{ChangeEvent, Subscription};

/// Background task applying live events; aborting it drops the subscription
#[derive(Debug)]
pub struct LiveHandle {
    task: JoinHandle<()>,
}

impl LiveHandle {
    /// Stop applying events and leave the channel
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the subscription ends by itself
    pub async fn join(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Feed events from `subscription` to `apply`, one at a time and in order
pub fn spawn_pump<F, Fut>(mut subscription: Subscription, apply: F) -> LiveHandle
where
    F: Fn(ChangeEvent) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let scope = subscription.scope();
        while let Some(event) = subscription.recv().await {
            apply(event).await;
        }
        debug!(scope = ?scope, "Live subscription ended");
    });
    LiveHandle { task }
}
