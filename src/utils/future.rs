/// Value/error channel pairs for long-running collaborators.
///
/// The producer sends on exactly one of the two channels and then drops
/// both senders. Consumers select on both plus their own deadline; they
/// never see both a value and an error.
use std::time::Duration;

use tokio::sync::mpsc;

pub struct EitherFuture<T> {
    pub values: mpsc::Receiver<T>,
    pub errors: mpsc::Receiver<anyhow::Error>,
}

pub struct EitherSender<T> {
    values: mpsc::Sender<T>,
    errors: mpsc::Sender<anyhow::Error>,
}

pub fn either_channel<T>() -> (EitherSender<T>, EitherFuture<T>) {
    let (value_tx, value_rx) = mpsc::channel(1);
    let (error_tx, error_rx) = mpsc::channel(1);
    (
        EitherSender { values: value_tx, errors: error_tx },
        EitherFuture { values: value_rx, errors: error_rx },
    )
}

impl<T> EitherSender<T> {
    /// Deliver the value and close both channels.
    pub async fn resolve(self, value: T) {
        let _ = self.values.send(value).await;
    }

    /// Deliver the error and close both channels.
    pub async fn fail(self, error: anyhow::Error) {
        let _ = self.errors.send(error).await;
    }
}

impl<T> EitherFuture<T> {
    /// Wait for whichever side produces first, up to the deadline.
    pub async fn wait(mut self, deadline: Duration) -> anyhow::Result<T> {
        tokio::select! {
            v = self.values.recv() => {
                v.ok_or_else(|| anyhow::anyhow!("producer dropped without a result"))
            }
            e = self.errors.recv() => {
                match e {
                    Some(err) => Err(err),
                    None => Err(anyhow::anyhow!("producer dropped without a result")),
                }
            }
            _ = tokio::time::sleep(deadline) => Err(anyhow::anyhow!("timed out")),
        }
    }
}
