//! In-process reading channel, fed by the HTTP ingest endpoint.

use super::{ReadingStream, SourceError};
use crate::core::reading::Reading;
use tokio::sync::mpsc;

/// Sending half of the reading channel.
#[derive(Debug, Clone)]
pub struct ReadingSender {
    tx: mpsc::Sender<Reading>,
}

impl ReadingSender {
    /// Queue a reading for the monitor, waiting if the buffer is full.
    ///
    /// Fails once the monitor has stopped consuming.
    pub async fn send(&self, reading: Reading) -> Result<(), SourceError> {
        self.tx
            .send(reading)
            .await
            .map_err(|_| SourceError::Disconnected("monitor is not accepting readings".to_string()))
    }

    /// Check whether the monitor side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a bounded channel and the reading stream that drains it.
///
/// The stream ends when every sender has been dropped.
pub fn channel(capacity: usize) -> (ReadingSender, ReadingStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|reading| (Ok(reading), rx))
    });
    (ReadingSender { tx }, Box::pin(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (sender, mut stream) = channel(4);
        for v in [1.0, 2.0, 3.0] {
            sender.send(Reading::new([v; 7]).unwrap()).await.unwrap();
        }
        drop(sender);

        let values: Vec<f64> = stream
            .by_ref()
            .map(|r| r.unwrap().nitrogen())
            .collect()
            .await;
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_send_fails_after_stream_dropped() {
        let (sender, stream) = channel(1);
        drop(stream);
        assert!(sender.is_closed());
        assert!(sender.send(Reading::new([0.0; 7]).unwrap()).await.is_err());
    }
}
