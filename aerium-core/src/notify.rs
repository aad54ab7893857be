//! Notification outputs for live events.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aerium_types::Event;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// Upper bound on connecting to and writing to a TCP collector.
pub const TCP_TIMEOUT: Duration = Duration::from_secs(2);

/// Destination for published events.
///
/// Delivery is best effort everywhere: nothing is persisted or replayed for
/// subscribers that were not listening.
#[derive(Debug)]
pub enum Output {
    /// Fan out to any number of subscribers.
    ///
    /// Each subscriber sees events in publish order. A subscriber that falls
    /// more than the channel capacity behind loses the oldest events.
    Broadcast(broadcast::Sender<Event>),

    /// Send to a single consumer. Events are dropped while the channel is full.
    Channel(mpsc::Sender<Event>),

    /// Send each event to a TCP collector as one line of JSON.
    ///
    /// Connecting and writing together are bounded by [`TCP_TIMEOUT`].
    Tcp(String),

    /// Overwrite a file with the latest event as pretty JSON.
    File(PathBuf),
}

impl Output {
    /// Create a broadcast output with room for `capacity` unread events per
    /// subscriber.
    pub fn broadcast(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Output::Broadcast(tx)
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// # Example
    ///
    /// ```rust
    /// use aerium_core::Output;
    ///
    /// let (output, mut rx) = Output::channel(16);
    /// // while let Some(event) = rx.recv().await { ... }
    /// # drop((output, rx));
    /// ```
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Output::Channel(tx), rx)
    }

    pub fn tcp(addr: impl Into<String>) -> Self {
        Output::Tcp(addr.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    pub(crate) async fn emit(&self, event: &Event) -> io::Result<()> {
        match self {
            Output::Broadcast(tx) => {
                // No receivers is not an error.
                let _ = tx.send(event.clone());
            }
            Output::Channel(tx) => {
                let _ = tx.try_send(event.clone());
            }
            Output::Tcp(addr) => {
                use tokio::io::AsyncWriteExt;
                use tokio::net::TcpStream;

                let mut line = serde_json::to_vec(event)?;
                line.push(b'\n');
                within(TCP_TIMEOUT, async {
                    let mut stream = TcpStream::connect(addr).await?;
                    stream.write_all(&line).await
                })
                .await?;
            }
            Output::File(path) => {
                let json = serde_json::to_string_pretty(event)?;
                tokio::fs::write(path, json).await?;
            }
        }
        Ok(())
    }
}

async fn within<T>(limit: Duration, fut: impl Future<Output = io::Result<T>>) -> io::Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "output timed out"))?
}

/// Publishes events to every configured output.
///
/// Cloning is cheap; clones share the same outputs.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    outputs: Arc<Vec<Output>>,
}

impl Notifier {
    /// A notifier with no outputs. Publishing is a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> NotifierBuilder {
        NotifierBuilder::default()
    }

    /// A notifier with a single broadcast output.
    pub fn broadcast(capacity: usize) -> Self {
        Self::builder().output(Output::broadcast(capacity)).build()
    }

    /// Subscribe to the first broadcast output, if any.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Event>> {
        self.outputs.iter().find_map(|output| match output {
            Output::Broadcast(tx) => Some(tx.subscribe()),
            _ => None,
        })
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Deliver `event` to all outputs. Failing outputs are logged and skipped.
    pub async fn publish(&self, event: &Event) {
        for output in self.outputs.iter() {
            if let Err(err) = output.emit(event).await {
                warn!(event = event.name(), error = %err, "Failed to emit event");
            }
        }
    }
}

/// Builder for a [`Notifier`].
#[derive(Debug, Default)]
pub struct NotifierBuilder {
    outputs: Vec<Output>,
}

impl NotifierBuilder {
    /// Add an output destination.
    ///
    /// Multiple outputs can be added; events are emitted to all of them.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn build(self) -> Notifier {
        Notifier {
            outputs: Arc::new(self.outputs),
        }
    }
}
