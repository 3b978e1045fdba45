//! Reply aggregation over a fragment channel.
//!
//! The orchestrator produces reply fragments in order; the aggregator
//! concatenates them into one completed message. Fragments already received
//! survive cancellation, so a caller that disconnects mid-stream can still
//! retrieve the partial reply.

use tokio::sync::mpsc;

/// Create a connected sink/aggregator pair with the given channel capacity.
pub fn reply_channel(capacity: usize) -> (FragmentSink, ReplyAggregator) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        FragmentSink { tx },
        ReplyAggregator {
            rx,
            collected: Vec::new(),
        },
    )
}

/// Producer side: ordered reply fragments.
#[derive(Clone)]
pub struct FragmentSink {
    tx: mpsc::Sender<String>,
}

impl FragmentSink {
    /// Push one fragment. Returns false if the consumer is gone; the
    /// producer treats that as a disconnected caller, not an error.
    pub async fn push(&self, fragment: impl Into<String>) -> bool {
        self.tx.send(fragment.into()).await.is_ok()
    }
}

/// Consumer side: collects fragments in arrival order.
pub struct ReplyAggregator {
    rx: mpsc::Receiver<String>,
    collected: Vec<String>,
}

impl ReplyAggregator {
    /// Receive the next fragment, retaining it in the collected buffer.
    ///
    /// `recv` on the underlying channel is cancel-safe, and each fragment is
    /// moved into the buffer before the next await, so cancellation never
    /// drops a delivered fragment.
    pub async fn recv(&mut self) -> Option<String> {
        let fragment = self.rx.recv().await?;
        self.collected.push(fragment.clone());
        Some(fragment)
    }

    /// Concatenate fragments in arrival order until the producer closes.
    pub async fn collect_all(&mut self) -> String {
        while self.recv().await.is_some() {}
        self.peek_partial()
    }

    /// Everything received so far, usable after a cancelled `collect_all`.
    pub fn peek_partial(&self) -> String {
        self.collected.concat()
    }
}
