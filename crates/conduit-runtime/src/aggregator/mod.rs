//! Merges token output and tool status into one ordered event stream.
//!
//! Producers write into two labeled channels that share a sequence counter.
//! A single consumer task restores production order across both channels and
//! forwards events to the client, then appends exactly one terminal event
//! derived from how the producer task ended.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use conduit_core::{Error, ErrorKind, InvocationId, Result, StreamEvent, ToolPhase, ToolResult};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_AGGREGATOR;

/// Default capacity of each producer channel and of the output channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// How long a cancelled producer may take to wind down before it is aborted.
const PRODUCER_GRACE: Duration = Duration::from_secs(5);

/// Which producer an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Tokens,
    Statuses,
}

/// Sending half of one labeled producer channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    channel: Channel,
    tx: mpsc::Sender<(u64, StreamEvent)>,
    sequence: Arc<AtomicU64>,
}

impl EventSender {
    /// Returns the channel label.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Sends an event, waiting for channel capacity.
    ///
    /// The sequence number is taken only once capacity is reserved, and the
    /// event is handed over without yielding in between, so numbers reach the
    /// consumer in the order they were assigned on each channel.
    ///
    /// # Errors
    ///
    /// Fails with `cancelled` once the consumer has stopped.
    pub async fn send(&self, event: StreamEvent) -> Result<()> {
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| Error::cancelled().with_message("event stream closed"))?;

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        permit.send((sequence, event));
        Ok(())
    }

    /// Sends a token delta.
    pub async fn token(&self, text: impl Into<String>) -> Result<()> {
        self.send(StreamEvent::token(text)).await
    }

    /// Sends the `started` status of a tool call.
    pub async fn started(&self, tool_name: &str, invocation_id: InvocationId) -> Result<()> {
        self.send(StreamEvent::ToolStatus {
            tool_name: tool_name.to_owned(),
            invocation_id,
            phase: ToolPhase::Started,
        })
        .await
    }

    /// Sends the terminal status of a tool call.
    pub async fn finished(&self, result: &ToolResult) -> Result<()> {
        self.send(StreamEvent::ToolStatus {
            tool_name: result.tool_name.clone(),
            invocation_id: result.invocation_id,
            phase: ToolPhase::of(result),
        })
        .await
    }
}

/// Both producer handles of one turn.
///
/// Dropping every clone of both senders tells the consumer that the turn
/// produced all of its events.
#[derive(Debug, Clone)]
pub struct Producers {
    pub tokens: EventSender,
    pub statuses: EventSender,
}

/// Consumer half of the pipeline.
pub struct StreamAggregator {
    tokens: mpsc::Receiver<(u64, StreamEvent)>,
    statuses: mpsc::Receiver<(u64, StreamEvent)>,
    output: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    pending: BTreeMap<u64, StreamEvent>,
    next_sequence: u64,
    client_gone: bool,
    forwarded: u64,
}

impl std::fmt::Debug for StreamAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAggregator")
            .field("next_sequence", &self.next_sequence)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Creates the producer handles, the aggregator and the client stream of one turn.
pub fn pipeline(
    capacity: usize,
    cancel: CancellationToken,
) -> (Producers, StreamAggregator, ReceiverStream<StreamEvent>) {
    let capacity = capacity.max(1);
    let sequence = Arc::new(AtomicU64::new(0));
    let (tokens_tx, tokens_rx) = mpsc::channel(capacity);
    let (statuses_tx, statuses_rx) = mpsc::channel(capacity);
    let (output_tx, output_rx) = mpsc::channel(capacity);

    let producers = Producers {
        tokens: EventSender {
            channel: Channel::Tokens,
            tx: tokens_tx,
            sequence: sequence.clone(),
        },
        statuses: EventSender {
            channel: Channel::Statuses,
            tx: statuses_tx,
            sequence,
        },
    };

    let aggregator = StreamAggregator {
        tokens: tokens_rx,
        statuses: statuses_rx,
        output: output_tx,
        cancel,
        pending: BTreeMap::new(),
        next_sequence: 0,
        client_gone: false,
        forwarded: 0,
    };

    (producers, aggregator, ReceiverStream::new(output_rx))
}

/// Why the consumer loop stopped reading producer channels.
enum Stop {
    /// Both channels closed: the producer is done.
    Drained,
    Cancelled,
}

impl StreamAggregator {
    /// Runs the consumer until the turn ends.
    ///
    /// `producer` is the task writing into the channels; its result decides
    /// the terminal event: `Done` for `Ok`, `Error` for an error or a panic,
    /// and `Error(cancelled)` when the turn was cancelled first.
    pub async fn run<T>(mut self, mut producer: JoinHandle<Result<T>>)
    where
        T: Send + 'static,
    {
        let mut tokens_open = true;
        let mut statuses_open = true;

        let stop = loop {
            if !tokens_open && !statuses_open {
                break Stop::Drained;
            }

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break Stop::Cancelled,

                item = self.tokens.recv(), if tokens_open => match item {
                    Some((sequence, event)) => self.accept(sequence, event).await,
                    None => tokens_open = false,
                },

                item = self.statuses.recv(), if statuses_open => match item {
                    Some((sequence, event)) => self.accept(sequence, event).await,
                    None => statuses_open = false,
                },

                () = self.output.closed() => self.client_gone = true,
            }

            if self.client_gone {
                tracing::debug!(target: TRACING_TARGET_AGGREGATOR, "Client disconnected, cancelling turn");
                self.cancel.cancel();
                break Stop::Cancelled;
            }
        };

        let terminal = match stop {
            Stop::Drained => {
                self.flush_all().await;
                match (&mut producer).await {
                    Ok(Ok(_)) => StreamEvent::Done,
                    Ok(Err(error)) => StreamEvent::error(error.kind(), error.message_or_kind()),
                    Err(join_error) => {
                        tracing::error!(
                            target: TRACING_TARGET_AGGREGATOR,
                            error = %join_error,
                            "Turn producer crashed"
                        );
                        StreamEvent::error(ErrorKind::Internal, "turn producer crashed")
                    }
                }
            }
            Stop::Cancelled => {
                // Closing the receivers makes further producer sends fail fast.
                self.tokens.close();
                self.statuses.close();
                self.wind_down(producer).await;
                StreamEvent::error(ErrorKind::Cancelled, "turn cancelled")
            }
        };

        tracing::debug!(
            target: TRACING_TARGET_AGGREGATOR,
            events = self.forwarded,
            terminal = terminal.event_type(),
            "Event stream finished"
        );

        self.emit(terminal).await;
    }

    /// Buffers an event and forwards every event that is now in order.
    async fn accept(&mut self, sequence: u64, event: StreamEvent) {
        self.pending.insert(sequence, event);

        while let Some(event) = self.pending.remove(&self.next_sequence) {
            self.next_sequence += 1;
            self.emit(event).await;
        }
    }

    /// Forwards whatever is still buffered, in sequence order.
    async fn flush_all(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for (_, event) in pending {
            self.emit(event).await;
        }
    }

    async fn emit(&mut self, event: StreamEvent) {
        if self.client_gone {
            return;
        }

        if self.output.send(event).await.is_err() {
            self.client_gone = true;
        } else {
            self.forwarded += 1;
        }
    }

    /// Waits for a cancelled producer, aborting it after a grace period.
    async fn wind_down<T>(&self, mut producer: JoinHandle<Result<T>>) {
        match tokio::time::timeout(PRODUCER_GRACE, &mut producer).await {
            Ok(Err(join_error)) if join_error.is_panic() => {
                tracing::error!(
                    target: TRACING_TARGET_AGGREGATOR,
                    error = %join_error,
                    "Turn producer crashed after cancellation"
                );
            }
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(
                    target: TRACING_TARGET_AGGREGATOR,
                    "Turn producer ignored cancellation, aborting"
                );
                producer.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    async fn collect(stream: ReceiverStream<StreamEvent>) -> Vec<StreamEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn preserves_production_order_across_channels() {
        let cancel = CancellationToken::new();
        let (producers, aggregator, stream) = pipeline(4, cancel);
        let id = InvocationId::new();

        let producer = tokio::spawn(async move {
            producers.tokens.token("Looking").await?;
            producers.statuses.started("web_search", id).await?;
            producers.tokens.token(" it up").await?;
            Ok::<_, Error>(())
        });
        tokio::spawn(aggregator.run(producer));

        let events = collect(stream).await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], StreamEvent::token("Looking"));
        assert!(matches!(events[1], StreamEvent::ToolStatus { phase: ToolPhase::Started, .. }));
        assert_eq!(events[2], StreamEvent::token(" it up"));
        assert_eq!(events[3], StreamEvent::Done);
    }

    #[tokio::test]
    async fn reorders_out_of_order_arrivals() {
        let cancel = CancellationToken::new();
        let (producers, mut aggregator, stream) = pipeline(8, cancel);
        drop(producers);

        aggregator.accept(2, StreamEvent::token("c")).await;
        aggregator.accept(0, StreamEvent::token("a")).await;
        aggregator.accept(1, StreamEvent::token("b")).await;
        drop(aggregator);

        let texts: Vec<_> = collect(stream)
            .await
            .into_iter()
            .map(|event| match event {
                StreamEvent::TokenDelta { text } => text,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn producer_error_becomes_single_error_event() {
        let (producers, aggregator, stream) = pipeline(4, CancellationToken::new());

        let producer = tokio::spawn(async move {
            let producers = producers;
            producers.tokens.token("partial").await?;
            Err::<(), _>(Error::model_unavailable().with_message("connection reset"))
        });
        tokio::spawn(aggregator.run(producer));

        let events = collect(stream).await;
        assert_eq!(
            events,
            [
                StreamEvent::token("partial"),
                StreamEvent::error(ErrorKind::ModelUnavailable, "connection reset"),
            ]
        );
    }

    #[tokio::test]
    async fn producer_panic_still_terminates_stream() {
        let (producers, aggregator, stream) = pipeline(4, CancellationToken::new());

        let producer = tokio::spawn(async move {
            let producers = producers;
            producers.tokens.token("before crash").await?;
            if producers.tokens.channel() == Channel::Tokens {
                panic!("producer bug");
            }
            Ok::<_, Error>(())
        });
        tokio::spawn(aggregator.run(producer));

        let events = collect(stream).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StreamEvent::error(ErrorKind::Internal, "turn producer crashed"));
    }

    #[tokio::test]
    async fn cancellation_ends_with_cancelled_error() {
        let cancel = CancellationToken::new();
        let (producers, aggregator, stream) = pipeline(4, cancel.clone());

        let producer_cancel = cancel.clone();
        let producer = tokio::spawn(async move {
            producers.tokens.token("working").await?;
            producer_cancel.cancelled().await;
            // Sends after cancellation fail instead of blocking.
            while producers.tokens.token("late").await.is_ok() {
                tokio::task::yield_now().await;
            }
            Err::<(), _>(Error::cancelled())
        });
        let consumer = tokio::spawn(aggregator.run(producer));

        let mut stream = stream;
        assert_eq!(stream.next().await, Some(StreamEvent::token("working")));
        cancel.cancel();

        let rest: Vec<_> = stream.collect().await;
        assert_eq!(rest.last(), Some(&StreamEvent::error(ErrorKind::Cancelled, "turn cancelled")));
        assert_eq!(rest.iter().filter(|event| event.is_terminal()).count(), 1);
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn client_disconnect_cancels_the_turn() {
        let cancel = CancellationToken::new();
        let (producers, aggregator, stream) = pipeline(1, cancel.clone());
        drop(stream);

        let producer = tokio::spawn(async move {
            loop {
                if let Err(error) = producers.tokens.token("unread").await {
                    return Err::<(), Error>(error);
                }
            }
        });
        aggregator.run(producer).await;

        assert!(cancel.is_cancelled());
    }
}
