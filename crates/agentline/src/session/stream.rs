//! SSE delivery of one run's events.
//!
//! `EventStream` forwards events from the run task to the HTTP response in
//! production order. Each event becomes one SSE frame as soon as it is
//! received. If the response is dropped before the terminal event (client
//! disconnect), the run's cancellation token fires.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::sse::Event;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::events::AgentEvent;

/// Content of the error frame sent when a run ends without a terminal event.
const RUN_ABORTED: &str = "run ended unexpectedly";

/// Stream of SSE frames for one request.
pub struct EventStream {
    rx: mpsc::Receiver<AgentEvent>,
    cancel: CancellationToken,
    session_id: String,
    terminal_sent: bool,
    finished: bool,
}

impl EventStream {
    pub fn new(
        rx: mpsc::Receiver<AgentEvent>,
        cancel: CancellationToken,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            rx,
            cancel,
            session_id: session_id.into(),
            terminal_sent: false,
            finished: false,
        }
    }
}

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(event)) => {
                    // Nothing follows a terminal event on the wire
                    if self.terminal_sent {
                        continue;
                    }
                    if event.is_terminal() {
                        self.terminal_sent = true;
                    }
                    return Poll::Ready(Some(Ok(to_sse(&event))));
                }
                // Sender dropped: the run task is done and the session released
                Poll::Ready(None) => {
                    self.finished = true;
                    if self.terminal_sent {
                        return Poll::Ready(None);
                    }
                    self.terminal_sent = true;
                    return Poll::Ready(Some(Ok(to_sse(&AgentEvent::Error(
                        RUN_ABORTED.to_string(),
                    )))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if !self.terminal_sent {
            info!(session_id = %self.session_id, "Client disconnected, cancelling run");
            self.cancel.cancel();
        } else {
            debug!(session_id = %self.session_id, "Event stream closed");
        }
    }
}

/// Render one event as an SSE frame.
pub fn to_sse(event: &AgentEvent) -> Event {
    let payload = event.payload();
    match Event::default().event(event.kind()).json_data(&payload) {
        Ok(frame) => frame,
        Err(_) => Event::default().event(event.kind()).data(payload.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn channel() -> (mpsc::Sender<AgentEvent>, EventStream, CancellationToken) {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        (tx, EventStream::new(rx, cancel.clone(), "s"), cancel)
    }

    #[tokio::test]
    async fn forwards_events_in_order_until_closed() {
        let (tx, mut stream, cancel) = channel();
        tx.send(AgentEvent::Token("a".into())).await.unwrap();
        tx.send(AgentEvent::Done).await.unwrap();
        drop(tx);

        let mut count = 0;
        while let Some(frame) = stream.next().await {
            frame.unwrap();
            count += 1;
        }
        assert_eq!(count, 2);
        drop(stream);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn events_after_terminal_are_suppressed() {
        let (tx, stream, _cancel) = channel();
        tx.send(AgentEvent::Done).await.unwrap();
        tx.send(AgentEvent::Token("late".into())).await.unwrap();
        drop(tx);

        let frames: Vec<_> = stream.collect().await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn closed_channel_without_terminal_yields_error() {
        let (tx, mut stream, cancel) = channel();
        tx.send(AgentEvent::Token("a".into())).await.unwrap();
        drop(tx);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
        drop(stream);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_before_terminal_cancels_run() {
        let (tx, mut stream, cancel) = channel();
        tx.send(AgentEvent::Token("a".into())).await.unwrap();

        assert!(stream.next().await.is_some());
        drop(stream);

        assert!(cancel.is_cancelled());
        assert!(tx.send(AgentEvent::Done).await.is_err());
    }
}
