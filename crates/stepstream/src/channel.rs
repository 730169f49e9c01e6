//! Push-in, pull-out bridge between a synchronous producer and an async
//! consumer.
//!
//! [`output_channel`] returns a single-producer/single-consumer pair. The
//! [`OutputSender`] never blocks: it is driven from inside a stepper callback,
//! which must not suspend. The [`OutputStream`] implements [`Stream`] and
//! suspends the consuming task while the queue is empty.
//!
//! Every channel terminates exactly once, either with an end-of-stream marker
//! ([`OutputSender::finish`]) or with an in-band error
//! ([`OutputSender::push_error`]). Anything pushed after that is dropped.
//!
//! The queue is unbounded. Production is paced by the driver's tick cadence,
//! so the buffer only grows without bound if a consumer stops draining while
//! its request keeps producing.

use crate::{Error, Result};
use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use futures::{Stream, stream::FusedStream};
use tokio::sync::mpsc;

enum Frame<T> {
    Item(T),
    End,
    Error(Error),
}

/// Creates a connected [`OutputSender`] / [`OutputStream`] pair.
pub fn output_channel<T>() -> (OutputSender<T>, OutputStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        OutputSender {
            tx,
            finished: false,
        },
        OutputStream { rx, done: false },
    )
}

/// Producing half of an output channel.
///
/// Not `Clone`: a channel has exactly one producer.
pub struct OutputSender<T> {
    tx: mpsc::UnboundedSender<Frame<T>>,
    finished: bool,
}

impl<T> OutputSender<T> {
    /// Enqueues `item` for the consumer.
    ///
    /// No-op once the channel is terminated or the consumer is gone.
    pub fn push(&mut self, item: T) {
        if self.finished {
            return;
        }
        // A closed receiver means the consumer went away; the item is dropped.
        let _ = self.tx.send(Frame::Item(item));
    }

    /// Terminates the channel with `err`. The consumer's next pull after the
    /// already queued items yields the error.
    pub fn push_error(&mut self, err: Error) {
        self.terminate(Frame::Error(err));
    }

    /// Terminates the channel with an end-of-stream marker.
    ///
    /// Idempotent: only the first termination is recorded.
    pub fn finish(&mut self) {
        self.terminate(Frame::End);
    }

    /// Returns `true` once `finish` or `push_error` has been called.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns `true` if nothing pushed from now on can reach a consumer.
    pub fn is_closed(&self) -> bool {
        self.finished || self.tx.is_closed()
    }

    fn terminate(&mut self, frame: Frame<T>) {
        if self.finished {
            return;
        }
        self.finished = true;
        let _ = self.tx.send(frame);
    }
}

/// Consuming half of an output channel.
///
/// Yields `Ok(item)` in push order. After the end-of-stream marker every poll
/// returns `None`. A terminal error is yielded once, followed by `None`
/// forever. If the producer is dropped without terminating, the stream yields
/// [`Error::ProducerDropped`] once and then ends.
pub struct OutputStream<T> {
    rx: mpsc::UnboundedReceiver<Frame<T>>,
    done: bool,
}

impl<T> OutputStream<T> {
    /// Polls for the next item. See the type-level docs for termination.
    pub fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T>>> {
        if self.done {
            return Poll::Ready(None);
        }

        match ready!(self.rx.poll_recv(cx)) {
            Some(Frame::Item(item)) => Poll::Ready(Some(Ok(item))),
            Some(Frame::End) => {
                self.terminate();
                Poll::Ready(None)
            }
            Some(Frame::Error(err)) => {
                self.terminate();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                self.done = true;
                Poll::Ready(Some(Err(Error::ProducerDropped)))
            }
        }
    }

    fn terminate(&mut self) {
        self.done = true;
        // The producer has recorded its termination and will not push again;
        // closing lets `is_closed` report it immediately.
        self.rx.close();
    }
}

impl<T> Stream for OutputStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_item(cx)
    }
}

impl<T> FusedStream for OutputStream<T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};

    #[tokio::test]
    async fn yields_pushes_in_order_then_ends() {
        let (mut tx, mut rx) = output_channel();
        for word in ["p1", "p2", "p3"] {
            tx.push(word.to_string());
        }
        tx.finish();

        let items: Vec<_> = (&mut rx).collect().await;
        assert_eq!(
            items,
            vec![Ok("p1".to_string()), Ok("p2".to_string()), Ok("p3".to_string())]
        );

        // Post-termination reads keep reporting end-of-stream.
        assert_eq!(rx.next().await, None);
        assert_eq!(rx.next().await, None);
        assert!(rx.is_terminated());
    }

    #[tokio::test]
    async fn pushes_after_finish_are_ignored() {
        let (mut tx, mut rx) = output_channel();
        tx.push(1);
        tx.finish();
        tx.push(2);
        tx.push_error(Error::Shutdown);
        tx.finish();
        assert!(tx.is_finished());

        assert_eq!(rx.next().await, Some(Ok(1)));
        assert_eq!(rx.next().await, None);
    }

    #[tokio::test]
    async fn error_is_delivered_after_queued_items_once() {
        let (mut tx, mut rx) = output_channel();
        tx.push("a");
        tx.push_error(Error::Step {
            reason: "boom".into(),
        });
        tx.push("b");
        tx.finish();

        assert_eq!(rx.next().await, Some(Ok("a")));
        assert_eq!(
            rx.next().await,
            Some(Err(Error::Step {
                reason: "boom".into()
            }))
        );
        assert_eq!(rx.next().await, None);
    }

    #[tokio::test]
    async fn dropped_producer_is_reported() {
        let (mut tx, mut rx) = output_channel();
        tx.push(7_u32);
        drop(tx);

        assert_eq!(rx.next().await, Some(Ok(7)));
        assert_eq!(rx.next().await, Some(Err(Error::ProducerDropped)));
        assert_eq!(rx.next().await, None);
    }

    #[tokio::test]
    async fn pull_suspends_until_an_item_arrives() {
        let (mut tx, mut rx) = output_channel::<&str>();
        assert!(rx.next().now_or_never().is_none());

        tx.push("late");
        assert_eq!(rx.next().now_or_never(), Some(Some(Ok("late"))));
    }

    #[test]
    fn sender_sees_consumer_going_away() {
        let (mut tx, rx) = output_channel::<u8>();
        assert!(!tx.is_closed());
        drop(rx);
        assert!(tx.is_closed());
        // Still a no-op, never a panic.
        tx.push(1);
        tx.finish();
    }
}
