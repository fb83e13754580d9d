//! Fan-in collection of results from many workers into one sequence.
//!
//! [`FanInCollector`] merges the results a batch's workers push into its
//! result channel into a single finite [`Stream`]. The stream ends normally
//! after exactly `expected` results, or early once the pool's cancellation
//! token fires, after yielding whatever results were already buffered. A
//! bounded count plus an explicit cancellation signal avoids the classic
//! single-channel ambiguity between "no more data" and "consumer should
//! stop".
//!
//! Results arrive in completion order, not submission order; callers
//! correlate them through their `task_id`.

use crate::task::TaskResult;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Merges per-worker results into one completion-ordered sequence.
///
/// No result is yielded twice and none is dropped: every result delivered to
/// the channel before the stream terminates is observed exactly once.
pub struct FanInCollector<R> {
    rx: mpsc::Receiver<TaskResult<R>>,
    expected: usize,
    seen: usize,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    cancel_seen: bool,
}

impl<R> FanInCollector<R> {
    /// Collects from `rx` until `expected` results have been observed or
    /// `cancel` fires.
    pub fn new(rx: mpsc::Receiver<TaskResult<R>>, expected: usize, cancel: CancellationToken) -> Self {
        Self {
            rx,
            expected,
            seen: 0,
            cancelled: Box::pin(cancel.cancelled_owned()),
            cancel_seen: false,
        }
    }

    /// Number of results this collector terminates at.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Results observed so far.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// `true` once every expected result has been observed.
    ///
    /// A stream that ended with `is_complete() == false` was cut short by
    /// cancellation (or by the producers dropping the channel) and holds a
    /// partial result set.
    pub fn is_complete(&self) -> bool {
        self.seen == self.expected
    }

    /// Waits for the next result even after cancellation was observed.
    ///
    /// Used during batch wind-down, where in-flight tasks are still allowed
    /// to deliver their cancelled results. Returns `None` once `expected` is
    /// reached or every producer has dropped its sender.
    pub(crate) async fn recv_ignoring_cancel(&mut self) -> Option<TaskResult<R>> {
        if self.is_complete() {
            return None;
        }
        let result = self.rx.recv().await;
        if result.is_some() {
            self.seen += 1;
        }
        result
    }

    /// Takes one result that is already buffered, without waiting.
    pub(crate) fn drain_ready(&mut self) -> Option<TaskResult<R>> {
        if self.is_complete() {
            return None;
        }
        match self.rx.try_recv() {
            Ok(result) => {
                self.seen += 1;
                Some(result)
            }
            Err(_) => None,
        }
    }
}

impl<R> Stream for FanInCollector<R> {
    type Item = TaskResult<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.is_complete() {
            return Poll::Ready(None);
        }

        if !this.cancel_seen && this.cancelled.as_mut().poll(cx).is_ready() {
            this.cancel_seen = true;
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(result)) => {
                this.seen += 1;
                Poll::Ready(Some(result))
            }
            // Every producer dropped its sender: nothing more can arrive.
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => {
                if this.cancel_seen {
                    // Cancellation fired and the buffer is empty; stop
                    // waiting and surface the partial set.
                    Poll::Ready(None)
                } else {
                    Poll::Pending
                }
            }
        }
    }
}

impl<R> core::fmt::Debug for FanInCollector<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FanInCollector")
            .field("expected", &self.expected)
            .field("seen", &self.seen)
            .field("cancel_seen", &self.cancel_seen)
            .finish()
    }
}
